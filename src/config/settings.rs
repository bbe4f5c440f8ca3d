//! TOML-based configuration for rowpipe.
//!
//! Supports a config file (rowpipe.toml) with environment variable expansion
//! in the worker path.
//!
//! Example configuration:
//! ```toml
//! [worker]
//! path = "${HOME}/bin/my-worker"
//! args = ["--mode", "fast"]
//! shutdown_grace_ms = 200
//! receive_timeout_secs = 30
//!
//! [format]
//! kind = "text"
//! attribute_delimiter = "\t"
//! line_delimiter = "\n"
//! null_token = "null"
//!
//! [output]
//! types = ["string", "int64"]
//! names = ["greeting", "n"]
//! chunk_size = 1000
//!
//! [logging]
//! filter = "rowpipe=debug"
//! ```

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::codec::{Stringifiers, TextCodec, TextOptions};
use crate::types::{DataType, Field, Schema};
use crate::wire::WireFormat;
use crate::worker::{ChannelOptions, WorkerCommand, DEFAULT_MAX_FRAME_BYTES};

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV_VAR: &str = "ROWPIPE_CONFIG";

/// Error type for settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Failed to serialize settings: {0}")]
    SerializeError(#[from] toml::ser::Error),

    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("No worker path configured")]
    MissingWorkerPath,

    #[error("Output types are required")]
    MissingOutputTypes,

    #[error("Output has {types} types but {names} names")]
    OutputNamesMismatch { types: usize, names: usize },

    #[error("Invalid delimiter for {field}: {value:?} (expected one ASCII character)")]
    InvalidDelimiter { field: &'static str, value: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// Worker process configuration.
    pub worker: WorkerSettings,

    /// Wire format configuration.
    pub format: FormatSettings,

    /// Declared reply schema.
    pub output: OutputSettings,

    /// Log filter used by the CLI.
    pub logging: LoggingSettings,
}

/// Worker configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct WorkerSettings {
    /// Path to the worker executable (supports ${ENV_VAR} expansion).
    pub path: Option<String>,

    /// Arguments passed to the worker.
    pub args: Vec<String>,

    /// Milliseconds between SIGTERM and SIGKILL.
    pub shutdown_grace_ms: u64,

    /// Seconds to wait for a reply. Unset waits forever.
    pub receive_timeout_secs: Option<u64>,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            path: None,
            args: Vec::new(),
            shutdown_grace_ms: 200,
            receive_timeout_secs: None,
        }
    }
}

/// Wire format settings.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct FormatSettings {
    /// "text" or "binary".
    pub kind: WireFormat,

    pub attribute_delimiter: String,

    pub line_delimiter: String,

    /// Text token for a null cell.
    pub null_token: String,

    /// Text token for a NaN float.
    pub nan_token: String,

    /// Quote and escape string cells in requests.
    pub quote_strings: bool,

    /// Largest binary reply accepted, in bytes.
    pub max_frame_bytes: u64,
}

impl Default for FormatSettings {
    fn default() -> Self {
        let text = TextOptions::default();
        Self {
            kind: WireFormat::Text,
            attribute_delimiter: text.attribute_delimiter.to_string(),
            line_delimiter: text.line_delimiter.to_string(),
            null_token: text.null_token,
            nan_token: text.nan_token,
            quote_strings: text.quote_strings,
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
        }
    }
}

/// Output schema settings.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct OutputSettings {
    /// Reply column types, e.g. `["string", "int64"]`.
    pub types: Vec<String>,

    /// Reply column names. Defaults to `a0, a1, ...`.
    pub names: Vec<String>,

    /// Rows per input batch.
    pub chunk_size: usize,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            types: Vec::new(),
            names: Vec::new(),
            chunk_size: 1000,
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// `tracing_subscriber::EnvFilter` directive. `RUST_LOG` takes precedence.
    pub filter: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

impl Settings {
    /// Load settings from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(SettingsError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        let settings: Settings = toml::from_str(&content)?;
        Ok(settings)
    }

    /// Load settings from the default config file locations.
    ///
    /// Searches in order:
    /// 1. Environment variable `ROWPIPE_CONFIG`
    /// 2. `./rowpipe.toml`
    /// 3. `<config dir>/rowpipe/config.toml`
    pub fn load() -> Result<Self, SettingsError> {
        if let Ok(path) = env::var(CONFIG_ENV_VAR) {
            return Self::from_file(&path);
        }

        let local_config = PathBuf::from("rowpipe.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("rowpipe").join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        Ok(Settings::default())
    }

    /// Render as TOML.
    pub fn to_toml(&self) -> Result<String, SettingsError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Check everything that does not depend on the worker path.
    pub fn validate(&self) -> Result<(), SettingsError> {
        let text = self.text_options()?;
        if text.attribute_delimiter == text.line_delimiter {
            return Err(SettingsError::InvalidConfig(
                "attribute and line delimiters must differ".to_string(),
            ));
        }
        if self.output.chunk_size == 0 {
            return Err(SettingsError::InvalidConfig(
                "output.chunk_size must be positive".to_string(),
            ));
        }
        self.output_schema()?;
        Ok(())
    }

    /// Resolve the declared reply schema.
    pub fn output_schema(&self) -> Result<Schema, SettingsError> {
        let output = &self.output;
        if output.types.is_empty() {
            return Err(SettingsError::MissingOutputTypes);
        }
        if !output.names.is_empty() && output.names.len() != output.types.len() {
            return Err(SettingsError::OutputNamesMismatch {
                types: output.types.len(),
                names: output.names.len(),
            });
        }
        let types: Vec<DataType> = output.types.iter().map(|t| DataType::parse(t)).collect();
        if output.names.is_empty() {
            return Ok(Schema::from_types(&types));
        }
        Ok(Schema::new(
            output
                .names
                .iter()
                .zip(types)
                .map(|(name, data_type)| Field::new(name.clone(), data_type))
                .collect(),
        ))
    }

    pub fn text_options(&self) -> Result<TextOptions, SettingsError> {
        let format = &self.format;
        Ok(TextOptions {
            attribute_delimiter: single_char("attribute_delimiter", &format.attribute_delimiter)?,
            line_delimiter: single_char("line_delimiter", &format.line_delimiter)?,
            null_token: format.null_token.clone(),
            nan_token: format.nan_token.clone(),
            quote_strings: format.quote_strings,
        })
    }

    /// Text codec with no stringifiers registered.
    pub fn text_codec(&self) -> Result<TextCodec, SettingsError> {
        Ok(TextCodec::new(self.text_options()?, Stringifiers::new()))
    }

    pub fn channel_options(&self) -> Result<ChannelOptions, SettingsError> {
        let line = single_char("line_delimiter", &self.format.line_delimiter)?;
        Ok(ChannelOptions {
            format: self.format.kind,
            line_delimiter: line as u8,
            receive_timeout: self.worker.receive_timeout_secs.map(Duration::from_secs),
            max_frame_bytes: self.format.max_frame_bytes,
        })
    }

    /// The worker command line, with environment variables expanded.
    pub fn worker_command(&self) -> Result<WorkerCommand, SettingsError> {
        let path = self
            .worker
            .path
            .as_deref()
            .ok_or(SettingsError::MissingWorkerPath)?;
        let path = expand_env_vars(path)?;
        Ok(WorkerCommand::new(path)
            .args(self.worker.args.iter().cloned())
            .with_shutdown_grace(Duration::from_millis(self.worker.shutdown_grace_ms)))
    }
}

fn single_char(field: &'static str, value: &str) -> Result<char, SettingsError> {
    let mut chars = value.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if c.is_ascii() => Ok(c),
        _ => Err(SettingsError::InvalidDelimiter {
            field,
            value: value.to_string(),
        }),
    }
}

/// Expand environment variables in a string.
///
/// Supports `${VAR}` and `$VAR` syntax.
pub fn expand_env_vars(s: &str) -> Result<String, SettingsError> {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '$' {
            result.push(c);
            continue;
        }
        let var_name: String = if chars.peek() == Some(&'{') {
            chars.next();
            chars.by_ref().take_while(|&ch| ch != '}').collect()
        } else {
            let mut name = String::new();
            while let Some(ch) = chars.next_if(|ch| ch.is_alphanumeric() || *ch == '_') {
                name.push(ch);
            }
            if name.is_empty() {
                // A lone $ is kept.
                result.push('$');
                continue;
            }
            name
        };
        let value =
            env::var(&var_name).map_err(|_| SettingsError::MissingEnvVar(var_name.clone()))?;
        result.push_str(&value);
    }

    Ok(result)
}
