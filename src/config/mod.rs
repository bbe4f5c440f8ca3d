//! Configuration module for rowpipe.
//!
//! Handles the config file, environment variables, and the conversion of
//! settings into the runtime options the exchange is built from.

mod settings;

pub use settings::{
    expand_env_vars, FormatSettings, LoggingSettings, OutputSettings, Settings, SettingsError,
    WorkerSettings, CONFIG_ENV_VAR,
};
