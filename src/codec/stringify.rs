//! Stringifiers for host types without a native text rendering.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::types::OtherValue;

/// Converts an opaque host value to its text cell.
pub type StringifyFn = Arc<dyn Fn(&OtherValue) -> String + Send + Sync>;

/// Mapping from host type name to the function that renders it as text.
///
/// Passed explicitly to the text codec instead of being looked up from
/// process-wide state.
#[derive(Clone, Default)]
pub struct Stringifiers {
    by_type: HashMap<String, StringifyFn>,
}

impl Stringifiers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a stringifier for `type_name`, replacing any previous one.
    pub fn register<F>(&mut self, type_name: impl Into<String>, f: F)
    where
        F: Fn(&OtherValue) -> String + Send + Sync + 'static,
    {
        self.by_type.insert(type_name.into(), Arc::new(f));
    }

    /// Builder form of [`Stringifiers::register`].
    pub fn with<F>(mut self, type_name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&OtherValue) -> String + Send + Sync + 'static,
    {
        self.register(type_name, f);
        self
    }

    pub fn get(&self, type_name: &str) -> Option<&StringifyFn> {
        self.by_type.get(type_name)
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.by_type.contains_key(type_name)
    }
}

impl fmt::Debug for Stringifiers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.by_type.keys().collect();
        names.sort();
        f.debug_struct("Stringifiers").field("types", &names).finish()
    }
}
