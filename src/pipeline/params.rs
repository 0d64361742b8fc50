// src/pipeline/params.rs

use indexmap::IndexMap;

use crate::types::ParamKind;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamValue {
    pub value: String,
    pub kind: ParamKind,
}

/// Ordered name → value mapping handed to `invoke`.
///
/// Insertion order is preserved; adding a name twice replaces the value in
/// place. `invoke` only borrows the set, so it keeps accumulating across
/// steps until the caller drops it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InputParameterSet {
    values: IndexMap<String, ParamValue>,
}

impl InputParameterSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_input(
        &mut self,
        name: impl Into<String>,
        value: impl Into<String>,
        kind: ParamKind,
    ) -> &mut Self {
        self.values.insert(
            name.into(),
            ParamValue {
                value: value.into(),
                kind,
            },
        );
        self
    }

    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.add_input(name, value, ParamKind::Param);
        self
    }

    pub fn with_file(mut self, name: impl Into<String>, path: impl Into<String>) -> Self {
        self.add_input(name, path, ParamKind::File);
        self
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.values.get(name)
    }

    pub fn value(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(|v| v.value.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }
}
