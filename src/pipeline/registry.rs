// src/pipeline/registry.rs

use std::collections::BTreeMap;
use std::path::Path;

use crate::config::{OperationConfig, SiteConfig};
use crate::errors::{PipelineError, Result};
use crate::pipeline::params::InputParameterSet;
use crate::types::{OperationFamily, ParamKind};

/// Immutable registry of the operations a pipeline may invoke.
#[derive(Debug, Clone, Default)]
pub struct OperationRegistry {
    ops: BTreeMap<String, OperationConfig>,
}

impl OperationRegistry {
    pub fn new(ops: BTreeMap<String, OperationConfig>) -> Self {
        Self { ops }
    }

    pub fn from_config(cfg: &SiteConfig) -> Self {
        Self::new(cfg.operation.clone())
    }

    pub fn get(&self, name: &str) -> Option<&OperationConfig> {
        self.ops.get(name)
    }

    pub fn family_of(&self, name: &str) -> Option<OperationFamily> {
        self.ops.get(name).map(|op| op.family)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.ops.keys().map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Check `params` against what `name` declares it needs.
    ///
    /// - every `required_params` entry must be present
    /// - every [`ParamKind::File`] value must name an existing file
    pub fn validate_params(&self, name: &str, params: &InputParameterSet) -> Result<()> {
        let op = self
            .ops
            .get(name)
            .ok_or_else(|| PipelineError::UnknownOperation(name.to_string()))?;

        for required in op.required_params.iter() {
            if params.get(required).is_none() {
                return Err(PipelineError::MissingParameter {
                    op: name.to_string(),
                    param: required.clone(),
                });
            }
        }

        for (param, value) in params.iter() {
            if value.kind == ParamKind::File && !Path::new(&value.value).is_file() {
                return Err(PipelineError::MissingInput(format!(
                    "file parameter '{param}' of operation '{name}' points to missing {}",
                    value.value
                )));
            }
        }

        Ok(())
    }
}
