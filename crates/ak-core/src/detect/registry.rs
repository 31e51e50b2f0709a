//! Name → function registry.
//!
//! Dispatch only looks names up; adding a function never touches this file.

use ak_common::DetectionError;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

use super::{Benford, DetectionFunction, Duplicates, Gaps, Outliers, ParamSchema};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("detection function {name} is already registered")]
    DuplicateName { name: String },

    #[error("detection function name must be non-empty")]
    EmptyName,
}

/// Catalog listing for one function.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CatalogEntry {
    pub name: String,
    pub description: String,
    pub params: ParamSchema,
}

#[derive(Clone, Default)]
pub struct Registry {
    functions: BTreeMap<String, Arc<dyn DetectionFunction>>,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("functions", &self.functions.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Registry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with DUPLICATES, OUTLIERS, BENFORD and GAPS.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        let builtins: [Arc<dyn DetectionFunction>; 4] = [
            Arc::new(Duplicates),
            Arc::new(Outliers),
            Arc::new(Benford),
            Arc::new(Gaps),
        ];
        for function in builtins {
            let name = function.name().to_string();
            registry.functions.insert(name, function);
        }
        registry
    }

    pub fn register(&mut self, function: Arc<dyn DetectionFunction>) -> Result<(), RegistryError> {
        let name = function.name().to_string();
        if name.trim().is_empty() {
            return Err(RegistryError::EmptyName);
        }
        if self.functions.contains_key(&name) {
            return Err(RegistryError::DuplicateName { name });
        }
        self.functions.insert(name, function);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn DetectionFunction>, DetectionError> {
        self.functions
            .get(name)
            .cloned()
            .ok_or_else(|| DetectionError::NotFound {
                name: name.to_string(),
            })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.functions.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    /// Every registered function with its parameter schema, sorted by name.
    pub fn catalog(&self) -> Vec<CatalogEntry> {
        self.functions
            .values()
            .map(|f| CatalogEntry {
                name: f.name().to_string(),
                description: f.description().to_string(),
                params: f.param_schema(),
            })
            .collect()
    }
}
