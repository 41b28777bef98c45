//! TOML registry configuration loader.
//!
//! A registry file selects which metrics run and may retarget granularity,
//! mart tables, policies, or rollups. Fields omitted from an entry default
//! from the built-in catalog entry for the referenced formula. A file with
//! no `[[metric]]` entries selects the entire built-in catalog.
//!
//! ```toml
//! base_currency = "KRW"
//!
//! [[metric]]
//! name = "days_on_hand"
//! formula = "days_on_hand"
//! mart_table = "mart_inventory_health"
//! ```

use std::fs;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

use super::catalog::{builtin_specs, DEFAULT_BASE_CURRENCY};
use super::{ExceptionPolicy, FormulaRef, InputKind, MetricRegistry, MetricSpec, RegistryError};
use crate::facts::Granularity;

#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("Failed to read registry file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse registry file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("No built-in catalog entry for formula referenced by metric '{0}'")]
    UnknownFormula(String),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

#[derive(Debug, Deserialize)]
struct RegistryFile {
    #[serde(default)]
    base_currency: Option<String>,
    #[serde(default)]
    metric: Vec<MetricEntry>,
}

#[derive(Debug, Deserialize)]
struct MetricEntry {
    name: String,
    formula: FormulaRef,
    #[serde(default)]
    granularity: Option<Vec<String>>,
    #[serde(default)]
    inputs: Option<Vec<InputKind>>,
    #[serde(default)]
    depends_on: Option<Vec<String>>,
    #[serde(default)]
    policy: Option<ExceptionPolicy>,
    #[serde(default)]
    mart_table: Option<String>,
    #[serde(default)]
    rollup: Option<Vec<String>>,
}

impl MetricEntry {
    fn into_spec(self, defaults: &MetricSpec) -> MetricSpec {
        MetricSpec {
            name: self.name,
            granularity: self
                .granularity
                .map(Granularity::new)
                .unwrap_or_else(|| defaults.granularity.clone()),
            required_inputs: self.inputs.unwrap_or_else(|| defaults.required_inputs.clone()),
            depends_on: self.depends_on.unwrap_or_else(|| defaults.depends_on.clone()),
            formula: self.formula,
            policy: self.policy.unwrap_or_else(|| defaults.policy.clone()),
            mart_table: self.mart_table.unwrap_or_else(|| defaults.mart_table.clone()),
            rollup: self.rollup.or_else(|| defaults.rollup.clone()),
        }
    }
}

/// Parse registry TOML text into a validated registry.
pub fn from_toml_str(text: &str) -> Result<MetricRegistry, LoaderError> {
    let file: RegistryFile = toml::from_str(text)?;
    let builtin = builtin_specs();

    let specs = if file.metric.is_empty() {
        builtin
    } else {
        let mut specs = Vec::with_capacity(file.metric.len());
        for entry in file.metric {
            let defaults = builtin
                .iter()
                .find(|s| s.formula == entry.formula)
                .ok_or_else(|| LoaderError::UnknownFormula(entry.name.clone()))?;
            specs.push(entry.into_spec(defaults));
        }
        specs
    };

    let base_currency = file
        .base_currency
        .unwrap_or_else(|| DEFAULT_BASE_CURRENCY.to_string());
    Ok(MetricRegistry::new(specs, base_currency)?)
}

/// Load and validate a registry file from disk.
pub fn load(path: &Path) -> Result<MetricRegistry, LoaderError> {
    let text = fs::read_to_string(path)?;
    from_toml_str(&text)
}
