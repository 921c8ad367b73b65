//! Report serialization for the command line.

use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::Serialize;

pub mod yaml;

pub use yaml::to_yaml;

/// How a command prints its report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable summary.
    #[default]
    Text,
    /// YAML document.
    Yaml,
    /// Pretty-printed JSON.
    Json,
}

/// Serializes `data` in a machine format, or `None` for [`OutputFormat::Text`].
pub fn render<T: Serialize>(data: &T, format: OutputFormat) -> Result<Option<String>> {
    match format {
        OutputFormat::Text => Ok(None),
        OutputFormat::Yaml => to_yaml(data).map(Some),
        OutputFormat::Json => serde_json::to_string_pretty(data)
            .map(Some)
            .context("Failed to serialize to JSON"),
    }
}
