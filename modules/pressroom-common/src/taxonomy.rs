use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::types::Classification;

const BUILTIN_TAXONOMY: &str = include_str!("../data/taxonomy.toml");

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TaxonomyFile {
    #[serde(default)]
    ministry: Vec<MinistryEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct MinistryEntry {
    name: String,
    #[serde(default)]
    audience: Vec<String>,
    #[serde(default)]
    category: Vec<String>,
}

/// Read-only ministry → (audiences, categories) table.
///
/// Built once at startup and shared by reference; there is no way to mutate
/// it after construction.
#[derive(Debug, Clone, Default)]
pub struct Taxonomy {
    entries: HashMap<String, Classification>,
}

impl Taxonomy {
    /// The table compiled into the binary.
    pub fn builtin() -> Result<Self> {
        Self::from_toml_str(BUILTIN_TAXONOMY).context("Failed to parse built-in taxonomy")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read taxonomy file: {}", path.display()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("Failed to parse taxonomy file: {}", path.display()))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let file: TaxonomyFile = toml::from_str(content)?;
        let entries = file
            .ministry
            .into_iter()
            .map(|m| {
                (
                    m.name.trim().to_string(),
                    Classification {
                        audiences: m.audience,
                        categories: m.category,
                    },
                )
            })
            .collect();
        Ok(Self { entries })
    }

    /// Tags for a ministry. Unknown ministries get an empty classification.
    pub fn classify(&self, ministry: &str) -> Classification {
        self.entries
            .get(ministry.trim())
            .cloned()
            .unwrap_or_default()
    }

    pub fn contains(&self, ministry: &str) -> bool {
        self.entries.contains_key(ministry.trim())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_table_loads_every_ministry() {
        let taxonomy = Taxonomy::builtin().unwrap();
        assert_eq!(taxonomy.len(), 91);
        assert!(taxonomy.contains("Ministry of Finance"));
    }

    #[test]
    fn finance_is_tagged_as_economy() {
        let taxonomy = Taxonomy::builtin().unwrap();
        let tags = taxonomy.classify("Ministry of Finance");
        assert!(tags.categories.iter().any(|c| c == "Economy & Finance"));
        assert!(tags.audiences.iter().any(|a| a == "Businesses & Industry"));
    }

    #[test]
    fn unknown_ministry_has_empty_classification() {
        let taxonomy = Taxonomy::builtin().unwrap();
        assert!(taxonomy.classify("Ministry of Silly Walks").is_empty());
    }

    #[test]
    fn lookup_ignores_surrounding_whitespace() {
        let taxonomy = Taxonomy::from_toml_str(
            r#"
            [[ministry]]
            name = "Ministry of Coal"
            audience = ["Businesses & Industry"]
            category = ["Energy"]
            "#,
        )
        .unwrap();
        assert_eq!(taxonomy.classify("  Ministry of Coal ").categories, vec!["Energy"]);
    }

    #[test]
    fn rejects_unknown_fields() {
        let err = Taxonomy::from_toml_str(
            r#"
            [[ministry]]
            name = "X"
            audiences = ["typo"]
            "#,
        );
        assert!(err.is_err());
    }
}
