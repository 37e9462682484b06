//! Explorer configuration

use std::path::Path;
use std::time::Duration;
use serde::{Serialize, Deserialize};

use ax_core::Dimension;
use crate::sources::{Granularity, SourceLayout, SourceLocator};
use crate::{DataError, Result};

/// Settings for one explorer session.
///
/// Every field has a default, so a config file only needs the keys it
/// changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExplorerConfig {
    /// Dataset root, a URL or a directory
    pub base: String,

    pub granularity: Granularity,

    /// Dimension of the top-level entity table
    pub dataset: Dimension,

    /// Rows per page of the entity table
    pub page_size: usize,

    /// Rows per page of the contracts tab
    pub contracts_page_size: usize,

    /// Rows per related-entity tab
    pub related_limit: usize,

    /// Quiet period before a table refresh is dispatched
    pub debounce_ms: u64,

    /// Keep downloaded files in memory between queries
    pub cache_sources: bool,
    pub cache_entries: usize,

    pub request_timeout_secs: u64,
}

impl Default for ExplorerConfig {
    fn default() -> Self {
        Self {
            base: "data".to_string(),
            granularity: Granularity::AllTime,
            dataset: Dimension::Contractor,
            page_size: 25,
            contracts_page_size: 20,
            related_limit: 10,
            debounce_ms: 1000,
            cache_sources: false,
            cache_entries: 16,
            request_timeout_secs: 30,
        }
    }
}

impl ExplorerConfig {
    /// Load from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)
            .map_err(|e| DataError::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        tracing::info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 || self.contracts_page_size == 0 {
            return Err(DataError::Config("page sizes must be positive".into()));
        }
        if self.related_limit == 0 {
            return Err(DataError::Config("related_limit must be positive".into()));
        }
        Ok(())
    }

    pub fn layout(&self) -> SourceLayout {
        SourceLayout::new(SourceLocator::parse(&self.base), self.granularity)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: ExplorerConfig = serde_json::from_str(
            r#"{ "base": "https://stats.example.org/awards", "dataset": "area",
                 "granularity": { "kind": "quarter", "year": 2023, "quarter": 2 } }"#,
        )
        .unwrap();

        assert_eq!(config.dataset, Dimension::Area);
        assert_eq!(config.page_size, 25);
        assert_eq!(config.contracts_page_size, 20);
        assert_eq!(config.debounce(), Duration::from_millis(1000));
        assert_eq!(
            config.layout().facts().to_string(),
            "https://stats.example.org/awards/quarterly/year_2023_q2/facts.arrow"
        );
    }

    #[test]
    fn test_zero_page_size_is_rejected() {
        let config = ExplorerConfig { page_size: 0, ..Default::default() };
        assert!(matches!(config.validate(), Err(DataError::Config(_))));
    }
}
