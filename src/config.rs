//! Engine configuration.
//!
//! Loaded from a JSON file (every field optional), then adjusted by
//! environment variables:
//!
//! | variable | field |
//! |---|---|
//! | `COMPANY_RESOLUTION_FUZZY_THRESHOLD` | `matcher.fuzzy_threshold` |
//! | `COMPANY_RESOLUTION_BATCH_LIMIT` | `batch.default_limit` |
//! | `COMPANY_RESOLUTION_TIE_BREAK` | `tie_break` |

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::company::{Classification, SourceKind};
use crate::error::{ResolutionError, ResolutionResult, ValidationError};
use crate::matcher::MatcherConfig;
use crate::selector::TieBreak;

/// Environment variable overriding the fuzzy threshold.
pub const ENV_FUZZY_THRESHOLD: &str = "COMPANY_RESOLUTION_FUZZY_THRESHOLD";
/// Environment variable overriding the batch limit.
pub const ENV_BATCH_LIMIT: &str = "COMPANY_RESOLUTION_BATCH_LIMIT";
/// Environment variable overriding the tie-break policy.
pub const ENV_TIE_BREAK: &str = "COMPANY_RESOLUTION_TIE_BREAK";

/// Which clusters batch auto-merge consumes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchScope {
    /// Domain clusters only, the strongest signal.
    #[default]
    Domain,
    /// Domain and name clusters.
    All,
}

/// Batch auto-merge settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Maximum clusters per run when the caller gives no limit.
    pub default_limit: usize,
    /// Which clusters batch runs consume.
    pub scope: BatchScope,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            default_limit: 50,
            scope: BatchScope::Domain,
        }
    }
}

/// Legacy consolidation settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationConfig {
    /// Sources from most to least trusted. Scalar fields take the first
    /// non-empty value in this order.
    pub source_priority: Vec<SourceKind>,
    /// Classification every migrated record is reset to.
    pub default_classification: Classification,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            source_priority: vec![
                SourceKind::ExternalSync,
                SourceKind::ManualEntry,
                SourceKind::BulkImport,
            ],
            default_classification: Classification::default(),
        }
    }
}

impl MigrationConfig {
    /// Rank of a source in the priority list (lower wins). Unlisted sources
    /// sort last.
    #[must_use]
    pub fn rank(&self, source: SourceKind) -> usize {
        self.source_priority
            .iter()
            .position(|s| *s == source)
            .unwrap_or(self.source_priority.len())
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolutionConfig {
    /// Clustering thresholds.
    pub matcher: MatcherConfig,
    /// Primary selection tie-break.
    pub tie_break: TieBreak,
    /// Batch auto-merge settings.
    pub batch: BatchConfig,
    /// Legacy consolidation settings.
    pub migration: MigrationConfig,
}

impl ResolutionConfig {
    /// Reads a JSON configuration file. Missing fields take defaults.
    ///
    /// # Errors
    /// Returns `InvalidConfig` if the file cannot be read or parsed.
    pub fn from_json_file(path: impl AsRef<Path>) -> ResolutionResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| invalid_config(format!(
            "cannot read {}: {e}",
            path.display()
        )))?;
        serde_json::from_str(&raw)
            .map_err(|e| invalid_config(format!("cannot parse {}: {e}", path.display())))
    }

    /// Applies overrides from the process environment.
    #[must_use]
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Applies overrides from `lookup`. Unparseable values are logged and
    /// ignored.
    #[must_use]
    pub fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(raw) = lookup(ENV_FUZZY_THRESHOLD) {
            match raw.trim().parse::<u8>() {
                Ok(value) => self.matcher.fuzzy_threshold = value,
                Err(_) => tracing::warn!(key = ENV_FUZZY_THRESHOLD, value = %raw, "ignoring invalid override"),
            }
        }
        if let Some(raw) = lookup(ENV_BATCH_LIMIT) {
            match raw.trim().parse::<usize>() {
                Ok(value) if value > 0 => self.batch.default_limit = value,
                _ => tracing::warn!(key = ENV_BATCH_LIMIT, value = %raw, "ignoring invalid override"),
            }
        }
        if let Some(raw) = lookup(ENV_TIE_BREAK) {
            match TieBreak::parse(&raw) {
                Some(value) => self.tie_break = value,
                None => tracing::warn!(key = ENV_TIE_BREAK, value = %raw, "ignoring invalid override"),
            }
        }
        self
    }

    /// Checks cross-field constraints.
    ///
    /// # Errors
    /// Returns `InvalidConfig` for a threshold above 100, a zero batch
    /// limit, or an empty or repeating source priority list.
    pub fn validate(&self) -> ResolutionResult<()> {
        if self.matcher.fuzzy_threshold > 100 {
            return Err(invalid_config(format!(
                "matcher.fuzzy_threshold must be within 0..=100 (got {})",
                self.matcher.fuzzy_threshold
            )));
        }
        if self.batch.default_limit == 0 {
            return Err(invalid_config("batch.default_limit must be positive".to_string()));
        }
        if self.migration.source_priority.is_empty() {
            return Err(invalid_config(
                "migration.source_priority must list at least one source".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        for source in &self.migration.source_priority {
            if !seen.insert(source) {
                return Err(invalid_config(format!(
                    "migration.source_priority lists {source} twice"
                )));
            }
        }
        Ok(())
    }
}

fn invalid_config(reason: String) -> ResolutionError {
    ValidationError::InvalidConfig { reason }.into()
}
