//! Application configuration structures.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{AppError, Result};
use crate::models::category::{CategorySpec, INITIAL_LOWER, INITIAL_UPPER, Layout};

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Source website settings
    #[serde(default)]
    pub source: SourceConfig,

    /// HTTP and connectivity probe settings
    #[serde(default)]
    pub http: HttpConfig,

    /// Snapshot store settings
    #[serde(default)]
    pub storage: StorageConfig,

    /// Category definitions
    #[serde(default = "CategorySpec::builtin")]
    pub categories: Vec<CategorySpec>,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Render the configuration as TOML.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Look up a category by id.
    pub fn category(&self, id: &str) -> Result<&CategorySpec> {
        CategorySpec::find(&self.categories, id)
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        Url::parse(&self.source.base_url)
            .map_err(|e| AppError::validation(format!("source.base_url is invalid: {e}")))?;
        if self.http.user_agent.trim().is_empty() {
            return Err(AppError::validation("http.user_agent is empty"));
        }
        if self.http.timeout_secs == 0 {
            return Err(AppError::validation("http.timeout_secs must be > 0"));
        }
        if self.http.probe_timeout_secs == 0 {
            return Err(AppError::validation("http.probe_timeout_secs must be > 0"));
        }
        Url::parse(&self.http.probe_url)
            .map_err(|e| AppError::validation(format!("http.probe_url is invalid: {e}")))?;
        if self.storage.max_age_days == 0 {
            return Err(AppError::validation("storage.max_age_days must be > 0"));
        }
        if self.categories.is_empty() {
            return Err(AppError::validation("No categories defined"));
        }

        let mut ids = HashSet::new();
        for category in &self.categories {
            if !ids.insert(category.id.to_ascii_lowercase()) {
                return Err(AppError::validation(format!(
                    "duplicate category id '{}'",
                    category.id
                )));
            }
            Self::validate_category(category)?;
        }
        Ok(())
    }

    fn validate_category(category: &CategorySpec) -> Result<()> {
        if category.id.trim().is_empty() || category.id.contains(['/', '\\']) {
            return Err(AppError::validation(format!(
                "category id '{}' must be a non-empty path segment",
                category.id
            )));
        }
        match &category.layout {
            Layout::Paginated { url_template, .. }
                if !url_template.contains(INITIAL_LOWER) && !url_template.contains(INITIAL_UPPER) =>
            {
                return Err(AppError::validation(format!(
                    "category '{}': url_template has no initial placeholder",
                    category.id
                )));
            }
            Layout::Sections { sections } if sections.is_empty() => {
                return Err(AppError::validation(format!(
                    "category '{}' has no sections",
                    category.id
                )));
            }
            // Link listings carry fixed columns
            Layout::LinkIndex { .. } => return Ok(()),
            _ => {}
        }
        if category.columns.is_empty() {
            return Err(AppError::validation(format!(
                "category '{}' has no columns",
                category.id
            )));
        }
        let mut names = HashSet::new();
        for name in category.column_names() {
            if !names.insert(name.clone()) {
                return Err(AppError::validation(format!(
                    "category '{}': duplicate column '{}'",
                    category.id, name
                )));
            }
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            source: SourceConfig::default(),
            http: HttpConfig::default(),
            storage: StorageConfig::default(),
            categories: CategorySpec::builtin(),
        }
    }
}

/// Source website settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Base URL every category path is resolved against
    #[serde(default = "defaults::base_url")]
    pub base_url: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::base_url(),
        }
    }
}

/// HTTP client and connectivity probe settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// Delay between page requests in milliseconds
    #[serde(default = "defaults::request_delay")]
    pub request_delay_ms: u64,

    /// Well-known host probed before any live collection
    #[serde(default = "defaults::probe_url")]
    pub probe_url: String,

    /// Probe timeout in seconds
    #[serde(default = "defaults::probe_timeout")]
    pub probe_timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
            request_delay_ms: defaults::request_delay(),
            probe_url: defaults::probe_url(),
            probe_timeout_secs: defaults::probe_timeout(),
        }
    }
}

/// Snapshot store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root directory of the snapshot store
    #[serde(default = "defaults::snapshot_dir")]
    pub snapshot_dir: PathBuf,

    /// Snapshots older than this are stale
    #[serde(default = "defaults::max_age_days")]
    pub max_age_days: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            snapshot_dir: defaults::snapshot_dir(),
            max_age_days: defaults::max_age_days(),
        }
    }
}

mod defaults {
    use std::path::PathBuf;

    // Source defaults
    pub fn base_url() -> String {
        "http://www.railwaycodes.org.uk/".into()
    }

    // HTTP defaults
    pub fn user_agent() -> String {
        "Mozilla/5.0 (compatible; railcodes/0.1)".into()
    }
    pub fn timeout() -> u64 {
        30
    }
    pub fn request_delay() -> u64 {
        100
    }
    pub fn probe_url() -> String {
        "https://www.google.com/".into()
    }
    pub fn probe_timeout() -> u64 {
        5
    }

    // Storage defaults
    pub fn snapshot_dir() -> PathBuf {
        PathBuf::from("data")
    }
    pub fn max_age_days() -> u32 {
        30
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::category::ColumnSpec;

    #[test]
    fn validate_default_config_ok() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn validate_rejects_empty_user_agent() {
        let mut config = Config::default();
        config.http.user_agent = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_bad_base_url() {
        let mut config = Config::default();
        config.source.base_url = "not a url".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_duplicate_categories() {
        let mut config = Config::default();
        let first = config.categories[0].clone();
        config.categories.push(first);
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_template_without_placeholder() {
        let mut config = Config::default();
        config.categories[0].layout = Layout::Paginated {
            url_template: "elrs/elr.shtm".into(),
            excluded_initials: Vec::new(),
            catalogue_path: None,
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_duplicate_columns() {
        let mut config = Config::default();
        config.categories[0].columns.push(ColumnSpec::text("ELR"));
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_note_column_clash() {
        let mut config = Config::default();
        config.categories[0]
            .columns
            .push(ColumnSpec::text("Remarks").with_note_column("Datum"));
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_empty_sections() {
        let mut config = Config::default();
        config.categories[0].layout = Layout::Sections {
            sections: Vec::new(),
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            [storage]
            snapshot_dir = "/var/lib/railcodes"

            [http]
            timeout_secs = 10
            "#,
        )
        .unwrap();
        assert_eq!(config.storage.snapshot_dir, PathBuf::from("/var/lib/railcodes"));
        assert_eq!(config.storage.max_age_days, 30);
        assert_eq!(config.http.timeout_secs, 10);
        assert_eq!(config.http.probe_timeout_secs, 5);
        assert_eq!(config.categories, CategorySpec::builtin());
    }

    #[test]
    fn categories_can_be_declared_in_toml() {
        let config: Config = toml::from_str(
            r#"
            [[categories]]
            id = "tunnels"
            name = "Railway tunnel lengths"
            data_key = "Tunnels"
            layout = { type = "paginated", url_template = "tunnels/tunnels{initial}.shtm", excluded_initials = ["x"] }

            [[categories.columns]]
            name = "Name"

            [[categories.columns]]
            name = "Length"
            kind = "float"
            "#,
        )
        .unwrap();
        assert!(config.validate().is_ok());
        let tunnels = config.category("tunnels").unwrap();
        assert_eq!(tunnels.initials().len(), 25);
        assert_eq!(tunnels.notes_key, "Notes");
        assert!(tunnels.columns[1].notes);
    }

    #[test]
    fn load_or_default_falls_back() {
        let config = Config::load_or_default("/nonexistent/config.toml");
        assert_eq!(config.source.base_url, "http://www.railwaycodes.org.uk/");
    }

    #[test]
    fn round_trips_through_toml() {
        let config = Config::default();
        let text = config.to_toml().unwrap();
        let back: Config = toml::from_str(&text).unwrap();
        assert_eq!(back.categories, config.categories);
    }
}
