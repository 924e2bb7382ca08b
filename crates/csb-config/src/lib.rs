//! Configuration management for csb.
//!
//! Parses `csb.toml` configuration files with serde and provides
//! auto-discovery of config files in parent directories.
//!
//! CLI settings can be applied during load via [`CliSettings`].
//!
//! ## Example
//!
//! ```toml
//! [sandbox]
//! mode = "iframe"
//! auto_deploy = true
//! query = { fontsize = 12, hidenavigation = 0 }
//!
//! [templates.react-styles]
//! extends = "new"
//! entry = "src/styles.css"
//! ```
//!
//! ## Environment Variable Expansion
//!
//! `sandbox.base_url` supports `${VAR}` and `${VAR:-default}`.
//!
//! ## Deprecated Keys
//!
//! `sandbox.iframe_query` is accepted as an alias of `sandbox.query` and
//! logs a warning. When both are present `query` wins.

mod expand;

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

/// CLI settings that override configuration file values.
///
/// All fields are optional. Only non-None values override the loaded config.
#[derive(Debug, Default)]
pub struct CliSettings {
    /// Override the output mode.
    pub mode: Option<String>,
    /// Override sandbox creation through the API.
    pub auto_deploy: Option<bool>,
    /// Override the hosting service URL.
    pub base_url: Option<String>,
}

/// Configuration filename to search for.
const CONFIG_FILENAME: &str = "csb.toml";

/// Accepted values of `sandbox.mode`.
const MODES: &[&str] = &["meta", "button", "iframe"];

/// Application configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    pub sandbox: SandboxConfig,
    /// Custom templates by identifier.
    pub templates: BTreeMap<String, TemplateConfig>,

    /// Directory relative `file:` templates in `[templates]` resolve
    /// against (set after loading).
    #[serde(skip)]
    pub base_dir: PathBuf,
    /// Path to the config file (set after loading).
    #[serde(skip)]
    pub config_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self::default_with_base(Path::new("."))
    }
}

/// `[sandbox]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// `meta`, `button` or `iframe`.
    pub mode: String,
    pub base_url: String,
    /// Create sandboxes through the API instead of emitting define links.
    pub auto_deploy: bool,
    /// HTTP timeout for API requests.
    pub timeout_secs: u64,
    /// Style merged onto the iframe style.
    pub style: Option<String>,
    /// Base query; replaces the mode's default query.
    pub query: Option<QueryValue>,
    /// Deprecated alias of `query`.
    iframe_query: Option<QueryValue>,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            mode: "meta".to_owned(),
            base_url: "https://codesandbox.io".to_owned(),
            auto_deploy: false,
            timeout_secs: 30,
            style: None,
            query: None,
            iframe_query: None,
        }
    }
}

impl SandboxConfig {
    /// HTTP timeout as a [`Duration`].
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// A query given as a raw string or as a table.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum QueryValue {
    /// `"fontsize=12&hidenavigation=0"`
    Raw(String),
    /// `{ fontsize = 12, hidenavigation = 0 }`
    Table(BTreeMap<String, ScalarValue>),
}

/// A scalar TOML value used as a query parameter.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ScalarValue {
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => f.write_str(s),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Boolean(b) => write!(f, "{b}"),
        }
    }
}

/// A `[templates.<id>]` entry.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct TemplateConfig {
    /// Base template identifier.
    pub extends: String,
    #[serde(default)]
    pub entry: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    /// Extra files by relative path.
    #[serde(default)]
    pub files: BTreeMap<String, String>,
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File not found.
    #[error("Configuration file not found: {}", .0.display())]
    NotFound(PathBuf),
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// TOML parsing error.
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),
    /// Validation error.
    #[error("Configuration error: {0}")]
    Validation(String),
    /// Environment variable error during expansion.
    #[error("Environment variable error in {field}: {message}")]
    EnvVar {
        /// Config field path (e.g., "`sandbox.base_url`").
        field: String,
        /// Error message (e.g., "${`SANDBOX_URL`} not set").
        message: String,
    },
}

/// Require a string field to be non-empty.
fn require_non_empty(value: &str, field: &str) -> Result<(), ConfigError> {
    if value.is_empty() {
        return Err(ConfigError::Validation(format!("{field} cannot be empty")));
    }
    Ok(())
}

/// Require a URL field to use http:// or https:// scheme.
fn require_http_url(url: &str, field: &str) -> Result<(), ConfigError> {
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(ConfigError::Validation(format!(
            "{field} must start with http:// or https://"
        )));
    }
    Ok(())
}

impl Config {
    /// Load configuration from file with optional CLI settings.
    ///
    /// If `config_path` is provided, loads from that file.
    /// Otherwise, searches for `csb.toml` in current directory and parents.
    ///
    /// CLI settings are applied after loading and take precedence over
    /// config file values.
    ///
    /// # Errors
    ///
    /// Returns error if explicit `config_path` doesn't exist, parsing fails
    /// or the resulting configuration is invalid.
    pub fn load(
        config_path: Option<&Path>,
        cli_settings: Option<&CliSettings>,
    ) -> Result<Self, ConfigError> {
        let mut config = if let Some(path) = config_path {
            if !path.exists() {
                return Err(ConfigError::NotFound(path.to_path_buf()));
            }
            Self::load_from_file(path)?
        } else if let Some(discovered) = Self::discover_config() {
            Self::load_from_file(&discovered)?
        } else {
            Self::default_with_cwd()
        };

        if let Some(settings) = cli_settings {
            config.apply_cli_settings(settings);
            config.validate()?;
        }

        Ok(config)
    }

    /// Apply CLI settings to the configuration.
    fn apply_cli_settings(&mut self, settings: &CliSettings) {
        if let Some(mode) = &settings.mode {
            self.sandbox.mode.clone_from(mode);
        }
        if let Some(auto_deploy) = settings.auto_deploy {
            self.sandbox.auto_deploy = auto_deploy;
        }
        if let Some(base_url) = &settings.base_url {
            self.sandbox.base_url.clone_from(base_url);
        }
    }

    /// Search for config file in current directory and parents.
    fn discover_config() -> Option<PathBuf> {
        let mut current = std::env::current_dir().ok()?;
        loop {
            let candidate = current.join(CONFIG_FILENAME);
            if candidate.exists() {
                return Some(candidate);
            }
            if !current.pop() {
                return None;
            }
        }
    }

    fn default_with_cwd() -> Self {
        let cwd = std::env::current_dir().unwrap_or_default();
        Self::default_with_base(&cwd)
    }

    fn default_with_base(base: &Path) -> Self {
        Self {
            sandbox: SandboxConfig::default(),
            templates: BTreeMap::new(),
            base_dir: base.to_path_buf(),
            config_path: None,
        }
    }

    /// Load configuration from a specific file.
    fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Self = toml::from_str(&content)?;

        config.apply_deprecated_aliases();
        config.expand_env_vars()?;

        config.base_dir = path
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
        config.config_path = Some(path.to_path_buf());

        config.validate()?;

        Ok(config)
    }

    /// Map deprecated keys to their replacements.
    fn apply_deprecated_aliases(&mut self) {
        let Some(iframe_query) = self.sandbox.iframe_query.take() else {
            return;
        };
        if self.sandbox.query.is_some() {
            tracing::warn!(
                "sandbox.iframe_query is deprecated and ignored because sandbox.query is set"
            );
        } else {
            tracing::warn!("sandbox.iframe_query is deprecated, use sandbox.query instead");
            self.sandbox.query = Some(iframe_query);
        }
    }

    /// Validate configuration values.
    ///
    /// Called automatically after loading from file.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Validation` if any validation fails.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_sandbox()?;
        self.validate_templates()?;
        Ok(())
    }

    fn validate_sandbox(&self) -> Result<(), ConfigError> {
        if !MODES.contains(&self.sandbox.mode.as_str()) {
            return Err(ConfigError::Validation(format!(
                "sandbox.mode must be one of {}, got \"{}\"",
                MODES.join(", "),
                self.sandbox.mode
            )));
        }

        require_non_empty(&self.sandbox.base_url, "sandbox.base_url")?;
        require_http_url(&self.sandbox.base_url, "sandbox.base_url")?;

        if self.sandbox.timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "sandbox.timeout_secs must be greater than 0".to_owned(),
            ));
        }

        Ok(())
    }

    fn validate_templates(&self) -> Result<(), ConfigError> {
        for (id, template) in &self.templates {
            require_non_empty(&template.extends, &format!("templates.{id}.extends"))?;
            if template.extends == *id {
                return Err(ConfigError::Validation(format!(
                    "templates.{id} cannot extend itself"
                )));
            }
        }
        Ok(())
    }

    /// Expand environment variable references in configuration strings.
    fn expand_env_vars(&mut self) -> Result<(), ConfigError> {
        self.sandbox.base_url = expand::expand_env(&self.sandbox.base_url, "sandbox.base_url")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default_with_base(Path::new("/test"));
        assert_eq!(config.sandbox.mode, "meta");
        assert_eq!(config.sandbox.base_url, "https://codesandbox.io");
        assert!(!config.sandbox.auto_deploy);
        assert_eq!(config.sandbox.timeout(), Duration::from_secs(30));
        assert_eq!(config.sandbox.query, None);
        assert!(config.templates.is_empty());
        assert_eq!(config.base_dir, PathBuf::from("/test"));
    }

    #[test]
    fn test_parse_minimal_config() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.sandbox.mode, "meta");
        config.validate().unwrap();
    }

    #[test]
    fn test_parse_sandbox_config() {
        let toml = r#"
[sandbox]
mode = "iframe"
base_url = "https://sandbox.example.com"
auto_deploy = true
timeout_secs = 5
style = "height: 600px"
query = "fontsize=12&hidenavigation=0"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.sandbox.mode, "iframe");
        assert_eq!(config.sandbox.base_url, "https://sandbox.example.com");
        assert!(config.sandbox.auto_deploy);
        assert_eq!(config.sandbox.timeout(), Duration::from_secs(5));
        assert_eq!(config.sandbox.style.as_deref(), Some("height: 600px"));
        assert_eq!(
            config.sandbox.query,
            Some(QueryValue::Raw("fontsize=12&hidenavigation=0".to_owned()))
        );
    }

    #[test]
    fn test_parse_query_table() {
        let toml = r#"
[sandbox]
query = { fontsize = 12, theme = "light", expanddevtools = true, ratio = 0.5 }
"#;
        let config: Config = toml::from_str(toml).unwrap();
        let Some(QueryValue::Table(table)) = config.sandbox.query else {
            panic!("expected query table");
        };
        let rendered: Vec<(String, String)> = table
            .iter()
            .map(|(k, v)| (k.clone(), v.to_string()))
            .collect();
        assert_eq!(
            rendered,
            vec![
                ("expanddevtools".to_owned(), "true".to_owned()),
                ("fontsize".to_owned(), "12".to_owned()),
                ("ratio".to_owned(), "0.5".to_owned()),
                ("theme".to_owned(), "light".to_owned()),
            ]
        );
    }

    #[test]
    fn test_parse_templates() {
        let toml = r##"
[templates.react-styles]
extends = "new"
entry = "src/styles.css"
title = "Styles"
files = { "README.md" = "# Styles" }

[templates.local]
extends = "file:./templates/local"
"##;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.templates.len(), 2);
        assert_eq!(
            config.templates["react-styles"],
            TemplateConfig {
                extends: "new".to_owned(),
                entry: Some("src/styles.css".to_owned()),
                title: Some("Styles".to_owned()),
                files: [("README.md".to_owned(), "# Styles".to_owned())]
                    .into_iter()
                    .collect(),
            }
        );
        assert_eq!(config.templates["local"].extends, "file:./templates/local");
    }

    #[test]
    fn test_iframe_query_alias() {
        let toml = r#"
[sandbox]
iframe_query = "fontsize=12"
"#;
        let mut config: Config = toml::from_str(toml).unwrap();
        config.apply_deprecated_aliases();

        assert_eq!(
            config.sandbox.query,
            Some(QueryValue::Raw("fontsize=12".to_owned()))
        );
        assert_eq!(config.sandbox.iframe_query, None);
    }

    #[test]
    fn test_query_wins_over_alias() {
        let toml = r#"
[sandbox]
query = "fontsize=14"
iframe_query = "fontsize=12"
"#;
        let mut config: Config = toml::from_str(toml).unwrap();
        config.apply_deprecated_aliases();

        assert_eq!(
            config.sandbox.query,
            Some(QueryValue::Raw("fontsize=14".to_owned()))
        );
    }

    #[test]
    fn test_validate_mode() {
        let mut config = Config::default_with_base(Path::new("/test"));
        config.sandbox.mode = "embed".to_owned();

        let err = config.validate().unwrap_err();

        assert!(matches!(err, ConfigError::Validation(_)));
        assert!(err.to_string().contains("sandbox.mode"));
    }

    #[test]
    fn test_validate_base_url() {
        let mut config = Config::default_with_base(Path::new("/test"));
        config.sandbox.base_url = "codesandbox.io".to_owned();

        let err = config.validate().unwrap_err();

        assert!(err.to_string().contains("http://"));
    }

    #[test]
    fn test_validate_timeout() {
        let mut config = Config::default_with_base(Path::new("/test"));
        config.sandbox.timeout_secs = 0;

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_template_extends() {
        let mut config = Config::default_with_base(Path::new("/test"));
        config
            .templates
            .insert("empty".to_owned(), TemplateConfig::default());
        assert!(
            config
                .validate()
                .unwrap_err()
                .to_string()
                .contains("templates.empty.extends")
        );

        config.templates.insert(
            "empty".to_owned(),
            TemplateConfig {
                extends: "empty".to_owned(),
                ..TemplateConfig::default()
            },
        );
        assert!(
            config
                .validate()
                .unwrap_err()
                .to_string()
                .contains("cannot extend itself")
        );
    }

    #[test]
    fn test_apply_cli_settings() {
        let mut config = Config::default_with_base(Path::new("/test"));
        let settings = CliSettings {
            mode: Some("button".to_owned()),
            auto_deploy: Some(true),
            ..Default::default()
        };

        config.apply_cli_settings(&settings);

        assert_eq!(config.sandbox.mode, "button");
        assert!(config.sandbox.auto_deploy);
        assert_eq!(config.sandbox.base_url, "https://codesandbox.io"); // Unchanged
    }

    #[test]
    fn test_load_from_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("csb.toml");
        std::fs::write(
            &path,
            r#"
[sandbox]
mode = "button"
iframe_query = { view = "preview" }

[templates.demo]
extends = "new"
"#,
        )
        .unwrap();

        let config = Config::load(Some(path.as_path()), None).unwrap();

        assert_eq!(config.sandbox.mode, "button");
        assert_eq!(config.base_dir, temp.path());
        assert_eq!(config.config_path.as_deref(), Some(path.as_path()));
        assert!(matches!(config.sandbox.query, Some(QueryValue::Table(_))));
        assert!(config.templates.contains_key("demo"));
    }

    #[test]
    fn test_load_with_cli_settings_validates() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("csb.toml");
        std::fs::write(&path, "").unwrap();
        let settings = CliSettings {
            mode: Some("popup".to_owned()),
            ..Default::default()
        };

        let err = Config::load(Some(path.as_path()), Some(&settings)).unwrap_err();

        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn test_load_missing_file() {
        let err = Config::load(Some(Path::new("/nonexistent/csb.toml")), None).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }

    #[test]
    fn test_load_invalid_toml() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("csb.toml");
        std::fs::write(&path, "[sandbox\nmode = ").unwrap();

        let err = Config::load(Some(path.as_path()), None).unwrap_err();

        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_load_expands_base_url() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("csb.toml");
        std::fs::write(
            &path,
            "[sandbox]\nbase_url = \"${CSB_TEST_CONFIG_URL:-https://fallback.example.com}\"\n",
        )
        .unwrap();
        // SAFETY: variable name is unique to this test
        unsafe {
            std::env::remove_var("CSB_TEST_CONFIG_URL");
        }

        let config = Config::load(Some(path.as_path()), None).unwrap();

        assert_eq!(config.sandbox.base_url, "https://fallback.example.com");
    }
}
