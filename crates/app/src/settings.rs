//! Application settings.
//!
//! Settings are layered, lowest precedence first: built-in defaults, the
//! config file (`harbor.toml` or `--config`), then `HARBOR_*` environment
//! variables. Command-line flags are applied on top by the commands.
//!
//! Request validation limits live in a `[validation]` table of the config
//! file.

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use harbor_application::ValidationRules;
use harbor_infrastructure::{DEFAULT_MAX_DOCUMENT_BYTES, DEFAULT_MAX_FAILURE_RATIO};
use serde::{Deserialize, Serialize};

/// Config file read from the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "harbor.toml";

/// Prefix of the environment variables that override settings.
pub const ENV_PREFIX: &str = "HARBOR";

/// Harbor settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// `SQLite` database file.
    pub database_path: PathBuf,
    /// Tolerated share of failed items per import.
    pub max_failure_ratio: f64,
    /// Requests resolved and validated at once.
    pub concurrency_limit: usize,
    /// Largest accepted document, in bytes.
    pub max_document_bytes: usize,
    /// Log filter directive used when `RUST_LOG` is unset.
    pub log: String,
    /// Limits applied to every resolved request.
    pub validation: ValidationRules,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("harbor.db"),
            max_failure_ratio: DEFAULT_MAX_FAILURE_RATIO,
            concurrency_limit: std::thread::available_parallelism().map_or(4, NonZeroUsize::get),
            max_document_bytes: DEFAULT_MAX_DOCUMENT_BYTES,
            log: "info".to_string(),
            validation: ValidationRules::default(),
        }
    }
}

impl Settings {
    /// Loads settings from the config file and the process environment.
    ///
    /// An explicit `path` must exist; the default `harbor.toml` is optional.
    ///
    /// # Errors
    ///
    /// Returns an error if a source cannot be read or the result is invalid.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_env(path, Environment::with_prefix(ENV_PREFIX))
    }

    /// Loads settings using the given environment source.
    ///
    /// # Errors
    ///
    /// Returns an error if a source cannot be read or the result is invalid.
    pub fn load_with_env(path: Option<&Path>, env: Environment) -> Result<Self> {
        let file = match path {
            Some(path) => File::from(path).required(true),
            None => File::from(Path::new(DEFAULT_CONFIG_FILE)).required(false),
        };

        let settings: Self = Config::builder()
            .add_source(file)
            .add_source(env.try_parsing(true))
            .build()
            .context("Failed to load settings")?
            .try_deserialize()
            .context("Failed to parse settings")?;

        settings.validate()?;
        Ok(settings)
    }

    /// Replaces the database path.
    #[must_use]
    pub fn with_database_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.database_path = path.into();
        self
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first invalid setting.
    pub fn validate(&self) -> Result<()> {
        if self.database_path.as_os_str().is_empty() {
            anyhow::bail!("database_path must not be empty");
        }
        validate_failure_ratio(self.max_failure_ratio)?;
        validate_concurrency(self.concurrency_limit)?;
        if self.max_document_bytes == 0 {
            anyhow::bail!("max_document_bytes must be > 0");
        }
        if self.validation.allowed_methods.is_empty() {
            anyhow::bail!("validation.allowed_methods must not be empty");
        }
        if self.validation.allowed_schemes.is_empty() {
            anyhow::bail!("validation.allowed_schemes must not be empty");
        }
        Ok(())
    }
}

/// Checks that a failure ratio lies in `[0, 1]`.
///
/// # Errors
///
/// Returns an error for values outside the range or NaN.
pub fn validate_failure_ratio(ratio: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&ratio) {
        anyhow::bail!("max_failure_ratio must be in [0.0, 1.0], got {ratio}");
    }
    Ok(())
}

/// Checks that a concurrency limit is at least 1.
///
/// # Errors
///
/// Returns an error for 0.
pub fn validate_concurrency(limit: usize) -> Result<()> {
    if limit == 0 {
        anyhow::bail!("concurrency_limit must be >= 1");
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use harbor_domain::request::HttpMethod;
    use pretty_assertions::assert_eq;

    fn env(vars: &[(&str, &str)]) -> Environment {
        Environment::with_prefix(ENV_PREFIX).source(Some(
            vars.iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
        ))
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.database_path, PathBuf::from("harbor.db"));
        assert!((settings.max_failure_ratio - 0.5).abs() < f64::EPSILON);
        assert!(settings.concurrency_limit >= 1);
        assert_eq!(settings.log, "info");
        assert_eq!(settings.validation, ValidationRules::default());
        settings.validate().unwrap();
    }

    #[test]
    fn test_env_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("harbor.toml");
        std::fs::write(
            &path,
            "database_path = \"from-file.db\"\nmax_failure_ratio = 0.2\nconcurrency_limit = 3\n",
        )
        .unwrap();

        let settings = Settings::load_with_env(
            Some(&path),
            env(&[("HARBOR_MAX_FAILURE_RATIO", "0.75"), ("HARBOR_LOG", "debug")]),
        )
        .unwrap();

        assert_eq!(settings.database_path, PathBuf::from("from-file.db"));
        assert!((settings.max_failure_ratio - 0.75).abs() < f64::EPSILON);
        assert_eq!(settings.concurrency_limit, 3);
        assert_eq!(settings.log, "debug");
    }

    #[test]
    fn test_validation_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("harbor.toml");
        std::fs::write(
            &path,
            "[validation]\nallowed_methods = [\"GET\", \"TRACE\"]\nallowed_schemes = [\"https\"]\nmax_url_length = 100\n",
        )
        .unwrap();

        let settings = Settings::load_with_env(Some(&path), env(&[])).unwrap();
        assert_eq!(
            settings.validation,
            ValidationRules {
                allowed_methods: vec![HttpMethod::Get, HttpMethod::Trace],
                allowed_schemes: vec!["https".to_string()],
                max_url_length: 100,
                ..ValidationRules::default()
            }
        );

        std::fs::write(&path, "[validation]\nallowed_schemes = []\n").unwrap();
        let err = Settings::load_with_env(Some(&path), env(&[])).unwrap_err();
        assert!(err.to_string().contains("allowed_schemes"));
    }

    #[test]
    fn test_explicit_file_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(Settings::load_with_env(Some(&missing), env(&[])).is_err());
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = Settings::load_with_env(None, env(&[("HARBOR_MAX_FAILURE_RATIO", "1.5")]))
            .unwrap_err();
        assert!(err.to_string().contains("max_failure_ratio"));

        let err = Settings::load_with_env(None, env(&[("HARBOR_CONCURRENCY_LIMIT", "0")]))
            .unwrap_err();
        assert!(err.to_string().contains("concurrency_limit"));

        assert!(validate_failure_ratio(f64::NAN).is_err());
    }
}
