//! Configuration file management for fitplan.
//!
//! Provides a TOML-based config file at `~/.config/fitplan/config.toml` and a
//! resolution chain: CLI flag > env var > config file > default.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use fitplan_core::{Locale, PipelineConfig};
use fitplan_db::config::DbConfig;

// -----------------------------------------------------------------------
// Config file types
// -----------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
pub struct ConfigFile {
    pub database: DatabaseSection,
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DatabaseSection {
    pub url: String,
}

// -----------------------------------------------------------------------
// Paths
// -----------------------------------------------------------------------

/// Return the fitplan config directory.
///
/// Always uses XDG layout: `$XDG_CONFIG_HOME/fitplan` or `~/.config/fitplan`,
/// also on macOS.
pub fn config_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("fitplan");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("fitplan")
}

/// Return the path to the fitplan config file.
pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

// -----------------------------------------------------------------------
// Read / write
// -----------------------------------------------------------------------

/// Load and parse the config file. Returns an error if it does not exist.
pub fn load_config() -> Result<ConfigFile> {
    load_config_from(&config_path())
}

pub fn load_config_from(path: &Path) -> Result<ConfigFile> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file at {}", path.display()))?;
    let config: ConfigFile = toml::from_str(&contents).context("failed to parse config file")?;
    Ok(config)
}

/// Serialize and write the config file, creating parent dirs as needed.
pub fn save_config(config: &ConfigFile) -> Result<()> {
    save_config_to(&config_path(), config)
}

/// Write `config` to `path`. The file is owner read/write only on Unix.
pub fn save_config_to(path: &Path, config: &ConfigFile) -> Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create config directory {}", dir.display()))?;
    }

    let contents = toml::to_string_pretty(config).context("failed to serialize config")?;
    std::fs::write(path, &contents)
        .with_context(|| format!("failed to write config file at {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(path, perms)
            .with_context(|| format!("failed to set permissions on {}", path.display()))?;
    }

    Ok(())
}

// -----------------------------------------------------------------------
// Resolved config
// -----------------------------------------------------------------------

/// Fully resolved configuration, ready for use.
#[derive(Debug)]
pub struct FitplanConfig {
    pub db_config: DbConfig,
    pub pipeline: PipelineConfig,
}

impl FitplanConfig {
    /// Resolve configuration using the chain: CLI flag > env var > config file > default.
    ///
    /// - DB URL: `cli_db_url` > `FITPLAN_DATABASE_URL` env > `database.url` > `DbConfig::DEFAULT_URL`
    /// - Locale: `cli_locale` > `pipeline.locale` > `es`
    /// - Everything else in `[pipeline]` comes from the file or its defaults.
    ///
    /// A missing config file is not an error.
    pub fn resolve(cli_db_url: Option<&str>, cli_locale: Option<Locale>) -> Result<Self> {
        let file_config = if config_path().exists() {
            Some(load_config()?)
        } else {
            None
        };
        Ok(Self::resolve_with(cli_db_url, cli_locale, file_config))
    }

    fn resolve_with(
        cli_db_url: Option<&str>,
        cli_locale: Option<Locale>,
        file_config: Option<ConfigFile>,
    ) -> Self {
        let db_url = if let Some(url) = cli_db_url {
            url.to_string()
        } else if let Ok(url) = std::env::var(DbConfig::ENV_VAR) {
            url
        } else if let Some(ref cfg) = file_config {
            cfg.database.url.clone()
        } else {
            DbConfig::DEFAULT_URL.to_string()
        };

        let mut pipeline = file_config.map(|c| c.pipeline).unwrap_or_default();
        if let Some(locale) = cli_locale {
            pipeline.locale = locale;
        }

        Self {
            db_config: DbConfig::new(db_url),
            pipeline,
        }
    }
}

// -----------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use fitplan_core::config::ModelPricing;

    fn lock_env() -> std::sync::MutexGuard<'static, ()> {
        crate::test_util::lock_env()
    }

    fn sample() -> ConfigFile {
        ConfigFile {
            database: DatabaseSection {
                url: "postgresql://testhost:5432/testdb".to_string(),
            },
            pipeline: PipelineConfig::default().with_pricing(
                "gpt-test",
                ModelPricing {
                    prompt_per_1k: 0.15,
                    completion_per_1k: 0.6,
                },
            ),
        }
    }

    #[test]
    fn save_and_load_config_roundtrip() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("fitplan").join("config.toml");

        let original = sample();
        save_config_to(&path, &original).unwrap();
        let loaded = load_config_from(&path).unwrap();

        assert_eq!(loaded.database.url, original.database.url);
        assert_eq!(loaded.pipeline, original.pipeline);
    }

    #[test]
    fn pipeline_section_is_optional() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(
            &path,
            "[database]\nurl = \"postgresql://h:5432/db\"\n\n[pipeline]\nlocale = \"en\"\n",
        )
        .unwrap();

        let loaded = load_config_from(&path).unwrap();
        assert_eq!(loaded.pipeline.locale, Locale::En);
        assert_eq!(loaded.pipeline.two_meal_tolerance_kcal, 80.0);

        std::fs::write(&path, "[database]\nurl = \"postgresql://h:5432/db\"\n").unwrap();
        let loaded = load_config_from(&path).unwrap();
        assert_eq!(loaded.pipeline, PipelineConfig::default());
    }

    #[cfg(unix)]
    #[test]
    fn save_config_sets_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        save_config_to(&path, &sample()).unwrap();

        let meta = std::fs::metadata(&path).unwrap();
        assert_eq!(meta.permissions().mode() & 0o777, 0o600);
    }

    #[test]
    fn resolve_with_cli_flag_overrides_all() {
        let _lock = lock_env();
        unsafe { std::env::set_var(DbConfig::ENV_VAR, "postgresql://env:5432/envdb") };

        let config = FitplanConfig::resolve_with(
            Some("postgresql://cli:5432/clidb"),
            Some(Locale::En),
            Some(sample()),
        );
        assert_eq!(config.db_config.database_url, "postgresql://cli:5432/clidb");
        assert_eq!(config.pipeline.locale, Locale::En);

        unsafe { std::env::remove_var(DbConfig::ENV_VAR) };
    }

    #[test]
    fn resolve_with_env_var_overrides_config_file() {
        let _lock = lock_env();
        unsafe { std::env::set_var(DbConfig::ENV_VAR, "postgresql://env:5432/envdb") };

        let config = FitplanConfig::resolve_with(None, None, Some(sample()));
        assert_eq!(config.db_config.database_url, "postgresql://env:5432/envdb");
        assert!(config.pipeline.pricing.contains_key("gpt-test"));

        unsafe { std::env::remove_var(DbConfig::ENV_VAR) };
    }

    #[test]
    fn resolve_uses_config_file_then_default() {
        let _lock = lock_env();
        unsafe { std::env::remove_var(DbConfig::ENV_VAR) };

        let config = FitplanConfig::resolve_with(None, None, Some(sample()));
        assert_eq!(config.db_config.database_url, "postgresql://testhost:5432/testdb");

        let config = FitplanConfig::resolve_with(None, None, None);
        assert_eq!(config.db_config.database_url, DbConfig::DEFAULT_URL);
        assert_eq!(config.pipeline, PipelineConfig::default());
    }

    #[test]
    fn config_path_ends_with_expected_filename() {
        let path = config_path();
        assert!(
            path.ends_with("fitplan/config.toml"),
            "unexpected config path: {}",
            path.display()
        );
    }
}
