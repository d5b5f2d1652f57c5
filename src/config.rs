//! Runtime configuration loaded from environment variables.

use std::path::PathBuf;

use anyhow::Result;

use crate::db::Database;
use crate::import::{Importer, PreserveExisting, ReplaceExisting};
use crate::models::Locale;

pub const DEFAULT_PORT: u16 = 3000;

/// What a forced import does to an application that already exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UpdateMode {
    /// Keep the existing application as is.
    #[default]
    Preserve,
    /// Rebuild it from the descriptor.
    Replace,
}

impl UpdateMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Preserve => "preserve",
            Self::Replace => "replace",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "preserve" => Some(Self::Preserve),
            "replace" => Some(Self::Replace),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Database file (from PIPEPORT_DB). `None` means the platform data dir.
    pub db_path: Option<PathBuf>,
    /// HTTP port (from PIPEPORT_PORT)
    pub port: u16,
    /// Locale used when a request names no supported language
    /// (from PIPEPORT_LOCALE)
    pub locale: Locale,
    /// From PIPEPORT_UPDATE_STRATEGY
    pub update_mode: UpdateMode,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: None,
            port: DEFAULT_PORT,
            locale: Locale::default(),
            update_mode: UpdateMode::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds a config from any variable lookup. Unparseable values fall back
    /// to their default with a warning.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let db_path = lookup("PIPEPORT_DB")
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from);

        let port = match lookup("PIPEPORT_PORT") {
            Some(s) => s.trim().parse::<u16>().unwrap_or_else(|_| {
                tracing::warn!("Invalid PIPEPORT_PORT '{}', using {}", s, DEFAULT_PORT);
                DEFAULT_PORT
            }),
            None => defaults.port,
        };

        let locale = match lookup("PIPEPORT_LOCALE") {
            Some(s) => Locale::from_str(&s).unwrap_or_else(|| {
                tracing::warn!("Unsupported PIPEPORT_LOCALE '{}', using en", s);
                Locale::En
            }),
            None => defaults.locale,
        };

        let update_mode = match lookup("PIPEPORT_UPDATE_STRATEGY") {
            Some(s) => UpdateMode::from_str(&s).unwrap_or_else(|| {
                tracing::warn!("Unknown PIPEPORT_UPDATE_STRATEGY '{}', using preserve", s);
                UpdateMode::Preserve
            }),
            None => defaults.update_mode,
        };

        Self {
            db_path,
            port,
            locale,
            update_mode,
        }
    }

    /// Opens and migrates the configured database.
    pub fn open_database(&self) -> Result<Database> {
        let db = match &self.db_path {
            Some(path) => Database::open(path.clone())?,
            None => Database::open_default()?,
        };
        db.migrate()?;
        Ok(db)
    }

    pub fn importer(&self, db: Database) -> Importer {
        let importer = Importer::new(db);
        match self.update_mode {
            UpdateMode::Preserve => importer.with_update_strategy(PreserveExisting),
            UpdateMode::Replace => importer.with_update_strategy(ReplaceExisting),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn defaults_without_variables() {
        let config = Config::from_lookup(lookup(&[]));
        assert!(config.db_path.is_none());
        assert_eq!(config.port, 3000);
        assert_eq!(config.locale, Locale::En);
        assert_eq!(config.update_mode, UpdateMode::Preserve);
    }

    #[test]
    fn reads_every_variable() {
        let config = Config::from_lookup(lookup(&[
            ("PIPEPORT_DB", "/tmp/pipeport/test.db"),
            ("PIPEPORT_PORT", "8080"),
            ("PIPEPORT_LOCALE", "fr-FR"),
            ("PIPEPORT_UPDATE_STRATEGY", "Replace"),
        ]));
        assert_eq!(config.db_path, Some(PathBuf::from("/tmp/pipeport/test.db")));
        assert_eq!(config.port, 8080);
        assert_eq!(config.locale, Locale::Fr);
        assert_eq!(config.update_mode, UpdateMode::Replace);
    }

    #[test]
    fn invalid_values_fall_back() {
        let config = Config::from_lookup(lookup(&[
            ("PIPEPORT_DB", " "),
            ("PIPEPORT_PORT", "not-a-port"),
            ("PIPEPORT_LOCALE", "de"),
            ("PIPEPORT_UPDATE_STRATEGY", "merge"),
        ]));
        assert!(config.db_path.is_none());
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.locale, Locale::En);
        assert_eq!(config.update_mode, UpdateMode::Preserve);
    }

    #[test]
    fn opens_database_at_configured_path() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            db_path: Some(dir.path().join("nested").join("pipeport.db")),
            ..Config::default()
        };
        let db = config.open_database().unwrap();
        assert!(db.get_all_projects().unwrap().is_empty());
    }
}
