use crate::core::{MigrateError, Result};
use std::path::PathBuf;

pub const DEFAULT_BATCH_SIZE: u32 = 500;

/// Run configuration.
///
/// Values come from the environment (optionally seeded from a `.env`
/// file) and can be overridden per invocation through [`ConfigOverrides`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationConfig {
    pub source_uri: String,
    pub target_uri: String,
    pub source_db: String,
    pub target_db: String,
    pub batch_size: u32,
    pub dry_run: bool,
    /// Accepted for compatibility; migrations are compiled in.
    pub migrations_dir: Option<PathBuf>,
}

/// Per-invocation values that take precedence over the environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
    pub source_uri: Option<String>,
    pub target_uri: Option<String>,
    pub source_db: Option<String>,
    pub target_db: Option<String>,
    pub batch_size: Option<u32>,
    pub dry_run: Option<bool>,
    pub migrations_dir: Option<PathBuf>,
}

impl MigrationConfig {
    pub fn new() -> Self {
        Self {
            source_uri: String::new(),
            target_uri: String::new(),
            source_db: String::new(),
            target_db: String::new(),
            batch_size: DEFAULT_BATCH_SIZE,
            dry_run: false,
            migrations_dir: None,
        }
    }

    pub fn source_uri(mut self, uri: &str) -> Self {
        self.source_uri = uri.to_string();
        self
    }

    pub fn target_uri(mut self, uri: &str) -> Self {
        self.target_uri = uri.to_string();
        self
    }

    pub fn source_db(mut self, name: &str) -> Self {
        self.source_db = name.to_string();
        self
    }

    pub fn target_db(mut self, name: &str) -> Self {
        self.target_db = name.to_string();
        self
    }

    pub fn batch_size(mut self, size: u32) -> Self {
        self.batch_size = size;
        self
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Reads the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads configuration through `lookup`, so callers (and tests) can
    /// supply variables without touching the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|value| !value.is_empty());

        let source_db = var("SOURCE_DB_NAME").unwrap_or_default();
        let batch_size = match var("BATCH_SIZE") {
            Some(raw) => parse_batch_size(&raw)?,
            None => DEFAULT_BATCH_SIZE,
        };
        let dry_run = matches!(var("DRY_RUN").as_deref(), Some("true") | Some("1"));

        Ok(Self {
            source_uri: var("SOURCE_MONGO_URI")
                .or_else(|| var("MONGO_URI"))
                .unwrap_or_default(),
            target_uri: var("TARGET_MONGO_URI")
                .or_else(|| var("MONGO_URI"))
                .unwrap_or_default(),
            target_db: var("TARGET_DB_NAME").unwrap_or_else(|| source_db.clone()),
            source_db,
            batch_size,
            dry_run,
            migrations_dir: var("MIGRATIONS_DIR").map(PathBuf::from),
        })
    }

    pub fn apply(mut self, overrides: ConfigOverrides) -> Self {
        if let Some(uri) = overrides.source_uri {
            self.source_uri = uri;
        }
        if let Some(uri) = overrides.target_uri {
            self.target_uri = uri;
        }
        if let Some(name) = overrides.source_db {
            self.source_db = name;
        }
        if let Some(name) = overrides.target_db {
            self.target_db = name;
        }
        if let Some(size) = overrides.batch_size {
            self.batch_size = size;
        }
        if let Some(dry_run) = overrides.dry_run {
            self.dry_run = dry_run;
        }
        if let Some(dir) = overrides.migrations_dir {
            self.migrations_dir = Some(dir);
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        let missing: Vec<&str> = [
            ("source_uri", &self.source_uri),
            ("target_uri", &self.target_uri),
            ("source_db", &self.source_db),
            ("target_db", &self.target_db),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
        .collect();

        if !missing.is_empty() {
            return Err(MigrateError::Configuration(format!(
                "Missing required configuration values: {}",
                missing.join(", ")
            )));
        }

        if self.batch_size == 0 {
            return Err(batch_size_error());
        }
        Ok(())
    }

    /// Source and target live behind the same connection string.
    pub fn shares_connection(&self) -> bool {
        self.source_uri == self.target_uri
    }
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self::new()
    }
}

fn batch_size_error() -> MigrateError {
    MigrateError::Configuration("BATCH_SIZE must be a positive number".to_string())
}

fn parse_batch_size(raw: &str) -> Result<u32> {
    raw.trim()
        .parse::<u32>()
        .ok()
        .filter(|size| *size > 0)
        .ok_or_else(batch_size_error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_fallbacks() {
        let config = MigrationConfig::from_lookup(lookup(&[
            ("MONGO_URI", "mongodb://localhost:27017"),
            ("SOURCE_DB_NAME", "legacy"),
        ]))
        .unwrap();

        assert_eq!(config.source_uri, "mongodb://localhost:27017");
        assert_eq!(config.target_uri, "mongodb://localhost:27017");
        assert_eq!(config.target_db, "legacy");
        assert_eq!(config.batch_size, DEFAULT_BATCH_SIZE);
        assert!(!config.dry_run);
        assert!(config.shares_connection());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_specific_values_win_over_shared_uri() {
        let config = MigrationConfig::from_lookup(lookup(&[
            ("MONGO_URI", "mongodb://shared"),
            ("TARGET_MONGO_URI", "mongodb://target"),
            ("SOURCE_DB_NAME", "v2"),
            ("TARGET_DB_NAME", "v3"),
            ("BATCH_SIZE", "50"),
            ("DRY_RUN", "1"),
        ]))
        .unwrap();

        assert_eq!(config.source_uri, "mongodb://shared");
        assert_eq!(config.target_uri, "mongodb://target");
        assert_eq!(config.target_db, "v3");
        assert_eq!(config.batch_size, 50);
        assert!(config.dry_run);
        assert!(!config.shares_connection());
    }

    #[test]
    fn test_missing_values_are_listed() {
        let config = MigrationConfig::from_lookup(lookup(&[("SOURCE_DB_NAME", "legacy")])).unwrap();
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("Missing required configuration values: source_uri, target_uri"));
    }

    #[test]
    fn test_bad_batch_size() {
        for raw in ["0", "-3", "lots"] {
            let err = MigrationConfig::from_lookup(lookup(&[("BATCH_SIZE", raw)])).unwrap_err();
            assert!(err.to_string().contains("BATCH_SIZE must be a positive number"));
        }
        let zero = MigrationConfig::new()
            .source_uri("a")
            .target_uri("a")
            .source_db("b")
            .target_db("b")
            .batch_size(0);
        assert!(zero.validate().is_err());
    }

    #[test]
    fn test_overrides_take_precedence() {
        let config = MigrationConfig::from_lookup(lookup(&[
            ("MONGO_URI", "mongodb://env"),
            ("SOURCE_DB_NAME", "env"),
            ("DRY_RUN", "true"),
        ]))
        .unwrap()
        .apply(ConfigOverrides {
            target_db: Some("override".into()),
            dry_run: Some(false),
            batch_size: Some(10),
            ..ConfigOverrides::default()
        });

        assert_eq!(config.source_db, "env");
        assert_eq!(config.target_db, "override");
        assert_eq!(config.batch_size, 10);
        assert!(!config.dry_run);
    }
}
