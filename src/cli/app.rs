use super::Command;
use anyhow::Result;
use docmigrate::connection::MigrationConfig;
use docmigrate::migrations::MigrationRegistry;
use docmigrate::runner::{MigrationRunner, RunReport};
use docmigrate::storage::StoreConnector;
use std::sync::Arc;
use tracing::warn;

type EnvLookup = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;

pub struct App {
    connector: Arc<dyn StoreConnector>,
    registry: MigrationRegistry,
    env: EnvLookup,
}

impl App {
    pub fn new(connector: Arc<dyn StoreConnector>) -> Result<Self> {
        Ok(Self {
            connector,
            registry: MigrationRegistry::builtin()?,
            env: Box::new(|key| std::env::var(key).ok()),
        })
    }

    /// Replaces the process environment as the configuration source.
    #[cfg(test)]
    pub fn with_env<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        self.env = Box::new(lookup);
        self
    }

    pub async fn execute(&self, command: Command) -> Result<()> {
        match command {
            Command::List { .. } => {
                self.warn_migrations_dir(&command);
                for line in self.listing() {
                    println!("{}", line);
                }
                Ok(())
            }
            Command::Run { ref name, .. } => {
                let report = self.run(name, &command).await?;
                println!("{}", report.counters);
                Ok(())
            }
        }
    }

    pub fn listing(&self) -> Vec<String> {
        if self.registry.is_empty() {
            return vec!["No migrations registered.".to_string()];
        }
        self.registry.ids().into_iter().map(|id| format!("- {}", id)).collect()
    }

    pub async fn run(&self, name: &str, command: &Command) -> Result<RunReport> {
        let config = MigrationConfig::from_lookup(|key| (self.env)(key))?.apply(command.overrides());
        config.validate()?;
        let migration = self.registry.load(name)?;
        self.warn_migrations_dir(command);

        let mut runner = MigrationRunner::new(self.connector.clone());
        Ok(runner.run(migration, config).await?)
    }

    fn warn_migrations_dir(&self, command: &Command) {
        let dir = command
            .overrides()
            .migrations_dir
            .or_else(|| (self.env)("MIGRATIONS_DIR").filter(|dir| !dir.is_empty()).map(Into::into));
        if let Some(dir) = dir {
            warn!(
                "Ignoring migrations directory {}: migrations are compiled into this binary.",
                dir.display()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use docmigrate::MigrateError;
    use docmigrate::storage::{InMemoryConnector, InMemoryStore};

    fn run_command(name: &str) -> Command {
        Command::Run {
            name: name.to_string(),
            source_uri: None,
            target_uri: None,
            source_db: None,
            target_db: Some("next".to_string()),
            batch_size: Some(2),
            dry_run: None,
            migrations_dir: None,
        }
    }

    #[test]
    fn test_listing_in_id_order() {
        let app = App::new(Arc::new(InMemoryConnector::new())).unwrap();
        let listing = app.listing();
        assert_eq!(listing.len(), 8);
        assert_eq!(listing[0], "- 0001-auth");
        assert_eq!(listing[7], "- 0008-status_normalization");
    }

    #[tokio::test]
    async fn test_run_reads_env_and_flags() {
        let store = InMemoryStore::new();
        store
            .insert_many("legacy", "auth", vec![doc! { "_id": 1, "email": "a@b.c" }])
            .unwrap();
        let connector = InMemoryConnector::new().with_store("mem://shared", store.clone());
        let app = App::new(Arc::new(connector)).unwrap().with_env(shared_env);

        let report = app.run("0001-auth.rs", &run_command("0001-auth.rs")).await.unwrap();
        assert_eq!(report.migration_id, "0001-auth");
        assert_eq!(report.counters.upserts("auth"), 1);
        assert_eq!(store.documents("next", "auth").unwrap().len(), 1);
    }

    fn shared_env(key: &str) -> Option<String> {
        match key {
            "MONGO_URI" => Some("mem://shared".to_string()),
            "SOURCE_DB_NAME" => Some("legacy".to_string()),
            _ => None,
        }
    }

    #[tokio::test]
    async fn test_unknown_migration() {
        let app = App::new(Arc::new(InMemoryConnector::new())).unwrap().with_env(shared_env);
        let err = app.run("9999-nope", &run_command("9999-nope")).await.unwrap_err();
        let err = err.downcast::<MigrateError>().unwrap();
        assert!(matches!(err, MigrateError::MigrationNotFound { .. }));
    }

    #[tokio::test]
    async fn test_config_checked_before_migration_lookup() {
        let app = App::new(Arc::new(InMemoryConnector::new())).unwrap().with_env(|_| None);
        let err = app.run("9999-nope", &run_command("9999-nope")).await.unwrap_err();
        let err = err.downcast::<MigrateError>().unwrap();
        assert!(matches!(err, MigrateError::Configuration(_)));
    }
}
