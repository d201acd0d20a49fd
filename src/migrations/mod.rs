//! Compiled-in migrations and the registry that looks them up by id.

mod auth;
mod consolidated_links;
mod projects_split;
mod status_normalization;
mod surveycine_responses;
mod surveycine_surveys;
mod unit_usage;

pub use auth::AuthCopy;
pub use consolidated_links::{FeedbackQuestionReports, FolderReports};
pub use projects_split::ProjectsSplit;
pub use status_normalization::StatusNormalization;
pub use surveycine_responses::SurveycineResponses;
pub use surveycine_surveys::SurveycineSurveys;
pub use unit_usage::UnitUsageCopy;

use crate::core::{MigrateError, Result};
use crate::engine::{ExecutionContext, RunCounters};
use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use std::sync::Arc;

/// A named, forward-only transformation.
#[async_trait]
pub trait Migration: Send + Sync {
    /// Identifier such as `0001-auth`; ids sort in execution order.
    fn id(&self) -> &'static str;

    fn description(&self) -> &'static str;

    async fn up(&self, ctx: &ExecutionContext) -> Result<RunCounters>;
}

lazy_static! {
    static ref MIGRATION_ID: Regex =
        Regex::new(r"^[0-9]{4}-[A-Za-z0-9_\-]+$").expect("valid migration id pattern");
}

/// Strips a trailing source-file extension from a requested name.
pub fn normalize_name(name: &str) -> &str {
    let name = name.trim();
    name.strip_suffix(".rs")
        .or_else(|| name.strip_suffix(".js"))
        .unwrap_or(name)
}

pub struct MigrationRegistry {
    migrations: Vec<Arc<dyn Migration>>,
}

impl MigrationRegistry {
    pub fn new() -> Self {
        Self {
            migrations: Vec::new(),
        }
    }

    /// Registry with every migration shipped in this crate.
    pub fn builtin() -> Result<Self> {
        let mut registry = Self::new();
        registry.register(Arc::new(AuthCopy))?;
        registry.register(Arc::new(UnitUsageCopy))?;
        registry.register(Arc::new(ProjectsSplit))?;
        registry.register(Arc::new(SurveycineSurveys))?;
        registry.register(Arc::new(FolderReports))?;
        registry.register(Arc::new(FeedbackQuestionReports))?;
        registry.register(Arc::new(SurveycineResponses))?;
        registry.register(Arc::new(StatusNormalization))?;
        Ok(registry)
    }

    /// Adds a migration, rejecting malformed or duplicate ids.
    pub fn register(&mut self, migration: Arc<dyn Migration>) -> Result<()> {
        let id = migration.id();
        if !MIGRATION_ID.is_match(id) {
            return Err(MigrateError::ContractViolation(format!(
                "Migration id '{}' must look like '0001-name'",
                id
            )));
        }
        if self.migrations.iter().any(|m| m.id() == id) {
            return Err(MigrateError::ContractViolation(format!(
                "Migration '{}' is registered twice",
                id
            )));
        }
        self.migrations.push(migration);
        self.migrations.sort_by(|a, b| a.id().cmp(b.id()));
        Ok(())
    }

    /// Registered migrations in id order.
    pub fn list(&self) -> impl Iterator<Item = &Arc<dyn Migration>> {
        self.migrations.iter()
    }

    pub fn ids(&self) -> Vec<&'static str> {
        self.migrations.iter().map(|m| m.id()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.migrations.is_empty()
    }

    pub fn load(&self, name: &str) -> Result<Arc<dyn Migration>> {
        let wanted = normalize_name(name);
        self.migrations
            .iter()
            .find(|m| m.id() == wanted)
            .cloned()
            .ok_or_else(|| MigrateError::MigrationNotFound {
                name: name.to_string(),
                available: self.ids().join(", "),
            })
    }
}

impl Default for MigrationRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Named(&'static str);

    #[async_trait]
    impl Migration for Named {
        fn id(&self) -> &'static str {
            self.0
        }

        fn description(&self) -> &'static str {
            ""
        }

        async fn up(&self, _ctx: &ExecutionContext) -> Result<RunCounters> {
            Ok(RunCounters::new())
        }
    }

    #[test]
    fn test_builtin_ids_are_sorted() {
        let registry = MigrationRegistry::builtin().unwrap();
        assert_eq!(
            registry.ids(),
            vec![
                "0001-auth",
                "0002-unit_usage",
                "0003-projects_insights_reports",
                "0004-surveycine_surveys",
                "0005-folder_consolidated_reports",
                "0006-feedback_questions_consolidated_reports",
                "0007-surveycine_responses",
                "0008-status_normalization",
            ]
        );
        assert!(registry.list().all(|m| !m.description().is_empty()));
    }

    #[test]
    fn test_load_strips_extension() {
        let registry = MigrationRegistry::builtin().unwrap();
        assert_eq!(registry.load("0001-auth.js").unwrap().id(), "0001-auth");
        assert_eq!(registry.load("0002-unit_usage.rs").unwrap().id(), "0002-unit_usage");
    }

    #[test]
    fn test_unknown_name() {
        let registry = MigrationRegistry::builtin().unwrap();
        let err = registry.load("9999-nope").err().unwrap();
        assert!(matches!(err, MigrateError::MigrationNotFound { ref name, .. } if name == "9999-nope"));
    }

    #[test]
    fn test_register_rejects_bad_ids() {
        let mut registry = MigrationRegistry::new();
        registry.register(Arc::new(Named("0002-b"))).unwrap();
        registry.register(Arc::new(Named("0001-a"))).unwrap();
        assert_eq!(registry.ids(), vec!["0001-a", "0002-b"]);

        assert!(matches!(
            registry.register(Arc::new(Named("0001-a"))),
            Err(MigrateError::ContractViolation(_))
        ));
        assert!(matches!(
            registry.register(Arc::new(Named("auth"))),
            Err(MigrateError::ContractViolation(_))
        ));
    }
}
