mod schema;
pub mod store;

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::Result;
use rusqlite::Connection;

use crate::models::*;

pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    pub fn open(path: PathBuf) -> Result<Self> {
        let parent = path
            .parent()
            .ok_or_else(|| anyhow::anyhow!("Database path has no parent directory"))?;
        std::fs::create_dir_all(parent)?;
        let conn = Connection::open(&path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn default_path() -> Result<PathBuf> {
        let dirs = directories::ProjectDirs::from("", "", "pipeport")
            .ok_or_else(|| anyhow::anyhow!("Could not determine data directory"))?;
        Ok(dirs.data_dir().join("pipeport.db"))
    }

    pub fn open_default() -> Result<Self> {
        Self::open(Self::default_path()?)
    }

    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn migrate(&self) -> Result<()> {
        let conn = self.lock()?;
        schema::run_migrations(&conn)
    }

    /// Exclusive access to the connection, e.g. to open a transaction.
    pub fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow::anyhow!("database lock poisoned"))
    }

    // ============================================================
    // Project operations
    // ============================================================

    pub fn create_project(&self, input: CreateProjectInput) -> Result<Project> {
        let conn = self.lock()?;
        store::insert_project(&conn, input)
    }

    pub fn get_all_projects(&self) -> Result<Vec<Project>> {
        let conn = self.lock()?;
        store::load_projects(&conn)
    }

    pub fn get_project_by_key(&self, key: &str) -> Result<Option<Project>> {
        let conn = self.lock()?;
        store::load_project_by_key(&conn, key)
    }

    pub fn get_project_with_catalog(&self, key: &str) -> Result<Option<ProjectWithCatalog>> {
        let conn = self.lock()?;
        let Some(project) = store::load_project_by_key(&conn, key)? else {
            return Ok(None);
        };

        let environments = store::load_environments(&conn, project.id)?;
        let pipelines = store::load_pipelines(&conn, project.id)?;

        Ok(Some(ProjectWithCatalog {
            project,
            environments,
            pipelines,
        }))
    }

    // ============================================================
    // Environment, pipeline and group operations
    // ============================================================

    pub fn create_environment(&self, project_key: &str, name: &str) -> Result<Environment> {
        let conn = self.lock()?;
        let project = store::load_project_by_key(&conn, project_key)?
            .ok_or_else(|| anyhow::anyhow!("Project not found"))?;
        store::insert_environment(&conn, project.id, name)
    }

    pub fn create_pipeline(&self, project_key: &str, name: &str) -> Result<Pipeline> {
        let conn = self.lock()?;
        let project = store::load_project_by_key(&conn, project_key)?
            .ok_or_else(|| anyhow::anyhow!("Project not found"))?;
        store::insert_pipeline(&conn, project.id, name)
    }

    pub fn create_group(&self, name: &str) -> Result<Group> {
        let conn = self.lock()?;
        store::insert_group(&conn, name)
    }

    // ============================================================
    // Application operations
    // ============================================================

    pub fn get_applications(&self, project_key: &str) -> Result<Vec<Application>> {
        let conn = self.lock()?;
        let project = store::load_project_by_key(&conn, project_key)?
            .ok_or_else(|| anyhow::anyhow!("Project not found"))?;
        store::load_applications(&conn, project.id)
    }

    pub fn get_application(&self, project_key: &str, name: &str) -> Result<Option<Application>> {
        let conn = self.lock()?;
        let Some(project) = store::load_project_by_key(&conn, project_key)? else {
            return Ok(None);
        };
        store::load_application(&conn, project.id, name)
    }

    pub fn get_application_detail(
        &self,
        project_key: &str,
        name: &str,
    ) -> Result<Option<ApplicationDetail>> {
        let conn = self.lock()?;
        let Some(project) = store::load_project_by_key(&conn, project_key)? else {
            return Ok(None);
        };
        let Some(application) = store::load_application(&conn, project.id, name)? else {
            return Ok(None);
        };

        Ok(Some(ApplicationDetail {
            groups: store::load_application_groups(&conn, application.id)?,
            pipelines: store::load_attached_pipelines(&conn, application.id)?,
            triggers: store::load_triggers(&conn, application.id)?,
            hooks: store::load_hooks(&conn, application.id)?,
            pollers: store::load_pollers(&conn, application.id)?,
            notifications: store::load_notifications(&conn, application.id)?,
            warnings: store::load_warnings(&conn, application.id)?,
            application,
        }))
    }

    pub fn replace_warnings(
        &self,
        application: &Application,
        findings: &[(WarningKind, String)],
    ) -> Result<Vec<Warning>> {
        let conn = self.lock()?;
        store::replace_warnings(&conn, application.id, findings)
    }
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self {
            conn: self.conn.clone(),
        }
    }
}
