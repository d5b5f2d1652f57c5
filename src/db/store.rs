//! Catalog lookups and inserts on a borrowed connection.
//!
//! Every function takes a `&Connection` so the import engine can run it on a
//! `rusqlite::Transaction` (which derefs to `Connection`) and see its own
//! uncommitted writes. [`super::Database`] wraps the same functions for
//! callers that do not hold a transaction.

use anyhow::Result;
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, Row};
use uuid::Uuid;

use crate::models::*;

// ============================================================
// Projects
// ============================================================

pub fn insert_project(conn: &Connection, input: CreateProjectInput) -> Result<Project> {
    let id = Uuid::new_v4();
    let now = Utc::now();

    conn.execute(
        "INSERT INTO projects (id, key, name, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
        (
            id.to_string(),
            &input.key,
            &input.name,
            now.to_rfc3339(),
            now.to_rfc3339(),
        ),
    )?;

    Ok(Project {
        id,
        key: input.key,
        name: input.name,
        created_at: now,
        updated_at: now,
    })
}

pub fn load_projects(conn: &Connection) -> Result<Vec<Project>> {
    let mut stmt = conn.prepare(
        "SELECT id, key, name, created_at, updated_at FROM projects ORDER BY key",
    )?;
    let projects = stmt
        .query_map([], project_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(projects)
}

pub fn load_project_by_key(conn: &Connection, key: &str) -> Result<Option<Project>> {
    let project = conn
        .query_row(
            "SELECT id, key, name, created_at, updated_at FROM projects WHERE key = ?",
            [key],
            project_from_row,
        )
        .optional()?;
    Ok(project)
}

/// Marks the project as modified by an import.
pub fn touch_project(conn: &Connection, project_id: Uuid) -> Result<()> {
    conn.execute(
        "UPDATE projects SET updated_at = ? WHERE id = ?",
        (Utc::now().to_rfc3339(), project_id.to_string()),
    )?;
    Ok(())
}

fn project_from_row(row: &Row<'_>) -> rusqlite::Result<Project> {
    Ok(Project {
        id: parse_uuid(row.get::<_, String>(0)?),
        key: row.get(1)?,
        name: row.get(2)?,
        created_at: parse_datetime(row.get::<_, String>(3)?),
        updated_at: parse_datetime(row.get::<_, String>(4)?),
    })
}

// ============================================================
// Environments
// ============================================================

pub fn insert_environment(conn: &Connection, project_id: Uuid, name: &str) -> Result<Environment> {
    let id = Uuid::new_v4();
    let now = Utc::now();

    conn.execute(
        "INSERT INTO environments (id, project_id, name, created_at) VALUES (?, ?, ?, ?)",
        (id.to_string(), project_id.to_string(), name, now.to_rfc3339()),
    )?;

    Ok(Environment {
        id,
        project_id,
        name: name.to_string(),
        created_at: now,
    })
}

pub fn load_environments(conn: &Connection, project_id: Uuid) -> Result<Vec<Environment>> {
    let mut stmt = conn.prepare(
        "SELECT id, project_id, name, created_at FROM environments
         WHERE project_id = ? ORDER BY name",
    )?;
    let environments = stmt
        .query_map([project_id.to_string()], environment_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(environments)
}

pub fn load_environment(conn: &Connection, project_id: Uuid, name: &str) -> Result<Option<Environment>> {
    let environment = conn
        .query_row(
            "SELECT id, project_id, name, created_at FROM environments
             WHERE project_id = ? AND name = ?",
            (project_id.to_string(), name),
            environment_from_row,
        )
        .optional()?;
    Ok(environment)
}

pub fn environment_exists(conn: &Connection, project_id: Uuid, name: &str) -> Result<bool> {
    exists(
        conn,
        "SELECT COUNT(*) FROM environments WHERE project_id = ? AND name = ?",
        project_id,
        name,
    )
}

fn environment_from_row(row: &Row<'_>) -> rusqlite::Result<Environment> {
    Ok(Environment {
        id: parse_uuid(row.get::<_, String>(0)?),
        project_id: parse_uuid(row.get::<_, String>(1)?),
        name: row.get(2)?,
        created_at: parse_datetime(row.get::<_, String>(3)?),
    })
}

// ============================================================
// Pipelines
// ============================================================

pub fn insert_pipeline(conn: &Connection, project_id: Uuid, name: &str) -> Result<Pipeline> {
    let id = Uuid::new_v4();
    let now = Utc::now();

    conn.execute(
        "INSERT INTO pipelines (id, project_id, name, created_at) VALUES (?, ?, ?, ?)",
        (id.to_string(), project_id.to_string(), name, now.to_rfc3339()),
    )?;

    Ok(Pipeline {
        id,
        project_id,
        name: name.to_string(),
        created_at: now,
    })
}

pub fn load_pipelines(conn: &Connection, project_id: Uuid) -> Result<Vec<Pipeline>> {
    let mut stmt = conn.prepare(
        "SELECT id, project_id, name, created_at FROM pipelines
         WHERE project_id = ? ORDER BY name",
    )?;
    let pipelines = stmt
        .query_map([project_id.to_string()], pipeline_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(pipelines)
}

pub fn load_pipeline(conn: &Connection, project_id: Uuid, name: &str) -> Result<Option<Pipeline>> {
    let pipeline = conn
        .query_row(
            "SELECT id, project_id, name, created_at FROM pipelines
             WHERE project_id = ? AND name = ?",
            (project_id.to_string(), name),
            pipeline_from_row,
        )
        .optional()?;
    Ok(pipeline)
}

pub fn pipeline_exists(conn: &Connection, project_id: Uuid, name: &str) -> Result<bool> {
    exists(
        conn,
        "SELECT COUNT(*) FROM pipelines WHERE project_id = ? AND name = ?",
        project_id,
        name,
    )
}

fn pipeline_from_row(row: &Row<'_>) -> rusqlite::Result<Pipeline> {
    Ok(Pipeline {
        id: parse_uuid(row.get::<_, String>(0)?),
        project_id: parse_uuid(row.get::<_, String>(1)?),
        name: row.get(2)?,
        created_at: parse_datetime(row.get::<_, String>(3)?),
    })
}

// ============================================================
// Groups
// ============================================================

pub fn insert_group(conn: &Connection, name: &str) -> Result<Group> {
    let id = Uuid::new_v4();
    conn.execute(
        "INSERT INTO permission_groups (id, name) VALUES (?, ?)",
        (id.to_string(), name),
    )?;
    Ok(Group {
        id,
        name: name.to_string(),
    })
}

pub fn load_group(conn: &Connection, name: &str) -> Result<Option<Group>> {
    let group = conn
        .query_row(
            "SELECT id, name FROM permission_groups WHERE name = ?",
            [name],
            |row| {
                Ok(Group {
                    id: parse_uuid(row.get::<_, String>(0)?),
                    name: row.get(1)?,
                })
            },
        )
        .optional()?;
    Ok(group)
}

// ============================================================
// Applications
// ============================================================

pub fn insert_application(
    conn: &Connection,
    project_id: Uuid,
    name: &str,
    repository: Option<&RepositoryBinding>,
) -> Result<Application> {
    let id = Uuid::new_v4();
    let now = Utc::now();

    conn.execute(
        "INSERT INTO applications (id, project_id, name, repository_manager, repository_fullname, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
        (
            id.to_string(),
            project_id.to_string(),
            name,
            repository.map(|r| r.manager.as_str()),
            repository.map(|r| r.fullname.as_str()),
            now.to_rfc3339(),
            now.to_rfc3339(),
        ),
    )?;

    Ok(Application {
        id,
        project_id,
        name: name.to_string(),
        repository: repository.cloned(),
        created_at: now,
        updated_at: now,
    })
}

/// Rewrites the repository binding of an existing application.
pub fn update_application_repository(
    conn: &Connection,
    application: &Application,
    repository: Option<&RepositoryBinding>,
) -> Result<Application> {
    let now = Utc::now();
    conn.execute(
        "UPDATE applications SET repository_manager = ?, repository_fullname = ?, updated_at = ? WHERE id = ?",
        (
            repository.map(|r| r.manager.as_str()),
            repository.map(|r| r.fullname.as_str()),
            now.to_rfc3339(),
            application.id.to_string(),
        ),
    )?;

    Ok(Application {
        repository: repository.cloned(),
        updated_at: now,
        ..application.clone()
    })
}

/// Removes everything an import attaches to an application, keeping the record.
pub fn clear_application_bindings(conn: &Connection, application_id: Uuid) -> Result<()> {
    let id = application_id.to_string();
    for sql in [
        "DELETE FROM application_groups WHERE application_id = ?",
        "DELETE FROM pipeline_triggers WHERE src_application_id = ?",
        "DELETE FROM hooks WHERE application_id = ?",
        "DELETE FROM pollers WHERE application_id = ?",
        "DELETE FROM notifications WHERE application_id = ?",
        "DELETE FROM application_pipelines WHERE application_id = ?",
    ] {
        conn.execute(sql, [&id])?;
    }
    Ok(())
}

pub fn load_applications(conn: &Connection, project_id: Uuid) -> Result<Vec<Application>> {
    let mut stmt = conn.prepare(
        "SELECT id, project_id, name, repository_manager, repository_fullname, created_at, updated_at
         FROM applications WHERE project_id = ? ORDER BY name",
    )?;
    let applications = stmt
        .query_map([project_id.to_string()], application_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(applications)
}

pub fn load_application(conn: &Connection, project_id: Uuid, name: &str) -> Result<Option<Application>> {
    let application = conn
        .query_row(
            "SELECT id, project_id, name, repository_manager, repository_fullname, created_at, updated_at
             FROM applications WHERE project_id = ? AND name = ?",
            (project_id.to_string(), name),
            application_from_row,
        )
        .optional()?;
    Ok(application)
}

pub fn application_exists(conn: &Connection, project_id: Uuid, name: &str) -> Result<bool> {
    exists(
        conn,
        "SELECT COUNT(*) FROM applications WHERE project_id = ? AND name = ?",
        project_id,
        name,
    )
}

fn application_from_row(row: &Row<'_>) -> rusqlite::Result<Application> {
    let manager: Option<String> = row.get(3)?;
    let fullname: Option<String> = row.get(4)?;
    Ok(Application {
        id: parse_uuid(row.get::<_, String>(0)?),
        project_id: parse_uuid(row.get::<_, String>(1)?),
        name: row.get(2)?,
        repository: manager
            .zip(fullname)
            .map(|(manager, fullname)| RepositoryBinding { manager, fullname }),
        created_at: parse_datetime(row.get::<_, String>(5)?),
        updated_at: parse_datetime(row.get::<_, String>(6)?),
    })
}

pub fn insert_application_group(
    conn: &Connection,
    application_id: Uuid,
    group: &Group,
    level: PermissionLevel,
) -> Result<()> {
    conn.execute(
        "INSERT INTO application_groups (application_id, group_id, level) VALUES (?, ?, ?)
         ON CONFLICT (application_id, group_id) DO UPDATE SET level = excluded.level",
        (application_id.to_string(), group.id.to_string(), level.as_str()),
    )?;
    Ok(())
}

pub fn load_application_groups(conn: &Connection, application_id: Uuid) -> Result<Vec<ApplicationGroup>> {
    let mut stmt = conn.prepare(
        "SELECT g.id, g.name, ag.level FROM application_groups ag
         JOIN permission_groups g ON g.id = ag.group_id
         WHERE ag.application_id = ? ORDER BY g.name",
    )?;
    let groups = stmt
        .query_map([application_id.to_string()], |row| {
            Ok(ApplicationGroup {
                group_id: parse_uuid(row.get::<_, String>(0)?),
                group_name: row.get(1)?,
                level: PermissionLevel::from_str(&row.get::<_, String>(2)?)
                    .unwrap_or(PermissionLevel::Read),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(groups)
}

pub fn attach_pipeline(conn: &Connection, application_id: Uuid, pipeline_id: Uuid) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO application_pipelines (application_id, pipeline_id, created_at) VALUES (?, ?, ?)",
        (
            application_id.to_string(),
            pipeline_id.to_string(),
            Utc::now().to_rfc3339(),
        ),
    )?;
    Ok(())
}

pub fn load_attached_pipelines(conn: &Connection, application_id: Uuid) -> Result<Vec<Pipeline>> {
    let mut stmt = conn.prepare(
        "SELECT p.id, p.project_id, p.name, p.created_at FROM application_pipelines ap
         JOIN pipelines p ON p.id = ap.pipeline_id
         WHERE ap.application_id = ? ORDER BY p.name",
    )?;
    let pipelines = stmt
        .query_map([application_id.to_string()], pipeline_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(pipelines)
}

// ============================================================
// Triggers, hooks, pollers, notifications
// ============================================================

pub fn insert_trigger(conn: &Connection, trigger: NewTrigger) -> Result<PipelineTrigger> {
    let id = Uuid::new_v4();
    conn.execute(
        "INSERT INTO pipeline_triggers (id, src_application_id, src_pipeline_id, src_environment_id,
             dest_application_id, dest_pipeline_id, dest_environment_id, manual, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        (
            id.to_string(),
            trigger.src_application_id.to_string(),
            trigger.src_pipeline_id.to_string(),
            trigger.src_environment_id.map(|u| u.to_string()),
            trigger.dest_application_id.to_string(),
            trigger.dest_pipeline_id.to_string(),
            trigger.dest_environment_id.map(|u| u.to_string()),
            if trigger.manual { 1 } else { 0 },
            Utc::now().to_rfc3339(),
        ),
    )?;

    Ok(PipelineTrigger {
        id,
        src_application_id: trigger.src_application_id,
        src_pipeline_id: trigger.src_pipeline_id,
        src_environment_id: trigger.src_environment_id,
        dest_application_id: trigger.dest_application_id,
        dest_pipeline_id: trigger.dest_pipeline_id,
        dest_environment_id: trigger.dest_environment_id,
        manual: trigger.manual,
    })
}

pub fn load_triggers(conn: &Connection, application_id: Uuid) -> Result<Vec<PipelineTrigger>> {
    let mut stmt = conn.prepare(
        "SELECT id, src_application_id, src_pipeline_id, src_environment_id,
                dest_application_id, dest_pipeline_id, dest_environment_id, manual
         FROM pipeline_triggers WHERE src_application_id = ? ORDER BY created_at",
    )?;
    let triggers = stmt
        .query_map([application_id.to_string()], |row| {
            Ok(PipelineTrigger {
                id: parse_uuid(row.get::<_, String>(0)?),
                src_application_id: parse_uuid(row.get::<_, String>(1)?),
                src_pipeline_id: parse_uuid(row.get::<_, String>(2)?),
                src_environment_id: row.get::<_, Option<String>>(3)?.map(parse_uuid),
                dest_application_id: parse_uuid(row.get::<_, String>(4)?),
                dest_pipeline_id: parse_uuid(row.get::<_, String>(5)?),
                dest_environment_id: row.get::<_, Option<String>>(6)?.map(parse_uuid),
                manual: row.get::<_, i32>(7)? != 0,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(triggers)
}

pub fn insert_hook(
    conn: &Connection,
    application_id: Uuid,
    pipeline_id: Uuid,
    repository: &RepositoryBinding,
) -> Result<Hook> {
    let id = Uuid::new_v4();
    let now = Utc::now();

    conn.execute(
        "INSERT INTO hooks (id, application_id, pipeline_id, repository_manager, repository_fullname, created_at)
         VALUES (?, ?, ?, ?, ?, ?)",
        (
            id.to_string(),
            application_id.to_string(),
            pipeline_id.to_string(),
            &repository.manager,
            &repository.fullname,
            now.to_rfc3339(),
        ),
    )?;

    Ok(Hook {
        id,
        application_id,
        pipeline_id,
        repository_manager: repository.manager.clone(),
        repository_fullname: repository.fullname.clone(),
        created_at: now,
    })
}

pub fn load_hooks(conn: &Connection, application_id: Uuid) -> Result<Vec<Hook>> {
    let mut stmt = conn.prepare(
        "SELECT id, application_id, pipeline_id, repository_manager, repository_fullname, created_at
         FROM hooks WHERE application_id = ? ORDER BY created_at",
    )?;
    let hooks = stmt
        .query_map([application_id.to_string()], |row| {
            Ok(Hook {
                id: parse_uuid(row.get::<_, String>(0)?),
                application_id: parse_uuid(row.get::<_, String>(1)?),
                pipeline_id: parse_uuid(row.get::<_, String>(2)?),
                repository_manager: row.get(3)?,
                repository_fullname: row.get(4)?,
                created_at: parse_datetime(row.get::<_, String>(5)?),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(hooks)
}

pub fn insert_poller(
    conn: &Connection,
    application_id: Uuid,
    pipeline_id: Uuid,
    enabled: bool,
) -> Result<Poller> {
    let id = Uuid::new_v4();
    let now = Utc::now();

    conn.execute(
        "INSERT INTO pollers (id, application_id, pipeline_id, enabled, created_at) VALUES (?, ?, ?, ?, ?)",
        (
            id.to_string(),
            application_id.to_string(),
            pipeline_id.to_string(),
            if enabled { 1 } else { 0 },
            now.to_rfc3339(),
        ),
    )?;

    Ok(Poller {
        id,
        application_id,
        pipeline_id,
        enabled,
        created_at: now,
    })
}

pub fn load_pollers(conn: &Connection, application_id: Uuid) -> Result<Vec<Poller>> {
    let mut stmt = conn.prepare(
        "SELECT id, application_id, pipeline_id, enabled, created_at
         FROM pollers WHERE application_id = ? ORDER BY created_at",
    )?;
    let pollers = stmt
        .query_map([application_id.to_string()], |row| {
            Ok(Poller {
                id: parse_uuid(row.get::<_, String>(0)?),
                application_id: parse_uuid(row.get::<_, String>(1)?),
                pipeline_id: parse_uuid(row.get::<_, String>(2)?),
                enabled: row.get::<_, i32>(3)? != 0,
                created_at: parse_datetime(row.get::<_, String>(4)?),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(pollers)
}

/// Inserts or replaces the notification of one kind for an
/// (application, pipeline, environment) triple.
pub fn upsert_notification(
    conn: &Connection,
    application_id: Uuid,
    pipeline_id: Uuid,
    environment_id: Option<Uuid>,
    config: &NotificationConfig,
) -> Result<Notification> {
    let now = Utc::now();
    let environment = environment_id.map(|u| u.to_string());

    // `IS` so that a NULL environment matches the default-environment row.
    conn.execute(
        "DELETE FROM notifications
         WHERE application_id = ? AND pipeline_id = ? AND environment_id IS ? AND kind = ?",
        (
            application_id.to_string(),
            pipeline_id.to_string(),
            &environment,
            config.kind.as_str(),
        ),
    )?;

    let id = Uuid::new_v4();
    conn.execute(
        "INSERT INTO notifications (id, application_id, pipeline_id, environment_id, kind, settings, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
        (
            id.to_string(),
            application_id.to_string(),
            pipeline_id.to_string(),
            &environment,
            config.kind.as_str(),
            serde_json::to_string(config)?,
            now.to_rfc3339(),
        ),
    )?;

    Ok(Notification {
        id,
        application_id,
        pipeline_id,
        environment_id,
        config: config.clone(),
        updated_at: now,
    })
}

pub fn load_notifications(conn: &Connection, application_id: Uuid) -> Result<Vec<Notification>> {
    let mut stmt = conn.prepare(
        "SELECT id, application_id, pipeline_id, environment_id, settings, updated_at
         FROM notifications WHERE application_id = ? ORDER BY updated_at",
    )?;
    let rows = stmt
        .query_map([application_id.to_string()], |row| {
            Ok((
                parse_uuid(row.get::<_, String>(0)?),
                parse_uuid(row.get::<_, String>(1)?),
                parse_uuid(row.get::<_, String>(2)?),
                row.get::<_, Option<String>>(3)?.map(parse_uuid),
                row.get::<_, String>(4)?,
                parse_datetime(row.get::<_, String>(5)?),
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(
            |(id, application_id, pipeline_id, environment_id, settings, updated_at)| -> Result<Notification> {
            Ok(Notification {
                id,
                application_id,
                pipeline_id,
                environment_id,
                config: serde_json::from_str(&settings)?,
                updated_at,
            })
        },
        )
        .collect()
}

// ============================================================
// Warnings
// ============================================================

/// Replaces the stored warnings of an application.
pub fn replace_warnings(
    conn: &Connection,
    application_id: Uuid,
    findings: &[(WarningKind, String)],
) -> Result<Vec<Warning>> {
    conn.execute(
        "DELETE FROM application_warnings WHERE application_id = ?",
        [application_id.to_string()],
    )?;

    let now = Utc::now();
    let mut warnings = Vec::with_capacity(findings.len());
    for (kind, message) in findings {
        let id = Uuid::new_v4();
        conn.execute(
            "INSERT INTO application_warnings (id, application_id, kind, message, created_at)
             VALUES (?, ?, ?, ?, ?)",
            (
                id.to_string(),
                application_id.to_string(),
                kind.as_str(),
                message,
                now.to_rfc3339(),
            ),
        )?;
        warnings.push(Warning {
            id,
            application_id,
            kind: *kind,
            message: message.clone(),
            created_at: now,
        });
    }
    Ok(warnings)
}

pub fn load_warnings(conn: &Connection, application_id: Uuid) -> Result<Vec<Warning>> {
    let mut stmt = conn.prepare(
        "SELECT id, application_id, kind, message, created_at
         FROM application_warnings WHERE application_id = ? ORDER BY created_at, kind",
    )?;
    let warnings = stmt
        .query_map([application_id.to_string()], |row| {
            Ok(Warning {
                id: parse_uuid(row.get::<_, String>(0)?),
                application_id: parse_uuid(row.get::<_, String>(1)?),
                kind: WarningKind::from_str(&row.get::<_, String>(2)?)
                    .unwrap_or(WarningKind::NoPipelines),
                message: row.get(3)?,
                created_at: parse_datetime(row.get::<_, String>(4)?),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(warnings)
}

// ============================================================
// Helpers
// ============================================================

fn exists(conn: &Connection, sql: &str, project_id: Uuid, name: &str) -> Result<bool> {
    let count: i64 = conn.query_row(sql, (project_id.to_string(), name), |row| row.get(0))?;
    Ok(count > 0)
}

fn parse_uuid(s: String) -> Uuid {
    Uuid::parse_str(&s).unwrap_or_else(|_| Uuid::nil())
}

fn parse_datetime(s: String) -> chrono::DateTime<Utc> {
    chrono::DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
