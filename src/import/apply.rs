//! Applies a validated descriptor inside the import transaction.
//!
//! Unlike validation, every unresolved reference here is a hard stop: the
//! first one aborts the apply and the caller drops the transaction.

use std::collections::HashMap;

use anyhow::Context;
use rusqlite::Connection;
use uuid::Uuid;

use crate::db::store;
use crate::models::*;

use super::aggregator::MessageSink;
use super::ImportError;

/// What the applier works against: the scoped transaction, the target
/// project and the diagnostic sink.
pub struct ApplyContext<'a> {
    pub conn: &'a Connection,
    pub project: &'a Project,
    pub sink: &'a MessageSink,
}

/// A group permission whose group was resolved before applying.
#[derive(Debug, Clone)]
pub struct ResolvedPermission {
    pub group: Group,
    pub level: PermissionLevel,
}

/// The application record plus the pipelines attached to it by name.
#[derive(Debug, Clone)]
pub struct AttachedApplication {
    pub application: Application,
    pub pipelines: HashMap<String, Uuid>,
}

/// Decides what happens to an application that already exists when the
/// import was forced.
pub trait UpdateStrategy: Send + Sync {
    /// Returns `None` when the existing application is kept untouched, in
    /// which case hooks, pollers and notifications are not applied either.
    fn update(
        &self,
        ctx: &ApplyContext<'_>,
        existing: Application,
        descriptor: &ApplicationDescriptor,
        permissions: &[ResolvedPermission],
    ) -> Result<Option<AttachedApplication>, ImportError>;
}

/// Leaves an existing application exactly as it is.
#[derive(Debug, Clone, Copy, Default)]
pub struct PreserveExisting;

impl UpdateStrategy for PreserveExisting {
    fn update(
        &self,
        _ctx: &ApplyContext<'_>,
        existing: Application,
        _descriptor: &ApplicationDescriptor,
        _permissions: &[ResolvedPermission],
    ) -> Result<Option<AttachedApplication>, ImportError> {
        tracing::info!("Application {} exists, keeping it unchanged", existing.name);
        Ok(None)
    }
}

/// Rebuilds an existing application from the descriptor, keeping its id.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReplaceExisting;

impl UpdateStrategy for ReplaceExisting {
    fn update(
        &self,
        ctx: &ApplyContext<'_>,
        existing: Application,
        descriptor: &ApplicationDescriptor,
        permissions: &[ResolvedPermission],
    ) -> Result<Option<AttachedApplication>, ImportError> {
        store::clear_application_bindings(ctx.conn, existing.id)
            .with_context(|| format!("Unable to clear application {}", existing.name))?;
        let application =
            store::update_application_repository(ctx.conn, &existing, descriptor.repository.as_ref())
                .with_context(|| format!("Unable to update application {}", existing.name))?;

        ctx.sink.send(Message::new(
            MessageKind::ApplicationUpdated,
            [application.name.as_str()],
        ));

        bind_application(ctx, application, descriptor, permissions).map(Some)
    }
}

/// Runs the apply sequence and returns the resulting application.
pub fn apply(
    ctx: &ApplyContext<'_>,
    descriptor: &ApplicationDescriptor,
    permissions: &[ResolvedPermission],
    existing: Option<Application>,
    strategy: &dyn UpdateStrategy,
) -> Result<Application, ImportError> {
    let attached = match existing {
        None => create_application(ctx, descriptor, permissions)?,
        Some(existing) => match strategy.update(ctx, existing.clone(), descriptor, permissions)? {
            Some(attached) => attached,
            None => return Ok(existing),
        },
    };

    if let Some(repository) = &descriptor.repository {
        create_hooks(ctx, &attached, descriptor, repository)?;
        create_pollers(ctx, &attached, descriptor, repository)?;
    }

    upsert_notifications(ctx, &attached, descriptor)?;

    Ok(attached.application)
}

fn create_application(
    ctx: &ApplyContext<'_>,
    descriptor: &ApplicationDescriptor,
    permissions: &[ResolvedPermission],
) -> Result<AttachedApplication, ImportError> {
    let application = store::insert_application(
        ctx.conn,
        ctx.project.id,
        &descriptor.name,
        descriptor.repository.as_ref(),
    )
    .with_context(|| {
        format!(
            "Unable to insert application {}/{}",
            ctx.project.key, descriptor.name
        )
    })?;

    ctx.sink.send(Message::new(
        MessageKind::ApplicationCreated,
        [application.name.as_str()],
    ));

    bind_application(ctx, application, descriptor, permissions)
}

/// Grants permissions, attaches pipelines and creates triggers.
fn bind_application(
    ctx: &ApplyContext<'_>,
    application: Application,
    descriptor: &ApplicationDescriptor,
    permissions: &[ResolvedPermission],
) -> Result<AttachedApplication, ImportError> {
    for permission in permissions {
        store::insert_application_group(ctx.conn, application.id, &permission.group, permission.level)
            .with_context(|| format!("Unable to grant group {}", permission.group.name))?;
    }

    let mut pipelines = HashMap::new();
    for usage in &descriptor.pipelines {
        let pipeline = store::load_pipeline(ctx.conn, ctx.project.id, &usage.name)
            .with_context(|| format!("Unable to load pipeline {}", usage.name))?
            .ok_or_else(|| ImportError::PipelineNotFound(usage.name.clone()))?;

        store::attach_pipeline(ctx.conn, application.id, pipeline.id).with_context(|| {
            format!(
                "Unable to attach pipeline {} to application {}",
                pipeline.name, application.name
            )
        })?;
        ctx.sink.send(Message::new(
            MessageKind::PipelineAttached,
            [pipeline.name.as_str(), application.name.as_str()],
        ));
        pipelines.insert(pipeline.name, pipeline.id);
    }

    // Triggers go last so they can target any pipeline attached above.
    for usage in &descriptor.pipelines {
        let src_pipeline_id = pipelines[&usage.name];
        for trigger in &usage.triggers {
            create_trigger(ctx, &application, &usage.name, src_pipeline_id, trigger)?;
        }
    }

    Ok(AttachedApplication {
        application,
        pipelines,
    })
}

fn create_trigger(
    ctx: &ApplyContext<'_>,
    application: &Application,
    src_pipeline: &str,
    src_pipeline_id: Uuid,
    trigger: &Trigger,
) -> Result<(), ImportError> {
    let dest_name = trigger.dest_application_or(&application.name);
    let dest_application_id = if dest_name == application.name {
        application.id
    } else {
        store::load_application(ctx.conn, ctx.project.id, dest_name)
            .with_context(|| format!("Unable to load application {}", dest_name))?
            .ok_or_else(|| ImportError::ApplicationNotFound(dest_name.to_string()))?
            .id
    };

    let Some(dest_pipeline) = store::load_pipeline(ctx.conn, ctx.project.id, &trigger.dest_pipeline)
        .with_context(|| format!("Unable to load pipeline {}", trigger.dest_pipeline))?
    else {
        ctx.sink.send(Message::new(
            MessageKind::PipelineNotFound,
            [trigger.dest_pipeline.as_str()],
        ));
        return Err(ImportError::PipelineNotFound(trigger.dest_pipeline.clone()));
    };

    let src_environment_id = resolve_environment(ctx, &trigger.src_environment)?;
    let dest_environment_id = resolve_environment(ctx, &trigger.dest_environment)?;
    tracing::debug!(
        "Insert trigger {}({}) -> {}/{}({})",
        src_pipeline,
        trigger.src_environment,
        dest_name,
        dest_pipeline.name,
        trigger.dest_environment
    );

    store::insert_trigger(
        ctx.conn,
        NewTrigger {
            src_application_id: application.id,
            src_pipeline_id,
            src_environment_id,
            dest_application_id,
            dest_pipeline_id: dest_pipeline.id,
            dest_environment_id,
            manual: trigger.manual,
        },
    )
    .with_context(|| {
        format!(
            "Unable to insert trigger from {} to {}/{}",
            src_pipeline, dest_name, dest_pipeline.name
        )
    })?;

    ctx.sink.send(Message::new(
        MessageKind::TriggerCreated,
        [src_pipeline, dest_pipeline.name.as_str()],
    ));
    Ok(())
}

fn create_hooks(
    ctx: &ApplyContext<'_>,
    attached: &AttachedApplication,
    descriptor: &ApplicationDescriptor,
    repository: &RepositoryBinding,
) -> Result<(), ImportError> {
    let application = &attached.application;
    for hook in &descriptor.hooks {
        let pipeline_id = resolve_bound_pipeline(ctx, attached, &hook.pipeline)?;
        tracing::debug!("Insert hook {}({})", hook.pipeline, pipeline_id);

        store::insert_hook(ctx.conn, application.id, pipeline_id, repository).with_context(|| {
            format!(
                "Unable to insert hook on application {}/{} on pipeline {}",
                ctx.project.key, application.name, hook.pipeline
            )
        })?;

        ctx.sink.send(Message::new(
            MessageKind::HookCreated,
            [repository.fullname.as_str(), hook.pipeline.as_str()],
        ));
    }
    Ok(())
}

fn create_pollers(
    ctx: &ApplyContext<'_>,
    attached: &AttachedApplication,
    descriptor: &ApplicationDescriptor,
    repository: &RepositoryBinding,
) -> Result<(), ImportError> {
    let application = &attached.application;
    for poller in &descriptor.pollers {
        let pipeline_id = resolve_bound_pipeline(ctx, attached, &poller.pipeline)?;
        tracing::debug!("Insert poller {}({})", poller.pipeline, pipeline_id);

        store::insert_poller(ctx.conn, application.id, pipeline_id, poller.enabled).with_context(
            || {
                format!(
                    "Unable to insert poller on application {}/{} on pipeline {}",
                    ctx.project.key, application.name, poller.pipeline
                )
            },
        )?;

        ctx.sink.send(Message::new(
            MessageKind::PollerCreated,
            [repository.fullname.as_str(), poller.pipeline.as_str()],
        ));
    }
    Ok(())
}

// Notifications are applied without a "created" message.
fn upsert_notifications(
    ctx: &ApplyContext<'_>,
    attached: &AttachedApplication,
    descriptor: &ApplicationDescriptor,
) -> Result<(), ImportError> {
    let application = &attached.application;
    for notification in &descriptor.notifications {
        let pipeline_id = *attached
            .pipelines
            .get(&notification.pipeline)
            .ok_or_else(|| ImportError::PipelineNotFound(notification.pipeline.clone()))?;
        let environment_id = resolve_environment(ctx, &notification.environment)?;

        store::upsert_notification(
            ctx.conn,
            application.id,
            pipeline_id,
            environment_id,
            &notification.config,
        )
        .with_context(|| {
            format!(
                "Unable to insert notification on application {}/{} on pipeline {}",
                ctx.project.key, application.name, notification.pipeline
            )
        })?;
    }
    Ok(())
}

/// Resolves a hook or poller target among the application's own pipelines.
fn resolve_bound_pipeline(
    ctx: &ApplyContext<'_>,
    attached: &AttachedApplication,
    name: &str,
) -> Result<Uuid, ImportError> {
    match attached.pipelines.get(name) {
        Some(id) => Ok(*id),
        None => {
            ctx.sink
                .send(Message::new(MessageKind::PipelineNotFound, [name]));
            Err(ImportError::PipelineNotFound(name.to_string()))
        }
    }
}

/// `None` is the default environment.
fn resolve_environment(ctx: &ApplyContext<'_>, environment: &EnvRef) -> Result<Option<Uuid>, ImportError> {
    let Some(name) = environment.named() else {
        return Ok(None);
    };

    store::load_environment(ctx.conn, ctx.project.id, name)
        .with_context(|| format!("Unable to load environment {}", name))?
        .map(|env| Some(env.id))
        .ok_or_else(|| ImportError::EnvironmentNotFound(name.to_string()))
}
