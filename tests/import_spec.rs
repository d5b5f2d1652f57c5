use axum::http::StatusCode;
use pipeport::db::Database;
use pipeport::import::{ImportError, ImportRequest, ImportStatus, Importer, ReplaceExisting};
use pipeport::models::*;
use pipeport::sanity::SanityCheck;

/// Project `PAY` with pipelines `build` and `deploy`, environments `prod` and
/// `staging`, and the global group `devs`.
fn setup() -> Database {
    let db = Database::open_memory().expect("Failed to create database");
    db.migrate().expect("Failed to migrate");
    db.create_project(CreateProjectInput {
        key: "PAY".to_string(),
        name: "Payments".to_string(),
    })
    .expect("Failed to create project");
    for pipeline in ["build", "deploy"] {
        db.create_pipeline("PAY", pipeline).expect("Failed to add pipeline");
    }
    for env in ["prod", "staging"] {
        db.create_environment("PAY", env).expect("Failed to add environment");
    }
    db.create_group("devs").expect("Failed to add group");
    db
}

fn yaml(body: &str) -> ImportRequest {
    ImportRequest {
        project_key: "PAY".to_string(),
        body: body.as_bytes().to_vec(),
        format: "yaml".to_string(),
        force_update: false,
        locale: Locale::En,
    }
}

fn forced(body: &str) -> ImportRequest {
    ImportRequest {
        force_update: true,
        ..yaml(body)
    }
}

fn detail(db: &Database, name: &str) -> Option<ApplicationDetail> {
    db.get_application_detail("PAY", name).expect("Query failed")
}

fn environment_id(db: &Database, name: &str) -> uuid::Uuid {
    db.get_project_with_catalog("PAY")
        .unwrap()
        .unwrap()
        .environments
        .into_iter()
        .find(|e| e.name == name)
        .map(|e| e.id)
        .expect("environment exists")
}

const WITH_HOOK: &str = r#"
name: api
repository:
  manager: github
  fullname: org/api
pipelines:
  - name: build
hooks:
  - pipeline: build
"#;

mod scenarios {
    use super::*;

    #[tokio::test]
    async fn missing_trigger_application_is_rejected() {
        let db = setup();
        let importer = Importer::new(db.clone());

        let outcome = importer
            .import(yaml(
                r#"
name: api
pipelines:
  - name: build
    triggers:
      - dest_pipeline: deploy
        dest_application: deploy-svc
"#,
            ))
            .await;

        assert_eq!(outcome.status, ImportStatus::Rejected);
        assert_eq!(outcome.messages, vec!["Application deploy-svc not found"]);
        assert!(matches!(outcome.error, Some(ImportError::ApplicationNotFound(ref n)) if n == "deploy-svc"));
        assert_eq!(outcome.status_code(), StatusCode::NOT_FOUND);
        assert!(detail(&db, "api").is_none());
    }

    #[tokio::test]
    async fn hook_on_existing_pipeline_is_committed() {
        let db = setup();
        let importer = Importer::new(db.clone());

        let outcome = importer.import(yaml(WITH_HOOK)).await;

        assert_eq!(outcome.status, ImportStatus::Committed);
        assert!(outcome.error.is_none());
        assert_eq!(outcome.status_code(), StatusCode::OK);
        assert_eq!(
            outcome.messages,
            vec![
                "Application api created",
                "Pipeline build attached to application api",
                "Hook created on repository org/api for pipeline build",
            ]
        );
        assert_eq!(
            outcome.messages.iter().filter(|m| m.starts_with("Hook created")).count(),
            1
        );

        let detail = detail(&db, "api").expect("application persisted");
        assert_eq!(detail.hooks.len(), 1);
        assert_eq!(detail.hooks[0].repository_fullname, "org/api");
        assert_eq!(detail.pipelines.len(), 1);
        assert!(outcome.warnings.is_empty());
    }

    #[tokio::test]
    async fn hook_on_unknown_pipeline_rolls_back() {
        let db = setup();
        let importer = Importer::new(db.clone());

        let outcome = importer
            .import(yaml(&WITH_HOOK.replace("- pipeline: build", "- pipeline: ghost")))
            .await;

        assert_eq!(outcome.status, ImportStatus::RolledBack);
        assert!(outcome.messages.contains(&"Pipeline ghost not found".to_string()));
        assert!(matches!(outcome.error, Some(ImportError::PipelineNotFound(ref n)) if n == "ghost"));
        assert!(detail(&db, "api").is_none());
        assert!(db.get_applications("PAY").unwrap().is_empty());
    }

    #[tokio::test]
    async fn existing_application_is_rejected_without_side_effects() {
        let db = setup();
        let importer = Importer::new(db.clone());
        importer.import(yaml(WITH_HOOK)).await;
        let before = db.get_project_by_key("PAY").unwrap().unwrap();

        let outcome = importer
            .import(yaml("name: api\npipelines:\n  - name: ghost\n"))
            .await;

        assert_eq!(outcome.status, ImportStatus::Rejected);
        assert!(outcome.messages.is_empty());
        assert!(matches!(outcome.error, Some(ImportError::AlreadyExists(ref n)) if n == "api"));
        assert_eq!(outcome.status_code(), StatusCode::CONFLICT);

        let after = db.get_project_by_key("PAY").unwrap().unwrap();
        assert_eq!(before.updated_at, after.updated_at);
        assert_eq!(detail(&db, "api").unwrap().hooks.len(), 1);
    }
}

mod validation {
    use super::*;

    #[tokio::test]
    async fn reports_every_missing_reference() {
        let db = setup();
        let importer = Importer::new(db.clone());

        let outcome = importer
            .import(yaml(
                r#"
name: api
pipelines:
  - name: ghost1
  - name: build
    triggers:
      - dest_pipeline: deploy
        dest_application: ghost-app
        src_environment: moon
        dest_environment: mars
  - name: ghost2
"#,
            ))
            .await;

        assert_eq!(outcome.status, ImportStatus::Rejected);
        assert_eq!(
            outcome.messages,
            vec![
                "Pipeline ghost1 not found",
                "Application ghost-app not found",
                "Environment moon not found",
                "Environment mars not found",
                "Pipeline ghost2 not found",
            ]
        );
        assert!(detail(&db, "api").is_none());
    }

    #[tokio::test]
    async fn last_missing_reference_decides_the_error() {
        let db = setup();
        let importer = Importer::new(db.clone());

        let outcome = importer
            .import(yaml(
                r#"
name: api
pipelines:
  - name: ghost
  - name: build
    triggers:
      - dest_pipeline: deploy
        dest_environment: mars
"#,
            ))
            .await;

        assert!(matches!(outcome.error, Some(ImportError::EnvironmentNotFound(ref n)) if n == "mars"));
        assert_eq!(outcome.messages.len(), 2);
    }

    #[tokio::test]
    async fn duplicate_misses_are_reported_once() {
        let db = setup();
        let importer = Importer::new(db.clone());

        let outcome = importer
            .import(yaml(
                r#"
name: api
pipelines:
  - name: build
    triggers:
      - dest_pipeline: deploy
        dest_environment: mars
      - dest_pipeline: build
        src_environment: mars
"#,
            ))
            .await;

        assert_eq!(outcome.status, ImportStatus::Rejected);
        assert_eq!(outcome.messages, vec!["Environment mars not found"]);
    }

    #[tokio::test]
    async fn default_environment_spellings_need_no_lookup() {
        let db = setup();
        let importer = Importer::new(db.clone());

        let outcome = importer
            .import(yaml(
                r#"
name: api
pipelines:
  - name: build
    triggers:
      - dest_pipeline: deploy
        src_environment: NoEnv
        dest_environment: ""
"#,
            ))
            .await;

        assert_eq!(outcome.status, ImportStatus::Committed);
        let trigger = &detail(&db, "api").unwrap().triggers[0];
        assert!(trigger.src_environment_id.is_none());
        assert!(trigger.dest_environment_id.is_none());
    }

    #[tokio::test]
    async fn renders_messages_in_requested_locale() {
        let db = setup();
        let importer = Importer::new(db.clone());

        let outcome = importer
            .import(ImportRequest {
                locale: Locale::Fr,
                ..yaml(
                    r#"
name: api
pipelines:
  - name: build
    triggers:
      - dest_pipeline: deploy
        dest_application: deploy-svc
"#,
                )
            })
            .await;

        assert_eq!(outcome.messages, vec!["Application deploy-svc introuvable"]);
    }

    #[tokio::test]
    async fn unknown_project_is_rejected() {
        let db = setup();
        let importer = Importer::new(db.clone());

        let outcome = importer
            .import(ImportRequest {
                project_key: "NOPE".to_string(),
                ..yaml(WITH_HOOK)
            })
            .await;

        assert_eq!(outcome.status, ImportStatus::Rejected);
        assert!(matches!(outcome.error, Some(ImportError::ProjectNotFound(_))));
        assert_eq!(outcome.status_code(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn unknown_group_is_rejected() {
        let db = setup();
        let importer = Importer::new(db.clone());

        let outcome = importer
            .import(yaml(
                "name: api\npermissions:\n  - group: ops\n    level: read\n",
            ))
            .await;

        assert_eq!(outcome.status, ImportStatus::Rejected);
        assert!(matches!(outcome.error, Some(ImportError::GroupNotFound(ref n)) if n == "ops"));
        assert!(outcome.messages.is_empty());
        assert!(detail(&db, "api").is_none());
    }

    #[tokio::test]
    async fn unreadable_requests_fail() {
        let db = setup();
        let importer = Importer::new(db.clone());

        let outcome = importer
            .import(ImportRequest {
                format: "toml".to_string(),
                ..yaml(WITH_HOOK)
            })
            .await;
        assert_eq!(outcome.status, ImportStatus::Failed);
        assert!(matches!(outcome.error, Some(ImportError::WrongRequest(_))));
        assert_eq!(outcome.status_code(), StatusCode::BAD_REQUEST);
        assert!(outcome.messages.is_empty());

        let outcome = importer.import(yaml("name: [unclosed")).await;
        assert_eq!(outcome.status, ImportStatus::Failed);
        assert!(matches!(outcome.error, Some(ImportError::WrongRequest(_))));
        assert_eq!(outcome.status_code(), StatusCode::BAD_REQUEST);

        let outcome = importer.import(yaml("pipelines: []\n")).await;
        assert_eq!(outcome.status, ImportStatus::Failed);
        assert!(db.get_applications("PAY").unwrap().is_empty());
    }
}

mod apply {
    use super::*;

    #[tokio::test]
    async fn creates_triggers_between_environments() {
        let db = setup();
        let importer = Importer::new(db.clone());

        let outcome = importer
            .import(yaml(
                r#"
name: api
pipelines:
  - name: build
    triggers:
      - dest_pipeline: deploy
        src_environment: staging
        dest_environment: prod
        manual: true
"#,
            ))
            .await;

        assert_eq!(outcome.status, ImportStatus::Committed);
        assert!(outcome
            .messages
            .contains(&"Trigger from pipeline build to pipeline deploy created".to_string()));

        let detail = detail(&db, "api").unwrap();
        assert_eq!(detail.triggers.len(), 1);
        let trigger = &detail.triggers[0];
        assert_eq!(trigger.dest_application_id, detail.application.id);
        assert_eq!(trigger.src_environment_id, Some(environment_id(&db, "staging")));
        assert_eq!(trigger.dest_environment_id, Some(environment_id(&db, "prod")));
        assert!(trigger.manual);
    }

    #[tokio::test]
    async fn triggers_can_target_another_application() {
        let db = setup();
        let importer = Importer::new(db.clone());
        importer
            .import(yaml("name: web\npipelines:\n  - name: deploy\n"))
            .await;

        let outcome = importer
            .import(yaml(
                r#"
name: api
pipelines:
  - name: build
    triggers:
      - dest_pipeline: deploy
        dest_application: web
"#,
            ))
            .await;

        assert_eq!(outcome.status, ImportStatus::Committed);
        let web = db.get_application("PAY", "web").unwrap().unwrap();
        assert_eq!(detail(&db, "api").unwrap().triggers[0].dest_application_id, web.id);
    }

    #[tokio::test]
    async fn creates_pollers() {
        let db = setup();
        let importer = Importer::new(db.clone());

        let outcome = importer
            .import(yaml(
                r#"
name: api
repository:
  manager: github
  fullname: org/api
pipelines:
  - name: build
pollers:
  - pipeline: build
    enabled: false
"#,
            ))
            .await;

        assert_eq!(outcome.status, ImportStatus::Committed);
        assert!(outcome
            .messages
            .contains(&"Poller created on repository org/api for pipeline build".to_string()));
        let detail = detail(&db, "api").unwrap();
        assert_eq!(detail.pollers.len(), 1);
        assert!(!detail.pollers[0].enabled);
    }

    #[tokio::test]
    async fn first_failing_hook_stops_the_apply() {
        let db = setup();
        let importer = Importer::new(db.clone());

        let outcome = importer
            .import(yaml(
                r#"
name: api
repository:
  manager: github
  fullname: org/api
pipelines:
  - name: build
hooks:
  - pipeline: ghost
  - pipeline: build
pollers:
  - pipeline: build
"#,
            ))
            .await;

        assert_eq!(outcome.status, ImportStatus::RolledBack);
        assert_eq!(outcome.messages.last().unwrap(), "Pipeline ghost not found");
        assert!(!outcome.messages.iter().any(|m| m.starts_with("Hook created")));
        assert!(!outcome.messages.iter().any(|m| m.starts_with("Poller created")));
        assert!(detail(&db, "api").is_none());
    }

    #[tokio::test]
    async fn missing_trigger_destination_pipeline_rolls_back() {
        let db = setup();
        let importer = Importer::new(db.clone());

        let outcome = importer
            .import(yaml(
                r#"
name: api
pipelines:
  - name: build
    triggers:
      - dest_pipeline: ghost
"#,
            ))
            .await;

        assert_eq!(outcome.status, ImportStatus::RolledBack);
        assert!(matches!(outcome.error, Some(ImportError::PipelineNotFound(ref n)) if n == "ghost"));
        assert_eq!(outcome.messages.last().unwrap(), "Pipeline ghost not found");
        assert!(!outcome.messages.iter().any(|m| m.starts_with("Trigger from")));
        assert!(detail(&db, "api").is_none());
    }

    #[tokio::test]
    async fn notification_in_unknown_environment_rolls_back() {
        let db = setup();
        let importer = Importer::new(db.clone());

        let outcome = importer
            .import(yaml(
                r#"
name: api
pipelines:
  - name: build
notifications:
  - pipeline: build
    environment: mars
    recipients: [ops@example.com]
"#,
            ))
            .await;

        assert_eq!(outcome.status, ImportStatus::RolledBack);
        assert!(matches!(outcome.error, Some(ImportError::EnvironmentNotFound(ref n)) if n == "mars"));
        assert!(!outcome.messages.iter().any(|m| m.contains("mars")));
        assert!(detail(&db, "api").is_none());
    }

    #[tokio::test]
    async fn hooks_need_a_repository() {
        let db = setup();
        let importer = Importer::new(db.clone());

        let outcome = importer
            .import(yaml("name: api\npipelines:\n  - name: build\nhooks:\n  - pipeline: build\n"))
            .await;

        assert_eq!(outcome.status, ImportStatus::Committed);
        assert!(detail(&db, "api").unwrap().hooks.is_empty());
    }

    #[tokio::test]
    async fn notifications_are_stored_silently() {
        let db = setup();
        let importer = Importer::new(db.clone());

        let outcome = importer
            .import(yaml(
                r#"
name: api
pipelines:
  - name: build
notifications:
  - pipeline: build
    environment: prod
    kind: jabber
    on_start: true
    recipients: [ops@example.com]
"#,
            ))
            .await;

        assert_eq!(outcome.status, ImportStatus::Committed);
        assert_eq!(
            outcome.messages,
            vec![
                "Application api created",
                "Pipeline build attached to application api",
            ]
        );

        let detail = detail(&db, "api").unwrap();
        assert_eq!(detail.notifications.len(), 1);
        let notification = &detail.notifications[0];
        assert_eq!(notification.environment_id, Some(environment_id(&db, "prod")));
        assert_eq!(notification.config.kind, NotificationKind::Jabber);
        assert_eq!(notification.config.on_success, NotifyWhen::Change);
        assert_eq!(notification.config.on_failure, NotifyWhen::Always);
        assert!(notification.config.on_start);
    }

    #[tokio::test]
    async fn notification_on_unattached_pipeline_rolls_back() {
        let db = setup();
        let importer = Importer::new(db.clone());

        let outcome = importer
            .import(yaml(
                r#"
name: api
pipelines:
  - name: build
notifications:
  - pipeline: deploy
    recipients: [ops@example.com]
"#,
            ))
            .await;

        assert_eq!(outcome.status, ImportStatus::RolledBack);
        assert!(matches!(outcome.error, Some(ImportError::PipelineNotFound(ref n)) if n == "deploy"));
        assert!(!outcome.messages.iter().any(|m| m.contains("deploy")));
        assert!(detail(&db, "api").is_none());
    }

    #[tokio::test]
    async fn grants_group_permissions() {
        let db = setup();
        let importer = Importer::new(db.clone());

        let outcome = importer
            .import(yaml(
                "name: api\npermissions:\n  - group: devs\n    level: read_execute\n",
            ))
            .await;

        assert_eq!(outcome.status, ImportStatus::Committed);
        let groups = detail(&db, "api").unwrap().groups;
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].group_name, "devs");
        assert_eq!(groups[0].level, PermissionLevel::ReadExecute);
    }

    #[tokio::test]
    async fn accepts_json_descriptors() {
        let db = setup();
        let importer = Importer::new(db.clone());

        let outcome = importer
            .import(ImportRequest {
                format: "json".to_string(),
                ..yaml(r#"{"name": "api", "pipelines": [{"name": "build"}]}"#)
            })
            .await;

        assert_eq!(outcome.status, ImportStatus::Committed);
        assert_eq!(outcome.application.unwrap().name, "api");
    }

    #[tokio::test]
    async fn touches_the_project() {
        let db = setup();
        let importer = Importer::new(db.clone());
        let before = db.get_project_by_key("PAY").unwrap().unwrap();

        importer.import(yaml(WITH_HOOK)).await;

        let after = db.get_project_by_key("PAY").unwrap().unwrap();
        assert!(after.updated_at > before.updated_at);
    }
}

mod force_update {
    use super::*;
    use pipeport::db::store;
    use pipeport::import::{ApplyContext, AttachedApplication, ResolvedPermission, UpdateStrategy};

    /// Wipes the application's bindings, then fails as a broken store would.
    struct FailsAfterClearing;

    impl UpdateStrategy for FailsAfterClearing {
        fn update(
            &self,
            ctx: &ApplyContext<'_>,
            existing: Application,
            _descriptor: &ApplicationDescriptor,
            _permissions: &[ResolvedPermission],
        ) -> Result<Option<AttachedApplication>, ImportError> {
            store::clear_application_bindings(ctx.conn, existing.id)?;
            Err(anyhow::anyhow!("disk I/O error").into())
        }
    }

    const REPLACEMENT: &str = r#"
name: api
pipelines:
  - name: deploy
"#;

    #[tokio::test]
    async fn preserves_the_existing_application_by_default() {
        let db = setup();
        let importer = Importer::new(db.clone());
        let first = importer.import(yaml(WITH_HOOK)).await.application.unwrap();

        let outcome = importer.import(forced(REPLACEMENT)).await;

        assert_eq!(outcome.status, ImportStatus::Committed);
        assert!(outcome.messages.is_empty());
        assert_eq!(outcome.application.unwrap().id, first.id);

        let detail = detail(&db, "api").unwrap();
        assert_eq!(detail.pipelines[0].name, "build");
        assert_eq!(detail.hooks.len(), 1);
    }

    #[tokio::test]
    async fn still_validates_references() {
        let db = setup();
        let importer = Importer::new(db.clone());
        importer.import(yaml(WITH_HOOK)).await;

        let outcome = importer
            .import(forced("name: api\npipelines:\n  - name: ghost\n"))
            .await;

        assert_eq!(outcome.status, ImportStatus::Rejected);
        assert_eq!(outcome.messages, vec!["Pipeline ghost not found"]);
    }

    #[tokio::test]
    async fn store_failure_during_apply_persists_nothing() {
        let db = setup();
        let importer = Importer::new(db.clone()).with_update_strategy(FailsAfterClearing);
        importer.import(yaml(WITH_HOOK)).await;

        let outcome = importer.import(forced(REPLACEMENT)).await;

        assert_eq!(outcome.status, ImportStatus::RolledBack);
        assert!(matches!(outcome.error, Some(ImportError::Store(_))));
        assert_eq!(outcome.status_code(), StatusCode::INTERNAL_SERVER_ERROR);

        let detail = detail(&db, "api").unwrap();
        assert_eq!(detail.pipelines.len(), 1);
        assert_eq!(detail.pipelines[0].name, "build");
        assert_eq!(detail.hooks.len(), 1);
    }

    #[tokio::test]
    async fn replace_strategy_rebuilds_the_application() {
        let db = setup();
        let importer = Importer::new(db.clone()).with_update_strategy(ReplaceExisting);
        let first = importer.import(yaml(WITH_HOOK)).await.application.unwrap();

        let outcome = importer.import(forced(REPLACEMENT)).await;

        assert_eq!(outcome.status, ImportStatus::Committed);
        assert_eq!(outcome.messages[0], "Application api updated");

        let detail = detail(&db, "api").unwrap();
        assert_eq!(detail.application.id, first.id);
        assert!(detail.application.repository.is_none());
        assert_eq!(detail.pipelines.len(), 1);
        assert_eq!(detail.pipelines[0].name, "deploy");
        assert!(detail.hooks.is_empty());
    }
}

mod sanity {
    use super::*;

    struct Broken;

    impl SanityCheck for Broken {
        fn check(
            &self,
            _db: &Database,
            _project: &Project,
            _application: &Application,
        ) -> anyhow::Result<Vec<Warning>> {
            anyhow::bail!("warning store unavailable")
        }
    }

    #[tokio::test]
    async fn reports_warnings_after_commit() {
        let db = setup();
        let importer = Importer::new(db.clone());

        let outcome = importer
            .import(yaml(
                r#"
name: api
repository:
  manager: github
  fullname: org/api
notifications: []
"#,
            ))
            .await;

        assert_eq!(outcome.status, ImportStatus::Committed);
        let kinds: Vec<_> = outcome.warnings.iter().map(|w| w.kind).collect();
        assert_eq!(
            kinds,
            vec![WarningKind::NoPipelines, WarningKind::RepositoryWithoutTriggers]
        );
        assert_eq!(detail(&db, "api").unwrap().warnings.len(), 2);
    }

    #[tokio::test]
    async fn flags_notifications_without_recipients() {
        let db = setup();
        let importer = Importer::new(db.clone());

        let outcome = importer
            .import(yaml(
                "name: api\npipelines:\n  - name: build\nnotifications:\n  - pipeline: build\n",
            ))
            .await;

        assert_eq!(outcome.warnings.len(), 1);
        assert_eq!(outcome.warnings[0].kind, WarningKind::NotificationWithoutRecipients);
    }

    #[tokio::test]
    async fn failing_check_keeps_the_import() {
        let db = setup();
        let importer = Importer::new(db.clone()).with_sanity_check(Broken);

        let outcome = importer.import(yaml(WITH_HOOK)).await;

        assert_eq!(outcome.status, ImportStatus::Committed);
        assert!(matches!(outcome.error, Some(ImportError::Advisory(_))));
        assert_eq!(outcome.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(detail(&db, "api").is_some());
    }
}
