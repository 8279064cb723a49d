//! End-to-end flows over the in-memory backend: teams, environments,
//! variables, masking, import/export, audit, cascades.

use std::sync::Arc;

use cove_audit::{AuditLog, AuditQuery, VariableAction, CLEAR_ALL_KEY};
use cove_core::{
    Capability, CoreError, CredentialResolver, ExportFormat, Identity, ImportItem, ImportStatus,
    NewVariable, ProjectService, TeamRegistry, TeamSettingsUpdate, TokenKeeper, VariableChange,
    VariableService, DEFAULT_ENVIRONMENTS, MASKED_PLACEHOLDER,
};
use cove_crypto::CipherKey;
use cove_storage::{CreateUserParams, MembershipUpdate, Store, TeamRole};
use cove_store_memory::MemoryStore;

struct Harness {
    store: Arc<MemoryStore>,
    registry: TeamRegistry,
    projects: ProjectService,
    variables: VariableService,
    tokens: TokenKeeper,
}

impl Harness {
    fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let as_store: Arc<dyn Store> = store.clone();
        let as_audit: Arc<dyn AuditLog> = store.clone();
        let key = Arc::new(CipherKey::generate());
        Self {
            store: store.clone(),
            registry: TeamRegistry::new(as_store.clone(), as_audit.clone()),
            projects: ProjectService::new(as_store.clone(), as_audit.clone()),
            variables: VariableService::new(as_store, as_audit, key),
            tokens: TokenKeeper::new("integration-secret"),
        }
    }

    /// Create a user and resolve a freshly issued token, exercising the
    /// full credential path.
    async fn signup(&self, email: &str) -> Identity {
        let user_id = self
            .store
            .create_user(&CreateUserParams {
                email: email.to_string(),
                name: None,
                password_hash: cove_crypto::hash_password("pass1234").unwrap(),
            })
            .await
            .unwrap();
        let token = self.tokens.issue(&user_id, email).unwrap();
        self.tokens.resolve(&token).unwrap()
    }

    fn plain_variable(key: &str, value: &str) -> NewVariable {
        NewVariable {
            environment: "production".to_string(),
            key: key.to_string(),
            value: value.to_string(),
            description: None,
            is_commented: false,
            is_masked: false,
        }
    }
}

// ───────────────────────────────────── Teams ──────────────────────────────────────────

#[tokio::test]
async fn create_team_seeds_defaults_and_admin_membership() {
    let h = Harness::new();
    let owner = h.signup("owner@example.com").await;

    let summary = h.registry.create_team(&owner, "acme", "hunter2").await.unwrap();
    assert_eq!(summary.environments, DEFAULT_ENVIRONMENTS);
    assert_eq!(summary.member_count, 1);
    let join_code = summary.join_code.expect("creator sees the join code");
    assert_eq!(join_code.len(), 8);

    let overview = h.registry.team_overview(&owner).await.unwrap().unwrap();
    assert_eq!(overview.membership.role, TeamRole::Admin);
    assert!(overview.membership.can_download);
    assert!(overview.team.join_code.is_some());
}

#[tokio::test]
async fn teamless_user_has_no_overview_and_no_projects() {
    let h = Harness::new();
    let user = h.signup("solo@example.com").await;

    assert!(h.registry.team_overview(&user).await.unwrap().is_none());
    assert!(h.projects.list_projects(&user).await.unwrap().is_empty());
    assert!(matches!(
        h.projects.create_project(&user, "api").await,
        Err(CoreError::Validation(_))
    ));
}

#[tokio::test]
async fn join_team_by_code_and_password() {
    let h = Harness::new();
    let owner = h.signup("owner@example.com").await;
    let joiner = h.signup("dev@example.com").await;

    let summary = h.registry.create_team(&owner, "acme", "hunter2").await.unwrap();
    let code = summary.join_code.unwrap();

    assert!(matches!(
        h.registry.join_team(&joiner, "00000000", "hunter2", None).await,
        Err(CoreError::Validation(reason)) if reason == "invalid join code"
    ));
    assert!(matches!(
        h.registry.join_team(&joiner, &code, "wrong", None).await,
        Err(CoreError::Validation(reason)) if reason == "invalid password"
    ));

    let joined = h
        .registry
        .join_team(&joiner, &code, "hunter2", Some("Backend"))
        .await
        .unwrap();
    // members never see the join code
    assert!(joined.join_code.is_none());
    assert_eq!(joined.member_count, 2);

    let overview = h.registry.team_overview(&joiner).await.unwrap().unwrap();
    assert_eq!(overview.membership.role, TeamRole::Member);
    assert_eq!(overview.membership.title.as_deref(), Some("Backend"));

    // one team at a time, for joining and creating alike
    assert!(matches!(
        h.registry.join_team(&joiner, &code, "hunter2", None).await,
        Err(CoreError::Validation(_))
    ));
    assert!(matches!(
        h.registry.create_team(&joiner, "other", "hunter2").await,
        Err(CoreError::Validation(_))
    ));
}

#[tokio::test]
async fn short_team_password_is_rejected() {
    let h = Harness::new();
    let owner = h.signup("owner@example.com").await;
    assert!(matches!(
        h.registry.create_team(&owner, "acme", "abc").await,
        Err(CoreError::Validation(_))
    ));
}

#[tokio::test]
async fn regenerate_join_code_invalidates_the_old_one() {
    let h = Harness::new();
    let owner = h.signup("owner@example.com").await;
    let joiner = h.signup("dev@example.com").await;

    let summary = h.registry.create_team(&owner, "acme", "hunter2").await.unwrap();
    let team_id = summary.id;
    let old_code = summary.join_code.unwrap();

    let updated = h
        .registry
        .update_settings(
            &owner,
            &team_id,
            &TeamSettingsUpdate {
                regenerate_code: true,
                ..TeamSettingsUpdate::default()
            },
        )
        .await
        .unwrap();
    let new_code = updated.join_code.unwrap();
    assert_ne!(new_code, old_code);

    assert!(matches!(
        h.registry.join_team(&joiner, &old_code, "hunter2", None).await,
        Err(CoreError::Validation(_))
    ));
    h.registry
        .join_team(&joiner, &new_code, "hunter2", None)
        .await
        .unwrap();
}

#[tokio::test]
async fn empty_settings_update_is_rejected() {
    let h = Harness::new();
    let owner = h.signup("owner@example.com").await;
    let team_id = h
        .registry
        .create_team(&owner, "acme", "hunter2")
        .await
        .unwrap()
        .id;

    assert!(matches!(
        h.registry
            .update_settings(&owner, &team_id, &TeamSettingsUpdate::default())
            .await,
        Err(CoreError::Validation(_))
    ));
}

// ───────────────────────────────────── Environments ───────────────────────────────────

#[tokio::test]
async fn environment_add_normalizes_and_rejects_duplicates() {
    let h = Harness::new();
    let owner = h.signup("owner@example.com").await;
    let team_id = h
        .registry
        .create_team(&owner, "acme", "hunter2")
        .await
        .unwrap()
        .id;

    let envs = h
        .registry
        .add_environment(&owner, &team_id, "  QA Branch ")
        .await
        .unwrap();
    assert_eq!(
        envs,
        vec!["development", "staging", "production", "qa-branch"]
    );

    assert!(matches!(
        h.registry.add_environment(&owner, &team_id, "qa-branch").await,
        Err(CoreError::Validation(_))
    ));
    assert!(matches!(
        h.registry.add_environment(&owner, &team_id, "Prod/East").await,
        Err(CoreError::Validation(_))
    ));
}

#[tokio::test]
async fn environment_removal_never_empties_the_list() {
    let h = Harness::new();
    let owner = h.signup("owner@example.com").await;
    let team_id = h
        .registry
        .create_team(&owner, "acme", "hunter2")
        .await
        .unwrap()
        .id;

    let envs = h
        .registry
        .remove_environment(&owner, &team_id, "staging")
        .await
        .unwrap();
    assert_eq!(envs, vec!["development", "production"]);

    assert!(matches!(
        h.registry.remove_environment(&owner, &team_id, "absent").await,
        Err(CoreError::NotFound)
    ));

    h.registry
        .remove_environment(&owner, &team_id, "development")
        .await
        .unwrap();
    assert!(matches!(
        h.registry.remove_environment(&owner, &team_id, "production").await,
        Err(CoreError::Validation(reason)) if reason == "cannot remove the last environment"
    ));
}

#[tokio::test]
async fn environment_ops_require_admin() {
    let h = Harness::new();
    let owner = h.signup("owner@example.com").await;
    let joiner = h.signup("dev@example.com").await;

    let summary = h.registry.create_team(&owner, "acme", "hunter2").await.unwrap();
    let code = summary.join_code.unwrap();
    h.registry.join_team(&joiner, &code, "hunter2", None).await.unwrap();

    assert!(matches!(
        h.registry.add_environment(&joiner, &summary.id, "qa").await,
        Err(CoreError::Forbidden(_))
    ));
    assert!(matches!(
        h.registry.remove_environment(&joiner, &summary.id, "staging").await,
        Err(CoreError::Forbidden(_))
    ));
}

#[tokio::test]
async fn removed_environment_orphans_variables_until_readded() {
    let h = Harness::new();
    let owner = h.signup("owner@example.com").await;
    let team_id = h
        .registry
        .create_team(&owner, "acme", "hunter2")
        .await
        .unwrap()
        .id;
    let project = h.projects.create_project(&owner, "api").await.unwrap();

    let mut var = Harness::plain_variable("API_KEY", "secret123");
    var.environment = "staging".to_string();
    h.variables.create(&owner, &project.id, &var).await.unwrap();

    h.registry
        .remove_environment(&owner, &team_id, "staging")
        .await
        .unwrap();

    // the variable row survives the removal and is still readable
    let listed = h.variables.list(&owner, &project.id, "staging").await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].value, "secret123");

    let envs = h
        .registry
        .add_environment(&owner, &team_id, "staging")
        .await
        .unwrap();
    assert!(envs.contains(&"staging".to_string()));
}

// ───────────────────────────────────── Variables ──────────────────────────────────────

#[tokio::test]
async fn variable_round_trips_through_the_codec() {
    let h = Harness::new();
    let owner = h.signup("owner@example.com").await;
    h.registry.create_team(&owner, "acme", "hunter2").await.unwrap();
    let project = h.projects.create_project(&owner, "api").await.unwrap();

    let created = h
        .variables
        .create(&owner, &project.id, &Harness::plain_variable("API_KEY", "secret123"))
        .await
        .unwrap();
    assert_eq!(created.value, "secret123");
    assert!(created.can_reveal);

    let listed = h.variables.list(&owner, &project.id, "production").await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].value, "secret123");

    // stored ciphertext is not the plaintext
    let stored = h
        .store
        .find_variable(&project.id, "production", "API_KEY")
        .await
        .unwrap();
    assert_ne!(stored.value_ciphertext, b"secret123");
}

#[tokio::test]
async fn duplicate_key_rejected_and_original_untouched() {
    let h = Harness::new();
    let owner = h.signup("owner@example.com").await;
    h.registry.create_team(&owner, "acme", "hunter2").await.unwrap();
    let project = h.projects.create_project(&owner, "api").await.unwrap();

    h.variables
        .create(&owner, &project.id, &Harness::plain_variable("API_KEY", "original"))
        .await
        .unwrap();
    let err = h
        .variables
        .create(&owner, &project.id, &Harness::plain_variable("API_KEY", "other"))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Validation(_)));

    let listed = h.variables.list(&owner, &project.id, "production").await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].value, "original");

    // same key is fine in another environment
    let mut staging = Harness::plain_variable("API_KEY", "staging-value");
    staging.environment = "staging".to_string();
    h.variables.create(&owner, &project.id, &staging).await.unwrap();
}

#[tokio::test]
async fn masked_values_show_placeholder_without_download_permission() {
    let h = Harness::new();
    let owner = h.signup("owner@example.com").await;
    let member = h.signup("dev@example.com").await;

    let summary = h.registry.create_team(&owner, "acme", "hunter2").await.unwrap();
    let code = summary.join_code.unwrap();
    h.registry.join_team(&member, &code, "hunter2", None).await.unwrap();
    h.registry
        .update_member(
            &owner,
            &summary.id,
            &member.user_id,
            &MembershipUpdate {
                role: None,
                can_download: Some(false),
            },
        )
        .await
        .unwrap();

    let project = h.projects.create_project(&owner, "api").await.unwrap();
    let mut masked = Harness::plain_variable("DB_PASSWORD", "s3cr3t");
    masked.is_masked = true;
    h.variables.create(&owner, &project.id, &masked).await.unwrap();
    h.variables
        .create(&owner, &project.id, &Harness::plain_variable("PUBLIC_URL", "https://api"))
        .await
        .unwrap();

    let listed = h.variables.list(&member, &project.id, "production").await.unwrap();
    let masked_view = listed.iter().find(|v| v.key == "DB_PASSWORD").unwrap();
    assert_eq!(masked_view.value, MASKED_PLACEHOLDER);
    assert!(!masked_view.can_reveal);

    // unmasked values stay readable, but can_reveal still mirrors the
    // download permission
    let public_view = listed.iter().find(|v| v.key == "PUBLIC_URL").unwrap();
    assert_eq!(public_view.value, "https://api");
    assert!(!public_view.can_reveal);

    // the admin sees everything
    let listed = h.variables.list(&owner, &project.id, "production").await.unwrap();
    let masked_view = listed.iter().find(|v| v.key == "DB_PASSWORD").unwrap();
    assert_eq!(masked_view.value, "s3cr3t");
    assert!(masked_view.can_reveal);
}

#[tokio::test]
async fn unmasking_requires_download_permission_masking_does_not() {
    let h = Harness::new();
    let owner = h.signup("owner@example.com").await;
    let member = h.signup("dev@example.com").await;

    let summary = h.registry.create_team(&owner, "acme", "hunter2").await.unwrap();
    let code = summary.join_code.unwrap();
    h.registry.join_team(&member, &code, "hunter2", None).await.unwrap();
    h.registry
        .update_member(
            &owner,
            &summary.id,
            &member.user_id,
            &MembershipUpdate {
                role: None,
                can_download: Some(false),
            },
        )
        .await
        .unwrap();

    let project = h.projects.create_project(&owner, "api").await.unwrap();
    let mut masked = Harness::plain_variable("DB_PASSWORD", "s3cr3t");
    masked.is_masked = true;
    let created = h.variables.create(&owner, &project.id, &masked).await.unwrap();

    let err = h
        .variables
        .update(
            &member,
            &project.id,
            &created.id,
            &VariableChange {
                is_masked: Some(false),
                ..VariableChange::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Forbidden(_)));

    // masking is always permitted
    let plain = h
        .variables
        .create(&owner, &project.id, &Harness::plain_variable("TOKEN", "t"))
        .await
        .unwrap();
    let updated = h
        .variables
        .update(
            &member,
            &project.id,
            &plain.id,
            &VariableChange {
                is_masked: Some(true),
                ..VariableChange::default()
            },
        )
        .await
        .unwrap();
    assert!(updated.is_masked);
}

#[tokio::test]
async fn only_value_changes_are_audited() {
    let h = Harness::new();
    let owner = h.signup("owner@example.com").await;
    h.registry.create_team(&owner, "acme", "hunter2").await.unwrap();
    let project = h.projects.create_project(&owner, "api").await.unwrap();

    let created = h
        .variables
        .create(&owner, &project.id, &Harness::plain_variable("API_KEY", "v1"))
        .await
        .unwrap();

    // flag and description toggles leave no audit trace
    h.variables
        .update(
            &owner,
            &project.id,
            &created.id,
            &VariableChange {
                is_commented: Some(true),
                description: Some("external API credential".to_string()),
                ..VariableChange::default()
            },
        )
        .await
        .unwrap();
    let trail = h.projects.audit_trail(&owner, &project.id, None).await.unwrap();
    assert_eq!(trail.len(), 1);
    assert_eq!(trail[0].action, VariableAction::Create);

    // an empty value string is "no value change"
    h.variables
        .update(
            &owner,
            &project.id,
            &created.id,
            &VariableChange {
                value: Some(String::new()),
                ..VariableChange::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(
        h.projects.audit_trail(&owner, &project.id, None).await.unwrap().len(),
        1
    );

    // a real value change is audited with both snapshots
    h.variables
        .update(
            &owner,
            &project.id,
            &created.id,
            &VariableChange {
                value: Some("v2".to_string()),
                ..VariableChange::default()
            },
        )
        .await
        .unwrap();
    let trail = h.projects.audit_trail(&owner, &project.id, None).await.unwrap();
    assert_eq!(trail.len(), 2);
    assert_eq!(trail[0].action, VariableAction::Update);
    assert_eq!(trail[0].user_email.as_deref(), Some("owner@example.com"));

    let raw = h
        .store
        .query(&AuditQuery::for_project(project.id))
        .await
        .unwrap();
    let update_entry = raw.iter().find(|e| e.action == VariableAction::Update).unwrap();
    assert!(update_entry.previous_value.is_some());
    assert!(update_entry.new_value.is_some());
    assert_ne!(update_entry.previous_value, update_entry.new_value);
}

#[tokio::test]
async fn delete_appends_audit_with_previous_ciphertext() {
    let h = Harness::new();
    let owner = h.signup("owner@example.com").await;
    h.registry.create_team(&owner, "acme", "hunter2").await.unwrap();
    let project = h.projects.create_project(&owner, "api").await.unwrap();

    let created = h
        .variables
        .create(&owner, &project.id, &Harness::plain_variable("API_KEY", "v1"))
        .await
        .unwrap();
    h.variables.delete(&owner, &project.id, &created.id).await.unwrap();

    assert!(h.variables.list(&owner, &project.id, "production").await.unwrap().is_empty());

    let raw = h
        .store
        .query(&AuditQuery::for_project(project.id))
        .await
        .unwrap();
    assert_eq!(raw[0].action, VariableAction::Delete);
    assert!(raw[0].previous_value.is_some());
    assert!(raw[0].new_value.is_none());
}

#[tokio::test]
async fn clear_environment_is_admin_only_and_uses_sentinel() {
    let h = Harness::new();
    let owner = h.signup("owner@example.com").await;
    let member = h.signup("dev@example.com").await;

    let summary = h.registry.create_team(&owner, "acme", "hunter2").await.unwrap();
    let code = summary.join_code.unwrap();
    h.registry.join_team(&member, &code, "hunter2", None).await.unwrap();

    let project = h.projects.create_project(&owner, "api").await.unwrap();
    h.variables
        .create(&owner, &project.id, &Harness::plain_variable("A", "1"))
        .await
        .unwrap();
    h.variables
        .create(&owner, &project.id, &Harness::plain_variable("B", "2"))
        .await
        .unwrap();

    assert!(matches!(
        h.variables.clear_environment(&member, &project.id, "production").await,
        Err(CoreError::Forbidden(_))
    ));

    let removed = h
        .variables
        .clear_environment(&owner, &project.id, "production")
        .await
        .unwrap();
    assert_eq!(removed, 2);
    assert!(h.variables.list(&owner, &project.id, "production").await.unwrap().is_empty());

    // one sentinel entry, not one per deleted key
    let trail = h.projects.audit_trail(&owner, &project.id, None).await.unwrap();
    assert_eq!(trail[0].variable_key, CLEAR_ALL_KEY);
    assert_eq!(trail[0].action, VariableAction::Delete);
}

// ───────────────────────────────────── Import ─────────────────────────────────────────

#[tokio::test]
async fn import_without_override_skips_existing_keys() {
    let h = Harness::new();
    let owner = h.signup("owner@example.com").await;
    h.registry.create_team(&owner, "acme", "hunter2").await.unwrap();
    let project = h.projects.create_project(&owner, "api").await.unwrap();

    h.variables
        .create(&owner, &project.id, &Harness::plain_variable("EXISTING", "keep-me"))
        .await
        .unwrap();
    let before = h
        .store
        .find_variable(&project.id, "production", "EXISTING")
        .await
        .unwrap();

    let items = vec![
        ImportItem {
            key: "EXISTING".to_string(),
            value: "ignored".to_string(),
            description: None,
        },
        ImportItem {
            key: "FRESH".to_string(),
            value: "new-value".to_string(),
            description: None,
        },
    ];
    let outcomes = h
        .variables
        .import(&owner, &project.id, "production", &items, false)
        .await
        .unwrap();

    assert_eq!(outcomes.len(), 2);
    assert_eq!(outcomes[0].key, "EXISTING");
    assert_eq!(outcomes[0].status, ImportStatus::Skipped);
    assert_eq!(outcomes[1].status, ImportStatus::Created);

    // skipped means untouched, down to the ciphertext
    let after = h
        .store
        .find_variable(&project.id, "production", "EXISTING")
        .await
        .unwrap();
    assert_eq!(after.value_ciphertext, before.value_ciphertext);

    // no audit entry for the skip, one for the create
    let trail = h.projects.audit_trail(&owner, &project.id, None).await.unwrap();
    assert_eq!(trail.len(), 2); // initial create + imported create
    assert!(trail.iter().all(|e| e.action == VariableAction::Create));
}

#[tokio::test]
async fn import_with_override_rewrites_existing_keys() {
    let h = Harness::new();
    let owner = h.signup("owner@example.com").await;
    h.registry.create_team(&owner, "acme", "hunter2").await.unwrap();
    let project = h.projects.create_project(&owner, "api").await.unwrap();

    let mut described = Harness::plain_variable("EXISTING", "old");
    described.description = Some("kept when import has none".to_string());
    h.variables.create(&owner, &project.id, &described).await.unwrap();

    let items = vec![
        ImportItem {
            key: "EXISTING".to_string(),
            value: "new".to_string(),
            description: None,
        },
        ImportItem {
            key: "FRESH".to_string(),
            value: "brand-new".to_string(),
            description: None,
        },
    ];
    let outcomes = h
        .variables
        .import(&owner, &project.id, "production", &items, true)
        .await
        .unwrap();
    assert_eq!(outcomes[0].status, ImportStatus::Overridden);
    assert_eq!(outcomes[1].status, ImportStatus::Created);

    let listed = h.variables.list(&owner, &project.id, "production").await.unwrap();
    let existing = listed.iter().find(|v| v.key == "EXISTING").unwrap();
    assert_eq!(existing.value, "new");
    assert_eq!(existing.description.as_deref(), Some("kept when import has none"));

    let fresh = listed.iter().find(|v| v.key == "FRESH").unwrap();
    assert_eq!(fresh.value, "brand-new");
    assert!(!fresh.is_masked);
    assert!(!fresh.is_commented);

    // the override is audited as an update
    let trail = h.projects.audit_trail(&owner, &project.id, None).await.unwrap();
    assert!(trail.iter().any(|e| {
        e.action == VariableAction::Update && e.variable_key == "EXISTING"
    }));
}

#[tokio::test]
async fn import_env_parses_text_and_aborts_on_bad_lines() {
    let h = Harness::new();
    let owner = h.signup("owner@example.com").await;
    h.registry.create_team(&owner, "acme", "hunter2").await.unwrap();
    let project = h.projects.create_project(&owner, "api").await.unwrap();

    let outcomes = h
        .variables
        .import_env(
            &owner,
            &project.id,
            "production",
            "# comment\nAPI_KEY=\"secret123\"\n\nDB_URL=postgres://localhost/app\n",
            false,
        )
        .await
        .unwrap();
    assert_eq!(outcomes.len(), 2);
    assert!(outcomes.iter().all(|o| o.status == ImportStatus::Created));

    let listed = h.variables.list(&owner, &project.id, "production").await.unwrap();
    let api_key = listed.iter().find(|v| v.key == "API_KEY").unwrap();
    assert_eq!(api_key.value, "secret123"); // quotes stripped

    // a malformed line aborts the whole import
    let err = h
        .variables
        .import_env(&owner, &project.id, "production", "OK=1\nbroken line\n", false)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Validation(_)));
    assert!(h
        .variables
        .list(&owner, &project.id, "production")
        .await
        .unwrap()
        .iter()
        .all(|v| v.key != "OK"));
}

// ───────────────────────────────────── Export ─────────────────────────────────────────

#[tokio::test]
async fn export_env_respects_commented_flag() {
    let h = Harness::new();
    let owner = h.signup("owner@example.com").await;
    h.registry.create_team(&owner, "acme", "hunter2").await.unwrap();
    let project = h.projects.create_project(&owner, "api").await.unwrap();

    let created = h
        .variables
        .create(&owner, &project.id, &Harness::plain_variable("API_KEY", "secret123"))
        .await
        .unwrap();

    let text = h
        .variables
        .export(&owner, &project.id, "production", ExportFormat::Env)
        .await
        .unwrap();
    assert_eq!(text, "API_KEY=secret123");

    h.variables
        .update(
            &owner,
            &project.id,
            &created.id,
            &VariableChange {
                is_commented: Some(true),
                ..VariableChange::default()
            },
        )
        .await
        .unwrap();
    let text = h
        .variables
        .export(&owner, &project.id, "production", ExportFormat::Env)
        .await
        .unwrap();
    assert_eq!(text, "#API_KEY=secret123");

    let json = h
        .variables
        .export(&owner, &project.id, "production", ExportFormat::Json)
        .await
        .unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed["#API_KEY"], "secret123");
}

#[tokio::test]
async fn export_is_gated_by_download_permission_not_masking() {
    let h = Harness::new();
    let owner = h.signup("owner@example.com").await;
    let member = h.signup("dev@example.com").await;

    let summary = h.registry.create_team(&owner, "acme", "hunter2").await.unwrap();
    let code = summary.join_code.unwrap();
    h.registry.join_team(&member, &code, "hunter2", None).await.unwrap();

    let project = h.projects.create_project(&owner, "api").await.unwrap();
    let mut masked = Harness::plain_variable("DB_PASSWORD", "s3cr3t");
    masked.is_masked = true;
    h.variables.create(&owner, &project.id, &masked).await.unwrap();

    // download permission on: export returns true plaintext, masked or not
    let text = h
        .variables
        .export(&member, &project.id, "production", ExportFormat::Env)
        .await
        .unwrap();
    assert_eq!(text, "DB_PASSWORD=s3cr3t");

    h.registry
        .update_member(
            &owner,
            &summary.id,
            &member.user_id,
            &MembershipUpdate {
                role: None,
                can_download: Some(false),
            },
        )
        .await
        .unwrap();
    assert!(matches!(
        h.variables.export(&member, &project.id, "production", ExportFormat::Env).await,
        Err(CoreError::Forbidden(_))
    ));
}

// ───────────────────────────────────── Cascades & scope ───────────────────────────────

#[tokio::test]
async fn project_deletion_cascades_variables_and_audit() {
    let h = Harness::new();
    let owner = h.signup("owner@example.com").await;
    h.registry.create_team(&owner, "acme", "hunter2").await.unwrap();
    let project = h.projects.create_project(&owner, "api").await.unwrap();

    h.variables
        .create(&owner, &project.id, &Harness::plain_variable("API_KEY", "v"))
        .await
        .unwrap();
    h.projects.delete_project(&owner, &project.id).await.unwrap();

    // store-level queries scoped to the dead project return empty, not
    // an error
    assert!(h
        .store
        .list_variables(&project.id, "production")
        .await
        .unwrap()
        .is_empty());
    assert!(h
        .store
        .query(&AuditQuery::for_project(project.id))
        .await
        .unwrap()
        .is_empty());

    assert!(matches!(
        h.projects.get_project(&owner, &project.id).await,
        Err(CoreError::NotFound)
    ));
}

#[tokio::test]
async fn project_deletion_requires_admin() {
    let h = Harness::new();
    let owner = h.signup("owner@example.com").await;
    let member = h.signup("dev@example.com").await;

    let summary = h.registry.create_team(&owner, "acme", "hunter2").await.unwrap();
    let code = summary.join_code.unwrap();
    h.registry.join_team(&member, &code, "hunter2", None).await.unwrap();

    let project = h.projects.create_project(&owner, "api").await.unwrap();
    assert!(matches!(
        h.projects.delete_project(&member, &project.id).await,
        Err(CoreError::Forbidden(_))
    ));
}

#[tokio::test]
async fn foreign_team_projects_are_not_found() {
    let h = Harness::new();
    let owner_a = h.signup("a@example.com").await;
    let owner_b = h.signup("b@example.com").await;

    h.registry.create_team(&owner_a, "alpha", "hunter2").await.unwrap();
    h.registry.create_team(&owner_b, "beta", "hunter2").await.unwrap();
    let project = h.projects.create_project(&owner_a, "api").await.unwrap();

    // scope violations are indistinguishable from absence
    assert!(matches!(
        h.projects.get_project(&owner_b, &project.id).await,
        Err(CoreError::NotFound)
    ));
    assert!(matches!(
        h.variables.list(&owner_b, &project.id, "production").await,
        Err(CoreError::NotFound)
    ));
    assert!(matches!(
        h.projects.audit_trail(&owner_b, &project.id, None).await,
        Err(CoreError::NotFound)
    ));
}

#[tokio::test]
async fn team_deletion_cascades_everything() {
    let h = Harness::new();
    let owner = h.signup("owner@example.com").await;
    let team_id = h
        .registry
        .create_team(&owner, "acme", "hunter2")
        .await
        .unwrap()
        .id;
    let project = h.projects.create_project(&owner, "api").await.unwrap();
    h.variables
        .create(&owner, &project.id, &Harness::plain_variable("API_KEY", "v"))
        .await
        .unwrap();

    h.registry.delete_team(&owner, &team_id).await.unwrap();

    assert!(h.registry.team_overview(&owner).await.unwrap().is_none());
    assert!(h.store.membership_of(&owner.user_id).await.unwrap().is_none());
    assert!(h.store.list_projects(&team_id).await.unwrap().is_empty());
    assert!(h
        .store
        .list_variables(&project.id, "production")
        .await
        .unwrap()
        .is_empty());
    assert!(h
        .store
        .query(&AuditQuery::for_project(project.id))
        .await
        .unwrap()
        .is_empty());

    // and the user is free to start over
    h.registry.create_team(&owner, "fresh", "hunter2").await.unwrap();
}

// ───────────────────────────────────── Members ────────────────────────────────────────

#[tokio::test]
async fn member_administration() {
    let h = Harness::new();
    let owner = h.signup("owner@example.com").await;
    let member = h.signup("dev@example.com").await;

    let summary = h.registry.create_team(&owner, "acme", "hunter2").await.unwrap();
    let code = summary.join_code.unwrap();
    h.registry
        .join_team(&member, &code, "hunter2", Some("Backend"))
        .await
        .unwrap();

    let members = h.registry.list_members(&owner, &summary.id).await.unwrap();
    assert_eq!(members.len(), 2);
    let dev = members
        .iter()
        .find(|m| m.email.as_deref() == Some("dev@example.com"))
        .unwrap();
    assert_eq!(dev.role, TeamRole::Member);
    assert_eq!(dev.title.as_deref(), Some("Backend"));

    // no self-administration
    assert!(matches!(
        h.registry
            .update_member(
                &owner,
                &summary.id,
                &owner.user_id,
                &MembershipUpdate { role: Some(TeamRole::Member), can_download: None },
            )
            .await,
        Err(CoreError::Validation(_))
    ));
    assert!(matches!(
        h.registry.remove_member(&owner, &summary.id, &owner.user_id).await,
        Err(CoreError::Validation(_))
    ));

    // members cannot administer members
    assert!(matches!(
        h.registry.remove_member(&member, &summary.id, &owner.user_id).await,
        Err(CoreError::Forbidden(_))
    ));

    // promotion grants admin capabilities
    h.registry
        .update_member(
            &owner,
            &summary.id,
            &member.user_id,
            &MembershipUpdate { role: Some(TeamRole::Admin), can_download: None },
        )
        .await
        .unwrap();
    let promoted = h.registry.membership_of(&member).await.unwrap();
    assert!(cove_core::has_capability(&promoted, Capability::ManageTeam));

    // removal ends membership
    h.registry
        .remove_member(&owner, &summary.id, &member.user_id)
        .await
        .unwrap();
    assert!(h.registry.team_overview(&member).await.unwrap().is_none());
}
