//! Tests against a real Vault dev server.
//!
//! These use the fixture in `tests/common/mod.rs` and only run when
//! `TERRAVAULT_RUN_INTEGRATION_TESTS` is set; otherwise they return early.

mod common;

use serde_json::{json, Map, Value};
use terravault::engine::Action;
use terravault::vault::version::VAULT_VERSION_116;
use terravault::{Engine, Manifest, Provider, StateFile};

fn attrs(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap()
}

#[tokio::test]
async fn test_detects_server_version() {
    if !common::integration_enabled() {
        return;
    }
    let vault = common::VaultFixture::new().await;
    let meta = vault.meta().await;
    let version = meta.version().expect("version should be discovered");
    assert!(version.is_at_least(&VAULT_VERSION_116), "{}", version);
}

#[tokio::test]
async fn test_apply_converge_destroy() {
    if !common::integration_enabled() {
        return;
    }
    let vault = common::VaultFixture::new().await;
    let engine = Engine::new(Provider::new(), vault.meta().await, 4);
    let manifest: Manifest = serde_json::from_value(json!({
        "resources": [
            {
                "type": "vault_mount",
                "name": "app",
                "config": {"path": "app-kv", "type": "kv", "options": {"version": "2"}}
            },
            {
                "type": "vault_generic_secret",
                "name": "config",
                "config": {"path": "app-kv/config", "data_json": "{\"user\":\"app\"}"},
                "depends_on": ["vault_mount.app"]
            },
            {
                "type": "vault_policy",
                "name": "reader",
                "config": {"name": "reader", "policy": "path \"app-kv/data/*\" {\n  capabilities = [\"read\"]\n}\n"}
            },
            {
                "type": "vault_auth_backend",
                "name": "approle",
                "config": {"type": "approle"}
            },
            {
                "type": "vault_approle_auth_backend_role",
                "name": "app",
                "config": {"backend": "approle", "role_name": "app", "token_policies": ["reader"]},
                "depends_on": ["vault_auth_backend.approle", "vault_policy.reader"]
            },
            {
                "type": "vault_identity_group",
                "name": "devs",
                "config": {"name": "devs", "policies": ["reader"]}
            }
        ]
    }))
    .unwrap();

    let mut state = StateFile::default();
    let plan = engine.plan(&manifest, &mut state).await.unwrap();
    assert_eq!(plan.count(Action::Create), 6);
    let summary = engine.apply(&plan, &mut state).await.unwrap();
    assert_eq!(summary.added, 6);

    let secret = state.get("vault_generic_secret.config").unwrap();
    assert_eq!(secret.attributes["data"]["user"], "app");
    assert!(!state
        .get("vault_approle_auth_backend_role.app")
        .unwrap()
        .attributes["role_id"]
        .as_str()
        .unwrap()
        .is_empty());

    let plan = engine.plan(&manifest, &mut state).await.unwrap();
    assert_eq!(plan.count(Action::Create), 0, "{}", plan.render());
    assert_eq!(plan.count(Action::Delete), 0, "{}", plan.render());

    let summary = engine.destroy(&mut state).await.unwrap();
    assert_eq!(summary.destroyed, 6);
    assert!(state.resources.is_empty());
}

#[tokio::test]
async fn test_non_exclusive_group_policies() {
    if !common::integration_enabled() {
        return;
    }
    let vault = common::VaultFixture::new().await;
    let meta = vault.meta().await;
    let provider = Provider::new();

    let (group_id, _) = provider
        .create(
            &meta,
            "vault_identity_group",
            &attrs(json!({"name": "shared", "policies": ["base"]})),
        )
        .await
        .unwrap();

    let mut owned = Vec::new();
    for policy in ["team-a", "team-b"] {
        let instance = provider
            .create(
                &meta,
                "vault_identity_group_policies",
                &attrs(json!({"group_id": group_id, "policies": [policy], "exclusive": false})),
            )
            .await
            .unwrap();
        owned.push(instance);
    }

    let (_, group) = provider
        .read(&meta, "vault_identity_group", &group_id, &Map::new())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(group["policies"], json!(["base", "team-a", "team-b"]));

    let (id, attributes) = &owned[0];
    provider
        .delete(&meta, "vault_identity_group_policies", id, attributes)
        .await
        .unwrap();
    let (_, group) = provider
        .read(&meta, "vault_identity_group", &group_id, &Map::new())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(group["policies"], json!(["base", "team-b"]));
}

#[tokio::test]
async fn test_token_lifecycle() {
    if !common::integration_enabled() {
        return;
    }
    let vault = common::VaultFixture::new().await;
    let meta = vault.meta().await;
    let provider = Provider::new();

    let (accessor, token) = provider
        .create(
            &meta,
            "vault_token",
            &attrs(json!({"policies": ["reader"], "ttl": "1h", "no_parent": true})),
        )
        .await
        .unwrap();
    assert_eq!(token["policies"], json!(["reader"]));
    assert!(token["client_token"].as_str().unwrap().starts_with("hvs."));

    provider
        .delete(&meta, "vault_token", &accessor, &token)
        .await
        .unwrap();
    assert!(provider
        .read(&meta, "vault_token", &accessor, &token)
        .await
        .unwrap()
        .is_none());
}
