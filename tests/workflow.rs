//! Plan, apply and destroy through manifest and state files, against the
//! in-memory backend.

use serde_json::json;
use std::sync::Arc;
use terravault::engine::Action;
use terravault::{Engine, Manifest, MemoryBackend, Provider, ProviderMeta, StateFile};

const MANIFEST: &str = r#"{
    "provider": {"address": "http://127.0.0.1:8200"},
    "resources": [
        {"type": "vault_policy", "name": "dev", "config": {"name": "dev", "policy": "path \"secret/*\" {}"}},
        {"type": "vault_mount", "name": "kv", "config": {"path": "kv", "type": "kv", "description": "app secrets"}},
        {"type": "vault_identity_group", "name": "devs", "config": {"name": "devs", "policies": ["dev"]},
         "depends_on": ["vault_policy.dev"]}
    ],
    "data": [
        {"type": "vault_policy_document", "name": "ro", "config": {"rule": [{"path": "kv/*", "capabilities": ["read"]}]}}
    ]
}"#;

fn engine(backend: &MemoryBackend) -> Engine {
    Engine::new(
        Provider::new(),
        ProviderMeta::new(Arc::new(backend.clone()), None),
        2,
    )
}

#[tokio::test]
async fn test_state_file_workflow() {
    let dir = tempfile::tempdir().unwrap();
    let manifest_path = dir.path().join("terravault.json");
    let state_path = dir.path().join("terravault.state.json");
    std::fs::write(&manifest_path, MANIFEST).unwrap();

    let backend = MemoryBackend::with_vault_conventions();
    let engine = engine(&backend);

    let manifest = Manifest::load(&manifest_path).unwrap();
    manifest.check(engine.provider()).unwrap();
    let mut state = StateFile::load(&state_path).unwrap();
    let plan = engine.plan(&manifest, &mut state).await.unwrap();
    assert_eq!(plan.summary(), "Plan: 3 to add, 0 to change, 0 to destroy.");
    assert_eq!(plan.data.len(), 1);
    engine.apply(&plan, &mut state).await.unwrap();
    state.save(&state_path).unwrap();

    // A fresh process sees the same state and nothing to do.
    let mut state = StateFile::load(&state_path).unwrap();
    assert_eq!(state.serial, 1);
    assert_eq!(state.resources.len(), 3);
    let plan = engine.plan(&manifest, &mut state).await.unwrap();
    assert!(!plan.has_changes(), "{}", plan.render());

    // Drop the mount and change the policy.
    let mut edited = manifest.clone();
    edited.resources.retain(|r| r.type_name != "vault_mount");
    edited.resources[0].config["policy"] = json!("path \"kv/*\" {}");
    let plan = engine.plan(&edited, &mut state).await.unwrap();
    assert_eq!(plan.count(Action::Delete), 1);
    assert_eq!(plan.count(Action::Update), 1);
    let summary = engine.apply(&plan, &mut state).await.unwrap();
    assert_eq!((summary.changed, summary.destroyed), (1, 1));
    assert!(!backend.contains("sys/mounts/kv"));
    state.save(&state_path).unwrap();

    let mut state = StateFile::load(&state_path).unwrap();
    assert_eq!(state.serial, 2);
    engine.destroy(&mut state).await.unwrap();
    assert!(state.resources.is_empty());
    assert!(!backend.contains("sys/policies/acl/dev"));
}
