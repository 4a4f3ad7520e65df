//! Plan computation: compares refreshed state with the manifest.

use crate::engine::manifest::{Manifest, ResourceConfig};
use crate::engine::state::{ResourceState, StateFile};
use crate::provider::{Provider, ProviderMeta};
use anyhow::{bail, Result};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::fmt;
use std::fmt::Write as _;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Create,
    Update,
    Replace,
    Delete,
    NoOp,
}

impl Action {
    fn symbol(self) -> &'static str {
        match self {
            Action::Create => "+",
            Action::Update => "~",
            Action::Replace => "-/+",
            Action::Delete => "-",
            Action::NoOp => " ",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Action::Create => "create",
            Action::Update => "update",
            Action::Replace => "replace",
            Action::Delete => "delete",
            Action::NoOp => "no-op",
        };
        f.write_str(name)
    }
}

/// One planned resource operation.
#[derive(Debug, Clone, Serialize)]
pub struct Change {
    pub address: String,
    pub action: Action,
    /// Refreshed state, absent for creates.
    #[serde(skip)]
    pub prior: Option<ResourceState>,
    /// Manifest configuration, absent for deletes.
    #[serde(skip)]
    pub config: Option<ResourceConfig>,
    pub changed: Vec<&'static str>,
    pub replace: Vec<&'static str>,
    /// Redacted attributes for display.
    pub before: Map<String, Value>,
    pub after: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Plan {
    pub changes: Vec<Change>,
    /// Data sources read while planning.
    #[serde(skip)]
    pub data: Vec<ResourceState>,
}

fn short(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => "(unset)".to_string(),
        Some(Value::String(s)) => format!("{:?}", s),
        Some(other) => other.to_string(),
    }
}

impl Plan {
    pub fn has_changes(&self) -> bool {
        self.changes.iter().any(|c| c.action != Action::NoOp)
    }

    pub fn count(&self, action: Action) -> usize {
        self.changes.iter().filter(|c| c.action == action).count()
    }

    pub fn summary(&self) -> String {
        let replaced = self.count(Action::Replace);
        format!(
            "Plan: {} to add, {} to change, {} to destroy.",
            self.count(Action::Create) + replaced,
            self.count(Action::Update),
            self.count(Action::Delete) + replaced
        )
    }

    /// Human-readable plan, sensitive values masked.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for change in self.changes.iter().filter(|c| c.action != Action::NoOp) {
            let _ = writeln!(
                out,
                "{} {} will be {}d",
                change.action.symbol(),
                change.address,
                change.action
            );
            match change.action {
                Action::Create => {
                    for (key, value) in &change.after {
                        let _ = writeln!(out, "    + {} = {}", key, short(Some(value)));
                    }
                }
                Action::Delete => {}
                _ => {
                    for field in &change.changed {
                        let marker = if change.replace.contains(field) {
                            " (forces replacement)"
                        } else {
                            ""
                        };
                        let _ = writeln!(
                            out,
                            "    ~ {} = {} -> {}{}",
                            field,
                            short(change.before.get(*field)),
                            short(change.after.get(*field)),
                            marker
                        );
                    }
                }
            }
        }
        if !self.has_changes() {
            out.push_str("No changes. Vault matches the manifest.\n");
        }
        out.push_str(&self.summary());
        out
    }
}

fn ordering(action: Action) -> u8 {
    match action {
        Action::Delete => 0,
        _ => 1,
    }
}

/// Diffs refreshed `state` against `manifest`. Invalid configurations are
/// reported together.
pub fn compute_plan(
    provider: &Provider,
    meta: &ProviderMeta,
    manifest: &Manifest,
    state: &StateFile,
) -> Result<Plan> {
    let mut changes = Vec::new();
    let mut errors = Vec::new();

    for entry in &manifest.resources {
        let address = entry.address();
        let resource = match provider.resource(&entry.type_name) {
            Ok(resource) => resource,
            Err(e) => {
                errors.push(format!("{}: {}", address, e));
                continue;
            }
        };
        let schema = resource.schema();
        let config = match provider.prepare_config(meta, &schema, &entry.config) {
            Ok(config) => config,
            Err(e) => {
                errors.push(format!("{}: {}", address, e));
                continue;
            }
        };

        let change = match state.get(&address).cloned() {
            None => Change {
                address,
                action: Action::Create,
                prior: None,
                config: Some(entry.clone()),
                changed: Vec::new(),
                replace: Vec::new(),
                before: Map::new(),
                after: schema.redact(&config),
            },
            Some(prior) => {
                let planned = schema.planned(&prior.attributes, &config);
                let changed = schema.changed_fields(&prior.attributes, &planned);
                let replace = schema.replacement_fields(&changed);
                let action = if changed.is_empty() {
                    Action::NoOp
                } else if !replace.is_empty() {
                    Action::Replace
                } else {
                    Action::Update
                };
                Change {
                    address,
                    action,
                    before: schema.redact(&prior.attributes),
                    after: schema.redact(&planned),
                    prior: Some(prior),
                    config: Some(entry.clone()),
                    changed,
                    replace,
                }
            }
        };
        changes.push(change);
    }

    if !errors.is_empty() {
        bail!("invalid configuration:\n  {}", errors.join("\n  "));
    }

    let wanted: HashSet<String> = manifest.resources.iter().map(|r| r.address()).collect();
    for resource in &state.resources {
        if wanted.contains(&resource.address()) {
            continue;
        }
        let before = provider
            .resource(&resource.type_name)
            .map(|r| r.schema().redact(&resource.attributes))
            .unwrap_or_default();
        changes.push(Change {
            address: resource.address(),
            action: Action::Delete,
            prior: Some(resource.clone()),
            config: None,
            changed: Vec::new(),
            replace: Vec::new(),
            before,
            after: Map::new(),
        });
    }

    changes.sort_by(|a, b| {
        ordering(a.action)
            .cmp(&ordering(b.action))
            .then_with(|| a.address.cmp(&b.address))
    });
    Ok(Plan {
        changes,
        data: Vec::new(),
    })
}
