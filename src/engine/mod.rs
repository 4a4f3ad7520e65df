//! Drives the provider over a manifest and a state file.
//!
//! Operations on distinct resources run concurrently, at most `parallelism`
//! at a time, in waves that respect `depends_on`. Deletes (including the
//! destroy half of a replacement) finish before any create or update starts
//! and run in reverse dependency order. State records every operation that
//! succeeded even when others fail; dependents of a failed operation are
//! skipped.

pub mod graph;
pub mod manifest;
pub mod plan;
pub mod state;

pub use manifest::{Manifest, ResourceConfig};
pub use plan::{compute_plan, Action, Change, Plan};
pub use state::{ResourceState, StateFile};

use crate::provider::{Provider, ProviderMeta};
use anyhow::{anyhow, bail, Result};
use futures::StreamExt;
use std::collections::{HashMap, HashSet};
use tracing::{info, warn};

/// Counts of what an apply or destroy did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplySummary {
    pub added: usize,
    pub changed: usize,
    pub destroyed: usize,
}

impl std::fmt::Display for ApplySummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} added, {} changed, {} destroyed.",
            self.added, self.changed, self.destroyed
        )
    }
}

fn failed(errors: Vec<String>) -> anyhow::Error {
    anyhow!(
        "{} operation(s) failed:\n  {}",
        errors.len(),
        errors.join("\n  ")
    )
}

/// Addresses whose operation failed or was skipped, with messages.
#[derive(Default)]
struct Failures {
    addresses: HashSet<String>,
    messages: Vec<String>,
}

impl Failures {
    fn record(&mut self, address: &str, message: impl std::fmt::Display) {
        warn!("{}: {}", address, message);
        self.addresses.insert(address.to_string());
        self.messages.push(format!("{}: {}", address, message));
    }

    fn first_failed<'a>(&self, addresses: impl IntoIterator<Item = &'a String>) -> Option<&'a String> {
        addresses.into_iter().find(|a| self.addresses.contains(*a))
    }

    fn into_result<T>(self, value: T, context: String) -> Result<T> {
        if self.messages.is_empty() {
            return Ok(value);
        }
        Err(failed(self.messages).context(context))
    }
}

pub struct Engine {
    provider: Provider,
    meta: ProviderMeta,
    parallelism: usize,
}

impl Engine {
    pub fn new(provider: Provider, meta: ProviderMeta, parallelism: usize) -> Self {
        Self {
            provider,
            meta,
            parallelism: parallelism.max(1),
        }
    }

    pub fn provider(&self) -> &Provider {
        &self.provider
    }

    /// Re-reads every resource in `state`. Objects missing from Vault are
    /// dropped from state.
    pub async fn refresh(&self, state: &mut StateFile) -> Result<()> {
        let results: Vec<_> = futures::stream::iter(state.resources.clone())
            .map(|resource| async move {
                let read = self
                    .provider
                    .read(
                        &self.meta,
                        &resource.type_name,
                        &resource.id,
                        &resource.attributes,
                    )
                    .await;
                (resource, read)
            })
            .buffer_unordered(self.parallelism)
            .collect()
            .await;

        let mut errors = Vec::new();
        for (resource, read) in results {
            let address = resource.address();
            match read {
                Ok(Some((id, attributes))) => state.upsert(ResourceState {
                    id,
                    attributes,
                    ..resource
                }),
                Ok(None) => {
                    warn!("{} no longer exists, removing from state", address);
                    state.remove(&address);
                }
                Err(e) => errors.push(format!("{}: {}", address, e)),
            }
        }
        if !errors.is_empty() {
            return Err(failed(errors).context("refresh failed"));
        }
        Ok(())
    }

    /// Reads every data source declared in `manifest`.
    pub async fn read_data_sources(&self, manifest: &Manifest) -> Result<Vec<ResourceState>> {
        let results: Vec<_> = futures::stream::iter(manifest.data.iter())
            .map(|entry| async move {
                let read = self
                    .provider
                    .read_data_source(&self.meta, &entry.type_name, &entry.config)
                    .await;
                (entry, read)
            })
            .buffer_unordered(self.parallelism)
            .collect()
            .await;

        let mut data = Vec::new();
        let mut errors = Vec::new();
        for (entry, read) in results {
            match read {
                Ok((id, attributes)) => data.push(ResourceState {
                    type_name: entry.type_name.clone(),
                    name: entry.name.clone(),
                    id,
                    attributes,
                    depends_on: Vec::new(),
                }),
                Err(e) => errors.push(format!("data.{}: {}", entry.address(), e)),
            }
        }
        if !errors.is_empty() {
            return Err(failed(errors).context("reading data sources failed"));
        }
        data.sort_by_key(ResourceState::address);
        Ok(data)
    }

    /// Refreshes `state`, reads data sources and diffs against `manifest`.
    pub async fn plan(&self, manifest: &Manifest, state: &mut StateFile) -> Result<Plan> {
        manifest.check(&self.provider)?;
        self.refresh(state).await?;
        let data = self.read_data_sources(manifest).await?;
        let mut plan = compute_plan(&self.provider, &self.meta, manifest, state)?;
        plan.data = data;
        Ok(plan)
    }

    /// Deletes `targets` in reverse dependency order, keeping anything a
    /// failed delete still depends on. Returns the deleted addresses.
    async fn delete_in_order(
        &self,
        targets: Vec<ResourceState>,
        state: &mut StateFile,
        failures: &mut Failures,
    ) -> Result<HashSet<String>> {
        let nodes: Vec<graph::Node> = targets
            .iter()
            .map(|r| (r.address(), r.depends_on.clone()))
            .collect();
        let dependents = graph::dependents(&nodes);
        let mut waves = graph::waves(&nodes)?;
        waves.reverse();
        let mut by_address: HashMap<String, ResourceState> =
            targets.into_iter().map(|r| (r.address(), r)).collect();

        let mut deleted = HashSet::new();
        for wave in waves {
            let mut ready = Vec::new();
            for address in wave {
                let Some(resource) = by_address.remove(&address) else {
                    continue;
                };
                if let Some(blocker) =
                    failures.first_failed(dependents.get(&address).into_iter().flatten())
                {
                    failures.record(&address, format!("delete skipped, {} still exists", blocker));
                    continue;
                }
                ready.push(resource);
            }

            let results: Vec<_> = futures::stream::iter(ready)
                .map(|resource| async move {
                    let result = self
                        .provider
                        .delete(
                            &self.meta,
                            &resource.type_name,
                            &resource.id,
                            &resource.attributes,
                        )
                        .await;
                    (resource, result)
                })
                .buffer_unordered(self.parallelism)
                .collect()
                .await;

            for (resource, result) in results {
                let address = resource.address();
                match result {
                    Ok(()) => {
                        state.remove(&address);
                        deleted.insert(address);
                    }
                    Err(e) => failures.record(&address, format!("delete: {}", e)),
                }
            }
        }
        Ok(deleted)
    }

    /// Executes `plan`, recording results in `state`. The caller persists
    /// `state` whether or not this returns an error.
    pub async fn apply(&self, plan: &Plan, state: &mut StateFile) -> Result<ApplySummary> {
        let mut failures = Failures::default();

        for change in plan.changes.iter().filter(|c| c.action == Action::NoOp) {
            if let (Some(config), Some(prior)) = (&change.config, &change.prior) {
                state.upsert(ResourceState {
                    depends_on: config.depends_on.clone(),
                    ..prior.clone()
                });
            }
        }

        let doomed: Vec<ResourceState> = plan
            .changes
            .iter()
            .filter(|c| matches!(c.action, Action::Delete | Action::Replace))
            .filter_map(|c| c.prior.clone())
            .collect();
        let deleted = self.delete_in_order(doomed, state, &mut failures).await?;
        let mut summary = ApplySummary {
            destroyed: deleted.len(),
            ..Default::default()
        };

        let writes: HashMap<&str, (&Change, &ResourceConfig)> = plan
            .changes
            .iter()
            .filter(|c| match c.action {
                Action::Create | Action::Update => true,
                Action::Replace => deleted.contains(&c.address),
                Action::Delete | Action::NoOp => false,
            })
            .filter_map(|c| c.config.as_ref().map(|config| (c.address.as_str(), (c, config))))
            .collect();
        let nodes: Vec<graph::Node> = writes
            .values()
            .map(|(change, config)| (change.address.clone(), config.depends_on.clone()))
            .collect();

        for wave in graph::waves(&nodes)? {
            let mut ready = Vec::new();
            for address in wave {
                let Some(&(change, config)) = writes.get(address.as_str()) else {
                    continue;
                };
                if let Some(blocker) = failures.first_failed(&config.depends_on) {
                    failures.record(
                        &address,
                        format!("{} skipped, {} failed", change.action, blocker),
                    );
                    continue;
                }
                ready.push((change, config));
            }

            let results: Vec<_> = futures::stream::iter(ready)
                .map(|(change, config)| async move {
                    let result = match (&change.prior, change.action) {
                        (Some(prior), Action::Update) => {
                            self.provider
                                .update(
                                    &self.meta,
                                    &config.type_name,
                                    &prior.id,
                                    &prior.attributes,
                                    &config.config,
                                )
                                .await
                        }
                        _ => {
                            self.provider
                                .create(&self.meta, &config.type_name, &config.config)
                                .await
                        }
                    };
                    (change, config, result)
                })
                .buffer_unordered(self.parallelism)
                .collect()
                .await;

            for (change, config, result) in results {
                match result {
                    Ok((id, attributes)) => {
                        state.upsert(ResourceState {
                            type_name: config.type_name.clone(),
                            name: config.name.clone(),
                            id,
                            attributes,
                            depends_on: config.depends_on.clone(),
                        });
                        if change.action == Action::Update {
                            summary.changed += 1;
                        } else {
                            summary.added += 1;
                        }
                    }
                    Err(e) => failures.record(&change.address, format!("{}: {}", change.action, e)),
                }
            }
        }

        info!("Apply finished: {}", summary);
        let context = format!("apply incomplete ({})", summary);
        failures.into_result(summary, context)
    }

    /// Deletes every resource in `state`.
    pub async fn destroy(&self, state: &mut StateFile) -> Result<ApplySummary> {
        let mut failures = Failures::default();
        let targets = state.resources.clone();
        let deleted = self.delete_in_order(targets, state, &mut failures).await?;
        let summary = ApplySummary {
            destroyed: deleted.len(),
            ..Default::default()
        };
        info!("Destroy finished: {}", summary);
        let context = format!("destroy incomplete ({})", summary);
        failures.into_result(summary, context)
    }

    /// Reads the existing Vault object `id` into state as `address`.
    pub async fn import(&self, address: &str, id: &str, state: &mut StateFile) -> Result<()> {
        let (type_name, name) = manifest::parse_address(address)?;
        if state.get(address).is_some() {
            bail!("{} is already managed; remove it from state first", address);
        }
        let (id, attributes) = self.provider.import(&self.meta, type_name, id).await?;
        state.upsert(ResourceState {
            type_name: type_name.to_string(),
            name: name.to_string(),
            id,
            attributes,
            depends_on: Vec::new(),
        });
        info!("Imported {}", address);
        Ok(())
    }
}
