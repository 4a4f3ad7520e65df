//! Dependency ordering between resources.
//!
//! Resources are grouped into waves: nothing in a wave depends on anything
//! else in the same wave, and every in-set dependency sits in an earlier
//! wave. Dependencies on addresses outside the node set are ignored.

use anyhow::{bail, Result};
use std::collections::{BTreeMap, HashMap, HashSet};

/// An address and the addresses it depends on.
pub type Node = (String, Vec<String>);

/// Groups `nodes` into waves with Kahn's algorithm. Each wave is sorted.
pub fn waves(nodes: &[Node]) -> Result<Vec<Vec<String>>> {
    let all: HashSet<&str> = nodes.iter().map(|(a, _)| a.as_str()).collect();

    let mut in_degree: BTreeMap<&str, usize> = BTreeMap::new();
    let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
    for (address, depends_on) in nodes {
        in_degree.entry(address.as_str()).or_insert(0);
        let deps: HashSet<&str> = depends_on
            .iter()
            .map(String::as_str)
            .filter(|d| all.contains(d))
            .collect();
        for dep in deps {
            *in_degree.entry(address.as_str()).or_insert(0) += 1;
            dependents.entry(dep).or_default().push(address.as_str());
        }
    }

    let mut current: Vec<&str> = in_degree
        .iter()
        .filter(|(_, degree)| **degree == 0)
        .map(|(address, _)| *address)
        .collect();
    let mut waves = Vec::new();
    let mut placed = 0;
    while !current.is_empty() {
        let mut next = Vec::new();
        for address in &current {
            for dependent in dependents.get(address).into_iter().flatten() {
                if let Some(degree) = in_degree.get_mut(dependent) {
                    *degree -= 1;
                    if *degree == 0 {
                        next.push(*dependent);
                    }
                }
            }
        }
        placed += current.len();
        current.sort_unstable();
        waves.push(current.iter().map(|a| a.to_string()).collect());
        current = next;
    }

    if placed != in_degree.len() {
        let stuck: Vec<&str> = in_degree
            .iter()
            .filter(|(_, degree)| **degree > 0)
            .map(|(address, _)| *address)
            .collect();
        bail!("dependency cycle between {}", stuck.join(", "));
    }
    Ok(waves)
}

/// For each address, the in-set addresses that depend on it.
pub fn dependents(nodes: &[Node]) -> HashMap<String, Vec<String>> {
    let all: HashSet<&str> = nodes.iter().map(|(a, _)| a.as_str()).collect();
    let mut out: HashMap<String, Vec<String>> = HashMap::new();
    for (address, depends_on) in nodes {
        for dep in depends_on.iter().filter(|d| all.contains(d.as_str())) {
            out.entry(dep.clone()).or_default().push(address.clone());
        }
    }
    out
}
