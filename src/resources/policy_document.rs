//! `vault_policy_document` data source: renders ACL rules as policy HCL
//! without talking to Vault.

use crate::provider::{DataSource, Field, FieldType, ProviderError, ProviderMeta, ResourceData, Schema};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::hash::{Hash, Hasher};

pub struct PolicyDocumentDataSource;

const CAPABILITIES: &[&str] = &[
    "create", "read", "update", "patch", "delete", "list", "sudo", "deny", "subscribe", "recover",
];

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct Rule {
    path: String,
    capabilities: Vec<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    required_parameters: Vec<String>,
    #[serde(default)]
    allowed_parameters: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    denied_parameters: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    min_wrapping_ttl: Option<String>,
    #[serde(default)]
    max_wrapping_ttl: Option<String>,
}

fn quoted_list(items: &[String]) -> String {
    let quoted: Vec<String> = items.iter().map(|i| format!("{:?}", i)).collect();
    format!("[{}]", quoted.join(", "))
}

fn write_parameters(out: &mut String, name: &str, params: &BTreeMap<String, Vec<String>>) {
    if params.is_empty() {
        return;
    }
    let _ = writeln!(out, "  {} = {{", name);
    for (key, values) in params {
        let _ = writeln!(out, "    {:?} = {}", key, quoted_list(values));
    }
    out.push_str("  }\n");
}

fn render_rule(rule: &Rule) -> String {
    let mut out = String::new();
    if let Some(description) = rule.description.as_deref().filter(|d| !d.is_empty()) {
        let _ = writeln!(out, "# {}", description);
    }
    let _ = writeln!(out, "path {:?} {{", rule.path);
    let _ = writeln!(out, "  capabilities = {}", quoted_list(&rule.capabilities));
    if !rule.required_parameters.is_empty() {
        let _ = writeln!(
            out,
            "  required_parameters = {}",
            quoted_list(&rule.required_parameters)
        );
    }
    write_parameters(&mut out, "allowed_parameters", &rule.allowed_parameters);
    write_parameters(&mut out, "denied_parameters", &rule.denied_parameters);
    if let Some(ttl) = &rule.min_wrapping_ttl {
        let _ = writeln!(out, "  min_wrapping_ttl = {:?}", ttl);
    }
    if let Some(ttl) = &rule.max_wrapping_ttl {
        let _ = writeln!(out, "  max_wrapping_ttl = {:?}", ttl);
    }
    out.push('}');
    out
}

/// Renders `rules` into a policy document, one `path` block per rule.
fn render(rules: &[Rule]) -> String {
    let blocks: Vec<String> = rules.iter().map(render_rule).collect();
    let mut hcl = blocks.join("\n\n");
    hcl.push('\n');
    hcl
}

fn parse_rules(d: &ResourceData) -> Result<Vec<Rule>, ProviderError> {
    let raw = d.get("rule").cloned().unwrap_or_else(|| serde_json::json!([]));
    let rules: Vec<Rule> = serde_json::from_value(raw)
        .map_err(|e| ProviderError::Validation(vec![format!("rule: {}", e)]))?;

    let mut errors = Vec::new();
    for (i, rule) in rules.iter().enumerate() {
        if rule.path.is_empty() {
            errors.push(format!("rule.{}.path: required", i));
        }
        for capability in &rule.capabilities {
            if !CAPABILITIES.contains(&capability.as_str()) {
                errors.push(format!(
                    "rule.{}.capabilities: unknown capability {:?}",
                    i, capability
                ));
            }
        }
    }
    if errors.is_empty() {
        Ok(rules)
    } else {
        Err(ProviderError::Validation(errors))
    }
}

#[async_trait]
impl DataSource for PolicyDocumentDataSource {
    fn type_name(&self) -> &'static str {
        "vault_policy_document"
    }

    fn schema(&self) -> Schema {
        Schema::new()
            .description("Generates policy HCL from a list of rules.")
            .field(
                "rule",
                Field::list(FieldType::Map)
                    .required()
                    .description("Objects with path, capabilities and optional parameter constraints."),
            )
            .field("hcl", Field::string().computed())
    }

    async fn read(&self, _meta: &ProviderMeta, d: &mut ResourceData) -> Result<(), ProviderError> {
        let rules = parse_rules(d)?;
        let hcl = render(&rules);
        let mut hasher = DefaultHasher::new();
        hcl.hash(&mut hasher);
        d.set_id(format!("{:016x}", hasher.finish()));
        d.set("hcl", hcl);
        Ok(())
    }
}
