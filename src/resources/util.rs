//! Field-copying helpers shared by the resource modules.

use crate::provider::{Field, FieldType, ResourceData, Schema};
use serde_json::{Map, Value};
use tracing::warn;

/// Builds a request body from the attributes of `d` named in `fields`.
/// Unset attributes are left out.
pub fn payload_from(d: &ResourceData, fields: &[&str]) -> Map<String, Value> {
    let mut payload = Map::new();
    for field in fields {
        if let Some(value) = d.get(field) {
            payload.insert(field.to_string(), value.clone());
        }
    }
    payload
}

/// Copies the keys of `data` named in `fields` onto `d`.
pub fn set_from(d: &mut ResourceData, data: &Map<String, Value>, fields: &[&str]) {
    for field in fields {
        if let Some(value) = data.get(*field) {
            d.set(field, value.clone());
        }
    }
}

/// Copies list fields, mapping Vault's `null` to an empty list.
pub fn set_lists_from(d: &mut ResourceData, data: &Map<String, Value>, fields: &[&str]) {
    for field in fields {
        let list = crate::provider::data::string_list(data.get(*field));
        d.set(field, list);
    }
}

/// Clears the ID so the instance drops out of state.
pub fn mark_gone(d: &mut ResourceData, path: &str) {
    warn!("{} not found, removing from state", path);
    d.set_id("");
}

/// Splits `<a>/<b>` style IDs into their parts.
pub fn split_id<'a>(id: &'a str, marker: &str) -> Option<(&'a str, &'a str)> {
    let (left, right) = id.split_once(marker)?;
    if left.is_empty() || right.is_empty() {
        return None;
    }
    Some((left, right))
}

pub const TOKEN_FIELDS: &[&str] = &[
    "token_ttl",
    "token_max_ttl",
    "token_period",
    "token_policies",
    "token_bound_cidrs",
    "token_explicit_max_ttl",
    "token_no_default_policy",
    "token_num_uses",
    "token_type",
];

/// The `token_*` parameters shared by auth backends that issue tokens.
pub fn with_token_fields(schema: Schema) -> Schema {
    schema
        .field(
            "token_ttl",
            Field::int().optional().description("Incremental lifetime of issued tokens, in seconds."),
        )
        .field(
            "token_max_ttl",
            Field::int().optional().description("Maximum lifetime of issued tokens, in seconds."),
        )
        .field("token_period", Field::int().optional())
        .field("token_policies", Field::set(FieldType::String).optional())
        .field("token_bound_cidrs", Field::set(FieldType::String).optional())
        .field("token_explicit_max_ttl", Field::int().optional())
        .field("token_no_default_policy", Field::bool().optional())
        .field("token_num_uses", Field::int().optional())
        .field(
            "token_type",
            Field::string()
                .optional()
                .default("default")
                .validate(crate::provider::Validator::OneOf(&[
                    "default",
                    "service",
                    "batch",
                    "default-service",
                    "default-batch",
                ])),
        )
}

/// Adds the `token_*` fields of `d` to `payload`. On update only changed
/// fields are sent.
pub fn token_payload(d: &ResourceData, payload: &mut Map<String, Value>) {
    for field in TOKEN_FIELDS {
        if !d.is_new_resource() && !d.has_change(field) {
            continue;
        }
        match d.get(field) {
            Some(value) => {
                payload.insert(field.to_string(), value.clone());
            }
            None if !d.is_new_resource() => {
                // Cleared in configuration: reset on the Vault side too.
                let reset = if field.ends_with("policies") || field.ends_with("cidrs") {
                    Value::Array(Vec::new())
                } else if *field == "token_no_default_policy" {
                    Value::Bool(false)
                } else if *field == "token_type" {
                    Value::String("default".to_string())
                } else {
                    Value::from(0)
                };
                payload.insert(field.to_string(), reset);
            }
            None => {}
        }
    }
}

pub fn read_token_fields(d: &mut ResourceData, data: &Map<String, Value>) {
    for field in TOKEN_FIELDS {
        match data.get(*field) {
            Some(Value::Null) | None => {}
            Some(value) if field.ends_with("policies") || field.ends_with("cidrs") => {
                d.set(field, crate::provider::data::string_list(Some(value)));
            }
            Some(value) => d.set(field, value.clone()),
        }
    }
}
