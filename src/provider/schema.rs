//! Resource schemas: typed fields, validation, planning and redaction.

use crate::provider::ProviderError;
use crate::vault::VaultVersion;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    String,
    Bool,
    Int,
    Float,
    List,
    Set,
    Map,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Validator {
    OneOf(&'static [&'static str]),
    NoTrailingSlash,
    NoLeadingTrailingSlashes,
    IntAtLeast(i64),
    /// A string holding a JSON object.
    JsonObject,
}

impl Validator {
    pub fn check(&self, value: &Value) -> Result<(), String> {
        match self {
            Validator::OneOf(allowed) => match value.as_str() {
                Some(s) if allowed.contains(&s) => Ok(()),
                _ => Err(format!("must be one of {:?}, got {}", allowed, value)),
            },
            Validator::NoTrailingSlash => match value.as_str() {
                Some(s) if s.ends_with('/') => Err(format!("{:?} must not end with '/'", s)),
                _ => Ok(()),
            },
            Validator::NoLeadingTrailingSlashes => match value.as_str() {
                Some(s) if s.starts_with('/') || s.ends_with('/') => {
                    Err(format!("{:?} must not start or end with '/'", s))
                }
                _ => Ok(()),
            },
            Validator::IntAtLeast(min) => match value.as_i64() {
                Some(n) if n < *min => Err(format!("must be at least {}, got {}", min, n)),
                _ => Ok(()),
            },
            Validator::JsonObject => {
                let raw = value.as_str().unwrap_or_default();
                match serde_json::from_str::<Value>(raw) {
                    Ok(Value::Object(_)) => Ok(()),
                    Ok(_) => Err("must be a JSON object".to_string()),
                    Err(e) => Err(format!("invalid JSON: {}", e)),
                }
            }
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Field {
    #[serde(rename = "type")]
    pub ty: FieldType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elem: Option<FieldType>,
    pub required: bool,
    pub optional: bool,
    pub computed: bool,
    pub sensitive: bool,
    pub force_new: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validator: Option<Validator>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_version: Option<VaultVersion>,
    #[serde(skip_serializing_if = "str::is_empty")]
    pub description: &'static str,
}

impl Field {
    fn of(ty: FieldType, elem: Option<FieldType>) -> Self {
        Self {
            ty,
            elem,
            required: false,
            optional: false,
            computed: false,
            sensitive: false,
            force_new: false,
            default: None,
            validator: None,
            min_version: None,
            description: "",
        }
    }

    pub fn string() -> Self {
        Self::of(FieldType::String, None)
    }

    pub fn bool() -> Self {
        Self::of(FieldType::Bool, None)
    }

    pub fn int() -> Self {
        Self::of(FieldType::Int, None)
    }

    pub fn float() -> Self {
        Self::of(FieldType::Float, None)
    }

    pub fn list(elem: FieldType) -> Self {
        Self::of(FieldType::List, Some(elem))
    }

    pub fn set(elem: FieldType) -> Self {
        Self::of(FieldType::Set, Some(elem))
    }

    /// A map of strings.
    pub fn map() -> Self {
        Self::of(FieldType::Map, Some(FieldType::String))
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self.optional = false;
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self.required = false;
        self
    }

    pub fn computed(mut self) -> Self {
        self.computed = true;
        self
    }

    pub fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }

    pub fn force_new(mut self) -> Self {
        self.force_new = true;
        self
    }

    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn validate(mut self, validator: Validator) -> Self {
        self.validator = Some(validator);
        self
    }

    pub fn min_version(mut self, version: &VaultVersion) -> Self {
        self.min_version = Some(version.clone());
        self
    }

    pub fn description(mut self, description: &'static str) -> Self {
        self.description = description;
        self
    }

    /// Set by the provider only, never by configuration.
    pub fn is_computed_only(&self) -> bool {
        self.computed && !self.optional && !self.required
    }

    fn zero(&self) -> Value {
        match self.ty {
            FieldType::String => Value::String(String::new()),
            FieldType::Bool => Value::Bool(false),
            FieldType::Int => Value::from(0),
            FieldType::Float => Value::from(0.0),
            FieldType::List | FieldType::Set => Value::Array(Vec::new()),
            FieldType::Map => Value::Object(Map::new()),
        }
    }

    fn type_matches(ty: FieldType, value: &Value) -> bool {
        match ty {
            FieldType::String => value.is_string(),
            FieldType::Bool => value.is_boolean(),
            FieldType::Int => value.is_i64() || value.is_u64(),
            FieldType::Float => value.is_number(),
            FieldType::List | FieldType::Set => value.is_array(),
            FieldType::Map => value.is_object(),
        }
    }

    fn check_type(&self, value: &Value) -> Result<(), String> {
        if !Self::type_matches(self.ty, value) {
            return Err(format!("expected {:?}, got {}", self.ty, value));
        }
        let elem = self.elem.unwrap_or(FieldType::String);
        let bad_elem = match value {
            Value::Array(items) => items.iter().find(|v| !Self::type_matches(elem, v)),
            Value::Object(map) if self.ty == FieldType::Map => {
                map.values().find(|v| !Self::type_matches(elem, v))
            }
            _ => None,
        };
        match bad_elem {
            Some(v) => Err(format!("expected elements of type {:?}, got {}", elem, v)),
            None => Ok(()),
        }
    }

    /// Sets are sorted and deduplicated. JSON-object strings are re-encoded
    /// compactly with sorted keys, so formatting is not a change.
    fn normalize(&self, value: &mut Value) {
        match (self.ty, &self.validator, &mut *value) {
            (FieldType::Set, _, Value::Array(items)) => {
                items.sort_by_key(|a| a.to_string());
                items.dedup();
            }
            (FieldType::String, Some(Validator::JsonObject), Value::String(raw)) => {
                if let Ok(parsed @ Value::Object(_)) = serde_json::from_str::<Value>(raw) {
                    *raw = parsed.to_string();
                }
            }
            _ => {}
        }
    }

    /// Equality with unset values standing in for the type's zero value.
    fn same(&self, a: Option<&Value>, b: Option<&Value>) -> bool {
        let zero = self.zero();
        let mut a = a.filter(|v| !v.is_null()).cloned().unwrap_or_else(|| zero.clone());
        let mut b = b.filter(|v| !v.is_null()).cloned().unwrap_or(zero);
        self.normalize(&mut a);
        self.normalize(&mut b);
        a == b
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Schema {
    pub fields: BTreeMap<&'static str, Field>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_version: Option<VaultVersion>,
    #[serde(skip_serializing_if = "str::is_empty")]
    pub description: &'static str,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, name: &'static str, field: Field) -> Self {
        self.fields.insert(name, field);
        self
    }

    /// Adds the per-resource `namespace` attribute.
    pub fn namespaced(self) -> Self {
        self.field(
            "namespace",
            Field::string()
                .optional()
                .force_new()
                .validate(Validator::NoLeadingTrailingSlashes)
                .description("Target namespace, relative to the provider's namespace."),
        )
    }

    pub fn min_version(mut self, version: &VaultVersion) -> Self {
        self.min_version = Some(version.clone());
        self
    }

    pub fn description(mut self, description: &'static str) -> Self {
        self.description = description;
        self
    }

    /// Checks `config` against the schema, collecting every problem found.
    pub fn validate(
        &self,
        config: &Map<String, Value>,
        version: Option<&VaultVersion>,
    ) -> Result<(), ProviderError> {
        let mut errors = Vec::new();

        if let (Some(required), Some(actual)) = (&self.min_version, version) {
            if actual < required {
                errors.push(format!(
                    "resource requires Vault {} or newer, server is {}",
                    required, actual
                ));
            }
        }

        for key in config.keys() {
            if !self.fields.contains_key(key.as_str()) {
                errors.push(format!("{}: unsupported attribute", key));
            }
        }

        for (name, field) in &self.fields {
            let value = config.get(*name).filter(|v| !v.is_null());
            match value {
                None if field.required => errors.push(format!("{}: required", name)),
                None => {}
                Some(_) if field.is_computed_only() => {
                    errors.push(format!("{}: computed attribute cannot be set", name))
                }
                Some(value) => {
                    if let Err(e) = field.check_type(value) {
                        errors.push(format!("{}: {}", name, e));
                        continue;
                    }
                    if let Some(validator) = &field.validator {
                        if let Err(e) = validator.check(value) {
                            errors.push(format!("{}: {}", name, e));
                        }
                    }
                    if let (Some(required), Some(actual)) = (&field.min_version, version) {
                        if actual < required {
                            errors.push(format!(
                                "{}: requires Vault {} or newer, server is {}",
                                name, required, actual
                            ));
                        }
                    }
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ProviderError::Validation(errors))
        }
    }

    pub fn apply_defaults(&self, config: &mut Map<String, Value>) {
        for (name, field) in &self.fields {
            if let Some(default) = &field.default {
                let unset = config.get(*name).map_or(true, Value::is_null);
                if unset {
                    config.insert(name.to_string(), default.clone());
                }
            }
        }
    }

    /// Normalizes set and JSON-object attributes in place.
    pub fn normalize(&self, attrs: &mut Map<String, Value>) {
        for (name, field) in &self.fields {
            if let Some(value) = attrs.get_mut(*name) {
                field.normalize(value);
            }
        }
    }

    /// Target attributes for an update: configured values win; optional
    /// computed attributes left out of `config` keep their prior value, as do
    /// computed-only attributes.
    pub fn planned(
        &self,
        prior: &Map<String, Value>,
        config: &Map<String, Value>,
    ) -> Map<String, Value> {
        let mut config = config.clone();
        self.apply_defaults(&mut config);

        let mut planned = Map::new();
        for (name, field) in &self.fields {
            let configured = config.get(*name).filter(|v| !v.is_null());
            let value = if field.is_computed_only() {
                prior.get(*name)
            } else if configured.is_some() {
                configured
            } else if field.computed {
                prior.get(*name)
            } else {
                None
            };
            if let Some(v) = value {
                planned.insert(name.to_string(), v.clone());
            }
        }
        self.normalize(&mut planned);
        planned
    }

    /// Configurable attributes whose value differs between `prior` and `planned`.
    pub fn changed_fields(
        &self,
        prior: &Map<String, Value>,
        planned: &Map<String, Value>,
    ) -> Vec<&'static str> {
        self.fields
            .iter()
            .filter(|(_, field)| !field.is_computed_only())
            .filter(|(name, field)| !field.same(prior.get(**name), planned.get(**name)))
            .map(|(name, _)| *name)
            .collect()
    }

    /// The subset of `changed` that forces replacement.
    pub fn replacement_fields(&self, changed: &[&'static str]) -> Vec<&'static str> {
        changed
            .iter()
            .filter(|name| self.fields.get(**name).is_some_and(|f| f.force_new))
            .copied()
            .collect()
    }

    /// A copy of `attrs` safe to print.
    pub fn redact(&self, attrs: &Map<String, Value>) -> Map<String, Value> {
        attrs
            .iter()
            .map(|(k, v)| {
                let sensitive = self.fields.get(k.as_str()).is_some_and(|f| f.sensitive);
                if sensitive && !v.is_null() {
                    (k.clone(), Value::String("(sensitive)".to_string()))
                } else {
                    (k.clone(), v.clone())
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vault::version::{VAULT_VERSION_112, VAULT_VERSION_115};
    use serde_json::json;

    fn attrs(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    fn schema() -> Schema {
        Schema::new()
            .field("name", Field::string().required().force_new())
            .field(
                "path",
                Field::string()
                    .optional()
                    .validate(Validator::NoLeadingTrailingSlashes),
            )
            .field("policies", Field::set(FieldType::String).optional())
            .field("ttl", Field::int().optional().default(3600))
            .field("secret", Field::string().optional().sensitive())
            .field("accessor", Field::string().computed())
            .field("role_id", Field::string().optional().computed())
            .field(
                "plugin_version",
                Field::string().optional().min_version(&VAULT_VERSION_115),
            )
            .field(
                "kind",
                Field::string()
                    .optional()
                    .validate(Validator::OneOf(&["internal", "external"])),
            )
            .namespaced()
    }

    #[test]
    fn test_validate_collects_all_errors() {
        let err = schema()
            .validate(
                &attrs(json!({
                    "path": "/bad/",
                    "policies": [1],
                    "accessor": "x",
                    "kind": "other",
                    "bogus": true
                })),
                None,
            )
            .unwrap_err();
        let ProviderError::Validation(errors) = err else {
            panic!("expected validation error");
        };
        assert_eq!(errors.len(), 6, "{:?}", errors);
        assert!(errors.iter().any(|e| e == "name: required"));
        assert!(errors.iter().any(|e| e.starts_with("bogus")));
        assert!(errors.iter().any(|e| e.starts_with("accessor")));
    }

    #[test]
    fn test_version_gating() {
        let config = attrs(json!({"name": "a", "plugin_version": "v1.0.0"}));
        assert!(schema()
            .validate(&config, Some(&*VAULT_VERSION_112))
            .is_err());
        assert!(schema()
            .validate(&config, Some(&*VAULT_VERSION_115))
            .is_ok());
        assert!(schema().validate(&config, None).is_ok());
    }

    #[test]
    fn test_json_object_validator() {
        assert!(Validator::JsonObject.check(&json!("{\"a\": 1}")).is_ok());
        assert!(Validator::JsonObject.check(&json!("[1]")).is_err());
        assert!(Validator::JsonObject.check(&json!("{")).is_err());
    }

    #[test]
    fn test_planned_keeps_computed_values() {
        let prior = attrs(json!({
            "name": "a",
            "ttl": 60,
            "accessor": "auth_123",
            "role_id": "generated",
            "secret": "s3cret"
        }));
        let config = attrs(json!({"name": "a", "policies": ["b", "a", "a"]}));
        let planned = schema().planned(&prior, &config);
        assert_eq!(planned["accessor"], "auth_123");
        assert_eq!(planned["role_id"], "generated");
        assert_eq!(planned["ttl"], 3600);
        assert_eq!(planned["policies"], json!(["a", "b"]));
        assert!(planned.get("secret").is_none());
    }

    #[test]
    fn test_changed_fields_and_replacement() {
        let s = schema();
        let prior = attrs(json!({"name": "a", "policies": [], "ttl": 60, "accessor": "x"}));
        let planned = attrs(json!({"name": "b", "ttl": 60}));
        let changed = s.changed_fields(&prior, &planned);
        assert_eq!(changed, vec!["name"]);
        assert_eq!(s.replacement_fields(&changed), vec!["name"]);

        let planned = attrs(json!({"name": "a", "ttl": 120, "policies": []}));
        let changed = s.changed_fields(&prior, &planned);
        assert_eq!(changed, vec!["ttl"]);
        assert!(s.replacement_fields(&changed).is_empty());
    }

    #[test]
    fn test_reformatted_json_is_not_a_change() {
        let s = Schema::new()
            .field("data_json", Field::string().required().validate(Validator::JsonObject));
        let prior = attrs(json!({"data_json": "{\"a\":1,\"b\":\"x\"}"}));

        let config = attrs(json!({"data_json": "{ \"b\": \"x\",\n  \"a\": 1 }"}));
        let planned = s.planned(&prior, &config);
        assert!(s.changed_fields(&prior, &planned).is_empty());

        let config = attrs(json!({"data_json": "{\"a\": 2, \"b\": \"x\"}"}));
        let planned = s.planned(&prior, &config);
        assert_eq!(s.changed_fields(&prior, &planned), vec!["data_json"]);
    }

    #[test]
    fn test_redact() {
        let redacted = schema().redact(&attrs(json!({"name": "a", "secret": "s3cret"})));
        assert_eq!(redacted["secret"], "(sensitive)");
        assert_eq!(redacted["name"], "a");
    }
}
