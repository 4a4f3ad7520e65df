//! `vault_pki_secret_backend_role`: certificate issuing roles at
//! `<backend>/roles/<name>`.

use crate::provider::error::on;
use crate::provider::{
    Field, FieldType, ProviderError, ProviderMeta, Resource, ResourceData, Schema, Validator,
};
use crate::resources::util::{mark_gone, split_id};
use crate::vault::version::{VAULT_VERSION_111, VAULT_VERSION_114, VAULT_VERSION_117};
use crate::vault::VaultVersion;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use serde_json::{Map, Value};

pub struct PkiRoleResource;

/// Role parameters that map one-to-one onto the API, with the first server
/// release that understands them.
static ROLE_FIELDS: Lazy<Vec<(&'static str, Option<&'static VaultVersion>)>> = Lazy::new(|| {
    let mut fields: Vec<(&'static str, Option<&'static VaultVersion>)> = [
        "ttl",
        "max_ttl",
        "allow_localhost",
        "allowed_domains",
        "allowed_domains_template",
        "allow_bare_domains",
        "allow_subdomains",
        "allow_glob_domains",
        "allow_wildcard_certificates",
        "allow_any_name",
        "enforce_hostnames",
        "allow_ip_sans",
        "allowed_uri_sans",
        "allowed_other_sans",
        "server_flag",
        "client_flag",
        "code_signing_flag",
        "email_protection_flag",
        "key_type",
        "key_bits",
        "key_usage",
        "ext_key_usage",
        "use_csr_common_name",
        "use_csr_sans",
        "ou",
        "organization",
        "country",
        "locality",
        "province",
        "street_address",
        "postal_code",
        "generate_lease",
        "no_store",
        "require_cn",
        "policy_identifiers",
        "basic_constraints_valid_for_non_ca",
        "not_before_duration",
    ]
    .into_iter()
    .map(|f| (f, None))
    .collect();
    fields.push(("issuer_ref", Some(&*VAULT_VERSION_111)));
    fields.push(("cn_validations", Some(&*VAULT_VERSION_114)));
    fields.push(("no_store_metadata", Some(&*VAULT_VERSION_117)));
    fields
});

fn parse_role_id(id: &str) -> Result<(String, String), ProviderError> {
    split_id(id, "/roles/")
        .map(|(backend, name)| (backend.to_string(), name.to_string()))
        .ok_or_else(|| ProviderError::InvalidId {
            id: id.to_string(),
            reason: "expected <backend>/roles/<name>".to_string(),
        })
}

fn supported<'a>(meta: &'a ProviderMeta) -> impl Iterator<Item = &'static str> + 'a {
    ROLE_FIELDS
        .iter()
        .filter(move |(_, min)| min.map_or(true, |v| meta.is_at_least(v)))
        .map(|(name, _)| *name)
}

fn role_payload(meta: &ProviderMeta, d: &ResourceData) -> Value {
    let mut payload = Map::new();
    for field in supported(meta) {
        if let Some(value) = d.get(field) {
            payload.insert(field.to_string(), value.clone());
        }
    }
    Value::Object(payload)
}

fn string_list_field() -> Field {
    Field::list(FieldType::String).optional().computed()
}

#[async_trait]
impl Resource for PkiRoleResource {
    fn type_name(&self) -> &'static str {
        "vault_pki_secret_backend_role"
    }

    fn schema(&self) -> Schema {
        let mut schema = Schema::new()
            .description("PKI secrets engine role.")
            .field("backend", Field::string().required().force_new())
            .field("name", Field::string().required().force_new())
            .field("ttl", Field::int().optional().computed())
            .field("max_ttl", Field::int().optional().computed())
            .field("allowed_domains", string_list_field())
            .field("allowed_uri_sans", string_list_field())
            .field("allowed_other_sans", string_list_field())
            .field(
                "key_type",
                Field::string()
                    .optional()
                    .default("rsa")
                    .validate(Validator::OneOf(&["rsa", "ec", "ed25519", "any"])),
            )
            .field("key_bits", Field::int().optional().computed())
            .field("key_usage", string_list_field())
            .field("ext_key_usage", string_list_field())
            .field("ou", string_list_field())
            .field("organization", string_list_field())
            .field("country", string_list_field())
            .field("locality", string_list_field())
            .field("province", string_list_field())
            .field("street_address", string_list_field())
            .field("postal_code", string_list_field())
            .field("policy_identifiers", string_list_field())
            .field("not_before_duration", Field::int().optional().computed())
            .field(
                "issuer_ref",
                Field::string()
                    .optional()
                    .computed()
                    .min_version(&VAULT_VERSION_111),
            )
            .field(
                "cn_validations",
                Field::list(FieldType::String)
                    .optional()
                    .computed()
                    .min_version(&VAULT_VERSION_114),
            )
            .field(
                "no_store_metadata",
                Field::bool().optional().min_version(&VAULT_VERSION_117),
            );
        for flag in [
            "allow_localhost",
            "allowed_domains_template",
            "allow_bare_domains",
            "allow_subdomains",
            "allow_glob_domains",
            "allow_wildcard_certificates",
            "allow_any_name",
            "enforce_hostnames",
            "allow_ip_sans",
            "server_flag",
            "client_flag",
            "code_signing_flag",
            "email_protection_flag",
            "use_csr_common_name",
            "use_csr_sans",
            "generate_lease",
            "no_store",
            "require_cn",
            "basic_constraints_valid_for_non_ca",
        ] {
            schema = schema.field(flag, Field::bool().optional().computed());
        }
        schema.namespaced()
    }

    async fn create(&self, meta: &ProviderMeta, d: &mut ResourceData) -> Result<(), ProviderError> {
        let path = format!(
            "{}/roles/{}",
            d.get_string("backend").trim_matches('/'),
            d.get_string("name")
        );
        meta.client_for(d)
            .write(&path, role_payload(meta, d))
            .await
            .map_err(on(&path))?;
        d.set_id(path);
        self.read(meta, d).await
    }

    async fn read(&self, meta: &ProviderMeta, d: &mut ResourceData) -> Result<(), ProviderError> {
        let path = d.id().to_string();
        let (backend, name) = parse_role_id(&path)?;
        let Some(secret) = meta.client_for(d).read(&path).await.map_err(on(&path))? else {
            mark_gone(d, &path);
            return Ok(());
        };
        let data = secret.data();
        d.set("backend", backend);
        d.set("name", name);
        let fields: Vec<&'static str> = supported(meta).collect();
        for field in fields {
            if let Some(value) = data.get(field).filter(|v| !v.is_null()) {
                d.set(field, value.clone());
            }
        }
        Ok(())
    }

    async fn update(&self, meta: &ProviderMeta, d: &mut ResourceData) -> Result<(), ProviderError> {
        let path = d.id().to_string();
        meta.client_for(d)
            .write(&path, role_payload(meta, d))
            .await
            .map_err(on(&path))?;
        self.read(meta, d).await
    }

    async fn delete(&self, meta: &ProviderMeta, d: &mut ResourceData) -> Result<(), ProviderError> {
        let path = d.id().to_string();
        meta.client_for(d).delete(&path).await.map_err(on(&path))?;
        Ok(())
    }

    fn import(&self, id: &str, d: &mut ResourceData) -> Result<(), ProviderError> {
        parse_role_id(id)?;
        d.set_id(id);
        Ok(())
    }
}
