//! Built-in resources and data sources.
//!
//! Each module maps one Vault object family onto a schema plus CRUD handlers.
//! `register_all` wires them into a [`Provider`].

pub mod approle_role;
pub mod auth_backend;
pub mod database_connection;
pub mod generic_secret;
pub mod identity_entity;
pub mod identity_group;
pub mod identity_membership;
pub mod mfa_totp;
pub mod mount;
pub mod oidc_client;
pub mod pki_role;
pub mod policy;
pub mod policy_document;
pub mod quota_rate_limit;
pub mod secrets_sync_aws;
pub mod token;
pub mod util;

use crate::provider::Provider;
use identity_membership::MembershipResource;
use std::sync::Arc;

pub fn register_all(provider: &mut Provider) {
    provider.register_resource(Arc::new(policy::PolicyResource));
    provider.register_resource(Arc::new(mount::MountResource));
    provider.register_resource(Arc::new(auth_backend::AuthBackendResource));
    provider.register_resource(Arc::new(generic_secret::GenericSecretResource));
    provider.register_resource(Arc::new(identity_entity::IdentityEntityResource));
    provider.register_resource(Arc::new(MembershipResource::entity_policies()));
    provider.register_resource(Arc::new(identity_group::IdentityGroupResource));
    provider.register_resource(Arc::new(MembershipResource::group_policies()));
    provider.register_resource(Arc::new(MembershipResource::group_member_entity_ids()));
    provider.register_resource(Arc::new(MembershipResource::group_member_group_ids()));
    provider.register_resource(Arc::new(oidc_client::OidcClientResource));
    provider.register_resource(Arc::new(approle_role::AppRoleRoleResource));
    provider.register_resource(Arc::new(
        database_connection::DatabaseConnectionResource,
    ));
    provider.register_resource(Arc::new(pki_role::PkiRoleResource));
    provider.register_resource(Arc::new(quota_rate_limit::QuotaRateLimitResource));
    provider.register_resource(Arc::new(mfa_totp::MfaTotpResource));
    provider.register_resource(Arc::new(secrets_sync_aws::AwsSyncDestinationResource));
    provider.register_resource(Arc::new(token::TokenResource));

    provider.register_data_source(Arc::new(policy_document::PolicyDocumentDataSource));
    provider.register_data_source(Arc::new(generic_secret::GenericSecretDataSource));
    provider.register_data_source(Arc::new(identity_group::IdentityGroupDataSource));
    provider.register_data_source(Arc::new(auth_backend::AuthBackendDataSource));
}
