//! Client implementation for Vault API interactions.
//!
//! This module provides a client for making HTTP requests to the Vault API
//! with appropriate authentication and error handling.

use crate::vault::common::error_messages;
use crate::vault::logical::{join_namespace, Logical, Secret};
use crate::vault::{VaultConfig, VaultError};
use async_trait::async_trait;
use reqwest::{
    header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE},
    Certificate, Client, Method, StatusCode,
};
use serde_json::Value;
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

const NAMESPACE_HEADER: &str = "X-Vault-Namespace";
const TOKEN_HEADER: &str = "X-Vault-Token";

/// Client for interacting with the Vault HTTP API.
#[derive(Clone)]
pub struct VaultClient {
    /// Base URL of the Vault server
    pub addr: String,
    /// Auth token for Vault API requests
    token: String,
    /// Namespace sent with every request, if any
    namespace: Option<String>,
    /// HTTP client for making requests
    client: Client,
    /// Custom headers to add to requests
    custom_headers: HeaderMap,
}

impl std::fmt::Debug for VaultClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultClient")
            .field("addr", &self.addr)
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}

impl VaultClient {
    /// Creates a new VaultClient from the provider's connection settings.
    pub fn new(config: &VaultConfig) -> Result<Self, VaultError> {
        let mut builder = Client::builder()
            .timeout(config.timeout)
            .danger_accept_invalid_certs(config.skip_tls_verify);

        if let Some(ca_path) = &config.ca_cert_path {
            let pem = std::fs::read(ca_path).map_err(|e| {
                VaultError::Config(format!("Failed to read CA certificate {}: {}", ca_path, e))
            })?;
            let cert = Certificate::from_pem(&pem).map_err(|e| {
                VaultError::Config(format!("Invalid CA certificate {}: {}", ca_path, e))
            })?;
            builder = builder.add_root_certificate(cert);
        }

        let client = builder
            .build()
            .map_err(|e| VaultError::Network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            addr: config.url.trim_end_matches('/').to_string(),
            token: config.token.clone().unwrap_or_default(),
            namespace: config.namespace.clone().filter(|ns| !ns.is_empty()),
            client,
            custom_headers: HeaderMap::new(),
        })
    }

    /// Adds a custom header to the client.
    ///
    /// # Arguments
    ///
    /// * `name` - The name of the header
    /// * `value` - The value of the header
    pub fn add_header(&mut self, name: &str, value: &str) -> &mut Self {
        if let (Ok(header_name), Ok(header_value)) =
            (HeaderName::from_str(name), HeaderValue::from_str(value))
        {
            self.custom_headers.insert(header_name, header_value);
        }
        self
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/{}", self.addr, path.trim_start_matches('/'))
    }

    /// Makes a request to the Vault API with the specified method and optional body.
    ///
    /// 404 answers to reads and lists are reported as `Ok(None)`; 204 answers
    /// as `Ok(None)` for every method.
    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        list: bool,
    ) -> Result<Option<Secret>, VaultError> {
        let url = self.url(path);
        debug!("Vault request: {} {}", method, url);

        let mut request = self.client.request(method.clone(), &url);
        if list {
            request = request.query(&[("list", "true")]);
        }
        if !self.token.is_empty() {
            request = request.header(TOKEN_HEADER, &self.token);
        }
        if let Some(ns) = &self.namespace {
            request = request.header(NAMESPACE_HEADER, ns);
        }
        request = request.header("X-Vault-Request", "true");
        for (name, value) in self.custom_headers.iter() {
            request = request.header(name, value);
        }

        if let Some(json_body) = body {
            if method == Method::PATCH {
                request = request
                    .header(CONTENT_TYPE, "application/merge-patch+json")
                    .body(serde_json::to_vec(&json_body)?);
            } else {
                request = request.json(&json_body);
            }
        }

        let response = request
            .send()
            .await
            .map_err(|e| VaultError::Network(format!("Request to {} failed: {}", url, e)))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND && (method == Method::GET) {
            debug!("Vault returned 404 for {}", path);
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(VaultError::Response {
                method: method.to_string(),
                path: path.to_string(),
                status: status.as_u16(),
                errors: error_messages(&body),
            });
        }

        if status == StatusCode::NO_CONTENT {
            return Ok(None);
        }

        let text = response.text().await?;
        if text.trim().is_empty() {
            return Ok(None);
        }
        serde_json::from_str::<Secret>(&text)
            .map(Some)
            .map_err(|e| VaultError::Parse(format!("Failed to parse response from {}: {}", path, e)))
    }
}

#[async_trait]
impl Logical for VaultClient {
    async fn read(&self, path: &str) -> Result<Option<Secret>, VaultError> {
        self.request(Method::GET, path, None, false).await
    }

    async fn write(&self, path: &str, data: Value) -> Result<Option<Secret>, VaultError> {
        self.request(Method::PUT, path, Some(data), false).await
    }

    async fn patch(&self, path: &str, data: Value) -> Result<Option<Secret>, VaultError> {
        self.request(Method::PATCH, path, Some(data), false).await
    }

    async fn delete(&self, path: &str) -> Result<Option<Secret>, VaultError> {
        self.request(Method::DELETE, path, None, false).await
    }

    async fn list(&self, path: &str) -> Result<Option<Secret>, VaultError> {
        self.request(Method::GET, path, None, true).await
    }

    fn with_namespace(&self, namespace: &str) -> Arc<dyn Logical> {
        let mut scoped = self.clone();
        scoped.namespace = Some(join_namespace(self.namespace.as_deref(), namespace));
        Arc::new(scoped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::init_test_logging;
    use serde_json::json;

    fn client_for(server: &mockito::Server, namespace: Option<&str>) -> VaultClient {
        let config = VaultConfig {
            url: server.url(),
            token: Some("root".to_string()),
            namespace: namespace.map(str::to_string),
            ..Default::default()
        };
        VaultClient::new(&config).unwrap()
    }

    #[tokio::test]
    async fn test_read_sends_token_and_parses_secret() {
        init_test_logging();
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/v1/sys/policies/acl/dev")
            .match_header("x-vault-token", "root")
            .match_header("x-vault-request", "true")
            .with_status(200)
            .with_body(r#"{"request_id":"1","data":{"name":"dev","policy":"path \"*\" {}"}}"#)
            .create_async()
            .await;

        let client = client_for(&server, None);
        let secret = client.read("sys/policies/acl/dev").await.unwrap().unwrap();
        assert_eq!(secret.get_str("name"), Some("dev"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_read_not_found_is_none() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/v1/identity/group/id/missing")
            .with_status(404)
            .with_body(r#"{"errors":[]}"#)
            .create_async()
            .await;

        let client = client_for(&server, None);
        assert!(client.read("identity/group/id/missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_write_error_carries_vault_messages() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("PUT", "/v1/sys/mounts/kv")
            .with_status(400)
            .with_body(r#"{"errors":["path is already in use at kv/"]}"#)
            .create_async()
            .await;

        let client = client_for(&server, None);
        let err = client
            .write("sys/mounts/kv", json!({"type": "kv"}))
            .await
            .unwrap_err();
        assert!(err.is_status(400));
        assert!(err.to_string().contains("path is already in use"));
    }

    #[tokio::test]
    async fn test_delete_not_found_is_an_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("DELETE", "/v1/sys/policies/acl/gone")
            .with_status(404)
            .with_body(r#"{"errors":["no policy"]}"#)
            .create_async()
            .await;

        let client = client_for(&server, None);
        assert!(client.delete("sys/policies/acl/gone").await.is_err());
    }

    #[tokio::test]
    async fn test_no_content_write_is_none() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("PUT", "/v1/sys/policies/acl/dev")
            .with_status(204)
            .create_async()
            .await;

        let client = client_for(&server, None);
        let result = client
            .write("sys/policies/acl/dev", json!({"policy": ""}))
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_list_uses_query_and_namespace() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/v1/sys/quotas/rate-limit")
            .match_query(mockito::Matcher::UrlEncoded("list".into(), "true".into()))
            .match_header("x-vault-namespace", "admin/team")
            .with_status(200)
            .with_body(r#"{"data":{"keys":["global"]}}"#)
            .create_async()
            .await;

        let client = client_for(&server, Some("admin"));
        let scoped = client.with_namespace("team");
        let secret = scoped.list("sys/quotas/rate-limit").await.unwrap();
        assert_eq!(
            crate::vault::logical::list_keys(secret.as_ref()),
            vec!["global".to_string()]
        );
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_patch_uses_merge_patch_content_type() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("PATCH", "/v1/sys/sync/destinations/aws-sm/dest")
            .match_header("content-type", "application/merge-patch+json")
            .match_body(mockito::Matcher::Json(json!({"region": "us-east-1"})))
            .with_status(200)
            .with_body(r#"{"data":{}}"#)
            .create_async()
            .await;

        let client = client_for(&server, None);
        client
            .patch(
                "sys/sync/destinations/aws-sm/dest",
                json!({"region": "us-east-1"}),
            )
            .await
            .unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_connection_error() {
        let config = VaultConfig {
            url: "http://127.0.0.1:9".to_string(),
            ..Default::default()
        };
        let client = VaultClient::new(&config).unwrap();
        let err = client.read("sys/mounts").await.unwrap_err();
        assert!(matches!(err, VaultError::Network(_)));
    }
}
