//! Common test fixtures for live Vault tests.
//!
//! `VaultFixture` starts a HashiCorp Vault container in dev mode with the
//! root token `"root"` on a random host port. Docker is required, so tests
//! only run when `TERRAVAULT_RUN_INTEGRATION_TESTS` is set.

#![allow(dead_code)]

use std::time::Duration;
use terravault::{ProviderMeta, VaultConfig};
use testcontainers::core::{IntoContainerPort, WaitFor};
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, GenericImage, ImageExt};
use tokio::time::sleep;

pub const VAULT_IMAGE_TAG: &str = "1.18.4";
pub const ROOT_TOKEN: &str = "root";

pub fn integration_enabled() -> bool {
    if std::env::var("TERRAVAULT_RUN_INTEGRATION_TESTS").is_ok() {
        return true;
    }
    eprintln!("skipping: set TERRAVAULT_RUN_INTEGRATION_TESTS to run against Docker");
    false
}

pub struct VaultFixture {
    _container: ContainerAsync<GenericImage>,
    port: u16,
}

impl VaultFixture {
    pub async fn new() -> Self {
        let container = GenericImage::new("hashicorp/vault", VAULT_IMAGE_TAG)
            .with_exposed_port(8200.tcp())
            .with_wait_for(WaitFor::message_on_stdout("Vault server started!"))
            .with_env_var("VAULT_DEV_ROOT_TOKEN_ID", ROOT_TOKEN)
            .with_env_var("VAULT_DEV_LISTEN_ADDRESS", "0.0.0.0:8200")
            .with_cmd(vec!["server", "-dev", "-dev-root-token-id=root"])
            .start()
            .await
            .expect("failed to start Vault container");
        let port = container
            .get_host_port_ipv4(8200)
            .await
            .expect("Vault port not mapped");

        let fixture = VaultFixture {
            _container: container,
            port,
        };
        fixture.wait_ready(30, 500).await;
        fixture
    }

    pub fn vault_addr(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    pub fn config(&self) -> VaultConfig {
        VaultConfig::new(&self.vault_addr()).with_token(ROOT_TOKEN)
    }

    pub async fn meta(&self) -> ProviderMeta {
        ProviderMeta::connect(&self.config(), None, false)
            .await
            .expect("failed to configure provider")
    }

    async fn wait_ready(&self, max_retries: usize, retry_delay_ms: u64) {
        let client = reqwest::Client::new();
        let health_url = format!("{}/v1/sys/health", self.vault_addr());
        for _ in 0..max_retries {
            if let Ok(response) = client.get(&health_url).send().await {
                if response.status().as_u16() == 200 {
                    return;
                }
            }
            sleep(Duration::from_millis(retry_delay_ms)).await;
        }
        panic!("Vault at {} never became ready", self.vault_addr());
    }
}
