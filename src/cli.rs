use anyhow::{Context, Result};
use clap::builder::BoolishValueParser;
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::config::{self, ConnectionArgs, ProviderBlock, DEFAULT_PARALLELISM};
use crate::engine::{Engine, Manifest, StateFile};
use crate::provider::{Provider, ProviderMeta};

#[derive(Parser)]
#[command(
    name = "terravault",
    about = "Declarative management of Vault policies, mounts, identities and more",
    version
)]
pub struct Cli {
    /// Vault server address.
    #[arg(long, global = true, env = "VAULT_ADDR")]
    pub vault_addr: Option<String>,

    /// Vault token. Falls back to ~/.vault-token.
    #[arg(long, global = true, env = "VAULT_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Namespace every request is scoped to.
    #[arg(long, global = true, env = "VAULT_NAMESPACE")]
    pub namespace: Option<String>,

    /// Skip TLS certificate verification.
    #[arg(
        long,
        global = true,
        env = "VAULT_SKIP_VERIFY",
        value_parser = BoolishValueParser::new(),
        num_args = 0..=1,
        default_missing_value = "true"
    )]
    pub skip_tls_verify: Option<bool>,

    /// PEM bundle used to verify the server certificate.
    #[arg(long, global = true, env = "VAULT_CACERT")]
    pub ca_cert: Option<String>,

    /// Maximum number of concurrent resource operations.
    #[arg(long, global = true, env = "TERRAVAULT_PARALLELISM", default_value_t = DEFAULT_PARALLELISM)]
    pub parallelism: usize,

    /// Log filter used when RUST_LOG is unset.
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    /// Do not ask the server for its version; assume the newest.
    #[arg(long, global = true)]
    pub skip_get_vault_version: bool,

    /// Pretend the server runs this version, e.g. 1.15.2.
    #[arg(long = "vault-version", global = true)]
    pub vault_version: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Args, Clone)]
pub struct Files {
    /// Desired resources, in JSON.
    #[arg(long, short, default_value = "terravault.json")]
    pub manifest: PathBuf,

    /// State file, created on first apply.
    #[arg(long, short, default_value = "terravault.state.json")]
    pub state: PathBuf,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show what apply would change.
    Plan {
        #[command(flatten)]
        files: Files,
    },
    /// Make Vault match the manifest.
    Apply {
        #[command(flatten)]
        files: Files,
    },
    /// Delete everything recorded in state.
    Destroy {
        #[command(flatten)]
        files: Files,
    },
    /// Re-read every managed object and update state.
    Refresh {
        #[command(flatten)]
        files: Files,
    },
    /// Bring an existing Vault object under management.
    Import {
        /// Resource address, <type>.<name>.
        address: String,
        /// The object's ID, as the resource type defines it.
        id: String,
        #[command(flatten)]
        files: Files,
    },
    /// Print resource and data source schemas as JSON.
    Schema {
        /// Only this resource or data source type.
        type_name: Option<String>,
    },
}

impl Cli {
    fn connection_args(&self) -> ConnectionArgs {
        ConnectionArgs {
            address: self.vault_addr.clone(),
            token: self.token.clone(),
            namespace: self.namespace.clone(),
            skip_tls_verify: self.skip_tls_verify,
            ca_cert_file: self.ca_cert.clone(),
            skip_get_vault_version: self.skip_get_vault_version,
            vault_version_override: self.vault_version.clone(),
        }
    }

    async fn engine(&self, block: &ProviderBlock) -> Result<Engine> {
        let settings = config::resolve_from_env(&self.connection_args(), block)?;
        info!("Connecting to Vault at {}", settings.vault.url);
        let meta = ProviderMeta::connect(
            &settings.vault,
            settings.version_override.as_deref(),
            settings.skip_version_discovery,
        )
        .await
        .context("failed to configure the Vault client")?;
        match meta.version() {
            Some(version) => info!("Vault server version {}", version),
            None => warn!("Vault server version unknown; assuming the newest"),
        }
        Ok(Engine::new(Provider::new(), meta, self.parallelism))
    }
}

fn load_manifest(path: &Path) -> Result<Manifest> {
    let manifest = Manifest::load(path)?;
    manifest.check(&Provider::new())?;
    Ok(manifest)
}

/// Manifest for commands that work from state alone; its provider block is
/// still honoured when present.
fn optional_manifest(path: &Path) -> Result<Manifest> {
    if path.exists() {
        Manifest::load(path)
    } else {
        Ok(Manifest::default())
    }
}

fn print_schema(provider: &Provider, type_name: Option<&str>) -> Result<()> {
    let schemas = provider.schemas();
    let out = match type_name {
        None => schemas,
        Some(name) => schemas["resources"]
            .get(name)
            .or_else(|| schemas["data_sources"].get(name))
            .cloned()
            .with_context(|| format!("unknown resource or data source type {:?}", name))?,
    };
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

pub async fn run_cli() -> Result<()> {
    let cli = Cli::parse();
    crate::init_logging(&cli.log_level);

    match &cli.command {
        Commands::Plan { files } => {
            let manifest = load_manifest(&files.manifest)?;
            let mut state = StateFile::load(&files.state)?;
            let engine = cli.engine(&manifest.provider).await?;
            let plan = engine.plan(&manifest, &mut state).await?;
            for data in &plan.data {
                info!("Read data source {} ({})", data.address(), data.id);
            }
            println!("{}", plan.render());
        }
        Commands::Apply { files } => {
            let manifest = load_manifest(&files.manifest)?;
            let mut state = StateFile::load(&files.state)?;
            let engine = cli.engine(&manifest.provider).await?;
            let plan = engine.plan(&manifest, &mut state).await?;
            println!("{}", plan.render());
            if !plan.has_changes() {
                state.save(&files.state)?;
                return Ok(());
            }
            let result = engine.apply(&plan, &mut state).await;
            state.save(&files.state)?;
            let summary = result?;
            println!("Apply complete! Resources: {}", summary);
        }
        Commands::Destroy { files } => {
            let manifest = optional_manifest(&files.manifest)?;
            let mut state = StateFile::load(&files.state)?;
            let engine = cli.engine(&manifest.provider).await?;
            let result = engine.destroy(&mut state).await;
            state.save(&files.state)?;
            let summary = result?;
            println!("Destroy complete! Resources: {}", summary);
        }
        Commands::Refresh { files } => {
            let manifest = optional_manifest(&files.manifest)?;
            let mut state = StateFile::load(&files.state)?;
            let engine = cli.engine(&manifest.provider).await?;
            engine.refresh(&mut state).await?;
            state.save(&files.state)?;
            println!("Refreshed {} resource(s).", state.resources.len());
        }
        Commands::Import { address, id, files } => {
            let manifest = optional_manifest(&files.manifest)?;
            let mut state = StateFile::load(&files.state)?;
            let engine = cli.engine(&manifest.provider).await?;
            engine.import(address, id, &mut state).await?;
            state.save(&files.state)?;
            if manifest.resource(address).is_none() {
                warn!(
                    "{} is not in the manifest; the next apply will delete it",
                    address
                );
            }
            println!("Imported {}.", address);
        }
        Commands::Schema { type_name } => {
            print_schema(&Provider::new(), type_name.as_deref())?;
        }
    }
    Ok(())
}
