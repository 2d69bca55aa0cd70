//! WeaveGate CLI - Command line tools for off-chain reputation data.
//!
//! Offline helpers for classifying locators, previewing tags, inspecting
//! authorization tokens and generating keys, plus `fetch` for reading
//! stored documents through configured gateways.

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use serde_json::{json, Value};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use weavegate_common::{classify, Address, Locator, ResourceId};
use weavegate_crypto::{AuthorizationToken, EthereumKey};
use weavegate_publish::{
    derive_tags, missing_required, DataType, GatewayRetriever, MemoryLedger, Operation,
    PriorityResolver, Publisher, PublisherConfig, RetrievalConfig, RetryConfig, TagContext,
    TokenIssuer,
};
use weavegate_storage::{BackendGateway, Gateway, MemoryBackend, StorageBackend};

#[derive(Parser)]
#[command(name = "weavegate")]
#[command(about = "WeaveGate - Permanent storage for on-chain reputation data")]
#[command(version)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum DataTypeArg {
    Registration,
    Feedback,
}

impl From<DataTypeArg> for DataType {
    fn from(arg: DataTypeArg) -> Self {
        match arg {
            DataTypeArg::Registration => DataType::Registration,
            DataTypeArg::Feedback => DataType::Feedback,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Print the storage type of a URI.
    Classify {
        /// URI to classify, e.g. ar://... or ipfs://...
        uri: String,
    },

    /// Preview the tags a JSON document would be stored with.
    Tags {
        /// JSON document.
        file: PathBuf,

        /// Kind of document.
        #[arg(short, long, value_enum, default_value = "registration")]
        data_type: DataTypeArg,

        /// Chain id written to the Chain-Id tag.
        #[arg(short, long, default_value_t = 11155111)]
        chain_id: u64,

        /// Resource the document belongs to, as <chain-id>:<token-id>.
        #[arg(short, long)]
        resource: Option<String>,
    },

    /// Fetch a stored document through the configured gateways.
    Fetch {
        /// ar:// or ipfs:// locator.
        uri: String,

        /// Publisher config file.
        #[arg(short, long)]
        config: PathBuf,

        /// Write the document here instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Decode an authorization token and check its signature.
    InspectAuth {
        /// Hex-encoded token.
        token: String,
    },

    /// Generate a new signing key.
    Keygen,

    /// Write a default publisher config file.
    InitConfig {
        /// Destination path.
        path: PathBuf,

        /// Overwrite an existing file.
        #[arg(short, long)]
        force: bool,
    },

    /// Run one feedback publish against in-memory stores.
    Demo {
        /// Feedback score (0-100).
        #[arg(short, long, default_value_t = 85)]
        score: u8,
    },

    /// Print shell completions.
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_lowercase()));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Classify { uri } => cmd_classify(&uri),

        Commands::Tags {
            file,
            data_type,
            chain_id,
            resource,
        } => cmd_tags(&file, data_type.into(), chain_id, resource.as_deref()).await,

        Commands::Fetch {
            uri,
            config,
            output,
        } => cmd_fetch(&uri, &config, output.as_deref()).await,

        Commands::InspectAuth { token } => cmd_inspect_auth(&token),

        Commands::Keygen => cmd_keygen(),

        Commands::InitConfig { path, force } => cmd_init_config(&path, force).await,

        Commands::Demo { score } => cmd_demo(score).await,

        Commands::Completions { shell } => {
            clap_complete::generate(
                shell,
                &mut Cli::command(),
                "weavegate",
                &mut std::io::stdout(),
            );
            Ok(())
        }
    }
}

/// Classify a URI.
fn cmd_classify(uri: &str) -> Result<()> {
    let backend = classify(uri);
    println!("{}", backend);
    if backend.is_storage() {
        let locator = Locator::parse(uri).context("Malformed locator")?;
        println!("  id: {}", locator.id());
    }
    Ok(())
}

/// Print derived tags for a document.
async fn cmd_tags(
    file: &Path,
    data_type: DataType,
    chain_id: u64,
    resource: Option<&str>,
) -> Result<()> {
    let raw = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let document: Value = serde_json::from_str(&raw).context("Document is not valid JSON")?;

    let mut context = TagContext::new(chain_id, data_type, chrono::Utc::now());
    if let Some(resource) = resource {
        context = context.with_resource(ResourceId::parse(resource).context("Invalid resource")?);
    }

    let tags = derive_tags(&document, &context);
    for tag in &tags {
        println!("{}: {}", tag.name, tag.value);
    }
    let missing = missing_required(&tags);
    if !missing.is_empty() {
        anyhow::bail!("Missing required tags: {}", missing.join(", "));
    }
    Ok(())
}

/// Fetch a locator through the configured gateways.
async fn cmd_fetch(uri: &str, config: &Path, output: Option<&Path>) -> Result<()> {
    let config = PublisherConfig::load(config)
        .await
        .context("Failed to load config")?;
    let retriever = config
        .build_retriever()
        .context("Failed to configure gateways")?;

    info!("Fetching {}", uri);
    let body = retriever.fetch_uri(uri).await.context("Fetch failed")?;
    debug!(size = body.len(), "Fetched");

    match output {
        Some(path) => {
            tokio::fs::write(path, &body)
                .await
                .context("Failed to write output file")?;
            println!("Wrote {} bytes to {}", body.len(), path.display());
        }
        None => {
            let mut stdout = std::io::stdout();
            stdout.write_all(&body)?;
            stdout.flush()?;
        }
    }
    Ok(())
}

/// Decode and check an authorization token.
fn cmd_inspect_auth(token: &str) -> Result<()> {
    let token = AuthorizationToken::from_hex(token).context("Invalid token")?;
    let claims = token.claims();
    let recovered = token.recover_signer().context("Signature does not recover")?;
    let now = chrono::Utc::now().timestamp().max(0) as u64;

    let report = json!({
        "claims": claims,
        "recoveredSigner": recovered.to_string(),
        "signatureValid": recovered == claims.signer,
        "expired": now >= claims.expiry,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// Generate a signing key.
fn cmd_keygen() -> Result<()> {
    let key = EthereumKey::generate().context("Key generation failed")?;
    println!("Address: {}", key.address());
    println!("Secret:  {}", key.to_hex().as_str());
    println!("\nStore the secret in WEAVEGATE_ARWEAVE_KEY to sign uploads.");
    Ok(())
}

/// Write the default config.
async fn cmd_init_config(path: &Path, force: bool) -> Result<()> {
    if !force && tokio::fs::try_exists(path).await.unwrap_or(false) {
        anyhow::bail!("{} exists, pass --force to overwrite", path.display());
    }
    PublisherConfig::default()
        .save(path)
        .await
        .context("Failed to write config")?;
    println!("Config written to {}", path.display());
    Ok(())
}

/// Issue a token, publish feedback and read it back, all in memory.
async fn cmd_demo(score: u8) -> Result<()> {
    let config = PublisherConfig::default();
    let ledger = Arc::new(MemoryLedger::new(config.chain_id, Address::ZERO));
    let owner = EthereumKey::generate()?;
    let client = EthereumKey::generate()?;

    let resource = ledger.register(owner.address(), None).await;
    info!("Registered resource {}", resource);

    let authorization = TokenIssuer::new(ledger.clone(), owner)
        .issue(resource, client.address(), 1, 1)
        .await
        .context("Failed to issue token")?;

    let permanent = Arc::new(MemoryBackend::permanent());
    let pinned = Arc::new(MemoryBackend::pinned());
    let resolver = PriorityResolver::new(
        vec![
            permanent.clone() as Arc<dyn StorageBackend>,
            pinned as Arc<dyn StorageBackend>,
        ],
        RetryConfig::default(),
    )?;
    let publisher = Publisher::new(ledger.clone(), resolver);

    let document = json!({
        "agentRegistry": format!("eip155:{}:{}", config.chain_id, config.registry),
        "agentId": resource.token_id(),
        "clientAddress": client.address().to_string(),
        "score": score,
        "tag1": "demo",
    });
    let published = publisher
        .publish(
            Operation::Feedback {
                resource,
                client: client.address(),
                score,
                tag1: Some("demo".to_string()),
                tag2: None,
                authorization: Some(authorization),
            },
            &document,
        )
        .await
        .context("Publish failed")?;

    println!("Committed: {}", published.receipt.tx_id);
    let Some(locator) = published.locator else {
        println!("No locator stored");
        return Ok(());
    };
    println!("Locator:   {}", locator);

    let retriever = GatewayRetriever::new(
        vec![Arc::new(BackendGateway::new(permanent)) as Arc<dyn Gateway>],
        RetrievalConfig::default(),
    );
    let body = retriever.fetch(&locator).await.context("Read back failed")?;
    println!("Content:   {}", String::from_utf8_lossy(&body));
    Ok(())
}
