use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use wisdom_channel_core::config::Config;
use wisdom_channel_core::core_identity::{PublicId, Role};
use wisdom_channel_core::core_mailbox::RecordKey;
use wisdom_channel_core::logging::{init_logging_with_config, LogConfig};
use wisdom_channel_core::metrics;

mod commands;

#[derive(Parser, Debug)]
#[command(name = "wisdom-channel")]
#[command(author, version, about = "Secure mailbox channel between agents and a Wisdom Authority", long_about = None)]
struct Args {
    /// Role of this node (agent or wa)
    #[arg(long, global = true)]
    role: Option<Role>,

    /// Directory holding keypair.json, record.json and secrets.json
    #[arg(long, global = true)]
    state_dir: Option<String>,

    /// Shared mailbox directory
    #[arg(long, global = true)]
    mailbox_dir: Option<String>,

    /// Discovery registry file
    #[arg(long, global = true)]
    registry: Option<String>,

    /// TOML configuration file; WISDOM_CHANNEL_* variables still apply on top
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Set the log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Enable JSON formatted logging
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate this node's keypair
    Keygen {
        /// Replace an existing keypair
        #[arg(long)]
        force: bool,
    },

    /// Create the shared mailbox record with a peer
    CreateMailbox {
        /// Peer public id; defaults to the first registered counterpart
        #[arg(long)]
        peer_key: Option<PublicId>,
    },

    /// Derive and store the pairwise secret with a peer
    DeriveSecret {
        #[arg(long)]
        peer_key: Option<PublicId>,
    },

    /// Advertise this node in the discovery registry
    Register {
        /// Display name
        name: String,
    },

    /// Show this node's identity and provisioning state
    Whoami,

    /// Run the inbound worker until SIGINT or SIGTERM
    ///
    /// With the default WISDOM_CHANNEL_AUTH_KEY=local, messages are keyed
    /// with this node's own secret, so only a peer holding the same keypair
    /// can read them. Set WISDOM_CHANNEL_AUTH_KEY=peer on both nodes to key
    /// the channel with the secret stored by `derive-secret`.
    Serve,

    /// Send one message
    Send {
        /// Operation (SPEAK, DEFER, MEMORY, OBSERVE, CORRECTION)
        #[arg(long)]
        op: String,

        /// JSON body
        #[arg(long, default_value = "{}")]
        body: String,

        /// Record to send on instead of the configured one
        #[arg(long)]
        record_key: Option<RecordKey>,
    },

    /// Read and verify the inbound slot once
    Recv,
}

fn expand(path: &str) -> Result<PathBuf> {
    let expanded = shellexpand::full(path).with_context(|| format!("cannot expand path '{}'", path))?;
    Ok(PathBuf::from(expanded.as_ref()))
}

fn load_config(args: &Args) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => {
            let mut config = Config::from_file(expand(path)?)?;
            config.apply_overrides(|name| std::env::var(name).ok())?;
            config
        }
        None => Config::from_env()?,
    };

    if let Some(role) = args.role {
        config.node.role = role;
    }
    if let Some(dir) = &args.state_dir {
        config.node.state_dir = PathBuf::from(dir);
    }
    if let Some(dir) = &args.mailbox_dir {
        config.mailbox.dir = PathBuf::from(dir);
    }
    if let Some(path) = &args.registry {
        config.registry.path = PathBuf::from(path);
    }
    if let Some(level) = &args.log_level {
        config.logging.level = level.clone();
    }
    if args.json_logs {
        config.logging.json_format = true;
    }

    config.node.state_dir = expand(&config.node.state_dir.to_string_lossy())?;
    config.mailbox.dir = expand(&config.mailbox.dir.to_string_lossy())?;
    config.registry.path = expand(&config.registry.path.to_string_lossy())?;

    config.validate()?;
    Ok(config)
}

async fn run(args: Args) -> Result<()> {
    let config = load_config(&args)?;

    init_logging_with_config(LogConfig::from_config(&config.logging))?;
    metrics::init_metrics();

    let ctx = commands::Context::new(config)?;
    match args.command {
        Command::Keygen { force } => ctx.keygen(force).await,
        Command::CreateMailbox { peer_key } => ctx.create_mailbox(peer_key).await,
        Command::DeriveSecret { peer_key } => ctx.derive_secret(peer_key).await,
        Command::Register { name } => ctx.register(&name).await,
        Command::Whoami => ctx.whoami(),
        Command::Serve => ctx.serve().await,
        Command::Send { op, body, record_key } => ctx.send(&op, &body, record_key).await,
        Command::Recv => ctx.recv().await,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
