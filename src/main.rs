//! Chatterbox CLI entry point

use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use chatterbox::adapters::cli::{print_outcome, CliChannel};
use chatterbox::adapters::telegram::TelegramChannel;
use chatterbox::adapters::{Channel, ChannelRegistry};
use chatterbox::agent::{Agent, Invoker};
use chatterbox::billing::{total_credits, JsonlLedger, UsageLedger};
use chatterbox::catalog::{Capability, ConfigCredentialResolver, ToolCatalog, ToolChoiceResolver};
use chatterbox::config::{self, Config};
use chatterbox::ui;

#[derive(Parser)]
#[command(name = "chatterbox")]
#[command(about = "💬 Chatterbox - multi-platform AI chat agent")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Init,

    /// Chat with the agent from the terminal
    Chat {
        /// Message to send to the agent
        #[arg(short, long)]
        message: Option<String>,

        /// User id to chat as
        #[arg(short, long, default_value = "cli-user")]
        user: String,
    },

    /// Start the chat platform gateway
    Gateway,

    /// Show configured tools and credential availability
    Status,

    /// Show recorded usage
    Usage {
        /// Only records paid by this id
        #[arg(short, long)]
        payer: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init => {
            println!("💬 Initializing Chatterbox...");
            let path = config::init()?;
            ui::print_success(&format!("Config written to {}", path.display()));
            println!("\nNext steps:");
            println!("  1. Add a provider key under \"api_keys\" (e.g. \"google\": \"...\")");
            println!("  2. Chat: chatterbox chat -m \"Hello!\"");
        }

        Commands::Chat { message, user } => {
            let config = config::load()?;
            let mut channel = cli_channel(&config, &user);

            if let Some(msg) = message {
                let outcome = channel.run_once(&msg).await;
                print_outcome(&outcome);
            } else {
                ui::print_header(&config.agent.handle, config.agent.default_tool(Capability::Chat).unwrap_or("auto"));
                println!("Interactive mode (type 'exit' to quit)");
                channel.run_interactive().await?;
            }
        }

        Commands::Gateway => {
            let config = config::load()?;
            run_gateway(config).await?;
        }

        Commands::Status => {
            let config = config::load()?;
            print_status(&config);
        }

        Commands::Usage { payer } => {
            let config = config::load()?;
            let ledger = JsonlLedger::new(&config.billing.ledger_path);
            let records = match &payer {
                Some(payer) => ledger.records_for_payer(payer)?,
                None => ledger.read_all()?,
            };
            let failed = records.iter().filter(|r| r.is_failed).count();

            println!("💬 Usage ({})\n", ledger.path().display());
            println!("Calls: {} ({} failed)", records.len(), failed);
            println!("Credits: {:.4}", total_credits(&records));
        }
    }

    Ok(())
}

fn build_agent(config: &Config) -> Arc<Agent> {
    let ledger: Arc<dyn UsageLedger> = Arc::new(JsonlLedger::new(&config.billing.ledger_path));
    Arc::new(Agent::from_config(config, ledger))
}

fn cli_channel(config: &Config, user: &str) -> CliChannel {
    let invoker = Invoker::new(user, user);
    CliChannel::new(build_agent(config), config.progress.clone(), invoker)
}

async fn run_gateway(config: Config) -> Result<()> {
    if !ChannelRegistry::is_enabled("telegram", &config) {
        ui::print_warning("Telegram is disabled in config. Enable it and set 'token' to run the gateway.");
        return Ok(());
    }

    let agent = build_agent(&config);
    let channel = Arc::new(TelegramChannel::new(config, agent));
    ui::print_success(&format!("Gateway started. Listening for {} messages...", channel.name()));
    channel.start().await?;
    Ok(())
}

fn print_status(config: &Config) {
    println!("💬 Chatterbox Status\n");
    println!("Config: {}", config::config_path().display());
    println!("Handle: @{}", config.agent.handle);
    println!("Ledger: {}", config.billing.ledger_path.display());

    println!("\nChannels:");
    for name in ChannelRegistry::available() {
        let mark = if ChannelRegistry::is_enabled(name, config) { "✓" } else { "-" };
        println!("  {} {:<10} {}", mark, name, ChannelRegistry::description(name));
    }

    let catalog = Arc::new(ToolCatalog::with_extra(config.catalog.clone()));
    let resolver = ToolChoiceResolver::new(
        catalog.clone(),
        Arc::new(ConfigCredentialResolver::new(config.api_keys.clone())),
    );
    let platform = Invoker::new("status", "status");

    println!("\nTools:");
    for tool in catalog.all() {
        let has_key = config.api_keys.get(&tool.provider).is_some_and(|k| !k.is_empty());
        let capabilities: Vec<&str> = tool.capabilities.iter().map(|c| c.as_str()).collect();
        println!(
            "  {} {:<18} {:<11} {}",
            if has_key { "✓" } else { "-" },
            tool.id,
            tool.provider,
            capabilities.join(", ")
        );
    }

    println!("\nResolved defaults:");
    for capability in [Capability::Chat, Capability::Vision, Capability::ImageGeneration] {
        let chosen = resolver.resolve(&platform, capability, None, config.agent.default_tool(capability));
        match chosen {
            Some(tool) => ui::print_step(&format!("{capability}: {}", tool.id())),
            None => ui::print_warning(&format!("{capability}: not configured")),
        }
    }
}
