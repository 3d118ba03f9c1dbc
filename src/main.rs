//! Command-line entry point.

mod application;
mod domain;
mod infrastructure;
mod interface;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::info;

use application::conversation::ConversationStore;
use application::dispatcher::Dispatcher;
use application::engine::Engine;
use application::tasks::TaskTracker;
use application::validation::Validator;
use domain::config::AppConfig;
use domain::traits::UserPrompt;
use infrastructure::api::client::SessionClient;
use infrastructure::auth::{self, CredentialStore, Credentials};
use infrastructure::tools::executor::CommandExecutor;
use infrastructure::tools::fetch::FetchTool;
use interface::console::Console;

#[derive(Parser)]
#[command(name = "drover", about = "Plan-driven agent orchestrator", version)]
struct Cli {
    /// Agent key from the config's agents table.
    #[arg(short, long, default_value = "dev", global = true)]
    agent: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Work through the plan, creating it first if necessary.
    Run {
        /// Goal to plan for when no plan exists yet.
        goal: Option<String>,
    },
    /// Interactive conversation with the agent.
    Dev,
    /// Show the plan and its progress.
    Tasks,
    /// Forget the stored conversation so the next turn starts fresh.
    Reset,
    /// Store credentials for a realm.
    Login {
        /// Realm to authenticate against, overriding the config.
        #[arg(long)]
        realm: Option<String>,
    },
    /// Remove stored credentials for a realm.
    Logout {
        #[arg(long)]
        realm: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _guard = init_tracing()?;

    let config = AppConfig::load()?;

    match cli.command {
        Command::Run { goal } => {
            let mut engine = build_engine(&config, &cli.agent)?;
            engine.run(goal).await
        }
        Command::Dev => {
            let mut engine = build_engine(&config, &cli.agent)?;
            engine.dev().await
        }
        Command::Tasks => {
            let tracker = TaskTracker::new(&config.workflow.plan_path);
            println!("{}", tracker.render()?);
            Ok(())
        }
        Command::Reset => {
            let mut conversations = open_conversations()?;
            conversations.reset(&cli.agent)?;
            println!("Conversation reset for agent '{}'.", cli.agent);
            Ok(())
        }
        Command::Login { realm } => login(&config, realm).await,
        Command::Logout { realm } => {
            let realm = realm_of(&config, realm)?;
            let store = CredentialStore::open_default()?;
            if store.delete(&realm)? {
                println!("Credentials removed for realm '{}'.", realm);
            } else {
                println!("No credentials stored for realm '{}'.", realm);
            }
            Ok(())
        }
    }
}

/// Logs go to a daily file under `~/.drover/logs`; the console stays
/// clean for the conversation itself. `RUST_LOG` controls the filter.
fn init_tracing() -> Result<tracing_appender::non_blocking::WorkerGuard> {
    let log_dir = dirs::home_dir()
        .context("Could not resolve home directory")?
        .join(".drover")
        .join("logs");
    std::fs::create_dir_all(&log_dir)
        .with_context(|| format!("Failed to create {}", log_dir.display()))?;

    let appender = tracing_appender::rolling::daily(&log_dir, "drover.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(writer)
        .with_ansi(false)
        .init();

    Ok(guard)
}

fn realm_of(config: &AppConfig, flag: Option<String>) -> Result<String> {
    if let Some(realm) = flag {
        return Ok(realm);
    }
    if let Ok(realm) = std::env::var("DROVER_REALM") {
        if !realm.is_empty() {
            return Ok(realm);
        }
    }
    match &config.api.realm {
        Some(realm) => Ok(realm.clone()),
        None => bail!("No realm configured. Set api.realm or pass --realm."),
    }
}

fn build_engine(config: &AppConfig, agent_key: &str) -> Result<Engine> {
    let Some(agent_id) = config.agent_id(agent_key) else {
        bail!(
            "No agent configured under key '{}'. Add it to the agents table or set DROVER_AGENT_ID.",
            agent_key
        );
    };

    let realm = realm_of(config, None)?;
    let store = CredentialStore::open_default()?;
    let backend = Arc::new(SessionClient::new(config.api.clone(), realm, store));

    let ui: Arc<dyn UserPrompt> = Arc::new(Console::new());
    let executor = CommandExecutor::new(config.commands.timeout_secs);
    let validator = Validator::new(config.validation.clone());
    let mut dispatcher = Dispatcher::new(Arc::clone(&ui), executor, validator);
    dispatcher.register_tool("fetch", Arc::new(FetchTool::new()));

    let conversations = open_conversations()?;
    let tracker = TaskTracker::new(&config.workflow.plan_path);

    info!("Engine ready (agent key '{}')", agent_key);
    Ok(Engine::new(
        backend,
        dispatcher,
        ui,
        conversations,
        tracker,
        config.workflow.clone(),
        agent_key.to_string(),
        agent_id,
    ))
}

fn open_conversations() -> Result<ConversationStore> {
    let home = dirs::home_dir().context("Could not resolve home directory")?;
    Ok(ConversationStore::open(
        home.join(".drover").join("conversations.json"),
    ))
}

async fn login(config: &AppConfig, realm_flag: Option<String>) -> Result<()> {
    let realm = realm_of(config, realm_flag)?;
    let console = Console::new();

    let Some(client_id) = console.ask("Client id:").await? else {
        return Ok(());
    };
    let Some(client_secret) = console.ask("Client secret:").await? else {
        return Ok(());
    };

    let http = reqwest::Client::new();
    let token = auth::authenticate(&http, &config.api.idm_base, &realm, &client_id, &client_secret)
        .await
        .context("Authentication failed")?;

    let store = CredentialStore::open_default()?;
    store.save(
        &realm,
        Credentials {
            access_token: token.access_token,
            expires_at: Some(chrono::Utc::now().timestamp() + token.expires_in),
            client_id: Some(client_id),
            client_secret: Some(client_secret),
        },
    )?;

    println!("Credentials stored for realm '{}'.", realm);
    Ok(())
}
