mod settings;

use clap::{Parser, Subcommand};
use rtvi_core::{
    LlmMessage, OutboundAction, RtviResult, ServiceConfigBuilder, SessionState, LLM_SERVICE,
};
use rtvi_gateway::ProxyServer;
use rtvi_session::{LlmHelper, Session, SessionOptions};
use rtvi_transport::WebSocketTransport;
use serde_json::Value;
use settings::RtviConfig;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "rtvi", about = "RTVI voice bot client and provisioning proxy")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "rtvi.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the provisioning proxy
    Serve {
        /// Address to bind (overrides config)
        #[arg(long)]
        bind: Option<String>,
        /// Bot backend start endpoint (overrides config and DAILY_BOTS_URL)
        #[arg(long)]
        bots_url: Option<String>,
    },
    /// Start a bot session and chat with it from stdin
    Connect {
        /// Provisioning endpoint (overrides config)
        #[arg(long)]
        base_url: Option<String>,
        /// Bot-ready timeout in milliseconds (overrides config)
        #[arg(long)]
        timeout_ms: Option<u64>,
        /// System prompt (overrides config)
        #[arg(long)]
        prompt: Option<String>,
    },
    /// Print the service configuration a session would send
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env is fine; the variables may come from the environment.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .json()
        .init();

    let cli = Cli::parse();
    let config = RtviConfig::load(&cli.config).await?;

    match cli.command {
        Commands::Serve { bind, bots_url } => {
            let mut proxy = config.proxy;
            if let Some(bind) = bind {
                proxy.bind = bind;
            }
            if bots_url.is_some() {
                proxy.bots_url = bots_url;
            }
            ProxyServer::serve(proxy.with_env()).await?;
        }
        Commands::Connect {
            base_url,
            timeout_ms,
            prompt,
        } => {
            let mut options = config.session;
            if let Some(url) = base_url {
                options.base_url = url;
            }
            if let Some(ms) = timeout_ms {
                options.timeout_ms = ms;
            }
            if let Some(prompt) = prompt {
                options.system_prompt = prompt;
            }
            run_session(options).await?;
        }
        Commands::Config => {
            let options = config.session;
            let merged = ServiceConfigBuilder::new(Some(&options.base_url)).build(
                Some(&options.services),
                Some(&options.config),
                &options.system_prompt,
            )?;
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "base_url": options.base_url,
                    "services": options.services,
                    "config": merged,
                }))?
            );
        }
    }

    Ok(())
}

/// Run `action` until it is answered. Returns `None` if the session ends or
/// `interrupt` fires first; there is no per-call timeout.
async fn call_or_interrupt(
    session: &Session,
    action: OutboundAction,
    state: &mut watch::Receiver<SessionState>,
    interrupt: impl Future<Output = ()>,
) -> Option<RtviResult<Value>> {
    tokio::select! {
        result = session.call(action) => Some(result),
        _ = state.wait_for(|s| s.is_terminal()) => None,
        _ = interrupt => None,
    }
}

/// Connect, print every inbound event as a JSON line on stdout and append
/// each stdin line to the bot's context as a user message.
async fn run_session(options: SessionOptions) -> anyhow::Result<()> {
    let session = Session::with_transport(options, Arc::new(WebSocketTransport::new()));
    session.register_helper(LLM_SERVICE, Arc::new(LlmHelper::new()));
    session.subscribe_all(|event| match serde_json::to_string(event) {
        Ok(line) => println!("{line}"),
        Err(e) => warn!(error = %e, "Failed to encode event"),
    });

    info!(session_id = %session.id(), "Connecting");
    session.connect().await?;

    let mut state = session.watch_state();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => match line? {
                Some(line) if line.trim().is_empty() => continue,
                Some(line) => {
                    let action = LlmHelper::append_to_messages(&[LlmMessage::user(line)], true);
                    let interrupt = async {
                        let _ = tokio::signal::ctrl_c().await;
                    };
                    match call_or_interrupt(&session, action, &mut state, interrupt).await {
                        Some(Ok(_)) => {}
                        Some(Err(e)) => warn!(error = %e, "Message not delivered"),
                        None => break,
                    }
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c() => break,
            changed = state.changed() => {
                if changed.is_err() || state.borrow().is_terminal() {
                    break;
                }
            }
        }
    }

    let failure = session.failure();
    session.disconnect().await?;
    info!(session_id = %session.id(), state = %session.state(), "Session closed");
    if let Some(failure) = failure {
        anyhow::bail!("session failed: {}", failure.to_error());
    }
    Ok(())
}
