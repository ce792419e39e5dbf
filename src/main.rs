use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;
use voice_session::{
    create_router, AppState, AudioBackendFactory, AudioSink, AudioSource, Config,
    FileHistoryStore, HistoryStore, NatsTransport, VoiceSession,
};

#[derive(Parser)]
#[command(name = "voice-session", version, about = "Realtime voice conversation client")]
struct Cli {
    /// Configuration file (extension optional)
    #[arg(short, long, default_value = "config/voice-session")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start a conversation and run until Ctrl-C
    Run,
    /// Serve the HTTP control API
    Serve,
    /// Inspect or clear conversation history
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },
}

#[derive(Subcommand)]
enum HistoryAction {
    /// Print recent turns
    List,
    /// Delete all turns
    Clear {
        /// Confirm the deletion
        #[arg(long)]
        yes: bool,
    },
}

fn build_session(cfg: &Config, history: Arc<dyn HistoryStore>) -> VoiceSession {
    let transport = Arc::new(NatsTransport::new(
        cfg.transport.nats_url.clone(),
        cfg.transport.subject_prefix.clone(),
    ));
    let devices = Arc::new(AudioBackendFactory::new(
        AudioSource::parse(&cfg.audio.input),
        AudioSink::parse(&cfg.audio.output),
    ));

    VoiceSession::new(cfg.session_config(), transport, devices, history)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let cfg = Config::load(&cli.config)?;

    info!("{} v{}", cfg.service.name, env!("CARGO_PKG_VERSION"));

    let history: Arc<dyn HistoryStore> = Arc::new(FileHistoryStore::open(&cfg.history.dir)?);

    match cli.command {
        Command::Run => {
            let session = build_session(&cfg, history);
            session.start().await?;

            info!("Conversation running, press Ctrl-C to stop");
            let mut status = session.subscribe();
            tokio::select! {
                result = tokio::signal::ctrl_c() => {
                    result.context("Failed to listen for Ctrl-C")?;
                }
                _ = status.wait_for(|s| !s.is_active()) => {
                    info!("Session ended: {}", session.status());
                }
            }

            session.stop().await;
            let stats = session.stats().await;
            info!(
                "Sent {} chunks, played {} units, recorded {} turns",
                stats.chunks_sent, stats.units_scheduled, stats.turns_recorded
            );
        }

        Command::Serve => {
            let session = build_session(&cfg, history);
            let app = create_router(AppState::new(session.clone()));
            let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
            let listener = tokio::net::TcpListener::bind(&addr)
                .await
                .with_context(|| format!("Failed to bind {}", addr))?;

            info!("HTTP control API listening on {}", addr);
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = tokio::signal::ctrl_c().await;
                })
                .await?;

            session.stop().await;
        }

        Command::History { action } => match action {
            HistoryAction::List => {
                for entry in history.list()? {
                    println!("{}: {}", entry.speaker, entry.text);
                }
            }
            HistoryAction::Clear { yes } => {
                if !yes {
                    anyhow::bail!("Refusing to clear history without --yes");
                }
                history.clear()?;
                println!("History cleared");
            }
        },
    }

    Ok(())
}
