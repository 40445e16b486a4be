#![forbid(unsafe_code)]

//! `dealflow` — freelance project pipeline daemon.
//!
//! Bootstraps configuration, the `SQLite` store, the capability services,
//! and the four background loops: stage orchestrator, outbound delivery
//! drain, mail intake, and marketplace inbox intake.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use dealflow::intake::{InboxAdapter, MailAdapter};
use dealflow::persistence::{
    db, ActionRepo, ClientRepo, MessageRepo, ProjectRepo, SettingsRepo, TaskRepo,
};
use dealflow::pipeline::{Orchestrator, OutboundDrain};
use dealflow::services::{
    CompletionClient, MailTransport, MarketplaceClient, Notifier, NullCompletion,
    NullMarketplace, NullNotifier, NullTransport, OpenAiClient, TelegramNotifier,
};
use dealflow::stages::StageContext;
use dealflow::{AppError, GlobalConfig, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "dealflow", about = "Freelance project pipeline daemon", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("dealflow bootstrap");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    let mut config = if args.config.exists() {
        GlobalConfig::load_from_path(&args.config)?
    } else {
        warn!(path = %args.config.display(), "config file not found, using defaults");
        GlobalConfig::from_toml_str("")?
    };
    config.load_credentials();
    info!("configuration loaded");

    let pool = Arc::new(db::connect(&config).await?);
    info!("database connected");

    let projects = ProjectRepo::new(Arc::clone(&pool));
    let clients = ClientRepo::new(Arc::clone(&pool));
    let messages = MessageRepo::new(Arc::clone(&pool));
    let tasks = TaskRepo::new(Arc::clone(&pool));
    let actions = ActionRepo::new(Arc::clone(&pool));
    let settings = SettingsRepo::new(Arc::clone(&pool));
    settings.seed_defaults(&config).await?;

    let ai: Arc<dyn CompletionClient> = if config.ai.api_key.is_empty() {
        Arc::new(NullCompletion)
    } else {
        Arc::new(OpenAiClient::new(config.ai.clone())?)
    };
    // concrete mail and marketplace engines plug in behind these seams
    let transport: Arc<dyn MailTransport> = Arc::new(NullTransport);
    let marketplace: Arc<dyn MarketplaceClient> = Arc::new(NullMarketplace);
    let notifier: Arc<dyn Notifier> = if config.telegram.enabled {
        Arc::new(TelegramNotifier::new(config.telegram.clone()))
    } else {
        Arc::new(NullNotifier)
    };

    let ctx = StageContext {
        projects: projects.clone(),
        clients: clients.clone(),
        messages: messages.clone(),
        tasks,
        actions: actions.clone(),
        settings: settings.clone(),
        ai,
        marketplace: Arc::clone(&marketplace),
        notifier: Arc::clone(&notifier),
        config: config.clone(),
    };

    let ct = CancellationToken::new();
    let mut handles: Vec<JoinHandle<()>> = Vec::new();

    let orchestrator = Arc::new(Orchestrator::new(ctx));
    handles.push(orchestrator.spawn(ct.clone()));
    info!("orchestrator started");

    let drain = Arc::new(OutboundDrain::new(
        messages.clone(),
        actions,
        Arc::clone(&transport),
        config.clone(),
    ));
    handles.push(drain.spawn(ct.clone()));
    info!("outbound drain started");

    if config.mail.enabled {
        let adapter = Arc::new(MailAdapter::new(
            projects.clone(),
            clients,
            messages.clone(),
            settings,
            transport,
            Arc::clone(&notifier),
            config.clone(),
        )?);
        handles.push(adapter.spawn(ct.clone()));
        info!("mail adapter started");
    }

    if config.marketplace.enabled {
        let adapter = Arc::new(InboxAdapter::new(
            projects,
            messages,
            marketplace,
            notifier,
            config.clone(),
        ));
        handles.push(adapter.spawn(ct.clone()));
        info!("marketplace adapter started");
    }

    info!("dealflow ready");
    shutdown_signal().await;
    info!("shutdown signal received");
    ct.cancel();

    for handle in handles {
        let _ = handle.await;
    }
    info!("dealflow shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                tracing::warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            tracing::error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(env_filter);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
