use feedsync_app::{
    command::{Command, HELP},
    render::{render_feed, render_status, render_thread},
    sync::{SyncEngine, state::SyncState},
};
use feedsync_client::{ApiClient, ApiError, ClientConfig};
use feedsync_common::util::{NonPositiveDurationError, PositiveDuration};
use serde::Deserialize;
use std::{sync::Arc, time::Duration};
use thiserror::Error;
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::watch,
};
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use url::Url;

#[derive(Debug, Error)]
enum InitError {
    #[error("Error parsing .env file: {0}")]
    Dotenv(#[from] dotenvy::Error),
    #[error("Error parsing environment: {0}")]
    Envy(#[from] envy::Error),
    #[error("Invalid API_TIMEOUT_SECS: {0}")]
    Timeout(#[from] NonPositiveDurationError),
    #[error("Error setting up the API client: {0}")]
    Client(#[from] ApiError),
    #[error("Error reading terminal input: {0}")]
    Stdin(std::io::Error),
}

#[derive(Clone, Eq, PartialEq, Hash, Deserialize)]
struct Env {
    api_base_url: Url,
    api_app_id: String,
    #[serde(default = "default_timeout_secs")]
    api_timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    10
}

fn install_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "feedsync_app=debug,\
                feedsync_client=debug,\
                feedsync_common=debug"
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn get_env() -> Result<Env, InitError> {
    if let Err(e) = dotenvy::dotenv() {
        if e.not_found() {
            debug!("No .dotenv file found");
        } else {
            return Err(e.into());
        }
    }

    envy::from_env().map_err(InitError::from)
}

/// Prints the status line and the open thread whenever either changes.
async fn watch_state(mut receiver: watch::Receiver<SyncState>) {
    let mut shown = receiver.borrow_and_update().clone();

    while receiver.changed().await.is_ok() {
        let state = receiver.borrow_and_update().clone();

        if state.transient_message != shown.transient_message
            && let Some(status) = render_status(&state)
        {
            println!("{status}");
        }
        if state.active_thread != shown.active_thread {
            println!("{}", render_thread(&state));
        }

        shown = state;
    }
}

fn run(engine: &Arc<SyncEngine>, command: Command) {
    match command {
        Command::Show => {
            let state = engine.snapshot();
            println!("{}\n\n{}", render_feed(&state), render_thread(&state));
            if let Some(status) = render_status(&state) {
                println!("{status}");
            }
        }
        Command::Like(post_id) => {
            if let Err(err) = engine.like(&post_id) {
                eprintln!("{err}");
            }
        }
        Command::Open(post_id) => {
            let engine = Arc::clone(engine);
            tokio::spawn(async move {
                if let Err(err) = engine.expand_thread(&post_id).await {
                    eprintln!("{err}");
                }
            });
        }
        Command::Close => engine.collapse_thread(),
        Command::Write(text) => {
            if let Err(err) = engine.compose_draft_changed(text) {
                eprintln!("{err}");
            }
        }
        Command::Send => {
            let engine = Arc::clone(engine);
            tokio::spawn(async move {
                if let Err(err) = engine.submit_comment().await {
                    eprintln!("{err}");
                }
            });
        }
        Command::Reload => {
            let engine = Arc::clone(engine);
            tokio::spawn(async move { engine.reload_feed().await });
        }
        Command::Dismiss => engine.dismiss_message(),
        Command::Help => println!("{HELP}"),
        Command::Quit => {}
    }
}

#[tokio::main]
async fn main() -> Result<(), InitError> {
    install_tracing();
    let env = get_env()?;

    let mut config = ClientConfig::new(env.api_base_url, env.api_app_id);
    config.timeout = PositiveDuration::try_from(Duration::from_secs(env.api_timeout_secs))?;
    debug!(?config, "Configured API client");
    let engine = Arc::new(SyncEngine::new(Arc::new(ApiClient::new(config)?)));

    tokio::spawn(watch_state(engine.subscribe()));
    tokio::spawn({
        let engine = Arc::clone(&engine);
        async move { engine.start().await }
    });

    println!("{HELP}");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line.map_err(InitError::Stdin)?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            break;
        };
        if line.trim().is_empty() {
            continue;
        }

        match line.parse::<Command>() {
            Ok(Command::Quit) => break,
            Ok(command) => run(&engine, command),
            Err(err) => eprintln!("{err}"),
        }
    }

    debug!("Shutting down");
    Ok(())
}
