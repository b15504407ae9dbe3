pub mod config;
pub mod db;
pub mod store;
pub mod timer;
mod utils;

use std::sync::Arc;

use anyhow::{Context, Result};
use log::info;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use config::{RuntimeConfig, StoreBackend};
use db::Database;
use store::{JsonFileStore, KeyValueStore};
use timer::{commands::invoke, ClockController, SystemTimeSource};

pub struct AppState {
    pub timer: ClockController,
}

impl AppState {
    pub async fn from_config(config: &RuntimeConfig) -> Result<Self> {
        let store = open_store(config)?;
        let timer =
            ClockController::restore(Arc::new(SystemTimeSource), store, config.refresh_interval)
                .await;
        Ok(Self { timer })
    }
}

pub fn open_store(config: &RuntimeConfig) -> Result<Arc<dyn KeyValueStore>> {
    let path = config.store_path();
    let store: Arc<dyn KeyValueStore> = match config.store {
        StoreBackend::JsonFile => Arc::new(JsonFileStore::new(path.clone())?),
        StoreBackend::Sqlite => Arc::new(Database::new(path.clone())?),
    };
    info!("Using {:?} store at {}", config.store, path.display());
    Ok(store)
}

/// Splits `<command> [json-args]`. Missing arguments become `null`.
pub fn parse_request(line: &str) -> Result<(String, Value)> {
    let line = line.trim();
    let (command, rest) = match line.split_once(char::is_whitespace) {
        Some((command, rest)) => (command, rest.trim()),
        None => (line, ""),
    };
    let args = if rest.is_empty() {
        Value::Null
    } else {
        serde_json::from_str(rest).with_context(|| format!("arguments for {command} are not JSON"))?
    };
    Ok((command.to_string(), args))
}

pub async fn handle_line(state: &AppState, line: &str) -> Value {
    let result = match parse_request(line) {
        Ok((command, args)) => invoke(state, &command, args).await,
        Err(err) => Err(format!("{err:#}")),
    };
    match result {
        Ok(value) => json!({ "ok": value }),
        Err(message) => json!({ "error": message }),
    }
}

async fn serve(config: RuntimeConfig) -> Result<()> {
    let state = AppState::from_config(&config).await?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    while let Some(line) = lines.next_line().await.context("failed to read stdin")? {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if trimmed == "quit" || trimmed == "exit" {
            break;
        }

        let response = handle_line(&state, trimmed).await;
        stdout
            .write_all(format!("{response}\n").as_bytes())
            .await
            .context("failed to write response")?;
        stdout.flush().await?;
    }

    state.timer.shutdown().await;
    info!("Mastery timer shutting down");
    Ok(())
}

pub fn run() -> Result<()> {
    let config = RuntimeConfig::from_env();

    // RUST_LOG still wins when set.
    let default_level = if config.debug {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    env_logger::Builder::new()
        .filter_level(default_level)
        .parse_default_env()
        .init();

    info!("Mastery timer starting up...");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;

    runtime.block_on(serve(config))
}
