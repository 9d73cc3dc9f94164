use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use structopt::StructOpt;

use geoguard::config::{Config, HistoryConfig};
use geoguard::output::{OutputFormat, OutputHandler};
use geoguard::privacy::mask_ip;
use geoguard::{Engine, GeoIpService, HistoryStore, LoginAttempt, MemoryHistoryStore, SqliteHistoryStore};

/// GeoGuard login risk scoring CLI
#[derive(StructOpt, Debug)]
#[structopt(name = "geoguard", about = "Privacy-preserving login risk scoring")]
pub enum Cli {
    /// Score login attempts read from a JSON Lines file
    Evaluate {
        /// Path to configuration file
        #[structopt(short, long, default_value = "config.toml")]
        config: PathBuf,
        /// JSON Lines file with one login attempt per line
        #[structopt(short, long)]
        attempts: PathBuf,
        /// Persist each record to the configured history after scoring
        #[structopt(long)]
        store: bool,
        /// Mark attempts scoring at or above this value as blocked
        #[structopt(short, long)]
        threshold: Option<u32>,
        /// Override the configured output format (json, jsonl, console)
        #[structopt(short, long)]
        format: Option<String>,
    },
    /// Generate a default configuration file
    Config {
        /// Output path for the configuration file
        #[structopt(short, long, default_value = "config.toml")]
        output: PathBuf,
    },
    /// Print the masked network prefix of an IP address
    Mask {
        ip: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let cli = Cli::from_args();

    match cli {
        Cli::Evaluate {
            config,
            attempts,
            store,
            threshold,
            format,
        } => {
            if !config.exists() {
                eprintln!("Configuration file not found: {:?}", config);
                eprintln!("Run 'geoguard config' to generate a default configuration");
                std::process::exit(1);
            }
            let config = Config::from_file(&config)?;
            evaluate(&config, &attempts, store, threshold, format).await?;
        }
        Cli::Config { output } => {
            let config = Config::default();
            config.to_file(&output)?;
            println!("Default configuration written to: {:?}", output);
        }
        Cli::Mask { ip } => {
            let masked = mask_ip(&ip);
            if masked.is_empty() {
                eprintln!("Not an IP address: {}", ip);
                std::process::exit(1);
            }
            println!("{}", masked);
        }
    }

    Ok(())
}

async fn evaluate(
    config: &Config,
    attempts: &Path,
    store: bool,
    threshold: Option<u32>,
    format: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let geo = match &config.geoip.asn_db {
        Some(asn_db) => GeoIpService::with_asn_database(&config.geoip.city_db, asn_db)?,
        None => {
            log::warn!("No ASN database configured, data center detection will not trigger");
            GeoIpService::new(&config.geoip.city_db)?
        }
    };
    let history = open_history(&config.history)?;

    let rule_set = config.rules.build()?;
    if let (Some(blacklist), Some(url)) = (
        &rule_set.proxy_blacklist,
        config.rules.open_proxy.as_ref().and_then(|c| c.blacklist_url.as_deref()),
    ) {
        let client = reqwest::Client::new();
        if let Err(e) = blacklist.extend_from_url(&client, url).await {
            log::warn!("Could not fetch proxy blacklist from {}: {}", url, e);
        }
    }

    let engine = Engine::new(Arc::new(geo), Arc::clone(&history)).with_rules(rule_set.rules);
    log::info!("Scoring with {} rule(s): {}", engine.rule_count(), engine.rule_names().join(", "));

    let format = OutputFormat::from_str(format.as_deref().unwrap_or(&config.output.format));
    let mut output = OutputHandler::new(format, config.output.file_path.clone())?;

    let reader = BufReader::new(std::fs::File::open(attempts)?);
    let mut scored = 0;
    let mut blocked_count = 0;

    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let attempt: LoginAttempt = match serde_json::from_str(&line) {
            Ok(attempt) => attempt,
            Err(e) => {
                log::warn!("Skipping line {}: {}", index + 1, e);
                continue;
            }
        };

        let evaluation = engine.validate(&attempt);
        let blocked = threshold.map(|t| evaluation.result.total_score >= t);
        if blocked == Some(true) {
            blocked_count += 1;
        }

        if store {
            if let Err(e) = history.store(&evaluation.record) {
                log::warn!("Failed to store login record for {}: {}", evaluation.record.user_id, e);
            }
        }

        output.write_evaluation(&evaluation, blocked)?;
        scored += 1;
    }

    output.flush()?;
    match threshold {
        Some(t) => log::info!("Scored {} attempt(s), {} at or above {}", scored, blocked_count, t),
        None => log::info!("Scored {} attempt(s)", scored),
    }
    Ok(())
}

fn open_history(config: &HistoryConfig) -> Result<Arc<dyn HistoryStore>, Box<dyn std::error::Error>> {
    match config.backend.as_str() {
        "memory" => Ok(Arc::new(MemoryHistoryStore::new())),
        "sqlite" => {
            let path = config
                .sqlite_path
                .as_ref()
                .ok_or("history.sqlite_path is required for the sqlite backend")?;
            log::info!("Using login history at {:?}", path);
            Ok(Arc::new(SqliteHistoryStore::new(path)?))
        }
        other => Err(format!("Unknown history backend: {}", other).into()),
    }
}
