mod config;
use anyhow::Context;
use clap::{Parser, Subcommand};
use crate::config::Config;
use loggate_core::{CredentialStore, SqliteCredentialStore};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

mod server;
use server::run_server;

mod simulate;
use simulate::{UploadTarget, generate_payload, simulate_upload};

#[derive(Parser)]
#[command(name = "loggate")]
#[command(about = "Authenticated, integrity-checked upload gateway for data loggers")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the upload server
    Server {
        /// Path to configuration file (defaults apply when omitted)
        #[arg(short, long)]
        config: Option<String>,
    },
    /// Register a logger and print its credentials
    AddLogger {
        /// Path to configuration file (defaults apply when omitted)
        #[arg(short, long)]
        config: Option<String>,

        /// Logger unique identifier
        #[arg(long)]
        logger: String,

        /// Pre-shared password; a random one is generated when omitted
        #[arg(long)]
        password: Option<String>,

        /// File in which to write the logger credentials
        #[arg(long)]
        creds: Option<PathBuf>,
    },
    /// Upload a random payload as a logger would, and report the verdict
    SimUpload {
        /// Upload server name or address
        #[arg(long, default_value = "localhost")]
        server: String,

        /// Upload server port
        #[arg(long, default_value_t = 8000)]
        port: u16,

        /// Logger unique identifier
        #[arg(long)]
        logger: String,

        /// Logger pre-shared password
        #[arg(long)]
        password: String,

        /// Payload size in bytes
        #[arg(long, default_value_t = 100_000)]
        size: usize,

        /// CA certificate (PEM) that signed the server certificate
        #[arg(long)]
        ca_cert: Option<PathBuf>,

        /// Talk plain HTTP to a server running with TLS disabled
        #[arg(long)]
        http: bool,
    },
}

#[derive(Debug, Serialize)]
struct LoggerCredentials {
    logger: String,
    password: String,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config_path = match &cli.command {
        Commands::Server { config } | Commands::AddLogger { config, .. } => config.clone(),
        Commands::SimUpload { .. } => None,
    };

    let cfg = match Config::load(config_path.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config: {}", e);
            std::process::exit(1);
        }
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| cfg.logging.level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match cli.command {
        Commands::Server { .. } => {
            tracing::info!(
                "Starting Loggate server on port {} with {:?} backend",
                cfg.api.port,
                cfg.cloud.provider
            );

            if let Err(e) = run_server(cfg).await {
                tracing::error!("Server error: {}", e);
                std::process::exit(1);
            }
        }
        Commands::AddLogger {
            logger,
            password,
            creds,
            ..
        } => {
            if let Err(e) = add_logger(&cfg, logger, password, creds.as_deref()).await {
                tracing::error!("Failed to add logger: {:#}", e);
                std::process::exit(1);
            }
        }
        Commands::SimUpload {
            server,
            port,
            logger,
            password,
            size,
            ca_cert,
            http,
        } => {
            let target = UploadTarget {
                server,
                port,
                logger,
                password,
                ca_cert,
                plain_http: http,
            };
            match simulate_upload(&target, generate_payload(size)).await {
                Ok(result) => println!("server acknowledged upload {:?}", result.status),
                Err(e) => {
                    tracing::error!("Failed to upload to {}: {:#}", target.url(), e);
                    std::process::exit(1);
                }
            }
        }
    }
}

async fn add_logger(
    cfg: &Config,
    logger: String,
    password: Option<String>,
    creds: Option<&Path>,
) -> anyhow::Result<()> {
    if logger.trim().is_empty() {
        anyhow::bail!("logger identifier cannot be empty");
    }

    let password = password
        .filter(|password| !password.is_empty())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let store = SqliteCredentialStore::new(&cfg.db.connection).with_context(|| {
        format!(
            "failed to open credential database {:?}",
            cfg.db.connection
        )
    })?;
    store
        .insert(&logger, &password)
        .await
        .with_context(|| format!("failed to register logger {}", logger))?;
    tracing::info!("Registered logger {} in {:?}", logger, store.db_path());

    let credentials = LoggerCredentials { logger, password };
    let data = serde_json::to_string_pretty(&credentials)?;

    if let Some(path) = creds {
        std::fs::write(path, &data)
            .with_context(|| format!("failed to write logger credentials to {:?}", path))?;
    }

    println!("logger credentials:\n{}", data);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_in(dir: &Path) -> Config {
        let mut cfg = Config::default();
        cfg.db.connection = dir.join("loggers.db");
        cfg
    }

    #[tokio::test]
    async fn test_add_logger_writes_credentials_file() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config_in(dir.path());
        let creds = dir.path().join("creds.json");

        add_logger(&cfg, "log-1".to_string(), None, Some(creds.as_path()))
            .await
            .unwrap();

        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&creds).unwrap()).unwrap();
        assert_eq!(written["logger"], "log-1");
        let password = written["password"].as_str().unwrap();
        assert!(uuid::Uuid::parse_str(password).is_ok());

        let store = SqliteCredentialStore::new(&cfg.db.connection).unwrap();
        assert!(store.verify("log-1", password).await);
    }

    #[tokio::test]
    async fn test_add_logger_rejects_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config_in(dir.path());

        add_logger(&cfg, "log-1".to_string(), Some("abc".to_string()), None)
            .await
            .unwrap();
        let second = add_logger(&cfg, "log-1".to_string(), Some("xyz".to_string()), None).await;
        assert!(second.is_err());

        let store = SqliteCredentialStore::new(&cfg.db.connection).unwrap();
        assert!(store.verify("log-1", "abc").await);
        assert!(!store.verify("log-1", "xyz").await);
    }

    #[test]
    fn test_cli_parses_add_logger() {
        let cli = Cli::try_parse_from([
            "loggate",
            "add-logger",
            "--logger",
            "log-1",
            "--creds",
            "creds.json",
        ])
        .unwrap();

        match cli.command {
            Commands::AddLogger {
                logger,
                password,
                creds,
                config,
            } => {
                assert_eq!(logger, "log-1");
                assert_eq!(password, None);
                assert_eq!(creds, Some(PathBuf::from("creds.json")));
                assert_eq!(config, None);
            }
            _ => panic!("expected add-logger"),
        }
    }

    #[test]
    fn test_cli_parses_sim_upload() {
        let cli = Cli::try_parse_from([
            "loggate",
            "sim-upload",
            "--server",
            "gateway.local",
            "--port",
            "8443",
            "--logger",
            "log-1",
            "--password",
            "abc",
            "--size",
            "2048",
        ])
        .unwrap();

        match cli.command {
            Commands::SimUpload {
                server,
                port,
                logger,
                password,
                size,
                ca_cert,
                http,
            } => {
                assert_eq!(server, "gateway.local");
                assert_eq!(port, 8443);
                assert_eq!(logger, "log-1");
                assert_eq!(password, "abc");
                assert_eq!(size, 2048);
                assert_eq!(ca_cert, None);
                assert!(!http);
            }
            _ => panic!("expected sim-upload"),
        }
    }
}
