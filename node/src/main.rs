use anyhow::{anyhow, Context, Result};
use clap::{value_parser, Arg, ArgAction, Command};
use fs2::FileExt;
use metrics::describe_counter;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use sharelock_crypto::CredentialManager;
use sharelock_files::{JsonFileRegistryStore, LocalContentStore, ResourceRegistry};
use sharelock_gateway::AccessGateway;
use sharelock_rpc::{start_server, AppState, QrCodeEncoder};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod settings;
mod version;

use crate::settings::AppConfig;
use version::{git_commit_hash, SHARELOCK_VERSION};

fn build_cli() -> Command {
    Command::new("sharelock-node")
        .version(SHARELOCK_VERSION)
        .about("Sharelock QR share service")
        .disable_version_flag(true)
        .arg(
            Arg::new("version")
                .short('V')
                .long("version")
                .action(ArgAction::SetTrue)
                .help("Print version information and exit"),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .global(true),
        )
        .arg(
            Arg::new("data-dir")
                .short('d')
                .long("data-dir")
                .value_name("DIR")
                .help("Data directory")
                .global(true),
        )
        .arg(
            Arg::new("dev")
                .long("dev")
                .action(ArgAction::SetTrue)
                .help("Development mode: debug logging, bind on all interfaces")
                .global(true),
        )
        .arg(
            Arg::new("check")
                .long("check")
                .action(ArgAction::SetTrue)
                .help("Run a configuration self-check and exit"),
        )
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .value_name("LEVEL")
                .value_parser(["trace", "debug", "info", "warn", "error"])
                .help("Override the log level")
                .global(true),
        )
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .value_name("FORMAT")
                .value_parser(["pretty", "json"])
                .help("Select log output format")
                .global(true),
        )
        .arg(
            Arg::new("rpc-host")
                .long("rpc-host")
                .value_name("HOST")
                .help("Override HTTP bind host")
                .global(true),
        )
        .arg(
            Arg::new("rpc-port")
                .long("rpc-port")
                .value_name("PORT")
                .value_parser(value_parser!(u16))
                .help("Override HTTP port")
                .global(true),
        )
        .arg(
            Arg::new("disable-metrics")
                .long("disable-metrics")
                .action(ArgAction::SetTrue)
                .help("Disable the Prometheus metrics endpoint")
                .global(true),
        )
        .subcommand(Command::new("start").about("Start the share service (default)"))
        .subcommand(
            Command::new("status")
                .about("Check the /health endpoint of a running node")
                .arg(
                    Arg::new("health-path")
                        .long("health-path")
                        .value_name("PATH")
                        .default_value("/health")
                        .help("Health endpoint path to query"),
                ),
        )
}

fn load_config_with_overrides(matches: &clap::ArgMatches) -> Result<AppConfig> {
    let config_path = matches
        .get_one::<String>("config")
        .map(|value| value.as_str());
    let mut config = AppConfig::load(config_path)?;
    apply_overrides(matches, &mut config);
    config.validate()?;
    Ok(config)
}

fn apply_overrides(matches: &clap::ArgMatches, config: &mut AppConfig) {
    if let Some(data_dir) = matches.get_one::<String>("data-dir") {
        config.data_dir = PathBuf::from(data_dir);
    }

    if let Some(log_level) = matches.get_one::<String>("log-level") {
        config.log_level = log_level.clone();
    }

    if let Some(log_format) = matches.get_one::<String>("log-format") {
        config.log_format = log_format.clone();
    }

    if let Some(rpc_host) = matches.get_one::<String>("rpc-host") {
        config.rpc_host = rpc_host.clone();
    }

    if let Some(rpc_port) = matches.get_one::<u16>("rpc-port") {
        config.rpc_port = *rpc_port;
    }

    if matches.get_flag("disable-metrics") {
        config.prometheus_enabled = false;
    }

    if matches.get_flag("dev") {
        config.dev_mode = true;
        config.log_level = "debug".to_string();
        config.log_format = "pretty".to_string();
        if config.rpc_host == "127.0.0.1" {
            config.rpc_host = "0.0.0.0".to_string();
        }
    }
}

async fn check_status(config: &AppConfig, health_path: &str) -> Result<()> {
    let mut path = health_path.to_string();
    if !path.starts_with('/') {
        path = format!("/{path}");
    }
    let host = if config.rpc_host == "0.0.0.0" {
        "127.0.0.1"
    } else {
        config.rpc_host.as_str()
    };
    let url = format!("http://{}:{}{}", host, config.rpc_port, path);
    let response = reqwest::Client::new().get(&url).send().await?;
    let status = response.status();
    let body = response.text().await?;
    println!("GET {url} -> {status}");
    println!("{body}");
    if status.is_success() {
        Ok(())
    } else {
        anyhow::bail!("Health check failed with status {status}")
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = build_cli().get_matches();

    if matches.get_flag("version") {
        print_version_info();
        return Ok(());
    }

    if let Some(status_matches) = matches.subcommand_matches("status") {
        let config = load_config_with_overrides(status_matches)?;
        let health_path = status_matches
            .get_one::<String>("health-path")
            .map(|value| value.as_str())
            .unwrap_or("/health");
        return check_status(&config, health_path).await;
    }

    let start_matches = matches.subcommand_matches("start").unwrap_or(&matches);
    let config = load_config_with_overrides(start_matches)?;

    if matches.get_flag("check") {
        return run_self_check(&config);
    }

    init_logging(&config)?;
    run_node(config).await
}

async fn run_node(config: AppConfig) -> Result<()> {
    info!(
        "Starting sharelock {} (commit {})",
        SHARELOCK_VERSION,
        git_commit_hash()
    );
    match config.config_path() {
        Some(path) => info!("Loaded configuration from {}", path.display()),
        None => info!("No configuration file found; using defaults and environment"),
    }
    if config.dev_mode {
        warn!("Development mode enabled");
    }

    let _lock = DataDirLock::acquire(&config.data_dir, "node")?;
    let metrics = init_metrics(&config);

    if config.encryption_secret.is_none() {
        warn!(
            "No encryption secret configured (SHARELOCK_ENCRYPTION_KEY or ENCRYPTION_KEY); \
             private registrations will be rejected"
        );
    }

    let registry_path = config.registry_path();
    let registry = ResourceRegistry::open(Arc::new(JsonFileRegistryStore::new(&registry_path)))
        .with_context(|| format!("failed to load registry from {}", registry_path.display()))?;
    info!(
        "Loaded {} resources from {}",
        registry.len(),
        registry_path.display()
    );

    let uploads_dir = config.uploads_dir();
    let content = LocalContentStore::new(&uploads_dir)
        .with_context(|| format!("failed to prepare uploads directory {}", uploads_dir.display()))?;

    let gateway = AccessGateway::new(
        Arc::new(registry),
        Arc::new(content),
        CredentialManager::new(config.encryption_secret.clone()),
        Arc::new(QrCodeEncoder::default()),
        config.upload_policy(),
    );

    let state = AppState::new(Arc::new(gateway))
        .with_public_dir(config.public_dir.clone())
        .with_metrics(metrics);

    start_server(state, &config.listen_addr(), shutdown_signal()).await?;
    info!("Sharelock node stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", err);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

fn init_metrics(config: &AppConfig) -> Option<PrometheusHandle> {
    if !config.prometheus_enabled {
        info!("Prometheus metrics exporter disabled via configuration");
        return None;
    }

    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            info!("Prometheus metrics exporter registered");
            describe_counter!(
                "sharelock_registrations_total",
                "Resources registered, by kind and visibility"
            );
            describe_counter!(
                "sharelock_registration_failures_total",
                "Rejected or failed registrations, by reason"
            );
            describe_counter!(
                "sharelock_access_total",
                "Access decisions, by outcome"
            );
            Some(handle)
        }
        Err(err) => {
            warn!("Failed to install Prometheus metrics exporter: {}", err);
            None
        }
    }
}

fn init_logging(config: &AppConfig) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    if config.log_format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().pretty())
            .try_init()?;
    }

    Ok(())
}

fn print_version_info() {
    println!("sharelock {} (commit {})", SHARELOCK_VERSION, git_commit_hash());
}

fn run_self_check(config: &AppConfig) -> Result<()> {
    println!("Running sharelock self-check...");
    let mut issues = Vec::new();

    if let Err(err) = ensure_port_available(&config.rpc_host, config.rpc_port, "HTTP") {
        issues.push(err);
    }

    if let Err(err) = ensure_storage_directory(&config.data_dir) {
        issues.push(err);
    }

    if let Some(parent) = config.registry_path().parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            issues.push(format!(
                "Registry directory {} does not exist",
                parent.display()
            ));
        }
    }

    if let Some(public_dir) = &config.public_dir {
        if !public_dir.is_dir() {
            issues.push(format!(
                "Public directory {} is not a directory",
                public_dir.display()
            ));
        }
    }

    if config.encryption_secret.is_none() {
        println!("warning: no encryption secret configured; private registrations are disabled");
    }

    if issues.is_empty() {
        println!("OK");
        Ok(())
    } else {
        for issue in &issues {
            eprintln!("- {issue}");
        }
        anyhow::bail!("self-check failed")
    }
}

fn ensure_port_available(host: &str, port: u16, label: &str) -> Result<(), String> {
    let addr = format!("{host}:{port}");
    match TcpListener::bind(&addr) {
        Ok(listener) => drop(listener),
        Err(err) => {
            return Err(format!(
                "{label} port {addr} is not available for binding: {err}"
            ))
        }
    }
    Ok(())
}

fn ensure_storage_directory(dir: &Path) -> Result<(), String> {
    if !dir.exists() {
        return Err(format!(
            "Data directory {} does not exist; create it before starting the node",
            dir.display()
        ));
    }
    if !dir.is_dir() {
        return Err(format!("Data path {} is not a directory", dir.display()));
    }

    let probe = dir.join(".sharelock_write_test");
    if let Err(err) = fs::write(&probe, b"ok") {
        return Err(format!("Unable to write into {}: {}", dir.display(), err));
    }
    let _ = fs::remove_file(&probe);
    Ok(())
}

/// Exclusive lock on `<data_dir>/.sharelock.lock`, released on drop.
struct DataDirLock {
    path: PathBuf,
    file: File,
}

impl DataDirLock {
    fn acquire<P: AsRef<Path>>(data_dir: P, purpose: &str) -> Result<Self> {
        let dir = data_dir.as_ref();
        fs::create_dir_all(dir)?;
        let lock_path = dir.join(".sharelock.lock");
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&lock_path)?;

        if let Err(err) = file.try_lock_exclusive() {
            return Err(anyhow!(
                "Data directory {} is locked by another process ({}). \
                 Stop the running node or remove {} if you are sure it is stale.",
                dir.display(),
                err,
                lock_path.display()
            ));
        }

        file.set_len(0)?;
        writeln!(
            &file,
            "pid={};purpose={};started={}",
            std::process::id(),
            purpose,
            chrono::Utc::now().to_rfc3339()
        )?;

        Ok(Self {
            path: lock_path,
            file,
        })
    }
}

impl Drop for DataDirLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
        let _ = fs::remove_file(&self.path);
    }
}
