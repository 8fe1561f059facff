use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;

use hostvisor::{
    Config, ControlPlugin, FsStore, Logger, MetricsPlugin, Registry, RuncRuntime, SignalStream,
    Supervisor, logging,
};

#[derive(Parser)]
#[command(name = "hostvisor", version, about = "Host-local container supervisor")]
struct Cli {
    /// TOML configuration file; built-in defaults when omitted.
    #[arg(short, long, env = "HOSTVISOR_CONFIG")]
    config: Option<PathBuf>,

    /// Overrides `logging.level` (an `EnvFilter` directive).
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Supervise every stored service until a terminal signal (default).
    Run,
    /// Print the remote method tables and command trees of all plugins.
    Describe,
    /// Validate the configuration and list the stored services.
    Check,
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut cfg = match &cli.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => Config::default(),
    };
    if let Some(level) = &cli.log_level {
        cfg.logging.level = level.clone();
    }
    Ok(cfg)
}

fn build_registry(cfg: &Config, log: &Logger) -> Result<Registry> {
    let runtime = Arc::new(RuncRuntime::new(&cfg.runtime, log.child("runc")));
    let store = Arc::new(FsStore::new(&cfg.store.services_dir));

    let mut registry = Registry::new(log.child("registry"));
    registry.register(Arc::new(Supervisor::new(
        runtime,
        store,
        log.child("supervisor"),
    )))?;
    registry.register(Arc::new(MetricsPlugin::new(log.child("metrics"))))?;
    registry.register(Arc::new(ControlPlugin::new(log.child("control"))))?;
    Ok(registry)
}

async fn run(cfg: Config, log: Logger) -> Result<()> {
    let registry = build_registry(&cfg, &log)?;
    registry.configure(&cfg).await.context("configuring plugins")?;
    let registry = Arc::new(registry);

    let mut signals = SignalStream::new().context("installing signal handlers")?;
    let forward = tokio::spawn({
        let registry = Arc::clone(&registry);
        let log = log.clone();
        async move {
            while let Some(signal) = signals.recv().await {
                if let Err(e) = registry.handle(signal).await {
                    tracing::error!(parent: log.span(), %signal, error = %e, label = e.as_label(), "shutdown after signal failed");
                }
            }
        }
    });

    tracing::info!(parent: log.span(), plugins = ?registry.names(), "hostvisor started");
    let res = registry.run().await;
    forward.abort();

    match &res {
        Ok(()) => tracing::info!(parent: log.span(), "hostvisor stopped"),
        Err(e) => tracing::error!(parent: log.span(), error = %e, label = e.as_label(), "hostvisor failed"),
    }
    res.context("supervision failed")
}

async fn check(cfg: &Config) -> Result<()> {
    use hostvisor::ServiceStore;

    let store = FsStore::new(&cfg.store.services_dir);
    let services = store.list_services().await?;
    for svc in &services {
        println!("{}\t{}\t{:?}", svc.id, svc.bundle.display(), svc.mount);
    }
    println!("{} service(s) in {}", services.len(), cfg.store.services_dir.display());
    Ok(())
}

fn describe(cfg: &Config, log: &Logger) -> Result<()> {
    let registry = build_registry(cfg, log)?;
    let methods: serde_json::Map<String, serde_json::Value> = registry
        .remote_methods()
        .into_iter()
        .map(|(name, table)| Ok((name.to_string(), serde_json::to_value(table)?)))
        .collect::<Result<_, serde_json::Error>>()?;
    let doc = json!({
        "methods": methods,
        "commands": registry.command_trees(),
    });
    println!("{}", serde_json::to_string_pretty(&doc)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let cfg = load_config(&cli)?;
    logging::init(&cfg.logging).context("initialising logging")?;
    let log = Logger::new("hostvisor");

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run(cfg, log).await,
        Command::Describe => describe(&cfg, &log),
        Command::Check => check(&cfg).await,
    }
}
