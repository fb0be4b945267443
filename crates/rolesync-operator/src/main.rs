use std::{env, path::Path, sync::Arc};

use anyhow::Context;
use rolesync_core::Kind;
use rolesync_db_memory::InMemoryStore;
use rolesync_operator::config::loader::{DEFAULT_CONFIG_PATH, load_config};
use rolesync_operator::seed::{apply_seed, load_seed};
use rolesync_operator::{Controller, ControllerConfig, DefaultPlanner, Reconciler, observability};
use rolesync_storage::TimeoutStore;

const ONCE_MAX_RETRIES: u32 = 5;

/// How the configuration path was determined.
#[derive(Debug, Clone, Copy)]
enum ConfigSource {
    /// From --config CLI argument
    CliArgument,
    /// From ROLESYNC_CONFIG environment variable
    EnvironmentVariable,
    /// Default path (rolesync.toml)
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CliArgument => write!(f, "CLI argument (--config)"),
            Self::EnvironmentVariable => write!(f, "environment variable (ROLESYNC_CONFIG)"),
            Self::Default => write!(f, "default"),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (before anything else)
    if let Err(e) = dotenvy::dotenv() {
        // Not an error if .env doesn't exist - it's optional
        if !matches!(e, dotenvy::Error::Io(ref io_err) if io_err.kind() == std::io::ErrorKind::NotFound)
        {
            eprintln!("Warning: Failed to load .env file: {e}");
        }
    }

    observability::init_tracing();

    let (config_path, source) = resolve_config_path();
    let once = env::args().skip(1).any(|arg| arg == "--once");

    let cfg = match load_config(Some(&config_path)) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(2);
        }
    };
    observability::apply_logging_level(&cfg.logging.level);

    tracing::info!(
        path = %config_path,
        source = %source,
        "Configuration loaded"
    );

    let store = Arc::new(InMemoryStore::new());
    if let Some(path) = &cfg.seed.path {
        let seed = load_seed(Path::new(path))?;
        let summary = apply_seed(&store, seed)
            .await
            .with_context(|| format!("seeding store from {path}"))?;
        tracing::info!(
            path = %path,
            owners = summary.owners,
            objects = summary.objects,
            "Store seeded"
        );
    }

    let bounded = Arc::new(TimeoutStore::new(store.clone(), cfg.reconcile.call_timeout()));
    let reconciler = Reconciler::new(bounded, Arc::new(DefaultPlanner))
        .with_settings(cfg.reconcile.settings());
    let mut controller_config = ControllerConfig::from(&cfg.controller);
    if once && controller_config.max_retries == 0 {
        // A single run must terminate even if an owner never converges
        controller_config.max_retries = ONCE_MAX_RETRIES;
    }
    let controller = Arc::new(Controller::new(Arc::new(reconciler), controller_config));

    let owners = store.owners();
    for owner in &owners {
        controller.enqueue(owner.key());
    }
    tracing::info!(owners = owners.len(), once, "Owners enqueued");

    if once {
        controller.run_until_idle().await;

        for owner in &owners {
            let owned = store.owned_by(&owner.as_owner());
            let count = |kind: Kind| owned.iter().filter(|o| o.kind() == kind).count();
            println!(
                "{}: {} service account(s), {} role(s), {} role binding(s)",
                owner.key(),
                count(Kind::ServiceAccount),
                count(Kind::Role),
                count(Kind::RoleBinding),
            );
        }

        let stats = controller.stats();
        tracing::info!(
            reconciles = stats.reconciles,
            successes = stats.successes,
            failures = stats.failures,
            dropped = stats.dropped,
            "Reconcile run finished"
        );
        if stats.dropped > 0 {
            anyhow::bail!("{} owner(s) did not converge", stats.dropped);
        }
        return Ok(());
    }

    let runner = tokio::spawn({
        let controller = controller.clone();
        async move { controller.run().await }
    });

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;
    tracing::info!("Shutdown signal received");
    controller.shutdown();
    runner.await.context("controller task failed")?;

    Ok(())
}

fn resolve_config_path() -> (String, ConfigSource) {
    // 1. Check CLI: --config <path>
    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" {
            if let Some(path) = args.next() {
                return (path, ConfigSource::CliArgument);
            }
        }
    }

    // 2. Check environment variable
    if let Ok(path) = env::var("ROLESYNC_CONFIG") {
        if !path.is_empty() {
            return (path, ConfigSource::EnvironmentVariable);
        }
    }

    // 3. Default to rolesync.toml
    (DEFAULT_CONFIG_PATH.to_string(), ConfigSource::Default)
}
