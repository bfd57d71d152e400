use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use shelf_rotation::catalog::{AdminClient, CatalogApi, ClientConfig, MetaobjectStateStore, StateStore};
use shelf_rotation::config::Config;
use shelf_rotation::error::{Error, Result};
use shelf_rotation::rotation::CollectionSorter;
use shelf_rotation::scheduler::{
    CronTrigger, RotationScheduler, RotationSettings, SweepJob, SweepSettings, TickOutcome,
};
use shelf_rotation::stats;

#[derive(Parser)]
#[command(
    name = "shelf-rotation",
    version,
    about = "Scheduled catalog rotation and collection sorting",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// TOML config file; environment variables are used when omitted
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json); overrides the config file
    #[arg(long, global = true)]
    log_format: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the rotation (and the tag sweep when configured) on their schedules
    Serve,

    /// Run one rotation now
    Rotate,

    /// Run one tag sweep now
    Sweep,

    /// Reorder one collection now
    Reorder {
        /// Collection gid
        collection_id: String,
    },

    /// Print dashboard statistics
    Stats,

    /// Show the next fire times of the rotation rule
    Upcoming {
        #[arg(short, long, default_value = "5")]
        count: usize,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(
                category = %e.category(),
                recoverable = e.is_recoverable(),
                error = %e,
                "Command failed"
            );
            eprintln!("Error ({}): {e}", e.category());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load(cli.config.as_deref()).map_err(Error::invalid_config)?;
    let log_format = cli
        .log_format
        .clone()
        .unwrap_or_else(|| config.logging.format.clone());
    setup_tracing(&log_format, &config.logging.level, cli.verbose);

    config
        .validate()
        .map_err(|e| Error::invalid_config(e.context("Invalid configuration")))?;
    tracing::info!("shelf-rotation starting");

    match cli.command {
        Commands::Serve => serve(&config).await?,
        Commands::Rotate => rotate(&config).await?,
        Commands::Sweep => sweep(&config).await?,
        Commands::Reorder { collection_id } => reorder(&config, &collection_id).await?,
        Commands::Stats => print_stats(&config).await?,
        Commands::Upcoming { count } => upcoming(&config, count)?,
    }

    tracing::info!("shelf-rotation finished");
    Ok(())
}

fn setup_tracing(format: &str, level: &str, verbose: bool) {
    let env_filter = if verbose {
        tracing_subscriber::EnvFilter::new("shelf_rotation=debug,info")
    } else {
        tracing_subscriber::EnvFilter::new(format!("shelf_rotation={level},warn"))
    };

    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
    }
}

fn connect(config: &Config) -> Result<Arc<AdminClient>> {
    let (namespace, key) = config
        .rotation
        .assignment_metafield()
        .map_err(Error::invalid_config)?;
    let client_config = ClientConfig::new(&config.catalog.endpoint, &config.catalog.access_token)
        .with_requests_per_second(config.catalog.requests_per_second)
        .with_timeout(config.request_timeout())
        .with_assignment_metafield(namespace, key);

    let client = AdminClient::new(client_config)?;
    Ok(Arc::new(client))
}

fn state_store(config: &Config, client: Arc<AdminClient>) -> Arc<dyn StateStore> {
    Arc::new(MetaobjectStateStore::new(
        client,
        &config.rotation.next_run_field,
    ))
}

fn rotation_scheduler(config: &Config, client: Arc<AdminClient>) -> Result<RotationScheduler> {
    let settings = RotationSettings::from_config(&config.rotation)?;
    let store = state_store(config, client.clone());
    Ok(RotationScheduler::new(client, store, settings))
}

fn sweep_job(config: &Config, client: Arc<AdminClient>) -> Option<SweepJob> {
    config.sweep.as_ref().map(|sweep| {
        let settings = SweepSettings::from_config(sweep, config.rotation.fetch_options());
        SweepJob::new(client, settings)
    })
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn serve(config: &Config) -> Result<()> {
    let client = connect(config)?;
    let rotation = Arc::new(rotation_scheduler(config, client.clone())?);

    let mut handles = vec![CronTrigger::new(config.rotation.trigger())?.spawn(rotation)];

    if let (Some(sweep_config), Some(job)) = (&config.sweep, sweep_job(config, client)) {
        let trigger = CronTrigger::new(shelf_rotation::scheduler::TriggerConfig::new(
            &sweep_config.cron,
            &config.rotation.timezone,
        ))?;
        handles.push(trigger.spawn(Arc::new(job)));
    }

    tracing::info!(
        triggers = handles.len(),
        "Scheduler running, press Ctrl+C to stop"
    );
    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown requested, waiting for running jobs");

    let stops = handles.into_iter().map(|handle| async move {
        let name = handle.name();
        if let Err(e) = handle.stop().await {
            tracing::warn!(job = name, error = %e, "Trigger ended with error");
        }
    });
    futures::future::join_all(stops).await;
    Ok(())
}

async fn rotate(config: &Config) -> Result<()> {
    let client = connect(config)?;
    let scheduler = rotation_scheduler(config, client)?;

    match scheduler.tick().await {
        TickOutcome::Completed(report) => print_json(&report),
        TickOutcome::Skipped => {
            println!("Rotation already running");
            Ok(())
        }
    }
}

async fn sweep(config: &Config) -> Result<()> {
    let client = connect(config)?;
    let Some(job) = sweep_job(config, client) else {
        return Err(Error::config("Tag sweep is not configured"));
    };

    match job.tick().await {
        TickOutcome::Completed(report) => print_json(&report),
        TickOutcome::Skipped => {
            println!("Tag sweep already running");
            Ok(())
        }
    }
}

async fn reorder(config: &Config, collection_id: &str) -> Result<()> {
    let client = connect(config)?;
    let api: &dyn CatalogApi = client.as_ref();

    let report = CollectionSorter::new(api, config.rotation.sorter_config())
        .reorder(collection_id)
        .await?;
    print_json(&report)
}

async fn print_stats(config: &Config) -> Result<()> {
    let client = connect(config)?;
    let store = state_store(config, client.clone());

    let snapshot = stats::collect(
        client.as_ref(),
        store.as_ref(),
        config.rotation.next_run_marker.as_deref(),
        config.rotation.active_limit,
    )
    .await;
    print_json(&snapshot)
}

fn upcoming(config: &Config, count: usize) -> Result<()> {
    let trigger = CronTrigger::new(config.rotation.trigger())?;
    for fire in trigger.upcoming(count) {
        println!("{}", fire.to_rfc3339());
    }
    Ok(())
}
