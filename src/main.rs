use anyhow::{Context, Result};
use argh::FromArgs;
use meteosix_etl::{
    EtlConfig, EtlError, EtlPipeline, InfluxWriter, MeteoSixClient, PlaceResolver, Poller,
    StateStore, location_ids, logging,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{error, info};

#[derive(FromArgs)]
/// Load MeteoSIX forecasts into InfluxDB
struct Cli {
    /// path to a TOML configuration file
    #[argh(option, short = 'c')]
    config: Option<PathBuf>,

    /// enable debug logging
    #[argh(switch, short = 'v')]
    verbose: bool,

    #[argh(subcommand)]
    command: Option<Command>,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum Command {
    Run(RunArgs),
    Resolve(ResolveArgs),
    Poll(PollArgs),
}

#[derive(FromArgs)]
/// Resolve places and run the incremental forecast ETL (default)
#[argh(subcommand, name = "run")]
struct RunArgs {
    /// place to load, repeatable; defaults to the configured list
    #[argh(option, short = 'p')]
    place: Vec<String>,
}

#[derive(FromArgs)]
/// Resolve places to MeteoSIX location ids and print them
#[argh(subcommand, name = "resolve")]
struct ResolveArgs {
    /// place to resolve, repeatable; defaults to the configured list
    #[argh(option, short = 'p')]
    place: Vec<String>,
}

#[derive(FromArgs)]
/// Continuously poll point forecasts for the configured coordinates
#[argh(subcommand, name = "poll")]
struct PollArgs {
    /// stop after this many rounds
    #[argh(option)]
    rounds: Option<usize>,
}

fn main() -> ExitCode {
    let cli: Cli = argh::from_env();

    let config = match EtlConfig::load_from_path(cli.config.clone()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = logging::init(&config.logging, cli.verbose) {
        eprintln!("{e}");
        return ExitCode::FAILURE;
    }

    match run(cli, config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            if let Some(etl_error) = e.downcast_ref::<EtlError>() {
                eprintln!("{}", etl_error.user_message());
            }
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli, config: EtlConfig) -> Result<()> {
    match cli.command {
        None => run_etl(&config, Vec::new()),
        Some(Command::Run(args)) => run_etl(&config, args.place),
        Some(Command::Resolve(args)) => resolve(&config, args.place),
        Some(Command::Poll(args)) => poll(config, args.rounds),
    }
}

fn queries_or_default(config: &EtlConfig, places: Vec<String>) -> Vec<String> {
    if places.is_empty() {
        config.etl.places.clone()
    } else {
        places
    }
}

fn run_etl(config: &EtlConfig, places: Vec<String>) -> Result<()> {
    let client = MeteoSixClient::new(&config.meteosix, &config.poller)?;
    let writer = InfluxWriter::new(&config.influx)?;
    let store = StateStore::new(&config.state);

    let queries = queries_or_default(config, places);
    let resolver = PlaceResolver::new(&client, &store, config.etl.place_search_delay());
    let resolved = resolver
        .resolve(&queries, &config.etl.place_type)
        .context("Place resolution failed")?;
    let ids = location_ids(&resolved)?;
    info!("Loading forecasts for {} locations", ids.len());

    let mut pipeline = EtlPipeline::new(client, writer, store, &config.etl)?;
    let summary = pipeline.run(&ids).context("Forecast ETL aborted")?;
    info!(
        "Done: {} points from {}/{} batches ({} places skipped)",
        summary.points_written,
        summary.batches_processed,
        summary.batches_total,
        summary.features_skipped
    );
    Ok(())
}

fn resolve(config: &EtlConfig, places: Vec<String>) -> Result<()> {
    let client = MeteoSixClient::new(&config.meteosix, &config.poller)?;
    let store = StateStore::new(&config.state);

    let queries = queries_or_default(config, places);
    let resolver = PlaceResolver::new(&client, &store, config.etl.place_search_delay());
    for place in resolver.resolve(&queries, &config.etl.place_type)? {
        println!(
            "{}\t{}\t{}\t{}",
            place.query,
            place.id.as_deref().unwrap_or("-"),
            place.name.as_deref().unwrap_or("-"),
            place.province.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}

fn poll(config: EtlConfig, rounds: Option<usize>) -> Result<()> {
    let client = MeteoSixClient::new(&config.meteosix, &config.poller)?;
    let writer = InfluxWriter::new(&config.influx)?;

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = Arc::clone(&shutdown);
        ctrlc::set_handler(move || {
            info!("Received Ctrl+C, stopping after the current request...");
            shutdown.store(true, Ordering::Relaxed);
        })
        .context("Failed to install Ctrl+C handler")?;
    }

    Poller::new(client, writer, config.poller, shutdown).run(rounds);
    Ok(())
}
