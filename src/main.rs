use std::{
    path::PathBuf,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
        mpsc,
    },
    thread,
    time::Duration,
};

use clap::{Parser, Subcommand};
use itertools::Itertools;
use log::{error, info, warn};
use peloton::{
    AppConfig, PelotonError, RaceContext, RaceState, Route, StopReason,
    feed::{
        FeedClient, LiveFeedProducer, MockSnapshotProducer, PollSettings, SnapshotProducer,
        collect_race,
    },
    report,
    riders::load_roster_file,
    writer,
};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Args {
    /// Config file to use instead of the one in the user config directory
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args, Debug)]
struct RiderOptions {
    /// Cached roster file, in the format of the rider endpoint
    #[arg(short, long)]
    roster: Option<PathBuf>,

    /// Follow every non-withdrawn rider of this nationality
    #[arg(short, long)]
    nationality: Option<String>,

    /// Follow this rider id, may be repeated
    #[arg(long = "rider")]
    riders: Vec<u32>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Follow the live race feed
    Live {
        /// Stage whose route to load, defaults to the current stage
        #[arg(short, long)]
        stage: Option<u32>,

        /// Directory where raw snapshots are saved
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[arg(long)]
        interval_ms: Option<u64>,

        #[arg(long)]
        base_url: Option<String>,

        #[command(flatten)]
        rider_options: RiderOptions,
    },
    /// Replay snapshots saved by a live session
    Replay {
        /// Directory of `<timestamp>.json` snapshot files
        #[arg(short, long)]
        input: PathBuf,

        /// Stage route file, in the format of the route endpoint
        #[arg(long)]
        route: PathBuf,

        /// Delay between two snapshots
        #[arg(long, default_value_t = 0)]
        interval_ms: u64,

        #[command(flatten)]
        rider_options: RiderOptions,
    },
    /// Print the effective configuration
    Config {
        /// Also save it to the user config directory
        #[arg(long)]
        save: bool,
    },
}

fn load_config(path: Option<&PathBuf>) -> Result<AppConfig, PelotonError> {
    let config = match path {
        Some(path) => AppConfig::from_file(path)?,
        None => AppConfig::from_local_file()?,
    };
    Ok(config.unwrap_or_default())
}

fn apply_rider_options(config: &mut AppConfig, options: &RiderOptions) {
    if let Some(roster) = &options.roster {
        config.roster_file = Some(roster.clone());
    }
    if let Some(nationality) = &options.nationality {
        config.tracked_nationality = Some(nationality.clone());
    }
    config.extra_rider_ids.extend(options.riders.iter().copied());
}

fn race_context(
    config: &AppConfig,
    client: Option<&FeedClient>,
) -> Result<RaceContext, PelotonError> {
    let roster = match (&config.roster_file, client) {
        (Some(path), _) => load_roster_file(path)?,
        (None, Some(client)) => client.roster()?,
        (None, None) => {
            warn!("No roster available, riders will be shown as unknown");
            Vec::new()
        }
    };
    let context = RaceContext::new(
        &roster,
        config.tracked_nationality.as_deref(),
        &config.extra_rider_ids,
    );
    if !context.tracked_riders().is_empty() {
        info!(
            "Following {}",
            context
                .tracked_riders()
                .iter()
                .map(|&id| context.rider_name(id))
                .join("; ")
        );
    }
    Ok(context)
}

fn follow_race(
    producer: impl SnapshotProducer,
    route: Route,
    context: RaceContext,
    config: &AppConfig,
    settings: PollSettings,
    shutdown: Arc<AtomicBool>,
) -> Result<StopReason, PelotonError> {
    let (report_tx, report_rx) = mpsc::channel();
    let clear_screen = config.clear_screen;
    let printer = thread::spawn(move || report::print_reports(report_rx, clear_screen));

    // if snapshots need saving we run a writer thread and have the loop send to it as well
    let (snapshot_writer_tx, snapshot_writer) = match config.snapshot_dir.clone() {
        Some(dir) => {
            let (tx, rx) = mpsc::channel();
            let handle = thread::spawn(move || writer::write_snapshots(&dir, rx));
            (Some(tx), Some(handle))
        }
        None => (None, None),
    };

    let mut state = RaceState::new(Arc::new(route));
    let reason = collect_race(
        producer,
        &mut state,
        &context,
        &settings,
        report_tx,
        snapshot_writer_tx,
        &shutdown,
    );

    if printer.join().is_err() {
        error!("Report printer thread panicked");
    }
    if let Some(handle) = snapshot_writer {
        match handle.join() {
            Ok(Err(e)) => error!("Snapshot writer failed: {}", e),
            Err(_) => error!("Snapshot writer thread panicked"),
            Ok(Ok(())) => {}
        }
    }
    reason
}

fn live(
    mut config: AppConfig,
    stage: Option<u32>,
    output: Option<PathBuf>,
    interval_ms: Option<u64>,
    base_url: Option<String>,
    rider_options: &RiderOptions,
    shutdown: Arc<AtomicBool>,
) -> Result<StopReason, PelotonError> {
    if let Some(output) = output {
        config.snapshot_dir = Some(output);
    }
    if let Some(interval_ms) = interval_ms {
        config.poll_interval_ms = interval_ms;
    }
    if let Some(base_url) = base_url {
        config.base_url = base_url;
    }
    apply_rider_options(&mut config, rider_options);

    let client = FeedClient::new(&config.base_url)?;
    let route = client.route(stage)?;
    let context = race_context(&config, Some(&client))?;
    let settings = config.poll_settings();
    follow_race(
        LiveFeedProducer::new(client),
        route,
        context,
        &config,
        settings,
        shutdown,
    )
}

fn replay(
    mut config: AppConfig,
    input: &PathBuf,
    route: &PathBuf,
    interval_ms: u64,
    rider_options: &RiderOptions,
    shutdown: Arc<AtomicBool>,
) -> Result<StopReason, PelotonError> {
    apply_rider_options(&mut config, rider_options);
    // replayed snapshots are already on disk
    config.snapshot_dir = None;

    let route = Route::from_file(route)?;
    let context = race_context(&config, None)?;
    let settings = PollSettings {
        interval: Duration::from_millis(interval_ms),
        ..config.poll_settings()
    };
    let producer = MockSnapshotProducer::from_dir(input)?;
    if producer.remaining() == 0 {
        warn!("No snapshot files found in {:?}", input);
    }
    follow_race(
        producer,
        route,
        context,
        &config,
        settings,
        shutdown,
    )
}

fn main() {
    colog::init();

    let cli = Args::parse();
    let shutdown = Arc::new(AtomicBool::new(false));
    let handler_flag = shutdown.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        println!("Exiting...");
        handler_flag.store(true, Ordering::Relaxed);
    }) {
        warn!("Could not set Ctrl-C handler: {}", e);
    }

    let config = match load_config(cli.config.as_ref()) {
        Ok(config) => config,
        Err(e) => {
            error!("Could not load config: {}", e);
            std::process::exit(1);
        }
    };

    let result = match &cli.command {
        Commands::Live {
            stage,
            output,
            interval_ms,
            base_url,
            rider_options,
        } => live(
            config,
            *stage,
            output.clone(),
            *interval_ms,
            base_url.clone(),
            rider_options,
            shutdown,
        ),
        Commands::Replay {
            input,
            route,
            interval_ms,
            rider_options,
        } => replay(config, input, route, *interval_ms, rider_options, shutdown),
        Commands::Config { save } => {
            match serde_json::to_string_pretty(&config) {
                Ok(json) => println!("{}", json),
                Err(e) => error!("Could not serialize config: {}", e),
            }
            if *save {
                if let Err(e) = config.save() {
                    error!("Error while saving config file: {}", e);
                    std::process::exit(1);
                }
            }
            return;
        }
    };

    match result {
        Ok(reason) => info!("Stopped: {:?}", reason),
        Err(e) => {
            error!("Error while following the race: {}", e);
            std::process::exit(1);
        }
    }
}
