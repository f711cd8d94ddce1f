//! Optical Oracle CLI
//!
//! Runs the lottery and unity workflows against an in-memory store, or
//! exercises the oracle directly.

use chrono::{Duration as ChronoDuration, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use optical_oracle::{
    capture::{open_camera, pnm, Camera, CaptureConfig, FileConfig, MockCamera},
    composite::{GridCompositor, Thumbnailer},
    lottery::{plan_daily_lottery, Lottery, LotteryRunner},
    metrics::{MetricsRegistry, MetricsSnapshot},
    notify::{spawn_dispatcher, LogSink, Notifier},
    oracle::{DecisionRecorder, EntropyOracle},
    scheduler::{CancellationToken, JobStatus, Maintenance, Scheduler},
    selection::{index_for, EntropySelector},
    store::{LotteryStore, MemoryStore},
    unity::{Unifier, UnityPlanner},
};
use std::error::Error;
use std::path::PathBuf;
use std::sync::{Arc, PoisonError};
use std::time::Duration;
use tracing::{debug, error, info};

/// Queue depth of the decision recorder.
const DECISION_QUEUE: usize = 1024;

/// Seconds between metrics refreshes.
const METRICS_INTERVAL_SECS: u64 = 5;

#[derive(Parser)]
#[command(name = "optical-oracle", version, about = "Camera-noise oracle for lotteries and unities")]
struct Cli {
    /// TOML configuration file. Defaults apply when omitted.
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the lottery, unity and maintenance jobs until interrupted.
    Run,
    /// Capture frames and print the oracle draw for each.
    Draw {
        /// Number of frames to capture.
        #[arg(long, default_value_t = 5)]
        count: u32,
        /// Also map each draw to an index in a population of this size.
        #[arg(long)]
        select: Option<u64>,
    },
    /// Print the daily lottery planned for a date (UTC, defaults to today).
    PlanLottery {
        #[arg(long)]
        date: Option<NaiveDate>,
    },
}

fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    let result = load_config(cli.config.as_ref()).and_then(|config| match cli.command {
        Command::Run => run(config),
        Command::Draw { count, select } => draw(&config, count, select),
        Command::PlanLottery { date } => plan_lottery(date),
    });

    if let Err(e) = result {
        error!("{}", e);
        std::process::exit(1);
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<FileConfig, Box<dyn Error>> {
    let config = match path {
        Some(path) => FileConfig::from_file(path)?,
        None => FileConfig::default(),
    };
    config.validate()?;
    Ok(config)
}

fn draw(config: &FileConfig, count: u32, select: Option<u64>) -> Result<(), Box<dyn Error>> {
    let mut camera = open_camera(&config.capture)?;
    let oracle = EntropyOracle::new();

    for i in 0..count {
        let frame = camera.capture()?;
        let draw = oracle.evaluate(&frame)?;
        match select {
            Some(total) => println!(
                "{:>3}  value={:.12}  word={:016x}  index={}",
                i,
                draw.value,
                draw.word,
                index_for(total, draw.value)?
            ),
            None => println!("{:>3}  value={:.12}  word={:016x}", i, draw.value, draw.word),
        }
    }
    camera.close();
    Ok(())
}

fn plan_lottery(date: Option<NaiveDate>) -> Result<(), Box<dyn Error>> {
    let store = MemoryStore::new();
    let day = date.unwrap_or_else(|| Utc::now().date_naive());
    let (lottery, _) = plan_daily_lottery(&store, day)?;
    println!("{}", serde_json::to_string_pretty(&lottery)?);
    Ok(())
}

/// Fills the store with small grayscale leaves so the workflows have a
/// population to select from.
fn seed_demo_leaves(store: &MemoryStore, count: u64) -> Result<(), Box<dyn Error>> {
    let mut config = CaptureConfig::with_dimensions(16, 16);
    config.grayscale = true;
    let mut camera = MockCamera::with_seed(0x1eaf);
    camera.open(&config)?;

    for _ in 0..count {
        let frame = camera.capture()?;
        let image = pnm::encode_pgm(frame.width(), frame.height(), frame.pixels());
        store.insert_leaf(Utc::now(), image)?;
    }
    camera.close();
    info!(count, "Demo leaves created");
    Ok(())
}

fn run(config: FileConfig) -> Result<(), Box<dyn Error>> {
    info!("Optical Oracle v{}", optical_oracle::VERSION);

    let store = Arc::new(MemoryStore::new());
    seed_demo_leaves(&store, config.output.demo_leaves)?;

    let (recorder, recorder_handle) = DecisionRecorder::spawn(store.clone(), DECISION_QUEUE)?;
    let camera = open_camera(&config.capture)?;
    let selector = Arc::new(EntropySelector::new(
        camera,
        EntropyOracle::with_recorder(recorder),
    ));
    info!(source = ?config.capture.source, "Entropy source opened");

    let (notifier, receiver) = Notifier::channel(config.notifications.capacity);
    let dispatcher = spawn_dispatcher(receiver, Box::new(LogSink))?;

    // A lottery over the demo leaves, due immediately.
    let now = Utc::now();
    let demo = store.create_lottery(Lottery::new(
        "demo",
        now,
        now - ChronoDuration::hours(1),
        now + ChronoDuration::hours(1),
    ))?;
    info!(lottery = demo.id, "Demo lottery created");

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        ctrlc::set_handler(move || {
            info!("Shutdown requested");
            cancel.cancel();
        })?;
    }

    let mut scheduler = Scheduler::new(cancel.clone());

    let runner = LotteryRunner::new(store.clone(), store.clone(), selector.clone(), notifier.clone())
        .with_enjoy(config.lottery.enjoy())
        .with_winner_bounds(config.lottery.min_winners, config.lottery.winner_spread);
    scheduler.spawn("lottery", config.lottery.interval(), move |cancel| {
        Ok(match runner.work_once(cancel)? {
            Some((id, outcome)) => {
                debug!(lottery = id, ?outcome, "Lottery stepped");
                JobStatus::Worked
            }
            None => JobStatus::Idle,
        })
    })?;

    let thumbnailer = Thumbnailer::new(store.clone(), Arc::new(GridCompositor), store.clone());
    let unifier = Unifier::new(store.clone(), store.clone(), selector.clone(), notifier.clone())
        .with_thumbnailer(thumbnailer)
        .with_grace(config.unity.grace());
    scheduler.spawn("unifier", config.unity.interval(), move |cancel| {
        Ok(match unifier.work_once(cancel)? {
            Some((mask, outcome)) => {
                debug!(%mask, ?outcome, "Unity processed");
                JobStatus::Worked
            }
            None => JobStatus::Idle,
        })
    })?;

    let planner = UnityPlanner::new(store.clone(), store.clone(), config.unity.mask_width);
    let daily: Option<Arc<dyn LotteryStore>> = if config.lottery.plan_daily {
        Some(store.clone())
    } else {
        None
    };
    let maintenance = Maintenance::new(planner, daily);
    scheduler.spawn("maintenance", config.unity.maintenance_interval(), move |_| {
        maintenance.run_once(Utc::now().date_naive()).into_status()
    })?;

    let registry = Arc::new(MetricsRegistry::new()?);
    let job_stats = scheduler.stats_handle();
    let refresh = {
        let registry = Arc::clone(&registry);
        let selector = selector.clone();
        let notifier = notifier.clone();
        move || {
            let jobs = job_stats
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone();
            let snapshot = MetricsSnapshot::from_components(
                selector.as_ref(),
                selector.oracle(),
                &notifier,
                jobs,
            );
            registry.update(&snapshot);
        }
    };
    let periodic_refresh = refresh.clone();
    scheduler.spawn(
        "metrics",
        Duration::from_secs(METRICS_INTERVAL_SECS),
        move |_| {
            periodic_refresh();
            Ok(JobStatus::Idle)
        },
    )?;

    #[cfg(feature = "metrics")]
    let server = spawn_metrics_server(Arc::clone(&registry), config.output.metrics_port, &cancel)?;

    info!("Workflows running, press Ctrl+C to stop");
    while !cancel.wait_timeout(Duration::from_secs(60)) {}

    scheduler.shutdown();
    refresh();
    drop(refresh);

    // Dispatcher and recorder exit once their senders are gone.
    drop(notifier);
    drop(selector);
    if dispatcher.join().is_err() {
        error!("Notification dispatcher terminated abnormally");
    }
    if recorder_handle.join().is_err() {
        error!("Decision recorder terminated abnormally");
    }

    #[cfg(feature = "metrics")]
    join_metrics_server(server);

    info!(
        decisions = store.decisions()?.len(),
        "Shutdown complete\n{}",
        registry.encode()?
    );
    Ok(())
}

#[cfg(feature = "metrics")]
fn spawn_metrics_server(
    registry: Arc<MetricsRegistry>,
    port: u16,
    cancel: &CancellationToken,
) -> std::io::Result<Option<std::thread::JoinHandle<()>>> {
    use optical_oracle::metrics::{MetricsServer, MetricsServerConfig};

    if port == 0 {
        return Ok(None);
    }

    let cancel = cancel.clone();
    let handle = std::thread::Builder::new()
        .name("metrics-server".into())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime,
                Err(e) => {
                    error!(error = %e, "Failed to start metrics runtime");
                    return;
                }
            };

            let server = MetricsServer::new(MetricsServerConfig::with_port(port), registry);
            let shutdown = async move {
                let _ = tokio::task::spawn_blocking(move || {
                    while !cancel.wait_timeout(Duration::from_secs(1)) {}
                })
                .await;
            };

            if let Err(e) = runtime.block_on(server.run_until(shutdown)) {
                error!(error = %e, "Metrics server failed");
            }
        })?;
    Ok(Some(handle))
}

#[cfg(feature = "metrics")]
fn join_metrics_server(server: Option<std::thread::JoinHandle<()>>) {
    if let Some(server) = server {
        if server.join().is_err() {
            error!("Metrics server terminated abnormally");
        }
    }
}
