use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use lyric_sync_core::{
    GestureKind, LyricSession, LyricSyncError, LyricTimeline, PlaybackClock, SyncConfig,
    TickSchedule, VirtualScroller,
};
use tracing_subscriber::EnvFilter;

const LINE_EXTENT: f64 = 48.0;
const MARKER_EXTENT: f64 = 32.0;

fn main() -> lyric_sync_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Inspect { document, config } => run_inspect(&document, config.as_deref()),
        Commands::Simulate {
            document,
            config,
            from,
            to,
            rate,
            viewport,
            seek_back,
            user_scroll_at,
        } => run_simulate(
            &document,
            config.as_deref(),
            SimulationPlan {
                from,
                to,
                rate,
                viewport,
                seek_back,
                user_scroll_at,
            },
        ),
    }
}

fn load_document(path: &Path) -> lyric_sync_core::Result<Arc<lyric_sync_core::Document>> {
    let raw = std::fs::read_to_string(path)?;
    let document = lyric_sync_core::parse(&raw)?;
    Ok(Arc::new(document))
}

fn load_config(path: Option<&Path>) -> lyric_sync_core::Result<SyncConfig> {
    match path {
        Some(path) => {
            let raw = std::fs::read_to_string(path)?;
            SyncConfig::from_json_str(&raw)
                .map_err(|err| LyricSyncError::InvalidConfig(format!("{}: {err}", path.display())))
        }
        None => Ok(SyncConfig::default()),
    }
}

fn run_inspect(document: &Path, config: Option<&Path>) -> lyric_sync_core::Result<()> {
    tracing::info!(?document, "inspecting lyric document");

    let config = load_config(config)?;
    let document = load_document(document)?;
    let timeline = LyricTimeline::build(document, &config);

    for line in timeline.index.lines() {
        let text = timeline
            .index
            .line(line.id)
            .and_then(|l| l.text.as_deref())
            .unwrap_or("");
        println!(
            "{:>4}  [{:>8.3} .. {:>8.3}) group_end={:>8.3} cluster={:>4} division={:>3}  {}",
            line.id.index(),
            line.begin,
            line.original_end,
            line.group_end,
            line.cluster.0,
            line.division,
            text
        );
    }

    for interlude in &timeline.interludes {
        println!(
            "interlude after division {}: [{:.3} .. {:.3})",
            interlude.division_index, interlude.start, interlude.end
        );
    }

    tracing::info!(
        lines = timeline.index.len(),
        clusters = timeline.clusters.len(),
        interludes = timeline.interludes.len(),
        "inspection finished"
    );
    Ok(())
}

struct SimulationPlan {
    from: f64,
    to: Option<f64>,
    rate: f64,
    viewport: f64,
    seek_back: Option<f64>,
    user_scroll_at: Option<f64>,
}

fn run_simulate(document: &Path, config: Option<&Path>, plan: SimulationPlan) -> lyric_sync_core::Result<()> {
    tracing::info!(?document, "running simulation");

    let config = load_config(config)?;
    let document = load_document(document)?;
    let timeline = LyricTimeline::build(document.clone(), &config);
    let view = VirtualScroller::with_layout(
        plan.viewport,
        &timeline.index,
        &timeline.interludes,
        LINE_EXTENT,
        MARKER_EXTENT,
    );

    let end = plan.to.unwrap_or_else(|| {
        timeline
            .index
            .lines()
            .iter()
            .map(|line| line.group_end)
            .fold(0.0, f64::max)
            + 1.0
    });

    let mut session = LyricSession::new(document, config, view);
    let mut clock = PlaybackClock::at(plan.from);
    let schedule = TickSchedule::new(plan.from, end, plan.rate);
    let interval = schedule.interval();
    let mut seeked = false;
    let mut scrolled = false;

    for (tick, _) in schedule.enumerate() {
        let now_ms = tick as f64 * interval * 1_000.0;

        if let Some(at) = plan.user_scroll_at.filter(|at| !scrolled && clock.time() >= *at) {
            tracing::info!(at, "simulating user scroll");
            session.user_scroll(GestureKind::Wheel, now_ms);
            scrolled = true;
        }

        session.view_mut().advance(now_ms);
        let frame = session.tick(clock.time(), now_ms);
        println!("{}", serde_json::to_string(&frame)?);

        if let Some(back) = plan.seek_back.filter(|_| !seeked && clock.time() >= end / 2.0) {
            tracing::info!(seconds = back, "simulating backward seek");
            clock.seek(clock.time() - back);
            seeked = true;
        }
        clock.advance(interval);
    }

    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Lyric display synchronisation engine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the flattened lines, their clusters and the detected interludes.
    Inspect {
        /// Path to the JSON lyric document.
        document: PathBuf,
        /// Optional JSON configuration file.
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Drive a session with a simulated clock and print one JSON frame per tick.
    Simulate {
        /// Path to the JSON lyric document.
        document: PathBuf,
        /// Optional JSON configuration file.
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Playback time to start at, in seconds.
        #[arg(long, default_value_t = 0.0)]
        from: f64,
        /// Playback time to stop at; defaults to just past the last line.
        #[arg(long)]
        to: Option<f64>,
        /// Ticks per second.
        #[arg(long, default_value_t = 10.0)]
        rate: f64,
        /// Height of the simulated viewport.
        #[arg(long, default_value_t = 480.0)]
        viewport: f64,
        /// Jump back this many seconds once, halfway through.
        #[arg(long)]
        seek_back: Option<f64>,
        /// Inject a wheel gesture once playback reaches this time.
        #[arg(long)]
        user_scroll_at: Option<f64>,
    },
}
