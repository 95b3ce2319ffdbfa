use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use tracing::info;

use signcast::{
    DataCache, DataSource, Engine, EngineConfig, SlideFactory, SlideManager, SourceId,
    StaticSource, Surface,
};

#[derive(Parser, Debug)]
#[command(name = "signcast", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the live engine until interrupted (ctrl-c).
    Run(RunArgs),
    /// Compose a single frame as a PNG and exit.
    Frame(FrameArgs),
}

#[derive(Parser, Debug)]
struct RunArgs {
    /// Engine configuration JSON.
    #[arg(long = "config")]
    config_path: PathBuf,

    /// Seconds between status log lines.
    #[arg(long, default_value_t = 30)]
    status_interval_secs: u64,
}

#[derive(Parser, Debug)]
struct FrameArgs {
    /// Engine configuration JSON.
    #[arg(long = "config")]
    config_path: PathBuf,

    /// Output PNG path.
    #[arg(long)]
    out: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Run(args) => cmd_run(args).await,
        Command::Frame(args) => cmd_frame(args).await,
    }
}

fn read_config(path: &Path) -> anyhow::Result<EngineConfig> {
    let f = File::open(path).with_context(|| format!("open config '{}'", path.display()))?;
    let r = BufReader::new(f);
    let config: EngineConfig =
        serde_json::from_reader(r).with_context(|| "parse config JSON")?;
    config.validate()?;
    Ok(config)
}

/// Demo sources: one static payload per source, taken from the config's
/// `data` map. Real deployments swap these for live fetchers.
fn build_sources(config: &EngineConfig) -> Vec<Arc<dyn DataSource>> {
    SourceId::ALL
        .into_iter()
        .map(|id| {
            let payload = config
                .data
                .get(id.name())
                .cloned()
                .unwrap_or(serde_json::Value::Null);
            Arc::new(StaticSource::new(id, config.poll.for_source(id), payload))
                as Arc<dyn DataSource>
        })
        .collect()
}

async fn cmd_run(args: RunArgs) -> anyhow::Result<()> {
    let config = read_config(&args.config_path)?;
    let sources = build_sources(&config);

    let mut engine = Engine::new(config, sources)?;
    engine.start().await?;

    let status_every = Duration::from_secs(args.status_interval_secs.max(1));
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupt received; shutting down");
                break;
            }
            _ = tokio::time::sleep(status_every) => {
                let status = engine.status();
                info!(
                    uptime_ms = status.uptime_ms,
                    slide = status.current_slide_index,
                    slides = status.total_slides,
                    fps = status.actual_fps,
                    frames = status.frame_count,
                    stale = status.data_stale,
                    "engine status"
                );
            }
        }
    }

    engine.stop().await?;
    Ok(())
}

async fn cmd_frame(args: FrameArgs) -> anyhow::Result<()> {
    let config = read_config(&args.config_path)?;

    let factory =
        SlideFactory::prepare(config.canvas, config.logo.as_deref().map(Path::new)).await?;
    let kind = config.transition.parse_kind()?;
    let mut manager = SlideManager::new(
        config.canvas,
        config.background,
        factory.build(&config.slides),
        kind,
        config.transition.duration_ms,
    );

    // Seed the cache from the demo payloads so the frame shows real layout.
    let cache = DataCache::new();
    let now = tokio::time::Instant::now();
    for id in SourceId::ALL {
        if let Some(payload) = config.data.get(id.name()) {
            cache.apply_success(id, payload.clone(), now);
        }
    }

    let mut surface = Surface::new(config.canvas);
    surface.clear(config.background);
    manager.render(&mut surface, &cache, 0.0);

    let png = surface.encode_png()?;
    if let Some(parent) = args.out.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir '{}'", parent.display()))?;
    }
    std::fs::write(&args.out, png)
        .with_context(|| format!("write png '{}'", args.out.display()))?;

    eprintln!("wrote {}", args.out.display());
    Ok(())
}
