//! Headless playback harness for development and testing.
//!
//! Plays a sequence directory into a logging sink at a fixed tick rate and
//! prints playback statistics at the end.

use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, info, warn};
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use geoseq::config::{SETTINGS_FILE, StreamSettings};
use geoseq::core::{ClockEvent, GeometryStream};
use geoseq::entities::{FrameSink, FrameView, TextureView, Topology};
use geoseq::paths::{self, PathConfig, PathRelation};

/// Headless geometry sequence player
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Sequence directory (PLY frames, optional DDS textures)
    #[arg(value_name = "DIR")]
    sequence: PathBuf,

    /// How the sequence path is resolved
    #[arg(long, value_enum, default_value = "absolute")]
    relative_to: Relation,

    /// Playback FPS (overrides settings)
    #[arg(long)]
    fps: Option<f64>,

    /// Ring buffer size (overrides settings)
    #[arg(short = 'b', long = "buffer")]
    buffer_size: Option<usize>,

    /// Worker threads (overrides "use all threads")
    #[arg(short = 't', long)]
    threads: Option<usize>,

    /// Disable looping
    #[arg(long)]
    no_loop: bool,

    /// Stop after this many seconds of wall time
    #[arg(short = 'd', long, default_value_t = 10.0)]
    duration: f64,

    /// Host tick rate in Hz
    #[arg(long, default_value_t = 60.0)]
    tick_rate: f64,

    /// Settings JSON (default: <config dir>/geoseq.json)
    #[arg(short = 's', long)]
    settings: Option<PathBuf>,

    /// Custom config directory
    #[arg(long = "config-dir")]
    config_dir: Option<PathBuf>,

    /// Verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short = 'v', action = clap::ArgAction::Count)]
    verbosity: u8,

    /// Log to file instead of stderr
    #[arg(long = "log", value_name = "FILE")]
    log_file: Option<PathBuf>,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum Relation {
    Absolute,
    Data,
    Config,
    Cwd,
}

impl From<Relation> for PathRelation {
    fn from(r: Relation) -> Self {
        match r {
            Relation::Absolute => PathRelation::Absolute,
            Relation::Data => PathRelation::RelativeToDataDir,
            Relation::Config => PathRelation::RelativeToConfigDir,
            Relation::Cwd => PathRelation::RelativeToCurrentDir,
        }
    }
}

/// Sink that only logs what it would display
#[derive(Default)]
struct LogSink {
    frames: usize,
    textures: usize,
}

impl FrameSink for LogSink {
    fn has_material(&self, topology: Topology) -> bool {
        debug!("Material requested for {:?}", topology);
        true
    }

    fn show_frame(&mut self, frame: FrameView<'_>) {
        self.frames += 1;
        let bounds = frame.bounds();
        debug!(
            "Frame {}: {:?}, {} vertices, {} indices, texture {:?}, bounds {:?}",
            frame.index,
            frame.topology(),
            frame.vertex_count(),
            frame.indices.len(),
            frame.texture.map(|t| t.data.len()),
            bounds.map(|b| (b.min, b.max))
        );
    }

    fn apply_texture(&mut self, texture: TextureView<'_>) {
        self.textures += 1;
        info!(
            "Shared texture {}x{} ({} bytes)",
            texture.header.width,
            texture.header.height,
            texture.data.len()
        );
    }
}

fn init_logging(args: &Args) -> Result<()> {
    let level = match args.verbosity {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    if let Some(path) = &args.log_file {
        let file = std::fs::File::create(path)
            .with_context(|| format!("Failed to create log file: {}", path.display()))?;
        env_logger::Builder::new()
            .filter_level(level)
            .format_timestamp_millis()
            .target(env_logger::Target::Pipe(Box::new(file)))
            .init();
    } else {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level.as_str()))
            .format_timestamp_millis()
            .init();
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args)?;

    let path_config = PathConfig::from_env_and_cli(args.config_dir.clone());
    let settings_path = args
        .settings
        .clone()
        .unwrap_or_else(|| paths::config_file(SETTINGS_FILE, &path_config));

    let mut settings = StreamSettings::load(&settings_path)?;
    if let Some(buffer_size) = args.buffer_size {
        settings.buffer_size = buffer_size;
    }
    if let Some(threads) = args.threads {
        settings.use_all_threads = false;
        settings.thread_count = threads;
    }
    if args.no_loop {
        settings.loop_play = false;
    }
    settings.play_at_start = true;
    let fps = args.fps.unwrap_or(settings.playback_fps);

    let sequence = paths::resolve_sequence_path(&args.sequence, args.relative_to.into(), &path_config)?;
    info!("Sequence: {}", sequence.display());
    info!("Settings: {:?}", settings);

    let mut stream = GeometryStream::with_workers(settings, LogSink::default())
        .context("Failed to start worker threads")?;
    stream
        .load_sequence(&sequence, fps)
        .with_context(|| format!("Failed to load sequence {}", sequence.display()))?;

    let tick = Duration::from_secs_f64(1.0 / args.tick_rate.max(1.0));
    let started = Instant::now();
    let mut last = started;
    let mut drops = 0usize;

    while started.elapsed().as_secs_f64() < args.duration {
        let now = Instant::now();
        let delta_ms = now.duration_since(last).as_secs_f64() * 1000.0;
        last = now;

        if stream.tick(delta_ms) == Some(ClockEvent::Finished) {
            break;
        }
        if stream.take_frame_dropped() {
            drops += 1;
            warn!("Frame dropped at {:?}", stream.current_frame());
        }

        thread::sleep(tick.saturating_sub(now.elapsed()));
    }

    println!("Sequence:     {}", sequence.display());
    println!("Frames:       {} ({:?})", stream.total_frames(), stream.topology());
    println!("Delivered:    {}", stream.sink().frames);
    println!("Textures:     {} shared", stream.sink().textures);
    println!("Drop events:  {}", drops);
    println!("Skipped:      {}", stream.skipped_frames());
    println!("FPS:          {:.2} actual / {:.2} target", stream.actual_fps(), stream.target_fps());

    stream.close();
    Ok(())
}
