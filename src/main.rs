//! demoscope CLI
//!
//! Command-line interface for inspecting and walking Source engine demos.

use std::fs;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use memmap2::Mmap;
use serde::Serialize;
use tracing::{debug, info, warn};

use demoscope_parsers::logging::{self, TracingConfig};
use demoscope_parsers::{DemoEvent, DemoHeader, DemoParser, ParseError, ParserConfig};

/// Files at least this large are memory-mapped instead of read
const MMAP_THRESHOLD: u64 = 16 * 1024 * 1024;

/// demoscope - Source engine demo inspector
#[derive(Parser)]
#[command(name = "demoscope")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose output (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Output format for structured data
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Unknown format: {}", s)),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Show the header of a demo
    Info(InfoArgs),

    /// Decode a demo to the end and summarize it
    Parse(ParseArgs),
}

#[derive(Args)]
struct InfoArgs {
    /// Path to the demo file
    path: PathBuf,
}

#[derive(Args)]
struct ParseArgs {
    /// Path to the demo file
    path: PathBuf,

    /// Parser configuration (JSON)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Cancel parsing after this many milliseconds
    #[arg(long)]
    cancel_after_ms: Option<u64>,
}

/// Demo bytes, either read into memory or mapped
enum DemoData {
    Owned(Vec<u8>),
    Mapped(Mmap),
}

impl DemoData {
    fn open(path: &Path) -> Result<Self> {
        let file = fs::File::open(path).with_context(|| format!("Failed to open {:?}", path))?;
        let size = file.metadata()?.len();

        if size >= MMAP_THRESHOLD {
            debug!(size, "Memory-mapping demo");
            // SAFETY: the map is read-only and lives only for this process run;
            // the file is not expected to change while it is being parsed.
            #[allow(unsafe_code)]
            let map = unsafe { Mmap::map(&file) }.context("Failed to memory-map demo")?;
            Ok(DemoData::Mapped(map))
        } else {
            let data = fs::read(path).with_context(|| format!("Failed to read {:?}", path))?;
            Ok(DemoData::Owned(data))
        }
    }
}

impl Deref for DemoData {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            DemoData::Owned(data) => data.as_slice(),
            DemoData::Mapped(map) => &map[..],
        }
    }
}

#[derive(Serialize)]
struct HeaderInfo<'a> {
    #[serde(flatten)]
    header: &'a DemoHeader,
    frame_rate: f32,
    tick_rate: f32,
    tick_time: f32,
}

#[derive(Serialize)]
struct ParseSummary {
    map: String,
    status: &'static str,
    frames: u32,
    ingame_tick: i32,
    ticks: u64,
    custom_data_frames: u32,
    elapsed_ms: u128,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_with_config(TracingConfig::from_verbosity(cli.verbose));

    match cli.command {
        Commands::Info(args) => cmd_info(args, cli.format),
        Commands::Parse(args) => cmd_parse(args, cli.format),
    }
}

fn cmd_info(args: InfoArgs, format: OutputFormat) -> Result<()> {
    let data = DemoData::open(&args.path)?;
    let mut parser = DemoParser::new(&data);
    let header = parser
        .parse_header()
        .with_context(|| format!("Failed to read demo header of {:?}", args.path))?;

    match format {
        OutputFormat::Json => {
            let info = HeaderInfo {
                header: &header,
                frame_rate: header.frame_rate(),
                tick_rate: header.tick_rate(),
                tick_time: header.tick_time(),
            };
            println!("{}", serde_json::to_string_pretty(&info)?);
        }
        OutputFormat::Text => {
            println!("Demo: {}", args.path.display());
            println!("  Magic:            {}", header.filestamp);
            println!("  Protocol:         {}", header.protocol);
            println!("  Network protocol: {}", header.network_protocol);
            println!("  Server:           {}", header.server_name);
            println!("  Client:           {}", header.client_name);
            println!("  Map:              {}", header.map_name);
            println!("  Game directory:   {}", header.game_directory);
            println!("  Playback time:    {:.2}s", header.playback_time);
            println!("  Ticks:            {}", header.playback_ticks);
            println!("  Frames:           {}", header.playback_frames);
            println!("  Signon length:    {}", header.signon_length);
            println!("  Tick rate:        {:.2}", header.tick_rate());
            println!("  Frame rate:       {:.2}", header.frame_rate());
        }
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<ParserConfig> {
    let Some(path) = path else {
        return Ok(ParserConfig::default());
    };
    let text =
        fs::read_to_string(path).with_context(|| format!("Failed to read config {:?}", path))?;
    let config = serde_json::from_str(&text)
        .with_context(|| format!("Invalid parser config {:?}", path))?;
    debug!(?config, "Loaded parser config");
    Ok(config)
}

fn cmd_parse(args: ParseArgs, format: OutputFormat) -> Result<()> {
    let config = load_config(args.config.as_deref())?;
    info!(path = %args.path.display(), "Parsing demo");
    let data = DemoData::open(&args.path)?;
    let mut parser = DemoParser::with_config(&data, config);

    // The bundled handlers skip string tables and entities, so no players
    // are ever bound here; ticks are the only per-frame signal worth counting.
    let ticks = Arc::new(AtomicU64::new(0));
    {
        let ticks = Arc::clone(&ticks);
        parser.register_handler(move |event| {
            if let DemoEvent::TickComplete = event {
                ticks.fetch_add(1, Ordering::Relaxed);
            }
        });
    }

    let header = parser
        .parse_header()
        .with_context(|| format!("Failed to read demo header of {:?}", args.path))?;

    if let Some(ms) = args.cancel_after_ms {
        let handle = parser.cancel_handle();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(ms));
            handle.cancel();
        });
    }

    let start = Instant::now();
    let status = match logging::instrument_parse("dem", || parser.parse_to_end()) {
        Ok(()) => "complete",
        Err(ParseError::Cancelled) => {
            warn!(frame = parser.current_frame(), "Parsing cancelled; summary is partial");
            "cancelled"
        }
        Err(e) if e.is_fatal() => {
            return Err(e).with_context(|| {
                format!("Demo {:?} is corrupt after frame {}", args.path, parser.current_frame())
            });
        }
        Err(e) => bail!("Failed to parse {:?}: {}", args.path, e),
    };

    let summary = ParseSummary {
        map: header.map_name,
        status,
        frames: parser.current_frame(),
        ingame_tick: parser.ingame_tick(),
        ticks: ticks.load(Ordering::Relaxed),
        custom_data_frames: parser.custom_data_frames(),
        elapsed_ms: start.elapsed().as_millis(),
    };

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&summary)?),
        OutputFormat::Text => print_summary(&summary),
    }

    Ok(())
}

fn print_summary(summary: &ParseSummary) {
    println!("Map:         {}", summary.map);
    println!("Status:      {}", summary.status);
    println!("Frames:      {}", summary.frames);
    println!("Ingame tick: {}", summary.ingame_tick);
    println!("Ticks:       {}", summary.ticks);
    if summary.custom_data_frames > 0 {
        println!("Custom data: {} (skipped)", summary.custom_data_frames);
    }
    println!("Elapsed:     {} ms", summary.elapsed_ms);
}
