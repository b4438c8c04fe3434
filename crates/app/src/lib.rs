use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::prelude::*;

use framepress_core::config::{
    config_path, data_dir, initialize_data_dir, resolve_relative_to, AppConfig, PathsConfig,
};
use framepress_core::descriptor::all_node_descriptors;
use framepress_core::heuristics::{recommend, ResourceProfile};
use framepress_core::logging::{self, FileSinkPlan, LoggingInitOptions, DEFAULT_LOG_FILTER};
use framepress_core::node::ExecutionContext;
use framepress_core::registry::{build_default_registry, NodeRegistry};
use framepress_core::types::{FrameSequence, PortData, PortType};

#[derive(Parser)]
#[command(name = "framepress", about = "Frame-tensor to MP4 encoding nodes")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(
        short = 'v',
        long = "verbose",
        action = ArgAction::Count,
        global = true,
        help = "Increase log verbosity (-v: debug, -vv: trace)"
    )]
    verbose: u8,

    #[arg(
        long = "log-filter",
        value_name = "FILTER",
        global = true,
        help = "Explicit tracing filter (overrides RUST_LOG and -v)"
    )]
    log_filter: Option<String>,

    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// List registered node types and their port metadata
    Nodes(NodesArgs),
    /// Execute a single node with parameters from the command line
    Run(RunArgs),
}

#[derive(Args)]
struct NodesArgs {
    #[arg(long, help = "Emit full node descriptors as JSON")]
    json: bool,
}

#[derive(Args)]
struct RunArgs {
    #[arg(help = "Node type to execute (e.g. VideoCombine)")]
    node_type: String,
    #[arg(
        long = "param",
        value_name = "KEY=VALUE",
        help = "Set a node input (repeatable, e.g. --param crf=18)"
    )]
    params: Vec<String>,
    #[arg(
        long,
        help = "Raw frame tensor file to feed the 'frames' input \
                (u32-le [T,H,W,C] header followed by f32-le samples)"
    )]
    frames: Option<PathBuf>,
}

pub fn run_from_env() -> Result<()> {
    let cli = Cli::parse();
    let resolved_data_dir = data_dir(cli.data_dir.as_deref());

    init_logging(
        Some(resolved_data_dir.as_path()),
        cli.verbose,
        cli.log_filter.as_deref(),
    );
    log_startup_metadata(&resolved_data_dir);

    if let Err(e) = initialize_data_dir(&resolved_data_dir) {
        warn!(error = %e, "Failed to initialize data directory");
    }
    let cfg_path = config_path(&resolved_data_dir);
    let config = match AppConfig::load_from_path(&cfg_path) {
        Ok(config) => config,
        Err(err) => {
            warn!(error = %err, "Failed to load config file, using defaults");
            AppConfig::default()
        }
    };
    let paths = resolve_paths(&config, &resolved_data_dir);

    match cli.command {
        Commands::Nodes(args) => list_nodes(&paths, args.json),
        Commands::Run(args) => run_node(&paths, args),
    }
}

/// Managed directories from the config file are relative to the data
/// directory unless given as absolute paths.
fn resolve_paths(config: &AppConfig, data_dir: &Path) -> PathsConfig {
    PathsConfig {
        output_dir: resolve_relative_to(data_dir, &config.paths.output_dir),
        input_dir: resolve_relative_to(data_dir, &config.paths.input_dir),
        temp_dir: resolve_relative_to(data_dir, &config.paths.temp_dir),
    }
}

fn init_logging(data_dir: Option<&Path>, verbose: u8, cli_log_filter: Option<&str>) {
    let init_options = LoggingInitOptions {
        data_dir: data_dir.map(Path::to_path_buf),
        verbose,
        cli_log_filter: cli_log_filter.map(ToString::to_string),
        rust_log_env: std::env::var("RUST_LOG").ok(),
        ..Default::default()
    };
    let init_plan = logging::compose_logging_init_plan(&init_options);
    let console_filter = init_plan.filters.console_filter;
    let file_filter = init_plan.filters.file_filter;

    match init_plan.file_sink {
        FileSinkPlan::Ready(ready) => {
            let console_env_filter = parse_env_filter_with_fallback(&console_filter, "console");
            let file_env_filter = parse_env_filter_with_fallback(&file_filter, "file");

            let subscriber = tracing_subscriber::registry()
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(std::io::stderr)
                        .with_filter(console_env_filter),
                )
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(ready.appender)
                        .with_filter(file_env_filter),
                );

            if let Err(error) = tracing::subscriber::set_global_default(subscriber) {
                eprintln!(
                    "Failed to initialize tracing subscriber: {error}. Continuing without structured tracing."
                );
            }
        }
        FileSinkPlan::Fallback(fallback) => {
            let attempted_log_dir = fallback
                .attempted_log_dir
                .as_ref()
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "<none>".to_string());
            let reason = fallback.reason;

            let console_env_filter = parse_env_filter_with_fallback(&console_filter, "console");
            let subscriber = tracing_subscriber::registry().with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_filter(console_env_filter),
            );

            if let Err(error) = tracing::subscriber::set_global_default(subscriber) {
                eprintln!(
                    "Failed to initialize tracing subscriber: {error}. Continuing without structured tracing."
                );
                return;
            }

            eprintln!(
                "Warning: persistent file logging unavailable (path: {attempted_log_dir}; reason: {reason}). Continuing with console-only logging."
            );
            warn!(
                attempted_log_dir = %attempted_log_dir,
                reason = %reason,
                "Persistent file logging unavailable; continuing with console-only logging"
            );
        }
    }
}

fn parse_env_filter_with_fallback(filter: &str, sink_name: &str) -> tracing_subscriber::EnvFilter {
    tracing_subscriber::EnvFilter::try_new(filter).unwrap_or_else(|error| {
        eprintln!(
            "Invalid {sink_name} log filter '{filter}': {error}. Falling back to '{DEFAULT_LOG_FILTER}'."
        );
        tracing_subscriber::EnvFilter::new(DEFAULT_LOG_FILTER)
    })
}

fn log_startup_metadata(data_dir: &Path) {
    let pid = std::process::id();
    let cfg_path = config_path(data_dir);
    info!(
        pid,
        data_dir = %data_dir.display(),
        config_path = %cfg_path.display(),
        "Runtime startup metadata"
    );
}

fn list_nodes(paths: &PathsConfig, json: bool) -> Result<()> {
    if json {
        let defaults = recommend(&ResourceProfile::measure());
        let descriptors = all_node_descriptors(&defaults);
        let encoded = serde_json::to_string_pretty(&descriptors)
            .context("failed to serialize node descriptors")?;
        println!("{encoded}");
        return Ok(());
    }

    let registry = build_default_registry(paths);
    for node_type in registry.list_node_types() {
        let node = registry.create(node_type, HashMap::new())?;
        let inputs: Vec<String> = node
            .input_ports()
            .iter()
            .map(|p| format!("{}{}", p.name, if p.required { "*" } else { "" }))
            .collect();
        let outputs: Vec<String> = node.output_ports().iter().map(|p| p.name.clone()).collect();
        println!(
            "{node_type}\n  inputs:  {}\n  outputs: {}",
            inputs.join(", "),
            outputs.join(", ")
        );
    }
    Ok(())
}

fn run_node(paths: &PathsConfig, args: RunArgs) -> Result<()> {
    let registry = build_default_registry(paths);
    let mut node = registry.create(&args.node_type, HashMap::new())?;

    let mut inputs = parse_node_params(&registry, &args.node_type, &args.params)?;

    let mut total_frames = None;
    if let Some(frames_path) = &args.frames {
        let seq = load_frames_file(frames_path)?;
        total_frames = Some(seq.frame_count() as u64);
        inputs.insert("frames".to_string(), PortData::Frames(seq));
    }

    let ctx = ExecutionContext {
        total_frames,
        current_frame: 0,
    };

    info!(node_type = %args.node_type, "executing node");
    let outputs = node
        .execute(&inputs, &ctx)
        .with_context(|| format!("node '{}' failed", args.node_type))?;

    let mut names: Vec<&String> = outputs.keys().collect();
    names.sort();
    for name in names {
        info!("  {} = {}", name, format_port_data(&outputs[name]));
    }
    Ok(())
}

/// Coerce `--param KEY=VALUE` strings into typed port data using the
/// node's declared input ports.
fn parse_node_params(
    registry: &NodeRegistry,
    node_type: &str,
    raw_params: &[String],
) -> Result<HashMap<String, PortData>> {
    let node = registry.create(node_type, HashMap::new())?;
    let ports = node.input_ports();

    let mut inputs = HashMap::new();
    for item in raw_params {
        let (key, value) = item
            .split_once('=')
            .with_context(|| format!("invalid --param format '{}' (expected KEY=VALUE)", item))?;

        let port = ports
            .iter()
            .find(|p| p.name == key)
            .with_context(|| format!("node '{node_type}' has no input named '{key}'"))?;

        let data = match &port.port_type {
            PortType::Int => PortData::Int(
                value
                    .parse()
                    .with_context(|| format!("'{key}' expects an integer, got '{value}'"))?,
            ),
            PortType::Float => PortData::Float(
                value
                    .parse()
                    .with_context(|| format!("'{key}' expects a number, got '{value}'"))?,
            ),
            PortType::Bool => PortData::Bool(
                value
                    .parse()
                    .with_context(|| format!("'{key}' expects true or false, got '{value}'"))?,
            ),
            PortType::Str => PortData::Str(value.to_string()),
            PortType::Path => PortData::Path(PathBuf::from(value)),
            PortType::Frames => {
                bail!("'{key}' is a frame-sequence input, pass it with --frames <FILE>")
            }
        };
        inputs.insert(key.to_string(), data);
    }
    Ok(inputs)
}

/// Raw tensor file: four u32-le dimensions `[T, H, W, C]` followed by
/// `T*H*W*C` f32-le samples in scan order.
fn load_frames_file(path: &Path) -> Result<FrameSequence> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("failed to read frames file {}", path.display()))?;
    decode_frames_payload(&bytes)
        .with_context(|| format!("invalid frames file {}", path.display()))
}

fn decode_frames_payload(bytes: &[u8]) -> Result<FrameSequence> {
    const HEADER_LEN: usize = 16;
    if bytes.len() < HEADER_LEN {
        bail!("file too short for a [T, H, W, C] header");
    }

    let mut dims = [0usize; 4];
    for (i, dim) in dims.iter_mut().enumerate() {
        let offset = i * 4;
        let raw = [
            bytes[offset],
            bytes[offset + 1],
            bytes[offset + 2],
            bytes[offset + 3],
        ];
        *dim = u32::from_le_bytes(raw) as usize;
    }
    let [frames, height, width, channels] = dims;

    // Dimensions come straight from the file, so the product must not wrap.
    let Some(expected_bytes) = frames
        .checked_mul(height)
        .and_then(|n| n.checked_mul(width))
        .and_then(|n| n.checked_mul(channels))
        .and_then(|n| n.checked_mul(4))
    else {
        bail!("payload length mismatch: dimensions [{frames}, {height}, {width}, {channels}] overflow");
    };
    let payload = &bytes[HEADER_LEN..];
    if payload.len() != expected_bytes {
        bail!(
            "payload length mismatch: expected {} f32 samples for [{frames}, {height}, {width}, {channels}], got {} bytes",
            expected_bytes / 4,
            payload.len()
        );
    }

    let samples: Vec<f32> = payload
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect();

    let tensor = ndarray::Array4::from_shape_vec((frames, height, width, channels), samples)
        .context("tensor shape does not match sample count")?;
    FrameSequence::from_f32(tensor.view())
}

fn format_port_data(data: &PortData) -> String {
    match data {
        PortData::Int(v) => format!("{}", v),
        PortData::Float(v) => format!("{}", v),
        PortData::Str(v) => format!("\"{}\"", v),
        PortData::Bool(v) => format!("{}", v),
        PortData::Path(v) => format!("{}", v.display()),
        PortData::Frames(seq) => format!(
            "<{} frames {}x{}x{}>",
            seq.frame_count(),
            seq.height(),
            seq.width(),
            seq.channels()
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frames_payload(frames: u32, height: u32, width: u32, channels: u32) -> Vec<u8> {
        let mut bytes = Vec::new();
        for dim in [frames, height, width, channels] {
            bytes.extend_from_slice(&dim.to_le_bytes());
        }
        let samples = (frames * height * width * channels) as usize;
        for i in 0..samples {
            bytes.extend_from_slice(&((i as f32) / samples as f32).to_le_bytes());
        }
        bytes
    }

    #[test]
    fn decode_frames_payload_roundtrips_dimensions() {
        let seq = decode_frames_payload(&frames_payload(2, 3, 4, 3)).expect("payload decodes");
        assert_eq!(seq.frame_count(), 2);
        assert_eq!(seq.height(), 3);
        assert_eq!(seq.width(), 4);
        assert_eq!(seq.channels(), 3);
    }

    #[test]
    fn load_frames_file_reads_from_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("clip.frames");
        std::fs::write(&path, frames_payload(3, 2, 2, 1)).expect("write frames file");

        let seq = load_frames_file(&path).expect("file should load");
        assert_eq!(seq.frame_count(), 3);
        assert_eq!(seq.channels(), 1);
    }

    #[test]
    fn load_frames_file_reports_path_on_error() {
        let err = load_frames_file(Path::new("/nonexistent/clip.frames"))
            .err()
            .expect("missing file should fail");
        assert!(err.to_string().contains("clip.frames"), "error: {err}");
    }

    #[test]
    fn decode_frames_payload_rejects_short_header() {
        assert!(decode_frames_payload(&[0u8; 8]).is_err());
    }

    #[test]
    fn decode_frames_payload_rejects_truncated_samples() {
        let mut bytes = frames_payload(1, 2, 2, 3);
        bytes.truncate(bytes.len() - 4);
        let err = decode_frames_payload(&bytes).err().expect("should fail");
        assert!(err.to_string().contains("length mismatch"), "error: {err}");
    }

    #[test]
    fn decode_frames_payload_rejects_overflowing_dimensions() {
        let mut bytes = Vec::new();
        for _ in 0..4 {
            bytes.extend_from_slice(&u32::MAX.to_le_bytes());
        }
        bytes.extend_from_slice(&[0u8; 16]);

        let err = decode_frames_payload(&bytes).err().expect("should fail");
        assert!(err.to_string().contains("length mismatch"), "error: {err}");
    }

    #[test]
    fn parse_node_params_coerces_types() {
        let registry = build_default_registry(&PathsConfig::default());
        let params = vec![
            "crf=18".to_string(),
            "codec=hevc".to_string(),
            "keep_in_memory=true".to_string(),
        ];

        let inputs =
            parse_node_params(&registry, "VideoCombine", &params).expect("params should parse");

        assert!(matches!(inputs.get("crf"), Some(PortData::Int(18))));
        assert!(matches!(inputs.get("codec"), Some(PortData::Str(s)) if s == "hevc"));
        assert!(matches!(
            inputs.get("keep_in_memory"),
            Some(PortData::Bool(true))
        ));
    }

    #[test]
    fn parse_node_params_rejects_unknown_key() {
        let registry = build_default_registry(&PathsConfig::default());
        let params = vec!["bitrate=5M".to_string()];

        let err = parse_node_params(&registry, "VideoCombine", &params)
            .err()
            .expect("unknown key should fail");
        assert!(err.to_string().contains("bitrate"), "error: {err}");
    }

    #[test]
    fn parse_node_params_rejects_bad_int() {
        let registry = build_default_registry(&PathsConfig::default());
        let params = vec!["crf=fast".to_string()];

        assert!(parse_node_params(&registry, "VideoCombine", &params).is_err());
    }

    #[test]
    fn parse_node_params_rejects_frames_via_param() {
        let registry = build_default_registry(&PathsConfig::default());
        let params = vec!["frames=whatever".to_string()];

        let err = parse_node_params(&registry, "VideoCombine", &params)
            .err()
            .expect("frames via --param should fail");
        assert!(err.to_string().contains("--frames"), "error: {err}");
    }

    #[test]
    fn format_port_data_renders_each_variant() {
        assert_eq!(format_port_data(&PortData::Int(3)), "3");
        assert_eq!(format_port_data(&PortData::Bool(false)), "false");
        assert_eq!(
            format_port_data(&PortData::Str("clip.mp4".to_string())),
            "\"clip.mp4\""
        );
        let seq = FrameSequence::from_raw(vec![0u8; 12], 1, 2, 2, 3).unwrap();
        assert_eq!(
            format_port_data(&PortData::Frames(seq)),
            "<1 frames 2x2x3>"
        );
    }
}
