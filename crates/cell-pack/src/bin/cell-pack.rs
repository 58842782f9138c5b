use std::fs;
use std::path::PathBuf;

use clap::Parser;

use cell_pack::config::load_config;
use cell_pack::error::{PackError, PackResult};
use cell_pack::pack::{run_batch_with_stream, run_with_stream};
use cell_pack::streaming::StreamEmitter;

#[derive(Parser)]
#[command(name = "cell-pack", version, about = "Grid-based ingredient packing")]
struct Cli {
    #[arg(short, long)]
    config: PathBuf,
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// Emit NDJSON progress events on stderr.
    #[arg(long)]
    stream: bool,
    #[arg(long)]
    seed: Option<u64>,
}

fn main() -> Result<(), String> {
    let cli = Cli::parse();
    let emitter = StreamEmitter::new(cli.stream);
    if let Err(err) = run_cli(&cli, emitter) {
        emitter.emit_error(error_code(&err), &err.to_string(), None);
        return Err(err.to_string());
    }
    Ok(())
}

fn error_code(err: &PackError) -> &'static str {
    match err {
        PackError::Io(_) => "io",
        PackError::Parse(_) => "parse",
        PackError::Invalid(_) => "invalid",
        PackError::Geometry(_) => "geometry",
        PackError::Placement(_) => "placement",
    }
}

fn run_cli(cli: &Cli, emitter: StreamEmitter) -> PackResult<()> {
    let mut cfg = load_config(&cli.config)?;
    if let Some(seed) = cli.seed {
        cfg.seed = Some(seed);
    }
    let json = if cfg.runs.unwrap_or(1) > 1 {
        let outs = run_batch_with_stream(&cfg, emitter)?;
        serde_json::to_string_pretty(&outs)
    } else {
        let out = run_with_stream(&cfg, emitter)?;
        serde_json::to_string_pretty(&out)
    }
    .map_err(|e| PackError::Parse(format!("json encode error: {e}")))?;
    match &cli.output {
        Some(path) => fs::write(path, json)?,
        None => println!("{json}"),
    }
    Ok(())
}
