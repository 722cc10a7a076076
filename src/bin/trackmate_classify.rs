//! trackmate_classify - classify one image file and print the report as JSON

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::path::PathBuf;

use trackmate::config::TrackmateConfig;
use trackmate::{AnalysisError, AnalysisReport, EncodedImage, Engine};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Image file (JPEG or PNG).
    image: PathBuf,
    /// Pretty-print the JSON report.
    #[arg(long)]
    pretty: bool,
    /// Enable debug logging.
    #[arg(long)]
    debug: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let default_filter = if args.debug { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    let config = TrackmateConfig::load()?;
    let engine = Engine::from_config(&config)?;

    let bytes = std::fs::read(&args.image)
        .with_context(|| format!("failed to read {}", args.image.display()))?;
    let image = EncodedImage::from_bytes(&bytes);

    let analysis = engine.analyze(&image).map_err(|err| {
        match err.downcast_ref::<AnalysisError>() {
            Some(analysis_err) => anyhow!("{} ({})", analysis_err.message, analysis_err.code),
            None => err,
        }
    })?;
    let report = AnalysisReport::from_analysis(&analysis);
    let json = if args.pretty {
        serde_json::to_string_pretty(&report)?
    } else {
        serde_json::to_string(&report)?
    };
    println!("{}", json);
    Ok(())
}
