//! Extract command - extract text from a single file.

use std::path::{Path, PathBuf};

use clap::Args;
use console::style;
use tracing::info;

use doctext_core::ExecContext;

use super::{ExtractOptions, build_processor, load_config, run_cancellable};

/// Arguments for the extract command.
#[derive(Args)]
pub struct ExtractArgs {
    /// Input file
    #[arg(required = true)]
    input: PathBuf,

    /// Output text file (default: <input dir>/<fingerprint>/text.txt)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Print the full result as JSON instead of the text
    #[arg(long)]
    json: bool,

    /// Only report where the text was written
    #[arg(short, long)]
    quiet: bool,

    #[command(flatten)]
    options: ExtractOptions,
}

pub async fn run(args: ExtractArgs, config_path: Option<&Path>) -> anyhow::Result<()> {
    let mut config = load_config(config_path)?;
    args.options.apply(&mut config);
    let ctx = ExecContext::with_timeout(config.timeout());
    let processor = build_processor(config)?;

    let input = args.input.clone();
    let output = args.output.clone();
    let result = run_cancellable(ctx, move |ctx| {
        processor.process_file(ctx, &input, output.as_deref())
    })
    .await??;

    info!(
        "Extractor {} (attempted: {})",
        result.extractor_used,
        result.attempted_extractors.join(", ")
    );

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else if !args.quiet {
        println!("{}", result.text);
    }

    if let Some(path) = &result.output_path {
        let note = if result.is_cached() {
            " (cached)".to_string()
        } else if result.fallback_used {
            format!(" (fallback: {})", result.extractor_used)
        } else {
            String::new()
        };
        eprintln!(
            "{} Text written to {}{}",
            style("✓").green(),
            path.display(),
            note
        );
    }

    Ok(())
}
