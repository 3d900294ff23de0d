//! Batch processing command for multiple files.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::{DateTime, Utc};
use clap::Args;
use console::style;
use glob::glob;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use tracing::{debug, error, warn};

use doctext_core::{ErrorKind, ExecContext, identify};

use super::{ExtractOptions, build_processor, load_config, run_cancellable};

/// Arguments for the batch command.
#[derive(Args)]
pub struct BatchArgs {
    /// Input files or glob patterns
    #[arg(required = true)]
    inputs: Vec<String>,

    /// Write each text to <dir>/<input name>.txt instead of the default location
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Continue on error
    #[arg(long)]
    continue_on_error: bool,

    /// Write a JSON report of every file
    #[arg(long)]
    report: Option<PathBuf>,

    #[command(flatten)]
    options: ExtractOptions,
}

/// Outcome of processing a single file.
#[derive(Debug, Serialize)]
struct FileReport {
    source: PathBuf,
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    extractor_used: Option<String>,
    fallback_used: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    output_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    characters: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    process_time_ms: u64,
}

#[derive(Debug, Serialize)]
struct BatchReport {
    generated_at: DateTime<Utc>,
    total: usize,
    succeeded: usize,
    failed: usize,
    files: Vec<FileReport>,
}

pub async fn run(args: BatchArgs, config_path: Option<&Path>) -> anyhow::Result<()> {
    let start = Instant::now();

    let mut config = load_config(config_path)?;
    args.options.apply(&mut config);
    let timeout = config.timeout();
    let processor = build_processor(config)?;

    let files = expand_inputs(&args.inputs)?;
    if files.is_empty() {
        anyhow::bail!("No matching files found for: {}", args.inputs.join(" "));
    }
    println!("{} Found {} files to process", style("ℹ").blue(), files.len());

    let outputs: Vec<Option<PathBuf>> = match &args.output_dir {
        Some(output_dir) => {
            fs::create_dir_all(output_dir)?;
            output_names(&files)
                .into_iter()
                .map(|name| Some(output_dir.join(name)))
                .collect()
        }
        None => vec![None; files.len()],
    };

    let progress = ProgressBar::new(files.len() as u64);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} files")?
            .progress_chars("=>-"),
    );

    let mut reports = Vec::with_capacity(files.len());
    for (path, output) in files.into_iter().zip(outputs) {
        let file_start = Instant::now();

        let worker = processor.clone();
        let input = path.clone();
        let outcome = run_cancellable(ExecContext::with_timeout(timeout), move |ctx| {
            worker.process_file(ctx, &input, output.as_deref())
        })
        .await?;
        progress.inc(1);

        match outcome {
            Ok(result) => {
                progress.println(format!(
                    "{} {} ({}{})",
                    style("✓").green(),
                    path.display(),
                    result.extractor_used,
                    if result.fallback_used { ", fallback" } else { "" }
                ));
                reports.push(FileReport {
                    source: path,
                    success: true,
                    characters: Some(result.text.chars().count()),
                    extractor_used: Some(result.extractor_used),
                    fallback_used: result.fallback_used,
                    output_path: result.output_path,
                    error: None,
                    process_time_ms: result.process_time_ms,
                });
            }
            Err(e) => {
                let message = e.to_string();
                progress.println(format!("{} {}: {}", style("✗").red(), path.display(), message));
                let interrupted = e.kind() == ErrorKind::Cancelled;
                reports.push(FileReport {
                    source: path.clone(),
                    success: false,
                    extractor_used: None,
                    fallback_used: false,
                    output_path: None,
                    characters: None,
                    error: Some(message.clone()),
                    process_time_ms: u64::try_from(file_start.elapsed().as_millis())
                        .unwrap_or(u64::MAX),
                });

                if interrupted {
                    warn!("Batch interrupted");
                    break;
                }
                if !args.continue_on_error {
                    progress.abandon();
                    error!("Failed to process {}: {}", path.display(), message);
                    write_report(args.report.as_deref(), reports)?;
                    anyhow::bail!("Processing failed: {}", message);
                }
            }
        }
    }
    progress.finish_and_clear();

    let succeeded = reports.iter().filter(|r| r.success).count();
    let failed = reports.len() - succeeded;

    println!();
    println!(
        "{} Processed {} files in {:?}",
        style("✓").green(),
        reports.len(),
        start.elapsed()
    );
    println!("  {} {}", style("Succeeded:").green(), succeeded);
    if failed > 0 {
        println!("  {} {}", style("Failed:").red(), failed);
        for report in reports.iter().filter(|r| !r.success) {
            println!(
                "    - {}: {}",
                report.source.display(),
                report.error.as_deref().unwrap_or("unknown error")
            );
        }
    }

    write_report(args.report.as_deref(), reports)?;

    if failed > 0 && succeeded == 0 {
        anyhow::bail!("All {} files failed", failed);
    }
    Ok(())
}

/// Expand glob patterns into a sorted, de-duplicated list of files.
fn expand_inputs(patterns: &[String]) -> anyhow::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for pattern in patterns {
        let mut matched = false;
        for entry in glob(pattern)? {
            match entry {
                Ok(path) if path.is_file() => {
                    matched = true;
                    files.push(path);
                }
                Ok(path) => debug!("Skipping non-file {}", path.display()),
                Err(e) => warn!("Cannot read {}: {}", e.path().display(), e.error()),
            }
        }
        if !matched {
            warn!("No files match {}", pattern);
        }
    }
    files.sort();
    files.dedup();
    Ok(files)
}

/// Output file names for `--output-dir`, one per input.
///
/// Names keep the input extension (`report.pdf` becomes `report.pdf.txt`).
/// Inputs that would share a name get a content fingerprint tag, so two
/// different files never write to, or get served from, the same output.
fn output_names(files: &[PathBuf]) -> Vec<String> {
    let names: Vec<String> = files
        .iter()
        .map(|path| {
            path.file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| "document".to_string())
        })
        .collect();
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for name in &names {
        *counts.entry(name.as_str()).or_default() += 1;
    }

    files
        .iter()
        .zip(&names)
        .enumerate()
        .map(|(index, (path, name))| {
            if counts.get(name.as_str()).copied().unwrap_or(0) < 2 {
                return format!("{name}.txt");
            }
            let tag = match identify(path) {
                Ok(info) => info.fingerprint.chars().take(12).collect(),
                Err(e) => {
                    debug!("Cannot fingerprint {}: {}", path.display(), e);
                    format!("{}", index + 1)
                }
            };
            format!("{name}.{tag}.txt")
        })
        .collect()
}

fn write_report(path: Option<&Path>, files: Vec<FileReport>) -> anyhow::Result<()> {
    let Some(path) = path else {
        return Ok(());
    };
    let succeeded = files.iter().filter(|r| r.success).count();
    let report = BatchReport {
        generated_at: Utc::now(),
        total: files.len(),
        succeeded,
        failed: files.len() - succeeded,
        files,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, serde_json::to_string_pretty(&report)?)?;
    println!("{} Report written to {}", style("✓").green(), path.display());
    Ok(())
}
