//! Engines command - show OCR engines and external tool availability.

use std::path::{Path, PathBuf};

use clap::Args;
use console::style;
use serde::Serialize;

use doctext_core::{EngineKind, tool_available};

use super::load_config;

/// Arguments for the engines command.
#[derive(Args)]
pub struct EnginesArgs {
    /// Print as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Serialize)]
struct ToolStatus {
    name: String,
    description: String,
    path: PathBuf,
    available: bool,
}

impl ToolStatus {
    fn new(name: &str, description: &str, path: &Path) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            path: path.to_path_buf(),
            available: tool_available(path),
        }
    }
}

pub async fn run(args: EnginesArgs, config_path: Option<&Path>) -> anyhow::Result<()> {
    let config = load_config(config_path)?;

    let engines: Vec<ToolStatus> = EngineKind::ALL
        .into_iter()
        .map(|kind| ToolStatus::new(kind.name(), kind.description(), kind.tool_path(&config.tools)))
        .collect();
    let tools = vec![
        ToolStatus::new(
            "ghostscript",
            "Page splitting and rasterization",
            &config.tools.ghostscript,
        ),
        ToolStatus::new(
            "ebook-convert",
            "Calibre document conversion",
            &config.tools.ebook_convert,
        ),
    ];

    if args.json {
        let json = serde_json::json!({
            "strategy": config.ocr.strategy,
            "engines": engines,
            "tools": tools,
        });
        println!("{}", serde_json::to_string_pretty(&json)?);
        return Ok(());
    }

    println!("{}", style("OCR engines").bold());
    for status in &engines {
        print_status(status);
    }
    println!();
    println!("{}", style("Tools").bold());
    for status in &tools {
        print_status(status);
    }
    println!();
    println!("OCR strategy: {}", style(config.ocr.strategy).cyan());

    Ok(())
}

fn print_status(status: &ToolStatus) {
    let mark = if status.available {
        style("✓").green()
    } else {
        style("✗").red()
    };
    println!(
        "  {} {:<14} {} ({})",
        mark,
        status.name,
        status.description,
        status.path.display()
    );
}
