//! Blueprint Render CLI
//!
//! Commands: decode, info, render
//! Outputs JSON to stdout
//! Returns non-zero on decode failure

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

use bprender_core::{
    codec,
    document::{format_version, Document},
    pipeline::{RenderOptions, Renderer},
    prototype::PrototypeTable,
};

#[derive(Parser)]
#[command(name = "bprender-cli")]
#[command(about = "Blueprint exchange string decoder and renderer")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Directory of prototype JSON files; the built-in table is used
    /// when absent
    #[arg(short, long)]
    prototypes: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode an exchange string and print the document JSON
    Decode {
        /// The blueprint exchange string
        #[arg(short, long)]
        payload: String,
    },

    /// Print a summary of an exchange string without rendering
    Info {
        #[arg(short, long)]
        payload: String,
    },

    /// Render an exchange string to a PNG
    Render {
        #[arg(short, long)]
        payload: String,

        /// Output PNG path
        #[arg(short, long)]
        out: PathBuf,

        /// Cap on either image axis in pixels
        #[arg(long, default_value_t = 4096)]
        max_dimension: u32,
    },
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    let table = match &cli.prototypes {
        Some(dir) => match PrototypeTable::load_from_dir(dir) {
            Ok(t) => t,
            Err(e) => {
                eprintln!(r#"{{"error": "Failed to load prototypes: {}"}}"#, e);
                return ExitCode::FAILURE;
            }
        },
        None => PrototypeTable::builtin(),
    };

    match cli.command {
        Commands::Decode { payload } => match codec::decode(&payload) {
            Ok(document) => {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&document)
                        .unwrap_or_else(|e| format!(r#"{{"error": "{e}"}}"#))
                );
                ExitCode::SUCCESS
            }
            Err(e) => {
                println!(r#"{{"error": "{}"}}"#, e);
                ExitCode::from(2)
            }
        },

        Commands::Info { payload } => match codec::decode(&payload) {
            Ok(document) => {
                let blueprints = document.blueprints();
                let head = blueprints.first();
                let summary = serde_json::json!({
                    "kind": match &document {
                        Document::Blueprint(_) => "blueprint",
                        Document::Book(_) => "blueprint_book",
                    },
                    "label": document.head_label(),
                    "blueprints": blueprints.len(),
                    "version": head.map(|bp| format_version(bp.version)),
                    "entities": head.map(|bp| bp.entities.len()),
                    "tiles": head.map(|bp| bp.tiles.len()),
                    "wires": head.map(|bp| bp.wires.len()),
                });
                println!(
                    "{}",
                    serde_json::to_string_pretty(&summary)
                        .unwrap_or_else(|e| format!(r#"{{"error": "{e}"}}"#))
                );
                ExitCode::SUCCESS
            }
            Err(e) => {
                println!(r#"{{"error": "{}"}}"#, e);
                ExitCode::from(2)
            }
        },

        Commands::Render {
            payload,
            out,
            max_dimension,
        } => {
            let options = RenderOptions {
                max_dimension,
                ..RenderOptions::default()
            };
            let renderer = Renderer::new(&table).with_options(options);

            let result = match renderer.render_string(&payload) {
                Ok(r) => r,
                Err(e) => {
                    println!(r#"{{"success": false, "error": "{}"}}"#, e);
                    return ExitCode::from(2);
                }
            };

            if let Err(e) = result.image.save(&out) {
                println!(r#"{{"success": false, "error": "Failed to write PNG: {}"}}"#, e);
                return ExitCode::FAILURE;
            }

            let metadata = serde_json::json!({
                "success": true,
                "out": out,
                "width": result.image.width(),
                "height": result.image.height(),
                "scale": result.scale,
                "digest": result.digest,
                "counts": result.counts,
                "warnings": result.warnings,
            });
            println!(
                "{}",
                serde_json::to_string_pretty(&metadata)
                    .unwrap_or_else(|e| format!(r#"{{"error": "{e}"}}"#))
            );
            ExitCode::SUCCESS
        }
    }
}
