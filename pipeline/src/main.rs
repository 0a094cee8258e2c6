//! Playlog CLI - Turn raw streaming event logs into a star schema
//!
//! # Main Commands
//!
//! ```bash
//! playlog run --input log_data.csv         # Full run, writes five CSV artifacts
//! playlog serve                            # Start HTTP server (port 3000)
//! ```
//!
//! # Debug Commands (for development)
//!
//! ```bash
//! playlog parse log_data.csv               # Just load events and print JSON
//! playlog transform log_data.csv -t songs  # Print one table to stdout
//! ```

use clap::{Parser, Subcommand};
use playlog::{
    parse_file_auto, run_from_settings, serialize_schema, transform_events, validate_star_schema,
    InputFormat, TableName,
};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "playlog")]
#[command(about = "Transform music-streaming event logs into a star schema", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Full pipeline: events → five table artifacts in a directory
    Run {
        /// Input event file (falls back to PLAYLOG_INPUT)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Artifact directory (falls back to PLAYLOG_OUTPUT_DIR, then "output")
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Input format: csv, json or ndjson (guessed from extension if omitted)
        #[arg(short, long)]
        format: Option<String>,
    },

    /// Load an event file and output the normalized events as JSON
    Parse {
        /// Input event file
        input: PathBuf,

        /// Input format: csv, json or ndjson
        #[arg(short, long)]
        format: Option<String>,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Transform an event file and print tables as CSV on stdout
    Transform {
        /// Input event file
        input: PathBuf,

        /// Input format: csv, json or ndjson
        #[arg(short, long)]
        format: Option<String>,

        /// Only print this table (e.g. "songs" or "songs_table")
        #[arg(short, long)]
        table: Option<String>,
    },

    /// Start HTTP server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "3000")]
        port: u16,
    },
}

#[tokio::main]
async fn main() {
    // Load .env file (if present)
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run {
            input,
            output_dir,
            format,
        } => cmd_run(input, output_dir, format),

        Commands::Parse {
            input,
            format,
            output,
        } => cmd_parse(&input, format.as_deref(), output.as_deref()),

        Commands::Transform {
            input,
            format,
            table,
        } => cmd_transform(&input, format.as_deref(), table.as_deref()),

        Commands::Serve { port } => cmd_serve(port).await,
    };

    if let Err(e) = result {
        eprintln!("❌ Error: {}", e);
        std::process::exit(1);
    }
}

fn cmd_run(
    input: Option<PathBuf>,
    output_dir: Option<PathBuf>,
    format: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let summary = run_from_settings(input, output_dir, format)?;

    eprintln!("\n📊 Results:");
    for (table, rows) in &summary.tables {
        eprintln!("   {}: {} rows", table, rows);
    }
    if summary.missing_field_issues + summary.unresolved_references > 0 {
        eprintln!(
            "   ⚠️  {} rows excluded, {} references left null",
            summary.missing_field_issues, summary.unresolved_references
        );
    }

    eprintln!("\n✨ Done!");
    Ok(())
}

fn cmd_parse(
    input: &Path,
    format: Option<&str>,
    output: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("📄 Loading events: {}", input.display());

    let format = resolve_format(input, format)?;
    let result = parse_file_auto(input, format)?;

    eprintln!("   Encoding: {}", result.encoding);
    if let Some(d) = result.delimiter {
        eprintln!("   Delimiter: '{}'", format_delimiter(d));
    }
    eprintln!("   Columns: {}", result.headers.join(", "));
    eprintln!("✅ Loaded {} events", result.events.len());

    let json = serde_json::to_string_pretty(&result.events)?;
    write_output(&json, output)?;

    Ok(())
}

fn cmd_transform(
    input: &Path,
    format: Option<&str>,
    table: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    let only = match table {
        Some(name) => Some(
            TableName::parse(name).ok_or_else(|| format!("unknown table '{}'", name))?,
        ),
        None => None,
    };

    let format = resolve_format(input, format)?;
    let parsed = parse_file_auto(input, format)?;
    let output = transform_events(&parsed.events)?;
    validate_star_schema(&output.schema)?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let artifacts = serialize_schema(&output.schema)?;
    let selected: Vec<_> = artifacts
        .iter()
        .filter(|a| only.map_or(true, |t| a.table == t))
        .collect();

    for (i, artifact) in selected.iter().enumerate() {
        if selected.len() > 1 {
            if i > 0 {
                writeln!(out)?;
            }
            writeln!(out, "# {}", artifact.table)?;
        }
        out.write_all(&artifact.content)?;
    }

    Ok(())
}

async fn cmd_serve(port: u16) -> Result<(), Box<dyn std::error::Error>> {
    playlog::server::start_server(port).await?;
    Ok(())
}

fn resolve_format(input: &Path, raw: Option<&str>) -> Result<InputFormat, String> {
    match raw {
        Some(raw) => InputFormat::parse(raw).ok_or_else(|| format!("unknown input format '{}'", raw)),
        None => Ok(InputFormat::from_path(input)),
    }
}

fn format_delimiter(d: char) -> String {
    match d {
        '\t' => "\\t".to_string(),
        c => c.to_string(),
    }
}

fn write_output(content: &str, path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    match path {
        Some(p) => {
            fs::write(p, content)?;
            eprintln!("💾 Saved to: {}", p.display());
        }
        None => println!("{}", content),
    }
    Ok(())
}
