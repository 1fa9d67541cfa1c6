//! Importer Service - Loads monthly secretariat spreadsheets into the dashboard
//!
//! Usage:
//!   # Single file (secretariat and period taken from the name):
//!   cargo run --bin importer -- --file planilhas/SESAU_AGOSTO_2024_SC.xlsx
//!
//!   # Whole directory, files in name order:
//!   cargo run --bin importer -- --dir planilhas/
//!
//!   # Parse and report without touching the database:
//!   cargo run --bin importer -- --file SESAU_AGOSTO_2024_SC.xlsx --dry-run

use anyhow::{bail, Result};
use clap::Parser;
use importer::config::Config;
use importer::store::{MemoryStore, PgStore, RecordStore};
use importer::{FileOutcome, ImportOutcome, ImportRequest, ImportSettings, Importer};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "importer", about = "Imports monthly delivery spreadsheets")]
struct Args {
    /// Workbook to import
    #[arg(long, conflicts_with = "dir")]
    file: Option<PathBuf>,

    /// Directory whose .xlsx/.xls files are imported one by one
    #[arg(long)]
    dir: Option<PathBuf>,

    /// Secretariat code (default: file name prefix before the first '_')
    #[arg(long)]
    secretariat: Option<String>,

    /// Reference month 1-12 (default: month name in the file name)
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..=12))]
    month: Option<u32>,

    /// Reference year (default: 20XX token in the file name)
    #[arg(long)]
    year: Option<i32>,

    /// Sheet to read (default: first sheet)
    #[arg(long)]
    sheet: Option<String>,

    /// User recorded on the import (default: IMPORT_USER or "Sistema")
    #[arg(long)]
    user: Option<String>,

    /// Dry run - parse into an in-memory store, don't touch the database
    #[arg(long, default_value = "false")]
    dry_run: bool,

    /// Print results as JSON
    #[arg(long, default_value = "false")]
    json: bool,
}

fn print_outcome(outcome: &ImportOutcome) {
    match (&outcome.summary, &outcome.error_message) {
        (Some(summary), _) => {
            println!("Import ID: {}", summary.import_id);
            println!("Secretariat: {}", summary.secretariat_code);
            println!("Period: {}", summary.period);
            println!(
                "Deliveries: {} total, {} inserted, {} failed",
                summary.total_records, summary.inserted_count, summary.failed_count
            );
        }
        (None, Some(error)) => println!("Error: {}", error),
        (None, None) => {}
    }
}

fn print_batch(results: &[FileOutcome]) {
    for result in results {
        println!("\n{}:", result.file_name);
        match (&result.outcome.summary, &result.outcome.error_message) {
            (Some(summary), _) => println!("  ✓ {} deliveries imported", summary.inserted_count),
            (None, Some(error)) => println!("  ✗ Error: {}", error),
            (None, None) => {}
        }
    }

    let imported = results.iter().filter(|r| r.outcome.success).count();
    println!("\n=== Import Summary ===");
    println!("Files: {}", results.len());
    println!("Imported: {}", imported);
    println!("Failed: {}", results.len() - imported);
}

async fn run<S: RecordStore>(importer: &Importer<S>, args: &Args, user: &str) -> Result<bool> {
    if let Some(file) = &args.file {
        let request = ImportRequest {
            secretariat_code: args.secretariat.clone(),
            month: args.month,
            year: args.year,
            sheet: args.sheet.clone(),
            imported_by: user.to_string(),
        };
        let outcome = importer.import_file(file, &request).await;

        if args.json {
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        } else {
            println!(
                "\n=== Import {} ===",
                if outcome.success { "Complete" } else { "Failed" }
            );
            print_outcome(&outcome);
        }
        Ok(outcome.success)
    } else if let Some(dir) = &args.dir {
        let results = importer.import_directory(dir, user).await?;
        if args.json {
            println!("{}", serde_json::to_string_pretty(&results)?);
        } else {
            print_batch(&results);
        }
        Ok(true)
    } else {
        bail!(
            "Must specify either:\n  \
             --file <path> for a single workbook, or\n  \
             --dir <path> for every workbook in a directory"
        );
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder().with_env_filter(env).init();

    let args = Args::parse();
    let config = Config::from_env()?;
    let user = args.user.clone().unwrap_or_else(|| config.import_user.clone());
    let settings = ImportSettings {
        max_file_bytes: config.max_file_bytes,
        ..ImportSettings::default()
    };

    let mode = if args.dry_run { "dry-run" } else { "live" };
    info!(mode, user = %user, "importer starting");

    let ok = if args.dry_run {
        let importer = Importer::with_settings(MemoryStore::permissive(), settings);
        let ok = run(&importer, &args, &user).await?;

        let stored = importer.store().deliveries();
        if !args.json {
            for (i, d) in stored.iter().take(3).enumerate() {
                println!(
                    "  [{}] {} | {} | {} | {:?}%",
                    i + 1,
                    d.delivery.delivery_code,
                    d.delivery.description.as_deref().unwrap_or("-"),
                    d.delivery.status.as_ref().map(|s| s.label()).unwrap_or("-"),
                    d.delivery.execution_percent
                );
            }
            if stored.len() > 3 {
                println!("  ... and {} more", stored.len() - 3);
            }
            println!("\nDry run - nothing saved to database");
        }
        ok
    } else {
        let store = PgStore::connect(config.db_url()?, config.db_max_connections).await?;
        let importer = Importer::with_settings(store, settings);
        run(&importer, &args, &user).await?
    };

    if !ok {
        bail!("import failed");
    }
    Ok(())
}
