// Only compile UI module when TUI feature is enabled
#[cfg(feature = "tui")]
mod ui;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rusqlite::Connection;
use sipms::audit::{list_action_logs, ActionLogFilter};
use sipms::entities::prediction::district_summary;
use sipms::{import_schools, open_database, ActionKind, SipmsConfig};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sipms", version, about = "School Infrastructure Planning & Management System")]
struct Cli {
    /// Database file (overrides database.path from config)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Create the database schema
    Init,
    /// Import schools from a CSV file
    ImportSchools { csv: PathBuf },
    /// Show the most recent action log entries
    Logs {
        #[arg(long)]
        action: Option<ActionKind>,
        #[arg(long)]
        model: Option<String>,
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },
    /// Rooms and budget totals for one sector (umurenge)
    Summary { sector: String },
    /// Terminal dashboard (default)
    Ui,
}

fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    init_tracing();

    let cli = Cli::parse();
    let config = SipmsConfig::load().context("Failed to load configuration")?;
    let db_path = cli.db.unwrap_or(config.database.path);

    match cli.command.unwrap_or(Command::Ui) {
        Command::Init => run_init(&db_path),
        Command::ImportSchools { csv } => run_import(&db_path, &csv),
        Command::Logs {
            action,
            model,
            limit,
        } => run_logs(&db_path, action, model, limit),
        Command::Summary { sector } => run_summary(&db_path, &sector),
        Command::Ui => run_ui_mode(&db_path),
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("SIPMS_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn open(db_path: &Path) -> Result<Connection> {
    open_database(db_path).with_context(|| format!("Failed to open database {}", db_path.display()))
}

fn run_init(db_path: &Path) -> Result<()> {
    println!("🔧 Setting up database...");
    open(db_path)?;
    println!("✓ Database ready at {} (WAL mode)", db_path.display());
    Ok(())
}

fn run_import(db_path: &Path, csv: &Path) -> Result<()> {
    println!("📂 Importing schools from {}", csv.display());
    let conn = open(db_path)?;

    let summary = import_schools(&conn, None, csv).context("School import failed")?;
    println!("✓ Imported {} schools", summary.imported);
    Ok(())
}

fn run_logs(db_path: &Path, action: Option<ActionKind>, model: Option<String>, limit: u32) -> Result<()> {
    let conn = open(db_path)?;
    let filter = ActionLogFilter {
        action,
        model_name: model,
        limit: Some(limit),
        ..Default::default()
    };
    let logs = list_action_logs(&conn, &filter)?;

    if logs.is_empty() {
        println!("No action log entries");
        return Ok(());
    }
    for log in logs {
        let target = match log.object_id {
            Some(id) => format!("{} #{}", log.model_name, id),
            None => log.model_name.clone(),
        };
        println!(
            "{}  {:<8} {:<24} by {}",
            log.timestamp.format("%Y-%m-%d %H:%M:%S"),
            log.action,
            target,
            log.username.as_deref().unwrap_or("-"),
        );
    }
    Ok(())
}

fn run_summary(db_path: &Path, sector: &str) -> Result<()> {
    let conn = open(db_path)?;
    let summary = district_summary(&conn, sector)?;

    println!("📊 {}", summary.umurenge);
    println!("   Schools with predictions: {}", summary.total_schools);
    println!("   Rooms to build:           {}", summary.total_rooms_to_build);
    println!("   Estimated budget:         {} RWF", summary.total_estimated_budget);
    Ok(())
}

#[cfg(feature = "tui")]
fn run_ui_mode(db_path: &Path) -> Result<()> {
    if !db_path.exists() {
        eprintln!("❌ Database not found at {}", db_path.display());
        eprintln!("   Run: sipms init");
        std::process::exit(1);
    }

    let conn = open(db_path)?;
    let mut app = ui::App::load(&conn)?;
    ui::run_ui(&mut app)?;

    println!("\n✅ UI closed");
    Ok(())
}

#[cfg(not(feature = "tui"))]
fn run_ui_mode(_db_path: &Path) -> Result<()> {
    eprintln!("❌ TUI mode not available!");
    eprintln!("   Rebuild with: cargo build --features tui");
    eprintln!("   Or run the API: cargo run --bin sipms-server --features server");
    std::process::exit(1);
}
