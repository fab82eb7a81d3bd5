use anyhow::{Context, Result};
use clap::Parser;
use ifsc_catalog::config::{init_tracing, Cli, Command, ExportArgs, ImportArgs, Verbosity};
use ifsc_catalog::{catalog_stats, Database, ExportStream, Loader};
use std::fs::File;
use std::io::{self, BufWriter};
use std::path::Path;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // The terminal UI owns the screen; keep log noise out of it
    let quiet = matches!(cli.command, None | Some(Command::Ui));
    init_tracing(Verbosity::from_flags(cli.debug, quiet));

    match cli.command {
        Some(Command::Import(args)) => run_import(&cli.database, &args),
        Some(Command::Stats) => run_stats(&cli.database),
        Some(Command::Export(args)) => run_export(&cli.database, &args),
        Some(Command::Ui) | None => run_ui_mode(&cli.database),
    }
}

fn open(db_path: &Path) -> Result<Database> {
    Database::open(db_path)
        .with_context(|| format!("Failed to open database {}", db_path.display()))
}

fn run_import(db_path: &Path, args: &ImportArgs) -> Result<()> {
    println!("🗄️  Import - CSV → SQLite");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let db = open(db_path)?;
    let loader = Loader::new()
        .with_batch_size(args.batch_size)
        .with_columns(args.columns());

    println!("\n📂 Loading {}...", args.csv.display());
    let report = db
        .with_conn(|conn| loader.load_from_file(conn, &args.csv))
        .with_context(|| format!("Failed to load {}", args.csv.display()))?;

    println!("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("✓ Rows read:           {}", report.rows_read);
    println!("✓ Banks inserted:      {} ({} already present)", report.banks_inserted, report.banks_existing);
    println!("✓ Branches inserted:   {} ({} already present)", report.branches_inserted, report.branches_existing);
    println!("  Duplicates in file:  {}", report.duplicates_skipped);
    println!("  Malformed rows:      {}", report.malformed_rows);
    if report.failed_batches > 0 {
        println!(
            "❌ Failed batches:     {} ({} rows rolled back)",
            report.failed_batches, report.failed_rows
        );
    }
    println!("  Took {} ms", report.elapsed_ms());

    Ok(())
}

fn run_stats(db_path: &Path) -> Result<()> {
    let db = open(db_path)?;
    let stats = db.with_conn(|conn| catalog_stats(conn))?;

    println!("🏦 Banks:    {}", stats.total_banks);
    println!("🏢 Branches: {}", stats.total_branches);
    Ok(())
}

fn run_export(db_path: &Path, args: &ExportArgs) -> Result<()> {
    let db = open(db_path)?;
    let stream = ExportStream::new(db, args.filters());

    let rows = match &args.output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create {}", path.display()))?;
            let rows = stream.write_to(&mut BufWriter::new(file))?;
            eprintln!("✓ Exported {} branches to {}", rows, path.display());
            rows
        }
        None => stream.write_to(&mut io::stdout().lock())?,
    };

    tracing::info!("Export finished: {} rows", rows);
    Ok(())
}

#[cfg(feature = "tui")]
fn run_ui_mode(db_path: &Path) -> Result<()> {
    use ifsc_catalog::{setup_database, ui};
    use rusqlite::Connection;

    if !db_path.exists() {
        eprintln!("❌ Database not found at {}", db_path.display());
        eprintln!("   Run: ifsc-catalog import <CSV>");
        eprintln!("   to load branches first.");
        std::process::exit(1);
    }

    let conn = Connection::open(db_path)?;
    setup_database(&conn)?;

    let mut app = ui::App::new(&conn)?;
    ui::run_ui(&mut app)?;

    println!("\n✅ UI closed");
    Ok(())
}

#[cfg(not(feature = "tui"))]
fn run_ui_mode(_db_path: &Path) -> Result<()> {
    eprintln!("❌ TUI mode not available!");
    eprintln!("   Rebuild with: cargo build --features tui");
    eprintln!("   Or serve the dashboard: cargo run --bin ifsc-server --features server");
    std::process::exit(1);
}
