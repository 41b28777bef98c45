//! Granary CLI - Compute supply-chain KPIs into a SQLite mart
//!
//! Usage:
//!   granary run --facts <dir> --as-of <YYYY-MM-DD> [--mart <file.db>] [--registry <metrics.toml>]
//!   granary catalog [--registry <metrics.toml>]
//!   granary validate --registry <metrics.toml>
//!
//! Examples:
//!   granary run --facts ./facts --as-of 2024-06-30 --mart ./mart.db
//!   granary catalog
//!   granary validate --registry ./metrics.toml

use std::path::PathBuf;
use std::process::ExitCode;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use granary::config::Settings;
use granary::engine::Engine;
use granary::facts::FactSet;
use granary::mart::MartDb;
use granary::registry::{catalog, loader, MetricRegistry};

#[derive(Parser)]
#[command(name = "granary")]
#[command(about = "Granary - A deterministic KPI computation engine for supply-chain marts")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run all registered metrics against a fact directory
    Run {
        /// Directory of fact record files (*.json)
        #[arg(short, long)]
        facts: Option<PathBuf>,

        /// Reference date for as-of joins and windows
        #[arg(short, long)]
        as_of: NaiveDate,

        /// Path to the SQLite mart file
        #[arg(short, long)]
        mart: Option<PathBuf>,

        /// Metric catalog to run (builtin catalog if not specified)
        #[arg(short, long)]
        registry: Option<PathBuf>,
    },

    /// List the metrics in the catalog
    Catalog {
        /// Metric catalog to list (builtin catalog if not specified)
        #[arg(short, long)]
        registry: Option<PathBuf>,
    },

    /// Validate a metric catalog without running it
    Validate {
        /// Path to the metric catalog TOML
        #[arg(short, long)]
        registry: PathBuf,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let settings = match Settings::load() {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match cli.command {
        Commands::Run {
            facts,
            as_of,
            mart,
            registry,
        } => cmd_run(&settings, facts, as_of, mart, registry),
        Commands::Catalog { registry } => cmd_catalog(&settings, registry),
        Commands::Validate { registry } => cmd_validate(registry),
    }
}

fn load_registry(settings: &Settings, override_path: Option<PathBuf>) -> Result<MetricRegistry, String> {
    let path = override_path.or_else(|| settings.registry.path.as_ref().map(PathBuf::from));
    match path {
        Some(path) => loader::load(&path).map_err(|e| e.to_string()),
        None => catalog::builtin_registry().map_err(|e| e.to_string()),
    }
}

fn cmd_run(
    settings: &Settings,
    facts: Option<PathBuf>,
    as_of: NaiveDate,
    mart: Option<PathBuf>,
    registry: Option<PathBuf>,
) -> ExitCode {
    let registry = match load_registry(settings, registry) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Registry error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let facts_dir = match facts {
        Some(dir) => dir,
        None => match settings.facts_dir() {
            Ok(dir) => dir,
            Err(e) => {
                eprintln!("Configuration error: {}", e);
                return ExitCode::FAILURE;
            }
        },
    };
    let fact_set = match FactSet::load_dir(&facts_dir) {
        Ok(set) => set,
        Err(e) => {
            eprintln!("Fact loading error: {}", e);
            return ExitCode::FAILURE;
        }
    };
    if fact_set.is_empty() {
        eprintln!("No fact records found in '{}'", facts_dir.display());
        return ExitCode::FAILURE;
    }

    let mart_path = match mart {
        Some(path) => path,
        None => match settings.mart_path() {
            Ok(path) => path,
            Err(e) => {
                eprintln!("Configuration error: {}", e);
                return ExitCode::FAILURE;
            }
        },
    };
    let mut mart_db = match MartDb::open(&mart_path) {
        Ok(db) => db,
        Err(e) => {
            eprintln!("Mart error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let engine = Engine::new(registry);
    match engine.run(&fact_set, &mut mart_db, as_of) {
        Ok(report) => {
            println!("Run complete (as of {})", as_of);
            println!("Digest: {}", report.digest);
            println!();
            println!("Rows written:");
            for (table, count) in &report.rows_written {
                println!("  {} -> {}", table, count);
            }
            if report.partial_cells > 0 {
                println!();
                println!("Partial cells: {}", report.partial_cells);
            }
            if !report.excluded.is_empty() {
                println!();
                println!("Excluded partitions (grain violations):");
                for v in &report.excluded {
                    println!("  {} @ {}", v.metric, v.key);
                }
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Run error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn cmd_catalog(settings: &Settings, registry: Option<PathBuf>) -> ExitCode {
    let registry = match load_registry(settings, registry) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Registry error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    println!("Base currency: {}", registry.base_currency());
    println!();
    println!("Metrics:");
    for spec in registry.specs() {
        println!(
            "  - {} {} -> {}",
            spec.name, spec.granularity, spec.mart_table
        );
        if !spec.depends_on.is_empty() {
            println!("      depends on: {}", spec.depends_on.join(", "));
        }
    }
    println!();
    println!("Evaluation stages:");
    for (i, stage) in registry.stages().enumerate() {
        let names: Vec<&str> = stage.iter().map(|s| s.name.as_str()).collect();
        println!("  {}: {}", i, names.join(", "));
    }

    ExitCode::SUCCESS
}

fn cmd_validate(registry: PathBuf) -> ExitCode {
    match loader::load(&registry) {
        Ok(r) => {
            println!(
                "OK: {} is valid ({} metrics, {} mart tables)",
                registry.display(),
                r.specs().len(),
                r.mart_tables().len()
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Validation error: {}", e);
            ExitCode::FAILURE
        }
    }
}
