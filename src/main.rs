use clap::Parser;
use std::process;

use question_migrate::config::{Cli, Settings};
use question_migrate::input::RecordSource;
use question_migrate::orchestrator::{BatchOptions, BatchOrchestrator, ConsoleProgress};
use question_migrate::pipeline::PipelineOptions;
use question_migrate::reporter::{print_summary, ReportWriter};
use question_migrate::sink::DirectorySink;
use question_migrate::type_registry::TypeRegistry;
use question_migrate::MigrateError;

const EXIT_FAILURES: i32 = 1;
const EXIT_FATAL: i32 = 2;

fn main() {
    let cli = Cli::parse();
    let settings = match Settings::resolve(cli) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("\n❌ Error: {}", e);
            process::exit(EXIT_FATAL);
        }
    };
    init_logging(settings.verbose);

    match run(&settings) {
        Ok(true) => {}
        Ok(false) => process::exit(EXIT_FAILURES),
        Err(e) => {
            eprintln!("\n❌ Error: {}", e);
            process::exit(EXIT_FATAL);
        }
    }
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter)).init();
}

/// Returns whether every processed record converted and was written.
fn run(settings: &Settings) -> Result<bool, MigrateError> {
    println!("\n=== Loading Type Specs ===");
    let registry = match &settings.specs {
        Some(dir) => {
            println!("  ℹ Loading type specs from {}", dir.display());
            TypeRegistry::load_dir(dir)?
        }
        None => TypeRegistry::builtin()?,
    };
    println!(
        "  ✓ {} question types: {}",
        registry.len(),
        registry.discriminators().join(", ")
    );

    if let Some(types) = &settings.types {
        for name in types {
            if registry.canonical(name).is_none() {
                return Err(MigrateError::UnknownType(name.clone()));
            }
        }
        println!("  ℹ Only processing: {}", types.join(", "));
    }

    println!("\n=== Reading Input ===");
    let records = RecordSource::open(&settings.input)?;
    println!("  ✓ {} JSON files in {}", records.len(), settings.input.display());

    let mut sink = DirectorySink::new(&settings.output).with_source_root(&settings.input);
    if settings.dry_run {
        println!("  ℹ Dry run: no files will be written");
    } else {
        sink.prepare()?;
    }
    if !settings.check_identity {
        println!("  ℹ Skipping question_id / filename check");
    }

    println!("\n=== Converting ===");
    let orchestrator = BatchOrchestrator::new(
        &registry,
        BatchOptions {
            type_filter: settings.types.clone(),
            dry_run: settings.dry_run,
            pipeline: PipelineOptions {
                check_identity: settings.check_identity,
            },
        },
    );
    let report = orchestrator.run(records, &mut sink, &mut ConsoleProgress);

    print_summary(&report, settings.verbose);

    let mut reports_ok = true;
    match ReportWriter::new(&settings.output).write(&report, &settings.report_formats) {
        Ok(paths) => {
            for path in paths {
                println!("  ✓ Report: {}", path.display());
            }
        }
        Err(e) => {
            eprintln!("  ❌ Failed to write reports: {}", e);
            reports_ok = false;
        }
    }

    if !settings.dry_run {
        println!("  ✓ Output folder: {}", sink.root().display());
    }
    Ok(report.is_clean() && reports_ok)
}
