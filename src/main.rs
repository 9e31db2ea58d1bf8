use chrono::Local;
use colored::*;
use std::{env, fs, mem, path::Path, process};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;
use modules::analyzer::analyze;
use modules::batch::{BatchDriver, BatchOptions};
use modules::config::{get_arguments, Config, Credentials};
use modules::error::{ImportError, Result};
use modules::parser::{parse, ParsedCsv, Record};
use modules::supabase::SupabaseClient;
use modules::utility::{print_parse_warnings, print_structure_report, print_summary, write_failed_items};
use modules::validation::{check_conflict_key, reconcile, Verdict};

mod modules;

#[tokio::main]
async fn main() {
    init_logging();

    // a panic inside the import task surfaces as a JoinError
    let code = match tokio::spawn(run()).await {
        Ok(Ok(())) => 0,
        Ok(Err(err)) => {
            eprintln!("{} {}", "Error:".red().bold(), err);
            err.exit_code()
        }
        Err(join_error) => {
            error!(error = %join_error, "import task aborted");
            eprintln!("{} unexpected failure: {}", "Error:".red().bold(), join_error);
            1
        }
    };

    process::exit(code);
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run() -> Result<()> {
    let (filename, config) = get_arguments()?;
    import(&filename, config, |name| env::var(name).ok()).await
}

async fn import<F>(filename: &str, config: Config, lookup: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    // credentials are checked before touching the file
    let credentials = if config.dry_run {
        None
    } else {
        Some(Credentials::from_lookup(lookup)?)
    };

    println!("Reading csv...");
    let content = read_csv(filename)?;
    let parsed = validate(&content, filename, &config)?;

    let driver = BatchDriver::new(BatchOptions {
        table_name: config.table_name.to_owned(),
        conflict_key: config.conflict_key.to_owned(),
        batch_size: config.batch_size,
        batch_interval: config.batch_interval,
    });
    let total_batches = driver.batch_count(parsed.records.len());

    let credentials = match credentials {
        Some(credentials) => credentials,
        None => {
            println!(
                "Dry run: {} records in {} batch(es) would be upserted into {} on {}",
                parsed.records.len(), total_batches, config.table_name, config.conflict_key
            );
            return Ok(());
        }
    };

    let client = SupabaseClient::new(&credentials)?;
    let started = Local::now();
    println!(
        "Upserting {} records into {} ({} batch(es), conflict key {}) at {}",
        parsed.records.len(),
        config.table_name.bold(),
        total_batches,
        config.conflict_key.bold(),
        started.format("%Y-%m-%d %H:%M:%S")
    );

    let ParsedCsv { headers, records, .. } = parsed;
    let summary = driver.run(records, &client).await;
    print_summary(&summary);

    if !summary.failed_records.is_empty() {
        save_failed_items(Path::new(&config.failed_items_path), &headers, &summary.failed_records);
    }

    let elapsed = Local::now() - started;
    info!(elapsed_ms = elapsed.num_milliseconds(), "import finished");
    println!("Finished in {:.1}s", elapsed.num_milliseconds() as f64 / 1000.0);

    summary.check(config.exit_policy)
}

// failed rows are a convenience copy; not being able to save them only warns
fn save_failed_items(path: &Path, headers: &[String], records: &[Record]) -> bool {
    if path.exists() {
        println!("{} overwriting existing {}", "Note:".yellow(), path.display());
    }
    match write_failed_items(path, headers, records) {
        Ok(()) => {
            println!("Failed items have been saved to {}", path.display());
            true
        }
        Err(err) => {
            warn!(path = %path.display(), error = %err, "failed items not saved");
            eprintln!("{} cannot save failed items: {}", "Warning:".yellow().bold(), err);
            false
        }
    }
}

fn read_csv(filename: &str) -> Result<String> {
    let path = Path::new(filename);
    if !path.is_file() {
        return Err(ImportError::FileNotFound { path: filename.to_string() });
    }
    fs::read_to_string(path).map_err(|source| ImportError::Io {
        path: filename.to_string(),
        source,
    })
}

// both passes run on the same content, then a single verdict decides
fn validate(content: &str, filename: &str, config: &Config) -> Result<ParsedCsv> {
    let structure = analyze(content, filename, config.sample_rows)?;
    let mut parsed = parse(content)?;

    let mut warnings = mem::take(&mut parsed.errors);
    warnings.extend(check_conflict_key(&parsed.headers, &config.conflict_key));

    match reconcile(&structure, warnings) {
        Verdict::Clean => {}
        Verdict::Warnings(warnings) => print_parse_warnings(&warnings),
        Verdict::Fatal { structure, parse_errors } => {
            debug!(parse_errors = parse_errors.len(), "typed pass errors superseded by structure check");
            print_structure_report(&structure);
            return Err(ImportError::InvalidStructure {
                path: structure.file_path,
                invalid_count: structure.invalid_count,
            });
        }
    }

    if parsed.records.is_empty() {
        return Err(ImportError::NoRecords { path: filename.to_string() });
    }

    println!("{} valid records found in {}", parsed.records.len(), filename);
    Ok(parsed)
}
