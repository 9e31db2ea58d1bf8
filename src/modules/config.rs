use clap::{clap_app, App, ArgMatches};
use std::str::FromStr;
use super::analyzer::DEFAULT_SAMPLE_ROWS;
use super::error::{ImportError, Result};

pub struct Config {
    pub table_name: String,
    pub conflict_key: String,
    pub batch_size: usize,
    pub batch_interval: u64,
    pub sample_rows: usize,
    pub failed_items_path: String,
    pub exit_policy: ExitPolicy,

    /*
        option: dry_run
        default: false
        effect: validate and parse the csv, print the summary of what would
        be uploaded, then stop. Credentials are not required.
    */
    pub dry_run: bool,
}

/*
    What a run with failed batches exits with.
    Lenient: failed batches are reported and saved, the process exits 0.
    Strict: any failed batch makes the process exit 1.
*/
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ExitPolicy {
    Lenient,
    Strict,
}

// connection details of the remote data service, from the environment
#[derive(Debug, Clone)]
pub struct Credentials {
    pub base_url: String,
    pub api_key: String,
}

pub const ENV_URL: &str = "SUPABASE_URL";
pub const ENV_KEY: &str = "SUPABASE_SERVICE_ROLE_KEY";
pub const ENV_KEY_FALLBACK: &str = "SUPABASE_KEY";

pub const FAILED_CSV_FILE_NAME: &str = "failed_items.csv";
pub const BATCH_SIZE_MIN: usize = 1;
pub const BATCH_SIZE_MAX: usize = 1000;
pub const BATCH_SIZE_DEFAULT: &str = "50";
pub const BATCH_INTERVAL_MIN: usize = 0;
pub const BATCH_INTERVAL_MAX: usize = 30000;
pub const BATCH_INTERVAL_DEFAULT: &str = "0";
pub const SAMPLE_ROWS_MIN: usize = 1;
pub const SAMPLE_ROWS_MAX: usize = 100;

impl Credentials {

    // empty values count as missing
    pub fn from_lookup<F>(lookup: F) -> Result<Credentials>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let base_url = read(ENV_URL).ok_or_else(|| missing(ENV_URL))?;
        let api_key = read(ENV_KEY)
            .or_else(|| read(ENV_KEY_FALLBACK))
            .ok_or_else(|| missing(ENV_KEY))?;

        Ok(Credentials { base_url, api_key })
    }
}

fn missing(name: &str) -> ImportError {
    ImportError::MissingEnv { name: name.to_string() }
}

pub fn build_app() -> App<'static, 'static> {
    clap_app!(csv_to_supabase =>
        (version: env!("CARGO_PKG_VERSION"))
        (about: "Upsert the rows of a CSV file into a Supabase table, in batches")
        (@arg FILENAME: +required "Provide CSV filename")
        (@arg TABLE: -t --table +required +takes_value "Specify the target table name")
        (@arg ID: -i --id +required +takes_value "Specify the column used as conflict key for the upsert")
        (@arg BATCH_SIZE: -b --batch +takes_value "Specify batch size between 1 and 1000. Default 50")
        (@arg SAMPLES: -s --samples +takes_value "Specify how many malformed rows are shown in detail, between 1 and 100. Default 3")
        (@arg BATCH_INTERVAL: --interval +takes_value "Specify pause between batches in milliseconds between 0 and 30000. Default 0")
        (@arg FAILED: -f --failed +takes_value "Specify where records of failed batches are saved. Default failed_items.csv")
        (@arg STRICT: --strict "Exit with an error when any batch fails")
        (@arg DRY_RUN: --("dry-run") "Validate the csv without uploading anything")
    )
}

pub fn get_arguments() -> Result<(String, Config)> {
    let matches = build_app().get_matches();
    from_matches(&matches)
}

pub fn from_matches(matches: &ArgMatches) -> Result<(String, Config)> {
    let config = Config {
        table_name: required(matches, "TABLE")?,
        conflict_key: required(matches, "ID")?,
        batch_size: parse_in_range(
            matches.value_of("BATCH_SIZE").unwrap_or(BATCH_SIZE_DEFAULT),
            "--batch", BATCH_SIZE_MIN, BATCH_SIZE_MAX)?,
        batch_interval: parse_in_range(
            matches.value_of("BATCH_INTERVAL").unwrap_or(BATCH_INTERVAL_DEFAULT),
            "--interval", BATCH_INTERVAL_MIN, BATCH_INTERVAL_MAX)? as u64,
        sample_rows: match matches.value_of("SAMPLES") {
            Some(text) => parse_in_range(text, "--samples", SAMPLE_ROWS_MIN, SAMPLE_ROWS_MAX)?,
            None => DEFAULT_SAMPLE_ROWS,
        },
        failed_items_path: matches
            .value_of("FAILED")
            .unwrap_or(FAILED_CSV_FILE_NAME)
            .to_string(),
        exit_policy: if matches.is_present("STRICT") {
            ExitPolicy::Strict
        } else {
            ExitPolicy::Lenient
        },
        dry_run: matches.is_present("DRY_RUN"),
    };

    Ok((required(matches, "FILENAME")?, config))
}

fn required(matches: &ArgMatches, name: &str) -> Result<String> {
    matches
        .value_of(name)
        .map(|v| v.to_string())
        .ok_or_else(|| ImportError::InvalidArgument {
            name: name.to_string(),
            reason: "value is required".to_string(),
        })
}

pub fn parse_in_range<T>(text: &str, name: &str, lower_bound: T, upper_bound: T) -> Result<T>
where
    T: FromStr + PartialOrd + std::fmt::Display,
{
    let value: T = text.trim().parse().map_err(|_| ImportError::InvalidArgument {
        name: name.to_string(),
        reason: format!("{} is not a valid number", text),
    })?;

    if value < lower_bound || value > upper_bound {
        return Err(ImportError::InvalidArgument {
            name: name.to_string(),
            reason: format!("{} is not between {} and {}", value, lower_bound, upper_bound),
        });
    }
    Ok(value)
}
