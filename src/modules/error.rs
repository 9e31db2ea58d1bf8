use thiserror::Error;

// failure of a whole import run, mapped to the exit code in main
#[derive(Error, Debug)]
pub enum ImportError {
    #[error("Missing environment variable: {name}")]
    MissingEnv { name: String },

    #[error("Invalid argument {name}: {reason}")]
    InvalidArgument { name: String, reason: String },

    #[error("File not found: {path}")]
    FileNotFound { path: String },

    #[error("Cannot read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Invalid CSV structure in {path}: {invalid_count} row(s) do not match the header")]
    InvalidStructure { path: String, invalid_count: usize },

    #[error("No records to import in {path}")]
    NoRecords { path: String },

    #[error("Cannot build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("{failed} of {total} batch(es) failed")]
    BatchFailures { failed: usize, total: usize },
}

impl ImportError {
    pub fn exit_code(&self) -> i32 {
        1
    }
}

// failure of a single upsert call, recovered by the batch driver
#[derive(Error, Debug)]
pub enum UpsertError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{status}: {message}")]
    Api {
        status: u16,
        message: String,
        code: Option<String>,
        details: Option<String>,
        hint: Option<String>,
    },
}

pub type Result<T> = std::result::Result<T, ImportError>;
