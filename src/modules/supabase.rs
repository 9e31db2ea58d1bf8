use async_trait::async_trait;
use reqwest::{header, Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use tracing::debug;
use super::config::Credentials;
use super::error::{ImportError, UpsertError};
use super::parser::Record;

// insert-or-update of one batch, keyed on `conflict_key`
// returns the number of records the service accepted
#[async_trait]
pub trait Upsert {
    async fn upsert(&self, table: &str, batch: &[Record], conflict_key: &str) -> Result<usize, UpsertError>;
}

pub struct SupabaseClient {
    client: Client,
    rest_url: String,
    api_key: String,
}

// error payload of the REST endpoint
#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: Option<String>,
    code: Option<String>,
    details: Option<String>,
    hint: Option<String>,
}

impl SupabaseClient {

    pub fn new(credentials: &Credentials) -> Result<SupabaseClient, ImportError> {
        let client = Client::builder()
            .build()
            .map_err(ImportError::Client)?;

        Ok(SupabaseClient {
            client,
            rest_url: format!("{}/rest/v1", credentials.base_url.trim_end_matches('/')),
            api_key: credentials.api_key.to_owned(),
        })
    }

    pub fn endpoint(&self, table: &str) -> String {
        format!("{}/{}", self.rest_url, table)
    }

    // POST the batch as a json array; merge-duplicates turns the insert into an upsert
    pub fn request(&self, table: &str, batch: &[Record], conflict_key: &str) -> RequestBuilder {
        self.client
            .post(&self.endpoint(table))
            .query(&[("on_conflict", conflict_key)])
            .header("apikey", self.api_key.as_str())
            .header(header::AUTHORIZATION, format!("Bearer {}", self.api_key))
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(batch)
    }
}

#[async_trait]
impl Upsert for SupabaseClient {

    async fn upsert(&self, table: &str, batch: &[Record], conflict_key: &str) -> Result<usize, UpsertError> {
        debug!(url = %self.endpoint(table), records = batch.len(), conflict_key, "upsert request");

        let response = self.request(table, batch, conflict_key).send().await?;

        let status = response.status();
        if status.is_success() {
            return Ok(batch.len());
        }

        let body = response.text().await.unwrap_or_default();
        Err(api_error(status, &body))
    }
}

fn api_error(status: StatusCode, body: &str) -> UpsertError {
    match serde_json::from_str::<ApiErrorBody>(body) {
        Ok(parsed) => UpsertError::Api {
            status: status.as_u16(),
            message: parsed.message.unwrap_or_else(|| body.to_owned()),
            code: parsed.code,
            details: parsed.details,
            hint: parsed.hint,
        },
        Err(_) => UpsertError::Api {
            status: status.as_u16(),
            message: if body.is_empty() {
                status.canonical_reason().unwrap_or("unknown error").to_owned()
            } else {
                body.to_owned()
            },
            code: None,
            details: None,
            hint: None,
        },
    }
}
