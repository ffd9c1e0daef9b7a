use std::io::Cursor;

use dm_schema::source::{file_name, OpenedSchema};
use dm_schema::{SchemaIdentifier, SchemaSource, SourceError};
use reqwest::blocking::Client;
use reqwest::StatusCode;

/// Fetches `BASE/NAME-MAJOR.MINOR.xml`.
pub struct HttpSource {
    base_url: String,
    client: Client,
}

impl HttpSource {
    pub fn new(base_url: &str) -> Result<Self, reqwest::Error> {
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: Client::builder().build()?,
        })
    }
}

impl SchemaSource for HttpSource {
    fn open(&self, id: &SchemaIdentifier) -> Result<OpenedSchema, SourceError> {
        let url = format!("{}/{}", self.base_url, file_name(id));
        tracing::debug!(schema = %id, %url, "fetching schema");

        let response = self
            .client
            .get(&url)
            .send()
            .map_err(|e| SourceError::Unavailable(e.to_string()))?;
        match response.status() {
            StatusCode::NOT_FOUND => return Err(SourceError::NotFound),
            status if !status.is_success() => {
                return Err(SourceError::Unavailable(format!("{url} answered {status}")))
            }
            _ => {}
        }
        let body = response
            .bytes()
            .map_err(|e| SourceError::Unavailable(e.to_string()))?;
        Ok(OpenedSchema {
            uri: url,
            reader: Box::new(Cursor::new(body.to_vec())),
        })
    }
}
