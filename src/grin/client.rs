use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

use super::types::ConversionRecord;

#[cfg(test)]
use mockall::automock;

#[derive(Debug, Error)]
pub enum GrinError {
    #[error("GRIN request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("GRIN returned HTTP {status} for {instance}/{barcode}")]
    Status {
        status: u16,
        instance: String,
        barcode: String,
    },
}

/// Per-barcode lookup against a namespace-scoped conversion service instance.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ConversionService: Send + Sync {
    async fn barcode_record(&self, instance: &str, barcode: &str) -> Result<Option<ConversionRecord>, GrinError>;
}

pub struct GrinClient {
    client: reqwest::Client,
    base_url: String,
}

impl GrinClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl ConversionService for GrinClient {
    async fn barcode_record(&self, instance: &str, barcode: &str) -> Result<Option<ConversionRecord>, GrinError> {
        let barcode = barcode.to_uppercase();
        let url = format!("{}/{}/_barcode_search", self.base_url, instance);
        debug!(url = %url, barcode = %barcode, "Querying GRIN");

        let response = self
            .client
            .get(&url)
            .query(&[
                ("format", "text"),
                ("mode", "full"),
                ("execute_query", "true"),
                ("barcodes", barcode.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(GrinError::Status {
                status: status.as_u16(),
                instance: instance.to_string(),
                barcode,
            });
        }

        let body = response.text().await?;
        Ok(ConversionRecord::from_tsv(&body))
    }
}
