//! HTTP submission client for the marketplace reimbursement API.
//!
//! Endpoint: POST {endpoint}/claims
//! Auth: Bearer token

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::{FilingPayload, SubmissionClient, SubmissionError, SubmissionReceipt};

/// Marketplace reimbursement API client
pub struct HttpSubmissionClient {
    endpoint: String,
    token: String,
    client: reqwest::Client,
}

/// Response body from a successful filing
#[derive(Debug, Deserialize)]
struct FilingResponse {
    submission_id: String,
    case_id: String,
}

impl HttpSubmissionClient {
    pub fn new(endpoint: String, token: String) -> Self {
        Self {
            endpoint,
            token,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl SubmissionClient for HttpSubmissionClient {
    fn name(&self) -> &str {
        "marketplace-http"
    }

    async fn submit(&self, payload: &FilingPayload) -> Result<SubmissionReceipt, SubmissionError> {
        let url = format!("{}/claims", self.endpoint.trim_end_matches('/'));
        debug!(case_number = %payload.case_number, url = %url, "submitting case");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.token))
            .json(payload)
            .send()
            .await
            .map_err(|e| SubmissionError::transient(format!("request failed: {}", e)))?;

        let status = response.status();
        if status.is_success() {
            let body: FilingResponse = response
                .json()
                .await
                .map_err(|e| SubmissionError::transient(format!("malformed response: {}", e)))?;
            return Ok(SubmissionReceipt {
                submission_id: body.submission_id,
                external_case_id: body.case_id,
            });
        }

        let text = response.text().await.unwrap_or_default();
        // 429 and server errors are worth retrying; other 4xx means the
        // marketplace rejected the claim itself
        if status.is_server_error() || status.as_u16() == 429 {
            Err(SubmissionError::transient(format!(
                "marketplace error ({}): {}",
                status, text
            )))
        } else {
            Err(SubmissionError::permanent(format!(
                "marketplace rejected ({}): {}",
                status, text
            )))
        }
    }
}
