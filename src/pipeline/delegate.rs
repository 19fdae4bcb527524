//! Remote tool delegate: hand the lookup to an external HTTP service.

use std::time::Duration;

use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use tracing::info;

use crate::common::errors::{AgentError, AgentResult};
use crate::query::TabularResult;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DelegateRequest<'a> {
    chat_query: &'a str,
}

/// Client for an external service that answers database questions.
pub struct RemoteToolDelegate {
    client: Client,
    endpoint: String,
}

impl RemoteToolDelegate {
    /// Delegate posting to `endpoint`.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> AgentResult<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    /// Send `message` to the service and tabulate its answer.
    ///
    /// # Errors
    /// Returns an error on transport failure, a non-200 status or a
    /// non-JSON body.
    pub async fn fetch(&self, message: &str) -> AgentResult<TabularResult> {
        info!("Delegating lookup to {}", self.endpoint);
        let response = self
            .client
            .post(&self.endpoint)
            .json(&DelegateRequest {
                chat_query: message,
            })
            .send()
            .await?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(AgentError::ToolStatus(status.as_u16()));
        }
        let body: Value = response.json().await?;
        Ok(records_from_body(&body))
    }
}

/// Records live under `data.df`, or directly under `data`.
#[must_use]
pub fn records_from_body(body: &Value) -> TabularResult {
    let data = body.get("data");
    let records = data.and_then(|d| d.get("df")).or(data);
    match records {
        Some(Value::Array(documents)) => TabularResult::from_documents(documents),
        Some(document @ Value::Object(_)) => TabularResult::from_documents(std::slice::from_ref(document)),
        _ => TabularResult::empty(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_request_body_shape() {
        let body = serde_json::to_value(DelegateRequest {
            chat_query: "open tickets",
        })
        .unwrap();
        assert_eq!(body, json!({"chatQuery": "open tickets"}));
    }

    #[test]
    fn test_records_from_df_or_data() {
        let table = records_from_body(&json!({"data": {"df": [{"ticket_id": 1}, {"ticket_id": 2}]}}));
        assert_eq!(table.len(), 2);
        assert_eq!(table.columns().to_vec(), vec!["Ticket Id"]);

        let table = records_from_body(&json!({"data": [{"subject": "Refund"}]}));
        assert_eq!(table.columns().to_vec(), vec!["Subject"]);

        assert!(records_from_body(&json!({"error": "nope"})).is_empty());
    }
}
