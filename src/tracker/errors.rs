use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("Jira request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Jira returned HTTP {status} while trying to {operation}: {message}")]
    Status {
        status: u16,
        operation: String,
        message: String,
    },
    #[error("Invalid response from Jira: {message}")]
    InvalidResponse { message: String },
}

impl TrackerError {
    pub(crate) fn status(status: u16, operation: impl Into<String>, body: &str) -> Self {
        // Jira error bodies carry `errorMessages` and a per-field `errors` map.
        let message = serde_json::from_str::<serde_json::Value>(body)
            .ok()
            .and_then(|value| {
                let messages: Vec<String> = value
                    .get("errorMessages")
                    .and_then(|m| m.as_array())
                    .into_iter()
                    .flatten()
                    .filter_map(|m| m.as_str().map(str::to_string))
                    .chain(
                        value
                            .get("errors")
                            .and_then(|e| e.as_object())
                            .into_iter()
                            .flatten()
                            .filter_map(|(field, m)| m.as_str().map(|m| format!("{field}: {m}"))),
                    )
                    .collect();
                (!messages.is_empty()).then(|| messages.join("; "))
            })
            .unwrap_or_else(|| body.trim().to_string());

        TrackerError::Status {
            status,
            operation: operation.into(),
            message,
        }
    }
}
