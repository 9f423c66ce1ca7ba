use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, info};

use super::errors::TrackerError;
use super::types::Issue;
use crate::config::{JiraConfig, JiraFields};

#[cfg(test)]
use mockall::automock;

/// Issue tracker operations used by triage.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait IssueTracker: Send + Sync {
    async fn fetch_issue(&self, key: &str) -> Result<Issue, TrackerError>;

    async fn search(&self, jql: &str) -> Result<Vec<Issue>, TrackerError>;

    async fn set_workflow_state(&self, key: &str, state: &str) -> Result<(), TrackerError>;

    async fn add_comment(&self, key: &str, body: &str) -> Result<(), TrackerError>;
}

/// Jira REST client (API v2) using basic auth.
pub struct JiraClient {
    client: reqwest::Client,
    base_url: String,
    username: String,
    password: Option<String>,
    max_results: u32,
    fields: JiraFields,
}

impl JiraClient {
    pub fn new(config: &JiraConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            username: config.username.clone(),
            password: config.password.clone(),
            max_results: config.max_results,
            fields: config.fields.clone(),
        }
    }

    fn url(&self, route: &str) -> String {
        format!("{}/{}", self.base_url, route)
    }

    async fn check(response: reqwest::Response, operation: &str) -> Result<reqwest::Response, TrackerError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(TrackerError::status(status.as_u16(), operation, &body))
    }
}

#[async_trait]
impl IssueTracker for JiraClient {
    async fn fetch_issue(&self, key: &str) -> Result<Issue, TrackerError> {
        debug!(key, "Fetching issue");
        let response = self
            .client
            .get(self.url(&format!("issue/{key}")))
            .basic_auth(&self.username, self.password.as_ref())
            .send()
            .await?;

        let payload: Value = Self::check(response, &format!("fetch {key}")).await?.json().await?;
        Issue::from_json(&payload, &self.fields)
    }

    async fn search(&self, jql: &str) -> Result<Vec<Issue>, TrackerError> {
        info!(jql, "Finding issues");
        let max_results = self.max_results.to_string();
        let response = self
            .client
            .get(self.url("search"))
            .basic_auth(&self.username, self.password.as_ref())
            .query(&[("jql", jql), ("maxResults", max_results.as_str())])
            .send()
            .await?;

        let payload: Value = Self::check(response, "search").await?.json().await?;
        let issues = payload
            .get("issues")
            .and_then(Value::as_array)
            .ok_or_else(|| TrackerError::InvalidResponse {
                message: "search response has no issues array".to_string(),
            })?;

        issues
            .iter()
            .map(|issue| Issue::from_json(issue, &self.fields))
            .collect()
    }

    async fn set_workflow_state(&self, key: &str, state: &str) -> Result<(), TrackerError> {
        let update = json!({
            "fields": { self.fields.workflow_state.as_str(): { "value": state } }
        });

        let response = self
            .client
            .put(self.url(&format!("issue/{key}")))
            .basic_auth(&self.username, self.password.as_ref())
            .json(&update)
            .send()
            .await?;

        Self::check(response, &format!("update {key}")).await?;
        info!(key, state, "Updated workflow state");
        Ok(())
    }

    async fn add_comment(&self, key: &str, body: &str) -> Result<(), TrackerError> {
        let response = self
            .client
            .post(self.url(&format!("issue/{key}/comment")))
            .basic_auth(&self.username, self.password.as_ref())
            .json(&json!({ "body": body }))
            .send()
            .await?;

        Self::check(response, &format!("comment on {key}")).await?;
        info!(key, "Posted comment");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> JiraClient {
        let config = JiraConfig {
            base_url: format!("{}/rest/api/2/", server.uri()),
            username: "foo".to_string(),
            password: Some("bar".to_string()),
            ..JiraConfig::default()
        };
        JiraClient::new(&config)
    }

    fn issue_payload(key: &str, state: &str) -> Value {
        json!({
            "key": key,
            "fields": {
                "customfield_10020": { "value": state },
                "customfield_10040": "mdp.39015002276304",
                "comment": { "comments": [] }
            }
        })
    }

    #[tokio::test]
    async fn test_fetch_issue_uses_basic_auth() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/api/2/issue/HTS-9999"))
            // base64("foo:bar")
            .and(header("authorization", "Basic Zm9vOmJhcg=="))
            .respond_with(ResponseTemplate::new(200).set_body_json(issue_payload("HTS-9999", "HT to queue")))
            .expect(1)
            .mount(&server)
            .await;

        let issue = client_for(&server).fetch_issue("HTS-9999").await.unwrap();
        assert_eq!(issue.key, "HTS-9999");
        assert_eq!(issue.workflow_state.as_deref(), Some("HT to queue"));
    }

    #[tokio::test]
    async fn test_search_passes_jql_and_limit() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/api/2/search"))
            .and(query_param("jql", "project = HTS"))
            .and(query_param("maxResults", "1000"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "issues": [issue_payload("HTS-1", "HT to reingest"), issue_payload("HTS-2", "HT to queue")]
            })))
            .mount(&server)
            .await;

        let issues = client_for(&server).search("project = HTS").await.unwrap();
        let keys: Vec<&str> = issues.iter().map(|issue| issue.key.as_str()).collect();
        assert_eq!(keys, vec!["HTS-1", "HTS-2"]);
    }

    #[tokio::test]
    async fn test_set_workflow_state_sends_select_value() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/rest/api/2/issue/HTS-9999"))
            .and(body_json(json!({
                "fields": { "customfield_10020": { "value": "UM to investigate further" } }
            })))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        client_for(&server)
            .set_workflow_state("HTS-9999", "UM to investigate further")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_add_comment_posts_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rest/api/2/issue/HTS-9999/comment"))
            .and(body_json(json!({ "body": "mdp.1: failed ingest (unknown)" })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": "10000" })))
            .expect(1)
            .mount(&server)
            .await;

        client_for(&server)
            .add_comment("HTS-9999", "mdp.1: failed ingest (unknown)")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_error_status_is_classified() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/api/2/issue/HTS-404"))
            .respond_with(
                ResponseTemplate::new(404)
                    .set_body_json(json!({ "errorMessages": ["Issue Does Not Exist"], "errors": {} })),
            )
            .mount(&server)
            .await;

        let error = client_for(&server).fetch_issue("HTS-404").await.unwrap_err();
        match error {
            TrackerError::Status { status, message, .. } => {
                assert_eq!(status, 404);
                assert_eq!(message, "Issue Does Not Exist");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
