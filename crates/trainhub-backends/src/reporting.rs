use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use trainhub_core::{ReportingSink, TrainingIndex, TrainingResult};

/// Pushes job results to the system of record over HTTP.
pub struct HttpReportingSink {
    client: Client,
    endpoint: String,
}

#[derive(Debug, Serialize)]
struct TrainingInfoBody<'a> {
    user: &'a str,
    project_id: &'a str,
    #[serde(flatten)]
    result: &'a TrainingResult,
}

impl HttpReportingSink {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self::with_client(Client::new(), endpoint)
    }

    pub fn with_client(client: Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, training_id: &str) -> String {
        format!("{}/v1/training/{}", self.endpoint, training_id)
    }
}

#[async_trait]
impl ReportingSink for HttpReportingSink {
    async fn set_training_info(&self, index: &TrainingIndex, result: &TrainingResult) -> Result<()> {
        let body = TrainingInfoBody {
            user: &index.user,
            project_id: &index.project_id,
            result,
        };
        self.client
            .put(self.url(&index.id))
            .json(&body)
            .send()
            .await
            .with_context(|| format!("report training {}", index.id))?
            .error_for_status()
            .with_context(|| format!("report training {}", index.id))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use trainhub_core::TrainingStatus;

    #[test]
    fn body_flattens_result() {
        let result = TrainingResult {
            status: Some(TrainingStatus::Completed),
            duration: 12,
            log_path: Some("/ws/j/logs/slurm.out".into()),
            ..Default::default()
        };
        let body = TrainingInfoBody {
            user: "alice",
            project_id: "p1",
            result: &result,
        };
        let v = serde_json::to_value(&body).unwrap();
        assert_eq!(v["user"], json!("alice"));
        assert_eq!(v["project_id"], json!("p1"));
        assert_eq!(v["status"], json!("Completed"));
        assert_eq!(v["duration"], json!(12));
        assert_eq!(v["log_path"], json!("/ws/j/logs/slurm.out"));
    }

    #[test]
    fn url_per_training() {
        let sink = HttpReportingSink::new("http://records.local/");
        assert_eq!(sink.url("t1"), "http://records.local/v1/training/t1");
    }
}
