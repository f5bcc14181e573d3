use crate::error::Result;
use crate::http::build_client;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

/// What a single HEAD request observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Status(u16),
    /// Timeout, DNS failure, refused or reset connection.
    Failed(String),
}

/// Liveness prober issuing one HEAD request per URL, without retries.
pub struct HttpProbe {
    client: Client,
    timeout: Duration,
}

impl HttpProbe {
    pub fn new(timeout: Duration) -> Result<Self> {
        Ok(Self::with_client(build_client(timeout)?, timeout))
    }

    pub fn with_client(client: Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn head(&self, url: &str) -> ProbeOutcome {
        match self.client.head(url).timeout(self.timeout).send().await {
            Ok(response) => {
                let status = response.status().as_u16();
                debug!("HEAD {} -> {}", url, status);
                ProbeOutcome::Status(status)
            }
            Err(e) => {
                debug!("HEAD {} failed: {}", url, e);
                ProbeOutcome::Failed(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_head_reports_status() {
        let mock_server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/gone"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;

        let probe = HttpProbe::new(Duration::from_secs(5)).unwrap();
        let outcome = probe.head(&format!("{}/gone", mock_server.uri())).await;
        assert_eq!(outcome, ProbeOutcome::Status(404));
    }

    #[tokio::test]
    async fn test_head_timeout_is_failure() {
        let mock_server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
            .mount(&mock_server)
            .await;

        let probe = HttpProbe::new(Duration::from_millis(200)).unwrap();
        let outcome = probe.head(&format!("{}/slow", mock_server.uri())).await;
        assert!(matches!(outcome, ProbeOutcome::Failed(_)));
    }
}
