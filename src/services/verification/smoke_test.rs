//! Smoke test: one HTTP GET against the running preview must return 2xx.

use async_trait::async_trait;
use std::time::Duration;

use super::traits::{CheckInput, VerificationCheck};
use crate::domain::models::CheckResult;

pub struct SmokeTest {
    url: String,
    client: reqwest::Client,
}

impl SmokeTest {
    pub fn new(url: impl Into<String>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            url: url.into(),
            client,
        })
    }
}

#[async_trait]
impl VerificationCheck for SmokeTest {
    fn name(&self) -> &str {
        "smoke-test"
    }

    fn blocking(&self) -> bool {
        true
    }

    async fn run(&self, _input: &CheckInput<'_>) -> anyhow::Result<CheckResult> {
        let response = match self.client.get(&self.url).send().await {
            Ok(response) => response,
            Err(e) => {
                return Ok(CheckResult::fail(
                    self.name(),
                    format!("GET {} failed: {e}", self.url),
                ))
            }
        };
        let status = response.status();
        let detail = format!("GET {} returned {status}", self.url);
        Ok(if status.is_success() {
            CheckResult::pass(self.name(), detail)
        } else {
            CheckResult::fail(self.name(), detail)
        })
    }
}
