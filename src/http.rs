use crate::error::{Error, Result};
use reqwest::{Client, StatusCode, header};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

const UPLOAD_TIMEOUT: Duration = Duration::from_secs(60);

/// Shared HTTP client with bounded retry and exponential backoff.
///
/// Transport failures (timeout, connection refused) are retried here;
/// API-level rejections surface immediately and are the caller's problem.
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    max_retries: u32,
    base_delay_ms: u64,
}

impl HttpClient {
    pub fn new(user_agent: &str) -> Result<Self> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::ACCEPT_LANGUAGE,
            header::HeaderValue::from_static("ru,en;q=0.9"),
        );
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(user_agent)
            .default_headers(headers)
            .build()
            .map_err(|e| Error::http(e.to_string()))?;

        Ok(Self {
            client,
            max_retries: 3,
            base_delay_ms: 600,
        })
    }

    pub async fn get_text(&self, url: &str) -> Result<String> {
        self.request_with_retry(|| self.client.get(url)).await
    }

    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let body = self.get_text(url).await?;
        serde_json::from_str(&body).map_err(|e| Error::parse(format!("JSON parse: {e}")))
    }

    /// Single-attempt GET returning the raw response, for streaming bodies.
    /// Retry is deliberately absent: a broken media download is cheaper to
    /// abandon than to restart mid-run.
    pub async fn get_raw(&self, url: &str) -> Result<reqwest::Response> {
        self.client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::http(e.to_string()))
    }

    pub async fn post_form(&self, url: &str, params: &[(&str, String)]) -> Result<String> {
        self.request_with_retry(|| self.client.post(url).form(params))
            .await
    }

    /// Multipart POST; the form is rebuilt per attempt since
    /// `multipart::Form` is consumed by the request.
    pub async fn post_multipart<F>(&self, url: &str, make_form: F) -> Result<String>
    where
        F: Fn() -> reqwest::multipart::Form,
    {
        self.request_with_retry(|| {
            self.client
                .post(url)
                .multipart(make_form())
                .timeout(UPLOAD_TIMEOUT)
        })
        .await
    }

    async fn request_with_retry<F>(&self, build: F) -> Result<String>
    where
        F: Fn() -> reqwest::RequestBuilder,
    {
        let mut last_error = Error::http("no attempts made");
        let mut delay = self.base_delay_ms;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                debug!(attempt, delay_ms = delay, "retrying request");
                sleep(Duration::from_millis(delay)).await;
                delay = (delay * 2).min(30_000);
            }

            match build().send().await {
                Ok(resp) => return self.handle_response(resp).await,
                Err(e) => {
                    last_error = Error::http(e.to_string());
                    if e.is_timeout() || e.is_connect() {
                        warn!(attempt, "transient failure, will retry");
                        continue;
                    }
                    return Err(last_error);
                }
            }
        }

        Err(last_error)
    }

    async fn handle_response(&self, resp: reqwest::Response) -> Result<String> {
        let status = resp.status();
        let url = resp.url().to_string();

        match status {
            StatusCode::OK | StatusCode::CREATED | StatusCode::ACCEPTED => {
                resp.text().await.map_err(|e| Error::http(e.to_string()))
            }
            StatusCode::TOO_MANY_REQUESTS => {
                let retry_after = resp
                    .headers()
                    .get(header::RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse().ok());
                Err(Error::RateLimit {
                    platform: extract_domain(&url),
                    retry_after_secs: retry_after,
                })
            }
            _ => {
                let body = resp.text().await.unwrap_or_default();
                Err(Error::api_with_status(
                    extract_domain(&url),
                    body,
                    status.as_u16(),
                ))
            }
        }
    }
}

fn extract_domain(url: &str) -> String {
    url.split("//")
        .nth(1)
        .and_then(|s| s.split('/').next())
        .unwrap_or("unknown")
        .to_string()
}
