//! Thin HTTP client for the rollcalld endpoints the CLI uses.

use anyhow::{anyhow, Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::NaiveDate;
use rollcall_store::{CourseReport, ScanEntry};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

pub struct DaemonClient {
    http: reqwest::Client,
    base: String,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
    #[serde(default)]
    message: String,
}

impl DaemonClient {
    pub fn new(base: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("building HTTP client")?;
        Ok(Self {
            http,
            base: base.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let status = response.status();
        if status.is_success() {
            return response.json().await.context("decoding daemon response");
        }
        let text = response.text().await.unwrap_or_default();
        match serde_json::from_str::<ErrorBody>(&text) {
            Ok(body) => Err(anyhow!("{} ({status}): {}", body.error, body.message)),
            Err(_) => Err(anyhow!("daemon returned {status}: {text}")),
        }
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T> {
        tracing::debug!(path, "GET");
        let response = self
            .http
            .get(self.url(path))
            .query(query)
            .send()
            .await
            .with_context(|| format!("contacting rollcalld at {}", self.base))?;
        Self::decode(response).await
    }

    async fn post<T: DeserializeOwned>(&self, path: &str, body: &Value) -> Result<T> {
        tracing::debug!(path, "POST");
        let response = self
            .http
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .with_context(|| format!("contacting rollcalld at {}", self.base))?;
        Self::decode(response).await
    }

    pub async fn health(&self) -> Result<Value> {
        self.get("/test", &[]).await
    }

    /// Ask the daemon to re-read identities. Returns the roster size.
    pub async fn reload(&self) -> Result<u64> {
        let body: Value = self.post("/reload_faces", &json!({})).await?;
        body["count"]
            .as_u64()
            .ok_or_else(|| anyhow!("reload response has no count"))
    }

    pub async fn today(&self) -> Result<Vec<ScanEntry>> {
        self.get("/attendance/today", &[]).await
    }

    pub async fn report(&self, course_id: i64, date: Option<NaiveDate>) -> Result<CourseReport> {
        let mut query = vec![("course_id", course_id.to_string())];
        if let Some(date) = date {
            query.push(("date", date.format("%Y-%m-%d").to_string()));
        }
        self.get("/attendance/report", &query).await
    }

    pub async fn enroll_face(&self, id: i64, name: &str, image: &[u8]) -> Result<Value> {
        let body = json!({ "id": id, "name": name, "frame": STANDARD.encode(image) });
        self.post("/identities", &body).await
    }
}
