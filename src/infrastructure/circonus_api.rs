// Circonus REST implementation of the worksheet API
use crate::application::worksheet_api::{ApiError, WorksheetApi};
use crate::domain::worksheet::WorksheetId;
use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, StatusCode};
use serde_json::Value;
use std::time::Duration;

const WORKSHEET_PREFIX: &str = "/worksheet/";

#[derive(Debug, Clone)]
pub struct CirconusApi {
    base_url: String,
    token: String,
    app_name: String,
    client: reqwest::Client,
}

impl CirconusApi {
    pub fn new(base_url: String, token: String, app_name: String, timeout: Duration) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
            app_name,
            client,
        })
    }

    /// Accepts both bare ids and `/worksheet/<id>` cids.
    fn worksheet_path(id: &WorksheetId) -> String {
        format!(
            "{}{}",
            WORKSHEET_PREFIX,
            id.0.trim_start_matches(WORKSHEET_PREFIX)
        )
    }

    fn request(&self, method: Method, path_and_query: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.base_url, path_and_query))
            .header("X-Circonus-Auth-Token", &self.token)
            .header("X-Circonus-App-Name", &self.app_name)
            .header("Accept", "application/json")
    }

    async fn execute(&self, request: RequestBuilder, path: &str) -> Result<Value, ApiError> {
        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            return Err(ApiError::NotFound {
                path: path.to_string(),
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.text().await?;
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&body)
            .map_err(|e| ApiError::Decode(format!("{} returned invalid JSON: {}", path, e)))
    }
}

fn id_from_cid(entry: &Value) -> Result<WorksheetId, ApiError> {
    entry
        .get("_cid")
        .and_then(Value::as_str)
        .map(|cid| WorksheetId(cid.trim_start_matches(WORKSHEET_PREFIX).to_string()))
        .ok_or_else(|| ApiError::Decode(format!("worksheet without a _cid: {}", entry)))
}

#[async_trait]
impl WorksheetApi for CirconusApi {
    async fn get_worksheet(&self, id: &WorksheetId) -> Result<Value, ApiError> {
        let path = Self::worksheet_path(id);
        tracing::debug!(%path, "Fetching worksheet");
        self.execute(self.request(Method::GET, &path), &path).await
    }

    async fn find_worksheet_ids(&self, title: &str) -> Result<Vec<WorksheetId>, ApiError> {
        let path = format!("/worksheet?f_title={}", urlencoding::encode(title));
        tracing::debug!(%title, "Searching worksheets by title");
        let found = self.execute(self.request(Method::GET, &path), &path).await?;

        match found {
            Value::Null => Ok(Vec::new()),
            Value::Array(entries) => entries.iter().map(id_from_cid).collect(),
            other => Err(ApiError::Decode(format!(
                "expected a list of worksheets, got {}",
                other
            ))),
        }
    }

    async fn create_worksheet(&self, payload: &Value) -> Result<WorksheetId, ApiError> {
        let path = "/worksheet";
        let created = self
            .execute(self.request(Method::POST, path).json(payload), path)
            .await?;
        let id = id_from_cid(&created)?;
        tracing::info!(%id, "Created worksheet");
        Ok(id)
    }

    async fn edit_worksheet(&self, id: &WorksheetId, payload: &Value) -> Result<(), ApiError> {
        let path = Self::worksheet_path(id);
        self.execute(self.request(Method::PUT, &path).json(payload), &path)
            .await?;
        Ok(())
    }
}
