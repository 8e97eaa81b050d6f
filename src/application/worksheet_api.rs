// Worksheet API trait - the remote operations convergence depends on
use crate::domain::worksheet::WorksheetId;
use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("resource not found: {path}")]
    NotFound { path: String },

    #[error("worksheet API request failed with status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("failed to reach worksheet API: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unexpected worksheet API response: {0}")]
    Decode(String),
}

#[async_trait]
pub trait WorksheetApi: Send + Sync {
    /// Fetch a worksheet payload. Fails with [`ApiError::NotFound`] when the
    /// id does not exist.
    async fn get_worksheet(&self, id: &WorksheetId) -> Result<Value, ApiError>;

    /// Ids of every worksheet whose title is exactly `title`.
    async fn find_worksheet_ids(&self, title: &str) -> Result<Vec<WorksheetId>, ApiError>;

    /// Create a worksheet and return the id the server assigned.
    async fn create_worksheet(&self, payload: &Value) -> Result<WorksheetId, ApiError>;

    async fn edit_worksheet(&self, id: &WorksheetId, payload: &Value) -> Result<(), ApiError>;
}

#[cfg(test)]
pub mod fake {
    //! In-memory worksheet service that records every call made against it.

    use super::*;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq)]
    pub enum ApiCall {
        Get(WorksheetId),
        Find(String),
        Create(Value),
        Edit(WorksheetId, Value),
    }

    #[derive(Default)]
    pub struct FakeWorksheetApi {
        worksheets: Mutex<BTreeMap<String, Value>>,
        calls: Mutex<Vec<ApiCall>>,
        next_id: Mutex<u64>,
    }

    impl FakeWorksheetApi {
        pub fn new() -> Self {
            Self {
                next_id: Mutex::new(101),
                ..Default::default()
            }
        }

        pub fn with_worksheet(self, id: &str, payload: Value) -> Self {
            self.worksheets
                .lock()
                .unwrap()
                .insert(id.to_string(), payload);
            self
        }

        pub fn calls(&self) -> Vec<ApiCall> {
            self.calls.lock().unwrap().clone()
        }

        pub fn clear_calls(&self) {
            self.calls.lock().unwrap().clear();
        }

        pub fn writes(&self) -> Vec<ApiCall> {
            self.calls()
                .into_iter()
                .filter(|c| matches!(c, ApiCall::Create(_) | ApiCall::Edit(..)))
                .collect()
        }

        pub fn stored(&self, id: &str) -> Option<Value> {
            self.worksheets.lock().unwrap().get(id).cloned()
        }

        fn record(&self, call: ApiCall) {
            self.calls.lock().unwrap().push(call);
        }
    }

    #[async_trait]
    impl WorksheetApi for FakeWorksheetApi {
        async fn get_worksheet(&self, id: &WorksheetId) -> Result<Value, ApiError> {
            self.record(ApiCall::Get(id.clone()));
            self.stored(&id.0).ok_or_else(|| ApiError::NotFound {
                path: format!("/worksheet/{}", id),
            })
        }

        async fn find_worksheet_ids(&self, title: &str) -> Result<Vec<WorksheetId>, ApiError> {
            self.record(ApiCall::Find(title.to_string()));
            Ok(self
                .worksheets
                .lock()
                .unwrap()
                .iter()
                .filter(|(_, payload)| payload.get("title").and_then(Value::as_str) == Some(title))
                .map(|(id, _)| WorksheetId(id.clone()))
                .collect())
        }

        async fn create_worksheet(&self, payload: &Value) -> Result<WorksheetId, ApiError> {
            self.record(ApiCall::Create(payload.clone()));
            let mut next_id = self.next_id.lock().unwrap();
            let mut worksheets = self.worksheets.lock().unwrap();
            while worksheets.contains_key(&next_id.to_string()) {
                *next_id += 1;
            }
            let id = next_id.to_string();
            *next_id += 1;
            worksheets.insert(id.clone(), payload.clone());
            Ok(WorksheetId(id))
        }

        async fn edit_worksheet(&self, id: &WorksheetId, payload: &Value) -> Result<(), ApiError> {
            self.record(ApiCall::Edit(id.clone(), payload.clone()));
            let mut worksheets = self.worksheets.lock().unwrap();
            match worksheets.get_mut(&id.0) {
                Some(stored) => {
                    *stored = payload.clone();
                    Ok(())
                }
                None => Err(ApiError::NotFound {
                    path: format!("/worksheet/{}", id),
                }),
            }
        }
    }
}
