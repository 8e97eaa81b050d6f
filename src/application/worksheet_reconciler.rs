// Worksheet reconciler - converges one declared worksheet
use crate::application::converge_service::{DeferredAction, DeferredQueue};
use crate::application::run_state::{RunState, WorksheetState};
use crate::application::worksheet_api::{ApiError, WorksheetApi};
use crate::domain::payload::empty_worksheet_payload;
use crate::domain::worksheet::{self, Worksheet, WorksheetId};
use crate::error::{ConvergeError, Result};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadMode {
    Create,
    Edit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRecord {
    pub worksheet: String,
    pub mode: UploadMode,
    pub id: WorksheetId,
}

pub struct WorksheetReconciler<'a> {
    api: &'a dyn WorksheetApi,
    enabled: bool,
}

impl<'a> WorksheetReconciler<'a> {
    pub fn new(api: &'a dyn WorksheetApi, enabled: bool) -> Self {
        Self { api, enabled }
    }

    /// Resolve the worksheet remotely and build its desired payload. Runs at
    /// most once per pass; later calls reuse the cached state.
    pub async fn load(&self, worksheet: &Worksheet, state: &mut RunState) -> Result<()> {
        if !self.enabled {
            if state.worksheet(&worksheet.name).is_none() {
                state.insert_worksheet(&worksheet.name, WorksheetState::default());
            }
            return Ok(());
        }
        if state.worksheet(&worksheet.name).is_some() {
            return Ok(());
        }

        let mut current = WorksheetState {
            id: worksheet.id.clone(),
            ..Default::default()
        };

        match &worksheet.id {
            Some(id) => {
                let payload = match self.api.get_worksheet(id).await {
                    Ok(payload) => payload,
                    Err(ApiError::NotFound { .. }) => {
                        return Err(ConvergeError::WorksheetIdNotFound { id: id.clone() });
                    }
                    Err(e) => return Err(e.into()),
                };
                current.current = Some(into_object(payload)?);
                current.exists = true;
            }
            None => {
                let ids = self.api.find_worksheet_ids(&worksheet.title).await?;
                if ids.len() > 1 {
                    return Err(ConvergeError::AmbiguousWorksheetTitle {
                        title: worksheet.title.clone(),
                        ids,
                    });
                }
                match ids.into_iter().next() {
                    None => {
                        tracing::debug!(title = %worksheet.title, "No worksheet with this title yet");
                    }
                    Some(id) => {
                        let payload = self.api.get_worksheet(&id).await?;
                        current.id = Some(id);
                        current.current = Some(into_object(payload)?);
                        current.exists = true;
                    }
                }
            }
        }

        // Desired state starts as a deep copy of what the server holds.
        current.desired = current
            .current
            .clone()
            .unwrap_or_else(empty_worksheet_payload);
        worksheet.project_onto(&mut current.desired);

        tracing::debug!(
            worksheet = %worksheet.name,
            exists = current.exists,
            id = ?current.id,
            "Loaded worksheet"
        );
        state.insert_worksheet(&worksheet.name, current);
        Ok(())
    }

    /// Title or tags differ between the server and the declaration. Graphs
    /// are ignored; a changed graph schedules its own upload.
    pub fn any_payload_changes(&self, worksheet: &Worksheet, state: &RunState) -> bool {
        let Some(ws) = state.worksheet(&worksheet.name) else {
            return false;
        };
        let empty = Map::new();
        let current = ws.current.as_ref().unwrap_or(&empty);

        let changes = worksheet::changed_fields(current, &ws.desired);
        for change in &changes {
            tracing::debug!(
                worksheet = %worksheet.name,
                field = change.field,
                old = %change.old,
                new = %change.new,
                "Worksheet field changed"
            );
        }
        !changes.is_empty()
    }

    /// Schedule an upload when the worksheet is missing or out of date.
    /// Returns whether the worksheet was updated.
    pub fn create(&self, worksheet: &Worksheet, state: &RunState, deferred: &mut DeferredQueue) -> bool {
        if !self.enabled {
            tracing::info!(
                "Doing nothing for worksheet[{}] because convergence is disabled",
                worksheet.name
            );
            return false;
        }

        let exists = state
            .worksheet(&worksheet.name)
            .map(|ws| ws.exists)
            .unwrap_or(false);

        if !exists || self.any_payload_changes(worksheet, state) {
            deferred.notify(DeferredAction::Upload {
                worksheet: worksheet.name.clone(),
            });
            return true;
        }
        false
    }

    /// Push the desired payload: edit when the worksheet exists, create
    /// otherwise. Exactly one API call.
    pub async fn upload(&self, worksheet: &Worksheet, state: &mut RunState) -> Result<Option<UploadRecord>> {
        if !self.enabled {
            tracing::info!(
                "Doing nothing for worksheet[{}] because convergence is disabled",
                worksheet.name
            );
            return Ok(None);
        }

        let Some(ws) = state.worksheet_mut(&worksheet.name) else {
            return Ok(None);
        };
        let payload = Value::Object(ws.desired.clone());
        tracing::debug!(
            worksheet = %worksheet.name,
            "About to upload worksheet, have payload:\n{}",
            serde_json::to_string_pretty(&payload).unwrap_or_default()
        );

        let existing_id = if ws.exists { ws.id.clone() } else { None };
        let record = match existing_id {
            Some(id) => {
                tracing::info!(worksheet = %worksheet.name, %id, "Worksheet upload: EDIT mode");
                self.api.edit_worksheet(&id, &payload).await?;
                UploadRecord {
                    worksheet: worksheet.name.clone(),
                    mode: UploadMode::Edit,
                    id,
                }
            }
            None => {
                tracing::info!(worksheet = %worksheet.name, "Worksheet upload: CREATE mode");
                let id = self.api.create_worksheet(&payload).await?;
                ws.id = Some(id.clone());
                ws.exists = true;
                UploadRecord {
                    worksheet: worksheet.name.clone(),
                    mode: UploadMode::Create,
                    id,
                }
            }
        };
        Ok(Some(record))
    }
}

fn into_object(payload: Value) -> Result<Map<String, Value>> {
    match payload {
        Value::Object(map) => Ok(map),
        other => Err(ApiError::Decode(format!("expected a worksheet object, got {}", other)).into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::worksheet_api::fake::{ApiCall, FakeWorksheetApi};
    use serde_json::json;

    fn existing_api() -> FakeWorksheetApi {
        FakeWorksheetApi::new().with_worksheet(
            "101",
            json!({
                "title": "Web Servers",
                "tags": ["team:web", "env:prod"],
                "graphs": [{"check_id": "1", "metric_name": "cpu"}],
                "notes": "server-side field"
            }),
        )
    }

    #[tokio::test]
    async fn test_title_lookup_adopts_single_match() {
        let api = existing_api();
        let reconciler = WorksheetReconciler::new(&api, true);
        let worksheet = Worksheet::new("Web Servers").with_tags(["env:prod", "team:web"]);
        let mut state = RunState::default();

        reconciler.load(&worksheet, &mut state).await.unwrap();

        let ws = state.worksheet("Web Servers").unwrap();
        assert!(ws.exists);
        assert_eq!(ws.id, Some(WorksheetId::from("101")));
        assert_eq!(ws.desired["notes"], json!("server-side field"));
        assert_eq!(ws.desired["graphs"], json!([{"check_id": "1", "metric_name": "cpu"}]));
        assert_eq!(ws.desired["tags"], json!(["env:prod", "team:web"]));
        assert!(!reconciler.any_payload_changes(&worksheet, &state));
    }

    #[tokio::test]
    async fn test_title_lookup_without_match_starts_empty() {
        let api = FakeWorksheetApi::new();
        let reconciler = WorksheetReconciler::new(&api, true);
        let worksheet = Worksheet::new("Fresh").with_tags(["a"]);
        let mut state = RunState::default();

        reconciler.load(&worksheet, &mut state).await.unwrap();

        let ws = state.worksheet("Fresh").unwrap();
        assert!(!ws.exists);
        assert_eq!(ws.id, None);
        assert_eq!(
            Value::Object(ws.desired.clone()),
            json!({"graphs": [], "title": "Fresh", "tags": ["a"]})
        );
    }

    #[tokio::test]
    async fn test_ambiguous_title_fails_naming_ids() {
        let api = FakeWorksheetApi::new()
            .with_worksheet("101", json!({"title": "Dup"}))
            .with_worksheet("102", json!({"title": "Dup"}));
        let reconciler = WorksheetReconciler::new(&api, true);
        let mut state = RunState::default();

        let err = reconciler
            .load(&Worksheet::new("Dup"), &mut state)
            .await
            .unwrap_err();

        match err {
            ConvergeError::AmbiguousWorksheetTitle { title, ids } => {
                assert_eq!(title, "Dup");
                assert_eq!(ids, vec![WorksheetId::from("101"), WorksheetId::from("102")]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_explicit_id_must_exist() {
        let api = FakeWorksheetApi::new();
        let reconciler = WorksheetReconciler::new(&api, true);
        let mut state = RunState::default();

        let err = reconciler
            .load(&Worksheet::new("W").with_id("999"), &mut state)
            .await
            .unwrap_err();

        assert!(matches!(err, ConvergeError::WorksheetIdNotFound { id } if id.0 == "999"));
    }

    #[tokio::test]
    async fn test_explicit_id_skips_title_search() {
        let api = existing_api();
        let reconciler = WorksheetReconciler::new(&api, true);
        let mut state = RunState::default();

        reconciler
            .load(&Worksheet::new("Renamed").with_id("101"), &mut state)
            .await
            .unwrap();

        assert_eq!(api.calls(), vec![ApiCall::Get(WorksheetId::from("101"))]);
        assert!(reconciler.any_payload_changes(&Worksheet::new("Renamed").with_id("101"), &state));
    }

    #[tokio::test]
    async fn test_load_fetches_once_per_pass() {
        let api = existing_api();
        let reconciler = WorksheetReconciler::new(&api, true);
        let worksheet = Worksheet::new("Web Servers");
        let mut state = RunState::default();

        reconciler.load(&worksheet, &mut state).await.unwrap();
        reconciler.load(&worksheet, &mut state).await.unwrap();

        assert_eq!(api.calls().len(), 2); // one find, one get
    }

    #[tokio::test]
    async fn test_create_schedules_single_upload_for_changed_tags() {
        let api = existing_api();
        let reconciler = WorksheetReconciler::new(&api, true);
        let worksheet = Worksheet::new("Web Servers").with_tags(["team:web"]);
        let mut state = RunState::default();
        let mut deferred = DeferredQueue::default();

        reconciler.load(&worksheet, &mut state).await.unwrap();
        assert!(reconciler.create(&worksheet, &state, &mut deferred));
        assert!(reconciler.create(&worksheet, &state, &mut deferred));

        assert_eq!(deferred.len(), 1);
    }

    #[tokio::test]
    async fn test_unchanged_worksheet_schedules_nothing() {
        let api = existing_api();
        let reconciler = WorksheetReconciler::new(&api, true);
        let worksheet = Worksheet::new("Web Servers").with_tags(["team:web", "env:prod"]);
        let mut state = RunState::default();
        let mut deferred = DeferredQueue::default();

        reconciler.load(&worksheet, &mut state).await.unwrap();

        assert!(!reconciler.create(&worksheet, &state, &mut deferred));
        assert!(deferred.is_empty());
    }

    #[tokio::test]
    async fn test_upload_edits_existing_and_creates_new() {
        let api = existing_api();
        let reconciler = WorksheetReconciler::new(&api, true);
        let existing = Worksheet::new("Web Servers").with_tags(["new"]);
        let fresh = Worksheet::new("Fresh");
        let mut state = RunState::default();

        reconciler.load(&existing, &mut state).await.unwrap();
        reconciler.load(&fresh, &mut state).await.unwrap();
        api.clear_calls();

        let edit = reconciler.upload(&existing, &mut state).await.unwrap().unwrap();
        assert_eq!(edit.mode, UploadMode::Edit);
        assert_eq!(edit.id, WorksheetId::from("101"));

        let create = reconciler.upload(&fresh, &mut state).await.unwrap().unwrap();
        assert_eq!(create.mode, UploadMode::Create);
        assert_ne!(create.id, WorksheetId::from("101"));
        assert_eq!(state.worksheet("Fresh").unwrap().id, Some(create.id.clone()));

        assert_eq!(api.writes().len(), 2);
        let stored = api.stored("101").unwrap();
        assert_eq!(stored["title"], json!("Web Servers"));
        assert_eq!(stored["tags"], json!(["new"]));
        assert_eq!(api.stored(&create.id.0).unwrap()["title"], json!("Fresh"));
    }

    #[tokio::test]
    async fn test_disabled_makes_no_calls() {
        let api = existing_api();
        let reconciler = WorksheetReconciler::new(&api, false);
        let worksheet = Worksheet::new("Web Servers").with_id("does-not-exist");
        let mut state = RunState::default();
        let mut deferred = DeferredQueue::default();

        reconciler.load(&worksheet, &mut state).await.unwrap();
        assert!(!reconciler.create(&worksheet, &state, &mut deferred));
        assert!(reconciler.upload(&worksheet, &mut state).await.unwrap().is_none());

        assert!(api.calls().is_empty());
        assert!(deferred.is_empty());
    }
}
