// Converge service - runs one convergence pass over a resource plan
use crate::application::graph_reconciler::GraphReconciler;
use crate::application::plan::{ResourcePlan, Task};
use crate::application::run_state::RunState;
use crate::application::worksheet_api::WorksheetApi;
use crate::application::worksheet_reconciler::{UploadRecord, WorksheetReconciler};
use crate::error::Result;
use std::sync::Arc;

/// Work postponed until every immediate action of the pass has run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeferredAction {
    Upload { worksheet: String },
}

/// Deferred actions in first-notification order. Notifying the same action
/// twice keeps a single entry, which is how several graph changes collapse
/// into one worksheet upload.
#[derive(Debug, Default)]
pub struct DeferredQueue {
    actions: Vec<DeferredAction>,
}

impl DeferredQueue {
    pub fn notify(&mut self, action: DeferredAction) {
        if !self.actions.contains(&action) {
            self.actions.push(action);
        }
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn drain(&mut self) -> Vec<DeferredAction> {
        std::mem::take(&mut self.actions)
    }
}

/// What a pass changed.
#[derive(Debug, Default, Clone)]
pub struct ConvergeReport {
    /// Labels of resources whose immediate action reported an update.
    pub updated: Vec<String>,
    pub uploads: Vec<UploadRecord>,
}

impl ConvergeReport {
    pub fn is_converged(&self) -> bool {
        self.updated.is_empty() && self.uploads.is_empty()
    }
}

#[derive(Clone)]
pub struct ConvergeService {
    api: Arc<dyn WorksheetApi>,
    enabled: bool,
}

impl ConvergeService {
    pub fn new(api: Arc<dyn WorksheetApi>, enabled: bool) -> Self {
        Self { api, enabled }
    }

    /// Load and create every resource in dependency order, then run the
    /// deferred uploads. Worksheet uploads therefore always see every graph
    /// change made during the pass.
    pub async fn converge(&self, plan: &ResourcePlan) -> Result<ConvergeReport> {
        let worksheets = WorksheetReconciler::new(self.api.as_ref(), self.enabled);
        let graphs = GraphReconciler::new(&worksheets, plan, self.enabled);
        let mut state = RunState::default();
        let mut deferred = DeferredQueue::default();
        let mut report = ConvergeReport::default();

        for task in plan.execution_order()? {
            let updated = match task {
                Task::Worksheet(worksheet) => {
                    worksheets.load(worksheet, &mut state).await?;
                    worksheets.create(worksheet, &state, &mut deferred)
                }
                Task::Graph(graph) => {
                    graphs.load(graph, &mut state).await?;
                    graphs.create(graph, &mut state, &mut deferred)?
                }
            };
            if updated {
                tracing::info!("{} updated", task.label());
                report.updated.push(task.label());
            }
        }

        if !deferred.is_empty() {
            tracing::debug!(pending = deferred.len(), "Running deferred actions");
        }
        for action in deferred.drain() {
            match action {
                DeferredAction::Upload { worksheet } => {
                    let Some(worksheet) = plan.worksheet(&worksheet) else {
                        continue;
                    };
                    if let Some(upload) = worksheets.upload(worksheet, &mut state).await? {
                        report.uploads.push(upload);
                    }
                }
            }
        }

        tracing::info!(
            updated = report.updated.len(),
            uploads = report.uploads.len(),
            "Convergence pass finished"
        );
        Ok(report)
    }
}
