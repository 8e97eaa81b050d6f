// Per-pass cache of current and desired state, keyed by resource name
use crate::domain::graph::GraphIdentity;
use crate::domain::payload;
use crate::domain::worksheet::WorksheetId;
use serde_json::{Map, Value};
use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct WorksheetState {
    pub id: Option<WorksheetId>,
    pub exists: bool,
    /// Payload as fetched from the server; `None` when the worksheet is new.
    pub current: Option<Map<String, Value>>,
    /// Payload that will be uploaded. Graph reconcilers edit its graph list.
    pub desired: Map<String, Value>,
}

impl WorksheetState {
    pub fn current_graphs(&self) -> &[Value] {
        self.current.as_ref().map(payload::graphs).unwrap_or(&[])
    }
}

#[derive(Debug, Clone, Default)]
pub struct GraphState {
    /// Parent worksheet (and metric, for metric graphs) exist remotely.
    pub dependencies_exist: bool,
    pub exists: bool,
    /// Position in the parent's graph list. Only valid for the current pass.
    pub index: Option<usize>,
    pub identity: Option<GraphIdentity>,
}

/// Filled once per resource by its `load`, read by everything after. Never
/// carried over between passes.
#[derive(Debug, Default)]
pub struct RunState {
    worksheets: HashMap<String, WorksheetState>,
    graphs: HashMap<String, GraphState>,
}

impl RunState {
    pub fn worksheet(&self, name: &str) -> Option<&WorksheetState> {
        self.worksheets.get(name)
    }

    pub fn worksheet_mut(&mut self, name: &str) -> Option<&mut WorksheetState> {
        self.worksheets.get_mut(name)
    }

    pub fn insert_worksheet(&mut self, name: &str, state: WorksheetState) {
        self.worksheets.insert(name.to_string(), state);
    }

    pub fn graph(&self, name: &str) -> Option<&GraphState> {
        self.graphs.get(name)
    }

    pub fn insert_graph(&mut self, name: &str, state: GraphState) {
        self.graphs.insert(name.to_string(), state);
    }
}
