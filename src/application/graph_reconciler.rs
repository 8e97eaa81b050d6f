// Worksheet graph reconciler - places one declared graph inside its worksheet
use crate::application::converge_service::{DeferredAction, DeferredQueue};
use crate::application::plan::ResourcePlan;
use crate::application::run_state::{GraphState, RunState};
use crate::application::worksheet_reconciler::WorksheetReconciler;
use crate::domain::graph::{self, GraphIdentity, GraphSource, IdentityKey, WorksheetGraph};
use crate::domain::payload;
use crate::error::{ConvergeError, Result};
use serde_json::Value;

pub struct GraphReconciler<'a> {
    worksheets: &'a WorksheetReconciler<'a>,
    plan: &'a ResourcePlan,
    enabled: bool,
}

impl<'a> GraphReconciler<'a> {
    pub fn new(worksheets: &'a WorksheetReconciler<'a>, plan: &'a ResourcePlan, enabled: bool) -> Self {
        Self {
            worksheets,
            plan,
            enabled,
        }
    }

    /// Resolve the graph's dependencies and find it in its worksheet's
    /// current graph list. Runs at most once per pass.
    pub async fn load(&self, graph: &WorksheetGraph, state: &mut RunState) -> Result<()> {
        if !self.enabled {
            if state.graph(&graph.name).is_none() {
                state.insert_graph(&graph.name, GraphState::default());
            }
            return Ok(());
        }
        if state.graph(&graph.name).is_some() {
            return Ok(());
        }

        let worksheet = self
            .plan
            .worksheet(&graph.worksheet)
            .ok_or_else(|| ConvergeError::MissingWorksheet {
                graph: graph.name.clone(),
                worksheet: graph.worksheet.clone(),
            })?;
        self.worksheets.load(worksheet, state).await?;
        let worksheet_exists = state
            .worksheet(&worksheet.name)
            .map(|ws| ws.exists)
            .unwrap_or(false);

        let (identity, dependencies_exist) = match &graph.source {
            GraphSource::Metric { metric, broker } => {
                let metric = self
                    .plan
                    .metric(metric)
                    .ok_or_else(|| ConvergeError::MissingMetric {
                        graph: graph.name.clone(),
                        metric: metric.clone(),
                    })?;
                let identity = GraphIdentity {
                    check_id: metric.check_id(broker).map(str::to_string),
                    key: IdentityKey::MetricName(metric.metric_name.clone()),
                };
                (identity, worksheet_exists && metric.exists_on(broker))
            }
            GraphSource::Formula {
                data_formula,
                check_id,
            } => {
                let identity = GraphIdentity {
                    check_id: check_id.clone(),
                    key: IdentityKey::DataFormula(data_formula.clone()),
                };
                (identity, worksheet_exists)
            }
        };

        // A metric without a check on this broker is matched by its null
        // check id, so an earlier unresolved append is found again.
        let index = if worksheet_exists {
            state
                .worksheet(&worksheet.name)
                .and_then(|ws| graph::match_index(ws.current_graphs(), &identity))
        } else {
            None
        };
        tracing::debug!(graph = %graph.name, ?index, dependencies_exist, "Loaded worksheet graph");

        state.insert_graph(
            &graph.name,
            GraphState {
                dependencies_exist,
                exists: index.is_some(),
                index,
                identity: Some(identity),
            },
        );
        Ok(())
    }

    /// Compare the existing entry at the matched index with the payload this
    /// graph would write. Only meaningful once the graph is known to exist.
    pub fn any_payload_changes(&self, graph: &WorksheetGraph, state: &RunState) -> Result<bool> {
        let (Some(graph_state), Some(ws)) = (state.graph(&graph.name), state.worksheet(&graph.worksheet))
        else {
            return Ok(false);
        };
        let (Some(index), Some(identity)) = (graph_state.index, graph_state.identity.as_ref()) else {
            return Ok(false);
        };

        let current = ws.current_graphs();
        let existing = current.get(index).ok_or_else(|| ConvergeError::StaleGraphIndex {
            graph: graph.name.clone(),
            index,
            len: current.len(),
        })?;

        let changes = graph::changed_fields(graph.payload_fields(), existing, &graph.to_payload(identity));
        for change in &changes {
            tracing::debug!(
                graph = %graph.name,
                field = change.field,
                old = %change.old,
                new = %change.new,
                "Worksheet graph field changed"
            );
        }
        Ok(!changes.is_empty())
    }

    /// Replace the graph in place when it changed, append it when it is new,
    /// and in either case ask the worksheet for a deferred upload.
    pub fn create(
        &self,
        graph: &WorksheetGraph,
        state: &mut RunState,
        deferred: &mut DeferredQueue,
    ) -> Result<bool> {
        if !self.enabled {
            tracing::info!(
                "Doing nothing for worksheet_graph[{}] because convergence is disabled",
                graph.name
            );
            return Ok(false);
        }

        let Some(graph_state) = state.graph(&graph.name).cloned() else {
            return Ok(false);
        };
        let Some(identity) = graph_state.identity.as_ref() else {
            return Ok(false);
        };

        let replace_at = match graph_state.index {
            Some(index) if graph_state.exists => {
                if !self.any_payload_changes(graph, state)? {
                    return Ok(false);
                }
                Some(index)
            }
            _ => None,
        };

        let mut new_payload = graph.to_payload(identity);
        let Some(ws) = state.worksheet_mut(&graph.worksheet) else {
            return Ok(false);
        };
        let graphs = payload::graphs_mut(&mut ws.desired);

        match replace_at {
            Some(index) => {
                let len = graphs.len();
                let slot = graphs.get_mut(index).ok_or_else(|| ConvergeError::StaleGraphIndex {
                    graph: graph.name.clone(),
                    index,
                    len,
                })?;
                tracing::info!(graph = %graph.name, index, "Replacing graph in worksheet");
                graph::keep_check_id_type(&mut new_payload, slot);
                *slot = Value::Object(new_payload);
            }
            None => {
                // The check id may still be unknown here; the worksheet
                // upload runs after every dependency has converged.
                if !graph_state.dependencies_exist {
                    tracing::debug!(
                        graph = %graph.name,
                        check_id = ?identity.check_id,
                        "Appending graph whose dependencies are not all remote yet"
                    );
                }
                tracing::info!(graph = %graph.name, "Appending graph to worksheet");
                graphs.push(Value::Object(new_payload));
            }
        }

        deferred.notify(DeferredAction::Upload {
            worksheet: graph.worksheet.clone(),
        });
        Ok(true)
    }
}
