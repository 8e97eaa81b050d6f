// Resource plan - the declared resources and the order they converge in
use crate::domain::graph::{GraphSource, WorksheetGraph};
use crate::domain::metric::Metric;
use crate::domain::worksheet::Worksheet;
use crate::error::{ConvergeError, Result};
use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashSet};

/// One unit of work in a convergence pass.
#[derive(Debug, Clone, Copy)]
pub enum Task<'a> {
    Worksheet(&'a Worksheet),
    Graph(&'a WorksheetGraph),
}

impl Task<'_> {
    pub fn label(&self) -> String {
        match self {
            Task::Worksheet(w) => format!("worksheet[{}]", w.name),
            Task::Graph(g) => format!("worksheet_graph[{}]", g.name),
        }
    }
}

/// Validated declarations for one run. References between resources are
/// checked when a graph loads, so a disabled run never fails on them.
#[derive(Debug, Clone)]
pub struct ResourcePlan {
    metrics: Vec<Metric>,
    worksheets: Vec<Worksheet>,
    graphs: Vec<WorksheetGraph>,
}

impl ResourcePlan {
    pub fn new(metrics: Vec<Metric>, worksheets: Vec<Worksheet>, graphs: Vec<WorksheetGraph>) -> Result<Self> {
        ensure_unique("metric", metrics.iter().map(|m| m.name.as_str()))?;
        ensure_unique("worksheet", worksheets.iter().map(|w| w.name.as_str()))?;
        ensure_unique("worksheet_graph", graphs.iter().map(|g| g.name.as_str()))?;

        for graph in &graphs {
            validate_graph(graph)?;
        }

        Ok(Self {
            metrics,
            worksheets,
            graphs,
        })
    }

    pub fn metric(&self, name: &str) -> Option<&Metric> {
        self.metrics.iter().find(|m| m.name == name)
    }

    pub fn worksheet(&self, name: &str) -> Option<&Worksheet> {
        self.worksheets.iter().find(|w| w.name == name)
    }

    pub fn worksheets(&self) -> &[Worksheet] {
        &self.worksheets
    }

    pub fn graphs(&self) -> &[WorksheetGraph] {
        &self.graphs
    }

    /// Tasks in dependency order: a worksheet always precedes its graphs.
    /// Among tasks that do not depend on each other, declaration order is
    /// kept, so graphs land in their worksheet in the order they were
    /// declared.
    pub fn execution_order(&self) -> Result<Vec<Task<'_>>> {
        let mut tasks: DiGraph<Task<'_>, ()> = DiGraph::new();

        let worksheet_nodes: Vec<(&str, NodeIndex)> = self
            .worksheets
            .iter()
            .map(|w| (w.name.as_str(), tasks.add_node(Task::Worksheet(w))))
            .collect();

        for graph in &self.graphs {
            let node = tasks.add_node(Task::Graph(graph));
            if let Some((_, parent)) = worksheet_nodes.iter().find(|(name, _)| *name == graph.worksheet) {
                tasks.add_edge(*parent, node, ());
            }
        }

        // Kahn's algorithm, always taking the earliest declared ready task.
        let mut in_degree: Vec<usize> = tasks
            .node_indices()
            .map(|n| tasks.neighbors_directed(n, Direction::Incoming).count())
            .collect();
        let mut ready: BinaryHeap<Reverse<NodeIndex>> = tasks
            .node_indices()
            .filter(|n| in_degree[n.index()] == 0)
            .map(Reverse)
            .collect();

        let mut order = Vec::with_capacity(tasks.node_count());
        while let Some(Reverse(node)) = ready.pop() {
            order.push(tasks[node]);
            for next in tasks.neighbors_directed(node, Direction::Outgoing) {
                in_degree[next.index()] -= 1;
                if in_degree[next.index()] == 0 {
                    ready.push(Reverse(next));
                }
            }
        }

        if order.len() != tasks.node_count() {
            return Err(ConvergeError::DependencyCycle);
        }
        Ok(order)
    }
}

fn ensure_unique<'a>(kind: &'static str, names: impl Iterator<Item = &'a str>) -> Result<()> {
    let mut seen = HashSet::new();
    for name in names {
        if !seen.insert(name) {
            return Err(ConvergeError::DuplicateResource {
                kind,
                name: name.to_string(),
            });
        }
    }
    Ok(())
}

fn validate_graph(graph: &WorksheetGraph) -> Result<()> {
    let invalid = |reason: &str| ConvergeError::InvalidGraph {
        graph: graph.name.clone(),
        reason: reason.to_string(),
    };

    if graph.worksheet.is_empty() {
        return Err(invalid("a worksheet reference is required"));
    }
    match &graph.source {
        GraphSource::Metric { metric, broker } => {
            if metric.is_empty() {
                return Err(invalid("metric must not be empty"));
            }
            if broker.is_empty() {
                return Err(invalid("a metric graph needs a broker"));
            }
        }
        GraphSource::Formula { data_formula, .. } => {
            if data_formula.is_empty() {
                return Err(invalid("data_formula must not be empty"));
            }
        }
    }
    if let Some(alpha) = graph.alpha {
        if !(0.0..=1.0).contains(&alpha) {
            return Err(invalid("alpha must be between 0 and 1"));
        }
    }
    Ok(())
}
