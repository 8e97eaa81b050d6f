// Worksheet graph domain model
use super::payload::{FieldChange, is_blank, value_to_string};
use serde_json::{Map, Value};

/// Opacity the server should apply when none is given. The server sometimes
/// hands `alpha` back as null, so null is treated the same as unset.
pub const DEFAULT_ALPHA: f64 = 0.3;

pub const DEFAULT_METRIC_TYPE: &str = "numeric";

#[derive(Debug, Clone, PartialEq)]
pub enum GraphSource {
    /// Plots a metric collected by a check on the given broker.
    Metric { metric: String, broker: String },
    /// Plots a formula, optionally anchored to a check.
    Formula {
        data_formula: String,
        check_id: Option<String>,
    },
}

/// Declared (desired) graph inside a worksheet.
#[derive(Debug, Clone)]
pub struct WorksheetGraph {
    pub name: String,
    pub worksheet: String,
    pub source: GraphSource,
    pub metric_type: String,
    pub color: Option<String>,
    pub alpha: Option<f64>,
}

impl WorksheetGraph {
    pub fn metric(
        name: impl Into<String>,
        worksheet: impl Into<String>,
        metric: impl Into<String>,
        broker: impl Into<String>,
    ) -> Self {
        Self::with_source(
            name,
            worksheet,
            GraphSource::Metric {
                metric: metric.into(),
                broker: broker.into(),
            },
        )
    }

    pub fn formula(
        name: impl Into<String>,
        worksheet: impl Into<String>,
        data_formula: impl Into<String>,
    ) -> Self {
        Self::with_source(
            name,
            worksheet,
            GraphSource::Formula {
                data_formula: data_formula.into(),
                check_id: None,
            },
        )
    }

    fn with_source(name: impl Into<String>, worksheet: impl Into<String>, source: GraphSource) -> Self {
        Self {
            name: name.into(),
            worksheet: worksheet.into(),
            source,
            metric_type: DEFAULT_METRIC_TYPE.to_string(),
            color: None,
            alpha: None,
        }
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }

    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = Some(alpha);
        self
    }

    /// Anchor a formula graph to a check. No effect on metric graphs, whose
    /// check comes from the metric.
    pub fn with_check_id(mut self, id: impl Into<String>) -> Self {
        if let GraphSource::Formula { check_id, .. } = &mut self.source {
            *check_id = Some(id.into());
        }
        self
    }

    /// Fields compared when deciding whether an existing entry needs rewriting.
    pub fn payload_fields(&self) -> &'static [&'static str] {
        match self.source {
            GraphSource::Metric { .. } => &["check_id", "metric_name", "metric_type", "color", "alpha"],
            GraphSource::Formula { .. } => &["check_id", "data_formula", "metric_type", "color", "alpha"],
        }
    }

    /// Build the payload entry for this graph. `color` and `alpha` are left
    /// out when undeclared so the server can fill in its defaults.
    pub fn to_payload(&self, identity: &GraphIdentity) -> Map<String, Value> {
        let mut payload = Map::new();
        payload.insert(
            "check_id".to_string(),
            identity
                .check_id
                .clone()
                .map(Value::String)
                .unwrap_or(Value::Null),
        );
        match &identity.key {
            IdentityKey::MetricName(name) => {
                payload.insert("metric_name".to_string(), Value::String(name.clone()));
            }
            IdentityKey::DataFormula(formula) => {
                payload.insert("data_formula".to_string(), Value::String(formula.clone()));
            }
        }
        payload.insert(
            "metric_type".to_string(),
            Value::String(self.metric_type.clone()),
        );
        if let Some(color) = &self.color {
            payload.insert("color".to_string(), Value::String(color.clone()));
        }
        if let Some(alpha) = self.alpha {
            payload.insert("alpha".to_string(), Value::from(alpha));
        }
        payload
    }
}

/// The fields that identify a graph inside its worksheet's graph list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphIdentity {
    pub check_id: Option<String>,
    pub key: IdentityKey,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityKey {
    MetricName(String),
    DataFormula(String),
}

impl GraphIdentity {
    /// Compare identity fields only; colors and the like may differ.
    pub fn matches(&self, entry: &Value) -> bool {
        let check_id = self.check_id.as_deref().unwrap_or_default();
        if value_to_string(entry.get("check_id")) != check_id {
            return false;
        }
        match &self.key {
            IdentityKey::MetricName(name) => {
                entry.get("metric_name").and_then(Value::as_str) == Some(name.as_str())
            }
            IdentityKey::DataFormula(formula) => {
                entry.get("data_formula").and_then(Value::as_str) == Some(formula.as_str())
            }
        }
    }
}

/// Position of the first entry matching `identity`, in server order.
pub fn match_index(graphs: &[Value], identity: &GraphIdentity) -> Option<usize> {
    graphs.iter().position(|entry| {
        let matched = identity.matches(entry);
        tracing::debug!(?entry, ?identity, matched, "Examining existing graph");
        matched
    })
}

/// Fill in the values the server assigns on its own, so they do not count
/// as changes: color and alpha fall back to what the server holds, and an
/// alpha that is still missing or null becomes [`DEFAULT_ALPHA`].
pub fn apply_server_defaults(desired: &mut Map<String, Value>, existing: &Value) {
    if is_blank(desired.get("color")) {
        match existing.get("color") {
            Some(color) => desired.insert("color".to_string(), color.clone()),
            None => desired.remove("color"),
        };
    }

    let explicitly_null = matches!(desired.get("alpha"), Some(Value::Null));
    if !explicitly_null && is_blank(desired.get("alpha")) {
        if let Some(alpha) = existing.get("alpha") {
            desired.insert("alpha".to_string(), alpha.clone());
        }
    }
    if matches!(desired.get("alpha"), None | Some(Value::Null)) {
        desired.insert("alpha".to_string(), Value::from(DEFAULT_ALPHA));
    }
}

/// Keep the existing entry's `check_id` value when it names the same check,
/// so a server-numeric id is not rewritten as a string.
pub fn keep_check_id_type(desired: &mut Map<String, Value>, existing: &Value) {
    let Some(current) = existing.get("check_id") else {
        return;
    };
    if value_to_string(Some(current)) == value_to_string(desired.get("check_id")) {
        desired.insert("check_id".to_string(), current.clone());
    }
}

/// Fields whose stringified values differ between the existing entry and
/// the desired payload, after server defaults are applied.
pub fn changed_fields(
    fields: &[&'static str],
    existing: &Value,
    desired: &Map<String, Value>,
) -> Vec<FieldChange> {
    let mut desired = desired.clone();
    apply_server_defaults(&mut desired, existing);

    fields
        .iter()
        .filter_map(|&field| {
            let old = value_to_string(existing.get(field));
            let new = value_to_string(desired.get(field));
            (old != new).then_some(FieldChange { field, old, new })
        })
        .collect()
}
