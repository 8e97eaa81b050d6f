// Worksheet domain model
use super::payload::{FieldChange, value_to_string};
use serde_json::{Map, Value};
use std::fmt;

/// Server-assigned worksheet identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WorksheetId(pub String);

impl fmt::Display for WorksheetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for WorksheetId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for WorksheetId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Declared (desired) worksheet.
#[derive(Debug, Clone)]
pub struct Worksheet {
    pub name: String,
    pub title: String,
    pub id: Option<WorksheetId>,
    pub tags: Vec<String>,
}

impl Worksheet {
    pub fn new(title: impl Into<String>) -> Self {
        let title = title.into();
        Self {
            name: title.clone(),
            title,
            id: None,
            tags: Vec::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_id(mut self, id: impl Into<WorksheetId>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Copy declared attributes onto a desired payload. Tags replace whatever
    /// the payload held; graphs are left to the graph reconciler.
    pub fn project_onto(&self, payload: &mut Map<String, Value>) {
        payload.insert("title".to_string(), Value::String(self.title.clone()));
        payload.insert(
            "tags".to_string(),
            Value::Array(self.tags.iter().cloned().map(Value::String).collect()),
        );
    }
}

/// Field-level differences between the current and desired worksheet
/// payloads. Graphs are not compared here.
pub fn changed_fields(current: &Map<String, Value>, desired: &Map<String, Value>) -> Vec<FieldChange> {
    let mut changes = Vec::new();

    for field in ["title"] {
        let old = value_to_string(current.get(field));
        let new = value_to_string(desired.get(field));
        if old != new {
            changes.push(FieldChange {
                field,
                old,
                new,
            });
        }
    }

    let old_tags = sorted_tags(current.get("tags"));
    let new_tags = sorted_tags(desired.get("tags"));
    if old_tags != new_tags {
        changes.push(FieldChange {
            field: "tags",
            old: old_tags.join(","),
            new: new_tags.join(","),
        });
    }

    changes
}

fn sorted_tags(tags: Option<&Value>) -> Vec<String> {
    let mut tags: Vec<String> = tags
        .and_then(Value::as_array)
        .map(|list| list.iter().map(|t| value_to_string(Some(t))).collect())
        .unwrap_or_default();
    tags.sort();
    tags
}
