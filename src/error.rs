// Error taxonomy for a convergence pass
use crate::application::worksheet_api::ApiError;
use crate::domain::worksheet::WorksheetId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConvergeError {
    #[error(
        "worksheet ID {id} does not appear to exist. Don't specify the ID if you are trying to create it"
    )]
    WorksheetIdNotFound { id: WorksheetId },

    #[error(
        "more than one worksheet exists with title '{title}' - saw {}. You need to specify which ID you are referring to",
        join_ids(.ids)
    )]
    AmbiguousWorksheetTitle { title: String, ids: Vec<WorksheetId> },

    #[error("graph '{graph}' references worksheet '{worksheet}', which is not declared")]
    MissingWorksheet { graph: String, worksheet: String },

    #[error("graph '{graph}' references metric '{metric}', which is not declared")]
    MissingMetric { graph: String, metric: String },

    #[error("graph '{graph}' is invalid: {reason}")]
    InvalidGraph { graph: String, reason: String },

    #[error("{kind} '{name}' is declared more than once")]
    DuplicateResource { kind: &'static str, name: String },

    #[error("graph '{graph}' recorded index {index} but its worksheet only has {len} graphs")]
    StaleGraphIndex { graph: String, index: usize, len: usize },

    #[error("resource dependencies form a cycle")]
    DependencyCycle,

    #[error(transparent)]
    Api(#[from] ApiError),
}

fn join_ids(ids: &[WorksheetId]) -> String {
    ids.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

pub type Result<T> = std::result::Result<T, ConvergeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ambiguous_title_names_every_id() {
        let err = ConvergeError::AmbiguousWorksheetTitle {
            title: "Web".to_string(),
            ids: vec![WorksheetId::from("101"), WorksheetId::from("102")],
        };
        let message = err.to_string();
        assert!(message.contains("'Web'"));
        assert!(message.contains("101, 102"));
    }
}
