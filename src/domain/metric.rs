// Metric domain model - the dependency a metric graph points at
use std::collections::HashMap;

/// A metric declared elsewhere in the run. Its check ids are keyed by broker,
/// since each broker runs its own copy of a check.
#[derive(Debug, Clone)]
pub struct Metric {
    pub name: String,
    pub metric_name: String,
    pub check_ids: HashMap<String, String>,
}

impl Metric {
    pub fn new(name: impl Into<String>, metric_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            metric_name: metric_name.into(),
            check_ids: HashMap::new(),
        }
    }

    pub fn with_check(mut self, broker: impl Into<String>, check_id: impl Into<String>) -> Self {
        self.check_ids.insert(broker.into(), check_id.into());
        self
    }

    pub fn check_id(&self, broker: &str) -> Option<&str> {
        self.check_ids.get(broker).map(String::as_str)
    }

    /// The metric exists remotely on a broker once its check has an id there.
    pub fn exists_on(&self, broker: &str) -> bool {
        self.check_id(broker).is_some()
    }
}
