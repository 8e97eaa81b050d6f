use crate::application::plan::ResourcePlan;
use crate::domain::graph::{DEFAULT_METRIC_TYPE, WorksheetGraph};
use crate::domain::metric::Metric;
use crate::domain::worksheet::Worksheet;
use crate::error::ConvergeError;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

const DEFAULT_CONFIG_PATH: &str = "config/circonus";
const DEFAULT_RESOURCES_PATH: &str = "config/worksheets";

#[derive(Debug, Deserialize, Clone)]
pub struct CirconusConfig {
    /// Master switch. When false every action is a logged no-op.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub api: ApiSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ApiSettings {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    pub token: String,
    #[serde(default = "default_app_name")]
    pub app_name: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl ApiSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ResourcesConfig {
    #[serde(default)]
    pub metrics: Vec<MetricConfig>,
    #[serde(default)]
    pub worksheets: Vec<WorksheetConfig>,
    #[serde(default)]
    pub graphs: Vec<GraphConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MetricConfig {
    pub name: String,
    pub metric_name: String,
    /// Check id per broker, for checks that already exist.
    #[serde(default)]
    pub check_ids: HashMap<String, String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WorksheetConfig {
    pub title: String,
    pub name: Option<String>,
    pub id: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GraphConfig {
    pub name: String,
    pub worksheet: String,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub metric: Option<String>,
    pub broker: Option<String>,
    pub data_formula: Option<String>,
    pub check_id: Option<String>,
    pub color: Option<String>,
    pub alpha: Option<f64>,
}

impl ResourcesConfig {
    pub fn into_plan(self) -> Result<ResourcePlan, ConvergeError> {
        let metrics = self
            .metrics
            .into_iter()
            .map(|m| {
                m.check_ids
                    .into_iter()
                    .fold(Metric::new(m.name, m.metric_name), |metric, (broker, check_id)| {
                        metric.with_check(broker, check_id)
                    })
            })
            .collect();

        let worksheets = self
            .worksheets
            .into_iter()
            .map(|w| {
                let mut worksheet = Worksheet::new(w.title).with_tags(w.tags);
                if let Some(name) = w.name {
                    worksheet = worksheet.with_name(name);
                }
                if let Some(id) = w.id {
                    worksheet = worksheet.with_id(id);
                }
                worksheet
            })
            .collect();

        let graphs = self
            .graphs
            .into_iter()
            .map(GraphConfig::into_graph)
            .collect::<Result<Vec<_>, _>>()?;

        ResourcePlan::new(metrics, worksheets, graphs)
    }
}

impl GraphConfig {
    fn into_graph(self) -> Result<WorksheetGraph, ConvergeError> {
        let invalid = |name: &str, reason: &str| ConvergeError::InvalidGraph {
            graph: name.to_string(),
            reason: reason.to_string(),
        };

        let mut graph = match (self.metric, self.data_formula) {
            (Some(metric), None) => {
                let broker = self
                    .broker
                    .ok_or_else(|| invalid(&self.name, "a metric graph needs a broker"))?;
                if self.check_id.is_some() {
                    return Err(invalid(
                        &self.name,
                        "check_id comes from the metric; only formula graphs declare it",
                    ));
                }
                WorksheetGraph::metric(&self.name, &self.worksheet, metric, broker)
            }
            (None, Some(formula)) => {
                let mut graph = WorksheetGraph::formula(&self.name, &self.worksheet, formula);
                if let Some(check_id) = self.check_id {
                    graph = graph.with_check_id(check_id);
                }
                graph
            }
            (Some(_), Some(_)) => {
                return Err(invalid(&self.name, "declare either metric or data_formula, not both"));
            }
            (None, None) => {
                return Err(invalid(&self.name, "one of metric or data_formula is required"));
            }
        };

        graph.metric_type = self.kind.unwrap_or_else(|| DEFAULT_METRIC_TYPE.to_string());
        if let Some(color) = self.color {
            graph = graph.with_color(color);
        }
        if let Some(alpha) = self.alpha {
            graph = graph.with_alpha(alpha);
        }
        Ok(graph)
    }
}

fn default_enabled() -> bool {
    true
}

fn default_base_url() -> String {
    "https://api.circonus.com/v2".to_string()
}

fn default_app_name() -> String {
    "worksheet-converge".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

/// API settings from `config/circonus` (or `$CIRCONUS_CONFIG`), overridable
/// with `CIRCONUS__API__TOKEN`-style environment variables.
pub fn load_circonus_config() -> anyhow::Result<CirconusConfig> {
    let path = std::env::var("CIRCONUS_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let settings = config::Config::builder()
        .add_source(config::File::with_name(&path))
        .add_source(
            config::Environment::with_prefix("CIRCONUS")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    Ok(settings.try_deserialize()?)
}

/// Declared metrics, worksheets and graphs from `config/worksheets` (or
/// `$CIRCONUS_RESOURCES`).
pub fn load_resources_config() -> anyhow::Result<ResourcesConfig> {
    let path = std::env::var("CIRCONUS_RESOURCES").unwrap_or_else(|_| DEFAULT_RESOURCES_PATH.to_string());
    let settings = config::Config::builder()
        .add_source(config::File::with_name(&path))
        .build()?;

    Ok(settings.try_deserialize()?)
}
