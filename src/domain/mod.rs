// Domain layer - Worksheets, their graphs, and the metrics graphs plot
pub mod graph;
pub mod metric;
pub mod payload;
pub mod worksheet;
