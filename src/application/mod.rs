// Application layer - Reconcilers and the convergence pass that drives them
pub mod converge_service;
pub mod graph_reconciler;
pub mod plan;
pub mod run_state;
pub mod worksheet_api;
pub mod worksheet_reconciler;
