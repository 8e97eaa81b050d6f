// Infrastructure layer - External dependencies and adapters
pub mod circonus_api;
pub mod config;
