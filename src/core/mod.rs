pub mod auth;
pub mod build;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod orchestrator;
pub mod parameter;
pub mod store;
pub mod task;
pub mod template;
pub mod terminal;
pub mod workspace;
