//! Permit Desk: LLM email classification and routing for a parking-permit
//! help desk.

pub mod analytics;
pub mod api;
pub mod classify;
pub mod config;
pub mod desk;
pub mod error;
pub mod llm;
pub mod pipeline;
pub mod routing;
pub mod store;
pub mod tagger;
