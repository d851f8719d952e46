pub mod bus;
pub mod client;
pub mod config;
pub mod connection;
pub mod intent;
pub mod messages;
pub mod metadata;
pub mod orchestrator;
pub mod proof;
pub mod reporting;
pub mod selection;
pub mod upload;
pub mod verification;
