pub mod agents;
pub mod analysis;
pub mod cache;
pub mod cli;
pub mod config;
pub mod doctor;
pub mod error;
pub mod normalizer;
pub mod profiles;
pub mod provider;
pub mod report;
pub mod retry;
pub mod server;
pub mod telemetry;
