pub mod catalog;
pub mod cli;
pub mod commands;
pub mod config;
pub mod health;
pub mod identity;
pub mod lifecycle;
pub mod logging;
pub mod metrics;
pub mod notify;
pub mod orders;
pub mod resilience;
pub mod runtime;
pub mod session;
pub mod transport;
pub mod types;
