pub mod config;
pub mod script;
pub mod telemetry;
