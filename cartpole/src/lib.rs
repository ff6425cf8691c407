pub mod checkpoint;
pub mod cli;
pub mod commands;
pub mod method;
pub mod runner;
pub mod settings;
pub mod telemetry;
