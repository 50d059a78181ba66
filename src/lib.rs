pub mod artifacts;
pub mod auth;
pub mod classify;
pub mod cli;
pub mod config;
pub mod links;
pub mod load_config;
pub mod report;
pub mod runner;
pub mod sync;

pub use cli::{run, Cli, Commands};
