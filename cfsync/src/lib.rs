pub mod cli;
pub mod load_config;
pub mod service;

pub use cli::{run, Cli, Commands};
