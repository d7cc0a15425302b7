pub mod auth;
pub mod cli;
pub mod load_config;

pub use cli::{run, Cli};
