pub mod args;
pub mod commands;
pub mod prompt;

pub use args::Cli;
