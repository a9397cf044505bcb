pub mod errors;
pub mod exec;
pub mod install;
pub mod list;
pub mod params;
pub mod remove;
pub mod resolve;
pub mod runner;
pub mod status;
pub mod verify;
