pub mod locking;
pub mod plugins;
pub mod process;
