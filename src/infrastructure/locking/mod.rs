pub mod file_lock;
pub mod in_process;

pub use file_lock::FileLockManager;
pub use in_process::InProcessLockManager;

pub(crate) fn plugin_lock_key(name: &str) -> String {
    format!("{name}.lock")
}

pub(crate) fn version_lock_key(name: &str, version: &str) -> String {
    format!("{name}.v{version}.lock")
}
