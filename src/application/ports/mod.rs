pub mod confirm_prompt;
pub mod control_plane;
pub mod installed_plugin_store;
pub mod lock_manager;
pub mod plugin_event_publisher;
pub mod plugin_package_fetcher;
pub mod plugin_package_store;
pub mod process_supervisor;
