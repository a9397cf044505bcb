pub mod control_plane_reqwest;
pub mod event_publisher_broadcast;
pub mod filesystem_store;
pub mod installed_store_json;
pub mod package_fetcher_reqwest;
