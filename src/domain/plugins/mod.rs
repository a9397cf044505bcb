pub mod installed_plugins;
pub mod lenient;
pub mod manifest;
pub mod platform;
pub mod plugin_info;
pub mod plugin_type;
pub mod status;
pub mod version;

pub use installed_plugins::InstalledPlugins;
pub use manifest::PluginManifest;
pub use plugin_info::PluginInfo;
pub use plugin_type::PluginType;
pub use status::{PluginStatus, PluginStatusKind};
pub use version::compare_version;
