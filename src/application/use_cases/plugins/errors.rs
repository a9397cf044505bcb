use crate::application::ports::installed_plugin_store::RegistryError;
use crate::application::ports::lock_manager::LockError;

pub const CHECK_ENDPOINT_FAIL: i32 = 233;
pub const PACKAGE_NOT_FOUND: i32 = 234;
pub const PACKAGE_FORMAT_ERR: i32 = 235;
pub const UNZIP_ERR: i32 = 236;
pub const UNMARSHAL_ERR: i32 = 237;
pub const PLUGIN_FORMAT_ERR: i32 = 238;
pub const MD5_CHECK_FAIL: i32 = 239;
pub const DOWNLOAD_FAIL: i32 = 240;
pub const LOAD_INSTALLEDPLUGINS_ERR: i32 = 241;
pub const DUMP_INSTALLEDPLUGINS_ERR: i32 = 242;
pub const GET_ONLINE_PACKAGE_INFO_ERR: i32 = 243;
pub const EXECUTABLE_PERMISSION_ERR: i32 = 244;
pub const REMOVE_FILE_ERR: i32 = 245;
pub const EXECUTE_FAILED: i32 = 246;
pub const EXECUTE_TIMEOUT: i32 = 247;
pub const LOCKING_ERR: i32 = 248;

/// Failures of the plugin manager commands. Each variant maps to a stable
/// process exit code; `Display` is the tip shown to the operator.
#[derive(thiserror::Error, Debug)]
pub enum PluginManagerError {
    #[error("CHECK_ENDPOINT_FAIL: {0}")]
    CheckEndpoint(String),
    #[error("PACKAGE_NOT_FOUND: {0}")]
    PackageNotFound(String),
    #[error("PACKAGE_FORMAT_ERR: {0}")]
    PackageFormat(String),
    #[error("UNZIP_ERR: {tip}")]
    Unzip {
        tip: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("UNMARSHAL_ERR: {tip}")]
    Unmarshal {
        tip: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("PLUGIN_FORMAT_ERR: {0}")]
    PluginFormat(String),
    #[error("MD5_CHECK_FAIL: {0}")]
    Md5Check(String),
    #[error("DOWNLOAD_FAIL: {tip}")]
    Download {
        tip: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("LOAD_INSTALLEDPLUGINS_ERR: {0}")]
    LoadInstalledPlugins(#[source] RegistryError),
    #[error("DUMP_INSTALLEDPLUGINS_ERR: {0}")]
    DumpInstalledPlugins(#[source] RegistryError),
    #[error("GET_ONLINE_PACKAGE_INFO_ERR: {0}")]
    GetOnlinePackageInfo(#[source] anyhow::Error),
    #[error("EXECUTABLE_PERMISSION_ERR: {tip}")]
    ExecutablePermission {
        tip: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("REMOVE_FILE_ERR: {tip}")]
    RemoveFile {
        tip: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("EXECUTE_FAILED: {0}")]
    ExecuteFailed(String),
    #[error("EXECUTE_TIMEOUT: {0}")]
    ExecuteTimeout(String),
    #[error("LOCKING_ERR: {0}")]
    Locking(#[from] LockError),
}

impl PluginManagerError {
    pub fn exit_code(&self) -> i32 {
        match self {
            PluginManagerError::CheckEndpoint(_) => CHECK_ENDPOINT_FAIL,
            PluginManagerError::PackageNotFound(_) => PACKAGE_NOT_FOUND,
            PluginManagerError::PackageFormat(_) => PACKAGE_FORMAT_ERR,
            PluginManagerError::Unzip { .. } => UNZIP_ERR,
            PluginManagerError::Unmarshal { .. } => UNMARSHAL_ERR,
            PluginManagerError::PluginFormat(_) => PLUGIN_FORMAT_ERR,
            PluginManagerError::Md5Check(_) => MD5_CHECK_FAIL,
            PluginManagerError::Download { .. } => DOWNLOAD_FAIL,
            PluginManagerError::LoadInstalledPlugins(_) => LOAD_INSTALLEDPLUGINS_ERR,
            PluginManagerError::DumpInstalledPlugins(_) => DUMP_INSTALLEDPLUGINS_ERR,
            PluginManagerError::GetOnlinePackageInfo(_) => GET_ONLINE_PACKAGE_INFO_ERR,
            PluginManagerError::ExecutablePermission { .. } => EXECUTABLE_PERMISSION_ERR,
            PluginManagerError::RemoveFile { .. } => REMOVE_FILE_ERR,
            PluginManagerError::ExecuteFailed(_) => EXECUTE_FAILED,
            PluginManagerError::ExecuteTimeout(_) => EXECUTE_TIMEOUT,
            PluginManagerError::Locking(_) => LOCKING_ERR,
        }
    }

    /// Symbolic code recorded in execute events.
    pub fn code_name(&self) -> &'static str {
        match self {
            PluginManagerError::CheckEndpoint(_) => "CHECK_ENDPOINT_FAIL",
            PluginManagerError::PackageNotFound(_) => "PACKAGE_NOT_FOUND",
            PluginManagerError::PackageFormat(_) => "PACKAGE_FORMAT_ERR",
            PluginManagerError::Unzip { .. } => "UNZIP_ERR",
            PluginManagerError::Unmarshal { .. } => "UNMARSHAL_ERR",
            PluginManagerError::PluginFormat(_) => "PLUGIN_FORMAT_ERR",
            PluginManagerError::Md5Check(_) => "MD5_CHECK_FAIL",
            PluginManagerError::Download { .. } => "DOWNLOAD_FAIL",
            PluginManagerError::LoadInstalledPlugins(_) => "LOAD_INSTALLEDPLUGINS_ERR",
            PluginManagerError::DumpInstalledPlugins(_) => "DUMP_INSTALLEDPLUGINS_ERR",
            PluginManagerError::GetOnlinePackageInfo(_) => "GET_ONLINE_PACKAGE_INFO_ERR",
            PluginManagerError::ExecutablePermission { .. } => "EXECUTABLE_PERMISSION_ERR",
            PluginManagerError::RemoveFile { .. } => "REMOVE_FILE_ERR",
            PluginManagerError::ExecuteFailed(_) => "EXECUTE_FAILED",
            PluginManagerError::ExecuteTimeout(_) => "EXECUTE_TIMEOUT",
            PluginManagerError::Locking(_) => "LOCKING_ERR",
        }
    }

    pub fn is_package_not_found(&self) -> bool {
        matches!(self, PluginManagerError::PackageNotFound(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_are_stable() {
        assert_eq!(
            PluginManagerError::PackageNotFound("demo".into()).exit_code(),
            234
        );
        assert_eq!(PluginManagerError::ExecuteTimeout("t".into()).exit_code(), 247);
        let lock = LockError::PluginShared {
            name: "demo".into(),
            source: anyhow::anyhow!("busy"),
        };
        let err = PluginManagerError::from(lock);
        assert_eq!(err.exit_code(), LOCKING_ERR);
        assert!(err.to_string().starts_with("LOCKING_ERR: "));
    }
}
