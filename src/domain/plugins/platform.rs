pub const ARCH_64: &str = "x64";
pub const ARCH_32: &str = "x86";
pub const ARCH_ARM: &str = "arm";
pub const ARCH_UNKNOWN: &str = "unknown";

pub const OS_LINUX: &str = "linux";
pub const OS_WINDOWS: &str = "windows";
pub const OS_FREEBSD: &str = "freebsd";

pub fn current_os_type() -> &'static str {
    match std::env::consts::OS {
        "windows" => OS_WINDOWS,
        "freebsd" => OS_FREEBSD,
        _ => OS_LINUX,
    }
}

/// Maps a raw machine name (`uname -m` style) to the catalog arch vocabulary.
pub fn normalize_arch(raw: &str) -> &'static str {
    let arch = raw.trim().to_ascii_lowercase();
    if arch.contains("aarch") || arch.contains("arm") {
        ARCH_ARM
    } else if arch.contains("386") || arch.contains("686") || arch == "x86" {
        ARCH_32
    } else if arch == "x86_64" || arch == "amd64" {
        ARCH_64
    } else {
        ARCH_UNKNOWN
    }
}

pub fn current_arch() -> &'static str {
    normalize_arch(std::env::consts::ARCH)
}

/// Manifest / catalog arch selector: empty and `all` match every machine.
pub fn arch_matches(declared: &str, local: &str) -> bool {
    let declared = declared.trim().to_ascii_lowercase();
    declared.is_empty() || declared == "all" || declared == local
}

/// Manifest / catalog OS selector: empty and `both` match every OS.
pub fn os_matches(declared: &str, local: &str) -> bool {
    let declared = declared.trim().to_ascii_lowercase();
    declared.is_empty() || declared == "both" || declared == local
}
