//! Platform naming used by GraalVM distribution artifacts
//!
//! Maps an operating-system name and CPU architecture onto the tokens that
//! appear in release URLs (`linux`, `amd64`, ...). Accepts both Rust's
//! `std::env::consts` spellings and JVM-style `os.name` / `os.arch` values.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Operating-system token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OsFamily {
    Windows,
    Darwin,
    Linux,
    FreeBsd,
    Solaris,
}

impl OsFamily {
    /// Normalize an operating-system name. Unknown names resolve to `Linux`.
    pub fn from_name(name: &str) -> Self {
        let name = name.to_ascii_lowercase();
        if name.starts_with("windows") {
            OsFamily::Windows
        } else if name.starts_with("mac") || name.starts_with("darwin") {
            OsFamily::Darwin
        } else if name.starts_with("freebsd") {
            OsFamily::FreeBsd
        } else if name.starts_with("sunos") || name.starts_with("solaris") || name == "illumos" {
            OsFamily::Solaris
        } else {
            OsFamily::Linux
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OsFamily::Windows => "windows",
            OsFamily::Darwin => "darwin",
            OsFamily::Linux => "linux",
            OsFamily::FreeBsd => "freebsd",
            OsFamily::Solaris => "solaris",
        }
    }
}

/// CPU architecture token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Arch {
    #[serde(rename = "386")]
    X86,
    #[serde(rename = "amd64")]
    Amd64,
    #[serde(rename = "arm")]
    Arm,
}

impl Arch {
    /// Normalize an architecture name. Unknown names resolve to `Amd64`.
    pub fn from_name(name: &str) -> Self {
        let name = name.to_ascii_lowercase();
        match name.as_str() {
            "x86" | "i386" | "i686" => Arch::X86,
            "x86_64" | "amd64" => Arch::Amd64,
            _ if name.starts_with("arm") || name == "aarch64" => Arch::Arm,
            _ => Arch::Amd64,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Arch::X86 => "386",
            Arch::Amd64 => "amd64",
            Arch::Arm => "arm",
        }
    }
}

/// Resolved (os, arch) pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Platform {
    pub os: OsFamily,
    pub arch: Arch,
}

impl Platform {
    pub fn new(os: OsFamily, arch: Arch) -> Self {
        Platform { os, arch }
    }

    /// Resolve from raw OS and architecture names
    pub fn from_names(os: &str, arch: &str) -> Self {
        Platform::new(OsFamily::from_name(os), Arch::from_name(arch))
    }

    /// The platform this process runs on
    pub fn current() -> Self {
        Platform::from_names(std::env::consts::OS, std::env::consts::ARCH)
    }

    pub fn is_windows(&self) -> bool {
        self.os == OsFamily::Windows
    }

    pub fn is_macos(&self) -> bool {
        self.os == OsFamily::Darwin
    }

    /// Classpath separator for this platform
    pub fn path_separator(&self) -> char {
        if self.is_windows() {
            ';'
        } else {
            ':'
        }
    }

    /// Extension of the distribution archive published for this platform
    pub fn archive_extension(&self) -> &'static str {
        if self.is_windows() {
            "zip"
        } else {
            "tar.gz"
        }
    }

    /// Name of a launcher script or binary as shipped in a toolchain `bin` directory
    pub fn launcher_name(&self, base: &str) -> String {
        if self.is_windows() {
            format!("{base}.cmd")
        } else {
            base.to_string()
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.os.as_str(), self.arch.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jvm_style_os_names() {
        assert_eq!(OsFamily::from_name("Windows 10"), OsFamily::Windows);
        assert_eq!(OsFamily::from_name("Mac OS X"), OsFamily::Darwin);
        assert_eq!(OsFamily::from_name("FreeBSD"), OsFamily::FreeBsd);
        assert_eq!(OsFamily::from_name("SunOS"), OsFamily::Solaris);
        assert_eq!(OsFamily::from_name("Linux"), OsFamily::Linux);
    }

    #[test]
    fn test_rust_style_os_names() {
        assert_eq!(OsFamily::from_name("windows"), OsFamily::Windows);
        assert_eq!(OsFamily::from_name("macos"), OsFamily::Darwin);
        assert_eq!(OsFamily::from_name("illumos"), OsFamily::Solaris);
    }

    #[test]
    fn test_unknown_falls_back_to_linux_amd64() {
        let platform = Platform::from_names("Plan9", "riscv64");
        assert_eq!(platform.os, OsFamily::Linux);
        assert_eq!(platform.arch, Arch::Amd64);
        assert_eq!(platform.to_string(), "linux-amd64");
    }

    #[test]
    fn test_arch_tokens() {
        assert_eq!(Arch::from_name("x86").as_str(), "386");
        assert_eq!(Arch::from_name("i386").as_str(), "386");
        assert_eq!(Arch::from_name("x86_64").as_str(), "amd64");
        assert_eq!(Arch::from_name("armv7l").as_str(), "arm");
        assert_eq!(Arch::from_name("aarch64").as_str(), "arm");
    }

    #[test]
    fn test_windows_conventions() {
        let windows = Platform::new(OsFamily::Windows, Arch::Amd64);
        assert!(windows.is_windows());
        assert!(!windows.is_macos());
        assert_eq!(windows.path_separator(), ';');
        assert_eq!(windows.archive_extension(), "zip");
        assert_eq!(windows.launcher_name("native-image"), "native-image.cmd");

        let linux = Platform::new(OsFamily::Linux, Arch::Amd64);
        assert_eq!(linux.path_separator(), ':');
        assert_eq!(linux.archive_extension(), "tar.gz");
        assert_eq!(linux.launcher_name("gu"), "gu");
    }
}
