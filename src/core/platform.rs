//! Platform detection for applicability rules
//!
//! This module handles:
//! - Current OS / architecture detection
//! - The `Environment` that manifest platform filters and library rules are
//!   evaluated against

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Operating systems known to manifests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Os {
    Windows,
    Linux,
    #[serde(alias = "osx")]
    MacOS,
    Unknown,
}

impl Os {
    /// Get the current OS
    pub fn current() -> Self {
        if cfg!(target_os = "windows") {
            Os::Windows
        } else if cfg!(target_os = "linux") {
            Os::Linux
        } else if cfg!(target_os = "macos") {
            Os::MacOS
        } else {
            Os::Unknown
        }
    }

    /// Name used in manifests
    pub fn as_str(&self) -> &'static str {
        match self {
            Os::Windows => "windows",
            Os::Linux => "linux",
            Os::MacOS => "macos",
            Os::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Os {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Os {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "windows" => Ok(Os::Windows),
            "linux" => Ok(Os::Linux),
            "macos" | "osx" => Ok(Os::MacOS),
            "unknown" => Ok(Os::Unknown),
            other => Err(format!("Unknown operating system: {}", other)),
        }
    }
}

/// CPU architectures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Arch {
    X86,
    X86_64,
    Aarch64,
    Unknown,
}

impl Arch {
    /// Get the current architecture
    pub fn current() -> Self {
        if cfg!(target_arch = "x86_64") {
            Arch::X86_64
        } else if cfg!(target_arch = "aarch64") {
            Arch::Aarch64
        } else if cfg!(target_arch = "x86") {
            Arch::X86
        } else {
            Arch::Unknown
        }
    }

    /// Pointer width, as substituted for `${arch}` in native classifiers
    pub fn bits(&self) -> &'static str {
        match self {
            Arch::X86 => "32",
            _ => "64",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Arch::X86 => "x86",
            Arch::X86_64 => "x86_64",
            Arch::Aarch64 => "aarch64",
            Arch::Unknown => "unknown",
        }
    }
}

/// Runtime environment that platform filters and rules are matched against
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Environment {
    pub os: Os,
    pub os_version: String,
    pub arch: Arch,
}

impl Environment {
    pub fn new(os: Os, os_version: impl Into<String>, arch: Arch) -> Self {
        Self {
            os,
            os_version: os_version.into(),
            arch,
        }
    }

    /// Detect the environment of the running process
    pub fn detect() -> Self {
        Self {
            os: Os::current(),
            os_version: detect_os_version(),
            arch: Arch::current(),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.os_version.is_empty() {
            write!(f, "{}-{}", self.os, self.arch.as_str())
        } else {
            write!(f, "{} {} ({})", self.os, self.os_version, self.arch.as_str())
        }
    }
}

#[cfg(target_os = "linux")]
fn detect_os_version() -> String {
    std::fs::read_to_string("/proc/sys/kernel/osrelease")
        .map(|s| s.trim().to_string())
        .unwrap_or_default()
}

#[cfg(not(target_os = "linux"))]
fn detect_os_version() -> String {
    std::env::var("WENDEPLOY_OS_VERSION").unwrap_or_default()
}
