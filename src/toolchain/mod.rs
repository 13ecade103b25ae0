// src/toolchain/mod.rs
//! Compiler family and version detection from embedded identification strings.

pub mod detector;

pub use self::detector::{CommentDetector, CompilerDetector, detect, detect_binary};

use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub enum Compiler {
    #[default]
    Unknown,
    Gcc,
    Clang,
    Rustc,
}

impl Compiler {
    pub const KNOWN: [Compiler; 3] = [Compiler::Gcc, Compiler::Clang, Compiler::Rustc];

    pub fn name(&self) -> &'static str {
        match self {
            Compiler::Unknown => "unknown",
            Compiler::Gcc => "gcc",
            Compiler::Clang => "clang",
            Compiler::Rustc => "rustc",
        }
    }

    /// Display name used in remediation text ("GCC", "Clang").
    pub fn display_name(&self) -> &'static str {
        match self {
            Compiler::Unknown => "unknown",
            Compiler::Gcc => "GCC",
            Compiler::Clang => "Clang",
            Compiler::Rustc => "rustc",
        }
    }

    pub fn is_known(&self) -> bool {
        *self != Compiler::Unknown
    }

    /// Tie-break between markers found in the same binary. C runtimes embed their
    /// own GCC string, so a Rust or Clang marker wins over it.
    pub(crate) fn priority(&self) -> u8 {
        match self {
            Compiler::Unknown => 0,
            Compiler::Gcc => 1,
            Compiler::Clang => 2,
            Compiler::Rustc => 3,
        }
    }

    pub fn valid_names() -> Vec<&'static str> {
        Self::KNOWN.iter().map(|c| c.name()).collect()
    }
}

impl fmt::Display for Compiler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Compiler {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "gcc" => Ok(Compiler::Gcc),
            "clang" => Ok(Compiler::Clang),
            "rustc" => Ok(Compiler::Rustc),
            _ => Err(format!("unknown compiler: {}", s)),
        }
    }
}

impl Serialize for Compiler {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum VersionParseError {
    #[error("invalid version format: {0}")]
    Format(String),
    #[error("invalid major version component: {0}")]
    Major(String),
    #[error("invalid minor version component: {0}")]
    Minor(String),
}

/// `major.minor[.patch]`. The zero value means "unknown", not version 0.0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl Version {
    pub const fn new(major: u32, minor: u32) -> Self {
        Self {
            major,
            minor,
            patch: 0,
        }
    }

    pub const fn with_patch(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    pub fn is_zero(&self) -> bool {
        *self == Version::default()
    }

    pub fn is_at_least(&self, required: &Version) -> bool {
        self >= required
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.patch > 0 {
            write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
        } else {
            write!(f, "{}.{}", self.major, self.minor)
        }
    }
}

impl FromStr for Version {
    type Err = VersionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('.').collect();
        if parts.len() < 2 {
            return Err(VersionParseError::Format(s.to_string()));
        }
        let major = parts[0]
            .parse()
            .map_err(|_| VersionParseError::Major(s.to_string()))?;
        let minor = parts[1]
            .parse()
            .map_err(|_| VersionParseError::Minor(s.to_string()))?;
        // patch is best effort: "0-1ubuntu1~22" is common in distro strings
        let patch = parts.get(2).and_then(|p| p.parse().ok()).unwrap_or(0);
        Ok(Version {
            major,
            minor,
            patch,
        })
    }
}

impl Serialize for Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if self.is_zero() {
            serializer.serialize_none()
        } else {
            serializer.serialize_str(&self.to_string())
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Toolchain {
    pub compiler: Compiler,
    pub version: Version,
}

impl Toolchain {
    pub fn new(compiler: Compiler, version: Version) -> Self {
        Self { compiler, version }
    }
}

impl fmt::Display for Toolchain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.version.is_zero() {
            write!(f, "{}", self.compiler)
        } else {
            write!(f, "{} {}", self.compiler, self.version)
        }
    }
}
