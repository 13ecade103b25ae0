// src/scanner/result.rs
use crate::binary::{Architecture, ElfBinary, LibC};
use crate::rules::{Finding, Status};
use crate::toolchain::Toolchain;
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BuildInfo {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub build_id: String,
    #[serde(flatten)]
    pub toolchain: Toolchain,
}

/// Outcome of scanning one file.
#[derive(Debug, Clone, Serialize)]
pub struct FileResult {
    pub path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub architecture: Option<Architecture>,
    pub build: BuildInfo,
    pub libc: LibC,
    pub sha256: String,
    pub findings: Vec<Finding>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Not an ELF file. Skipped results are dropped before reporting.
    #[serde(skip)]
    pub skipped: bool,
}

impl FileResult {
    fn empty(path: &Path, sha256: String) -> Self {
        Self {
            path: path.to_path_buf(),
            format: None,
            architecture: None,
            build: BuildInfo::default(),
            libc: LibC::Unknown,
            sha256,
            findings: Vec::new(),
            error: None,
            skipped: false,
        }
    }

    pub fn analyzed(path: &Path, sha256: String, binary: &ElfBinary, findings: Vec<Finding>) -> Self {
        Self {
            format: Some(binary.format()),
            architecture: Some(binary.architecture),
            build: BuildInfo {
                build_id: binary.build_id.clone(),
                toolchain: binary.toolchain,
            },
            libc: binary.libc,
            findings,
            ..Self::empty(path, sha256)
        }
    }

    pub fn unsupported(path: &Path, sha256: String) -> Self {
        Self {
            skipped: true,
            ..Self::empty(path, sha256)
        }
    }

    pub fn failed(path: &Path, sha256: String, error: impl ToString) -> Self {
        Self {
            error: Some(error.to_string()),
            ..Self::empty(path, sha256)
        }
    }

    pub fn passed_rules(&self) -> usize {
        self.count(Status::Passed)
    }

    pub fn failed_rules(&self) -> usize {
        self.count(Status::Failed)
    }

    fn count(&self, status: Status) -> usize {
        self.findings.iter().filter(|f| f.status == status).count()
    }

    pub fn path_str(&self) -> String {
        self.path.display().to_string()
    }
}
