// src/report/sarif.rs
//! SARIF 2.1.0 output for code scanning dashboards.

use super::ReportOptions;
use crate::rules::{Status, find};
use crate::scanner::FileResult;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

const SARIF_VERSION: &str = "2.1.0";
const SARIF_SCHEMA: &str =
    "https://raw.githubusercontent.com/oasis-tcs/sarif-spec/master/Schemata/sarif-schema-2.1.0.json";
const SCAN_ERROR_RULE: &str = "scan-error";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SarifReport {
    pub version: &'static str,
    #[serde(rename = "$schema")]
    pub schema: &'static str,
    pub runs: Vec<SarifRun>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SarifRun {
    pub tool: SarifTool,
    pub invocations: Vec<SarifInvocation>,
    pub results: Vec<SarifResult>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<SarifArtifact>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SarifTool {
    pub driver: SarifDriver,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SarifDriver {
    pub name: &'static str,
    pub version: &'static str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<SarifRule>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SarifRule {
    pub id: String,
    pub name: String,
    pub short_description: SarifMessage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_description: Option<SarifMessage>,
    pub default_configuration: SarifConfiguration,
}

#[derive(Debug, Clone, Serialize)]
pub struct SarifConfiguration {
    pub level: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SarifMessage {
    pub text: String,
}

impl SarifMessage {
    fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SarifResult {
    pub rule_id: String,
    pub kind: &'static str,
    pub level: &'static str,
    pub message: SarifMessage,
    pub locations: Vec<SarifLocation>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fixes: Vec<SarifFix>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SarifLocation {
    pub physical_location: SarifPhysicalLocation,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SarifPhysicalLocation {
    pub artifact_location: SarifArtifactLocation,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct SarifArtifactLocation {
    pub uri: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SarifArtifact {
    pub location: SarifArtifactLocation,
}

#[derive(Debug, Clone, Serialize)]
pub struct SarifFix {
    pub description: SarifMessage,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SarifInvocation {
    pub command_line: String,
    pub arguments: Vec<String>,
    pub start_time_utc: DateTime<Utc>,
    pub end_time_utc: DateTime<Utc>,
    pub working_directory: SarifArtifactLocation,
    pub execution_successful: bool,
}

/// How the analysis was run, recorded in the SARIF `invocations` block.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub arguments: Vec<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub working_dir: PathBuf,
    pub successful: bool,
}

impl Invocation {
    pub fn start(arguments: Vec<String>) -> Self {
        let now = Utc::now();
        Self {
            arguments,
            start_time: now,
            end_time: now,
            working_dir: std::env::current_dir().unwrap_or_default(),
            successful: false,
        }
    }

    pub fn finish(&mut self, successful: bool) {
        self.end_time = Utc::now();
        self.successful = successful;
    }
}

impl SarifReport {
    pub fn from_results(results: &[FileResult], invocation: &Invocation, options: &ReportOptions) -> Self {
        let mut rules: BTreeMap<String, SarifRule> = BTreeMap::new();
        let mut artifacts: BTreeSet<SarifArtifactLocation> = BTreeSet::new();
        let mut sarif_results = Vec::new();

        for result in results {
            let location = SarifArtifactLocation {
                uri: file_uri(&result.path),
            };
            artifacts.insert(location.clone());

            if let Some(err) = &result.error {
                sarif_results.push(SarifResult {
                    rule_id: SCAN_ERROR_RULE.to_string(),
                    kind: "fail",
                    level: "error",
                    message: SarifMessage::new(format!("Scan error: {}", err)),
                    locations: vec![locate(&location)],
                    fixes: Vec::new(),
                });
                continue;
            }

            for finding in result.findings.iter().filter(|f| options.keeps(f)) {
                rules.entry(finding.rule_id.clone()).or_insert_with(|| SarifRule {
                    id: finding.rule_id.clone(),
                    name: finding.name.clone(),
                    short_description: SarifMessage::new(finding.name.clone()),
                    full_description: find(&finding.rule_id).map(|r| SarifMessage::new(r.description)),
                    default_configuration: SarifConfiguration { level: "warning" },
                });

                let (kind, level) = match finding.status {
                    Status::Failed => ("fail", "warning"),
                    Status::Passed => ("pass", "note"),
                    Status::Skipped => ("notApplicable", "none"),
                };
                sarif_results.push(SarifResult {
                    rule_id: finding.rule_id.clone(),
                    kind,
                    level,
                    message: SarifMessage::new(finding.message.clone()),
                    locations: vec![locate(&location)],
                    fixes: finding
                        .suggestion
                        .iter()
                        .map(|s| SarifFix {
                            description: SarifMessage::new(s.clone()),
                        })
                        .collect(),
                });
            }
        }

        let mut command_line = vec![env!("CARGO_PKG_NAME").to_string()];
        command_line.extend(invocation.arguments.iter().cloned());

        SarifReport {
            version: SARIF_VERSION,
            schema: SARIF_SCHEMA,
            runs: vec![SarifRun {
                tool: SarifTool {
                    driver: SarifDriver {
                        name: env!("CARGO_PKG_NAME"),
                        version: env!("CARGO_PKG_VERSION"),
                        rules: rules.into_values().collect(),
                    },
                },
                invocations: vec![SarifInvocation {
                    command_line: command_line.join(" "),
                    arguments: invocation.arguments.clone(),
                    start_time_utc: invocation.start_time,
                    end_time_utc: invocation.end_time,
                    working_directory: SarifArtifactLocation {
                        uri: file_uri(&invocation.working_dir),
                    },
                    execution_successful: invocation.successful,
                }],
                results: sarif_results,
                artifacts: artifacts
                    .into_iter()
                    .map(|location| SarifArtifact { location })
                    .collect(),
            }],
        }
    }

    pub fn write<W: Write>(&self, out: &mut W) -> io::Result<()> {
        serde_json::to_writer_pretty(&mut *out, self)?;
        writeln!(out)
    }
}

fn locate(location: &SarifArtifactLocation) -> SarifLocation {
    SarifLocation {
        physical_location: SarifPhysicalLocation {
            artifact_location: location.clone(),
        },
    }
}

/// Absolute paths become `file://` URIs, relative ones are left as they are.
fn file_uri(path: &Path) -> String {
    if path.is_absolute() {
        if let Ok(url) = url::Url::from_file_path(path) {
            return url.to_string();
        }
    }
    path.display().to_string()
}
