//! Scan results: findings, metadata and the scan status.

use std::{collections::BTreeMap, fmt, result::Result as StdResult};

use serde::ser::{Serialize, SerializeStruct, Serializer};
use serde_derive::Serialize;
use serde_json::Value;

pub mod report;
mod utils;
mod writer;

pub use self::{
    utils::{signature, Finding, FingerPrint},
    writer::FindingWriter,
};

/// Stage of the scan of one package.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// Loading and decoding the package.
    LoadingApk,
    /// Validating the package and building the analysis context.
    StartingApk,
    /// Starting the analysis engine.
    #[serde(rename = "starting_androbugs")]
    StartingAnalysis,
    /// Selecting the vectors to run.
    LoadingVectors,
    /// Running the vectors.
    CheckingVectors,
    /// The scan finished correctly.
    Success,
    /// The scan failed.
    Fail,
}

impl Status {
    /// Identifier of the status, as stored in the reports.
    pub fn as_str(self) -> &'static str {
        match self {
            Status::LoadingApk => "loading_apk",
            Status::StartingApk => "starting_apk",
            Status::StartingAnalysis => "starting_androbugs",
            Status::LoadingVectors => "loading_vectors",
            Status::CheckingVectors => "checking_vectors",
            Status::Success => "success",
            Status::Fail => "fail",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metadata value of the report.
#[derive(Debug, Clone, PartialEq)]
pub struct MetadataEntry {
    value: Value,
    printable: bool,
}

impl MetadataEntry {
    /// Stored value.
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Whether the value is shown in human readable output.
    pub fn is_printable(&self) -> bool {
        self.printable
    }
}

/// Results of the scan of one package.
#[derive(Debug, Clone)]
pub struct ScanReport {
    status: Status,
    findings: Vec<Finding>,
    metadata: BTreeMap<String, MetadataEntry>,
    completed: bool,
}

impl Default for ScanReport {
    fn default() -> Self {
        Self::new()
    }
}

impl ScanReport {
    /// Creates an empty report for a scan that is starting.
    pub fn new() -> Self {
        Self {
            status: Status::LoadingApk,
            findings: Vec::new(),
            metadata: BTreeMap::new(),
            completed: false,
        }
    }

    /// Gets the current status of the scan.
    pub fn status(&self) -> Status {
        self.status
    }

    pub(crate) fn set_status(&mut self, status: Status) {
        self.status = status;
    }

    /// Sets a metadata value, overwriting the previous value of the key.
    ///
    /// Keys written with `force_no_print` stay report-only even if they are overwritten later
    /// as printable.
    pub fn set_metadata<K, V>(&mut self, key: K, value: V, force_no_print: bool)
    where
        K: Into<String>,
        V: Into<Value>,
    {
        let value = value.into();
        let entry = self
            .metadata
            .entry(key.into())
            .or_insert_with(|| MetadataEntry {
                value: Value::Null,
                printable: true,
            });
        entry.value = value;
        entry.printable = entry.printable && !force_no_print;
    }

    /// Gets a metadata value.
    pub fn metadata(&self, key: &str) -> Option<&Value> {
        self.metadata.get(key).map(MetadataEntry::value)
    }

    /// Gets a metadata value as text, or the given default if the key is not set.
    pub fn metadata_str_or(&self, key: &str, default: &str) -> String {
        match self.metadata(key) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => default.to_owned(),
            Some(other) => other.to_string(),
        }
    }

    /// Metadata entries shown in human readable output, sorted by key.
    pub fn printable_metadata(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.metadata
            .iter()
            .filter(|(_, entry)| entry.printable)
            .map(|(key, entry)| (key.as_str(), &entry.value))
    }

    /// Findings of the scan, in the order they were reported.
    pub fn findings(&self) -> &[Finding] {
        &self.findings
    }

    /// Number of findings.
    pub fn total_findings(&self) -> usize {
        self.findings.len()
    }

    /// Appends the findings and metadata written by one vector.
    pub fn merge(&mut self, writer: FindingWriter) {
        let (findings, metadata) = writer.into_parts();
        self.findings.extend(findings);
        for write in metadata {
            self.set_metadata(write.key, write.value, write.force_no_print);
        }
    }

    /// Marks the report as completed. No more vectors run after this.
    pub(crate) fn complete(&mut self) {
        self.completed = true;
    }

    /// Whether the scan finished, either successfully or with a failure.
    pub fn is_completed(&self) -> bool {
        self.completed
    }
}

impl Serialize for ScanReport {
    fn serialize<S>(&self, serializer: S) -> StdResult<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let metadata: BTreeMap<&str, &Value> = self
            .metadata
            .iter()
            .map(|(key, entry)| (key.as_str(), &entry.value))
            .collect();

        let mut ser_struct = serializer.serialize_struct("ScanReport", 5)?;
        ser_struct.serialize_field("analyzer_version", env!("CARGO_PKG_VERSION"))?;
        ser_struct.serialize_field("status", &self.status)?;
        ser_struct.serialize_field("metadata", &metadata)?;
        ser_struct.serialize_field("total_findings", &self.findings.len())?;
        ser_struct.serialize_field("findings", &self.findings)?;
        ser_struct.end()
    }
}

#[cfg(test)]
mod tests {
    use super::{FindingWriter, ScanReport, Status};
    use crate::level::Level;
    use serde_json::Value;

    #[test]
    fn it_metadata() {
        let mut report = ScanReport::new();
        report.set_metadata("package_name", "com.example.app", false);
        report.set_metadata("minSdk", 21, false);
        report.set_metadata("time_total", 1.5, true);

        assert_eq!(report.metadata_str_or("package_name", "pkg"), "com.example.app");
        assert_eq!(report.metadata_str_or("minSdk", "0"), "21");
        assert_eq!(report.metadata_str_or("file_sha256", "sha256"), "sha256");

        report.set_metadata("package_name", "com.example.other", false);
        assert_eq!(
            report.metadata("package_name"),
            Some(&Value::from("com.example.other"))
        );

        report.set_metadata("time_total", 2.5, false);
        let printable: Vec<_> = report.printable_metadata().map(|(k, _)| k).collect();
        assert_eq!(printable, vec!["minSdk", "package_name"]);
    }

    #[test]
    fn it_merge_and_serialize() {
        let mut report = ScanReport::new();
        let mut writer = FindingWriter::new();
        writer.start_finding("DEBUGGABLE", Level::Critical, "Debug", "Debug mode.");
        writer.append_detail("AndroidManifest.xml");
        writer.set_metadata("debuggable", true, true);
        report.merge(writer);
        report.set_status(Status::Success);
        report.complete();

        assert!(report.is_completed());
        assert_eq!(report.total_findings(), 1);
        assert_eq!(report.metadata("debuggable"), Some(&Value::Bool(true)));

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["status"], "success");
        assert_eq!(json["total_findings"], 1);
        assert_eq!(json["metadata"]["debuggable"], true);
        assert_eq!(json["findings"][0]["tag"], "DEBUGGABLE");
        assert_eq!(json["findings"][0]["level"], "critical");
        assert_eq!(json["findings"][0]["details"][0], "AndroidManifest.xml");
    }

    #[test]
    fn it_status() {
        assert_eq!(Status::CheckingVectors.as_str(), "checking_vectors");
        assert_eq!(format!("{}", Status::Fail), "fail");
        assert_eq!(
            serde_json::to_string(&Status::StartingApk).unwrap(),
            "\"starting_apk\""
        );
        assert_eq!(Status::StartingAnalysis.as_str(), "starting_androbugs");
        assert_eq!(
            serde_json::to_string(&Status::StartingAnalysis).unwrap(),
            "\"starting_androbugs\""
        );
    }
}
