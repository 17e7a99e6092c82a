//! Finding writer handed to each vector.

use log::warn;
use serde_json::Value;

use super::utils::Finding;
use crate::level::Level;

/// Metadata value written by a vector, pending to be merged into the report.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct MetadataWrite {
    pub(crate) key: String,
    pub(crate) value: Value,
    pub(crate) force_no_print: bool,
}

/// Accumulates the findings of one vector.
///
/// Every `start_finding()` call opens a new finding, closing the previous one. Detail lines are
/// appended to the open finding. Repeated emissions of one tag are therefore kept as separate
/// findings, one per matched element.
#[derive(Debug, Default)]
pub struct FindingWriter {
    findings: Vec<Finding>,
    open: bool,
    metadata: Vec<MetadataWrite>,
}

impl FindingWriter {
    /// Creates an empty writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a new finding.
    pub fn start_finding<T, S, D>(&mut self, tag: T, level: Level, title: S, description: D)
    where
        T: Into<String>,
        S: Into<String>,
        D: Into<String>,
    {
        self.findings
            .push(Finding::new(tag, level, title, description));
        self.open = true;
    }

    /// Appends a detail line to the open finding.
    ///
    /// Lines written while no finding is open are dropped with a warning.
    pub fn append_detail<S: Into<String>>(&mut self, line: S) {
        let line = line.into();
        match self.findings.last_mut() {
            Some(finding) if self.open => finding.push_detail(line),
            _ => warn!("detail line written without an open finding: {}", line),
        }
    }

    /// Closes the open finding, if any.
    pub fn close(&mut self) {
        self.open = false;
    }

    /// Whether a finding is open.
    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Records an informational fact in the report metadata.
    pub fn set_metadata<K, V>(&mut self, key: K, value: V, force_no_print: bool)
    where
        K: Into<String>,
        V: Into<Value>,
    {
        self.metadata.push(MetadataWrite {
            key: key.into(),
            value: value.into(),
            force_no_print,
        });
    }

    /// Findings written so far.
    pub fn findings(&self) -> &[Finding] {
        &self.findings
    }

    /// Closes the writer, giving back its findings and metadata.
    pub(crate) fn into_parts(mut self) -> (Vec<Finding>, Vec<MetadataWrite>) {
        self.close();
        (self.findings, self.metadata)
    }
}

#[cfg(test)]
mod tests {
    use super::FindingWriter;
    use crate::level::Level;

    #[test]
    fn it_appends_to_open_finding() {
        let mut writer = FindingWriter::new();
        writer.append_detail("dropped");
        assert!(writer.findings().is_empty());

        writer.start_finding("QUERY_PACKAGE", Level::Warning, "Queries", "Queries packages.");
        assert!(writer.is_open());
        writer.append_detail("com.example.one");
        writer.append_detail("com.example.two");
        writer.start_finding("QUERY_INTENT", Level::Warning, "Intents", "Queries intents.");
        writer.append_detail("android.intent.action.SEND");
        writer.close();
        writer.append_detail("dropped too");

        let findings = writer.findings();
        assert_eq!(findings.len(), 2);
        assert_eq!(findings[0].tag(), "QUERY_PACKAGE");
        assert_eq!(findings[0].details(), &["com.example.one", "com.example.two"]);
        assert_eq!(findings[1].details(), &["android.intent.action.SEND"]);
    }

    #[test]
    fn it_keeps_repeated_tags_apart() {
        let mut writer = FindingWriter::new();
        writer.start_finding("LISTEN_PACKAGE_ADDED", Level::Warning, "Added", "Added.");
        writer.start_finding("LISTEN_PACKAGE_ADDED", Level::Warning, "Added", "Added.");
        writer.set_metadata("receivers", 2, true);

        let (findings, metadata) = writer.into_parts();
        assert_eq!(findings.len(), 2);
        assert_eq!(metadata.len(), 1);
        assert_eq!(metadata[0].key, "receivers");
        assert!(metadata[0].force_no_print);
    }
}
