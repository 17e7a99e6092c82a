//! Scan orchestration.
//!
//! The engine runs the whole analysis of one package: it loads the package, validates it,
//! builds the analysis context, runs the selected vectors and finalizes the report. A scan never
//! returns an error: failures are recorded in the report, which is marked as failed.

use std::{
    fs,
    panic::{self, AssertUnwindSafe},
    path::Path,
    time::{Duration, Instant},
};

use chrono::Utc;
use failure::Error;
use log::{debug, error, info, warn};
use serde_json::Value;

use crate::{
    apk::ApkLoader,
    config::Config,
    context::AnalysisContext,
    error::Kind,
    filter::ExclusionFilter,
    results::{signature, FindingWriter, FingerPrint, ScanReport, Status},
    vectors::{Registry, Vector, VectorOutcome},
};

/// Error identifier used when the error does not belong to a known category.
pub const UNEXPECTED_ERROR_ID: &str = "unexpected_error";

/// Options of the scans, recorded in the reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanOptions {
    /// Analysis mode.
    pub analyze_mode: String,
    /// Build number of the analysis engine.
    pub engine_build: u32,
    /// Tag of this round of analysis.
    pub analyze_tag: Option<String>,
    /// Only run the vectors reporting this tag.
    pub debug_vector: Option<String>,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            analyze_mode: String::from("single"),
            engine_build: 1,
            analyze_tag: None,
            debug_vector: None,
        }
    }
}

/// Analysis engine.
///
/// The engine holds no per-scan state, so one engine can run any number of scans, even from
/// different threads.
#[derive(Debug)]
pub struct Engine {
    registry: Registry,
    filter: ExclusionFilter,
    options: ScanOptions,
}

impl Engine {
    /// Creates a new engine.
    pub fn new(registry: Registry, filter: ExclusionFilter, options: ScanOptions) -> Self {
        Self {
            registry,
            filter,
            options,
        }
    }

    /// Creates the engine with every available vector and the configured options.
    pub fn from_config(config: &Config) -> Self {
        let options = ScanOptions {
            analyze_mode: config.analyze_mode().to_owned(),
            engine_build: config.analyze_engine_build(),
            analyze_tag: config.analyze_tag().map(str::to_owned),
            debug_vector: config.debug_vector().map(str::to_owned),
        };
        Self::new(
            Registry::discover(),
            ExclusionFilter::new(config.exclusions()),
            options,
        )
    }

    /// Loaded vectors.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Scans the package at the given path.
    pub fn scan<P: AsRef<Path>>(&self, loader: &dyn ApkLoader, package: P) -> ScanReport {
        let package = package.as_ref();
        let mut report = ScanReport::new();
        report.set_metadata("analyze_mode", self.options.analyze_mode.as_str(), true);
        report.set_metadata("analyze_engine_build", self.options.engine_build, true);
        let analyze_tag = match self.options.analyze_tag {
            Some(ref tag) => Value::from(tag.as_str()),
            None => Value::Null,
        };
        report.set_metadata("analyze_tag", analyze_tag, true);

        match self.run(loader, package, &mut report) {
            Ok(()) => {
                report.complete();
                let signature = signature(
                    report.metadata_str_or("package_name", "pkg"),
                    report.metadata_str_or("file_sha256", "sha256"),
                );
                report.set_metadata("signature_unique_analyze", signature, true);
                info!(
                    "Analysis of {} finished with {} findings.",
                    package.display(),
                    report.total_findings()
                );
            }
            Err(e) => {
                self.record_failure(&mut report, &e);
                error!("Analysis of {} failed: {}", package.display(), e);
            }
        }

        report
    }

    fn run(
        &self,
        loader: &dyn ApkLoader,
        package: &Path,
        report: &mut ScanReport,
    ) -> Result<(), Error> {
        let start = Instant::now();
        report.set_status(Status::LoadingApk);
        if !package.is_file() {
            return Err(Kind::ApkNotFound {
                path: package.display().to_string(),
            }
            .into());
        }

        let absolute = fs::canonicalize(package).unwrap_or_else(|_| package.to_path_buf());
        report.set_metadata(
            "apk_filepath_absolute",
            absolute.display().to_string(),
            true,
        );
        let size = fs::metadata(package)?.len();
        report.set_metadata("apk_file_size", size as f64 / (1024.0 * 1024.0), true);
        report.set_metadata("time_starting_analyze", Utc::now().to_rfc3339(), true);

        let fingerprint = FingerPrint::from_file(package)?;
        let apk = loader.load(package)?;

        report.set_status(Status::StartingApk);
        let context = AnalysisContext::build(&*apk, package, &fingerprint, &self.filter, report)?;

        report.set_status(Status::StartingAnalysis);
        let analysis_start = Instant::now();

        report.set_status(Status::LoadingVectors);
        let debug_vector = self.options.debug_vector.as_ref().map(String::as_str);
        let vectors = self.registry.select_for_run(debug_vector);
        if vectors.is_empty() {
            warn!("no vector selected for the analysis");
        }

        report.set_status(Status::CheckingVectors);
        for vector in vectors {
            run_vector(vector, &context, report);
        }

        report.set_metadata("vector_total_count", report.total_findings(), true);
        let stop = Instant::now();
        report.set_metadata("time_total", seconds(stop - start), true);
        report.set_metadata("time_analyze", seconds(stop - analysis_start), true);
        report.set_metadata("time_loading_vm", seconds(analysis_start - start), true);

        report.set_status(Status::Success);
        report.set_metadata("time_finish_analyze", Utc::now().to_rfc3339(), true);
        Ok(())
    }

    /// Records the error in the report and marks the scan as failed.
    fn record_failure(&self, report: &mut ScanReport, e: &Error) {
        let kind = e
            .iter_chain()
            .filter_map(|cause| cause.downcast_ref::<Kind>())
            .next();

        let (id, expected, message) = match kind {
            Some(kind) => (kind.id(), kind.is_expected(), kind.to_string()),
            None => (UNEXPECTED_ERROR_ID, false, e.to_string()),
        };
        if kind.map_or(true, Kind::needs_detail) {
            report.set_metadata("analyze_error_detail_traceback", error_detail(e), true);
        }
        report.set_metadata("analyze_error_type_expected", expected, true);
        report.set_metadata("analyze_error_time", Utc::now().to_rfc3339(), true);
        report.set_metadata("analyze_error_id", id, true);
        report.set_metadata("analyze_error_message", message, true);

        report.set_status(Status::Fail);
        report.complete();

        let file_sha256 = report.metadata_str_or("file_sha256", "sha256");
        let analyze = signature(report.metadata_str_or("package_name", "pkg"), &file_sha256);
        let exception = signature(report.metadata_str_or("analyze_error_id", "err"), &file_sha256);
        report.set_metadata("signature_unique_analyze", analyze, true);
        report.set_metadata("signature_unique_exception", exception, true);
    }
}

/// Runs one vector, merging its findings in the report.
///
/// A vector that panics is logged and its findings are discarded, the rest of the vectors still
/// run.
fn run_vector(vector: &dyn Vector, context: &AnalysisContext<'_>, report: &mut ScanReport) {
    debug!("running vector {}", vector.name());
    let mut writer = FindingWriter::new();
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| vector.analyze(context, &mut writer)));

    match outcome {
        Ok(VectorOutcome::Ok) => report.merge(writer),
        Ok(VectorOutcome::PartialFailure(reasons)) => {
            for reason in reasons {
                warn!("vector {} skipped a branch: {}", vector.name(), reason);
            }
            report.merge(writer);
        }
        Err(_) => error!(
            "vector {} failed, its findings will not be reported",
            vector.name()
        ),
    }
}

/// Full description of an error: its causes and its backtrace, if any.
fn error_detail(e: &Error) -> String {
    let mut detail = e
        .iter_chain()
        .map(|cause| cause.to_string())
        .collect::<Vec<_>>()
        .join("\ncaused by: ");
    let backtrace = e.backtrace().to_string();
    if !backtrace.is_empty() {
        detail.push('\n');
        detail.push_str(&backtrace);
    }
    detail
}

fn seconds(duration: Duration) -> f64 {
    duration.as_secs() as f64 + f64::from(duration.subsec_nanos()) / 1e9
}

#[cfg(test)]
mod tests {
    use std::{io::Write, path::Path};

    use failure::{format_err, Error};
    use serde_json::Value;
    use tempfile::NamedTempFile;

    use super::{Engine, ScanOptions};
    use crate::{
        apk::{ApkLoader, ApkSource, CodeIndex},
        context::{tests::FakeApk, AnalysisContext},
        error::Kind,
        filter::ExclusionFilter,
        results::{FindingWriter, ScanReport, Status},
        vectors::{Registry, Vector, VectorFactory, VectorOutcome, CATALOGUE},
    };

    const SCENARIO: &str = r#"<manifest xmlns:android="http://schemas.android.com/apk/res/android"
                                         package="com.example.watcher">
        <uses-sdk android:minSdkVersion="29" android:targetSdkVersion="29"/>
        <application>
            <receiver android:name=".Watcher">
                <intent-filter>
                    <action android:name="android.intent.action.PACKAGE_ADDED"/>
                    <action android:name="android.intent.action.PACKAGE_REMOVED"/>
                </intent-filter>
            </receiver>
        </application>
    </manifest>"#;

    /// Loader building packages from a manifest.
    struct FakeLoader {
        manifest: &'static str,
        dex_count: usize,
    }

    impl ApkLoader for FakeLoader {
        fn load(&self, _: &Path) -> Result<Box<dyn ApkSource>, Error> {
            let mut apk = FakeApk::from_manifest(self.manifest);
            apk.dex_count = self.dex_count;
            Ok(Box::new(apk.with_code_index(CodeIndex::default())))
        }
    }

    /// Loader that can not unpack any package.
    struct BrokenLoader;

    impl ApkLoader for BrokenLoader {
        fn load(&self, package: &Path) -> Result<Box<dyn ApkSource>, Error> {
            Err(Kind::ArchiveCorrupted {
                message: format!("{} is not a zip file", package.display()),
            }
            .into())
        }
    }

    struct Panicking;

    impl Vector for Panicking {
        fn name(&self) -> &'static str {
            "aaa_panicking"
        }

        fn tags(&self) -> &'static [&'static str] {
            &["PANICKING"]
        }

        fn description(&self) -> &'static str {
            "Always panics."
        }

        fn analyze(&self, _: &AnalysisContext<'_>, writer: &mut FindingWriter) -> VectorOutcome {
            writer.start_finding("PANICKING", crate::level::Level::Info, "Partial", "Partial.");
            panic!("malformed branch");
        }
    }

    fn package_file() -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"PK\x03\x04 not really an apk").unwrap();
        file
    }

    fn engine(options: ScanOptions) -> Engine {
        Engine::new(Registry::discover(), ExclusionFilter::default(), options)
    }

    fn tags(report: &ScanReport) -> Vec<&str> {
        report.findings().iter().map(|f| f.tag()).collect()
    }

    #[test]
    fn it_scans_package() {
        let file = package_file();
        let loader = FakeLoader {
            manifest: SCENARIO,
            dex_count: 1,
        };
        let report = engine(ScanOptions::default()).scan(&loader, file.path());

        assert_eq!(report.status(), Status::Success);
        assert!(report.is_completed());
        assert_eq!(
            tags(&report),
            vec!["LISTEN_PACKAGE_ADDED", "LISTEN_PACKAGE_REMOVED"]
        );
        assert_eq!(report.metadata("vector_total_count"), Some(&Value::from(2)));
        assert_eq!(report.metadata("minSdk"), Some(&Value::from(29)));
        assert_eq!(report.metadata("analyze_mode"), Some(&Value::from("single")));
        assert_eq!(report.metadata("analyze_tag"), Some(&Value::Null));
        for key in &[
            "time_total",
            "time_analyze",
            "time_loading_vm",
            "time_finish_analyze",
            "apk_file_size",
            "file_sha512",
        ] {
            assert!(report.metadata(key).is_some(), "missing {}", key);
        }
        assert_eq!(
            report.metadata_str_or("signature_unique_analyze", "").len(),
            128
        );
        assert!(report.metadata("analyze_error_id").is_none());

        let printable: Vec<_> = report.printable_metadata().map(|(k, _)| k).collect();
        assert!(printable.contains(&"package_name"));
        assert!(!printable.contains(&"time_total"));
    }

    #[test]
    fn it_produces_identical_findings_on_repeated_scans() {
        let file = package_file();
        let loader = FakeLoader {
            manifest: SCENARIO,
            dex_count: 1,
        };
        let engine = engine(ScanOptions::default());
        let first = engine.scan(&loader, file.path());
        let second = engine.scan(&loader, file.path());

        assert_eq!(first.findings(), second.findings());
        assert_ne!(
            first.metadata("signature_unique_analyze"),
            second.metadata("signature_unique_analyze")
        );
    }

    #[test]
    fn it_fails_on_empty_package_name() {
        let file = package_file();
        let loader = FakeLoader {
            manifest: r#"<manifest package=" "/>"#,
            dex_count: 1,
        };
        let report = engine(ScanOptions::default()).scan(&loader, file.path());

        assert_eq!(report.status(), Status::Fail);
        assert!(report.is_completed());
        assert_eq!(
            report.metadata("analyze_error_id"),
            Some(&Value::from("package_name_empty"))
        );
        assert_eq!(
            report.metadata("analyze_error_type_expected"),
            Some(&Value::Bool(true))
        );
        assert!(report.metadata("analyze_error_detail_traceback").is_none());
        assert_eq!(
            report.metadata_str_or("signature_unique_analyze", "").len(),
            128
        );
        assert_eq!(
            report.metadata_str_or("signature_unique_exception", "").len(),
            128
        );
        assert!(report.findings().is_empty());
    }

    #[test]
    fn it_fails_without_code() {
        let file = package_file();
        let loader = FakeLoader {
            manifest: SCENARIO,
            dex_count: 0,
        };
        let report = engine(ScanOptions::default()).scan(&loader, file.path());

        assert_eq!(report.status(), Status::Fail);
        assert_eq!(
            report.metadata("analyze_error_id"),
            Some(&Value::from("classes_dex_not_in_apk"))
        );
        assert_eq!(
            report.metadata("package_name"),
            Some(&Value::from("com.example.watcher"))
        );
    }

    #[test]
    fn it_fails_on_missing_and_corrupted_files() {
        let engine = engine(ScanOptions::default());
        let loader = FakeLoader {
            manifest: SCENARIO,
            dex_count: 1,
        };
        let report = engine.scan(&loader, "/nonexistent/app.apk");
        assert_eq!(report.status(), Status::Fail);
        assert_eq!(
            report.metadata("analyze_error_id"),
            Some(&Value::from("apk_file_not_exist"))
        );

        let file = package_file();
        let report = engine.scan(&BrokenLoader, file.path());
        assert_eq!(report.status(), Status::Fail);
        assert_eq!(
            report.metadata("analyze_error_id"),
            Some(&Value::from("fail_to_unzip_apk_file"))
        );
        assert_eq!(
            report.metadata("analyze_error_type_expected"),
            Some(&Value::Bool(true))
        );
        assert!(report.metadata("analyze_error_detail_traceback").is_some());
    }

    #[test]
    fn it_records_unexpected_errors() {
        struct FailingLoader;

        impl ApkLoader for FailingLoader {
            fn load(&self, _: &Path) -> Result<Box<dyn ApkSource>, Error> {
                Err(format_err!("out of memory"))
            }
        }

        let file = package_file();
        let report = engine(ScanOptions::default()).scan(&FailingLoader, file.path());
        assert_eq!(report.status(), Status::Fail);
        assert_eq!(
            report.metadata("analyze_error_id"),
            Some(&Value::from("unexpected_error"))
        );
        assert_eq!(
            report.metadata("analyze_error_type_expected"),
            Some(&Value::Bool(false))
        );
        assert_eq!(
            report.metadata("analyze_error_message"),
            Some(&Value::from("out of memory"))
        );
    }

    #[test]
    fn it_survives_panicking_vectors() {
        fn panicking() -> Result<Box<dyn Vector>, Error> {
            Ok(Box::new(Panicking))
        }

        let mut factories: Vec<VectorFactory> = vec![panicking];
        factories.extend_from_slice(CATALOGUE);
        let engine = Engine::new(
            Registry::from_factories(&factories),
            ExclusionFilter::default(),
            ScanOptions::default(),
        );
        let file = package_file();
        let loader = FakeLoader {
            manifest: SCENARIO,
            dex_count: 1,
        };
        let report = engine.scan(&loader, file.path());

        assert_eq!(report.status(), Status::Success);
        assert_eq!(
            tags(&report),
            vec!["LISTEN_PACKAGE_ADDED", "LISTEN_PACKAGE_REMOVED"]
        );
    }

    #[test]
    fn it_runs_debug_vector_only() {
        let file = package_file();
        let loader = FakeLoader {
            manifest: SCENARIO,
            dex_count: 1,
        };

        let options = ScanOptions {
            debug_vector: Some("QUERY_ALL_PACKAGES".to_owned()),
            ..ScanOptions::default()
        };
        let report = engine(options).scan(&loader, file.path());
        assert_eq!(report.status(), Status::Success);
        assert!(report.findings().is_empty());

        let options = ScanOptions {
            debug_vector: Some("UNKNOWN_TAG".to_owned()),
            analyze_tag: Some("nightly".to_owned()),
            ..ScanOptions::default()
        };
        let report = engine(options).scan(&loader, file.path());
        assert_eq!(report.status(), Status::Success);
        assert_eq!(report.metadata("vector_total_count"), Some(&Value::from(0)));
        assert_eq!(report.metadata("analyze_tag"), Some(&Value::from("nightly")));
    }
}
