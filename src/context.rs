//! Analysis context shared by every vector of a scan.

use std::{collections::BTreeSet, path::Path};

use failure::Error;
use log::debug;
use serde_json::Value;

use crate::{
    apk::{ApkSource, CodeIndex, Element, MethodEntry, StringEntry},
    error::Kind,
    filter::ExclusionFilter,
    results::{FingerPrint, ScanReport},
    utils::is_blank,
};

/// SDK level assumed when the package does not declare `minSdkVersion`.
pub const DEFAULT_MIN_SDK: u32 = 1;

/// Read-only facts about the package being analyzed.
///
/// The context only borrows the parsed package and the exclusion filter, so vectors can not
/// mutate the parse state.
#[derive(Debug, Clone, Copy)]
pub struct AnalysisContext<'a> {
    package_name: &'a str,
    manifest: &'a Element,
    code_index: &'a CodeIndex,
    permissions: &'a BTreeSet<String>,
    min_sdk: u32,
    target_sdk: u32,
    filter: &'a ExclusionFilter,
}

impl<'a> AnalysisContext<'a> {
    /// Validates the package and builds the context for its analysis.
    ///
    /// Package facts, resolved SDK levels and the file digests are recorded in the report
    /// metadata. Fails with `EmptyPackageName` if the package name is blank and with
    /// `NoDexPresent` if the package has no code units.
    pub fn build<P: AsRef<Path>>(
        apk: &'a dyn ApkSource,
        package: P,
        fingerprint: &FingerPrint,
        filter: &'a ExclusionFilter,
        report: &mut ScanReport,
    ) -> Result<Self, Error> {
        let package_name = apk.package_name().trim();
        if is_blank(package_name) {
            return Err(Kind::EmptyPackageName {
                path: package.as_ref().display().to_string(),
            }
            .into());
        }

        report.set_metadata("platform", "Android", false);
        report.set_metadata("package_name", package_name, false);
        if let Some(version_name) = apk.version_name().filter(|v| !is_blank(v)) {
            report.set_metadata("package_version_name", version_name, false);
        }
        if let Some(version_code) = apk.version_code().filter(|v| !is_blank(v)) {
            let value = version_code
                .trim()
                .parse::<i64>()
                .map(Value::from)
                .unwrap_or_else(|_| Value::from(version_code));
            report.set_metadata("package_version_code", value, false);
        }

        if apk.dex_count() == 0 {
            return Err(Kind::NoDexPresent {
                path: package.as_ref().display().to_string(),
            }
            .into());
        }

        let (min_sdk, target_sdk) = resolve_sdk(apk.min_sdk_version(), apk.target_sdk_version());
        debug!("resolved SDK levels: min {}, target {}", min_sdk, target_sdk);
        report.set_metadata("minSdk", min_sdk, false);
        report.set_metadata("targetSdk", target_sdk, false);

        report.set_metadata("file_md5", fingerprint.md5(), false);
        report.set_metadata("file_sha1", fingerprint.sha1(), false);
        report.set_metadata("file_sha256", fingerprint.sha256(), false);
        report.set_metadata("file_sha512", fingerprint.sha512(), false);

        Ok(Self {
            package_name,
            manifest: apk.manifest(),
            code_index: apk.code_index(),
            permissions: apk.permissions(),
            min_sdk,
            target_sdk,
            filter,
        })
    }

    /// Package name, without surrounding whitespace.
    pub fn package_name(&self) -> &'a str {
        self.package_name
    }

    /// Root element of the manifest.
    pub fn manifest(&self) -> &'a Element {
        self.manifest
    }

    /// Cross-reference index of the package code.
    pub fn code_index(&self) -> &'a CodeIndex {
        self.code_index
    }

    /// Indexed methods.
    pub fn methods(&self) -> &'a [MethodEntry] {
        self.code_index.methods()
    }

    /// Indexed string literals.
    pub fn strings(&self) -> &'a [StringEntry] {
        self.code_index.strings()
    }

    /// Declared permissions.
    pub fn permissions(&self) -> &'a BTreeSet<String> {
        self.permissions
    }

    /// Checks if the given permission is declared.
    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.contains(permission)
    }

    /// Resolved minimum SDK level.
    pub fn min_sdk(&self) -> u32 {
        self.min_sdk
    }

    /// Resolved target SDK level.
    pub fn target_sdk(&self) -> u32 {
        self.target_sdk
    }

    /// Checks if either the target or the minimum SDK reaches the given level.
    pub fn sdk_at_least(&self, level: u32) -> bool {
        self.target_sdk >= level || self.min_sdk >= level
    }

    /// Exclusion filter configured for the scan.
    pub fn filter(&self) -> &'a ExclusionFilter {
        self.filter
    }
}

/// Resolves the declared SDK levels, following the manifest defaults: a missing or invalid
/// minimum is 1, and a missing or invalid target is the resolved minimum.
pub fn resolve_sdk(min_sdk: Option<&str>, target_sdk: Option<&str>) -> (u32, u32) {
    let min_sdk = parse_sdk(min_sdk).unwrap_or(DEFAULT_MIN_SDK);
    let target_sdk = parse_sdk(target_sdk).unwrap_or(min_sdk);
    (min_sdk, target_sdk)
}

fn parse_sdk(value: Option<&str>) -> Option<u32> {
    value.and_then(|v| v.trim().parse().ok())
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::BTreeSet;

    use serde_json::Value;

    use super::{resolve_sdk, AnalysisContext};
    use crate::{
        apk::{ApkSource, AttrKey, CodeIndex, Element},
        error::Kind,
        filter::ExclusionFilter,
        results::{FingerPrint, ScanReport},
    };

    /// In-memory package used as a test double.
    #[derive(Debug, Default)]
    pub(crate) struct FakeApk {
        pub(crate) package_name: String,
        pub(crate) version_name: Option<String>,
        pub(crate) version_code: Option<String>,
        pub(crate) min_sdk: Option<String>,
        pub(crate) target_sdk: Option<String>,
        pub(crate) manifest: Element,
        pub(crate) permissions: BTreeSet<String>,
        pub(crate) dex_count: usize,
        pub(crate) code_index: CodeIndex,
    }

    impl FakeApk {
        /// Package with the given manifest, one code unit and the SDK levels declared in the
        /// manifest `uses-sdk` element.
        pub(crate) fn from_manifest(manifest: &str) -> Self {
            let manifest: Element = manifest.parse().unwrap();
            let package_name = manifest
                .attr(AttrKey::plain("package"))
                .unwrap_or("")
                .to_owned();
            let uses_sdk = manifest.find_all("uses-sdk");
            let sdk = |name: &str| {
                uses_sdk
                    .first()
                    .and_then(|e| e.android_attr(name))
                    .map(str::to_owned)
            };
            let min_sdk = sdk("minSdkVersion");
            let target_sdk = sdk("targetSdkVersion");
            let permissions = manifest
                .find_all("uses-permission")
                .into_iter()
                .filter_map(|e| e.android_attr("name"))
                .map(str::to_owned)
                .collect();

            Self {
                package_name,
                min_sdk,
                target_sdk,
                permissions,
                dex_count: 1,
                manifest,
                ..Self::default()
            }
        }

        pub(crate) fn with_code_index(mut self, code_index: CodeIndex) -> Self {
            self.code_index = code_index;
            self
        }
    }

    impl ApkSource for FakeApk {
        fn package_name(&self) -> &str {
            &self.package_name
        }

        fn version_name(&self) -> Option<&str> {
            self.version_name.as_ref().map(String::as_str)
        }

        fn version_code(&self) -> Option<&str> {
            self.version_code.as_ref().map(String::as_str)
        }

        fn min_sdk_version(&self) -> Option<&str> {
            self.min_sdk.as_ref().map(String::as_str)
        }

        fn target_sdk_version(&self) -> Option<&str> {
            self.target_sdk.as_ref().map(String::as_str)
        }

        fn manifest(&self) -> &Element {
            &self.manifest
        }

        fn permissions(&self) -> &BTreeSet<String> {
            &self.permissions
        }

        fn dex_count(&self) -> usize {
            self.dex_count
        }

        fn code_index(&self) -> &CodeIndex {
            &self.code_index
        }
    }

    fn kind_of(error: &failure::Error) -> Option<&Kind> {
        error.downcast_ref::<Kind>()
    }

    #[test]
    fn it_resolves_sdk() {
        assert_eq!(resolve_sdk(None, None), (1, 1));
        assert_eq!(resolve_sdk(Some("21"), None), (21, 21));
        assert_eq!(resolve_sdk(Some("21"), Some("29")), (21, 29));
        assert_eq!(resolve_sdk(Some("L"), Some("")), (1, 1));
        assert_eq!(resolve_sdk(None, Some("30")), (1, 30));
        assert_eq!(resolve_sdk(Some(" 19 "), Some("@string/sdk")), (19, 19));
    }

    #[test]
    fn it_builds_context() {
        let mut apk = FakeApk::from_manifest(
            r#"<manifest xmlns:android="http://schemas.android.com/apk/res/android"
                         package=" com.example.app ">
                   <uses-sdk android:minSdkVersion="21"/>
                   <uses-permission android:name="android.permission.INTERNET"/>
               </manifest>"#,
        );
        apk.version_name = Some("1.2.0".to_owned());
        apk.version_code = Some("120".to_owned());
        let filter = ExclusionFilter::default();
        let fingerprint = FingerPrint::new(b"apk");
        let mut report = ScanReport::new();

        let context =
            AnalysisContext::build(&apk, "app.apk", &fingerprint, &filter, &mut report).unwrap();
        assert_eq!(context.package_name(), "com.example.app");
        assert_eq!(context.min_sdk(), 21);
        assert_eq!(context.target_sdk(), 21);
        assert!(!context.sdk_at_least(30));
        assert!(context.sdk_at_least(21));
        assert!(context.has_permission("android.permission.INTERNET"));
        assert_eq!(context.manifest().name(), "manifest");

        assert_eq!(report.metadata("platform"), Some(&Value::from("Android")));
        assert_eq!(
            report.metadata("package_name"),
            Some(&Value::from("com.example.app"))
        );
        assert_eq!(report.metadata("package_version_code"), Some(&Value::from(120)));
        assert_eq!(report.metadata("minSdk"), Some(&Value::from(21)));
        assert_eq!(report.metadata("targetSdk"), Some(&Value::from(21)));
        assert_eq!(
            report.metadata("file_sha256"),
            Some(&Value::from(fingerprint.sha256()))
        );
    }

    #[test]
    fn it_keeps_textual_version_code() {
        let mut apk = FakeApk::from_manifest(r#"<manifest package="com.example.app"/>"#);
        apk.version_code = Some("1.0-beta".to_owned());
        let filter = ExclusionFilter::default();
        let mut report = ScanReport::new();

        let context = AnalysisContext::build(
            &apk,
            "app.apk",
            &FingerPrint::new(b""),
            &filter,
            &mut report,
        )
        .unwrap();
        assert_eq!(context.min_sdk(), 1);
        assert_eq!(context.target_sdk(), 1);
        assert_eq!(
            report.metadata("package_version_code"),
            Some(&Value::from("1.0-beta"))
        );
        assert!(report.metadata("package_version_name").is_none());
    }

    #[test]
    fn it_rejects_empty_package_name() {
        let apk = FakeApk::from_manifest(r#"<manifest package="  "/>"#);
        let filter = ExclusionFilter::default();
        let mut report = ScanReport::new();

        let error = AnalysisContext::build(
            &apk,
            "app.apk",
            &FingerPrint::new(b""),
            &filter,
            &mut report,
        )
        .unwrap_err();
        assert_eq!(kind_of(&error).map(Kind::id), Some("package_name_empty"));
        assert!(report.metadata("package_name").is_none());
    }

    #[test]
    fn it_rejects_packages_without_code() {
        let mut apk = FakeApk::from_manifest(r#"<manifest package="com.example.app"/>"#);
        apk.dex_count = 0;
        let filter = ExclusionFilter::default();
        let mut report = ScanReport::new();

        let error = AnalysisContext::build(
            &apk,
            "app.apk",
            &FingerPrint::new(b""),
            &filter,
            &mut report,
        )
        .unwrap_err();
        assert_eq!(kind_of(&error).map(Kind::id), Some("classes_dex_not_in_apk"));
        assert_eq!(
            report.metadata("package_name"),
            Some(&Value::from("com.example.app"))
        );
        assert!(report.metadata("minSdk").is_none());
    }
}
