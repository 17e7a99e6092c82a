//! Application flags of the manifest.

use super::{Vector, VectorOutcome};
use crate::{
    apk::{AttrKey, Element},
    context::AnalysisContext,
    level::Level,
    results::FindingWriter,
};

const DEBUGGABLE: AttrKey<'static> = AttrKey::android("debuggable");
const ALLOW_BACKUP: AttrKey<'static> = AttrKey::android("allowBackup");

const TAGS: &[&str] = &["DEBUGGABLE", "ALLOW_BACKUP"];

/// Checks the debug and backup flags of the `application` element.
#[derive(Debug, Clone, Copy, Default)]
pub struct ManifestFlags;

impl Vector for ManifestFlags {
    fn name(&self) -> &'static str {
        "manifest_flags"
    }

    fn tags(&self) -> &'static [&'static str] {
        TAGS
    }

    fn description(&self) -> &'static str {
        "Checks if the application is debuggable or allows backups."
    }

    fn analyze(&self, context: &AnalysisContext<'_>, writer: &mut FindingWriter) -> VectorOutcome {
        let mut failures = Vec::new();
        for application in context.manifest().find_all("application") {
            if flag(application, DEBUGGABLE, &mut failures) {
                writer.start_finding(
                    "DEBUGGABLE",
                    Level::Critical,
                    "Manifest Debug",
                    "The application is in debug mode. This allows any malicious person to \
                     inject arbitrary code in the application. This option should only be used \
                     while in development.",
                );
                writer.append_detail("android:debuggable=\"true\"");
            }

            if flag(application, ALLOW_BACKUP, &mut failures) {
                writer.start_finding(
                    "ALLOW_BACKUP",
                    Level::Notice,
                    "Allows Backup",
                    "This option allows backups of the application data via adb. Malicious \
                     people with physical access could use adb to get private data of your app \
                     into their PC.",
                );
                writer.append_detail("android:allowBackup=\"true\"");
            }
        }
        VectorOutcome::from_failures(failures)
    }
}

/// Reads a boolean attribute. Values that are not booleans, such as resource references, are
/// reported in `failures` and read as `false`.
fn flag(element: &Element, key: AttrKey<'_>, failures: &mut Vec<String>) -> bool {
    match element.attr(key).map(str::trim) {
        None => false,
        Some(value) if value.eq_ignore_ascii_case("true") => true,
        Some(value) if value.eq_ignore_ascii_case("false") => false,
        Some(value) => {
            failures.push(format!(
                "invalid value `{}` for the `{}` attribute",
                value,
                key.local_name()
            ));
            false
        }
    }
}
