//! Package visibility queries.
//!
//! Since API level 30 an app only sees the packages it declares in the `<queries>` element of
//! its manifest, unless it holds the `QUERY_ALL_PACKAGES` permission. Below that level every
//! installed package is visible, so the queried packages can not be told apart.

use std::fmt;

use super::{Vector, VectorOutcome};
use crate::{
    apk::{AttrKey, CallSite, Element, MethodRef, ANDROID_NAME},
    context::AnalysisContext,
    level::Level,
    results::FindingWriter,
};

/// First API level with package visibility filtering.
pub const PACKAGE_VISIBILITY_SDK: u32 = 30;

const QUERY_ALL_PACKAGES_PERMISSION: &str = "android.permission.QUERY_ALL_PACKAGES";

/// Methods that give information about the installed packages.
const QUERY_METHODS: &[&str] = &[
    "queryIntentActivities",
    "getInstalledApplications",
    "getPackageInfo",
];

const TAGS: &[&str] = &[
    "QUERY_ALL_PACKAGES",
    "QUERY_INTENT",
    "QUERY_PACKAGE",
    "QUERY_PERMISSION",
    "QUERY_UNKNOWN_PACKAGES",
];

const MIME_TYPE: AttrKey<'static> = AttrKey::android("mimeType");

/// Checks for the package queries performed by the app.
#[derive(Debug, Clone, Copy, Default)]
pub struct Packages;

impl Vector for Packages {
    fn name(&self) -> &'static str {
        "packages"
    }

    fn tags(&self) -> &'static [&'static str] {
        TAGS
    }

    fn description(&self) -> &'static str {
        "Checks for package queries performed by the app."
    }

    fn analyze(&self, context: &AnalysisContext<'_>, writer: &mut FindingWriter) -> VectorOutcome {
        let mut failures = Vec::new();
        let visibility_filtered = context.sdk_at_least(PACKAGE_VISIBILITY_SDK);
        let query_all = context.has_permission(QUERY_ALL_PACKAGES_PERMISSION);

        if visibility_filtered && query_all {
            writer.start_finding(
                "QUERY_ALL_PACKAGES",
                Level::Critical,
                "App Has Permission to Query All Packages",
                "This app has the permission QUERY_ALL_PACKAGES declared in its AndroidManifest. \
                 Caution is advised.",
            );
        }

        let query_sites = query_sites(context);
        if query_sites.is_empty() {
            return VectorOutcome::from_failures(failures);
        }

        if !visibility_filtered {
            writer.start_finding(
                "QUERY_UNKNOWN_PACKAGES",
                Level::Critical,
                "App Queries Installed Application(s)",
                "This app queries the device and knows about the applications that are \
                 installed. Cannot tell which applications because SDK version is below 30. \
                 Caution is advised.",
            );
            for line in call_lines(&query_sites) {
                writer.append_detail(line);
            }
            return VectorOutcome::from_failures(failures);
        }

        let queries = Queries::from_manifest(context.manifest(), &mut failures);
        if !queries.intents.is_empty() {
            writer.start_finding(
                "QUERY_INTENT",
                Level::Warning,
                "App Queries Application Intent(s)",
                "This app queries the device and knows about the applications that use the \
                 below intent and (un)detected data type. Caution is advised.",
            );
            for intent in &queries.intents {
                writer.append_detail(intent.to_string());
            }
        }

        if !queries.packages.is_empty() {
            writer.start_finding(
                "QUERY_PACKAGE",
                Level::Warning,
                "App Queries Installed Application(s)",
                "This app queries the device and knows if the applications below are \
                 installed. Caution is advised.",
            );
            for package in &queries.packages {
                writer.append_detail(package.as_str());
            }
        } else {
            writer.start_finding(
                "QUERY_PERMISSION",
                Level::Warning,
                "App Has No Permission to Query Installed Application(s)",
                "This app tries to query the device for installed applications without having \
                 the permission. The app might not behave correctly.",
            );
            for line in call_lines(&query_sites) {
                writer.append_detail(line);
            }
        }

        VectorOutcome::from_failures(failures)
    }
}

/// Calls to the package query methods from code that is not excluded.
fn query_sites<'i>(context: &AnalysisContext<'i>) -> Vec<CallSite<'i>> {
    QUERY_METHODS
        .iter()
        .flat_map(|method| {
            let sites = context.code_index().call_sites_to(method);
            context
                .filter()
                .filter_paths(&sites)
                .into_iter()
                .cloned()
                .collect::<Vec<_>>()
        })
        .collect()
}

/// One line per calling method, without repetitions.
fn call_lines(sites: &[CallSite<'_>]) -> Vec<String> {
    let mut callers: Vec<&MethodRef> = Vec::new();
    let mut lines = Vec::new();
    for site in sites {
        if !callers.contains(&site.caller) {
            callers.push(site.caller);
            lines.push(format!(
                "{} calls {}",
                site.caller.display_name(),
                site.callee.name
            ));
        }
    }
    lines
}

/// Intent declared in a `<queries>` element.
#[derive(Debug, Clone, PartialEq, Eq)]
struct QueriedIntent {
    action: String,
    mime_type: Option<String>,
}

impl fmt::Display for QueriedIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.mime_type {
            Some(ref mime_type) => write!(f, "{} using the data type {}", self.action, mime_type),
            None => write!(f, "{}", self.action),
        }
    }
}

/// Packages and intents declared in the `<queries>` elements of the manifest.
#[derive(Debug, Default)]
struct Queries {
    packages: Vec<String>,
    intents: Vec<QueriedIntent>,
}

impl Queries {
    /// Collects the declared queries. Malformed entries are skipped and reported in `failures`.
    fn from_manifest(manifest: &Element, failures: &mut Vec<String>) -> Self {
        let mut queries = Self::default();
        for query in manifest.find_all("queries") {
            for package in query.find_all("package") {
                match package.attr(ANDROID_NAME) {
                    Some(name) => queries.packages.push(name.to_owned()),
                    None => failures.push("queried package without name".to_owned()),
                }
            }

            for intent in query.find_all("intent") {
                let action = intent
                    .find_all("action")
                    .into_iter()
                    .next()
                    .and_then(|action| action.attr(ANDROID_NAME));
                let action = match action {
                    Some(action) => action.to_owned(),
                    None => {
                        failures.push("queried intent without action".to_owned());
                        continue;
                    }
                };
                let mime_type = intent
                    .find_all("data")
                    .into_iter()
                    .next()
                    .and_then(|data| data.attr(MIME_TYPE))
                    .map(str::to_owned);
                queries.intents.push(QueriedIntent { action, mime_type });
            }
        }
        queries
    }
}
