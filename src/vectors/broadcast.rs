//! Package broadcast listeners.
//!
//! Apps can learn which applications are installed on the device by listening to the package
//! broadcasts. Receivers declared in the manifest and receivers registered at runtime are
//! reported under different tags.

use super::{Vector, VectorOutcome};
use crate::{
    apk::{Element, MethodRef, ANDROID_NAME},
    context::AnalysisContext,
    level::Level,
    results::FindingWriter,
};

/// Package broadcast that can be listened to.
struct Listener {
    tag: &'static str,
    dynamic_tag: &'static str,
    actions: &'static [&'static str],
    title: &'static str,
    dynamic_title: &'static str,
    event: &'static str,
}

const LISTENERS: &[Listener] = &[
    Listener {
        tag: "LISTEN_PACKAGE_ADDED",
        dynamic_tag: "DYNAMIC_LISTEN_PACKAGE_ADDED",
        actions: &[
            "android.intent.action.PACKAGE_ADDED",
            "android.intent.action.PACKAGE_INSTALL",
        ],
        title: "App Listens for Added Applications",
        dynamic_title: "App Registers a Listener for Added Applications at Runtime",
        event: "installed",
    },
    Listener {
        tag: "LISTEN_PACKAGE_CHANGED",
        dynamic_tag: "DYNAMIC_LISTEN_PACKAGE_CHANGED",
        actions: &["android.intent.action.PACKAGE_CHANGED"],
        title: "App Listens for Changed Applications",
        dynamic_title: "App Registers a Listener for Changed Applications at Runtime",
        event: "changed",
    },
    Listener {
        tag: "LISTEN_PACKAGE_REPLACED",
        dynamic_tag: "DYNAMIC_LISTEN_PACKAGE_REPLACED",
        actions: &["android.intent.action.PACKAGE_REPLACED"],
        title: "App Listens for Replaced Applications",
        dynamic_title: "App Registers a Listener for Replaced Applications at Runtime",
        event: "replaced",
    },
    Listener {
        tag: "LISTEN_PACKAGE_REMOVED",
        dynamic_tag: "DYNAMIC_LISTEN_PACKAGE_REMOVED",
        actions: &[
            "android.intent.action.PACKAGE_REMOVED",
            "android.intent.action.PACKAGE_FULLY_REMOVED",
        ],
        title: "App Listens for Removed Applications",
        dynamic_title: "App Registers a Listener for Removed Applications at Runtime",
        event: "removed",
    },
];

const TAGS: &[&str] = &[
    "LISTEN_PACKAGE_ADDED",
    "LISTEN_PACKAGE_CHANGED",
    "LISTEN_PACKAGE_REPLACED",
    "LISTEN_PACKAGE_REMOVED",
    "DYNAMIC_LISTEN_PACKAGE_ADDED",
    "DYNAMIC_LISTEN_PACKAGE_CHANGED",
    "DYNAMIC_LISTEN_PACKAGE_REPLACED",
    "DYNAMIC_LISTEN_PACKAGE_REMOVED",
];

const INTENT_FILTER_CLASS: &str = "android.content.IntentFilter";

/// Checks for the package broadcasts the app listens to.
#[derive(Debug, Clone, Copy, Default)]
pub struct Broadcast;

impl Vector for Broadcast {
    fn name(&self) -> &'static str {
        "broadcast"
    }

    fn tags(&self) -> &'static [&'static str] {
        TAGS
    }

    fn description(&self) -> &'static str {
        "Checks for which broadcasts the app listens to."
    }

    fn analyze(&self, context: &AnalysisContext<'_>, writer: &mut FindingWriter) -> VectorOutcome {
        let mut failures = Vec::new();
        check_manifest_receivers(context.manifest(), writer, &mut failures);
        check_dynamic_receivers(context, writer);
        VectorOutcome::from_failures(failures)
    }
}

/// Reports every `action` of a receiver intent filter that listens to a package broadcast.
fn check_manifest_receivers(
    manifest: &Element,
    writer: &mut FindingWriter,
    failures: &mut Vec<String>,
) {
    for receiver in manifest.find_all("receiver") {
        let receiver_name = receiver.attr(ANDROID_NAME).unwrap_or("(unnamed)");
        for intent_filter in receiver.find_all("intent-filter") {
            for action in intent_filter.find_all("action") {
                let action_name = match action.attr(ANDROID_NAME) {
                    Some(name) => name,
                    None => {
                        failures.push(format!(
                            "action without name in receiver {}",
                            receiver_name
                        ));
                        continue;
                    }
                };

                if let Some(listener) = listener_for(action_name) {
                    writer.start_finding(
                        listener.tag,
                        Level::Warning,
                        listener.title,
                        format!(
                            "This app is notified when an application is {} on the device.",
                            listener.event
                        ),
                    );
                    writer.append_detail(format!("Receiver: {}", receiver_name));
                }
            }
        }
    }
}

/// Reports the code locations that register a receiver for a package broadcast.
fn check_dynamic_receivers(context: &AnalysisContext<'_>, writer: &mut FindingWriter) {
    for listener in LISTENERS {
        let mut locations: Vec<&MethodRef> = Vec::new();
        for action in listener.actions {
            let reads = context.code_index().string_reads(action);
            for read in context.filter().filter_variables(reads) {
                if registers_receiver(context, &read.reader) && !locations.contains(&&read.reader)
                {
                    locations.push(&read.reader);
                }
            }
        }

        if locations.is_empty() {
            continue;
        }
        writer.start_finding(
            listener.dynamic_tag,
            Level::Notice,
            listener.dynamic_title,
            format!(
                "This app registers at runtime a receiver that is notified when an application \
                 is {} on the device.",
                listener.event
            ),
        );
        for location in locations {
            writer.append_detail(location.display_name());
        }
    }
}

fn listener_for(action: &str) -> Option<&'static Listener> {
    LISTENERS.iter().find(|l| l.actions.contains(&action))
}

/// Checks if the method that reads an action literal uses it to listen to the broadcast.
fn registers_receiver(context: &AnalysisContext<'_>, reader: &MethodRef) -> bool {
    reader.name == "onReceive"
        || context.code_index().callees_of(reader).iter().any(|callee| {
            (callee.class_name == INTENT_FILTER_CLASS
                && (callee.name == "<init>" || callee.name == "addAction"))
                || callee.name == "registerReceiver"
        })
}
