//! Analysis vectors.
//!
//! A vector is an independent rule that reads the analysis context and reports findings through
//! the writer it is given. Vectors are registered in a static catalogue, so adding one only needs
//! a new module and an entry in `CATALOGUE`.

mod broadcast;
mod manifest_flags;
mod packages;

use std::fmt;

use failure::Error;
use log::{debug, error};

pub use self::{broadcast::Broadcast, manifest_flags::ManifestFlags, packages::Packages};
use crate::{context::AnalysisContext, results::FindingWriter};

/// Result of running a vector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VectorOutcome {
    /// Every branch of the vector was checked.
    Ok,
    /// Some branches could not be checked. The findings of the rest are still valid.
    PartialFailure(Vec<String>),
}

impl VectorOutcome {
    /// Builds the outcome from the reasons of the failed branches.
    pub fn from_failures(failures: Vec<String>) -> Self {
        if failures.is_empty() {
            VectorOutcome::Ok
        } else {
            VectorOutcome::PartialFailure(failures)
        }
    }

    /// Whether every branch was checked.
    pub fn is_ok(&self) -> bool {
        *self == VectorOutcome::Ok
    }
}

/// Analysis rule.
pub trait Vector: Send + Sync {
    /// Module name of the vector, used to sort the catalogue.
    fn name(&self) -> &'static str;

    /// Tags of the findings the vector can report.
    fn tags(&self) -> &'static [&'static str];

    /// What the vector checks.
    fn description(&self) -> &'static str;

    /// Analyzes the package, writing the findings to the given writer.
    ///
    /// Vectors must not fail: problems found in one branch of the analysis are reported in the
    /// outcome, and the rest of the branches are still checked.
    fn analyze(&self, context: &AnalysisContext<'_>, writer: &mut FindingWriter)
        -> VectorOutcome;
}

impl fmt::Debug for dyn Vector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Vector")
            .field("name", &self.name())
            .field("tags", &self.tags())
            .finish()
    }
}

/// Constructor of a vector. Construction can fail, for example if the vector needs resources
/// that are not available.
pub type VectorFactory = fn() -> Result<Box<dyn Vector>, Error>;

/// Vectors shipped with the analyzer.
pub const CATALOGUE: &[VectorFactory] = &[load_broadcast, load_manifest_flags, load_packages];

fn load_broadcast() -> Result<Box<dyn Vector>, Error> {
    Ok(Box::new(Broadcast))
}

fn load_manifest_flags() -> Result<Box<dyn Vector>, Error> {
    Ok(Box::new(ManifestFlags))
}

fn load_packages() -> Result<Box<dyn Vector>, Error> {
    Ok(Box::new(Packages))
}

/// Metadata of a vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VectorDescriptor {
    /// Module name.
    pub name: &'static str,
    /// Reported tags.
    pub tags: &'static [&'static str],
    /// What the vector checks.
    pub description: &'static str,
}

/// Set of available vectors, sorted by name.
#[derive(Debug)]
pub struct Registry {
    vectors: Vec<Box<dyn Vector>>,
}

impl Registry {
    /// Loads every vector of the catalogue.
    pub fn discover() -> Self {
        Self::from_factories(CATALOGUE)
    }

    /// Loads the vectors built by the given factories.
    ///
    /// Vectors that fail to load are logged and skipped.
    pub fn from_factories(factories: &[VectorFactory]) -> Self {
        let mut vectors: Vec<Box<dyn Vector>> = factories
            .iter()
            .enumerate()
            .filter_map(|(i, factory)| match factory() {
                Ok(vector) => {
                    debug!("loaded vector {}", vector.name());
                    Some(vector)
                }
                Err(e) => {
                    error!("could not load vector #{}: {}", i, e);
                    None
                }
            })
            .collect();
        vectors.sort_by_key(|v| v.name());

        Self { vectors }
    }

    /// Number of loaded vectors.
    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    /// Whether no vector could be loaded.
    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// Metadata of the loaded vectors, in discovery order.
    pub fn descriptors(&self) -> Vec<VectorDescriptor> {
        self.vectors
            .iter()
            .map(|v| VectorDescriptor {
                name: v.name(),
                tags: v.tags(),
                description: v.description(),
            })
            .collect()
    }

    /// Tags and description of every vector. No analysis is run.
    pub fn list_tags(&self) -> Vec<(&'static [&'static str], &'static str)> {
        self.vectors
            .iter()
            .map(|v| (v.tags(), v.description()))
            .collect()
    }

    /// Selects the vectors to run.
    ///
    /// With a debug tag, only the vectors reporting that tag are selected. No match selects no
    /// vector.
    pub fn select_for_run(&self, debug_tag: Option<&str>) -> Vec<&dyn Vector> {
        self.vectors
            .iter()
            .map(|v| &**v)
            .filter(|v| debug_tag.map_or(true, |tag| v.tags().contains(&tag)))
            .collect()
    }
}

/// Runs a vector against an in-memory package.
#[cfg(test)]
pub(crate) fn run_on(
    vector: &dyn Vector,
    apk: &crate::context::tests::FakeApk,
    filter: &crate::filter::ExclusionFilter,
) -> (Vec<crate::results::Finding>, VectorOutcome) {
    use crate::results::{FingerPrint, ScanReport};

    let mut report = ScanReport::new();
    let context =
        AnalysisContext::build(apk, "test.apk", &FingerPrint::new(b""), filter, &mut report)
            .unwrap();
    let mut writer = FindingWriter::new();
    let outcome = vector.analyze(&context, &mut writer);
    (writer.findings().to_vec(), outcome)
}

#[cfg(test)]
mod tests {
    use failure::{format_err, Error};

    use super::{Registry, Vector, VectorFactory, VectorOutcome};
    use crate::{context::AnalysisContext, results::FindingWriter};

    struct Named(&'static str, &'static [&'static str]);

    impl Vector for Named {
        fn name(&self) -> &'static str {
            self.0
        }

        fn tags(&self) -> &'static [&'static str] {
            self.1
        }

        fn description(&self) -> &'static str {
            "Test vector."
        }

        fn analyze(&self, _: &AnalysisContext<'_>, _: &mut FindingWriter) -> VectorOutcome {
            VectorOutcome::Ok
        }
    }

    fn zeta() -> Result<Box<dyn Vector>, Error> {
        Ok(Box::new(Named("zeta", &["Z_ONE", "SHARED"])))
    }

    fn broken() -> Result<Box<dyn Vector>, Error> {
        Err(format_err!("missing resources"))
    }

    fn alpha() -> Result<Box<dyn Vector>, Error> {
        Ok(Box::new(Named("alpha", &["A_ONE", "SHARED"])))
    }

    const FACTORIES: &[VectorFactory] = &[zeta, broken, alpha];

    #[test]
    fn it_skips_failing_factories() {
        let registry = Registry::from_factories(FACTORIES);
        assert_eq!(registry.len(), 2);

        let names: Vec<_> = registry.descriptors().iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
    }

    #[test]
    fn it_selects_for_run() {
        let registry = Registry::from_factories(FACTORIES);

        assert_eq!(registry.select_for_run(None).len(), 2);
        assert_eq!(registry.select_for_run(Some("SHARED")).len(), 2);

        let selected = registry.select_for_run(Some("Z_ONE"));
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].name(), "zeta");

        assert!(registry.select_for_run(Some("UNKNOWN")).is_empty());
    }

    #[test]
    fn it_discovers_catalogue() {
        let registry = Registry::discover();
        let names: Vec<_> = registry.descriptors().iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["broadcast", "manifest_flags", "packages"]);

        let tags = registry.list_tags();
        assert!(tags
            .iter()
            .any(|(tags, _)| tags.contains(&"QUERY_ALL_PACKAGES")));
        assert!(tags.iter().all(|(_, description)| !description.is_empty()));
    }

    #[test]
    fn it_outcome() {
        assert!(VectorOutcome::from_failures(Vec::new()).is_ok());
        assert_eq!(
            VectorOutcome::from_failures(vec!["bad intent".to_owned()]),
            VectorOutcome::PartialFailure(vec!["bad intent".to_owned()])
        );
    }
}
