//! Report generation module.

mod json;

use failure::Error;

use crate::{config::Config, results::ScanReport};

pub use self::json::Json;

/// Trait that represents a type that can generate a report.
pub trait Generator {
    /// Generates an actual report for the scan results stored under the given name.
    fn generate(&mut self, config: &Config, name: &str, report: &ScanReport) -> Result<(), Error>;
}
