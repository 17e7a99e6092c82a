//! JSON report generation module.

use std::{
    fs::{self, File},
    io::{BufWriter, Write},
};

use failure::{Error, ResultExt};
use log::debug;
use serde_json::ser;

use crate::{config::Config, results::report::Generator, results::ScanReport};

/// JSON report generator.
#[derive(Debug, Default)]
pub struct Json;

impl Json {
    /// Creates a new JSON report generator.
    pub fn new() -> Self {
        Json
    }
}

impl Generator for Json {
    fn generate(&mut self, config: &Config, name: &str, report: &ScanReport) -> Result<(), Error> {
        let folder = config.results_folder().join(name);
        fs::create_dir_all(&folder)
            .with_context(|_| format!("could not create {}", folder.display()))?;

        let path = folder.join("results.json");
        debug!("writing JSON report to {}", path.display());
        let mut f = BufWriter::new(
            File::create(&path).with_context(|_| format!("could not create {}", path.display()))?,
        );
        ser::to_writer_pretty(&mut f, report)?;
        f.flush()
            .with_context(|_| format!("could not write {}", path.display()))?;

        Ok(())
    }
}
