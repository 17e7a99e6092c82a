//! Configuration module.
//!
//! Handles and configures the initial settings and variables needed to run the program. The
//! values come from the defaults, then the `config.toml` file, and finally the command line.

use std::{
    fs,
    path::{Path, PathBuf},
};

use clap::ArgMatches;
use failure::{Error, ResultExt};
use serde_derive::Deserialize;

use crate::{error::Kind, filter::DEFAULT_EXCLUSIONS};

/// Config structure.
///
/// Contains configuration related fields. It is used for storing the configuration parameters
/// and checking their values. Implements the `Default` trait.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Boolean to represent `--verbose` mode.
    verbose: bool,
    /// Boolean to represent `--quiet` mode.
    quiet: bool,
    /// Boolean to represent `--force` mode.
    force: bool,
    /// Boolean to represent `--print` mode.
    print: bool,
    /// Whether the JSON report is written.
    json: bool,
    /// Folder where the reports are written.
    results_folder: PathBuf,
    /// Folder where the packages are decoded.
    dist_folder: PathBuf,
    /// Path to the apktool JAR file.
    apktool_file: PathBuf,
    /// Analysis mode, recorded in the reports.
    analyze_mode: String,
    /// Analysis engine build number, recorded in the reports.
    analyze_engine_build: u32,
    /// Tag to distinguish this round of analysis.
    analyze_tag: Option<String>,
    /// Only run the vectors with this tag.
    debug_vector: Option<String>,
    /// Class and package prefixes excluded from the code analysis.
    exclusions: Vec<String>,
    /// Loaded configuration files.
    #[serde(skip)]
    loaded_files: Vec<PathBuf>,
}

impl Config {
    /// Loads the configuration from the given TOML file, on top of the defaults.
    pub fn from_file<P: AsRef<Path>>(config_path: P) -> Result<Self, Error> {
        let toml = fs::read_to_string(config_path.as_ref())
            .with_context(|_| format!("could not read {}", config_path.as_ref().display()))?;
        let mut config: Self = toml::from_str(&toml).map_err(|e| Kind::Config {
            message: format!("{}: {}", config_path.as_ref().display(), e),
        })?;
        config.loaded_files.push(config_path.as_ref().to_path_buf());
        Ok(config)
    }

    /// Modifies the options from the CLI.
    pub fn decorate_with_cli(&mut self, cli: &ArgMatches<'_>) -> Result<(), Error> {
        self.verbose = self.verbose || cli.is_present("verbose");
        self.quiet = self.quiet || cli.is_present("quiet");
        self.force = self.force || cli.is_present("force");
        self.print = self.print || cli.is_present("print");
        self.json = self.json || cli.is_present("json");

        if let Some(folder) = cli.value_of("results") {
            self.results_folder = PathBuf::from(folder);
        }
        if let Some(folder) = cli.value_of("dist") {
            self.dist_folder = PathBuf::from(folder);
        }
        if let Some(file) = cli.value_of("apktool") {
            self.apktool_file = PathBuf::from(file);
        }
        if let Some(mode) = cli.value_of("mode") {
            self.analyze_mode = mode.to_owned();
        }
        if let Some(build) = cli.value_of("engine-build") {
            self.analyze_engine_build = build.parse().map_err(|e| Kind::Config {
                message: format!("invalid engine build number `{}`: {}", build, e),
            })?;
        }
        if let Some(tag) = cli.value_of("tag") {
            self.analyze_tag = Some(tag.to_owned());
        }
        if let Some(tag) = cli.value_of("debug-vector") {
            self.set_debug_vector(tag);
        }
        if let Some(prefixes) = cli.values_of("exclude") {
            self.set_exclusions(prefixes);
        }

        if self.verbose && self.quiet {
            return Err(Kind::Config {
                message: "the verbose and quiet modes can not be used at the same time"
                    .to_owned(),
            }
            .into());
        }

        Ok(())
    }

    /// Returns the loaded configuration files.
    pub fn loaded_config_files(&self) -> impl Iterator<Item = &Path> {
        self.loaded_files.iter().map(PathBuf::as_path)
    }

    /// Returns true if the application is running in `--verbose` mode, false otherwise.
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    /// Returns true if the application is running in `--quiet` mode, false otherwise.
    pub fn is_quiet(&self) -> bool {
        self.quiet
    }

    /// Returns true if the application is running in `--force` mode, false otherwise.
    pub fn is_force(&self) -> bool {
        self.force
    }

    /// Returns true if the findings have to be printed on the terminal.
    pub fn is_print(&self) -> bool {
        self.print
    }

    /// Returns true if the JSON report has to be generated.
    pub fn has_to_generate_json(&self) -> bool {
        self.json
    }

    /// Returns the folder where the reports are written.
    pub fn results_folder(&self) -> &Path {
        &self.results_folder
    }

    /// Sets the folder where the reports are written.
    pub fn set_results_folder<P: Into<PathBuf>>(&mut self, folder: P) {
        self.results_folder = folder.into();
    }

    /// Returns the folder where the packages are decoded.
    pub fn dist_folder(&self) -> &Path {
        &self.dist_folder
    }

    /// Returns the path to the apktool JAR file.
    pub fn apktool_file(&self) -> &Path {
        &self.apktool_file
    }

    /// Returns the analysis mode.
    pub fn analyze_mode(&self) -> &str {
        self.analyze_mode.as_str()
    }

    /// Returns the analysis engine build number.
    pub fn analyze_engine_build(&self) -> u32 {
        self.analyze_engine_build
    }

    /// Returns the tag of this round of analysis, if any.
    pub fn analyze_tag(&self) -> Option<&str> {
        self.analyze_tag.as_ref().map(String::as_str)
    }

    /// Returns the tag of the vectors to debug, if any.
    pub fn debug_vector(&self) -> Option<&str> {
        self.debug_vector.as_ref().map(String::as_str)
    }

    /// Sets the tag of the vectors to debug.
    pub fn set_debug_vector<S: Into<String>>(&mut self, tag: S) {
        self.debug_vector = Some(tag.into());
    }

    /// Returns the excluded class and package prefixes.
    pub fn exclusions(&self) -> &[String] {
        &self.exclusions
    }

    /// Sets the excluded class and package prefixes.
    pub fn set_exclusions<I, S>(&mut self, exclusions: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclusions = exclusions.into_iter().map(Into::into).collect();
    }
}

impl Default for Config {
    /// Creates a default `Config` struct.
    fn default() -> Self {
        let share_path = Path::new("/usr/share/apk-vectors");
        let apktool_file = if cfg!(target_family = "unix") && share_path.exists() {
            share_path.join("vendor").join("apktool.jar")
        } else {
            PathBuf::from("vendor").join("apktool.jar")
        };

        Self {
            verbose: false,
            quiet: false,
            force: false,
            print: false,
            json: true,
            results_folder: PathBuf::from("results"),
            dist_folder: PathBuf::from("dist"),
            apktool_file,
            analyze_mode: String::from("single"),
            analyze_engine_build: 1,
            analyze_tag: None,
            debug_vector: None,
            exclusions: DEFAULT_EXCLUSIONS.iter().map(|&e| e.to_owned()).collect(),
            loaded_files: Vec::new(),
        }
    }
}
