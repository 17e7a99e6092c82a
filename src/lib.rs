//! APK vector analyzer.
//!
//! Static analysis engine for Android packages. A package is loaded and validated, and a set of
//! independent vectors is run against its manifest and code. Each vector reports findings, that
//! are collected, together with the scan metadata, in a report.

#![forbid(anonymous_parameters, unused_import_braces, unsafe_code)]
#![deny(unused_extern_crates)]
#![warn(
    missing_docs,
    trivial_casts,
    trivial_numeric_casts,
    unused_qualifications,
    variant_size_differences
)]

pub mod apk;
pub mod cli;
mod config;
pub mod context;
mod error;
pub mod filter;
mod level;
pub mod results;
pub mod scan;
mod utils;
pub mod vectors;

use std::{env, io::Write, path::PathBuf};

use clap::ArgMatches;
use colored::Colorize;
use failure::{Error, ResultExt};
use log::{Level as LogLevel, LevelFilter};

pub use crate::{
    config::Config,
    error::Kind as ErrorKind,
    level::Level,
    utils::{get_package_name, print_finding, print_warning},
};

/// Initialize the config with the config files and command line options.
///
/// On UNIX, if the local file (`config.toml`) does not exist, but the global one does
/// (`/etc/apk-vectors/config.toml`), the latter is used. Otherwise, the local file is used.
/// Finally, if none of the files could be loaded, the default config is used.
pub fn initialize_config(cli: &ArgMatches<'_>) -> Result<Config, Error> {
    let config_path = PathBuf::from("config.toml");
    let global_config_path = PathBuf::from("/etc/apk-vectors/config.toml");

    let mut config =
        if cfg!(target_family = "unix") && !config_path.exists() && global_config_path.exists() {
            Config::from_file(&global_config_path).context(
                "there was an error when reading the /etc/apk-vectors/config.toml file",
            )?
        } else if config_path.exists() {
            Config::from_file(&config_path)
                .context("there was an error when reading the config.toml file")?
        } else {
            print_warning("Config file not found. Using default configuration");
            Config::default()
        };

    config
        .decorate_with_cli(cli)
        .context("there was an error reading config from CLI")?;

    Ok(config)
}

/// Initializes the logger.
///
/// The `RUST_LOG` environment variable overrides the verbosity.
pub fn initialize_logger(is_verbose: bool) -> Result<(), Error> {
    let log_level = if is_verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    let mut builder = env_logger::Builder::new();
    let _ = builder.format(|buf, record| match record.level() {
        LogLevel::Warn => writeln!(
            buf,
            "{}{}",
            "Warning: ".bold().yellow(),
            record.args().to_string().yellow()
        ),
        LogLevel::Error => writeln!(
            buf,
            "{}{}",
            "Error: ".bold().red(),
            record.args().to_string().red()
        ),
        LogLevel::Debug => writeln!(
            buf,
            "{}{}",
            "Debug: ".bold(),
            record.args().to_string().bold()
        ),
        LogLevel::Info => writeln!(buf, "{}", record.args()),
        LogLevel::Trace => writeln!(buf, "{}: {}", record.level(), record.args()),
    });

    let _ = if let Ok(env_log) = env::var("RUST_LOG") {
        builder.parse(&env_log)
    } else {
        builder.filter(Some("apk_vectors"), log_level)
    };

    builder
        .try_init()
        .context("could not initialize the logger")?;
    Ok(())
}
