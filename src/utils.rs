//! Console and path helpers shared by the analyzer.

use std::path::Path;

use colored::Colorize;
use log::warn;
use xml::ParserConfig;

use crate::level::Level;

/// XML parser configuration used for every decoded XML file.
pub fn parser_config() -> ParserConfig {
    ParserConfig::new()
        .trim_whitespace(true)
        .whitespace_to_characters(false)
        .cdata_to_characters(false)
        .ignore_comments(true)
        .coalesce_characters(true)
}

/// Prints a warning through the logger.
pub fn print_warning<S: AsRef<str>>(warning: S) {
    warn!("{}", warning.as_ref());
}

/// Prints a finding on the standard output, colored by level.
#[allow(clippy::print_stdout)]
pub fn print_finding<S: AsRef<str>>(title: S, level: Level) {
    let title = title.as_ref();
    let start = format!("[{}]", level);
    let (start, message) = match level {
        Level::Info => (start.normal(), title.normal()),
        Level::Notice => (start.cyan(), title.cyan()),
        Level::Warning => (start.yellow(), title.yellow()),
        Level::Critical => (start.red().bold(), title.red()),
    };
    println!("{} {}", start, message);
}

/// Gets the name used for the results of a package: its file name without extension.
pub fn get_package_name<P: AsRef<Path>>(package: P) -> String {
    package
        .as_ref()
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| String::from("package"))
}

/// Returns `true` if the string is empty once the surrounding whitespace is removed.
pub fn is_blank<S: AsRef<str>>(input: S) -> bool {
    input.as_ref().trim().is_empty()
}
