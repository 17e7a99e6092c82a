//! APK vector analyzer command line tool.

#![forbid(anonymous_parameters, unused_extern_crates, unsafe_code)]
#![warn(missing_docs, trivial_casts, trivial_numeric_casts, unused_qualifications)]

use std::{path::Path, process};

use colored::Colorize;
use failure::Error;
use log::info;

use apk_vectors::{
    apk::ApktoolLoader,
    cli::generate_cli,
    get_package_name, initialize_config, initialize_logger, print_finding,
    results::{
        report::{Generator, Json},
        ScanReport,
    },
    scan::Engine,
};

/// Program entry point.
///
/// Only configuration and setup errors end the program with an error code. A failed scan is
/// still reported.
fn main() {
    if let Err(e) = run() {
        eprintln!("{}{}", "Error: ".bold().red(), e.to_string().red());
        for cause in e.iter_causes() {
            eprintln!("\t{}{}", "Caused by: ".bold(), cause);
        }
        process::exit(1);
    }
}

/// Analyzes the package given in the command line.
fn run() -> Result<(), Error> {
    let cli = generate_cli().get_matches();
    let config = initialize_config(&cli)?;
    initialize_logger(config.is_verbose())?;

    for file in config.loaded_config_files() {
        info!("Configuration loaded from {}.", file.display());
    }

    let engine = Engine::from_config(&config);
    if cli.is_present("list-vectors") {
        list_vectors(&engine);
        return Ok(());
    }

    let package = match cli.value_of("package") {
        Some(package) => Path::new(package),
        None => return Ok(()),
    };
    if !config.is_quiet() {
        println!();
        println!("Starting analysis of {}.", package.display().to_string().italic());
    }

    let loader = ApktoolLoader::from_config(&config);
    let report = engine.scan(&loader, package);

    if config.is_print() {
        print_report(&report);
    }
    if config.has_to_generate_json() {
        let name = get_package_name(package);
        Json::new().generate(&config, &name, &report)?;
        if !config.is_quiet() {
            println!(
                "Report written to {}.",
                config.results_folder().join(&name).join("results.json").display()
            );
        }
    }

    if !config.is_quiet() {
        println!("Analysis status: {}.", report.status());
    }
    Ok(())
}

/// Prints the tags and description of every vector.
fn list_vectors(engine: &Engine) {
    for descriptor in engine.registry().descriptors() {
        println!("{}: {}", descriptor.name.bold(), descriptor.description);
        for tag in descriptor.tags {
            println!("    {}", tag);
        }
    }
}

/// Prints the printable metadata and the findings of the report.
fn print_report(report: &ScanReport) {
    println!();
    for (key, value) in report.printable_metadata() {
        match value.as_str() {
            Some(text) => println!("{}: {}", key.bold(), text),
            None => println!("{}: {}", key.bold(), value),
        }
    }

    println!();
    for finding in report.findings() {
        print_finding(
            format!("<{}> {}", finding.tag(), finding.title()),
            finding.level(),
        );
        println!("        {}", finding.description());
        for line in finding.details() {
            println!("            {}", line);
        }
    }
    println!();
    println!("Total findings: {}", report.total_findings());
}
