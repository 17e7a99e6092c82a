//! Command line interface of the analyzer.

use clap::{crate_version, App, Arg};

/// Generates the command line interface.
pub fn generate_cli() -> App<'static, 'static> {
    App::new("APK Vectors")
        .version(crate_version!())
        .about("Static analysis engine that detects package visibility and broadcast vectors in \
                Android applications")
        .arg(
            Arg::with_name("package")
                .help("The package to analyze, a path to an APK file")
                .value_name("package")
                .required_unless("list-vectors")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("verbose")
                .short("v")
                .long("verbose")
                .conflicts_with("quiet")
                .help("If you'd like the analyzer to tell you everything it does"),
        )
        .arg(
            Arg::with_name("quiet")
                .short("q")
                .long("quiet")
                .conflicts_with("verbose")
                .help("If you'd like a zen analyzer that only prints warnings and errors"),
        )
        .arg(
            Arg::with_name("force")
                .long("force")
                .help("If you'd like to force the package decoding, even if it was decoded before"),
        )
        .arg(
            Arg::with_name("list-vectors")
                .short("l")
                .long("list-vectors")
                .help("Lists the tags of every available vector and exits"),
        )
        .arg(
            Arg::with_name("debug-vector")
                .short("d")
                .long("debug-vector")
                .value_name("TAG")
                .takes_value(true)
                .help("Only runs the vectors that report the given tag"),
        )
        .arg(
            Arg::with_name("exclude")
                .short("e")
                .long("exclude")
                .value_name("PREFIX")
                .takes_value(true)
                .multiple(true)
                .number_of_values(1)
                .help("Class or package prefix excluded from the code analysis, replaces the \
                       configured ones"),
        )
        .arg(
            Arg::with_name("print")
                .short("p")
                .long("print")
                .help("Prints the metadata and the findings on the terminal"),
        )
        .arg(
            Arg::with_name("json")
                .short("j")
                .long("json")
                .help("Generates the results in JSON format"),
        )
        .arg(
            Arg::with_name("results")
                .long("results")
                .value_name("RESULTS")
                .takes_value(true)
                .help("Folder where to store the results"),
        )
        .arg(
            Arg::with_name("dist")
                .long("dist")
                .value_name("DIST")
                .takes_value(true)
                .help("Folder where to store the decoded packages"),
        )
        .arg(
            Arg::with_name("apktool")
                .long("apktool")
                .value_name("APKTOOL")
                .takes_value(true)
                .help("Path to the apktool JAR file"),
        )
        .arg(
            Arg::with_name("tag")
                .long("tag")
                .value_name("TAG")
                .takes_value(true)
                .help("Tag recorded in the report to identify this round of analysis"),
        )
        .arg(
            Arg::with_name("engine-build")
                .long("engine-build")
                .value_name("BUILD")
                .takes_value(true)
                .help("Build number of the analysis engine, recorded in the report"),
        )
        .arg(
            Arg::with_name("mode")
                .long("mode")
                .value_name("MODE")
                .takes_value(true)
                .help("Analysis mode, recorded in the report"),
        )
}
