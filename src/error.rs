//! Module containing the definition of error types.

use failure::Fail;

/// Enumeration of the different error kinds.
#[derive(Debug, Fail)]
pub enum Kind {
    /// The package file given for analysis does not exist.
    #[fail(display = "APK file not exist (File: {})", path)]
    ApkNotFound {
        /// Path of the missing package.
        path: String,
    },
    /// The package archive could not be unpacked.
    #[fail(display = "the package archive could not be unpacked: {}", message)]
    ArchiveCorrupted {
        /// Error message.
        message: String,
    },
    /// The package name resolved from the manifest is empty.
    #[fail(display = "Package name is empty (File: {})", path)]
    EmptyPackageName {
        /// Path of the analyzed package.
        path: String,
    },
    /// The package has no executable code units.
    #[fail(
        display = "Broken APK file. \"classes.dex\" file not found (File: {})",
        path
    )]
    NoDexPresent {
        /// Path of the analyzed package.
        path: String,
    },
    /// Configuration error.
    #[fail(display = "there was an error in the configuration: {}", message)]
    Config {
        /// Error message.
        message: String,
    },
    /// Parsing error.
    #[fail(display = "there was an error in the parsing process: {}", message)]
    Parse {
        /// Error message.
        message: String,
    },
    /// The external decompilation tool could not be run or failed.
    #[fail(display = "the decompilation tool failed: {}", message)]
    Decompilation {
        /// Error message.
        message: String,
    },
}

impl Kind {
    /// Stable short identifier of the error, recorded in the scan report.
    pub fn id(&self) -> &'static str {
        match *self {
            Kind::ApkNotFound { .. } => "apk_file_not_exist",
            Kind::ArchiveCorrupted { .. } => "fail_to_unzip_apk_file",
            Kind::EmptyPackageName { .. } => "package_name_empty",
            Kind::NoDexPresent { .. } => "classes_dex_not_in_apk",
            Kind::Config { .. } => "config_error",
            Kind::Parse { .. } => "parse_error",
            Kind::Decompilation { .. } => "decompilation_error",
        }
    }

    /// Whether the error belongs to the anticipated categories: package validation errors and
    /// archive corruption.
    pub fn is_expected(&self) -> bool {
        match *self {
            Kind::ApkNotFound { .. }
            | Kind::ArchiveCorrupted { .. }
            | Kind::EmptyPackageName { .. }
            | Kind::NoDexPresent { .. } => true,
            Kind::Config { .. } | Kind::Parse { .. } | Kind::Decompilation { .. } => false,
        }
    }

    /// Whether the full diagnostic detail of the error should be kept in the report.
    ///
    /// Validation errors carry everything in their message, the rest get the debug output too.
    pub fn needs_detail(&self) -> bool {
        match *self {
            Kind::ApkNotFound { .. } | Kind::EmptyPackageName { .. } | Kind::NoDexPresent { .. } => {
                false
            }
            _ => true,
        }
    }
}
