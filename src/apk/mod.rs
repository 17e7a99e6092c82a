//! Parsed package facts consumed by the analysis.
//!
//! Unpacking the archive, disassembling the code units and building the cross-reference graph
//! happen outside of the analysis engine. This module defines the small interface the engine
//! reads from (`ApkSource`), the loader seam (`ApkLoader`) and the adapter used by the command
//! line tool, which works on packages decoded by apktool.

mod decoded;
pub mod manifest;
pub mod smali;
pub mod xref;

use std::{collections::BTreeSet, path::Path};

use failure::Error;

pub use self::{
    decoded::{ApktoolLoader, DecodedApk},
    manifest::{AttrKey, Element, ANDROID_NAME, ANDROID_NS},
    xref::{CallSite, CodeIndex, CodeIndexBuilder, MethodEntry, MethodRef, StringEntry, StringRead},
};

/// A parsed Android package.
pub trait ApkSource {
    /// Package name declared in the manifest.
    fn package_name(&self) -> &str;
    /// Version name, if declared.
    fn version_name(&self) -> Option<&str>;
    /// Version code, if declared. It is kept as text since it might not be a number.
    fn version_code(&self) -> Option<&str>;
    /// Raw `minSdkVersion` value, if declared.
    fn min_sdk_version(&self) -> Option<&str>;
    /// Raw `targetSdkVersion` value, if declared.
    fn target_sdk_version(&self) -> Option<&str>;
    /// Root element of the manifest.
    fn manifest(&self) -> &Element;
    /// Declared permissions.
    fn permissions(&self) -> &BTreeSet<String>;
    /// Number of executable code units (`classes*.dex`) in the package.
    fn dex_count(&self) -> usize;
    /// Cross-reference index of the package code.
    fn code_index(&self) -> &CodeIndex;
}

/// Loads packages from disk.
pub trait ApkLoader {
    /// Loads and parses the package at the given path.
    fn load(&self, package: &Path) -> Result<Box<dyn ApkSource>, Error>;
}
