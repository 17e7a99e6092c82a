//! Packages decoded by apktool.

use std::{
    collections::BTreeSet,
    fs::{self, File},
    path::{Path, PathBuf},
    process::Command,
};

use failure::{Error, ResultExt};
use log::{debug, info};
use serde_derive::Deserialize;
use serde_yaml::Value as YamlValue;
use zip::ZipArchive;

use super::{
    manifest::{AttrKey, Element},
    smali, ApkLoader, ApkSource, CodeIndex,
};
use crate::{
    config::Config,
    error::Kind,
    results::FingerPrint,
    utils::{get_package_name, is_blank, print_warning},
};

/// File written in the decoded folder once apktool finishes, with the SHA-256 of the package.
const DECODED_MARKER: &str = ".apk-vectors-decoded";

/// Counts the executable code units (`classes.dex`, `classes2.dex`…) of the package archive.
///
/// An archive that can not be read as a ZIP file is reported as `ArchiveCorrupted`.
pub fn count_dex_units<P: AsRef<Path>>(package: P) -> Result<usize, Error> {
    let package = package.as_ref();
    let corrupted = |e: zip::result::ZipError| Kind::ArchiveCorrupted {
        message: format!("{}: {}", package.display(), e),
    };

    let file =
        File::open(package).with_context(|_| format!("could not open {}", package.display()))?;
    let mut zip = ZipArchive::new(file).map_err(corrupted)?;

    let mut count = 0;
    for i in 0..zip.len() {
        let entry = zip.by_index(i).map_err(corrupted)?;
        if is_dex_unit(entry.name()) {
            count += 1;
        }
    }
    Ok(count)
}

/// `classes.dex` or `classes<N>.dex` at the root of the archive.
fn is_dex_unit(name: &str) -> bool {
    if !name.starts_with("classes") || !name.ends_with(".dex") || name.len() < 11 {
        return false;
    }
    name["classes".len()..name.len() - ".dex".len()]
        .chars()
        .all(|c| c.is_ascii_digit())
}

/// `apktool.yml` contents, only the values apktool moves out of the manifest.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ApktoolMeta {
    sdk_info: Option<SdkInfo>,
    version_info: Option<VersionInfo>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct SdkInfo {
    min_sdk_version: Option<YamlValue>,
    target_sdk_version: Option<YamlValue>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct VersionInfo {
    version_code: Option<YamlValue>,
    version_name: Option<YamlValue>,
}

/// SDK and version values read from `apktool.yml`.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
struct ApktoolValues {
    min_sdk: Option<String>,
    target_sdk: Option<String>,
    version_code: Option<String>,
    version_name: Option<String>,
}

/// Reads the SDK and version values apktool moves out of the manifest.
fn parse_apktool_yml(yml: &str) -> Result<ApktoolValues, Error> {
    // The document starts with the `!!brut.androlib.meta.MetaInfo` class tag.
    let body = yml
        .lines()
        .skip_while(|line| line.trim_start().starts_with("!!"))
        .collect::<Vec<_>>()
        .join("\n");
    let meta: ApktoolMeta = serde_yaml::from_str(&body).map_err(|e| Kind::Parse {
        message: format!("invalid apktool.yml: {}", e),
    })?;

    let sdk_info = meta.sdk_info.unwrap_or_default();
    let version_info = meta.version_info.unwrap_or_default();
    Ok(ApktoolValues {
        min_sdk: scalar(sdk_info.min_sdk_version),
        target_sdk: scalar(sdk_info.target_sdk_version),
        version_code: scalar(version_info.version_code),
        version_name: scalar(version_info.version_name),
    })
}

fn scalar(value: Option<YamlValue>) -> Option<String> {
    let text = match value? {
        YamlValue::String(s) => s,
        YamlValue::Number(n) => n.to_string(),
        YamlValue::Bool(b) => b.to_string(),
        _ => return None,
    };
    if is_blank(&text) {
        None
    } else {
        Some(text)
    }
}

/// Package decoded by apktool into a folder.
#[derive(Debug)]
pub struct DecodedApk {
    package_name: String,
    version_name: Option<String>,
    version_code: Option<String>,
    min_sdk: Option<String>,
    target_sdk: Option<String>,
    manifest: Element,
    permissions: BTreeSet<String>,
    dex_count: usize,
    code_index: CodeIndex,
}

impl DecodedApk {
    /// Loads a package from the folder apktool decoded it into. The number of code units comes
    /// from the archive, see `count_dex_units()`.
    pub fn open<P: AsRef<Path>>(folder: P, dex_count: usize) -> Result<Self, Error> {
        let folder = folder.as_ref();
        let manifest_path = folder.join("AndroidManifest.xml");
        let manifest = Element::parse(
            File::open(&manifest_path)
                .with_context(|_| format!("could not open {}", manifest_path.display()))?,
        )?;

        let apktool_values = match fs::read_to_string(folder.join("apktool.yml")) {
            Ok(yml) => parse_apktool_yml(&yml).unwrap_or_else(|e| {
                print_warning(format!("{}, its values will be ignored", e));
                ApktoolValues::default()
            }),
            Err(e) => {
                debug!("no apktool.yml in {}: {}", folder.display(), e);
                ApktoolValues::default()
            }
        };

        let uses_sdk = manifest.find_all("uses-sdk");
        let sdk_attr = |local: &str| {
            uses_sdk
                .iter()
                .filter_map(|e| e.android_attr(local))
                .next()
                .map(str::to_owned)
        };

        let min_sdk = sdk_attr("minSdkVersion").or(apktool_values.min_sdk);
        let target_sdk = sdk_attr("targetSdkVersion").or(apktool_values.target_sdk);
        let version_code = manifest
            .android_attr("versionCode")
            .map(str::to_owned)
            .or(apktool_values.version_code);
        let version_name = manifest
            .android_attr("versionName")
            .map(str::to_owned)
            .or(apktool_values.version_name);

        let permissions = manifest
            .find_all("uses-permission")
            .into_iter()
            .chain(manifest.find_all("uses-permission-sdk-23"))
            .filter_map(|e| e.android_attr("name"))
            .map(str::to_owned)
            .collect();

        let folders = smali::smali_folders(folder)?;
        let code_index = smali::index_folders(&folders)?;

        Ok(Self {
            package_name: manifest
                .attr(AttrKey::plain("package"))
                .unwrap_or_default()
                .to_owned(),
            version_name,
            version_code,
            min_sdk,
            target_sdk,
            permissions,
            dex_count,
            code_index,
            manifest,
        })
    }
}

impl ApkSource for DecodedApk {
    fn package_name(&self) -> &str {
        self.package_name.as_str()
    }

    fn version_name(&self) -> Option<&str> {
        self.version_name.as_ref().map(String::as_str)
    }

    fn version_code(&self) -> Option<&str> {
        self.version_code.as_ref().map(String::as_str)
    }

    fn min_sdk_version(&self) -> Option<&str> {
        self.min_sdk.as_ref().map(String::as_str)
    }

    fn target_sdk_version(&self) -> Option<&str> {
        self.target_sdk.as_ref().map(String::as_str)
    }

    fn manifest(&self) -> &Element {
        &self.manifest
    }

    fn permissions(&self) -> &BTreeSet<String> {
        &self.permissions
    }

    fn dex_count(&self) -> usize {
        self.dex_count
    }

    fn code_index(&self) -> &CodeIndex {
        &self.code_index
    }
}

/// Loader that decodes packages with apktool before reading them.
#[derive(Debug, Clone)]
pub struct ApktoolLoader {
    apktool_file: PathBuf,
    dist_folder: PathBuf,
    force: bool,
}

impl ApktoolLoader {
    /// Creates a new loader.
    pub fn new<A, D>(apktool_file: A, dist_folder: D, force: bool) -> Self
    where
        A: Into<PathBuf>,
        D: Into<PathBuf>,
    {
        Self {
            apktool_file: apktool_file.into(),
            dist_folder: dist_folder.into(),
            force,
        }
    }

    /// Creates the loader from the configuration.
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.apktool_file(), config.dist_folder(), config.is_force())
    }

    /// Checks if the folder holds a complete decoding of the package with the given digest.
    fn is_decoded(decoded: &Path, sha256: &str) -> bool {
        fs::read_to_string(decoded.join(DECODED_MARKER))
            .map(|marker| marker.trim() == sha256)
            .unwrap_or(false)
    }

    /// Decodes the package, unless a complete decoding of the same package already exists and
    /// re-decoding is not forced.
    fn decompress(&self, package: &Path, decoded: &Path, sha256: &str) -> Result<(), Error> {
        if !self.force && Self::is_decoded(decoded, sha256) {
            info!(
                "Seems that the application has already been decoded in {}. There is no need to \
                 do it again.",
                decoded.display()
            );
            return Ok(());
        }
        if decoded.exists() {
            debug!("the decoded folder {} is stale, removing it", decoded.display());
            if let Err(e) = fs::remove_dir_all(decoded) {
                print_warning(format!(
                    "There was an error when removing the decompression folder: {}",
                    e
                ));
            }
        }

        debug!("decoding {} into {}", package.display(), decoded.display());
        let output = Command::new("java")
            .arg("-jar")
            .arg(&self.apktool_file)
            .arg("d")
            .arg("-f")
            .arg("-o")
            .arg(decoded)
            .arg(package)
            .output()
            .map_err(|e| Kind::Decompilation {
                message: format!("there was an error when executing apktool: {}", e),
            })?;

        if !output.status.success() {
            return Err(Kind::Decompilation {
                message: format!(
                    "apktool returned an error: {}",
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            }
            .into());
        }

        fs::write(decoded.join(DECODED_MARKER), sha256)
            .with_context(|_| format!("could not mark {} as decoded", decoded.display()))?;
        info!("The application has been decoded in {}.", decoded.display());
        Ok(())
    }
}

impl ApkLoader for ApktoolLoader {
    fn load(&self, package: &Path) -> Result<Box<dyn ApkSource>, Error> {
        let dex_count = count_dex_units(package)?;
        let fingerprint = FingerPrint::from_file(package)?;

        let decoded = self.dist_folder.join(get_package_name(package));
        self.decompress(package, &decoded, fingerprint.sha256())?;
        Ok(Box::new(DecodedApk::open(&decoded, dex_count)?))
    }
}
