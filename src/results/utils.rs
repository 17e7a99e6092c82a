use std::{fs, path::Path};

use chrono::Utc;
use failure::{Error, ResultExt};
use serde_derive::Serialize;
use sha2::{Digest, Sha256, Sha512};
use uuid::Uuid;

use crate::level::Level;

/// Structure to store a reported issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Finding {
    tag: String,
    level: Level,
    title: String,
    description: String,
    details: Vec<String>,
}

impl Finding {
    /// Creates a new finding without detail lines.
    pub fn new<T, S, D>(tag: T, level: Level, title: S, description: D) -> Self
    where
        T: Into<String>,
        S: Into<String>,
        D: Into<String>,
    {
        Self {
            tag: tag.into(),
            level,
            title: title.into(),
            description: description.into(),
            details: Vec::new(),
        }
    }

    /// Gets the tag of the finding.
    pub fn tag(&self) -> &str {
        self.tag.as_str()
    }

    /// Gets the level of the finding.
    pub fn level(&self) -> Level {
        self.level
    }

    /// Gets the title of the finding.
    pub fn title(&self) -> &str {
        self.title.as_str()
    }

    /// Gets the description of the finding.
    pub fn description(&self) -> &str {
        self.description.as_str()
    }

    /// Gets the detail lines of the finding.
    pub fn details(&self) -> &[String] {
        &self.details
    }

    pub(crate) fn push_detail(&mut self, line: String) {
        self.details.push(line);
    }
}

/// Digests of the raw package file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FingerPrint {
    md5: String,
    sha1: String,
    sha256: String,
    sha512: String,
}

impl FingerPrint {
    /// Computes the fingerprint of the given bytes.
    pub fn new(buffer: &[u8]) -> Self {
        let mut sha1 = sha1::Sha1::new();
        sha1.update(buffer);

        let mut sha256 = Sha256::default();
        sha256.input(buffer);

        Self {
            md5: format!("{:x}", md5::compute(buffer)),
            sha1: sha1.digest().to_string(),
            sha256: hex::encode(sha256.result().as_slice()),
            sha512: sha512_hex(buffer),
        }
    }

    /// Computes the fingerprint of the file at the given path.
    pub fn from_file<P: AsRef<Path>>(package: P) -> Result<Self, Error> {
        let buffer = fs::read(package.as_ref())
            .with_context(|_| format!("could not read {}", package.as_ref().display()))?;
        Ok(Self::new(&buffer))
    }

    /// MD5 digest, in hexadecimal.
    pub fn md5(&self) -> &str {
        self.md5.as_str()
    }

    /// SHA-1 digest, in hexadecimal.
    pub fn sha1(&self) -> &str {
        self.sha1.as_str()
    }

    /// SHA-256 digest, in hexadecimal.
    pub fn sha256(&self) -> &str {
        self.sha256.as_str()
    }

    /// SHA-512 digest, in hexadecimal.
    pub fn sha512(&self) -> &str {
        self.sha512.as_str()
    }
}

fn sha512_hex(buffer: &[u8]) -> String {
    let mut sha512 = Sha512::default();
    sha512.input(buffer);
    hex::encode(sha512.result().as_slice())
}

/// Computes a scan signature: the SHA-512 of `{prefix}-{file_sha256}-{timestamp}-{nonce}`.
///
/// The timestamp and the 8 digit nonce make every signature unique, even for repeated scans of
/// the same package.
pub fn signature<P: AsRef<str>, F: AsRef<str>>(prefix: P, file_sha256: F) -> String {
    let now = Utc::now();
    let timestamp = now.timestamp() as f64 + f64::from(now.timestamp_subsec_micros()) / 1e6;
    let nonce = 10_000_000 + (Uuid::new_v4().as_u128() % 90_000_000) as u64;
    let original = format!(
        "{}-{}-{}-{}",
        prefix.as_ref(),
        file_sha256.as_ref(),
        timestamp,
        nonce
    );
    sha512_hex(original.as_bytes())
}
