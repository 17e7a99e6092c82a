//! Severity levels of the findings.

use std::{fmt, result, str::FromStr};

use failure::Error;
use serde::{Serialize, Serializer};

use crate::error::Kind;

/// Finding severity level.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Copy, Clone, Hash)]
pub enum Level {
    /// Information about the application.
    Info,
    /// Something a security reviewer should notice.
    Notice,
    /// Issue that should be reviewed, it might need a change.
    Warning,
    /// Very critical issue.
    Critical,
}

impl fmt::Display for Level {
    #[allow(clippy::use_debug)]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", format!("{:?}", self).to_lowercase())
    }
}

impl Serialize for Level {
    fn serialize<S>(&self, serializer: S) -> result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.to_string().as_str())
    }
}

impl FromStr for Level {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s.to_lowercase().as_str() {
            "critical" => Ok(Level::Critical),
            "warning" => Ok(Level::Warning),
            "notice" => Ok(Level::Notice),
            "info" => Ok(Level::Info),
            _ => Err(Kind::Parse {
                message: format!("unknown level `{}`", s),
            }
            .into()),
        }
    }
}
