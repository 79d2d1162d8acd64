use crate::error::DoctorError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A `major.minor.build.revision` assembly version.
///
/// Field order matters: the derived `Ord` compares left to right, which is
/// exactly how the runtime orders assembly versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AssemblyVersion {
    pub major: u32,
    pub minor: u32,
    pub build: u32,
    pub revision: u32,
}

impl AssemblyVersion {
    pub const fn new(major: u32, minor: u32, build: u32, revision: u32) -> Self {
        Self {
            major,
            minor,
            build,
            revision,
        }
    }
}

impl FromStr for AssemblyVersion {
    type Err = DoctorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || DoctorError::VersionParse {
            value: s.to_string(),
        };

        let mut parts = [0u32; 4];
        let mut count = 0;
        for component in s.trim().split('.') {
            if count == parts.len() {
                return Err(invalid());
            }
            // u32::from_str accepts a leading '+', the runtime does not
            if component.is_empty() || !component.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid());
            }
            parts[count] = component.parse().map_err(|_| invalid())?;
            count += 1;
        }

        if count != parts.len() {
            return Err(invalid());
        }

        Ok(Self::new(parts[0], parts[1], parts[2], parts[3]))
    }
}

impl TryFrom<String> for AssemblyVersion {
    type Error = DoctorError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<AssemblyVersion> for String {
    fn from(version: AssemblyVersion) -> Self {
        version.to_string()
    }
}

impl fmt::Display for AssemblyVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.major, self.minor, self.build, self.revision
        )
    }
}
