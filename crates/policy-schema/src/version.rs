use std::fmt;
use std::str::FromStr;

use semver::Version;
use serde::{Deserialize, Serialize};

use crate::SchemaError;

const API_GROUP: &str = "governance";

/// Policy schema versions with an embedded contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub enum SchemaVersion {
    #[default]
    #[serde(rename = "v1.0.0")]
    V1_0_0,
    #[serde(rename = "v1.1.0")]
    V1_1_0,
}

impl SchemaVersion {
    pub const ALL: [SchemaVersion; 2] = [SchemaVersion::V1_0_0, SchemaVersion::V1_1_0];

    /// Accepts `v1.0.0`, `1.0.0` or an apiVersion such as `governance/v1.0.0`.
    pub fn parse(input: &str) -> Result<Self, SchemaError> {
        let trimmed = input.trim();
        let bare = trimmed
            .strip_prefix(API_GROUP)
            .and_then(|rest| rest.strip_prefix('/'))
            .unwrap_or(trimmed);
        let numeric = bare.strip_prefix('v').unwrap_or(bare);

        let version = Version::parse(numeric)
            .map_err(|_| SchemaError::UnsupportedVersion(input.to_string()))?;

        match (version.major, version.minor, version.patch) {
            (1, 0, 0) if version.pre.is_empty() => Ok(SchemaVersion::V1_0_0),
            (1, 1, 0) if version.pre.is_empty() => Ok(SchemaVersion::V1_1_0),
            _ => Err(SchemaError::UnsupportedVersion(input.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SchemaVersion::V1_0_0 => "v1.0.0",
            SchemaVersion::V1_1_0 => "v1.1.0",
        }
    }

    /// The `apiVersion` value a document of this version carries.
    pub fn api_version(&self) -> String {
        format!("{}/{}", API_GROUP, self.as_str())
    }

    pub(crate) fn contract(&self) -> &'static str {
        match self {
            SchemaVersion::V1_0_0 => {
                include_str!("../../../contracts/policies/policy.v1.0.0.json")
            }
            SchemaVersion::V1_1_0 => {
                include_str!("../../../contracts/policies/policy.v1.1.0.json")
            }
        }
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SchemaVersion {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SchemaVersion::parse(s)
    }
}
