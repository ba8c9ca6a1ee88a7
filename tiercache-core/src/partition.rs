//! Partitions: named, versioned cache buckets.
//!
//! A partition name is always `<purpose>-v<N>`. Bumping `N` on deploy is the
//! only invalidation mechanism for the durable tier; every partition that does
//! not belong to the active version is deleted wholesale at activation.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::Timestamp;

/// Logical purpose of a partition. At most one partition per purpose is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Purpose {
    Images,
    Api,
    Static,
    Pages,
}

impl Purpose {
    /// Every purpose, in a stable order.
    pub const ALL: [Purpose; 4] = [Self::Images, Self::Api, Self::Static, Self::Pages];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Images => "images",
            Self::Api => "api",
            Self::Static => "static",
            Self::Pages => "pages",
        }
    }
}

impl fmt::Display for Purpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Purpose {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "images" => Ok(Self::Images),
            "api" => Ok(Self::Api),
            "static" => Ok(Self::Static),
            "pages" => Ok(Self::Pages),
            _ => Err(()),
        }
    }
}

/// Versioned partition name (`images-v3`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PartitionName {
    purpose: Purpose,
    version: u32,
}

impl PartitionName {
    pub fn new(purpose: Purpose, version: u32) -> Self {
        Self { purpose, version }
    }

    pub fn purpose(&self) -> Purpose {
        self.purpose
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    /// Names of every partition a version requires.
    pub fn for_version(version: u32) -> Vec<PartitionName> {
        Purpose::ALL
            .iter()
            .map(|purpose| Self::new(*purpose, version))
            .collect()
    }

    /// Parse `<purpose>-v<N>`. Returns `None` for foreign names.
    pub fn parse(name: &str) -> Option<Self> {
        let (purpose, version) = name.rsplit_once("-v")?;
        let purpose = purpose.parse().ok()?;
        if version.is_empty() || !version.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let version = version.parse().ok()?;
        Some(Self { purpose, version })
    }
}

impl fmt::Display for PartitionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-v{}", self.purpose, self.version)
    }
}

/// Partition metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Partition {
    /// Stored name. Foreign partitions keep whatever name they were created with.
    pub name: String,
    /// Version parsed from the name, if it follows the versioned scheme.
    pub version: Option<u32>,
    pub created_at: Timestamp,
}

impl Partition {
    pub fn new(name: impl Into<String>, created_at: Timestamp) -> Self {
        let name = name.into();
        let version = PartitionName::parse(&name).map(|parsed| parsed.version());
        Self {
            name,
            version,
            created_at,
        }
    }

    /// Parsed versioned name, if any.
    pub fn versioned_name(&self) -> Option<PartitionName> {
        PartitionName::parse(&self.name)
    }
}
