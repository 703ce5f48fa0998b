//! Data source variants.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use privid_common::error::{PrividError, PrividResult};

/// Which rendition of a recorded scene a query reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    /// Unmasked detector output. Used for ground truth.
    Original,
    /// Masked output partitioned into independently bounded regions.
    SpatialHybrid,
    /// Masked output over the whole scene.
    JustHybrid,
    /// Reserved; no raw layout or shaping rules exist for it yet.
    OriginalWithHybrid,
}

impl DataSource {
    /// Stable tag used in cache keys.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Original => "ORIGINAL",
            Self::SpatialHybrid => "SPATIAL_HYBRID",
            Self::JustHybrid => "JUST_HYBRID",
            Self::OriginalWithHybrid => "ORIGINAL_WITH_HYBRID",
        }
    }

    /// Whether per-chunk results carry one value per spatial split.
    pub fn is_split(&self) -> bool {
        match self {
            Self::SpatialHybrid => true,
            Self::Original | Self::JustHybrid | Self::OriginalWithHybrid => false,
        }
    }

    /// Suffix of the persistence distribution measured for this source.
    pub fn persistence_kind(&self) -> PrividResult<&'static str> {
        match self {
            Self::Original => Ok("orig"),
            Self::SpatialHybrid | Self::JustHybrid => Ok("hybrid"),
            Self::OriginalWithHybrid => Err(self.unsupported()),
        }
    }

    /// Error for operations the reserved variant does not define.
    pub fn unsupported(&self) -> PrividError {
        PrividError::unsupported(format!("Data source {} is not implemented", self.tag()))
    }
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for DataSource {
    type Err = PrividError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "original" => Ok(Self::Original),
            "spatial_hybrid" => Ok(Self::SpatialHybrid),
            "just_hybrid" => Ok(Self::JustHybrid),
            "original_with_hybrid" => Ok(Self::OriginalWithHybrid),
            other => Err(PrividError::config(format!("Unknown data source '{other}'"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_accepts_tags_and_kebab_case() {
        assert_eq!(
            "SPATIAL_HYBRID".parse::<DataSource>().unwrap(),
            DataSource::SpatialHybrid
        );
        assert_eq!(
            "just-hybrid".parse::<DataSource>().unwrap(),
            DataSource::JustHybrid
        );
        assert!("hybrid".parse::<DataSource>().is_err());
    }

    #[test]
    fn persistence_kind_per_source() {
        assert_eq!(DataSource::Original.persistence_kind().unwrap(), "orig");
        assert_eq!(DataSource::JustHybrid.persistence_kind().unwrap(), "hybrid");
        assert_eq!(
            DataSource::SpatialHybrid.persistence_kind().unwrap(),
            "hybrid"
        );
        assert!(matches!(
            DataSource::OriginalWithHybrid.persistence_kind(),
            Err(PrividError::Unsupported { .. })
        ));
    }

    #[test]
    fn serde_uses_snake_case() {
        let json = serde_json::to_string(&DataSource::JustHybrid).unwrap();
        assert_eq!(json, "\"just_hybrid\"");
    }
}
