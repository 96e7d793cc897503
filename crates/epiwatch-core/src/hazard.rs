use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// Broad class of a reported hazard. Drives merge windows: human-case
/// hazards move fast, environmental ones slow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HazardClass {
    Human,
    Animal,
    Environmental,
}

/// Fixed hazard taxonomy for incoming reports. The taxonomy is closed:
/// an unknown tag on the ingestion boundary is a validation error, not a
/// new category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HazardTag {
    HumanZoonoticCase,
    HumanFeverCluster,
    RabiesSuspect,
    AnthraxSuspect,
    AnimalDieoff,
    AvianInfluenzaSuspect,
    WaterContamination,
    FoodContamination,
    VectorSurge,
}

impl HazardTag {
    /// All taxonomy values, used for validation messages.
    pub const ALL: [HazardTag; 9] = [
        HazardTag::HumanZoonoticCase,
        HazardTag::HumanFeverCluster,
        HazardTag::RabiesSuspect,
        HazardTag::AnthraxSuspect,
        HazardTag::AnimalDieoff,
        HazardTag::AvianInfluenzaSuspect,
        HazardTag::WaterContamination,
        HazardTag::FoodContamination,
        HazardTag::VectorSurge,
    ];

    pub fn class(&self) -> HazardClass {
        match self {
            Self::HumanZoonoticCase | Self::HumanFeverCluster => HazardClass::Human,
            Self::RabiesSuspect
            | Self::AnthraxSuspect
            | Self::AnimalDieoff
            | Self::AvianInfluenzaSuspect => HazardClass::Animal,
            Self::WaterContamination | Self::FoodContamination | Self::VectorSurge => {
                HazardClass::Environmental
            }
        }
    }

    /// High-risk subset: any contributing signal with one of these tags
    /// escalates event severity on merge.
    pub fn is_high_risk(&self) -> bool {
        matches!(
            self,
            Self::HumanZoonoticCase | Self::AnthraxSuspect | Self::AvianInfluenzaSuspect
        )
    }
}

impl fmt::Display for HazardTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::HumanZoonoticCase => "human_zoonotic_case",
            Self::HumanFeverCluster => "human_fever_cluster",
            Self::RabiesSuspect => "rabies_suspect",
            Self::AnthraxSuspect => "anthrax_suspect",
            Self::AnimalDieoff => "animal_dieoff",
            Self::AvianInfluenzaSuspect => "avian_influenza_suspect",
            Self::WaterContamination => "water_contamination",
            Self::FoodContamination => "food_contamination",
            Self::VectorSurge => "vector_surge",
        };
        write!(f, "{s}")
    }
}

impl FromStr for HazardTag {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "human_zoonotic_case" => Ok(Self::HumanZoonoticCase),
            "human_fever_cluster" => Ok(Self::HumanFeverCluster),
            "rabies_suspect" => Ok(Self::RabiesSuspect),
            "anthrax_suspect" => Ok(Self::AnthraxSuspect),
            "animal_dieoff" => Ok(Self::AnimalDieoff),
            "avian_influenza_suspect" => Ok(Self::AvianInfluenzaSuspect),
            "water_contamination" => Ok(Self::WaterContamination),
            "food_contamination" => Ok(Self::FoodContamination),
            "vector_surge" => Ok(Self::VectorSurge),
            _ => Err(CoreError::unknown_hazard(s)),
        }
    }
}
