use std::{collections::BTreeMap, fmt, ops::RangeInclusive, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::world::{ResourceKind, TriggerError};

/// Disaster kind; decides resource ranges, affected areas and road damage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioKind {
    Earthquake,
    Flood,
    Wildfire,
}

impl ScenarioKind {
    pub const ALL: [ScenarioKind; 3] = [
        ScenarioKind::Earthquake,
        ScenarioKind::Flood,
        ScenarioKind::Wildfire,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ScenarioKind::Earthquake => "earthquake",
            ScenarioKind::Flood => "flood",
            ScenarioKind::Wildfire => "wildfire",
        }
    }

    pub fn profile(self) -> &'static ScenarioProfile {
        match self {
            ScenarioKind::Earthquake => &EARTHQUAKE,
            ScenarioKind::Flood => &FLOOD,
            ScenarioKind::Wildfire => &WILDFIRE,
        }
    }
}

impl fmt::Display for ScenarioKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScenarioKind {
    type Err = TriggerError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "earthquake" => Ok(ScenarioKind::Earthquake),
            "flood" => Ok(ScenarioKind::Flood),
            "wildfire" => Ok(ScenarioKind::Wildfire),
            _ => Err(TriggerError::InvalidScenario(value.to_string())),
        }
    }
}

/// Which nodes a scenario hits.
#[derive(Debug, Clone, Copy)]
pub enum AffectedArea {
    /// Every node on the map.
    Everywhere,
    /// The listed node ids always, every other node with the given probability.
    Hotspots {
        ids: &'static [u32],
        spread_chance: f64,
    },
}

/// Static parameters of one scenario kind.
#[derive(Debug, Clone)]
pub struct ScenarioProfile {
    pub ambulances: RangeInclusive<u32>,
    pub drones: RangeInclusive<u32>,
    pub medical_kits: RangeInclusive<u32>,
    pub repair_crews: RangeInclusive<u32>,
    pub food_packs: RangeInclusive<u32>,
    pub road_block_chance: f64,
    pub highway_block_chance: f64,
    pub area: AffectedArea,
}

impl ScenarioProfile {
    pub fn range(&self, kind: ResourceKind) -> RangeInclusive<u32> {
        match kind {
            ResourceKind::Ambulance => self.ambulances.clone(),
            ResourceKind::Drone => self.drones.clone(),
            ResourceKind::MedicalKit => self.medical_kits.clone(),
            ResourceKind::RepairCrew => self.repair_crews.clone(),
            ResourceKind::FoodPack => self.food_packs.clone(),
        }
    }

    pub fn sample_resources<R: rand::Rng + ?Sized>(
        &self,
        rng: &mut R,
    ) -> BTreeMap<ResourceKind, u32> {
        ResourceKind::ALL
            .iter()
            .map(|&kind| (kind, rng.gen_range(self.range(kind))))
            .collect()
    }
}

const EARTHQUAKE: ScenarioProfile = ScenarioProfile {
    ambulances: 3..=8,
    drones: 1..=4,
    medical_kits: 20..=80,
    repair_crews: 1..=4,
    food_packs: 30..=100,
    road_block_chance: 0.20,
    highway_block_chance: 0.10,
    area: AffectedArea::Everywhere,
};

const FLOOD: ScenarioProfile = ScenarioProfile {
    ambulances: 2..=6,
    drones: 2..=6,
    medical_kits: 15..=60,
    repair_crews: 2..=6,
    food_packs: 40..=120,
    road_block_chance: 0.25,
    highway_block_chance: 0.15,
    area: AffectedArea::Hotspots {
        ids: &[3, 4, 6, 8, 9, 11, 19],
        spread_chance: 0.3,
    },
};

const WILDFIRE: ScenarioProfile = ScenarioProfile {
    ambulances: 1..=4,
    drones: 3..=8,
    medical_kits: 10..=40,
    repair_crews: 3..=8,
    food_packs: 20..=80,
    road_block_chance: 0.15,
    highway_block_chance: 0.05,
    area: AffectedArea::Hotspots {
        ids: &[2, 4, 6, 17],
        spread_chance: 0.2,
    },
};
