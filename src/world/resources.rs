use std::{collections::BTreeMap, fmt};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Ambulance,
    Drone,
    MedicalKit,
    RepairCrew,
    FoodPack,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 5] = [
        ResourceKind::Ambulance,
        ResourceKind::Drone,
        ResourceKind::MedicalKit,
        ResourceKind::RepairCrew,
        ResourceKind::FoodPack,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKind::Ambulance => "ambulance",
            ResourceKind::Drone => "drone",
            ResourceKind::MedicalKit => "medical_kit",
            ResourceKind::RepairCrew => "repair_crew",
            ResourceKind::FoodPack => "food_pack",
        }
    }

    /// Fleets come back after a dispatch; supplies are spent.
    pub fn is_reusable(self) -> bool {
        matches!(self, ResourceKind::Ambulance | ResourceKind::Drone)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Amount per resource kind.
pub type Allocation = BTreeMap<ResourceKind, u32>;

/// Stock held before any disaster and after a reset.
pub fn baseline_allocation() -> Allocation {
    BTreeMap::from([
        (ResourceKind::Ambulance, 5),
        (ResourceKind::Drone, 3),
        (ResourceKind::MedicalKit, 40),
        (ResourceKind::RepairCrew, 2),
        (ResourceKind::FoodPack, 50),
    ])
}

/// Available stock against the allocation it was issued from.
///
/// `available` never exceeds `initial`; `used` counts every unit handed out,
/// including fleet dispatches that were later released.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceLedger {
    available: Allocation,
    initial: Allocation,
    used: Allocation,
}

impl ResourceLedger {
    pub fn new(allocation: Allocation) -> Self {
        let mut initial = Allocation::new();
        for kind in ResourceKind::ALL {
            initial.insert(kind, allocation.get(&kind).copied().unwrap_or(0));
        }
        Self {
            available: initial.clone(),
            used: ResourceKind::ALL.iter().map(|&kind| (kind, 0)).collect(),
            initial,
        }
    }

    pub fn available(&self, kind: ResourceKind) -> u32 {
        self.available.get(&kind).copied().unwrap_or(0)
    }

    pub fn initial(&self, kind: ResourceKind) -> u32 {
        self.initial.get(&kind).copied().unwrap_or(0)
    }

    pub fn used(&self, kind: ResourceKind) -> u32 {
        self.used.get(&kind).copied().unwrap_or(0)
    }

    pub fn available_all(&self) -> &Allocation {
        &self.available
    }

    pub fn initial_all(&self) -> &Allocation {
        &self.initial
    }

    pub fn used_all(&self) -> &Allocation {
        &self.used
    }

    /// Removes up to `amount` units and returns how many were taken.
    pub fn take(&mut self, kind: ResourceKind, amount: u32) -> u32 {
        let stock = self.available.entry(kind).or_insert(0);
        let taken = amount.min(*stock);
        *stock -= taken;
        *self.used.entry(kind).or_insert(0) += taken;
        taken
    }

    /// Returns up to `amount` units, never past the initial allocation.
    pub fn give_back(&mut self, kind: ResourceKind, amount: u32) -> u32 {
        let cap = self.initial(kind);
        let stock = self.available.entry(kind).or_insert(0);
        let returned = amount.min(cap.saturating_sub(*stock));
        *stock += returned;
        returned
    }

    /// Adds fresh units, raising the allocation when stock is already at it.
    pub fn enlist(&mut self, kind: ResourceKind, amount: u32) {
        let stock = self.available.entry(kind).or_insert(0);
        *stock += amount;
        let stock = *stock;
        let initial = self.initial.entry(kind).or_insert(0);
        *initial = (*initial).max(stock);
    }

    /// Puts every kind back at its initial allocation.
    pub fn restore(&mut self) {
        self.available = self.initial.clone();
    }
}

impl Default for ResourceLedger {
    fn default() -> Self {
        Self::new(baseline_allocation())
    }
}
