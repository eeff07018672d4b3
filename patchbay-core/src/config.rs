//! Engine configuration.
//!
//! All knobs are simple bounded integers with documented defaults. Loading
//! tolerates missing fields (serde defaults) and out-of-range values
//! (clamped, not rejected).

use std::path::Path;

use crate::transfer::{Energy, Fluids, Items, ResourceKind};
use crate::util;
use crate::{Result, Tick};

/// Default attempt period in ticks, shared by all kinds.
pub const DEFAULT_TICK_PERIOD: Tick = 10;

/// Per-kind tuning handed to a [`crate::Grid`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TransferConfig {
    /// Attempt period in ticks.
    pub period: Tick,
    /// Transfer bound per attempt: item batch, fluid volume or energy
    /// quantity.
    pub amount: u32,
}

impl TransferConfig {
    pub fn for_kind<K: ResourceKind>() -> TransferConfig {
        TransferConfig {
            period: DEFAULT_TICK_PERIOD,
            amount: K::DEFAULT_AMOUNT,
        }
    }
}

/// Top-level engine configuration, one section per resource kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub items: ItemsConfig,
    pub fluids: FluidsConfig,
    pub energy: EnergyConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ItemsConfig {
    /// Attempt period in ticks. Lower is faster.
    pub tick_period: Tick,
    /// How many items to move per attempt.
    pub move_batch: u32,
}

impl Default for ItemsConfig {
    fn default() -> Self {
        ItemsConfig {
            tick_period: DEFAULT_TICK_PERIOD,
            move_batch: Items::DEFAULT_AMOUNT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FluidsConfig {
    /// Attempt period in ticks. Lower is faster.
    pub tick_period: Tick,
    /// How much fluid to transfer per attempt.
    pub transfer_amount: u32,
    /// Infinite source production per tick.
    pub spring_rate: u32,
    /// Maximum backlog and single-push volume of an infinite source.
    pub spring_max_push: u32,
}

impl Default for FluidsConfig {
    fn default() -> Self {
        FluidsConfig {
            tick_period: DEFAULT_TICK_PERIOD,
            transfer_amount: Fluids::DEFAULT_AMOUNT,
            spring_rate: 250,
            spring_max_push: 4000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnergyConfig {
    /// Attempt period in ticks. Lower is faster.
    pub tick_period: Tick,
    /// How much energy to transfer per attempt.
    pub transfer_amount: u32,
}

impl Default for EnergyConfig {
    fn default() -> Self {
        EnergyConfig {
            tick_period: DEFAULT_TICK_PERIOD,
            transfer_amount: Energy::DEFAULT_AMOUNT,
        }
    }
}

impl SimConfig {
    /// Loads configuration from a TOML file and clamps every field into its
    /// documented range.
    pub fn from_path(path: &Path) -> Result<SimConfig> {
        let mut config: SimConfig =
            util::deser_struct_from_path(util::canonical(path))?;
        config.sanitize();
        Ok(config)
    }

    /// Clamps all fields into their documented ranges.
    pub fn sanitize(&mut self) {
        self.items.tick_period = self.items.tick_period.max(1).min(200);
        self.items.move_batch = self.items.move_batch.max(1).min(64);
        self.fluids.tick_period = self.fluids.tick_period.max(1).min(200);
        self.fluids.transfer_amount = self.fluids.transfer_amount.max(1).min(8000);
        self.fluids.spring_rate = self.fluids.spring_rate.max(1).min(1_000_000);
        self.fluids.spring_max_push =
            self.fluids.spring_max_push.max(250).min(1_000_000);
        self.energy.tick_period = self.energy.tick_period.max(1).min(200);
        self.energy.transfer_amount =
            self.energy.transfer_amount.max(1).min(1_000_000);
    }

    pub fn items_transfer(&self) -> TransferConfig {
        TransferConfig {
            period: self.items.tick_period,
            amount: self.items.move_batch,
        }
    }

    pub fn fluids_transfer(&self) -> TransferConfig {
        TransferConfig {
            period: self.fluids.tick_period,
            amount: self.fluids.transfer_amount,
        }
    }

    pub fn energy_transfer(&self) -> TransferConfig {
        TransferConfig {
            period: self.energy.tick_period,
            amount: self.energy.transfer_amount,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_yields_defaults() {
        let config: SimConfig = toml::from_str("").unwrap();
        assert_eq!(config.items.tick_period, 10);
        assert_eq!(config.items.move_batch, 8);
        assert_eq!(config.fluids.transfer_amount, 250);
        assert_eq!(config.fluids.spring_rate, 250);
        assert_eq!(config.fluids.spring_max_push, 4000);
        assert_eq!(config.energy.transfer_amount, 1000);
    }

    #[test]
    fn partial_toml_keeps_other_defaults() {
        let config: SimConfig = toml::from_str(
            r#"
            [items]
            move_batch = 16
            "#,
        )
        .unwrap();
        assert_eq!(config.items.move_batch, 16);
        assert_eq!(config.items.tick_period, 10);
        assert_eq!(config.energy.transfer_amount, 1000);
    }

    #[test]
    fn out_of_range_values_clamp() {
        let mut config: SimConfig = toml::from_str(
            r#"
            [items]
            tick_period = 0
            move_batch = 500
            [fluids]
            transfer_amount = 100000
            "#,
        )
        .unwrap();
        config.sanitize();
        assert_eq!(config.items.tick_period, 1);
        assert_eq!(config.items.move_batch, 64);
        assert_eq!(config.fluids.transfer_amount, 8000);
    }
}
