//! Crafting bonus: shrinks rolled-up quantities by the player's fort, armor and tradeskill bonuses.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

const FORT_BONUS: f64 = 10.0;
const MAX_ARMOR_BONUS: f64 = 10.0;
const MAX_TRADESKILL: u32 = 250;
/// Bonus points per tradeskill level above 1. Kept as published upstream.
const TRADESKILL_SLOPE: f64 = 300.0 / 249.0;
const MAX_TOTAL_BONUS: f64 = 100.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CraftingBonus {
    pub fort: bool,
    /// Percent from armor perks, clamped to [0, 10].
    pub armor_pct: f64,
    /// Tradeskill level, clamped to [1, 250].
    pub tradeskill: u32,
}

impl CraftingBonus {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn new(fort: bool, armor_pct: f64, tradeskill: u32) -> Self {
        Self {
            fort,
            armor_pct,
            tradeskill,
        }
    }

    /// Summed bonus in percent, capped at 100.
    pub fn total_bonus(&self) -> f64 {
        let fort = if self.fort { FORT_BONUS } else { 0.0 };
        let armor = if self.armor_pct.is_finite() {
            self.armor_pct.clamp(0.0, MAX_ARMOR_BONUS)
        } else {
            0.0
        };
        let tradeskill = f64::from(self.tradeskill.clamp(1, MAX_TRADESKILL) - 1) * TRADESKILL_SLOPE;
        (fort + armor + tradeskill).clamp(0.0, MAX_TOTAL_BONUS)
    }

    pub fn factor(&self) -> f64 {
        1.0 - self.total_bonus() / 100.0
    }

    /// Adjusted amount for one material. Nonzero amounts never drop below 1.
    pub fn apply(&self, raw: u64) -> u64 {
        let total = self.total_bonus();
        if total == 0.0 || raw == 0 {
            return raw;
        }
        let scaled = (raw as f64 * (1.0 - total / 100.0)).round();
        if scaled < 1.0 {
            1
        } else {
            scaled as u64
        }
    }
}

/// Apply `bonus` to every material, preserving order.
pub fn apply_bonus(materials: &IndexMap<String, u64>, bonus: &CraftingBonus) -> IndexMap<String, u64> {
    materials
        .iter()
        .map(|(key, raw)| (key.clone(), bonus.apply(*raw)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn materials(entries: &[(&str, u64)]) -> IndexMap<String, u64> {
        entries.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn no_bonus_is_identity() {
        let raw = materials(&[("iron ore", 12), ("flux", 1)]);
        assert_eq!(CraftingBonus::none().total_bonus(), 0.0);
        assert_eq!(apply_bonus(&raw, &CraftingBonus::none()), raw);
        assert_eq!(apply_bonus(&raw, &CraftingBonus::new(false, 0.0, 1)), raw);
    }

    #[test]
    fn inputs_are_clamped() {
        assert_eq!(CraftingBonus::new(false, 25.0, 0).total_bonus(), 10.0);
        assert_eq!(CraftingBonus::new(false, -4.0, 1).total_bonus(), 0.0);
        assert_eq!(CraftingBonus::new(false, f64::NAN, 1).total_bonus(), 0.0);
        let mid_skill = CraftingBonus::new(false, 0.0, 50).total_bonus();
        assert!((mid_skill - 49.0 * 300.0 / 249.0).abs() < 1e-9);
        assert_eq!(CraftingBonus::new(false, 0.0, 900).total_bonus(), 100.0);
    }

    #[test]
    fn bonus_rounds_and_floors_at_one() {
        let bonus = CraftingBonus::new(true, 10.0, 1);
        assert!((bonus.factor() - 0.8).abs() < 1e-12);
        let adjusted = apply_bonus(&materials(&[("fiber", 10), ("cloth", 1), ("flux", 3)]), &bonus);
        assert_eq!(adjusted, materials(&[("fiber", 8), ("cloth", 1), ("flux", 2)]));
    }

    #[test]
    fn overwhelming_bonus_leaves_exactly_one_of_everything() {
        let bonus = CraftingBonus::new(true, 10.0, 250);
        assert_eq!(bonus.total_bonus(), 100.0);
        assert_eq!(bonus.factor(), 0.0);
        let adjusted = apply_bonus(&materials(&[("fiber", 3), ("cloth", 1), ("ore", 90_000)]), &bonus);
        assert!(adjusted.values().all(|amount| *amount == 1));
    }
}
