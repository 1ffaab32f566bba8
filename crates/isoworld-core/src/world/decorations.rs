//! Decoration overrides
//!
//! A tile's decoration roll is a pure function of (seed, position), so repeated
//! generation of the same tile always yields the same roll. This store only
//! keeps tiles whose decoration diverges from that roll: persisted tiles whose
//! stored decoration differs, and tiles cleared by a terrain edit. Those
//! entries win over the roll for the lifetime of the world.

use ahash::AHashMap;
use glam::IVec2;

use super::tile::Decoration;

#[derive(Debug, Default)]
pub struct DecorationStore {
    overrides: AHashMap<IVec2, Option<Decoration>>,
}

impl DecorationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override for a tile if one exists, else the roll from `select`
    pub fn get_or_select(
        &self,
        tile: IVec2,
        select: impl FnOnce() -> Option<Decoration>,
    ) -> Option<Decoration> {
        match self.overrides.get(&tile) {
            Some(decoration) => *decoration,
            None => select(),
        }
    }

    /// Force a tile's decoration regardless of its roll
    pub fn record(&mut self, tile: IVec2, decoration: Option<Decoration>) {
        self.overrides.insert(tile, decoration);
    }

    /// Record a decoration read back from persisted data
    ///
    /// Only a value that differs from `rolled` is kept; a matching value drops
    /// any older override.
    pub fn record_persisted(
        &mut self,
        tile: IVec2,
        decoration: Option<Decoration>,
        rolled: Option<Decoration>,
    ) {
        if decoration == rolled {
            self.overrides.remove(&tile);
        } else {
            self.overrides.insert(tile, decoration);
        }
    }

    pub fn get(&self, tile: IVec2) -> Option<Option<Decoration>> {
        self.overrides.get(&tile).copied()
    }

    pub fn len(&self) -> usize {
        self.overrides.len()
    }

    pub fn is_empty(&self) -> bool {
        self.overrides.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::tile::DecorationKind;
    use glam::Vec2;

    fn rock() -> Option<Decoration> {
        Some(Decoration {
            kind: DecorationKind::Rock,
            offset: Vec2::ZERO,
            scale: 1.0,
        })
    }

    #[test]
    fn test_rolls_are_not_stored() {
        let store = DecorationStore::new();
        assert_eq!(store.get_or_select(IVec2::new(3, 4), rock), rock());
        assert_eq!(store.get_or_select(IVec2::new(3, 4), || None), None);
        assert!(store.is_empty());
    }

    #[test]
    fn test_override_beats_roll() {
        let mut store = DecorationStore::new();
        store.record(IVec2::ZERO, None);
        assert_eq!(store.get_or_select(IVec2::ZERO, rock), None);
        assert_eq!(store.get(IVec2::ZERO), Some(None));
        assert_eq!(store.get(IVec2::NEG_ONE), None);
    }

    #[test]
    fn test_persisted_values_matching_the_roll_are_dropped() {
        let mut store = DecorationStore::new();
        store.record_persisted(IVec2::ONE, rock(), rock());
        assert!(store.is_empty());

        store.record_persisted(IVec2::ONE, None, rock());
        assert_eq!(store.get(IVec2::ONE), Some(None));

        // Persisted data agreeing with the roll again clears the stale override
        store.record_persisted(IVec2::ONE, rock(), rock());
        assert!(store.is_empty());
    }
}
