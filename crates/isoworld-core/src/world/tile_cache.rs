//! Bounded cache of tiles generated on demand outside any resident chunk

use std::num::NonZeroUsize;

use glam::IVec2;
use lru::LruCache;

use super::tile::Tile;

/// LRU-evicting store keyed by grid position
///
/// Entries are transient: they are only ever regenerated copies of procedural
/// terrain, so eviction loses nothing that generation cannot rebuild.
pub struct TileCache {
    entries: LruCache<IVec2, Tile>,
    hits: u64,
    misses: u64,
}

impl TileCache {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            entries: LruCache::new(capacity),
            hits: 0,
            misses: 0,
        }
    }

    /// Cached tile, or generate, insert and return it
    pub fn get_or_insert_with(&mut self, grid: IVec2, generate: impl FnOnce() -> Tile) -> Tile {
        if let Some(tile) = self.entries.get(&grid) {
            self.hits += 1;
            return *tile;
        }
        self.misses += 1;
        let tile = generate();
        self.entries.put(grid, tile);
        tile
    }

    pub fn get(&mut self, grid: IVec2) -> Option<Tile> {
        self.entries.get(&grid).copied()
    }

    /// Drop every cached tile inside an inclusive grid rectangle
    pub fn invalidate_area(&mut self, min: IVec2, max: IVec2) {
        let stale: Vec<IVec2> = self
            .entries
            .iter()
            .map(|(pos, _)| *pos)
            .filter(|pos| pos.cmpge(min).all() && pos.cmple(max).all())
            .collect();
        for pos in stale {
            self.entries.pop(&pos);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.entries.cap().get()
    }

    /// (hits, misses) since creation
    pub fn stats(&self) -> (u64, u64) {
        (self.hits, self.misses)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::tile::TileType;

    fn cache(capacity: usize) -> TileCache {
        TileCache::new(NonZeroUsize::new(capacity).unwrap())
    }

    #[test]
    fn test_generates_once_while_cached() {
        let mut cache = cache(8);
        let mut calls = 0;
        for _ in 0..3 {
            cache.get_or_insert_with(IVec2::new(1, 2), || {
                calls += 1;
                Tile::new(TileType::Sand, 1, 0.4)
            });
        }
        assert_eq!(calls, 1);
        assert_eq!(cache.stats(), (2, 1));
    }

    #[test]
    fn test_evicts_least_recently_used() {
        let mut cache = cache(2);
        cache.get_or_insert_with(IVec2::new(0, 0), Tile::default);
        cache.get_or_insert_with(IVec2::new(1, 0), Tile::default);
        // Touch (0,0) so (1,0) becomes the eviction candidate
        assert!(cache.get(IVec2::new(0, 0)).is_some());
        cache.get_or_insert_with(IVec2::new(2, 0), Tile::default);

        assert_eq!(cache.len(), 2);
        assert!(cache.get(IVec2::new(1, 0)).is_none());
        assert!(cache.get(IVec2::new(0, 0)).is_some());
        assert!(cache.get(IVec2::new(2, 0)).is_some());
    }

    #[test]
    fn test_invalidate_area() {
        let mut cache = cache(16);
        for x in 0..4 {
            cache.get_or_insert_with(IVec2::new(x, 0), Tile::default);
        }
        cache.invalidate_area(IVec2::new(1, 0), IVec2::new(2, 0));
        assert_eq!(cache.len(), 2);
        assert!(cache.get(IVec2::new(0, 0)).is_some());
        assert!(cache.get(IVec2::new(1, 0)).is_none());
        assert!(cache.get(IVec2::new(3, 0)).is_some());
    }
}
