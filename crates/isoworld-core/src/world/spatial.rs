//! R-tree helpers shared by chunk streaming and structure placement

use glam::IVec2;
use rstar::{AABB, Envelope, Point, RTreeObject, SelectionFunction};

/// Wrapper for chunk position to implement R-tree traits
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub(crate) struct ChunkPos(pub IVec2);

impl rstar::Point for ChunkPos {
    type Scalar = i32;
    const DIMENSIONS: usize = 2;

    fn generate(mut generator: impl FnMut(usize) -> Self::Scalar) -> Self {
        ChunkPos(IVec2::new(generator(0), generator(1)))
    }

    fn nth(&self, index: usize) -> Self::Scalar {
        match index {
            0 => self.0.x,
            1 => self.0.y,
            _ => unreachable!("ChunkPos only has 2 dimensions"),
        }
    }

    fn nth_mut(&mut self, index: usize) -> &mut Self::Scalar {
        match index {
            0 => &mut self.0.x,
            1 => &mut self.0.y,
            _ => unreachable!("ChunkPos only has 2 dimensions"),
        }
    }
}

/// Inclusive grid rectangle of one placed structure
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) struct FootprintBox<K> {
    pub key: K,
    pub min: IVec2,
    pub max: IVec2,
}

impl<K> RTreeObject for FootprintBox<K> {
    type Envelope = AABB<[i32; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_corners([self.min.x, self.min.y], [self.max.x, self.max.y])
    }
}

/// Selects every object whose envelope intersects an inclusive rectangle
pub(crate) struct Intersecting<P: Point>(pub AABB<P>);

impl Intersecting<ChunkPos> {
    pub fn chunks(min: IVec2, max: IVec2) -> Self {
        Self(AABB::from_corners(ChunkPos(min), ChunkPos(max)))
    }
}

impl Intersecting<[i32; 2]> {
    pub fn grid(min: IVec2, max: IVec2) -> Self {
        Self(AABB::from_corners([min.x, min.y], [max.x, max.y]))
    }
}

impl<T, P> SelectionFunction<T> for Intersecting<P>
where
    P: Point,
    T: RTreeObject<Envelope = AABB<P>>,
{
    fn should_unpack_parent(&self, envelope: &AABB<P>) -> bool {
        envelope.intersects(&self.0)
    }

    fn should_unpack_leaf(&self, leaf: &T) -> bool {
        leaf.envelope().intersects(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstar::RTree;

    #[test]
    fn test_chunk_query() {
        let mut tree = RTree::new();
        for y in -3..=3 {
            for x in -3..=3 {
                tree.insert(ChunkPos(IVec2::new(x, y)));
            }
        }
        let found: Vec<_> = tree
            .locate_with_selection_function(Intersecting::chunks(IVec2::new(2, 2), IVec2::new(5, 5)))
            .collect();
        assert_eq!(found.len(), 4);
    }

    #[test]
    fn test_footprint_query_is_inclusive() {
        let mut tree = RTree::new();
        tree.insert(FootprintBox {
            key: 1u32,
            min: IVec2::new(5, 5),
            max: IVec2::new(6, 6),
        });
        let hits = |min, max| {
            tree.locate_with_selection_function(Intersecting::grid(min, max))
                .count()
        };
        assert_eq!(hits(IVec2::new(6, 6), IVec2::new(7, 7)), 1);
        assert_eq!(hits(IVec2::new(7, 5), IVec2::new(8, 6)), 0);
        assert_eq!(hits(IVec2::new(3, 3), IVec2::new(4, 4)), 0);
    }
}
