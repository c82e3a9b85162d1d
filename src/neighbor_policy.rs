use crate::region::TileKey;

/// Movement rules for the grid pathfinder.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct MovementPolicy {
    pub allow_diagonals: bool,
    /// Allow a diagonal step even when one of the two orthogonal tiles it passes is blocked.
    pub allow_corner_cut: bool,
}

impl Default for MovementPolicy {
    fn default() -> Self {
        Self { allow_diagonals: true, allow_corner_cut: false }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct Offset(pub i32, pub i32);

impl Offset {
    pub fn is_diagonal(self) -> bool {
        self.0 != 0 && self.1 != 0
    }
}

impl MovementPolicy {
    /// N, E, S, W first, then the diagonals.
    pub fn neighbor_offsets(&self) -> &'static [Offset] {
        const CARD: [Offset; 4] = [Offset(0, 1), Offset(1, 0), Offset(0, -1), Offset(-1, 0)];
        const ALL: [Offset; 8] = [
            Offset(0, 1), Offset(1, 0), Offset(0, -1), Offset(-1, 0),
            Offset(1, 1), Offset(1, -1), Offset(-1, -1), Offset(-1, 1),
        ];
        if self.allow_diagonals { &ALL } else { &CARD }
    }

    /// Whether a step from `from` by `offset` is allowed, given the target is walkable.
    pub fn step_allowed<F>(&self, from: TileKey, offset: Offset, is_walkable: &F) -> bool
    where
        F: Fn(TileKey) -> bool,
    {
        if !offset.is_diagonal() || self.allow_corner_cut {
            return true;
        }
        is_walkable(TileKey::new(from.x + offset.0, from.y))
            && is_walkable(TileKey::new(from.x, from.y + offset.1))
    }

    /// Admissible lower bound on the remaining step count.
    pub fn heuristic(&self, from: TileKey, to: TileKey) -> u32 {
        let dx = from.x.abs_diff(to.x);
        let dy = from.y.abs_diff(to.y);
        if self.allow_diagonals { dx.max(dy) } else { dx + dy }
    }
}
