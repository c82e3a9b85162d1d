use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};

use crate::neighbor_policy::MovementPolicy;
use crate::region::TileKey;

pub const DEFAULT_MAX_ITERATIONS: usize = 50_000;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PathOptions {
    pub policy: MovementPolicy,
    /// Upper bound on open-set pops before the search gives up.
    pub max_iterations: usize,
}

impl Default for PathOptions {
    fn default() -> Self {
        Self { policy: MovementPolicy::default(), max_iterations: DEFAULT_MAX_ITERATIONS }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SearchEnd {
    Found,
    /// Start or end tile is not walkable.
    Unwalkable,
    Exhausted,
    IterationCap,
}

#[derive(Clone, Debug)]
pub struct SearchOutcome {
    pub path: Option<Vec<TileKey>>,
    pub iterations: usize,
    pub end: SearchEnd,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
struct OpenNode {
    f: u32,
    g: u32,
    key: TileKey,
}

impl Ord for OpenNode {
    // BinaryHeap is a max-heap: lowest f wins, then the deeper node, then coordinates.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .f
            .cmp(&self.f)
            .then_with(|| self.g.cmp(&other.g))
            .then_with(|| other.key.cmp(&self.key))
    }
}

impl PartialOrd for OpenNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Shortest 8-directional tile path from `start` to `end`, both included.
pub fn find_path<F>(is_walkable: F, start: TileKey, end: TileKey, opts: &PathOptions) -> Option<Vec<TileKey>>
where
    F: Fn(TileKey) -> bool,
{
    search(is_walkable, start, end, opts).path
}

/// [`find_path`] over an explicit tile set.
pub fn find_path_in_set(tiles: &HashSet<TileKey>, start: TileKey, end: TileKey, opts: &PathOptions) -> Option<Vec<TileKey>> {
    find_path(|t| tiles.contains(&t), start, end, opts)
}

/// A* with unit step cost. Diagonal steps obey the policy's corner rule.
pub fn search<F>(is_walkable: F, start: TileKey, end: TileKey, opts: &PathOptions) -> SearchOutcome
where
    F: Fn(TileKey) -> bool,
{
    if !is_walkable(start) || !is_walkable(end) {
        log::debug!("path {:?} -> {:?}: endpoint not walkable", start, end);
        return SearchOutcome { path: None, iterations: 0, end: SearchEnd::Unwalkable };
    }

    let policy = opts.policy;
    let mut open: BinaryHeap<OpenNode> = BinaryHeap::new();
    let mut g_score: HashMap<TileKey, u32> = HashMap::new();
    let mut came_from: HashMap<TileKey, TileKey> = HashMap::new();
    let mut closed: HashSet<TileKey> = HashSet::new();

    g_score.insert(start, 0);
    open.push(OpenNode { f: policy.heuristic(start, end), g: 0, key: start });

    let mut iterations = 0usize;
    while let Some(current) = open.pop() {
        if iterations >= opts.max_iterations {
            log::debug!("path {:?} -> {:?}: gave up after {} iterations", start, end, iterations);
            return SearchOutcome { path: None, iterations, end: SearchEnd::IterationCap };
        }
        iterations += 1;

        if current.key == end {
            let path = reconstruct(&came_from, start, end);
            log::debug!("path {:?} -> {:?}: {} tiles in {} iterations", start, end, path.len(), iterations);
            return SearchOutcome { path: Some(path), iterations, end: SearchEnd::Found };
        }

        if !closed.insert(current.key) {
            continue;
        }

        for &offset in policy.neighbor_offsets() {
            let next = TileKey::new(current.key.x + offset.0, current.key.y + offset.1);
            if closed.contains(&next) || !is_walkable(next) {
                continue;
            }
            if !policy.step_allowed(current.key, offset, &is_walkable) {
                continue;
            }
            let tentative = current.g + 1;
            if g_score.get(&next).map_or(true, |&old| tentative < old) {
                g_score.insert(next, tentative);
                came_from.insert(next, current.key);
                open.push(OpenNode { f: tentative + policy.heuristic(next, end), g: tentative, key: next });
            }
        }
    }

    log::debug!("path {:?} -> {:?}: open set exhausted after {} iterations", start, end, iterations);
    SearchOutcome { path: None, iterations, end: SearchEnd::Exhausted }
}

fn reconstruct(came_from: &HashMap<TileKey, TileKey>, start: TileKey, end: TileKey) -> Vec<TileKey> {
    let mut path = vec![end];
    let mut cur = end;
    while cur != start {
        match came_from.get(&cur) {
            Some(&prev) => {
                cur = prev;
                path.push(cur);
            }
            None => break,
        }
    }
    path.reverse();
    path
}

/// Keeps the endpoints and every tile where the step direction changes.
pub fn compress_path(path: &[TileKey]) -> Vec<TileKey> {
    if path.len() <= 2 {
        return path.to_vec();
    }
    let mut reduced = Vec::with_capacity(path.len());
    reduced.push(path[0]);
    for w in path.windows(3) {
        if step_dir(w[0], w[1]) != step_dir(w[1], w[2]) && reduced.last() != Some(&w[1]) {
            reduced.push(w[1]);
        }
    }
    if let Some(&last) = path.last() {
        if reduced.last() != Some(&last) {
            reduced.push(last);
        }
    }
    reduced
}

fn step_dir(from: TileKey, to: TileKey) -> (i32, i32) {
    ((to.x - from.x).signum(), (to.y - from.y).signum())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::neighbor_policy::MovementPolicy;

    fn open_grid(min: i32, max: i32) -> HashSet<TileKey> {
        let mut set = HashSet::new();
        for x in min..=max {
            for y in min..=max {
                set.insert(TileKey::new(x, y));
            }
        }
        set
    }

    fn assert_connected(path: &[TileKey]) {
        for w in path.windows(2) {
            assert!((w[0].x - w[1].x).abs() <= 1 && (w[0].y - w[1].y).abs() <= 1, "gap in {:?}", path);
        }
    }

    #[test]
    fn straight_and_diagonal_lengths() {
        let grid = open_grid(-5, 10);
        let opts = PathOptions::default();
        let straight = find_path_in_set(&grid, TileKey::new(0, 0), TileKey::new(3, 0), &opts).unwrap();
        assert_eq!(straight.len() - 1, 3);
        let diagonal = find_path_in_set(&grid, TileKey::new(0, 0), TileKey::new(3, 3), &opts).unwrap();
        assert_eq!(diagonal.len() - 1, 3);
        assert_eq!(diagonal.first(), Some(&TileKey::new(0, 0)));
        assert_eq!(diagonal.last(), Some(&TileKey::new(3, 3)));
    }

    #[test]
    fn no_diagonal_through_blocked_corner() {
        let tiles: HashSet<TileKey> = [TileKey::new(0, 0), TileKey::new(1, 1)].into_iter().collect();
        assert!(find_path_in_set(&tiles, TileKey::new(0, 0), TileKey::new(1, 1), &PathOptions::default()).is_none());
    }

    #[test]
    fn corner_with_one_side_open_detours() {
        let tiles: HashSet<TileKey> =
            [TileKey::new(0, 0), TileKey::new(1, 0), TileKey::new(1, 1)].into_iter().collect();
        let path = find_path_in_set(&tiles, TileKey::new(0, 0), TileKey::new(1, 1), &PathOptions::default()).unwrap();
        assert_eq!(path, vec![TileKey::new(0, 0), TileKey::new(1, 0), TileKey::new(1, 1)]);
    }

    #[test]
    fn blocked_wall_is_unreachable() {
        let mut tiles = open_grid(0, 10);
        for y in 0..=10 {
            tiles.remove(&TileKey::new(5, y));
        }
        let out = search(|t| tiles.contains(&t), TileKey::new(0, 0), TileKey::new(10, 10), &PathOptions::default());
        assert!(out.path.is_none());
        assert_eq!(out.end, SearchEnd::Exhausted);
    }

    #[test]
    fn unwalkable_endpoint_fails_fast() {
        let tiles = open_grid(0, 3);
        let out = search(|t| tiles.contains(&t), TileKey::new(0, 0), TileKey::new(9, 9), &PathOptions::default());
        assert_eq!(out.end, SearchEnd::Unwalkable);
        assert_eq!(out.iterations, 0);
    }

    #[test]
    fn iteration_cap_stops_search() {
        let opts = PathOptions { max_iterations: 10, ..PathOptions::default() };
        // unbounded open plane, target far away
        let out = search(|_| true, TileKey::new(0, 0), TileKey::new(1000, 0), &opts);
        assert!(out.path.is_none());
        assert_eq!(out.end, SearchEnd::IterationCap);
        assert_eq!(out.iterations, 10);
    }

    #[test]
    fn start_equals_end() {
        let tiles = open_grid(0, 1);
        let path = find_path_in_set(&tiles, TileKey::new(1, 1), TileKey::new(1, 1), &PathOptions::default()).unwrap();
        assert_eq!(path, vec![TileKey::new(1, 1)]);
    }

    #[test]
    fn detour_around_wall_is_optimal() {
        // wall at x = 5 with a gap at y = 8
        let mut tiles = open_grid(0, 10);
        for y in 0..=10 {
            if y != 8 {
                tiles.remove(&TileKey::new(5, y));
            }
        }
        let path = find_path_in_set(&tiles, TileKey::new(0, 0), TileKey::new(10, 0), &PathOptions::default()).unwrap();
        assert_connected(&path);
        assert!(path.contains(&TileKey::new(5, 8)));
        // the gap can only be crossed orthogonally: (4,8) -> (5,8) -> (6,8)
        assert!(path.contains(&TileKey::new(4, 8)) && path.contains(&TileKey::new(6, 8)));
        assert_eq!(path.len() - 1, 8 + 2 + 8);
    }

    #[test]
    fn cardinal_policy_uses_manhattan_steps() {
        let grid = open_grid(0, 5);
        let opts = PathOptions {
            policy: MovementPolicy { allow_diagonals: false, allow_corner_cut: false },
            ..PathOptions::default()
        };
        let path = find_path_in_set(&grid, TileKey::new(0, 0), TileKey::new(3, 3), &opts).unwrap();
        assert_eq!(path.len() - 1, 6);
        assert_connected(&path);
    }

    #[test]
    fn compress_keeps_turns() {
        let path = [
            TileKey::new(0, 0),
            TileKey::new(0, 1),
            TileKey::new(0, 2),
            TileKey::new(1, 2),
            TileKey::new(2, 2),
        ];
        assert_eq!(compress_path(&path), vec![TileKey::new(0, 0), TileKey::new(0, 2), TileKey::new(2, 2)]);
        let diag: Vec<TileKey> = (0..4).map(|i| TileKey::new(i, i)).collect();
        assert_eq!(compress_path(&diag), vec![TileKey::new(0, 0), TileKey::new(3, 3)]);
    }
}
