//! A* click-to-walk pathfinding over the tile grid (spec.md §4.7).
//!
//! 8-connected by default with diagonal step cost `sqrt(2)`; orthogonal
//! steps cost 1. Heuristic is octile distance, which stays admissible for
//! both connectivity modes.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

use crate::tilemap::TileMap;

const ORTHOGONAL_COST: i64 = 1_000_000;
const DIAGONAL_COST: i64 = 1_414_214; // sqrt(2) scaled to the same fixed-point unit

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Cell {
    pub x: i32,
    pub y: i32,
}

impl Cell {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ScoredCell {
    cell: Cell,
    cost: i64,
}

impl Ord for ScoredCell {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; invert so the lowest cost pops first.
        other.cost.cmp(&self.cost)
    }
}

impl PartialOrd for ScoredCell {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

fn octile_heuristic(a: Cell, b: Cell) -> i64 {
    let dx = (a.x - b.x).unsigned_abs() as i64;
    let dy = (a.y - b.y).unsigned_abs() as i64;
    let (diag, straight) = if dx < dy { (dx, dy - dx) } else { (dy, dx - dy) };
    diag * DIAGONAL_COST + straight * ORTHOGONAL_COST
}

fn neighbors(cell: Cell, allow_diagonal: bool) -> Vec<(Cell, i64)> {
    let mut out = vec![
        (Cell::new(cell.x + 1, cell.y), ORTHOGONAL_COST),
        (Cell::new(cell.x - 1, cell.y), ORTHOGONAL_COST),
        (Cell::new(cell.x, cell.y + 1), ORTHOGONAL_COST),
        (Cell::new(cell.x, cell.y - 1), ORTHOGONAL_COST),
    ];
    if allow_diagonal {
        out.extend([
            (Cell::new(cell.x + 1, cell.y + 1), DIAGONAL_COST),
            (Cell::new(cell.x + 1, cell.y - 1), DIAGONAL_COST),
            (Cell::new(cell.x - 1, cell.y + 1), DIAGONAL_COST),
            (Cell::new(cell.x - 1, cell.y - 1), DIAGONAL_COST),
        ]);
    }
    out
}

/// Returns the path from `start` to `goal` inclusive of both endpoints, or
/// `None` if unreachable. `start`/`goal` are not walkability-checked
/// themselves (a click on the player's own tile is always valid).
pub fn find_path(
    map: &TileMap,
    start: Cell,
    goal: Cell,
    can_swim: bool,
    allow_diagonal: bool,
) -> Option<Vec<Cell>> {
    if start == goal {
        return Some(vec![start]);
    }

    let mut open = BinaryHeap::new();
    let mut came_from: HashMap<Cell, Cell> = HashMap::new();
    let mut g_score: HashMap<Cell, i64> = HashMap::new();

    g_score.insert(start, 0);
    open.push(ScoredCell {
        cell: start,
        cost: octile_heuristic(start, goal),
    });

    while let Some(ScoredCell { cell, .. }) = open.pop() {
        if cell == goal {
            return Some(reconstruct_path(&came_from, cell));
        }

        let current_g = *g_score.get(&cell).unwrap_or(&i64::MAX);

        for (next, step_cost) in neighbors(cell, allow_diagonal) {
            if next != goal && !map.is_walkable(next.x, next.y, can_swim) {
                continue;
            }
            if next == goal && !map.is_walkable(goal.x, goal.y, can_swim) {
                continue;
            }
            let tentative_g = current_g + step_cost;
            if tentative_g < *g_score.get(&next).unwrap_or(&i64::MAX) {
                came_from.insert(next, cell);
                g_score.insert(next, tentative_g);
                open.push(ScoredCell {
                    cell: next,
                    cost: tentative_g + octile_heuristic(next, goal),
                });
            }
        }
    }

    None
}

fn reconstruct_path(came_from: &HashMap<Cell, Cell>, mut current: Cell) -> Vec<Cell> {
    let mut path = vec![current];
    while let Some(&prev) = came_from.get(&current) {
        path.push(prev);
        current = prev;
    }
    path.reverse();
    path
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn straight_line_on_open_floor() {
        let map = TileMap::new(5, 5);
        let path = find_path(&map, Cell::new(0, 0), Cell::new(4, 0), false, true).unwrap();
        assert_eq!(path.first(), Some(&Cell::new(0, 0)));
        assert_eq!(path.last(), Some(&Cell::new(4, 0)));
    }

    #[test]
    fn diagonal_path_is_shorter_than_manhattan_detour() {
        let map = TileMap::new(5, 5);
        let diagonal = find_path(&map, Cell::new(0, 0), Cell::new(4, 4), false, true).unwrap();
        let no_diagonal = find_path(&map, Cell::new(0, 0), Cell::new(4, 4), false, false).unwrap();
        assert!(diagonal.len() <= no_diagonal.len());
    }

    #[test]
    fn routes_around_a_wall() {
        let map = TileMap::from_ascii(&["....", "###.", "...."]);
        let path = find_path(&map, Cell::new(0, 0), Cell::new(0, 2), false, true);
        assert!(path.is_some());
        assert!(path
            .unwrap()
            .iter()
            .all(|c| map.is_walkable(c.x, c.y, false)));
    }

    #[test]
    fn unreachable_goal_returns_none() {
        let map = TileMap::from_ascii(&["...", "###", "..."]);
        // No can_swim and a sealed wall row with no gap: unreachable.
        assert!(find_path(&map, Cell::new(0, 0), Cell::new(0, 2), false, true).is_none());
    }

    #[test]
    fn water_only_reachable_when_can_swim() {
        let map = TileMap::from_ascii(&["~~~"]);
        assert!(find_path(&map, Cell::new(0, 0), Cell::new(2, 0), true, true).is_some());
        assert!(find_path(&map, Cell::new(0, 0), Cell::new(2, 0), false, true).is_none());
    }
}
