//! The 2D tile grid the game loop walks avatars over (spec.md §4.7).
//!
//! Concrete asset/tileset loading is out of scope (spec.md Non-goals); this
//! only models what walkability and pathfinding need: a rectangular grid of
//! tile kinds.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tile {
    Floor,
    Wall,
    Water,
}

impl Tile {
    fn from_char(c: char) -> Tile {
        match c {
            '#' => Tile::Wall,
            '~' => Tile::Water,
            _ => Tile::Floor,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TileMap {
    width: i32,
    height: i32,
    tiles: Vec<Tile>,
}

impl TileMap {
    pub fn new(width: i32, height: i32) -> Self {
        Self {
            width,
            height,
            tiles: vec![Tile::Floor; (width * height) as usize],
        }
    }

    /// Builds a map from an ASCII layout, one row per string: `#` is a wall,
    /// `~` is water, anything else is floor. Handy for tests and fixtures.
    pub fn from_ascii(rows: &[&str]) -> Self {
        let height = rows.len() as i32;
        let width = rows.iter().map(|r| r.chars().count()).max().unwrap_or(0) as i32;
        let mut tiles = vec![Tile::Floor; (width * height) as usize];
        for (y, row) in rows.iter().enumerate() {
            for (x, c) in row.chars().enumerate() {
                tiles[y * width as usize + x] = Tile::from_char(c);
            }
        }
        Self {
            width,
            height,
            tiles,
        }
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    pub fn in_bounds(&self, x: i32, y: i32) -> bool {
        x >= 0 && y >= 0 && x < self.width && y < self.height
    }

    pub fn tile_at(&self, x: i32, y: i32) -> Option<Tile> {
        if !self.in_bounds(x, y) {
            return None;
        }
        Some(self.tiles[(y * self.width + x) as usize])
    }

    pub fn set_tile(&mut self, x: i32, y: i32, tile: Tile) {
        if self.in_bounds(x, y) {
            self.tiles[(y * self.width + x) as usize] = tile;
        }
    }

    /// Wall tiles block unless the avatar can swim, in which case water is
    /// also walkable. Out-of-bounds is never walkable.
    pub fn is_walkable(&self, x: i32, y: i32, can_swim: bool) -> bool {
        match self.tile_at(x, y) {
            Some(Tile::Floor) => true,
            Some(Tile::Water) => can_swim,
            Some(Tile::Wall) => false,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii_map_parses_tiles() {
        let map = TileMap::from_ascii(&["..#", ".~.", "..."]);
        assert_eq!(map.tile_at(2, 0), Some(Tile::Wall));
        assert_eq!(map.tile_at(1, 1), Some(Tile::Water));
        assert_eq!(map.tile_at(0, 0), Some(Tile::Floor));
    }

    #[test]
    fn wall_blocks_regardless_of_swim() {
        let map = TileMap::from_ascii(&["#"]);
        assert!(!map.is_walkable(0, 0, true));
        assert!(!map.is_walkable(0, 0, false));
    }

    #[test]
    fn water_requires_can_swim() {
        let map = TileMap::from_ascii(&["~"]);
        assert!(map.is_walkable(0, 0, true));
        assert!(!map.is_walkable(0, 0, false));
    }

    #[test]
    fn out_of_bounds_is_never_walkable() {
        let map = TileMap::new(2, 2);
        assert!(!map.is_walkable(-1, 0, true));
        assert!(!map.is_walkable(2, 2, true));
    }
}
