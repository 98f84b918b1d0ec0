//! Voice-activity-aware map/game loop (spec.md §4.7, C7): translates input
//! into pose updates, throttles motion ticks, pathfinds click-to-walk, and
//! drives `ConferenceClient`/`AudioManager` in the tick's required order.

pub mod game_loop;
pub mod input;
pub mod pathfind;
pub mod tilemap;

pub use game_loop::GameLoop;
pub use input::InputState;
pub use pathfind::{find_path, Cell};
pub use tilemap::{Tile, TileMap};
