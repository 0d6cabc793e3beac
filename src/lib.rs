//! # grid_astar_stepper
//!
//! An [A*](https://en.wikipedia.org/wiki/A*_search_algorithm) search on a square, editable
//! grid that can be driven one node expansion at a time. After every expansion the frontier
//! (open set) and the expanded cells (closed set) are handed out as snapshots so a renderer can
//! animate the search, and a finished run reports its path, cost and statistics.
//!
//! Movement is 8-directional with integer costs: [ORTHOGONAL_COST] for straight moves and
//! [DIAGONAL_COST] for diagonal ones. Diagonal moves may not cut the corner of an obstacle.
//! The heuristic is the Manhattan distance scaled by [ORTHOGONAL_COST]. It overestimates diagonal
//! moves, so a returned path is not always a shortest one.
//!
//! The crate is split in three layers:
//! - [grid::GridModel] owns the cells, start and goal, and answers passability queries.
//! - [astar::AStarSearch] is the resumable search itself.
//! - [session::Session] is a driver that owns one grid and at most one running search, and
//!   keeps the state a front-end would display.
pub mod astar;
pub mod export;
pub mod grid;
pub mod session;

pub use astar::{AStarSearch, SearchError, SearchPhase, Step};
pub use grid::{CellState, GridError, GridModel};
pub use grid_util::point::Point;
pub use session::{Metrics, Session, SessionConfig, Status};

/// Smallest allowed grid side length.
pub const MIN_N: usize = 6;
/// Largest allowed grid side length.
pub const MAX_N: usize = 60;
/// Grid side length used by [GridModel::default].
pub const DEFAULT_N: usize = 13;
/// Obstacle probability used by [GridModel::default].
pub const DEFAULT_DENSITY: f64 = 0.2;
/// Cost of a straight (cardinal) move.
pub const ORTHOGONAL_COST: i32 = 10;
/// Cost of a diagonal move, a fixed-point approximation of `10 * sqrt(2)`.
pub const DIAGONAL_COST: i32 = 14;
/// Upper bound on the extra expansions per tick added by the speed setting.
pub const MAX_STEPS_PER_TICK: usize = 40;
/// Amount by which [Session::grow] and [Session::shrink] change the grid size.
pub const RESIZE_STEP: usize = 2;

/// Number of moves in a path, which is one less than the number of cells on it.
pub fn path_steps(path: &[Point]) -> usize {
    path.len().saturating_sub(1)
}
