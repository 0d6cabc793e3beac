//! The editable square grid the search runs on.
use core::fmt;

use grid_util::point::Point;
use itertools::iproduct;
use log::{debug, info, warn};
use petgraph::unionfind::UnionFind;
use rand::Rng;
use smallvec::SmallVec;
use thiserror::Error;

use crate::{DEFAULT_DENSITY, DEFAULT_N, DIAGONAL_COST, MAX_N, MIN_N, ORTHOGONAL_COST};

/// Clamps an obstacle probability to `[0, 1]`; NaN falls back to [DEFAULT_DENSITY].
fn unit_density(density: f64) -> f64 {
    if density.is_nan() {
        DEFAULT_DENSITY
    } else {
        density.clamp(0.0, 1.0)
    }
}

/// Neighbours of a cell together with the cost of moving there.
pub type Neighbours = SmallVec<[(Point, i32); 8]>;

/// Candidate moves, straight ones first. The order fixes the order in which successors are
/// pushed and therefore how ties in the open queue are broken.
const MOVES: [(i32, i32); 8] = [
    (1, 0),
    (-1, 0),
    (0, 1),
    (0, -1),
    (1, 1),
    (1, -1),
    (-1, 1),
    (-1, -1),
];

/// What a single cell of the grid holds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum CellState {
    #[default]
    Free,
    Obstacle,
    Start,
    Goal,
}

impl CellState {
    fn symbol(self) -> char {
        match self {
            CellState::Free => '.',
            CellState::Obstacle => '#',
            CellState::Start => 'S',
            CellState::Goal => 'G',
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GridError {
    #[error("cell {point} is outside the {size}x{size} grid")]
    OutOfBounds { point: Point, size: usize },
    #[error("cell {0} holds an obstacle")]
    Blocked(Point),
    #[error("cell {0} holds the start or goal, place those explicitly")]
    Occupied(Point),
}

/// [GridModel] stores a square grid of [CellState]s together with the optional start and goal.
///
/// Like a pathing grid it also keeps a [UnionFind] of the free cells so reachability can be
/// answered without searching. The components are flagged as dirty on every edit and are only
/// rebuilt by [update](Self::update) or [generate_components](Self::generate_components).
#[derive(Clone, Debug)]
pub struct GridModel {
    n: usize,
    cells: Vec<CellState>,
    start: Option<Point>,
    goal: Option<Point>,
    density: f64,
    components: UnionFind<usize>,
    components_dirty: bool,
}

impl Default for GridModel {
    fn default() -> GridModel {
        GridModel::new(DEFAULT_N, DEFAULT_DENSITY)
    }
}

impl GridModel {
    /// Creates an empty grid. `n` is clamped to `[MIN_N, MAX_N]` and `density` to `[0, 1]`.
    pub fn new(n: usize, density: f64) -> GridModel {
        let n = n.clamp(MIN_N, MAX_N);
        GridModel {
            n,
            cells: vec![CellState::Free; n * n],
            start: None,
            goal: None,
            density: unit_density(density),
            components: UnionFind::new(n * n),
            components_dirty: true,
        }
    }

    /// Side length of the grid.
    pub fn size(&self) -> usize {
        self.n
    }
    pub fn start(&self) -> Option<Point> {
        self.start
    }
    pub fn goal(&self) -> Option<Point> {
        self.goal
    }
    pub fn density(&self) -> f64 {
        self.density
    }
    pub fn set_density(&mut self, density: f64) {
        self.density = unit_density(density);
    }

    pub fn in_bounds(&self, point: Point) -> bool {
        point.x >= 0 && point.y >= 0 && (point.x as usize) < self.n && (point.y as usize) < self.n
    }
    /// True if the point lies on the grid and does not hold an obstacle.
    pub fn is_passable(&self, point: Point) -> bool {
        matches!(self.cell(point), Some(state) if state != CellState::Obstacle)
    }
    pub fn cell(&self, point: Point) -> Option<CellState> {
        self.index(point).map(|ix| self.cells[ix])
    }

    fn index(&self, point: Point) -> Option<usize> {
        if self.in_bounds(point) {
            Some(point.y as usize * self.n + point.x as usize)
        } else {
            None
        }
    }
    fn checked_index(&self, point: Point) -> Result<usize, GridError> {
        self.index(point).ok_or(GridError::OutOfBounds {
            point,
            size: self.n,
        })
    }
    fn write(&mut self, ix: usize, state: CellState) {
        if self.cells[ix] != state {
            self.cells[ix] = state;
            self.components_dirty = true;
        }
    }

    /// Writes a cell directly. Start and goal bookkeeping is kept consistent: writing
    /// [CellState::Start] or [CellState::Goal] places that endpoint, and overwriting the current
    /// start or goal cell with anything else removes it.
    pub fn set_cell(&mut self, point: Point, state: CellState) -> Result<(), GridError> {
        let ix = self.checked_index(point)?;
        match state {
            CellState::Start => return self.set_start(point),
            CellState::Goal => return self.set_goal(point),
            _ => {}
        }
        if self.start == Some(point) {
            self.start = None;
        }
        if self.goal == Some(point) {
            self.goal = None;
        }
        self.write(ix, state);
        Ok(())
    }

    /// Moves the start to `point`. The previous start cell becomes free again. Placing the start
    /// on the goal removes the goal.
    pub fn set_start(&mut self, point: Point) -> Result<(), GridError> {
        let ix = self.checked_index(point)?;
        if self.cells[ix] == CellState::Obstacle {
            return Err(GridError::Blocked(point));
        }
        if let Some(old) = self.start.take() {
            if let Some(old_ix) = self.index(old) {
                self.write(old_ix, CellState::Free);
            }
        }
        if self.goal == Some(point) {
            self.goal = None;
        }
        self.write(ix, CellState::Start);
        self.start = Some(point);
        Ok(())
    }

    /// Moves the goal to `point`, see [set_start](Self::set_start).
    pub fn set_goal(&mut self, point: Point) -> Result<(), GridError> {
        let ix = self.checked_index(point)?;
        if self.cells[ix] == CellState::Obstacle {
            return Err(GridError::Blocked(point));
        }
        if let Some(old) = self.goal.take() {
            if let Some(old_ix) = self.index(old) {
                self.write(old_ix, CellState::Free);
            }
        }
        if self.start == Some(point) {
            self.start = None;
        }
        self.write(ix, CellState::Goal);
        self.goal = Some(point);
        Ok(())
    }

    /// Flips a cell between free and obstacle and returns its new state. The start and goal
    /// cells are left alone.
    pub fn toggle_obstacle(&mut self, point: Point) -> Result<CellState, GridError> {
        let ix = self.checked_index(point)?;
        let new_state = match self.cells[ix] {
            CellState::Free => CellState::Obstacle,
            CellState::Obstacle => CellState::Free,
            CellState::Start | CellState::Goal => return Err(GridError::Occupied(point)),
        };
        self.write(ix, new_state);
        Ok(new_state)
    }

    /// Turns a free cell into an obstacle. Returns whether anything changed.
    pub fn paint_obstacle(&mut self, point: Point) -> bool {
        match self.index(point) {
            Some(ix) if self.cells[ix] == CellState::Free => {
                self.write(ix, CellState::Obstacle);
                true
            }
            _ => false,
        }
    }

    /// Turns an obstacle into a free cell. Returns whether anything changed.
    pub fn erase_obstacle(&mut self, point: Point) -> bool {
        match self.index(point) {
            Some(ix) if self.cells[ix] == CellState::Obstacle => {
                self.write(ix, CellState::Free);
                true
            }
            _ => false,
        }
    }

    pub fn clear_obstacles(&mut self) {
        for ix in 0..self.cells.len() {
            if self.cells[ix] == CellState::Obstacle {
                self.write(ix, CellState::Free);
            }
        }
    }

    pub fn clear_all(&mut self) {
        self.cells = vec![CellState::Free; self.n * self.n];
        self.start = None;
        self.goal = None;
        self.components = UnionFind::new(self.n * self.n);
        self.components_dirty = true;
    }

    /// Changes the side length, clamped to `[MIN_N, MAX_N]`, and empties the grid.
    pub fn resize(&mut self, n: usize) {
        let clamped = n.clamp(MIN_N, MAX_N);
        if clamped != n {
            debug!("Requested size {} clamped to {}", n, clamped);
        }
        info!("Resizing grid from {} to {}", self.n, clamped);
        self.n = clamped;
        self.clear_all();
    }

    /// Replaces all obstacles by a fresh random layout where every cell is blocked with
    /// probability `density`. The start and goal cells always stay passable.
    pub fn randomize_obstacles<R: Rng>(&mut self, rng: &mut R, density: f64) {
        let density = unit_density(density);
        self.density = density;
        self.clear_obstacles();
        for ix in 0..self.cells.len() {
            if self.cells[ix] == CellState::Free && rng.gen_bool(density) {
                self.write(ix, CellState::Obstacle);
            }
        }
        info!(
            "Randomized obstacles on {}x{} grid with density {:.2}",
            self.n, self.n, density
        );
    }

    /// Checks whether a single move from `from` to the adjacent `pos` is allowed. Diagonal moves
    /// additionally require both orthogonal cells they pass to be free of obstacles.
    pub fn can_move_to(&self, pos: Point, from: Point) -> bool {
        debug_assert!((from.x - pos.x).abs() <= 1 && (from.y - pos.y).abs() <= 1);
        if !self.is_passable(pos) {
            return false;
        }
        if pos.x != from.x && pos.y != from.y {
            self.is_passable(Point::new(pos.x, from.y)) && self.is_passable(Point::new(from.x, pos.y))
        } else {
            true
        }
    }

    /// The passable neighbours of `point` with their move cost.
    pub fn neighbors(&self, point: Point) -> Neighbours {
        MOVES
            .iter()
            .map(|&(dx, dy)| Point::new(point.x + dx, point.y + dy))
            .filter(|&p| self.can_move_to(p, point))
            .map(|p| (p, self.move_cost(point, p)))
            .collect()
    }

    /// Cost of the single move between two adjacent cells.
    pub fn move_cost(&self, from: Point, to: Point) -> i32 {
        octile_distance(from, to)
    }

    /// Manhattan distance scaled by the straight move cost. Diagonal moves cost less than two
    /// straight ones, so this overestimates on open ground and the search is not guaranteed to
    /// return a shortest path.
    pub fn heuristic(&self, a: Point, b: Point) -> i32 {
        ((a.x - b.x).abs() + (a.y - b.y).abs()) * ORTHOGONAL_COST
    }

    /// Total cost of following a path cell by cell.
    pub fn path_cost(&self, path: &[Point]) -> i32 {
        path.windows(2)
            .map(|pair| self.move_cost(pair[0], pair[1]))
            .sum()
    }

    /// Regenerates the components if they are marked as dirty.
    pub fn update(&mut self) {
        if self.components_dirty {
            self.generate_components();
        }
    }

    /// Generates a new [UnionFind] structure and joins every passable cell with the neighbours
    /// it can move to.
    pub fn generate_components(&mut self) {
        debug!("Generating connected components for {}x{} grid", self.n, self.n);
        let n = self.n as i32;
        let mut components = UnionFind::new(self.n * self.n);
        for (y, x) in iproduct!(0..n, 0..n) {
            let point = Point::new(x, y);
            if !self.is_passable(point) {
                continue;
            }
            let ix = y as usize * self.n + x as usize;
            for (neighbour, _) in self.neighbors(point) {
                components.union(ix, neighbour.y as usize * self.n + neighbour.x as usize);
            }
        }
        self.components = components;
        self.components_dirty = false;
    }

    /// Checks if start and goal are on the same component. Out of bounds or blocked points are
    /// never reachable.
    pub fn reachable(&self, start: Point, goal: Point) -> bool {
        if self.components_dirty {
            warn!("Querying reachability on dirty components, call update() first");
        }
        if !self.is_passable(start) || !self.is_passable(goal) {
            return false;
        }
        match (self.index(start), self.index(goal)) {
            (Some(a), Some(b)) => self.components.equiv(a, b),
            _ => false,
        }
    }

    /// Number of passable cells on the component of `from`, `from` included.
    pub fn reachable_count(&self, from: Point) -> usize {
        if self.components_dirty {
            warn!("Querying reachability on dirty components, call update() first");
        }
        let Some(from_ix) = self.index(from).filter(|_| self.is_passable(from)) else {
            return 0;
        };
        let root = self.components.find(from_ix);
        (0..self.cells.len())
            .filter(|&ix| self.cells[ix] != CellState::Obstacle && self.components.find(ix) == root)
            .count()
    }
}

/// Cost of the cheapest obstacle-free route between two points: as many diagonal moves as
/// possible, the rest straight.
pub fn octile_distance(a: Point, b: Point) -> i32 {
    let delta_x = (a.x - b.x).abs();
    let delta_y = (a.y - b.y).abs();
    let e = 2 * ORTHOGONAL_COST - DIAGONAL_COST;
    (e * (delta_x - delta_y).abs() + DIAGONAL_COST * (delta_x + delta_y)) / 2
}

impl fmt::Display for GridModel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for row in self.cells.chunks(self.n) {
            let line = row.iter().map(|c| c.symbol()).collect::<String>();
            writeln!(f, "{}", line)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn p(x: i32, y: i32) -> Point {
        Point::new(x, y)
    }

    #[test]
    fn new_and_resize_clamp() {
        assert_eq!(GridModel::new(2, 0.2).size(), MIN_N);
        assert_eq!(GridModel::new(1000, 0.2).size(), MAX_N);
        let mut grid = GridModel::new(10, 0.2);
        grid.set_start(p(1, 1)).unwrap();
        grid.set_cell(p(2, 2), CellState::Obstacle).unwrap();
        grid.resize(70);
        assert_eq!(grid.size(), MAX_N);
        assert_eq!(grid.start(), None);
        assert_eq!(grid.cell(p(2, 2)), Some(CellState::Free));
    }

    #[test]
    fn bounds_and_passability() {
        let mut grid = GridModel::new(6, 0.0);
        grid.set_cell(p(3, 3), CellState::Obstacle).unwrap();
        assert!(grid.in_bounds(p(0, 0)));
        assert!(grid.in_bounds(p(5, 5)));
        assert!(!grid.in_bounds(p(6, 0)));
        assert!(!grid.in_bounds(p(-1, 2)));
        assert!(!grid.is_passable(p(3, 3)));
        assert!(!grid.is_passable(p(-1, 0)));
        assert!(grid.is_passable(p(2, 3)));
        assert_eq!(
            grid.set_cell(p(6, 1), CellState::Obstacle),
            Err(GridError::OutOfBounds {
                point: p(6, 1),
                size: 6
            })
        );
    }

    #[test]
    fn start_and_goal_placement() {
        let mut grid = GridModel::new(6, 0.0);
        grid.set_start(p(0, 0)).unwrap();
        grid.set_start(p(1, 0)).unwrap();
        assert_eq!(grid.cell(p(0, 0)), Some(CellState::Free));
        assert_eq!(grid.cell(p(1, 0)), Some(CellState::Start));

        grid.set_cell(p(4, 4), CellState::Obstacle).unwrap();
        assert_eq!(grid.set_goal(p(4, 4)), Err(GridError::Blocked(p(4, 4))));

        grid.set_goal(p(1, 0)).unwrap();
        assert_eq!(grid.start(), None);
        assert_eq!(grid.goal(), Some(p(1, 0)));
        assert_eq!(grid.cell(p(1, 0)), Some(CellState::Goal));
    }

    #[test]
    fn obstacle_edits_leave_endpoints_alone() {
        let mut grid = GridModel::new(6, 0.0);
        grid.set_start(p(0, 0)).unwrap();
        grid.set_goal(p(5, 5)).unwrap();
        assert_eq!(grid.toggle_obstacle(p(0, 0)), Err(GridError::Occupied(p(0, 0))));
        assert_eq!(grid.toggle_obstacle(p(2, 2)), Ok(CellState::Obstacle));
        assert!(!grid.paint_obstacle(p(5, 5)));
        assert!(grid.paint_obstacle(p(3, 2)));
        assert!(!grid.erase_obstacle(p(4, 4)));

        grid.clear_obstacles();
        assert_eq!(grid.cell(p(2, 2)), Some(CellState::Free));
        assert_eq!(grid.cell(p(3, 2)), Some(CellState::Free));
        assert_eq!(grid.start(), Some(p(0, 0)));
        assert_eq!(grid.cell(p(5, 5)), Some(CellState::Goal));

        grid.clear_all();
        assert_eq!(grid.start(), None);
        assert_eq!(grid.goal(), None);
        assert_eq!(grid.cell(p(0, 0)), Some(CellState::Free));
    }

    #[test]
    fn overwriting_start_with_set_cell_clears_it() {
        let mut grid = GridModel::new(6, 0.0);
        grid.set_start(p(2, 2)).unwrap();
        grid.set_cell(p(2, 2), CellState::Obstacle).unwrap();
        assert_eq!(grid.start(), None);
        grid.set_cell(p(3, 3), CellState::Goal).unwrap();
        assert_eq!(grid.goal(), Some(p(3, 3)));
    }

    #[test]
    fn neighbour_costs() {
        let grid = GridModel::new(6, 0.0);
        let neighbours = grid.neighbors(p(2, 2));
        assert_eq!(neighbours.len(), 8);
        assert_eq!(neighbours.iter().filter(|(_, c)| *c == ORTHOGONAL_COST).count(), 4);
        assert_eq!(neighbours.iter().filter(|(_, c)| *c == DIAGONAL_COST).count(), 4);
        assert_eq!(grid.neighbors(p(0, 0)).len(), 3);
    }

    /// A single obstacle next to a cell removes the two diagonals that would pass it.
    #[test]
    fn no_corner_cutting() {
        //  ___
        // |.#.|
        // |.x.|
        //  ___
        let mut grid = GridModel::new(6, 0.0);
        grid.set_cell(p(1, 0), CellState::Obstacle).unwrap();
        let from = p(1, 1);
        assert!(!grid.can_move_to(p(0, 0), from));
        assert!(!grid.can_move_to(p(2, 0), from));
        assert!(grid.can_move_to(p(0, 2), from));
        assert!(!grid.can_move_to(p(1, 0), from));
        assert_eq!(grid.neighbors(from).len(), 5);
    }

    #[test]
    fn heuristic_and_path_cost() {
        let grid = GridModel::new(6, 0.0);
        assert_eq!(grid.heuristic(p(0, 0), p(4, 4)), 80);
        assert_eq!(octile_distance(p(0, 0), p(4, 4)), 56);
        assert_eq!(octile_distance(p(0, 0), p(5, 2)), 58);
        let path = [p(0, 0), p(1, 1), p(2, 1), p(3, 2)];
        assert_eq!(grid.path_cost(&path), 38);
        assert_eq!(grid.path_cost(&path[..1]), 0);
    }

    #[test]
    fn randomize_keeps_endpoints() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut grid = GridModel::new(12, 0.0);
        grid.set_start(p(0, 0)).unwrap();
        grid.set_goal(p(11, 11)).unwrap();
        grid.randomize_obstacles(&mut rng, 1.0);
        assert_eq!(grid.cell(p(0, 0)), Some(CellState::Start));
        assert_eq!(grid.cell(p(11, 11)), Some(CellState::Goal));
        assert_eq!(grid.cell(p(5, 5)), Some(CellState::Obstacle));
        grid.randomize_obstacles(&mut rng, 0.0);
        assert_eq!(grid.cell(p(5, 5)), Some(CellState::Free));
    }

    #[test]
    fn nan_density_falls_back_to_default() {
        let mut grid = GridModel::new(8, f64::NAN);
        assert_eq!(grid.density(), DEFAULT_DENSITY);
        grid.set_density(0.7);
        grid.set_density(f64::NAN);
        assert_eq!(grid.density(), DEFAULT_DENSITY);
        grid.set_density(3.0);
        assert_eq!(grid.density(), 1.0);
        grid.randomize_obstacles(&mut StdRng::seed_from_u64(3), f64::NAN);
        assert_eq!(grid.density(), DEFAULT_DENSITY);
    }

    #[test]
    fn heuristic_overestimates_diagonals() {
        let grid = GridModel::new(6, 0.0);
        assert!(grid.heuristic(p(0, 0), p(3, 3)) > octile_distance(p(0, 0), p(3, 3)));
        assert_eq!(grid.heuristic(p(0, 0), p(4, 0)), octile_distance(p(0, 0), p(4, 0)));
    }

    /// Tests whether points are correctly mapped to different connected components
    #[test]
    fn test_component_generation() {
        // |.#....|
        // |#.....|
        let mut grid = GridModel::new(6, 0.0);
        grid.set_cell(p(1, 0), CellState::Obstacle).unwrap();
        grid.set_cell(p(0, 1), CellState::Obstacle).unwrap();
        grid.update();
        assert!(!grid.reachable(p(0, 0), p(1, 1)));
        assert!(grid.reachable(p(1, 1), p(5, 5)));
        assert!(!grid.reachable(p(0, 0), p(1, 0)));
        assert_eq!(grid.reachable_count(p(0, 0)), 1);
        assert_eq!(grid.reachable_count(p(3, 3)), 36 - 3);
        assert_eq!(grid.reachable_count(p(1, 0)), 0);
    }

    #[test]
    fn display_marks_cells() {
        let mut grid = GridModel::new(6, 0.0);
        grid.set_start(p(0, 0)).unwrap();
        grid.set_goal(p(5, 0)).unwrap();
        grid.set_cell(p(2, 0), CellState::Obstacle).unwrap();
        let rendered = grid.to_string();
        assert_eq!(rendered.lines().next(), Some("S.#..G"));
        assert_eq!(rendered.lines().count(), 6);
    }
}
