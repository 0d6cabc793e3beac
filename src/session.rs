//! The driver around a grid and its search.
//!
//! A [Session] owns one [GridModel] and at most one running [AStarSearch]. It turns editing and
//! stepping requests into state a front-end can draw: the open and closed cells of the last
//! step, the found path, the run [Metrics] and a [Status] line. Any edit of the grid while a
//! search is running cancels that search and reports [Status::RunCancelled]. An edit after a
//! finished run drops its path and cells and returns to [Status::Idle].
use core::fmt;
use std::io::Write;

use grid_util::point::Point;
use log::{debug, info, warn};
use rand::Rng;
use serde::Serialize;

use crate::astar::{AStarSearch, FxIndexSet, SearchError, Step};
use crate::export::{write_path, ExportError};
use crate::grid::{CellState, GridError, GridModel};
use crate::{path_steps, DEFAULT_DENSITY, MAX_N, MAX_STEPS_PER_TICK, MIN_N, RESIZE_STEP};

/// Runtime knobs of a [Session].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SessionConfig {
    /// Obstacle probability used by [Session::randomize].
    pub density: f64,
    /// Animation speed in `[0, 1]`, see [steps_per_tick](Self::steps_per_tick).
    pub speed: f64,
    /// When set, [Session::tick] does nothing and the search only moves on [Session::step_once].
    pub step_mode: bool,
}

impl Default for SessionConfig {
    fn default() -> SessionConfig {
        SessionConfig {
            density: DEFAULT_DENSITY,
            speed: 0.5,
            step_mode: false,
        }
    }
}

impl SessionConfig {
    /// Number of expansions one tick performs: one, plus up to [MAX_STEPS_PER_TICK] scaled by
    /// the speed.
    pub fn steps_per_tick(&self) -> usize {
        1 + (self.speed.clamp(0.0, 1.0) * MAX_STEPS_PER_TICK as f64) as usize
    }
}

/// Statistics of the last finished run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Metrics {
    pub nodes_expanded: usize,
    pub total_cost: i32,
    pub path_steps: usize,
    pub elapsed_ms: u64,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Status {
    Idle,
    Searching,
    Found(Metrics),
    NoPath(Metrics),
    /// Start and goal coincide; the path is the single start cell and no search ran.
    Trivial,
    /// A running search was dropped because the grid changed underneath it.
    RunCancelled,
    /// A request was refused, with a message for the user.
    Rejected(String),
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Status::Idle => write!(f, "Ready. Place a start and a goal."),
            Status::Searching => write!(f, "Searching..."),
            Status::Found(m) => write!(
                f,
                "Path found. Cost={} Steps={} Nodes={} Time={}ms",
                m.total_cost, m.path_steps, m.nodes_expanded, m.elapsed_ms
            ),
            Status::NoPath(m) => write!(
                f,
                "No path possible. Nodes expanded={} Time={}ms",
                m.nodes_expanded, m.elapsed_ms
            ),
            Status::Trivial => write!(f, "Start equals goal, nothing to search."),
            Status::RunCancelled => write!(f, "Grid changed, search cancelled."),
            Status::Rejected(message) => write!(f, "{}", message),
        }
    }
}

#[derive(Debug)]
pub struct Session {
    grid: GridModel,
    search: Option<AStarSearch>,
    open: FxIndexSet<Point>,
    closed: FxIndexSet<Point>,
    path: Option<Vec<Point>>,
    metrics: Metrics,
    status: Status,
    config: SessionConfig,
}

impl Default for Session {
    fn default() -> Session {
        Session::new(GridModel::default(), SessionConfig::default())
    }
}

impl Session {
    pub fn new(grid: GridModel, config: SessionConfig) -> Session {
        Session {
            grid,
            search: None,
            open: FxIndexSet::default(),
            closed: FxIndexSet::default(),
            path: None,
            metrics: Metrics::default(),
            status: Status::Idle,
            config,
        }
    }

    pub fn grid(&self) -> &GridModel {
        &self.grid
    }
    pub fn is_running(&self) -> bool {
        self.search.is_some()
    }
    pub fn open_set(&self) -> &FxIndexSet<Point> {
        &self.open
    }
    pub fn closed_set(&self) -> &FxIndexSet<Point> {
        &self.closed
    }
    pub fn path(&self) -> Option<&[Point]> {
        self.path.as_deref()
    }
    pub fn metrics(&self) -> Metrics {
        self.metrics
    }
    pub fn status(&self) -> &Status {
        &self.status
    }
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    fn clear_view(&mut self) {
        self.open.clear();
        self.closed.clear();
        self.path = None;
    }

    fn reject(&mut self, message: String) {
        warn!("{}", message);
        self.status = Status::Rejected(message);
    }

    fn refuse(&mut self, error: SearchError) -> Result<(), SearchError> {
        self.search = None;
        self.reject(error.to_string());
        Err(error)
    }

    /// Drops a running search or a shown result after the grid was edited.
    fn cancel_run(&mut self) {
        if self.search.take().is_some() {
            info!("Grid edited while searching, search cancelled");
            self.clear_view();
            self.status = Status::RunCancelled;
        } else if matches!(
            self.status,
            Status::Found(_) | Status::NoPath(_) | Status::Trivial
        ) {
            debug!("Grid edited, last result dropped");
            self.clear_view();
            self.status = Status::Idle;
        }
    }

    fn edited<T>(&mut self, result: Result<T, GridError>) -> Result<T, GridError> {
        match result {
            Ok(value) => {
                self.cancel_run();
                Ok(value)
            }
            Err(e) => {
                self.reject(e.to_string());
                Err(e)
            }
        }
    }

    pub fn set_start(&mut self, point: Point) -> Result<(), GridError> {
        let result = self.grid.set_start(point);
        self.edited(result)
    }

    pub fn set_goal(&mut self, point: Point) -> Result<(), GridError> {
        let result = self.grid.set_goal(point);
        self.edited(result)
    }

    pub fn set_cell(&mut self, point: Point, state: CellState) -> Result<(), GridError> {
        let result = self.grid.set_cell(point, state);
        self.edited(result)
    }

    pub fn toggle_obstacle(&mut self, point: Point) -> Result<CellState, GridError> {
        let result = self.grid.toggle_obstacle(point);
        self.edited(result)
    }

    /// Drag-paints an obstacle. Cells that are not free are skipped silently.
    pub fn paint_obstacle(&mut self, point: Point) -> bool {
        let changed = self.grid.paint_obstacle(point);
        if changed {
            self.cancel_run();
        }
        changed
    }

    pub fn erase_obstacle(&mut self, point: Point) -> bool {
        let changed = self.grid.erase_obstacle(point);
        if changed {
            self.cancel_run();
        }
        changed
    }

    /// Generates a random obstacle layout with the configured density.
    pub fn randomize<R: Rng>(&mut self, rng: &mut R) {
        self.grid.randomize_obstacles(rng, self.config.density);
        self.cancel_run();
        if self.status != Status::RunCancelled {
            self.status = Status::Idle;
        }
    }

    pub fn clear_obstacles(&mut self) {
        self.grid.clear_obstacles();
        self.cancel_run();
    }

    /// Empties the grid and forgets the shown search state.
    pub fn clear_all(&mut self) {
        self.grid.clear_all();
        self.cancel_run();
        self.clear_view();
        self.metrics = Metrics::default();
        if self.status != Status::RunCancelled {
            self.status = Status::Idle;
        }
    }

    /// Resizes the grid (clamped to `[MIN_N, MAX_N]`), which empties it.
    pub fn resize(&mut self, n: usize) {
        self.grid.resize(n);
        self.cancel_run();
        self.clear_view();
    }

    /// Grows the grid by [RESIZE_STEP]. Refused if that would exceed [MAX_N].
    pub fn grow(&mut self) -> bool {
        let n = self.grid.size() + RESIZE_STEP;
        if n > MAX_N {
            self.reject(format!("Maximum size is {}.", MAX_N));
            return false;
        }
        self.resize(n);
        true
    }

    /// Shrinks the grid by [RESIZE_STEP]. Refused if that would go below [MIN_N].
    pub fn shrink(&mut self) -> bool {
        let n = match self.grid.size().checked_sub(RESIZE_STEP) {
            Some(n) if n >= MIN_N => n,
            _ => {
                self.reject(format!("Minimum size is {}.", MIN_N));
                return false;
            }
        };
        self.resize(n);
        true
    }

    pub fn toggle_step_mode(&mut self) -> bool {
        self.config.step_mode = !self.config.step_mode;
        debug!("Step mode {}", if self.config.step_mode { "on" } else { "off" });
        self.config.step_mode
    }
    pub fn set_speed(&mut self, speed: f64) {
        self.config.speed = speed.clamp(0.0, 1.0);
    }
    pub fn set_density(&mut self, density: f64) {
        self.grid.set_density(density);
        self.config.density = self.grid.density();
    }

    /// Starts a new search between the grid's start and goal, replacing a running one.
    pub fn find_path(&mut self) -> Result<(), SearchError> {
        let (start, goal) = match (self.grid.start(), self.grid.goal()) {
            (Some(start), Some(goal)) => (start, goal),
            (None, _) => return self.refuse(SearchError::MissingStart),
            (_, None) => return self.refuse(SearchError::MissingGoal),
        };
        self.find_path_between(start, goal)
    }

    /// Starts a new search between two arbitrary cells, replacing a running one.
    ///
    /// Blocked or out of bounds endpoints are refused and no search is created. Equal start and
    /// goal produce the single-cell path right away.
    pub fn find_path_between(&mut self, start: Point, goal: Point) -> Result<(), SearchError> {
        self.search = None;
        if start == goal && self.grid.is_passable(start) {
            self.clear_view();
            self.path = Some(vec![start]);
            self.metrics = Metrics::default();
            self.status = Status::Trivial;
            return Ok(());
        }
        let search = match AStarSearch::new(&self.grid, start, goal) {
            Ok(search) => search,
            Err(e) => return self.refuse(e),
        };
        self.clear_view();
        self.metrics = Metrics::default();
        self.status = Status::Searching;
        self.search = Some(search);
        Ok(())
    }

    /// Advances the running search by one expansion. Returns [None] if no search is running.
    pub fn step_once(&mut self) -> Result<Option<Step>, SearchError> {
        let Some(search) = self.search.as_mut() else {
            return Ok(None);
        };
        let step = search.advance_one()?;
        self.observe(&step);
        Ok(Some(step))
    }

    /// Performs one animation tick: [steps_per_tick](SessionConfig::steps_per_tick) expansions
    /// unless step mode is on. Returns how many steps were taken.
    pub fn tick(&mut self) -> Result<usize, SearchError> {
        if self.config.step_mode {
            return Ok(0);
        }
        let mut taken = 0;
        for _ in 0..self.config.steps_per_tick() {
            match self.step_once()? {
                Some(step) => {
                    taken += 1;
                    if step.is_terminal() {
                        break;
                    }
                }
                None => break,
            }
        }
        Ok(taken)
    }

    fn observe(&mut self, step: &Step) {
        match step {
            Step::Progress { open, closed, .. } => {
                self.open = open.clone();
                self.closed = closed.clone();
            }
            Step::Succeeded {
                path,
                total_cost,
                nodes_expanded,
                elapsed_ms,
            } => {
                self.metrics = Metrics {
                    nodes_expanded: *nodes_expanded,
                    total_cost: *total_cost,
                    path_steps: path_steps(path),
                    elapsed_ms: *elapsed_ms,
                };
                self.path = Some(path.clone());
                self.status = Status::Found(self.metrics);
                self.search = None;
            }
            Step::Failed {
                nodes_expanded,
                elapsed_ms,
            } => {
                self.metrics = Metrics {
                    nodes_expanded: *nodes_expanded,
                    elapsed_ms: *elapsed_ms,
                    ..Metrics::default()
                };
                self.clear_view();
                self.status = Status::NoPath(self.metrics);
                self.search = None;
            }
        }
    }

    /// Writes the last found path as JSON.
    pub fn export_path<W: Write>(&self, writer: W) -> Result<(), ExportError> {
        let path = self.path.as_deref().ok_or(ExportError::NoPath)?;
        write_path(path, writer)
    }
}
