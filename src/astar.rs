//! A resumable A* search that performs one node expansion per call.
//!
//! The bookkeeping follows the usual indexed layout: every discovered point gets an entry in an
//! [FxIndexMap] holding the index of its parent and its best known cost, and the binary heap only
//! stores indices into that map. A point can sit in the heap several times if a cheaper way to
//! reach it was found; the outdated entries are skipped once the point has been expanded.
use fxhash::FxBuildHasher;
use grid_util::point::Point;
use indexmap::map::Entry::{Occupied, Vacant};
use indexmap::{IndexMap, IndexSet};
use log::{info, trace};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::Instant;
use thiserror::Error;

use crate::grid::GridModel;

pub type FxIndexMap<K, V> = IndexMap<K, V, FxBuildHasher>;
pub type FxIndexSet<K> = IndexSet<K, FxBuildHasher>;

const NO_PARENT: usize = usize::MAX;

#[derive(Debug)]
struct SmallestCostHolder {
    estimated_cost: i32,
    sequence: u64,
    index: usize,
}

impl Eq for SmallestCostHolder {}

impl PartialEq for SmallestCostHolder {
    fn eq(&self, other: &Self) -> bool {
        self.estimated_cost == other.estimated_cost && self.sequence == other.sequence
    }
}

impl PartialOrd for SmallestCostHolder {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SmallestCostHolder {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed so the max-heap pops the smallest estimate first, and among equal
        // estimates the entry that was pushed first.
        other
            .estimated_cost
            .cmp(&self.estimated_cost)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

/// Where a search is in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SearchPhase {
    Ready,
    Running,
    Succeeded,
    Failed,
}

/// The observation returned by [AStarSearch::advance_one].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Step {
    /// One point was expanded. The sets are copies and stay valid after later steps.
    Progress {
        expanded: Point,
        open: FxIndexSet<Point>,
        closed: FxIndexSet<Point>,
    },
    Succeeded {
        path: Vec<Point>,
        total_cost: i32,
        nodes_expanded: usize,
        elapsed_ms: u64,
    },
    Failed {
        nodes_expanded: usize,
        elapsed_ms: u64,
    },
}

impl Step {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Step::Progress { .. })
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SearchError {
    #[error("place a start cell before searching")]
    MissingStart,
    #[error("place a goal cell before searching")]
    MissingGoal,
    #[error("cell {0} is outside the grid")]
    OutOfBounds(Point),
    #[error("cell {0} holds an obstacle, free it before searching")]
    Blocked(Point),
    #[error("start and goal are the same cell {0}")]
    SameStartGoal(Point),
    #[error("the search has already finished")]
    Finished,
}

/// A* search between two points of a [GridModel] that is advanced explicitly, one expansion per
/// [advance_one](Self::advance_one) call.
///
/// The search works on a copy of the grid taken at construction. Edits made to the original grid
/// afterwards are not seen, so a driver should drop the search whenever the grid changes.
#[derive(Debug)]
pub struct AStarSearch {
    grid: GridModel,
    start: Point,
    goal: Point,
    to_see: BinaryHeap<SmallestCostHolder>,
    parents: FxIndexMap<Point, (usize, i32)>,
    open: FxIndexSet<Point>,
    closed: FxIndexSet<Point>,
    sequence: u64,
    nodes_expanded: usize,
    phase: SearchPhase,
    started: Instant,
}

impl AStarSearch {
    /// Prepares a search from `start` to `goal`. Both must be passable cells of the grid and
    /// must differ; the trivial case is left to the caller.
    pub fn new(grid: &GridModel, start: Point, goal: Point) -> Result<AStarSearch, SearchError> {
        for point in [start, goal] {
            if !grid.in_bounds(point) {
                return Err(SearchError::OutOfBounds(point));
            }
        }
        for point in [start, goal] {
            if !grid.is_passable(point) {
                return Err(SearchError::Blocked(point));
            }
        }
        if start == goal {
            return Err(SearchError::SameStartGoal(start));
        }

        let mut parents = FxIndexMap::default();
        parents.insert(start, (NO_PARENT, 0));
        let mut to_see = BinaryHeap::new();
        to_see.push(SmallestCostHolder {
            estimated_cost: grid.heuristic(start, goal),
            sequence: 0,
            index: 0,
        });
        let mut open = FxIndexSet::default();
        open.insert(start);
        info!("Starting A* search from {} to {}", start, goal);
        Ok(AStarSearch {
            grid: grid.clone(),
            start,
            goal,
            to_see,
            parents,
            open,
            closed: FxIndexSet::default(),
            sequence: 0,
            nodes_expanded: 0,
            phase: SearchPhase::Ready,
            started: Instant::now(),
        })
    }

    /// Prepares a search between the start and goal stored on the grid.
    pub fn from_grid(grid: &GridModel) -> Result<AStarSearch, SearchError> {
        let start = grid.start().ok_or(SearchError::MissingStart)?;
        let goal = grid.goal().ok_or(SearchError::MissingGoal)?;
        AStarSearch::new(grid, start, goal)
    }

    pub fn phase(&self) -> SearchPhase {
        self.phase
    }
    pub fn is_finished(&self) -> bool {
        matches!(self.phase, SearchPhase::Succeeded | SearchPhase::Failed)
    }
    pub fn start(&self) -> Point {
        self.start
    }
    pub fn goal(&self) -> Point {
        self.goal
    }
    pub fn nodes_expanded(&self) -> usize {
        self.nodes_expanded
    }
    /// Best known cost from the start, [None] for points not reached yet.
    pub fn g_score(&self, point: &Point) -> Option<i32> {
        self.parents.get(point).map(|&(_, cost)| cost)
    }
    pub fn open_set(&self) -> &FxIndexSet<Point> {
        &self.open
    }
    pub fn closed_set(&self) -> &FxIndexSet<Point> {
        &self.closed
    }

    fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    /// Expands the next point on the frontier, or reports how the search ended.
    ///
    /// Returns [SearchError::Finished] once a [Step::Succeeded] or [Step::Failed] has been
    /// handed out.
    pub fn advance_one(&mut self) -> Result<Step, SearchError> {
        match self.phase {
            SearchPhase::Succeeded | SearchPhase::Failed => return Err(SearchError::Finished),
            SearchPhase::Ready => self.phase = SearchPhase::Running,
            SearchPhase::Running => {}
        }

        // Entries for points that were already expanded are leftovers from a later
        // improvement and are dropped without counting as a step.
        let (index, current, cost) = loop {
            let Some(SmallestCostHolder { index, .. }) = self.to_see.pop() else {
                return Ok(self.fail());
            };
            match self.parents.get_index(index) {
                Some((&point, &(_, cost))) if !self.closed.contains(&point) => {
                    break (index, point, cost)
                }
                _ => trace!("Skipping stale queue entry {}", index),
            }
        };
        self.open.swap_remove(&current);

        if current == self.goal {
            return Ok(self.succeed(index, cost));
        }

        self.closed.insert(current);
        self.nodes_expanded += 1;
        trace!("Expanding {} with cost {}", current, cost);

        for (successor, move_cost) in self.grid.neighbors(current) {
            let new_cost = cost + move_cost;
            let n; // index for successor
            match self.parents.entry(successor) {
                Vacant(e) => {
                    n = e.index();
                    e.insert((index, new_cost));
                }
                Occupied(mut e) => {
                    // Expanded points are relaxed as well. The heuristic overestimates
                    // diagonals, so a closed point can still get a cheaper parent here.
                    if e.get().1 > new_cost {
                        n = e.index();
                        e.insert((index, new_cost));
                    } else {
                        continue;
                    }
                }
            }
            self.sequence += 1;
            self.to_see.push(SmallestCostHolder {
                estimated_cost: new_cost + self.grid.heuristic(successor, self.goal),
                sequence: self.sequence,
                index: n,
            });
            // A closed point is never expanded again, so its new entry is not frontier.
            if !self.closed.contains(&successor) {
                self.open.insert(successor);
            }
        }

        Ok(Step::Progress {
            expanded: current,
            open: self.open.clone(),
            closed: self.closed.clone(),
        })
    }

    /// Advances until the search ends and returns the terminal [Step].
    pub fn run_to_end(&mut self) -> Result<Step, SearchError> {
        loop {
            let step = self.advance_one()?;
            if step.is_terminal() {
                return Ok(step);
            }
        }
    }

    fn succeed(&mut self, index: usize, total_cost: i32) -> Step {
        self.phase = SearchPhase::Succeeded;
        let path = self.reverse_path(index);
        let elapsed_ms = self.elapsed_ms();
        info!(
            "Path from {} to {} found: cost {}, {} nodes expanded in {} ms",
            self.start, self.goal, total_cost, self.nodes_expanded, elapsed_ms
        );
        Step::Succeeded {
            path,
            total_cost,
            nodes_expanded: self.nodes_expanded,
            elapsed_ms,
        }
    }

    fn fail(&mut self) -> Step {
        self.phase = SearchPhase::Failed;
        let elapsed_ms = self.elapsed_ms();
        info!(
            "No path from {} to {}: {} nodes expanded in {} ms",
            self.start, self.goal, self.nodes_expanded, elapsed_ms
        );
        Step::Failed {
            nodes_expanded: self.nodes_expanded,
            elapsed_ms,
        }
    }

    fn reverse_path(&self, index: usize) -> Vec<Point> {
        let mut i = index;
        let mut path: Vec<Point> = std::iter::from_fn(|| {
            let (node, &(parent, _)) = self.parents.get_index(i)?;
            i = parent;
            Some(*node)
        })
        .collect();
        path.reverse();
        path
    }
}

/// Runs a complete search between two points and returns the path with its cost, or [None] if
/// the goal cannot be reached. Equal start and goal give the single-cell path of cost zero.
pub fn find_path(
    grid: &GridModel,
    start: Point,
    goal: Point,
) -> Result<Option<(Vec<Point>, i32)>, SearchError> {
    if start == goal && grid.is_passable(start) {
        return Ok(Some((vec![start], 0)));
    }
    let mut search = AStarSearch::new(grid, start, goal)?;
    match search.run_to_end()? {
        Step::Succeeded {
            path, total_cost, ..
        } => Ok(Some((path, total_cost))),
        _ => Ok(None),
    }
}
