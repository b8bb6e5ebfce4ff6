use bevy::prelude::*;
use rustc_hash::FxHashMap;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fmt::Debug;
use std::hash::Hash;
use std::time::{Duration, Instant};

/// Bounds on a single search.
#[derive(Clone, Debug, PartialEq)]
pub struct SearchLimits {
    /// Expansions before the search is abandoned as a suspected infinite loop.
    pub max_iterations: usize,
    /// Wall-clock budget; exceeding it fails the search.
    pub time_limit: Option<Duration>,
    /// Reopens of a single node before the search is flagged as looping.
    pub revisit_threshold: u32,
}

impl Default for SearchLimits {
    fn default() -> Self {
        Self { max_iterations: 20_000, time_limit: None, revisit_threshold: 64 }
    }
}

/// A node in a best-first search graph.
///
/// States compute their own step cost when generated, so `adjacencies` sees
/// the goal and can aim intermediate points at it.
pub trait SearchState: Clone + Debug {
    type Key: Copy + Eq + Hash + Debug;
    type Context<'a>;

    fn key(&self) -> Self::Key;
    fn is_goal(&self, goal: &Self) -> bool;
    /// Push every neighbour state into `out`.
    fn adjacencies(&self, ctx: &Self::Context<'_>, goal: &Self, out: &mut Vec<Self>);
    fn distance_from_parent(&self) -> f32;
    /// Admissible estimate of the remaining cost.
    fn distance_to_goal(&self, goal: &Self) -> f32;
}

/// Counters from the most recent search.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SearchStats {
    pub iterations: usize,
    pub nodes: usize,
    pub reopened: usize,
    pub elapsed: Duration,
}

#[derive(Debug, Clone)]
struct Node<S> {
    state: S,
    g: f32,
    parent: Option<usize>,
    closed: bool,
    version: u32,
    reopens: u32,
}

#[derive(Debug, Clone, Copy)]
struct OpenEntry {
    f: f32,
    seq: u64,
    node: usize,
    version: u32,
}

impl PartialEq for OpenEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for OpenEntry {}

impl PartialOrd for OpenEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OpenEntry {
    // BinaryHeap is a max-heap: lowest f first, then earliest insertion.
    fn cmp(&self, other: &Self) -> Ordering {
        other.f.total_cmp(&self.f).then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Reusable A* search over [`SearchState`]s.
///
/// Buffers are kept between searches. After a successful `search`, `path`
/// walks from the start to the goal.
#[derive(Debug)]
pub struct AStar<S: SearchState> {
    nodes: Vec<Node<S>>,
    index: FxHashMap<S::Key, usize>,
    open: BinaryHeap<OpenEntry>,
    scratch: Vec<S>,
    seq: u64,
    goal: Option<usize>,
    stats: SearchStats,
    infinite_loop_problem: bool,
    timed_out: bool,
}

impl<S: SearchState> Default for AStar<S> {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            index: FxHashMap::default(),
            open: BinaryHeap::new(),
            scratch: Vec::new(),
            seq: 0,
            goal: None,
            stats: SearchStats::default(),
            infinite_loop_problem: false,
            timed_out: false,
        }
    }
}

impl<S: SearchState> AStar<S> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Search from `start` to `goal`. Neighbours whose accumulated cost would
    /// exceed `max_cost` are never opened.
    pub fn search(
        &mut self,
        ctx: &S::Context<'_>,
        start: S,
        goal: &S,
        max_cost: Option<f32>,
        limits: &SearchLimits,
    ) -> bool {
        self.reset();
        let started = Instant::now();
        self.timed_out = false;

        let f = start.distance_to_goal(goal);
        self.open_node(start, 0.0, f, None);

        let found = loop {
            let Some(entry) = self.open.pop() else {
                break false;
            };
            if self.nodes[entry.node].closed || self.nodes[entry.node].version != entry.version {
                continue;
            }
            self.nodes[entry.node].closed = true;

            self.stats.iterations += 1;
            if self.stats.iterations > limits.max_iterations {
                error!(
                    "[ASTAR] Exceeded {} iterations from {:?} towards {:?}, giving up",
                    limits.max_iterations,
                    self.nodes[0].state.key(),
                    goal.key()
                );
                self.infinite_loop_problem = true;
                break false;
            }
            if limits.time_limit.is_some_and(|limit| started.elapsed() > limit) {
                debug!("[ASTAR] Time limit hit after {} iterations", self.stats.iterations);
                self.timed_out = true;
                break false;
            }

            let current = entry.node;
            if self.nodes[current].state.is_goal(goal) {
                self.goal = Some(current);
                break true;
            }

            let mut neighbours = std::mem::take(&mut self.scratch);
            neighbours.clear();
            self.nodes[current].state.adjacencies(ctx, goal, &mut neighbours);
            let base = self.nodes[current].g;

            for next in neighbours.drain(..) {
                let g = base + next.distance_from_parent();
                if max_cost.is_some_and(|max| g > max) {
                    continue;
                }
                let f = g + next.distance_to_goal(goal);
                match self.index.get(&next.key()).copied() {
                    None => self.open_node(next, g, f, Some(current)),
                    Some(existing) if g < self.nodes[existing].g => {
                        self.reopen_node(existing, next, g, f, current, limits.revisit_threshold);
                    }
                    Some(_) => {}
                }
            }
            self.scratch = neighbours;
        };

        self.stats.nodes = self.nodes.len();
        self.stats.elapsed = started.elapsed();
        found
    }

    fn reset(&mut self) {
        self.nodes.clear();
        self.index.clear();
        self.open.clear();
        self.seq = 0;
        self.goal = None;
        self.stats = SearchStats::default();
    }

    fn open_node(&mut self, state: S, g: f32, f: f32, parent: Option<usize>) {
        let node = self.nodes.len();
        self.index.insert(state.key(), node);
        self.nodes.push(Node { state, g, parent, closed: false, version: 0, reopens: 0 });
        self.push_entry(node, f);
    }

    fn reopen_node(&mut self, node: usize, state: S, g: f32, f: f32, parent: usize, revisit_threshold: u32) {
        let entry = &mut self.nodes[node];
        if entry.closed {
            entry.reopens += 1;
            self.stats.reopened += 1;
            if entry.reopens > revisit_threshold && !self.infinite_loop_problem {
                warn!("[ASTAR] Node {:?} reopened {} times", state.key(), entry.reopens);
                self.infinite_loop_problem = true;
            }
        }
        entry.state = state;
        entry.g = g;
        entry.parent = Some(parent);
        entry.closed = false;
        entry.version += 1;
        self.push_entry(node, f);
    }

    fn push_entry(&mut self, node: usize, f: f32) {
        let version = self.nodes[node].version;
        self.open.push(OpenEntry { f, seq: self.seq, node, version });
        self.seq += 1;
    }

    /// States from the start to the goal of the last successful search.
    pub fn path(&self) -> impl Iterator<Item = &S> + '_ {
        let mut chain = Vec::new();
        let mut cursor = self.goal;
        while let Some(i) = cursor {
            chain.push(i);
            cursor = self.nodes[i].parent;
        }
        chain.into_iter().rev().map(move |i| &self.nodes[i].state)
    }

    /// Accumulated cost of the goal reached by the last search.
    pub fn goal_cost(&self) -> Option<f32> {
        self.goal.map(|i| self.nodes[i].g)
    }

    pub fn stats(&self) -> SearchStats {
        self.stats
    }

    /// Set once any search overran its iteration cap or kept reopening a node.
    /// Stays set until cleared.
    pub fn infinite_loop_problem(&self) -> bool {
        self.infinite_loop_problem
    }

    pub fn clear_infinite_loop_problem(&mut self) {
        self.infinite_loop_problem = false;
    }

    pub fn timed_out(&self) -> bool {
        self.timed_out
    }
}
