//! Traversal plans: typed step lists evaluated against a graph store.
//!
//! A `TraversalPlan` is a value. Building one touches nothing; `execute`
//! walks its steps frontier by frontier, issuing one `neighbors` call per
//! frontier node per expand step. Every call is charged to a
//! `TraversalBudget`, which also carries the request deadline.

use std::time::{Duration, Instant};

use thiserror::Error;

use crate::graph::NodeId;
use crate::storage::{GraphStore, StorageError};

use super::types::Direction;

/// Errors raised while evaluating a traversal plan
#[derive(Debug, Error)]
pub enum TraversalError {
    #[error("traversal store call failed: {0}")]
    Store(#[from] StorageError),

    #[error("traversal call budget of {0} exhausted")]
    BudgetExhausted(usize),

    #[error("traversal deadline exceeded after {0} ms")]
    DeadlineExceeded(u128),
}

/// A single step of a traversal plan
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Replace each frontier node by its neighbors
    Expand {
        direction: Direction,
        label: Option<String>,
        limit: Option<usize>,
    },
    /// Keep frontier nodes of one node type
    HasLabel(String),
    /// Truncate the frontier
    Limit(usize),
}

/// Ordered list of steps starting at one origin node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraversalPlan {
    origin: NodeId,
    steps: Vec<Step>,
}

/// Caps the number of store calls and the wall time of a traversal
#[derive(Debug, Clone)]
pub struct TraversalBudget {
    max_calls: usize,
    calls: usize,
    started: Instant,
    deadline: Option<Instant>,
}

impl TraversalBudget {
    pub fn new(max_calls: usize, timeout: Option<Duration>) -> Self {
        Self::until(max_calls, timeout.map(|t| Instant::now() + t))
    }

    /// Budget that expires at a fixed instant, so several traversals of one
    /// request can share a single deadline
    pub fn until(max_calls: usize, deadline: Option<Instant>) -> Self {
        Self {
            max_calls,
            calls: 0,
            started: Instant::now(),
            deadline,
        }
    }

    /// Budget with no call cap and no deadline
    pub fn unbounded() -> Self {
        Self::new(usize::MAX, None)
    }

    /// Store calls issued so far
    pub fn calls(&self) -> usize {
        self.calls
    }

    /// Account for one store call, failing if the budget or deadline is spent
    pub fn charge(&mut self) -> Result<(), TraversalError> {
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Err(TraversalError::DeadlineExceeded(
                    self.started.elapsed().as_millis(),
                ));
            }
        }
        if self.calls >= self.max_calls {
            return Err(TraversalError::BudgetExhausted(self.max_calls));
        }
        self.calls += 1;
        Ok(())
    }
}

impl TraversalPlan {
    /// Start a plan at the given origin node
    pub fn from(origin: impl Into<NodeId>) -> Self {
        Self {
            origin: origin.into(),
            steps: Vec::new(),
        }
    }

    /// Append an expand step
    pub fn expand(mut self, direction: Direction, label: Option<&str>, limit: Option<usize>) -> Self {
        self.steps.push(Step::Expand {
            direction,
            label: label.map(str::to_string),
            limit,
        });
        self
    }

    /// Expand in both directions with no filter
    pub fn both(self) -> Self {
        self.expand(Direction::Both, None, None)
    }

    /// Append a node-type filter
    pub fn has_label(mut self, label: impl Into<String>) -> Self {
        self.steps.push(Step::HasLabel(label.into()));
        self
    }

    /// Append a frontier cap.
    ///
    /// A cap directly after an expand is also pushed into that expand, so
    /// no single store call returns more than `n` rows. The first `n` of the
    /// concatenated frontier are unchanged by this.
    pub fn limit(mut self, n: usize) -> Self {
        if let Some(Step::Expand { limit, .. }) = self.steps.last_mut() {
            *limit = Some(limit.map_or(n, |existing| existing.min(n)));
        }
        self.steps.push(Step::Limit(n));
        self
    }

    pub fn origin(&self) -> &NodeId {
        &self.origin
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Evaluate the plan, returning the final frontier.
    ///
    /// Frontiers are streams, not sets: a node reached along two paths
    /// appears twice.
    pub fn execute(
        &self,
        store: &dyn GraphStore,
        budget: &mut TraversalBudget,
    ) -> Result<Vec<NodeId>, TraversalError> {
        let mut frontier = vec![self.origin.clone()];

        for step in &self.steps {
            frontier = match step {
                Step::Expand {
                    direction,
                    label,
                    limit,
                } => {
                    let mut next = Vec::new();
                    for node in &frontier {
                        budget.charge()?;
                        next.extend(store.neighbors(node, *direction, label.as_deref(), *limit)?);
                    }
                    next
                }
                Step::HasLabel(label) => frontier
                    .into_iter()
                    .filter(|n| n.node_type() == label)
                    .collect(),
                Step::Limit(n) => {
                    frontier.truncate(*n);
                    frontier
                }
            };

            if frontier.is_empty() {
                break;
            }
        }

        Ok(frontier)
    }

    /// Evaluate any number of plans and concatenate their results in plan order
    pub fn union(
        plans: &[TraversalPlan],
        store: &dyn GraphStore,
        budget: &mut TraversalBudget,
    ) -> Result<Vec<NodeId>, TraversalError> {
        let mut out = Vec::new();
        for plan in plans {
            out.extend(plan.execute(store, budget)?);
        }
        Ok(out)
    }
}
