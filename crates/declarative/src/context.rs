//! Execution context and provider traits
//!
//! These allow the engine to be driven without depending on a specific
//! UI: the caller supplies options, a cancellation token and a progress sink.

use crate::planner::{Action, Mode};
use crate::retry::RetryConfig;
use crate::types::{ExecuteSummary, NodeStatus, ResourceId};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Pass-level cancellation signal: explicit abort or deadline
///
/// Checked before each node starts and again right before its API call;
/// calls already in flight are allowed to finish.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Token that trips once `timeout` has elapsed
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            deadline: Instant::now().checked_add(timeout),
        }
    }

    /// Abort the pass; shared by every clone of the token
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst) || self.deadline.is_some_and(|d| Instant::now() >= d)
    }
}

/// Options for a converge pass
#[derive(Debug, Clone)]
pub struct ExecuteOptions {
    /// Size of the worker pool for observation and execution
    pub jobs: usize,
    /// Retry policy for transient control-plane errors
    pub retry: RetryConfig,
    pub cancel: CancelToken,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            jobs: 4,
            retry: RetryConfig::default(),
            cancel: CancelToken::new(),
        }
    }
}

impl ExecuteOptions {
    /// Worker count, at least one
    pub fn workers(&self) -> usize {
        self.jobs.max(1)
    }
}

/// Progress callback for converge passes
///
/// Invoked on the scheduling thread only, never from workers.
pub trait ProgressCallback {
    /// Called once the plan is known, before the first node starts
    fn on_pass_start(&mut self, total: usize, mode: Mode);

    /// Called when a node is dispatched to the worker pool
    fn on_node_start(&mut self, id: &ResourceId, action: &Action);

    /// Called when a node reaches a terminal status
    fn on_node_complete(&mut self, id: &ResourceId, status: &NodeStatus);

    /// Called after every node is terminal
    fn on_pass_complete(&mut self, summary: &ExecuteSummary);
}

/// No-op progress callback
pub struct NoProgress;

impl ProgressCallback for NoProgress {
    fn on_pass_start(&mut self, _total: usize, _mode: Mode) {}
    fn on_node_start(&mut self, _id: &ResourceId, _action: &Action) {}
    fn on_node_complete(&mut self, _id: &ResourceId, _status: &NodeStatus) {}
    fn on_pass_complete(&mut self, _summary: &ExecuteSummary) {}
}
