//! Result ordering policies.
//!
//! An ordering policy maps an execution index (the rank at which a work item
//! started running) to the result slot that receives its outcome. The two
//! policies also carry the pool's in-flight accounting as a side effect of
//! their bookkeeping.

use std::collections::HashSet;

/// How completed outcomes are laid out in the result sequence.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ResultOrder {
    /// Outcomes land in the order work items finish.
    #[default]
    Completion,
    /// Slot `i` receives the outcome of the `i`-th submitted item.
    Submission,
}

/// Tagged union over the two policies. Two variants do not justify
/// virtual dispatch.
pub(crate) enum OrderPolicy {
    Completion(CompletionOrder),
    Submission(SubmissionOrder),
}

impl OrderPolicy {
    pub(crate) fn new(order: ResultOrder) -> Self {
        match order {
            ResultOrder::Completion => Self::Completion(CompletionOrder::default()),
            ResultOrder::Submission => Self::Submission(SubmissionOrder::default()),
        }
    }

    /// Assign an execution index to a work item that is about to run.
    pub(crate) fn add_execution(&mut self) -> usize {
        match self {
            Self::Completion(o) => o.add_execution(),
            Self::Submission(o) => o.add_execution(),
        }
    }

    /// Resolve the result slot for a finished execution.
    pub(crate) fn result_position(&mut self, execution: usize) -> usize {
        match self {
            Self::Completion(o) => o.result_position(),
            Self::Submission(o) => o.result_position(execution),
        }
    }

    pub(crate) fn in_flight(&self) -> usize {
        match self {
            Self::Completion(o) => o.in_flight(),
            Self::Submission(o) => o.in_flight(),
        }
    }
}

/// Sliding range `lo..hi` of allocated, still-pending result positions.
/// The next completion, whichever item it is, takes `lo`.
#[derive(Default)]
pub(crate) struct CompletionOrder {
    lo: usize,
    hi: usize,
}

impl CompletionOrder {
    fn add_execution(&mut self) -> usize {
        let execution = self.hi;
        self.hi += 1;
        execution
    }

    fn result_position(&mut self) -> usize {
        debug_assert!(self.lo < self.hi, "completion without a running execution");
        let position = self.lo;
        self.lo += 1;
        position
    }

    fn in_flight(&self) -> usize {
        self.hi - self.lo
    }
}

/// Outcomes land at exactly their execution index.
#[derive(Default)]
pub(crate) struct SubmissionOrder {
    next: usize,
    executing: HashSet<usize>,
}

impl SubmissionOrder {
    fn add_execution(&mut self) -> usize {
        let execution = self.next;
        self.executing.insert(execution);
        self.next += 1;
        execution
    }

    fn result_position(&mut self, execution: usize) -> usize {
        assert!(
            self.executing.remove(&execution),
            "completion for execution {execution} that is not running"
        );
        execution
    }

    fn in_flight(&self) -> usize {
        self.executing.len()
    }
}
