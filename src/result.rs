//! Write-once work result shared by background workers
//!
//! A worker's outcome is committed exactly once, possibly from an engine
//! callback thread racing against the worker's own error path. The cell is
//! a single atomic so the first committed outcome always wins; later
//! attempts are rejected and reported back to the caller for logging.

use std::sync::atomic::{AtomicU8, Ordering};

/// Outcome of one worker execution as seen by the host scheduler.
///
/// `Retrying` is non-terminal: the host is expected to re-schedule the
/// work under its own backoff policy. `Succeeded`/`Failed` are terminal
/// and allow durable state to be cleaned up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Unset,
    Succeeded,
    Failed,
    Retrying,
}

const PHASE_UNINITIALIZED: u8 = 0;
const PHASE_RUNNING: u8 = 1;

const OUTCOME_UNSET: u8 = 0;
const OUTCOME_SUCCEEDED: u8 = 1;
const OUTCOME_FAILED: u8 = 2;
const OUTCOME_RETRYING: u8 = 3;

/// First-write-wins result cell for one worker execution.
///
/// Lifecycle: `Uninitialized → Running → {Succeeded, Failed, Retrying}`.
/// While running, the fallback outcome is `Retrying` so that an
/// unexplained termination never silently drops the queued work.
#[derive(Debug, Default)]
pub struct WorkStatus {
    phase: AtomicU8,
    outcome: AtomicU8,
}

impl WorkStatus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Transition `Uninitialized → Running`. Returns false if already begun.
    pub fn begin(&self) -> bool {
        self.phase
            .compare_exchange(
                PHASE_UNINITIALIZED,
                PHASE_RUNNING,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok()
    }

    pub fn is_running(&self) -> bool {
        self.phase.load(Ordering::SeqCst) == PHASE_RUNNING
    }

    /// Attempt to commit `Succeeded`. Returns whether the write took effect.
    pub fn commit_success(&self) -> bool {
        self.commit(OUTCOME_SUCCEEDED)
    }

    /// Attempt to commit `Failed`. Returns whether the write took effect.
    pub fn commit_failure(&self) -> bool {
        self.commit(OUTCOME_FAILED)
    }

    /// Attempt to commit `Retrying`. Returns whether the write took effect.
    pub fn commit_retry(&self) -> bool {
        self.commit(OUTCOME_RETRYING)
    }

    // Single compare-exchange against the unset slot. A plain
    // check-then-set would let two callbacks both observe "unset" and
    // both write; the CAS guarantees exactly one writer succeeds.
    fn commit(&self, value: u8) -> bool {
        self.outcome
            .compare_exchange(OUTCOME_UNSET, value, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub fn has_result(&self) -> bool {
        self.outcome.load(Ordering::SeqCst) != OUTCOME_UNSET
    }

    /// Terminal means a result exists and it is not `Retrying`.
    pub fn is_terminal(&self) -> bool {
        matches!(self.outcome(), Outcome::Succeeded | Outcome::Failed)
    }

    pub fn outcome(&self) -> Outcome {
        match self.outcome.load(Ordering::SeqCst) {
            OUTCOME_SUCCEEDED => Outcome::Succeeded,
            OUTCOME_FAILED => Outcome::Failed,
            OUTCOME_RETRYING => Outcome::Retrying,
            _ => Outcome::Unset,
        }
    }

    /// Outcome handed to the host once the worker returns. Falls back to
    /// `Retrying` when nothing was committed.
    pub fn final_outcome(&self) -> Outcome {
        match self.outcome() {
            Outcome::Unset => Outcome::Retrying,
            committed => committed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_begin_transitions_once() {
        let status = WorkStatus::new();
        assert!(!status.is_running());
        assert!(status.begin());
        assert!(status.is_running());
        assert!(!status.begin());
    }

    #[test]
    fn test_first_write_wins() {
        let status = WorkStatus::new();
        status.begin();

        assert!(status.commit_success());
        assert!(!status.commit_failure());
        assert!(!status.commit_retry());
        assert!(!status.commit_success());

        assert_eq!(status.outcome(), Outcome::Succeeded);
    }

    #[test]
    fn test_terminal_excludes_retry() {
        let status = WorkStatus::new();
        status.begin();
        assert!(!status.is_terminal());

        status.commit_retry();
        assert!(status.has_result());
        assert!(!status.is_terminal());

        let failed = WorkStatus::new();
        failed.begin();
        failed.commit_failure();
        assert!(failed.is_terminal());
    }

    #[test]
    fn test_final_outcome_defaults_to_retry() {
        let status = WorkStatus::new();
        status.begin();
        assert_eq!(status.final_outcome(), Outcome::Retrying);

        status.commit_failure();
        assert_eq!(status.final_outcome(), Outcome::Failed);
    }

    #[test]
    fn test_racing_commits_leave_exactly_one_outcome() {
        // Repeated randomized scheduling: across many iterations the two
        // threads interleave differently, but exactly one commit must ever
        // take effect and the committed value must match the winner.
        for _ in 0..200 {
            let status = Arc::new(WorkStatus::new());
            status.begin();

            let a = {
                let status = Arc::clone(&status);
                std::thread::spawn(move || status.commit_success())
            };
            let b = {
                let status = Arc::clone(&status);
                std::thread::spawn(move || status.commit_retry())
            };

            let a_won = a.join().unwrap();
            let b_won = b.join().unwrap();

            assert!(a_won ^ b_won, "exactly one commit must win");
            let expected = if a_won {
                Outcome::Succeeded
            } else {
                Outcome::Retrying
            };
            assert_eq!(status.outcome(), expected);
        }
    }
}
