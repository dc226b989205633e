//! Explicit history reset shared by every stateful pipeline stage.

/// How a stage should reset its history.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reinit {
    /// Drop all history back to zero.
    Clear,
    /// Load the steady state of a constant input, so the next output equals it.
    Prime(f64),
}

/// A pipeline stage whose internal history can be reset on demand.
///
/// The orchestrator primes every stage with the first sample after start-up
/// and again whenever filter settings change.
pub trait Reinitializable {
    fn reinitialize(&mut self, mode: Reinit);
}
