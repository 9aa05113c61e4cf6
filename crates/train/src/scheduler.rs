//! Validation-driven learning rate schedule.

// ── Plateau Scheduler ───────────────────────────────────────────────────────

/// Multiplicative decay on a validation plateau.
///
/// Every epoch reports its validation loss; whenever the loss has failed to
/// improve for `interval` consecutive epochs, the learning rate is scaled by
/// `factor` and the stale counter restarts. An `interval` of zero disables
/// decay entirely.
#[derive(Clone)]
pub struct PlateauScheduler {
    lr: f64,
    factor: f64,
    interval: usize,
    best: f64,
    stale_epochs: usize,
}

/// What happened to the schedule after one validation observation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EpochOutcome {
    /// New best validation loss; the caller should checkpoint.
    Improved,
    /// No improvement, no decay yet.
    NoChange,
    /// The plateau ran out; carries the new learning rate.
    Decayed(f64),
}

impl PlateauScheduler {
    pub fn new(lr: f64, factor: f64, interval: usize) -> Self {
        Self {
            lr,
            factor,
            interval,
            best: f64::INFINITY,
            stale_epochs: 0,
        }
    }

    pub fn current_lr(&self) -> f64 {
        self.lr
    }

    /// Lowest validation loss seen so far.
    pub fn best(&self) -> f64 {
        self.best
    }

    pub fn observe(&mut self, val_loss: f64) -> EpochOutcome {
        if val_loss < self.best {
            self.best = val_loss;
            self.stale_epochs = 0;
            return EpochOutcome::Improved;
        }
        self.stale_epochs += 1;
        if self.interval > 0 && self.stale_epochs == self.interval {
            self.lr *= self.factor;
            self.stale_epochs = 0;
            return EpochOutcome::Decayed(self.lr);
        }
        EpochOutcome::NoChange
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_observation_always_improves() {
        let mut sched = PlateauScheduler::new(30.0, 0.1, 3);
        assert_eq!(sched.observe(5.0), EpochOutcome::Improved);
        assert!((sched.best() - 5.0).abs() < 1e-12);
        assert!((sched.current_lr() - 30.0).abs() < 1e-12);
    }

    #[test]
    fn decays_after_exactly_interval_stale_epochs() {
        let mut sched = PlateauScheduler::new(30.0, 0.1, 3);
        assert_eq!(sched.observe(5.0), EpochOutcome::Improved);
        assert_eq!(sched.observe(5.5), EpochOutcome::NoChange);
        assert_eq!(sched.observe(5.4), EpochOutcome::NoChange);
        // Third stale epoch in a row: 30 → 3.
        assert_eq!(sched.observe(5.3), EpochOutcome::Decayed(3.0));
        assert!((sched.current_lr() - 3.0).abs() < 1e-12);
        // Counter restarted, so the next stale epoch does not decay again.
        assert_eq!(sched.observe(5.2), EpochOutcome::NoChange);
    }

    #[test]
    fn improvement_resets_the_plateau() {
        let mut sched = PlateauScheduler::new(30.0, 0.1, 2);
        assert_eq!(sched.observe(5.0), EpochOutcome::Improved);
        assert_eq!(sched.observe(5.5), EpochOutcome::NoChange);
        assert_eq!(sched.observe(4.0), EpochOutcome::Improved);
        assert_eq!(sched.observe(4.5), EpochOutcome::NoChange);
        assert_eq!(sched.observe(4.6), EpochOutcome::Decayed(3.0));
    }

    #[test]
    fn zero_interval_never_decays() {
        let mut sched = PlateauScheduler::new(30.0, 0.1, 0);
        sched.observe(5.0);
        for _ in 0..10 {
            assert_eq!(sched.observe(9.0), EpochOutcome::NoChange);
        }
        assert!((sched.current_lr() - 30.0).abs() < 1e-12);
    }

    #[test]
    fn equal_loss_counts_as_stale() {
        let mut sched = PlateauScheduler::new(1.0, 0.5, 1);
        assert_eq!(sched.observe(2.0), EpochOutcome::Improved);
        assert_eq!(sched.observe(2.0), EpochOutcome::Decayed(0.5));
    }
}
