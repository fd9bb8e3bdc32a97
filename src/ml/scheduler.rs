// ============================================================
// Layer 5 - Plateau Learning-Rate Scheduler
// ============================================================
// Watches the validation loss. When it has not improved for
// more than `patience` consecutive epochs the learning rate is
// multiplied by `factor` and the counter starts over, so one
// plateau event produces exactly one reduction.
//
// "Improved" means beating the best loss seen so far by more
// than a relative threshold:  loss < best - threshold * |best|
// The absolute value keeps the rule meaningful for negative
// log-losses.

/// Reduce-on-plateau policy for a minimised metric.
#[derive(Debug, Clone)]
pub struct PlateauScheduler {
    factor:     f64,
    patience:   usize,
    threshold:  f64,
    best:       f64,
    bad_epochs: usize,
    scale:      f64,
    reductions: usize,
}

impl PlateauScheduler {
    pub const DEFAULT_FACTOR: f64    = 0.3;
    pub const DEFAULT_PATIENCE: usize = 10;
    pub const DEFAULT_THRESHOLD: f64 = 1e-4;

    pub fn new(factor: f64, patience: usize, threshold: f64) -> Self {
        Self {
            factor,
            patience,
            threshold,
            best:       f64::INFINITY,
            bad_epochs: 0,
            scale:      1.0,
            reductions: 0,
        }
    }

    /// Record one epoch's metric. Returns true if the rate was reduced.
    pub fn step(&mut self, metric: f64) -> bool {
        if self.is_improvement(metric) {
            self.best = metric;
            self.bad_epochs = 0;
            return false;
        }

        self.bad_epochs += 1;
        if self.bad_epochs > self.patience {
            self.scale *= self.factor;
            self.bad_epochs = 0;
            self.reductions += 1;
            return true;
        }
        false
    }

    fn is_improvement(&self, metric: f64) -> bool {
        // NaN never improves
        if !metric.is_finite() && metric != f64::NEG_INFINITY {
            return false;
        }
        if self.best == f64::INFINITY {
            return true;
        }
        metric < self.best - self.threshold * self.best.abs()
    }

    /// Multiplier to apply to every initial learning rate.
    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn best(&self) -> f64 {
        self.best
    }

    pub fn reductions(&self) -> usize {
        self.reductions
    }
}

impl Default for PlateauScheduler {
    fn default() -> Self {
        Self::new(Self::DEFAULT_FACTOR, Self::DEFAULT_PATIENCE, Self::DEFAULT_THRESHOLD)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reduces_once_per_plateau() {
        let mut s = PlateauScheduler::default();
        assert!(!s.step(1.0));

        // 10 flat epochs stay within patience
        for _ in 0..10 {
            assert!(!s.step(1.0));
        }
        assert_eq!(s.scale(), 1.0);

        // the 11th triggers exactly one reduction
        assert!(s.step(1.0));
        assert!((s.scale() - 0.3).abs() < 1e-12);

        // the counter restarted: 10 more flat epochs do nothing
        for _ in 0..10 {
            assert!(!s.step(1.0));
        }
        assert_eq!(s.reductions(), 1);

        // and the next one is a second plateau event
        assert!(s.step(1.0));
        assert!((s.scale() - 0.09).abs() < 1e-12);
    }

    #[test]
    fn test_improvement_resets_counter() {
        let mut s = PlateauScheduler::default();
        s.step(1.0);
        for i in 0..30 {
            // keeps improving by 1 %
            assert!(!s.step(1.0 - 0.01 * (i + 1) as f64));
        }
        assert_eq!(s.reductions(), 0);
    }

    #[test]
    fn test_tiny_improvements_do_not_count() {
        let mut s = PlateauScheduler::default();
        s.step(1.0);
        let mut reduced = false;
        for i in 0..11 {
            // below the 1e-4 relative threshold
            reduced |= s.step(1.0 - 1e-6 * (i + 1) as f64);
        }
        assert!(reduced);
    }

    #[test]
    fn test_negative_losses_use_relative_threshold() {
        let mut s = PlateauScheduler::default();
        s.step(-10.0);
        assert!(!s.step(-10.5));
        assert_eq!(s.best(), -10.5);
        // slightly worse is not an improvement
        s.step(-10.4999);
        assert_eq!(s.best(), -10.5);
    }

    #[test]
    fn test_nan_counts_as_bad_epoch() {
        let mut s = PlateauScheduler::new(0.5, 0, 1e-4);
        s.step(1.0);
        assert!(s.step(f64::NAN));
        assert_eq!(s.scale(), 0.5);
    }
}
