//! Mutable session parameters.

/// Default alert threshold sent to the backend.
pub const DEFAULT_THRESHOLD: f64 = 0.65;
/// Step used when nudging the threshold from the settings overlay.
pub const THRESHOLD_STEP: f64 = 0.05;

/// Holds the alert threshold used for the next session handshake.
///
/// Changing the value never touches a running session; restarting it is the
/// caller's job.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfigStore {
    threshold: f64,
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
        }
    }
}

impl ConfigStore {
    pub fn new(threshold: f64) -> Self {
        let mut store = Self::default();
        store.set(threshold);
        store
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Store `value` clamped to `[0, 1]` and return what was stored.
    ///
    /// NaN is ignored and leaves the current value in place.
    pub fn set(&mut self, value: f64) -> f64 {
        if !value.is_nan() {
            self.threshold = clamp_threshold(value);
        }
        self.threshold
    }

    /// Move the threshold by `delta`, snapped to the nearest step.
    pub fn nudge(&mut self, delta: f64) -> f64 {
        let target = self.threshold + delta;
        self.set((target / THRESHOLD_STEP).round() * THRESHOLD_STEP)
    }
}

/// Clamp a threshold into `[0, 1]`.
pub fn clamp_threshold(value: f64) -> f64 {
    value.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_threshold() {
        assert_eq!(ConfigStore::default().threshold(), 0.65);
    }

    #[test]
    fn set_clamps_to_unit_interval() {
        let mut store = ConfigStore::default();
        assert_eq!(store.set(1.7), 1.0);
        assert_eq!(store.set(-0.2), 0.0);
        assert_eq!(store.set(0.3), 0.3);
        assert_eq!(ConfigStore::new(4.0).threshold(), 1.0);
    }

    #[test]
    fn nan_is_ignored() {
        let mut store = ConfigStore::new(0.4);
        assert_eq!(store.set(f64::NAN), 0.4);
    }

    #[test]
    fn nudge_snaps_to_step_and_clamps() {
        let mut store = ConfigStore::new(0.65);
        let up = store.nudge(THRESHOLD_STEP);
        assert!((up - 0.70).abs() < 1e-9);

        let mut store = ConfigStore::new(0.98);
        assert_eq!(store.nudge(THRESHOLD_STEP), 1.0);

        let mut store = ConfigStore::new(0.02);
        assert_eq!(store.nudge(-THRESHOLD_STEP), 0.0);
    }
}
