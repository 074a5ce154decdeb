use std::time::Duration;

/// Doubling retry interval with an upper bound.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    ceiling: Duration,
    rto: Duration,
    attempts: usize,
}

impl ExponentialBackoff {
    pub fn new(start_rto: Duration, ceiling: Duration) -> Self {
        let start_rto = start_rto.min(ceiling);
        Self {
            ceiling,
            rto: start_rto,
            attempts: 0,
        }
    }

    pub fn rto(&self) -> Duration {
        self.rto
    }

    pub fn attempts(&self) -> usize {
        self.attempts
    }

    pub fn attempt(&mut self) {
        self.attempts += 1;
        self.rto = (self.rto * 2).min(self.ceiling);
    }
}
