use std::time::Duration;

use rand::Rng;

/// Delays of `step`, `2 * step`, `3 * step`, ... each with up to half a step of
/// random jitter added. Jitter stays below half a step, so consecutive delays
/// are always strictly increasing.
#[derive(Debug, Clone)]
pub struct LinearBackoff {
    step: Duration,
    attempt: u32,
    jitter: bool,
}

impl LinearBackoff {
    pub fn new(step: Duration) -> Self {
        Self {
            step,
            attempt: 0,
            jitter: true,
        }
    }

    pub fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }

    fn jitter(&self) -> Duration {
        let half = (self.step.as_nanos() / 2) as u64;
        if !self.jitter || half == 0 {
            return Duration::ZERO;
        }
        Duration::from_nanos(rand::thread_rng().gen_range(0..half))
    }
}

impl Iterator for LinearBackoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        self.attempt = self.attempt.checked_add(1)?;
        let delay = self.step.checked_mul(self.attempt)?;
        Some(delay.saturating_add(self.jitter()))
    }
}

/// Delays between `attempts` tries, i.e. one fewer than the number of attempts.
pub fn schedule(step: Duration, attempts: u32) -> std::iter::Take<LinearBackoff> {
    LinearBackoff::new(step).take(attempts.saturating_sub(1) as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_without_jitter() {
        let delays: Vec<_> = LinearBackoff::new(Duration::from_secs(1))
            .without_jitter()
            .take(4)
            .collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(3),
                Duration::from_secs(4),
            ]
        );
    }

    #[test]
    fn strictly_increasing_with_jitter() {
        for _ in 0..50 {
            let delays: Vec<_> = schedule(Duration::from_secs(1), 7).collect();
            assert_eq!(delays.len(), 6);

            for (i, pair) in delays.windows(2).enumerate() {
                assert!(pair[1] > pair[0], "{:?}", delays);
                // Never doubles like an exponential backoff would
                assert!(pair[1] < pair[0] * 2 || i == 0, "{:?}", delays);
            }
            for (n, delay) in delays.iter().enumerate() {
                let base = Duration::from_secs(n as u64 + 1);
                assert!(*delay >= base && *delay < base + Duration::from_millis(500));
            }
        }
    }

    #[test]
    fn attempt_counts() {
        assert_eq!(schedule(Duration::from_secs(1), 1).count(), 0);
        assert_eq!(schedule(Duration::from_secs(1), 0).count(), 0);
        assert_eq!(schedule(Duration::from_millis(1), 3).count(), 2);
    }
}
