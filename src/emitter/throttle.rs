//! Rolling one-hour emission cap

use std::collections::VecDeque;

const WINDOW_SECS: i64 = 3600;

#[derive(Debug, Clone)]
pub struct HourlyThrottle {
    cap: usize,
    emitted: VecDeque<(String, i64)>,
}

impl HourlyThrottle {
    pub fn new(cap: usize) -> Self {
        Self {
            cap,
            emitted: VecDeque::new(),
        }
    }

    /// Forget emissions that left the window
    pub fn prune(&mut self, now: i64) {
        while let Some((_, ts)) = self.emitted.front() {
            if now - *ts >= WINDOW_SECS {
                self.emitted.pop_front();
            } else {
                break;
            }
        }
    }

    pub fn is_at_cap(&mut self, now: i64) -> bool {
        self.prune(now);
        self.emitted.len() >= self.cap
    }

    pub fn record(&mut self, token: &str, now: i64) {
        self.emitted.push_back((token.to_string(), now));
    }

    pub fn count(&self) -> usize {
        self.emitted.len()
    }

    pub fn cap(&self) -> usize {
        self.cap
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cap_and_rollover() {
        let mut throttle = HourlyThrottle::new(2);
        assert!(!throttle.is_at_cap(0));
        throttle.record("T1", 0);
        throttle.record("T2", 600);
        assert!(throttle.is_at_cap(1200));
        assert!(throttle.is_at_cap(3599));
        // First emission leaves the window
        assert!(!throttle.is_at_cap(3600));
        assert_eq!(throttle.count(), 1);
    }
}
