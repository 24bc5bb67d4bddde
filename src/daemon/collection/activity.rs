use std::time::Duration;

/// Decides whether the user touched the machine during the last sampling window.
///
/// Ticks don't fire exactly one interval apart, so the window is stretched by 20%.
pub struct ActivityEvaluator {
    tolerance: Duration,
}

impl ActivityEvaluator {
    pub fn for_interval(interval: Duration) -> Self {
        Self {
            tolerance: interval * 6 / 5,
        }
    }

    pub fn tolerance(&self) -> Duration {
        self.tolerance
    }

    pub fn is_active(&self, idle_time: Duration) -> bool {
        idle_time < self.tolerance
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::ActivityEvaluator;

    #[test]
    fn test_tolerance_is_stretched_interval() {
        let evaluator = ActivityEvaluator::for_interval(Duration::from_secs(60));

        assert_eq!(evaluator.tolerance(), Duration::from_secs(72));
        assert!(evaluator.is_active(Duration::from_secs(0)));
        assert!(evaluator.is_active(Duration::from_secs(71)));
        assert!(!evaluator.is_active(Duration::from_secs(72)));
        assert!(!evaluator.is_active(Duration::from_secs(3600)));
    }
}
