use chrono::{Duration, NaiveDateTime};

/// Step counter over a fixed-length run on a uniform time grid.
///
/// # Examples
///
/// ```
/// use chrono::{Duration, NaiveDate};
/// use rolling_dispatch::sim::clock::Clock;
///
/// let start = NaiveDate::from_ymd_opt(2024, 4, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
/// let mut clock = Clock::new(start, Duration::minutes(30), 3);
/// let mut steps = Vec::new();
/// while let Some(k) = clock.tick() {
///     steps.push(k);
/// }
/// assert_eq!(steps, vec![0, 1, 2]);
/// assert!(clock.is_done());
/// ```
#[derive(Debug, Clone)]
pub struct Clock {
    start: NaiveDateTime,
    step: Duration,
    /// Index of the next step to hand out
    current: usize,
    total: usize,
}

impl Clock {
    pub fn new(start: NaiveDateTime, step: Duration, total: usize) -> Self {
        Self {
            start,
            step,
            current: 0,
            total,
        }
    }

    /// Returns the current step and advances, or `None` once all steps ran.
    pub fn tick(&mut self) -> Option<usize> {
        if self.current < self.total {
            let step = self.current;
            self.current += 1;
            Some(step)
        } else {
            None
        }
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn is_done(&self) -> bool {
        self.current >= self.total
    }

    /// Start time of step `k`.
    pub fn timestamp(&self, k: usize) -> NaiveDateTime {
        self.start + self.step * k as i32
    }
}
