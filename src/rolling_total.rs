/// A rolling total over the last `N` completed days.
///
/// Keeps a fixed ring of daily totals; once full, each new day replaces the oldest.
#[derive(Debug, Clone, PartialEq)]
pub struct RollingTotal<const N: usize> {
    buffer: [f64; N],
    index: usize,
    count: usize,
    sum: f64,
}

impl<const N: usize> RollingTotal<N> {
    pub fn new() -> Self {
        Self {
            buffer: [0.0; N],
            index: 0,
            count: 0,
            sum: 0.0,
        }
    }

    /// Adds a completed day, dropping the oldest one if the window is full
    pub fn push(&mut self, value: f64) {
        if self.count == N {
            self.sum -= self.buffer[self.index];
        } else {
            self.count += 1;
        }

        self.buffer[self.index] = value;
        self.sum += value;

        self.index = (self.index + 1) % N;
    }

    /// Sum of the days currently in the window
    pub fn total(&self) -> f64 {
        // Recompute from the buffer to avoid drift from repeated subtraction
        if self.count == N {
            self.buffer.iter().sum()
        } else {
            self.sum
        }
    }

    /// Number of completed days held, at most `N`
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

impl<const N: usize> Default for RollingTotal<N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_rolling_total() {
        let total = RollingTotal::<7>::new();
        assert_eq!(total.total(), 0.0);
        assert!(total.is_empty());
    }

    #[test]
    fn test_partial_window_sums_what_it_has() {
        let mut total = RollingTotal::<7>::new();
        total.push(1.0);
        total.push(2.0);
        total.push(3.0);
        assert_eq!(total.total(), 6.0);
        assert_eq!(total.len(), 3);
    }

    #[test]
    fn test_rolling_behavior() {
        let mut total = RollingTotal::<3>::new();
        for value in [1.0, 2.0, 3.0] {
            total.push(value);
        }
        assert_eq!(total.total(), 6.0);

        // The 1.0 falls out of the window
        total.push(10.0);
        assert_eq!(total.total(), 15.0);
        assert_eq!(total.len(), 3);
        total.push(0.0);
        assert_eq!(total.total(), 13.0);
    }

    #[test]
    fn test_window_length_caps() {
        let mut total = RollingTotal::<28>::new();
        for day in 0..40 {
            total.push(day as f64);
        }
        assert_eq!(total.len(), 28);
        // Days 12..40 remain
        let expected: f64 = (12..40).map(|d| d as f64).sum();
        assert_eq!(total.total(), expected);
    }
}
