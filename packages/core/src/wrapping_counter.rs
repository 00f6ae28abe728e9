use num_traits::{Bounded, One, Unsigned, WrappingAdd};

/// A counter that starts at `min` and wraps back to `min` after surpassing
/// the maximum value of its type or the specified maximum.
pub struct WrappingCounter<T>
where
    T: Bounded + Ord + Unsigned + WrappingAdd + One + Copy,
{
    value: T,
    min: T,
    max: T,
}

impl<T> Default for WrappingCounter<T>
where
    T: Bounded + Ord + Unsigned + WrappingAdd + One + Copy,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> WrappingCounter<T>
where
    T: Bounded + Ord + Unsigned + WrappingAdd + One + Copy,
{
    pub fn new() -> Self {
        Self::with_range(T::one(), T::max_value())
    }

    /// Creates a counter that yields values in `min..=max`.
    pub fn with_range(min: T, max: T) -> Self {
        Self {
            value: T::zero(),
            min,
            max,
        }
    }

    pub fn increment(&mut self) -> T {
        let next = self.value.wrapping_add(&T::one());
        self.value = if next > self.max || next < self.min {
            self.min
        } else {
            next
        };
        self.value
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_increment() {
        let mut counter = WrappingCounter::<u8>::with_range(1, 5);
        assert_eq!(counter.increment(), 1);
        assert_eq!(counter.increment(), 2);
        assert_eq!(counter.increment(), 3);
        assert_eq!(counter.increment(), 4);
        assert_eq!(counter.increment(), 5);
        assert_eq!(counter.increment(), 1);
    }

    #[test]
    fn test_callback_id_window() {
        // Callback IDs live in 10..=255 and must wrap back to 10, not 0
        let mut counter = WrappingCounter::<u8>::with_range(10, u8::MAX);
        assert_eq!(counter.increment(), 10);
        for _ in 0..245 {
            counter.increment();
        }
        assert_eq!(counter.increment(), 10);
    }

    #[test]
    fn test_full_range_wrap() {
        let mut counter = WrappingCounter::<u8>::new();
        for _ in 0..255 {
            counter.increment();
        }
        // 255 wraps to 0, which is below min and snaps back to 1
        assert_eq!(counter.increment(), 1);
    }
}
