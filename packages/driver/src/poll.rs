use std::collections::BTreeMap;
use std::time::Duration;
use zw_core::value_id::ValueId;

#[derive(Debug, Clone, Copy)]
struct PollEntry {
    /// 0 disables the value; N polls it once every N cycles
    intensity: u8,
    /// Cycles until the next poll of this value
    countdown: u8,
}

/// Schedules periodic re-reads of values the application marked as
/// polled. The actor calls [PollScheduler::tick] once per interval and
/// enqueues a request for every due value.
#[derive(Debug)]
pub struct PollScheduler {
    interval: Duration,
    entries: BTreeMap<ValueId, PollEntry>,
}

impl PollScheduler {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            entries: BTreeMap::new(),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn set_interval(&mut self, interval: Duration) {
        self.interval = interval;
    }

    /// Enables polling. Returns false when the intensity is 0, which
    /// disables instead.
    pub fn enable(&mut self, value_id: ValueId, intensity: u8) -> bool {
        if intensity == 0 {
            self.disable(&value_id);
            return false;
        }
        self.entries.insert(
            value_id,
            PollEntry {
                intensity,
                countdown: 1,
            },
        );
        true
    }

    pub fn disable(&mut self, value_id: &ValueId) -> bool {
        self.entries.remove(value_id).is_some()
    }

    pub fn is_polled(&self, value_id: &ValueId) -> bool {
        self.entries.contains_key(value_id)
    }

    /// Advances one cycle and returns the values due now
    pub fn tick(&mut self) -> Vec<ValueId> {
        let mut due = Vec::new();
        for (value_id, entry) in self.entries.iter_mut() {
            entry.countdown -= 1;
            if entry.countdown == 0 {
                entry.countdown = entry.intensity;
                due.push(*value_id);
            }
        }
        due
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use zw_core::definitions::{HomeId, NodeId};
    use zw_core::value_id::ValueGenre;
    use zw_core::values::ValueType;

    fn value_id(index: u8) -> ValueId {
        ValueId::new(
            HomeId::new(1),
            NodeId::new(5),
            ValueGenre::User,
            0x31,
            1,
            index,
            ValueType::Decimal,
        )
    }

    #[test]
    fn test_intensity_schedules_every_nth_cycle() {
        let mut scheduler = PollScheduler::new(Duration::from_secs(30));
        scheduler.enable(value_id(1), 1);
        scheduler.enable(value_id(2), 2);

        // First tick: both due (fresh entries fire on the next cycle)
        assert_eq!(scheduler.tick().len(), 2);
        // Second: only the intensity-1 value
        assert_eq!(scheduler.tick(), vec![value_id(1)]);
        // Third: both again
        assert_eq!(scheduler.tick().len(), 2);
    }

    #[test]
    fn test_intensity_zero_disables() {
        let mut scheduler = PollScheduler::new(Duration::from_secs(30));
        scheduler.enable(value_id(1), 1);
        assert!(scheduler.is_polled(&value_id(1)));
        assert!(!scheduler.enable(value_id(1), 0));
        assert!(!scheduler.is_polled(&value_id(1)));
        assert!(scheduler.tick().is_empty());
    }
}
