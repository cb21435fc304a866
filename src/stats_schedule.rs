use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use crate::ofp_device::DeviceId;
use crate::ofp_utils::lock;

#[derive(Debug, Default)]
struct Slots {
    delays: HashMap<DeviceId, u64>,
    last: u64,
}

/// Spreads the stats requests of many switches over the first half of the polling
/// interval. Each switch gets a fixed delay the first time it is seen.
#[derive(Debug)]
pub struct SwitchPollSchedule {
    window_ms: u64,
    slots: Mutex<Slots>,
}

impl SwitchPollSchedule {
    pub fn new(poll_interval: Duration) -> SwitchPollSchedule {
        SwitchPollSchedule {
            window_ms: poll_interval.as_millis() as u64 / 2,
            slots: Mutex::new(Slots::default()),
        }
    }

    fn step_ms(&self) -> u64 {
        self.window_ms / 10
    }

    /// The delay assigned to `dpid`, assigning the next slot to unknown switches.
    pub fn delay_for(&self, dpid: DeviceId) -> Duration {
        if self.window_ms == 0 {
            return Duration::from_millis(0);
        }
        let mut slots = lock(&self.slots);
        if let Some(delay) = slots.delays.get(&dpid) {
            return Duration::from_millis(*delay);
        }
        let next = (slots.last + self.step_ms()) % self.window_ms;
        slots.delays.insert(dpid, next);
        slots.last = next;
        Duration::from_millis(next)
    }
}
