use bytes::Bytes;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::{timeout_at, Instant};

use crate::ofp_device::DeviceId;
use crate::ofp_header::Xid;
use crate::ofp_utils::lock;

/// The statistics the controller polls and reassembles.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum MultipartKind {
    Flows,
    Ports,
}

/// What happened to a reply fragment handed to the reassembler.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FragmentOutcome {
    /// Not the outstanding request for this switch and kind, dropped.
    NotOurs,
    /// Accumulated, more fragments follow.
    Pending,
    /// Accumulated, this was the fragment with the "more" flag clear.
    Last,
}

/// Per switch multipart bookkeeping.
#[derive(Debug, Default)]
pub struct MultipartTracker {
    xids: HashMap<MultipartKind, Xid>,
    /// Fragments known to be in flight per xid but not yet accumulated.
    in_flight: HashMap<Xid, i64>,
    skipped: u32,
    fragments: HashMap<MultipartKind, Vec<Bytes>>,
}

impl MultipartTracker {
    fn has_outstanding(&self) -> bool {
        !self.xids.is_empty()
    }

    fn reset(&mut self) {
        self.xids.clear();
        self.in_flight.clear();
        self.fragments.clear();
        self.skipped = 0;
    }

    fn pending(&self, xid: Xid) -> i64 {
        self.in_flight.get(&xid).copied().unwrap_or(0)
    }
}

#[derive(Debug, Default)]
struct SwitchMultipart {
    state: Mutex<MultipartTracker>,
    settled: Notify,
}

/// Makes multi-fragment stats replies look like one reply per request.
///
/// Only one flows and one ports request may be outstanding per switch. A new cycle
/// that finds an unfinished one is skipped until `skip_threshold` cycles have been
/// skipped in a row, then the stale state is dropped.
pub struct MultipartReassembler {
    switches: Mutex<HashMap<DeviceId, Arc<SwitchMultipart>>>,
    skip_threshold: u32,
    max_wait: Duration,
}

impl MultipartReassembler {
    pub fn new(skip_threshold: u32, max_wait: Duration) -> MultipartReassembler {
        MultipartReassembler {
            switches: Mutex::new(HashMap::new()),
            skip_threshold,
            max_wait,
        }
    }

    /// Set up the tracker for a switch. Calling it again for a known switch is a no-op.
    pub fn register_switch(&self, dpid: DeviceId) {
        self.switch_or_register(dpid);
    }

    fn switch_or_register(&self, dpid: DeviceId) -> Arc<SwitchMultipart> {
        lock(&self.switches).entry(dpid).or_default().clone()
    }

    fn switch(&self, dpid: DeviceId) -> Option<Arc<SwitchMultipart>> {
        lock(&self.switches).get(&dpid).cloned()
    }

    fn check_overlapping(&self, dpid: DeviceId, tracker: &mut MultipartTracker) -> bool {
        if tracker.has_outstanding() && tracker.skipped < self.skip_threshold {
            info!("Overlapping stats request: switch {} flows_xid {:?} ports_xid {:?}",
                  dpid, tracker.xids.get(&MultipartKind::Flows),
                  tracker.xids.get(&MultipartKind::Ports));
            tracker.skipped += 1;
            return true;
        }
        if tracker.has_outstanding() {
            warn!("Dropping stale stats requests of switch {} after {} skipped cycles",
                  dpid, tracker.skipped);
        }
        tracker.reset();
        false
    }

    /// Whether a previous cycle is still in progress for the switch. A `false` answer
    /// discards whatever stale state the switch had.
    pub fn is_overlapping(&self, dpid: DeviceId) -> bool {
        let switch = self.switch_or_register(dpid);
        let mut tracker = lock(&switch.state);
        self.check_overlapping(dpid, &mut tracker)
    }

    /// Record `xid` as the single outstanding request of `kind` for the switch.
    pub fn issue_request(&self, dpid: DeviceId, kind: MultipartKind, xid: Xid) {
        let switch = self.switch_or_register(dpid);
        let mut tracker = lock(&switch.state);
        Self::issue_locked(&mut tracker, kind, xid);
    }

    fn issue_locked(tracker: &mut MultipartTracker, kind: MultipartKind, xid: Xid) {
        if let Some(previous) = tracker.xids.insert(kind, xid) {
            tracker.in_flight.remove(&previous);
        }
        tracker.in_flight.insert(xid, 0);
        tracker.fragments.remove(&kind);
    }

    /// Overlap check and issue of both requests of a polling cycle, under one lock.
    /// Returns whether the cycle may proceed.
    pub fn begin_cycle(&self, dpid: DeviceId, flows_xid: Xid, ports_xid: Xid) -> bool {
        let switch = self.switch_or_register(dpid);
        let mut tracker = lock(&switch.state);
        if self.check_overlapping(dpid, &mut tracker) {
            return false;
        }
        Self::issue_locked(&mut tracker, MultipartKind::Flows, flows_xid);
        Self::issue_locked(&mut tracker, MultipartKind::Ports, ports_xid);
        true
    }

    pub fn outstanding(&self, dpid: DeviceId, kind: MultipartKind) -> Option<Xid> {
        let switch = self.switch(dpid)?;
        let tracker = lock(&switch.state);
        tracker.xids.get(&kind).copied()
    }

    /// `count` fragments of `xid` were read off the connection and are about to be
    /// dispatched. Unknown xids are ignored.
    pub fn fragments_observed(&self, dpid: DeviceId, xid: Xid, count: usize) {
        if let Some(switch) = self.switch(dpid) {
            let mut tracker = lock(&switch.state);
            if let Some(pending) = tracker.in_flight.get_mut(&xid) {
                *pending += count as i64;
            }
        }
    }

    /// Accumulate one fragment of a reply.
    pub fn on_fragment(&self, dpid: DeviceId, kind: MultipartKind, xid: Xid, body: Bytes,
                       more: bool) -> FragmentOutcome {
        let switch = match self.switch(dpid) {
            Some(switch) => switch,
            None => return FragmentOutcome::NotOurs,
        };
        let mut tracker = lock(&switch.state);
        if tracker.xids.get(&kind) != Some(&xid) {
            debug!("Ignoring {:?} reply xid {} from switch {}", kind, xid, dpid);
            return FragmentOutcome::NotOurs;
        }
        tracker.fragments.entry(kind).or_default().push(body);
        if let Some(pending) = tracker.in_flight.get_mut(&xid) {
            *pending -= 1;
            if *pending <= 0 {
                switch.settled.notify_waiters();
            }
        }
        if more {
            FragmentOutcome::Pending
        } else {
            FragmentOutcome::Last
        }
    }

    /// Wait, at most `max_wait`, until no fragment of `xid` is known to be in flight,
    /// then hand over every accumulated fragment and forget the request.
    ///
    /// Returns `None` when the request was dropped in the meantime.
    pub async fn on_final_fragment(&self, dpid: DeviceId, kind: MultipartKind, xid: Xid)
        -> Option<Vec<Bytes>> {
        let switch = match self.switch(dpid) {
            Some(switch) => switch,
            None => {
                error!("Skipped {:?} reply of unknown switch {}, xid {}", kind, dpid, xid);
                return None;
            }
        };

        let deadline = Instant::now() + self.max_wait;
        loop {
            let notified = switch.settled.notified();
            tokio::pin!(notified);
            // Register before looking at the counter so a notification in between is kept.
            notified.as_mut().enable();
            if lock(&switch.state).pending(xid) <= 0 {
                break;
            }
            if timeout_at(deadline, notified).await.is_err() {
                warn!("Gave up waiting for fragments of xid {} from switch {}", xid, dpid);
                break;
            }
        }

        let mut tracker = lock(&switch.state);
        if tracker.xids.get(&kind) != Some(&xid) {
            error!("Skipped {:?} reply due to error when updating switch {}, xid {}",
                   kind, dpid, xid);
            return None;
        }
        tracker.xids.remove(&kind);
        tracker.in_flight.remove(&xid);
        let fragments = tracker.fragments.remove(&kind).unwrap_or_default();
        if !tracker.has_outstanding() {
            tracker.skipped = 0;
        }
        Some(fragments)
    }
}
