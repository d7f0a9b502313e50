use heapless::Vec;

use super::DeviceIndex;
use crate::config::TIMER_QUEUE_COUNT;
use crate::time::Instant;
use crate::{Error, Result};

/// What a timer does when it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TimerEvent {
    /// A default router's lifetime ran out; keyed by router index.
    RouterExpiry,
    /// A prefix's valid lifetime ran out; keyed by prefix index and device.
    PrefixExpiry,
    /// Retransmit a multicast solicitation; keyed by resolve id and device.
    AddressResolution,
    /// Leave DELAY or send the next unicast probe; keyed by probe index and device.
    NudProbe,
    /// Age REACHABLE neighbors of a device; keyed by device.
    NudCheck,
    /// Send the next solicitation for a tentative address or accept it;
    /// keyed by verification id and device.
    Dad,
}

/// Identity of a scheduled timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TimerKey {
    pub event: TimerEvent,
    pub index: u32,
    pub device: Option<DeviceIndex>,
}

impl TimerKey {
    pub const fn new(event: TimerEvent, index: u32, device: Option<DeviceIndex>) -> Self {
        TimerKey {
            event,
            index,
            device,
        }
    }
}

/// A fixed-capacity timer queue.
///
/// Timers are identified by their [TimerKey]; arming a key that is already
/// armed moves its deadline instead of adding a second timer.
#[derive(Debug)]
pub struct TimerQueue {
    timers: Vec<(Instant, TimerKey), TIMER_QUEUE_COUNT>,
}

impl TimerQueue {
    pub const fn new() -> Self {
        Self { timers: Vec::new() }
    }

    /// Arm `key` to fire at `at`.
    ///
    /// Returns `Err(Error::Exhausted)` when the queue is full.
    pub fn set(&mut self, key: TimerKey, at: Instant) -> Result<()> {
        if let Some(timer) = self.timers.iter_mut().find(|(_, k)| *k == key) {
            timer.0 = at;
            return Ok(());
        }
        self.timers.push((at, key)).map_err(|_| Error::Exhausted)
    }

    /// Cancel the timer with exactly this key. Returns whether one was armed.
    pub fn unset(&mut self, key: &TimerKey) -> bool {
        let before = self.timers.len();
        self.timers.retain(|(_, k)| k != key);
        self.timers.len() != before
    }

    /// Cancel every timer belonging to `device`, returning how many were armed.
    pub fn unset_device(&mut self, device: DeviceIndex) -> usize {
        let before = self.timers.len();
        self.timers.retain(|(_, k)| k.device != Some(device));
        before - self.timers.len()
    }

    /// Deadline of the timer with this key, if armed.
    pub fn deadline(&self, key: &TimerKey) -> Option<Instant> {
        self.timers
            .iter()
            .find(|(_, k)| k == key)
            .map(|(at, _)| *at)
    }

    /// Remove and return the earliest timer due at `now`.
    pub fn pop_expired(&mut self, now: Instant) -> Option<TimerKey> {
        let (position, _) = self
            .timers
            .iter()
            .enumerate()
            .filter(|(_, (at, _))| *at <= now)
            .min_by_key(|(_, (at, _))| *at)?;
        Some(self.timers.remove(position).1)
    }

    /// The earliest deadline of any armed timer.
    pub fn poll_at(&self) -> Option<Instant> {
        self.timers.iter().map(|(at, _)| *at).min()
    }

    pub fn len(&self) -> usize {
        self.timers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }
}

impl Default for TimerQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const DEV_A: DeviceIndex = DeviceIndex::new(1);
    const DEV_B: DeviceIndex = DeviceIndex::new(2);

    fn key(event: TimerEvent, index: u32, device: Option<DeviceIndex>) -> TimerKey {
        TimerKey::new(event, index, device)
    }

    #[test]
    fn test_pop_in_deadline_order() {
        let mut timers = TimerQueue::new();
        let late = key(TimerEvent::RouterExpiry, 1, None);
        let early = key(TimerEvent::PrefixExpiry, 1, Some(DEV_A));
        timers.set(late, Instant::from_secs(20)).unwrap();
        timers.set(early, Instant::from_secs(10)).unwrap();

        assert_eq!(timers.poll_at(), Some(Instant::from_secs(10)));
        assert_eq!(timers.pop_expired(Instant::from_secs(5)), None);
        assert_eq!(timers.pop_expired(Instant::from_secs(30)), Some(early));
        assert_eq!(timers.pop_expired(Instant::from_secs(30)), Some(late));
        assert!(timers.is_empty());
    }

    #[test]
    fn test_rearm_moves_deadline() {
        let mut timers = TimerQueue::new();
        let router = key(TimerEvent::RouterExpiry, 7, None);
        timers.set(router, Instant::from_secs(10)).unwrap();
        timers.set(router, Instant::from_secs(40)).unwrap();
        assert_eq!(timers.len(), 1);
        assert_eq!(timers.deadline(&router), Some(Instant::from_secs(40)));
    }

    #[test]
    fn test_unset_exact() {
        let mut timers = TimerQueue::new();
        let a = key(TimerEvent::PrefixExpiry, 1, Some(DEV_A));
        let b = key(TimerEvent::PrefixExpiry, 1, Some(DEV_B));
        timers.set(a, Instant::from_secs(1)).unwrap();
        timers.set(b, Instant::from_secs(1)).unwrap();

        assert!(timers.unset(&a));
        assert!(!timers.unset(&a));
        assert_eq!(timers.deadline(&b), Some(Instant::from_secs(1)));
    }

    #[test]
    fn test_unset_device() {
        let mut timers = TimerQueue::new();
        timers
            .set(key(TimerEvent::NudCheck, 0, Some(DEV_A)), Instant::ZERO)
            .unwrap();
        timers
            .set(key(TimerEvent::NudProbe, 3, Some(DEV_A)), Instant::ZERO)
            .unwrap();
        timers
            .set(key(TimerEvent::NudCheck, 0, Some(DEV_B)), Instant::ZERO)
            .unwrap();
        timers
            .set(key(TimerEvent::RouterExpiry, 1, None), Instant::ZERO)
            .unwrap();

        assert_eq!(timers.unset_device(DEV_A), 2);
        assert_eq!(timers.len(), 2);
    }

    #[test]
    fn test_exhausted() {
        let mut timers = TimerQueue::new();
        for index in 0..TIMER_QUEUE_COUNT as u32 {
            timers
                .set(key(TimerEvent::RouterExpiry, index, None), Instant::ZERO)
                .unwrap();
        }
        assert_eq!(
            timers.set(
                key(TimerEvent::RouterExpiry, u32::MAX, None),
                Instant::ZERO
            ),
            Err(Error::Exhausted)
        );
    }
}
