use std::{cell::RefCell, rc::Rc};

use arm::Cycles;
use arrayvec::ArrayVec;

/// Everything with a timed side effect. Declaration order doubles as the
/// tie-break priority when two events land on the same cycle (earlier
/// variant fires first).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum EventKind {
    Channel1Clock,
    Channel1Envelope,
    Channel1Length,
    Channel1Sweep,

    Channel2Clock,
    Channel2Envelope,
    Channel2Length,

    Channel4Clock,
    Channel4Envelope,
    Channel4Length,

    Timer0Overflow,
    Timer1Overflow,
    Timer2Overflow,
    Timer3Overflow,

    Dma0Complete,
    Dma1Complete,
    Dma2Complete,
    Dma3Complete,

    HBlank,
    VBlank,
    VDraw,

    Sample,

    Irq,
}

impl EventKind {
    pub const fn timer_overflow(index: usize) -> EventKind {
        match index {
            0 => EventKind::Timer0Overflow,
            1 => EventKind::Timer1Overflow,
            2 => EventKind::Timer2Overflow,
            _ => EventKind::Timer3Overflow,
        }
    }

    pub const fn dma_complete(index: usize) -> EventKind {
        match index {
            0 => EventKind::Dma0Complete,
            1 => EventKind::Dma1Complete,
            2 => EventKind::Dma2Complete,
            _ => EventKind::Dma3Complete,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Entry {
    kind: EventKind,
    /// Clock value when the event was scheduled.
    queued: u64,
    /// Clock value the event fires at.
    fire: u64,
}

/// The single source of time. The clock counts CPU cycles (16.777216 MHz)
/// from power-on; every timed side effect in the system is an entry here.
///
/// The queue is bounded by the number of event kinds, so a fixed-capacity
/// vector with linear scans beats a real heap at this size.
#[derive(Default)]
pub struct GbaScheduler {
    clock: u64,
    entries: ArrayVec<Entry, 32>,
}

impl GbaScheduler {
    /// Total elapsed cycles since power-on.
    #[inline]
    pub fn now(&self) -> u64 {
        self.clock
    }

    /// Advances the clock without firing anything. Call [`Self::pop_due`]
    /// afterwards to drain events the new time has passed.
    #[inline]
    pub fn step(&mut self, cycles: Cycles) {
        self.clock += u64::from(cycles);
    }

    /// Queues `kind` to fire `delta` cycles from now. Scheduling a kind that
    /// is already queued is a bug in the caller.
    pub fn schedule(&mut self, kind: EventKind, delta: u32) {
        assert!(
            !self.scheduled(kind),
            "event {kind:?} scheduled while already queued"
        );

        self.entries.push(Entry {
            kind,
            queued: self.clock,
            fire: self.clock + u64::from(delta),
        });
    }

    /// Removes a queued event. Returns whether it was present.
    pub fn unschedule(&mut self, kind: EventKind) -> bool {
        if let Some(index) = self.entries.iter().position(|entry| entry.kind == kind) {
            self.entries.swap_remove(index);
            true
        } else {
            false
        }
    }

    pub fn scheduled(&self, kind: EventKind) -> bool {
        self.entries.iter().any(|entry| entry.kind == kind)
    }

    /// Cycles since `kind` was scheduled, if it is queued.
    pub fn elapsed(&self, kind: EventKind) -> Option<u32> {
        self.find(kind).map(|entry| (self.clock - entry.queued) as u32)
    }

    /// Cycles until `kind` fires, if it is queued. Zero once the fire time
    /// has been reached or passed.
    pub fn remaining(&self, kind: EventKind) -> Option<u32> {
        self.find(kind)
            .map(|entry| entry.fire.saturating_sub(self.clock) as u32)
    }

    /// The delta `kind` was originally scheduled with, if it is queued.
    pub fn total_length(&self, kind: EventKind) -> Option<u32> {
        self.find(kind).map(|entry| (entry.fire - entry.queued) as u32)
    }

    /// Pops the next event whose fire time has been reached, earliest fire
    /// time first with ties broken by kind order. Returns the event and how
    /// many cycles late it is firing, so periodic handlers can compensate
    /// when they reschedule.
    pub fn pop_due(&mut self) -> Option<(EventKind, u32)> {
        let mut due: Option<usize> = None;

        for (index, entry) in self.entries.iter().enumerate() {
            if entry.fire > self.clock {
                continue;
            }

            due = match due {
                Some(best)
                    if (self.entries[best].fire, self.entries[best].kind)
                        <= (entry.fire, entry.kind) =>
                {
                    Some(best)
                }
                _ => Some(index),
            };
        }

        due.map(|index| {
            let entry = self.entries.swap_remove(index);
            (entry.kind, (self.clock - entry.fire) as u32)
        })
    }

    /// Jumps the clock to the next pending fire time. Used while the CPU is
    /// halted or the bus is held by DMA. A panic here means the machine has
    /// nothing left that could ever wake it up.
    pub fn skip_to_next(&mut self) {
        let next = self
            .entries
            .iter()
            .map(|entry| entry.fire)
            .min()
            .expect("skip_to_next with an empty event queue");
        self.clock = self.clock.max(next);
    }

    pub fn clear(&mut self) {
        self.clock = 0;
        self.entries.clear();
    }

    fn find(&self, kind: EventKind) -> Option<&Entry> {
        self.entries.iter().find(|entry| entry.kind == kind)
    }
}

/// Scheduler handle shared between the system and its components.
#[derive(Default, Clone)]
pub struct SharedGbaScheduler {
    inner: Rc<RefCell<GbaScheduler>>,
}

impl SharedGbaScheduler {
    pub fn now(&self) -> u64 {
        self.inner.borrow().now()
    }

    pub fn step(&self, cycles: Cycles) {
        self.inner.borrow_mut().step(cycles)
    }

    pub fn schedule(&self, kind: EventKind, delta: u32) {
        self.inner.borrow_mut().schedule(kind, delta)
    }

    pub fn unschedule(&self, kind: EventKind) -> bool {
        self.inner.borrow_mut().unschedule(kind)
    }

    pub fn scheduled(&self, kind: EventKind) -> bool {
        self.inner.borrow().scheduled(kind)
    }

    pub fn elapsed(&self, kind: EventKind) -> Option<u32> {
        self.inner.borrow().elapsed(kind)
    }

    pub fn remaining(&self, kind: EventKind) -> Option<u32> {
        self.inner.borrow().remaining(kind)
    }

    pub fn total_length(&self, kind: EventKind) -> Option<u32> {
        self.inner.borrow().total_length(kind)
    }

    pub fn pop_due(&self) -> Option<(EventKind, u32)> {
        self.inner.borrow_mut().pop_due()
    }

    pub fn skip_to_next(&self) {
        self.inner.borrow_mut().skip_to_next()
    }

    pub fn clear(&self) {
        self.inner.borrow_mut().clear()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_fire_once_at_their_deadline() {
        let mut scheduler = GbaScheduler::default();
        scheduler.schedule(EventKind::HBlank, 960);

        scheduler.step(Cycles::from(959));
        assert_eq!(scheduler.pop_due(), None);

        scheduler.step(Cycles::from(1));
        assert_eq!(scheduler.pop_due(), Some((EventKind::HBlank, 0)));
        assert_eq!(scheduler.pop_due(), None);
    }

    #[test]
    fn late_events_report_extra_cycles() {
        let mut scheduler = GbaScheduler::default();
        scheduler.schedule(EventKind::Sample, 512);

        scheduler.step(Cycles::from(520));
        assert_eq!(scheduler.pop_due(), Some((EventKind::Sample, 8)));
    }

    #[test]
    fn simultaneous_events_fire_in_kind_order() {
        let mut scheduler = GbaScheduler::default();
        scheduler.schedule(EventKind::VBlank, 100);
        scheduler.schedule(EventKind::Timer0Overflow, 100);
        scheduler.schedule(EventKind::Channel1Clock, 100);

        scheduler.step(Cycles::from(100));
        assert_eq!(scheduler.pop_due(), Some((EventKind::Channel1Clock, 0)));
        assert_eq!(scheduler.pop_due(), Some((EventKind::Timer0Overflow, 0)));
        assert_eq!(scheduler.pop_due(), Some((EventKind::VBlank, 0)));
    }

    #[test]
    fn earlier_deadline_beats_kind_order() {
        let mut scheduler = GbaScheduler::default();
        scheduler.schedule(EventKind::Channel1Clock, 200);
        scheduler.schedule(EventKind::VBlank, 100);

        scheduler.step(Cycles::from(200));
        assert_eq!(scheduler.pop_due(), Some((EventKind::VBlank, 100)));
        assert_eq!(scheduler.pop_due(), Some((EventKind::Channel1Clock, 0)));
    }

    #[test]
    fn unschedule_cancels_a_pending_event() {
        let mut scheduler = GbaScheduler::default();
        scheduler.schedule(EventKind::Timer1Overflow, 50);
        assert!(scheduler.unschedule(EventKind::Timer1Overflow));
        assert!(!scheduler.unschedule(EventKind::Timer1Overflow));

        scheduler.step(Cycles::from(100));
        assert_eq!(scheduler.pop_due(), None);
    }

    #[test]
    fn bookkeeping_queries_track_the_clock() {
        let mut scheduler = GbaScheduler::default();
        scheduler.schedule(EventKind::Timer0Overflow, 100);
        scheduler.step(Cycles::from(30));

        assert_eq!(scheduler.elapsed(EventKind::Timer0Overflow), Some(30));
        assert_eq!(scheduler.remaining(EventKind::Timer0Overflow), Some(70));
        assert_eq!(scheduler.total_length(EventKind::Timer0Overflow), Some(100));
        assert_eq!(scheduler.elapsed(EventKind::Timer1Overflow), None);
    }

    #[test]
    fn skip_to_next_jumps_to_the_nearest_deadline() {
        let mut scheduler = GbaScheduler::default();
        scheduler.schedule(EventKind::HBlank, 960);
        scheduler.schedule(EventKind::Sample, 512);

        scheduler.skip_to_next();
        assert_eq!(scheduler.now(), 512);
        assert_eq!(scheduler.pop_due(), Some((EventKind::Sample, 0)));
    }
}
