use gba_derive::IoRegister;

use crate::{
    memory::IoRegister,
    scheduler::{EventKind, SharedGbaScheduler},
};

/// 4000102h (+4 per timer) - TMxCNT_H - Timer Control (R/W)
///   Bit   Expl.
///   0-1   Prescaler Selection (0=F/1, 1=F/64, 2=F/256, 3=F/1024)
///   2     Count-up Timing (1=cascade; unused on timer 0)
///   6     Timer IRQ Enable
///   7     Timer Start/Stop
#[derive(IoRegister, Copy, Clone)]
#[field(prescaler: u16 = 0..=1)]
#[field(cascade: bool = 2)]
#[field(irq_enable: bool = 6)]
#[field(enable: bool = 7)]
pub struct RegTimerControl {
    value: u16,
}

const DIVIDERS: [u32; 4] = [1, 64, 256, 1024];

#[derive(Default)]
struct Timer {
    /// Value the counter restarts from on enable and on overflow. Writing
    /// TMxCNT_L sets this; reading it returns the live counter instead.
    reload: u16,
    control: RegTimerControl,
    counter: u16,
}

impl Timer {
    fn divider(&self) -> u32 {
        DIVIDERS[self.control.prescaler() as usize]
    }

    fn running_from_prescaler(&self) -> bool {
        self.control.enable() && !self.control.cascade()
    }
}

pub struct Timers {
    timers: [Timer; 4],
    scheduler: SharedGbaScheduler,
}

impl Timers {
    pub(crate) fn new(scheduler: SharedGbaScheduler) -> Self {
        Timers {
            timers: Default::default(),
            scheduler,
        }
    }

    pub(crate) fn reset(&mut self) {
        for index in 0..4 {
            self.scheduler.unschedule(EventKind::timer_overflow(index));
        }
        self.timers = Default::default();
    }

    pub fn enabled(&self, index: usize) -> bool {
        self.timers[index].control.enable()
    }

    pub fn cascading(&self, index: usize) -> bool {
        self.timers[index].control.cascade() && index != 0
    }

    pub fn irq_enabled(&self, index: usize) -> bool {
        self.timers[index].control.irq_enable()
    }

    /// The live counter value. A prescaler-driven timer only materializes
    /// its count when something looks, using the time elapsed since its
    /// overflow was scheduled.
    pub fn counter(&self, index: usize) -> u16 {
        let timer = &self.timers[index];

        if timer.running_from_prescaler() {
            let ticks = self
                .scheduler
                .elapsed(EventKind::timer_overflow(index))
                .unwrap_or(0)
                / timer.divider();
            timer.counter.wrapping_add(ticks as u16)
        } else {
            timer.counter
        }
    }

    /// Handles this timer's overflow event. Reloads the counter and
    /// reschedules, folding in however late the event fired; a late enough
    /// event can represent several overflows, all of which are returned so
    /// cascade and FIFO clocking see every one.
    pub(crate) fn overflow(&mut self, index: usize, late: u32) -> u32 {
        let timer = &mut self.timers[index];
        let mut overflows = 1;
        timer.counter = timer.reload;

        if timer.running_from_prescaler() {
            let divider = timer.divider();
            let period = (0x1_0000 - u32::from(timer.reload)) * divider;
            let mut late = late;

            if period <= late {
                overflows += late / period;
                late %= period;
            }

            timer.counter = timer.counter.wrapping_add((late / divider) as u16);
            late %= divider;

            let delta = (0x1_0000 - u32::from(timer.counter)) * divider - late;
            self.scheduler
                .schedule(EventKind::timer_overflow(index), delta);
        }

        overflows
    }

    /// Increments a cascading timer when the one below it overflowed. An
    /// overflow here fires the timer's own overflow event immediately.
    pub(crate) fn cascade_increment(&mut self, index: usize, count: u32) {
        let timer = &mut self.timers[index];

        if u32::from(timer.counter) + count > 0xFFFF {
            self.scheduler.schedule(EventKind::timer_overflow(index), 0);
        } else {
            timer.counter += count as u16;
        }
    }

    pub(crate) fn reg_read16(&self, offset: u32) -> Option<u16> {
        let index = ((offset - 0x100) / 4) as usize;
        if offset & 0x2 == 0 {
            Some(self.counter(index))
        } else {
            Some(self.timers[index].control.read())
        }
    }

    pub(crate) fn reg_write16(&mut self, offset: u32, value: u16, mask: u16) {
        let index = ((offset - 0x100) / 4) as usize;

        if offset & 0x2 == 0 {
            let timer = &mut self.timers[index];
            timer.reload = (timer.reload & !mask) | (value & mask);
            return;
        }

        // Latch the live count before reconfiguring so a stopped timer
        // reads back where it was.
        self.timers[index].counter = self.counter(index);

        let timer = &mut self.timers[index];
        let was_running = timer.running_from_prescaler();
        let was_enabled = timer.control.enable();

        let merged = (timer.control.read() & !mask) | (value & mask);
        timer.control.write(merged);

        let now_running = timer.running_from_prescaler();
        let event = EventKind::timer_overflow(index);

        if !was_enabled && timer.control.enable() {
            // 0 -> 1 on the enable bit reloads the counter. The two extra
            // cycles cover the startup delay of the prescaler.
            timer.counter = timer.reload;
            if now_running {
                let delta = (0x1_0000 - u32::from(timer.counter)) * timer.divider() + 2;
                self.scheduler.schedule(event, delta);
            }
        } else if was_running && !now_running {
            self.scheduler.unschedule(event);
        } else if !was_running && now_running {
            // Left cascade mode while enabled; restart from the reload.
            timer.counter = timer.reload;
            let delta = (0x1_0000 - u32::from(timer.counter)) * timer.divider() + 2;
            self.scheduler.schedule(event, delta);
        }
    }
}

#[cfg(test)]
mod tests {
    use arm::Cycles;

    use super::*;

    fn timers() -> (Timers, SharedGbaScheduler) {
        let scheduler = SharedGbaScheduler::default();
        (Timers::new(scheduler.clone()), scheduler)
    }

    #[test]
    fn enable_schedules_overflow_from_reload() {
        let (mut timers, scheduler) = timers();
        timers.reg_write16(0x100, 0xFFF0, 0xFFFF);
        timers.reg_write16(0x102, 0x0080, 0xFFFF);

        assert_eq!(
            scheduler.remaining(EventKind::Timer0Overflow),
            Some((0x1_0000 - 0xFFF0) * 1 + 2)
        );
    }

    #[test]
    fn counter_reads_catch_up_with_the_clock() {
        let (mut timers, scheduler) = timers();
        timers.reg_write16(0x100, 0, 0xFFFF);
        timers.reg_write16(0x102, 0x0081, 0xFFFF); // prescaler /64

        scheduler.step(Cycles::from(640));
        assert_eq!(timers.counter(0), 10);
        // A second read must not double count.
        assert_eq!(timers.counter(0), 10);
    }

    #[test]
    fn overflow_reschedules_and_reports_multiples() {
        let (mut timers, scheduler) = timers();
        timers.reg_write16(0x100, 0xFFFF, 0xFFFF);
        timers.reg_write16(0x102, 0x0080, 0xFFFF);

        // Period is one cycle; firing 4 cycles late means 5 overflows.
        scheduler.step(Cycles::from(3 + 4));
        let (kind, late) = scheduler.pop_due().unwrap();
        assert_eq!(kind, EventKind::Timer0Overflow);
        assert_eq!(timers.overflow(0, late), 5);
    }

    #[test]
    fn cascade_increment_overflows_through_the_event_queue() {
        let (mut timers, scheduler) = timers();
        // Timer 1 cascading, counter at 0xFFFF.
        timers.reg_write16(0x104, 0xFFFF, 0xFFFF);
        timers.reg_write16(0x106, 0x0084, 0xFFFF);

        timers.cascade_increment(1, 1);
        assert!(scheduler.scheduled(EventKind::Timer1Overflow));
        assert_eq!(scheduler.remaining(EventKind::Timer1Overflow), Some(0));
    }

    #[test]
    fn disabling_keeps_the_latched_count() {
        let (mut timers, scheduler) = timers();
        timers.reg_write16(0x100, 0, 0xFFFF);
        timers.reg_write16(0x102, 0x0080, 0xFFFF);

        scheduler.step(Cycles::from(100));
        timers.reg_write16(0x102, 0x0000, 0xFFFF);

        assert!(!scheduler.scheduled(EventKind::Timer0Overflow));
        assert_eq!(timers.counter(0), 100);
    }
}
