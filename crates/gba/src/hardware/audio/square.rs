use gba_derive::IoRegister;

use crate::{
    memory::IoRegister,
    scheduler::{EventKind, SharedGbaScheduler},
};

use super::{CYCLES_PER_ENVELOPE_TICK, CYCLES_PER_LENGTH_TICK, CYCLES_PER_SWEEP_TICK};

/// One PSG cycle is sixteen CPU cycles; the duty pointer advances once per
/// (0x800 - period) PSG cycles.
const CYCLES_PER_PSG_CYCLE: u32 = 16;

/// The four duty waveforms, one bit per eighth of the cycle.
const DUTY_CYCLE: [[u8; 8]; 4] = [
    [0, 0, 0, 0, 0, 0, 0, 1],
    [1, 0, 0, 0, 0, 0, 0, 1],
    [1, 0, 0, 0, 0, 1, 1, 1],
    [0, 1, 1, 1, 1, 1, 1, 0],
];

/// 4000060h - SOUND1CNT_L - Channel 1 Sweep (R/W)
///   Bit   Expl.
///   0-2   Sweep Shift Amount
///   3     Sweep Direction (0=Increase, 1=Decrease)
///   4-6   Sweep Pace (in 7.8ms ticks)
#[derive(IoRegister, Copy, Clone)]
#[field(shift: u16 = 0..=2)]
#[field(decrease: bool = 3)]
#[field(pace: u16 = 4..=6)]
pub struct RegSweep {
    value: u16,
}

/// 4000062h / 4000068h - SOUNDxCNT duty/length/envelope (R/W)
///   Bit   Expl.
///   0-5   Initial Length Timer (64 - n sound length ticks)
///   6-7   Wave Duty
///   8-10  Envelope Pace (in 15.6ms ticks)
///   11    Envelope Direction (0=Decrease, 1=Increase)
///   12-15 Initial Envelope Volume
#[derive(IoRegister, Copy, Clone)]
#[field(initial_length: u16 = 0..=5)]
#[field(duty: u16 = 6..=7)]
#[field(envelope_pace: u16 = 8..=10)]
#[field(envelope_increase: bool = 11)]
#[field(initial_volume: u16 = 12..=15)]
pub struct RegDutyLenEnvelope {
    value: u16,
}

/// 4000064h / 400006Ch - SOUNDxCNT frequency/control (R/W)
///   Bit   Expl.
///   0-10  Period (frequency = 131072 / (2048 - n) Hz)
///   14    Length Enable
///   15    Trigger (write-only, restarts the channel)
#[derive(IoRegister, Copy, Clone)]
#[field(period: u16 = 0..=10)]
#[field(length_enable: bool = 14)]
#[field(trigger: bool = 15)]
pub struct RegFrequencyControl {
    value: u16,
}

/// Which scheduler events drive one square channel.
pub(crate) struct SquareEvents {
    pub clock: EventKind,
    pub envelope: EventKind,
    pub length: EventKind,
    /// Channel 1 only.
    pub sweep: Option<EventKind>,
}

/// A square wave PSG voice. Channel 1 carries the frequency sweep unit;
/// channel 2 is the same voice without it.
pub struct Square {
    events: SquareEvents,

    pub(crate) sweep: RegSweep,
    pub(crate) duty_env: RegDutyLenEnvelope,
    pub(crate) freq_ctrl: RegFrequencyControl,

    // Latched at trigger time; register rewrites only take effect on the
    // next trigger.
    envelope_increase: bool,
    envelope_pace: u16,

    volume: u16,
    duty_index: usize,
    length_expired: bool,
    frequency_overflow: bool,
}

impl Square {
    pub(crate) fn new(events: SquareEvents) -> Self {
        Square {
            events,
            sweep: RegSweep::default(),
            duty_env: RegDutyLenEnvelope::default(),
            freq_ctrl: RegFrequencyControl::default(),
            envelope_increase: false,
            envelope_pace: 0,
            volume: 0,
            duty_index: 0,
            length_expired: false,
            frequency_overflow: false,
        }
    }

    pub(crate) fn reset(&mut self, scheduler: &SharedGbaScheduler) {
        self.sweep = RegSweep::default();
        self.duty_env = RegDutyLenEnvelope::default();
        self.freq_ctrl = RegFrequencyControl::default();
        self.envelope_increase = false;
        self.envelope_pace = 0;
        self.volume = 0;
        self.duty_index = 0;
        self.length_expired = false;
        self.frequency_overflow = false;
        self.unschedule_all(scheduler);
    }

    fn unschedule_all(&self, scheduler: &SharedGbaScheduler) {
        scheduler.unschedule(self.events.clock);
        scheduler.unschedule(self.events.envelope);
        scheduler.unschedule(self.events.length);
        if let Some(sweep) = self.events.sweep {
            scheduler.unschedule(sweep);
        }
    }

    /// Whether the voice has gone quiet on its own.
    pub(crate) fn expired(&self) -> bool {
        self.length_expired || self.frequency_overflow
    }

    pub(crate) fn sample(&self) -> i16 {
        if self.expired() {
            return 0;
        }

        (self.volume * u16::from(DUTY_CYCLE[self.duty_env.duty() as usize][self.duty_index])) as i16
    }

    /// Writes the frequency/control register; a set trigger bit restarts
    /// the voice and is not stored.
    pub(crate) fn write_freq_ctrl(
        &mut self,
        value: u16,
        mask: u16,
        scheduler: &SharedGbaScheduler,
    ) -> bool {
        let merged = (self.freq_ctrl.read() & !mask) | (value & mask);
        self.freq_ctrl.write(merged);

        let triggered = self.freq_ctrl.trigger();
        if triggered {
            self.freq_ctrl.set_trigger(false);
            self.start(scheduler);
        }
        triggered
    }

    fn start(&mut self, scheduler: &SharedGbaScheduler) {
        self.envelope_increase = self.duty_env.envelope_increase();
        self.envelope_pace = self.duty_env.envelope_pace();

        self.volume = self.duty_env.initial_volume();
        self.duty_index = 0;
        self.length_expired = false;
        self.frequency_overflow = false;

        self.unschedule_all(scheduler);

        scheduler.schedule(self.events.clock, self.clock_period());

        if self.envelope_pace != 0 {
            scheduler.schedule(
                self.events.envelope,
                u32::from(self.envelope_pace) * CYCLES_PER_ENVELOPE_TICK,
            );
        }

        if self.freq_ctrl.length_enable() {
            let remaining = 64 - u32::from(self.duty_env.initial_length());
            scheduler.schedule(self.events.length, remaining * CYCLES_PER_LENGTH_TICK);
        }

        if let Some(sweep) = self.events.sweep {
            let pace = self.sweep.pace().max(1);
            scheduler.schedule(sweep, u32::from(pace) * CYCLES_PER_SWEEP_TICK);
        }
    }

    fn clock_period(&self) -> u32 {
        (0x800 - u32::from(self.freq_ctrl.period())) * CYCLES_PER_PSG_CYCLE
    }

    pub(crate) fn clock(&mut self, late: u32, scheduler: &SharedGbaScheduler) {
        if self.expired() {
            return;
        }

        self.duty_index = (self.duty_index + 1) % 8;
        scheduler.schedule(self.events.clock, self.clock_period().saturating_sub(late).max(1));
    }

    pub(crate) fn envelope(&mut self, late: u32, scheduler: &SharedGbaScheduler) {
        if self.expired() {
            return;
        }

        if self.envelope_increase && self.volume < 0x0F {
            self.volume += 1;
        } else if !self.envelope_increase && self.volume > 0 {
            self.volume -= 1;
        } else {
            // Saturated; the envelope stops ticking.
            return;
        }

        let delta = u32::from(self.envelope_pace) * CYCLES_PER_ENVELOPE_TICK;
        scheduler.schedule(self.events.envelope, delta.saturating_sub(late).max(1));
    }

    pub(crate) fn length_expiry(&mut self) {
        self.length_expired = true;
    }

    /// Channel 1's sweep unit: shift the period up or down every pace tick,
    /// silencing the voice when an increase overflows 11 bits.
    pub(crate) fn frequency_sweep(&mut self, late: u32, scheduler: &SharedGbaScheduler) {
        if self.expired() {
            return;
        }

        let current = self.freq_ctrl.period();
        let delta = current >> self.sweep.shift();
        let mut updated = current;

        if self.sweep.decrease() {
            if current > delta {
                updated = current - delta;
            }
        } else {
            updated = current + delta;
            if updated > 0x07FF {
                self.frequency_overflow = true;
                updated = current;
            }
        }

        let pace = self.sweep.pace();
        if pace != 0 {
            self.freq_ctrl.set_period(updated);
        }

        if !self.frequency_overflow {
            let sweep = self.events.sweep.expect("sweep tick on a sweepless channel");
            let period = u32::from(pace.max(1)) * CYCLES_PER_SWEEP_TICK;
            scheduler.schedule(sweep, period.saturating_sub(late).max(1));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square1() -> (Square, SharedGbaScheduler) {
        let scheduler = SharedGbaScheduler::default();
        let square = Square::new(SquareEvents {
            clock: EventKind::Channel1Clock,
            envelope: EventKind::Channel1Envelope,
            length: EventKind::Channel1Length,
            sweep: Some(EventKind::Channel1Sweep),
        });
        (square, scheduler)
    }

    #[test]
    fn trigger_schedules_the_duty_clock() {
        let (mut square, scheduler) = square1();
        square.duty_env.write(0xF000); // full volume, 12.5% duty
        square.write_freq_ctrl(0x8400, 0xFFFF, &scheduler);

        assert!(scheduler.scheduled(EventKind::Channel1Clock));
        assert_eq!(
            scheduler.remaining(EventKind::Channel1Clock),
            Some((0x800 - 0x400) * 16)
        );
        assert_eq!(square.sample(), 0, "12.5 percent duty starts low");
    }

    #[test]
    fn length_expiry_silences_the_voice() {
        let (mut square, scheduler) = square1();
        square.duty_env.write(0xF080); // 50% duty, volume 15
        square.write_freq_ctrl(0xC400, 0xFFFF, &scheduler);
        assert!(scheduler.scheduled(EventKind::Channel1Length));
        assert_eq!(square.sample(), 0x0F, "50% duty starts high at full volume");

        square.length_expiry();
        assert_eq!(square.sample(), 0);
        assert!(square.expired());
    }

    #[test]
    fn sweep_increase_overflow_kills_the_channel() {
        let (mut square, scheduler) = square1();
        square.sweep.write(0x0011); // shift 1, increase, pace 1
        square.write_freq_ctrl(0x87FF, 0xFFFF, &scheduler);

        square.frequency_sweep(0, &scheduler);
        assert!(square.expired());
        assert!(!scheduler.scheduled(EventKind::Channel1Sweep));
    }
}
