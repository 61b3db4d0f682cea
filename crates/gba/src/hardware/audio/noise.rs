use gba_derive::IoRegister;

use crate::{
    memory::IoRegister,
    scheduler::{EventKind, SharedGbaScheduler},
};

use super::{CPU_FREQUENCY, CYCLES_PER_ENVELOPE_TICK, CYCLES_PER_LENGTH_TICK};

/// 4000078h - SOUND4CNT_L - Channel 4 Length/Envelope (R/W)
///   Bit   Expl.
///   0-5   Initial Length Timer
///   8-10  Envelope Pace
///   11    Envelope Direction (0=Decrease, 1=Increase)
///   12-15 Initial Envelope Volume
#[derive(IoRegister, Copy, Clone)]
#[field(initial_length: u16 = 0..=5)]
#[field(envelope_pace: u16 = 8..=10)]
#[field(envelope_increase: bool = 11)]
#[field(initial_volume: u16 = 12..=15)]
pub struct RegNoiseLenEnvelope {
    value: u16,
}

/// 400007Ch - SOUND4CNT_H - Channel 4 Frequency/Control (R/W)
///   Bit   Expl.
///   0-2   Dividing Ratio (r)
///   3     Counter Width (0=15 bits, 1=7 bits)
///   4-7   Shift Clock Frequency (s)
///   14    Length Enable
///   15    Trigger (write-only)
#[derive(IoRegister, Copy, Clone)]
#[field(dividing_ratio: u16 = 0..=2)]
#[field(narrow_lfsr: bool = 3)]
#[field(shift_clock: u16 = 4..=7)]
#[field(length_enable: bool = 14)]
#[field(trigger: bool = 15)]
pub struct RegNoiseControl {
    value: u16,
}

/// The noise PSG voice: a 15-bit (or 7-bit) linear feedback shift register
/// clocked from a divided clock.
pub struct Noise {
    pub(crate) len_env: RegNoiseLenEnvelope,
    pub(crate) control: RegNoiseControl,

    envelope_increase: bool,
    envelope_pace: u16,
    volume: u16,
    lfsr: u16,
    length_expired: bool,
}

impl Noise {
    pub(crate) fn new() -> Self {
        Noise {
            len_env: RegNoiseLenEnvelope::default(),
            control: RegNoiseControl::default(),
            envelope_increase: false,
            envelope_pace: 0,
            volume: 0,
            lfsr: 0xFFFF,
            length_expired: false,
        }
    }

    pub(crate) fn reset(&mut self, scheduler: &SharedGbaScheduler) {
        self.len_env = RegNoiseLenEnvelope::default();
        self.control = RegNoiseControl::default();
        self.envelope_increase = false;
        self.envelope_pace = 0;
        self.volume = 0;
        self.lfsr = 0xFFFF;
        self.length_expired = false;

        scheduler.unschedule(EventKind::Channel4Clock);
        scheduler.unschedule(EventKind::Channel4Envelope);
        scheduler.unschedule(EventKind::Channel4Length);
    }

    pub(crate) fn expired(&self) -> bool {
        self.length_expired
    }

    pub(crate) fn sample(&self) -> i16 {
        if self.length_expired {
            return 0;
        }

        ((self.lfsr & 1) * self.volume) as i16
    }

    pub(crate) fn write_control(
        &mut self,
        value: u16,
        mask: u16,
        scheduler: &SharedGbaScheduler,
    ) -> bool {
        let merged = (self.control.read() & !mask) | (value & mask);
        self.control.write(merged);

        let triggered = self.control.trigger();
        if triggered {
            self.control.set_trigger(false);
            self.start(scheduler);
        }
        triggered
    }

    fn start(&mut self, scheduler: &SharedGbaScheduler) {
        self.envelope_increase = self.len_env.envelope_increase();
        self.envelope_pace = self.len_env.envelope_pace();
        self.volume = self.len_env.initial_volume();
        self.length_expired = false;
        self.lfsr = 0xFFFF;

        scheduler.unschedule(EventKind::Channel4Clock);
        scheduler.unschedule(EventKind::Channel4Envelope);
        scheduler.unschedule(EventKind::Channel4Length);

        scheduler.schedule(EventKind::Channel4Clock, self.clock_period());

        if self.envelope_pace != 0 {
            scheduler.schedule(
                EventKind::Channel4Envelope,
                u32::from(self.envelope_pace) * CYCLES_PER_ENVELOPE_TICK,
            );
        }

        if self.control.length_enable() {
            let remaining = 64 - u32::from(self.len_env.initial_length());
            scheduler.schedule(EventKind::Channel4Length, remaining * CYCLES_PER_LENGTH_TICK);
        }
    }

    fn clock_period(&self) -> u32 {
        let r = u32::from(self.control.dividing_ratio());
        let s = u32::from(self.control.shift_clock());

        let frequency = if r == 0 {
            524_288 >> s
        } else {
            262_144 / (r << s)
        };

        (CPU_FREQUENCY / frequency.max(1)).max(1)
    }

    pub(crate) fn clock(&mut self, late: u32, scheduler: &SharedGbaScheduler) {
        if self.length_expired {
            return;
        }

        let feedback = (self.lfsr & 1) ^ ((self.lfsr >> 1) & 1);
        self.lfsr = (self.lfsr & 0x7FFF) | (feedback << 15);

        if self.control.narrow_lfsr() {
            self.lfsr = (self.lfsr & 0xFF7F) | (feedback << 7);
        }

        self.lfsr >>= 1;
        scheduler.schedule(
            EventKind::Channel4Clock,
            self.clock_period().saturating_sub(late).max(1),
        );
    }

    pub(crate) fn envelope(&mut self, late: u32, scheduler: &SharedGbaScheduler) {
        if self.length_expired {
            return;
        }

        if self.envelope_increase && self.volume < 0x0F {
            self.volume += 1;
        } else if !self.envelope_increase && self.volume > 0 {
            self.volume -= 1;
        } else {
            return;
        }

        let delta = u32::from(self.envelope_pace) * CYCLES_PER_ENVELOPE_TICK;
        scheduler.schedule(EventKind::Channel4Envelope, delta.saturating_sub(late).max(1));
    }

    pub(crate) fn length_expiry(&mut self) {
        self.length_expired = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lfsr_walks_on_clock() {
        let scheduler = SharedGbaScheduler::default();
        let mut noise = Noise::new();
        noise.len_env.write(0xF000);
        noise.write_control(0x8001, 0xFFFF, &scheduler);

        let before = noise.lfsr;
        let (_, late) = scheduler_fire(&scheduler);
        noise.clock(late, &scheduler);
        assert_ne!(noise.lfsr, before);
    }

    fn scheduler_fire(scheduler: &SharedGbaScheduler) -> (EventKind, u32) {
        scheduler.skip_to_next();
        scheduler.pop_due().expect("an event must be pending")
    }

    #[test]
    fn envelope_decreases_to_silence() {
        let scheduler = SharedGbaScheduler::default();
        let mut noise = Noise::new();
        noise.len_env.write(0x1100); // volume 1, pace 1, decrease
        noise.write_control(0x8000, 0xFFFF, &scheduler);

        scheduler.unschedule(EventKind::Channel4Envelope);
        noise.envelope(0, &scheduler);
        assert_eq!(noise.sample(), 0);
    }
}
