mod fifo;
mod noise;
mod square;

pub use noise::Noise;
pub use square::Square;

use fifo::Fifo;
use gba_derive::IoRegister;
use ringbuf::{Consumer, Producer, RingBuffer};
use square::SquareEvents;
use util::bits::BitOps;

use crate::{
    memory::IoRegister,
    scheduler::{EventKind, SharedGbaScheduler},
};

pub(crate) const CPU_FREQUENCY: u32 = 16_777_216;

/// Host-facing sample rate: one stereo pair every 512 CPU cycles.
pub const SAMPLE_RATE: u32 = 32_768;
const CYCLES_PER_SAMPLE: u32 = CPU_FREQUENCY / SAMPLE_RATE;

/// The GB-derived frame units: envelope ticks at 64 Hz, length at 256 Hz,
/// channel 1's sweep at 128 Hz.
pub(crate) const CYCLES_PER_ENVELOPE_TICK: u32 = CPU_FREQUENCY / 64;
pub(crate) const CYCLES_PER_LENGTH_TICK: u32 = CPU_FREQUENCY / 256;
pub(crate) const CYCLES_PER_SWEEP_TICK: u32 = CPU_FREQUENCY / 128;

/// Capacity of the cross-thread sample ring, in mono samples.
const AUDIO_RING_CAPACITY: usize = 0x8000;

/// 4000080h - SOUNDCNT_L - PSG routing (R/W)
///   Bit   Expl.
///   0-2   PSG Master Volume Right
///   4-6   PSG Master Volume Left
///   8-11  Channel 1-4 Enable Right
///   12-15 Channel 1-4 Enable Left
#[derive(IoRegister, Copy, Clone)]
#[field(volume_right: u16 = 0..=2)]
#[field(volume_left: u16 = 4..=6)]
#[field(enable_right: u16 = 8..=11)]
#[field(enable_left: u16 = 12..=15)]
pub struct RegSoundcntL {
    value: u16,
}

/// 4000082h - SOUNDCNT_H - Mixing control (R/W)
///   Bit   Expl.
///   0-1   PSG Volume (0=25%, 1=50%, 2=100%)
///   2     DMA Sound A Volume (0=50%, 1=100%)
///   3     DMA Sound B Volume (0=50%, 1=100%)
///   8     DMA Sound A Enable Right
///   9     DMA Sound A Enable Left
///   10    DMA Sound A Timer Select
///   11    DMA Sound A Reset FIFO (write-only)
///   12-15 Same for DMA Sound B
#[derive(IoRegister, Copy, Clone)]
#[field(psg_volume: u16 = 0..=1)]
#[field(fifo_a_full_volume: bool = 2)]
#[field(fifo_b_full_volume: bool = 3)]
#[field(fifo_a_right: bool = 8)]
#[field(fifo_a_left: bool = 9)]
#[field(fifo_a_timer: u16 = 10)]
#[field(fifo_a_reset: bool = 11)]
#[field(fifo_b_right: bool = 12)]
#[field(fifo_b_left: bool = 13)]
#[field(fifo_b_timer: u16 = 14)]
#[field(fifo_b_reset: bool = 15)]
pub struct RegSoundcntH {
    value: u16,
}

/// 4000084h - SOUNDCNT_X - Master enable and channel status (R/W)
///   Bit   Expl.
///   0-3   Channel 1-4 Active (Read Only)
///   7     PSG/FIFO Master Enable
#[derive(IoRegister, Copy, Clone)]
#[field(chan1_on: readonly<bool> = 0)]
#[field(chan2_on: readonly<bool> = 1)]
#[field(chan3_on: readonly<bool> = 2)]
#[field(chan4_on: readonly<bool> = 3)]
#[field(master_enable: bool = 7)]
pub struct RegSoundcntX {
    value: u16,
}

/// 4000088h - SOUNDBIAS - Output bias and amplitude resolution (R/W)
#[derive(IoRegister, Copy, Clone)]
#[field(bias_level: u16 = 0..=9)]
#[field(amplitude_cycle: u16 = 14..=15)]
pub struct RegSoundbias {
    value: u16,
}

/// The APU: square 1 (with sweep), square 2, the wave channel (registers
/// and wave RAM held, output silent), noise, and the two DMA-fed FIFOs,
/// mixed into a lock-free ring the host audio thread drains.
pub struct Apu {
    pub square1: Square,
    pub square2: Square,
    pub noise: Noise,

    soundcnt_l: RegSoundcntL,
    soundcnt_h: RegSoundcntH,
    soundcnt_x: RegSoundcntX,
    soundbias: RegSoundbias,

    /// Wave channel state is storage-only: registers plus the two sample
    /// banks. Playback would land here once a title needs it.
    wave_registers: [u16; 3],
    wave_ram: [u16; 8],

    fifo_a: Fifo,
    fifo_b: Fifo,

    samples_produced: u64,
    producer: Producer<f32>,
    consumer: Option<Consumer<f32>>,

    scheduler: SharedGbaScheduler,
}

impl Apu {
    pub(crate) fn new(scheduler: SharedGbaScheduler) -> Self {
        let (producer, consumer) = RingBuffer::new(AUDIO_RING_CAPACITY).split();

        Apu {
            square1: Square::new(SquareEvents {
                clock: EventKind::Channel1Clock,
                envelope: EventKind::Channel1Envelope,
                length: EventKind::Channel1Length,
                sweep: Some(EventKind::Channel1Sweep),
            }),
            square2: Square::new(SquareEvents {
                clock: EventKind::Channel2Clock,
                envelope: EventKind::Channel2Envelope,
                length: EventKind::Channel2Length,
                sweep: None,
            }),
            noise: Noise::new(),

            soundcnt_l: RegSoundcntL::default(),
            soundcnt_h: RegSoundcntH::default(),
            soundcnt_x: RegSoundcntX::default(),
            soundbias: RegSoundbias::new(0x0200),

            wave_registers: [0; 3],
            wave_ram: [0; 8],

            fifo_a: Fifo::new(),
            fifo_b: Fifo::new(),

            samples_produced: 0,
            producer,
            consumer: Some(consumer),

            scheduler,
        }
    }

    pub(crate) fn reset(&mut self) {
        self.square1.reset(&self.scheduler);
        self.square2.reset(&self.scheduler);
        self.noise.reset(&self.scheduler);

        self.soundcnt_l = RegSoundcntL::default();
        self.soundcnt_h = RegSoundcntH::default();
        self.soundcnt_x = RegSoundcntX::default();
        self.soundbias = RegSoundbias::new(0x0200);

        self.wave_registers = [0; 3];
        self.wave_ram = [0; 8];

        self.fifo_a.clear();
        self.fifo_b.clear();
        self.samples_produced = 0;

        self.scheduler.unschedule(EventKind::Sample);
    }

    pub(crate) fn schedule_sampling(&self) {
        self.scheduler.schedule(EventKind::Sample, CYCLES_PER_SAMPLE);
    }

    /// Hands the drain side of the sample ring to the host audio thread.
    /// Can only be taken once.
    pub fn take_consumer(&mut self) -> Option<Consumer<f32>> {
        self.consumer.take()
    }

    /// Stereo sample pairs pushed since reset.
    pub fn samples_produced(&self) -> u64 {
        self.samples_produced
    }

    /// Dispatches one of the APU's scheduler events: the PSG channels'
    /// clock/envelope/length/sweep ticks and the output sample tick.
    pub(crate) fn handle_event(&mut self, event: EventKind, late: u32) {
        let scheduler = self.scheduler.clone();

        match event {
            EventKind::Channel1Clock => self.square1.clock(late, &scheduler),
            EventKind::Channel1Envelope => self.square1.envelope(late, &scheduler),
            EventKind::Channel1Length => self.square1.length_expiry(),
            EventKind::Channel1Sweep => self.square1.frequency_sweep(late, &scheduler),

            EventKind::Channel2Clock => self.square2.clock(late, &scheduler),
            EventKind::Channel2Envelope => self.square2.envelope(late, &scheduler),
            EventKind::Channel2Length => self.square2.length_expiry(),

            EventKind::Channel4Clock => self.noise.clock(late, &scheduler),
            EventKind::Channel4Envelope => self.noise.envelope(late, &scheduler),
            EventKind::Channel4Length => self.noise.length_expiry(),

            EventKind::Sample => self.sample(late),

            _ => unreachable!("non-APU event {event:?} routed to the APU"),
        }
    }

    /// A word DMA'd at one of the FIFO registers.
    pub(crate) fn fifo_write_word(&mut self, address: u32, value: u32) {
        match address {
            super::dma::FIFO_A_ADDR => self.fifo_a.push_word(value),
            super::dma::FIFO_B_ADDR => self.fifo_b.push_word(value),
            _ => {}
        }
    }

    /// Timer 0 or 1 overflowed: clock the FIFOs that selected it. Returns
    /// whether FIFO A / FIFO B want a DMA refill.
    pub(crate) fn timer_overflow(&mut self, timer: usize) -> (bool, bool) {
        let mut refill_a = false;
        let mut refill_b = false;

        if usize::from(self.soundcnt_h.fifo_a_timer()) == timer {
            refill_a = self.fifo_a.pop();
        }
        if usize::from(self.soundcnt_h.fifo_b_timer()) == timer {
            refill_b = self.fifo_b.pop();
        }

        (refill_a, refill_b)
    }

    /// The periodic sample event: mix every voice into one stereo pair and
    /// push it to the host ring, dropping the pair if the host is behind.
    pub(crate) fn sample(&mut self, late: u32) {
        self.scheduler
            .schedule(EventKind::Sample, CYCLES_PER_SAMPLE.saturating_sub(late).max(1));

        let mut left = 0i16;
        let mut right = 0i16;

        if self.soundcnt_x.master_enable() {
            let enable_left = self.soundcnt_l.enable_left();
            let enable_right = self.soundcnt_l.enable_right();

            let mut psg_left = 0i16;
            let mut psg_right = 0i16;

            for (channel, sample) in [
                self.square1.sample(),
                self.square2.sample(),
                0, // wave
                self.noise.sample(),
            ]
            .into_iter()
            .enumerate()
            {
                if enable_left.bit(channel as u32) {
                    psg_left += sample;
                }
                if enable_right.bit(channel as u32) {
                    psg_right += sample;
                }
            }

            // Center the unsigned PSG sum, then apply the PSG volume code
            // (25%/50%/100% of the 10-bit range).
            psg_left = psg_left * 2 - 0x0F;
            psg_right = psg_right * 2 - 0x0F;

            let psg_multiplier = match self.soundcnt_h.psg_volume() {
                0 => 2,
                1 => 4,
                _ => 8,
            };
            left += psg_left * psg_multiplier;
            right += psg_right * psg_multiplier;

            let fifo_a = self.fifo_a.sample(self.soundcnt_h.fifo_a_full_volume());
            let fifo_b = self.fifo_b.sample(self.soundcnt_h.fifo_b_full_volume());

            if self.soundcnt_h.fifo_a_left() {
                left += fifo_a;
            }
            if self.soundcnt_h.fifo_a_right() {
                right += fifo_a;
            }
            if self.soundcnt_h.fifo_b_left() {
                left += fifo_b;
            }
            if self.soundcnt_h.fifo_b_right() {
                right += fifo_b;
            }

            let bias = self.soundbias.bias_level() as i16;
            left = (left + bias).clamp(0, 0x3FF);
            right = (right + bias).clamp(0, 0x3FF);
        }

        let left = f32::from(left) / 511.5 - 1.0;
        let right = f32::from(right) / 511.5 - 1.0;

        // Non-blocking by design: when the host stops draining we drop
        // samples rather than stall emulation.
        let _ = self.producer.push(left);
        let _ = self.producer.push(right);
        self.samples_produced += 1;
    }

    pub(crate) fn reg_read16(&self, offset: u32) -> Option<u16> {
        match offset {
            0x60 => Some(self.square1.sweep.read()),
            0x62 => Some(self.square1.duty_env.read()),
            0x64 => Some(self.square1.freq_ctrl.read()),
            0x68 => Some(self.square2.duty_env.read()),
            0x6C => Some(self.square2.freq_ctrl.read()),
            0x70 | 0x72 | 0x74 => Some(self.wave_registers[((offset - 0x70) / 2) as usize]),
            0x78 => Some(self.noise.len_env.read()),
            0x7C => Some(self.noise.control.read()),
            0x80 => Some(self.soundcnt_l.read()),
            0x82 => Some(self.soundcnt_h.read()),
            0x84 => {
                let mut value = self.soundcnt_x;
                value.set_chan1_on(!self.square1.expired());
                value.set_chan2_on(!self.square2.expired());
                value.set_chan3_on(false);
                value.set_chan4_on(!self.noise.expired());
                Some(value.read())
            }
            0x88 => Some(self.soundbias.read()),
            0x90..=0x9E => Some(self.wave_ram[((offset - 0x90) / 2) as usize]),
            // Unused halves of the channel registers read as zero; the
            // FIFOs are write-only and read as open bus.
            0x66 | 0x6A | 0x6E | 0x76 | 0x7A | 0x7E | 0x86 | 0x8A..=0x8E => Some(0),
            _ => None,
        }
    }

    pub(crate) fn reg_write16(&mut self, offset: u32, value: u16, mask: u16) {
        match offset {
            0x60 => {
                let merged = (self.square1.sweep.read() & !mask) | (value & mask);
                self.square1.sweep.write(merged);
            }
            0x62 => {
                let merged = (self.square1.duty_env.read() & !mask) | (value & mask);
                self.square1.duty_env.write(merged);
            }
            0x64 => {
                let scheduler = self.scheduler.clone();
                if self.square1.write_freq_ctrl(value, mask, &scheduler) {
                    self.soundcnt_x.set_chan1_on(true);
                }
            }
            0x68 => {
                let merged = (self.square2.duty_env.read() & !mask) | (value & mask);
                self.square2.duty_env.write(merged);
            }
            0x6C => {
                let scheduler = self.scheduler.clone();
                if self.square2.write_freq_ctrl(value, mask, &scheduler) {
                    self.soundcnt_x.set_chan2_on(true);
                }
            }
            0x70 | 0x72 | 0x74 => {
                let index = ((offset - 0x70) / 2) as usize;
                self.wave_registers[index] = (self.wave_registers[index] & !mask) | (value & mask);
            }
            0x78 => {
                let merged = (self.noise.len_env.read() & !mask) | (value & mask);
                self.noise.len_env.write(merged);
            }
            0x7C => {
                let scheduler = self.scheduler.clone();
                if self.noise.write_control(value, mask, &scheduler) {
                    self.soundcnt_x.set_chan4_on(true);
                }
            }
            0x80 => {
                let merged = (self.soundcnt_l.read() & !mask) | (value & mask);
                self.soundcnt_l.write(merged);
            }
            0x82 => {
                let merged = (self.soundcnt_h.read() & !mask) | (value & mask);
                self.soundcnt_h.write(merged);

                // FIFO reset bits act on write and read back as zero.
                if self.soundcnt_h.fifo_a_reset() {
                    self.fifo_a.clear();
                    self.soundcnt_h.set_fifo_a_reset(false);
                }
                if self.soundcnt_h.fifo_b_reset() {
                    self.fifo_b.clear();
                    self.soundcnt_h.set_fifo_b_reset(false);
                }
            }
            0x84 => {
                let merged = (self.soundcnt_x.read() & !mask) | (value & mask);
                self.soundcnt_x.write(merged);
            }
            0x88 => {
                let merged = (self.soundbias.read() & !mask) | (value & mask);
                self.soundbias.write(merged);
            }
            0x90..=0x9E => {
                let index = ((offset - 0x90) / 2) as usize;
                self.wave_ram[index] = (self.wave_ram[index] & !mask) | (value & mask);
            }
            // CPU writes into the FIFOs, one or two bytes at a time.
            0xA0 | 0xA2 => {
                if mask & 0x00FF != 0 {
                    self.fifo_a.push_byte(value as u8);
                }
                if mask & 0xFF00 != 0 {
                    self.fifo_a.push_byte((value >> 8) as u8);
                }
            }
            0xA4 | 0xA6 => {
                if mask & 0x00FF != 0 {
                    self.fifo_b.push_byte(value as u8);
                }
                if mask & 0xFF00 != 0 {
                    self.fifo_b.push_byte((value >> 8) as u8);
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apu() -> Apu {
        Apu::new(SharedGbaScheduler::default())
    }

    #[test]
    fn disabled_apu_outputs_silence_at_the_bias_midpoint() {
        let mut apu = apu();
        apu.schedule_sampling();
        apu.scheduler.skip_to_next();
        apu.scheduler.pop_due();
        apu.sample(0);

        let mut consumer = apu.take_consumer().unwrap();
        let left = consumer.pop().unwrap();
        let right = consumer.pop().unwrap();
        assert!(left < -0.99 && right < -0.99, "master off pushes raw zero level");
    }

    #[test]
    fn fifo_timer_select_routes_overflows() {
        let mut apu = apu();
        apu.reg_write16(0x82, 0x0400, 0xFFFF); // FIFO A on timer 1

        apu.fifo_write_word(super::super::dma::FIFO_A_ADDR, 0x0403_0201);

        let (refill_a, _) = apu.timer_overflow(0);
        assert!(!refill_a, "timer 0 should not clock FIFO A");

        let (refill_a, _) = apu.timer_overflow(1);
        assert!(refill_a, "4 buffered bytes are below the refill mark");
        assert_eq!(apu.fifo_a.sample(false), 0x01 * 2);
    }

    #[test]
    fn soundcnt_x_reports_live_channels() {
        let mut apu = apu();
        apu.reg_write16(0x62, 0xF000, 0xFFFF);
        apu.reg_write16(0x64, 0x8000, 0xFFFF);

        let value = apu.reg_read16(0x84).unwrap();
        assert_eq!(value & 0x1, 0x1, "channel 1 should report active");
    }
}
