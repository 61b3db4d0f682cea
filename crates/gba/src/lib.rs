mod hardware;
pub mod memory;
mod scheduler;

use arm::{CpsrFlag, Cpu, CpuException, CpuMode, InstructionSet};
use hardware::video::VideoMemory;
pub use hardware::{
    audio, cartridge, dma, keypad, system_control, timers, video, GbaMemoryMappedHardware,
};
use hardware::video::LineBuffer;
use hardware::{dma::DmaTrigger, system_control::InterruptSource};
use scheduler::{EventKind, SharedGbaScheduler};

pub const BIOS_LEN: usize = memory::BIOS_SIZE;
pub const MAX_ROM_LEN: usize = cartridge::MAX_ROM_SIZE;

/// Errors reported back to the host. Everything the guest program can cause
/// stays inside the emulation as architectural behavior; only bad host
/// inputs end up here.
#[derive(Debug, thiserror::Error)]
pub enum GbaError {
    #[error("BIOS image must be exactly {BIOS_LEN} bytes, got {0}")]
    InvalidBios(usize),
    #[error("cartridge ROM must be between 1 byte and 32 MiB, got {0} bytes")]
    InvalidRom(usize),
}

/// Receives finished scanlines as the PPU produces them. Hosts that only
/// care about whole frames can ignore this and read [`Gba::frame`] instead.
pub trait GbaVideoOutput {
    fn gba_line_ready(&mut self, line: usize, data: &LineBuffer);
}

pub struct NoopGbaVideoOutput;

impl GbaVideoOutput for NoopGbaVideoOutput {
    fn gba_line_ready(&mut self, _line: usize, _data: &LineBuffer) {
        // NOOP
    }
}

pub struct Gba {
    pub cpu: Cpu,
    pub mapped: GbaMemoryMappedHardware,
    scheduler: SharedGbaScheduler,
    bios_loaded: bool,
    running: bool,
}

impl Gba {
    pub fn new() -> Self {
        let scheduler = SharedGbaScheduler::default();
        let mut mapped = GbaMemoryMappedHardware::new(scheduler.clone());
        let cpu = Cpu::new(InstructionSet::Arm, CpuMode::System, &mut mapped);

        Self {
            cpu,
            mapped,
            scheduler,
            bios_loaded: false,
            running: false,
        }
    }

    /// Installs the 16 KiB BIOS image. Optional: without one, reset drops
    /// the machine directly at the cartridge entry point with the register
    /// state the BIOS would have left behind.
    pub fn set_bios(&mut self, bios: &[u8]) -> Result<(), GbaError> {
        if bios.len() != BIOS_LEN {
            return Err(GbaError::InvalidBios(bios.len()));
        }

        self.mapped.bios.copy_from_slice(bios);
        self.bios_loaded = true;
        Ok(())
    }

    pub fn set_gamepak(&mut self, rom: Vec<u8>) -> Result<(), GbaError> {
        if rom.is_empty() || rom.len() > MAX_ROM_LEN {
            return Err(GbaError::InvalidRom(rom.len()));
        }

        self.mapped.cart.load(rom);
        self.reset();
        Ok(())
    }

    /// Hard reset. With a BIOS the CPU starts at the reset vector in
    /// Supervisor mode with interrupts off; without one the register bank
    /// is set to the post-BIOS snapshot and execution starts at the
    /// cartridge entry.
    pub fn reset(&mut self) {
        self.scheduler.clear();
        self.mapped.reset();

        if self.bios_loaded {
            self.cpu = Cpu::uninitialized(InstructionSet::Arm, CpuMode::Supervisor);
            self.cpu.registers.set_flag(CpsrFlag::I);
            self.cpu.registers.set_flag(CpsrFlag::F);
            self.cpu.branch(0x0000_0000, &mut self.mapped);
        } else {
            self.cpu = Cpu::uninitialized(InstructionSet::Arm, CpuMode::System);
            self.cpu.registers.write(13, 0x0300_7F00);
            self.cpu
                .registers
                .write_with_mode(CpuMode::Irq, 13, 0x0300_7FA0);
            self.cpu
                .registers
                .write_with_mode(CpuMode::Supervisor, 13, 0x0300_7FE0);
            self.cpu.branch(0x0800_0000, &mut self.mapped);
        }

        self.running = self.bios_loaded || self.mapped.cart.loaded();
    }

    /// Runs one CPU instruction (or, with the CPU halted or the bus held by
    /// DMA, jumps to the next event) and fires everything that came due.
    pub fn step(&mut self, video_out: &mut dyn GbaVideoOutput) {
        if !self.running {
            return;
        }

        if self.mapped.system_control.halted() || self.mapped.dma.active() {
            self.scheduler.skip_to_next();
        } else {
            let cycles = self.cpu.step(&mut self.mapped);
            self.scheduler.step(cycles);
        }

        while let Some((event, late)) = self.scheduler.pop_due() {
            self.handle_event(event, late, video_out);
        }
    }

    /// Runs emulation until the PPU finishes the frame in progress.
    pub fn run_frame(&mut self, video_out: &mut dyn GbaVideoOutput) {
        if !self.running {
            return;
        }

        let frame = self.mapped.video.frame;
        while self.running && self.mapped.video.frame == frame {
            self.step(video_out);
        }
    }

    fn handle_event(&mut self, event: EventKind, late: u32, video_out: &mut dyn GbaVideoOutput) {
        match event {
            EventKind::HBlank => {
                let memory = VideoMemory {
                    palram: &self.mapped.palram,
                    vram: &self.mapped.vram,
                    oam: &self.mapped.oam,
                };
                let rendered =
                    self.mapped
                        .video
                        .hblank(late, memory, &mut self.mapped.system_control);

                if rendered {
                    let scanline = usize::from(self.mapped.video.scanline());
                    video_out.gba_line_ready(scanline, self.mapped.video.line_pixels());

                    self.mapped.dma_schedule_pending(DmaTrigger::HBlank);
                    if (2..162).contains(&(scanline as u32)) {
                        self.mapped.dma_schedule_pending(DmaTrigger::VideoCapture);
                    }
                }
            }
            EventKind::VBlank => {
                self.mapped.video.vblank(late, &mut self.mapped.system_control);
                if self.mapped.video.scanline() == video::VBLANK_LINE {
                    self.mapped.dma_schedule_pending(DmaTrigger::VBlank);
                }
            }
            EventKind::VDraw => {
                self.mapped.video.vdraw(late, &mut self.mapped.system_control);
            }
            EventKind::Timer0Overflow => self.timer_overflow(0, late),
            EventKind::Timer1Overflow => self.timer_overflow(1, late),
            EventKind::Timer2Overflow => self.timer_overflow(2, late),
            EventKind::Timer3Overflow => self.timer_overflow(3, late),
            EventKind::Dma0Complete => self.mapped.dma_complete(0),
            EventKind::Dma1Complete => self.mapped.dma_complete(1),
            EventKind::Dma2Complete => self.mapped.dma_complete(2),
            EventKind::Dma3Complete => self.mapped.dma_complete(3),
            EventKind::Irq => {
                // Armed three cycles ago; only taken if the CPU still has
                // IRQs enabled when it fires.
                if !self.cpu.registers.get_flag(CpsrFlag::I) {
                    let cycles = self.cpu.exception(CpuException::Irq, &mut self.mapped);
                    self.scheduler.step(cycles);
                }
            }
            _ => self.mapped.apu.handle_event(event, late),
        }
    }

    fn timer_overflow(&mut self, index: usize, late: u32) {
        let overflows = self.mapped.timers.overflow(index, late);

        if self.mapped.timers.irq_enabled(index) {
            self.mapped
                .system_control
                .request_interrupt(InterruptSource::timer(index));
        }

        if index < 3
            && self.mapped.timers.enabled(index + 1)
            && self.mapped.timers.cascading(index + 1)
        {
            self.mapped.timers.cascade_increment(index + 1, overflows);
        }

        // Timers 0 and 1 clock the direct-sound FIFOs.
        if index <= 1 {
            let (refill_a, refill_b) = self.mapped.apu.timer_overflow(index);
            if refill_a {
                self.mapped.dma_schedule_pending(DmaTrigger::FifoA);
            }
            if refill_b {
                self.mapped.dma_schedule_pending(DmaTrigger::FifoB);
            }
        }
    }

    /// Latches the host gamepad state: bits 0-9 = A, B, Select, Start,
    /// Right, Left, Up, Down, R, L (set = pressed).
    pub fn set_keys(&mut self, pressed: u16) {
        if self.mapped.keypad.set_pressed(pressed) {
            self.mapped
                .system_control
                .request_interrupt(InterruptSource::Keypad);
        }
    }

    /// The most recently completed 240x160 BGR555 frame.
    pub fn frame(&self) -> &video::ScreenBuffer {
        self.mapped.video.frame_buffer()
    }

    pub fn frame_count(&self) -> u64 {
        self.mapped.video.frame
    }

    /// Hands out the audio ring consumer for the host audio thread. The
    /// emulation side keeps producing regardless of whether anyone drains.
    pub fn take_audio_consumer(&mut self) -> Option<ringbuf::Consumer<f32>> {
        self.mapped.apu.take_consumer()
    }

    /// Total emulated cycles since reset.
    pub fn cycles(&self) -> u64 {
        self.scheduler.now()
    }

    /// Raw backup-medium bytes for the host to write out as the save file.
    /// `None` when the cartridge has no backup chip.
    pub fn backup(&self) -> Option<&[u8]> {
        self.mapped.cart.backup_data()
    }

    /// Restores a previously saved backup image. Returns false when the
    /// size does not match the detected backup medium.
    pub fn load_backup(&mut self, bytes: &[u8]) -> bool {
        self.mapped.cart.load_backup_data(bytes)
    }
}

impl Default for Gba {
    fn default() -> Self {
        Self::new()
    }
}

// SAFETY: the scheduler handle is shared only between the Gba and the
// components it owns; it never escapes the struct.
unsafe impl Send for Gba {}
