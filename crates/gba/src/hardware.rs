pub mod audio;
pub mod cartridge;
pub mod dma;
pub mod keypad;
pub mod system_control;
pub mod timers;
pub mod video;

use crate::{
    memory::{BIOS_SIZE, EWRAM_SIZE, IWRAM_SIZE, OAM_SIZE, PAL_SIZE, VRAM_SIZE},
    scheduler::SharedGbaScheduler,
};

use self::{
    audio::Apu, cartridge::Cartridge, dma::Dmas, keypad::Keypad, system_control::SystemControl,
    timers::Timers, video::GbaVideo,
};

/// Everything the CPU can reach over the bus: the memory arrays plus every
/// memory mapped component. The bus dispatch itself lives in
/// [`crate::memory`].
pub struct GbaMemoryMappedHardware {
    pub bios: Box<[u8; BIOS_SIZE]>,
    pub ewram: Box<[u8; EWRAM_SIZE]>,
    pub iwram: Box<[u8; IWRAM_SIZE]>,

    pub palram: Box<[u8; PAL_SIZE]>,
    pub vram: Box<[u8; VRAM_SIZE]>,
    pub oam: Box<[u8; OAM_SIZE]>,

    pub video: Box<GbaVideo>,
    pub apu: Box<Apu>,
    pub timers: Timers,
    pub dma: Dmas,
    pub keypad: Keypad,
    pub system_control: SystemControl,
    pub cart: Cartridge,

    /// The last value seen on the bus, for open-bus reads.
    pub(crate) last_read_value: u32,
    /// The last value successfully fetched from BIOS, returned for BIOS
    /// reads issued while executing outside of it.
    pub(crate) last_bios_fetch: u32,
    /// Address of the most recent opcode fetch; decides whether the CPU is
    /// currently executing BIOS code.
    pub(crate) last_fetch_address: u32,

    pub(crate) scheduler: SharedGbaScheduler,
}

impl GbaMemoryMappedHardware {
    pub(crate) fn new(scheduler: SharedGbaScheduler) -> Self {
        Self {
            bios: Box::new([0; BIOS_SIZE]),
            ewram: Box::new([0; EWRAM_SIZE]),
            iwram: Box::new([0; IWRAM_SIZE]),

            palram: Box::new([0; PAL_SIZE]),
            vram: Box::new([0; VRAM_SIZE]),
            oam: Box::new([0; OAM_SIZE]),

            video: Box::new(GbaVideo::new(scheduler.clone())),
            apu: Box::new(Apu::new(scheduler.clone())),
            timers: Timers::new(scheduler.clone()),
            dma: Dmas::new(scheduler.clone()),
            keypad: Keypad::default(),
            system_control: SystemControl::new(scheduler.clone()),
            cart: Cartridge::default(),

            last_read_value: 0,
            last_bios_fetch: 0,
            last_fetch_address: 0,

            scheduler,
        }
    }

    /// Power-on state. Work RAM is preserved deliberately; real hardware
    /// does not clear it on reset either.
    pub(crate) fn reset(&mut self) {
        tracing::debug!("resetting GBA hardware");

        self.last_read_value = 0;
        self.last_bios_fetch = 0;
        self.last_fetch_address = 0;

        self.video.reset();
        self.apu.reset();
        self.timers.reset();
        self.dma.reset();
        self.keypad.reset();
        self.system_control.reset();
        self.cart.reset();

        // The PPU drives itself from here on; everything else schedules its
        // own events on demand.
        self.scheduler.schedule(crate::scheduler::EventKind::HBlank, 960);
        self.apu.schedule_sampling();
    }

    /// Whether the CPU is currently executing out of the BIOS region, which
    /// gates data reads of the BIOS itself.
    #[inline]
    pub(crate) fn executing_bios(&self) -> bool {
        self.last_fetch_address < BIOS_SIZE as u32
    }
}
