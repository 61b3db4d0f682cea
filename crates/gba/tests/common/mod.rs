use gba::{Gba, GbaVideoOutput, NoopGbaVideoOutput};

/// Builds a console running the given ARM opcodes from the cartridge entry
/// point, BIOS-less (so execution starts at 0x08000000 in System mode).
pub fn gba_with_program(code: &[u32]) -> Gba {
    let mut rom = Vec::with_capacity(code.len() * 4 + 192);
    for &word in code {
        rom.extend_from_slice(&word.to_le_bytes());
    }
    // Pad so backup detection and header reads have something to look at.
    rom.resize(rom.len().max(192), 0);

    let mut gba = Gba::new();
    gba.set_gamepak(rom).expect("test ROM should be accepted");
    gba
}

/// An idle loop: `b .`
pub const SPIN: u32 = 0xEAFFFFFE;

/// Steps until `done` returns true, panicking if it never does.
pub fn step_until(gba: &mut Gba, mut done: impl FnMut(&mut Gba) -> bool) {
    for _ in 0..1_000_000 {
        if done(gba) {
            return;
        }
        gba.step(&mut NoopGbaVideoOutput);
    }
    panic!("condition never became true");
}

/// Collects rendered lines into a full frame for pixel assertions.
pub struct FrameCollector {
    pub lines: Vec<Vec<u16>>,
}

impl FrameCollector {
    pub fn new() -> Self {
        FrameCollector {
            lines: vec![Vec::new(); 160],
        }
    }
}

impl GbaVideoOutput for FrameCollector {
    fn gba_line_ready(&mut self, line: usize, data: &gba::video::LineBuffer) {
        self.lines[line] = data.to_vec();
    }
}
