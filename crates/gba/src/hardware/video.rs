mod affine;
mod bitmap;
mod line;
mod obj;
pub mod registers;
mod text;

use byteorder::{ByteOrder, LittleEndian};
use line::{GbaLine, WindowSettings};
use registers::GbaVideoRegisters;

use crate::{
    memory::{IoRegister, OAM_SIZE, PAL_SIZE, VRAM_SIZE},
    scheduler::{EventKind, SharedGbaScheduler},
};

use super::system_control::{InterruptSource, SystemControl};

pub const VISIBLE_LINE_WIDTH: usize = 240;
pub const VISIBLE_LINE_COUNT: usize = 160;
pub const VISIBLE_PIXELS: usize = VISIBLE_LINE_WIDTH * VISIBLE_LINE_COUNT;

pub type LineBuffer = [u16; VISIBLE_LINE_WIDTH];
pub type ScreenBuffer = [u16; VISIBLE_PIXELS];

/// Scanline timing: 960 cycles of draw, a 46 cycle pad before the HBlank
/// flag latches, then 226 cycles of blank. 160 visible lines, 68 blanked.
const HBLANK_FLAG_CYCLES: u32 = 226;
const VDRAW_CYCLES: u32 = 960;
const HBLANK_PAD_CYCLES: u32 = 46;

pub const LINES_TOTAL: u16 = 228;
pub const VBLANK_LINE: u16 = 160;

/// Everything outside the PPU that a scanline render reads.
pub(crate) struct VideoMemory<'a> {
    pub palram: &'a [u8; PAL_SIZE],
    pub vram: &'a [u8; VRAM_SIZE],
    pub oam: &'a [u8; OAM_SIZE],
}

/// The renderers' view: guest video memory plus the register file.
pub(crate) struct RenderContext<'a> {
    pub registers: &'a GbaVideoRegisters,
    pub palram: &'a [u8; PAL_SIZE],
    pub vram: &'a [u8; VRAM_SIZE],
    pub oam: &'a [u8; OAM_SIZE],
}

impl RenderContext<'_> {
    /// BG palette lookup.
    fn palette_color(&self, index: u32) -> u16 {
        LittleEndian::read_u16(&self.palram[index as usize * 2..])
    }
}

pub struct GbaVideo {
    pub registers: GbaVideoRegisters,
    scanline: u16,
    /// Frames completed since power-on.
    pub frame: u64,

    /// Whether window 0/1 are inside their Y range on the current scanline.
    /// Tracked incrementally: the top line turns a window on, the bottom
    /// line turns it off, so a wrapped range spans the frame seam.
    window_in_y_range: [bool; 2],

    /// Live affine reference points for BG2/BG3, advanced by (PB, PD) per
    /// scanline and re-latched at VBlank or on register writes.
    affine_reference: [[i32; 2]; 2],

    line: GbaLine,
    framebuffers: [Box<ScreenBuffer>; 2],
    /// Index of the buffer being drawn into; the other one is on screen.
    active_framebuffer: usize,

    scheduler: SharedGbaScheduler,
}

impl GbaVideo {
    pub(crate) fn new(scheduler: SharedGbaScheduler) -> GbaVideo {
        GbaVideo {
            registers: GbaVideoRegisters::default(),
            scanline: 0,
            frame: 0,
            window_in_y_range: [false; 2],
            affine_reference: [[0; 2]; 2],
            line: GbaLine::default(),
            framebuffers: [Box::new([0; VISIBLE_PIXELS]), Box::new([0; VISIBLE_PIXELS])],
            active_framebuffer: 0,
            scheduler,
        }
    }

    pub(crate) fn reset(&mut self) {
        self.registers = GbaVideoRegisters::default();
        self.scanline = 0;
        self.frame = 0;
        self.window_in_y_range = [false; 2];
        self.affine_reference = [[0; 2]; 2];
        self.scheduler.unschedule(EventKind::HBlank);
        self.scheduler.unschedule(EventKind::VBlank);
        self.scheduler.unschedule(EventKind::VDraw);
    }

    #[inline]
    pub fn scanline(&self) -> u16 {
        self.scanline
    }

    /// The most recently completed frame.
    pub fn frame_buffer(&self) -> &ScreenBuffer {
        &self.framebuffers[self.active_framebuffer ^ 1]
    }

    /// The scanline most recently rendered into the working frame.
    pub fn line_pixels(&self) -> &LineBuffer {
        let row = usize::from(self.scanline.min(VBLANK_LINE - 1)) * VISIBLE_LINE_WIDTH;
        self.framebuffers[self.active_framebuffer][row..row + VISIBLE_LINE_WIDTH]
            .try_into()
            .unwrap()
    }

    /// The HBlank event: latch the flag, render the just-drawn scanline,
    /// and line up the transition event that ends the blank.
    pub(crate) fn hblank(
        &mut self,
        late: u32,
        memory: VideoMemory,
        system_control: &mut SystemControl,
    ) -> bool {
        self.registers.dispstat.set_hblank(true);

        if self.registers.dispstat.hblank_irq() {
            system_control.request_interrupt(InterruptSource::HBlank);
        }

        let next = if self.scanline < VBLANK_LINE - 1 || self.scanline == LINES_TOTAL - 1 {
            EventKind::VDraw
        } else {
            EventKind::VBlank
        };
        self.scheduler
            .schedule(next, HBLANK_FLAG_CYCLES.saturating_sub(late));

        if self.scanline < VBLANK_LINE {
            self.render_scanline(&memory);
            self.advance_affine_references();
            true
        } else {
            false
        }
    }

    /// A scanline transition inside the vertical blank (including the entry
    /// transition at line 160 and the flag drop on the final line).
    pub(crate) fn vblank(&mut self, late: u32, system_control: &mut SystemControl) {
        self.scanline += 1;
        self.registers.dispstat.set_hblank(false);

        if self.scanline == VBLANK_LINE {
            self.registers.dispstat.set_vblank(true);
            self.frame += 1;
            self.active_framebuffer ^= 1;

            if self.registers.dispstat.vblank_irq() {
                system_control.request_interrupt(InterruptSource::VBlank);
            }

            // The reference point registers re-latch for the coming frame.
            for bg in 2..4 {
                self.affine_reference[bg - 2] = [
                    self.registers.reference_point(bg, 0),
                    self.registers.reference_point(bg, 1),
                ];
            }
        } else if self.scanline == LINES_TOTAL - 1 {
            self.registers.dispstat.set_vblank(false);
        }

        self.check_vcount(system_control);
        self.update_window_y_state();

        self.scheduler.schedule(
            EventKind::HBlank,
            VDRAW_CYCLES.saturating_sub(late) + HBLANK_PAD_CYCLES,
        );
    }

    /// A visible scanline begins (or line 227 wraps to 0).
    pub(crate) fn vdraw(&mut self, late: u32, system_control: &mut SystemControl) {
        self.scanline += 1;
        if self.scanline == LINES_TOTAL {
            self.scanline = 0;
        }

        self.registers.dispstat.set_hblank(false);
        self.check_vcount(system_control);
        self.update_window_y_state();

        self.scheduler.schedule(
            EventKind::HBlank,
            VDRAW_CYCLES.saturating_sub(late) + HBLANK_PAD_CYCLES,
        );
    }

    fn check_vcount(&mut self, system_control: &mut SystemControl) {
        let matched = self.scanline == self.registers.dispstat.vcount_setting();
        self.registers.dispstat.set_vcount_match(matched);

        if matched && self.registers.dispstat.vcount_irq() {
            system_control.request_interrupt(InterruptSource::VCountMatch);
        }
    }

    fn update_window_y_state(&mut self) {
        for window in 0..2 {
            let top = self.registers.win_v[window] >> 8;
            let bottom = self.registers.win_v[window] & 0xFF;

            if self.scanline == top {
                self.window_in_y_range[window] = true;
            }
            if self.scanline == bottom {
                self.window_in_y_range[window] = false;
            }
        }
    }

    fn advance_affine_references(&mut self) {
        for bg in 2..4 {
            self.affine_reference[bg - 2][0] += self.registers.affine_param(bg, 1);
            self.affine_reference[bg - 2][1] += self.registers.affine_param(bg, 3);
        }
    }

    fn render_scanline(&mut self, memory: &VideoMemory) {
        let mut backdrop = LittleEndian::read_u16(&memory.palram[0..]);
        let force_blank = self.registers.dispcnt.forced_blank();
        let scanline = u32::from(self.scanline);

        let context = RenderContext {
            registers: &self.registers,
            palram: memory.palram,
            vram: memory.vram,
            oam: memory.oam,
        };
        let line = &mut self.line;
        let dispcnt = context.registers.dispcnt;

        if !force_blank {
            if dispcnt.any_window() {
                line.init_windows(context.registers.winout.low_settings());

                if dispcnt.display_obj() && dispcnt.obj_window_display() {
                    obj::evaluate(
                        line,
                        scanline,
                        &context,
                        Some(context.registers.winout.high_settings()),
                    );
                }

                // Window 1, then window 0 on top of it.
                if dispcnt.window1_display() && self.window_in_y_range[1] {
                    let left = (context.registers.win_h[1] >> 8) as u8;
                    let right = context.registers.win_h[1] as u8;
                    line.stamp_window_span(left, right, context.registers.winin.high_settings());
                }

                if dispcnt.window0_display() && self.window_in_y_range[0] {
                    let left = (context.registers.win_h[0] >> 8) as u8;
                    let right = context.registers.win_h[0] as u8;
                    line.stamp_window_span(left, right, context.registers.winin.low_settings());
                }
            } else {
                line.init_windows(WindowSettings::ALL_ENABLED);
            }

            if dispcnt.display_obj() {
                line.clear_sprites();
                obj::evaluate(line, scanline, &context, None);
                line.merge_sprites();
            }

            match dispcnt.bg_mode() {
                0 => {
                    for bg in 0..4 {
                        if dispcnt.display_bg(bg) {
                            text::render(line, bg, context.registers.bgcnt[bg], scanline, &context);
                        }
                    }
                }
                1 => {
                    for bg in 0..2 {
                        if dispcnt.display_bg(bg) {
                            text::render(line, bg, context.registers.bgcnt[bg], scanline, &context);
                        }
                    }
                    if dispcnt.display_bg2() {
                        affine::render(
                            line,
                            2,
                            context.registers.bgcnt[2],
                            (self.affine_reference[0][0], self.affine_reference[0][1]),
                            &context,
                        );
                    }
                }
                2 => {
                    if dispcnt.display_bg2() {
                        affine::render(
                            line,
                            2,
                            context.registers.bgcnt[2],
                            (self.affine_reference[0][0], self.affine_reference[0][1]),
                            &context,
                        );
                    }
                    if dispcnt.display_bg3() {
                        affine::render(
                            line,
                            3,
                            context.registers.bgcnt[3],
                            (self.affine_reference[1][0], self.affine_reference[1][1]),
                            &context,
                        );
                    }
                }
                3 => {
                    if dispcnt.display_bg2() {
                        bitmap::render_mode3(line, scanline, &context);
                    }
                }
                4 => {
                    if dispcnt.display_bg2() {
                        bitmap::render_mode4(line, scanline, &context);
                    }
                }
                5 => {
                    if dispcnt.display_bg2() {
                        bitmap::render_mode5(line, scanline, &context);
                    }
                }
                // Prohibited modes show white.
                _ => backdrop = 0xFFFF,
            }
        }

        let row = usize::from(self.scanline) * VISIBLE_LINE_WIDTH;
        self.line.compose(
            &mut self.framebuffers[self.active_framebuffer][row..row + VISIBLE_LINE_WIDTH],
            backdrop,
            force_blank,
            self.registers.bldcnt,
            self.registers.bldalpha,
            self.registers.bldy,
        );
    }

    pub(crate) fn reg_read16(&self, offset: u32) -> Option<u16> {
        match offset {
            0x00 => Some(self.registers.dispcnt.read()),
            0x02 => Some(self.registers.green_swap),
            0x04 => Some(self.registers.dispstat.read()),
            0x06 => Some(self.scanline),
            0x08..=0x0E => Some(self.registers.bgcnt[((offset - 0x08) / 2) as usize].read()),
            0x48 => Some(self.registers.winin.read()),
            0x4A => Some(self.registers.winout.read()),
            0x50 => Some(self.registers.bldcnt.read()),
            0x52 => Some(self.registers.bldalpha.read()),
            // Scroll, affine, window dimension, mosaic and BLDY registers
            // are write-only.
            _ => None,
        }
    }

    pub(crate) fn reg_write16(&mut self, offset: u32, value: u16, mask: u16) {
        match offset {
            0x00 => {
                let merged = (self.registers.dispcnt.read() & !mask) | (value & mask);
                self.registers.dispcnt.write(merged);
            }
            0x02 => self.registers.green_swap = (self.registers.green_swap & !mask) | (value & mask),
            0x04 => {
                let merged = (u16::from(self.registers.dispstat) & !mask) | (value & mask);
                self.registers.dispstat.write(merged);
            }
            // VCOUNT is read-only.
            0x06 => {}
            0x08..=0x0E => {
                let index = ((offset - 0x08) / 2) as usize;
                let merged = (self.registers.bgcnt[index].read() & !mask) | (value & mask);
                self.registers.bgcnt[index].write(merged);
            }
            0x10..=0x1E => {
                let index = ((offset - 0x10) / 4) as usize;
                let target = if offset & 0x2 == 0 {
                    &mut self.registers.bg_hofs[index]
                } else {
                    &mut self.registers.bg_vofs[index]
                };
                *target = (*target & !mask) | (value & mask);
            }
            0x20..=0x26 | 0x30..=0x36 => {
                let bg = if offset < 0x30 { 0 } else { 1 };
                let param = ((offset & 0x6) / 2) as usize;
                let target = &mut self.registers.bg_affine_params[bg][param];
                *target = (*target & !mask) | (value & mask);
            }
            0x28..=0x2E | 0x38..=0x3E => {
                let bg = if offset < 0x38 { 0 } else { 1 };
                let axis = ((offset & 0x4) / 4) as usize;
                let target = &mut self.registers.bg_ref_point[bg][axis];

                if offset & 0x2 == 0 {
                    *target = (*target & !u32::from(mask)) | u32::from(value & mask);
                } else {
                    *target = (*target & !(u32::from(mask) << 16))
                        | (u32::from(value & mask) << 16);
                }

                // Writes take effect on the very next scanline.
                self.affine_reference[bg][axis] = self.registers.reference_point(bg + 2, axis);
            }
            0x40..=0x42 => {
                let index = ((offset - 0x40) / 2) as usize;
                let target = &mut self.registers.win_h[index];
                *target = (*target & !mask) | (value & mask);
            }
            0x44..=0x46 => {
                let index = ((offset - 0x44) / 2) as usize;
                let target = &mut self.registers.win_v[index];
                *target = (*target & !mask) | (value & mask);
            }
            0x48 => {
                let merged = (self.registers.winin.read() & !mask) | (value & mask);
                self.registers.winin.write(merged);
            }
            0x4A => {
                let merged = (self.registers.winout.read() & !mask) | (value & mask);
                self.registers.winout.write(merged);
            }
            0x4C => self.registers.mosaic = (self.registers.mosaic & !mask) | (value & mask),
            0x50 => {
                let merged = (self.registers.bldcnt.read() & !mask) | (value & mask);
                self.registers.bldcnt.write(merged);
            }
            0x52 => {
                let merged = (self.registers.bldalpha.read() & !mask) | (value & mask);
                self.registers.bldalpha.write(merged);
            }
            0x54 => {
                let merged = (u16::from(self.registers.bldy) & !mask) | (value & mask);
                self.registers.bldy.write(merged);
            }
            _ => {}
        }
    }
}

#[inline]
pub const fn rgb5(r: u16, g: u16, b: u16) -> u16 {
    (r & 0x1F) | ((g & 0x1F) << 5) | ((b & 0x1F) << 10)
}
