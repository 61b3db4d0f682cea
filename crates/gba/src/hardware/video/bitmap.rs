use byteorder::{ByteOrder, LittleEndian};

use super::{
    line::{GbaLine, Pixel, PixelSource},
    RenderContext, VISIBLE_LINE_WIDTH,
};

/// Mode 3: one 240x160 frame of raw BGR555 on BG2.
pub(super) fn render_mode3(line: &mut GbaLine, scanline: u32, context: &RenderContext) {
    let priority = context.registers.bgcnt[2].priority() as u8;
    let row = scanline as usize * VISIBLE_LINE_WIDTH * 2;

    for dot in 0..VISIBLE_LINE_WIDTH {
        if line.window(dot).bg_enabled[2] {
            let color = LittleEndian::read_u16(&context.vram[row + dot * 2..]);
            line.push(dot, Pixel::new(PixelSource::Bg2, color, priority, false));
        }
    }
}

/// Mode 4: one 240x160 frame of 8-bit palette indices on BG2, double
/// buffered by the DISPCNT frame select.
pub(super) fn render_mode4(line: &mut GbaLine, scanline: u32, context: &RenderContext) {
    let priority = context.registers.bgcnt[2].priority() as u8;
    let page = if context.registers.dispcnt.frame_select() {
        0xA000
    } else {
        0
    };
    let row = page + scanline as usize * VISIBLE_LINE_WIDTH;

    for dot in 0..VISIBLE_LINE_WIDTH {
        if line.window(dot).bg_enabled[2] {
            let index = context.vram[row + dot];
            line.push(
                dot,
                Pixel::new(
                    PixelSource::Bg2,
                    context.palette_color(u32::from(index)),
                    priority,
                    index == 0,
                ),
            );
        }
    }
}

/// Mode 5: a 160x128 BGR555 frame on BG2 with frame select; dots outside
/// the small frame show nothing.
pub(super) fn render_mode5(line: &mut GbaLine, scanline: u32, context: &RenderContext) {
    const FRAME_WIDTH: usize = 160;
    const FRAME_HEIGHT: u32 = 128;

    if scanline >= FRAME_HEIGHT {
        return;
    }

    let priority = context.registers.bgcnt[2].priority() as u8;
    let page = if context.registers.dispcnt.frame_select() {
        0xA000
    } else {
        0
    };
    let row = page + scanline as usize * FRAME_WIDTH * 2;

    for dot in 0..FRAME_WIDTH {
        if line.window(dot).bg_enabled[2] {
            let color = LittleEndian::read_u16(&context.vram[row + dot * 2..]);
            line.push(dot, Pixel::new(PixelSource::Bg2, color, priority, false));
        }
    }
}
