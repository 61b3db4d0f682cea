use byteorder::{ByteOrder, LittleEndian};

use super::{
    line::{GbaLine, Pixel, PixelSource},
    registers::RegBgcnt,
    RenderContext, VISIBLE_LINE_WIDTH,
};

const SCREENBLOCK_SIZE: usize = 0x800;
const CHARBLOCK_SIZE: usize = 0x4000;

/// Renders one scanline of a regular (text mode) tiled background into the
/// line's candidate stacks.
pub(super) fn render(
    line: &mut GbaLine,
    bg: usize,
    control: RegBgcnt,
    scanline: u32,
    context: &RenderContext,
) {
    let hofs = u32::from(context.registers.bg_hofs[bg]) & 0x1FF;
    let vofs = u32::from(context.registers.bg_vofs[bg]) & 0x1FF;

    let width = if control.screen_size() & 0b01 != 0 { 512 } else { 256 };
    let height = if control.screen_size() & 0b10 != 0 { 512 } else { 256 };

    let mut x = hofs % width;
    let y = (scanline + vofs) % height;

    // Maps taller than 256 pixels store their lower half one screenblock
    // later (two later for the 512x512 layout).
    let mut screen_base = control.screen_base_block() as usize * SCREENBLOCK_SIZE;
    if y > 255 {
        screen_base += SCREENBLOCK_SIZE;
        if width == 512 {
            screen_base += SCREENBLOCK_SIZE;
        }
    }

    let char_base = control.char_base_block() as usize * CHARBLOCK_SIZE;
    let map_y = (y / 8) % 32;
    let source = PixelSource::bg(bg);
    let priority = control.priority() as u8;

    for dot in 0..VISIBLE_LINE_WIDTH {
        if line.window(dot).bg_enabled[bg] {
            let map_x = x / 8;
            let block = screen_base + if map_x > 31 { SCREENBLOCK_SIZE } else { 0 };
            let entry_offset = block + ((map_y * 32 + map_x % 32) * 2) as usize;
            let entry = LittleEndian::read_u16(&context.vram[entry_offset..]);

            let tile = usize::from(entry & 0x3FF);
            let hflip = entry & 0x0400 != 0;
            let vflip = entry & 0x0800 != 0;

            let tile_x = if hflip { (x % 8) ^ 7 } else { x % 8 } as usize;
            let tile_y = if vflip { (y % 8) ^ 7 } else { y % 8 } as usize;

            if control.color_256() {
                let tile_address = char_base + tile * 64;
                // Tiles spilling past the end of BG character memory draw
                // nothing.
                if tile_address + 64 <= 0x10000 {
                    let index = context.vram[tile_address + tile_y * 8 + tile_x];
                    line.push(
                        dot,
                        Pixel::new(
                            source,
                            context.palette_color(u32::from(index)),
                            priority,
                            index == 0,
                        ),
                    );
                }
            } else {
                let tile_address = char_base + tile * 32;
                if tile_address + 32 <= 0x10000 {
                    let pair = context.vram[tile_address + tile_y * 4 + tile_x / 2];
                    let nibble = if tile_x % 2 == 0 { pair & 0x0F } else { pair >> 4 };
                    let bank = (entry >> 12) & 0xF;
                    let index = u32::from(bank) * 16 + u32::from(nibble);
                    line.push(
                        dot,
                        Pixel::new(
                            source,
                            context.palette_color(if nibble == 0 { 0 } else { index }),
                            priority,
                            nibble == 0,
                        ),
                    );
                }
            }
        }

        x = (x + 1) % width;
    }
}
