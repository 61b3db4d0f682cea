use super::{
    line::{GbaLine, Pixel, PixelSource},
    registers::RegBgcnt,
    RenderContext, VISIBLE_LINE_WIDTH,
};

const SCREENBLOCK_SIZE: usize = 0x800;
const CHARBLOCK_SIZE: usize = 0x4000;

/// Renders one scanline of an affine (rotation/scaling) background. The
/// caller supplies the running reference point; PA/PC step it per dot.
pub(super) fn render(
    line: &mut GbaLine,
    bg: usize,
    control: RegBgcnt,
    reference: (i32, i32),
    context: &RenderContext,
) {
    let map_size_tiles: i32 = match control.screen_size() {
        0 => 16,
        1 => 32,
        2 => 64,
        _ => 128,
    };
    let map_size_pixels = map_size_tiles * 8;

    let pa = context.registers.affine_param(bg, 0);
    let pc = context.registers.affine_param(bg, 2);

    let (mut affine_x, mut affine_y) = reference;

    let wrap = control.overflow_wrap();
    let priority = control.priority() as u8;
    let source = PixelSource::bg(bg);
    let screen_base = control.screen_base_block() as usize * SCREENBLOCK_SIZE;
    let char_base = control.char_base_block() as usize * CHARBLOCK_SIZE;

    for dot in 0..VISIBLE_LINE_WIDTH {
        if line.window(dot).bg_enabled[bg] {
            let mut texture_x = affine_x >> 8;
            let mut texture_y = affine_y >> 8;

            let in_map = (0..map_size_pixels).contains(&texture_x)
                && (0..map_size_pixels).contains(&texture_y);

            if wrap || in_map {
                texture_x = texture_x.rem_euclid(map_size_pixels);
                texture_y = texture_y.rem_euclid(map_size_pixels);

                // Affine maps use single-byte tile entries and 8bpp tiles.
                let map_index = (texture_y / 8) * map_size_tiles + texture_x / 8;
                let tile = usize::from(context.vram[screen_base + map_index as usize]);
                let tile_address =
                    char_base + tile * 64 + (texture_y % 8) as usize * 8 + (texture_x % 8) as usize;
                let index = context.vram[tile_address];

                line.push(
                    dot,
                    Pixel::new(
                        source,
                        context.palette_color(u32::from(index)),
                        priority,
                        index == 0,
                    ),
                );
            } else {
                line.push(dot, Pixel::new(source, 0, priority, true));
            }
        }

        affine_x += pa;
        affine_y += pc;
    }
}
