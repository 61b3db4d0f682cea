use byteorder::{ByteOrder, LittleEndian};
use util::bits::BitOps;

use super::{
    line::{GbaLine, Pixel, PixelSource, WindowSettings},
    RenderContext, VISIBLE_LINE_WIDTH,
};

const OBJ_CHARBLOCK: usize = 0x10000;
const OBJ_PALETTE: usize = 0x200;

/// (width, height) by (shape, size). Shape 3 is illegal.
const DIMENSIONS: [[(i32, i32); 4]; 3] = [
    [(8, 8), (16, 16), (32, 32), (64, 64)],
    [(16, 8), (32, 8), (32, 16), (64, 32)],
    [(8, 16), (8, 32), (16, 32), (32, 64)],
];

struct OamEntry {
    y: i32,
    x: i32,
    width: i32,
    height: i32,
    affine: bool,
    double_size: bool,
    gfx_mode: u16,
    color_256: bool,
    hflip: bool,
    vflip: bool,
    matrix: usize,
    tile: usize,
    priority: u8,
    palette_bank: u16,
}

impl OamEntry {
    fn parse(oam: &[u8], index: usize) -> Option<OamEntry> {
        let attr0 = LittleEndian::read_u16(&oam[index * 8..]);
        let attr1 = LittleEndian::read_u16(&oam[index * 8 + 2..]);
        let attr2 = LittleEndian::read_u16(&oam[index * 8 + 4..]);

        let obj_mode = attr0.bits(8, 9);
        let gfx_mode = attr0.bits(10, 11);

        // Mode 2 disables the sprite; gfx mode 3 is illegal.
        if obj_mode == 2 || gfx_mode == 3 {
            return None;
        }

        let shape = attr0.bits(14, 15);
        if shape == 3 {
            return None;
        }

        let (width, height) = DIMENSIONS[shape as usize][attr1.bits(14, 15) as usize];

        // Y wraps at 256 (it is stored in 8 bits); X is a 9-bit signed
        // coordinate.
        let mut y = i32::from(attr0.bits(0, 7));
        if y >= 160 {
            y -= 256;
        }
        let x = (u32::from(attr1.bits(0, 8)).sign_extend(9)) as i32;

        Some(OamEntry {
            y,
            x,
            width,
            height,
            affine: obj_mode == 1 || obj_mode == 3,
            double_size: obj_mode == 3,
            gfx_mode,
            color_256: attr0.bit(13),
            hflip: attr1.bit(12),
            vflip: attr1.bit(13),
            matrix: attr1.bits(9, 13) as usize,
            tile: usize::from(attr2.bits(0, 9)),
            priority: attr2.bits(10, 11) as u8,
            palette_bank: attr2.bits(12, 15),
        })
    }

    fn covers_scanline(&self, scanline: i32) -> bool {
        // A double-size affine sprite occupies a bounding box twice its
        // nominal dimensions, anchored at the same corner.
        let bottom = if self.double_size {
            self.y + 2 * self.height - 1
        } else {
            self.y + self.height - 1
        };
        (self.y..=bottom).contains(&scanline)
    }
}

/// Walks all 128 OAM entries for the scanline. With `window_stamp` set this
/// is the OBJ-window pass: only gfx-mode-2 sprites participate and their
/// opaque texels stamp the window record instead of producing pixels. The
/// visible pass skips those same sprites.
pub(super) fn evaluate(
    line: &mut GbaLine,
    scanline: u32,
    context: &RenderContext,
    window_stamp: Option<WindowSettings>,
) {
    let one_dimensional = context.registers.dispcnt.obj_one_dimensional();
    let scanline = scanline as i32;

    for index in 0..128 {
        let Some(entry) = OamEntry::parse(context.oam, index) else {
            continue;
        };

        if (window_stamp.is_some()) != (entry.gfx_mode == 2) {
            continue;
        }

        if !entry.covers_scanline(scanline) {
            continue;
        }

        if entry.affine {
            render_affine(line, &entry, scanline, one_dimensional, context, window_stamp);
        } else {
            render_regular(line, &entry, scanline, one_dimensional, context, window_stamp);
        }
    }
}

fn render_regular(
    line: &mut GbaLine,
    entry: &OamEntry,
    scanline: i32,
    one_dimensional: bool,
    context: &RenderContext,
    window_stamp: Option<WindowSettings>,
) {
    let row = scanline - entry.y;
    let texture_y = if entry.vflip {
        entry.height - 1 - row
    } else {
        row
    };

    let left = entry.x.max(0);
    let right = (entry.x + entry.width).min(VISIBLE_LINE_WIDTH as i32);

    for dot in left..right {
        let column = dot - entry.x;
        let texture_x = if entry.hflip {
            entry.width - 1 - column
        } else {
            column
        };

        if let Some((color, opaque)) =
            texel(entry, texture_x, texture_y, one_dimensional, context)
        {
            emit(line, dot as usize, entry, color, opaque, window_stamp);
        }
    }
}

fn render_affine(
    line: &mut GbaLine,
    entry: &OamEntry,
    scanline: i32,
    one_dimensional: bool,
    context: &RenderContext,
    window_stamp: Option<WindowSettings>,
) {
    // Matrix parameters live interleaved through OAM, one element per
    // sprite slot.
    let base = entry.matrix * 32;
    let pa = i32::from(LittleEndian::read_u16(&context.oam[base + 6..]) as i16);
    let pb = i32::from(LittleEndian::read_u16(&context.oam[base + 14..]) as i16);
    let pc = i32::from(LittleEndian::read_u16(&context.oam[base + 22..]) as i16);
    let pd = i32::from(LittleEndian::read_u16(&context.oam[base + 30..]) as i16);

    let half_width = entry.width / 2;
    let half_height = entry.height / 2;

    // The bounding box is anchored at (x, y) and doubles in both axes for
    // double-size sprites.
    let (left, right, top) = if entry.double_size {
        (entry.x, entry.x + 2 * entry.width - 1, entry.y)
    } else {
        (entry.x, entry.x + entry.width - 1, entry.y)
    };

    // The rotation center sits mid-sprite (mid-box when double sized).
    let x0 = if entry.double_size {
        entry.width
    } else {
        half_width
    };
    let y0 = if entry.double_size {
        entry.height
    } else {
        half_height
    };
    let y1 = scanline - top;

    let mut affine_x = pa * (0 - x0) + pb * (y1 - y0) + (half_width << 8);
    let mut affine_y = pc * (0 - x0) + pd * (y1 - y0) + (half_height << 8);

    for dot in left..=right.min(VISIBLE_LINE_WIDTH as i32 - 1) {
        let texture_x = affine_x >> 8;
        let texture_y = affine_y >> 8;
        affine_x += pa;
        affine_y += pc;

        if dot < 0
            || !(0..entry.width).contains(&texture_x)
            || !(0..entry.height).contains(&texture_y)
        {
            continue;
        }

        if let Some((color, opaque)) =
            texel(entry, texture_x, texture_y, one_dimensional, context)
        {
            emit(line, dot as usize, entry, color, opaque, window_stamp);
        }
    }
}

/// Looks up one sprite texel. Returns None when the tile data would fall
/// outside OBJ character memory.
fn texel(
    entry: &OamEntry,
    texture_x: i32,
    texture_y: i32,
    one_dimensional: bool,
    context: &RenderContext,
) -> Option<(u16, bool)> {
    let tile_col = (texture_x / 8) as usize;
    let tile_row = (texture_y / 8) as usize;
    let in_x = (texture_x % 8) as usize;
    let in_y = (texture_y % 8) as usize;
    let width_tiles = (entry.width / 8) as usize;

    if entry.color_256 {
        let offset = if one_dimensional {
            (entry.tile * 32 + tile_row * width_tiles * 64 + tile_col * 64) % 0x8000
        } else {
            let map_x = (entry.tile / 2 + tile_col) % 16;
            let map_y = (entry.tile / 2 / 16 + tile_row) % 32;
            (map_y * 16 + map_x) * 64
        };

        let address = OBJ_CHARBLOCK + offset + in_y * 8 + in_x;
        if address >= 0x18000 {
            return None;
        }

        let index = context.vram[address];
        Some((obj_palette_color(context, u32::from(index)), index != 0))
    } else {
        let tile_index = if one_dimensional {
            (entry.tile + tile_row * width_tiles + tile_col) % 1024
        } else {
            let map_x = (entry.tile % 32 + tile_col) % 32;
            let map_y = (entry.tile / 32 + tile_row) % 32;
            map_y * 32 + map_x
        };

        let address = OBJ_CHARBLOCK + tile_index * 32 + in_y * 4 + in_x / 2;
        if address >= 0x18000 {
            return None;
        }

        let pair = context.vram[address];
        let nibble = if in_x % 2 == 0 { pair & 0x0F } else { pair >> 4 };
        let index = entry.palette_bank * 16 + u16::from(nibble);
        Some((
            obj_palette_color(context, u32::from(index)),
            nibble != 0,
        ))
    }
}

fn obj_palette_color(context: &RenderContext, index: u32) -> u16 {
    LittleEndian::read_u16(&context.palram[OBJ_PALETTE + index as usize * 2..])
}

fn emit(
    line: &mut GbaLine,
    dot: usize,
    entry: &OamEntry,
    color: u16,
    opaque: bool,
    window_stamp: Option<WindowSettings>,
) {
    match window_stamp {
        // OBJ-window sprites carve the window shape out of their opaque
        // texels; they draw nothing themselves.
        Some(settings) => {
            if opaque {
                line.set_window(dot, settings);
            }
        }
        None => {
            let mut pixel = Pixel::new(PixelSource::Obj, color, entry.priority, !opaque);
            pixel.semi_transparent = entry.gfx_mode == 1;
            line.push_sprite_pixel(dot, pixel);
        }
    }
}
