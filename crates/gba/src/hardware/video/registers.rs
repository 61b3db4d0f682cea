use gba_derive::IoRegister;
use util::bits::BitOps;

/// 4000000h - DISPCNT - LCD Control (R/W)
///   Bit   Expl.
///   0-2   BG Mode                (0-5=Video Mode 0-5, 6-7=Prohibited)
///   4     Display Frame Select   (BG Modes 4,5 only)
///   5     H-Blank Interval Free
///   6     OBJ Character VRAM Mapping (0=Two dimensional, 1=One dimensional)
///   7     Forced Blank
///   8-11  Screen Display BG0-BG3
///   12    Screen Display OBJ
///   13    Window 0 Display Flag
///   14    Window 1 Display Flag
///   15    OBJ Window Display Flag
#[derive(IoRegister, Copy, Clone)]
#[field(bg_mode: u16 = 0..=2)]
#[field(frame_select: bool = 4)]
#[field(hblank_interval_free: bool = 5)]
#[field(obj_one_dimensional: bool = 6)]
#[field(forced_blank: bool = 7)]
#[field(display_bg0: bool = 8)]
#[field(display_bg1: bool = 9)]
#[field(display_bg2: bool = 10)]
#[field(display_bg3: bool = 11)]
#[field(display_obj: bool = 12)]
#[field(window0_display: bool = 13)]
#[field(window1_display: bool = 14)]
#[field(obj_window_display: bool = 15)]
pub struct RegDispcnt {
    value: u16,
}

impl RegDispcnt {
    pub fn display_bg(self, bg: usize) -> bool {
        self.value.bit(8 + bg as u32)
    }

    pub fn any_window(self) -> bool {
        self.value & 0xE000 != 0
    }
}

/// 4000004h - DISPSTAT - General LCD Status (R/W)
///   Bit   Expl.
///   0     V-Blank flag (R) (set in lines 160..226, not 227)
///   1     H-Blank flag (R) (toggled in all lines)
///   2     V-Counter flag (R)
///   3     V-Blank IRQ Enable
///   4     H-Blank IRQ Enable
///   5     V-Counter IRQ Enable
///   8-15  V-Count Setting
#[derive(IoRegister, Copy, Clone)]
#[field(vblank: readonly<bool> = 0)]
#[field(hblank: readonly<bool> = 1)]
#[field(vcount_match: readonly<bool> = 2)]
#[field(vblank_irq: bool = 3)]
#[field(hblank_irq: bool = 4)]
#[field(vcount_irq: bool = 5)]
#[field(vcount_setting: u16 = 8..=15)]
pub struct RegDispstat {
    value: u16,
}

/// 4000008h (+2 per background) - BGxCNT - Background Control (R/W)
///   Bit   Expl.
///   0-1   BG Priority (0 = highest)
///   2-3   Character Base Block (units of 16 KiB)
///   6     Mosaic
///   7     Colors/Palettes (0=16/16, 1=256/1)
///   8-12  Screen Base Block (units of 2 KiB)
///   13    Display Area Overflow (affine BGs: 0=Transparent, 1=Wraparound)
///   14-15 Screen Size
#[derive(IoRegister, Copy, Clone)]
#[field(priority: u16 = 0..=1)]
#[field(char_base_block: u16 = 2..=3)]
#[field(mosaic: bool = 6)]
#[field(color_256: bool = 7)]
#[field(screen_base_block: u16 = 8..=12)]
#[field(overflow_wrap: bool = 13)]
#[field(screen_size: u16 = 14..=15)]
pub struct RegBgcnt {
    value: u16,
}

/// 4000048h / 400004Ah - WININ / WINOUT - Window Layer Controls (R/W)
/// Each byte is one window record: bits 0-3 enable BG0-BG3, bit 4 OBJ,
/// bit 5 color special effects.
#[derive(IoRegister, Copy, Clone)]
#[field(low: u16 = 0..=7)]
#[field(high: u16 = 8..=15)]
pub struct RegWindowControl {
    value: u16,
}

/// 4000050h - BLDCNT - Color Special Effects Selection (R/W)
///   Bit   Expl.
///   0-5   First target: BG0-3, OBJ, Backdrop
///   6-7   Effect (0=None, 1=Alpha, 2=Brighten, 3=Darken)
///   8-13  Second target: BG0-3, OBJ, Backdrop
#[derive(IoRegister, Copy, Clone)]
#[field(first_target: u16 = 0..=5)]
#[field(effect: u16 = 6..=7)]
#[field(second_target: u16 = 8..=13)]
pub struct RegBldcnt {
    value: u16,
}

/// 4000052h - BLDALPHA - Alpha Blending Coefficients (R/W)
#[derive(IoRegister, Copy, Clone)]
#[field(eva: u16 = 0..=4)]
#[field(evb: u16 = 8..=12)]
pub struct RegBldalpha {
    value: u16,
}

/// 4000054h - BLDY - Brightness Coefficient (W)
#[derive(IoRegister, Copy, Clone)]
#[field(evy: u16 = 0..=4)]
pub struct RegBldy {
    value: u16,
}

/// The LCD register file. The affine reference points additionally keep a
/// live signed copy that render code advances per scanline; the register
/// values are only re-latched at VBlank or on a write.
#[derive(Default)]
pub struct GbaVideoRegisters {
    pub dispcnt: RegDispcnt,
    pub green_swap: u16,
    pub dispstat: RegDispstat,
    pub bgcnt: [RegBgcnt; 4],
    pub bg_hofs: [u16; 4],
    pub bg_vofs: [u16; 4],

    /// PA/PB/PC/PD for BG2 then BG3.
    pub bg_affine_params: [[u16; 4]; 2],
    /// Raw BG2X/BG2Y/BG3X/BG3Y register values.
    pub bg_ref_point: [[u32; 2]; 2],

    pub win_h: [u16; 2],
    pub win_v: [u16; 2],
    pub winin: RegWindowControl,
    pub winout: RegWindowControl,
    pub mosaic: u16,

    pub bldcnt: RegBldcnt,
    pub bldalpha: RegBldalpha,
    pub bldy: RegBldy,
}

impl GbaVideoRegisters {
    pub fn affine_param(&self, bg: usize, param: usize) -> i32 {
        i32::from(self.bg_affine_params[bg - 2][param] as i16)
    }

    /// The 28-bit signed fixed point reference point register.
    pub fn reference_point(&self, bg: usize, axis: usize) -> i32 {
        self.bg_ref_point[bg - 2][axis].sign_extend(28) as i32
    }
}
