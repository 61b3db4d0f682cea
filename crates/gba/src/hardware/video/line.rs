use arrayvec::ArrayVec;

use super::registers::{RegBldalpha, RegBldcnt, RegBldy, RegWindowControl};
use super::VISIBLE_LINE_WIDTH;

/// Layer a candidate pixel came from. The ordinal doubles as the
/// composition tie-break: on equal priority the lower source wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum PixelSource {
    Obj = 0,
    Bg0,
    Bg1,
    Bg2,
    Bg3,
    Backdrop,
}

impl PixelSource {
    pub fn bg(index: usize) -> PixelSource {
        match index {
            0 => PixelSource::Bg0,
            1 => PixelSource::Bg1,
            2 => PixelSource::Bg2,
            _ => PixelSource::Bg3,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Pixel {
    pub source: PixelSource,
    pub color: u16,
    pub priority: u8,
    pub transparent: bool,
    pub semi_transparent: bool,
}

impl Pixel {
    pub fn new(source: PixelSource, color: u16, priority: u8, transparent: bool) -> Pixel {
        Pixel {
            source,
            color,
            priority,
            transparent,
            semi_transparent: false,
        }
    }

    /// Composition order: an opaque pixel always beats a transparent one,
    /// then lower priority wins, then the source ordinal.
    fn beats(&self, other: &Pixel) -> bool {
        if self.transparent != other.transparent {
            return !self.transparent;
        }

        if self.priority != other.priority {
            self.priority < other.priority
        } else {
            self.source < other.source
        }
    }
}

/// Per-dot window state: which layers may draw and whether color effects
/// apply.
#[derive(Debug, Clone, Copy)]
pub struct WindowSettings {
    pub bg_enabled: [bool; 4],
    pub obj_enabled: bool,
    pub effects_enabled: bool,
}

impl WindowSettings {
    pub const ALL_ENABLED: WindowSettings = WindowSettings {
        bg_enabled: [true; 4],
        obj_enabled: true,
        effects_enabled: true,
    };

    /// Builds a record from one byte of WININ/WINOUT.
    pub fn from_control_byte(bits: u16) -> WindowSettings {
        WindowSettings {
            bg_enabled: [
                bits & 0x01 != 0,
                bits & 0x02 != 0,
                bits & 0x04 != 0,
                bits & 0x08 != 0,
            ],
            obj_enabled: bits & 0x10 != 0,
            effects_enabled: bits & 0x20 != 0,
        }
    }
}

impl RegWindowControl {
    pub(crate) fn low_settings(self) -> WindowSettings {
        WindowSettings::from_control_byte(self.low())
    }

    pub(crate) fn high_settings(self) -> WindowSettings {
        WindowSettings::from_control_byte(self.high())
    }
}

/// All transient per-scanline state: the per-dot candidate stacks the
/// background renderers push into, the sprite evaluator's line buffer, and
/// the resolved window record per dot.
pub struct GbaLine {
    candidates: [ArrayVec<Pixel, 5>; VISIBLE_LINE_WIDTH],
    sprites: [Option<Pixel>; VISIBLE_LINE_WIDTH],
    windows: [WindowSettings; VISIBLE_LINE_WIDTH],
}

impl Default for GbaLine {
    fn default() -> Self {
        GbaLine {
            candidates: std::array::from_fn(|_| ArrayVec::new()),
            sprites: [None; VISIBLE_LINE_WIDTH],
            windows: [WindowSettings::ALL_ENABLED; VISIBLE_LINE_WIDTH],
        }
    }
}

impl GbaLine {
    pub fn init_windows(&mut self, settings: WindowSettings) {
        self.windows = [settings; VISIBLE_LINE_WIDTH];
    }

    pub fn window(&self, dot: usize) -> &WindowSettings {
        &self.windows[dot]
    }

    pub fn set_window(&mut self, dot: usize, settings: WindowSettings) {
        self.windows[dot] = settings;
    }

    /// Stamps a window record over an X range; edges wrap when the left
    /// edge is beyond the right one.
    pub fn stamp_window_span(&mut self, left: u8, right: u8, settings: WindowSettings) {
        let right = usize::from(right).min(VISIBLE_LINE_WIDTH);
        let left = usize::from(left);

        if left <= right {
            for dot in left..right {
                self.windows[dot] = settings;
            }
        } else {
            for dot in 0..right {
                self.windows[dot] = settings;
            }
            for dot in left..VISIBLE_LINE_WIDTH {
                self.windows[dot] = settings;
            }
        }
    }

    pub fn push(&mut self, dot: usize, pixel: Pixel) {
        // Capacity is one candidate per layer; anything extra means a
        // renderer pushed the same layer twice.
        self.candidates[dot].push(pixel);
    }

    pub fn clear_sprites(&mut self) {
        self.sprites = [None; VISIBLE_LINE_WIDTH];
    }

    /// Sprite evaluation keeps only the best sprite pixel per dot; priority
    /// ties go to the earlier OAM entry, which scanned first.
    pub fn push_sprite_pixel(&mut self, dot: usize, pixel: Pixel) {
        if !self.windows[dot].obj_enabled || pixel.transparent {
            return;
        }

        match &self.sprites[dot] {
            Some(current) if pixel.priority >= current.priority && !current.transparent => {}
            _ => self.sprites[dot] = Some(pixel),
        }
    }

    /// Merges sprite pixels into the candidate stacks ahead of composition.
    pub fn merge_sprites(&mut self) {
        for (dot, sprite) in self.sprites.iter().enumerate() {
            if let Some(pixel) = sprite {
                self.candidates[dot].push(*pixel);
            }
        }
    }

    /// Resolves the scanline into BGR555, applying the blend unit, and
    /// clears the candidate stacks for the next line.
    pub fn compose(
        &mut self,
        output: &mut [u16],
        backdrop: u16,
        force_blank: bool,
        bldcnt: RegBldcnt,
        bldalpha: RegBldalpha,
        bldy: RegBldy,
    ) {
        if force_blank {
            output.fill(0x7FFF);
            for candidates in &mut self.candidates {
                candidates.clear();
            }
            return;
        }

        let first_target = bldcnt.first_target();
        let second_target = bldcnt.second_target();
        let effect = bldcnt.effect();

        // Coefficients are 1.4 fixed point, saturated at 1.0.
        let eva = bldalpha.eva().min(0x10);
        let evb = bldalpha.evb().min(0x10);
        let evy = bldy.evy().min(0x10);

        let backdrop = Pixel::new(PixelSource::Backdrop, backdrop, 4, false);

        for (dot, candidates) in self.candidates.iter_mut().enumerate() {
            let mut top: Option<&Pixel> = None;
            let mut bottom: Option<&Pixel> = None;

            for pixel in candidates.iter() {
                match top {
                    Some(current) if !pixel.beats(current) => match bottom {
                        Some(second) if !pixel.beats(second) => {}
                        _ => bottom = Some(pixel),
                    },
                    _ => {
                        bottom = top;
                        top = Some(pixel);
                    }
                }
            }

            let mut top = *top.unwrap_or(&backdrop);
            let mut bottom = bottom.copied();

            if top.transparent {
                top = backdrop;
                bottom = None;
            } else if matches!(bottom, Some(pixel) if pixel.transparent) {
                bottom = None;
            }

            // A semi-transparent sprite on top always alpha blends with an
            // opaque pixel underneath it, whatever BLDCNT says; otherwise
            // the window gates the effect.
            let effect = if top.semi_transparent && bottom.is_some() {
                1
            } else if !self.windows[dot].effects_enabled {
                0
            } else {
                effect
            };

            let mut color = top.color;

            match effect {
                1 => {
                    if let Some(bottom) = bottom {
                        let top_is_first = first_target & (1 << target_bit(top.source)) != 0;
                        let bottom_is_second =
                            second_target & (1 << target_bit(bottom.source)) != 0;

                        if (top_is_first || top.semi_transparent) && bottom_is_second {
                            color = alpha_blend(eva, evb, top.color, bottom.color);
                        }
                    }
                }
                2 => {
                    if first_target & (1 << target_bit(top.source)) != 0 {
                        color = brightness_increase(evy, top.color);
                    }
                }
                3 => {
                    if first_target & (1 << target_bit(top.source)) != 0 {
                        color = brightness_decrease(evy, top.color);
                    }
                }
                _ => {}
            }

            output[dot] = color;
            candidates.clear();
        }
    }
}

/// BLDCNT orders its target bits BG0-3, OBJ, Backdrop.
fn target_bit(source: PixelSource) -> u16 {
    match source {
        PixelSource::Bg0 => 0,
        PixelSource::Bg1 => 1,
        PixelSource::Bg2 => 2,
        PixelSource::Bg3 => 3,
        PixelSource::Obj => 4,
        PixelSource::Backdrop => 5,
    }
}

/// Blend the top two layers: channel = (A*eva + B*evb) >> 4, saturated.
fn alpha_blend(eva: u16, evb: u16, top: u16, bottom: u16) -> u16 {
    let mut result = 0;

    for shift in [0u16, 5, 10] {
        let a = (top >> shift) & 0x1F;
        let b = (bottom >> shift) & 0x1F;
        let channel = ((a * eva + b * evb) >> 4).min(31);
        result |= channel << shift;
    }

    result
}

/// channel = channel + (31 - channel) * evy / 16
fn brightness_increase(evy: u16, color: u16) -> u16 {
    let mut result = 0;

    for shift in [0u16, 5, 10] {
        let channel = (color >> shift) & 0x1F;
        let channel = channel + (((31 - channel) * evy) >> 4);
        result |= channel.min(31) << shift;
    }

    result
}

/// channel = channel - channel * evy / 16
fn brightness_decrease(evy: u16, color: u16) -> u16 {
    let mut result = 0;

    for shift in [0u16, 5, 10] {
        let channel = (color >> shift) & 0x1F;
        let channel = channel - ((channel * evy) >> 4);
        result |= channel << shift;
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compose_single(line: &mut GbaLine) -> u16 {
        let mut output = [0u16; VISIBLE_LINE_WIDTH];
        line.compose(
            &mut output,
            0x7C1F,
            false,
            RegBldcnt::default(),
            RegBldalpha::default(),
            RegBldy::default(),
        );
        output[0]
    }

    #[test]
    fn lower_priority_number_wins() {
        let mut line = GbaLine::default();
        line.push(0, Pixel::new(PixelSource::Bg0, 0x1111, 2, false));
        line.push(0, Pixel::new(PixelSource::Bg1, 0x2222, 1, false));
        assert_eq!(compose_single(&mut line), 0x2222);
    }

    #[test]
    fn source_ordinal_breaks_priority_ties() {
        let mut line = GbaLine::default();
        line.push(0, Pixel::new(PixelSource::Bg1, 0x2222, 1, false));
        line.push(0, Pixel::new(PixelSource::Bg0, 0x1111, 1, false));
        assert_eq!(compose_single(&mut line), 0x1111);
    }

    #[test]
    fn transparent_pixels_always_lose() {
        let mut line = GbaLine::default();
        line.push(0, Pixel::new(PixelSource::Bg0, 0x1111, 0, true));
        line.push(0, Pixel::new(PixelSource::Bg3, 0x3333, 3, false));
        assert_eq!(compose_single(&mut line), 0x3333);
    }

    #[test]
    fn backdrop_fills_empty_dots() {
        let mut line = GbaLine::default();
        assert_eq!(compose_single(&mut line), 0x7C1F);
    }

    #[test]
    fn alpha_blend_mixes_channels() {
        // Half red over half blue at eva = evb = 8 gives a quarter of each.
        assert_eq!(alpha_blend(8, 8, 0x0010, 0x4000), (0x10 >> 1) | (0x4000 >> 1));
        // Saturation clamps per channel.
        assert_eq!(alpha_blend(16, 16, 0x001F, 0x001F), 0x001F);
    }

    #[test]
    fn brightness_extremes() {
        assert_eq!(brightness_increase(16, 0), 0x7FFF);
        assert_eq!(brightness_decrease(16, 0x7FFF), 0);
    }
}
