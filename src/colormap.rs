use crate::enums::Colormap;
use crate::windowing::DisplayRange;

type Stop = (f32, [u8; 3]);

const RAINBOW: &[Stop] = &[
    (0.0, [150, 0, 90]),
    (0.125, [0, 0, 200]),
    (0.25, [0, 25, 255]),
    (0.375, [0, 152, 255]),
    (0.5, [44, 255, 150]),
    (0.625, [151, 255, 0]),
    (0.75, [255, 234, 0]),
    (0.875, [255, 111, 0]),
    (1.0, [255, 0, 0]),
];

const VIRIDIS: &[Stop] = &[
    (0.0, [68, 1, 84]),
    (0.111, [72, 40, 120]),
    (0.222, [62, 73, 137]),
    (0.333, [49, 104, 142]),
    (0.444, [38, 130, 142]),
    (0.556, [31, 158, 137]),
    (0.667, [53, 183, 121]),
    (0.778, [110, 206, 88]),
    (0.889, [181, 222, 43]),
    (1.0, [253, 231, 37]),
];

const GRAY: &[Stop] = &[(0.0, [0, 0, 0]), (1.0, [255, 255, 255])];

const JET: &[Stop] = &[
    (0.0, [0, 0, 131]),
    (0.125, [0, 60, 170]),
    (0.375, [5, 255, 255]),
    (0.625, [255, 255, 0]),
    (0.875, [250, 0, 0]),
    (1.0, [128, 0, 0]),
];

impl Colormap {
    fn stops(self) -> &'static [Stop] {
        match self {
            Colormap::Rainbow => RAINBOW,
            Colormap::Viridis => VIRIDIS,
            Colormap::Gray => GRAY,
            Colormap::Jet => JET,
        }
    }

    /// Colour for a normalized position in `[0, 1]`; values outside are
    /// clamped, NaN maps to the low end.
    pub fn sample(self, t: f32) -> [u8; 3] {
        let t = if t.is_nan() { 0.0 } else { t.clamp(0.0, 1.0) };
        let stops = self.stops();
        let upper = stops
            .iter()
            .position(|&(pos, _)| pos >= t)
            .unwrap_or(stops.len() - 1);
        if upper == 0 {
            return stops[0].1;
        }
        let (p0, c0) = stops[upper - 1];
        let (p1, c1) = stops[upper];
        let f = (t - p0) / (p1 - p0);
        let lerp = |a: u8, b: u8| (a as f32 + (b as f32 - a as f32) * f).round() as u8;
        [lerp(c0[0], c1[0]), lerp(c0[1], c1[1]), lerp(c0[2], c1[2])]
    }

    /// Colour for a raw intensity clamped to `range`.
    #[inline]
    pub fn map_value(self, value: f32, range: &DisplayRange) -> [u8; 3] {
        self.sample(range.normalize(value))
    }
}
