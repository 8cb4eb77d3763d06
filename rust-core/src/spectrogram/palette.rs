//! Color maps for the spectrogram
//!
//! Each palette has 256 RGB entries ordered from the brightest (loudest) to
//! the dimmest. The last entry is always black so silence reads as background.

use super::history::level_from_db;
use serde::{Deserialize, Serialize};

pub const PALETTE_SIZE: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Palette {
    #[default]
    Hot,
    Gray,
    Blackbody,
    Magma,
    Inferno,
    Viridis,
}

// Control points from dimmest to brightest, as 0xRRGGBB
const HOT: &[u32] = &[0x000000, 0x800000, 0xff0000, 0xff8000, 0xffff00, 0xffff80, 0xffffff];
const GRAY: &[u32] = &[0x000000, 0xffffff];
const BLACKBODY: &[u32] = &[0x000000, 0x230904, 0x7f1d16, 0xbe3a1d, 0xe9731f, 0xf9b13e, 0xfdea8e, 0xffffff];
const MAGMA: &[u32] = &[
    0x000004, 0x1c1044, 0x4f127b, 0x812581, 0xb5367a, 0xe55064, 0xfb8761, 0xfec287, 0xfcfdbf,
];
const INFERNO: &[u32] = &[
    0x000004, 0x1f0c48, 0x550f6d, 0x88226a, 0xba3655, 0xe35933, 0xf98c0a, 0xf9c932, 0xfcffa4,
];
const VIRIDIS: &[u32] = &[
    0x440154, 0x482878, 0x3e4a89, 0x31688e, 0x26828e, 0x1f9e89, 0x35b779, 0x6dcd59, 0xb4de2c,
    0xfde725,
];

impl Palette {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "hot" => Some(Palette::Hot),
            "gray" | "grey" => Some(Palette::Gray),
            "blackbody" => Some(Palette::Blackbody),
            "magma" => Some(Palette::Magma),
            "inferno" => Some(Palette::Inferno),
            "viridis" => Some(Palette::Viridis),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Palette::Hot => "hot",
            Palette::Gray => "gray",
            Palette::Blackbody => "blackbody",
            Palette::Magma => "magma",
            Palette::Inferno => "inferno",
            Palette::Viridis => "viridis",
        }
    }

    fn control_points(&self) -> &'static [u32] {
        match self {
            Palette::Hot => HOT,
            Palette::Gray => GRAY,
            Palette::Blackbody => BLACKBODY,
            Palette::Magma => MAGMA,
            Palette::Inferno => INFERNO,
            Palette::Viridis => VIRIDIS,
        }
    }

    /// Expand to `PALETTE_SIZE` RGB entries, brightest first
    pub fn colors(&self) -> Vec<u32> {
        let points = self.control_points();
        let segments = (points.len() - 1) as f64;

        let mut colors: Vec<u32> = (0..PALETTE_SIZE)
            .map(|k| {
                // t = 1 at index 0 (brightest)
                let t = 1.0 - k as f64 / (PALETTE_SIZE - 1) as f64;
                let x = t * segments;
                let i = (x.floor() as usize).min(points.len() - 2);
                lerp_rgb(points[i], points[i + 1], x - i as f64)
            })
            .collect();

        if let Some(last) = colors.last_mut() {
            *last = 0x000000;
        }
        colors
    }
}

fn lerp_rgb(a: u32, b: u32, t: f64) -> u32 {
    let channel = |shift: u32| {
        let ca = ((a >> shift) & 0xff) as f64;
        let cb = ((b >> shift) & 0xff) as f64;
        ((ca + (cb - ca) * t).round() as u32).min(255) << shift
    };
    channel(16) | channel(8) | channel(0)
}

/// Palette plus the dB range it spans
#[derive(Debug, Clone)]
pub struct ColorScale {
    palette: Palette,
    colors: Vec<u32>,
    db_lower: f64,
    db_upper: f64,
}

impl ColorScale {
    pub fn new(palette: Palette, db_lower: f64, db_upper: f64) -> Self {
        Self {
            palette,
            colors: palette.colors(),
            db_lower,
            db_upper,
        }
    }

    pub fn palette(&self) -> Palette {
        self.palette
    }

    pub fn db_lower(&self) -> f64 {
        self.db_lower
    }

    pub fn db_upper(&self) -> f64 {
        self.db_upper
    }

    /// Opaque ARGB color of a dB value
    pub fn color(&self, db: f64) -> u32 {
        self.colors[level_from_db(db, self.db_lower, self.db_upper, self.colors.len())] | 0xff00_0000
    }
}

impl Default for ColorScale {
    fn default() -> Self {
        Self::new(Palette::Hot, -120.0, 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_palette_shape() {
        for p in [
            Palette::Hot,
            Palette::Gray,
            Palette::Blackbody,
            Palette::Magma,
            Palette::Inferno,
            Palette::Viridis,
        ] {
            let colors = p.colors();
            assert_eq!(colors.len(), PALETTE_SIZE);
            assert_eq!(*colors.last().unwrap(), 0);
            assert!(colors.iter().all(|&c| c <= 0xffffff));
            assert_eq!(Palette::from_name(p.name()), Some(p));
        }
    }

    #[test]
    fn test_gray_is_monotonic() {
        let colors = Palette::Gray.colors();
        assert_eq!(colors[0], 0xffffff);
        for pair in colors.windows(2) {
            assert!(pair[0] & 0xff >= pair[1] & 0xff);
        }
    }

    #[test]
    fn test_color_scale_ends() {
        let scale = ColorScale::new(Palette::Gray, -120.0, 0.0);
        assert_eq!(scale.color(3.0), 0xffffffff);
        assert_eq!(scale.color(-130.0), 0xff000000);
        assert_eq!(scale.color(f64::NEG_INFINITY), 0xff000000);
    }

    #[test]
    fn test_unknown_name() {
        assert_eq!(Palette::from_name("rainbow"), None);
    }
}
