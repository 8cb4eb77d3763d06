//! Mapping between physical values and screen pixels
//!
//! The full physical range `[lower, upper]` maps onto the unit interval,
//! linearly or logarithmically. A viewport inside it is described by `zoom`
//! and `shift`: unit position `u` of the viewport corresponds to
//! `u / zoom + shift` of the full range, and the viewport spans `n_pixels`.
//!
//! Bounds may be reversed (`lower > upper`) to flip an axis.

use crate::error::{AnalyzerError, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AxisScale {
    Linear,
    Log,
}

/// Physical value to pixel transform with zoom and shift
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AxisMapping {
    scale: AxisScale,
    n_pixels: f64,
    lower: f64,
    upper: f64,
    view_lower: f64,
    view_upper: f64,
    zoom: f64,
    shift: f64,
}

fn check_bounds(scale: AxisScale, lower: f64, upper: f64) -> Result<()> {
    let degenerate = !lower.is_finite()
        || !upper.is_finite()
        || lower == upper
        || (scale == AxisScale::Log && (lower <= 0.0 || upper <= 0.0));
    if degenerate {
        return Err(AnalyzerError::DegenerateAxis { lower, upper });
    }
    Ok(())
}

/// Round values within float32 precision of an integer
fn snap_almost_integer(x: f64) -> f64 {
    let i = x.round();
    let close = if i == 0.0 {
        x.abs() < 1.2e-7
    } else {
        ((x - i) / i).abs() < 1.2e-7
    };
    if close {
        i
    } else {
        x
    }
}

impl AxisMapping {
    /// Create a mapping showing the whole range
    ///
    /// # Arguments
    /// * `n_pixels` - Viewport size in pixels
    /// * `lower` - Physical value at pixel 0
    /// * `upper` - Physical value at pixel `n_pixels`
    /// * `scale` - Linear or logarithmic
    pub fn new(n_pixels: f64, lower: f64, upper: f64, scale: AxisScale) -> Result<Self> {
        check_bounds(scale, lower, upper)?;
        Ok(Self {
            scale,
            n_pixels,
            lower,
            upper,
            view_lower: lower,
            view_upper: upper,
            zoom: 1.0,
            shift: 0.0,
        })
    }

    pub fn scale(&self) -> AxisScale {
        self.scale
    }

    pub fn n_pixels(&self) -> f64 {
        self.n_pixels
    }

    pub fn set_n_pixels(&mut self, n_pixels: f64) {
        self.n_pixels = n_pixels;
    }

    pub fn lower(&self) -> f64 {
        self.lower
    }

    pub fn upper(&self) -> f64 {
        self.upper
    }

    pub fn zoom(&self) -> f64 {
        self.zoom
    }

    pub fn shift(&self) -> f64 {
        self.shift
    }

    pub fn is_reversed(&self) -> bool {
        self.lower > self.upper
    }

    /// Replace the physical range, keeping zoom and shift
    pub fn set_bounds(&mut self, lower: f64, upper: f64) -> Result<()> {
        check_bounds(self.scale, lower, upper)?;
        self.lower = lower;
        self.upper = upper;

        self.apply_zoom_shift(self.zoom, self.shift);
        let view_lower = snap_almost_integer(self.view_lower);
        let view_upper = snap_almost_integer(self.view_upper);
        // Refine zoom and shift from the snapped view
        if view_lower != view_upper {
            self.apply_view_bounds(view_lower, view_upper);
        }
        Ok(())
    }

    /// Set zoom (> 0) and shift, recomputing the visible range
    pub fn set_zoom_shift(&mut self, zoom: f64, shift: f64) -> Result<()> {
        if !(zoom > 0.0) || !zoom.is_finite() || !shift.is_finite() {
            return Err(AnalyzerError::InvalidZoom { zoom, shift });
        }
        self.apply_zoom_shift(zoom, shift);
        Ok(())
    }

    fn apply_zoom_shift(&mut self, zoom: f64, shift: f64) {
        self.zoom = zoom;
        self.shift = shift;
        self.view_lower = self.v_from_unit(0.0, zoom, shift);
        self.view_upper = self.v_from_unit(1.0, zoom, shift);
    }

    /// Set zoom and shift so that `[view_lower, view_upper]` is visible
    pub fn set_view_bounds(&mut self, view_lower: f64, view_upper: f64) -> Result<()> {
        check_bounds(self.scale, view_lower, view_upper)?;
        self.apply_view_bounds(view_lower, view_upper);
        Ok(())
    }

    fn apply_view_bounds(&mut self, view_lower: f64, view_upper: f64) {
        let p1 = self.unit_from_v(view_lower, self.lower, self.upper);
        let p2 = self.unit_from_v(view_upper, self.lower, self.upper);
        self.zoom = 1.0 / (p2 - p1);
        self.shift = p1;
        self.view_lower = view_lower;
        self.view_upper = view_upper;
    }

    /// Position of `v` within `[lo, hi]` as a fraction
    pub fn unit_from_v(&self, v: f64, lo: f64, hi: f64) -> f64 {
        if lo == hi {
            return 0.0;
        }
        match self.scale {
            AxisScale::Linear => (v - lo) / (hi - lo),
            AxisScale::Log => (v.max(f64::MIN_POSITIVE) / lo).ln() / (hi / lo).ln(),
        }
    }

    /// Physical value at viewport unit position `u`
    pub fn v_from_unit(&self, u: f64, zoom: f64, shift: f64) -> f64 {
        let t = u / zoom + shift;
        match self.scale {
            AxisScale::Linear => t * (self.upper - self.lower) + self.lower,
            AxisScale::Log => (t * (self.upper / self.lower).ln()).exp() * self.lower,
        }
    }

    /// Viewport pixel of physical value `v`
    pub fn pixel_from_v(&self, v: f64) -> f64 {
        self.unit_from_v(v, self.view_lower, self.view_upper) * self.n_pixels
    }

    /// Physical value at viewport pixel
    pub fn v_from_pixel(&self, pixel: f64) -> f64 {
        if self.n_pixels == 0.0 {
            return self.view_lower;
        }
        self.v_from_unit(pixel / self.n_pixels, self.zoom, self.shift)
    }

    /// Pixel of `v` when the whole range is shown
    pub fn pixel_no_zoom_from_v(&self, v: f64) -> f64 {
        self.unit_from_v(v, self.lower, self.upper) * self.n_pixels
    }

    pub fn v_min_in_view(&self) -> f64 {
        self.view_lower
    }

    pub fn v_max_in_view(&self) -> f64 {
        self.view_upper
    }

    /// Flip the axis direction, keeping the same values in view
    pub fn reverse_bounds(&mut self) -> Result<()> {
        let (old_lower, old_upper) = (self.view_lower, self.view_upper);
        self.set_bounds(self.upper, self.lower)?;
        self.set_view_bounds(old_upper, old_lower)
    }

    /// Switch between linear and log scale
    ///
    /// `lower_ref` stands in for a zero bound on a log axis, and is mapped
    /// back to zero when returning to linear. The visible range is kept.
    pub fn set_scale(&mut self, scale: AxisScale, lower_ref: f64) -> Result<()> {
        let (mut view_lower, mut view_upper) = (self.view_lower, self.view_upper);
        let (mut lower, mut upper) = (self.lower, self.upper);

        match scale {
            AxisScale::Log => {
                if lower == 0.0 {
                    lower = lower_ref;
                }
                if upper == 0.0 {
                    upper = lower_ref;
                }
                view_lower = view_lower.max(lower_ref);
                view_upper = view_upper.max(lower_ref);
            }
            AxisScale::Linear => {
                if lower == lower_ref {
                    lower = 0.0;
                }
                if upper == lower_ref {
                    upper = 0.0;
                }
                if view_lower <= lower_ref {
                    view_lower = 0.0;
                }
                if view_upper <= lower_ref {
                    view_upper = 0.0;
                }
            }
        }
        check_bounds(scale, lower, upper)?;

        let changed = self.scale != scale;
        self.scale = scale;
        self.lower = lower;
        self.upper = upper;
        if changed && self.n_pixels != 0.0 && view_lower != view_upper {
            self.apply_view_bounds(view_lower, view_upper);
        }
        Ok(())
    }
}
