//! Row-major ARGB pixel buffers with a circular row pointer

use serde::{Deserialize, Serialize};

/// How time is laid out in a drawn frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TimeAxisMode {
    /// Oldest row first, newest row last
    #[default]
    Shift,
    /// Rows in storage order; `cursor_row` marks where the next row goes
    Overwrite,
}

/// Where one column range of a segmented raster lands on the canvas
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentPlacement {
    /// First raster column of the segment
    pub src_x: usize,
    /// Columns in the segment
    pub src_width: usize,
    /// Canvas position of the segment's low-frequency edge, unzoomed pixels
    pub dest_start: f64,
    /// Canvas position of the segment's high-frequency edge
    pub dest_end: f64,
    /// Horizontal stretch, `(dest_end - dest_start) / src_width`
    pub scale: f64,
}

/// Borrowed frame handed to the rendering layer
#[derive(Debug, Clone, Copy)]
pub struct RasterView<'a> {
    pub pixels: &'a [u32],
    pub width: usize,
    pub height: usize,
    /// Next row to be written, only in overwrite mode
    pub cursor_row: Option<usize>,
    /// Non-empty for the segmented log renderer
    pub segments: &'a [SegmentPlacement],
    /// Frequency columns run high to low
    pub mirrored: bool,
    /// Bilinear filtering requested
    pub smooth: bool,
}

impl<'a> RasterView<'a> {
    pub fn row(&self, t: usize) -> &'a [u32] {
        &self.pixels[t * self.width..(t + 1) * self.width]
    }
}

#[derive(Debug, Clone, Default)]
pub struct Raster {
    width: usize,
    height: usize,
    pixels: Vec<u32>,
    shift_cache: Vec<u32>,
    pointer: usize,
}

impl Raster {
    pub fn new(width: usize, height: usize) -> Self {
        let mut raster = Self::default();
        raster.resize(width, height);
        raster
    }

    /// Reallocate if the size changed; returns whether the content was cleared
    pub fn resize(&mut self, width: usize, height: usize) -> bool {
        if width == self.width && height == self.height {
            return false;
        }
        self.width = width;
        self.height = height;
        self.pixels = vec![0; width * height];
        self.shift_cache = vec![0; width * height];
        self.pointer = 0;
        true
    }

    pub fn clear(&mut self) {
        self.pixels.fill(0);
        self.pointer = 0;
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn pointer(&self) -> usize {
        self.pointer
    }

    pub fn set_pointer(&mut self, pointer: usize) {
        self.pointer = if self.height == 0 { 0 } else { pointer % self.height };
    }

    /// Row under the pointer
    pub fn current_row_mut(&mut self) -> &mut [u32] {
        let start = self.pointer * self.width;
        &mut self.pixels[start..start + self.width]
    }

    pub fn advance(&mut self) {
        if self.height > 0 {
            self.pointer = (self.pointer + 1) % self.height;
        }
    }

    /// Frame in the requested time layout
    ///
    /// Shift mode rotates the buffer into a scratch copy; overwrite mode
    /// hands out the buffer itself.
    pub fn view<'a>(
        &'a mut self,
        mode: TimeAxisMode,
        segments: &'a [SegmentPlacement],
        mirrored: bool,
        smooth: bool,
    ) -> RasterView<'a> {
        let (pixels, cursor_row) = match mode {
            TimeAxisMode::Shift => {
                let split = self.pointer * self.width;
                let tail = self.pixels.len() - split;
                self.shift_cache[..tail].copy_from_slice(&self.pixels[split..]);
                self.shift_cache[tail..].copy_from_slice(&self.pixels[..split]);
                (&self.shift_cache[..], None)
            }
            TimeAxisMode::Overwrite => (&self.pixels[..], Some(self.pointer)),
        };

        RasterView {
            pixels,
            width: self.width,
            height: self.height,
            cursor_row,
            segments,
            mirrored,
            smooth,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_rows(raster: &mut Raster, values: impl IntoIterator<Item = u32>) {
        for v in values {
            raster.current_row_mut().fill(v);
            raster.advance();
        }
    }

    #[test]
    fn test_shift_view_is_oldest_first() {
        let mut raster = Raster::new(2, 4);
        write_rows(&mut raster, 1..=6);
        assert_eq!(raster.pointer(), 2);

        let view = raster.view(TimeAxisMode::Shift, &[], false, false);
        let firsts: Vec<u32> = (0..4).map(|t| view.row(t)[0]).collect();
        assert_eq!(firsts, vec![3, 4, 5, 6]);
        assert_eq!(view.cursor_row, None);
    }

    #[test]
    fn test_overwrite_view_is_storage_order() {
        let mut raster = Raster::new(2, 4);
        write_rows(&mut raster, 1..=6);

        let view = raster.view(TimeAxisMode::Overwrite, &[], false, false);
        let firsts: Vec<u32> = (0..4).map(|t| view.row(t)[0]).collect();
        assert_eq!(firsts, vec![5, 6, 3, 4]);
        assert_eq!(view.cursor_row, Some(2));
    }

    #[test]
    fn test_resize_clears_only_on_change() {
        let mut raster = Raster::new(3, 3);
        write_rows(&mut raster, [7]);
        assert!(!raster.resize(3, 3));
        assert_eq!(raster.pointer(), 1);
        assert!(raster.resize(4, 3));
        assert_eq!(raster.pointer(), 0);
    }
}
