//! Dense multi-channel 2D grid with bilinear sampling.
//!
//! The grid backs a periodic ocean patch, so sampling never rejects a
//! coordinate: anything out of range is remapped by wrapping (the patch tiles
//! infinitely) or clamping to the edge texel.

use crate::error::{QueryError, Result};

/// Remap `index` into `[0, size)` by wrapping.
///
/// Negative indices wrap from the opposite edge.
pub fn wrap_address(index: i64, size: usize) -> usize {
    debug_assert!(size > 0);
    index.rem_euclid(size as i64) as usize
}

/// Remap `index` into `[0, size)` by clamping to the nearest edge.
pub fn clamp_address(index: i64, size: usize) -> usize {
    debug_assert!(size > 0);
    index.clamp(0, size as i64 - 1) as usize
}

#[inline]
fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

/// Row-major grid of `width * height` texels with `channels` values each.
#[derive(Debug, Clone, PartialEq)]
pub struct InterpolatedGrid {
    data: Vec<f32>,
    width: usize,
    height: usize,
    channels: usize,
    wrap: bool,
    half_pixel_offset: bool,
}

impl InterpolatedGrid {
    /// Create a zero-filled wrapping grid.
    pub fn new(width: usize, height: usize, channels: usize) -> Result<Self> {
        let len = checked_len(width, height, channels)?;
        Ok(Self {
            data: vec![0.0; len],
            width,
            height,
            channels,
            wrap: true,
            half_pixel_offset: false,
        })
    }

    /// Wrap an existing buffer laid out as `(x + y * width) * channels + c`.
    pub fn from_data(width: usize, height: usize, channels: usize, data: Vec<f32>) -> Result<Self> {
        let expected = checked_len(width, height, channels)?;
        if data.len() != expected {
            return Err(QueryError::size_mismatch(expected, data.len()));
        }
        Ok(Self {
            data,
            width,
            height,
            channels,
            wrap: true,
            half_pixel_offset: false,
        })
    }

    /// Clamp to the edge instead of wrapping.
    pub fn with_wrap(mut self, wrap: bool) -> Self {
        self.wrap = wrap;
        self
    }

    /// Treat texel values as sitting at texel centers.
    pub fn with_half_pixel_offset(mut self, half_pixel_offset: bool) -> Self {
        self.half_pixel_offset = half_pixel_offset;
        self
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn wraps(&self) -> bool {
        self.wrap
    }

    pub fn half_pixel_offset(&self) -> bool {
        self.half_pixel_offset
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    pub fn fill(&mut self, value: f32) {
        self.data.fill(value);
    }

    #[inline]
    pub fn index(&self, x: usize, y: usize, channel: usize) -> usize {
        (x + y * self.width) * self.channels + channel
    }

    pub fn get(&self, x: usize, y: usize, channel: usize) -> f32 {
        self.data[self.index(x, y, channel)]
    }

    pub fn set(&mut self, x: usize, y: usize, channel: usize, value: f32) {
        let index = self.index(x, y, channel);
        self.data[index] = value;
    }

    /// All channels of one texel.
    pub fn texel(&self, x: usize, y: usize) -> &[f32] {
        let start = self.index(x, y, 0);
        &self.data[start..start + self.channels]
    }

    /// Same dimensions, channel count and addressing flags.
    pub fn same_layout(&self, other: &Self) -> bool {
        self.width == other.width
            && self.height == other.height
            && self.channels == other.channels
            && self.wrap == other.wrap
            && self.half_pixel_offset == other.half_pixel_offset
    }

    /// Overwrite this grid's values with `other`'s without reallocating.
    ///
    /// Both grids must share a layout.
    pub fn copy_from(&mut self, other: &Self) {
        debug_assert!(
            self.same_layout(other),
            "grid layout mismatch: {}x{}x{} vs {}x{}x{}",
            self.width,
            self.height,
            self.channels,
            other.width,
            other.height,
            other.channels
        );
        self.data.copy_from_slice(&other.data);
    }

    /// Remap a texel coordinate on the x axis.
    pub fn address_x(&self, x: i64) -> usize {
        self.address(x, self.width)
    }

    /// Remap a texel coordinate on the y axis.
    pub fn address_y(&self, y: i64) -> usize {
        self.address(y, self.height)
    }

    fn address(&self, index: i64, size: usize) -> usize {
        if self.wrap {
            wrap_address(index, size)
        } else {
            clamp_address(index, size)
        }
    }

    /// Both bilinear neighbors of `coord` on one axis plus the blend weight
    /// toward the second.
    fn neighbor_pair(&self, coord: f32, size: usize) -> (usize, usize, f32) {
        let base = coord.trunc();
        let weight = (coord - base).abs();
        let step = if coord < 0.0 { -1 } else { 1 };
        let first = base as i64;
        let second = first.saturating_add(step);
        (self.address(first, size), self.address(second, size), weight)
    }

    /// Bilinear sample at normalized `(u, v)`, writing every channel to `out`.
    ///
    /// `(0, 0)` is the first texel and `(1, 1)` the last (or, with the
    /// half-pixel offset, the far texel edge). Coordinates outside `[0, 1]`
    /// wrap or clamp.
    pub fn sample(&self, u: f32, v: f32, out: &mut [f32]) {
        debug_assert!(
            out.len() >= self.channels,
            "sample output holds {} values, grid has {} channels",
            out.len(),
            self.channels
        );

        let (x, y) = if self.half_pixel_offset {
            (
                u * self.width as f32 - 0.5,
                v * self.height as f32 - 0.5,
            )
        } else {
            (
                u * (self.width - 1) as f32,
                v * (self.height - 1) as f32,
            )
        };

        let (x0, x1, fx) = self.neighbor_pair(x, self.width);
        let (y0, y1, fy) = self.neighbor_pair(y, self.height);

        let t00 = self.index(x0, y0, 0);
        let t10 = self.index(x1, y0, 0);
        let t01 = self.index(x0, y1, 0);
        let t11 = self.index(x1, y1, 0);

        for (c, slot) in out.iter_mut().take(self.channels).enumerate() {
            let top = lerp(self.data[t00 + c], self.data[t10 + c], fx);
            let bottom = lerp(self.data[t01 + c], self.data[t11 + c], fx);
            *slot = lerp(top, bottom, fy);
        }
    }
}

fn checked_len(width: usize, height: usize, channels: usize) -> Result<usize> {
    if width == 0 || height == 0 || channels == 0 {
        return Err(QueryError::InvalidGrid(format!(
            "dimensions must be non-zero, got {width}x{height}x{channels}"
        )));
    }
    width
        .checked_mul(height)
        .and_then(|texels| texels.checked_mul(channels))
        .ok_or_else(|| {
            QueryError::InvalidGrid(format!("{width}x{height}x{channels} overflows"))
        })
}
