//! Pixel rasters: height × width grids of RGB triples.
//!
//! Channels are `u8`, so every value is in `[0, 255]` by construction. Pixels
//! are stored row-major; the same order fixes the public-input enumeration of
//! the circuits built over a grid.

#![forbid(unsafe_code)]

use std::fmt;
use std::io::Cursor;
use std::path::Path;

use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};
use image::{DynamicImage, ImageOutputFormat, RgbImage};
use serde::{Deserialize, Serialize};

/// Grid dimensions, `height` rows of `width` pixels.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    CanonicalSerialize,
    CanonicalDeserialize,
)]
pub struct Dims {
    /// Number of rows.
    pub height: usize,
    /// Number of columns.
    pub width: usize,
}

impl Dims {
    /// Construct dimensions.
    pub const fn new(height: usize, width: usize) -> Self {
        Self { height, width }
    }

    /// Number of pixels.
    pub const fn pixels(&self) -> usize {
        self.height * self.width
    }

    /// Number of channel values (three per pixel).
    pub const fn channels(&self) -> usize {
        self.pixels() * 3
    }

    /// True if either side is zero.
    pub const fn is_empty(&self) -> bool {
        self.height == 0 || self.width == 0
    }

    /// Dimensions with rows and columns swapped.
    pub const fn transposed(&self) -> Self {
        Self { height: self.width, width: self.height }
    }
}

impl fmt::Display for Dims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.height, self.width)
    }
}

/// Errors raised while constructing a grid.
#[derive(Debug, thiserror::Error)]
pub enum GridError {
    /// A grid needs at least one row and one column.
    #[error("pixel grid must be non-empty (got {0})")]
    Empty(Dims),
    /// Row `row` has a different width from row 0.
    #[error("row {row} has {got} pixels, expected {expected}")]
    Ragged {
        /// Offending row.
        row: usize,
        /// Width of row 0.
        expected: usize,
        /// Width of the offending row.
        got: usize,
    },
    /// Flat buffer length does not equal `height * width`.
    #[error("pixel buffer holds {got} pixels, dimensions {dims} need {expected}")]
    Length {
        /// Declared dimensions.
        dims: Dims,
        /// Required pixel count.
        expected: usize,
        /// Supplied pixel count.
        got: usize,
    },
    /// The image codec rejected the input.
    #[error("image codec: {0}")]
    Codec(#[from] image::ImageError),
}

/// Immutable RGB raster.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PixelGrid {
    dims: Dims,
    pixels: Vec<[u8; 3]>,
}

impl PixelGrid {
    /// Build a grid from a row-major pixel buffer.
    pub fn new(height: usize, width: usize, pixels: Vec<[u8; 3]>) -> Result<Self, GridError> {
        let dims = Dims::new(height, width);
        if dims.is_empty() {
            return Err(GridError::Empty(dims));
        }
        if pixels.len() != dims.pixels() {
            return Err(GridError::Length { dims, expected: dims.pixels(), got: pixels.len() });
        }
        Ok(Self { dims, pixels })
    }

    /// Build a grid from nested rows; every row must have the same width.
    pub fn from_rows(rows: Vec<Vec<[u8; 3]>>) -> Result<Self, GridError> {
        let height = rows.len();
        let width = rows.first().map_or(0, Vec::len);
        let mut pixels = Vec::with_capacity(height * width);
        for (row, r) in rows.into_iter().enumerate() {
            if r.len() != width {
                return Err(GridError::Ragged { row, expected: width, got: r.len() });
            }
            pixels.extend(r);
        }
        Self::new(height, width, pixels)
    }

    /// Grid where the pixel at `(r, c)` is `f(r, c)`.
    pub fn from_fn(
        height: usize,
        width: usize,
        mut f: impl FnMut(usize, usize) -> [u8; 3],
    ) -> Result<Self, GridError> {
        let mut pixels = Vec::with_capacity(height * width);
        for r in 0..height {
            for c in 0..width {
                pixels.push(f(r, c));
            }
        }
        Self::new(height, width, pixels)
    }

    /// Grid with every pixel equal to `px`.
    pub fn filled(height: usize, width: usize, px: [u8; 3]) -> Result<Self, GridError> {
        Self::new(height, width, vec![px; height * width])
    }

    /// Dimensions of the grid.
    pub fn dims(&self) -> Dims {
        self.dims
    }

    /// Number of rows.
    pub fn height(&self) -> usize {
        self.dims.height
    }

    /// Number of columns.
    pub fn width(&self) -> usize {
        self.dims.width
    }

    /// Pixel at `(row, col)`, or `None` outside the grid.
    pub fn get(&self, row: usize, col: usize) -> Option<[u8; 3]> {
        if row < self.dims.height && col < self.dims.width {
            self.pixels.get(row * self.dims.width + col).copied()
        } else {
            None
        }
    }

    /// Row-major pixel slice.
    pub fn pixels(&self) -> &[[u8; 3]] {
        &self.pixels
    }

    /// Channel values in row-major, channel-minor order.
    pub fn channel_values(&self) -> impl Iterator<Item = u8> + '_ {
        self.pixels.iter().flat_map(|px| px.iter().copied())
    }

    /// Copy of the grid with one pixel replaced. Out-of-range positions
    /// return an unchanged copy.
    pub fn with_pixel(&self, row: usize, col: usize, px: [u8; 3]) -> Self {
        let mut out = self.clone();
        if row < self.dims.height && col < self.dims.width {
            out.pixels[row * self.dims.width + col] = px;
        }
        out
    }

    /// Convert from a decoded RGB image.
    pub fn from_rgb(img: &RgbImage) -> Result<Self, GridError> {
        let (w, h) = img.dimensions();
        let pixels = img.pixels().map(|p| p.0).collect();
        Self::new(h as usize, w as usize, pixels)
    }

    /// Convert into an RGB image buffer.
    pub fn to_rgb(&self) -> RgbImage {
        RgbImage::from_fn(self.dims.width as u32, self.dims.height as u32, |x, y| {
            image::Rgb(self.pixels[y as usize * self.dims.width + x as usize])
        })
    }

    /// Decode an encoded image (PNG, JPEG). Alpha is discarded.
    pub fn decode(bytes: &[u8]) -> Result<Self, GridError> {
        let img = image::load_from_memory(bytes)?;
        Self::from_rgb(&img.to_rgb8())
    }

    /// Encode as PNG.
    pub fn encode_png(&self) -> Result<Vec<u8>, GridError> {
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(self.to_rgb()).write_to(&mut out, ImageOutputFormat::Png)?;
        Ok(out.into_inner())
    }

    /// Open and decode an image file. Alpha is discarded.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, GridError> {
        let img = image::open(path)?;
        Self::from_rgb(&img.to_rgb8())
    }

    /// Save the grid; the format follows the file extension.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), GridError> {
        self.to_rgb().save(path)?;
        Ok(())
    }
}
