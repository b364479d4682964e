//! Transformation descriptors and the pixel laws they denote.
//!
//! A [`TransformationSpec`] names one of eight transformations together with
//! its parameters. Geometric kinds (crop, rotations, flips) are pure pixel
//! correspondences: every output pixel equals one input pixel. Pointwise kinds
//! (brighten, contrast) keep positions and rewrite each channel through an
//! integer law with saturation at `0` and `255`.
//!
//! Rotations are clockwise (`Rotate90`) and counter-clockwise (`Rotate270`),
//! matching `image::imageops::{rotate90, rotate270}`.

#![forbid(unsafe_code)]

use std::fmt;
use std::str::FromStr;

use ark_serialize::{
    CanonicalDeserialize, CanonicalSerialize, Compress, Read, SerializationError, Valid, Validate,
    Write,
};
use serde::{Deserialize, Serialize};

use crate::circuit::BuildError;
use crate::grid::{Dims, PixelGrid};

/// Largest magnitude accepted for a brighten offset.
pub const MAX_BRIGHTEN_DELTA: i32 = 255;
/// Largest magnitude accepted for a contrast factor.
pub const MAX_CONTRAST_FACTOR: i32 = 100;

/// Contrast denominator: `d = N / CONTRAST_DENOMINATOR` with `N` the integer numerator.
pub(crate) const CONTRAST_DENOMINATOR: i64 = 20_000;

/// The eight transformation kinds, without parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformKind {
    /// Rectangular sub-window.
    Crop,
    /// Quarter turn clockwise.
    Rotate90,
    /// Half turn.
    Rotate180,
    /// Quarter turn counter-clockwise.
    Rotate270,
    /// Mirror left/right.
    FlipHorizontal,
    /// Mirror top/bottom.
    FlipVertical,
    /// Saturating additive offset.
    Brighten,
    /// Saturating contrast stretch around mid-grey.
    Contrast,
}

impl TransformKind {
    /// All kinds, in tag order.
    pub const ALL: [TransformKind; 8] = [
        TransformKind::Crop,
        TransformKind::Rotate90,
        TransformKind::Rotate180,
        TransformKind::Rotate270,
        TransformKind::FlipHorizontal,
        TransformKind::FlipVertical,
        TransformKind::Brighten,
        TransformKind::Contrast,
    ];

    /// Stable name, also the artifact sub-directory.
    pub fn name(&self) -> &'static str {
        match self {
            TransformKind::Crop => "crop",
            TransformKind::Rotate90 => "rotate90",
            TransformKind::Rotate180 => "rotate180",
            TransformKind::Rotate270 => "rotate270",
            TransformKind::FlipHorizontal => "flip_horizontal",
            TransformKind::FlipVertical => "flip_vertical",
            TransformKind::Brighten => "brighten",
            TransformKind::Contrast => "contrast",
        }
    }

    fn tag(&self) -> u8 {
        match self {
            TransformKind::Crop => 1,
            TransformKind::Rotate90 => 2,
            TransformKind::Rotate180 => 3,
            TransformKind::Rotate270 => 4,
            TransformKind::FlipHorizontal => 5,
            TransformKind::FlipVertical => 6,
            TransformKind::Brighten => 7,
            TransformKind::Contrast => 8,
        }
    }

    /// True for kinds whose output pixels are copies of input pixels.
    pub fn is_geometric(&self) -> bool {
        !matches!(self, TransformKind::Brighten | TransformKind::Contrast)
    }
}

impl fmt::Display for TransformKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Unknown transformation name.
#[derive(Debug, thiserror::Error)]
#[error("unknown transformation {0:?}")]
pub struct UnknownTransform(pub String);

impl FromStr for TransformKind {
    type Err = UnknownTransform;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let norm = s.trim().to_ascii_lowercase().replace('-', "_");
        TransformKind::ALL
            .into_iter()
            .find(|k| k.name() == norm)
            .ok_or_else(|| UnknownTransform(s.to_string()))
    }
}

/// A transformation kind with its parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransformationSpec {
    /// Window whose top-left corner is `(row_offset, col_offset)`; its size is
    /// the final grid's size.
    Crop {
        /// First original row kept.
        row_offset: usize,
        /// First original column kept.
        col_offset: usize,
    },
    /// Quarter turn clockwise.
    Rotate90,
    /// Half turn.
    Rotate180,
    /// Quarter turn counter-clockwise.
    Rotate270,
    /// Mirror left/right.
    FlipHorizontal,
    /// Mirror top/bottom.
    FlipVertical,
    /// `clamp(x + delta, 0, 255)` per channel.
    Brighten {
        /// Additive offset in `[-255, 255]`.
        delta: i32,
    },
    /// Contrast stretch, `factor` in `[-100, 100]`.
    Contrast {
        /// Percentage-style contrast factor.
        factor: i32,
    },
}

/// How a final channel value relates to the corresponding original one.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelLaw {
    /// Equality.
    Copy,
    /// `clamp(x + delta)`.
    Brighten(i32),
    /// `clamp(floor(((2x - 255)·K + 2_550_000) / 20_000))` with `K = (100 + factor)^2`.
    Contrast(i32),
}

impl ChannelLaw {
    /// Apply the law to one channel value.
    pub fn apply(&self, x: u8) -> u8 {
        match *self {
            ChannelLaw::Copy => x,
            ChannelLaw::Brighten(delta) => clamp_u8(i64::from(x) + i64::from(delta)),
            ChannelLaw::Contrast(factor) => {
                let (scale, constant) = contrast_coefficients(factor);
                clamp_u8((scale * i64::from(x) + constant).div_euclid(CONTRAST_DENOMINATOR))
            }
        }
    }
}

/// Integer coefficients `(2K, 2_550_000 − 255K)` of the contrast numerator
/// `N(x) = 2K·x + (2_550_000 − 255K)`.
pub(crate) fn contrast_coefficients(factor: i32) -> (i64, i64) {
    let k = (100 + i64::from(factor)).pow(2);
    (2 * k, 2_550_000 - 255 * k)
}

fn clamp_u8(v: i64) -> u8 {
    v.clamp(0, 255) as u8
}

impl TransformationSpec {
    /// Parameter-free kind.
    pub fn kind(&self) -> TransformKind {
        match self {
            TransformationSpec::Crop { .. } => TransformKind::Crop,
            TransformationSpec::Rotate90 => TransformKind::Rotate90,
            TransformationSpec::Rotate180 => TransformKind::Rotate180,
            TransformationSpec::Rotate270 => TransformKind::Rotate270,
            TransformationSpec::FlipHorizontal => TransformKind::FlipHorizontal,
            TransformationSpec::FlipVertical => TransformKind::FlipVertical,
            TransformationSpec::Brighten { .. } => TransformKind::Brighten,
            TransformationSpec::Contrast { .. } => TransformKind::Contrast,
        }
    }

    /// Reject parameters outside their documented ranges.
    pub fn validate_params(&self) -> Result<(), BuildError> {
        match *self {
            TransformationSpec::Brighten { delta } if delta.unsigned_abs() > MAX_BRIGHTEN_DELTA.unsigned_abs() => {
                Err(BuildError::InvalidParameter(format!(
                    "brighten delta {delta} outside [-{MAX_BRIGHTEN_DELTA}, {MAX_BRIGHTEN_DELTA}]"
                )))
            }
            TransformationSpec::Contrast { factor } if factor.unsigned_abs() > MAX_CONTRAST_FACTOR.unsigned_abs() => {
                Err(BuildError::InvalidParameter(format!(
                    "contrast factor {factor} outside [-{MAX_CONTRAST_FACTOR}, {MAX_CONTRAST_FACTOR}]"
                )))
            }
            _ => Ok(()),
        }
    }

    /// Output dimensions implied by the original's, or `None` for crop.
    pub fn output_dims(&self, original: Dims) -> Option<Dims> {
        match self {
            TransformationSpec::Crop { .. } => None,
            TransformationSpec::Rotate90 | TransformationSpec::Rotate270 => {
                Some(original.transposed())
            }
            _ => Some(original),
        }
    }

    /// Check that `final_dims` is a legal output size for `original`.
    ///
    /// Runs before any constraint is emitted; a zero dimension on either side
    /// is rejected for every kind.
    pub fn check_dims(&self, original: Dims, final_dims: Dims) -> Result<(), BuildError> {
        if original.is_empty() || final_dims.is_empty() {
            return Err(BuildError::EmptyGrid { original, final_dims });
        }
        match (*self, self.output_dims(original)) {
            (TransformationSpec::Crop { row_offset, col_offset }, _) => {
                let rows_fit = row_offset
                    .checked_add(final_dims.height)
                    .map_or(false, |end| end <= original.height);
                let cols_fit = col_offset
                    .checked_add(final_dims.width)
                    .map_or(false, |end| end <= original.width);
                if rows_fit && cols_fit {
                    Ok(())
                } else {
                    Err(BuildError::CropOutOfBounds {
                        row_offset,
                        col_offset,
                        original,
                        final_dims,
                    })
                }
            }
            (_, Some(expected)) if expected == final_dims => Ok(()),
            _ => Err(BuildError::DimensionMismatch { kind: self.kind(), original, final_dims }),
        }
    }

    /// Original position whose pixel feeds final position `(row, col)`.
    ///
    /// `original` must have passed [`Self::check_dims`] together with the
    /// final dimensions the caller iterates over.
    pub fn source_position(&self, original: Dims, row: usize, col: usize) -> (usize, usize) {
        let (h, w) = (original.height, original.width);
        match *self {
            TransformationSpec::Crop { row_offset, col_offset } => (row + row_offset, col + col_offset),
            TransformationSpec::Rotate90 => (h - 1 - col, row),
            TransformationSpec::Rotate180 => (h - 1 - row, w - 1 - col),
            TransformationSpec::Rotate270 => (col, w - 1 - row),
            TransformationSpec::FlipHorizontal => (row, w - 1 - col),
            TransformationSpec::FlipVertical => (h - 1 - row, col),
            TransformationSpec::Brighten { .. } | TransformationSpec::Contrast { .. } => (row, col),
        }
    }

    /// Per-channel law relating corresponding values.
    pub fn channel_law(&self) -> ChannelLaw {
        match *self {
            TransformationSpec::Brighten { delta } => ChannelLaw::Brighten(delta),
            TransformationSpec::Contrast { factor } => ChannelLaw::Contrast(factor),
            _ => ChannelLaw::Copy,
        }
    }

    /// Apply the transform to `original`.
    ///
    /// `crop` is the window size for [`TransformationSpec::Crop`] and is
    /// ignored by every other kind.
    pub fn apply(&self, original: &PixelGrid, crop: Option<Dims>) -> Result<PixelGrid, BuildError> {
        self.validate_params()?;
        let dims = match self.output_dims(original.dims()) {
            Some(d) => d,
            None => crop.ok_or_else(|| {
                BuildError::InvalidParameter("crop needs an output size".to_string())
            })?,
        };
        self.check_dims(original.dims(), dims)?;
        let law = self.channel_law();
        let mut pixels = Vec::with_capacity(dims.pixels());
        for r in 0..dims.height {
            for c in 0..dims.width {
                let (sr, sc) = self.source_position(original.dims(), r, c);
                let px = original.get(sr, sc).ok_or(BuildError::DimensionMismatch {
                    kind: self.kind(),
                    original: original.dims(),
                    final_dims: dims,
                })?;
                pixels.push(px.map(|v| law.apply(v)));
            }
        }
        PixelGrid::new(dims.height, dims.width, pixels)
            .map_err(|e| BuildError::InvalidParameter(e.to_string()))
    }
}

impl fmt::Display for TransformationSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransformationSpec::Crop { row_offset, col_offset } => {
                write!(f, "crop(row_offset={row_offset}, col_offset={col_offset})")
            }
            TransformationSpec::Brighten { delta } => write!(f, "brighten(delta={delta})"),
            TransformationSpec::Contrast { factor } => write!(f, "contrast(factor={factor})"),
            other => f.write_str(other.kind().name()),
        }
    }
}

// Tag byte followed by little-endian parameters, so keys can embed the statement.
impl CanonicalSerialize for TransformationSpec {
    fn serialize_with_mode<W: Write>(
        &self,
        mut w: W,
        _cm: Compress,
    ) -> Result<(), SerializationError> {
        w.write_all(&[self.kind().tag()])?;
        match *self {
            TransformationSpec::Crop { row_offset, col_offset } => {
                w.write_all(&(row_offset as u64).to_le_bytes())?;
                w.write_all(&(col_offset as u64).to_le_bytes())?;
            }
            TransformationSpec::Brighten { delta } => w.write_all(&delta.to_le_bytes())?,
            TransformationSpec::Contrast { factor } => w.write_all(&factor.to_le_bytes())?,
            _ => {}
        }
        Ok(())
    }

    fn serialized_size(&self, _cm: Compress) -> usize {
        1 + match self {
            TransformationSpec::Crop { .. } => 16,
            TransformationSpec::Brighten { .. } | TransformationSpec::Contrast { .. } => 4,
            _ => 0,
        }
    }
}

impl CanonicalDeserialize for TransformationSpec {
    fn deserialize_with_mode<R: Read>(
        mut r: R,
        _cm: Compress,
        validate: Validate,
    ) -> Result<Self, SerializationError> {
        let mut tag = [0u8; 1];
        r.read_exact(&mut tag)?;
        let kind = TransformKind::ALL
            .into_iter()
            .find(|k| k.tag() == tag[0])
            .ok_or(SerializationError::InvalidData)?;
        let spec = match kind {
            TransformKind::Crop => {
                let mut a = [0u8; 8];
                let mut b = [0u8; 8];
                r.read_exact(&mut a)?;
                r.read_exact(&mut b)?;
                let row_offset =
                    usize::try_from(u64::from_le_bytes(a)).map_err(|_| SerializationError::InvalidData)?;
                let col_offset =
                    usize::try_from(u64::from_le_bytes(b)).map_err(|_| SerializationError::InvalidData)?;
                TransformationSpec::Crop { row_offset, col_offset }
            }
            TransformKind::Rotate90 => TransformationSpec::Rotate90,
            TransformKind::Rotate180 => TransformationSpec::Rotate180,
            TransformKind::Rotate270 => TransformationSpec::Rotate270,
            TransformKind::FlipHorizontal => TransformationSpec::FlipHorizontal,
            TransformKind::FlipVertical => TransformationSpec::FlipVertical,
            TransformKind::Brighten | TransformKind::Contrast => {
                let mut p = [0u8; 4];
                r.read_exact(&mut p)?;
                let v = i32::from_le_bytes(p);
                if kind == TransformKind::Brighten {
                    TransformationSpec::Brighten { delta: v }
                } else {
                    TransformationSpec::Contrast { factor: v }
                }
            }
        };
        if let Validate::Yes = validate {
            spec.check()?;
        }
        Ok(spec)
    }
}

impl Valid for TransformationSpec {
    fn check(&self) -> Result<(), SerializationError> {
        self.validate_params().map_err(|_| SerializationError::InvalidData)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid_2x3() -> PixelGrid {
        // value encodes (row, col)
        PixelGrid::from_fn(2, 3, |r, c| [(10 * r + c) as u8, 0, 0]).unwrap()
    }

    fn red(g: &PixelGrid, r: usize, c: usize) -> u8 {
        g.get(r, c).unwrap()[0]
    }

    #[test]
    fn rotate90_is_clockwise() {
        let g = grid_2x3();
        let out = TransformationSpec::Rotate90.apply(&g, None).unwrap();
        assert_eq!(out.dims(), Dims::new(3, 2));
        // top row of the result is the original left column, read bottom-up
        assert_eq!(red(&out, 0, 0), 10);
        assert_eq!(red(&out, 0, 1), 0);
        assert_eq!(red(&out, 2, 0), 12);
    }

    #[test]
    fn rotate270_undoes_rotate90() {
        let g = grid_2x3();
        let once = TransformationSpec::Rotate90.apply(&g, None).unwrap();
        let back = TransformationSpec::Rotate270.apply(&once, None).unwrap();
        assert_eq!(back, g);
    }

    #[test]
    fn matches_image_crate_rotations() {
        let g = PixelGrid::from_fn(3, 5, |r, c| [r as u8, c as u8, (r * c) as u8]).unwrap();
        let rgb = g.to_rgb();
        let cw = image::imageops::rotate90(&rgb);
        let ccw = image::imageops::rotate270(&rgb);
        assert_eq!(TransformationSpec::Rotate90.apply(&g, None).unwrap().to_rgb(), cw);
        assert_eq!(TransformationSpec::Rotate270.apply(&g, None).unwrap().to_rgb(), ccw);
    }

    #[test]
    fn flips_and_crop() {
        let g = grid_2x3();
        let h = TransformationSpec::FlipHorizontal.apply(&g, None).unwrap();
        assert_eq!(red(&h, 0, 0), 2);
        let v = TransformationSpec::FlipVertical.apply(&g, None).unwrap();
        assert_eq!(red(&v, 0, 0), 10);
        let spec = TransformationSpec::Crop { row_offset: 1, col_offset: 1 };
        let c = spec.apply(&g, Some(Dims::new(1, 2))).unwrap();
        assert_eq!(c.dims(), Dims::new(1, 2));
        assert_eq!(red(&c, 0, 1), 12);
    }

    #[test]
    fn dimension_guards() {
        let o = Dims::new(2, 3);
        assert!(matches!(
            TransformationSpec::Rotate90.check_dims(o, o),
            Err(BuildError::DimensionMismatch { .. })
        ));
        assert!(matches!(
            TransformationSpec::FlipVertical.check_dims(o, Dims::new(0, 3)),
            Err(BuildError::EmptyGrid { .. })
        ));
        let crop = TransformationSpec::Crop { row_offset: 1, col_offset: 2 };
        assert!(crop.check_dims(o, Dims::new(1, 1)).is_ok());
        assert!(matches!(
            crop.check_dims(o, Dims::new(1, 2)),
            Err(BuildError::CropOutOfBounds { .. })
        ));
    }

    #[test]
    fn brighten_saturates() {
        assert_eq!(ChannelLaw::Brighten(10).apply(250), 255);
        assert_eq!(ChannelLaw::Brighten(-10).apply(5), 0);
        assert_eq!(ChannelLaw::Brighten(10).apply(100), 110);
    }

    #[test]
    fn contrast_law_matches_rational_form() {
        // factor 0 is the identity
        for x in [0u8, 1, 127, 128, 254, 255] {
            assert_eq!(ChannelLaw::Contrast(0).apply(x), x);
        }
        // factor 100 stretches the distance from 127.5 fourfold
        assert_eq!(ChannelLaw::Contrast(100).apply(128), 129);
        assert_eq!(ChannelLaw::Contrast(100).apply(127), 125);
        assert_eq!(ChannelLaw::Contrast(100).apply(200), 255);
        assert_eq!(ChannelLaw::Contrast(100).apply(50), 0);
        assert_eq!(ChannelLaw::Contrast(20).apply(200), 231);
        // factor -100 collapses everything to mid-grey
        assert_eq!(ChannelLaw::Contrast(-100).apply(3), 127);
    }

    #[test]
    fn parameter_ranges() {
        assert!(TransformationSpec::Brighten { delta: 256 }.validate_params().is_err());
        assert!(TransformationSpec::Contrast { factor: -101 }.validate_params().is_err());
        assert!(TransformationSpec::Contrast { factor: 100 }.validate_params().is_ok());
    }

    #[test]
    fn canonical_encoding_round_trips_parameters() {
        let spec = TransformationSpec::Crop { row_offset: 3, col_offset: 7 };
        let mut bytes = Vec::new();
        spec.serialize_compressed(&mut bytes).unwrap();
        assert_eq!(bytes.len(), spec.compressed_size());
        let back = TransformationSpec::deserialize_compressed(&bytes[..]).unwrap();
        assert_eq!(back, spec);
        assert!(TransformationSpec::deserialize_compressed(&[9u8][..]).is_err());
    }

    #[test]
    fn kind_names_parse() {
        for k in TransformKind::ALL {
            assert_eq!(k.name().parse::<TransformKind>().unwrap(), k);
        }
        assert_eq!("flip-horizontal".parse::<TransformKind>().unwrap(), TransformKind::FlipHorizontal);
        assert!("shear".parse::<TransformKind>().is_err());
    }
}
