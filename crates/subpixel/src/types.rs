use std::fmt;
use std::str::FromStr;

use crate::error::{ProcessorError, Result};

/// Positive pixel extent of an image, frame, or canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Dimensions {
    width: u32,
    height: u32,
}

impl Dimensions {
    pub fn new(width: u32, height: u32) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(ProcessorError::InvalidDimensions { width, height });
        }
        Ok(Self { width, height })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Scales both axes by `factor`, flooring and keeping each axis at least 1.
    pub fn scale(&self, factor: f64) -> Self {
        let scale_axis = |value: u32| -> u32 {
            let scaled = (value as f64 * factor).floor();
            if scaled.is_finite() && scaled >= 1.0 {
                scaled.min(u32::MAX as f64) as u32
            } else {
                1
            }
        };
        Self {
            width: scale_axis(self.width),
            height: scale_axis(self.height),
        }
    }

    pub fn aspect_ratio(&self) -> f64 {
        self.width as f64 / self.height as f64
    }

    pub(crate) fn as_array(&self) -> [u32; 2] {
        [self.width, self.height]
    }

    pub(crate) fn clamped(width: u64, height: u64) -> Self {
        Self {
            width: width.clamp(1, u32::MAX as u64) as u32,
            height: height.clamp(1, u32::MAX as u64) as u32,
        }
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Axis along which the red, green, and blue stripes repeat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Orientation {
    /// Vertical stripes; the channel is picked by output column.
    #[default]
    Columns,
    /// Horizontal stripes; the channel is picked by output row.
    Rows,
}

impl Orientation {
    pub(crate) fn uniform_value(self) -> u32 {
        match self {
            Orientation::Columns => 0,
            Orientation::Rows => 1,
        }
    }
}

impl fmt::Display for Orientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Orientation::Columns => f.write_str("columns"),
            Orientation::Rows => f.write_str("rows"),
        }
    }
}

impl FromStr for Orientation {
    type Err = String;

    fn from_str(raw: &str) -> std::result::Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "columns" | "cols" | "vertical" => Ok(Orientation::Columns),
            "rows" | "horizontal" => Ok(Orientation::Rows),
            other => Err(format!(
                "unknown orientation '{other}'; expected 'columns' or 'rows'"
            )),
        }
    }
}

/// Number of input pixels grouped into one logical pixel along each axis.
///
/// Always at least 1; a density of 1 maps every input pixel to its own
/// 3x3 output block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PixelDensity(u32);

impl PixelDensity {
    pub const IDENTITY: PixelDensity = PixelDensity(1);

    pub fn new(value: u32) -> Self {
        Self(value.max(1))
    }

    /// Floors a continuous value and clamps it up to 1. Non-finite input maps to 1.
    pub fn from_f64(value: f64) -> Self {
        if !value.is_finite() || value < 1.0 {
            return Self::IDENTITY;
        }
        Self(value.floor().min(u32::MAX as f64) as u32)
    }

    pub fn get(self) -> u32 {
        self.0
    }
}

impl Default for PixelDensity {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl From<u32> for PixelDensity {
    fn from(value: u32) -> Self {
        Self::new(value)
    }
}

impl fmt::Display for PixelDensity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which half of the logical rows is drawn while interlacing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum InterlaceField {
    #[default]
    Odd,
    Even,
}

impl InterlaceField {
    pub fn toggled(self) -> Self {
        match self {
            InterlaceField::Odd => InterlaceField::Even,
            InterlaceField::Even => InterlaceField::Odd,
        }
    }

    pub(crate) fn uniform_value(self) -> u32 {
        match self {
            InterlaceField::Even => 0,
            InterlaceField::Odd => 1,
        }
    }
}

impl fmt::Display for InterlaceField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InterlaceField::Odd => f.write_str("odd"),
            InterlaceField::Even => f.write_str("even"),
        }
    }
}

impl FromStr for InterlaceField {
    type Err = String;

    fn from_str(raw: &str) -> std::result::Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "odd" => Ok(InterlaceField::Odd),
            "even" => Ok(InterlaceField::Even),
            other => Err(format!("unknown field '{other}'; expected 'odd' or 'even'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProcessorSettings {
    pub orientation: Orientation,
    pub pixel_density: PixelDensity,
    pub interlaced: bool,
    pub field: InterlaceField,
}

/// Partial settings update; only the `Some` fields are applied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SettingsPatch {
    pub orientation: Option<Orientation>,
    pub pixel_density: Option<PixelDensity>,
    pub interlaced: Option<bool>,
    pub field: Option<InterlaceField>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ImageFormat {
    #[default]
    Png,
    Jpeg,
}

impl ImageFormat {
    pub fn mime_type(self) -> &'static str {
        match self {
            ImageFormat::Png => "image/png",
            ImageFormat::Jpeg => "image/jpeg",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Jpeg => "jpg",
        }
    }

    pub fn from_mime_type(mime: &str) -> Option<Self> {
        match mime.trim().to_ascii_lowercase().as_str() {
            "image/png" => Some(ImageFormat::Png),
            "image/jpeg" | "image/jpg" => Some(ImageFormat::Jpeg),
            _ => None,
        }
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mime_type())
    }
}

impl FromStr for ImageFormat {
    type Err = String;

    fn from_str(raw: &str) -> std::result::Result<Self, Self::Err> {
        if let Some(format) = ImageFormat::from_mime_type(raw) {
            return Ok(format);
        }
        match raw.trim().to_ascii_lowercase().as_str() {
            "png" => Ok(ImageFormat::Png),
            "jpeg" | "jpg" => Ok(ImageFormat::Jpeg),
            other => Err(format!("unsupported export format '{other}'")),
        }
    }
}

pub const DEFAULT_EXPORT_QUALITY: f32 = 0.92;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExportOptions {
    pub format: ImageFormat,
    /// Lossy quality in `0.0..=1.0`; ignored for PNG.
    pub quality: f32,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            format: ImageFormat::Png,
            quality: DEFAULT_EXPORT_QUALITY,
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct Blob {
    pub format: ImageFormat,
    pub bytes: Vec<u8>,
}

impl Blob {
    pub fn mime_type(&self) -> &'static str {
        self.format.mime_type()
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl fmt::Debug for Blob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Blob")
            .field("format", &self.format)
            .field("len", &self.bytes.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dimensions_reject_zero_axes() {
        assert!(matches!(
            Dimensions::new(0, 4),
            Err(ProcessorError::InvalidDimensions { width: 0, height: 4 })
        ));
        assert!(Dimensions::new(4, 0).is_err());
        assert!(Dimensions::new(1, 1).is_ok());
    }

    #[test]
    fn dimensions_scale_floors_and_keeps_positive() {
        let dims = Dimensions::new(5, 3).unwrap();
        assert_eq!(dims.scale(3.0), Dimensions::new(15, 9).unwrap());
        assert_eq!(dims.scale(0.5), Dimensions::new(2, 1).unwrap());
        assert_eq!(dims.scale(0.01), Dimensions::new(1, 1).unwrap());
        assert!((dims.aspect_ratio() - 5.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn pixel_density_clamps_to_one() {
        assert_eq!(PixelDensity::new(0).get(), 1);
        assert_eq!(PixelDensity::from_f64(-3.0).get(), 1);
        assert_eq!(PixelDensity::from_f64(0.4).get(), 1);
        assert_eq!(PixelDensity::from_f64(f64::NAN).get(), 1);
        assert_eq!(PixelDensity::from_f64(4.9).get(), 4);
        assert_eq!(PixelDensity::from(7).get(), 7);
    }

    #[test]
    fn settings_default_to_columns_identity_progressive_odd() {
        let settings = ProcessorSettings::default();
        assert_eq!(settings.orientation, Orientation::Columns);
        assert_eq!(settings.pixel_density, PixelDensity::IDENTITY);
        assert!(!settings.interlaced);
        assert_eq!(settings.field, InterlaceField::Odd);
    }

    #[test]
    fn uniform_encodings_match_shader_contract() {
        assert_eq!(Orientation::Columns.uniform_value(), 0);
        assert_eq!(Orientation::Rows.uniform_value(), 1);
        assert_eq!(InterlaceField::Even.uniform_value(), 0);
        assert_eq!(InterlaceField::Odd.uniform_value(), 1);
        assert_eq!(InterlaceField::Odd.toggled(), InterlaceField::Even);
    }

    #[test]
    fn parses_user_facing_names() {
        assert_eq!("Rows".parse::<Orientation>(), Ok(Orientation::Rows));
        assert_eq!("even".parse::<InterlaceField>(), Ok(InterlaceField::Even));
        assert_eq!("image/jpeg".parse::<ImageFormat>(), Ok(ImageFormat::Jpeg));
        assert_eq!("png".parse::<ImageFormat>(), Ok(ImageFormat::Png));
        assert!("diagonal".parse::<Orientation>().is_err());
        assert!("webp".parse::<ImageFormat>().is_err());
    }
}
