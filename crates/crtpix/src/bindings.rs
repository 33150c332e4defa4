use std::path::Path;

use crtconfig::{
    CameraSection, CrtConfig, DensitySetting, ExportFormatSetting, FacingModeSetting,
    FieldSetting, GpuPowerSetting, GpuSection, OrientationSetting,
};
use subpixel::{
    CameraOptions, Dimensions, ExportOptions, FacingMode, GpuOptions, GpuPowerPreference,
    ImageFormat, InterlaceField, Orientation, PixelDensity, ProcessorSettings, SubpixelRenderer,
};

use crate::cli::{EffectArgs, EncodeArgs};

/// Effect settings after applying CLI overrides on top of the config file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EffectPlan {
    pub orientation: OrientationSetting,
    pub density: DensitySetting,
    pub target_height: u32,
    pub interlaced: bool,
    pub field: FieldSetting,
}

impl EffectPlan {
    pub fn resolve(config: &CrtConfig, args: &EffectArgs) -> Self {
        let defaults = &config.defaults;
        Self {
            orientation: args.orientation.unwrap_or(defaults.orientation),
            density: args.density.unwrap_or(defaults.pixel_density),
            target_height: args.target_height.unwrap_or(defaults.target_height),
            interlaced: args.interlaced || defaults.interlaced,
            field: args.field.unwrap_or(defaults.field),
        }
    }

    /// Processor settings for a source of size `input`; `auto` density is
    /// fitted to the target height.
    pub fn settings_for(&self, input: Dimensions) -> ProcessorSettings {
        ProcessorSettings {
            orientation: map_orientation(self.orientation),
            pixel_density: self.density_for(input),
            interlaced: self.interlaced,
            field: map_field(self.field),
        }
    }

    pub fn density_for(&self, input: Dimensions) -> PixelDensity {
        match self.density {
            DensitySetting::Fixed(value) => PixelDensity::new(value),
            DensitySetting::Auto => SubpixelRenderer::calculate_pixel_density_for_target_height(
                input,
                self.target_height,
            ),
        }
    }
}

pub fn map_orientation(setting: OrientationSetting) -> Orientation {
    match setting {
        OrientationSetting::Columns => Orientation::Columns,
        OrientationSetting::Rows => Orientation::Rows,
    }
}

pub fn map_field(setting: FieldSetting) -> InterlaceField {
    match setting {
        FieldSetting::Odd => InterlaceField::Odd,
        FieldSetting::Even => InterlaceField::Even,
    }
}

pub fn map_format(setting: ExportFormatSetting) -> ImageFormat {
    match setting {
        ExportFormatSetting::Png => ImageFormat::Png,
        ExportFormatSetting::Jpeg => ImageFormat::Jpeg,
    }
}

pub fn map_facing_mode(setting: FacingModeSetting) -> FacingMode {
    match setting {
        FacingModeSetting::User => FacingMode::User,
        FacingModeSetting::Environment => FacingMode::Environment,
    }
}

pub fn gpu_options(section: &GpuSection) -> GpuOptions {
    GpuOptions {
        power_preference: match section.power {
            GpuPowerSetting::Low => GpuPowerPreference::Low,
            GpuPowerSetting::High => GpuPowerPreference::High,
        },
        force_fallback_adapter: section.force_fallback_adapter,
    }
}

pub fn camera_options(section: &CameraSection, fps: Option<f32>) -> CameraOptions {
    CameraOptions {
        facing_mode: map_facing_mode(section.facing_mode),
        width: section.width,
        height: section.height,
        frame_rate: fps.or(section.frame_rate),
        first_frame_timeout: section.first_frame_timeout,
    }
}

/// Export options: explicit flag, then the output extension, then the config file.
pub fn export_options(config: &CrtConfig, args: &EncodeArgs, output: Option<&Path>) -> ExportOptions {
    let from_extension = output
        .and_then(|path| path.extension())
        .and_then(|ext| ext.to_str())
        .and_then(format_from_extension);
    let format = args
        .format
        .map(map_format)
        .or(from_extension)
        .unwrap_or_else(|| map_format(config.export.format));
    ExportOptions {
        format,
        quality: args.quality.unwrap_or(config.export.quality),
    }
}

fn format_from_extension(ext: &str) -> Option<ImageFormat> {
    match ext.to_ascii_lowercase().as_str() {
        "png" => Some(ImageFormat::Png),
        "jpg" | "jpeg" => Some(ImageFormat::Jpeg),
        _ => None,
    }
}
