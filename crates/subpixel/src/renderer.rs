//! Dimension and density arithmetic for the 3x subpixel expansion.

use crate::types::{Dimensions, PixelDensity};

/// Output pixels per logical pixel along each axis.
pub const EXPANSION: u32 = 3;

/// Output height the density search aims for when the caller has no preference.
pub const DEFAULT_TARGET_HEIGHT: u32 = 480;

#[derive(Debug, Clone, Copy, Default)]
pub struct SubpixelRenderer;

impl SubpixelRenderer {
    /// `floor(input / density * 3)` per axis.
    ///
    /// Evaluated as `floor(3 * input / density)` in integers so density 1 is
    /// exactly `3 * input`. An axis that would collapse to zero is kept at 1.
    pub fn calculate_output_dimensions(input: Dimensions, density: PixelDensity) -> Dimensions {
        let density = density.get() as u64;
        let axis = |value: u32| (EXPANSION as u64 * value as u64) / density;
        Dimensions::clamped(axis(input.width()), axis(input.height()))
    }

    /// Picks the density whose output height lands closest to `target_height`.
    ///
    /// Only `floor` and `ceil` of the continuous ideal are evaluated; output
    /// height only changes in steps, and `floor` wins ties.
    pub fn calculate_pixel_density_for_target_height(
        input: Dimensions,
        target_height: u32,
    ) -> PixelDensity {
        let target = target_height.max(1);
        let ideal = input.height() as f64 / (target as f64 / EXPANSION as f64);

        let lower = PixelDensity::from_f64(ideal.floor());
        let upper = PixelDensity::new(ideal.ceil().min(u32::MAX as f64) as u32);

        let distance = |density: PixelDensity| -> u64 {
            let height = Self::calculate_output_dimensions(input, density).height();
            (height as i64 - target as i64).unsigned_abs()
        };

        if distance(upper) < distance(lower) {
            upper
        } else {
            lower
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dims(width: u32, height: u32) -> Dimensions {
        Dimensions::new(width, height).unwrap()
    }

    #[test]
    fn identity_density_triples_exactly() {
        for (w, h) in [(1, 1), (640, 480), (1919, 1081), (4096, 3)] {
            let out = SubpixelRenderer::calculate_output_dimensions(dims(w, h), PixelDensity::IDENTITY);
            assert_eq!((out.width(), out.height()), (w * 3, h * 3));
        }
    }

    #[test]
    fn output_matches_floor_formula() {
        for density in 1..=9u32 {
            for w in 1..=40u32 {
                let h = 41 - w;
                let out = SubpixelRenderer::calculate_output_dimensions(
                    dims(w, h),
                    PixelDensity::new(density),
                );
                let expect = |v: u32| ((v as f64 / density as f64) * 3.0 + 1e-9).floor().max(1.0) as u32;
                assert_eq!(out.width(), expect(w), "w={w} d={density}");
                assert_eq!(out.height(), expect(h), "h={h} d={density}");
            }
        }
    }

    #[test]
    fn density_two_halves_logical_grid() {
        let out = SubpixelRenderer::calculate_output_dimensions(dims(4, 4), PixelDensity::new(2));
        assert_eq!(out, dims(6, 6));
    }

    #[test]
    fn collapsed_axis_is_clamped_to_one() {
        let out = SubpixelRenderer::calculate_output_dimensions(dims(1, 9), PixelDensity::new(5));
        assert_eq!(out, dims(1, 5));
    }

    #[test]
    fn target_height_prefers_closest_candidate() {
        let density =
            SubpixelRenderer::calculate_pixel_density_for_target_height(dims(1288, 964), 480);
        assert_eq!(density.get(), 6);
        let out = SubpixelRenderer::calculate_output_dimensions(dims(1288, 964), density);
        assert_eq!(out.height(), 482);
    }

    #[test]
    fn small_inputs_never_drop_below_identity() {
        let density = SubpixelRenderer::calculate_pixel_density_for_target_height(dims(8, 8), 480);
        assert_eq!(density, PixelDensity::IDENTITY);
    }

    #[test]
    fn ties_resolve_to_floor() {
        // ideal 3.5: density 3 gives height 7, density 4 gives 5, both one away.
        let density = SubpixelRenderer::calculate_pixel_density_for_target_height(dims(7, 7), 6);
        assert_eq!(density.get(), 3);
    }

    #[test]
    fn chosen_density_is_globally_closest() {
        for height in 1..=400u32 {
            for target in [6u32, 30, 97, 240, 480] {
                let input = dims(16, height);
                let chosen =
                    SubpixelRenderer::calculate_pixel_density_for_target_height(input, target);
                assert!(chosen.get() >= 1);
                let best = |d: u32| {
                    let h = SubpixelRenderer::calculate_output_dimensions(input, PixelDensity::new(d))
                        .height() as i64;
                    (h - target as i64).abs()
                };
                let chosen_distance = best(chosen.get());
                for other in 1..=(height * 3 + 2) {
                    assert!(
                        best(other) >= chosen_distance,
                        "height={height} target={target} chosen={} beaten by {other}",
                        chosen.get()
                    );
                }
            }
        }
    }
}
