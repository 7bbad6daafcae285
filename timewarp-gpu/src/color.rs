use glam::Vec4;

/// Converts a linear color channel into its display (sRGB gamma) encoding.
///
/// Input is clamped to `0..1`; NaNs map to zero.
pub fn linear_to_gamma(value: f32) -> f32 {
    if value.is_nan() || value <= 0.0 {
        return 0.0;
    }

    let value = value.min(1.0);

    if value <= 0.0031308 {
        value * 12.92
    } else {
        1.055 * value.powf(1.0 / 2.4) - 0.055
    }
}

/// Inverse of [`linear_to_gamma()`].
pub fn gamma_to_linear(value: f32) -> f32 {
    if value.is_nan() || value <= 0.0 {
        return 0.0;
    }

    let value = value.min(1.0);

    if value <= 0.04045 {
        value / 12.92
    } else {
        ((value + 0.055) / 1.055).powf(2.4)
    }
}

/// Encodes a linear RGBA color as 8-bit display RGBA; alpha stays linear.
pub fn encode_display(color: Vec4) -> [u8; 4] {
    let quantize = |value: f32| (value * 255.0).round() as u8;

    [
        quantize(linear_to_gamma(color.x)),
        quantize(linear_to_gamma(color.y)),
        quantize(linear_to_gamma(color.z)),
        quantize(if color.w.is_nan() {
            0.0
        } else {
            color.w.clamp(0.0, 1.0)
        }),
    ]
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use glam::vec4;

    use super::*;

    #[test]
    fn gamma() {
        assert_eq!(0.0, linear_to_gamma(0.0));
        assert_eq!(0.0, linear_to_gamma(-3.0));
        assert_eq!(0.0, linear_to_gamma(f32::NAN));
        assert_relative_eq!(1.0, linear_to_gamma(1.0), epsilon = 1e-6);
        assert_relative_eq!(1.0, linear_to_gamma(16.0), epsilon = 1e-6);
        assert_relative_eq!(0.7354, linear_to_gamma(0.5), epsilon = 1e-4);
        assert_relative_eq!(0.012_920, linear_to_gamma(0.001), epsilon = 1e-6);
    }

    #[test]
    fn gamma_round_trip() {
        for value in [0.0, 0.002, 0.1, 0.5, 0.9, 1.0] {
            assert_relative_eq!(
                value,
                gamma_to_linear(linear_to_gamma(value)),
                epsilon = 1e-5
            );
        }
    }

    #[test]
    fn display() {
        assert_eq!([0, 0, 0, 0], encode_display(Vec4::ZERO));
        assert_eq!([255, 255, 255, 255], encode_display(Vec4::ONE));
        assert_eq!(
            [188, 0, 255, 128],
            encode_display(vec4(0.5, 0.0, 2.0, 0.5))
        );
    }
}
