//! Fixed sRGB transfer functions and UI colors.
//!
//! There is no color management beyond the standard sRGB curve (gamma 2.4
//! with a linear toe). Decoders use [`to_linear`] to bring 8/16-bit display
//! referred data into the linear working space.

/// An RGBA color with float components.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rgba {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Rgba {
    /// Opaque white.
    pub const WHITE: Rgba = Rgba::new(1.0, 1.0, 1.0, 1.0);

    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    /// Returns the components as an array in RGBA order.
    pub fn to_array(self) -> [f32; 4] {
        [self.r, self.g, self.b, self.a]
    }
}

impl Default for Rgba {
    fn default() -> Self {
        Self::WHITE
    }
}

const SRGB_A: f32 = 0.055;
const SRGB_GAMMA: f32 = 2.4;
const SRGB_LINEAR_SLOPE: f32 = 12.92;
const SRGB_LINEAR_CUTOFF: f32 = 0.0031308;
const SRGB_ENCODED_CUTOFF: f32 = 0.04045;

/// Encodes a linear value with the sRGB curve.
#[inline]
pub fn to_srgb(linear: f32) -> f32 {
    if linear <= SRGB_LINEAR_CUTOFF {
        SRGB_LINEAR_SLOPE * linear
    } else {
        (1.0 + SRGB_A) * linear.powf(1.0 / SRGB_GAMMA) - SRGB_A
    }
}

/// Decodes an sRGB-encoded value to linear.
#[inline]
pub fn to_linear(srgb: f32) -> f32 {
    if srgb <= SRGB_ENCODED_CUTOFF {
        srgb / SRGB_LINEAR_SLOPE
    } else {
        ((srgb + SRGB_A) / (1.0 + SRGB_A)).powf(SRGB_GAMMA)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transfer_endpoints() {
        assert_eq!(to_linear(0.0), 0.0);
        assert!((to_linear(1.0) - 1.0).abs() < 1e-6);
        assert_eq!(to_srgb(0.0), 0.0);
        assert!((to_srgb(1.0) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_transfer_round_trip() {
        for i in 0..=255 {
            let encoded = i as f32 / 255.0;
            let back = to_srgb(to_linear(encoded));
            assert!((back - encoded).abs() < 1e-4, "{} -> {}", encoded, back);
        }
    }

    #[test]
    fn test_mid_grey() {
        // sRGB 0.5 is roughly 21.4% linear
        assert!((to_linear(0.5) - 0.214).abs() < 1e-3);
    }
}
