//! Sizes and colors used when drawing match connectors

/// Connector geometry constants
pub mod connector {
    /// Stroke width of the line joining two matched keypoints
    pub const THICKNESS: f32 = 1.0;
    /// Radius of the circle marking each matched keypoint
    pub const ENDPOINT_RADIUS: f32 = 4.0;
}

/// Fraction of the hue circle between consecutive palette entries (golden ratio conjugate)
const HUE_STEP: f32 = 0.618_034;

/// Deterministic, well-spread RGB color for the `index`-th connector
pub fn palette_color(index: usize) -> [u8; 3] {
    let hue = (index as f32 * HUE_STEP).fract();
    hsv_to_rgb(hue, 0.85, 0.95)
}

/// Convert HSV (all components in 0.0-1.0) to 8-bit RGB
pub fn hsv_to_rgb(h: f32, s: f32, v: f32) -> [u8; 3] {
    let h6 = h * 6.0;
    let sector = h6.floor() as i32 % 6;
    let f = h6 - h6.floor();
    let p = v * (1.0 - s);
    let q = v * (1.0 - s * f);
    let t = v * (1.0 - s * (1.0 - f));

    let (r, g, b) = match sector {
        0 => (v, t, p),
        1 => (q, v, p),
        2 => (p, v, t),
        3 => (p, q, v),
        4 => (t, p, v),
        _ => (v, p, q),
    };

    [
        (r * 255.0).round() as u8,
        (g * 255.0).round() as u8,
        (b * 255.0).round() as u8,
    ]
}
