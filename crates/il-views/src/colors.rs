//! Color utilities for chart images

use plotters::style::RGBColor;

/// Get a categorical color from a palette
pub fn categorical_color(index: usize) -> RGBColor {
    const PALETTE: &[RGBColor] = &[
        RGBColor(100, 150, 250), // Blue
        RGBColor(250, 150, 100), // Orange
        RGBColor(150, 250, 100), // Green
        RGBColor(250, 100, 150), // Pink
        RGBColor(150, 100, 250), // Purple
        RGBColor(250, 250, 100), // Yellow
        RGBColor(100, 250, 250), // Cyan
        RGBColor(250, 100, 100), // Red
    ];
    PALETTE[index % PALETTE.len()]
}

/// Viridis color map
pub fn viridis_color(t: f64) -> RGBColor {
    let t = t.clamp(0.0, 1.0);

    // Piecewise-linear approximation through five viridis stops
    const STOPS: [(f64, f64, f64); 5] = [
        (68.0, 1.0, 84.0),
        (53.0, 91.0, 125.0),
        (42.0, 117.0, 142.0),
        (86.0, 163.0, 92.0),
        (253.0, 231.0, 36.0),
    ];
    let scaled = t * 4.0;
    let idx = (scaled.floor() as usize).min(3);
    let s = scaled - idx as f64;
    let (a, b) = (STOPS[idx], STOPS[idx + 1]);

    RGBColor(
        (a.0 * (1.0 - s) + b.0 * s) as u8,
        (a.1 * (1.0 - s) + b.1 * s) as u8,
        (a.2 * (1.0 - s) + b.2 * s) as u8,
    )
}

/// Color for a correlation coefficient in `[-1, 1]`; grey when undefined
pub fn correlation_color(r: f64) -> RGBColor {
    if r.is_nan() {
        return RGBColor(200, 200, 200);
    }
    viridis_color((r + 1.0) / 2.0)
}
