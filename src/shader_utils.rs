//! Built-in WGSL utility functions shared by the compute kernels.
//!
//! Every generated kernel gets these prepended, so boundary snippets and the
//! force-field evaluator can call them freely. The same math is mirrored on
//! the CPU for tests and host-side previews; both sides run plain `f32`
//! arithmetic, so results agree to float precision.
//!
//! # Available Functions
//!
//! - `tri(x)` / `tri3(p)` - triangle-wave primitive and its cross-axis vec3
//! - `tri_noise3d_vec(p, speed, time)` - three-octave fractal triangle noise,
//!   each channel landing in roughly `[0, 1]`
//! - `hsv_to_rgb(h, s, v)` - sector-based HSV conversion with an achromatic
//!   fast path

use glam::Vec3;

/// WGSL source for the triangle-noise vector field.
pub const TRI_NOISE_WGSL: &str = r#"
fn tri(x: f32) -> f32 {
    return abs(fract(x) - 0.5);
}

fn tri3(p: vec3<f32>) -> vec3<f32> {
    return vec3<f32>(
        tri(p.z + tri(p.y * 1.0)),
        tri(p.z + tri(p.x * 1.0)),
        tri(p.y + tri(p.x * 1.0))
    );
}

// Fractal triangle noise. Three octaves; each one feeds the perturbed
// position back in, scales position by 1.2 and the amplitude divisor by 1.5.
fn tri_noise3d_vec(pos: vec3<f32>, speed: f32, time: f32) -> vec3<f32> {
    var p = pos;
    var bp = pos;
    var z = 1.4;
    var rz = vec3<f32>(0.0);
    for (var i = 0; i < 3; i = i + 1) {
        let dg = tri3(bp * 2.0);
        p = p + dg + vec3<f32>(time * 0.1 * speed);
        bp = bp * 1.8;
        z = z * 1.5;
        p = p * 1.2;
        rz = rz + tri3(p) / z;
        bp = bp + vec3<f32>(0.14);
    }
    return rz;
}
"#;

/// WGSL source for HSV to RGB conversion.
pub const HSV_WGSL: &str = r#"
// Sector-based HSV to RGB. Hue wraps, so time-cycled hues stay valid.
fn hsv_to_rgb(h: f32, s: f32, v: f32) -> vec3<f32> {
    if s < 1e-4 {
        return vec3<f32>(v, v, v);
    }
    let hh = fract(h) * 6.0;
    let sector = i32(floor(hh));
    let f = hh - f32(sector);
    let p = v * (1.0 - s);
    let q = v * (1.0 - s * f);
    let t = v * (1.0 - s * (1.0 - f));
    switch sector {
        case 0: { return vec3<f32>(v, t, p); }
        case 1: { return vec3<f32>(q, v, p); }
        case 2: { return vec3<f32>(p, v, t); }
        case 3: { return vec3<f32>(p, q, v); }
        case 4: { return vec3<f32>(t, p, v); }
        default: { return vec3<f32>(v, p, q); }
    }
}
"#;

/// All utility snippets combined, ready to prepend to a kernel.
pub fn all_utils_wgsl() -> String {
    format!("// Built-in utility functions\n{}\n{}\n", TRI_NOISE_WGSL, HSV_WGSL)
}

fn fract(x: f32) -> f32 {
    x - x.floor()
}

/// CPU mirror of the WGSL `tri`.
#[inline]
pub fn tri(x: f32) -> f32 {
    (fract(x) - 0.5).abs()
}

/// CPU mirror of the WGSL `tri3`.
pub fn tri3(p: Vec3) -> Vec3 {
    Vec3::new(
        tri(p.z + tri(p.y)),
        tri(p.z + tri(p.x)),
        tri(p.y + tri(p.x)),
    )
}

/// CPU mirror of the WGSL `tri_noise3d_vec`.
///
/// Deterministic for a fixed `(pos, speed, time)` triple.
pub fn tri_noise3d_vec(pos: Vec3, speed: f32, time: f32) -> Vec3 {
    let mut p = pos;
    let mut bp = pos;
    let mut z = 1.4;
    let mut rz = Vec3::ZERO;
    for _ in 0..3 {
        let dg = tri3(bp * 2.0);
        p += dg + Vec3::splat(time * 0.1 * speed);
        bp *= 1.8;
        z *= 1.5;
        p *= 1.2;
        rz += tri3(p) / z;
        bp += Vec3::splat(0.14);
    }
    rz
}

/// CPU mirror of the WGSL `hsv_to_rgb`.
pub fn hsv_to_rgb(h: f32, s: f32, v: f32) -> Vec3 {
    if s < 1e-4 {
        return Vec3::splat(v);
    }
    let hh = fract(h) * 6.0;
    let sector = hh.floor() as i32;
    let f = hh - sector as f32;
    let p = v * (1.0 - s);
    let q = v * (1.0 - s * f);
    let t = v * (1.0 - s * (1.0 - f));
    match sector {
        0 => Vec3::new(v, t, p),
        1 => Vec3::new(q, v, p),
        2 => Vec3::new(p, v, t),
        3 => Vec3::new(p, q, v),
        4 => Vec3::new(t, p, v),
        _ => Vec3::new(v, p, q),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tri_noise_is_deterministic() {
        let p = Vec3::new(12.3, 4.5, 6.7);
        let a = tri_noise3d_vec(p, 1.0, 0.5);
        let b = tri_noise3d_vec(p, 1.0, 0.5);
        assert_eq!(a, b);
    }

    #[test]
    fn tri_noise_stays_in_range() {
        for i in 0..200 {
            let p = Vec3::new(i as f32 * 0.37, i as f32 * 0.11, i as f32 * 0.73);
            let n = tri_noise3d_vec(p, 0.11, 2.0);
            for c in n.to_array() {
                assert!((0.0..=1.0).contains(&c), "noise channel {} out of range", c);
            }
        }
    }

    #[test]
    fn tri_noise_varies_with_time() {
        let p = Vec3::new(3.0, 1.0, 2.0);
        let a = tri_noise3d_vec(p, 1.0, 0.0);
        let b = tri_noise3d_vec(p, 1.0, 10.0);
        assert_ne!(a, b);
    }

    #[test]
    fn hsv_primaries() {
        let red = hsv_to_rgb(0.0, 1.0, 1.0);
        assert!((red - Vec3::new(1.0, 0.0, 0.0)).length() < 1e-5);

        let green = hsv_to_rgb(1.0 / 3.0, 1.0, 1.0);
        assert!((green - Vec3::new(0.0, 1.0, 0.0)).length() < 1e-5);

        let blue = hsv_to_rgb(2.0 / 3.0, 1.0, 1.0);
        assert!((blue - Vec3::new(0.0, 0.0, 1.0)).length() < 1e-5);
    }

    #[test]
    fn hsv_achromatic_fast_path() {
        let grey = hsv_to_rgb(0.42, 0.0, 0.6);
        assert_eq!(grey, Vec3::splat(0.6));
    }

    #[test]
    fn hsv_hue_wraps() {
        let a = hsv_to_rgb(0.25, 0.8, 0.9);
        let b = hsv_to_rgb(1.25, 0.8, 0.9);
        assert!((a - b).length() < 1e-5);
    }
}
