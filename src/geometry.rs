//! Small vector helpers shared by the layout and assembly code.

use glam::Vec3;
use rand::Rng;

/// Golden angle in radians (~137.5077 degrees)
pub const GOLDEN_ANGLE: f32 = 2.399_963_2;

/// Mean of a set of points, or the origin when empty
pub fn centroid<'a>(points: impl IntoIterator<Item = &'a Vec3>) -> Vec3 {
    let mut sum = Vec3::ZERO;
    let mut count = 0usize;
    for p in points {
        sum += *p;
        count += 1;
    }
    if count == 0 {
        Vec3::ZERO
    } else {
        sum / count as f32
    }
}

/// Convert spherical coordinates to a cartesian offset
///
/// `theta` is the azimuth around the z-axis, `phi` the polar angle from +z.
pub fn spherical(radius: f32, theta: f32, phi: f32) -> Vec3 {
    Vec3::new(
        radius * phi.sin() * theta.cos(),
        radius * phi.sin() * theta.sin(),
        radius * phi.cos(),
    )
}

/// Ease-out cubic on `t` clamped to [0, 1]
pub fn ease_out_cubic(t: f32) -> f32 {
    let t = t.clamp(0.0, 1.0);
    1.0 - (1.0 - t).powi(3)
}

/// Uniform random point inside an axis-aligned cube of the given side length
pub fn random_in_cube<R: Rng + ?Sized>(rng: &mut R, side: f32) -> Vec3 {
    let half = side * 0.5;
    Vec3::new(
        rng.gen_range(-half..=half),
        rng.gen_range(-half..=half),
        rng.gen_range(-half..=half),
    )
}

/// Uniform random point inside a ball of the given radius
pub fn random_in_ball<R: Rng + ?Sized>(rng: &mut R, radius: f32) -> Vec3 {
    // Rejection sampling keeps the distribution uniform
    loop {
        let p = Vec3::new(
            rng.gen_range(-1.0..=1.0),
            rng.gen_range(-1.0..=1.0),
            rng.gen_range(-1.0..=1.0),
        );
        if p.length_squared() <= 1.0 {
            return p * radius;
        }
    }
}

/// Small random vector with components in [-magnitude, magnitude]
pub fn jitter<R: Rng + ?Sized>(rng: &mut R, magnitude: f32) -> Vec3 {
    if magnitude <= 0.0 {
        return Vec3::ZERO;
    }
    Vec3::new(
        rng.gen_range(-magnitude..=magnitude),
        rng.gen_range(-magnitude..=magnitude),
        rng.gen_range(-magnitude..=magnitude),
    )
}
