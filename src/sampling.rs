//! Angle sampling for scattering and surface sources.

use crate::cell::Face;
use crate::constants::PI;
use crate::rng::TransportRng;

/// Sample an isotropic unit direction.
pub fn isotropic_angle(rng: &mut TransportRng) -> [f64; 3] {
    let mu = rng.sample() * 2.0 - 1.0;
    let phi = rng.sample() * 2.0 * PI;
    let sin_theta = (1.0 - mu * mu).sqrt();
    [sin_theta * phi.cos(), sin_theta * phi.sin(), mu]
}

/// Sample a cosine-weighted direction pointing inward from a face source.
pub fn face_source_angle(face: Face, rng: &mut TransportRng) -> [f64; 3] {
    let mu = rng.sample().sqrt();
    let phi = rng.sample() * 2.0 * PI;
    let sin_theta = (1.0 - mu * mu).sqrt();
    // Inward normal: positive along the axis for a negative-side face.
    let sign = if face.index() % 2 == 0 { 1.0 } else { -1.0 };
    let mut dir = [0.0; 3];
    dir[face.axis()] = sign * mu;
    dir[(face.axis() + 1) % 3] = sin_theta * phi.cos();
    dir[(face.axis() + 2) % 3] = sin_theta * phi.sin();
    dir
}
