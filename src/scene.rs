use std::f32::consts::TAU;
use std::fs;
use std::path::Path;

use rand::{Rng, SeedableRng};
use thiserror::Error;

use crate::math::Vec3;

/// Bytes per record in the `.splat` format; the center is the first 12.
pub const SPLAT_RECORD_SIZE: usize = 32;

#[derive(Debug, Error)]
pub enum SceneError {
    #[error("failed to read '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid .splat file: size {len} is not a multiple of 32 bytes")]
    TruncatedRecord { len: usize },
}

fn read_f32(bytes: &[u8]) -> f32 {
    f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

pub fn parse_splat_centers(data: &[u8]) -> Result<Vec<f32>, SceneError> {
    if data.len() % SPLAT_RECORD_SIZE != 0 {
        return Err(SceneError::TruncatedRecord { len: data.len() });
    }

    let mut centers = Vec::with_capacity(data.len() / SPLAT_RECORD_SIZE * 3);
    for record in data.chunks_exact(SPLAT_RECORD_SIZE) {
        centers.push(read_f32(&record[0..4]));
        centers.push(read_f32(&record[4..8]));
        centers.push(read_f32(&record[8..12]));
    }
    Ok(centers)
}

pub fn load_centers(path: &Path) -> Result<Vec<f32>, SceneError> {
    let data = fs::read(path).map_err(|source| SceneError::Read {
        path: path.display().to_string(),
        source,
    })?;
    parse_splat_centers(&data)
}

pub fn centers_from_positions(positions: &[Vec3]) -> Vec<f32> {
    positions.iter().flat_map(|p| [p.x, p.y, p.z]).collect()
}

// --- Demo scene ---

fn torus_knot_point(t: f32) -> Vec3 {
    let (p, q) = (2.0_f32, 3.0_f32);
    let (major, minor) = (1.4_f32, 0.38_f32);
    Vec3::new(
        (major + minor * (q * t).cos()) * (p * t).cos(),
        minor * (q * t).sin(),
        (major + minor * (q * t).cos()) * (p * t).sin(),
    )
}

fn random_sphere_point(rng: &mut impl Rng) -> Vec3 {
    let z = rng.random_range(-1.0_f32..1.0_f32);
    let theta = rng.random_range(0.0_f32..TAU);
    let r = (1.0 - z * z).sqrt();
    Vec3::new(r * theta.cos(), z, r * theta.sin())
}

/// Seeded procedural scene: two thirds torus knot, one third sphere clusters.
pub fn demo_centers(count: usize, seed: u64) -> Vec<f32> {
    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
    let knot_count = count * 2 / 3;
    let clusters = [
        Vec3::new(1.8, 0.3, 0.4),
        Vec3::new(-1.6, -0.2, 0.8),
        Vec3::new(0.3, 1.2, -1.6),
        Vec3::new(-0.5, -1.0, -1.4),
    ];

    let mut positions = Vec::with_capacity(count);
    for i in 0..knot_count {
        let t = i as f32 / knot_count.max(1) as f32 * TAU * 2.0;
        let jitter = Vec3::new(
            rng.random_range(-0.04_f32..0.04_f32),
            rng.random_range(-0.04_f32..0.04_f32),
            rng.random_range(-0.04_f32..0.04_f32),
        );
        positions.push(torus_knot_point(t) + jitter);
    }
    for i in knot_count..count {
        let center = clusters[i % clusters.len()];
        let radius = rng.random::<f32>().cbrt() * rng.random_range(0.5_f32..1.4_f32);
        positions.push(center + random_sphere_point(&mut rng) * radius);
    }

    centers_from_positions(&positions)
}
