//! Benchmark workloads and utilities for Strata containers.
//!
//! Provides the particle workload shared by the benchmarks:
//!
//! - [`Particle`]: the array-of-structs reference row
//! - [`particle_rows`]: deterministic row generation via seed
//! - [`soa_particles`] / [`aos_particles`]: the same rows in both layouts
//! - [`integrate_soa`] / [`integrate_aos`]: one position update per row

#![forbid(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use strata_core::SoaError;
use strata_vec::SoaVec;

/// One particle as a row: position, velocity, mass, kind.
pub type ParticleRow = (f32, f32, f64, u8);

/// The same particle as a conventional struct.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Particle {
    pub pos: f32,
    pub vel: f32,
    pub mass: f64,
    pub kind: u8,
}

impl From<ParticleRow> for Particle {
    fn from((pos, vel, mass, kind): ParticleRow) -> Self {
        Self {
            pos,
            vel,
            mass,
            kind,
        }
    }
}

/// Generate `n` deterministic particle rows.
///
/// Uses a 64-bit LCG seeded with `seed`, so runs are comparable across
/// machines.
pub fn particle_rows(n: usize, seed: u64) -> Vec<ParticleRow> {
    let mut state = seed;
    let mut next = move || {
        state = state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        (state >> 33) as u32
    };
    (0..n)
        .map(|_| {
            let pos = next() as f32 / u32::MAX as f32 * 100.0;
            let vel = next() as f32 / u32::MAX as f32 - 0.5;
            let mass = 1.0 + f64::from(next() % 1000) / 100.0;
            let kind = (next() % 4) as u8;
            (pos, vel, mass, kind)
        })
        .collect()
}

/// Build a structure-of-arrays vector holding `rows`.
pub fn soa_particles(rows: &[ParticleRow]) -> Result<SoaVec<ParticleRow>, SoaError> {
    let mut v = SoaVec::with_capacity(rows.len())?;
    for &row in rows {
        v.push(row);
    }
    Ok(v)
}

/// Build an array-of-structs vector holding `rows`.
pub fn aos_particles(rows: &[ParticleRow]) -> Vec<Particle> {
    rows.iter().copied().map(Particle::from).collect()
}

/// Advance every position by its velocity times `dt`.
pub fn integrate_soa(particles: &mut SoaVec<ParticleRow>, dt: f32) {
    let (pos, vel, _, _) = particles.as_mut_slices();
    for (p, v) in pos.iter_mut().zip(vel.iter()) {
        *p += *v * dt;
    }
}

/// Advance every position by its velocity times `dt`.
pub fn integrate_aos(particles: &mut [Particle], dt: f32) {
    for p in particles {
        p.pos += p.vel * dt;
    }
}
