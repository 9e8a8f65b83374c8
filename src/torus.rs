//! Ties arenas, lattice, event runtime, scheduler, and constraint
//! configuration into one instance — a "torus" — and the three-instance
//! `System` that the braid coordinator drives.
//!
//! Grounded in `BraidedKernelV3`'s per-instance member layout (a lattice,
//! a kernel runtime, a process table, all owned directly rather than
//! through the source's cyclic pointer graph); here each subsystem is a
//! plain field and cross-references stay at the pid/coordinate level
//! rather than by pointer, per the "cyclic pointer graph" rearchitecture
//! note.

use crate::config::KernelConfig;
use crate::events::{Event, QueueError};
use crate::lattice::{Lattice, LatticeError};
use crate::projection::{
    BoundaryConstraint, GlobalConstraint, HealthStatus, Projection, BOUNDARY_CONSTRAINT_COUNT,
    GLOBAL_CONSTRAINT_COUNT, PROCESS_SAMPLE_LEN, UNUSED_PROCESS_SLOT,
};
use crate::runtime::{encode_node, Runtime};
use crate::scheduler::{ProcessId, Scheduler};

pub const LATTICE_W: usize = 32;
pub const LATTICE_H: usize = 32;
pub const LATTICE_D: usize = 32;
pub const VOXEL_CAPACITY: usize = 4;
pub const EVENT_QUEUE_CAPACITY: usize = 8192;
pub const EDGE_MAP_CAPACITY: usize = 8192;
pub const PROCESS_ARENA_CAPACITY: usize = 256;

/// Which lattice face is sampled into a projection's boundary sample and
/// checked against boundary constraints. The `x = 0` face, matching the
/// 32x32 = 1024-cell boundary sample size in `spec.md` exactly (`H * D`
/// with the default 32x32x32 lattice).
pub const BOUNDARY_FACE_X: i64 = 0;

pub type InstanceLattice = Lattice<u64, LATTICE_W, LATTICE_H, LATTICE_D, VOXEL_CAPACITY>;
pub type InstanceRuntime = Runtime<EVENT_QUEUE_CAPACITY, EDGE_MAP_CAPACITY, PROCESS_ARENA_CAPACITY>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TorusError {
    Lattice(LatticeError),
    Queue(QueueError),
}

impl From<LatticeError> for TorusError {
    fn from(e: LatticeError) -> Self {
        TorusError::Lattice(e)
    }
}

impl From<QueueError> for TorusError {
    fn from(e: QueueError) -> Self {
        TorusError::Queue(e)
    }
}

/// A process selected for cross-instance migration. Carries just enough
/// to re-establish scheduler/lattice bookkeeping on the destination —
/// see DESIGN.md for why full kernel-stack/context migration is out of
/// scope here.
#[derive(Debug, Clone, Copy)]
pub struct MigratingProcess {
    pub pid: u64,
    pub coords: (u32, u32, u32),
    pub priority: u8,
}

/// One complete per-instance kernel: arenas (via `lattice`/`runtime`),
/// lattice, event queue, scheduler, and this instance's constraint
/// configuration.
pub struct Torus {
    pub id: u32,
    pub lattice: InstanceLattice,
    pub runtime: InstanceRuntime,
    pub scheduler: Scheduler,
    pub heartbeat_timestamp: u64,
    pub health: HealthStatus,
    pub boundary_constraints: [BoundaryConstraint; BOUNDARY_CONSTRAINT_COUNT],
    pub global_constraints: [GlobalConstraint; GLOBAL_CONSTRAINT_COUNT],
    critical_streak: u32,
}

impl Torus {
    pub fn new(id: u32) -> Self {
        Torus {
            id,
            lattice: InstanceLattice::new(),
            runtime: InstanceRuntime::new(),
            scheduler: Scheduler::new(),
            heartbeat_timestamp: 0,
            health: HealthStatus::Healthy,
            boundary_constraints: [BoundaryConstraint::default(); BOUNDARY_CONSTRAINT_COUNT],
            global_constraints: [GlobalConstraint::default(); GLOBAL_CONSTRAINT_COUNT],
            critical_streak: 0,
        }
    }

    pub fn active_processes(&self) -> u32 {
        self.scheduler.active_count() as u32
    }

    /// Spawn a process, place it at `(x, y, z)` in the lattice, and record
    /// its coordinates on the scheduler-owned `Process`. Enforces the
    /// lattice conservation invariant: a process only exists once both
    /// `spawn` and `insert` succeed.
    pub fn spawn_at(&mut self, entry: fn(), name: &str, x: i64, y: i64, z: i64) -> Result<ProcessId, TorusError> {
        let pid = self.scheduler.spawn(entry, name);
        let (wx, wy, wz) = self.wrap_coords(x, y, z);
        if let Err(e) = self.lattice.insert(pid.0, x, y, z) {
            // Roll back: we never leave a scheduled process without a voxel.
            self.scheduler.ready_queue.retain(|p| p.pid != pid);
            return Err(e.into());
        }
        self.scheduler.set_placement(pid, self.id, (wx, wy, wz));
        Ok(pid)
    }

    fn wrap_coords(&self, x: i64, y: i64, z: i64) -> (u32, u32, u32) {
        (
            crate::lattice::wrap(x, LATTICE_W as u32),
            crate::lattice::wrap(y, LATTICE_H as u32),
            crate::lattice::wrap(z, LATTICE_D as u32),
        )
    }

    pub fn inject(&mut self, event: Event) -> Result<(), QueueError> {
        self.runtime.inject(event)
    }

    pub fn node_id_at(&self, x: i64, y: i64, z: i64) -> u32 {
        let (wx, wy, wz) = self.wrap_coords(x, y, z);
        encode_node(wx, wy, wz, LATTICE_W as u32, LATTICE_H as u32)
    }

    pub fn tick(&mut self) -> bool {
        self.runtime.tick()
    }

    pub fn run(&mut self, max_events: u64) -> u64 {
        self.runtime.run(max_events)
    }

    /// Sample the `BOUNDARY_FACE_X` face into a flat `H * D` array of
    /// occupant counts.
    fn sample_boundary(&self) -> alloc::vec::Vec<u32> {
        self.lattice.sample_face(BOUNDARY_FACE_X, |_y, _z, count| count as u32)
    }

    pub fn boundary_cell(&self, cell_index: usize) -> u32 {
        let y = cell_index / LATTICE_D;
        let z = cell_index % LATTICE_D;
        self.lattice.voxel_len(BOUNDARY_FACE_X, y as i64, z as i64) as u32
    }

    /// Build this instance's projection per the codec in §4.E: counters,
    /// boundary sample, process sample, then `finalize_hash`.
    pub fn extract_projection(&self, timestamp: u64) -> Projection {
        let mut proj = Projection::default();
        proj.instance_id = self.id;
        proj.timestamp = timestamp;
        proj.total_events_processed = self.runtime.total_events_processed();
        proj.current_time = self.runtime.current_time();
        proj.active_processes = self.active_processes();
        proj.pending_events = self.runtime.pending_events() as u32;
        proj.edge_count = self.runtime.edge_count() as u32;

        let sample = self.sample_boundary();
        for (i, cell) in proj.boundary_sample.iter_mut().enumerate() {
            *cell = *sample.get(i).unwrap_or(&0);
        }

        proj.boundary_constraints = self.boundary_constraints;
        proj.global_constraints = self.global_constraints;
        proj.heartbeat_timestamp = self.heartbeat_timestamp;
        proj.health_status = self.health;

        let mut raw = [(0u32, 0u32, 0u32, 0u32, 0u32); PROCESS_SAMPLE_LEN];
        let n = self.scheduler.sample_processes(&mut raw);
        for (i, slot) in proj.process_sample.iter_mut().enumerate() {
            if i < n {
                let (pid, x, y, z, state) = raw[i];
                *slot = crate::projection::ProcessInfo { process_id: pid, x, y, z, state };
            } else {
                *slot = crate::projection::ProcessInfo::default();
            }
        }
        debug_assert!(proj.process_sample.iter().filter(|p| p.process_id == UNUSED_PROCESS_SLOT).count() + n == PROCESS_SAMPLE_LEN);

        proj.finalize_hash();
        proj
    }

    /// Pick a migration candidate: the most recently spawned READY process
    /// that isn't the instance's bootstrap process (pid 0).
    pub fn pick_migratable(&self) -> Option<MigratingProcess> {
        self.scheduler
            .ready_queue
            .iter()
            .rev()
            .find(|p| p.pid.0 != 0 && p.state == crate::scheduler::ProcessState::Ready)
            .map(|p| MigratingProcess { pid: p.pid.0, coords: p.coords, priority: p.priority })
    }

    /// Remove a migratable process's scheduler entry and lattice
    /// occupancy, returning it for re-insertion on the destination torus.
    pub fn remove_for_migration(&mut self, mp: MigratingProcess) -> Result<(), TorusError> {
        self.lattice.remove(mp.pid, mp.coords.0 as i64, mp.coords.1 as i64, mp.coords.2 as i64)?;
        self.scheduler.ready_queue.retain(|p| p.pid.0 != mp.pid);
        Ok(())
    }

    /// Accept a migrated process: re-place it in this instance's lattice
    /// and spawn a scheduler entry for it (see `MigratingProcess` docs for
    /// the fidelity this models).
    pub fn accept_migration(&mut self, mp: MigratingProcess, entry: fn()) -> Result<(), TorusError> {
        self.lattice.insert(mp.pid, mp.coords.0 as i64, mp.coords.1 as i64, mp.coords.2 as i64)?;
        let pid = self.scheduler.spawn(entry, "migrated");
        self.scheduler.set_placement(pid, self.id, mp.coords);
        Ok(())
    }

    /// Logically empty this instance's lattice, runtime, and scheduler in
    /// place, for the reconstructor — no allocation or deallocation, so
    /// repeated failures cost no additional memory.
    pub fn reset_in_place(&mut self) {
        self.lattice.clear();
        self.runtime.reset_in_place();
        self.scheduler.clear();
        self.critical_streak = 0;
    }

    /// Restore identity, counters, heartbeat, and health from a
    /// previously-valid projection of this same instance, after
    /// `reset_in_place`. Process placements are re-inserted into the
    /// freshly-cleared lattice from the projection's process sample.
    pub fn rehydrate_from(&mut self, proj: &Projection, entry: fn()) {
        debug_assert_eq!(proj.instance_id, self.id);
        self.heartbeat_timestamp = proj.heartbeat_timestamp;
        self.health = HealthStatus::Healthy;
        for info in proj.process_sample.iter() {
            if info.process_id == UNUSED_PROCESS_SLOT {
                continue;
            }
            let _ = self.lattice.insert(info.process_id as u64, info.x as i64, info.y as i64, info.z as i64);
            let pid = self.scheduler.spawn(entry, "rehydrated");
            self.scheduler.set_placement(pid, self.id, (info.x, info.y, info.z));
        }
    }

    pub fn note_violation(&mut self, violations: u32, checked: u32) {
        if checked == 0 {
            return;
        }
        let rate = violations as f32 / checked as f32;
        if rate > 0.5 {
            self.health = HealthStatus::Degraded;
            self.critical_streak += 1;
            if self.critical_streak >= 3 {
                self.health = HealthStatus::Failed;
            }
        } else {
            self.critical_streak = 0;
            if self.health == HealthStatus::Degraded {
                self.health = HealthStatus::Healthy;
            }
        }
    }
}

/// The three cooperating instances, labelled A, B, C.
pub struct System {
    pub instances: [Torus; 3],
}

impl System {
    pub fn new() -> Self {
        System {
            instances: [Torus::new(0), Torus::new(1), Torus::new(2)],
        }
    }

    pub fn config() -> KernelConfig {
        KernelConfig::default()
    }
}

impl Default for System {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() {}

    #[test]
    fn spawn_at_keeps_lattice_and_scheduler_in_sync() {
        let mut t = Torus::new(0);
        let pid = t.spawn_at(noop, "p0", 1, 1, 1).unwrap();
        assert_eq!(t.active_processes(), 2); // bootstrap process + p0
        let occupants: alloc::vec::Vec<_> = t.lattice.iterate_voxel(1, 1, 1).collect();
        assert_eq!(occupants, alloc::vec![pid.0]);
    }

    #[test]
    fn extract_projection_reports_consistent_counters() {
        let mut t = Torus::new(0);
        t.spawn_at(noop, "p0", 0, 0, 0).unwrap();
        let proj = t.extract_projection(10);
        assert!(proj.verify());
        assert_eq!(proj.active_processes, t.active_processes());
        assert_eq!(proj.instance_id, 0);
    }

    #[test]
    fn migration_round_trip_preserves_total_process_count() {
        let mut a = Torus::new(0);
        let mut b = Torus::new(1);
        a.spawn_at(noop, "p0", 2, 2, 2).unwrap();
        let before = a.active_processes() + b.active_processes();

        let mp = a.pick_migratable().unwrap();
        a.remove_for_migration(mp).unwrap();
        b.accept_migration(mp, noop).unwrap();

        assert_eq!(a.active_processes() + b.active_processes(), before);
        let occupants: alloc::vec::Vec<_> = b.lattice.iterate_voxel(2, 2, 2).collect();
        assert_eq!(occupants, alloc::vec![mp.pid]);
    }

    #[test]
    fn reset_then_rehydrate_restores_health_and_placements() {
        let mut t = Torus::new(0);
        t.spawn_at(noop, "p0", 3, 4, 5).unwrap();
        let proj = t.extract_projection(42);

        t.health = HealthStatus::Failed;
        t.reset_in_place();
        assert_eq!(t.lattice.occupancy(), 0);
        assert_eq!(t.active_processes(), 0);

        t.rehydrate_from(&proj, noop);
        assert_eq!(t.health, HealthStatus::Healthy);
        assert_eq!(t.heartbeat_timestamp, proj.heartbeat_timestamp);
        assert!(t.active_processes() >= 1);
    }
}
