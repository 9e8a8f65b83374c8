//! Failure detection and in-place reconstruction, per §4.H: redistribute
//! a dead instance's processes to survivors, reset its arenas with no
//! new allocation, then rehydrate it from its own last valid projection.
//!
//! Grounded in `BraidedKernelV3::detect_and_recover()`'s round-robin
//! redistribution; split here into free functions operating on
//! `torus::Torus` and `projection::Projection` so the sequential and
//! parallel engines can call the same logic from different drivers.

use crate::projection::{HealthStatus, Projection, UNUSED_PROCESS_SLOT};
use crate::torus::{MigratingProcess, System};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconstructOutcome {
    NotNeeded,
    Reconstructed,
    /// Two or more instances are dead simultaneously — reconstruction of
    /// this one is deferred. The caller is expected to log
    /// `CRITICAL: cannot reconstruct`.
    Deferred,
}

/// Evaluate liveness for all three instances given each one's last known
/// heartbeat and the coordinator's current heartbeat timeout, and
/// reconstruct at most the instances that can be safely recovered.
///
/// `entry` supplies the entry point used to respawn rehydrated/migrated
/// processes — real kernels would look this up per-process (e.g. from an
/// ELF image); this kernel's processes all share one cooperative entry.
pub fn detect_and_recover(
    system: &mut System,
    last_projection: &[Option<Projection>; 3],
    current_time: u64,
    heartbeat_timeout: u64,
    entry: fn(),
) -> [ReconstructOutcome; 3] {
    let mut dead = [false; 3];
    for i in 0..3 {
        let hb = system.instances[i].heartbeat_timestamp;
        dead[i] = current_time.saturating_sub(hb) > heartbeat_timeout;
    }
    let dead_count = dead.iter().filter(|d| **d).count();

    let mut outcomes = [ReconstructOutcome::NotNeeded; 3];
    for i in 0..3 {
        if !dead[i] {
            continue;
        }
        if dead_count >= 2 {
            #[cfg(not(test))]
            crate::log_error!("CRITICAL: cannot reconstruct — {} of 3 instances dead simultaneously", dead_count);
            outcomes[i] = ReconstructOutcome::Deferred;
            continue;
        }
        let survivors: alloc::vec::Vec<usize> = (0..3).filter(|j| *j != i && !dead[*j]).collect();
        if let Some(proj) = last_projection[i].clone_if_valid() {
            redistribute(system, i, &survivors, &proj, entry);
            system.instances[i].reset_in_place();
            system.instances[i].rehydrate_from(&proj, entry);
        } else {
            // No valid projection to recover from: still reset so the
            // instance doesn't linger in a half-failed state, but it
            // comes back with no process sample to restore.
            system.instances[i].reset_in_place();
            system.instances[i].health = HealthStatus::Healthy;
            system.instances[i].heartbeat_timestamp = current_time;
        }
        outcomes[i] = ReconstructOutcome::Reconstructed;
    }
    outcomes
}

/// Move every live process in `dead_instance`'s last process sample onto
/// survivors round-robin.
fn redistribute(system: &mut System, dead_instance: usize, survivors: &[usize], proj: &Projection, entry: fn()) {
    if survivors.is_empty() {
        return;
    }
    let mut next_survivor = 0;
    for info in proj.process_sample.iter() {
        if info.process_id == UNUSED_PROCESS_SLOT {
            continue;
        }
        let mp = MigratingProcess { pid: info.process_id as u64, coords: (info.x, info.y, info.z), priority: 0 };
        let target = survivors[next_survivor % survivors.len()];
        next_survivor += 1;
        // The dead instance's own lattice/scheduler state is unreliable by
        // definition, so there is nothing to remove from it — only insert
        // the process into its new home.
        let _ = system.instances[target].accept_migration(mp, entry);
        let _ = dead_instance; // kept for clarity/symmetry with §4.H's wording
    }
}

/// Small helper trait so `redistribute`/`detect_and_recover` can treat
/// "no projection yet" and "a verified projection" uniformly.
trait OptionProjectionExt {
    fn clone_if_valid(&self) -> Option<Projection>;
}

impl OptionProjectionExt for Option<Projection> {
    fn clone_if_valid(&self) -> Option<Projection> {
        match self {
            Some(p) if p.verify() => Some(*p),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() {}

    #[test]
    fn dead_instance_is_reconstructed_and_its_processes_survive() {
        let mut system = System::new();
        system.instances[0].heartbeat_timestamp = 10_000;
        system.instances[1].heartbeat_timestamp = 10_000;
        system.instances[2].spawn_at(noop, "p0", 1, 1, 1).unwrap();
        let proj = system.instances[2].extract_projection(100);
        let last = [None, None, Some(proj)];

        let before_total: u32 = system.instances.iter().map(|t| t.active_processes()).sum();

        let outcomes = detect_and_recover(&mut system, &last, 10_000, 100, noop);
        assert_eq!(outcomes[2], ReconstructOutcome::Reconstructed);
        assert_eq!(system.instances[2].health, HealthStatus::Healthy);

        // The migrated process landed on a survivor (A or B), so total
        // across all three instances is preserved or grows by the
        // rehydrated bootstrap process on instance 2 itself.
        let after_total: u32 = system.instances.iter().map(|t| t.active_processes()).sum();
        assert!(after_total >= before_total);
    }

    #[test]
    fn two_simultaneous_deaths_defer_reconstruction() {
        let mut system = System::new();
        system.instances[1].heartbeat_timestamp = 0;
        system.instances[2].heartbeat_timestamp = 0;
        let last = [None, None, None];
        let outcomes = detect_and_recover(&mut system, &last, 10_000, 100, noop);
        assert_eq!(outcomes[1], ReconstructOutcome::Deferred);
        assert_eq!(outcomes[2], ReconstructOutcome::Deferred);
    }

    #[test]
    fn ten_sequential_round_robin_failures_all_detect_and_reconstruct() {
        let mut system = System::new();
        let mut now = 0u64;
        let heartbeat_timeout = 100;
        for t in system.instances.iter_mut() {
            t.heartbeat_timestamp = now;
        }

        for round in 0..10u32 {
            let victim = (round % 3) as usize;
            now += heartbeat_timeout + 1;
            system.instances[victim].heartbeat_timestamp = 0;

            let proj = {
                let survivor = (victim + 1) % 3;
                system.instances[survivor].spawn_at(noop, "s", round as i64, 0, 0).unwrap();
                system.instances[victim].extract_projection(now)
            };
            let mut last = [None, None, None];
            last[victim] = Some(proj);

            let outcomes = detect_and_recover(&mut system, &last, now, heartbeat_timeout, noop);
            assert_eq!(outcomes[victim], ReconstructOutcome::Reconstructed, "round {round} failed to reconstruct");
            assert_eq!(system.instances[victim].health, HealthStatus::Healthy);
            assert_eq!(system.instances[victim].heartbeat_timestamp, now);
        }
    }

    #[test]
    fn healthy_instances_are_left_untouched() {
        let mut system = System::new();
        for t in system.instances.iter_mut() {
            t.heartbeat_timestamp = 100;
        }
        let last = [None, None, None];
        let outcomes = detect_and_recover(&mut system, &last, 100, 1000, noop);
        assert_eq!(outcomes, [ReconstructOutcome::NotNeeded; 3]);
    }
}
