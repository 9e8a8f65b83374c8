//! The constraint engine: given a locally-owned torus and a verified
//! projection received from a peer, check boundary and global
//! constraints, enqueue corrective events, and flag load-migration
//! candidates.
//!
//! Grounded in `ConstraintEngine::check_boundary`/`check_global` from the
//! reference kernel's braid step; reworked here into a single `apply`
//! entry point returning a report rather than mutating shared counters
//! directly, since `torus::Torus` holds no global state to mutate into.

use crate::events::Event;
use crate::projection::{BoundaryConstraint, GlobalConstraint, GlobalConstraintKind, Projection};
use crate::torus::{MigratingProcess, Torus};

use super::K_LOAD;

/// A constraint is "inactive" (not yet configured) when it's still at its
/// all-zero default — see DESIGN.md for why this sentinel, rather than a
/// separate `active: bool` field, was chosen to match the projection
/// wire format's fixed-size array of constraint slots.
fn boundary_active(c: &BoundaryConstraint) -> bool {
    *c != BoundaryConstraint::default()
}

fn global_active(c: &GlobalConstraint) -> bool {
    c.kind != GlobalConstraintKind::None
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ConstraintReport {
    pub boundary_checked: u32,
    pub boundary_violations: u32,
    pub global_checked: u32,
    pub global_violations: u32,
    pub corrective_events: u32,
}

impl ConstraintReport {
    pub fn total_checked(&self) -> u32 {
        self.boundary_checked + self.global_checked
    }

    pub fn total_violations(&self) -> u32 {
        self.boundary_violations + self.global_violations
    }
}

/// A migration candidate surfaced by the load-balance check. The
/// coordinator (not this function) performs the actual cross-instance
/// move, since `apply` only has local-plus-received-projection access,
/// never a live mutable handle to the peer.
#[derive(Debug, Clone, Copy)]
pub struct MigrationHint {
    pub from_is_local: bool,
    pub candidate: MigratingProcess,
}

/// Apply `proj` (already `verify()`-checked by the coordinator) against
/// `local`. Boundary violations get a corrective event enqueued directly
/// into `local`'s runtime; global violations and load imbalance are
/// reported for the coordinator to act on.
pub fn apply(local: &mut Torus, proj: &Projection, k_load: u32) -> (ConstraintReport, Option<MigrationHint>) {
    let mut report = ConstraintReport::default();

    for constraint in proj.boundary_constraints.iter() {
        if !boundary_active(constraint) {
            continue;
        }
        report.boundary_checked += 1;
        let actual = local.boundary_cell(constraint.cell_index as usize) as i32;
        let diff = actual - constraint.expected_state;
        if diff.unsigned_abs() as i64 > constraint.tolerance as i64 {
            report.boundary_violations += 1;
            let (y, z) = decode_boundary_cell(constraint.cell_index);
            let node = local.node_id_at(crate::torus::BOUNDARY_FACE_X, y as i64, z as i64);
            let corrective = Event {
                timestamp: local.runtime.current_time(),
                dst_node: node,
                src_node: node,
                payload: (constraint.expected_state - actual) as i64,
            };
            if local.inject(corrective).is_ok() {
                report.corrective_events += 1;
            }
        }
    }

    let mut migration = None;
    for constraint in proj.global_constraints.iter() {
        if !global_active(constraint) {
            continue;
        }
        report.global_checked += 1;
        let (actual, expected) = match constraint.kind {
            GlobalConstraintKind::EventConservation => {
                (local.runtime.total_events_processed() as i64, constraint.expected_value)
            }
            GlobalConstraintKind::TimeSync => (local.runtime.current_time() as i64, constraint.expected_value),
            GlobalConstraintKind::LoadBalance => (local.active_processes() as i64, constraint.expected_value),
            GlobalConstraintKind::None | GlobalConstraintKind::Custom => continue,
        };
        if (actual - expected).unsigned_abs() as i64 > constraint.tolerance {
            report.global_violations += 1;
        }
        if constraint.kind == GlobalConstraintKind::LoadBalance {
            migration = check_load_migration(local, proj, k_load);
        }
    }

    local.note_violation(report.total_violations(), report.total_checked().max(1));

    (report, migration)
}

/// §4.G's boundary cell indices run over the sampled face in row-major
/// `(y, z)` order, matching `Torus::boundary_cell`.
fn decode_boundary_cell(cell_index: u32) -> (u32, u32) {
    let d = crate::torus::LATTICE_D as u32;
    (cell_index / d, cell_index % d)
}

fn check_load_migration(local: &Torus, proj: &Projection, k_load: u32) -> Option<MigrationHint> {
    let local_load = local.active_processes();
    let peer_load = proj.active_processes;

    if peer_load > local_load + k_load {
        // Peer is heavier: local has nothing to offer, wait for the peer's
        // own check (when it receives *our* projection) to pick a victim.
        return None;
    }
    if local_load > peer_load + k_load {
        return local.pick_migratable().map(|candidate| MigrationHint { from_is_local: true, candidate });
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::projection::GlobalConstraintKind;

    fn noop() {}

    #[test]
    fn boundary_violation_enqueues_a_corrective_event() {
        let mut local = Torus::new(0);
        local.spawn_at(noop, "p", 0, 2, 3).unwrap();
        local.spawn_at(noop, "q", 0, 2, 3).unwrap();

        let mut proj = Projection::default();
        proj.boundary_constraints[0] = BoundaryConstraint { cell_index: 2 * crate::torus::LATTICE_D as u32 + 3, expected_state: 0, tolerance: 0 };
        proj.finalize_hash();

        let pending_before = local.runtime.pending_events();
        let (report, _) = apply(&mut local, &proj, K_LOAD);
        assert_eq!(report.boundary_checked, 1);
        assert_eq!(report.boundary_violations, 1);
        assert_eq!(local.runtime.pending_events(), pending_before + 1);
    }

    #[test]
    fn inactive_boundary_slots_are_skipped() {
        let mut local = Torus::new(0);
        let proj = Projection::default();
        let (report, _) = apply(&mut local, &proj, K_LOAD);
        assert_eq!(report.boundary_checked, 0);
    }

    #[test]
    fn overloaded_peer_surfaces_no_local_migration_hint() {
        let local = Torus::new(0);
        let mut proj = Projection::default();
        proj.active_processes = local.active_processes() + K_LOAD + 10;
        proj.global_constraints[0] = GlobalConstraint {
            kind: GlobalConstraintKind::LoadBalance,
            expected_value: local.active_processes() as i64,
            tolerance: 0,
        };
        proj.finalize_hash();
        let hint = check_load_migration(&local, &proj, K_LOAD);
        assert!(hint.is_none());
    }

    #[test]
    fn overloaded_local_surfaces_a_migration_candidate() {
        let mut local = Torus::new(0);
        for i in 0..6 {
            local.spawn_at(noop, "p", i, 0, 0).unwrap();
        }
        let mut proj = Projection::default();
        proj.active_processes = 1;
        let hint = check_load_migration(&local, &proj, K_LOAD);
        assert!(hint.is_some());
        assert!(hint.unwrap().from_is_local);
    }
}
