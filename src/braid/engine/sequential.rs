//! Cooperative single-threaded engine (V3): one hardware thread runs all
//! three instances' `tick()` loops plus the braid exchange, suspending
//! only at `tick()` boundaries and explicit `braid_exchange()` calls.
//!
//! Grounded in `BraidedKernelV3::run()`'s single-loop driver; split here
//! into `step()`/`braid_exchange()` so a caller (shell command, test
//! harness) can drive it tick-by-tick instead of free-running.

use crate::braid::constraint;
use crate::braid::reconstruct::detect_and_recover;
use crate::braid::transport::SharedMemoryTransport;
use crate::braid::{AcceptOutcome, Braid, K_LOAD};
use crate::braid::EDGES;
use crate::torus::System;

pub struct SequentialEngine {
    pub braid: Braid,
    transport: SharedMemoryTransport,
    ticks_since_braid: u64,
    pub total_braid_cycles: u64,
    pub projection_exchanges: u64,
    pub reconstructions: u64,
    entry: fn(),
}

impl SequentialEngine {
    pub fn new(entry: fn()) -> Self {
        SequentialEngine {
            braid: Braid::new(),
            transport: SharedMemoryTransport::new(),
            ticks_since_braid: 0,
            total_braid_cycles: 0,
            projection_exchanges: 0,
            reconstructions: 0,
            entry,
        }
    }

    /// Advance every instance by one event tick, then run the braid
    /// exchange once `braid_interval` ticks have elapsed.
    pub fn step(&mut self, now: u64) {
        for torus in self.braid.system.instances.iter_mut() {
            torus.tick();
        }
        self.ticks_since_braid += 1;
        if self.ticks_since_braid >= self.braid.coordinator.braid_interval {
            self.ticks_since_braid = 0;
            self.braid_exchange(now);
        }
    }

    /// Run `n` ticks, invoking `step` each time. Convenience for test
    /// harnesses driving a fixed-length scenario.
    pub fn run_ticks(&mut self, n: u64, now: u64) {
        for _ in 0..n {
            self.step(now);
        }
    }

    /// One full braid cycle: walks all three edges (A→B, B→C, C→A) —
    /// each sender extracts + publishes a projection, each receiver
    /// reads + verifies + applies constraints — then heartbeats and
    /// `braid_interval` adapt once for the whole cycle. A single call
    /// is one cycle, not one edge.
    pub fn braid_exchange(&mut self, now: u64) {
        for (sender, receiver) in EDGES {
            let sender_idx = sender.index();
            let receiver_idx = receiver.index();

            let proj = self.braid.instance(sender).extract_projection(now);
            self.braid.instance_mut(sender).heartbeat_timestamp = now;

            if self.transport.publish(sender_idx, &proj).is_ok() {
                self.projection_exchanges += 1;
            }

            let last_seq = self.transport.acks.get(receiver_idx, sender_idx);
            if let Ok(received) = self.transport.try_read(receiver_idx, sender_idx, last_seq) {
                let outcome = self.braid.coordinator.accept_projection(sender, received);
                if outcome == AcceptOutcome::Accepted {
                    let (report, hint) = {
                        let local = self.braid.instance_mut(receiver);
                        constraint::apply(local, &received, K_LOAD)
                    };
                    self.braid.coordinator.record_cycle_violations(report.boundary_violations + report.global_violations, report.total_checked());

                    if let Some(hint) = hint {
                        if hint.from_is_local && self.braid.coordinator.migration_allowed(receiver) {
                            let _ = self.braid.instance_mut(receiver).remove_for_migration(hint.candidate);
                            let _ = self.braid.instance_mut(sender).accept_migration(hint.candidate, self.entry);
                            self.braid.coordinator.record_migration(receiver);
                        }
                    }
                }
            }
        }

        let heartbeat_timeout = self.braid.coordinator.heartbeat_timeout();
        let last_projection = self.braid.coordinator.last_projection;
        let entry = self.entry;
        detect_failures_and_reconstruct(&mut self.braid.system, &last_projection, now, heartbeat_timeout, entry, &mut self.reconstructions);

        self.braid.coordinator.complete_cycle();
        self.total_braid_cycles += 1;
    }
}

fn detect_failures_and_reconstruct(
    system: &mut System,
    last_projection: &[Option<crate::projection::Projection>; 3],
    now: u64,
    heartbeat_timeout: u64,
    entry: fn(),
    reconstructions: &mut u64,
) {
    let outcomes = detect_and_recover(system, last_projection, now, heartbeat_timeout, entry);
    for outcome in outcomes.iter() {
        if *outcome == crate::braid::reconstruct::ReconstructOutcome::Reconstructed {
            *reconstructions += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() {}

    #[test]
    fn one_call_walks_all_three_edges_and_counts_one_cycle() {
        let mut engine = SequentialEngine::new(noop);
        engine.braid_exchange(10);
        assert_eq!(engine.total_braid_cycles, 1);
        assert_eq!(engine.braid.coordinator.braid_cycles, 1);
        assert_eq!(engine.projection_exchanges, 3);
    }

    #[test]
    fn three_calls_run_three_full_cycles() {
        let mut engine = SequentialEngine::new(noop);
        engine.braid_exchange(1);
        engine.braid_exchange(2);
        engine.braid_exchange(3);
        assert_eq!(engine.total_braid_cycles, 3);
        assert_eq!(engine.projection_exchanges, 9);
    }

    #[test]
    fn five_thousand_ticks_at_interval_1000_yields_five_cycles_and_fifteen_exchanges() {
        let mut engine = SequentialEngine::new(noop);
        engine.braid.coordinator.braid_interval = 1000;
        engine.run_ticks(5000, 0);
        assert_eq!(engine.total_braid_cycles, 5);
        assert_eq!(engine.braid.coordinator.braid_cycles, 5);
        assert_eq!(engine.projection_exchanges, 15);
    }

    #[test]
    fn step_runs_instance_ticks_between_braid_exchanges() {
        let mut engine = SequentialEngine::new(noop);
        engine.braid.coordinator.braid_interval = 5;
        for i in 0..4 {
            engine.step(i);
            assert_eq!(engine.total_braid_cycles, 0);
        }
        engine.step(4);
        assert_eq!(engine.total_braid_cycles, 1);
    }
}
