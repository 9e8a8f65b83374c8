//! The per-instance event-driven runtime: `tick()`/`run()` over the event
//! queue and delay map, grounded in `BettiRDLKernel::tick()`.
//!
//! The runtime owns its queue and delay map directly (via `events::`), and
//! a bounded table of per-node accumulator state — the "process's counter"
//! the node rule accumulates into. It does not know about lattice
//! coordinates; callers encode `(x, y, z)` into a single node id (see
//! `encode_node`) the same way the lattice resolves wrapped coordinates to
//! a flat index, so the runtime stays decoupled from `lattice::Lattice`
//! and can be driven by tests without a full torus wired up.

use crate::events::{DelayMap, Event, EventQueue, QueueError};

/// Fold wrapped `(x, y, z)` lattice coordinates into the single integer
/// `Event::dst_node`/`src_node` use. Callers are expected to have already
/// wrapped `x`/`y`/`z` via `lattice::wrap`.
pub fn encode_node(x: u32, y: u32, z: u32, width: u32, height: u32) -> u32 {
    x + width * (y + height * z)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeError {
    NodeCapacity,
}

/// Bounded open-addressed map from node id to an accumulator, so the
/// runtime's footprint is tied to the configured process count rather
/// than to the full lattice volume.
struct NodeStates<const N: usize> {
    slots: [Option<(u32, i64)>; N],
    count: usize,
}

impl<const N: usize> NodeStates<N> {
    fn new() -> Self {
        NodeStates { slots: [None; N], count: 0 }
    }

    fn probe(&self, node: u32) -> Option<usize> {
        if N == 0 {
            return None;
        }
        let start = (node as usize).wrapping_mul(2_654_435_761) % N;
        for step in 0..N {
            let idx = (start + step) % N;
            match self.slots[idx] {
                Some((n, _)) if n == node => return Some(idx),
                None => return None,
                Some(_) => continue,
            }
        }
        None
    }

    fn probe_insert(&self, node: u32) -> Option<usize> {
        if N == 0 {
            return None;
        }
        let start = (node as usize).wrapping_mul(2_654_435_761) % N;
        for step in 0..N {
            let idx = (start + step) % N;
            match self.slots[idx] {
                Some((n, _)) if n == node => return Some(idx),
                None => return Some(idx),
                Some(_) => continue,
            }
        }
        None
    }

    fn accumulate(&mut self, node: u32, delta: i64) -> Result<i64, RuntimeError> {
        if self.count >= N && self.probe(node).is_none() {
            return Err(RuntimeError::NodeCapacity);
        }
        let idx = self.probe_insert(node).ok_or(RuntimeError::NodeCapacity)?;
        let updated = match self.slots[idx] {
            Some((_, v)) => v + delta,
            None => {
                self.count += 1;
                delta
            }
        };
        self.slots[idx] = Some((node, updated));
        Ok(updated)
    }

    fn get(&self, node: u32) -> i64 {
        self.probe(node).and_then(|idx| self.slots[idx].map(|(_, v)| v)).unwrap_or(0)
    }

    fn reset(&mut self) {
        for slot in self.slots.iter_mut() {
            *slot = None;
        }
        self.count = 0;
    }
}

/// Drives one instance's event loop. `QCAP`/`ECAP`/`NCAP` are the event
/// queue capacity, delay-map (edge) capacity, and node-accumulator
/// capacity respectively.
pub struct Runtime<const QCAP: usize, const ECAP: usize, const NCAP: usize> {
    queue: EventQueue<QCAP>,
    delays: DelayMap<ECAP>,
    node_state: NodeStates<NCAP>,
    current_time: u64,
    total_events_processed: u64,
    dropped_enqueues: u64,
}

impl<const QCAP: usize, const ECAP: usize, const NCAP: usize> Runtime<QCAP, ECAP, NCAP> {
    pub fn new() -> Self {
        Runtime {
            queue: EventQueue::new(),
            delays: DelayMap::new(),
            node_state: NodeStates::new(),
            current_time: 0,
            total_events_processed: 0,
            dropped_enqueues: 0,
        }
    }

    pub fn current_time(&self) -> u64 {
        self.current_time
    }

    pub fn total_events_processed(&self) -> u64 {
        self.total_events_processed
    }

    pub fn dropped_enqueues(&self) -> u64 {
        self.dropped_enqueues
    }

    pub fn pending_events(&self) -> usize {
        self.queue.len()
    }

    pub fn edge_count(&self) -> usize {
        self.delays.len()
    }

    pub fn node_accumulator(&self, node: u32) -> i64 {
        self.node_state.get(node)
    }

    pub fn inject(&mut self, event: Event) -> Result<(), QueueError> {
        self.queue.push(event)
    }

    pub fn create_edge(&mut self, from: u32, to: u32, initial_delay: u64) -> Result<(), QueueError> {
        self.delays.create_edge(from, to, initial_delay)
    }

    /// One step of the algorithm in the runtime kernel design: dequeue,
    /// advance time, apply the node rule, propagate along outgoing edges,
    /// update counters. Returns `false` if the queue was empty.
    pub fn tick(&mut self) -> bool {
        let event = match self.queue.pop() {
            Some(e) => e,
            None => return false,
        };

        // Time is monotonic: canonical ordering already guarantees
        // non-decreasing timestamps across pops, but never regress it.
        if event.timestamp > self.current_time {
            self.current_time = event.timestamp;
        }

        let _ = self.node_state.accumulate(event.dst_node, event.payload);
        let successor_payload = event.payload;
        let active = successor_payload != 0;

        let outgoing: alloc::vec::Vec<(u32, u64)> = self.delays.outgoing(event.dst_node).collect();
        for (to, _) in outgoing {
            let delay = match self.delays.update_delay(event.dst_node, to, active) {
                Ok(d) => d,
                Err(_) => continue,
            };
            let successor = Event {
                timestamp: self.current_time + delay,
                dst_node: to,
                src_node: event.dst_node,
                payload: successor_payload,
            };
            if self.queue.push(successor).is_err() {
                self.dropped_enqueues += 1;
            }
        }

        self.total_events_processed += 1;
        true
    }

    /// Run up to `max_events` ticks, stopping early if the queue drains.
    /// Returns the number of events actually processed.
    pub fn run(&mut self, max_events: u64) -> u64 {
        let mut processed = 0;
        while processed < max_events {
            if !self.tick() {
                break;
            }
            processed += 1;
        }
        processed
    }

    /// Logically empty the queue, delay map, and node accumulators in
    /// place — no reallocation, footprint stays fixed at `QCAP + ECAP +
    /// NCAP`. Used by the reconstructor to recover a failed instance
    /// without touching the allocator.
    pub fn reset_in_place(&mut self) {
        self.queue.reset();
        self.delays.reset();
        self.node_state.reset();
        self.current_time = 0;
        self.total_events_processed = 0;
        self.dropped_enqueues = 0;
    }
}

impl<const QCAP: usize, const ECAP: usize, const NCAP: usize> Default for Runtime<QCAP, ECAP, NCAP> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type TestRuntime = Runtime<64, 64, 32>;

    #[test]
    fn ring_accumulates_injected_payloads_at_the_target_node() {
        let mut rt = TestRuntime::new();
        rt.inject(Event { timestamp: 1, dst_node: 0, src_node: 0, payload: 1 }).unwrap();
        rt.inject(Event { timestamp: 2, dst_node: 0, src_node: 0, payload: 2 }).unwrap();
        rt.inject(Event { timestamp: 3, dst_node: 0, src_node: 0, payload: 3 }).unwrap();

        rt.run(100);

        assert_eq!(rt.node_accumulator(0), 6);
        assert_eq!(rt.total_events_processed(), 3);
    }

    #[test]
    fn time_never_decreases_across_ticks() {
        let mut rt = TestRuntime::new();
        rt.inject(Event { timestamp: 5, dst_node: 0, src_node: 0, payload: 1 }).unwrap();
        rt.inject(Event { timestamp: 10, dst_node: 1, src_node: 0, payload: 1 }).unwrap();
        rt.tick();
        assert_eq!(rt.current_time(), 5);
        rt.tick();
        assert_eq!(rt.current_time(), 10);
    }

    #[test]
    fn propagation_along_an_edge_enqueues_a_successor() {
        let mut rt = TestRuntime::new();
        rt.create_edge(0, 1, 5).unwrap();
        rt.inject(Event { timestamp: 0, dst_node: 0, src_node: 0, payload: 7 }).unwrap();

        rt.run(1);
        assert_eq!(rt.pending_events(), 1);

        rt.run(1);
        assert_eq!(rt.node_accumulator(1), 7);
        // Active traversal (non-zero payload) sped the edge up.
        assert_eq!(rt.delays.get_delay(0, 1), Some(4));
    }

    #[test]
    fn run_stops_early_when_queue_drains() {
        let mut rt = TestRuntime::new();
        rt.inject(Event { timestamp: 0, dst_node: 0, src_node: 0, payload: 1 }).unwrap();
        let processed = rt.run(100);
        assert_eq!(processed, 1);
    }

    #[test]
    fn full_queue_enqueue_failures_are_counted_not_fatal() {
        let mut rt: Runtime<1, 4, 4> = Runtime::new();
        rt.create_edge(0, 1, 1).unwrap();
        rt.create_edge(0, 2, 1).unwrap();
        rt.inject(Event { timestamp: 0, dst_node: 0, src_node: 0, payload: 1 }).unwrap();
        // Capacity-1 queue: popping the injected event frees one slot, the
        // first successor fills it back up, the second has nowhere to go.
        assert!(rt.tick());
        assert_eq!(rt.pending_events(), 1);
        assert_eq!(rt.dropped_enqueues(), 1);
    }

    #[test]
    fn reset_in_place_clears_all_state_without_reallocating() {
        let mut rt = TestRuntime::new();
        rt.create_edge(0, 1, 5).unwrap();
        rt.inject(Event { timestamp: 1, dst_node: 0, src_node: 0, payload: 3 }).unwrap();
        rt.run(10);
        assert!(rt.total_events_processed() > 0);

        rt.reset_in_place();
        assert_eq!(rt.current_time(), 0);
        assert_eq!(rt.total_events_processed(), 0);
        assert_eq!(rt.pending_events(), 0);
        assert_eq!(rt.edge_count(), 0);
        assert_eq!(rt.node_accumulator(0), 0);
    }
}
