//! Parallel three-thread + coordinator engine (V4), built as a host-side
//! harness per §5's performance contract: three worker threads each drive
//! one instance's event loop; a fourth thread (the coordinator, run
//! inline below) applies constraints while holding a 4-party barrier
//! gate. Each instance lives behind a `Mutex` shared with the
//! coordinator rather than purely thread-local — the barrier is what
//! actually keeps the two sides from contending (a worker only touches
//! its instance before arrival 1, the coordinator only between arrivals
//! 1 and 2, while every worker is parked), so corrections the
//! coordinator computes land on the live worker state instead of a
//! stand-in.
//!
//! `std::thread`/`std::sync::Barrier` need real OS support this crate
//! doesn't have as a `no_std` kernel binary, so this module only exists
//! under `#[cfg(test)]`, matching `BraidedKernelV4`'s test-harness
//! origin for the same concurrency model.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Barrier, Mutex};
use std::thread;

use crate::braid::constraint;
use crate::braid::transport::SharedMemoryTransport;
use crate::braid::K_LOAD;
use crate::torus::Torus;

pub struct ParallelStats {
    pub total_events_processed: u64,
    pub exchanges: u64,
}

/// Run `rounds` barrier-synchronised exchange rounds, each preceded by
/// `ticks_per_round` independent event-loop ticks per worker. Returns
/// aggregate throughput and how many cross-instance constraint
/// applications the coordinator performed.
pub fn run_parallel(ticks_per_round: u64, rounds: u32, entry: fn()) -> ParallelStats {
    let transport = Arc::new(SharedMemoryTransport::new());
    let should_exchange = Arc::new(AtomicBool::new(false));
    let barrier = Arc::new(Barrier::new(4));
    let events_processed = Arc::new(AtomicU64::new(0));

    // Each worker's `Torus` lives behind a `Mutex` shared with the
    // coordinator below, instead of being purely thread-local — the
    // barrier, not the lock, is what keeps the two sides from actually
    // contending: a worker only touches its instance before arrival 1,
    // the coordinator only between arrivals 1 and 2, while every worker
    // is parked.
    let instances: Vec<Arc<Mutex<Torus>>> = (0..3u32)
        .map(|id| {
            let mut torus = Torus::new(id);
            torus.spawn_at(entry, "worker", id as i64, 0, 0).unwrap();
            Arc::new(Mutex::new(torus))
        })
        .collect();

    let mut handles = Vec::new();
    for id in 0..3u8 {
        let transport = Arc::clone(&transport);
        let barrier = Arc::clone(&barrier);
        let should_exchange = Arc::clone(&should_exchange);
        let events_processed = Arc::clone(&events_processed);
        let instance = Arc::clone(&instances[id as usize]);
        handles.push(thread::spawn(move || {
            for _ in 0..rounds {
                let proj = {
                    let mut torus = instance.lock().unwrap();
                    let processed = torus.run(ticks_per_round);
                    events_processed.fetch_add(processed, Ordering::Relaxed);
                    torus.extract_projection(torus.runtime.current_time())
                };
                let _ = transport.publish(id as usize, &proj);

                barrier.wait(); // arrival 1: every worker has written its out-slot
                let _ = should_exchange.load(Ordering::Acquire);
                barrier.wait(); // arrival 2: coordinator has applied constraints
            }
        }));
    }

    let mut exchanges = 0u64;
    for _round in 0..rounds {
        barrier.wait(); // wait for all three workers to publish

        should_exchange.store(true, Ordering::Release);
        // Workers are parked at the barrier, so locking their instances
        // here is uncontended; constraint corrections land on the real
        // worker `Torus`, not a throwaway stand-in.
        for (from, to) in [(0usize, 1usize), (1, 2), (2, 0)] {
            let last_seq = transport.acks.get(to, from);
            if let Ok(proj) = transport.try_read(to, from, last_seq) {
                let mut target = instances[to].lock().unwrap();
                let _ = constraint::apply(&mut target, &proj, K_LOAD);
                exchanges += 1;
            }
        }
        should_exchange.store(false, Ordering::Release);

        barrier.wait(); // release workers for the next round
    }

    for h in handles {
        h.join().expect("worker thread panicked");
    }

    ParallelStats { total_events_processed: events_processed.load(Ordering::Relaxed), exchanges }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() {}

    #[test]
    fn every_round_exchanges_all_three_directed_edges() {
        let stats = run_parallel(4, 3, noop);
        assert_eq!(stats.exchanges, 9);
    }

    #[test]
    fn barrier_rendezvous_completes_cleanly_across_rounds() {
        let stats = run_parallel(8, 2, noop);
        // Each worker injects no events of its own (idle instances), so
        // the only thing under test here is that the barrier rendezvous
        // (including the coordinator locking live worker state between
        // arrivals 1 and 2) completes cleanly with no panics or
        // deadlocks.
        assert_eq!(stats.total_events_processed, 0);
        assert_eq!(stats.exchanges, 6);
    }
}
