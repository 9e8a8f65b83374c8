//! Fixed-capacity event queue and adaptive delay map.
//!
//! Events are ordered `(timestamp, dst_node, src_node)` ascending so two
//! instances processing the same queue produce identical traces. Grounded
//! in `BettiRDLKernel.h`'s `std::priority_queue<Event, vector<Event>,
//! greater<Event>>` plus its `AdaptiveEdge` map, reimplemented here as an
//! array-backed binary min-heap and a fixed open-addressed table instead
//! of an unbounded `vector`/`unordered_map` pair, so both structures fail
//! deterministically at a known capacity rather than growing forever.

use core::cmp::Ordering;
use core::fmt;

pub const EVENT_QUEUE_CAPACITY: usize = 8192;
pub const EDGE_MAP_CAPACITY: usize = 8192;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueError {
    Full,
    EdgeCapacity,
    EdgeNotFound,
}

impl fmt::Display for QueueError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            QueueError::Full => write!(f, "event queue at capacity"),
            QueueError::EdgeCapacity => write!(f, "delay map at capacity"),
            QueueError::EdgeNotFound => write!(f, "no edge for that (from, to) pair"),
        }
    }
}

/// A single timestamped, immutable-once-enqueued event. `dst_node`/
/// `src_node` are node ids — a lattice coordinate already folded into one
/// integer by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event {
    pub timestamp: u64,
    pub dst_node: u32,
    pub src_node: u32,
    pub payload: i64,
}

impl Event {
    fn key(&self) -> (u64, u32, u32) {
        (self.timestamp, self.dst_node, self.src_node)
    }
}

impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Event {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

/// Array-backed binary min-heap, fixed at capacity `N`. Ties break on the
/// canonical `(timestamp, dst_node, src_node)` order via `Event`'s `Ord`.
pub struct EventQueue<const N: usize> {
    heap: [Option<Event>; N],
    len: usize,
}

impl<const N: usize> EventQueue<N> {
    pub fn new() -> Self {
        EventQueue {
            heap: [None; N],
            len: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        N
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn get(&self, i: usize) -> Event {
        self.heap[i].expect("index within len is always occupied")
    }

    pub fn push(&mut self, event: Event) -> Result<(), QueueError> {
        if self.len >= N {
            return Err(QueueError::Full);
        }
        let mut i = self.len;
        self.heap[i] = Some(event);
        self.len += 1;
        while i > 0 {
            let parent = (i - 1) / 2;
            if self.get(parent) <= self.get(i) {
                break;
            }
            self.heap.swap(parent, i);
            i = parent;
        }
        Ok(())
    }

    /// Remove and return the smallest event by canonical order, or `None`
    /// if empty. Does not disturb the relative order of any event left in
    /// the heap beyond what the heap invariant already implies.
    pub fn pop(&mut self) -> Option<Event> {
        if self.len == 0 {
            return None;
        }
        let top = self.get(0);
        self.len -= 1;
        if self.len > 0 {
            self.heap[0] = self.heap[self.len];
        }
        self.heap[self.len] = None;
        let mut i = 0;
        loop {
            let left = 2 * i + 1;
            let right = 2 * i + 2;
            let mut smallest = i;
            if left < self.len && self.get(left) < self.get(smallest) {
                smallest = left;
            }
            if right < self.len && self.get(right) < self.get(smallest) {
                smallest = right;
            }
            if smallest == i {
                break;
            }
            self.heap.swap(smallest, i);
            i = smallest;
        }
        Some(top)
    }

    pub fn peek(&self) -> Option<Event> {
        if self.len == 0 {
            None
        } else {
            Some(self.get(0))
        }
    }

    /// Empty the heap in place. No reallocation — the backing array stays
    /// at its fixed size, only `len` and the occupied slots are cleared.
    pub fn reset(&mut self) {
        for slot in self.heap.iter_mut() {
            *slot = None;
        }
        self.len = 0;
    }
}

impl<const N: usize> Default for EventQueue<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// One entry in the adaptive delay map: the delay currently assigned to
/// the directed pair `(from, to)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Edge {
    from: u32,
    to: u32,
    delay: u64,
}

fn edge_hash(from: u32, to: u32) -> u64 {
    let key = ((from as u64) << 32) | to as u64;
    key.wrapping_mul(0x9E37_79B9_7F4A_7C15)
}

/// Bounded open-addressed map from `(from, to)` node-id pairs to an
/// adaptive delay. Grounded in `BettiRDLKernel.h`'s `AdaptiveEdge::
/// updateDelay`: traversal with a non-zero ("active") payload speeds the
/// edge up (`delay = max(1, delay - 1)`), an idle traversal slows it down
/// (`delay += 1`, no upper clamp — see the delay-adaptation open question
/// this mirrors from the original).
pub struct DelayMap<const N: usize> {
    slots: [Option<Edge>; N],
    count: usize,
}

impl<const N: usize> DelayMap<N> {
    pub fn new() -> Self {
        DelayMap {
            slots: [None; N],
            count: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        N
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Drop all edges in place, preserving the backing array's allocation.
    pub fn reset(&mut self) {
        for slot in self.slots.iter_mut() {
            *slot = None;
        }
        self.count = 0;
    }

    fn probe(&self, from: u32, to: u32) -> Option<usize> {
        if N == 0 {
            return None;
        }
        let start = (edge_hash(from, to) as usize) % N;
        for step in 0..N {
            let idx = (start + step) % N;
            match self.slots[idx] {
                Some(edge) if edge.from == from && edge.to == to => return Some(idx),
                None => return None,
                Some(_) => continue,
            }
        }
        None
    }

    fn probe_insert(&mut self, from: u32, to: u32) -> Option<usize> {
        if N == 0 {
            return None;
        }
        let start = (edge_hash(from, to) as usize) % N;
        for step in 0..N {
            let idx = (start + step) % N;
            match self.slots[idx] {
                Some(edge) if edge.from == from && edge.to == to => return Some(idx),
                None => return Some(idx),
                Some(_) => continue,
            }
        }
        None
    }

    /// Create an edge with an initial delay, or return its slot unchanged
    /// if `(from, to)` already exists. Fails deterministically once `N`
    /// distinct edges are present and `(from, to)` is a new pair.
    pub fn create_edge(&mut self, from: u32, to: u32, initial_delay: u64) -> Result<(), QueueError> {
        if self.count >= N && self.probe(from, to).is_none() {
            return Err(QueueError::EdgeCapacity);
        }
        let idx = self.probe_insert(from, to).ok_or(QueueError::EdgeCapacity)?;
        if self.slots[idx].is_none() {
            self.slots[idx] = Some(Edge { from, to, delay: initial_delay });
            self.count += 1;
        }
        Ok(())
    }

    pub fn get_delay(&self, from: u32, to: u32) -> Option<u64> {
        self.probe(from, to).and_then(|idx| self.slots[idx].map(|e| e.delay))
    }

    /// Apply the delay-update rule for a traversal of `(from, to)`.
    /// `active` means the traversed payload was non-zero.
    pub fn update_delay(&mut self, from: u32, to: u32, active: bool) -> Result<u64, QueueError> {
        let idx = self.probe(from, to).ok_or(QueueError::EdgeNotFound)?;
        let edge = self.slots[idx].as_mut().expect("probe returned an occupied slot");
        edge.delay = if active {
            edge.delay.saturating_sub(1).max(1)
        } else {
            edge.delay.wrapping_add(1)
        };
        Ok(edge.delay)
    }

    /// All outgoing edges of `from`, as `(to, delay)` pairs.
    pub fn outgoing(&self, from: u32) -> impl Iterator<Item = (u32, u64)> + '_ {
        self.slots.iter().filter_map(move |slot| match slot {
            Some(e) if e.from == from => Some((e.to, e.delay)),
            _ => None,
        })
    }
}

impl<const N: usize> Default for DelayMap<N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ev(timestamp: u64, dst: u32, src: u32) -> Event {
        Event {
            timestamp,
            dst_node: dst,
            src_node: src,
            payload: 1,
        }
    }

    #[test]
    fn pops_in_canonical_order() {
        let mut q: EventQueue<16> = EventQueue::new();
        q.push(ev(5, 2, 0)).unwrap();
        q.push(ev(5, 1, 0)).unwrap();
        q.push(ev(1, 9, 9)).unwrap();
        q.push(ev(5, 1, 1)).unwrap();

        assert_eq!(q.pop(), Some(ev(1, 9, 9)));
        assert_eq!(q.pop(), Some(ev(5, 1, 0)));
        assert_eq!(q.pop(), Some(ev(5, 1, 1)));
        assert_eq!(q.pop(), Some(ev(5, 2, 0)));
        assert_eq!(q.pop(), None);
    }

    #[test]
    fn queue_full_does_not_reorder_existing_contents() {
        let mut q: EventQueue<4> = EventQueue::new();
        for i in 0..4 {
            q.push(ev(i, 0, 0)).unwrap();
        }
        assert_eq!(q.push(ev(99, 0, 0)), Err(QueueError::Full));
        assert_eq!(q.pop(), Some(ev(0, 0, 0)));
        assert_eq!(q.pop(), Some(ev(1, 0, 0)));
    }

    #[test]
    fn edge_map_rejects_past_capacity_deterministically() {
        let mut map: DelayMap<8> = DelayMap::new();
        for i in 0..8 {
            map.create_edge(i, i + 1, 10).unwrap();
        }
        assert_eq!(map.len(), 8);
        assert_eq!(map.create_edge(100, 200, 10), Err(QueueError::EdgeCapacity));
    }

    #[test]
    fn recreating_an_existing_edge_is_a_no_op() {
        let mut map: DelayMap<8> = DelayMap::new();
        map.create_edge(1, 2, 10).unwrap();
        map.update_delay(1, 2, true).unwrap();
        map.create_edge(1, 2, 999).unwrap();
        assert_eq!(map.get_delay(1, 2), Some(9));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn active_traversal_speeds_up_and_floors_at_one() {
        let mut map: DelayMap<8> = DelayMap::new();
        map.create_edge(1, 2, 2).unwrap();
        assert_eq!(map.update_delay(1, 2, true).unwrap(), 1);
        assert_eq!(map.update_delay(1, 2, true).unwrap(), 1);
    }

    #[test]
    fn idle_traversal_slows_down_without_bound() {
        let mut map: DelayMap<8> = DelayMap::new();
        map.create_edge(1, 2, 5).unwrap();
        assert_eq!(map.update_delay(1, 2, false).unwrap(), 6);
        assert_eq!(map.update_delay(1, 2, false).unwrap(), 7);
    }

    #[test]
    fn update_on_missing_edge_is_not_found() {
        let mut map: DelayMap<8> = DelayMap::new();
        assert_eq!(map.update_delay(1, 2, true), Err(QueueError::EdgeNotFound));
    }

    #[test]
    fn outgoing_lists_only_edges_from_that_node() {
        let mut map: DelayMap<8> = DelayMap::new();
        map.create_edge(1, 2, 5).unwrap();
        map.create_edge(1, 3, 5).unwrap();
        map.create_edge(2, 3, 5).unwrap();
        let mut out: alloc::vec::Vec<_> = map.outgoing(1).collect();
        out.sort();
        assert_eq!(out, alloc::vec![(2, 5), (3, 5)]);
    }
}
