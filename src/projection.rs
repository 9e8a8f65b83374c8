//! Fixed-size, hash-integrity-protected projection of one instance's state.
//!
//! Mirrors `ProjectionV3` field-for-field: identity and counters, a 1024-
//! cell boundary sample, a 16-entry legacy constraint vector kept for
//! compatibility with older braid peers, 32 boundary constraints, 4 global
//! constraints, heartbeat/health, and a 64-slot process sample. `state_hash`
//! is FNV-1a over every other field in wire order — the same order
//! `serialize` writes them in, so `verify` never has to reason about
//! struct padding or field alignment, only about the byte stream.
//!
//! This replaces the source's manual `<<`/`>>` byte packing with one
//! explicit schema (`write_body`/`read_body`) shared by the hash
//! computation, `serialize`, and `deserialize`.

use core::fmt;

pub const BOUNDARY_SAMPLE_LEN: usize = 1024;
pub const LEGACY_CONSTRAINT_LEN: usize = 16;
pub const BOUNDARY_CONSTRAINT_COUNT: usize = 32;
pub const GLOBAL_CONSTRAINT_COUNT: usize = 4;
pub const PROCESS_SAMPLE_LEN: usize = 64;
pub const UNUSED_PROCESS_SLOT: u32 = u32::MAX;

/// Size of the wire body, every field except `state_hash`.
pub const BODY_LEN: usize = 4 + 8 + 8 + 8 + 4 + 4 + 4
    + BOUNDARY_SAMPLE_LEN * 4
    + LEGACY_CONSTRAINT_LEN * 4
    + BOUNDARY_CONSTRAINT_COUNT * 12
    + GLOBAL_CONSTRAINT_COUNT * 20
    + 8
    + 4
    + PROCESS_SAMPLE_LEN * 20;

/// Full wire size including the trailing hash.
pub const SERIALIZED_LEN: usize = BODY_LEN + 8;

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

pub(crate) fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash = FNV_OFFSET;
    for &b in bytes {
        hash ^= b as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectionError {
    BufferTooSmall,
    LengthMismatch,
    HashMismatch,
}

impl fmt::Display for ProjectionError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ProjectionError::BufferTooSmall => write!(f, "buffer too small for a projection"),
            ProjectionError::LengthMismatch => write!(f, "wire buffer is not exactly SERIALIZED_LEN bytes"),
            ProjectionError::HashMismatch => write!(f, "state_hash does not match the recomputed hash"),
        }
    }
}

#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    Healthy = 0,
    Degraded = 1,
    Failed = 2,
}

impl HealthStatus {
    fn from_u32(v: u32) -> Self {
        match v {
            0 => HealthStatus::Healthy,
            1 => HealthStatus::Degraded,
            _ => HealthStatus::Failed,
        }
    }
}

impl Default for HealthStatus {
    fn default() -> Self {
        HealthStatus::Healthy
    }
}

#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GlobalConstraintKind {
    None = 0,
    EventConservation = 1,
    TimeSync = 2,
    LoadBalance = 3,
    Custom = 4,
}

impl GlobalConstraintKind {
    fn from_u32(v: u32) -> Self {
        match v {
            0 => GlobalConstraintKind::None,
            1 => GlobalConstraintKind::EventConservation,
            2 => GlobalConstraintKind::TimeSync,
            3 => GlobalConstraintKind::LoadBalance,
            _ => GlobalConstraintKind::Custom,
        }
    }
}

impl Default for GlobalConstraintKind {
    fn default() -> Self {
        GlobalConstraintKind::None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BoundaryConstraint {
    pub cell_index: u32,
    pub expected_state: i32,
    pub tolerance: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GlobalConstraint {
    pub kind: GlobalConstraintKind,
    pub expected_value: i64,
    pub tolerance: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessInfo {
    pub process_id: u32,
    pub x: u32,
    pub y: u32,
    pub z: u32,
    pub state: u32,
}

impl Default for ProcessInfo {
    fn default() -> Self {
        ProcessInfo {
            process_id: UNUSED_PROCESS_SLOT,
            x: 0,
            y: 0,
            z: 0,
            state: 0,
        }
    }
}

/// One instance's state, as exchanged over the braid. Copied by value —
/// transports move it around, never share it mutably.
#[derive(Clone, Copy)]
pub struct Projection {
    pub instance_id: u32,
    pub timestamp: u64,
    pub total_events_processed: u64,
    pub current_time: u64,
    pub active_processes: u32,
    pub pending_events: u32,
    pub edge_count: u32,
    pub boundary_sample: [u32; BOUNDARY_SAMPLE_LEN],
    pub legacy_constraints: [i32; LEGACY_CONSTRAINT_LEN],
    pub boundary_constraints: [BoundaryConstraint; BOUNDARY_CONSTRAINT_COUNT],
    pub global_constraints: [GlobalConstraint; GLOBAL_CONSTRAINT_COUNT],
    pub heartbeat_timestamp: u64,
    pub health_status: HealthStatus,
    pub process_sample: [ProcessInfo; PROCESS_SAMPLE_LEN],
    pub state_hash: u64,
}

impl Default for Projection {
    fn default() -> Self {
        Projection {
            instance_id: 0,
            timestamp: 0,
            total_events_processed: 0,
            current_time: 0,
            active_processes: 0,
            pending_events: 0,
            edge_count: 0,
            boundary_sample: [0; BOUNDARY_SAMPLE_LEN],
            legacy_constraints: [0; LEGACY_CONSTRAINT_LEN],
            boundary_constraints: [BoundaryConstraint::default(); BOUNDARY_CONSTRAINT_COUNT],
            global_constraints: [GlobalConstraint::default(); GLOBAL_CONSTRAINT_COUNT],
            heartbeat_timestamp: 0,
            health_status: HealthStatus::default(),
            process_sample: [ProcessInfo::default(); PROCESS_SAMPLE_LEN],
            state_hash: 0,
        }
    }
}

struct ByteWriter<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> ByteWriter<'a> {
    fn new(buf: &'a mut [u8]) -> Self {
        ByteWriter { buf, pos: 0 }
    }

    fn put(&mut self, bytes: &[u8]) -> Result<(), ProjectionError> {
        let end = self.pos + bytes.len();
        if end > self.buf.len() {
            return Err(ProjectionError::BufferTooSmall);
        }
        self.buf[self.pos..end].copy_from_slice(bytes);
        self.pos = end;
        Ok(())
    }

    fn put_u32(&mut self, v: u32) -> Result<(), ProjectionError> {
        self.put(&v.to_le_bytes())
    }
    fn put_i32(&mut self, v: i32) -> Result<(), ProjectionError> {
        self.put(&v.to_le_bytes())
    }
    fn put_u64(&mut self, v: u64) -> Result<(), ProjectionError> {
        self.put(&v.to_le_bytes())
    }
    fn put_i64(&mut self, v: i64) -> Result<(), ProjectionError> {
        self.put(&v.to_le_bytes())
    }
}

struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        ByteReader { buf, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], ProjectionError> {
        let end = self.pos + n;
        if end > self.buf.len() {
            return Err(ProjectionError::BufferTooSmall);
        }
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn get_u32(&mut self) -> Result<u32, ProjectionError> {
        let mut b = [0u8; 4];
        b.copy_from_slice(self.take(4)?);
        Ok(u32::from_le_bytes(b))
    }
    fn get_i32(&mut self) -> Result<i32, ProjectionError> {
        let mut b = [0u8; 4];
        b.copy_from_slice(self.take(4)?);
        Ok(i32::from_le_bytes(b))
    }
    fn get_u64(&mut self) -> Result<u64, ProjectionError> {
        let mut b = [0u8; 8];
        b.copy_from_slice(self.take(8)?);
        Ok(u64::from_le_bytes(b))
    }
    fn get_i64(&mut self) -> Result<i64, ProjectionError> {
        let mut b = [0u8; 8];
        b.copy_from_slice(self.take(8)?);
        Ok(i64::from_le_bytes(b))
    }
}

impl Projection {
    fn write_body(&self, w: &mut ByteWriter) -> Result<(), ProjectionError> {
        w.put_u32(self.instance_id)?;
        w.put_u64(self.timestamp)?;
        w.put_u64(self.total_events_processed)?;
        w.put_u64(self.current_time)?;
        w.put_u32(self.active_processes)?;
        w.put_u32(self.pending_events)?;
        w.put_u32(self.edge_count)?;
        for cell in &self.boundary_sample {
            w.put_u32(*cell)?;
        }
        for c in &self.legacy_constraints {
            w.put_i32(*c)?;
        }
        for bc in &self.boundary_constraints {
            w.put_u32(bc.cell_index)?;
            w.put_i32(bc.expected_state)?;
            w.put_i32(bc.tolerance)?;
        }
        for gc in &self.global_constraints {
            w.put_u32(gc.kind as u32)?;
            w.put_i64(gc.expected_value)?;
            w.put_i64(gc.tolerance)?;
        }
        w.put_u64(self.heartbeat_timestamp)?;
        w.put_u32(self.health_status as u32)?;
        for p in &self.process_sample {
            w.put_u32(p.process_id)?;
            w.put_u32(p.x)?;
            w.put_u32(p.y)?;
            w.put_u32(p.z)?;
            w.put_u32(p.state)?;
        }
        Ok(())
    }

    fn read_body(r: &mut ByteReader) -> Result<Projection, ProjectionError> {
        let mut proj = Projection::default();
        proj.instance_id = r.get_u32()?;
        proj.timestamp = r.get_u64()?;
        proj.total_events_processed = r.get_u64()?;
        proj.current_time = r.get_u64()?;
        proj.active_processes = r.get_u32()?;
        proj.pending_events = r.get_u32()?;
        proj.edge_count = r.get_u32()?;
        for cell in proj.boundary_sample.iter_mut() {
            *cell = r.get_u32()?;
        }
        for c in proj.legacy_constraints.iter_mut() {
            *c = r.get_i32()?;
        }
        for bc in proj.boundary_constraints.iter_mut() {
            bc.cell_index = r.get_u32()?;
            bc.expected_state = r.get_i32()?;
            bc.tolerance = r.get_i32()?;
        }
        for gc in proj.global_constraints.iter_mut() {
            gc.kind = GlobalConstraintKind::from_u32(r.get_u32()?);
            gc.expected_value = r.get_i64()?;
            gc.tolerance = r.get_i64()?;
        }
        proj.heartbeat_timestamp = r.get_u64()?;
        proj.health_status = HealthStatus::from_u32(r.get_u32()?);
        for p in proj.process_sample.iter_mut() {
            p.process_id = r.get_u32()?;
            p.x = r.get_u32()?;
            p.y = r.get_u32()?;
            p.z = r.get_u32()?;
            p.state = r.get_u32()?;
        }
        Ok(proj)
    }

    /// FNV-1a over every field except `state_hash`, in wire order.
    pub fn compute_hash(&self) -> u64 {
        let mut body = [0u8; BODY_LEN];
        let mut w = ByteWriter::new(&mut body);
        self.write_body(&mut w).expect("BODY_LEN matches write_body's output exactly");
        fnv1a(&body)
    }

    /// Recompute and store `state_hash`. Called once, after every other
    /// field has its final value for this extraction.
    pub fn finalize_hash(&mut self) {
        self.state_hash = self.compute_hash();
    }

    /// `true` iff `state_hash` matches a fresh `compute_hash()`. Any
    /// one-bit change to any non-hash field flips this to `false`.
    pub fn verify(&self) -> bool {
        self.compute_hash() == self.state_hash
    }

    pub fn serialize(&self, buf: &mut [u8]) -> Result<usize, ProjectionError> {
        if buf.len() < SERIALIZED_LEN {
            return Err(ProjectionError::BufferTooSmall);
        }
        let mut w = ByteWriter::new(&mut buf[..SERIALIZED_LEN]);
        self.write_body(&mut w)?;
        w.put_u64(self.state_hash)?;
        Ok(SERIALIZED_LEN)
    }

    /// Reconstruct a `Projection` from exactly `SERIALIZED_LEN` bytes,
    /// checking both the declared length and the trailing hash.
    pub fn deserialize(buf: &[u8]) -> Result<Projection, ProjectionError> {
        if buf.len() != SERIALIZED_LEN {
            return Err(ProjectionError::LengthMismatch);
        }
        let mut r = ByteReader::new(&buf[..BODY_LEN]);
        let mut proj = Self::read_body(&mut r)?;
        let mut hash_buf = [0u8; 8];
        hash_buf.copy_from_slice(&buf[BODY_LEN..SERIALIZED_LEN]);
        proj.state_hash = u64::from_le_bytes(hash_buf);
        if !proj.verify() {
            return Err(ProjectionError::HashMismatch);
        }
        Ok(proj)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Projection {
        let mut p = Projection::default();
        p.instance_id = 1;
        p.timestamp = 42;
        p.total_events_processed = 100;
        p.current_time = 42;
        p.active_processes = 3;
        p.pending_events = 2;
        p.edge_count = 5;
        p.boundary_sample[0] = 7;
        p.boundary_sample[1023] = 9;
        p.legacy_constraints[0] = -1;
        p.boundary_constraints[0] = BoundaryConstraint {
            cell_index: 12,
            expected_state: 4,
            tolerance: 1,
        };
        p.global_constraints[0] = GlobalConstraint {
            kind: GlobalConstraintKind::EventConservation,
            expected_value: 100,
            tolerance: 0,
        };
        p.heartbeat_timestamp = 42;
        p.health_status = HealthStatus::Healthy;
        p.process_sample[0] = ProcessInfo { process_id: 7, x: 1, y: 2, z: 3, state: 0 };
        p.finalize_hash();
        p
    }

    #[test]
    fn verify_holds_right_after_finalize() {
        let p = sample();
        assert!(p.verify());
    }

    #[test]
    fn one_bit_mutation_breaks_verify() {
        let mut p = sample();
        p.boundary_sample[500] ^= 1;
        assert!(!p.verify());
    }

    #[test]
    fn serialize_then_deserialize_round_trips_the_hash() {
        let p = sample();
        let mut buf = [0u8; SERIALIZED_LEN];
        let n = p.serialize(&mut buf).unwrap();
        assert_eq!(n, SERIALIZED_LEN);

        let back = Projection::deserialize(&buf).unwrap();
        assert_eq!(back.state_hash, p.state_hash);
        assert!(back.verify());
    }

    #[test]
    fn deserialize_rejects_wrong_length() {
        let buf = [0u8; 10];
        assert_eq!(Projection::deserialize(&buf), Err(ProjectionError::LengthMismatch));
    }

    #[test]
    fn deserialize_rejects_corrupted_hash() {
        let p = sample();
        let mut buf = [0u8; SERIALIZED_LEN];
        p.serialize(&mut buf).unwrap();
        buf[0] ^= 0xFF;
        assert_eq!(Projection::deserialize(&buf), Err(ProjectionError::HashMismatch));
    }

    #[test]
    fn size_is_a_compile_time_constant() {
        // Independent of process/event counts by construction: this is a
        // free-standing const, not derived from any runtime value.
        assert_eq!(SERIALIZED_LEN, BODY_LEN + 8);
    }
}
