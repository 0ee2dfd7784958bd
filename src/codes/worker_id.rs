//! Worker identity for the code generator
//!
//! Each process derives a small worker id so codes minted on different
//! hosts stay distinct without any coordination service. The default
//! source hashes host identity plus the process id; deployments that
//! need guaranteed uniqueness can plug in their own allocator.

use sha2::{Digest, Sha256};

/// Number of bits of worker identity carried inside each code.
pub const WORKER_ID_BITS: u32 = 12;

/// Mask for the worker id space (4096 workers).
pub const WORKER_ID_MASK: u16 = (1 << WORKER_ID_BITS) - 1;

/// Source of the per-process worker id.
///
/// The default implementation is [`HashedHostWorkerId`]. A fixed id can be
/// forced through [`FixedWorkerId`], e.g. when an external allocator hands
/// out leases and collisions must be impossible rather than just unlikely.
pub trait WorkerIdSource: Send + Sync {
    fn worker_id(&self) -> u16;
}

/// Worker id derived once from `hostname:pid`.
///
/// Independent processes on independent hosts land on statistically
/// distinct ids; two processes on one host differ through the pid.
pub struct HashedHostWorkerId {
    id: u16,
}

impl HashedHostWorkerId {
    pub fn new() -> Self {
        let host = std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown-host".to_string());
        Self {
            id: derive_worker_id(&host, std::process::id()),
        }
    }
}

impl Default for HashedHostWorkerId {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkerIdSource for HashedHostWorkerId {
    fn worker_id(&self) -> u16 {
        self.id
    }
}

/// Fixed worker id, for configuration overrides and tests.
pub struct FixedWorkerId(pub u16);

impl WorkerIdSource for FixedWorkerId {
    fn worker_id(&self) -> u16 {
        self.0 & WORKER_ID_MASK
    }
}

/// Hash host identity and pid down to the worker id space.
pub fn derive_worker_id(host: &str, pid: u32) -> u16 {
    let mut hasher = Sha256::new();
    hasher.update(host.as_bytes());
    hasher.update(b":");
    hasher.update(pid.to_be_bytes());
    let digest = hasher.finalize();

    let raw = u16::from_be_bytes([digest[0], digest[1]]);
    raw & WORKER_ID_MASK
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_worker_id_is_deterministic() {
        let a = derive_worker_id("payments-01", 4242);
        let b = derive_worker_id("payments-01", 4242);
        assert_eq!(a, b);
    }

    #[test]
    fn test_derive_worker_id_stays_in_range() {
        for pid in [1u32, 99, 32768, 4_000_000] {
            let id = derive_worker_id("host", pid);
            assert!(id <= WORKER_ID_MASK);
        }
    }

    #[test]
    fn test_ids_spread_across_hosts_and_pids() {
        // Collisions are possible in a 12-bit space, but a fleet of 50
        // processes collapsing onto a handful of ids would mean the hash
        // is broken.
        let mut ids = std::collections::HashSet::new();
        for host in 0..25 {
            for pid in [100u32, 9001] {
                ids.insert(derive_worker_id(&format!("payments-{:02}", host), pid));
            }
        }
        assert!(ids.len() > 40, "only {} distinct ids out of 50", ids.len());
    }

    #[test]
    fn test_fixed_worker_id_is_masked() {
        let source = FixedWorkerId(0xFFFF);
        assert_eq!(source.worker_id(), WORKER_ID_MASK);

        let source = FixedWorkerId(7);
        assert_eq!(source.worker_id(), 7);
    }

    #[test]
    fn test_hashed_source_is_stable_across_calls() {
        let source = HashedHostWorkerId::new();
        assert_eq!(source.worker_id(), source.worker_id());
    }
}
