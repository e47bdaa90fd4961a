//! Test-only helpers for driving lossy-network scenarios deterministically.
//! Public (not `#[cfg(test)]`-gated) so integration tests in `tests/` can
//! reach it; nothing here is meant to be used from the server or client
//! binaries.

/// Deterministic xorshift64 PRNG. A real `rand` dependency would also
/// work, but the only client is reproducible property tests, and a
/// fixed, inlinable generator keeps a failing test's seed reportable
/// without pulling in an extra crate for one call site.
pub struct PacketLossSim {
    drop_fraction: f64,
    state: u64,
}

impl PacketLossSim {
    pub fn new(seed: u64, drop_fraction: f64) -> Self {
        Self {
            drop_fraction: drop_fraction.clamp(0.0, 1.0),
            state: seed | 1,
        }
    }

    fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        x
    }

    /// Returns `true` if a packet should be dropped this call.
    pub fn should_drop(&mut self) -> bool {
        let sample = (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64;
        sample < self.drop_fraction
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_drop_fraction_never_drops() {
        let mut sim = PacketLossSim::new(42, 0.0);
        assert!((0..1000).all(|_| !sim.should_drop()));
    }

    #[test]
    fn full_drop_fraction_always_drops() {
        let mut sim = PacketLossSim::new(42, 1.0);
        assert!((0..1000).all(|_| sim.should_drop()));
    }

    #[test]
    fn same_seed_is_reproducible() {
        let mut a = PacketLossSim::new(7, 0.3);
        let mut b = PacketLossSim::new(7, 0.3);
        let seq_a: Vec<bool> = (0..50).map(|_| a.should_drop()).collect();
        let seq_b: Vec<bool> = (0..50).map(|_| b.should_drop()).collect();
        assert_eq!(seq_a, seq_b);
    }
}
