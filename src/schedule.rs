//! Binary Code Modulation time slots.
//!
//! With `BITS` bitplanes the refresh period is split into `2^BITS - 1` equal
//! ticks. Bitplane `p` has to be on screen for `2^p` of them. Showing each
//! plane in one long run would make the slow planes visibly flicker, so the
//! ticks are handed out greedily: every tick goes to the plane that has
//! accumulated the least weight so far, and a plane that is picked is pushed
//! back by an amount inversely proportional to its duration.
//!
//! For three bitplanes this yields `2 1 0 2 2 1 2`.

/// Longest visitation order supported, in number of bitplanes.
pub const MAX_BITPLANES: u8 = 8;

/// Relative on-screen duration of bitplane `plane`.
#[must_use]
pub const fn duration_weight(plane: u8) -> usize {
    1 << plane
}

/// Computes the order in which bitplanes are visited during one BCM cycle.
///
/// The returned iterator yields exactly `2^bits - 1` bitplane indices and is
/// fully determined by `bits`.
///
/// # Panics
///
/// In debug builds, if `bits` is zero or larger than [`MAX_BITPLANES`].
#[must_use]
pub fn compute_visitation_order(bits: u8) -> VisitationOrder {
    VisitationOrder::new(bits)
}

/// Iterator over the bitplane visitation order for one BCM cycle.
#[derive(Debug, Clone)]
pub struct VisitationOrder {
    bits: u8,
    times: [u32; MAX_BITPLANES as usize],
    remaining: usize,
}

impl VisitationOrder {
    fn new(bits: u8) -> Self {
        debug_assert!(
            (1..=MAX_BITPLANES).contains(&bits),
            "bitplane count must be between 1 and {}",
            MAX_BITPLANES
        );
        let bits = bits.clamp(1, MAX_BITPLANES);
        Self {
            bits,
            times: [0; MAX_BITPLANES as usize],
            remaining: crate::compute_frame_count(bits),
        }
    }

    /// Number of bitplanes being scheduled.
    #[must_use]
    pub fn bits(&self) -> u8 {
        self.bits
    }
}

impl Iterator for VisitationOrder {
    type Item = u8;

    fn next(&mut self) -> Option<u8> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;

        // find the plane that needs insertion the most; later planes win ties
        let times = &mut self.times[..self.bits as usize];
        let mut ch = 0;
        for (j, &time) in times.iter().enumerate() {
            if time <= times[ch] {
                ch = j;
            }
        }
        times[ch] += 1 << (self.bits as usize - ch);
        Some(ch as u8)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for VisitationOrder {}

impl core::iter::FusedIterator for VisitationOrder {}

#[cfg(test)]
mod tests {
    extern crate std;

    use std::vec::Vec;

    use super::*;

    fn order(bits: u8) -> Vec<u8> {
        compute_visitation_order(bits).collect()
    }

    fn occurrences(order: &[u8], plane: u8) -> usize {
        order.iter().filter(|&&p| p == plane).count()
    }

    #[test]
    fn test_known_orders() {
        assert_eq!(order(1), [0]);
        assert_eq!(order(2), [1, 0, 1]);
        assert_eq!(order(3), [2, 1, 0, 2, 2, 1, 2]);
    }

    #[test]
    fn test_order_length() {
        for bits in 1..=MAX_BITPLANES {
            let it = compute_visitation_order(bits);
            assert_eq!(it.len(), (1 << bits) - 1);
            assert_eq!(it.count(), (1 << bits) - 1);
        }
    }

    #[test]
    fn test_occurrences_match_duration_weight() {
        for bits in 1..=MAX_BITPLANES {
            let order = order(bits);
            for plane in 0..bits {
                assert_eq!(
                    occurrences(&order, plane),
                    duration_weight(plane),
                    "bits {bits} plane {plane}"
                );
            }
            // nothing outside the valid plane range
            assert!(order.iter().all(|&p| p < bits));
        }
    }

    #[test]
    fn test_occurrences_double_per_plane() {
        for bits in 2..=MAX_BITPLANES {
            let order = order(bits);
            for plane in 0..bits - 1 {
                assert_eq!(
                    occurrences(&order, plane + 1),
                    2 * occurrences(&order, plane)
                );
            }
            // counted from the most significant plane the weights halve
            for i in 0..bits {
                assert_eq!(
                    occurrences(&order, bits - 1 - i),
                    1 << (bits - 1 - i)
                );
            }
        }
    }

    #[test]
    fn test_deterministic() {
        for bits in 1..=MAX_BITPLANES {
            assert_eq!(order(bits), order(bits));
        }
    }

    #[test]
    fn test_most_significant_plane_never_runs_long() {
        // the greedy interleave never shows the same plane more than twice in
        // a row, even counting across the loop closure
        for bits in 1..=MAX_BITPLANES {
            let order = order(bits);
            if order.len() < 3 {
                continue;
            }
            let n = order.len();
            for i in 0..n {
                let a = order[i];
                let b = order[(i + 1) % n];
                let c = order[(i + 2) % n];
                assert!(!(a == b && b == c), "bits {bits}: run of 3 at {i}");
            }
        }
    }

    #[test]
    fn test_size_hint_tracks_progress() {
        let mut it = compute_visitation_order(3);
        assert_eq!(it.size_hint(), (7, Some(7)));
        it.next();
        it.next();
        assert_eq!(it.len(), 5);
        assert_eq!(it.by_ref().count(), 5);
        assert_eq!(it.next(), None);
        assert_eq!(it.bits(), 3);
    }

    #[test]
    fn test_duration_weight() {
        assert_eq!(duration_weight(0), 1);
        assert_eq!(duration_weight(3), 8);
        assert_eq!(duration_weight(7), 128);
    }
}
