//! Experience-to-level thresholds.

/// Cumulative experience required to reach each level, levels 1 through 20.
const LEVEL_THRESHOLDS: [i64; 20] = [
    0, 300, 900, 2_700, 6_500, 14_000, 23_000, 34_000, 48_000, 64_000, 85_000, 100_000, 120_000,
    140_000, 165_000, 195_000, 225_000, 265_000, 305_000, 355_000,
];

/// The highest level whose threshold `xp` meets. Negative totals clamp to
/// level 1.
pub fn level_for_xp(xp: i64) -> u8 {
    LEVEL_THRESHOLDS
        .iter()
        .rposition(|threshold| xp >= *threshold)
        .map(|idx| idx as u8 + 1)
        .unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thresholds_are_inclusive() {
        assert_eq!(level_for_xp(0), 1);
        assert_eq!(level_for_xp(299), 1);
        assert_eq!(level_for_xp(300), 2);
        assert_eq!(level_for_xp(6_499), 4);
        assert_eq!(level_for_xp(6_500), 5);
        assert_eq!(level_for_xp(355_000), 20);
        assert_eq!(level_for_xp(9_999_999), 20);
    }

    #[test]
    fn negative_totals_clamp_to_first_level() {
        assert_eq!(level_for_xp(-50), 1);
    }
}
