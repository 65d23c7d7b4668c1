//! Centipawn to win-rate conversion.

/// Centipawn values beyond this magnitude are treated as equal.
pub const CP_CLAMP: f64 = 1000.0;

/// Win-rate of the side to move in a balanced (0 cp) position. Above 0.5 to
/// reflect the edge of having the move.
pub const WINRATE_AT_EQUALITY: f64 = 0.5269;

/// Logistic slope per centipawn.
pub const WINRATE_SLOPE: f64 = 0.003_682_08;

/// Converts a centipawn score for the side to move into its win-rate.
///
/// The transform is monotonic, clamped to ±[`CP_CLAMP`], and returns 0.5
/// for NaN input unless `allow_nan` is set, in which case NaN is passed on.
pub fn cp_to_winrate(cp: f64, allow_nan: bool) -> f64 {
    if cp.is_nan() {
        return if allow_nan { f64::NAN } else { 0.5 };
    }
    let cp = cp.clamp(-CP_CLAMP, CP_CLAMP);
    let odds_against = (1.0 - WINRATE_AT_EQUALITY) / WINRATE_AT_EQUALITY;
    1.0 / (1.0 + odds_against * (-WINRATE_SLOPE * cp).exp())
}

/// Parses a centipawn score given as text and converts it.
///
/// Text that is not a number yields 0.5 (or NaN with `allow_nan`).
pub fn cp_text_to_winrate(cp: &str, allow_nan: bool) -> f64 {
    cp_to_winrate(cp.trim().parse().unwrap_or(f64::NAN), allow_nan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn equality_favours_side_to_move() {
        assert!((cp_to_winrate(0.0, false) - 0.5269).abs() < 1e-5);
    }

    #[test]
    fn clamps_beyond_a_thousand() {
        assert_eq!(cp_to_winrate(1500.0, false), cp_to_winrate(1000.0, false));
        assert_eq!(cp_to_winrate(-1500.0, false), cp_to_winrate(-1000.0, false));
        assert_eq!(
            cp_to_winrate(f64::INFINITY, false),
            cp_to_winrate(1000.0, false)
        );
    }

    #[test]
    fn nan_resolves_to_sentinel() {
        assert_eq!(cp_to_winrate(f64::NAN, false), 0.5);
        assert!(cp_to_winrate(f64::NAN, true).is_nan());
        assert_eq!(cp_text_to_winrate("mate", false), 0.5);
        assert!(cp_text_to_winrate("mate", true).is_nan());
        assert_eq!(cp_text_to_winrate("0", false), cp_to_winrate(0.0, false));
    }

    #[test]
    fn is_not_symmetric_around_half() {
        let up = cp_to_winrate(100.0, false);
        let down = cp_to_winrate(-100.0, false);
        assert!(up + down > 1.0);
    }

    proptest! {
        #[test]
        fn stays_in_unit_interval(cp in -5000.0f64..5000.0) {
            let w = cp_to_winrate(cp, false);
            prop_assert!((0.0..=1.0).contains(&w));
        }

        #[test]
        fn is_monotonic(a in -1200.0f64..1200.0, b in -1200.0f64..1200.0) {
            if a <= b {
                prop_assert!(cp_to_winrate(a, false) <= cp_to_winrate(b, false));
            }
        }
    }
}
