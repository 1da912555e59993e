use pricewatch_core::{detect_crossing, Crossing};
use proptest::prelude::*;
use rust_decimal::Decimal;

/// Prices with up to eight decimal places, drawn from a narrow band so that
/// equal values and thresholds between the two prices come up often.
fn price() -> impl Strategy<Value = Decimal> {
    prop_oneof![
        (0_i64..2_000).prop_map(|units| Decimal::new(units, 0)),
        (0_i64..2_000_000_000).prop_map(|scaled| Decimal::new(scaled, 8)),
    ]
}

fn crosses(previous: Decimal, current: Decimal, threshold: Decimal) -> bool {
    (previous < threshold && threshold <= current) || (previous > threshold && threshold >= current)
}

proptest! {
    #[test]
    fn crossing_matches_the_two_sided_definition(
        previous in price(),
        current in price(),
        threshold in price(),
    ) {
        let expected = crosses(previous, current, threshold);
        prop_assert_eq!(
            detect_crossing(Some(previous), current, Some(threshold)).is_crossed(),
            expected
        );
    }

    #[test]
    fn unchanged_price_never_crosses(value in price(), threshold in price()) {
        prop_assert_eq!(
            detect_crossing(Some(value), value, Some(threshold)),
            Crossing::NotCrossed
        );
    }

    #[test]
    fn landing_exactly_on_the_threshold_crosses(previous in price(), threshold in price()) {
        prop_assume!(previous != threshold);
        prop_assert_eq!(
            detect_crossing(Some(previous), threshold, Some(threshold)),
            Crossing::Crossed
        );
    }

    #[test]
    fn leaving_the_threshold_does_not_cross(current in price(), threshold in price()) {
        prop_assert_eq!(
            detect_crossing(Some(threshold), current, Some(threshold)),
            Crossing::NotCrossed
        );
    }

    #[test]
    fn missing_threshold_or_previous_never_crosses(
        previous in price(),
        current in price(),
        threshold in price(),
    ) {
        prop_assert_eq!(detect_crossing(Some(previous), current, None), Crossing::NotCrossed);
        prop_assert_eq!(detect_crossing(None, current, Some(threshold)), Crossing::NotCrossed);
        prop_assert_eq!(detect_crossing(None, current, None), Crossing::NotCrossed);
    }

    #[test]
    fn a_round_trip_across_the_threshold_fires_both_ways(
        low in 0_i64..1_000,
        gap in 1_i64..1_000,
        past in 0_i64..1_000,
    ) {
        let below = Decimal::new(low, 2);
        let threshold = below + Decimal::new(gap, 2);
        let above = threshold + Decimal::new(past, 2);

        prop_assert!(detect_crossing(Some(below), above, Some(threshold)).is_crossed());
        prop_assert!(detect_crossing(Some(above), below, Some(threshold)).is_crossed() || above == threshold);
    }
}
