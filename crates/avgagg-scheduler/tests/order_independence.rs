//! Every reduce order, partition count, and threading mode agrees with a
//! single sequential fold.

use avgagg_core::Accumulator;
use avgagg_scheduler::{partition_values, Evaluator, ReduceOptions, ReduceOrder};
use proptest::prelude::*;

const ORDERS: [ReduceOrder; 3] = [
    ReduceOrder::Sequential,
    ReduceOrder::Reverse,
    ReduceOrder::Balanced,
];

fn close(a: f64, b: f64) -> bool {
    let scale = a.abs().max(b.abs()).max(1.0);
    (a - b).abs() <= 1e-6 * scale
}

#[test]
fn split_two_ways_yields_four() {
    for order in ORDERS {
        let ev = Evaluator::new(ReduceOptions {
            order,
            ..ReduceOptions::default()
        });
        let got = ev.evaluate_partitions(&[&[2.0], &[4.0, 6.0]]).unwrap();
        assert_eq!(got, Some(4.0), "order {order}");
    }
}

#[test]
fn count_is_conserved_through_reduction() {
    let values: Vec<f64> = (0..37).map(f64::from).collect();
    for order in ORDERS {
        for parts in [1usize, 2, 5, 37, 64] {
            let ev = Evaluator::new(ReduceOptions {
                order,
                partitions: parts,
                parallel: false,
            });
            let mut arena = ev
                .transition_partitions(&partition_values(&values, parts))
                .unwrap();
            let root = ev.reduce(&mut arena).unwrap().unwrap();
            assert_eq!(arena.record(root).unwrap().count(), 37, "{order} / {parts}");
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 48,
        .. ProptestConfig::default()
    })]

    #[test]
    fn any_order_matches_sequential_fold(
        values in prop::collection::vec(-1.0e6f64..1.0e6, 0..200),
        parts in 1usize..=16,
        parallel in any::<bool>(),
    ) {
        let reference = values.iter().copied().collect::<Accumulator>().finish();
        for order in ORDERS {
            let ev = Evaluator::new(ReduceOptions { order, partitions: parts, parallel });
            let got = ev.evaluate(&values).unwrap();
            match (reference, got) {
                (None, None) => prop_assert!(values.is_empty()),
                (Some(r), Some(g)) => prop_assert!(close(r, g), "{order}: {g} vs {r}"),
                other => prop_assert!(false, "emptiness disagreed under {order}: {other:?}"),
            }
        }
    }
}
