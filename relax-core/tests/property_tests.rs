//! Property tests for the optimizer invariants and the table round trip.

use proptest::prelude::*;

use relax_core::io::{dual_table_path, load_initial_dual, write_outputs, TableFormat};
use relax_core::linalg::sparse;
use relax_core::objectives::simple::CenteredQuadratic;
use relax_core::solver::lbfgsb::QuasiNewtonMaximizer;
use relax_core::solver::Maximizer;

#[test]
fn test_loader_without_path_yields_zero_vector() {
    for dim in [1, 7, 100] {
        let v = load_initial_dual(None, dim, TableFormat::Json).unwrap();
        assert_eq!(v.dim(), dim);
        assert_eq!(sparse::nnz(&v), 0);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Every dual returned by the quasi-Newton maximizer stays in the
    /// non-negative orthant, whatever the objective's unconstrained optimum.
    #[test]
    fn prop_quasi_newton_stays_in_orthant(
        center in prop::collection::vec(-10.0..10.0f64, 1..4)
    ) {
        let dim = center.len();
        let objective = CenteredQuadratic::new(center);
        let output = QuasiNewtonMaximizer::default()
            .maximize(&objective, sparse::zeros(dim), 0)
            .unwrap();

        prop_assert_eq!(output.lambda.dim(), dim);
        for (_, &v) in output.lambda.iter() {
            prop_assert!(v >= 0.0, "negative multiplier {}", v);
        }
    }

    /// A dual written by the serializer reloads identically through the
    /// initial-dual loader, index-wise and value-wise.
    #[test]
    fn prop_dual_table_round_trip(
        entries in prop::collection::btree_map(0usize..50, 0.01..100.0f64, 0..20)
    ) {
        let dim = 50;
        let lambda = sparse::from_pairs(dim, entries.into_iter().collect()).unwrap();

        let dir = tempfile::tempdir().unwrap();
        write_outputs(
            dir.path(),
            "",
            &lambda,
            &sparse::zeros(dim),
            None,
            TableFormat::Json,
        )
        .unwrap();

        let reloaded = load_initial_dual(
            Some(&dual_table_path(dir.path(), TableFormat::Json)),
            dim,
            TableFormat::Json,
        )
        .unwrap();
        prop_assert!(sparse::approx_eq(&lambda, &reloaded, 0.0));
    }

    /// Same round trip over the CSV encoding, which goes through text
    /// parsing rather than serde.
    #[test]
    fn prop_dual_table_round_trip_csv(
        entries in prop::collection::btree_map(0usize..50, 0.01..100.0f64, 0..20)
    ) {
        let dim = 50;
        let lambda = sparse::from_pairs(dim, entries.into_iter().collect()).unwrap();

        let dir = tempfile::tempdir().unwrap();
        write_outputs(
            dir.path(),
            "",
            &lambda,
            &sparse::zeros(dim),
            None,
            TableFormat::Csv,
        )
        .unwrap();

        let reloaded = load_initial_dual(
            Some(&dual_table_path(dir.path(), TableFormat::Csv)),
            dim,
            TableFormat::Csv,
        )
        .unwrap();
        prop_assert!(sparse::approx_eq(&lambda, &reloaded, 0.0));
    }
}
