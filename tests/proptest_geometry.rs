use imgview::imaging::calculations::{
    clamp_box, gravity_point, plan_circle, plan_fill, plan_lfit, plan_mfit, plan_min_edges,
};
use imgview::imaging::{GeometrySpec, Gravity, Point};
use proptest::prelude::*;
use proptest::test_runner::{Config as ProptestConfig, FileFailurePersistence};

fn proptest_config() -> ProptestConfig {
    let cases = std::env::var("PROPTEST_CASES")
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(64);

    let mut config = ProptestConfig::with_failure_persistence(FileFailurePersistence::WithSource(
        "proptest-regressions",
    ));
    config.cases = cases;
    config.max_shrink_iters = 1024;
    config
}

fn arb_size() -> impl Strategy<Value = (u32, u32)> {
    (1u32..=2000, 1u32..=2000)
}

fn arb_gravity() -> impl Strategy<Value = Option<Gravity>> {
    prop::option::of(prop::sample::select(vec![
        Gravity::NorthWest,
        Gravity::North,
        Gravity::NorthEast,
        Gravity::West,
        Gravity::Center,
        Gravity::East,
        Gravity::SouthWest,
        Gravity::South,
        Gravity::SouthEast,
    ]))
}

fn arb_spec() -> impl Strategy<Value = GeometrySpec> {
    (prop::option::of(1u32..=3000), prop::option::of(1u32..=3000))
        .prop_map(|(w, h)| GeometrySpec::new(w, h))
}

proptest! {
    #![proptest_config(proptest_config())]

    #[test]
    fn clamped_box_stays_inside_source(
        size in arb_size(),
        anchor in (-3000i64..3000, -3000i64..3000),
        target in (1u32..=3000, 1u32..=3000),
        offset in (-3000i64..3000, -3000i64..3000),
    ) {
        let bbox = clamp_box(
            size,
            Point::new(anchor.0, anchor.1),
            target.0,
            target.1,
            offset.0,
            offset.1,
        ).expect("non-degenerate input");

        prop_assert!(bbox.left < bbox.right && bbox.right <= size.0);
        prop_assert!(bbox.top < bbox.bottom && bbox.bottom <= size.1);
        prop_assert_eq!(bbox.width(), target.0.min(size.0));
        prop_assert_eq!(bbox.height(), target.1.min(size.1));
    }

    #[test]
    fn gravity_anchor_lies_on_the_image(size in arb_size(), gravity in arb_gravity()) {
        let point = gravity_point(size, gravity);
        prop_assert!(point.x >= 0 && point.x < i64::from(size.0));
        prop_assert!(point.y >= 0 && point.y < i64::from(size.1));
    }

    #[test]
    fn circle_radius_fits_the_short_edge(size in (2u32..=2000, 2u32..=2000), radius in 1u32..=3000) {
        let plan = plan_circle(size, radius).expect("radius clamps to at least one");
        let side = size.0.min(size.1);

        prop_assert!(plan.radius <= side / 2);
        prop_assert!(plan.diameter() <= side);
        prop_assert_eq!(plan.square.output_size(size), (side, side));
    }

    #[test]
    fn fit_modes_never_enlarge(size in arb_size(), spec in arb_spec()) {
        for plan in [
            plan_lfit(size, spec).expect("lfit"),
            plan_mfit(size, spec).expect("mfit"),
            plan_min_edges(size, spec).expect("min edges"),
        ] {
            let (w, h) = plan.output_size(size);
            prop_assert!(w <= size.0 && h <= size.1, "{size:?} grew to {w}x{h}");
            prop_assert!(w >= 1 && h >= 1);
        }
    }

    #[test]
    fn lfit_stays_within_the_box(size in arb_size(), spec in arb_spec()) {
        let (w, h) = plan_lfit(size, spec).expect("lfit").output_size(size);
        if let Some(max_w) = spec.width {
            prop_assert!(w <= max_w.max(1) || w == size.0);
        }
        if let Some(max_h) = spec.height {
            prop_assert!(h <= max_h.max(1) || h == size.1);
        }
    }

    #[test]
    fn fill_hits_exact_target_when_shrinking_both_sides(
        size in (2u32..=2000, 2u32..=2000),
        fraction in (0.01f64..0.99, 0.01f64..0.99),
    ) {
        let w = ((f64::from(size.0) * fraction.0) as u32).max(1);
        let h = ((f64::from(size.1) * fraction.1) as u32).max(1);
        prop_assume!(w < size.0 && h < size.1);

        let plan = plan_fill(size, GeometrySpec::new(Some(w), Some(h))).expect("fill");
        prop_assert_eq!(plan.output_size(size), (w, h));
    }
}
