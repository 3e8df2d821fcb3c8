use std::collections::HashSet;

use anyhow::{anyhow, Result};
use convtile::{AxisBounds, IterationDriver, Level, NestedBounds, TileShape};

use crate::common;

type Visit = (u32, u32, u32, u32, u32, u32, u32);

fn expected_pairs(dim: &NestedBounds) -> Vec<(u32, u32)> {
    let mut pairs = Vec::new();
    for outer in 0..dim.outer.count {
        for inner in 0..dim.inner(outer).count {
            pairs.push((outer, inner));
        }
    }
    pairs
}

#[test]
fn every_index_tuple_is_visited_once() -> Result<()> {
    let mut rng = common::sweep_rng();
    for case in 0..64 {
        let plan = common::random_plan(&mut rng);
        let driver = IterationDriver::init(&plan, &common::limits())?;
        let bounds = driver.bounds().clone();
        let mut seen: HashSet<Visit> = HashSet::new();
        let mut steps = 0u64;
        for step in driver {
            let s = step.state;
            let visit = (
                s.batch.index,
                s.m1.index,
                s.n1.index,
                s.m0.index,
                s.n0.index,
                s.k1.index,
                s.k0.index,
            );
            if !seen.insert(visit) {
                return Err(anyhow!("case {case}: {visit:?} visited twice ({plan})"));
            }
            if s.step != steps {
                return Err(anyhow!("case {case}: step counter {} at position {steps}", s.step));
            }
            steps += 1;
        }

        let mut expected = HashSet::new();
        for batch in 0..bounds.batch.count {
            for (m1, m0) in expected_pairs(&bounds.m) {
                for (n1, n0) in expected_pairs(&bounds.n) {
                    for (k1, k0) in expected_pairs(&bounds.k) {
                        expected.insert((batch, m1, n1, m0, n0, k1, k0));
                    }
                }
            }
        }
        assert_eq!(seen, expected, "case {case}: {plan}");
        assert_eq!(steps, bounds.total_steps(), "case {case}: {plan}");
    }
    Ok(())
}

#[test]
fn level_zero_tiles_cover_each_dimension_exactly() -> Result<()> {
    let mut rng = common::sweep_rng();
    let limits = common::limits();
    for _ in 0..32 {
        let plan = common::random_plan(&mut rng);
        let mut m_cover = HashSet::new();
        let mut n_cover = HashSet::new();
        let mut k_cover = HashSet::new();
        for step in common::walk(&plan)? {
            let s = step.state;
            m_cover.insert((s.m0.start, s.m0.extent));
            n_cover.insert((s.n0.start, s.n0.extent));
            k_cover.insert((s.k0.start, s.k0.extent));
            assert!(s.m0.end() <= s.m1.end());
            assert!(s.k0.end() <= s.k1.end());
        }
        let covered = |tiles: &HashSet<(u32, u32)>| tiles.iter().map(|(_, e)| *e).sum::<u32>();
        assert_eq!(covered(&m_cover), plan.m_total());
        assert_eq!(covered(&n_cover), plan.n_total());
        assert_eq!(covered(&k_cover), plan.k_total(&limits));
    }
    Ok(())
}

#[test]
fn only_the_last_index_reports_a_tail() {
    for (total, tile) in [(100, 40), (30, 32), (64, 16), (17, 1), (1, 16), (48, 48)] {
        let axis = AxisBounds::new(total, tile);
        assert_eq!(axis.count, total.div_ceil(tile));
        for index in 0..axis.count {
            let last = index == axis.max_index();
            if last && total % tile != 0 {
                assert!(axis.is_tail(index));
                assert_eq!(axis.extent(index), total - (axis.count - 1) * tile);
            } else {
                assert!(!axis.is_tail(index), "{total}/{tile} index {index}");
                assert_eq!(axis.extent(index), tile);
            }
        }
    }
}

#[test]
fn tail_inner_split_is_derived_once() {
    let k = NestedBounds::new(100, TileShape::new(40, 16));
    assert_eq!(k.outer.count, 3);
    assert_eq!(k.inner_full, AxisBounds::new(40, 16));
    assert_eq!(k.inner_tail, AxisBounds::new(20, 16));
    assert_eq!(k.inner(0).count, 3);
    assert_eq!(k.inner(2).count, 2);
    assert!(!k.outer_collapsed());
    assert!(!k.inner_collapsed());
}

#[test]
fn single_tile_levels_are_collapsed() -> Result<()> {
    let plan = common::builder(common::conv(1, 8, 4, 4, 8, 1))
        .m_tiles(16, 16)
        .n_tiles(16, 16)
        .k_tiles(16, 16)
        .build(&common::limits());
    let driver = IterationDriver::init(&plan, &common::limits())?;
    assert!(driver.bounds().active.is_empty());
    let steps: Vec<_> = driver.collect();
    assert_eq!(steps.len(), 1);
    assert!(steps[0].first_k && steps[0].last_k);

    let plan = common::builder(common::conv(2, 8, 8, 8, 40, 1))
        .m_tiles(64, 32)
        .n_tiles(16, 16)
        .k_tiles(16, 16)
        .build(&common::limits());
    let driver = IterationDriver::init(&plan, &common::limits())?;
    assert_eq!(driver.bounds().active, vec![Level::Batch, Level::N1, Level::M0]);
    Ok(())
}

#[test]
fn init_is_idempotent() -> Result<()> {
    let mut rng = common::sweep_rng();
    for _ in 0..16 {
        let plan = common::random_plan(&mut rng);
        let a = IterationDriver::init(&plan, &common::limits())?;
        let b = IterationDriver::init(&plan, &common::limits())?;
        assert_eq!(a.bounds(), b.bounds());
        assert_eq!(a.state(), b.state());
        let walk_a: Vec<_> = a.collect();
        let walk_b: Vec<_> = b.collect();
        assert_eq!(walk_a, walk_b);
    }
    Ok(())
}
