//! Voice scheduling and synthesis.
//!
//! Three kinds of sound source share the pathway dataset: long-lived
//! layer voices ([`layer`]), micro-grains ([`granular`]) and the
//! delayed echoes of the ripple cascade ([`ripple`]). All of them pick
//! pathways through the same weighted draw in [`select_pathway`].

pub mod granular;
pub mod layer;
pub mod message;
pub mod ripple;
pub mod voice;

use crate::config::SelectionWeights;
use crate::context::SharedContext;
use crate::pathway::PathwaySet;
use crate::rng::RandomSource;

const WEIGHT_EPSILON: f32 = 1e-6;

/// Weighted random pathway draw.
///
/// Per-candidate weight is `consonance * w_c + abundance * emphasis *
/// w_a + fairness * w_f`, negative weights clamped to zero. Runs two
/// passes over the set (total, then cumulative search) so it never
/// allocates. When every weight is ~zero it degrades to a uniform draw
/// over the non-excluded candidates; with no candidates at all it
/// returns `None`.
pub(crate) fn select_pathway(
    set: &PathwaySet,
    ctx: &SharedContext,
    weights: &SelectionWeights,
    mut excluded: impl FnMut(usize) -> bool,
    rng: &mut dyn RandomSource,
) -> Option<usize> {
    let weight_of = |idx: usize, set: &PathwaySet| -> f32 {
        let p = set.get(idx);
        let w = p.consonance * weights.consonance
            + p.abundance * ctx.emphasis(idx) * weights.abundance
            + ctx.fairness_bonus(idx) * weights.fairness * ctx.fairness_weight();
        w.max(0.0)
    };

    let mut total = 0.0;
    let mut candidates = 0usize;
    for idx in 0..set.len() {
        if excluded(idx) {
            continue;
        }
        candidates += 1;
        total += weight_of(idx, set);
    }
    if candidates == 0 {
        return None;
    }

    if total <= WEIGHT_EPSILON {
        // Uniform fallback.
        let target = (rng.next_f32() * candidates as f32) as usize;
        let mut seen = 0usize;
        for idx in 0..set.len() {
            if excluded(idx) {
                continue;
            }
            if seen == target {
                return Some(idx);
            }
            seen += 1;
        }
        // target == candidates can only happen by float edge; take the
        // last candidate.
        return (0..set.len()).rev().find(|&idx| !excluded(idx));
    }

    let draw = rng.next_f32() * total;
    let mut cumulative = 0.0;
    let mut last = None;
    for idx in 0..set.len() {
        if excluded(idx) {
            continue;
        }
        cumulative += weight_of(idx, set);
        last = Some(idx);
        if draw < cumulative {
            return Some(idx);
        }
    }
    last
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FairnessConfig, FocusConfig, VolumeConfig};
    use crate::pathway::{ConsonanceCurve, PathwayRecord};
    use crate::rng::{ConstSource, SmallRngSource};

    fn record(id: &str, n: u32, d: u32, abundance: f32) -> PathwayRecord {
        PathwayRecord {
            id: id.into(),
            numerator: n,
            denominator: d,
            category: "core".into(),
            subcategory: None,
            abundance,
        }
    }

    fn setup(records: &[PathwayRecord]) -> (PathwaySet, SharedContext) {
        let set = PathwaySet::build(
            records,
            &VolumeConfig::default(),
            ConsonanceCurve::InverseLog,
        );
        let mut ctx = SharedContext::new(
            48_000.0,
            330.0,
            0.5,
            FocusConfig::default(),
            FairnessConfig::default(),
        );
        ctx.reset_for_set(set.len(), set.category_count());
        ctx.advance(128);
        (set, ctx)
    }

    #[test]
    fn empty_set_declines() {
        let (set, ctx) = setup(&[]);
        let weights = SelectionWeights { consonance: 1.0, abundance: 1.0, fairness: 1.0 };
        let mut rng = SmallRngSource::seeded(3);
        assert_eq!(select_pathway(&set, &ctx, &weights, |_| false, &mut rng), None);
    }

    #[test]
    fn all_excluded_declines() {
        let (set, ctx) = setup(&[record("a", 1, 1, 1.0), record("b", 3, 2, 1.0)]);
        let weights = SelectionWeights { consonance: 1.0, abundance: 1.0, fairness: 1.0 };
        let mut rng = SmallRngSource::seeded(3);
        assert_eq!(select_pathway(&set, &ctx, &weights, |_| true, &mut rng), None);
    }

    #[test]
    fn zero_draw_picks_first_weighted_candidate() {
        let (set, ctx) = setup(&[record("a", 1, 1, 1.0), record("b", 3, 2, 1.0)]);
        let weights = SelectionWeights { consonance: 1.0, abundance: 1.0, fairness: 0.0 };
        let mut rng = ConstSource(0.0);
        assert_eq!(select_pathway(&set, &ctx, &weights, |_| false, &mut rng), Some(0));
        assert_eq!(select_pathway(&set, &ctx, &weights, |i| i == 0, &mut rng), Some(1));
    }

    #[test]
    fn zero_weights_fall_back_to_uniform() {
        let (set, mut ctx) = setup(&[
            record("a", 1, 1, 0.0),
            record("b", 3, 2, 0.0),
            record("c", 5, 4, 0.0),
        ]);
        // Kill every term: zero abundance via emphasis, no fairness yet.
        ctx.set_emphasis(&[0.0, 0.0, 0.0]);
        let weights = SelectionWeights { consonance: 0.0, abundance: 1.0, fairness: 0.0 };
        let mut rng = SmallRngSource::seeded(9);
        let mut seen = [false; 3];
        for _ in 0..200 {
            let idx = select_pathway(&set, &ctx, &weights, |_| false, &mut rng)
                .expect("candidates exist");
            seen[idx] = true;
        }
        assert_eq!(seen, [true; 3]);
    }

    #[test]
    fn heavier_candidates_win_more_often() {
        let (set, ctx) = setup(&[record("heavy", 1, 1, 1.0), record("light", 15, 8, 0.05)]);
        let weights = SelectionWeights { consonance: 0.5, abundance: 0.5, fairness: 0.0 };
        let mut rng = SmallRngSource::seeded(21);
        let mut heavy = 0;
        for _ in 0..1000 {
            if select_pathway(&set, &ctx, &weights, |_| false, &mut rng) == Some(0) {
                heavy += 1;
            }
        }
        assert!(heavy > 800, "heavy candidate won only {heavy}/1000");
    }
}
