//! Ripple cascade: when a pathway sounds, harmonically or functionally
//! related pathways may echo it shortly after, and those echoes can
//! trigger echoes of their own at decreasing strength.
//!
//! The relation graph is built once per dataset load; the render path
//! only walks precomputed edges and a bounded pending queue.

use crate::config::RippleConfig;
use crate::pathway::PathwaySet;
use crate::rng::RandomSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    /// Same subcategory: the tightest functional bond.
    Subcategory,
    /// Same category.
    Category,
    /// Target is an octave (or double octave) of the source.
    Octave,
    /// Target sits a small consonance step away.
    Step,
}

impl RelationKind {
    /// Base echo latency before jitter. Closer bonds answer sooner.
    fn base_delay(self) -> f32 {
        match self {
            RelationKind::Subcategory => 0.02,
            RelationKind::Octave => 0.03,
            RelationKind::Category => 0.04,
            RelationKind::Step => 0.06,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Relation {
    pub target: usize,
    pub kind: RelationKind,
    pub strength: f32,
}

pub struct RelationGraph {
    outgoing: Vec<Vec<Relation>>,
}

impl RelationGraph {
    pub fn build(set: &PathwaySet, cfg: &RippleConfig) -> Self {
        let mut outgoing = Vec::with_capacity(set.len());
        for src in 0..set.len() {
            let s = set.get(src);
            let mut relations: Vec<Relation> = Vec::new();
            for dst in 0..set.len() {
                if dst == src {
                    continue;
                }
                let d = set.get(dst);

                let mut strength = 0.0;
                let mut kind = RelationKind::Step;
                if s.subcategory.is_some() && s.subcategory == d.subcategory {
                    strength += cfg.subcategory_bond;
                    kind = RelationKind::Subcategory;
                } else if s.category == d.category {
                    strength += cfg.category_bond;
                    kind = RelationKind::Category;
                }

                let ratio_gap = (s.log_ratio - d.log_ratio).abs();
                if (ratio_gap - 1.0).abs() < 0.01 || (ratio_gap - 2.0).abs() < 0.01 {
                    strength += cfg.octave_bond;
                    if kind == RelationKind::Step {
                        kind = RelationKind::Octave;
                    }
                }

                // Small consonance steps bond; remote intervals don't.
                let consonance_gap = (s.consonance - d.consonance).abs();
                strength += (cfg.step_bonus_cap - consonance_gap).max(0.0);

                // Echoes lean toward consonant targets.
                let product = d.numerator * d.denominator;
                if product <= 4 {
                    strength += cfg.fundamental_bonus;
                } else if product <= 12 {
                    strength += cfg.near_bonus;
                }

                if strength >= cfg.strength_threshold {
                    relations.push(Relation { target: dst, kind, strength: strength.min(1.0) });
                }
            }
            relations.sort_by(|a, b| {
                b.strength.partial_cmp(&a.strength).unwrap_or(std::cmp::Ordering::Equal)
            });
            relations.truncate(cfg.max_relations);
            outgoing.push(relations);
        }
        Self { outgoing }
    }

    pub fn outgoing(&self, source: usize) -> &[Relation] {
        self.outgoing.get(source).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// A queued echo waiting for its trigger time.
#[derive(Debug, Clone, Copy)]
pub struct PendingRipple {
    pub pathway: usize,
    pub trigger_time: f64,
    pub strength: f32,
    pub generation: u32,
}

pub struct RipplePropagator {
    graph: RelationGraph,
    queue: Vec<PendingRipple>,
    cfg: RippleConfig,
}

impl RipplePropagator {
    pub fn new(set: &PathwaySet, cfg: RippleConfig) -> Self {
        let queue = Vec::with_capacity(cfg.max_queue.max(1));
        Self { graph: RelationGraph::build(set, &cfg), queue, cfg }
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn graph(&self) -> &RelationGraph {
        &self.graph
    }

    pub fn clear(&mut self) {
        self.queue.clear();
    }

    /// A pathway just sounded: roll the dice on each of its relations
    /// and queue the echoes that pass. `generation` is 0 for an organic
    /// spawn; echoes re-enter with generation + 1 and decayed strength,
    /// and the cascade dies out at `max_generations`.
    pub fn on_sounded(
        &mut self,
        source: usize,
        strength: f32,
        generation: u32,
        activity: f32,
        now: f64,
        rng: &mut dyn RandomSource,
    ) {
        if generation >= self.cfg.max_generations || activity < 0.1 {
            return;
        }
        let max_echoes = 1 + (activity * 2.5) as usize;
        let mut queued = 0usize;
        for rel in self.graph.outgoing(source) {
            if queued >= max_echoes || self.queue.len() >= self.cfg.max_queue {
                break;
            }
            if !rng.chance(rel.strength * activity) {
                continue;
            }
            let delay = rel.kind.base_delay() + rng.next_f32() * self.cfg.delay_jitter;
            self.queue.push(PendingRipple {
                pathway: rel.target,
                trigger_time: now + delay as f64,
                strength: (strength * self.cfg.generation_decay * rel.strength).clamp(0.0, 1.0),
                generation: generation + 1,
            });
            queued += 1;
        }
    }

    /// Move every ripple whose trigger time has passed into `due`.
    pub fn take_due(&mut self, now: f64, due: &mut Vec<PendingRipple>) {
        let mut i = 0;
        while i < self.queue.len() {
            if self.queue[i].trigger_time <= now {
                due.push(self.queue.swap_remove(i));
            } else {
                i += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VolumeConfig;
    use crate::pathway::{ConsonanceCurve, PathwayRecord};
    use crate::rng::{ConstSource, SmallRngSource};

    fn record(id: &str, n: u32, d: u32, cat: &str, sub: Option<&str>) -> PathwayRecord {
        PathwayRecord {
            id: id.into(),
            numerator: n,
            denominator: d,
            category: cat.into(),
            subcategory: sub.map(Into::into),
            abundance: 1.0,
        }
    }

    fn build(records: &[PathwayRecord]) -> PathwaySet {
        PathwaySet::build(records, &VolumeConfig::default(), ConsonanceCurve::InverseLog)
    }

    #[test]
    fn subcategory_bonds_beat_category_bonds() {
        let set = build(&[
            record("src", 1, 1, "amino", Some("bcaa")),
            record("sibling", 3, 2, "amino", Some("bcaa")),
            record("cousin", 3, 2, "amino", Some("aromatic")),
        ]);
        let graph = RelationGraph::build(&set, &RippleConfig::default());
        let rels = graph.outgoing(0);
        let sibling = rels.iter().find(|r| r.target == 1).expect("sibling bonded");
        let cousin = rels.iter().find(|r| r.target == 2).expect("cousin bonded");
        assert_eq!(sibling.kind, RelationKind::Subcategory);
        assert_eq!(cousin.kind, RelationKind::Category);
        assert!(sibling.strength > cousin.strength);
    }

    #[test]
    fn octaves_bond_across_categories() {
        let set = build(&[
            record("low", 1, 1, "amino", None),
            record("high", 2, 1, "lipid", None),
        ]);
        let graph = RelationGraph::build(&set, &RippleConfig::default());
        let rel = graph.outgoing(0).iter().find(|r| r.target == 1).expect("octave bonded");
        assert_eq!(rel.kind, RelationKind::Octave);
    }

    #[test]
    fn weak_pairs_are_pruned_and_lists_are_capped() {
        let mut records = vec![record("src", 1, 1, "a", None)];
        for i in 0..30 {
            records.push(record(&format!("t{i}"), 3, 2, "a", None));
        }
        let cfg = RippleConfig::default();
        let set = build(&records);
        let graph = RelationGraph::build(&set, &cfg);
        assert!(graph.outgoing(0).len() <= cfg.max_relations);

        // A remote dissonant pathway in another category bonds to nothing.
        let lonely = build(&[
            record("src", 1, 1, "a", None),
            record("far", 45, 32, "b", None),
        ]);
        let graph = RelationGraph::build(&lonely, &cfg);
        assert!(graph.outgoing(0).iter().all(|r| r.target != 1) || graph.outgoing(0).is_empty());
    }

    #[test]
    fn cascade_strength_decays_per_generation() {
        // Two mutually bonded pathways; force every dice roll to pass.
        let set = build(&[
            record("a", 1, 1, "x", Some("s")),
            record("b", 2, 1, "x", Some("s")),
        ]);
        let cfg = RippleConfig::default();
        let decay = cfg.generation_decay;
        let max_gen = cfg.max_generations;
        let mut prop = RipplePropagator::new(&set, cfg);
        let mut rng = ConstSource(0.0);

        let mut due = Vec::new();
        prop.on_sounded(0, 1.0, 0, 1.0, 0.0, &mut rng);
        let mut generations_seen = 0u32;
        for _ in 0..32 {
            due.clear();
            prop.take_due(f64::MAX, &mut due);
            if due.is_empty() {
                break;
            }
            for r in &due {
                assert!(r.generation <= max_gen);
                assert!(
                    r.strength <= decay.powi(r.generation as i32) + 1e-6,
                    "gen {} strength {} exceeds bound",
                    r.generation,
                    r.strength
                );
                generations_seen = generations_seen.max(r.generation);
                prop.on_sounded(r.pathway, r.strength, r.generation, 1.0, 0.0, &mut rng);
            }
        }
        assert_eq!(generations_seen, max_gen);
        assert_eq!(prop.queue_len(), 0, "cascade must terminate");
    }

    #[test]
    fn queue_is_bounded() {
        let mut records = Vec::new();
        for i in 0..40 {
            records.push(record(&format!("p{i}"), 3, 2, "a", Some("s")));
        }
        let mut cfg = RippleConfig::default();
        cfg.max_queue = 16;
        let set = build(&records);
        let mut prop = RipplePropagator::new(&set, cfg);
        let mut rng = ConstSource(0.0);
        for src in 0..40 {
            prop.on_sounded(src, 1.0, 0, 1.0, 0.0, &mut rng);
            assert!(prop.queue_len() <= 16);
        }
    }

    #[test]
    fn low_activity_suppresses_ripples() {
        let set = build(&[
            record("a", 1, 1, "x", Some("s")),
            record("b", 2, 1, "x", Some("s")),
        ]);
        let mut prop = RipplePropagator::new(&set, RippleConfig::default());
        let mut rng = SmallRngSource::seeded(3);
        prop.on_sounded(0, 1.0, 0, 0.05, 0.0, &mut rng);
        assert_eq!(prop.queue_len(), 0);
    }

    #[test]
    fn ripples_fire_only_after_their_delay() {
        let set = build(&[
            record("a", 1, 1, "x", Some("s")),
            record("b", 2, 1, "x", Some("s")),
        ]);
        let mut prop = RipplePropagator::new(&set, RippleConfig::default());
        let mut rng = ConstSource(0.0);
        prop.on_sounded(0, 1.0, 0, 1.0, 10.0, &mut rng);
        let queued = prop.queue_len();
        assert!(queued > 0);
        let mut due = Vec::new();
        prop.take_due(10.0, &mut due);
        assert!(due.is_empty(), "echo fired before its delay");
        prop.take_due(11.0, &mut due);
        assert_eq!(due.len(), queued);
        assert_eq!(prop.queue_len(), 0);
    }
}
