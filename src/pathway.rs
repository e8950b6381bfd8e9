//! Pathway data model.
//!
//! Hosts describe their dataset as a list of [`PathwayRecord`]s; the
//! engine compiles them into a [`PathwaySet`] with interned category
//! names and all per-pathway derived values (frequency ratio,
//! consonance, base volume) precomputed, so nothing in the render path
//! touches strings or recomputes logs.

use std::collections::HashMap;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::config::VolumeConfig;

/// One pathway as supplied by the host.
///
/// `numerator`/`denominator` define the pitch of the pathway as a just
/// ratio above the fundamental. `abundance` is a non-negative measure
/// of how prominent the pathway is in the dataset; it is normalized
/// against the largest abundance in the set at load time.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct PathwayRecord {
    pub id: String,
    pub numerator: u32,
    pub denominator: u32,
    pub category: String,
    pub subcategory: Option<String>,
    pub abundance: f32,
}

/// How interval complexity maps to a consonance score in `(0, 1]`.
///
/// Both curves peak at the unison (n*d == 1) and fall off as the
/// product grows; `InverseSqrt` falls off faster, which brightens the
/// mix toward simple intervals.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsonanceCurve {
    InverseLog,
    InverseSqrt,
}

impl ConsonanceCurve {
    pub fn score(self, numerator: u32, denominator: u32) -> f32 {
        let nxd = (numerator.max(1) * denominator.max(1)) as f32;
        match self {
            ConsonanceCurve::InverseLog => 1.0 / (nxd + 1.0).log2(),
            ConsonanceCurve::InverseSqrt => 1.0 / nxd.sqrt(),
        }
    }
}

/// A pathway after compilation: indices instead of strings, derived
/// acoustic values cached.
#[derive(Debug, Clone)]
pub struct Pathway {
    pub id: String,
    pub numerator: u32,
    pub denominator: u32,
    pub category: usize,
    pub subcategory: Option<usize>,
    /// Abundance normalized to the set maximum, in [0, 1].
    pub abundance: f32,
    pub ratio: f32,
    pub log_ratio: f32,
    pub consonance: f32,
    pub base_volume: f32,
}

#[derive(Debug, Clone, Default)]
pub struct PathwaySet {
    pathways: Vec<Pathway>,
    by_id: HashMap<String, usize>,
    categories: Vec<String>,
    subcategories: Vec<String>,
    curve: ConsonanceCurve,
}

impl Default for ConsonanceCurve {
    fn default() -> Self {
        ConsonanceCurve::InverseLog
    }
}

impl PathwaySet {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Compile a record list. Records with a zero denominator or
    /// non-finite abundance are dropped rather than propagated into the
    /// render path.
    pub fn build(records: &[PathwayRecord], volume: &VolumeConfig, curve: ConsonanceCurve) -> Self {
        let mut set = Self {
            pathways: Vec::with_capacity(records.len()),
            by_id: HashMap::with_capacity(records.len()),
            categories: Vec::new(),
            subcategories: Vec::new(),
            curve,
        };

        let max_abundance = records
            .iter()
            .map(|r| if r.abundance.is_finite() { r.abundance.max(0.0) } else { 0.0 })
            .fold(0.0_f32, f32::max)
            .max(f32::EPSILON);

        for record in records {
            if record.denominator == 0 || record.numerator == 0 {
                continue;
            }
            if !record.abundance.is_finite() || record.abundance < 0.0 {
                continue;
            }
            if set.by_id.contains_key(&record.id) {
                continue;
            }

            let category = intern(&mut set.categories, &record.category);
            let subcategory = record
                .subcategory
                .as_deref()
                .map(|s| intern(&mut set.subcategories, s));

            let ratio = record.numerator as f32 / record.denominator as f32;
            let abundance = record.abundance / max_abundance;
            let idx = set.pathways.len();
            set.by_id.insert(record.id.clone(), idx);
            set.pathways.push(Pathway {
                id: record.id.clone(),
                numerator: record.numerator,
                denominator: record.denominator,
                category,
                subcategory,
                abundance,
                ratio,
                log_ratio: ratio.log2(),
                consonance: curve.score(record.numerator, record.denominator),
                base_volume: volume.base_volume(abundance),
            });
        }

        set
    }

    pub fn len(&self) -> usize {
        self.pathways.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pathways.is_empty()
    }

    #[inline]
    pub fn get(&self, idx: usize) -> &Pathway {
        &self.pathways[idx]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Pathway> {
        self.pathways.iter()
    }

    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.by_id.get(id).copied()
    }

    pub fn category_count(&self) -> usize {
        self.categories.len()
    }

    pub fn category_name(&self, idx: usize) -> Option<&str> {
        self.categories.get(idx).map(String::as_str)
    }

    pub fn category_index(&self, name: &str) -> Option<usize> {
        self.categories.iter().position(|c| c == name)
    }

    pub fn curve(&self) -> ConsonanceCurve {
        self.curve
    }

    /// Switch consonance curve and rescore every pathway. Intended for
    /// control messages; O(n) but touches no audio state.
    pub fn set_curve(&mut self, curve: ConsonanceCurve) {
        self.curve = curve;
        for p in &mut self.pathways {
            p.consonance = curve.score(p.numerator, p.denominator);
        }
    }
}

fn intern(names: &mut Vec<String>, name: &str) -> usize {
    match names.iter().position(|n| n == name) {
        Some(idx) => idx,
        None => {
            names.push(name.to_string());
            names.len() - 1
        }
    }
}
