/// Tracks: per-sequence numeric arrays, DNA or region lists
use indexmap::IndexMap;

use crate::error::{EngineError, EngineResult};
use crate::region::{RegionList, Strand};

/// Location of one sequence in the genome
#[derive(Debug, Clone, PartialEq)]
pub struct SequenceInfo {
    pub name: String,
    /// Genomic coordinate of relative position 0, whatever the strand
    pub genomic_start: i64,
    pub length: usize,
    pub strand: Strand,
}

impl SequenceInfo {
    pub fn new(name: impl Into<String>, genomic_start: i64, length: usize, strand: Strand) -> Self {
        SequenceInfo {
            name: name.into(),
            genomic_start,
            length,
            strand,
        }
    }

    pub fn genomic_end(&self) -> i64 {
        self.genomic_start + self.length as i64 - 1
    }

    /// Relative index of a genomic position, if it lies on this sequence
    pub fn relative(&self, genomic: i64) -> Option<usize> {
        let rel = genomic - self.genomic_start;
        if rel >= 0 && (rel as usize) < self.length {
            Some(rel as usize)
        } else {
            None
        }
    }

    pub fn genomic(&self, relative: i64) -> i64 {
        self.genomic_start + relative
    }
}

/// The active set of sequences, in their declared order
#[derive(Debug, Clone, Default)]
pub struct SequenceUniverse {
    sequences: IndexMap<String, SequenceInfo>,
}

impl SequenceUniverse {
    pub fn new(sequences: impl IntoIterator<Item = SequenceInfo>) -> Self {
        SequenceUniverse {
            sequences: sequences
                .into_iter()
                .map(|s| (s.name.clone(), s))
                .collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&SequenceInfo> {
        self.sequences.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.sequences.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.sequences.keys().map(|k| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &SequenceInfo> {
        self.sequences.values()
    }

    pub fn len(&self) -> usize {
        self.sequences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequences.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Numeric,
    Dna,
    Regions,
}

impl TrackKind {
    pub fn label(self) -> &'static str {
        match self {
            TrackKind::Numeric => "numeric track",
            TrackKind::Dna => "DNA track",
            TrackKind::Regions => "region track",
        }
    }
}

/// Data of one track for one sequence
#[derive(Debug, Clone, PartialEq)]
pub enum SequenceSlot {
    Numeric(Vec<f64>),
    Dna(Vec<u8>),
    Regions(RegionList),
}

impl SequenceSlot {
    pub fn kind(&self) -> TrackKind {
        match self {
            SequenceSlot::Numeric(_) => TrackKind::Numeric,
            SequenceSlot::Dna(_) => TrackKind::Dna,
            SequenceSlot::Regions(_) => TrackKind::Regions,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    pub name: String,
    /// Set on tracks produced by an operation rather than loaded
    pub derived: bool,
    kind: TrackKind,
    slots: IndexMap<String, SequenceSlot>,
    value_range: Option<(f64, f64)>,
}

impl Track {
    fn with_slots(
        name: impl Into<String>,
        kind: TrackKind,
        universe: &SequenceUniverse,
        mut make: impl FnMut(&SequenceInfo) -> SequenceSlot,
    ) -> Self {
        let mut track = Track {
            name: name.into(),
            derived: false,
            kind,
            slots: universe.iter().map(|s| (s.name.clone(), make(s))).collect(),
            value_range: None,
        };
        track.update_value_range();
        track
    }

    /// Numeric track filled with `fill` over every sequence of the universe
    pub fn numeric(name: impl Into<String>, universe: &SequenceUniverse, fill: f64) -> Self {
        Self::with_slots(name, TrackKind::Numeric, universe, |s| {
            SequenceSlot::Numeric(vec![fill; s.length])
        })
    }

    /// DNA track of all-'N' sequences
    pub fn dna(name: impl Into<String>, universe: &SequenceUniverse) -> Self {
        Self::with_slots(name, TrackKind::Dna, universe, |s| {
            SequenceSlot::Dna(vec![b'N'; s.length])
        })
    }

    /// Region track with an empty list for every sequence
    pub fn regions(name: impl Into<String>, universe: &SequenceUniverse) -> Self {
        Self::with_slots(name, TrackKind::Regions, universe, |_| {
            SequenceSlot::Regions(RegionList::new())
        })
    }

    pub fn kind(&self) -> TrackKind {
        self.kind
    }

    /// Replace one sequence's data. The slot must exist and keep its kind
    /// (and, for positional data, its length).
    pub fn set_slot(&mut self, sequence: &str, slot: SequenceSlot) -> EngineResult<()> {
        let kind = self.kind;
        let existing = self.slots.get_mut(sequence).ok_or_else(|| {
            EngineError::config(format!("track '{}' has no sequence '{sequence}'", self.name))
        })?;
        if slot.kind() != kind {
            return Err(EngineError::config(format!(
                "cannot store {} data in {} '{}'",
                slot.kind().label(),
                kind.label(),
                self.name
            )));
        }
        let length_mismatch = match (&*existing, &slot) {
            (SequenceSlot::Numeric(a), SequenceSlot::Numeric(b)) => a.len() != b.len(),
            (SequenceSlot::Dna(a), SequenceSlot::Dna(b)) => a.len() != b.len(),
            _ => false,
        };
        if length_mismatch {
            return Err(EngineError::config(format!(
                "length mismatch for sequence '{sequence}' in track '{}'",
                self.name
            )));
        }
        *existing = slot;
        if kind == TrackKind::Numeric {
            self.update_value_range();
        }
        Ok(())
    }

    pub fn slot(&self, sequence: &str) -> Option<&SequenceSlot> {
        self.slots.get(sequence)
    }

    pub fn slots(&self) -> &IndexMap<String, SequenceSlot> {
        &self.slots
    }

    /// Mutable access for per-sequence fan-out. Callers must not add or
    /// remove sequences.
    pub(crate) fn slots_mut(&mut self) -> &mut IndexMap<String, SequenceSlot> {
        &mut self.slots
    }

    pub fn numeric_values(&self, sequence: &str) -> Option<&[f64]> {
        match self.slots.get(sequence) {
            Some(SequenceSlot::Numeric(v)) => Some(v),
            _ => None,
        }
    }

    pub fn bases(&self, sequence: &str) -> Option<&[u8]> {
        match self.slots.get(sequence) {
            Some(SequenceSlot::Dna(v)) => Some(v),
            _ => None,
        }
    }

    pub fn region_list(&self, sequence: &str) -> Option<&RegionList> {
        match self.slots.get(sequence) {
            Some(SequenceSlot::Regions(list)) => Some(list),
            _ => None,
        }
    }

    /// Value at a relative position
    pub fn value_at(&self, sequence: &str, relative: i64) -> Option<f64> {
        let values = self.numeric_values(sequence)?;
        usize::try_from(relative)
            .ok()
            .and_then(|i| values.get(i))
            .copied()
    }

    pub fn base_at(&self, sequence: &str, relative: i64) -> Option<u8> {
        let bases = self.bases(sequence)?;
        usize::try_from(relative)
            .ok()
            .and_then(|i| bases.get(i))
            .copied()
    }

    /// Cached (min, max) over all finite values of a numeric track
    pub fn value_range(&self) -> Option<(f64, f64)> {
        self.value_range
    }

    /// Recompute the cached range. Called once by the top-level caller after
    /// all sequence tasks have finished.
    pub fn update_value_range(&mut self) {
        let mut range: Option<(f64, f64)> = None;
        for slot in self.slots.values() {
            if let SequenceSlot::Numeric(values) = slot {
                for &v in values.iter().filter(|v| v.is_finite()) {
                    range = Some(match range {
                        Some((lo, hi)) => (lo.min(v), hi.max(v)),
                        None => (v, v),
                    });
                }
            }
        }
        self.value_range = range;
    }

    pub fn region_count(&self) -> usize {
        self.slots
            .values()
            .map(|slot| match slot {
                SequenceSlot::Regions(list) => list.len(),
                _ => 0,
            })
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn universe() -> SequenceUniverse {
        SequenceUniverse::new(vec![
            SequenceInfo::new("seq1", 100, 5, Strand::Direct),
            SequenceInfo::new("seq2", 1000, 3, Strand::Reverse),
        ])
    }

    #[test]
    fn test_relative_positions() {
        let u = universe();
        let s = u.get("seq1").unwrap();
        assert_eq!(s.relative(100), Some(0));
        assert_eq!(s.relative(104), Some(4));
        assert_eq!(s.relative(105), None);
        assert_eq!(s.relative(99), None);
        assert_eq!(s.genomic_end(), 104);
    }

    #[test]
    fn test_slots_follow_universe() {
        let track = Track::numeric("cons", &universe(), 0.5);
        let names: Vec<&String> = track.slots().keys().collect();
        assert_eq!(names, vec!["seq1", "seq2"]);
        assert_eq!(track.numeric_values("seq2").unwrap().len(), 3);
        assert_eq!(track.value_range(), Some((0.5, 0.5)));
    }

    #[test]
    fn test_set_slot_validates_kind_and_length() {
        let mut track = Track::numeric("cons", &universe(), 0.0);
        assert!(track
            .set_slot("seq1", SequenceSlot::Numeric(vec![1.0, 2.0]))
            .is_err());
        assert!(track
            .set_slot("seq1", SequenceSlot::Regions(RegionList::new()))
            .is_err());
        track
            .set_slot("seq1", SequenceSlot::Numeric(vec![1.0, -2.0, 3.0, 4.0, 5.0]))
            .unwrap();
        assert_eq!(track.value_range(), Some((-2.0, 5.0)));
        assert_eq!(track.value_at("seq1", 1), Some(-2.0));
        assert_eq!(track.value_at("seq1", -1), None);
    }
}
