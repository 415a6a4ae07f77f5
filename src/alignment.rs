/// Ungapped, information-weighted motif alignment
///
/// Used by the "alternatives" clustering policy: every motif type of a
/// partition cluster is aligned once against the cluster's canonical motif
/// and the best offsets are cached before any sequence task starts.
use log::debug;
use std::collections::HashMap;

use crate::collection::Partition;
use crate::error::{EngineError, EngineResult};
use crate::keyed_map::MemberKind;
use crate::motif::{Motif, PropertyBearer};
use crate::region::Strand;
use crate::store::DataStore;

/// Similarity of two normalized A/C/G/T columns in [0, 1]: one minus half
/// the total variation distance
pub fn column_similarity(a: &[f64; 4], b: &[f64; 4]) -> f64 {
    let distance: f64 = a.iter().zip(b).map(|(x, y)| (x - y).abs()).sum();
    1.0 - distance / 2.0
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Alignment {
    pub score: f64,
    /// Position of `other`'s first column in `reference` coordinates
    pub offset: i64,
}

/// Best placement of `other` against `reference`. Each overlapping column
/// pair contributes its similarity weighted by the smaller of the two column
/// information contents. Ties go to the offset closest to zero, then to the
/// smaller offset.
pub fn align(reference: &Motif, other: &Motif) -> Alignment {
    let (m, n) = (reference.length() as i64, other.length() as i64);
    let (ref_cols, other_cols) = (reference.matrix(), other.matrix());
    let (ref_ic, other_ic) = (reference.column_ic(), other.column_ic());

    let mut best = Alignment {
        score: f64::NEG_INFINITY,
        offset: 0,
    };
    for offset in -(n - 1)..m {
        let first = offset.max(0);
        let last = (offset + n).min(m);
        let mut score = 0.0;
        for i in first..last {
            let j = (i - offset) as usize;
            let i = i as usize;
            let weight = ref_ic[i].min(other_ic[j]);
            score += weight * column_similarity(&ref_cols[i], &other_cols[j]);
        }
        let better = score > best.score
            || (score == best.score
                && (offset.abs(), offset) < (best.offset.abs(), best.offset));
        if better {
            best = Alignment { score, offset };
        }
    }
    if best.score == f64::NEG_INFINITY {
        best.score = 0.0;
    }
    best
}

/// Cached placement of one motif type relative to its cluster's canonical type
#[derive(Debug, Clone, PartialEq)]
pub struct AlignmentEntry {
    pub cluster: String,
    pub canonical: String,
    /// Offset of the motif read on the direct strand
    pub direct: i64,
    /// Offset of the motif's reverse complement
    pub reverse: i64,
}

impl AlignmentEntry {
    /// Implied start of the canonical motif for a region starting at `start`,
    /// once for each offset
    pub fn anchors(&self, start: i64) -> [i64; 2] {
        [start - self.direct, start - self.reverse]
    }

    /// Canonical start established by a region that opens a cluster: the
    /// reverse offset applies on the reverse strand, the direct one otherwise
    pub fn established_start(&self, start: i64, strand: Strand) -> i64 {
        match strand {
            Strand::Reverse => start - self.reverse,
            _ => start - self.direct,
        }
    }
}

/// Per-type partition cluster, canonical type and offsets. Built once per
/// operation and read-only afterwards.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AlignmentCache {
    entries: HashMap<String, AlignmentEntry>,
}

impl AlignmentCache {
    /// Align every member of `partition` against the canonical motif of its
    /// cluster: the member with the highest information content, ties broken
    /// by name.
    pub fn build(store: &DataStore, partition: &Partition) -> EngineResult<Self> {
        if partition.kind() != MemberKind::Motif {
            return Err(EngineError::config(format!(
                "partition '{}' groups {} names, expected motif names",
                partition.name,
                partition.kind()
            )));
        }
        let mut entries = HashMap::new();
        for (cluster, members) in partition.clusters() {
            let motifs = members
                .iter()
                .map(|name| {
                    store.motif(name).ok_or_else(|| {
                        EngineError::config(format!(
                            "'{name}' in partition '{}' is not a known motif",
                            partition.name
                        ))
                    })
                })
                .collect::<EngineResult<Vec<&Motif>>>()?;
            if let Some(empty) = motifs.iter().find(|m| m.length() == 0) {
                return Err(EngineError::config(format!(
                    "motif '{}' in partition '{}' has no columns",
                    empty.name(),
                    partition.name
                )));
            }
            let Some(canonical) = canonical_motif(&motifs) else {
                continue;
            };
            for motif in &motifs {
                let direct = align(canonical, motif);
                let reverse = align(canonical, &motif.reverse_complement());
                entries.insert(
                    motif.name().to_string(),
                    AlignmentEntry {
                        cluster: cluster.to_string(),
                        canonical: canonical.name().to_string(),
                        direct: direct.offset,
                        reverse: reverse.offset,
                    },
                );
            }
            debug!(
                "[ALIGN] cluster '{cluster}': {} motif(s), canonical '{}'",
                motifs.len(),
                canonical.name()
            );
        }
        Ok(AlignmentCache { entries })
    }

    pub fn get(&self, kind: &str) -> Option<&AlignmentEntry> {
        self.entries.get(kind)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Are both types members of the same partition cluster?
    pub fn same_cluster(&self, a: &str, b: &str) -> bool {
        match (self.entries.get(a), self.entries.get(b)) {
            (Some(x), Some(y)) => x.cluster == y.cluster,
            _ => false,
        }
    }

    /// Canonical start a region of type `kind` establishes when it opens a
    /// cluster; `None` for types outside the partition
    pub fn canonical_start(&self, kind: &str, start: i64, strand: Strand) -> Option<i64> {
        self.entries
            .get(kind)
            .map(|entry| entry.established_start(start, strand))
    }

    /// Does a region of `kind` at `start` join the cluster opened by a
    /// `seed_kind` region? Either of its offsets must land on the cluster's
    /// established canonical start.
    pub fn joins(&self, seed_kind: &str, canonical_start: i64, kind: &str, start: i64) -> bool {
        match (self.entries.get(seed_kind), self.entries.get(kind)) {
            (Some(seed), Some(entry)) if seed.cluster == entry.cluster => {
                entry.anchors(start).contains(&canonical_start)
            }
            _ => false,
        }
    }
}

fn canonical_motif<'a>(motifs: &[&'a Motif]) -> Option<&'a Motif> {
    motifs.iter().copied().min_by(|a, b| {
        b.information_content()
            .total_cmp(&a.information_content())
            .then_with(|| a.name().cmp(b.name()))
    })
}
