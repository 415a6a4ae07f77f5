/// Region clustering and pruning
///
/// Regions of one sequence are swept left to right. Each region is tested
/// against the open clusters from the most recent backwards and joins the
/// first equivalent one, or opens a new cluster. A cluster whose trailing
/// edge plus the longest region length lies before the new start cannot
/// receive members anymore, which ends the backward search.
///
/// Each cluster keeps one canonical representative chosen by a keep policy;
/// the other members are removed when they pass the active condition.
use log::debug;
use ordered_float::OrderedFloat;
use std::cmp::Reverse;
use std::collections::{HashMap, HashSet};
use std::str::FromStr;

use crate::alignment::AlignmentCache;
use crate::cancel::CancellationToken;
use crate::condition::Gate;
use crate::error::EngineResult;
use crate::motif::Motif;
use crate::region::{Region, RegionId, RegionList, Strand};
use crate::track::SequenceInfo;

/// When are two regions the same site?
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EquivalencePolicy {
    Duplicates,          // Same span, type, strand and properties; score ignored
    Similar,             // Same span and type; score, strand and properties ignored
    Palindromes,         // Same type on opposite strands, same span or same motif core
    AlternativesOptimal, // Same partition cluster, either offset lands on the cluster's canonical start
    AlternativesNaive,   // Same partition cluster, overlapping
}

impl EquivalencePolicy {
    pub fn needs_alignment(self) -> bool {
        matches!(
            self,
            EquivalencePolicy::AlternativesOptimal | EquivalencePolicy::AlternativesNaive
        )
    }
}

impl FromStr for EquivalencePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "duplicates" => Ok(EquivalencePolicy::Duplicates),
            "similar" => Ok(EquivalencePolicy::Similar),
            "palindromes" => Ok(EquivalencePolicy::Palindromes),
            "alternatives" | "alternatives-optimal" => Ok(EquivalencePolicy::AlternativesOptimal),
            "alternatives-naive" => Ok(EquivalencePolicy::AlternativesNaive),
            other => Err(format!("unknown prune policy '{other}'")),
        }
    }
}

/// Which member of a cluster survives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeepPolicy {
    #[default]
    TopScore,
    HighestIc,
    FirstName,           // Alphabetically first type
    PreferDirect,        // First member on the direct strand
    MatchSequenceStrand, // First member on the sequence's own strand
}

impl FromStr for KeepPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "top-score" | "score" => Ok(KeepPolicy::TopScore),
            "highest-ic" | "ic" => Ok(KeepPolicy::HighestIc),
            "first-name" | "name" => Ok(KeepPolicy::FirstName),
            "direct" | "prefer-direct" => Ok(KeepPolicy::PreferDirect),
            "sequence-strand" | "match-strand" => Ok(KeepPolicy::MatchSequenceStrand),
            other => Err(format!("unknown keep policy '{other}'")),
        }
    }
}

/// Read-only clustering parameters shared by every sequence task
#[derive(Debug, Clone, Copy)]
pub struct ClusterSettings<'a> {
    pub policy: EquivalencePolicy,
    pub keep: KeepPolicy,
    /// Required by the alternatives policies
    pub alignments: Option<&'a AlignmentCache>,
    /// Motif information content by type, for `KeepPolicy::HighestIc`
    pub information: &'a HashMap<String, f64>,
    /// Motifs by type, for core spans of palindromic sites
    pub motifs: &'a HashMap<String, &'a Motif>,
    pub checkpoint_interval: usize,
}

impl ClusterSettings<'_> {
    fn equivalent(&self, list: &RegionList, cluster: &OpenCluster, id: RegionId) -> bool {
        let (a, b) = (list.get(cluster.members[0]), list.get(id));
        match self.policy {
            EquivalencePolicy::Duplicates => list.same_value(cluster.members[0], id, false),
            EquivalencePolicy::Similar => {
                a.kind == b.kind && (a.start(), a.end()) == (b.start(), b.end())
            }
            EquivalencePolicy::Palindromes => {
                a.kind == b.kind
                    && a.strand != Strand::Indeterminate
                    && a.strand == b.strand.opposite()
                    && ((a.start(), a.end()) == (b.start(), b.end()) || self.same_core(a, b))
            }
            EquivalencePolicy::AlternativesOptimal => {
                match (self.alignments, cluster.canonical_start) {
                    (Some(cache), Some(established)) => {
                        cache.joins(&a.kind, established, &b.kind, b.start())
                    }
                    _ => false,
                }
            }
            EquivalencePolicy::AlternativesNaive => {
                a.overlaps(b.start(), b.end())
                    && self
                        .alignments
                        .is_some_and(|cache| cache.same_cluster(&a.kind, &b.kind))
            }
        }
    }

    /// Do two sites of one motif type cover the same core columns?
    fn same_core(&self, a: &Region, b: &Region) -> bool {
        self.motifs.get(&a.kind).is_some_and(|motif| {
            motif.core_span(a.start(), a.end(), a.strand)
                == motif.core_span(b.start(), b.end(), b.strand)
        })
    }
}

struct OpenCluster {
    members: Vec<RegionId>,
    trailing_edge: i64,
    /// Canonical motif start set by the seed, for the optimal alternatives policy
    canonical_start: Option<i64>,
}

/// Group the top-level regions of `list` into clusters of equivalent
/// regions. Clusters come out in the order they were opened; members in list
/// order. Singletons are included.
pub fn find_clusters(
    list: &RegionList,
    settings: &ClusterSettings<'_>,
    cancel: &CancellationToken,
) -> EngineResult<Vec<Vec<RegionId>>> {
    let max_len = list.max_length();
    let mut clusters: Vec<OpenCluster> = Vec::new();
    let mut checkpoint = cancel.every(settings.checkpoint_interval);

    for (id, region) in list.iter() {
        checkpoint.tick()?;
        let mut joined = None;
        for (index, cluster) in clusters.iter().enumerate().rev() {
            if cluster.trailing_edge + max_len < region.start() {
                break;
            }
            if settings.equivalent(list, cluster, id) {
                joined = Some(index);
                break;
            }
        }
        match joined {
            Some(index) => {
                let cluster = &mut clusters[index];
                cluster.members.push(id);
                cluster.trailing_edge = cluster.trailing_edge.max(region.end());
            }
            None => clusters.push(OpenCluster {
                members: vec![id],
                trailing_edge: region.end(),
                canonical_start: settings.alignments.and_then(|cache| {
                    cache.canonical_start(&region.kind, region.start(), region.strand)
                }),
            }),
        }
    }
    Ok(clusters.into_iter().map(|c| c.members).collect())
}

/// Canonical member of a cluster; ties go to the earliest member
pub fn choose_canonical(
    list: &RegionList,
    members: &[RegionId],
    sequence: &SequenceInfo,
    settings: &ClusterSettings<'_>,
) -> Option<RegionId> {
    let ranked = members.iter().copied().enumerate();
    let best = match settings.keep {
        KeepPolicy::TopScore => {
            ranked.min_by_key(|&(i, id)| (Reverse(OrderedFloat(list.get(id).score)), i))
        }
        KeepPolicy::HighestIc => ranked.min_by_key(|&(i, id)| {
            let ic = settings
                .information
                .get(&list.get(id).kind)
                .copied()
                .unwrap_or(0.0);
            (Reverse(OrderedFloat(ic)), i)
        }),
        KeepPolicy::FirstName => ranked.min_by_key(|&(i, id)| (list.get(id).kind.as_str(), i)),
        KeepPolicy::PreferDirect => {
            ranked.min_by_key(|&(i, id)| (list.get(id).strand != Strand::Direct, i))
        }
        KeepPolicy::MatchSequenceStrand => {
            ranked.min_by_key(|&(i, id)| (list.get(id).strand != sequence.strand, i))
        }
    };
    best.map(|(_, id)| id)
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PruneStats {
    /// Clusters with more than one member
    pub clusters: usize,
    pub removed: usize,
}

impl PruneStats {
    pub fn merge(&mut self, other: PruneStats) {
        self.clusters += other.clusters;
        self.removed += other.removed;
    }
}

/// Collapse every cluster of `list` to its canonical member. Non-canonical
/// members are only removed when they pass `gate`.
pub fn prune_regions(
    list: &mut RegionList,
    sequence: &SequenceInfo,
    settings: &ClusterSettings<'_>,
    gate: &Gate<'_>,
    cancel: &CancellationToken,
) -> EngineResult<PruneStats> {
    let clusters = find_clusters(list, settings, cancel)?;
    let mut stats = PruneStats::default();
    let mut doomed: HashSet<RegionId> = HashSet::new();
    for members in clusters.iter().filter(|c| c.len() > 1) {
        stats.clusters += 1;
        let Some(keep) = choose_canonical(list, members, sequence, settings) else {
            continue;
        };
        doomed.extend(
            members
                .iter()
                .copied()
                .filter(|&id| id != keep && gate.admits_region(sequence, list.get(id))),
        );
    }
    cancel.checkpoint()?;
    if !doomed.is_empty() {
        stats.removed = doomed.len();
        list.retain(|id, _| !doomed.contains(&id));
    }
    debug!(
        "[PRUNE] {}: {} cluster(s), {} region(s) removed",
        sequence.name, stats.clusters, stats.removed
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::Partition;
    use crate::keyed_map::MemberKind;
    use crate::store::DataStore;
    use crate::track::SequenceUniverse;
    use pretty_assertions::assert_eq;

    fn sequence() -> SequenceInfo {
        SequenceInfo::new("chr1", 0, 1000, Strand::Reverse)
    }

    fn settings<'a>(
        policy: EquivalencePolicy,
        keep: KeepPolicy,
        information: &'a HashMap<String, f64>,
        motifs: &'a HashMap<String, &'a Motif>,
    ) -> ClusterSettings<'a> {
        ClusterSettings {
            policy,
            keep,
            alignments: None,
            information,
            motifs,
            checkpoint_interval: 256,
        }
    }

    fn summary(list: &RegionList) -> Vec<(i64, i64, String, f64)> {
        list.iter()
            .map(|(_, r)| (r.start(), r.end(), r.kind.clone(), r.score))
            .collect()
    }

    #[test]
    fn test_duplicates_keep_top_score() {
        let info = HashMap::new();
        let motifs = HashMap::new();
        let mut list = RegionList::from_regions(vec![
            Region::new(0, 5, "A", 1.0, Strand::Direct),
            Region::new(0, 5, "A", 2.0, Strand::Direct),
        ]);
        let stats = prune_regions(
            &mut list,
            &sequence(),
            &settings(EquivalencePolicy::Duplicates, KeepPolicy::TopScore, &info, &motifs),
            &Gate::open(),
            &CancellationToken::new(),
        )
        .unwrap();
        assert_eq!(stats, PruneStats { clusters: 1, removed: 1 });
        assert_eq!(summary(&list), vec![(0, 5, "A".to_string(), 2.0)]);
    }

    #[test]
    fn test_duplicates_need_equal_properties() {
        let info = HashMap::new();
        let motifs = HashMap::new();
        let list = RegionList::from_regions(vec![
            Region::new(0, 5, "A", 1.0, Strand::Direct).with_property("id", "x"),
            Region::new(0, 5, "A", 1.0, Strand::Direct).with_property("id", "y"),
            Region::new(0, 5, "A", 1.0, Strand::Reverse).with_property("id", "x"),
            Region::new(0, 5, "A", 3.0, Strand::Direct).with_property("id", "x"),
        ]);
        let s = settings(EquivalencePolicy::Duplicates, KeepPolicy::TopScore, &info, &motifs);
        let clusters = find_clusters(&list, &s, &CancellationToken::new()).unwrap();
        let sizes: Vec<usize> = clusters.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![2, 1, 1]);
    }

    #[test]
    fn test_similar_and_palindromes() {
        let info = HashMap::new();
        let motifs = HashMap::new();
        let list = RegionList::from_regions(vec![
            Region::new(10, 20, "A", 1.0, Strand::Direct),
            Region::new(15, 25, "A", 1.0, Strand::Direct),
            Region::new(10, 20, "A", 1.0, Strand::Reverse),
            Region::new(30, 40, "A", 1.0, Strand::Direct),
        ]);
        let cancel = CancellationToken::new();
        let similar = find_clusters(
            &list,
            &settings(EquivalencePolicy::Similar, KeepPolicy::TopScore, &info, &motifs),
            &cancel,
        )
        .unwrap();
        assert_eq!(similar.len(), 3);
        let strands: Vec<Strand> = similar[0].iter().map(|&id| list.get(id).strand).collect();
        assert_eq!(strands, vec![Strand::Direct, Strand::Reverse]);

        let palindromes = find_clusters(
            &list,
            &settings(EquivalencePolicy::Palindromes, KeepPolicy::TopScore, &info, &motifs),
            &cancel,
        )
        .unwrap();
        assert_eq!(palindromes.len(), 3);
        let paired: Vec<(i64, Strand)> = palindromes[0]
            .iter()
            .map(|&id| (list.get(id).start(), list.get(id).strand))
            .collect();
        assert_eq!(paired, vec![(10, Strand::Direct), (10, Strand::Reverse)]);
    }

    #[test]
    fn test_keep_policies() {
        let mut info = HashMap::new();
        let motifs = HashMap::new();
        info.insert("B".to_string(), 12.0);
        info.insert("C".to_string(), 9.0);
        let list = RegionList::from_regions(vec![
            Region::new(0, 9, "C", 5.0, Strand::Direct),
            Region::new(0, 9, "B", 1.0, Strand::Reverse),
            Region::new(0, 9, "A", 5.0, Strand::Direct),
        ]);
        let members: Vec<RegionId> = list.ids().to_vec();
        let keep = |policy| {
            let s = settings(EquivalencePolicy::Similar, policy, &info, &motifs);
            let id = choose_canonical(&list, &members, &sequence(), &s).unwrap();
            list.get(id).kind.clone()
        };
        assert_eq!(keep(KeepPolicy::TopScore), "C");
        assert_eq!(keep(KeepPolicy::HighestIc), "B");
        assert_eq!(keep(KeepPolicy::FirstName), "A");
        assert_eq!(keep(KeepPolicy::PreferDirect), "C");
        assert_eq!(keep(KeepPolicy::MatchSequenceStrand), "B");
    }

    #[test]
    fn test_alternatives_use_cached_offsets() {
        let mut store = DataStore::new(SequenceUniverse::default());
        store.insert_motif(Motif::from_consensus("AP1_long", "TTGACTCATT"));
        store.insert_motif(Motif::from_consensus("AP1", "TGACTCA"));
        let partition = Partition::new("p", MemberKind::Motif)
            .with("AP1", "bZIP")
            .with("AP1_long", "bZIP");
        let cache = AlignmentCache::build(&store, &partition).unwrap();
        let info = store.motif_ic_table();
        let motifs = HashMap::new();
        let list = RegionList::from_regions(vec![
            Region::new(100, 109, "AP1_long", 3.0, Strand::Direct),
            Region::new(101, 107, "AP1", 4.0, Strand::Direct),
            Region::new(103, 109, "AP1", 5.0, Strand::Direct),
        ]);
        let cancel = CancellationToken::new();
        let mut s = settings(
            EquivalencePolicy::AlternativesOptimal,
            KeepPolicy::HighestIc,
            &info,
            &motifs,
        );
        s.alignments = Some(&cache);
        let optimal = find_clusters(&list, &s, &cancel).unwrap();
        let sizes: Vec<usize> = optimal.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![2, 1]);

        s.policy = EquivalencePolicy::AlternativesNaive;
        let naive = find_clusters(&list, &s, &cancel).unwrap();
        assert_eq!(naive.len(), 1);
        let keep = choose_canonical(&list, &naive[0], &sequence(), &s).unwrap();
        assert_eq!(list.get(keep).kind, "AP1_long");
    }

    #[test]
    fn test_palindromes_share_a_core_on_opposite_strands() {
        let info = HashMap::new();
        // Core is columns 2..=4
        let motif = Motif::from_consensus("M", "NNACG");
        let mut motifs = HashMap::new();
        motifs.insert("M".to_string(), &motif);
        let list = RegionList::from_regions(vec![
            Region::new(0, 4, "M", 1.0, Strand::Direct),
            Region::new(2, 6, "M", 2.0, Strand::Reverse),
            Region::new(2, 6, "M", 3.0, Strand::Direct),
            Region::new(3, 7, "M", 4.0, Strand::Reverse),
        ]);
        let s = settings(EquivalencePolicy::Palindromes, KeepPolicy::TopScore, &info, &motifs);
        let clusters = find_clusters(&list, &s, &CancellationToken::new()).unwrap();
        let starts: Vec<Vec<i64>> = clusters
            .iter()
            .map(|c| c.iter().map(|&id| list.get(id).start()).collect())
            .collect();
        // (2,6,+) only meets the seed at 0 on its own strand; (3,7,-) has core (3,5)
        assert_eq!(starts, vec![vec![0, 2], vec![2], vec![3]]);

        // Without the motif only equal spans pair up
        let unknown = HashMap::new();
        let s = settings(EquivalencePolicy::Palindromes, KeepPolicy::TopScore, &info, &unknown);
        let clusters = find_clusters(&list, &s, &CancellationToken::new()).unwrap();
        let sizes: Vec<usize> = clusters.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![1, 2, 1]);
    }

    #[test]
    fn test_alternatives_join_only_the_established_canonical_start() {
        let mut store = DataStore::new(SequenceUniverse::default());
        store.insert_motif(Motif::from_consensus("C", "TTGACTCATT"));
        store.insert_motif(Motif::from_consensus("X", "GACTCATT"));
        let partition = Partition::new("p", MemberKind::Motif)
            .with("C", "f")
            .with("X", "f");
        let cache = AlignmentCache::build(&store, &partition).unwrap();
        // X sits two columns into C; its reverse complement one column before it
        let x = cache.get("X").unwrap();
        assert_eq!((x.direct, x.reverse), (2, -1));
        let info = store.motif_ic_table();
        let motifs = HashMap::new();
        let mut s = settings(
            EquivalencePolicy::AlternativesOptimal,
            KeepPolicy::HighestIc,
            &info,
            &motifs,
        );
        s.alignments = Some(&cache);
        let cancel = CancellationToken::new();

        // X at 100 establishes 98. C at 100 implies 100 or 101 and stays apart,
        // even though X's reverse offset would also imply 101
        let apart = RegionList::from_regions(vec![
            Region::new(100, 107, "X", 1.0, Strand::Direct),
            Region::new(100, 109, "C", 1.0, Strand::Direct),
        ]);
        assert_eq!(find_clusters(&apart, &s, &cancel).unwrap().len(), 2);

        // C at 98 establishes 98 and X at 100 lands on it
        let joined = RegionList::from_regions(vec![
            Region::new(98, 107, "C", 1.0, Strand::Direct),
            Region::new(100, 107, "X", 1.0, Strand::Direct),
        ]);
        assert_eq!(find_clusters(&joined, &s, &cancel).unwrap().len(), 1);
    }

    #[test]
    fn test_gate_protects_members_but_never_the_canonical() {
        use crate::condition::{NumericComparison, PositionCondition};
        use crate::operand::Operand;

        let info = HashMap::new();

        let motifs = HashMap::new();
        let store = DataStore::new(SequenceUniverse::default());
        let condition = PositionCondition::compare(
            Operand::RegionProperty("score".into()),
            NumericComparison::Lt,
            Operand::Constant(3.0),
        );
        let gate = Gate::resolve(&store, Some(&condition), None).unwrap();
        let mut list = RegionList::from_regions(vec![
            Region::new(0, 5, "A", 1.0, Strand::Direct),
            Region::new(0, 5, "A", 4.0, Strand::Direct),
            Region::new(0, 5, "A", 9.0, Strand::Direct),
        ]);
        let stats = prune_regions(
            &mut list,
            &sequence(),
            &settings(EquivalencePolicy::Duplicates, KeepPolicy::TopScore, &info, &motifs),
            &gate,
            &CancellationToken::new(),
        )
        .unwrap();
        assert_eq!(stats.removed, 1);
        let scores: Vec<f64> = list.iter().map(|(_, r)| r.score).collect();
        assert_eq!(scores, vec![4.0, 9.0]);
    }

    #[test]
    fn test_far_regions_stop_the_backward_search() {
        let info = HashMap::new();
        let motifs = HashMap::new();
        let list = RegionList::from_regions(vec![
            Region::new(0, 1, "A", 1.0, Strand::Direct),
            Region::new(100, 101, "B", 1.0, Strand::Direct),
            Region::new(200, 201, "A", 1.0, Strand::Direct),
        ]);
        let s = settings(EquivalencePolicy::Duplicates, KeepPolicy::TopScore, &info, &motifs);
        let clusters = find_clusters(&list, &s, &CancellationToken::new()).unwrap();
        assert_eq!(clusters.len(), 3);
    }
}
