/// Pruning and filtering of region tracks through the scheduler
use std::collections::HashSet;
use std::sync::Arc;

use pretty_assertions::assert_eq;

use trackops::cluster::{EquivalencePolicy, KeepPolicy};
use trackops::collection::Partition;
use trackops::condition::{NumericComparison, PositionCondition, WindowCondition};
use trackops::display::RecordingDisplayHook;
use trackops::keyed_map::MemberKind;
use trackops::motif::Motif;
use trackops::operand::Operand;
use trackops::operations::{FilterRequest, PruneRequest};
use trackops::region::{Region, RegionList, Strand};
use trackops::{CancellationToken, DataObject, DataStore, EngineError};

mod test_utils;
use test_utils::*;

fn motif_store() -> DataStore {
    let mut store = single_sequence_store("chr1", 1, 500);
    store.insert_motif(Motif::from_consensus("AP1_long", "TTGACTCATT"));
    store.insert_motif(Motif::from_consensus("AP1", "TGACTCA"));
    store.insert_motif(Motif::from_consensus("SP1", "GGGCGG"));
    store.insert(
        "families",
        DataObject::Partition(
            Partition::new("families", MemberKind::Motif)
                .with("AP1_long", "bZIP")
                .with("AP1", "bZIP")
                .with("SP1", "zf"),
        ),
    );
    add_regions(
        &mut store,
        "sites",
        "chr1",
        RegionList::from_regions(vec![
            Region::new(100, 109, "AP1_long", 2.0, Strand::Direct),
            Region::new(101, 107, "AP1", 6.0, Strand::Direct),
            Region::new(104, 109, "SP1", 1.0, Strand::Direct),
            Region::new(300, 305, "SP1", 3.0, Strand::Direct),
            Region::new(300, 305, "SP1", 4.0, Strand::Reverse),
        ]),
    );
    store
}

#[test]
fn test_duplicates_removed_from_synthetic_sites() {
    let engine = engine(3);
    let mut store = small_store(5);
    let report = PruneRequest::new("sites", EquivalencePolicy::Duplicates, KeepPolicy::TopScore)
        .into_target("unique")
        .run(&engine, &mut store, &CancellationToken::new())
        .unwrap()
        .completed()
        .unwrap();

    let source = store.track("sites").unwrap().region_count();
    assert_eq!(report.remaining + report.stats.removed, source);
    assert!(report.stats.removed > 0);
    for sequence in store.universe().iter() {
        let list = store
            .track("unique")
            .unwrap()
            .region_list(&sequence.name)
            .unwrap();
        let mut seen = HashSet::new();
        for (_, r) in list.iter() {
            assert!(
                seen.insert((r.start(), r.end(), r.kind.clone(), r.strand)),
                "duplicate left at {}:{}",
                sequence.name,
                r.start()
            );
        }
    }
}

#[test]
fn test_alternatives_keep_the_canonical_motif() {
    let hook = Arc::new(RecordingDisplayHook::new());
    let engine = engine(2).with_display_hook(hook.clone());
    let mut store = motif_store();

    let report = PruneRequest::new(
        "sites",
        EquivalencePolicy::AlternativesOptimal,
        KeepPolicy::HighestIc,
    )
    .with_partition("families")
    .into_target("alternatives")
    .run(&engine, &mut store, &CancellationToken::new())
    .unwrap()
    .completed()
    .unwrap();

    // AP1 sits one column into AP1_long; the two SP1 copies at 300 share
    // their anchor on both strands
    assert_eq!(report.stats.removed, 2);
    let kept: Vec<(i64, String)> = regions(&store, "alternatives", "chr1")
        .into_iter()
        .map(|r| (r.0, r.2))
        .collect();
    assert_eq!(
        kept,
        vec![
            (100, "AP1_long".to_string()),
            (104, "SP1".to_string()),
            (300, "SP1".to_string()),
        ]
    );
    assert_eq!(
        hook.created(),
        vec![("sites".to_string(), "alternatives".to_string())]
    );
    assert!(store.track("alternatives").unwrap().derived);
}

#[test]
fn test_alternatives_require_a_partition() {
    let mut store = motif_store();
    let err = PruneRequest::new(
        "sites",
        EquivalencePolicy::AlternativesNaive,
        KeepPolicy::TopScore,
    )
    .run(&engine(1), &mut store, &CancellationToken::new())
    .unwrap_err();
    assert!(matches!(err, EngineError::Config { .. }));
}

#[test]
fn test_palindromes_keep_the_sequence_strand() {
    let mut store = motif_store();
    PruneRequest::new(
        "sites",
        EquivalencePolicy::Palindromes,
        KeepPolicy::MatchSequenceStrand,
    )
    .run(&engine(2), &mut store, &CancellationToken::new())
    .unwrap();

    let list = store.track("sites").unwrap().region_list("chr1").unwrap();
    let at_300: Vec<(f64, Strand)> = list
        .iter()
        .filter(|(_, r)| r.start() == 300)
        .map(|(_, r)| (r.score, r.strand))
        .collect();
    assert_eq!(at_300, vec![(3.0, Strand::Direct)]);
    assert_eq!(list.len(), 4);
}

#[test]
fn test_palindromes_pair_sites_sharing_a_core() {
    let mut store = single_sequence_store("chr1", 1, 100);
    // Core is columns 2..=4
    store.insert_motif(Motif::from_consensus("M", "NNACG"));
    add_regions(
        &mut store,
        "sites",
        "chr1",
        RegionList::from_regions(vec![
            Region::new(10, 14, "M", 5.0, Strand::Direct),
            Region::new(12, 16, "M", 7.0, Strand::Reverse),
            Region::new(40, 44, "M", 1.0, Strand::Direct),
        ]),
    );
    let report = PruneRequest::new("sites", EquivalencePolicy::Palindromes, KeepPolicy::TopScore)
        .run(&engine(1), &mut store, &CancellationToken::new())
        .unwrap()
        .completed()
        .unwrap();
    assert_eq!((report.stats.clusters, report.stats.removed), (1, 1));
    let kept: Vec<(i64, f64)> = regions(&store, "sites", "chr1")
        .into_iter()
        .map(|r| (r.0, r.3))
        .collect();
    assert_eq!(kept, vec![(12, 7.0), (40, 1.0)]);
}

#[test]
fn test_prune_only_inside_range() {
    let mut store = motif_store();
    // Genomic 301 is relative 300: only the palindrome pair is in range
    let request = PruneRequest::new("sites", EquivalencePolicy::Palindromes, KeepPolicy::TopScore)
        .within(WindowCondition::parse("chr1:290-320"))
        .into_target("pruned");
    let report = request
        .run(&engine(2), &mut store, &CancellationToken::new())
        .unwrap()
        .completed()
        .unwrap();
    assert_eq!(report.stats.removed, 1);
    let scores: Vec<f64> = regions(&store, "pruned", "chr1")
        .into_iter()
        .filter(|r| r.0 == 300)
        .map(|r| r.3)
        .collect();
    assert_eq!(scores, vec![4.0]);
}

#[test]
fn test_filter_by_score_and_range() {
    let engine = engine(2);
    let mut store = motif_store();
    let cancel = CancellationToken::new();

    let weak = PositionCondition::compare(
        Operand::RegionProperty("score".into()),
        NumericComparison::Lt,
        Operand::Constant(3.0),
    );
    let report = FilterRequest::new("sites", weak)
        .into_target("strong")
        .run(&engine, &mut store, &cancel)
        .unwrap()
        .completed()
        .unwrap();
    assert_eq!((report.removed, report.remaining), (2, 3));
    let scores: Vec<f64> = regions(&store, "strong", "chr1")
        .into_iter()
        .map(|r| r.3)
        .collect();
    assert_eq!(scores, vec![6.0, 3.0, 4.0]);

    let report = FilterRequest::within("sites", WindowCondition::parse("chr1:1-200"))
        .run(&engine, &mut store, &cancel)
        .unwrap()
        .completed()
        .unwrap();
    assert_eq!((report.removed, report.remaining), (3, 2));

    let err = FilterRequest {
        condition: None,
        window: None,
        ..FilterRequest::within("sites", WindowCondition::default())
    }
    .run(&engine, &mut store, &cancel)
    .unwrap_err();
    assert!(matches!(err, EngineError::Config { .. }));
}
