#![allow(dead_code)]
/// Shared helpers for the integration tests
use trackops::keyed_map::{KeyedMap, MemberKind};
use trackops::region::{RegionList, Strand};
use trackops::store::{DataObject, DataStore};
use trackops::synthetic::{generate, SyntheticSpec};
use trackops::track::{SequenceInfo, SequenceSlot, SequenceUniverse, Track};
use trackops::{Engine, EngineConfig};

pub fn engine(threads: usize) -> Engine {
    Engine::new(EngineConfig::default().with_threads(threads).quiet()).unwrap()
}

/// Small synthetic dataset: 6 sequences of 600 bp
pub fn small_store(seed: u64) -> DataStore {
    generate(&SyntheticSpec {
        sequences: 6,
        length: 600,
        site_density: 40.0,
        duplicate_rate: 0.2,
        seed,
    })
    .unwrap()
}

/// One sequence starting at genomic position `start`
pub fn single_sequence_store(name: &str, start: i64, length: usize) -> DataStore {
    let universe = SequenceUniverse::new(vec![SequenceInfo::new(name, start, length, Strand::Direct)]);
    DataStore::new(universe)
}

pub fn add_numeric(store: &mut DataStore, name: &str, sequence: &str, values: Vec<f64>) {
    let mut track = Track::numeric(name, store.universe(), 0.0);
    track
        .set_slot(sequence, SequenceSlot::Numeric(values))
        .unwrap();
    store.insert_track(track);
}

pub fn add_regions(store: &mut DataStore, name: &str, sequence: &str, list: RegionList) {
    let mut track = Track::regions(name, store.universe());
    track.set_slot(sequence, SequenceSlot::Regions(list)).unwrap();
    store.insert_track(track);
}

pub fn add_map(store: &mut DataStore, map: KeyedMap) {
    store.insert(map.name.clone(), DataObject::Map(map));
}

pub fn sequence_map(name: &str, default: f64) -> KeyedMap {
    KeyedMap::new(name, MemberKind::Sequence, default)
}

pub fn numeric(store: &DataStore, track: &str, sequence: &str) -> Vec<f64> {
    store
        .track(track)
        .unwrap()
        .numeric_values(sequence)
        .unwrap()
        .to_vec()
}

/// (start, end, type, score) of the top-level regions of one slot
pub fn regions(store: &DataStore, track: &str, sequence: &str) -> Vec<(i64, i64, String, f64)> {
    store
        .track(track)
        .unwrap()
        .region_list(sequence)
        .unwrap()
        .iter()
        .map(|(_, r)| (r.start(), r.end(), r.kind.clone(), r.score))
        .collect()
}
