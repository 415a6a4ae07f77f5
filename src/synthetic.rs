/// Seeded synthetic datasets
///
/// No file readers are provided, so the binary, the benchmarks and the
/// integration tests build their data here. The same seed always yields the
/// same store.
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::collection::{Collection, Partition};
use crate::error::EngineResult;
use crate::keyed_map::{KeyedMap, MemberKind};
use crate::motif::Motif;
use crate::region::{Region, RegionList, Strand};
use crate::store::{DataObject, DataStore};
use crate::track::{SequenceInfo, SequenceSlot, SequenceUniverse, Track};

/// Motif name, consensus and family
pub const MOTIFS: &[(&str, &str, &str)] = &[
    ("AP1", "TGACTCA", "bZIP"),
    ("AP1_long", "TTGACTCATT", "bZIP"),
    ("CREB", "TGACGTCA", "bZIP"),
    ("SP1", "GGGCGG", "zf"),
    ("NFKB", "GGGACTTTCC", "rel"),
    ("GATA", "WGATAR", "gata"),
];

#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticSpec {
    pub sequences: usize,
    pub length: usize,
    /// Expected motif sites per 1000 bp
    pub site_density: f64,
    /// Fraction of sites that get an exact copy with another score
    pub duplicate_rate: f64,
    pub seed: u64,
}

impl Default for SyntheticSpec {
    fn default() -> Self {
        SyntheticSpec {
            sequences: 8,
            length: 5_000,
            site_density: 20.0,
            duplicate_rate: 0.1,
            seed: 42,
        }
    }
}

/// Build a store with:
/// - `DNA`: random bases, about a tenth of them lowercase (masked)
/// - `conservation`: smoothed random values in [0, 1]
/// - `sites`: motif sites with random scores and strands
/// - the motifs of `MOTIFS`, the `tf_motifs` collection and the `families`
///   partition
/// - `gc_offset` (map by sequence) and `threshold` (variable)
pub fn generate(spec: &SyntheticSpec) -> EngineResult<DataStore> {
    let mut rng = StdRng::seed_from_u64(spec.seed);
    let universe = SequenceUniverse::new((0..spec.sequences).map(|i| {
        let strand = if i % 2 == 0 {
            Strand::Direct
        } else {
            Strand::Reverse
        };
        SequenceInfo::new(
            format!("seq{}", i + 1),
            (i * spec.length * 2) as i64 + 1,
            spec.length,
            strand,
        )
    }));

    let mut store = DataStore::new(universe.clone());
    for &(name, consensus, _) in MOTIFS {
        store.insert_motif(Motif::from_consensus(name, consensus));
    }
    store.insert(
        "tf_motifs",
        DataObject::Collection(Collection::new(
            "tf_motifs",
            MemberKind::Motif,
            MOTIFS.iter().map(|(name, _, _)| *name),
        )),
    );
    let mut families = Partition::new("families", MemberKind::Motif);
    for &(name, _, family) in MOTIFS {
        families.assign(name, family);
    }
    store.insert("families", DataObject::Partition(families));

    let mut dna = Track::dna("DNA", &universe);
    let mut conservation = Track::numeric("conservation", &universe, 0.0);
    let mut sites = Track::regions("sites", &universe);
    let mut offsets = KeyedMap::new("gc_offset", MemberKind::Sequence, 0.0);

    for sequence in universe.iter() {
        let name = &sequence.name;
        dna.set_slot(name, SequenceSlot::Dna(random_bases(&mut rng, spec.length)))?;
        conservation.set_slot(
            name,
            SequenceSlot::Numeric(random_signal(&mut rng, spec.length)),
        )?;
        sites.set_slot(name, SequenceSlot::Regions(random_sites(&mut rng, spec)))?;
        if rng.gen_bool(0.5) {
            offsets.set(name.as_str(), rng.gen_range(-0.2..0.2_f64));
        }
    }

    store.insert_track(dna);
    store.insert_track(conservation);
    store.insert_track(sites);
    store.insert("gc_offset", DataObject::Map(offsets));
    store.insert("threshold", DataObject::Variable(5.0));
    Ok(store)
}

fn random_bases(rng: &mut StdRng, length: usize) -> Vec<u8> {
    const BASES: &[u8] = b"ACGT";
    (0..length)
        .map(|_| {
            let base = BASES[rng.gen_range(0..4)];
            if rng.gen_bool(0.1) {
                base.to_ascii_lowercase()
            } else {
                base
            }
        })
        .collect()
}

/// Random walk clamped to [0, 1]
fn random_signal(rng: &mut StdRng, length: usize) -> Vec<f64> {
    let mut value: f64 = rng.gen_range(0.0..1.0);
    (0..length)
        .map(|_| {
            value = (value + rng.gen_range(-0.1..0.1)).clamp(0.0, 1.0);
            value
        })
        .collect()
}

fn random_sites(rng: &mut StdRng, spec: &SyntheticSpec) -> RegionList {
    let count = (spec.length as f64 * spec.site_density / 1000.0).round() as usize;
    let mut regions = Vec::with_capacity(count);
    for _ in 0..count {
        let Some(&(name, consensus, _)) = MOTIFS.choose(rng) else {
            break;
        };
        let width = consensus.len();
        if width > spec.length {
            continue;
        }
        let start = rng.gen_range(0..=spec.length - width) as i64;
        let strand = if rng.gen_bool(0.5) {
            Strand::Direct
        } else {
            Strand::Reverse
        };
        let score = (rng.gen_range(0.0..10.0_f64) * 100.0).round() / 100.0;
        let region = Region::new(start, start + width as i64 - 1, name, score, strand);
        if rng.gen_bool(spec.duplicate_rate) {
            let mut copy = region.clone();
            copy.score = (rng.gen_range(0.0..10.0_f64) * 100.0).round() / 100.0;
            regions.push(copy);
        }
        regions.push(region);
    }
    RegionList::from_regions(regions)
}
