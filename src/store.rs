/// In-memory data store: name → data object lookup plus the sequence universe
use indexmap::IndexMap;
use std::collections::HashMap;

use crate::collection::{Collection, Partition};
use crate::error::{EngineError, EngineResult};
use crate::keyed_map::{KeyedMap, MemberKind};
use crate::motif::{Module, Motif};
use crate::profile::MatrixProfile;
use crate::track::{SequenceUniverse, Track, TrackKind};

/// Every kind of data object an operation can read or write
#[derive(Debug, Clone, PartialEq)]
pub enum DataObject {
    Variable(f64),
    Map(KeyedMap),
    Track(Track),
    Collection(Collection),
    Partition(Partition),
    Motif(Motif),
    Module(Module),
    Profile(MatrixProfile),
}

impl DataObject {
    pub fn type_name(&self) -> &'static str {
        match self {
            DataObject::Variable(_) => "numeric variable",
            DataObject::Map(_) => "map",
            DataObject::Track(t) => t.kind().label(),
            DataObject::Collection(_) => "collection",
            DataObject::Partition(_) => "partition",
            DataObject::Motif(_) => "motif",
            DataObject::Module(_) => "module",
            DataObject::Profile(_) => "expression profile",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct DataStore {
    universe: SequenceUniverse,
    objects: IndexMap<String, DataObject>,
}

impl DataStore {
    pub fn new(universe: SequenceUniverse) -> Self {
        DataStore {
            universe,
            objects: IndexMap::new(),
        }
    }

    pub fn universe(&self) -> &SequenceUniverse {
        &self.universe
    }

    /// Register (or replace) an object under `name`
    pub fn insert(&mut self, name: impl Into<String>, object: DataObject) {
        self.objects.insert(name.into(), object);
    }

    pub fn insert_track(&mut self, track: Track) {
        self.objects
            .insert(track.name.clone(), DataObject::Track(track));
    }

    pub fn insert_motif(&mut self, motif: Motif) {
        use crate::motif::PropertyBearer;
        self.objects
            .insert(motif.name().to_string(), DataObject::Motif(motif));
    }

    pub fn get(&self, name: &str) -> Option<&DataObject> {
        self.objects.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut DataObject> {
        self.objects.get_mut(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<DataObject> {
        self.objects.shift_remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.objects.contains_key(name)
    }

    /// Objects in registration order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &DataObject)> {
        self.objects.iter().map(|(name, object)| (name.as_str(), object))
    }

    /// Look up an object, failing with a configuration error when missing
    pub fn require(&self, name: &str) -> EngineResult<&DataObject> {
        self.objects
            .get(name)
            .ok_or_else(|| EngineError::config(format!("unknown data object '{name}'")))
    }

    fn wrong_type(name: &str, found: &DataObject, expected: &str) -> EngineError {
        EngineError::config(format!(
            "'{name}' is a {}, expected a {expected}",
            found.type_name()
        ))
    }

    pub fn track(&self, name: &str) -> EngineResult<&Track> {
        match self.require(name)? {
            DataObject::Track(t) => Ok(t),
            other => Err(Self::wrong_type(name, other, "track")),
        }
    }

    pub fn track_of_kind(&self, name: &str, kind: TrackKind) -> EngineResult<&Track> {
        let track = self.track(name)?;
        if track.kind() != kind {
            return Err(EngineError::config(format!(
                "'{name}' is a {}, expected a {}",
                track.kind().label(),
                kind.label()
            )));
        }
        Ok(track)
    }

    pub fn map(&self, name: &str) -> EngineResult<&KeyedMap> {
        match self.require(name)? {
            DataObject::Map(m) => Ok(m),
            other => Err(Self::wrong_type(name, other, "map")),
        }
    }

    pub fn collection(&self, name: &str) -> EngineResult<&Collection> {
        match self.require(name)? {
            DataObject::Collection(c) => Ok(c),
            other => Err(Self::wrong_type(name, other, "collection")),
        }
    }

    pub fn partition(&self, name: &str) -> EngineResult<&Partition> {
        match self.require(name)? {
            DataObject::Partition(p) => Ok(p),
            other => Err(Self::wrong_type(name, other, "partition")),
        }
    }

    pub fn variable(&self, name: &str) -> EngineResult<f64> {
        match self.require(name)? {
            DataObject::Variable(v) => Ok(*v),
            other => Err(Self::wrong_type(name, other, "numeric variable")),
        }
    }

    pub fn motif(&self, name: &str) -> Option<&Motif> {
        match self.objects.get(name) {
            Some(DataObject::Motif(m)) => Some(m),
            _ => None,
        }
    }

    pub fn motifs(&self) -> impl Iterator<Item = &Motif> {
        self.objects.values().filter_map(|o| match o {
            DataObject::Motif(m) => Some(m),
            _ => None,
        })
    }

    /// Every registered motif, by name
    pub fn motif_table(&self) -> HashMap<String, &Motif> {
        self.objects
            .iter()
            .filter_map(|(name, o)| match o {
                DataObject::Motif(m) => Some((name.clone(), m)),
                _ => None,
            })
            .collect()
    }

    /// Information content of every registered motif, by name
    pub fn motif_ic_table(&self) -> HashMap<String, f64> {
        self.objects
            .iter()
            .filter_map(|(name, o)| match o {
                DataObject::Motif(m) => Some((name.clone(), m.information_content())),
                _ => None,
            })
            .collect()
    }

    /// Is `name` a known object of the given member kind?
    pub fn is_member(&self, kind: MemberKind, name: &str) -> bool {
        match kind {
            MemberKind::Sequence => self.universe.contains(name),
            MemberKind::Motif => matches!(self.objects.get(name), Some(DataObject::Motif(_))),
            MemberKind::Module => matches!(self.objects.get(name), Some(DataObject::Module(_))),
        }
    }

    /// Every known name of a member kind
    pub fn members_of(&self, kind: MemberKind) -> Vec<String> {
        match kind {
            MemberKind::Sequence => self.universe.names().map(String::from).collect(),
            _ => self
                .objects
                .keys()
                .filter(|name| self.is_member(kind, name))
                .cloned()
                .collect(),
        }
    }

    /// Reject maps with keys that do not name an object of the map's kind
    pub fn validate_map(&self, map: &KeyedMap) -> EngineResult<()> {
        if let Some(bad) = map.keys().find(|k| !self.is_member(map.kind(), k)) {
            return Err(EngineError::config(format!(
                "map '{}' has key '{bad}' which is not a known {}",
                map.name,
                map.kind()
            )));
        }
        Ok(())
    }
}
