/// Annotated regions (intervals) and the per-sequence region list
///
/// Regions of one sequence live in an arena owned by a `RegionList`. Nested
/// annotations (a module's member motifs, for example) are stored in the same
/// arena and referenced by `RegionId`, never by owning pointers, so cloning a
/// list copies plain data and can never create shared or cyclic structure.
use indexmap::IndexMap;
use std::fmt;

use crate::error::OpError;
use crate::motif::PropertyBearer;
use crate::value::Value;

/// Orientation of a region or sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Strand {
    #[default]
    Direct,
    Reverse,
    Indeterminate,
}

impl Strand {
    pub fn opposite(self) -> Strand {
        match self {
            Strand::Direct => Strand::Reverse,
            Strand::Reverse => Strand::Direct,
            Strand::Indeterminate => Strand::Indeterminate,
        }
    }

    pub fn symbol(self) -> char {
        match self {
            Strand::Direct => '+',
            Strand::Reverse => '-',
            Strand::Indeterminate => '.',
        }
    }

    /// Parse '+', '-', '.', "direct", "reverse" and the numeric forms 1/-1/0
    pub fn parse(value: &Value) -> Option<Strand> {
        match value {
            Value::Number(n) if *n > 0.0 => Some(Strand::Direct),
            Value::Number(n) if *n < 0.0 => Some(Strand::Reverse),
            Value::Number(_) => Some(Strand::Indeterminate),
            Value::Text(s) => match s.to_ascii_lowercase().as_str() {
                "+" | "direct" | "forward" => Some(Strand::Direct),
                "-" | "reverse" => Some(Strand::Reverse),
                "." | "undetermined" | "indeterminate" => Some(Strand::Indeterminate),
                _ => None,
            },
            Value::Bool(_) => None,
        }
    }
}

impl fmt::Display for Strand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

/// Index of a region inside its list's arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegionId(u32);

impl RegionId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Value of a user-defined region property
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Number(f64),
    Text(String),
    Bool(bool),
    Nested(RegionId),
}

impl From<Value> for PropertyValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Number(n) => PropertyValue::Number(n),
            Value::Text(s) => PropertyValue::Text(s),
            Value::Bool(b) => PropertyValue::Bool(b),
        }
    }
}

/// An annotated interval of one sequence.
///
/// Coordinates are relative to the sequence start (0-based, inclusive at both
/// ends) and always satisfy `start <= end`.
#[derive(Debug, Clone, PartialEq)]
pub struct Region {
    start: i64,
    end: i64,
    pub kind: String,
    pub score: f64,
    pub strand: Strand,
    pub properties: IndexMap<String, PropertyValue>,
    parent: Option<RegionId>,
}

impl Region {
    /// Create a region; the bounds are swapped if given in reverse order
    pub fn new(start: i64, end: i64, kind: impl Into<String>, score: f64, strand: Strand) -> Self {
        Region {
            start: start.min(end),
            end: start.max(end),
            kind: kind.into(),
            score,
            strand,
            properties: IndexMap::new(),
            parent: None,
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties
            .insert(key.into(), PropertyValue::from(value.into()));
        self
    }

    pub fn start(&self) -> i64 {
        self.start
    }

    pub fn end(&self) -> i64 {
        self.end
    }

    pub fn length(&self) -> i64 {
        self.end - self.start + 1
    }

    pub fn parent(&self) -> Option<RegionId> {
        self.parent
    }

    pub fn set_span(&mut self, start: i64, end: i64) -> Result<(), OpError> {
        if start > end {
            return Err(OpError::Other(format!(
                "region start {start} would be after end {end}"
            )));
        }
        self.start = start;
        self.end = end;
        Ok(())
    }

    pub fn contains(&self, pos: i64) -> bool {
        self.start <= pos && pos <= self.end
    }

    pub fn overlaps(&self, start: i64, end: i64) -> bool {
        self.start <= end && start <= self.end
    }

    /// Read a built-in or user-defined property
    pub fn property(&self, name: &str) -> Result<Value, OpError> {
        match name {
            "start" => Ok(Value::Number(self.start as f64)),
            "end" => Ok(Value::Number(self.end as f64)),
            "length" => Ok(Value::Number(self.length() as f64)),
            "score" => Ok(Value::Number(self.score)),
            "type" => Ok(Value::Text(self.kind.clone())),
            "orientation" | "strand" => Ok(Value::Text(self.strand.symbol().to_string())),
            _ => match self.properties.get(name) {
                Some(PropertyValue::Number(n)) => Ok(Value::Number(*n)),
                Some(PropertyValue::Text(s)) => Ok(Value::Text(s.clone())),
                Some(PropertyValue::Bool(b)) => Ok(Value::Bool(*b)),
                Some(PropertyValue::Nested(_)) => Err(OpError::TypeMismatch {
                    left: format!("nested region '{name}'"),
                    right: "value".to_string(),
                }),
                None => Err(OpError::MissingProperty(name.to_string())),
            },
        }
    }

    /// Write a built-in or user-defined property
    pub fn set_property(&mut self, name: &str, value: Value) -> Result<(), OpError> {
        match name {
            "start" | "end" => {
                let n = value.as_number().ok_or_else(|| OpError::TypeMismatch {
                    left: name.to_string(),
                    right: value.type_name().to_string(),
                })?;
                let n = n.round() as i64;
                if name == "start" {
                    self.set_span(n, self.end)
                } else {
                    self.set_span(self.start, n)
                }
            }
            "length" => Err(OpError::ReadOnlyProperty(name.to_string())),
            "score" => {
                self.score = value.as_number().ok_or_else(|| OpError::TypeMismatch {
                    left: "score".to_string(),
                    right: value.type_name().to_string(),
                })?;
                Ok(())
            }
            "type" => {
                self.kind = value.to_string();
                Ok(())
            }
            "orientation" | "strand" => {
                self.strand = Strand::parse(&value).ok_or_else(|| {
                    OpError::Other(format!("'{value}' is not a valid orientation"))
                })?;
                Ok(())
            }
            _ => {
                if let Some(PropertyValue::Nested(_)) = self.properties.get(name) {
                    return Err(OpError::ReadOnlyProperty(name.to_string()));
                }
                self.properties.insert(name.to_string(), value.into());
                Ok(())
            }
        }
    }
}

impl PropertyBearer for Region {
    /// A region is named by its type
    fn name(&self) -> &str {
        &self.kind
    }

    fn property(&self, name: &str) -> Result<Value, OpError> {
        Region::property(self, name)
    }

    fn set_property(&mut self, name: &str, value: Value) -> Result<(), OpError> {
        Region::set_property(self, name, value)
    }
}

/// Regions of one sequence: an arena plus the ordered list of top-level ids.
///
/// Top-level regions are kept sorted by start (then end); insertion order is
/// preserved among regions with equal coordinates. Call `sort` after editing
/// coordinates through `get_mut`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegionList {
    arena: Vec<Region>,
    order: Vec<RegionId>,
    /// Length of the longest top-level region
    longest: i64,
}

impl RegionList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_regions(regions: impl IntoIterator<Item = Region>) -> Self {
        let mut list = RegionList::new();
        for region in regions {
            list.push(region);
        }
        list
    }

    fn alloc(&mut self, region: Region) -> RegionId {
        let id = RegionId(self.arena.len() as u32);
        self.arena.push(region);
        id
    }

    /// Add a top-level region at its sorted position
    pub fn push(&mut self, mut region: Region) -> RegionId {
        region.parent = None;
        let key = (region.start, region.end);
        let at = self.order.partition_point(|id| {
            let r = &self.arena[id.index()];
            (r.start, r.end) <= key
        });
        self.longest = self.longest.max(region.length());
        let id = self.alloc(region);
        self.order.insert(at, id);
        id
    }

    /// Attach a nested region to `parent` under property `key`
    pub fn add_nested(&mut self, parent: RegionId, key: &str, mut child: Region) -> RegionId {
        child.parent = Some(parent);
        let id = self.alloc(child);
        self.arena[parent.index()]
            .properties
            .insert(key.to_string(), PropertyValue::Nested(id));
        id
    }

    pub fn get(&self, id: RegionId) -> &Region {
        &self.arena[id.index()]
    }

    pub fn get_mut(&mut self, id: RegionId) -> &mut Region {
        &mut self.arena[id.index()]
    }

    /// Top-level ids in sorted order
    pub fn ids(&self) -> &[RegionId] {
        &self.order
    }

    pub fn iter(&self) -> impl Iterator<Item = (RegionId, &Region)> + '_ {
        self.order.iter().map(move |&id| (id, &self.arena[id.index()]))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Longest top-level region, 0 for an empty list
    pub fn max_length(&self) -> i64 {
        self.longest
    }

    fn refresh_longest(&mut self) {
        self.longest = self.iter().map(|(_, r)| r.length()).max().unwrap_or(0);
    }

    /// Restore start order after coordinates were edited in place
    pub fn sort(&mut self) {
        let arena = &self.arena;
        self.order.sort_by_key(|id| {
            let r = &arena[id.index()];
            (r.start, r.end)
        });
        self.refresh_longest();
    }

    /// Top-level regions overlapping `[start, end]` (relative coordinates)
    pub fn overlapping(&self, start: i64, end: i64) -> impl Iterator<Item = RegionId> + '_ {
        let max_len = self.max_length();
        let first = self
            .order
            .partition_point(|id| self.arena[id.index()].start + max_len <= start);
        self.order[first..]
            .iter()
            .take_while(move |id| self.arena[id.index()].start <= end)
            .copied()
            .filter(move |id| self.arena[id.index()].overlaps(start, end))
    }

    /// Top-level regions covering a relative position
    pub fn covering(&self, pos: i64) -> impl Iterator<Item = RegionId> + '_ {
        self.overlapping(pos, pos)
    }

    /// Keep the top-level regions for which `keep` returns true, then drop
    /// nested regions that are no longer reachable.
    pub fn retain<F>(&mut self, mut keep: F)
    where
        F: FnMut(RegionId, &Region) -> bool,
    {
        let arena = &self.arena;
        self.order.retain(|&id| keep(id, &arena[id.index()]));
        self.compact();
    }

    /// Rebuild the arena so it holds only regions reachable from the
    /// top-level list. Ids are reassigned.
    fn compact(&mut self) {
        let mut rebuilt = RegionList::new();
        let order = std::mem::take(&mut self.order);
        for id in order {
            let new_id = self.copy_into(id, &mut rebuilt, None);
            rebuilt.order.push(new_id);
        }
        rebuilt.refresh_longest();
        *self = rebuilt;
    }

    /// Deep-copy a region and its nested children into `target` as a new
    /// top-level region
    pub fn copy_region(&self, id: RegionId, target: &mut RegionList) -> RegionId {
        let new_id = self.copy_into(id, target, None);
        // Re-place the copy at its sorted position
        let region = target.arena[new_id.index()].clone();
        let key = (region.start, region.end);
        let at = target.order.partition_point(|other| {
            let r = &target.arena[other.index()];
            (r.start, r.end) <= key
        });
        target.order.insert(at, new_id);
        target.longest = target.longest.max(region.length());
        new_id
    }

    fn copy_into(&self, id: RegionId, target: &mut RegionList, parent: Option<RegionId>) -> RegionId {
        let mut region = self.arena[id.index()].clone();
        region.parent = parent;
        let nested: Vec<(String, RegionId)> = region
            .properties
            .iter()
            .filter_map(|(k, v)| match v {
                PropertyValue::Nested(child) => Some((k.clone(), *child)),
                _ => None,
            })
            .collect();
        let new_id = target.alloc(region);
        for (key, child) in nested {
            let child_id = self.copy_into(child, target, Some(new_id));
            target.arena[new_id.index()]
                .properties
                .insert(key, PropertyValue::Nested(child_id));
        }
        new_id
    }

    /// Deep value comparison of two regions of this list. When `with_score` is
    /// false the scores of the two top-level regions are ignored.
    pub fn same_value(&self, a: RegionId, b: RegionId, with_score: bool) -> bool {
        let ra = &self.arena[a.index()];
        let rb = &self.arena[b.index()];
        if ra.start != rb.start
            || ra.end != rb.end
            || ra.kind != rb.kind
            || ra.strand != rb.strand
            || (with_score && ra.score != rb.score)
            || ra.properties.len() != rb.properties.len()
        {
            return false;
        }
        ra.properties.iter().all(|(key, va)| match (va, rb.properties.get(key)) {
            (PropertyValue::Nested(ca), Some(PropertyValue::Nested(cb))) => {
                self.same_value(*ca, *cb, true)
            }
            (va, Some(vb)) => va == vb,
            (_, None) => false,
        })
    }

    /// Number of regions in the arena, nested ones included
    pub fn arena_len(&self) -> usize {
        self.arena.len()
    }
}
