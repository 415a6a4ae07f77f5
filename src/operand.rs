/// Operands of transforms and conditions
///
/// `Operand` is the unresolved, name-based form handed over by the parameter
/// resolver. `resolve` binds names to live data once per operation and yields
/// a `ResolvedOperand` that evaluates without further lookups.
use std::fmt;
use std::str::FromStr;

use crate::error::{EngineError, EngineResult, OpError};
use crate::keyed_map::{KeyedMap, MemberKind};
use crate::region::Region;
use crate::store::DataStore;
use crate::track::{SequenceInfo, Track, TrackKind};
use crate::value::Value;

/// Statistic of a numeric track computed over a region's span
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowStatistic {
    Min,
    Max,
    Average,
    Median,
    Sum,
    /// Average over the motif core, weighted by column information content
    WeightedAverage,
    /// Sum over the motif core, weighted by column information content
    WeightedSum,
}

impl FromStr for WindowStatistic {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "min" | "minimum" => Ok(WindowStatistic::Min),
            "max" | "maximum" => Ok(WindowStatistic::Max),
            "avg" | "average" => Ok(WindowStatistic::Average),
            "median" => Ok(WindowStatistic::Median),
            "sum" => Ok(WindowStatistic::Sum),
            "weighted-average" | "weighted average" => Ok(WindowStatistic::WeightedAverage),
            "weighted-sum" | "weighted sum" => Ok(WindowStatistic::WeightedSum),
            other => Err(format!("unknown window statistic '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Constant(f64),
    Text(String),
    /// Numeric variable, read once at resolve time
    Variable(String),
    Map(String),
    Track(String),
    /// A collection contributes its cardinality
    Collection(String),
    /// The genomic coordinate being evaluated
    Position,
    /// Another property of the region being transformed or tested
    RegionProperty(String),
    WindowStat {
        track: String,
        statistic: WindowStatistic,
    },
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Constant(v) => write!(f, "{v}"),
            Operand::Text(s) => write!(f, "\"{s}\""),
            Operand::Variable(n)
            | Operand::Map(n)
            | Operand::Track(n)
            | Operand::Collection(n) => write!(f, "{n}"),
            Operand::Position => write!(f, "position"),
            Operand::RegionProperty(p) => write!(f, "region's {p}"),
            Operand::WindowStat { track, statistic } => write!(f, "{statistic:?} {track}"),
        }
    }
}

/// Where a resolved operand will be evaluated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandContext {
    /// One genomic position of a sequence
    Position,
    /// One region of a region track
    Region,
    /// One key of a map, object or profile row
    Key,
}

impl Operand {
    pub fn resolve<'a>(&self, store: &'a DataStore) -> EngineResult<ResolvedOperand<'a>> {
        Ok(match self {
            Operand::Constant(v) => ResolvedOperand::Constant(*v),
            Operand::Text(s) => ResolvedOperand::Text(s.clone()),
            Operand::Variable(name) => ResolvedOperand::Constant(store.variable(name)?),
            Operand::Map(name) => {
                let map = store.map(name)?;
                store.validate_map(map)?;
                ResolvedOperand::Map(map)
            }
            Operand::Track(name) => {
                let track = store.track(name)?;
                match track.kind() {
                    TrackKind::Numeric => ResolvedOperand::NumericTrack(track),
                    TrackKind::Dna => ResolvedOperand::DnaTrack(track),
                    TrackKind::Regions => ResolvedOperand::RegionTrack(track),
                }
            }
            Operand::Collection(name) => {
                ResolvedOperand::CollectionSize(store.collection(name)?.len())
            }
            Operand::Position => ResolvedOperand::Position,
            Operand::RegionProperty(p) => ResolvedOperand::RegionProperty(p.clone()),
            Operand::WindowStat { track, statistic } => ResolvedOperand::WindowStat {
                track: store.track_of_kind(track, TrackKind::Numeric)?,
                statistic: *statistic,
                store,
            },
        })
    }

    /// Resolve and check the operand can be evaluated in `context`
    pub fn resolve_for<'a>(
        &self,
        store: &'a DataStore,
        context: OperandContext,
    ) -> EngineResult<ResolvedOperand<'a>> {
        let resolved = self.resolve(store)?;
        if !resolved.supports(context) {
            return Err(EngineError::config(format!(
                "{} '{self}' cannot be used {}",
                resolved.kind_label(),
                match context {
                    OperandContext::Position => "at individual positions",
                    OperandContext::Region => "with regions",
                    OperandContext::Key => "with keyed values",
                }
            )));
        }
        Ok(resolved)
    }
}

#[derive(Debug, Clone)]
pub enum ResolvedOperand<'a> {
    Constant(f64),
    Text(String),
    Map(&'a KeyedMap),
    NumericTrack(&'a Track),
    DnaTrack(&'a Track),
    RegionTrack(&'a Track),
    CollectionSize(usize),
    Position,
    RegionProperty(String),
    WindowStat {
        track: &'a Track,
        statistic: WindowStatistic,
        store: &'a DataStore,
    },
}

impl ResolvedOperand<'_> {
    pub fn kind_label(&self) -> &'static str {
        match self {
            ResolvedOperand::Constant(_) => "constant",
            ResolvedOperand::Text(_) => "text",
            ResolvedOperand::Map(_) => "map",
            ResolvedOperand::NumericTrack(_) => "numeric track",
            ResolvedOperand::DnaTrack(_) => "DNA track",
            ResolvedOperand::RegionTrack(_) => "region track",
            ResolvedOperand::CollectionSize(_) => "collection",
            ResolvedOperand::Position => "position",
            ResolvedOperand::RegionProperty(_) => "region property",
            ResolvedOperand::WindowStat { .. } => "window statistic",
        }
    }

    pub fn supports(&self, context: OperandContext) -> bool {
        use OperandContext as C;
        match self {
            ResolvedOperand::Constant(_) | ResolvedOperand::CollectionSize(_) => true,
            ResolvedOperand::Text(_) => context != C::Position,
            ResolvedOperand::Map(m) => match context {
                C::Position => m.kind() == MemberKind::Sequence,
                C::Region | C::Key => true,
            },
            ResolvedOperand::NumericTrack(_) => context != C::Key,
            ResolvedOperand::Position => context != C::Key,
            ResolvedOperand::RegionProperty(_) | ResolvedOperand::WindowStat { .. } => {
                context == C::Region
            }
            ResolvedOperand::DnaTrack(_) | ResolvedOperand::RegionTrack(_) => false,
        }
    }

    /// Numeric value at a genomic position of `sequence`
    pub fn number_at(&self, sequence: &SequenceInfo, genomic: i64) -> Option<f64> {
        match self {
            ResolvedOperand::Constant(v) => Some(*v),
            ResolvedOperand::CollectionSize(n) => Some(*n as f64),
            ResolvedOperand::Map(m) => m.number(&sequence.name),
            ResolvedOperand::NumericTrack(t) => {
                t.value_at(&sequence.name, genomic - sequence.genomic_start)
            }
            ResolvedOperand::Position => Some(genomic as f64),
            _ => None,
        }
    }

    /// Value for a keyed element (map key, object name, profile row)
    pub fn value_for_key(&self, key: &str) -> Option<Value> {
        match self {
            ResolvedOperand::Constant(v) => Some(Value::Number(*v)),
            ResolvedOperand::CollectionSize(n) => Some(Value::Number(*n as f64)),
            ResolvedOperand::Text(s) => Some(Value::Text(s.clone())),
            ResolvedOperand::Map(m) => Some(m.get(key).clone()),
            _ => None,
        }
    }

    /// Value applied to a map's default entry
    pub fn default_value(&self) -> Option<Value> {
        match self {
            ResolvedOperand::Map(m) => Some(m.default_value().clone()),
            other => other.value_for_key(""),
        }
    }

    /// Value for one region of `sequence`
    pub fn value_for_region(&self, sequence: &SequenceInfo, region: &Region) -> Result<Value, OpError> {
        match self {
            ResolvedOperand::Constant(v) => Ok(Value::Number(*v)),
            ResolvedOperand::CollectionSize(n) => Ok(Value::Number(*n as f64)),
            ResolvedOperand::Text(s) => Ok(Value::Text(s.clone())),
            ResolvedOperand::Map(m) => Ok(m.get(&region.kind).clone()),
            ResolvedOperand::Position => {
                Ok(Value::Number(sequence.genomic(region.start()) as f64))
            }
            ResolvedOperand::RegionProperty(p) => region.property(p),
            ResolvedOperand::NumericTrack(t) => {
                window_statistic(t, None, sequence, region, WindowStatistic::Average)
                    .map(Value::Number)
            }
            ResolvedOperand::WindowStat {
                track,
                statistic,
                store,
            } => window_statistic(track, Some(store), sequence, region, *statistic)
                .map(Value::Number),
            ResolvedOperand::DnaTrack(t) | ResolvedOperand::RegionTrack(t) => {
                Err(OpError::TypeMismatch {
                    left: "region".to_string(),
                    right: format!("track '{}'", t.name),
                })
            }
        }
    }
}

/// Statistic of a numeric track over the span of `region`. Weighted variants
/// look the region's type up as a motif and only visit its core columns.
pub fn window_statistic(
    track: &Track,
    store: Option<&DataStore>,
    sequence: &SequenceInfo,
    region: &Region,
    statistic: WindowStatistic,
) -> Result<f64, OpError> {
    let values = track
        .numeric_values(&sequence.name)
        .ok_or_else(|| OpError::MissingOperand(format!("{} on {}", track.name, sequence.name)))?;
    let last = values.len() as i64 - 1;

    match statistic {
        WindowStatistic::WeightedAverage => weighted_core(values, store, region, false),
        WindowStatistic::WeightedSum => weighted_core(values, store, region, true),
        _ => {
            let (from, to) = (region.start().max(0), region.end().min(last));
            if from > to {
                return Err(OpError::MissingOperand(format!(
                    "{} outside {}",
                    track.name, sequence.name
                )));
            }
            let window = &values[from as usize..=to as usize];
            Ok(match statistic {
                WindowStatistic::Min => window.iter().copied().fold(f64::INFINITY, f64::min),
                WindowStatistic::Max => window.iter().copied().fold(f64::NEG_INFINITY, f64::max),
                WindowStatistic::Sum => window.iter().sum(),
                WindowStatistic::Median => {
                    let mut sorted = window.to_vec();
                    sorted.sort_by(|a, b| a.total_cmp(b));
                    let mid = sorted.len() / 2;
                    if sorted.len() % 2 == 0 {
                        (sorted[mid - 1] + sorted[mid]) / 2.0
                    } else {
                        sorted[mid]
                    }
                }
                _ => window.iter().sum::<f64>() / window.len() as f64,
            })
        }
    }
}

/// IC-weighted sum or average over the core columns of the region's motif
fn weighted_core(
    values: &[f64],
    store: Option<&DataStore>,
    region: &Region,
    sum: bool,
) -> Result<f64, OpError> {
    let last = values.len() as i64 - 1;
    let motif = store
        .and_then(|s| s.motif(&region.kind))
        .ok_or_else(|| OpError::Other(format!("'{}' is not a known motif", region.kind)))?;
    let (core_start, core_end) = motif.core_span(region.start(), region.end(), region.strand);
    let ic = motif.column_ic();
    let (mut weighted, mut weights) = (0.0, 0.0);
    for pos in core_start.max(0)..=core_end.min(last) {
        let Some(column) = motif.column_at(region.start(), region.end(), region.strand, pos) else {
            continue;
        };
        weighted += ic[column] * values[pos as usize];
        weights += ic[column];
    }
    if sum {
        Ok(weighted)
    } else if weights > 0.0 {
        Ok(weighted / weights)
    } else {
        Err(OpError::Math(format!(
            "motif '{}' has no information content in its core",
            region.kind
        )))
    }
}
