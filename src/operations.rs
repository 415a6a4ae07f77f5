/// Concrete operations built on the engine
///
/// `Arithmetic` and `MathFunction` are plain `Transform`s. Pruning and
/// filtering remove regions instead of editing values; they share the
/// scheduler, conditions and commit path with the transform engine.
use log::info;
use std::collections::HashSet;
use std::str::FromStr;

use crate::alignment::AlignmentCache;
use crate::cancel::CancellationToken;
use crate::cluster::{prune_regions, ClusterSettings, EquivalencePolicy, KeepPolicy, PruneStats};
use crate::condition::{Gate, PositionCondition, WindowCondition};
use crate::engine::{region_slot, task_sequence, Engine, Outcome, Transform};
use crate::error::{EngineError, EngineResult, OpError};
use crate::store::DataStore;
use crate::track::TrackKind;
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arithmetic {
    Increase,
    Decrease,
    Multiply,
    Divide,
    Set,
    Minimum,
    Maximum,
}

impl FromStr for Arithmetic {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "increase" | "add" => Ok(Arithmetic::Increase),
            "decrease" | "subtract" => Ok(Arithmetic::Decrease),
            "multiply" => Ok(Arithmetic::Multiply),
            "divide" => Ok(Arithmetic::Divide),
            "set" => Ok(Arithmetic::Set),
            "minimum" | "min" => Ok(Arithmetic::Minimum),
            "maximum" | "max" => Ok(Arithmetic::Maximum),
            other => Err(format!("unknown arithmetic operation '{other}'")),
        }
    }
}

fn finite(value: f64, what: &str) -> Result<f64, OpError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(OpError::Math(format!("{what} is not a finite number")))
    }
}

impl Transform for Arithmetic {
    fn name(&self) -> &str {
        match self {
            Arithmetic::Increase => "increase",
            Arithmetic::Decrease => "decrease",
            Arithmetic::Multiply => "multiply",
            Arithmetic::Divide => "divide",
            Arithmetic::Set => "set",
            Arithmetic::Minimum => "minimum",
            Arithmetic::Maximum => "maximum",
        }
    }

    fn combine_numeric(&self, old: f64, operand: f64) -> Result<f64, OpError> {
        let value = match self {
            Arithmetic::Increase => old + operand,
            Arithmetic::Decrease => old - operand,
            Arithmetic::Multiply => old * operand,
            Arithmetic::Divide if operand == 0.0 => {
                return Err(OpError::Math(format!("division of {old} by zero")))
            }
            Arithmetic::Divide => old / operand,
            Arithmetic::Set => operand,
            Arithmetic::Minimum => old.min(operand),
            Arithmetic::Maximum => old.max(operand),
        };
        finite(value, "result")
    }

    fn combine_value(&self, old: Value, operand: Value) -> Result<Value, OpError> {
        match (self, old, operand) {
            (Arithmetic::Set, _, operand) => Ok(operand),
            (Arithmetic::Increase, Value::Text(text), operand) => {
                Ok(Value::Text(format!("{text}{operand}")))
            }
            (_, old, operand) => match (old.as_number(), operand.as_number()) {
                (Some(a), Some(b)) => self.combine_numeric(a, b).map(Value::Number),
                _ => Err(OpError::TypeMismatch {
                    left: old.type_name().to_string(),
                    right: operand.type_name().to_string(),
                }),
            },
        }
    }

    fn requires_existing(&self) -> bool {
        *self != Arithmetic::Set
    }
}

/// Unary functions; the operand is ignored
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MathFunction {
    Abs,
    Negate,
    Ln,
    Log2,
    Log10,
    Sqrt,
    Round,
    Floor,
    Ceil,
}

impl FromStr for MathFunction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "abs" => Ok(MathFunction::Abs),
            "negate" => Ok(MathFunction::Negate),
            "ln" | "log" => Ok(MathFunction::Ln),
            "log2" => Ok(MathFunction::Log2),
            "log10" => Ok(MathFunction::Log10),
            "sqrt" => Ok(MathFunction::Sqrt),
            "round" => Ok(MathFunction::Round),
            "floor" => Ok(MathFunction::Floor),
            "ceil" | "ceiling" => Ok(MathFunction::Ceil),
            other => Err(format!("unknown function '{other}'")),
        }
    }
}

impl Transform for MathFunction {
    fn name(&self) -> &str {
        match self {
            MathFunction::Abs => "abs",
            MathFunction::Negate => "negate",
            MathFunction::Ln => "ln",
            MathFunction::Log2 => "log2",
            MathFunction::Log10 => "log10",
            MathFunction::Sqrt => "sqrt",
            MathFunction::Round => "round",
            MathFunction::Floor => "floor",
            MathFunction::Ceil => "ceil",
        }
    }

    fn combine_numeric(&self, old: f64, _operand: f64) -> Result<f64, OpError> {
        match self {
            MathFunction::Ln | MathFunction::Log2 | MathFunction::Log10 if old <= 0.0 => Err(
                OpError::Math(format!("{} of non-positive value {old}", self.name())),
            ),
            MathFunction::Sqrt if old < 0.0 => {
                Err(OpError::Math(format!("sqrt of negative value {old}")))
            }
            MathFunction::Abs => Ok(old.abs()),
            MathFunction::Negate => Ok(-old),
            MathFunction::Ln => Ok(old.ln()),
            MathFunction::Log2 => Ok(old.log2()),
            MathFunction::Log10 => Ok(old.log10()),
            MathFunction::Sqrt => Ok(old.sqrt()),
            MathFunction::Round => Ok(old.round()),
            MathFunction::Floor => Ok(old.floor()),
            MathFunction::Ceil => Ok(old.ceil()),
        }
    }
}

fn attach_line(err: EngineError, line: Option<usize>) -> EngineError {
    match line {
        Some(line) => err.at_line(line),
        None => err,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PruneReport {
    pub target: String,
    pub stats: PruneStats,
    /// Regions left in the target track
    pub remaining: usize,
}

/// Collapse clusters of equivalent regions of a region track
#[derive(Debug, Clone, PartialEq)]
pub struct PruneRequest {
    pub source: String,
    pub target: Option<String>,
    pub policy: EquivalencePolicy,
    pub keep: KeepPolicy,
    /// Motif partition, required by the alternatives policies
    pub partition: Option<String>,
    pub condition: Option<PositionCondition>,
    pub window: Option<WindowCondition>,
    pub line: Option<usize>,
}

impl PruneRequest {
    pub fn new(source: impl Into<String>, policy: EquivalencePolicy, keep: KeepPolicy) -> Self {
        PruneRequest {
            source: source.into(),
            target: None,
            policy,
            keep,
            partition: None,
            condition: None,
            window: None,
            line: None,
        }
    }

    pub fn into_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn with_partition(mut self, partition: impl Into<String>) -> Self {
        self.partition = Some(partition.into());
        self
    }

    pub fn where_(mut self, condition: PositionCondition) -> Self {
        self.condition = Some(condition);
        self
    }

    pub fn within(mut self, window: WindowCondition) -> Self {
        self.window = Some(window);
        self
    }

    pub fn run(
        &self,
        engine: &Engine,
        store: &mut DataStore,
        cancel: &CancellationToken,
    ) -> EngineResult<Outcome<PruneReport>> {
        let outcome = Outcome::from_result(self.execute(engine, store, cancel))
            .map_err(|err| attach_line(err, self.line))?;
        match &outcome {
            Outcome::Completed(report) => info!(
                "[PRUNE] '{}' -> '{}': {} cluster(s), {} region(s) removed, {} remaining",
                self.source,
                report.target,
                report.stats.clusters,
                report.stats.removed,
                report.remaining
            ),
            Outcome::Aborted => info!("[PRUNE] '{}' aborted", self.source),
        }
        Ok(outcome)
    }

    fn execute(
        &self,
        engine: &Engine,
        store: &mut DataStore,
        cancel: &CancellationToken,
    ) -> EngineResult<PruneReport> {
        cancel.checkpoint()?;
        let mut track = store
            .track_of_kind(&self.source, TrackKind::Regions)?
            .clone();

        let stats = {
            let gate = Gate::resolve(store, self.condition.as_ref(), self.window.as_ref())?;
            let alignments = if self.policy.needs_alignment() {
                let name = self.partition.as_deref().ok_or_else(|| {
                    EngineError::config(format!(
                        "pruning by {:?} requires a motif partition",
                        self.policy
                    ))
                })?;
                Some(AlignmentCache::build(store, store.partition(name)?)?)
            } else {
                None
            };
            let information = store.motif_ic_table();
            let motifs = store.motif_table();
            let settings = ClusterSettings {
                policy: self.policy,
                keep: self.keep,
                alignments: alignments.as_ref(),
                information: &information,
                motifs: &motifs,
                checkpoint_interval: engine.config().region_checkpoint,
            };
            let universe = store.universe();
            let label = format!("prune {}", self.source);
            let per_sequence = engine.scheduler().run(
                &label,
                track.slots_mut(),
                cancel,
                |name, slot, token| {
                    let sequence = task_sequence(universe, name)?;
                    prune_regions(region_slot(name, slot)?, sequence, &settings, &gate, token)
                },
            )?;
            let mut stats = PruneStats::default();
            for s in per_sequence {
                stats.merge(s);
            }
            stats
        };

        let remaining = track.region_count();
        let target = self.target.as_deref().unwrap_or(&self.source).to_string();
        engine.commit_track(store, &self.source, self.target.as_deref(), track);
        Ok(PruneReport {
            target,
            stats,
            remaining,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilterReport {
    pub target: String,
    pub removed: usize,
    pub remaining: usize,
}

/// Remove every region of a region track that passes the condition
#[derive(Debug, Clone, PartialEq)]
pub struct FilterRequest {
    pub source: String,
    pub target: Option<String>,
    pub condition: Option<PositionCondition>,
    pub window: Option<WindowCondition>,
    pub line: Option<usize>,
}

impl FilterRequest {
    pub fn new(source: impl Into<String>, condition: PositionCondition) -> Self {
        FilterRequest {
            source: source.into(),
            target: None,
            condition: Some(condition),
            window: None,
            line: None,
        }
    }

    pub fn within(source: impl Into<String>, window: WindowCondition) -> Self {
        FilterRequest {
            source: source.into(),
            target: None,
            condition: None,
            window: Some(window),
            line: None,
        }
    }

    pub fn into_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn run(
        &self,
        engine: &Engine,
        store: &mut DataStore,
        cancel: &CancellationToken,
    ) -> EngineResult<Outcome<FilterReport>> {
        let outcome = Outcome::from_result(self.execute(engine, store, cancel))
            .map_err(|err| attach_line(err, self.line))?;
        if let Outcome::Completed(report) = &outcome {
            info!(
                "[FILTER] '{}' -> '{}': {} region(s) removed, {} remaining",
                self.source, report.target, report.removed, report.remaining
            );
        }
        Ok(outcome)
    }

    fn execute(
        &self,
        engine: &Engine,
        store: &mut DataStore,
        cancel: &CancellationToken,
    ) -> EngineResult<FilterReport> {
        if self.condition.is_none() && self.window.is_none() {
            return Err(EngineError::config(format!(
                "filtering '{}' needs a condition or a range",
                self.source
            )));
        }
        cancel.checkpoint()?;
        let mut track = store
            .track_of_kind(&self.source, TrackKind::Regions)?
            .clone();

        let removed: usize = {
            let gate = Gate::resolve(store, self.condition.as_ref(), self.window.as_ref())?;
            let universe = store.universe();
            let interval = engine.config().region_checkpoint;
            let label = format!("filter {}", self.source);
            engine
                .scheduler()
                .run(&label, track.slots_mut(), cancel, |name, slot, token| {
                    let sequence = task_sequence(universe, name)?;
                    let list = region_slot(name, slot)?;
                    let mut checkpoint = token.every(interval);
                    let mut doomed = HashSet::new();
                    for (id, region) in list.iter() {
                        checkpoint.tick()?;
                        if gate.admits_region(sequence, region) {
                            doomed.insert(id);
                        }
                    }
                    token.checkpoint()?;
                    if !doomed.is_empty() {
                        list.retain(|id, _| !doomed.contains(&id));
                    }
                    Ok(doomed.len())
                })?
                .into_iter()
                .sum()
        };

        let remaining = track.region_count();
        let target = self.target.as_deref().unwrap_or(&self.source).to_string();
        engine.commit_track(store, &self.source, self.target.as_deref(), track);
        Ok(FilterReport {
            target,
            removed,
            remaining,
        })
    }
}
