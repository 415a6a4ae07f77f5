/// Dispatch and transform engine
///
/// A transform is a pure binary function (`Transform`). The engine routes the
/// source object to the iteration strategy for its shape, applies the function
/// to every admitted element and counts the elements it had to skip.
///
/// The source object is copied into a target under construction. Operands and
/// conditions are resolved against the unchanged store, so they never observe
/// partial results, and the target is written back only when every sequence
/// task completed. An aborted operation leaves the store as it was.
use log::{debug, info, warn};
use std::sync::Arc;

use crate::cancel::CancellationToken;
use crate::collection::Collection;
use crate::condition::{Gate, PositionCondition, WindowCondition};
use crate::config::EngineConfig;
use crate::display::DisplayHook;
use crate::error::{EngineError, EngineResult, OpError};
use crate::keyed_map::{KeyedMap, MemberKind};
use crate::motif::PropertyBearer;
use crate::operand::{Operand, OperandContext, ResolvedOperand};
use crate::profile::MatrixProfile;
use crate::progress::{LogProgress, NullProgress, ProgressSink};
use crate::region::{RegionId, RegionList};
use crate::scheduler::SequenceScheduler;
use crate::store::{DataObject, DataStore};
use crate::track::{SequenceInfo, SequenceSlot, SequenceUniverse, Track, TrackKind};
use crate::value::Value;

/// A pure element-wise operation
pub trait Transform: Sync {
    fn name(&self) -> &str;

    fn combine_numeric(&self, old: f64, operand: f64) -> Result<f64, OpError>;

    /// Generic combine for keyed values and properties. Numbers (and
    /// booleans) go through `combine_numeric`; anything else is a mismatch.
    fn combine_value(&self, old: Value, operand: Value) -> Result<Value, OpError> {
        match (old.as_number(), operand.as_number()) {
            (Some(a), Some(b)) => self.combine_numeric(a, b).map(Value::Number),
            _ => Err(OpError::TypeMismatch {
                left: old.type_name().to_string(),
                right: operand.type_name().to_string(),
            }),
        }
    }

    /// False for transforms that ignore the old value. A missing property
    /// is then created from the operand instead of being skipped.
    fn requires_existing(&self) -> bool {
        true
    }
}

/// Parameters of one transform invocation, already typed by the caller
#[derive(Debug, Clone, PartialEq)]
pub struct TransformRequest {
    pub source: String,
    /// Defaults to the source (transform in place)
    pub target: Option<String>,
    pub operand: Operand,
    /// Property edited on regions and domain objects. Regions default to
    /// "score"; motifs, modules and collections require one.
    pub property: Option<String>,
    pub condition: Option<PositionCondition>,
    pub window: Option<WindowCondition>,
    /// Collection limiting map keys, profile rows or track sequences
    pub restrict_to: Option<String>,
    /// Protocol line, attached to configuration errors
    pub line: Option<usize>,
}

impl TransformRequest {
    pub fn new(source: impl Into<String>, operand: Operand) -> Self {
        TransformRequest {
            source: source.into(),
            target: None,
            operand,
            property: None,
            condition: None,
            window: None,
            restrict_to: None,
            line: None,
        }
    }

    pub fn into_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn on_property(mut self, property: impl Into<String>) -> Self {
        self.property = Some(property.into());
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

    pub fn restricted_to(mut self, collection: impl Into<String>) -> Self {
        self.restrict_to = Some(collection.into());
        self
    }

    pub fn at_line(mut self, line: usize) -> Self {
        self.line = Some(line);
        self
    }

    pub fn target_name(&self) -> &str {
        self.target.as_deref().unwrap_or(&self.source)
    }

    fn has_filters(&self) -> bool {
        self.condition.is_some() || self.window.is_some()
    }
}

/// Transformed and skipped element counts, keeping the first skip message
#[derive(Debug, Default, Clone, PartialEq)]
pub struct SkipTally {
    pub transformed: usize,
    pub skipped: usize,
    pub first_skip: Option<String>,
}

impl SkipTally {
    /// Count one element and pass its value through when it succeeded
    pub fn record<T>(&mut self, result: Result<T, OpError>) -> Option<T> {
        match result {
            Ok(value) => {
                self.transformed += 1;
                Some(value)
            }
            Err(err) => {
                self.skipped += 1;
                if self.first_skip.is_none() {
                    self.first_skip = Some(err.to_string());
                }
                None
            }
        }
    }

    /// Fold in the tally of a later sequence; the earlier message wins
    pub fn merge(&mut self, other: SkipTally) {
        self.transformed += other.transformed;
        self.skipped += other.skipped;
        if self.first_skip.is_none() {
            self.first_skip = other.first_skip;
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OperationReport {
    pub operation: String,
    pub target: String,
    pub transformed: usize,
    pub skipped: usize,
    pub first_skip: Option<String>,
}

impl OperationReport {
    fn new(operation: &str, target: &str, tally: SkipTally) -> Self {
        OperationReport {
            operation: operation.to_string(),
            target: target.to_string(),
            transformed: tally.transformed,
            skipped: tally.skipped,
            first_skip: tally.first_skip,
        }
    }

    /// The single aggregated warning for skipped elements, if any
    pub fn warning(&self) -> Option<String> {
        if self.skipped == 0 {
            return None;
        }
        Some(format!(
            "{} '{}': skipped {} element(s), first error: {}",
            self.operation,
            self.target,
            self.skipped,
            self.first_skip.as_deref().unwrap_or("unknown")
        ))
    }
}

/// Result of a top-level invocation. Cancellation is not an error.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<R = OperationReport> {
    Completed(R),
    Aborted,
}

impl<R> Outcome<R> {
    pub fn is_aborted(&self) -> bool {
        matches!(self, Outcome::Aborted)
    }

    pub fn completed(self) -> Option<R> {
        match self {
            Outcome::Completed(report) => Some(report),
            Outcome::Aborted => None,
        }
    }

    /// Turn a cancelled run into `Aborted`, keep real failures as errors
    pub fn from_result(result: EngineResult<R>) -> EngineResult<Self> {
        match result {
            Ok(report) => Ok(Outcome::Completed(report)),
            Err(EngineError::Cancelled) => Ok(Outcome::Aborted),
            Err(err) => Err(err),
        }
    }
}

/// Everything a sequence task reads, resolved once before scheduling
pub struct OperationContext<'a> {
    pub universe: &'a SequenceUniverse,
    pub gate: Gate<'a>,
    pub operand: ResolvedOperand<'a>,
    pub transform: &'a dyn Transform,
    pub property: &'a str,
    /// Only these sequences are visited when set
    pub sequences: Option<&'a Collection>,
    pub position_checkpoint: usize,
    pub region_checkpoint: usize,
}

impl OperationContext<'_> {
    pub fn sequence(&self, name: &str) -> EngineResult<&SequenceInfo> {
        task_sequence(self.universe, name)
    }

    pub fn visits(&self, sequence: &str) -> bool {
        self.sequences.map_or(true, |c| c.contains(sequence))
    }
}

/// Sequence of a per-sequence task; tracks are built over the universe, so a
/// miss means the slot map was corrupted
pub fn task_sequence<'a>(universe: &'a SequenceUniverse, name: &str) -> EngineResult<&'a SequenceInfo> {
    universe.get(name).ok_or_else(|| EngineError::TaskFailed {
        sequence: name.to_string(),
        message: "sequence is not part of the sequence universe".to_string(),
    })
}

/// Region list of a per-sequence task
pub fn region_slot<'s>(name: &str, slot: &'s mut SequenceSlot) -> EngineResult<&'s mut RegionList> {
    match slot {
        SequenceSlot::Regions(list) => Ok(list),
        _ => Err(EngineError::TaskFailed {
            sequence: name.to_string(),
            message: "slot does not hold regions".to_string(),
        }),
    }
}

pub struct Engine {
    config: EngineConfig,
    scheduler: SequenceScheduler,
    display: Option<Arc<dyn DisplayHook>>,
}

impl Engine {
    pub fn new(config: EngineConfig) -> EngineResult<Self> {
        let progress: Arc<dyn ProgressSink> = if config.report_progress {
            Arc::new(LogProgress)
        } else {
            Arc::new(NullProgress)
        };
        Self::with_progress(config, progress)
    }

    pub fn with_progress(config: EngineConfig, progress: Arc<dyn ProgressSink>) -> EngineResult<Self> {
        let scheduler = SequenceScheduler::new(config.threads, progress)?;
        Ok(Engine {
            config,
            scheduler,
            display: None,
        })
    }

    pub fn with_display_hook(mut self, hook: Arc<dyn DisplayHook>) -> Self {
        self.display = Some(hook);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn scheduler(&self) -> &SequenceScheduler {
        &self.scheduler
    }

    /// Apply `transform` as described by `request`
    pub fn transform(
        &self,
        store: &mut DataStore,
        request: &TransformRequest,
        transform: &dyn Transform,
        cancel: &CancellationToken,
    ) -> EngineResult<Outcome> {
        let result = self.dispatch(store, request, transform, cancel);
        let outcome = Outcome::from_result(result).map_err(|err| match request.line {
            Some(line) => err.at_line(line),
            None => err,
        })?;
        match &outcome {
            Outcome::Completed(report) => {
                if let Some(warning) = report.warning() {
                    warn!("{warning}");
                }
                info!(
                    "[ENGINE] {} '{}' -> '{}': {} element(s) transformed",
                    transform.name(),
                    request.source,
                    report.target,
                    report.transformed
                );
            }
            Outcome::Aborted => info!(
                "[ENGINE] {} '{}' aborted",
                transform.name(),
                request.source
            ),
        }
        Ok(outcome)
    }

    fn dispatch(
        &self,
        store: &mut DataStore,
        request: &TransformRequest,
        transform: &dyn Transform,
        cancel: &CancellationToken,
    ) -> EngineResult<OperationReport> {
        cancel.checkpoint()?;
        let source = store.require(&request.source)?.clone();
        let target = request.target_name().to_string();
        debug!(
            "[ENGINE] {} '{}' ({}) by {}",
            transform.name(),
            request.source,
            source.type_name(),
            request.operand
        );

        let tally = match source {
            DataObject::Variable(old) => {
                reject_shape_filters(request, "numeric variable")?;
                let (value, tally) = transform_variable(store, request, transform, old)?;
                store.insert(target.clone(), DataObject::Variable(value));
                tally
            }
            DataObject::Map(mut map) => {
                if request.has_filters() {
                    return Err(EngineError::config(
                        "maps cannot be filtered by position or range conditions",
                    ));
                }
                let tally = transform_map(store, request, transform, &mut map)?;
                map.name = target.clone();
                store.insert(target.clone(), DataObject::Map(map));
                tally
            }
            DataObject::Track(mut track) => {
                let tally = match track.kind() {
                    TrackKind::Numeric => {
                        self.transform_positions(store, request, transform, &mut track, cancel)?
                    }
                    TrackKind::Regions => {
                        self.transform_regions(store, request, transform, &mut track, cancel)?
                    }
                    TrackKind::Dna => {
                        return Err(EngineError::config(format!(
                            "{} '{}' cannot be transformed",
                            track.kind().label(),
                            request.source
                        )))
                    }
                };
                self.commit_track(store, &request.source, request.target.as_deref(), track);
                tally
            }
            DataObject::Motif(mut motif) => {
                reject_shape_filters(request, "motif")?;
                reject_copy(request, "motif")?;
                let tally = transform_object(store, request, transform, &mut motif)?;
                store.insert(request.source.clone(), DataObject::Motif(motif));
                tally
            }
            DataObject::Module(mut module) => {
                reject_shape_filters(request, "module")?;
                reject_copy(request, "module")?;
                let tally = transform_object(store, request, transform, &mut module)?;
                store.insert(request.source.clone(), DataObject::Module(module));
                tally
            }
            DataObject::Collection(collection) => {
                reject_shape_filters(request, "collection")?;
                reject_copy(request, "collection")?;
                let (updates, tally) = transform_members(store, request, transform, &collection)?;
                for (name, object) in updates {
                    store.insert(name, object);
                }
                tally
            }
            DataObject::Profile(mut profile) => {
                if request.has_filters() {
                    return Err(EngineError::config(
                        "expression profiles cannot be filtered by position or range conditions",
                    ));
                }
                let tally = transform_profile(store, request, transform, &mut profile)?;
                profile.name = target.clone();
                store.insert(target.clone(), DataObject::Profile(profile));
                tally
            }
            DataObject::Partition(_) => {
                return Err(EngineError::config(format!(
                    "partition '{}' cannot be transformed",
                    request.source
                )))
            }
        };
        Ok(OperationReport::new(transform.name(), &target, tally))
    }

    fn context<'a>(
        &self,
        store: &'a DataStore,
        request: &'a TransformRequest,
        transform: &'a dyn Transform,
        context: OperandContext,
    ) -> EngineResult<OperationContext<'a>> {
        let gate = Gate::resolve(store, request.condition.as_ref(), request.window.as_ref())?;
        let operand = request.operand.resolve_for(store, context)?;
        let sequences = request
            .restrict_to
            .as_deref()
            .map(|name| restriction(store, name, MemberKind::Sequence))
            .transpose()?;
        Ok(OperationContext {
            universe: store.universe(),
            gate,
            operand,
            transform,
            property: request.property.as_deref().unwrap_or("score"),
            sequences,
            position_checkpoint: self.config.position_checkpoint,
            region_checkpoint: self.config.region_checkpoint,
        })
    }

    fn transform_positions(
        &self,
        store: &DataStore,
        request: &TransformRequest,
        transform: &dyn Transform,
        track: &mut Track,
        cancel: &CancellationToken,
    ) -> EngineResult<SkipTally> {
        if request.property.is_some() {
            return Err(EngineError::config(format!(
                "numeric track '{}' has no properties",
                request.source
            )));
        }
        let ctx = self.context(store, request, transform, OperandContext::Position)?;
        let label = format!("{} {}", transform.name(), request.source);
        let tallies = self
            .scheduler
            .run(&label, track.slots_mut(), cancel, |name, slot, token| {
                if !ctx.visits(name) {
                    return Ok(SkipTally::default());
                }
                let SequenceSlot::Numeric(values) = slot else {
                    return Err(EngineError::TaskFailed {
                        sequence: name.to_string(),
                        message: "slot does not hold numeric data".to_string(),
                    });
                };
                transform_position_slot(&ctx, ctx.sequence(name)?, values, token)
            })?;
        Ok(merge_tallies(tallies))
    }

    fn transform_regions(
        &self,
        store: &DataStore,
        request: &TransformRequest,
        transform: &dyn Transform,
        track: &mut Track,
        cancel: &CancellationToken,
    ) -> EngineResult<SkipTally> {
        let ctx = self.context(store, request, transform, OperandContext::Region)?;
        let label = format!("{} {}", transform.name(), request.source);
        let tallies = self
            .scheduler
            .run(&label, track.slots_mut(), cancel, |name, slot, token| {
                if !ctx.visits(name) {
                    return Ok(SkipTally::default());
                }
                transform_region_slot(&ctx, ctx.sequence(name)?, region_slot(name, slot)?, token)
            })?;
        Ok(merge_tallies(tallies))
    }

    /// Store a finished track under its target name. Recomputes the value
    /// range and notifies the display hook for derived tracks.
    pub fn commit_track(
        &self,
        store: &mut DataStore,
        source: &str,
        target: Option<&str>,
        mut track: Track,
    ) {
        let name = target.unwrap_or(source).to_string();
        let derived = name != source;
        if derived {
            track.name = name.clone();
            track.derived = true;
        }
        track.update_value_range();
        store.insert_track(track);
        if derived {
            if let (Some(hook), Ok(track)) = (&self.display, store.track(&name)) {
                hook.derived_track_created(source, track);
            }
        }
    }
}

fn merge_tallies(tallies: Vec<SkipTally>) -> SkipTally {
    let mut total = SkipTally::default();
    for tally in tallies {
        total.merge(tally);
    }
    total
}

fn reject_shape_filters(request: &TransformRequest, shape: &str) -> EngineResult<()> {
    if request.has_filters() || request.restrict_to.is_some() {
        return Err(EngineError::config(format!(
            "a {shape} cannot be restricted by conditions or collections"
        )));
    }
    Ok(())
}

fn reject_copy(request: &TransformRequest, shape: &str) -> EngineResult<()> {
    match &request.target {
        Some(target) if *target != request.source => Err(EngineError::config(format!(
            "a {shape} is transformed in place and cannot be stored as '{target}'"
        ))),
        _ => Ok(()),
    }
}

/// Restricting collection of the given member kind
fn restriction<'a>(store: &'a DataStore, name: &str, kind: MemberKind) -> EngineResult<&'a Collection> {
    let collection = store.collection(name)?;
    if collection.kind() != kind {
        return Err(EngineError::config(format!(
            "collection '{name}' holds {} names, expected {kind} names",
            collection.kind()
        )));
    }
    Ok(collection)
}

/// New property value from the old one (if any) and the operand value
fn update_property<T: PropertyBearer + ?Sized>(
    object: &mut T,
    property: &str,
    operand: Result<Value, OpError>,
    transform: &dyn Transform,
) -> Result<(), OpError> {
    let operand = operand?;
    let value = match object.property(property) {
        Ok(old) => transform.combine_value(old, operand)?,
        Err(OpError::MissingProperty(_)) if !transform.requires_existing() => operand,
        Err(err) => return Err(err),
    };
    object.set_property(property, value)
}

fn missing_operand(operand: &Operand, key: &str) -> OpError {
    OpError::MissingOperand(format!("{operand} for '{key}'"))
}

fn transform_variable(
    store: &DataStore,
    request: &TransformRequest,
    transform: &dyn Transform,
    old: f64,
) -> EngineResult<(f64, SkipTally)> {
    let operand = request.operand.resolve_for(store, OperandContext::Key)?;
    let mut tally = SkipTally::default();
    let result = operand
        .default_value()
        .ok_or_else(|| missing_operand(&request.operand, &request.source))
        .and_then(|x| transform.combine_value(Value::Number(old), x))
        .and_then(|v| {
            v.as_number().ok_or_else(|| OpError::TypeMismatch {
                left: "numeric variable".to_string(),
                right: v.type_name().to_string(),
            })
        });
    let value = tally.record(result).unwrap_or(old);
    Ok((value, tally))
}

fn transform_map(
    store: &DataStore,
    request: &TransformRequest,
    transform: &dyn Transform,
    map: &mut KeyedMap,
) -> EngineResult<SkipTally> {
    let operand = request.operand.resolve_for(store, OperandContext::Key)?;
    if let ResolvedOperand::Map(other) = &operand {
        if other.kind() != map.kind() {
            return Err(EngineError::config(format!(
                "map '{}' is keyed by {} names but '{}' by {} names",
                other.name,
                other.kind(),
                request.source,
                map.kind()
            )));
        }
    }
    let restricted = request
        .restrict_to
        .as_deref()
        .map(|name| restriction(store, name, map.kind()))
        .transpose()?;
    let keys: Vec<String> = match restricted {
        Some(collection) => collection.members().map(String::from).collect(),
        None => map.keys().map(String::from).collect(),
    };

    let mut tally = SkipTally::default();
    for key in keys {
        let old = map.get(&key).clone();
        let result = operand
            .value_for_key(&key)
            .ok_or_else(|| missing_operand(&request.operand, &key))
            .and_then(|x| transform.combine_value(old, x));
        if let Some(value) = tally.record(result) {
            map.set(key, value);
        }
    }
    if restricted.is_none() {
        let result = operand
            .default_value()
            .ok_or_else(|| missing_operand(&request.operand, "default"))
            .and_then(|x| transform.combine_value(map.default_value().clone(), x));
        if let Some(value) = tally.record(result) {
            map.set_default(value);
        }
    }
    Ok(tally)
}

fn required_property<'a>(request: &'a TransformRequest, shape: &str) -> EngineResult<&'a str> {
    request.property.as_deref().ok_or_else(|| {
        EngineError::config(format!(
            "a property name is required to transform {shape} '{}'",
            request.source
        ))
    })
}

fn transform_object<T: PropertyBearer>(
    store: &DataStore,
    request: &TransformRequest,
    transform: &dyn Transform,
    object: &mut T,
) -> EngineResult<SkipTally> {
    let property = required_property(request, "object")?;
    let operand = request.operand.resolve_for(store, OperandContext::Key)?;
    let mut tally = SkipTally::default();
    let value = operand
        .value_for_key(object.name())
        .ok_or_else(|| missing_operand(&request.operand, object.name()));
    tally.record(update_property(object, property, value, transform));
    Ok(tally)
}

/// Broadcast over every member; each member gets its own copy of the value
fn transform_members(
    store: &DataStore,
    request: &TransformRequest,
    transform: &dyn Transform,
    collection: &Collection,
) -> EngineResult<(Vec<(String, DataObject)>, SkipTally)> {
    let property = required_property(request, "collection")?;
    let operand = request.operand.resolve_for(store, OperandContext::Key)?;
    let mut tally = SkipTally::default();
    let mut updates = Vec::with_capacity(collection.len());
    for member in collection.members() {
        let value = operand
            .value_for_key(member)
            .ok_or_else(|| missing_operand(&request.operand, member));
        let updated = match store.require(member)? {
            DataObject::Motif(motif) => {
                let mut motif = motif.clone();
                tally.record(update_property(&mut motif, property, value, transform));
                DataObject::Motif(motif)
            }
            DataObject::Module(module) => {
                let mut module = module.clone();
                tally.record(update_property(&mut module, property, value, transform));
                DataObject::Module(module)
            }
            other => {
                return Err(EngineError::config(format!(
                    "member '{member}' of '{}' is a {} and has no editable properties",
                    collection.name,
                    other.type_name()
                )))
            }
        };
        updates.push((member.to_string(), updated));
    }
    Ok((updates, tally))
}

fn transform_profile(
    store: &DataStore,
    request: &TransformRequest,
    transform: &dyn Transform,
    profile: &mut MatrixProfile,
) -> EngineResult<SkipTally> {
    let operand = request.operand.resolve_for(store, OperandContext::Key)?;
    let rows = request
        .restrict_to
        .as_deref()
        .map(|name| restriction(store, name, MemberKind::Sequence))
        .transpose()?;
    let mut tally = SkipTally::default();
    for (row, _, cell) in profile.cells_mut() {
        let Some(old) = *cell else {
            continue;
        };
        if rows.is_some_and(|c| !c.contains(row)) {
            continue;
        }
        let result = operand
            .value_for_key(row)
            .and_then(|v| v.as_number())
            .ok_or_else(|| missing_operand(&request.operand, row))
            .and_then(|x| transform.combine_numeric(old, x));
        if let Some(value) = tally.record(result) {
            *cell = Some(value);
        }
    }
    Ok(tally)
}

/// Transform the admitted positions of one numeric slot
pub fn transform_position_slot(
    ctx: &OperationContext<'_>,
    sequence: &SequenceInfo,
    values: &mut [f64],
    cancel: &CancellationToken,
) -> EngineResult<SkipTally> {
    let mut tally = SkipTally::default();
    let mut checkpoint = cancel.every(ctx.position_checkpoint);
    for (i, value) in values.iter_mut().enumerate() {
        checkpoint.tick()?;
        let genomic = sequence.genomic(i as i64);
        if !ctx.gate.admits(sequence, genomic) {
            continue;
        }
        let result = ctx
            .operand
            .number_at(sequence, genomic)
            .ok_or_else(|| {
                OpError::MissingOperand(format!("at {}:{genomic}", sequence.name))
            })
            .and_then(|x| ctx.transform.combine_numeric(*value, x));
        if let Some(new) = tally.record(result) {
            *value = new;
        }
    }
    cancel.checkpoint()?;
    Ok(tally)
}

/// Transform one property of the admitted regions of one slot
pub fn transform_region_slot(
    ctx: &OperationContext<'_>,
    sequence: &SequenceInfo,
    list: &mut RegionList,
    cancel: &CancellationToken,
) -> EngineResult<SkipTally> {
    let mut tally = SkipTally::default();
    let mut checkpoint = cancel.every(ctx.region_checkpoint);
    let mut moved = false;
    let ids: Vec<RegionId> = list.ids().to_vec();
    for id in ids {
        checkpoint.tick()?;
        let region = list.get(id);
        if !ctx.gate.admits_region(sequence, region) {
            continue;
        }
        let operand = ctx.operand.value_for_region(sequence, region);
        let span = (region.start(), region.end());
        let region = list.get_mut(id);
        if tally
            .record(update_property(region, ctx.property, operand, ctx.transform))
            .is_some()
        {
            moved |= span != (region.start(), region.end());
        }
    }
    if moved {
        list.sort();
    }
    cancel.checkpoint()?;
    Ok(tally)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::NumericComparison;
    use crate::display::RecordingDisplayHook;
    use crate::motif::Motif;
    use crate::region::{Region, Strand};
    use pretty_assertions::assert_eq;

    struct Add;

    impl Transform for Add {
        fn name(&self) -> &str {
            "increase"
        }

        fn combine_numeric(&self, old: f64, operand: f64) -> Result<f64, OpError> {
            Ok(old + operand)
        }
    }

    struct Assign;

    impl Transform for Assign {
        fn name(&self) -> &str {
            "set"
        }

        fn combine_numeric(&self, _old: f64, operand: f64) -> Result<f64, OpError> {
            Ok(operand)
        }

        fn combine_value(&self, _old: Value, operand: Value) -> Result<Value, OpError> {
            Ok(operand)
        }

        fn requires_existing(&self) -> bool {
            false
        }
    }

    fn engine() -> Engine {
        Engine::new(EngineConfig::default().with_threads(2).quiet()).unwrap()
    }

    fn store() -> DataStore {
        let universe = SequenceUniverse::new(vec![
            SequenceInfo::new("chr1", 10, 3, Strand::Direct),
            SequenceInfo::new("chr2", 50, 2, Strand::Reverse),
        ]);
        let mut store = DataStore::new(universe.clone());
        let mut signal = Track::numeric("signal", &universe, 0.0);
        signal
            .set_slot("chr1", SequenceSlot::Numeric(vec![1.0, 2.0, 3.0]))
            .unwrap();
        store.insert_track(signal);

        let mut sites = Track::regions("sites", &universe);
        sites
            .set_slot(
                "chr1",
                SequenceSlot::Regions(RegionList::from_regions(vec![
                    Region::new(0, 1, "AP1", 1.0, Strand::Direct),
                    Region::new(2, 2, "SP1", 4.0, Strand::Reverse).with_property("note", "x"),
                ])),
            )
            .unwrap();
        store.insert_track(sites);
        store.insert(
            "offset",
            DataObject::Map(KeyedMap::new("offset", MemberKind::Sequence, 1.0).with("chr2", 100.0)),
        );
        store.insert("threshold", DataObject::Variable(2.0));
        store.insert_motif(Motif::from_consensus("AP1", "TGACTCA"));
        store
    }

    #[test]
    fn test_variable_and_map_operands() {
        let engine = engine();
        let mut store = store();
        let cancel = CancellationToken::new();
        let request = TransformRequest::new("threshold", Operand::Constant(0.5));
        engine.transform(&mut store, &request, &Add, &cancel).unwrap();
        assert_eq!(store.variable("threshold").unwrap(), 2.5);

        let request = TransformRequest::new("signal", Operand::Map("offset".into()));
        let report = engine
            .transform(&mut store, &request, &Add, &cancel)
            .unwrap()
            .completed()
            .unwrap();
        assert_eq!(report.transformed, 5);
        let track = store.track("signal").unwrap();
        assert_eq!(track.numeric_values("chr1").unwrap(), &[2.0, 3.0, 4.0]);
        assert_eq!(track.numeric_values("chr2").unwrap(), &[100.0, 100.0]);
        assert_eq!(track.value_range(), Some((2.0, 100.0)));
    }

    #[test]
    fn test_region_property_defaults_to_score() {
        let engine = engine();
        let mut store = store();
        let request = TransformRequest::new("sites", Operand::Variable("threshold".into()))
            .into_target("sites_up")
            .where_(PositionCondition::compare(
                Operand::RegionProperty("type".into()),
                NumericComparison::Eq,
                Operand::Text("SP1".into()),
            ));
        engine
            .transform(&mut store, &request, &Add, &CancellationToken::new())
            .unwrap();
        let scores = |name: &str| -> Vec<f64> {
            store
                .track(name)
                .unwrap()
                .region_list("chr1")
                .unwrap()
                .iter()
                .map(|(_, r)| r.score)
                .collect()
        };
        assert_eq!(scores("sites"), vec![1.0, 4.0]);
        assert_eq!(scores("sites_up"), vec![1.0, 6.0]);
        assert!(store.track("sites_up").unwrap().derived);
    }

    #[test]
    fn test_missing_property_set_creates_it_otherwise_skips() {
        let engine = engine();
        let mut store = store();
        let cancel = CancellationToken::new();

        let request = TransformRequest::new("sites", Operand::Constant(1.0)).on_property("weight");
        let report = engine
            .transform(&mut store, &request, &Add, &cancel)
            .unwrap()
            .completed()
            .unwrap();
        assert_eq!((report.transformed, report.skipped), (0, 2));
        assert_eq!(report.first_skip.as_deref(), Some("no property 'weight'"));

        let report = engine
            .transform(&mut store, &request, &Assign, &cancel)
            .unwrap()
            .completed()
            .unwrap();
        assert_eq!((report.transformed, report.skipped), (2, 0));
        let list = store.track("sites").unwrap().region_list("chr1").unwrap();
        assert!(list
            .iter()
            .all(|(_, r)| r.property("weight") == Ok(Value::Number(1.0))));
    }

    #[test]
    fn test_moving_regions_keeps_list_sorted() {
        let engine = engine();
        let mut store = store();
        let request = TransformRequest::new("sites", Operand::Constant(5.0))
            .on_property("end")
            .where_(PositionCondition::compare(
                Operand::RegionProperty("type".into()),
                NumericComparison::Eq,
                Operand::Text("AP1".into()),
            ));
        engine
            .transform(&mut store, &request, &Add, &CancellationToken::new())
            .unwrap();
        let request = TransformRequest::new("sites", Operand::Constant(3.0))
            .on_property("start")
            .where_(PositionCondition::compare(
                Operand::RegionProperty("type".into()),
                NumericComparison::Eq,
                Operand::Text("AP1".into()),
            ));
        engine
            .transform(&mut store, &request, &Add, &CancellationToken::new())
            .unwrap();
        let list = store.track("sites").unwrap().region_list("chr1").unwrap();
        let spans: Vec<(i64, i64, &str)> = list
            .iter()
            .map(|(_, r)| (r.start(), r.end(), r.kind.as_str()))
            .collect();
        assert_eq!(spans, vec![(2, 2, "SP1"), (3, 6, "AP1")]);
    }

    #[test]
    fn test_object_and_collection_properties() {
        let engine = engine();
        let mut store = store();
        store.insert_motif(Motif::from_consensus("SP1", "GGGCGG"));
        store.insert(
            "factors",
            DataObject::Collection(Collection::new("factors", MemberKind::Motif, ["AP1", "SP1"])),
        );
        let cancel = CancellationToken::new();
        let request = TransformRequest::new("factors", Operand::Text("bZIP".into()))
            .on_property("family");
        let report = engine
            .transform(&mut store, &request, &Assign, &cancel)
            .unwrap()
            .completed()
            .unwrap();
        assert_eq!(report.transformed, 2);
        for name in ["AP1", "SP1"] {
            assert_eq!(
                store.motif(name).unwrap().property("family"),
                Ok(Value::Text("bZIP".into()))
            );
        }

        let request = TransformRequest::new("AP1", Operand::Constant(1.0)).on_property("length");
        let report = engine
            .transform(&mut store, &request, &Add, &cancel)
            .unwrap()
            .completed()
            .unwrap();
        assert_eq!(report.skipped, 1);
        assert_eq!(
            report.warning().unwrap(),
            "increase 'AP1': skipped 1 element(s), first error: property 'length' is read-only"
        );

        let request = TransformRequest::new("AP1", Operand::Constant(1.0));
        assert!(engine.transform(&mut store, &request, &Add, &cancel).is_err());
    }

    #[test]
    fn test_profile_cells_without_value_are_skipped() {
        let engine = engine();
        let mut store = store();
        let mut profile = MatrixProfile::new(
            "expr",
            vec!["chr1".into(), "chr2".into()],
            vec!["heat".into(), "cold".into()],
        );
        profile.set("chr1", "heat", 2.0);
        profile.set("chr2", "cold", 3.0);
        store.insert("expr", DataObject::Profile(profile));
        let request = TransformRequest::new("expr", Operand::Map("offset".into()));
        let report = engine
            .transform(&mut store, &request, &Add, &CancellationToken::new())
            .unwrap()
            .completed()
            .unwrap();
        assert_eq!(report.transformed, 2);
        let DataObject::Profile(profile) = store.get("expr").unwrap() else {
            panic!("expected a profile");
        };
        assert_eq!(profile.get("chr1", "heat"), Some(3.0));
        assert_eq!(profile.get("chr2", "cold"), Some(103.0));
        assert_eq!(profile.get("chr1", "cold"), None);
        assert_eq!(profile.recorded(), 2);
    }

    #[test]
    fn test_configuration_errors_carry_line_numbers() {
        let engine = engine();
        let mut store = store();
        let cancel = CancellationToken::new();
        let request = TransformRequest::new("missing", Operand::Constant(1.0)).at_line(7);
        let err = engine.transform(&mut store, &request, &Add, &cancel).unwrap_err();
        assert_eq!(
            err.to_string(),
            "configuration error at line 7: unknown data object 'missing'"
        );

        store.insert_track(Track::dna("DNA", store.universe()));
        let request = TransformRequest::new("DNA", Operand::Constant(1.0));
        assert!(engine.transform(&mut store, &request, &Add, &cancel).is_err());

        let request = TransformRequest::new("signal", Operand::Text("a".into()));
        assert!(engine.transform(&mut store, &request, &Add, &cancel).is_err());
    }

    #[test]
    fn test_cancelled_operation_leaves_store_untouched() {
        let engine = engine();
        let mut store = store();
        let before = store.track("signal").unwrap().clone();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let request = TransformRequest::new("signal", Operand::Constant(1.0)).into_target("copy");
        let outcome = engine.transform(&mut store, &request, &Add, &cancel).unwrap();
        assert!(outcome.is_aborted());
        assert_eq!(store.track("signal").unwrap(), &before);
        assert!(!store.contains("copy"));
    }

    #[test]
    fn test_display_hook_sees_derived_tracks_only() {
        let hook = Arc::new(RecordingDisplayHook::new());
        let engine = engine().with_display_hook(hook.clone());
        let mut store = store();
        let cancel = CancellationToken::new();
        let request = TransformRequest::new("signal", Operand::Constant(1.0));
        engine.transform(&mut store, &request, &Add, &cancel).unwrap();
        let request = request.into_target("signal2");
        engine.transform(&mut store, &request, &Add, &cancel).unwrap();
        assert_eq!(
            hook.created(),
            vec![("signal".to_string(), "signal2".to_string())]
        );
    }

    #[test]
    fn test_skip_tally_merge_keeps_first_message() {
        let mut first = SkipTally::default();
        first.record::<()>(Ok(()));
        let mut second = SkipTally::default();
        second.record::<()>(Err(OpError::Math("a".into())));
        second.record::<()>(Err(OpError::Math("b".into())));
        let mut total = SkipTally::default();
        total.merge(first);
        total.merge(second);
        assert_eq!(total.transformed, 1);
        assert_eq!(total.skipped, 2);
        assert_eq!(total.first_skip.as_deref(), Some("math error: a"));
    }
}
