/// "where" and "within" conditions
///
/// A condition is built from names (`PositionCondition`, `WindowCondition`)
/// and resolved once per operation against the data store. Only the resolved
/// forms can be evaluated, so evaluating an unresolved condition does not
/// compile. Resolved conditions hold shared references only and are safe to
/// evaluate from every sequence task at once.
mod window;

pub use window::{ResolvedWindow, WindowCondition};

use std::str::FromStr;

use crate::error::{EngineError, EngineResult};
use crate::iupac;
use crate::operand::{Operand, OperandContext, ResolvedOperand};
use crate::region::{Region, Strand};
use crate::store::DataStore;
use crate::track::{SequenceInfo, Track};
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumericComparison {
    Eq,
    Ge,
    Gt,
    Lt,
    Le,
    Ne,
    /// Inclusive range test against two operands
    In,
}

impl FromStr for NumericComparison {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "=" | "==" => Ok(NumericComparison::Eq),
            ">=" => Ok(NumericComparison::Ge),
            ">" => Ok(NumericComparison::Gt),
            "<" => Ok(NumericComparison::Lt),
            "<=" => Ok(NumericComparison::Le),
            "<>" | "!=" => Ok(NumericComparison::Ne),
            "in" => Ok(NumericComparison::In),
            other => Err(format!("unknown comparison '{other}'")),
        }
    }
}

impl NumericComparison {
    fn test(self, x: f64, operands: &[f64]) -> bool {
        match (self, operands) {
            (NumericComparison::Eq, [y]) => x == *y,
            (NumericComparison::Ge, [y]) => x >= *y,
            (NumericComparison::Gt, [y]) => x > *y,
            (NumericComparison::Lt, [y]) => x < *y,
            (NumericComparison::Le, [y]) => x <= *y,
            (NumericComparison::Ne, [y]) => x != *y,
            (NumericComparison::In, [low, high]) => *low <= x && x <= *high,
            _ => false,
        }
    }

    fn arity(self) -> usize {
        if self == NumericComparison::In {
            2
        } else {
            1
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaseComparison {
    Equals,
    EqualsIgnoreCase,
    /// IUPAC ambiguity match
    Matches,
    IsUppercase,
    IsLowercase,
}

impl BaseComparison {
    fn arity(self) -> usize {
        match self {
            BaseComparison::IsUppercase | BaseComparison::IsLowercase => 0,
            _ => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlapComparison {
    BasesOverlap,
    BasesNotOverlap,
    RegionsOverlap,
    RegionsNotOverlap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparator {
    Numeric(NumericComparison),
    Base {
        comparison: BaseComparison,
        /// Complement the tested base on reverse-strand sequences
        relative_strand: bool,
    },
    Overlap(OverlapComparison),
    /// Position lies inside a region of the subject track
    Inside,
}

impl Comparator {
    fn arity(self) -> usize {
        match self {
            Comparator::Numeric(c) => c.arity(),
            Comparator::Base { comparison, .. } => comparison.arity(),
            Comparator::Overlap(_) => 1,
            Comparator::Inside => 0,
        }
    }
}

/// Unresolved "where" condition: `subject comparator operands...`
#[derive(Debug, Clone, PartialEq)]
pub struct PositionCondition {
    pub subject: Operand,
    pub comparator: Comparator,
    pub operands: Vec<Operand>,
    pub negate: bool,
}

impl PositionCondition {
    pub fn compare(subject: Operand, comparison: NumericComparison, operand: Operand) -> Self {
        PositionCondition {
            subject,
            comparator: Comparator::Numeric(comparison),
            operands: vec![operand],
            negate: false,
        }
    }

    pub fn between(subject: Operand, low: Operand, high: Operand) -> Self {
        PositionCondition {
            subject,
            comparator: Comparator::Numeric(NumericComparison::In),
            operands: vec![low, high],
            negate: false,
        }
    }

    pub fn base(
        dna_track: &str,
        comparison: BaseComparison,
        operand: Option<Operand>,
        relative_strand: bool,
    ) -> Self {
        PositionCondition {
            subject: Operand::Track(dna_track.to_string()),
            comparator: Comparator::Base {
                comparison,
                relative_strand,
            },
            operands: operand.into_iter().collect(),
            negate: false,
        }
    }

    pub fn overlap(region_track: &str, comparison: OverlapComparison, other: &str) -> Self {
        PositionCondition {
            subject: Operand::Track(region_track.to_string()),
            comparator: Comparator::Overlap(comparison),
            operands: vec![Operand::Track(other.to_string())],
            negate: false,
        }
    }

    pub fn inside(region_track: &str) -> Self {
        PositionCondition {
            subject: Operand::Track(region_track.to_string()),
            comparator: Comparator::Inside,
            operands: Vec::new(),
            negate: false,
        }
    }

    pub fn negated(mut self) -> Self {
        self.negate = !self.negate;
        self
    }

    /// Bind names to data and check that the operands can be compared
    pub fn resolve<'a>(&self, store: &'a DataStore) -> EngineResult<ResolvedCondition<'a>> {
        if self.operands.len() != self.comparator.arity() {
            return Err(EngineError::config(format!(
                "{:?} takes {} operand(s), got {}",
                self.comparator,
                self.comparator.arity(),
                self.operands.len()
            )));
        }
        let subject = self.subject.resolve(store)?;
        let operands = self
            .operands
            .iter()
            .map(|o| o.resolve(store))
            .collect::<EngineResult<Vec<_>>>()?;

        let test = match self.comparator {
            Comparator::Numeric(comparison) => {
                resolve_numeric(&self.subject, subject, comparison, operands)?
            }
            Comparator::Base {
                comparison,
                relative_strand,
            } => {
                let ResolvedOperand::DnaTrack(track) = subject else {
                    return Err(incompatible(&self.subject, &subject, "a DNA track"));
                };
                let operand = match operands.into_iter().next() {
                    None => None,
                    Some(ResolvedOperand::DnaTrack(t)) => Some(BaseOperand::Track(t)),
                    Some(ResolvedOperand::Text(s)) if s.len() == 1 => {
                        Some(BaseOperand::Letter(s.as_bytes()[0]))
                    }
                    Some(other) => {
                        return Err(EngineError::config(format!(
                            "cannot compare bases of '{}' with {} {}",
                            track.name,
                            other.kind_label(),
                            self.operands[0]
                        )))
                    }
                };
                Test::Base {
                    track,
                    comparison,
                    operand,
                    relative_strand,
                }
            }
            Comparator::Overlap(comparison) => {
                let ResolvedOperand::RegionTrack(track) = subject else {
                    return Err(incompatible(&self.subject, &subject, "a region track"));
                };
                let (name, other) = match (self.operands.first(), operands.into_iter().next()) {
                    (Some(name), Some(other)) => (name, other),
                    _ => return Err(EngineError::config("overlap tests need a second region track")),
                };
                let ResolvedOperand::RegionTrack(other) = other else {
                    return Err(incompatible(name, &other, "a region track"));
                };
                Test::Overlap {
                    track,
                    other,
                    comparison,
                }
            }
            Comparator::Inside => {
                let ResolvedOperand::RegionTrack(track) = subject else {
                    return Err(incompatible(&self.subject, &subject, "a region track"));
                };
                Test::Inside { track }
            }
        };
        Ok(ResolvedCondition {
            test,
            negate: self.negate,
        })
    }
}

fn incompatible(operand: &Operand, resolved: &ResolvedOperand, expected: &str) -> EngineError {
    EngineError::config(format!(
        "'{operand}' is a {}, expected {expected}",
        resolved.kind_label()
    ))
}

fn resolve_numeric<'a>(
    subject_name: &Operand,
    subject: ResolvedOperand<'a>,
    comparison: NumericComparison,
    operands: Vec<ResolvedOperand<'a>>,
) -> EngineResult<Test<'a>> {
    let property_subject = matches!(subject, ResolvedOperand::RegionProperty(_));
    if !property_subject && !subject.supports(OperandContext::Position) {
        return Err(incompatible(subject_name, &subject, "a numeric value"));
    }
    let equality = matches!(comparison, NumericComparison::Eq | NumericComparison::Ne);
    for operand in &operands {
        let ok = match operand {
            // Text only makes sense against a (possibly textual) region property
            ResolvedOperand::Text(_) => property_subject && equality,
            ResolvedOperand::RegionProperty(_) | ResolvedOperand::WindowStat { .. } => {
                property_subject
            }
            other => other.supports(OperandContext::Position),
        };
        if !ok {
            return Err(EngineError::config(format!(
                "cannot compare {} '{subject_name}' with {}",
                subject.kind_label(),
                operand.kind_label()
            )));
        }
    }
    Ok(Test::Compare {
        subject,
        comparison,
        operands,
    })
}

#[derive(Debug, Clone, Copy)]
enum BaseOperand<'a> {
    Letter(u8),
    Track(&'a Track),
}

#[derive(Debug, Clone)]
enum Test<'a> {
    Always,
    Compare {
        subject: ResolvedOperand<'a>,
        comparison: NumericComparison,
        operands: Vec<ResolvedOperand<'a>>,
    },
    Base {
        track: &'a Track,
        comparison: BaseComparison,
        operand: Option<BaseOperand<'a>>,
        relative_strand: bool,
    },
    Overlap {
        track: &'a Track,
        other: &'a Track,
        comparison: OverlapComparison,
    },
    Inside {
        track: &'a Track,
    },
}

/// A resolved "where" condition
#[derive(Debug, Clone)]
pub struct ResolvedCondition<'a> {
    test: Test<'a>,
    negate: bool,
}

impl ResolvedCondition<'_> {
    /// The no-op filter used when no condition is configured
    pub fn always() -> Self {
        ResolvedCondition {
            test: Test::Always,
            negate: false,
        }
    }

    /// Evaluate at one genomic position of `sequence`. Positions where an
    /// operand has no value never satisfy the condition, negated or not.
    pub fn evaluate(&self, sequence: &SequenceInfo, genomic: i64) -> bool {
        match self.test_position(sequence, genomic) {
            Some(result) => result != self.negate,
            None => false,
        }
    }

    fn test_position(&self, sequence: &SequenceInfo, genomic: i64) -> Option<bool> {
        let relative = genomic - sequence.genomic_start;
        match &self.test {
            Test::Always => Some(true),
            Test::Compare {
                subject,
                comparison,
                operands,
            } => {
                let x = subject.number_at(sequence, genomic)?;
                let ys = operands
                    .iter()
                    .map(|o| o.number_at(sequence, genomic))
                    .collect::<Option<Vec<f64>>>()?;
                Some(comparison.test(x, &ys))
            }
            Test::Base {
                track,
                comparison,
                operand,
                relative_strand,
            } => {
                let mut base = track.base_at(&sequence.name, relative)?;
                if *relative_strand && sequence.strand == Strand::Reverse {
                    base = iupac::complement(base);
                }
                let other = match operand {
                    Some(BaseOperand::Letter(b)) => Some(*b),
                    Some(BaseOperand::Track(t)) => Some(t.base_at(&sequence.name, relative)?),
                    None => None,
                };
                Some(match (comparison, other) {
                    (BaseComparison::Equals, Some(o)) => base == o,
                    (BaseComparison::EqualsIgnoreCase, Some(o)) => base.eq_ignore_ascii_case(&o),
                    (BaseComparison::Matches, Some(o)) => iupac::matches(base, o),
                    (BaseComparison::IsUppercase, _) => base.is_ascii_uppercase(),
                    (BaseComparison::IsLowercase, _) => base.is_ascii_lowercase(),
                    (_, None) => false,
                })
            }
            Test::Overlap {
                track,
                other,
                comparison,
            } => {
                let ours = track.region_list(&sequence.name)?;
                let theirs = other.region_list(&sequence.name)?;
                let covered = ours.covering(relative).next().is_some();
                let hit = match comparison {
                    OverlapComparison::BasesOverlap | OverlapComparison::BasesNotOverlap => {
                        theirs.covering(relative).next().is_some()
                    }
                    OverlapComparison::RegionsOverlap | OverlapComparison::RegionsNotOverlap => {
                        ours.covering(relative).any(|id| {
                            let r = ours.get(id);
                            theirs.overlapping(r.start(), r.end()).next().is_some()
                        })
                    }
                };
                Some(match comparison {
                    OverlapComparison::BasesOverlap | OverlapComparison::RegionsOverlap => {
                        covered && hit
                    }
                    OverlapComparison::BasesNotOverlap | OverlapComparison::RegionsNotOverlap => {
                        covered && !hit
                    }
                })
            }
            Test::Inside { track } => {
                let list = track.region_list(&sequence.name)?;
                Some(list.covering(relative).next().is_some())
            }
        }
    }

    /// Evaluate for a whole region.
    ///
    /// Property subjects compare the region's own property; overlap and
    /// inside tests check the region against the other track; every other
    /// condition must hold at each position the region covers.
    pub fn evaluate_region(&self, sequence: &SequenceInfo, region: &Region) -> bool {
        match self.test_region(sequence, region) {
            Some(result) => result != self.negate,
            None => false,
        }
    }

    fn test_region(&self, sequence: &SequenceInfo, region: &Region) -> Option<bool> {
        match &self.test {
            Test::Always => Some(true),
            Test::Compare {
                subject: ResolvedOperand::RegionProperty(name),
                comparison,
                operands,
            } => {
                let value = region.property(name).ok()?;
                let others = operands
                    .iter()
                    .map(|o| o.value_for_region(sequence, region).ok())
                    .collect::<Option<Vec<Value>>>()?;
                compare_values(&value, *comparison, &others)
            }
            Test::Overlap {
                other, comparison, ..
            } => {
                let theirs = other.region_list(&sequence.name)?;
                let hit = theirs
                    .overlapping(region.start(), region.end())
                    .next()
                    .is_some();
                Some(match comparison {
                    OverlapComparison::BasesOverlap | OverlapComparison::RegionsOverlap => hit,
                    OverlapComparison::BasesNotOverlap
                    | OverlapComparison::RegionsNotOverlap => !hit,
                })
            }
            Test::Inside { track } => {
                let list = track.region_list(&sequence.name)?;
                Some(
                    list.overlapping(region.start(), region.end())
                        .next()
                        .is_some(),
                )
            }
            Test::Compare { .. } | Test::Base { .. } => {
                for relative in region.start()..=region.end() {
                    if !self.test_position(sequence, sequence.genomic(relative))? {
                        return Some(false);
                    }
                }
                Some(true)
            }
        }
    }
}

fn compare_values(value: &Value, comparison: NumericComparison, others: &[Value]) -> Option<bool> {
    if let Some(x) = value.as_number() {
        let ys = others
            .iter()
            .map(Value::as_number)
            .collect::<Option<Vec<f64>>>()?;
        return Some(comparison.test(x, &ys));
    }
    let text = value.as_text()?;
    match (comparison, others) {
        (NumericComparison::Eq, [other]) => Some(other.as_text() == Some(text)),
        (NumericComparison::Ne, [other]) => Some(other.as_text() != Some(text)),
        _ => None,
    }
}

/// Combined "where" and "within" filter for one operation
#[derive(Debug, Clone)]
pub struct Gate<'a> {
    condition: ResolvedCondition<'a>,
    window: Option<ResolvedWindow>,
}

impl<'a> Gate<'a> {
    /// Resolve optional conditions; missing ones admit everything
    pub fn resolve(
        store: &'a DataStore,
        condition: Option<&PositionCondition>,
        window: Option<&WindowCondition>,
    ) -> EngineResult<Self> {
        let condition = match condition {
            Some(c) => c.resolve(store)?,
            None => ResolvedCondition::always(),
        };
        let window = window.map(|w| w.resolve(store.universe())).transpose()?;
        Ok(Gate { condition, window })
    }

    pub fn open() -> Self {
        Gate {
            condition: ResolvedCondition::always(),
            window: None,
        }
    }

    pub fn admits(&self, sequence: &SequenceInfo, genomic: i64) -> bool {
        self.window
            .as_ref()
            .map_or(true, |w| w.contains(&sequence.name, genomic))
            && self.condition.evaluate(sequence, genomic)
    }

    pub fn admits_region(&self, sequence: &SequenceInfo, region: &Region) -> bool {
        self.window.as_ref().map_or(true, |w| {
            w.overlaps(
                &sequence.name,
                sequence.genomic(region.start()),
                sequence.genomic(region.end()),
            )
        }) && self.condition.evaluate_region(sequence, region)
    }
}
