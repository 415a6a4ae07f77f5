/// Motif and module domain objects
///
/// Only what the transform and clustering engines need is modelled here: a
/// normalized frequency matrix, per-column information content, the "core"
/// columns, and an open property map that transforms may edit.
use indexmap::IndexMap;

use crate::error::OpError;
use crate::region::Strand;
use crate::value::Value;

/// Columns whose information content reaches this many bits belong to the core
pub const CORE_IC_THRESHOLD: f64 = 1.0;

/// A domain object with named, editable properties
pub trait PropertyBearer {
    fn name(&self) -> &str;
    fn property(&self, name: &str) -> Result<Value, OpError>;
    fn set_property(&mut self, name: &str, value: Value) -> Result<(), OpError>;
}

fn iupac_counts(letter: char) -> [f64; 4] {
    match letter.to_ascii_uppercase() {
        'A' => [1.0, 0.0, 0.0, 0.0],
        'C' => [0.0, 1.0, 0.0, 0.0],
        'G' => [0.0, 0.0, 1.0, 0.0],
        'T' | 'U' => [0.0, 0.0, 0.0, 1.0],
        'M' => [1.0, 1.0, 0.0, 0.0],
        'R' => [1.0, 0.0, 1.0, 0.0],
        'W' => [1.0, 0.0, 0.0, 1.0],
        'S' => [0.0, 1.0, 1.0, 0.0],
        'Y' => [0.0, 1.0, 0.0, 1.0],
        'K' => [0.0, 0.0, 1.0, 1.0],
        'V' => [1.0, 1.0, 1.0, 0.0],
        'H' => [1.0, 1.0, 0.0, 1.0],
        'D' => [1.0, 0.0, 1.0, 1.0],
        'B' => [0.0, 1.0, 1.0, 1.0],
        _ => [1.0, 1.0, 1.0, 1.0],
    }
}

/// Information content (bits) of one normalized A/C/G/T column
pub fn column_information(column: &[f64; 4]) -> f64 {
    2.0 + column
        .iter()
        .filter(|&&p| p > 0.0)
        .map(|&p| p * p.log2())
        .sum::<f64>()
}

#[derive(Debug, Clone, PartialEq)]
pub struct Motif {
    name: String,
    matrix: Vec<[f64; 4]>,
    column_ic: Vec<f64>,
    core: (usize, usize),
    pub properties: IndexMap<String, Value>,
}

impl Motif {
    /// Build a motif from count or frequency rows (A, C, G, T per column).
    /// Rows are normalized; all-zero rows become uniform.
    pub fn new(name: impl Into<String>, rows: Vec<[f64; 4]>) -> Self {
        let matrix: Vec<[f64; 4]> = rows
            .into_iter()
            .map(|row| {
                let total: f64 = row.iter().sum();
                if total > 0.0 {
                    [row[0] / total, row[1] / total, row[2] / total, row[3] / total]
                } else {
                    [0.25; 4]
                }
            })
            .collect();
        let column_ic: Vec<f64> = matrix.iter().map(column_information).collect();
        let core = default_core(&column_ic);
        Motif {
            name: name.into(),
            matrix,
            column_ic,
            core,
            properties: IndexMap::new(),
        }
    }

    pub fn from_consensus(name: impl Into<String>, consensus: &str) -> Self {
        Motif::new(name, consensus.chars().map(iupac_counts).collect())
    }

    /// Override the core columns (inclusive, clamped to the motif)
    pub fn with_core(mut self, first: usize, last: usize) -> Self {
        let max = self.length().saturating_sub(1);
        let first = first.min(max);
        self.core = (first, last.clamp(first, max));
        self
    }

    pub fn length(&self) -> usize {
        self.matrix.len()
    }

    pub fn matrix(&self) -> &[[f64; 4]] {
        &self.matrix
    }

    pub fn column_ic(&self) -> &[f64] {
        &self.column_ic
    }

    pub fn information_content(&self) -> f64 {
        self.column_ic.iter().sum()
    }

    pub fn core(&self) -> (usize, usize) {
        self.core
    }

    pub fn consensus(&self) -> String {
        self.matrix
            .iter()
            .map(|col| {
                let (best, p) = col
                    .iter()
                    .enumerate()
                    .fold((0, 0.0), |acc, (i, &p)| if p > acc.1 { (i, p) } else { acc });
                if p >= 0.5 {
                    ['A', 'C', 'G', 'T'][best]
                } else {
                    'N'
                }
            })
            .collect()
    }

    pub fn reverse_complement(&self) -> Motif {
        let matrix: Vec<[f64; 4]> = self
            .matrix
            .iter()
            .rev()
            .map(|c| [c[3], c[2], c[1], c[0]])
            .collect();
        let len = self.length();
        let (first, last) = self.core;
        Motif {
            name: self.name.clone(),
            column_ic: matrix.iter().map(column_information).collect(),
            matrix,
            core: (len.saturating_sub(last + 1), len.saturating_sub(first + 1)),
            properties: self.properties.clone(),
        }
    }

    /// Motif column that covers relative position `pos` of a binding site
    /// spanning `[start, end]` on `strand`
    pub fn column_at(&self, start: i64, end: i64, strand: Strand, pos: i64) -> Option<usize> {
        let offset = match strand {
            Strand::Reverse => end - pos,
            _ => pos - start,
        };
        if offset < 0 || offset as usize >= self.length() {
            None
        } else {
            Some(offset as usize)
        }
    }

    /// Relative span of the core for a binding site at `[start, end]`
    pub fn core_span(&self, start: i64, end: i64, strand: Strand) -> (i64, i64) {
        let (first, last) = (self.core.0 as i64, self.core.1 as i64);
        let span = match strand {
            Strand::Reverse => (end - last, end - first),
            _ => (start + first, start + last),
        };
        (span.0.max(start), span.1.min(end))
    }
}

/// Smallest span covering every column at or above `CORE_IC_THRESHOLD`; the
/// whole motif when no column qualifies
fn default_core(column_ic: &[f64]) -> (usize, usize) {
    let strong: Vec<usize> = column_ic
        .iter()
        .enumerate()
        .filter(|(_, &ic)| ic >= CORE_IC_THRESHOLD)
        .map(|(i, _)| i)
        .collect();
    match (strong.first(), strong.last()) {
        (Some(&first), Some(&last)) => (first, last),
        _ => (0, column_ic.len().saturating_sub(1)),
    }
}

impl PropertyBearer for Motif {
    fn name(&self) -> &str {
        &self.name
    }

    fn property(&self, name: &str) -> Result<Value, OpError> {
        match name {
            "length" => Ok(Value::Number(self.length() as f64)),
            "ic" | "information_content" => Ok(Value::Number(self.information_content())),
            "consensus" => Ok(Value::Text(self.consensus())),
            _ => self
                .properties
                .get(name)
                .cloned()
                .ok_or_else(|| OpError::MissingProperty(name.to_string())),
        }
    }

    fn set_property(&mut self, name: &str, value: Value) -> Result<(), OpError> {
        match name {
            "length" | "ic" | "information_content" | "consensus" => {
                Err(OpError::ReadOnlyProperty(name.to_string()))
            }
            _ => {
                self.properties.insert(name.to_string(), value);
                Ok(())
            }
        }
    }
}

/// A cis-regulatory module: an ordered set of motif names
#[derive(Debug, Clone, PartialEq)]
pub struct Module {
    name: String,
    pub motifs: Vec<String>,
    pub properties: IndexMap<String, Value>,
}

impl Module {
    pub fn new(name: impl Into<String>, motifs: Vec<String>) -> Self {
        Module {
            name: name.into(),
            motifs,
            properties: IndexMap::new(),
        }
    }
}

impl PropertyBearer for Module {
    fn name(&self) -> &str {
        &self.name
    }

    fn property(&self, name: &str) -> Result<Value, OpError> {
        match name {
            "size" => Ok(Value::Number(self.motifs.len() as f64)),
            _ => self
                .properties
                .get(name)
                .cloned()
                .ok_or_else(|| OpError::MissingProperty(name.to_string())),
        }
    }

    fn set_property(&mut self, name: &str, value: Value) -> Result<(), OpError> {
        if name == "size" {
            return Err(OpError::ReadOnlyProperty(name.to_string()));
        }
        self.properties.insert(name.to_string(), value);
        Ok(())
    }
}
