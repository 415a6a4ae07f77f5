/// "within" conditions: named sub-ranges of sequences
use std::collections::HashMap;

use crate::error::{EngineError, EngineResult};
use crate::track::SequenceUniverse;

/// Unresolved window condition: `name:start-end` tokens (genomic, inclusive)
/// or a bare sequence name for the whole sequence
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WindowCondition {
    tokens: Vec<String>,
}

impl WindowCondition {
    pub fn new<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        WindowCondition {
            tokens: tokens.into_iter().map(Into::into).collect(),
        }
    }

    /// Parse comma- or whitespace-separated tokens
    pub fn parse(text: &str) -> Self {
        Self::new(
            text.split(|c: char| c == ',' || c.is_whitespace())
                .filter(|t| !t.is_empty()),
        )
    }

    pub fn resolve(&self, universe: &SequenceUniverse) -> EngineResult<ResolvedWindow> {
        let mut ranges: HashMap<String, Vec<(i64, i64)>> = HashMap::new();
        for token in &self.tokens {
            let (name, span) = parse_token(token, universe)?;
            ranges.entry(name).or_default().push(span);
        }
        for spans in ranges.values_mut() {
            merge_spans(spans);
        }
        Ok(ResolvedWindow { ranges })
    }
}

fn parse_token(token: &str, universe: &SequenceUniverse) -> EngineResult<(String, (i64, i64))> {
    let malformed = || {
        EngineError::config(format!(
            "malformed range '{token}', expected name:start-end"
        ))
    };
    let (name, span) = match token.split_once(':') {
        Some((name, span)) => (name, Some(span)),
        None => (token, None),
    };
    let sequence = universe
        .get(name)
        .ok_or_else(|| EngineError::config(format!("unknown sequence '{name}' in range '{token}'")))?;
    let span = match span {
        None => (sequence.genomic_start, sequence.genomic_end()),
        Some(span) => {
            let (start, end) = span.split_once('-').ok_or_else(malformed)?;
            let start: i64 = start.trim().parse().map_err(|_| malformed())?;
            let end: i64 = end.trim().parse().map_err(|_| malformed())?;
            if start > end {
                return Err(EngineError::config(format!(
                    "range '{token}' ends before it starts"
                )));
            }
            (start, end)
        }
    };
    Ok((name.to_string(), span))
}

/// Sort and merge overlapping or adjacent spans in place
fn merge_spans(spans: &mut Vec<(i64, i64)>) {
    spans.sort_unstable();
    let mut merged: Vec<(i64, i64)> = Vec::with_capacity(spans.len());
    for &(start, end) in spans.iter() {
        match merged.last_mut() {
            Some(last) if start <= last.1 + 1 => last.1 = last.1.max(end),
            _ => merged.push((start, end)),
        }
    }
    *spans = merged;
}

/// Resolved window condition. Read-only; safe to share between tasks.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedWindow {
    ranges: HashMap<String, Vec<(i64, i64)>>,
}

impl ResolvedWindow {
    /// Is the genomic position inside one of the sequence's ranges?
    pub fn contains(&self, sequence: &str, genomic: i64) -> bool {
        self.overlaps(sequence, genomic, genomic)
    }

    /// Does the genomic interval overlap one of the sequence's ranges?
    pub fn overlaps(&self, sequence: &str, start: i64, end: i64) -> bool {
        let Some(spans) = self.ranges.get(sequence) else {
            return false;
        };
        // Spans are merged, so ends are sorted too
        let first = spans.partition_point(|&(_, e)| e < start);
        spans.get(first).is_some_and(|&(s, _)| s <= end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::Strand;
    use crate::track::SequenceInfo;

    fn universe() -> SequenceUniverse {
        SequenceUniverse::new(vec![
            SequenceInfo::new("chr1", 1000, 500, Strand::Direct),
            SequenceInfo::new("chr2", 0, 100, Strand::Reverse),
        ])
    }

    #[test]
    fn test_ranges_contain_and_overlap() {
        let window = WindowCondition::parse("chr1:1100-1200, chr1:1150-1300 chr2")
            .resolve(&universe())
            .unwrap();
        assert!(window.contains("chr1", 1100));
        assert!(window.contains("chr1", 1300));
        assert!(!window.contains("chr1", 1301));
        assert!(!window.contains("chr1", 1099));
        assert!(window.overlaps("chr1", 1050, 1100));
        assert!(!window.overlaps("chr1", 1400, 1450));
        assert!(window.contains("chr2", 99));
        assert!(!window.contains("chr3", 5));
    }

    #[test]
    fn test_malformed_tokens_are_config_errors() {
        let u = universe();
        for bad in ["chr1:10", "chr1:a-b", "chr1:20-10", "chrX:1-2"] {
            let err = WindowCondition::parse(bad).resolve(&u).unwrap_err();
            assert!(
                matches!(err, EngineError::Config { .. }),
                "expected config error for {bad}"
            );
        }
    }

    #[test]
    fn test_merge_spans() {
        let mut spans = vec![(10, 20), (1, 3), (21, 25), (4, 4), (40, 50)];
        merge_spans(&mut spans);
        assert_eq!(spans, vec![(1, 4), (10, 25), (40, 50)]);
    }
}
