use std::str::FromStr;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use log::{info, warn};

use trackops::cluster::{EquivalencePolicy, KeepPolicy};
use trackops::condition::{
    BaseComparison, NumericComparison, OverlapComparison, PositionCondition, WindowCondition,
};
use trackops::display::LogDisplayHook;
use trackops::engine::{Engine, Outcome, Transform, TransformRequest};
use trackops::operand::{Operand, WindowStatistic};
use trackops::operations::{Arithmetic, FilterRequest, MathFunction, PruneRequest};
use trackops::synthetic::{generate, SyntheticSpec};
use trackops::track::TrackKind;
use trackops::{CancellationToken, DataObject, DataStore, EngineConfig};

/// trackops - parallel transforms over genome annotation tracks
///
/// Runs one operation over a seeded synthetic dataset (tracks `DNA`,
/// `conservation` and `sites`, map `gc_offset`, variable `threshold`,
/// collection `tf_motifs`, partition `families`) and reports the result.
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Number of threads for per-sequence tasks
    #[clap(short = 't', long = "threads", default_value = "4")]
    threads: usize,

    /// Seed of the synthetic dataset
    #[clap(long = "seed", default_value = "42")]
    seed: u64,

    /// Number of synthetic sequences
    #[clap(long = "sequences", default_value = "8")]
    sequences: usize,

    /// Length of each synthetic sequence
    #[clap(long = "length", default_value = "5000")]
    length: usize,

    /// Motif sites per 1000 bp
    #[clap(long = "site-density", default_value = "20")]
    site_density: f64,

    /// Quiet mode (no progress output)
    #[clap(long = "quiet")]
    quiet: bool,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the objects of the dataset
    Inspect,

    /// Apply an arithmetic operation or a math function to a data object
    Transform {
        /// increase, decrease, multiply, divide, set, min, max, or a function
        /// (abs, negate, ln, log2, log10, sqrt, round, floor, ceil)
        operation: String,

        /// Data object to transform
        source: String,

        /// Operand: a number, a data object name, "position",
        /// "region.<property>" or "<statistic>:<track>"
        #[clap(short = 'v', long = "value")]
        value: Option<String>,

        /// Region or object property to edit
        #[clap(short = 'p', long = "property")]
        property: Option<String>,

        /// Store the result under a new name
        #[clap(short = 'o', long = "target")]
        target: Option<String>,

        /// Condition, e.g. "conservation > 0.5", "not sites inside" or
        /// "DNA matches-relative W" (IUPAC match read on the sequence's strand)
        #[clap(short = 'w', long = "where")]
        condition: Option<String>,

        /// Ranges, e.g. "seq1:1-500,seq2"
        #[clap(short = 'r', long = "range")]
        range: Option<String>,

        /// Collection restricting sequences, map keys or profile rows
        #[clap(long = "restrict")]
        restrict: Option<String>,
    },

    /// Collapse clusters of equivalent regions
    Prune {
        /// Region track to prune
        source: String,

        /// duplicates, similar, palindromes, alternatives, alternatives-naive
        #[clap(long = "policy", default_value = "duplicates")]
        policy: String,

        /// top-score, highest-ic, first-name, prefer-direct, sequence-strand
        #[clap(long = "keep", default_value = "top-score")]
        keep: String,

        /// Motif partition for the alternatives policies
        #[clap(long = "partition")]
        partition: Option<String>,

        #[clap(short = 'o', long = "target")]
        target: Option<String>,

        #[clap(short = 'w', long = "where")]
        condition: Option<String>,

        #[clap(short = 'r', long = "range")]
        range: Option<String>,
    },

    /// Remove the regions that satisfy a condition
    Filter {
        /// Region track to filter
        source: String,

        #[clap(short = 'o', long = "target")]
        target: Option<String>,

        #[clap(short = 'w', long = "where")]
        condition: Option<String>,

        #[clap(short = 'r', long = "range")]
        range: Option<String>,
    },
}

/// Numbers become constants, known names become references to their object,
/// anything else is text
fn parse_operand(text: &str, store: &DataStore) -> Result<Operand> {
    if let Ok(value) = text.parse::<f64>() {
        return Ok(Operand::Constant(value));
    }
    if text.eq_ignore_ascii_case("position") {
        return Ok(Operand::Position);
    }
    if let Some(property) = text.strip_prefix("region.") {
        return Ok(Operand::RegionProperty(property.to_string()));
    }
    if let Some((statistic, track)) = text.split_once(':') {
        if let Ok(statistic) = WindowStatistic::from_str(statistic) {
            return Ok(Operand::WindowStat {
                track: track.to_string(),
                statistic,
            });
        }
    }
    Ok(match store.get(text) {
        Some(DataObject::Variable(_)) => Operand::Variable(text.to_string()),
        Some(DataObject::Map(_)) => Operand::Map(text.to_string()),
        Some(DataObject::Track(_)) => Operand::Track(text.to_string()),
        Some(DataObject::Collection(_)) => Operand::Collection(text.to_string()),
        Some(other) => bail!("a {} cannot be used as an operand", other.type_name()),
        None => Operand::Text(text.trim_matches('"').to_string()),
    })
}

/// Parse `[not] subject comparator [operands...]`
fn parse_condition(text: &str, store: &DataStore) -> Result<PositionCondition> {
    let mut tokens: Vec<&str> = text.split_whitespace().collect();
    let negate = tokens.first().is_some_and(|t| t.eq_ignore_ascii_case("not"));
    if negate {
        tokens.remove(0);
    }
    let condition = match tokens.as_slice() {
        [track, "inside"] => PositionCondition::inside(track),
        [track, "overlaps", other] => {
            PositionCondition::overlap(track, OverlapComparison::RegionsOverlap, other)
        }
        [track, "overlaps-bases", other] => {
            PositionCondition::overlap(track, OverlapComparison::BasesOverlap, other)
        }
        [track, "is-uppercase"] => {
            PositionCondition::base(track, BaseComparison::IsUppercase, None, false)
        }
        [track, "is-lowercase"] => {
            PositionCondition::base(track, BaseComparison::IsLowercase, None, false)
        }
        [track, keyword @ ("matches" | "matches-relative"), pattern] => {
            PositionCondition::base(
                track,
                BaseComparison::Matches,
                Some(Operand::Text(pattern.to_string())),
                *keyword == "matches-relative",
            )
        }
        [subject, "in", low, high] => PositionCondition::between(
            parse_operand(subject, store)?,
            parse_operand(low, store)?,
            parse_operand(high, store)?,
        ),
        [subject, comparison, operand] => PositionCondition::compare(
            parse_operand(subject, store)?,
            NumericComparison::from_str(comparison).map_err(|e| anyhow!(e))?,
            parse_operand(operand, store)?,
        ),
        _ => bail!("cannot parse condition '{text}'"),
    };
    Ok(if negate { condition.negated() } else { condition })
}

fn parse_transform(name: &str) -> Result<Box<dyn Transform>> {
    if let Ok(arithmetic) = Arithmetic::from_str(name) {
        return Ok(Box::new(arithmetic));
    }
    MathFunction::from_str(name)
        .map(|function| Box::new(function) as Box<dyn Transform>)
        .map_err(|_| anyhow!("unknown operation '{name}'"))
}

fn describe(name: &str, object: &DataObject) -> String {
    match object {
        DataObject::Variable(v) => format!("{name}\tvariable\t{v}"),
        DataObject::Map(m) => format!("{name}\tmap\t{} key(s), default {}", m.len(), m.default_value()),
        DataObject::Track(t) => match (t.kind(), t.value_range()) {
            (TrackKind::Regions, _) => format!("{name}\tregion track\t{} region(s)", t.region_count()),
            (kind, Some((lo, hi))) => format!("{name}\t{}\trange [{lo}, {hi}]", kind.label()),
            (kind, None) => format!("{name}\t{}", kind.label()),
        },
        DataObject::Collection(c) => format!("{name}\tcollection\t{} member(s)", c.len()),
        DataObject::Partition(p) => format!("{name}\tpartition\t{} cluster(s)", p.clusters().len()),
        DataObject::Motif(m) => format!("{name}\tmotif\t{} IC {:.2}", m.consensus(), m.information_content()),
        DataObject::Module(_) => format!("{name}\tmodule"),
        DataObject::Profile(p) => format!("{name}\tprofile\t{} recorded cell(s)", p.recorded()),
    }
}

fn gate_parts(
    condition: Option<&str>,
    range: Option<&str>,
    store: &DataStore,
) -> Result<(Option<PositionCondition>, Option<WindowCondition>)> {
    let condition = condition.map(|c| parse_condition(c, store)).transpose()?;
    Ok((condition, range.map(WindowCondition::parse)))
}

fn main() -> Result<()> {
    let args = Args::parse();

    let default_level = if args.quiet { "warn" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .target(env_logger::Target::Stderr)
        .init();

    let mut store = generate(&SyntheticSpec {
        sequences: args.sequences,
        length: args.length,
        site_density: args.site_density,
        seed: args.seed,
        ..SyntheticSpec::default()
    })
    .context("Failed to generate the synthetic dataset")?;
    info!(
        "Generated {} sequence(s) of {} bp (seed {})",
        args.sequences, args.length, args.seed
    );

    let mut config = EngineConfig::default().with_threads(args.threads);
    if args.quiet {
        config = config.quiet();
    }
    let engine = Engine::new(config)?.with_display_hook(Arc::new(LogDisplayHook));
    let cancel = CancellationToken::new();

    let target = match args.command {
        Command::Inspect => None,
        Command::Transform {
            operation,
            source,
            value,
            property,
            target,
            condition,
            range,
            restrict,
        } => {
            let transform = parse_transform(&operation)?;
            let operand = match value.as_deref() {
                Some(text) => parse_operand(text, &store)?,
                None => Operand::Constant(0.0),
            };
            let (condition, window) = gate_parts(condition.as_deref(), range.as_deref(), &store)?;
            let request = TransformRequest {
                target,
                property,
                condition,
                window,
                restrict_to: restrict,
                ..TransformRequest::new(source, operand)
            };
            match engine.transform(&mut store, &request, transform.as_ref(), &cancel)? {
                Outcome::Completed(report) => {
                    println!(
                        "{}\t{}\ttransformed={}\tskipped={}",
                        report.operation, report.target, report.transformed, report.skipped
                    );
                    Some(report.target)
                }
                Outcome::Aborted => {
                    warn!("Transform aborted");
                    return Ok(());
                }
            }
        }
        Command::Prune {
            source,
            policy,
            keep,
            partition,
            target,
            condition,
            range,
        } => {
            let policy = EquivalencePolicy::from_str(&policy).map_err(|e| anyhow!(e))?;
            let keep = KeepPolicy::from_str(&keep).map_err(|e| anyhow!(e))?;
            let (condition, window) = gate_parts(condition.as_deref(), range.as_deref(), &store)?;
            let request = PruneRequest {
                target,
                partition,
                condition,
                window,
                ..PruneRequest::new(source, policy, keep)
            };
            match request.run(&engine, &mut store, &cancel)? {
                Outcome::Completed(report) => {
                    println!(
                        "prune\t{}\tclusters={}\tremoved={}\tremaining={}",
                        report.target, report.stats.clusters, report.stats.removed, report.remaining
                    );
                    Some(report.target)
                }
                Outcome::Aborted => return Ok(()),
            }
        }
        Command::Filter {
            source,
            target,
            condition,
            range,
        } => {
            let (condition, window) = gate_parts(condition.as_deref(), range.as_deref(), &store)?;
            if condition.is_none() && window.is_none() {
                bail!("filter needs --where or --range");
            }
            let request = FilterRequest {
                source,
                target,
                condition,
                window,
                line: None,
            };
            match request.run(&engine, &mut store, &cancel)? {
                Outcome::Completed(report) => {
                    println!(
                        "filter\t{}\tremoved={}\tremaining={}",
                        report.target, report.removed, report.remaining
                    );
                    Some(report.target)
                }
                Outcome::Aborted => return Ok(()),
            }
        }
    };

    match target {
        Some(name) => {
            if let Some(object) = store.get(&name) {
                println!("{}", describe(&name, object));
            }
        }
        None => {
            for (name, object) in store.iter() {
                println!("{}", describe(name, object));
            }
        }
    }
    Ok(())
}
