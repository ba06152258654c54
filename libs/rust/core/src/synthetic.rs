//! Synthetic labeled streams for experiments and tests.
//!
//! Primitive events get uniformly random types, integer attribute values and
//! inter-arrival gaps. Ground truth is whatever a known rule predicts on them,
//! each prediction kept with `hit_probability`.

use crate::evaluator::Evaluator;
use crate::event::{Event, EventStream, StreamError, Timestamp};
use crate::rule::Rule;
use rand::Rng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeRange {
    pub min: i64,
    pub max: i64,
}

impl AttributeRange {
    pub fn new(min: i64, max: i64) -> Self { Self { min: min.min(max), max: max.max(min) } }
}

/// An attribute with its own value range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixedAttribute {
    pub name: String,
    #[serde(flatten)]
    pub range: AttributeRange,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyntheticConfig {
    pub num_events: usize,
    pub num_event_types: usize,
    pub num_attributes: usize,
    pub min_gap_secs: u64,
    pub max_gap_secs: u64,
    /// Attributes with their own range; taken first, in order.
    pub fixed_ranges: Vec<FixedAttribute>,
    /// Range of the remaining `OTHER_<i>` attributes.
    pub default_range: AttributeRange,
    pub hit_probability: f64,
    pub target: String,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        let fixed_ranges = [("ID", 1, 10), ("ROOM", 1, 10), ("TEMP", 1, 100)]
            .into_iter()
            .map(|(name, lo, hi)| FixedAttribute { name: name.to_string(), range: AttributeRange::new(lo, hi) })
            .collect();
        Self {
            num_events: 15_000,
            num_event_types: 10,
            num_attributes: 3,
            min_gap_secs: 1,
            max_gap_secs: 10,
            fixed_ranges,
            default_range: AttributeRange::new(-100, 100),
            hit_probability: 1.0,
            target: "HIT".into(),
        }
    }
}

impl SyntheticConfig {
    /// `A`, `B`, ... then `E26`, `E27`, ... past the alphabet.
    pub fn event_types(&self) -> Vec<String> {
        (0..self.num_event_types.max(1))
            .map(|i| match u8::try_from(i) {
                Ok(b) if b < 26 => char::from(b'A' + b).to_string(),
                _ => format!("E{i}"),
            })
            .collect()
    }

    pub fn range_of(&self, attribute: &str) -> AttributeRange {
        self.fixed_ranges.iter().find(|f| f.name == attribute).map_or(self.default_range, |f| f.range)
    }

    pub fn attributes(&self) -> Vec<(String, AttributeRange)> {
        let mut out: Vec<(String, AttributeRange)> = self.fixed_ranges.iter()
            .take(self.num_attributes)
            .map(|f| (f.name.clone(), f.range))
            .collect();
        for i in out.len()..self.num_attributes {
            out.push((format!("OTHER_{i}"), self.default_range));
        }
        out
    }
}

/// Primitive events only, starting at `t = 0`.
pub fn primitive_events<R: Rng + ?Sized>(cfg: &SyntheticConfig, rng: &mut R) -> Vec<Event> {
    let types = cfg.event_types();
    let attributes = cfg.attributes();
    let (lo_gap, hi_gap) = (cfg.min_gap_secs.min(cfg.max_gap_secs), cfg.max_gap_secs.max(cfg.min_gap_secs));
    let mut t: Timestamp = 0;
    let mut events = Vec::with_capacity(cfg.num_events);
    for i in 0..cfg.num_events {
        if i > 0 { t += rng.gen_range(lo_gap..=hi_gap) as Timestamp * 1000; }
        let ty = &types[rng.gen_range(0..types.len())];
        let mut ev = Event::new(ty.as_str(), t);
        for (name, range) in &attributes {
            ev = ev.with_attr(name.as_str(), rng.gen_range(range.min..=range.max) as f64);
        }
        events.push(ev);
    }
    events
}

/// Random stream labeled by `rule`.
pub fn generate<R: Rng + ?Sized>(cfg: &SyntheticConfig, rule: &Rule, rng: &mut R) -> Result<EventStream, StreamError> {
    let events = primitive_events(cfg, rng);
    let p = cfg.hit_probability.clamp(0.0, 1.0);
    let hits: Vec<Timestamp> = Evaluator::default()
        .predict(rule, &events)
        .into_iter()
        .filter(|_| rng.gen_bool(p))
        .collect();
    tracing::debug!(events = events.len(), hits = hits.len(), rule = %rule, "synthetic stream generated");
    EventStream::new(events, cfg.target.as_str(), hits)
}

/// Independently drawn `(training, holdout)` pair.
pub fn generate_split<R: Rng + ?Sized>(cfg: &SyntheticConfig, rule: &Rule, rng: &mut R) -> Result<(EventStream, EventStream), StreamError> {
    Ok((generate(cfg, rule, rng)?, generate(cfg, rule, rng)?))
}
