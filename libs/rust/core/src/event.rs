//! Primitive events, labeled streams and the attribute schema inferred from them.
//!
//! A stream is fully materialized and read-only once built: the optimizer shares
//! one training and one holdout stream across every run and agent.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Milliseconds since the start of the stream.
pub type Timestamp = i64;

#[derive(Debug, Error, PartialEq)]
pub enum StreamError {
    #[error("timestamps must be non-decreasing: event {index} at {timestamp} follows {previous}")]
    NonMonotonic { index: usize, timestamp: Timestamp, previous: Timestamp },
    #[error("target event type must not be empty")]
    EmptyTarget,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub event_type: String,
    pub timestamp: Timestamp,
    #[serde(default)]
    pub attributes: BTreeMap<String, f64>,
}

impl Event {
    pub fn new(event_type: impl Into<String>, timestamp: Timestamp) -> Self {
        Self { event_type: event_type.into(), timestamp, attributes: BTreeMap::new() }
    }

    pub fn with_attr(mut self, name: impl Into<String>, value: f64) -> Self {
        self.attributes.insert(name.into(), value);
        self
    }

    pub fn value(&self, name: &str) -> Option<f64> { self.attributes.get(name).copied() }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.event_type, self.timestamp)?;
        for (k, v) in &self.attributes { write!(f, "; {k}: {v}")?; }
        Ok(())
    }
}

/// Closed numeric interval used as the domain of an attribute expression.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min: f64,
    pub max: f64,
}

impl Bounds {
    pub const UNBOUNDED: Bounds = Bounds { min: f64::NEG_INFINITY, max: f64::INFINITY };

    pub fn new(min: f64, max: f64) -> Self { Self { min: min.min(max), max: max.max(min) } }
    pub fn point(v: f64) -> Self { Self { min: v, max: v } }
    pub fn width(&self) -> f64 { self.max - self.min }
    pub fn is_finite(&self) -> bool { self.min.is_finite() && self.max.is_finite() }
    pub fn clamp(&self, v: f64) -> f64 { v.max(self.min).min(self.max) }

    fn widen(&mut self, v: f64) {
        self.min = self.min.min(v);
        self.max = self.max.max(v);
    }
}

/// Ordered primitive events plus the ground-truth occurrences of the target event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventStream {
    events: Vec<Event>,
    target: String,
    occurrences: Vec<Timestamp>,
}

impl EventStream {
    pub fn new(events: Vec<Event>, target: impl Into<String>, mut occurrences: Vec<Timestamp>) -> Result<Self, StreamError> {
        let target = target.into();
        if target.is_empty() { return Err(StreamError::EmptyTarget); }
        for (index, pair) in events.windows(2).enumerate() {
            if pair[1].timestamp < pair[0].timestamp {
                return Err(StreamError::NonMonotonic { index: index + 1, timestamp: pair[1].timestamp, previous: pair[0].timestamp });
            }
        }
        occurrences.sort_unstable();
        Ok(Self { events, target, occurrences })
    }

    /// Splits a mixed list into primitive events and ground truth: every event of
    /// type `target` becomes an occurrence and is removed from the stream.
    pub fn from_labeled(mixed: Vec<Event>, target: impl Into<String>) -> Result<Self, StreamError> {
        let target = target.into();
        let (hits, events): (Vec<Event>, Vec<Event>) = mixed.into_iter().partition(|e| e.event_type == target);
        Self::new(events, target, hits.into_iter().map(|e| e.timestamp).collect())
    }

    pub fn events(&self) -> &[Event] { &self.events }
    pub fn target(&self) -> &str { &self.target }
    pub fn occurrences(&self) -> &[Timestamp] { &self.occurrences }
    pub fn len(&self) -> usize { self.events.len() }
    pub fn is_empty(&self) -> bool { self.events.is_empty() }

    pub fn duration(&self) -> Timestamp {
        match (self.events.first(), self.events.last()) {
            (Some(a), Some(b)) => b.timestamp - a.timestamp,
            _ => 0,
        }
    }

    pub fn schema(&self) -> Schema { Schema::infer(self) }
}

/// What the rule generator knows about the primitive events: which types exist,
/// which attributes each type carries with their observed domain, and how often
/// each type arrives.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Schema {
    types: BTreeMap<String, TypeInfo>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TypeInfo {
    pub attributes: BTreeMap<String, Bounds>,
    /// Events of this type per millisecond.
    pub rate: f64,
}

impl Schema {
    pub fn infer(stream: &EventStream) -> Self {
        let mut types: BTreeMap<String, TypeInfo> = BTreeMap::new();
        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for ev in stream.events() {
            *counts.entry(ev.event_type.as_str()).or_default() += 1;
            let info = types.entry(ev.event_type.clone()).or_default();
            for (name, v) in &ev.attributes {
                info.attributes.entry(name.clone()).or_insert_with(|| Bounds::point(*v)).widen(*v);
            }
        }
        let span = stream.duration().max(1) as f64;
        for (name, info) in types.iter_mut() {
            info.rate = counts.get(name.as_str()).copied().unwrap_or(0) as f64 / span;
        }
        Self { types }
    }

    pub fn with_type(mut self, name: impl Into<String>, info: TypeInfo) -> Self {
        self.types.insert(name.into(), info);
        self
    }

    pub fn event_types(&self) -> impl Iterator<Item = &str> { self.types.keys().map(String::as_str) }
    pub fn type_count(&self) -> usize { self.types.len() }
    pub fn info(&self, event_type: &str) -> Option<&TypeInfo> { self.types.get(event_type) }

    pub fn attribute_bounds(&self, event_type: &str, attribute: &str) -> Option<Bounds> {
        self.types.get(event_type)?.attributes.get(attribute).copied()
    }

    /// Expected number of `event_type` events inside a window of `span_ms`, at least one.
    pub fn expected_in_window(&self, event_type: &str, span_ms: i64) -> f64 {
        let rate = self.types.get(event_type).map(|t| t.rate).unwrap_or(0.0);
        (rate * span_ms as f64).ceil().max(1.0)
    }
}
