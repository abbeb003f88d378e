//! Timeline recorder for orders.
//!
//! Every order carries an append-only timeline. Entries are only ever added
//! through [`TimelineRecorder::append`], which assigns a monotonic `seq`,
//! clamps timestamps so they never go backwards, and links each entry to its
//! predecessor with a SHA-256 hash chain:
//!
//! - `hash_prev` = `hash_self` of the previous entry (`None` for the first)
//! - `hash_self` = SHA-256 of the canonical JSON of the entry with
//!   `hash_self` removed
//!
//! [`verify_timeline`] recomputes the chain and reports the first entry that
//! was edited, removed or reordered after the fact.

use chrono::{DateTime, Utc};
use mpx_schemas::TimelineEvent;
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

#[derive(Debug, thiserror::Error)]
pub enum TimelineError {
    #[error("timeline event serialization failed: {0}")]
    Codec(#[from] serde_json::Error),
}

/// Input for one timeline entry; the recorder fills in ordering and hashes.
#[derive(Debug, Clone)]
pub struct NewTimelineEntry {
    pub status: String,
    pub description: String,
    pub updated_by: String,
    pub timestamp: DateTime<Utc>,
    pub request_id: Option<String>,
}

/// Appends entries to a single order's timeline.
pub struct TimelineRecorder<'a> {
    events: &'a mut Vec<TimelineEvent>,
}

impl<'a> TimelineRecorder<'a> {
    pub fn new(events: &'a mut Vec<TimelineEvent>) -> Self {
        Self { events }
    }

    /// Append one entry and return a copy of what was stored.
    pub fn append(&mut self, entry: NewTimelineEntry) -> Result<TimelineEvent, TimelineError> {
        let last = self.events.last();
        let seq = self.events.len() as u64;
        let hash_prev = last.and_then(|e| e.hash_self.clone());
        // Ordering is creation order; a skewed caller clock must not make
        // the timeline run backwards.
        let timestamp = match last {
            Some(prev) if entry.timestamp < prev.timestamp => prev.timestamp,
            _ => entry.timestamp,
        };

        let mut ev = TimelineEvent {
            seq,
            status: entry.status,
            description: entry.description,
            updated_by: entry.updated_by,
            timestamp,
            request_id: entry.request_id,
            hash_prev,
            hash_self: None,
        };
        ev.hash_self = Some(compute_event_hash(&ev)?);

        self.events.push(ev.clone());
        Ok(ev)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Returns the entry appended by `request_id`, if any.
pub fn find_request<'t>(events: &'t [TimelineEvent], request_id: &str) -> Option<&'t TimelineEvent> {
    events
        .iter()
        .find(|e| e.request_id.as_deref() == Some(request_id))
}

/// True when `after` is `before` with zero or more entries appended.
pub fn is_append_only(before: &[TimelineEvent], after: &[TimelineEvent]) -> bool {
    after.len() >= before.len() && before.iter().zip(after).all(|(a, b)| a == b)
}

/// Canonicalize by sorting keys recursively and emitting compact JSON.
fn canonical_json<T: Serialize>(v: &T) -> Result<String, TimelineError> {
    let raw = serde_json::to_value(v)?;
    Ok(serde_json::to_string(&sort_keys(&raw))?)
}

fn sort_keys(v: &Value) -> Value {
    match v {
        Value::Object(map) => {
            let mut keys: Vec<_> = map.keys().cloned().collect();
            keys.sort();
            let mut new = serde_json::Map::new();
            for k in keys {
                new.insert(k.clone(), sort_keys(&map[&k]));
            }
            Value::Object(new)
        }
        Value::Array(arr) => Value::Array(arr.iter().map(sort_keys).collect()),
        _ => v.clone(),
    }
}

/// Hash is computed over the entry WITHOUT `hash_self` (no self-reference).
pub fn compute_event_hash(ev: &TimelineEvent) -> Result<String, TimelineError> {
    let mut clone = ev.clone();
    clone.hash_self = None;

    let canonical = canonical_json(&clone)?;
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

/// Result of timeline verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyResult {
    Valid { events: usize },
    /// First broken entry (zero-based index into the timeline).
    Broken { index: usize, reason: String },
}

impl VerifyResult {
    pub fn is_valid(&self) -> bool {
        matches!(self, VerifyResult::Valid { .. })
    }
}

pub fn verify_timeline(events: &[TimelineEvent]) -> Result<VerifyResult, TimelineError> {
    let mut prev_hash: Option<String> = None;
    let mut prev_ts: Option<DateTime<Utc>> = None;

    for (i, ev) in events.iter().enumerate() {
        if ev.seq != i as u64 {
            return Ok(VerifyResult::Broken {
                index: i,
                reason: format!("seq mismatch: expected {i}, got {}", ev.seq),
            });
        }

        if ev.hash_prev != prev_hash {
            return Ok(VerifyResult::Broken {
                index: i,
                reason: format!(
                    "hash_prev mismatch: expected {:?}, got {:?}",
                    prev_hash, ev.hash_prev
                ),
            });
        }

        match &ev.hash_self {
            Some(claimed) => {
                let recomputed = compute_event_hash(ev)?;
                if *claimed != recomputed {
                    return Ok(VerifyResult::Broken {
                        index: i,
                        reason: format!(
                            "hash_self mismatch: claimed {claimed}, recomputed {recomputed}"
                        ),
                    });
                }
            }
            None => {
                return Ok(VerifyResult::Broken {
                    index: i,
                    reason: "hash_self missing".to_string(),
                });
            }
        }

        if let Some(prev) = prev_ts {
            if ev.timestamp < prev {
                return Ok(VerifyResult::Broken {
                    index: i,
                    reason: "timestamp earlier than previous entry".to_string(),
                });
            }
        }

        prev_hash = ev.hash_self.clone();
        prev_ts = Some(ev.timestamp);
    }

    Ok(VerifyResult::Valid {
        events: events.len(),
    })
}
