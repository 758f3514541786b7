//! Allocation proposals: the request sent to an external proposer and the
//! validation of whatever text comes back.
//!
//! The proposer is untrusted. Its output is parsed into a strict schema and
//! then sanitized; anything that does not parse becomes the
//! [`ProposalOutcome::Fallback`] variant (no picks, zero confidence), which
//! downstream turns into a no-op cycle rather than a liquidation.

use chrono::{DateTime, SecondsFormat, Utc};
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{Error, Result};
use crate::event::{EventSink, Level};
use crate::features::PanelRow;
use crate::weights::Weights;
use crate::Symbol;

/// Confidence assumed when the proposer omits it.
pub const DEFAULT_CONFIDENCE: f64 = 0.5;

/// Prefix of the notes carried by a fallback proposal.
pub const VALIDATION_ERROR_PREFIX: &str = "ValidationError: ";

/// One proposed position.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Pick {
    pub symbol: Symbol,
    pub weight: f64,
    pub rationale: String,
}

/// A validated, sanitized allocation proposal.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProposedAllocation {
    pub asof: String,
    pub picks: Vec<Pick>,
    pub notes: String,
    pub confidence: f64,
}

impl ProposedAllocation {
    /// The empty, zero-confidence proposal used when validation fails.
    pub fn fallback(asof: DateTime<Utc>, reason: &str) -> Self {
        Self {
            asof: asof.to_rfc3339_opts(SecondsFormat::Secs, true),
            picks: Vec::new(),
            notes: format!("{VALIDATION_ERROR_PREFIX}{reason}"),
            confidence: 0.0,
        }
    }

    /// Picks as an ordered weight list.
    pub fn weights(&self) -> Weights {
        self.picks.iter().map(|p| (p.symbol, p.weight)).collect()
    }

    /// Keep only the picks for which `keep` returns true.
    pub fn retain_picks<F: FnMut(&Pick) -> bool>(&mut self, keep: F) {
        self.picks.retain(keep);
    }
}

/// Constraints communicated to the proposer and enforced on its answer.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProposalConstraints {
    /// Maximum number of picks.
    pub max_positions: usize,
    /// Maximum single-name weight.
    pub max_weight: f64,
}

/// Everything the proposer is given for one cycle.
#[derive(Clone, Debug, Serialize)]
pub struct ProposalRequest {
    pub asof: DateTime<Utc>,
    pub panel: Vec<PanelRow>,
    pub max_positions: usize,
    pub max_weight: f64,
    pub memory_context: String,
}

impl ProposalRequest {
    pub fn new(
        asof: DateTime<Utc>,
        panel: Vec<PanelRow>,
        constraints: ProposalConstraints,
        memory_context: String,
    ) -> Self {
        Self {
            asof,
            panel,
            max_positions: constraints.max_positions,
            max_weight: constraints.max_weight,
            memory_context,
        }
    }
}

/// Result of ingesting proposer output.
#[derive(Clone, Debug, PartialEq)]
pub enum ProposalOutcome {
    Accepted(ProposedAllocation),
    /// Validation failed; the allocation is the empty fallback.
    Fallback {
        allocation: ProposedAllocation,
        reason: String,
    },
}

impl ProposalOutcome {
    pub fn allocation(&self) -> &ProposedAllocation {
        match self {
            Self::Accepted(a) => a,
            Self::Fallback { allocation, .. } => allocation,
        }
    }

    pub fn into_allocation(self) -> ProposedAllocation {
        match self {
            Self::Accepted(a) => a,
            Self::Fallback { allocation, .. } => allocation,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::Fallback { .. })
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawPick {
    symbol: String,
    weight: f64,
    rationale: String,
}

#[derive(Deserialize)]
struct RawProposal {
    asof: String,
    picks: Vec<RawPick>,
    #[serde(default)]
    notes: String,
    #[serde(default = "default_confidence")]
    confidence: f64,
}

fn default_confidence() -> f64 {
    DEFAULT_CONFIDENCE
}

/// Parse and sanitize proposer output.
///
/// Fails on malformed JSON, missing `asof`/`picks`, unknown pick fields, a
/// confidence outside `[0, 1]` or a non-finite weight. On success the picks
/// are sanitized with [`sanitize_picks`].
pub fn parse_proposal(
    text: &str,
    constraints: &ProposalConstraints,
    sink: &dyn EventSink,
) -> Result<ProposedAllocation> {
    let raw: RawProposal =
        serde_json::from_str(text).map_err(|e| Error::Proposal(e.to_string()))?;

    if !(0.0..=1.0).contains(&raw.confidence) {
        return Err(Error::Proposal(format!(
            "confidence {} outside [0, 1]",
            raw.confidence
        )));
    }
    if let Some(bad) = raw.picks.iter().find(|p| !p.weight.is_finite()) {
        return Err(Error::Proposal(format!(
            "non-finite weight for {}",
            bad.symbol
        )));
    }

    let picks = sanitize_picks(raw.picks, constraints, sink);
    Ok(ProposedAllocation {
        asof: raw.asof,
        picks,
        notes: raw.notes,
        confidence: raw.confidence,
    })
}

/// Ingest proposer output, substituting the fallback on any validation error.
pub fn ingest_proposal(
    text: &str,
    constraints: &ProposalConstraints,
    now: DateTime<Utc>,
    sink: &dyn EventSink,
) -> ProposalOutcome {
    match parse_proposal(text, constraints, sink) {
        Ok(allocation) => {
            sink.record(
                Level::Info,
                "proposal_accepted",
                json!({
                    "picks": allocation.picks.len(),
                    "confidence": allocation.confidence,
                }),
            );
            ProposalOutcome::Accepted(allocation)
        }
        Err(err) => {
            let reason = match err {
                Error::Proposal(reason) => reason,
                other => other.to_string(),
            };
            sink.record(
                Level::Warn,
                "proposal_fallback",
                json!({ "reason": reason }),
            );
            ProposalOutcome::Fallback {
                allocation: ProposedAllocation::fallback(now, &reason),
                reason,
            }
        }
    }
}

fn sanitize_picks(
    raw: Vec<RawPick>,
    constraints: &ProposalConstraints,
    sink: &dyn EventSink,
) -> Vec<Pick> {
    let mut seen = FxHashSet::default();
    let mut picks = Vec::with_capacity(raw.len());

    for p in raw {
        let ticker = p.symbol.trim().to_ascii_uppercase();
        let Some(symbol) = Symbol::try_new(&ticker) else {
            sink.record(
                Level::Warn,
                "pick_dropped",
                json!({ "symbol": p.symbol, "reason": "invalid symbol" }),
            );
            continue;
        };
        if !seen.insert(symbol) {
            sink.record(
                Level::Warn,
                "pick_dropped",
                json!({ "symbol": symbol, "reason": "duplicate" }),
            );
            continue;
        }
        picks.push(Pick {
            symbol,
            weight: p.weight,
            rationale: p.rationale,
        });
    }

    if picks.len() > constraints.max_positions {
        sink.record(
            Level::Warn,
            "picks_truncated",
            json!({ "received": picks.len(), "kept": constraints.max_positions }),
        );
        picks.truncate(constraints.max_positions);
    }

    let total: f64 = picks.iter().map(|p| p.weight).sum();
    if total > 1.0 {
        for p in &mut picks {
            p.weight /= total;
        }
    }
    for p in &mut picks {
        p.weight = p.weight.clamp(0.0, constraints.max_weight);
    }
    picks
}
