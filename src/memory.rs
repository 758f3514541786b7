//! Episodes (one record per executed cycle) and the memory text built from
//! them for the proposer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::features::PanelRow;
use crate::proposal::{Pick, ProposalConstraints};

/// Text returned when there is no history.
pub const NO_PRIOR_EPISODES: &str = "No prior episodes.";

const SUMMARY_PREFIX: &str = "Recent episodes → ";

/// Snapshot of one decision cycle. Written once, never mutated.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Episode {
    pub asof: DateTime<Utc>,
    /// Schedule window the cycle ran in (`am`, `pm`, `manual`, ...).
    pub window_tag: String,
    pub equity_cents: i64,
    pub cash_cents: i64,
    pub constraints: ProposalConstraints,
    pub top_panel: Vec<PanelRow>,
    pub picks: Vec<Pick>,
    pub notes: String,
    pub confidence: f64,
}

impl Episode {
    /// The equity sample this episode contributes to the equity series.
    pub fn equity_sample(&self) -> EquitySample {
        EquitySample {
            asof: self.asof,
            equity_cents: self.equity_cents,
            cash_cents: self.cash_cents,
        }
    }
}

/// Point on the equity curve.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EquitySample {
    pub asof: DateTime<Utc>,
    pub equity_cents: i64,
    pub cash_cents: i64,
}

/// Render recent episodes as one line of text, oldest first.
///
/// Input order does not matter; episodes are sorted by timestamp. Each entry
/// reads `YYYY-MM-DD HH:MM (tag): SYM:W%, ...` with `no positions` for an
/// empty pick list.
pub fn summarize(episodes: &[Episode]) -> String {
    if episodes.is_empty() {
        return NO_PRIOR_EPISODES.to_string();
    }

    let mut ordered: Vec<&Episode> = episodes.iter().collect();
    ordered.sort_by_key(|e| e.asof);

    let lines: Vec<String> = ordered
        .into_iter()
        .map(|e| {
            let picks = e
                .picks
                .iter()
                .map(|p| format!("{}:{:.0}%", p.symbol, p.weight * 100.0))
                .collect::<Vec<_>>()
                .join(", ");
            let picks = if picks.is_empty() {
                "no positions".to_string()
            } else {
                picks
            };
            format!("{} ({}): {}", e.asof.format("%Y-%m-%d %H:%M"), e.window_tag, picks)
        })
        .collect();

    format!("{SUMMARY_PREFIX}{}", lines.join(" | "))
}
