//! Rolling form score, refreshed as a batch pass over persisted history.
//!
//! Ingestion writes `form_score = 0`; nothing here runs inside a scheduler cycle.

use anyhow::Result;
use tracing::info;

use crate::store::{EfficiencyObservation, Store};
use crate::transform::round4;

/// Mean of each value and up to `window - 1` values before it. Input is oldest first.
pub fn rolling_form_scores(efficiencies: &[f64], window: usize) -> Vec<f64> {
    let window = window.max(1);
    let mut out = Vec::with_capacity(efficiencies.len());
    let mut sum = 0.0;
    for (idx, value) in efficiencies.iter().enumerate() {
        sum += value;
        if idx >= window {
            sum -= efficiencies[idx - window];
        }
        let count = (idx + 1).min(window);
        out.push(round4(sum / count as f64));
    }
    out
}

/// `(stat_id, form_score)` for every observation. Expects rows grouped by player, oldest first.
pub fn form_updates(history: &[EfficiencyObservation], window: usize) -> Vec<(i64, f64)> {
    let mut updates = Vec::with_capacity(history.len());
    for group in history.chunk_by(|a, b| a.player_id == b.player_id) {
        let values: Vec<f64> = group.iter().map(|o| o.efficiency).collect();
        let scores = rolling_form_scores(&values, window);
        updates.extend(group.iter().map(|o| o.stat_id).zip(scores));
    }
    updates
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FormSummary {
    pub players: usize,
    pub rows_updated: usize,
}

pub fn recompute_form_scores(store: &mut Store, window: usize) -> Result<FormSummary> {
    let history = store.efficiency_history()?;
    if history.is_empty() {
        info!("no player data available for form score calculation");
        return Ok(FormSummary::default());
    }
    let players = history
        .chunk_by(|a, b| a.player_id == b.player_id)
        .count();
    let updates = form_updates(&history, window);
    let rows_updated = store.update_form_scores(&updates)?;
    info!(players, rows_updated, window, "form scores refreshed");
    Ok(FormSummary {
        players,
        rows_updated,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_of_one_is_identity() {
        assert_eq!(rolling_form_scores(&[0.1, 0.3, 0.2], 1), vec![0.1, 0.3, 0.2]);
    }

    #[test]
    fn partial_windows_use_available_rows() {
        let scores = rolling_form_scores(&[0.2, 0.4, 0.6, 0.8], 3);
        assert_eq!(scores, vec![0.2, 0.3, 0.4, 0.6]);
    }

    #[test]
    fn empty_history_yields_nothing() {
        assert!(rolling_form_scores(&[], 5).is_empty());
        assert!(form_updates(&[], 5).is_empty());
    }

    #[test]
    fn players_do_not_share_windows() {
        let history = vec![
            EfficiencyObservation { stat_id: 1, player_id: 7, efficiency: 1.0 },
            EfficiencyObservation { stat_id: 2, player_id: 7, efficiency: 0.0 },
            EfficiencyObservation { stat_id: 3, player_id: 9, efficiency: 0.4 },
        ];
        let updates = form_updates(&history, 5);
        assert_eq!(updates, vec![(1, 1.0), (2, 0.5), (3, 0.4)]);
    }
}
