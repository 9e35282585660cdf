use anyhow::{Context, Result};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::store::{Store, UpsertOutcome};
use crate::transform::{
    compute_derived_metrics, derive_player_stats, match_entries, normalize_match, normalize_team,
    parse_scorers,
};

const SCORERS_LOGGED: usize = 10;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub processed: usize,
    pub inserted: usize,
    pub updated: usize,
    pub skipped: usize,
    pub teams_upserted: usize,
    pub stats_appended: usize,
}

impl IngestReport {
    pub fn absorb(&mut self, other: IngestReport) {
        self.processed += other.processed;
        self.inserted += other.inserted;
        self.updated += other.updated;
        self.skipped += other.skipped;
        self.teams_upserted += other.teams_upserted;
        self.stats_appended += other.stats_appended;
    }
}

/// Stores every match of a matches payload: match row first, then both teams, then derived stats.
///
/// Records that fail validation are skipped; a storage error aborts with the match id attached.
pub fn ingest_matches(store: &mut Store, payload: &Value) -> Result<IngestReport> {
    let entries = match_entries(payload);
    if entries.is_empty() {
        warn!("no matches data to process");
        return Ok(IngestReport::default());
    }

    let mut report = IngestReport::default();
    for raw in entries {
        let record = match normalize_match(raw) {
            Ok(record) => record,
            Err(err) => {
                warn!("skipping match: {err}");
                report.skipped += 1;
                continue;
            }
        };
        let match_id = record.match_id;

        let outcome = store.upsert_match(&record).inspect_err(|err| {
            error!(match_id, "error storing match: {err:#}");
        })?;
        match outcome {
            UpsertOutcome::Inserted => report.inserted += 1,
            UpsertOutcome::Updated => report.updated += 1,
        }

        for side in ["homeTeam", "awayTeam"] {
            let Some(team_raw) = raw.get(side) else {
                continue;
            };
            match normalize_team(team_raw) {
                Ok(team) => {
                    store
                        .upsert_team(&team)
                        .with_context(|| format!("match {match_id} {side}"))?;
                    report.teams_upserted += 1;
                }
                Err(err) => debug!(match_id, side, "team not stored: {err}"),
            }
        }

        let stats: Vec<_> = derive_player_stats(&record)
            .into_iter()
            .map(compute_derived_metrics)
            .collect();
        report.stats_appended += store
            .append_player_stats(&stats)
            .with_context(|| format!("player stats for match {match_id}"))?;
        report.processed += 1;
    }

    info!(
        processed = report.processed,
        inserted = report.inserted,
        updated = report.updated,
        skipped = report.skipped,
        "matches stored"
    );
    Ok(report)
}

/// Scorer data is logged, not persisted.
pub fn log_scorers(competition: &str, payload: &Value) {
    let scorers = parse_scorers(payload);
    if scorers.is_empty() {
        warn!(competition, "no scorers data to process");
        return;
    }
    info!(competition, count = scorers.len(), "processing top scorers");
    for s in scorers.iter().take(SCORERS_LOGGED) {
        info!(
            competition,
            team = s.team_name.as_deref().unwrap_or("-"),
            "  {}: {} goals, {} assists",
            s.player_name,
            s.goals,
            s.assists
        );
    }
}
