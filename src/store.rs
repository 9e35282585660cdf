use std::path::Path;

use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, OptionalExtension, Params, params};
use tracing::{debug, info};

use crate::transform::{MatchRecord, PlayerStatRecord, TeamRecord};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS matches (
    match_id INTEGER PRIMARY KEY,
    utc_date TEXT NULL,
    status TEXT NOT NULL,
    matchday INTEGER NULL,
    stage TEXT NULL,
    competition_id INTEGER NULL,
    competition_name TEXT NULL,
    season_start_year INTEGER NULL,
    home_team_id INTEGER NULL,
    home_team_name TEXT NULL,
    away_team_id INTEGER NULL,
    away_team_name TEXT NULL,
    home_score INTEGER NULL,
    away_score INTEGER NULL,
    winner TEXT NULL,
    duration TEXT NOT NULL DEFAULT 'REGULAR',
    venue TEXT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_matches_utc_date ON matches(utc_date);
CREATE INDEX IF NOT EXISTS idx_matches_status ON matches(status);
CREATE INDEX IF NOT EXISTS idx_matches_competition ON matches(competition_id);

CREATE TABLE IF NOT EXISTS teams (
    team_id INTEGER PRIMARY KEY,
    team_name TEXT NULL,
    short_name TEXT NULL,
    tla TEXT NULL,
    crest_url TEXT NULL,
    founded INTEGER NULL,
    venue TEXT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS player_stats (
    stat_id INTEGER PRIMARY KEY AUTOINCREMENT,
    match_id INTEGER NOT NULL,
    player_id INTEGER NULL,
    player_name TEXT NOT NULL,
    team_id INTEGER NULL,
    team_name TEXT NULL,
    position TEXT NULL,
    minutes_played INTEGER NOT NULL DEFAULT 0,
    goals INTEGER NOT NULL DEFAULT 0,
    assists INTEGER NOT NULL DEFAULT 0,
    shots INTEGER NOT NULL DEFAULT 0,
    shots_on_target INTEGER NOT NULL DEFAULT 0,
    passes INTEGER NOT NULL DEFAULT 0,
    passes_completed INTEGER NOT NULL DEFAULT 0,
    tackles INTEGER NOT NULL DEFAULT 0,
    interceptions INTEGER NOT NULL DEFAULT 0,
    fouls_committed INTEGER NOT NULL DEFAULT 0,
    fouls_drawn INTEGER NOT NULL DEFAULT 0,
    yellow_cards INTEGER NOT NULL DEFAULT 0,
    red_cards INTEGER NOT NULL DEFAULT 0,
    efficiency REAL NOT NULL DEFAULT 0,
    involvement_rate REAL NOT NULL DEFAULT 0,
    form_score REAL NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_player_stats_match ON player_stats(match_id);
CREATE INDEX IF NOT EXISTS idx_player_stats_player ON player_stats(player_id, created_at);

CREATE VIEW IF NOT EXISTS recent_matches AS
SELECT
    match_id, utc_date, status, competition_name, matchday, stage,
    home_team_id, home_team_name, away_team_id, away_team_name,
    home_score, away_score, winner, venue, updated_at
FROM matches
ORDER BY utc_date DESC, match_id DESC;

CREATE VIEW IF NOT EXISTS team_performance_summary AS
WITH sides AS (
    SELECT home_team_id AS team_id, home_team_name AS team_name,
           home_score AS goals_for, away_score AS goals_against
    FROM matches
    WHERE status = 'FINISHED' AND home_team_id IS NOT NULL
      AND home_score IS NOT NULL AND away_score IS NOT NULL
    UNION ALL
    SELECT away_team_id, away_team_name, away_score, home_score
    FROM matches
    WHERE status = 'FINISHED' AND away_team_id IS NOT NULL
      AND home_score IS NOT NULL AND away_score IS NOT NULL
)
SELECT
    s.team_id AS team_id,
    COALESCE(MAX(t.team_name), MAX(s.team_name)) AS team_name,
    COUNT(*) AS matches_played,
    SUM(CASE WHEN s.goals_for > s.goals_against THEN 1 ELSE 0 END) AS wins,
    SUM(CASE WHEN s.goals_for = s.goals_against THEN 1 ELSE 0 END) AS draws,
    SUM(CASE WHEN s.goals_for < s.goals_against THEN 1 ELSE 0 END) AS losses,
    SUM(s.goals_for) AS goals_for,
    SUM(s.goals_against) AS goals_against,
    SUM(s.goals_for) - SUM(s.goals_against) AS goal_difference,
    3 * SUM(CASE WHEN s.goals_for > s.goals_against THEN 1 ELSE 0 END)
        + SUM(CASE WHEN s.goals_for = s.goals_against THEN 1 ELSE 0 END) AS points
FROM sides s
LEFT JOIN teams t ON t.team_id = s.team_id
GROUP BY s.team_id
ORDER BY points DESC, goal_difference DESC, goals_for DESC;

CREATE VIEW IF NOT EXISTS player_performance_summary AS
SELECT
    ps.player_id AS player_id,
    MAX(ps.player_name) AS player_name,
    MAX(ps.team_name) AS team_name,
    COUNT(*) AS appearances,
    SUM(ps.minutes_played) AS total_minutes,
    SUM(ps.goals) AS total_goals,
    SUM(ps.assists) AS total_assists,
    ROUND(AVG(ps.efficiency), 4) AS avg_efficiency,
    ROUND(AVG(ps.involvement_rate), 4) AS avg_involvement_rate,
    (
        SELECT latest.form_score FROM player_stats latest
        WHERE latest.player_id = ps.player_id
        ORDER BY latest.created_at DESC, latest.stat_id DESC
        LIMIT 1
    ) AS form_score
FROM player_stats ps
WHERE ps.player_id IS NOT NULL
GROUP BY ps.player_id
ORDER BY total_goals DESC, avg_efficiency DESC;
"#;

/// Result of a free-form query: column names plus rows in storage order.
#[derive(Debug, Clone, Default)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<SqlValue>>,
}

impl Table {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn get(&self, row: usize, column: &str) -> Option<&SqlValue> {
        let idx = self.column_index(column)?;
        self.rows.get(row)?.get(idx)
    }

    pub fn get_i64(&self, row: usize, column: &str) -> Option<i64> {
        match self.get(row, column)? {
            SqlValue::Integer(n) => Some(*n),
            SqlValue::Real(f) => Some(*f as i64),
            _ => None,
        }
    }

    pub fn get_f64(&self, row: usize, column: &str) -> Option<f64> {
        match self.get(row, column)? {
            SqlValue::Integer(n) => Some(*n as f64),
            SqlValue::Real(f) => Some(*f),
            _ => None,
        }
    }

    pub fn get_str(&self, row: usize, column: &str) -> Option<&str> {
        match self.get(row, column)? {
            SqlValue::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

#[derive(Debug, Clone)]
pub struct AnalyticsSummary {
    pub total_matches: i64,
    pub total_goals: i64,
    pub top_scorers: Table,
    pub team_performance: Table,
    pub recent_matches: Table,
}

/// One individual-player efficiency sample, as read back for the form pass.
#[derive(Debug, Clone, PartialEq)]
pub struct EfficiencyObservation {
    pub stat_id: i64,
    pub player_id: i64,
    pub efficiency: f64,
}

/// Owner of the SQLite connection. Not shared across threads.
pub struct Store {
    conn: Connection,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create database directory {}", parent.display()))?;
        }
        let conn =
            Connection::open(path).with_context(|| format!("open sqlite db {}", path.display()))?;
        conn.execute_batch("PRAGMA journal_mode = WAL;")
            .context("enable wal journal")?;
        let store = Self { conn };
        store.init_schema()?;
        info!(path = %path.display(), "database initialized");
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("open in-memory sqlite db")?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    /// Safe to run against an already initialized database.
    pub fn init_schema(&self) -> Result<()> {
        self.conn
            .execute_batch(SCHEMA)
            .context("create sqlite schema")?;
        Ok(())
    }

    pub fn upsert_match(&mut self, m: &MatchRecord) -> Result<UpsertOutcome> {
        let now = now_stamp();
        let tx = self.conn.transaction().context("begin match upsert")?;
        let outcome = lookup_outcome(&tx, "SELECT 1 FROM matches WHERE match_id = ?1", m.match_id)?;
        tx.execute(
            r#"
            INSERT INTO matches (
                match_id, utc_date, status, matchday, stage,
                competition_id, competition_name, season_start_year,
                home_team_id, home_team_name, away_team_id, away_team_name,
                home_score, away_score, winner, duration, venue,
                created_at, updated_at
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5,
                ?6, ?7, ?8,
                ?9, ?10, ?11, ?12,
                ?13, ?14, ?15, ?16, ?17,
                ?18, ?18
            )
            ON CONFLICT(match_id) DO UPDATE SET
                utc_date = excluded.utc_date,
                status = excluded.status,
                matchday = excluded.matchday,
                stage = excluded.stage,
                competition_id = excluded.competition_id,
                competition_name = excluded.competition_name,
                season_start_year = excluded.season_start_year,
                home_team_id = excluded.home_team_id,
                home_team_name = excluded.home_team_name,
                away_team_id = excluded.away_team_id,
                away_team_name = excluded.away_team_name,
                home_score = excluded.home_score,
                away_score = excluded.away_score,
                winner = excluded.winner,
                duration = excluded.duration,
                venue = excluded.venue,
                updated_at = excluded.updated_at
            "#,
            params![
                m.match_id,
                m.utc_date,
                m.status.as_str(),
                m.matchday,
                m.stage,
                m.competition_id,
                m.competition_name,
                m.season_start_year,
                m.home_team_id,
                m.home_team_name,
                m.away_team_id,
                m.away_team_name,
                m.home_score,
                m.away_score,
                m.winner.map(|w| w.as_str()),
                m.duration,
                m.venue,
                now,
            ],
        )
        .with_context(|| format!("upsert match {}", m.match_id))?;
        tx.commit().context("commit match upsert")?;
        debug!(match_id = m.match_id, ?outcome, "match stored");
        Ok(outcome)
    }

    pub fn upsert_team(&mut self, t: &TeamRecord) -> Result<UpsertOutcome> {
        let now = now_stamp();
        let tx = self.conn.transaction().context("begin team upsert")?;
        let outcome = lookup_outcome(&tx, "SELECT 1 FROM teams WHERE team_id = ?1", t.team_id)?;
        // Partial team objects embedded in matches must not erase richer fields from `teams/{id}`.
        tx.execute(
            r#"
            INSERT INTO teams (
                team_id, team_name, short_name, tla, crest_url, founded, venue,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)
            ON CONFLICT(team_id) DO UPDATE SET
                team_name = COALESCE(excluded.team_name, teams.team_name),
                short_name = COALESCE(excluded.short_name, teams.short_name),
                tla = COALESCE(excluded.tla, teams.tla),
                crest_url = COALESCE(excluded.crest_url, teams.crest_url),
                founded = COALESCE(excluded.founded, teams.founded),
                venue = COALESCE(excluded.venue, teams.venue),
                updated_at = excluded.updated_at
            "#,
            params![
                t.team_id,
                t.team_name,
                t.short_name,
                t.tla,
                t.crest_url,
                t.founded,
                t.venue,
                now,
            ],
        )
        .with_context(|| format!("upsert team {}", t.team_id))?;
        tx.commit().context("commit team upsert")?;
        debug!(team_id = t.team_id, ?outcome, "team stored");
        Ok(outcome)
    }

    /// Insert-only. An empty slice touches nothing and returns 0.
    pub fn append_player_stats(&mut self, stats: &[PlayerStatRecord]) -> Result<usize> {
        if stats.is_empty() {
            return Ok(0);
        }
        let tx = self.conn.transaction().context("begin player stats insert")?;
        {
            let mut stmt = tx
                .prepare(
                    r#"
                    INSERT INTO player_stats (
                        match_id, player_id, player_name, team_id, team_name, position,
                        minutes_played, goals, assists, shots, shots_on_target,
                        passes, passes_completed, tackles, interceptions,
                        fouls_committed, fouls_drawn, yellow_cards, red_cards,
                        efficiency, involvement_rate, form_score, created_at
                    ) VALUES (
                        ?1, ?2, ?3, ?4, ?5, ?6,
                        ?7, ?8, ?9, ?10, ?11,
                        ?12, ?13, ?14, ?15,
                        ?16, ?17, ?18, ?19,
                        ?20, ?21, ?22, ?23
                    )
                    "#,
                )
                .context("prepare player stats insert")?;
            for s in stats {
                stmt.execute(params![
                    s.match_id,
                    s.player_id,
                    s.player_name,
                    s.team_id,
                    s.team_name,
                    s.position,
                    s.minutes_played,
                    s.goals,
                    s.assists,
                    s.shots,
                    s.shots_on_target,
                    s.passes,
                    s.passes_completed,
                    s.tackles,
                    s.interceptions,
                    s.fouls_committed,
                    s.fouls_drawn,
                    s.yellow_cards,
                    s.red_cards,
                    s.efficiency,
                    s.involvement_rate,
                    s.form_score,
                    now_stamp(),
                ])
                .with_context(|| {
                    format!("insert player stat for match {} ({})", s.match_id, s.player_name)
                })?;
            }
        }
        tx.commit().context("commit player stats insert")?;
        debug!(rows = stats.len(), "player stats appended");
        Ok(stats.len())
    }

    /// Runs a read query and materializes every row.
    pub fn query<P: Params>(&self, sql: &str, params: P) -> Result<Table> {
        let mut stmt = self
            .conn
            .prepare(sql)
            .with_context(|| format!("prepare query: {sql}"))?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let width = columns.len();
        let rows = stmt
            .query_map(params, |row| {
                (0..width)
                    .map(|idx| row.get::<_, SqlValue>(idx))
                    .collect::<rusqlite::Result<Vec<_>>>()
            })
            .context("run query")?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row.context("decode query row")?);
        }
        Ok(Table { columns, rows: out })
    }

    pub fn recent_matches(&self, limit: usize) -> Result<Table> {
        self.query(
            "SELECT * FROM recent_matches LIMIT ?1",
            params![limit as i64],
        )
    }

    pub fn team_performance(&self, team_id: Option<i64>) -> Result<Table> {
        match team_id {
            Some(id) => self.query(
                "SELECT * FROM team_performance_summary WHERE team_id = ?1",
                params![id],
            ),
            None => self.query("SELECT * FROM team_performance_summary", []),
        }
    }

    pub fn player_performance(&self, player_id: Option<i64>) -> Result<Table> {
        match player_id {
            Some(id) => self.query(
                "SELECT * FROM player_performance_summary WHERE player_id = ?1",
                params![id],
            ),
            None => self.query("SELECT * FROM player_performance_summary", []),
        }
    }

    pub fn analytics_summary(&self) -> Result<AnalyticsSummary> {
        let total_matches = self
            .conn
            .query_row("SELECT COUNT(*) FROM matches", [], |row| row.get::<_, i64>(0))
            .context("count matches")?;
        let total_goals = self
            .conn
            .query_row("SELECT COALESCE(SUM(goals), 0) FROM player_stats", [], |row| {
                row.get::<_, i64>(0)
            })
            .context("sum goals")?;
        let top_scorers = self.query(
            r#"
            SELECT player_name, team_name, SUM(goals) AS total_goals
            FROM player_stats
            WHERE player_id IS NOT NULL
            GROUP BY player_name, team_name
            ORDER BY total_goals DESC
            LIMIT 10
            "#,
            [],
        )?;

        Ok(AnalyticsSummary {
            total_matches,
            total_goals,
            top_scorers,
            team_performance: self.team_performance(None)?,
            recent_matches: self.recent_matches(10)?,
        })
    }

    /// Individual-player efficiency history, oldest first within each player.
    pub fn efficiency_history(&self) -> Result<Vec<EfficiencyObservation>> {
        let mut stmt = self
            .conn
            .prepare(
                r#"
                SELECT stat_id, player_id, efficiency
                FROM player_stats
                WHERE player_id IS NOT NULL
                ORDER BY player_id ASC, created_at ASC, stat_id ASC
                "#,
            )
            .context("prepare efficiency history query")?;
        let rows = stmt
            .query_map([], |row| {
                Ok(EfficiencyObservation {
                    stat_id: row.get(0)?,
                    player_id: row.get(1)?,
                    efficiency: row.get(2)?,
                })
            })
            .context("query efficiency history")?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row.context("decode efficiency row")?);
        }
        Ok(out)
    }

    pub fn update_form_scores(&mut self, updates: &[(i64, f64)]) -> Result<usize> {
        if updates.is_empty() {
            return Ok(0);
        }
        let tx = self.conn.transaction().context("begin form score update")?;
        let mut changed = 0usize;
        {
            let mut stmt = tx
                .prepare("UPDATE player_stats SET form_score = ?1 WHERE stat_id = ?2")
                .context("prepare form score update")?;
            for (stat_id, score) in updates {
                changed += stmt
                    .execute(params![score, stat_id])
                    .with_context(|| format!("update form score for stat {stat_id}"))?;
            }
        }
        tx.commit().context("commit form score update")?;
        Ok(changed)
    }

    /// Releases the connection, surfacing any error SQLite reports on close.
    pub fn close(self) -> Result<()> {
        self.conn
            .close()
            .map_err(|(_, err)| err)
            .context("close sqlite connection")?;
        info!("database connection closed");
        Ok(())
    }
}

fn lookup_outcome(tx: &rusqlite::Transaction<'_>, sql: &str, id: i64) -> Result<UpsertOutcome> {
    let exists = tx
        .query_row(sql, params![id], |_| Ok(()))
        .optional()
        .with_context(|| format!("lookup existing row {id}"))?
        .is_some();
    Ok(if exists {
        UpsertOutcome::Updated
    } else {
        UpsertOutcome::Inserted
    })
}

fn now_stamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}
