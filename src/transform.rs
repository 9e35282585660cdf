use std::fmt;

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

/// Minutes credited to each side's aggregate row.
pub const FULL_MATCH_MINUTES: u32 = 90;
pub const AGGREGATE_POSITION: &str = "Team";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchStatus {
    Scheduled,
    Timed,
    InPlay,
    Paused,
    ExtraTime,
    PenaltyShootout,
    Live,
    Finished,
    Suspended,
    Postponed,
    Cancelled,
    Awarded,
    Other(String),
}

impl MatchStatus {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "SCHEDULED" => MatchStatus::Scheduled,
            "TIMED" => MatchStatus::Timed,
            "IN_PLAY" => MatchStatus::InPlay,
            "PAUSED" => MatchStatus::Paused,
            "EXTRA_TIME" => MatchStatus::ExtraTime,
            "PENALTY_SHOOTOUT" => MatchStatus::PenaltyShootout,
            "LIVE" => MatchStatus::Live,
            "FINISHED" => MatchStatus::Finished,
            "SUSPENDED" => MatchStatus::Suspended,
            "POSTPONED" => MatchStatus::Postponed,
            "CANCELLED" | "CANCELED" => MatchStatus::Cancelled,
            "AWARDED" => MatchStatus::Awarded,
            other => MatchStatus::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            MatchStatus::Scheduled => "SCHEDULED",
            MatchStatus::Timed => "TIMED",
            MatchStatus::InPlay => "IN_PLAY",
            MatchStatus::Paused => "PAUSED",
            MatchStatus::ExtraTime => "EXTRA_TIME",
            MatchStatus::PenaltyShootout => "PENALTY_SHOOTOUT",
            MatchStatus::Live => "LIVE",
            MatchStatus::Finished => "FINISHED",
            MatchStatus::Suspended => "SUSPENDED",
            MatchStatus::Postponed => "POSTPONED",
            MatchStatus::Cancelled => "CANCELLED",
            MatchStatus::Awarded => "AWARDED",
            MatchStatus::Other(raw) => raw,
        }
    }
}

impl fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Winner {
    HomeTeam,
    AwayTeam,
    Draw,
}

impl Winner {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "HOME_TEAM" => Some(Winner::HomeTeam),
            "AWAY_TEAM" => Some(Winner::AwayTeam),
            "DRAW" => Some(Winner::Draw),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Winner::HomeTeam => "HOME_TEAM",
            Winner::AwayTeam => "AWAY_TEAM",
            Winner::Draw => "DRAW",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatchRecord {
    pub match_id: i64,
    pub utc_date: Option<String>,
    pub status: MatchStatus,
    pub matchday: Option<i64>,
    pub stage: Option<String>,
    pub competition_id: Option<i64>,
    pub competition_name: Option<String>,
    pub season_start_year: Option<i32>,
    pub home_team_id: Option<i64>,
    pub home_team_name: Option<String>,
    pub away_team_id: Option<i64>,
    pub away_team_name: Option<String>,
    pub home_score: Option<i64>,
    pub away_score: Option<i64>,
    pub winner: Option<Winner>,
    pub duration: String,
    pub venue: Option<String>,
}

impl MatchRecord {
    pub fn is_finished(&self) -> bool {
        self.status == MatchStatus::Finished
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TeamRecord {
    pub team_id: i64,
    pub team_name: Option<String>,
    pub short_name: Option<String>,
    pub tla: Option<String>,
    pub crest_url: Option<String>,
    pub founded: Option<i64>,
    pub venue: Option<String>,
}

/// One participant observation for a match. `player_id == None` marks a team-aggregate row.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PlayerStatRecord {
    pub match_id: i64,
    pub player_id: Option<i64>,
    pub player_name: String,
    pub team_id: Option<i64>,
    pub team_name: Option<String>,
    pub position: Option<String>,
    pub minutes_played: u32,
    pub goals: u32,
    pub assists: u32,
    pub shots: u32,
    pub shots_on_target: u32,
    pub passes: u32,
    pub passes_completed: u32,
    pub tackles: u32,
    pub interceptions: u32,
    pub fouls_committed: u32,
    pub fouls_drawn: u32,
    pub yellow_cards: u32,
    pub red_cards: u32,
    pub efficiency: f64,
    pub involvement_rate: f64,
    pub form_score: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{entity}: payload is not a json object")]
    NotAnObject { entity: &'static str },
    #[error("{entity}: missing required field `{field}`")]
    MissingField {
        entity: &'static str,
        field: &'static str,
    },
    #[error("{entity}: field `{field}` is not a valid id")]
    InvalidId {
        entity: &'static str,
        field: &'static str,
    },
}

/// Maps one provider match object. Only `id` is required; other malformed fields become `None`.
pub fn normalize_match(raw: &Value) -> Result<MatchRecord, ValidationError> {
    const ENTITY: &str = "match";
    if !raw.is_object() {
        return Err(ValidationError::NotAnObject { entity: ENTITY });
    }
    let match_id = required_id(raw, "id", ENTITY)?;

    let score = raw.get("score").unwrap_or(&Value::Null);
    let full_time = score.get("fullTime").unwrap_or(&Value::Null);
    let competition = raw.get("competition").unwrap_or(&Value::Null);
    let season = raw.get("season").unwrap_or(&Value::Null);
    let home = raw.get("homeTeam").unwrap_or(&Value::Null);
    let away = raw.get("awayTeam").unwrap_or(&Value::Null);

    let season_start_year = str_field(season, "startDate")
        .and_then(|d| d.get(..4).map(str::to_string))
        .and_then(|y| y.parse::<i32>().ok());

    Ok(MatchRecord {
        match_id,
        utc_date: str_field(raw, "utcDate"),
        status: str_field(raw, "status")
            .map(|s| MatchStatus::parse(&s))
            .unwrap_or(MatchStatus::Scheduled),
        matchday: raw.get("matchday").and_then(as_i64_any),
        stage: str_field(raw, "stage"),
        competition_id: competition.get("id").and_then(as_i64_any),
        competition_name: str_field(competition, "name"),
        season_start_year,
        home_team_id: home.get("id").and_then(as_i64_any),
        home_team_name: str_field(home, "name"),
        away_team_id: away.get("id").and_then(as_i64_any),
        away_team_name: str_field(away, "name"),
        home_score: full_time.get("home").and_then(as_i64_any),
        away_score: full_time.get("away").and_then(as_i64_any),
        winner: str_field(score, "winner").and_then(|w| Winner::parse(&w)),
        duration: str_field(score, "duration").unwrap_or_else(|| "REGULAR".to_string()),
        venue: str_field(raw, "venue"),
    })
}

/// Maps a provider team object, either the full `teams/{id}` body or a match's `homeTeam`.
pub fn normalize_team(raw: &Value) -> Result<TeamRecord, ValidationError> {
    const ENTITY: &str = "team";
    if !raw.is_object() {
        return Err(ValidationError::NotAnObject { entity: ENTITY });
    }
    Ok(TeamRecord {
        team_id: required_id(raw, "id", ENTITY)?,
        team_name: str_field(raw, "name"),
        short_name: str_field(raw, "shortName"),
        tla: str_field(raw, "tla"),
        crest_url: str_field(raw, "crest"),
        founded: raw.get("founded").and_then(as_i64_any),
        venue: str_field(raw, "venue"),
    })
}

/// Team-aggregate rows for a finished match: one per side, home first.
/// The free provider tier has no per-player detail, so nothing else is emitted.
pub fn derive_player_stats(m: &MatchRecord) -> Vec<PlayerStatRecord> {
    if !m.is_finished() {
        return Vec::new();
    }
    vec![
        aggregate_row(m, m.home_team_id, m.home_team_name.as_deref(), m.home_score),
        aggregate_row(m, m.away_team_id, m.away_team_name.as_deref(), m.away_score),
    ]
}

fn aggregate_row(
    m: &MatchRecord,
    team_id: Option<i64>,
    team_name: Option<&str>,
    score: Option<i64>,
) -> PlayerStatRecord {
    let label = team_name.unwrap_or("Unknown");
    PlayerStatRecord {
        match_id: m.match_id,
        player_id: None,
        player_name: format!("{label} Squad"),
        team_id,
        team_name: team_name.map(str::to_string),
        position: Some(AGGREGATE_POSITION.to_string()),
        minutes_played: FULL_MATCH_MINUTES,
        goals: score.and_then(|s| u32::try_from(s).ok()).unwrap_or(0),
        ..PlayerStatRecord::default()
    }
}

/// Fills efficiency and involvement rate. Form score starts at zero; the form pass refreshes it.
pub fn compute_derived_metrics(mut stat: PlayerStatRecord) -> PlayerStatRecord {
    stat.efficiency = per_minute(stat.goals, stat.assists, stat.minutes_played);
    stat.involvement_rate = per_minute(stat.shots, stat.passes, stat.minutes_played);
    stat.form_score = 0.0;
    stat
}

/// `(a + b) / minutes`, summed in f64 so large counts cannot overflow.
fn per_minute(a: u32, b: u32, minutes: u32) -> f64 {
    if minutes == 0 {
        return 0.0;
    }
    round4((f64::from(a) + f64::from(b)) / f64::from(minutes))
}

pub fn round4(v: f64) -> f64 {
    (v * 10_000.0).round() / 10_000.0
}

/// The `matches` array of a matches payload; empty when missing.
pub fn match_entries(payload: &Value) -> &[Value] {
    payload
        .get("matches")
        .and_then(|v| v.as_array())
        .map(Vec::as_slice)
        .unwrap_or_default()
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScorerLine {
    pub player_name: String,
    pub team_name: Option<String>,
    pub goals: u32,
    pub assists: u32,
    pub penalties: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct RawScorer {
    player: RawNamed,
    #[serde(default)]
    team: Option<RawNamed>,
    #[serde(default)]
    goals: Option<u32>,
    #[serde(default)]
    assists: Option<u32>,
    #[serde(default)]
    penalties: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct RawNamed {
    name: String,
}

/// Scorer rows in provider order. Entries that don't fit the schema are dropped individually.
pub fn parse_scorers(payload: &Value) -> Vec<ScorerLine> {
    let Some(items) = payload.get("scorers").and_then(|v| v.as_array()) else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| RawScorer::deserialize(item).ok())
        .map(|s| ScorerLine {
            player_name: s.player.name,
            team_name: s.team.map(|t| t.name),
            goals: s.goals.unwrap_or(0),
            assists: s.assists.unwrap_or(0),
            penalties: s.penalties,
        })
        .collect()
}

fn required_id(
    v: &Value,
    field: &'static str,
    entity: &'static str,
) -> Result<i64, ValidationError> {
    let raw = v
        .get(field)
        .filter(|x| !x.is_null())
        .ok_or(ValidationError::MissingField { entity, field })?;
    as_i64_any(raw).ok_or(ValidationError::InvalidId { entity, field })
}

fn str_field(v: &Value, key: &str) -> Option<String> {
    v.get(key)
        .and_then(|x| x.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn as_i64_any(v: &Value) -> Option<i64> {
    if let Some(n) = v.as_i64() {
        return Some(n);
    }
    v.as_str()?.trim().parse::<i64>().ok()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn status_round_trips_known_and_unknown() {
        assert_eq!(MatchStatus::parse("finished"), MatchStatus::Finished);
        assert_eq!(MatchStatus::parse("IN_PLAY").as_str(), "IN_PLAY");
        assert_eq!(
            MatchStatus::parse("ABANDONED"),
            MatchStatus::Other("ABANDONED".to_string())
        );
    }

    #[test]
    fn numeric_strings_are_accepted_as_ids() {
        assert_eq!(as_i64_any(&json!("42")), Some(42));
        assert_eq!(as_i64_any(&json!(7)), Some(7));
        assert_eq!(as_i64_any(&json!("x")), None);
    }

    #[test]
    fn per_minute_rounds_to_four_digits() {
        assert_eq!(per_minute(1, 1, 90), 0.0222);
        assert_eq!(per_minute(1, 0, 3), 0.3333);
        assert_eq!(per_minute(5, 0, 0), 0.0);
    }

    #[test]
    fn null_id_is_missing() {
        let err = normalize_team(&json!({"id": null, "name": "X"})).unwrap_err();
        assert_eq!(
            err,
            ValidationError::MissingField {
                entity: "team",
                field: "id"
            }
        );
    }
}
