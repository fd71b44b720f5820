//! StatsBomb open-data adapter.
//!
//! The open-data repository is a tree of static JSON files:
//! `competitions.json` lists (competition, season) pairs,
//! `matches/{competition_id}/{season_id}.json` lists matches and
//! `lineups/{match_id}.json` holds both teams' lineups. Lineups carry
//! nationality, positions and substitution clocks, so this source
//! populates every optional participation field.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use tracing::{debug, info, instrument, warn};

use super::http::{build_client, get_text};
use super::{SourceAdapter, SourceError};
use crate::config::SourceSettings;
use crate::core::fetcher::PolitenessBudget;
use crate::domain::{
    EventDescriptor, ParticipantDescriptor, ParticipationDescriptor, TeamDescriptor,
};

/// Source name stored in every natural key produced here
pub const SOURCE_NAME: &str = "statsbomb";

pub const DEFAULT_BASE_URL: &str =
    "https://raw.githubusercontent.com/statsbomb/open-data/master/data";

const FULL_MATCH_SECONDS: u32 = 90 * 60;

/// StatsBomb open-data adapter
pub struct StatsBombAdapter {
    settings: SourceSettings,
    client: reqwest::Client,
    /// Listing files fetched by an attempt that later hit an outage.
    /// A retried listing resumes from here; cleared once a listing completes.
    listing_cache: Mutex<HashMap<String, String>>,
}

impl StatsBombAdapter {
    pub fn new(settings: SourceSettings) -> Result<Self, SourceError> {
        let client = build_client(Duration::from_secs(settings.timeout_secs))?;
        Ok(Self {
            settings,
            client,
            listing_cache: Mutex::new(HashMap::new()),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.settings.base_url.trim_end_matches('/'), path)
    }

    fn cached(&self, url: &str) -> Option<String> {
        self.listing_cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(url)
            .cloned()
    }

    /// GET a listing file once per listing, pausing only before real requests
    async fn get_listing(&self, url: &str, pause: bool) -> Result<String, SourceError> {
        if let Some(body) = self.cached(url) {
            debug!(url, "Reusing listing file from an earlier attempt");
            return Ok(body);
        }
        if pause {
            self.settings.politeness.pause().await;
        }
        let body = get_text(&self.client, url).await?;
        self.listing_cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(url.to_string(), body.clone());
        Ok(body)
    }
}

#[async_trait]
impl SourceAdapter for StatsBombAdapter {
    fn name(&self) -> &str {
        SOURCE_NAME
    }

    fn politeness(&self) -> PolitenessBudget {
        self.settings.politeness
    }

    #[instrument(skip(self), fields(source = SOURCE_NAME))]
    async fn list_events(
        &self,
        team_names: &[String],
        date_from: NaiveDate,
        date_to: NaiveDate,
    ) -> Result<Vec<EventDescriptor>, SourceError> {
        let wanted: HashSet<String> = team_names
            .iter()
            .map(|t| t.trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .collect();

        let index = self.get_listing(&self.url("competitions.json"), false).await?;
        let seasons: Vec<SeasonRef> = parse_competitions(&index)?
            .into_iter()
            .filter(|s| s.overlaps(date_from, date_to))
            .collect();
        info!(seasons = seasons.len(), "Scanning competition seasons");

        let mut seen = HashSet::new();
        let mut events = Vec::new();

        for season in &seasons {
            let url = self.url(&format!(
                "matches/{}/{}.json",
                season.competition_id, season.season_id
            ));
            let body = match self.get_listing(&url, true).await {
                Ok(body) => body,
                Err(e) if !e.is_transient() => {
                    warn!(url = %url, error = %e, "Skipping season file");
                    continue;
                }
                Err(e) => return Err(e),
            };

            let matches = match parse_matches(&body, &wanted, date_from, date_to) {
                Ok(matches) => matches,
                Err(e) => {
                    warn!(url = %url, error = %e, "Skipping season file");
                    continue;
                }
            };

            for event in matches {
                if seen.insert(event.source_event_id.clone()) {
                    events.push(event);
                }
            }
        }

        self.listing_cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        info!(events = events.len(), "Listed events");
        Ok(events)
    }

    async fn list_participations(
        &self,
        source_event_id: &str,
    ) -> Result<Vec<ParticipationDescriptor>, SourceError> {
        let url = self.url(&format!("lineups/{}.json", source_event_id));
        let body = get_text(&self.client, &url).await?;
        let participations = parse_lineups(&body)?;
        debug!(source_event_id, count = participations.len(), "Parsed lineups");
        Ok(participations)
    }
}

// ============================================================================
// Raw JSON shapes
// ============================================================================

#[derive(Debug, Deserialize)]
struct RawCompetition {
    competition_id: i64,
    season_id: i64,
    #[serde(default)]
    season_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawCountry {
    name: String,
}

#[derive(Debug, Deserialize)]
struct RawHomeTeam {
    home_team_id: i64,
    home_team_name: String,
    #[serde(default)]
    country: Option<RawCountry>,
}

#[derive(Debug, Deserialize)]
struct RawAwayTeam {
    away_team_id: i64,
    away_team_name: String,
    #[serde(default)]
    country: Option<RawCountry>,
}

#[derive(Debug, Deserialize)]
struct RawNamed {
    #[serde(alias = "competition_name", alias = "season_name")]
    name: String,
}

#[derive(Debug, Deserialize)]
struct RawMatch {
    match_id: i64,
    match_date: String,
    home_team: RawHomeTeam,
    away_team: RawAwayTeam,
    #[serde(default)]
    competition: Option<RawNamed>,
    #[serde(default)]
    season: Option<RawNamed>,
}

#[derive(Debug, Deserialize)]
struct RawLineupTeam {
    team_id: i64,
    team_name: String,
    #[serde(default)]
    lineup: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct RawPlayer {
    player_id: i64,
    player_name: String,
    #[serde(default)]
    birth_date: Option<String>,
    #[serde(default)]
    country: Option<RawCountry>,
    #[serde(default)]
    positions: Vec<RawPosition>,
}

#[derive(Debug, Deserialize)]
struct RawPosition {
    position: String,
    #[serde(default)]
    from: Option<String>,
    #[serde(default)]
    to: Option<String>,
    #[serde(default)]
    start_reason: Option<String>,
}

// ============================================================================
// Parsing
// ============================================================================

/// One (competition, season) file in the open-data tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeasonRef {
    pub competition_id: i64,
    pub season_id: i64,
    pub season_name: Option<String>,
}

impl SeasonRef {
    /// Whether the season's years can intersect the date range
    ///
    /// "2019/2020" spans two years, "2018" one. Unparseable names are kept.
    pub fn overlaps(&self, from: NaiveDate, to: NaiveDate) -> bool {
        use chrono::Datelike;

        let Some(name) = self.season_name.as_deref() else {
            return true;
        };
        let years: Vec<i32> = name
            .split(|c: char| !c.is_ascii_digit())
            .filter(|p| p.len() == 4)
            .filter_map(|p| p.parse().ok())
            .collect();

        match (years.iter().min(), years.iter().max()) {
            (Some(&first), Some(&last)) => first <= to.year() && last >= from.year(),
            _ => true,
        }
    }
}

fn parse_array(body: &str, what: &str) -> Result<Vec<serde_json::Value>, SourceError> {
    serde_json::from_str(body)
        .map_err(|e| SourceError::Malformed(format!("{} is not a JSON array: {}", what, e)))
}

/// Parse `competitions.json`, de-duplicating (competition, season) pairs
pub fn parse_competitions(body: &str) -> Result<Vec<SeasonRef>, SourceError> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();

    for value in parse_array(body, "competitions index")? {
        match serde_json::from_value::<RawCompetition>(value) {
            Ok(raw) => {
                if seen.insert((raw.competition_id, raw.season_id)) {
                    out.push(SeasonRef {
                        competition_id: raw.competition_id,
                        season_id: raw.season_id,
                        season_name: raw.season_name,
                    });
                }
            }
            Err(e) => warn!(error = %e, "Skipping malformed competition record"),
        }
    }

    Ok(out)
}

/// Parse one season's match list, keeping matches of `wanted` teams in range
///
/// `wanted` holds lowercase team names; an empty set keeps every match.
pub fn parse_matches(
    body: &str,
    wanted: &HashSet<String>,
    date_from: NaiveDate,
    date_to: NaiveDate,
) -> Result<Vec<EventDescriptor>, SourceError> {
    let mut out = Vec::new();

    for value in parse_array(body, "match list")? {
        let raw = match serde_json::from_value::<RawMatch>(value) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "Skipping malformed match record");
                continue;
            }
        };

        let date = match NaiveDate::parse_from_str(&raw.match_date, "%Y-%m-%d") {
            Ok(date) => date,
            Err(e) => {
                warn!(match_id = raw.match_id, date = %raw.match_date, error = %e, "Skipping match with bad date");
                continue;
            }
        };
        if date < date_from || date > date_to {
            continue;
        }

        let home_name = raw.home_team.home_team_name.trim().to_lowercase();
        let away_name = raw.away_team.away_team_name.trim().to_lowercase();
        if !wanted.is_empty() && !wanted.contains(&home_name) && !wanted.contains(&away_name) {
            continue;
        }

        let mut home = TeamDescriptor::new(
            SOURCE_NAME,
            raw.home_team.home_team_id.to_string(),
            raw.home_team.home_team_name,
        );
        home.country = raw.home_team.country.map(|c| c.name);

        let mut away = TeamDescriptor::new(
            SOURCE_NAME,
            raw.away_team.away_team_id.to_string(),
            raw.away_team.away_team_name,
        );
        away.country = raw.away_team.country.map(|c| c.name);

        out.push(EventDescriptor {
            source: SOURCE_NAME.to_string(),
            source_event_id: raw.match_id.to_string(),
            date,
            season: raw.season.map(|s| s.name),
            competition: raw.competition.map(|c| c.name),
            home,
            away,
        });
    }

    Ok(out)
}

/// Parse a lineup file into participations for both teams
pub fn parse_lineups(body: &str) -> Result<Vec<ParticipationDescriptor>, SourceError> {
    let mut out = Vec::new();

    for value in parse_array(body, "lineup")? {
        let team_block = match serde_json::from_value::<RawLineupTeam>(value) {
            Ok(block) => block,
            Err(e) => {
                warn!(error = %e, "Skipping malformed lineup team block");
                continue;
            }
        };
        let team = TeamDescriptor::new(
            SOURCE_NAME,
            team_block.team_id.to_string(),
            team_block.team_name,
        );

        for value in team_block.lineup {
            let raw = match serde_json::from_value::<RawPlayer>(value) {
                Ok(raw) => raw,
                Err(e) => {
                    warn!(team = %team.name, error = %e, "Skipping malformed player record");
                    continue;
                }
            };
            out.push(participation_from(raw, &team));
        }
    }

    Ok(out)
}

fn participation_from(raw: RawPlayer, team: &TeamDescriptor) -> ParticipationDescriptor {
    let mut participant =
        ParticipantDescriptor::new(SOURCE_NAME, raw.player_id.to_string(), raw.player_name);
    participant.nationality = raw.country.map(|c| c.name);
    participant.birth_date = raw
        .birth_date
        .as_deref()
        .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok());

    let first = raw.positions.first();
    let is_starter = first
        .and_then(|p| p.start_reason.as_deref())
        .is_some_and(|r| r.eq_ignore_ascii_case("Starting XI"));

    let mut participation = ParticipationDescriptor::new(participant, team.clone(), is_starter);
    participation.minutes = minutes_played(&raw.positions);
    if participation.minutes.is_none() {
        warn!(player = %participation.participant.name, "Unreadable match clock, minutes unknown");
    }
    participation.position = first.map(|p| p.position.clone());
    participation
}

/// Parse a "MM:SS" match clock into seconds
pub fn clock_to_seconds(clock: &str) -> Option<u32> {
    let (minutes, seconds) = clock.trim().split_once(':')?;
    let minutes: u32 = minutes.parse().ok()?;
    let seconds: u32 = seconds.parse().ok()?;
    minutes.checked_mul(60)?.checked_add(seconds)
}

/// Total minutes across position spells; an open spell runs to full time
///
/// `None` when any spell carries a clock that cannot be read.
fn minutes_played(positions: &[RawPosition]) -> Option<u32> {
    let mut seconds = 0u32;
    for spell in positions {
        let start = match spell.from.as_deref() {
            Some(clock) => clock_to_seconds(clock)?,
            None => 0,
        };
        let end = match spell.to.as_deref() {
            Some(clock) => clock_to_seconds(clock)?,
            None => FULL_MATCH_SECONDS.max(start),
        };
        seconds = seconds.saturating_add(end.saturating_sub(start));
    }
    Some(seconds / 60)
}
