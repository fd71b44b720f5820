//! Footballia adapter.
//!
//! Footballia is an HTML match archive. Team pages are addressed by a
//! slug of the team name and paginated; each row links to a match page
//! carrying date, teams, competition and both lineups. The site never
//! exposes minutes, positions or nationalities, so those fields stay empty.

use std::collections::BTreeSet;
use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use regex::Regex;
use tracing::{debug, info, instrument, warn};

use super::html::{capture, strip_tags};
use super::http::{build_client, get_text};
use super::{slugify, SourceAdapter, SourceError};
use crate::config::SourceSettings;
use crate::core::fetcher::PolitenessBudget;
use crate::domain::{
    EventDescriptor, ParticipantDescriptor, ParticipationDescriptor, TeamDescriptor,
};

/// Source name stored in every natural key produced here
pub const SOURCE_NAME: &str = "footballia";

pub const DEFAULT_BASE_URL: &str = "https://footballia.eu";

/// Players listed per side before the substitutes
const STARTERS_PER_SIDE: usize = 11;

static PAGINATION: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r#"(?s)<ul[^>]*class="[^"]*\bpagination\b[^"]*"[^>]*>(.*?)</ul>"#).ok()
});
static PAGE_NUMBER: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?s)<a[^>]*>\s*(\d+)\s*</a>").ok());
static ROW: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"(?s)<tr[^>]*>(.*?)</tr>").ok());
static SEASON_CELL: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r#"(?s)<td[^>]*class="[^"]*\bseason\b[^"]*"[^>]*>(.*?)</td>"#).ok()
});
static MATCH_CELL: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r#"(?s)<td[^>]*class="(?:[^"]*\s)?match(?:\s[^"]*)?"[^>]*>(.*?)</td>"#).ok()
});
static HIDDEN_XS: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r#"(?s)<div[^>]*class="[^"]*\bhidden-xs\b[^"]*"[^>]*>(.*?)</div>"#).ok()
});
static HREF: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r#"href="([^"]+)""#).ok());
static HOME_TEAM: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r#"(?s)<div[^>]*itemprop="homeTeam"[^>]*>(.*?)</div>"#).ok()
});
static AWAY_TEAM: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r#"(?s)<div[^>]*itemprop="awayTeam"[^>]*>(.*?)</div>"#).ok()
});
static TEAM_HREF: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r#"href="[^"]*/teams/([^"/?#]*)"#).ok());
static PLAYING_DATE_ATTR: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r#"<div[^>]*class="[^"]*\bplaying_date\b[^"]*"[^>]*content="([^"]+)""#).ok()
});
static PLAYING_DATE_TEXT: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r#"(?s)<div[^>]*class="[^"]*\bplaying_date\b[^"]*"[^>]*>(.*?)</div>"#).ok()
});
static START_DATE_META: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r#"<meta[^>]*itemprop="startDate"[^>]*content="([^"]+)""#).ok()
});
static START_DATE_TIME: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r#"<time[^>]*itemprop="startDate"[^>]*datetime="([^"]+)""#).ok()
});
static COMPETITION: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(
        r#"(?s)<(?:div|span)[^>]*class="[^"]*\b(?:competition|tournament|match-competition)\b[^"]*"[^>]*>(.*?)</(?:div|span)>"#,
    )
    .ok()
});
static SEASON_SUFFIX: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\s*\d{4}-\d{4}\s*$").ok());
static YEAR_SUFFIX: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"\s*\d{4}\s*$").ok());
static URL_SEASON: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"-(\d{4}-\d{4})/?$").ok());
static SEASON_SPAN: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r#"(?s)<span[^>]*class="[^"]*\bseason\b[^"]*"[^>]*>(.*?)</span>"#).ok()
});
static SEASON_RANGE: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"(\d{4}-\d{4})").ok());
static ISO_DATE: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"(\d{4}-\d{2}-\d{2})").ok());
static PLAYERS_SECTION: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r#"(?s)<div[^>]*class="[^"]*\bplayers\b[^"]*"[^>]*>(.*)"#).ok()
});
static TEAM_COLUMN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r#"(?s)<td[^>]*width="45%"[^>]*>(.*?)</td>"#).ok());
static PLAYER_LINK: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r#"(?s)<a[^>]*href="([^"]*/players/[^"]*)"[^>]*>(.*?)</a>"#).ok()
});

/// Footballia HTML adapter
pub struct FootballiaAdapter {
    settings: SourceSettings,
    client: reqwest::Client,
}

impl FootballiaAdapter {
    pub fn new(settings: SourceSettings) -> Result<Self, SourceError> {
        let client = build_client(Duration::from_secs(settings.timeout_secs))?;
        Ok(Self { settings, client })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.settings.base_url.trim_end_matches('/'), path)
    }

    /// Collect match paths from every listing page of one team
    async fn list_match_paths(
        &self,
        team_slug: &str,
        min_year: i32,
        max_year: i32,
    ) -> Result<BTreeSet<String>, SourceError> {
        let page_url = |page: u32| self.url(&format!("/teams/{}?page={}", team_slug, page));

        let first = match get_text(&self.client, &page_url(1)).await {
            Ok(html) => html,
            Err(e) if !e.is_transient() => {
                warn!(team_slug, error = %e, "Skipping team without a listing page");
                return Ok(BTreeSet::new());
            }
            Err(e) => return Err(e),
        };
        let pages = parse_page_count(&first);
        info!(team_slug, pages, "Listing team pages");

        let mut paths: BTreeSet<String> = parse_match_links(&first, min_year, max_year)
            .into_iter()
            .collect();

        for page in 2..=pages {
            self.settings.politeness.pause().await;
            let html = match get_text(&self.client, &page_url(page)).await {
                Ok(html) => html,
                Err(e) if !e.is_transient() => {
                    warn!(team_slug, page, error = %e, "Skipping listing page");
                    continue;
                }
                Err(e) => return Err(e),
            };
            let found = parse_match_links(&html, min_year, max_year);
            debug!(team_slug, page, links = found.len(), "Parsed listing page");
            paths.extend(found);
        }

        Ok(paths)
    }
}

#[async_trait]
impl SourceAdapter for FootballiaAdapter {
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
        let mut paths = BTreeSet::new();
        for team in team_names {
            let slug = slugify(team);
            if slug.is_empty() {
                warn!(team = %team, "Team name has no usable slug");
                continue;
            }
            let found = self
                .list_match_paths(&slug, date_from.year(), date_to.year())
                .await?;
            info!(team_slug = %slug, links = found.len(), "Collected match links");
            paths.extend(found);
            self.settings.politeness.pause().await;
        }

        let mut events = Vec::new();
        for path in &paths {
            let Some(match_id) = match_id_from_path(path) else {
                warn!(path = %path, "Link without a match id");
                continue;
            };

            self.settings.politeness.pause().await;
            let url = self.url(&format!("/matches/{}", match_id));
            let html = match get_text(&self.client, &url).await {
                Ok(html) => html,
                Err(e) if !e.is_transient() => {
                    warn!(match_id = %match_id, error = %e, "Skipping unreachable match page");
                    continue;
                }
                Err(e) => return Err(e),
            };

            let event = match parse_event(&html, &match_id) {
                Ok(event) => event,
                Err(e) => {
                    warn!(match_id = %match_id, error = %e, "Skipping match page");
                    continue;
                }
            };
            if !event.within(date_from, date_to) {
                debug!(match_id = %match_id, date = %event.date, "Match outside date range");
                continue;
            }
            events.push(event);
        }

        info!(events = events.len(), "Listed events");
        Ok(events)
    }

    async fn list_participations(
        &self,
        source_event_id: &str,
    ) -> Result<Vec<ParticipationDescriptor>, SourceError> {
        let html = get_text(&self.client, &self.url(&format!("/matches/{}", source_event_id))).await?;
        let home = extract_team(&html, &HOME_TEAM);
        let away = extract_team(&html, &AWAY_TEAM);
        parse_lineups(&html, &home, &away)
    }
}

// ============================================================================
// Parsing
// ============================================================================

/// Highest page number in the pagination list (1 when absent)
pub fn parse_page_count(html: &str) -> u32 {
    let Some(block) = capture(&PAGINATION, html) else {
        return 1;
    };
    let Some(re) = PAGE_NUMBER.as_ref() else {
        return 1;
    };
    re.captures_iter(block)
        .filter_map(|c| c.get(1)?.as_str().parse::<u32>().ok())
        .max()
        .unwrap_or(1)
}

/// Match paths on one listing page whose season starts within the year range
pub fn parse_match_links(html: &str, min_year: i32, max_year: i32) -> Vec<String> {
    let Some(row_re) = ROW.as_ref() else {
        return Vec::new();
    };

    let mut links = Vec::new();
    for row in row_re.captures_iter(html).filter_map(|c| c.get(1)) {
        let row = row.as_str();

        if let Some(start) = capture(&SEASON_CELL, row).and_then(|s| season_start_year(&strip_tags(s))) {
            if start < min_year || start > max_year {
                continue;
            }
        }

        let href = capture(&MATCH_CELL, row)
            .and_then(|cell| capture(&HIDDEN_XS, cell))
            .and_then(|div| capture(&HREF, div));
        if let Some(href) = href {
            links.push(href.to_string());
        }
    }
    links
}

/// Leading four-digit year of a season label such as "1998-1999"
pub fn season_start_year(season: &str) -> Option<i32> {
    let digits: String = season.trim().chars().take(4).collect();
    if digits.len() == 4 && digits.chars().all(|c| c.is_ascii_digit()) {
        digits.parse().ok()
    } else {
        None
    }
}

/// Match id is everything after "/matches/"
pub fn match_id_from_path(path: &str) -> Option<String> {
    let (_, id) = path.trim_end_matches('/').split_once("/matches/")?;
    (!id.is_empty()).then(|| id.to_string())
}

fn extract_team(html: &str, re: &LazyLock<Option<Regex>>) -> TeamDescriptor {
    let Some(inner) = capture(re, html) else {
        return TeamDescriptor::new(SOURCE_NAME, "unknown", "Unknown");
    };
    let name = strip_tags(inner);
    let id = capture(&TEAM_HREF, inner)
        .filter(|slug| !slug.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| slugify(&name));
    let name = if name.is_empty() { "Unknown".to_string() } else { name };
    TeamDescriptor::new(SOURCE_NAME, id, name)
}

/// Parse a match page into an event descriptor
pub fn parse_event(html: &str, match_id: &str) -> Result<EventDescriptor, SourceError> {
    let date = extract_match_date(html)
        .ok_or_else(|| SourceError::Malformed(format!("match {} has no date", match_id)))?;

    let season = capture(&URL_SEASON, match_id)
        .map(str::to_string)
        .or_else(|| {
            capture(&SEASON_SPAN, html)
                .map(strip_tags)
                .and_then(|text| capture(&SEASON_RANGE, &text).map(str::to_string))
        });

    Ok(EventDescriptor {
        source: SOURCE_NAME.to_string(),
        source_event_id: match_id.to_string(),
        date,
        season,
        competition: extract_competition(html),
        home: extract_team(html, &HOME_TEAM),
        away: extract_team(html, &AWAY_TEAM),
    })
}

fn extract_match_date(html: &str) -> Option<NaiveDate> {
    let candidates = [
        capture(&PLAYING_DATE_ATTR, html).map(str::to_string),
        capture(&PLAYING_DATE_TEXT, html).map(strip_tags),
        capture(&START_DATE_META, html).map(str::to_string),
        capture(&START_DATE_TIME, html).map(str::to_string),
    ];
    candidates
        .into_iter()
        .flatten()
        .find_map(|raw| parse_flexible_date(&raw))
}

/// Parse the date formats seen on match pages
pub fn parse_flexible_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    for fmt in ["%Y-%m-%d", "%d/%m/%Y", "%d-%m-%Y", "%d %B %Y", "%d %b %Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(raw, fmt) {
            return Some(date);
        }
    }
    capture(&ISO_DATE, raw).and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
}

fn extract_competition(html: &str) -> Option<String> {
    let text = strip_tags(capture(&COMPETITION, html)?);
    let text = match SEASON_SUFFIX.as_ref() {
        Some(re) => re.replace(&text, "").into_owned(),
        None => text,
    };
    let text = match YEAR_SUFFIX.as_ref() {
        Some(re) => re.replace(&text, "").into_owned(),
        None => text,
    };
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

/// Parse both lineups; columns alternate home, away
pub fn parse_lineups(
    html: &str,
    home: &TeamDescriptor,
    away: &TeamDescriptor,
) -> Result<Vec<ParticipationDescriptor>, SourceError> {
    let section = capture(&PLAYERS_SECTION, html)
        .ok_or_else(|| SourceError::Malformed("lineup section missing".to_string()))?;
    let (Some(column_re), Some(player_re)) = (TEAM_COLUMN.as_ref(), PLAYER_LINK.as_ref()) else {
        return Ok(Vec::new());
    };

    let mut out = Vec::new();
    for (idx, column) in column_re.captures_iter(section).filter_map(|c| c.get(1)).enumerate() {
        let team = if idx % 2 == 0 { home } else { away };

        let mut listed = 0usize;
        for link in player_re.captures_iter(column.as_str()) {
            let (Some(href), Some(label)) = (link.get(1), link.get(2)) else {
                continue;
            };
            let name = strip_tags(label.as_str());
            if name.is_empty() {
                warn!(href = href.as_str(), "Skipping player link without a name");
                continue;
            }
            let player_id = href
                .as_str()
                .trim_end_matches('/')
                .split_once("/players/")
                .map(|(_, slug)| slug)
                .filter(|slug| !slug.is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| slugify(&name));

            let participant = ParticipantDescriptor::new(SOURCE_NAME, player_id, name);
            out.push(ParticipationDescriptor::new(
                participant,
                team.clone(),
                listed < STARTERS_PER_SIDE,
            ));
            listed += 1;
        }
    }

    Ok(out)
}
