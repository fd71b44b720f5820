//! Source-neutral descriptors.
//!
//! Every adapter translates its native representation into these shapes.
//! They carry natural keys only; internal row identifiers are assigned by
//! the store.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// The (source, source-local id) pair identifying an entity across re-ingestion
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NaturalKey {
    pub source: String,
    pub source_id: String,
}

impl NaturalKey {
    pub fn new(source: impl Into<String>, source_id: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            source_id: source_id.into(),
        }
    }
}

impl fmt::Display for NaturalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.source, self.source_id)
    }
}

/// A team as seen by one source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamDescriptor {
    /// Source name (e.g. "statsbomb")
    pub source: String,

    /// Source-local team identifier
    pub source_team_id: String,

    /// Display name
    pub name: String,

    /// Country, if the source knows it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
}

impl TeamDescriptor {
    pub fn new(
        source: impl Into<String>,
        source_team_id: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            source_team_id: source_team_id.into(),
            name: name.into(),
            country: None,
        }
    }

    pub fn with_country(mut self, country: impl Into<String>) -> Self {
        self.country = Some(country.into());
        self
    }

    pub fn natural_key(&self) -> NaturalKey {
        NaturalKey::new(&self.source, &self.source_team_id)
    }
}

/// A player as seen by one source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantDescriptor {
    pub source: String,
    pub source_participant_id: String,
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub birth_date: Option<NaiveDate>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nationality: Option<String>,
}

impl ParticipantDescriptor {
    pub fn new(
        source: impl Into<String>,
        source_participant_id: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            source_participant_id: source_participant_id.into(),
            name: name.into(),
            birth_date: None,
            nationality: None,
        }
    }

    pub fn with_nationality(mut self, nationality: impl Into<String>) -> Self {
        self.nationality = Some(nationality.into());
        self
    }

    pub fn with_birth_date(mut self, birth_date: NaiveDate) -> Self {
        self.birth_date = Some(birth_date);
        self
    }

    pub fn natural_key(&self) -> NaturalKey {
        NaturalKey::new(&self.source, &self.source_participant_id)
    }
}

/// A match between two teams
///
/// This is also the line format of a pre-resolved events file (one JSON
/// object per line).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventDescriptor {
    pub source: String,
    pub source_event_id: String,

    /// Match date
    pub date: NaiveDate,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub season: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub competition: Option<String>,

    pub home: TeamDescriptor,
    pub away: TeamDescriptor,
}

impl EventDescriptor {
    pub fn natural_key(&self) -> NaturalKey {
        NaturalKey::new(&self.source, &self.source_event_id)
    }

    /// Home and away must be different teams
    pub fn has_distinct_sides(&self) -> bool {
        self.home.natural_key() != self.away.natural_key()
    }

    /// Inclusive date-range membership
    pub fn within(&self, from: NaiveDate, to: NaiveDate) -> bool {
        self.date >= from && self.date <= to
    }

    /// Short "Home vs Away (date)" label for logs
    pub fn label(&self) -> String {
        format!("{} vs {} ({})", self.home.name, self.away.name, self.date)
    }
}

/// One player's appearance in one match
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipationDescriptor {
    pub participant: ParticipantDescriptor,

    /// The side the player appeared for
    pub team: TeamDescriptor,

    pub is_starter: bool,

    /// Minutes played; some sources never populate this
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minutes: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<String>,
}

impl ParticipationDescriptor {
    pub fn new(participant: ParticipantDescriptor, team: TeamDescriptor, is_starter: bool) -> Self {
        Self {
            participant,
            team,
            is_starter,
            minutes: None,
            position: None,
        }
    }

    pub fn with_minutes(mut self, minutes: u32) -> Self {
        self.minutes = Some(minutes);
        self
    }

    pub fn with_position(mut self, position: impl Into<String>) -> Self {
        self.position = Some(position.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(home_id: &str, away_id: &str) -> EventDescriptor {
        EventDescriptor {
            source: "test".to_string(),
            source_event_id: "1".to_string(),
            date: NaiveDate::from_ymd_opt(2020, 5, 1).unwrap(),
            season: None,
            competition: None,
            home: TeamDescriptor::new("test", home_id, "Home"),
            away: TeamDescriptor::new("test", away_id, "Away"),
        }
    }

    #[test]
    fn test_distinct_sides() {
        assert!(event("a", "b").has_distinct_sides());
        assert!(!event("a", "a").has_distinct_sides());
    }

    #[test]
    fn test_date_range_is_inclusive() {
        let e = event("a", "b");
        let d = |m, day| NaiveDate::from_ymd_opt(2020, m, day).unwrap();
        assert!(e.within(d(5, 1), d(5, 1)));
        assert!(e.within(d(1, 1), d(12, 31)));
        assert!(!e.within(d(5, 2), d(12, 31)));
    }

    #[test]
    fn test_events_file_line_format() {
        let line = r#"{"source":"statsbomb","source_event_id":"3788741","date":"2020-06-11","competition":"UEFA Euro","home":{"source":"statsbomb","source_team_id":"914","name":"Turkey"},"away":{"source":"statsbomb","source_team_id":"909","name":"Italy"}}"#;
        let parsed: EventDescriptor = serde_json::from_str(line).unwrap();
        assert_eq!(parsed.natural_key(), NaturalKey::new("statsbomb", "3788741"));
        assert_eq!(parsed.season, None);
        assert_eq!(parsed.competition.as_deref(), Some("UEFA Euro"));
        assert_eq!(parsed.away.name, "Italy");
    }
}
