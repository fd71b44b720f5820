//! Declarative edge filter and its SQL compilation.

use rusqlite::types::Value;
use serde::{Deserialize, Serialize};

use super::GraphError;

/// Every recognized edge filter option with its default
///
/// Optional lists restrict to the listed values; `None` means "any".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterSpec {
    /// Internal event ids
    pub event_ids: Option<Vec<i64>>,
    pub competitions: Option<Vec<String>>,
    /// Minimum number of shared events for a pair to be kept
    pub min_weight: u64,
    /// Participations with unknown minutes never pass this filter
    pub min_minutes: Option<i64>,
    pub starters_only: bool,
    pub positions: Option<Vec<String>>,
    pub nationalities: Option<Vec<String>>,
    /// Case-insensitive substring of the participant name
    pub name_query: Option<String>,
    pub same_team_only: bool,
}

impl Default for FilterSpec {
    fn default() -> Self {
        Self {
            event_ids: None,
            competitions: None,
            min_weight: 1,
            min_minutes: None,
            starters_only: false,
            positions: None,
            nationalities: None,
            name_query: None,
            same_team_only: false,
        }
    }
}

fn non_empty<T>(option: &str, list: &Option<Vec<T>>) -> Result<(), GraphError> {
    match list {
        Some(values) if values.is_empty() => Err(GraphError::InvalidFilter(format!(
            "{} was given but lists nothing",
            option
        ))),
        _ => Ok(()),
    }
}

/// Escape LIKE wildcards so the query matches literally
fn like_pattern(query: &str) -> String {
    let mut pattern = String::with_capacity(query.len() + 2);
    pattern.push('%');
    for ch in query.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(ch);
    }
    pattern.push('%');
    pattern
}

fn push_in<T: Clone + Into<Value>>(
    clauses: &mut Vec<String>,
    params: &mut Vec<Value>,
    column: &str,
    values: &[T],
) {
    let marks = vec!["?"; values.len()].join(", ");
    clauses.push(format!("{} IN ({})", column, marks));
    params.extend(values.iter().cloned().map(Into::into));
}

impl FilterSpec {
    /// Reject contradictory options before any query runs
    pub fn validate(&self) -> Result<(), GraphError> {
        non_empty("event_ids", &self.event_ids)?;
        non_empty("competitions", &self.competitions)?;
        non_empty("positions", &self.positions)?;
        non_empty("nationalities", &self.nationalities)?;

        if self.min_weight == 0 {
            return Err(GraphError::InvalidFilter(
                "min_weight must be at least 1".to_string(),
            ));
        }
        if matches!(self.min_minutes, Some(m) if m < 0) {
            return Err(GraphError::InvalidFilter(
                "min_minutes cannot be negative".to_string(),
            ));
        }
        if matches!(&self.name_query, Some(q) if q.trim().is_empty()) {
            return Err(GraphError::InvalidFilter("name_query is blank".to_string()));
        }
        Ok(())
    }

    /// Edge query plus its positional parameters
    ///
    /// The CTE keeps qualifying participations; the self-join on event
    /// with `a1 < a2` emits each unordered pair once per shared event.
    pub(crate) fn to_sql(&self) -> (String, Vec<Value>) {
        let mut clauses: Vec<String> = Vec::new();
        let mut params: Vec<Value> = Vec::new();

        if let Some(ids) = &self.event_ids {
            push_in(&mut clauses, &mut params, "pa.event_id", ids);
        }
        if let Some(competitions) = &self.competitions {
            push_in(&mut clauses, &mut params, "e.competition", competitions);
        }
        if let Some(min) = self.min_minutes {
            clauses.push("pa.minutes >= ?".to_string());
            params.push(Value::Integer(min));
        }
        if self.starters_only {
            clauses.push("pa.is_starter = 1".to_string());
        }
        if let Some(positions) = &self.positions {
            push_in(&mut clauses, &mut params, "pa.position", positions);
        }
        if let Some(nationalities) = &self.nationalities {
            push_in(&mut clauses, &mut params, "p.nationality", nationalities);
        }
        if let Some(query) = &self.name_query {
            clauses.push("p.name LIKE ? ESCAPE '\\'".to_string());
            params.push(Value::Text(like_pattern(query.trim())));
        }

        let where_sql = if clauses.is_empty() {
            "1 = 1".to_string()
        } else {
            clauses.join(" AND ")
        };
        let team_cond = if self.same_team_only {
            "AND a1.team_id = a2.team_id"
        } else {
            ""
        };

        let sql = format!(
            "WITH filtered AS (
                 SELECT pa.event_id, pa.participant_id, pa.team_id
                 FROM participations pa
                 JOIN participants p ON p.id = pa.participant_id
                 JOIN events e       ON e.id = pa.event_id
                 WHERE {where_sql}
             )
             SELECT a1.participant_id, a2.participant_id, COUNT(*) AS weight
             FROM filtered a1
             JOIN filtered a2
               ON a1.event_id = a2.event_id
              AND a1.participant_id < a2.participant_id
              {team_cond}
             GROUP BY a1.participant_id, a2.participant_id
             HAVING COUNT(*) >= ?
             ORDER BY a1.participant_id, a2.participant_id"
        );
        params.push(Value::Integer(self.min_weight.min(i64::MAX as u64) as i64));

        (sql, params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter_is_valid() {
        let filter = FilterSpec::default();
        assert_eq!(filter.min_weight, 1);
        assert!(filter.validate().is_ok());
    }

    #[test]
    fn test_contradictory_filters() {
        let cases = [
            FilterSpec { event_ids: Some(vec![]), ..Default::default() },
            FilterSpec { competitions: Some(vec![]), ..Default::default() },
            FilterSpec { positions: Some(vec![]), ..Default::default() },
            FilterSpec { nationalities: Some(vec![]), ..Default::default() },
            FilterSpec { min_weight: 0, ..Default::default() },
            FilterSpec { min_minutes: Some(-1), ..Default::default() },
            FilterSpec { name_query: Some("  ".to_string()), ..Default::default() },
        ];
        for filter in cases {
            assert!(
                matches!(filter.validate(), Err(GraphError::InvalidFilter(_))),
                "{:?} should be rejected",
                filter
            );
        }
    }

    #[test]
    fn test_sql_parameters_follow_clause_order() {
        let filter = FilterSpec {
            event_ids: Some(vec![3, 4]),
            min_minutes: Some(45),
            starters_only: true,
            name_query: Some("50%_off".to_string()),
            same_team_only: true,
            min_weight: 2,
            ..Default::default()
        };
        let (sql, params) = filter.to_sql();

        assert!(sql.contains("pa.event_id IN (?, ?)"));
        assert!(sql.contains("pa.is_starter = 1"));
        assert!(sql.contains("a1.team_id = a2.team_id"));
        assert_eq!(
            params,
            vec![
                Value::Integer(3),
                Value::Integer(4),
                Value::Integer(45),
                Value::Text("%50\\%\\_off%".to_string()),
                Value::Integer(2),
            ]
        );
    }

    #[test]
    fn test_filter_deserializes_with_defaults() {
        let filter: FilterSpec = serde_json::from_str(r#"{"starters_only": true}"#).unwrap();
        assert!(filter.starters_only);
        assert_eq!(filter.min_weight, 1);
        assert!(filter.event_ids.is_none());
    }
}
