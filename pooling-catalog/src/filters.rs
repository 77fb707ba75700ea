use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::group::{BudgetLevel, Group};

/// Optional listing filters. `user_id` only drives the viewer flags on the
/// returned summaries, it never narrows the result.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GroupFilters {
    pub user_id: Option<String>,
    pub base_city: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub budget_level: Option<BudgetLevel>,
    #[serde(default)]
    pub preferred_activities: Vec<String>,
}

impl GroupFilters {
    pub fn matches(&self, group: &Group) -> bool {
        if let Some(city) = &self.base_city {
            if !group.trip.base_city.trim().eq_ignore_ascii_case(city.trim()) {
                return false;
            }
        }

        if let Some(budget) = self.budget_level {
            if group.trip.budget_level != budget {
                return false;
            }
        }

        // Open-ended ranges: a missing bound never excludes.
        let start = self.start_date.unwrap_or(NaiveDate::MIN);
        let end = self.end_date.unwrap_or(NaiveDate::MAX);
        if group.trip.overlap_days(start, end) == 0 {
            return false;
        }

        if !self.preferred_activities.is_empty() {
            let shared = self.preferred_activities.iter().any(|wanted| {
                group
                    .trip
                    .preferred_activities
                    .iter()
                    .any(|a| a.eq_ignore_ascii_case(wanted))
            });
            if !shared {
                return false;
            }
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::group::fixtures::group;

    #[test]
    fn test_empty_filters_match_everything() {
        assert!(GroupFilters::default().matches(&group("ana", 4)));
    }

    #[test]
    fn test_city_match_is_case_insensitive() {
        let filters = GroupFilters {
            base_city: Some(" lisbon ".to_string()),
            ..Default::default()
        };
        assert!(filters.matches(&group("ana", 4)));

        let filters = GroupFilters {
            base_city: Some("Madrid".to_string()),
            ..Default::default()
        };
        assert!(!filters.matches(&group("ana", 4)));
    }

    #[test]
    fn test_date_range_matches_on_overlap() {
        let d = |m, day| NaiveDate::from_ymd_opt(2026, m, day);
        let overlapping = GroupFilters {
            start_date: d(6, 9),
            end_date: d(6, 30),
            ..Default::default()
        };
        assert!(overlapping.matches(&group("ana", 4)));

        let disjoint = GroupFilters {
            start_date: d(7, 1),
            ..Default::default()
        };
        assert!(!disjoint.matches(&group("ana", 4)));
    }

    #[test]
    fn test_any_shared_activity_matches() {
        let filters = GroupFilters {
            preferred_activities: vec!["diving".to_string(), "Food".to_string()],
            ..Default::default()
        };
        assert!(filters.matches(&group("ana", 4)));

        let filters = GroupFilters {
            preferred_activities: vec!["diving".to_string()],
            ..Default::default()
        };
        assert!(!filters.matches(&group("ana", 4)));
    }

    #[test]
    fn test_user_id_never_narrows() {
        let filters = GroupFilters {
            user_id: Some("stranger".to_string()),
            ..Default::default()
        };
        assert!(filters.matches(&group("ana", 4)));
    }
}
