use chrono::NaiveDate;
use pooling_core::{PoolError, PoolResult};
use serde::{Deserialize, Serialize};

use crate::group::{BudgetLevel, Group, GroupStatus, GroupSummary, Visibility};

/// What a traveller is looking for before joining or creating a pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TripPreferences {
    pub base_city: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub budget_level: Option<BudgetLevel>,
    #[serde(default)]
    pub preferred_activities: Vec<String>,
    #[serde(default)]
    pub preferred_terrains: Vec<String>,
}

impl TripPreferences {
    pub fn validate(&self) -> PoolResult<()> {
        if self.base_city.trim().is_empty() {
            return Err(PoolError::Validation("base city is required".to_string()));
        }
        if self.end_date < self.start_date {
            return Err(PoolError::Validation("end date precedes start date".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CompatibleGroup {
    pub group: GroupSummary,
    pub score: u32,
    pub overlap_days: i64,
    pub shared_activities: Vec<String>,
    pub shared_terrains: Vec<String>,
}

// ============================================================================
// Scoring weights
// ============================================================================

const WEIGHT_PER_DAY: u32 = 2;
const WEIGHT_PER_ACTIVITY: u32 = 3;
const WEIGHT_PER_TERRAIN: u32 = 2;
const WEIGHT_BUDGET_MATCH: u32 = 5;

fn shared(wanted: &[String], offered: &[String]) -> Vec<String> {
    offered
        .iter()
        .filter(|o| wanted.iter().any(|w| w.eq_ignore_ascii_case(o)))
        .cloned()
        .collect()
}

/// Keep the open public groups a traveller could still join in the same
/// city and time frame, ranked by how well they fit.
pub fn score_candidates(
    groups: &[Group],
    preferences: &TripPreferences,
    viewer: Option<&str>,
) -> Vec<CompatibleGroup> {
    let mut candidates: Vec<CompatibleGroup> = groups
        .iter()
        .filter(|g| g.status == GroupStatus::Open && g.visibility == Visibility::Public && !g.is_full())
        .filter(|g| {
            g.trip
                .base_city
                .trim()
                .eq_ignore_ascii_case(preferences.base_city.trim())
        })
        .filter_map(|g| {
            let overlap_days = g.trip.overlap_days(preferences.start_date, preferences.end_date);
            if overlap_days == 0 {
                return None;
            }

            let shared_activities = shared(&preferences.preferred_activities, &g.trip.preferred_activities);
            let shared_terrains = shared(&preferences.preferred_terrains, &g.trip.preferred_terrains);
            let budget_match = preferences.budget_level == Some(g.trip.budget_level);

            let score = overlap_days as u32 * WEIGHT_PER_DAY
                + shared_activities.len() as u32 * WEIGHT_PER_ACTIVITY
                + shared_terrains.len() as u32 * WEIGHT_PER_TERRAIN
                + if budget_match { WEIGHT_BUDGET_MATCH } else { 0 };

            Some(CompatibleGroup {
                group: GroupSummary::from_group(g, viewer),
                score,
                overlap_days,
                shared_activities,
                shared_terrains,
            })
        })
        .collect();

    candidates.sort_by(|a, b| b.score.cmp(&a.score));
    candidates
}
