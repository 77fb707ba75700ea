use chrono::NaiveDate;
use pooling_catalog::{BudgetLevel, GroupFilters, NewGroup, TripPreferences};
use pooling_trip::{InitiateConfirmation, PaymentDetails};
use serde::Deserialize;
use uuid::Uuid;

// ============================================================================
// Query strings
// ============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnhancedGroupsQuery {
    pub user_id: Option<String>,
    pub base_city: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub budget_level: Option<BudgetLevel>,
    /// Comma separated.
    pub preferred_activities: Option<String>,
    pub page: Option<usize>,
    pub page_size: Option<usize>,
    #[serde(default)]
    pub refresh: bool,
}

impl EnhancedGroupsQuery {
    pub fn filters(&self) -> GroupFilters {
        GroupFilters {
            user_id: self.user_id.clone(),
            base_city: self.base_city.clone().filter(|c| !c.trim().is_empty()),
            start_date: self.start_date,
            end_date: self.end_date,
            budget_level: self.budget_level,
            preferred_activities: self
                .preferred_activities
                .as_deref()
                .unwrap_or_default()
                .split(',')
                .map(str::trim)
                .filter(|a| !a.is_empty())
                .map(str::to_string)
                .collect(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserQuery {
    pub user_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingItemsQuery {
    pub user_id: Option<String>,
    pub email: Option<String>,
}

// ============================================================================
// Group bodies
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrecheckBody {
    pub user_id: Option<String>,
    #[serde(flatten)]
    pub preferences: TripPreferences,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateGroupBody {
    pub user_id: Option<String>,
    #[serde(flatten)]
    pub group: NewGroup,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveTripBody {
    pub user_id: Option<String>,
    pub trip_id: String,
    #[serde(default)]
    pub trip_data: serde_json::Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalizeBody {
    pub user_id: Option<String>,
    pub action: String,
    pub reason: Option<String>,
}

// ============================================================================
// Membership bodies
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinBody {
    pub user_id: Option<String>,
    pub user_email: Option<String>,
    pub message: Option<String>,
    #[serde(default)]
    pub user_profile: serde_json::Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinVoteBody {
    pub user_id: Option<String>,
    pub approved: bool,
    pub comment: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InviteBody {
    pub user_id: Option<String>,
    pub invited_user_id: Option<String>,
    pub invited_email: Option<String>,
    pub message: Option<String>,
    pub expiration_days: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RespondInvitationBody {
    pub invitation_id: Uuid,
    pub user_id: Option<String>,
    pub user_email: Option<String>,
    pub action: String,
    pub message: Option<String>,
}

// ============================================================================
// Confirmation and payment bodies
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiateBody {
    pub user_id: Option<String>,
    #[serde(flatten)]
    pub trip: InitiateConfirmation,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberBody {
    pub user_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReasonBody {
    pub user_id: Option<String>,
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentBody {
    pub user_id: Option<String>,
    #[serde(flatten)]
    pub payment: PaymentDetails,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionBody {
    pub user_id: Option<String>,
    pub decision: String,
    pub reason: Option<String>,
}
