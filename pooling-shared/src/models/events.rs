use uuid::Uuid;

pub const TOPIC_MEMBERSHIP: &str = "pooling.membership";
pub const TOPIC_CONFIRMATION: &str = "pooling.confirmation";
pub const TOPIC_PAYMENTS: &str = "pooling.payments";

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct JoinRequestResolvedEvent {
    pub request_id: Uuid,
    pub group_id: Uuid,
    pub requester_id: String,
    pub status: String,
    pub admitted: bool,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct InvitationRespondedEvent {
    pub invitation_id: Uuid,
    pub group_id: Uuid,
    pub invitee_id: String,
    pub status: String,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct TripStatusChangedEvent {
    pub confirmed_trip_id: Uuid,
    pub group_id: Uuid,
    pub status: String,
    pub confirmed_members: usize,
    pub reason: Option<String>,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct PaymentRecordedEvent {
    pub confirmed_trip_id: Uuid,
    pub member_id: String,
    pub phase: String,
    pub status: String,
    pub amount: i64,
    pub currency: String,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct ParticipationCancelledEvent {
    pub confirmed_trip_id: Uuid,
    pub member_id: String,
    pub penalty_amount: i64,
    pub refund_amount: i64,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct DecisionResolvedEvent {
    pub confirmed_trip_id: Uuid,
    pub outcome: String,
    pub continue_votes: usize,
    pub cancel_votes: usize,
    pub timestamp: i64,
}
