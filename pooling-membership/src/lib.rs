pub mod invitation;
pub mod join_request;
pub mod repository;
pub mod invitations;
pub mod admissions;
pub mod pending;

pub use invitation::{Invitation, InvitationStatus, InvitationTarget, InviteResponse, MAX_EXPIRATION_DAYS};
pub use join_request::{Admission, JoinRejectionPolicy, JoinRequest, JoinRequestStatus, VoteChoice};
pub use repository::{
    InMemoryInvitationRepository, InMemoryJoinRequestRepository, InvitationRepository, JoinRequestRepository,
};
pub use invitations::{InvitationCoordinator, InvitationSettings, NewInvitation};
pub use admissions::{JoinRequestCoordinator, JoinRequestView, NewJoinRequest};
pub use pending::{all_pending_items, PendingItems};
