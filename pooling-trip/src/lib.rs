pub mod models;
pub mod policy;
pub mod repository;
pub mod orchestrator;
pub mod confirmation;
pub mod payments;

pub use models::{
    Cancellation, ConfirmedTrip, Decision, Payment, PaymentPhase, PaymentRecordStatus, TripChange, TripStatus,
    TripTerms, TripWindow, MAX_AMOUNT, MAX_CONFIRMATION_HOURS,
};
pub use policy::{DecisionPolicy, DecisionRule, PenaltyPolicy};
pub use repository::{require_trip, InMemoryTripRepository, TripRepository};
pub use orchestrator::{MockPaymentAdapter, PaymentOrchestrator};
pub use confirmation::{ConfirmationCoordinator, InitiateConfirmation, TripDetails, TripStatusView};
pub use payments::{PaymentCoordinator, PaymentDetails, PaymentSettings};
