use chrono::{DateTime, Utc};
use pooling_catalog::{
    paginate, CatalogSettings, CompatibleGroup, Group, GroupAction, GroupAdmin, GroupCatalog, GroupFilters,
    GroupRepository, GroupSummary, InMemoryGroupRepository, Page, SavedTripOutcome,
};
use pooling_core::events::EventPublisher;
use pooling_core::idempotency::{claim_or_conflict, IdempotencyGuard};
use pooling_core::payment::PaymentAdapter;
use pooling_core::{Clock, Identity, PoolError, PoolResult};
use pooling_membership::{
    all_pending_items, InMemoryInvitationRepository, InMemoryJoinRequestRepository, Invitation,
    InvitationCoordinator, InvitationSettings, InvitationTarget, InviteResponse, JoinRequest,
    JoinRequestCoordinator, JoinRequestView, NewInvitation, NewJoinRequest, PendingItems, VoteChoice,
};
use pooling_store::app_config::PoolingRules;
use pooling_trip::{
    Cancellation, ConfirmationCoordinator, ConfirmedTrip, Decision, InMemoryTripRepository, Payment,
    PaymentCoordinator, PaymentOrchestrator, PaymentPhase, PaymentSettings, PenaltyPolicy, TripDetails,
    TripStatusView,
};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::{FacadeError, FacadeResult};
use crate::requests::{
    CreateGroupBody, DecisionBody, EnhancedGroupsQuery, FinalizeBody, InitiateBody, InviteBody, JoinBody,
    JoinVoteBody, PaymentBody, PendingItemsQuery, PrecheckBody, ReasonBody, RespondInvitationBody, SaveTripBody,
};

const DEFAULT_PAGE_SIZE: usize = 9;

/// A user's catalog and when it was last asked for.
struct CatalogSession {
    catalog: Arc<GroupCatalog>,
    last_used: DateTime<Utc>,
}

/// Single entry point for every pooling operation exposed over HTTP.
///
/// Each call checks that the claimed user matches the resolved identity,
/// honours an optional caller idempotency key for mutations, and wraps
/// failures with the operation name.
pub struct PoolFacade {
    groups: Arc<dyn GroupRepository>,
    admin: GroupAdmin,
    invitations: InvitationCoordinator,
    join_requests: JoinRequestCoordinator,
    confirmation: ConfirmationCoordinator,
    payments: PaymentCoordinator,
    guard: Arc<dyn IdempotencyGuard>,
    clock: Arc<dyn Clock>,
    catalog_settings: CatalogSettings,
    idempotency_ttl_seconds: u64,
    /// One catalog per user so cached listings never cross sessions.
    /// Sessions idle for longer than the cache TTL are dropped.
    catalogs: Mutex<HashMap<String, CatalogSession>>,
}

impl PoolFacade {
    /// Wire every coordinator over in-memory stores.
    pub fn in_memory(
        rules: &PoolingRules,
        guard: Arc<dyn IdempotencyGuard>,
        events: Arc<dyn EventPublisher>,
        adapter: Arc<dyn PaymentAdapter>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let groups: Arc<dyn GroupRepository> = Arc::new(InMemoryGroupRepository::new());
        let trips = Arc::new(InMemoryTripRepository::new());

        let invitations = InvitationCoordinator::new(
            groups.clone(),
            Arc::new(InMemoryInvitationRepository::new()),
            events.clone(),
            clock.clone(),
            InvitationSettings {
                default_expiration_days: rules.invitation_expiration_days,
            },
        );
        let join_requests = JoinRequestCoordinator::new(
            groups.clone(),
            Arc::new(InMemoryJoinRequestRepository::new()),
            events.clone(),
            clock.clone(),
            rules.join_rejection,
        );
        let confirmation = ConfirmationCoordinator::new(groups.clone(), trips.clone(), events.clone(), clock.clone());
        let payments = PaymentCoordinator::new(
            trips,
            PaymentOrchestrator::new(adapter),
            guard.clone(),
            events,
            clock.clone(),
            PaymentSettings {
                partial_payment_grace: chrono::Duration::hours(rules.partial_payment_grace_hours as i64),
                penalty: PenaltyPolicy {
                    percent: rules.cancellation_penalty_percent,
                },
                decision: rules.decision,
                claim_ttl_seconds: rules.idempotency_ttl_seconds,
            },
        );

        Self {
            admin: GroupAdmin::new(groups.clone(), clock.clone()),
            groups,
            invitations,
            join_requests,
            confirmation,
            payments,
            guard,
            clock,
            catalog_settings: CatalogSettings {
                cache_ttl: chrono::Duration::seconds(rules.catalog_cache_ttl_seconds as i64),
                read_attempts: rules.read_retry_attempts,
                ..CatalogSettings::default()
            },
            idempotency_ttl_seconds: rules.idempotency_ttl_seconds,
            catalogs: Mutex::new(HashMap::new()),
        }
    }

    // ========================================================================
    // Plumbing
    // ========================================================================

    async fn catalog_for(&self, caller: &Identity) -> Arc<GroupCatalog> {
        let now = self.clock.now();
        let idle_limit = self.catalog_settings.cache_ttl;
        let mut catalogs = self.catalogs.lock().await;
        catalogs.retain(|_, session| now - session.last_used <= idle_limit);

        let session = catalogs.entry(caller.user_id.clone()).or_insert_with(|| CatalogSession {
            catalog: Arc::new(GroupCatalog::new(
                self.groups.clone(),
                self.clock.clone(),
                self.catalog_settings.clone(),
                Some(caller.user_id.clone()),
            )),
            last_used: now,
        });
        session.last_used = now;
        session.catalog.clone()
    }

    /// Drop the caller's cached listing after they changed a group.
    async fn refresh_catalog(&self, caller: &Identity) {
        let catalog = self
            .catalogs
            .lock()
            .await
            .get(&caller.user_id)
            .map(|session| session.catalog.clone());
        if let Some(catalog) = catalog {
            catalog.clear_cache().await;
        }
    }

    fn check_caller(
        operation: &'static str,
        caller: &Identity,
        claimed_user: Option<&str>,
        claimed_email: Option<&str>,
    ) -> FacadeResult<()> {
        caller.ensure_is(claimed_user).map_err(FacadeError::during(operation))?;
        match claimed_email.map(str::trim).filter(|e| !e.is_empty()) {
            Some(email) if !caller.email.matches_email(email) => Err(FacadeError::new(
                operation,
                PoolError::Forbidden(format!("caller {} cannot act for another email", caller.user_id)),
            )),
            _ => Ok(()),
        }
    }

    /// Run a mutation at most once per caller-supplied key. The key is
    /// released when the mutation fails so the caller may retry.
    async fn mutate<T, Fut>(
        &self,
        operation: &'static str,
        caller: &Identity,
        idempotency_key: Option<&str>,
        call: Fut,
    ) -> FacadeResult<T>
    where
        Fut: Future<Output = PoolResult<T>>,
    {
        let scoped = idempotency_key
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(|k| format!("request:{}:{}:{}", caller.user_id, operation, k));

        if let Some(key) = &scoped {
            claim_or_conflict(self.guard.as_ref(), key, self.idempotency_ttl_seconds)
                .await
                .map_err(FacadeError::during(operation))?;
        }

        match call.await {
            Ok(value) => Ok(value),
            Err(e) => {
                if let Some(key) = &scoped {
                    if let Err(release) = self.guard.release(key).await {
                        tracing::error!("Failed to release idempotency key {}: {}", key, release);
                    }
                }
                Err(FacadeError::new(operation, e))
            }
        }
    }

    // ========================================================================
    // Groups
    // ========================================================================

    pub async fn list_enhanced_groups(
        &self,
        caller: &Identity,
        query: EnhancedGroupsQuery,
    ) -> FacadeResult<Page<GroupSummary>> {
        const OP: &str = "list_enhanced_groups";
        Self::check_caller(OP, caller, query.user_id.as_deref(), None)?;

        let catalog = self.catalog_for(caller).await;
        let mut filters = query.filters();
        filters.user_id = Some(caller.user_id.clone());

        let unfiltered = GroupFilters {
            user_id: filters.user_id.clone(),
            ..GroupFilters::default()
        };
        let groups = if filters == unfiltered {
            catalog.get_cached(query.refresh).await
        } else {
            catalog.list_enhanced(&filters).await
        }
        .map_err(FacadeError::during(OP))?;

        Ok(paginate(
            &groups,
            query.page.unwrap_or(1),
            query.page_size.unwrap_or(DEFAULT_PAGE_SIZE),
        ))
    }

    pub async fn precheck(&self, caller: &Identity, body: PrecheckBody) -> FacadeResult<Vec<CompatibleGroup>> {
        const OP: &str = "precheck";
        Self::check_caller(OP, caller, body.user_id.as_deref(), None)?;
        let catalog = self.catalog_for(caller).await;
        catalog
            .precheck(&body.preferences)
            .await
            .map_err(FacadeError::during(OP))
    }

    pub async fn create_group_with_trip(
        &self,
        caller: &Identity,
        idempotency_key: Option<&str>,
        body: CreateGroupBody,
    ) -> FacadeResult<Group> {
        const OP: &str = "create_group_with_trip";
        Self::check_caller(OP, caller, body.user_id.as_deref(), None)?;
        let group = self
            .mutate(OP, caller, idempotency_key, self.admin.create_group_with_trip(caller, body.group))
            .await?;
        self.refresh_catalog(caller).await;
        Ok(group)
    }

    pub async fn groups_created_by(&self, caller: &Identity, user_id: &str) -> FacadeResult<Vec<GroupSummary>> {
        const OP: &str = "groups_created_by";
        Self::check_caller(OP, caller, Some(user_id), None)?;
        let catalog = self.catalog_for(caller).await;
        catalog
            .list_created_by(&caller.user_id)
            .await
            .map_err(FacadeError::during(OP))
    }

    pub async fn save_trip(
        &self,
        caller: &Identity,
        idempotency_key: Option<&str>,
        group_id: Uuid,
        body: SaveTripBody,
    ) -> FacadeResult<SavedTripOutcome> {
        const OP: &str = "save_trip";
        Self::check_caller(OP, caller, body.user_id.as_deref(), None)?;
        self.mutate(
            OP,
            caller,
            idempotency_key,
            self.admin.save_trip(caller, group_id, body.trip_id, body.trip_data),
        )
        .await
    }

    pub async fn finalize_group(
        &self,
        caller: &Identity,
        idempotency_key: Option<&str>,
        group_id: Uuid,
        body: FinalizeBody,
    ) -> FacadeResult<Group> {
        const OP: &str = "finalize_group";
        Self::check_caller(OP, caller, body.user_id.as_deref(), None)?;
        let action: GroupAction = body.action.parse().map_err(FacadeError::during(OP))?;
        let group = self
            .mutate(
                OP,
                caller,
                idempotency_key,
                self.admin.finalize(caller, group_id, action, body.reason),
            )
            .await?;
        self.refresh_catalog(caller).await;
        Ok(group)
    }

    // ========================================================================
    // Join requests
    // ========================================================================

    pub async fn request_join(
        &self,
        caller: &Identity,
        idempotency_key: Option<&str>,
        group_id: Uuid,
        body: JoinBody,
    ) -> FacadeResult<JoinRequest> {
        const OP: &str = "request_join";
        Self::check_caller(OP, caller, body.user_id.as_deref(), body.user_email.as_deref())?;
        let request = NewJoinRequest {
            group_id,
            message: body.message,
            profile: body.user_profile,
        };
        self.mutate(OP, caller, idempotency_key, self.join_requests.submit(caller, request))
            .await
    }

    pub async fn vote_on_join_request(
        &self,
        caller: &Identity,
        idempotency_key: Option<&str>,
        group_id: Uuid,
        requester_id: &str,
        body: JoinVoteBody,
    ) -> FacadeResult<JoinRequest> {
        const OP: &str = "vote_on_join_request";
        Self::check_caller(OP, caller, body.user_id.as_deref(), None)?;
        self.mutate(OP, caller, idempotency_key, async {
            let request = self.join_requests.find_pending(group_id, requester_id).await?;
            self.join_requests
                .vote(
                    caller,
                    group_id,
                    request.id,
                    VoteChoice::from_approved(body.approved),
                    body.comment,
                )
                .await
        })
        .await
    }

    pub async fn pending_join_requests(
        &self,
        caller: &Identity,
        claimed_user: Option<&str>,
        group_id: Uuid,
    ) -> FacadeResult<Vec<JoinRequestView>> {
        const OP: &str = "pending_join_requests";
        Self::check_caller(OP, caller, claimed_user, None)?;
        self.join_requests
            .list_pending(caller, group_id)
            .await
            .map_err(FacadeError::during(OP))
    }

    pub async fn all_pending_items(&self, caller: &Identity, query: PendingItemsQuery) -> FacadeResult<PendingItems> {
        const OP: &str = "all_pending_items";
        Self::check_caller(OP, caller, query.user_id.as_deref(), query.email.as_deref())?;
        all_pending_items(&self.invitations, &self.join_requests, caller)
            .await
            .map_err(FacadeError::during(OP))
    }

    // ========================================================================
    // Invitations
    // ========================================================================

    pub async fn invite(
        &self,
        caller: &Identity,
        idempotency_key: Option<&str>,
        group_id: Uuid,
        body: InviteBody,
    ) -> FacadeResult<Invitation> {
        const OP: &str = "invite";
        Self::check_caller(OP, caller, body.user_id.as_deref(), None)?;
        let target = InvitationTarget::from_parts(body.invited_user_id, body.invited_email)
            .map_err(FacadeError::during(OP))?;
        let request = NewInvitation {
            group_id,
            target,
            message: body.message,
            expiration_days: body.expiration_days,
        };
        self.mutate(OP, caller, idempotency_key, self.invitations.invite(caller, request))
            .await
    }

    pub async fn list_invitations(&self, caller: &Identity, user_id: &str) -> FacadeResult<Vec<Invitation>> {
        const OP: &str = "list_invitations";
        Self::check_caller(OP, caller, Some(user_id), None)?;
        self.invitations
            .list_for_user(caller)
            .await
            .map_err(FacadeError::during(OP))
    }

    pub async fn respond_to_invitation(
        &self,
        caller: &Identity,
        idempotency_key: Option<&str>,
        body: RespondInvitationBody,
    ) -> FacadeResult<Invitation> {
        const OP: &str = "respond_to_invitation";
        Self::check_caller(OP, caller, body.user_id.as_deref(), body.user_email.as_deref())?;
        let response: InviteResponse = body.action.parse().map_err(FacadeError::during(OP))?;
        let invitation = self
            .mutate(
                OP,
                caller,
                idempotency_key,
                self.invitations.respond(caller, body.invitation_id, response, body.message),
            )
            .await?;
        self.refresh_catalog(caller).await;
        Ok(invitation)
    }

    // ========================================================================
    // Confirmation
    // ========================================================================

    pub async fn initiate_confirmation(
        &self,
        caller: &Identity,
        idempotency_key: Option<&str>,
        body: InitiateBody,
    ) -> FacadeResult<ConfirmedTrip> {
        const OP: &str = "initiate_confirmation";
        Self::check_caller(OP, caller, body.user_id.as_deref(), None)?;
        self.mutate(OP, caller, idempotency_key, self.confirmation.initiate(caller, body.trip))
            .await
    }

    pub async fn confirm_participation(
        &self,
        caller: &Identity,
        idempotency_key: Option<&str>,
        trip_id: Uuid,
        claimed_user: Option<&str>,
    ) -> FacadeResult<ConfirmedTrip> {
        const OP: &str = "confirm_participation";
        Self::check_caller(OP, caller, claimed_user, None)?;
        self.mutate(
            OP,
            caller,
            idempotency_key,
            self.confirmation.confirm_participation(caller, trip_id),
        )
        .await
    }

    pub async fn confirmation_status(
        &self,
        caller: &Identity,
        claimed_user: Option<&str>,
        trip_id: Uuid,
    ) -> FacadeResult<TripStatusView> {
        const OP: &str = "confirmation_status";
        Self::check_caller(OP, caller, claimed_user, None)?;
        self.confirmation
            .status(caller, trip_id)
            .await
            .map_err(FacadeError::during(OP))
    }

    pub async fn confirmation_details(
        &self,
        caller: &Identity,
        claimed_user: Option<&str>,
        trip_id: Uuid,
    ) -> FacadeResult<TripDetails> {
        const OP: &str = "confirmation_details";
        Self::check_caller(OP, caller, claimed_user, None)?;
        self.confirmation
            .details(caller, trip_id)
            .await
            .map_err(FacadeError::during(OP))
    }

    pub async fn cancel_confirmation(
        &self,
        caller: &Identity,
        idempotency_key: Option<&str>,
        trip_id: Uuid,
        body: ReasonBody,
    ) -> FacadeResult<ConfirmedTrip> {
        const OP: &str = "cancel_confirmation";
        Self::check_caller(OP, caller, body.user_id.as_deref(), None)?;
        self.mutate(
            OP,
            caller,
            idempotency_key,
            self.confirmation.cancel(caller, trip_id, body.reason),
        )
        .await
    }

    // ========================================================================
    // Payments
    // ========================================================================

    pub async fn pay(
        &self,
        caller: &Identity,
        idempotency_key: Option<&str>,
        trip_id: Uuid,
        phase: PaymentPhase,
        body: PaymentBody,
    ) -> FacadeResult<Payment> {
        let operation = match phase {
            PaymentPhase::Upfront => "pay_upfront",
            PaymentPhase::Final => "pay_final",
        };
        Self::check_caller(operation, caller, body.user_id.as_deref(), None)?;
        let call = async {
            match phase {
                PaymentPhase::Upfront => self.payments.pay_upfront(caller, trip_id, body.payment).await,
                PaymentPhase::Final => self.payments.pay_final(caller, trip_id, body.payment).await,
            }
        };
        self.mutate(operation, caller, idempotency_key, call).await
    }

    pub async fn vote_on_decision(
        &self,
        caller: &Identity,
        idempotency_key: Option<&str>,
        trip_id: Uuid,
        body: DecisionBody,
    ) -> FacadeResult<ConfirmedTrip> {
        const OP: &str = "vote_on_decision";
        Self::check_caller(OP, caller, body.user_id.as_deref(), None)?;
        let decision: Decision = body.decision.parse().map_err(FacadeError::during(OP))?;
        self.mutate(
            OP,
            caller,
            idempotency_key,
            self.payments.vote_on_decision(caller, trip_id, decision, body.reason),
        )
        .await
    }

    pub async fn cancel_participation(
        &self,
        caller: &Identity,
        idempotency_key: Option<&str>,
        trip_id: Uuid,
        body: ReasonBody,
    ) -> FacadeResult<Cancellation> {
        const OP: &str = "cancel_participation";
        Self::check_caller(OP, caller, body.user_id.as_deref(), None)?;
        self.mutate(
            OP,
            caller,
            idempotency_key,
            self.payments.cancel_participation(caller, trip_id, body.reason),
        )
        .await
    }

    // ========================================================================
    // Maintenance
    // ========================================================================

    /// Materialize lapsed confirmation windows and invitations.
    /// Returns (trips, invitations) expired.
    pub async fn sweep_expired(&self) -> PoolResult<(usize, usize)> {
        let trips = self.confirmation.sweep_expired().await?;
        let invitations = self.invitations.sweep_expired().await?;
        Ok((trips, invitations))
    }
}
