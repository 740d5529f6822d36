//! The bootstrap saga: an explicit event-driven state machine built on
//! `composable_rust_core::reducer::Reducer` and driven by
//! `composable_rust_runtime::Store` (`SPEC_FULL.md` §4.4).
//!
//! There's no external workflow engine in this stack, so durability comes
//! from the event log itself: every step the saga takes is first persisted as
//! a domain event via [`crate::store::EventStore::emit_domain_event`]. A
//! worker that reclaims a run left `processing` by a crashed prior worker
//! (`crate::queue::JobQueue::reclaim_orphaned`) doesn't resume in-memory
//! state — there isn't any — it rebuilds [`BootstrapState`] from the
//! `organizations` read model and its linked-entity junction events
//! ([`resume::reconstruct_state`]) and dispatches [`BootstrapAction::Resume`]
//! to pick the saga back up at whatever step it already reached.
//!
//! Forward activities and their compensations are both expressed as
//! [`Effect::Future`] closures — `composable_rust_core::effect::Effect` is
//! still the Phase 1 placeholder (`None`/`Parallel`/`Sequential`/`Delay`/`Future`
//! only, no dedicated `Database`/`Http` variants), so every side effect this
//! saga performs is a boxed future that calls out to the environment directly
//! and produces the next [`BootstrapAction`].

mod activities;
mod compensation;
mod resume;

pub use activities::{
    AdminInvite, BootstrapRequest, ContactGroup, ContactGroupSection, OrganizationType,
    PartnerType, SectionEntities,
};
pub use resume::{find_organization_id, reconstruct_state};

use std::sync::Arc;

use composable_rust_core::effect::Effect;
use composable_rust_core::environment::Clock;
use composable_rust_core::reducer::Reducer;
use uuid::Uuid;

use crate::providers::{DnsProvider, EmailProvider};
use crate::store::EventStore;

/// Where the saga currently is, used both to drive forward progress and to
/// know which compensations are owed if it fails (§4.4, §5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapStep {
    /// Not yet started.
    NotStarted,
    /// Creating the organization aggregate.
    CreatingOrganization,
    /// Creating the primary contact/address/phone entities.
    CreatingEntities,
    /// Configuring the organization's subdomain.
    ConfiguringDns,
    /// Waiting for the subdomain to resolve.
    VerifyingDns,
    /// Generating admin invitations.
    GeneratingInvitations,
    /// Emailing admin invitations.
    SendingInvitations,
    /// Marking the organization active.
    Activating,
    /// Finished successfully.
    Completed,
    /// Unwinding a prior step after a terminal failure.
    Compensating,
    /// Finished with a terminal, uncompensable failure.
    Failed,
}

/// The saga's state, rebuilt by replaying this reducer over the organization's
/// event stream (§4.4).
#[derive(Debug, Clone)]
pub struct BootstrapState {
    /// The request this run was started with.
    pub request: BootstrapRequest,
    /// A correlation id threaded through every event this run emits.
    pub correlation_id: Uuid,
    /// Current step.
    pub step: BootstrapStep,
    /// The organization aggregate id, once created.
    pub organization_id: Option<Uuid>,
    /// General Info's contact/address/phone ids, once created.
    pub general_entities: Option<SectionEntities>,
    /// Billing's contact/address/phone ids, once created (may equal
    /// `general_entities` when shared).
    pub billing_entities: Option<SectionEntities>,
    /// Provider Admin's contact/address/phone ids, once created (may equal
    /// `general_entities` when shared).
    pub provider_admin_entities: Option<SectionEntities>,
    /// The provisioned DNS record, once configured.
    pub dns_record: Option<crate::providers::DnsRecord>,
    /// How many times DNS verification has been attempted.
    pub dns_verify_attempts: u32,
    /// `(invitation_id, email)` pairs generated for admin invitees.
    pub invitations: Vec<(Uuid, String)>,
    /// The terminal error, if this run failed.
    pub error: Option<String>,
}

impl BootstrapState {
    /// Build the initial state for a fresh run.
    #[must_use]
    pub fn new(request: BootstrapRequest, correlation_id: Uuid) -> Self {
        Self {
            request,
            correlation_id,
            step: BootstrapStep::NotStarted,
            organization_id: None,
            general_entities: None,
            billing_entities: None,
            provider_admin_entities: None,
            dns_record: None,
            dns_verify_attempts: 0,
            invitations: Vec::new(),
            error: None,
        }
    }
}

/// Every transition the bootstrap saga can make. Variants come in
/// activity/outcome pairs: the reducer dispatches the activity as an effect,
/// and the effect's own future produces the matching outcome action.
#[derive(Debug, Clone)]
pub enum BootstrapAction {
    /// Begin a fresh run.
    Start,
    /// Continue a run whose `state` was rebuilt from the event log after a
    /// crash (§4.3, S5) — dispatches whatever activity `state.step` is
    /// already sitting at, rather than starting over from
    /// `create_organization`.
    Resume,
    /// The organization aggregate was created.
    OrganizationCreated { organization_id: Uuid },
    /// General Info, Billing and Provider Admin's contact/address/phone
    /// entities were created and fully linked.
    EntitiesCreated {
        general: SectionEntities,
        billing: SectionEntities,
        provider_admin: SectionEntities,
    },
    /// The subdomain was configured.
    DnsConfigured { record: crate::providers::DnsRecord },
    /// The subdomain was confirmed to resolve.
    DnsVerified,
    /// Verification hasn't succeeded yet; retry after a backoff delay.
    DnsVerificationPending,
    /// The backoff delay elapsed; attempt verification again.
    RetryDnsVerification,
    /// Admin invitations were generated (persisted, not yet emailed).
    InvitationsGenerated { invitations: Vec<(Uuid, String)> },
    /// Invitation emails were sent (best-effort; individual failures are
    /// recorded as non-critical `invitation.email.failed` events, not saga
    /// failures, per §6.3).
    InvitationEmailsSent,
    /// The organization was marked active; the run is done.
    OrganizationActivated,
    /// Compensation for one already-completed step finished.
    CompensationStepCompleted { step: BootstrapStep },
    /// A step failed terminally; start unwinding.
    StepFailed { error: String },
    /// A compensation step itself failed; the run requires operator
    /// intervention (§7 `WorkflowError::CompensationFailed`).
    CompensationFailed { step: BootstrapStep, error: String },
}

/// Dependencies the saga's activities need, injected rather than constructed
/// inline, per `composable_rust_core::environment::Clock`'s dependency-injection
/// pattern.
#[derive(Clone)]
pub struct BootstrapEnvironment {
    /// The event store every activity persists its outcome to.
    pub event_store: Arc<dyn EventStore>,
    /// The subdomain provisioning provider.
    pub dns_provider: Arc<dyn DnsProvider>,
    /// The invitation email provider.
    pub email_provider: Arc<dyn EmailProvider>,
    /// The clock, injected so tests can fix time (e.g.
    /// `composable_rust_testing::mocks::FixedClock`).
    pub clock: Arc<dyn Clock>,
    /// Saga-level configuration (deadlines, retry backoff, invitation TTL).
    pub config: crate::config::BootstrapConfig,
}

/// The bootstrap saga's reducer: pure dispatch from `(state, action)` to the
/// next state and the effects that should run.
#[derive(Clone)]
pub struct BootstrapReducer;

impl Reducer for BootstrapReducer {
    type State = BootstrapState;
    type Action = BootstrapAction;
    type Environment = BootstrapEnvironment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> Vec<Effect<Self::Action>> {
        match action {
            BootstrapAction::Start => {
                state.step = BootstrapStep::CreatingOrganization;
                vec![activities::create_organization(state, env)]
            }

            BootstrapAction::Resume => {
                vec![match state.step {
                    BootstrapStep::CreatingEntities => activities::create_entities(state, env),
                    BootstrapStep::ConfiguringDns => activities::configure_dns(state, env),
                    BootstrapStep::VerifyingDns => activities::verify_dns(state, env),
                    BootstrapStep::GeneratingInvitations => activities::generate_invitations(state, env),
                    BootstrapStep::SendingInvitations => activities::send_invitation_emails(state, env),
                    BootstrapStep::Activating => activities::activate_organization(state, env),
                    // The step most recently reached when compensation itself
                    // was interrupted is unknown, but `next_compensation`'s
                    // fallback (starting the walk from the last forward step)
                    // degrades correctly regardless of where it actually
                    // starts, since every compensation function no-ops on a
                    // step that never ran.
                    BootstrapStep::Compensating => compensation::next_compensation(state, env),
                    BootstrapStep::Completed | BootstrapStep::Failed => Effect::None,
                    BootstrapStep::NotStarted | BootstrapStep::CreatingOrganization => {
                        activities::create_organization(state, env)
                    }
                }]
            }

            BootstrapAction::OrganizationCreated { organization_id } => {
                state.organization_id = Some(organization_id);
                state.step = BootstrapStep::CreatingEntities;
                vec![activities::create_entities(state, env)]
            }

            BootstrapAction::EntitiesCreated {
                general,
                billing,
                provider_admin,
            } => {
                state.general_entities = Some(general);
                state.billing_entities = Some(billing);
                state.provider_admin_entities = Some(provider_admin);

                if state.request.requires_subdomain() {
                    state.step = BootstrapStep::ConfiguringDns;
                    vec![activities::configure_dns(state, env)]
                } else {
                    // §4.4: not a provider, or a partner that isn't a VAR —
                    // skip DNS entirely.
                    state.step = BootstrapStep::GeneratingInvitations;
                    vec![activities::generate_invitations(state, env)]
                }
            }

            BootstrapAction::DnsConfigured { record } => {
                state.dns_record = Some(record);
                state.step = BootstrapStep::VerifyingDns;
                vec![activities::verify_dns(state, env)]
            }

            BootstrapAction::DnsVerificationPending => {
                state.dns_verify_attempts += 1;
                let deadline_exceeded = chrono::Duration::milliseconds(
                    env.config.retry_base_delay.num_milliseconds()
                        * i64::from(state.dns_verify_attempts),
                ) > env.config.activity_deadline;

                if deadline_exceeded {
                    return self.reduce(
                        state,
                        BootstrapAction::StepFailed {
                            error: "dns verification exceeded its schedule-to-close deadline"
                                .to_string(),
                        },
                        env,
                    );
                }

                vec![Effect::Delay {
                    duration: std::time::Duration::from_millis(
                        (env.config.retry_base_delay.num_milliseconds()
                            * i64::from(state.dns_verify_attempts))
                        .max(0) as u64,
                    ),
                    action: Box::new(BootstrapAction::RetryDnsVerification),
                }]
            }

            BootstrapAction::RetryDnsVerification => {
                vec![activities::verify_dns(state, env)]
            }

            BootstrapAction::DnsVerified => {
                state.step = BootstrapStep::GeneratingInvitations;
                vec![activities::generate_invitations(state, env)]
            }

            BootstrapAction::InvitationsGenerated { invitations } => {
                state.invitations = invitations;
                state.step = BootstrapStep::SendingInvitations;
                vec![activities::send_invitation_emails(state, env)]
            }

            BootstrapAction::InvitationEmailsSent => {
                state.step = BootstrapStep::Activating;
                vec![activities::activate_organization(state, env)]
            }

            BootstrapAction::OrganizationActivated => {
                state.step = BootstrapStep::Completed;
                vec![Effect::None]
            }

            BootstrapAction::StepFailed { error } => {
                state.error = Some(error);
                // `next_compensation` reads `state.step` to find which forward
                // step just failed, so it must run before that field is
                // overwritten below.
                let effect = compensation::next_compensation(state, env);
                state.step = BootstrapStep::Compensating;
                vec![effect]
            }

            BootstrapAction::CompensationStepCompleted { step } => {
                vec![compensation::after_compensation(state, env, step)]
            }

            BootstrapAction::CompensationFailed { step, error } => {
                state.step = BootstrapStep::Failed;
                state.error = Some(format!("compensation failed at {step:?}: {error}"));
                vec![Effect::None]
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration as StdDuration;

    use composable_rust_runtime::Store;
    use composable_rust_testing::mocks::test_clock;

    use crate::catalog;
    use crate::error::ActivityError;
    use crate::providers::{DnsProvider, DnsRecord, EmailProvider, InvitationEmail};
    use crate::store::in_memory::InMemoryEventStore;
    use crate::store::EventStore;
    use crate::stream::StreamType;

    use super::*;

    /// A [`DnsProvider`] scripted per-call, grounded on the teacher's
    /// `auth::mocks::MockEmailProvider` shape (a small struct of knobs instead
    /// of a trait object swap per test).
    #[derive(Clone)]
    struct ScriptedDnsProvider {
        configure_fails_terminal: bool,
        verify_transient_failures: usize,
        verify_attempts: Arc<AtomicUsize>,
        removed: Arc<AtomicUsize>,
    }

    impl ScriptedDnsProvider {
        fn succeeding() -> Self {
            Self {
                configure_fails_terminal: false,
                verify_transient_failures: 0,
                verify_attempts: Arc::new(AtomicUsize::new(0)),
                removed: Arc::new(AtomicUsize::new(0)),
            }
        }

        fn failing_configure() -> Self {
            Self {
                configure_fails_terminal: true,
                ..Self::succeeding()
            }
        }

        fn flaky_verify(transient_failures: usize) -> Self {
            Self {
                verify_transient_failures: transient_failures,
                ..Self::succeeding()
            }
        }
    }

    impl DnsProvider for ScriptedDnsProvider {
        fn configure(
            &self,
            subdomain: &str,
        ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<DnsRecord, ActivityError>> + Send + '_>>
        {
            let subdomain = subdomain.to_string();
            let fails = self.configure_fails_terminal;
            Box::pin(async move {
                if fails {
                    return Err(ActivityError::Terminal {
                        activity: "configure_dns",
                        reason: "subdomain already taken".to_string(),
                    });
                }
                Ok(DnsRecord {
                    provider_record_id: format!("scripted-{subdomain}"),
                    fqdn: format!("{subdomain}.example-platform.test"),
                })
            })
        }

        fn verify(
            &self,
            _record: &DnsRecord,
        ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<(), ActivityError>> + Send + '_>>
        {
            let attempt = self.verify_attempts.fetch_add(1, Ordering::SeqCst);
            let transient_failures = self.verify_transient_failures;
            Box::pin(async move {
                if attempt < transient_failures {
                    return Err(ActivityError::Transient {
                        activity: "verify_dns",
                        reason: "subdomain not yet propagated".to_string(),
                    });
                }
                Ok(())
            })
        }

        fn remove(
            &self,
            _record: &DnsRecord,
        ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<(), ActivityError>> + Send + '_>>
        {
            self.removed.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move { Ok(()) })
        }
    }

    /// An [`EmailProvider`] that always succeeds and counts calls; none of
    /// the saga's forward progress depends on email delivery succeeding
    /// (§6.3), so no test needs it to fail.
    #[derive(Clone, Default)]
    struct CountingEmailProvider {
        sent: Arc<AtomicUsize>,
    }

    impl EmailProvider for CountingEmailProvider {
        fn send_invitation(
            &self,
            _email: InvitationEmail,
        ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<(), ActivityError>> + Send + '_>>
        {
            self.sent.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move { Ok(()) })
        }
    }

    fn sample_contact_group() -> ContactGroup {
        ContactGroup {
            contact_first_name: "Ada".to_string(),
            contact_last_name: "Lovelace".to_string(),
            contact_email: "ada@acme-health.test".to_string(),
            address_line1: "1 Analytical Engine Way".to_string(),
            address_city: "London".to_string(),
            address_state: "LDN".to_string(),
            address_postal_code: "SW1A 1AA".to_string(),
            address_country: "UK".to_string(),
            phone_number: "+44 20 7946 0000".to_string(),
        }
    }

    fn sample_request(subdomain: Option<&str>) -> BootstrapRequest {
        let org_type = if subdomain.is_some() {
            OrganizationType::Provider
        } else {
            OrganizationType::ProviderPartner
        };
        BootstrapRequest {
            organization_name: "Acme Health".to_string(),
            slug: "acme-health".to_string(),
            subdomain: subdomain.map(str::to_string),
            org_type,
            partner_type: (org_type == OrganizationType::ProviderPartner)
                .then_some(PartnerType::Family),
            general: sample_contact_group(),
            billing: ContactGroupSection {
                shared_from_general: true,
                contact_group: None,
            },
            provider_admin: ContactGroupSection {
                shared_from_general: true,
                contact_group: None,
            },
            admin_invites: vec![AdminInvite {
                email: "admin@acme-health.test".to_string(),
                role: "provider_admin".to_string(),
            }],
            requested_by: Uuid::new_v4(),
        }
    }

    fn test_environment(
        dns: ScriptedDnsProvider,
    ) -> (BootstrapEnvironment, Arc<InMemoryEventStore>, Arc<ScriptedDnsProvider>) {
        let event_store = Arc::new(InMemoryEventStore::new());
        let dns = Arc::new(dns);
        let env = BootstrapEnvironment {
            event_store: event_store.clone() as Arc<dyn EventStore>,
            dns_provider: dns.clone() as Arc<dyn DnsProvider>,
            email_provider: Arc::new(CountingEmailProvider::default()),
            clock: Arc::new(test_clock()),
            config: crate::config::BootstrapConfig::new("https://app.acme-health.test".to_string())
                .with_retry_base_delay(chrono::Duration::milliseconds(1))
                .with_activity_deadline(chrono::Duration::milliseconds(5)),
        };
        (env, event_store, dns)
    }

    /// Drive a store from `Start` until it settles into `Completed` or
    /// `Failed`, polling state the same way `bin/worker.rs` does — `Effect`
    /// futures feed their outcome back into the store asynchronously
    /// (`runtime::execute_effect_internal`), so there's nothing to manually
    /// resend.
    async fn run_to_terminal_step(
        store: &Store<BootstrapState, BootstrapAction, BootstrapEnvironment, BootstrapReducer>,
    ) -> BootstrapStep {
        let _handle = store.send(BootstrapAction::Start).await;

        let deadline = tokio::time::Instant::now() + StdDuration::from_secs(5);
        loop {
            let step = store.state(|s| s.step).await;
            if matches!(step, BootstrapStep::Completed | BootstrapStep::Failed) {
                return step;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "saga did not reach a terminal step within the test deadline (stuck at {step:?})"
            );
            tokio::time::sleep(StdDuration::from_millis(5)).await;
        }
    }

    /// An [`EventStore`] that rejects the first `organization.created` append
    /// and otherwise delegates, for exercising compensation when the saga
    /// fails before an organization ever exists.
    struct FailingOrganizationCreateStore {
        inner: Arc<InMemoryEventStore>,
    }

    impl EventStore for FailingOrganizationCreateStore {
        fn emit_domain_event(
            &self,
            stream_id: String,
            stream_type: StreamType,
            event_type: String,
            event_data: serde_json::Value,
            event_metadata: crate::event::EventMetadata,
        ) -> std::pin::Pin<
            Box<dyn std::future::Future<Output = Result<Uuid, crate::error::EventStoreError>> + Send + '_>,
        > {
            Box::pin(async move {
                if event_type == catalog::organization::CREATED {
                    return Err(crate::error::EventStoreError::ConcurrencyConflict {
                        stream_id,
                        stream_type,
                        expected: 1,
                        actual: 2,
                    });
                }
                self.inner
                    .emit_domain_event(stream_id, stream_type, event_type, event_data, event_metadata)
                    .await
            })
        }

        fn get_failed_events(
            &self,
            limit: i64,
            event_type: Option<String>,
            stream_type: Option<StreamType>,
            since: Option<chrono::DateTime<chrono::Utc>>,
        ) -> std::pin::Pin<
            Box<
                dyn std::future::Future<Output = Result<Vec<crate::event::StoredEvent>, crate::error::EventStoreError>>
                    + Send
                    + '_,
            >,
        > {
            self.inner.get_failed_events(limit, event_type, stream_type, since)
        }

        fn retry_failed_event(
            &self,
            event_id: Uuid,
        ) -> std::pin::Pin<
            Box<dyn std::future::Future<Output = Result<crate::event::StoredEvent, crate::error::EventStoreError>> + Send + '_>,
        > {
            self.inner.retry_failed_event(event_id)
        }

        fn get_event_processing_stats(
            &self,
        ) -> std::pin::Pin<
            Box<
                dyn std::future::Future<Output = Result<crate::store::EventProcessingStats, crate::error::EventStoreError>>
                    + Send
                    + '_,
            >,
        > {
            self.inner.get_event_processing_stats()
        }

        fn load_stream(
            &self,
            stream_id: String,
            stream_type: StreamType,
        ) -> std::pin::Pin<
            Box<dyn std::future::Future<Output = Result<Vec<crate::event::StoredEvent>, crate::error::EventStoreError>> + Send + '_>,
        > {
            self.inner.load_stream(stream_id, stream_type)
        }
    }

    /// A failure in `create_organization` itself (e.g. a crash-retry racing a
    /// slug already claimed by the first attempt) must unwind cleanly rather
    /// than panic in `compensation::deactivate_organization`, which only ever
    /// sees a real `organization_id` once `OrganizationCreated` has fired.
    #[tokio::test]
    async fn create_organization_failure_unwinds_without_panicking() {
        let inner = Arc::new(InMemoryEventStore::new());
        let dns = Arc::new(ScriptedDnsProvider::succeeding());
        let env = BootstrapEnvironment {
            event_store: Arc::new(FailingOrganizationCreateStore { inner: inner.clone() }) as Arc<dyn EventStore>,
            dns_provider: dns as Arc<dyn DnsProvider>,
            email_provider: Arc::new(CountingEmailProvider::default()),
            clock: Arc::new(test_clock()),
            config: crate::config::BootstrapConfig::new("https://app.acme-health.test".to_string())
                .with_retry_base_delay(chrono::Duration::milliseconds(1))
                .with_activity_deadline(chrono::Duration::milliseconds(5)),
        };
        let request = sample_request(Some("acme-health"));
        let store = Store::new(
            BootstrapState::new(request, Uuid::new_v4()),
            BootstrapReducer,
            env,
        );

        let step = run_to_terminal_step(&store).await;
        assert_eq!(step, BootstrapStep::Failed);
        assert!(store.state(|s| s.organization_id).await.is_none());
        assert!(inner.all_events().is_empty());
    }

    /// S1: happy-path provider bootstrap with a subdomain all the way to
    /// `Completed`, every step's event present on the organization/junction
    /// streams in order.
    #[tokio::test]
    async fn s1_happy_path_with_subdomain_completes() {
        let (env, event_store, _dns) = test_environment(ScriptedDnsProvider::succeeding());
        let request = sample_request(Some("acme-health"));
        let store = Store::new(
            BootstrapState::new(request, Uuid::new_v4()),
            BootstrapReducer,
            env,
        );

        let step = run_to_terminal_step(&store).await;
        assert_eq!(step, BootstrapStep::Completed);

        let organization_id = store.state(|s| s.organization_id).await.unwrap();
        let org_stream = event_store
            .load_stream(organization_id.to_string(), StreamType::Organization)
            .await
            .unwrap();
        let org_event_types: Vec<&str> =
            org_stream.iter().map(|e| e.event_type.as_str()).collect();
        assert_eq!(
            org_event_types,
            vec![
                catalog::organization::CREATED,
                catalog::organization::DNS_CONFIGURED,
                catalog::organization::DNS_VERIFIED,
                catalog::organization::ACTIVATED,
                catalog::organization::BOOTSTRAP_COMPLETED,
            ]
        );
    }

    /// S3: a stakeholder partner with no subdomain skips DNS entirely and
    /// still reaches `Completed`.
    #[tokio::test]
    async fn s3_no_subdomain_skips_dns_and_completes() {
        let (env, event_store, _dns) = test_environment(ScriptedDnsProvider::succeeding());
        let request = sample_request(None);
        let store = Store::new(
            BootstrapState::new(request, Uuid::new_v4()),
            BootstrapReducer,
            env,
        );

        let step = run_to_terminal_step(&store).await;
        assert_eq!(step, BootstrapStep::Completed);

        let organization_id = store.state(|s| s.organization_id).await.unwrap();
        let org_stream = event_store
            .load_stream(organization_id.to_string(), StreamType::Organization)
            .await
            .unwrap();
        let org_event_types: Vec<&str> =
            org_stream.iter().map(|e| e.event_type.as_str()).collect();
        assert_eq!(
            org_event_types,
            vec![
                catalog::organization::CREATED,
                catalog::organization::ACTIVATED,
                catalog::organization::BOOTSTRAP_COMPLETED,
            ]
        );
        assert!(org_event_types
            .iter()
            .all(|t| *t != catalog::organization::DNS_CONFIGURED));
    }

    /// A transient DNS-verification hiccup retries with backoff and still
    /// reaches `Completed` rather than failing the whole run.
    #[tokio::test]
    async fn transient_dns_verification_failure_retries_then_completes() {
        let (env, _event_store, _dns) = test_environment(ScriptedDnsProvider::flaky_verify(2));
        let request = sample_request(Some("acme-health"));
        let store = Store::new(
            BootstrapState::new(request, Uuid::new_v4()),
            BootstrapReducer,
            env,
        );

        let step = run_to_terminal_step(&store).await;
        assert_eq!(step, BootstrapStep::Completed);
    }

    /// S4: a terminal DNS failure unwinds every forward step already taken —
    /// junction unlinks precede entity deletes (P12), and the organization
    /// ends up deactivated rather than left half-created.
    #[tokio::test]
    async fn s4_dns_failure_runs_full_compensation() {
        let (env, event_store, _dns) = test_environment(ScriptedDnsProvider::failing_configure());
        let request = sample_request(Some("acme-health"));
        let store = Store::new(
            BootstrapState::new(request, Uuid::new_v4()),
            BootstrapReducer,
            env,
        );

        let step = run_to_terminal_step(&store).await;
        assert_eq!(step, BootstrapStep::Failed);

        let organization_id = store.state(|s| s.organization_id).await.unwrap();
        let general = store.state(|s| s.general_entities).await.unwrap();
        let contact_id = general.contact_id;

        let org_stream = event_store
            .load_stream(organization_id.to_string(), StreamType::Organization)
            .await
            .unwrap();
        let org_event_types: Vec<&str> =
            org_stream.iter().map(|e| e.event_type.as_str()).collect();
        assert!(org_event_types.contains(&catalog::organization::DEACTIVATED));
        assert!(!org_event_types.contains(&catalog::organization::BOOTSTRAP_COMPLETED));

        let contact_stream = event_store
            .load_stream(contact_id.to_string(), StreamType::Contact)
            .await
            .unwrap();
        assert!(contact_stream
            .iter()
            .any(|e| e.event_type.as_str() == catalog::contact::DELETED));

        // P12: the junction unlink for this contact must appear strictly
        // before the contact's own deletion, by global sequence number.
        let all_events = event_store.all_events();
        let unlink_seq = all_events
            .iter()
            .find(|e| {
                e.stream_type == StreamType::Junction
                    && e.event_type.as_str() == catalog::junction::ORG_CONTACT_UNLINKED
            })
            .map(|e| e.sequence_number);
        let delete_seq = contact_stream
            .iter()
            .find(|e| e.event_type.as_str() == catalog::contact::DELETED)
            .map(|e| e.sequence_number);

        let (unlink_seq, delete_seq) = (unlink_seq.unwrap(), delete_seq.unwrap());
        assert!(
            unlink_seq < delete_seq,
            "expected junction unlink ({unlink_seq}) before contact deletion ({delete_seq})"
        );

        // P10: nothing entity-shaped from this run is left without a
        // corresponding undo — address and phone were unwound too.
        let address_id = general.address_id;
        let phone_id = general.phone_id;
        for (id, stream_type, deleted_type) in [
            (address_id, StreamType::Address, catalog::address::DELETED),
            (phone_id, StreamType::Phone, catalog::phone::DELETED),
        ] {
            let stream = event_store.load_stream(id.to_string(), stream_type).await.unwrap();
            assert!(stream.iter().any(|e| e.event_type.as_str() == deleted_type));
        }
    }

    /// A DNS verification that never resolves exceeds its schedule-to-close
    /// deadline and unwinds, including removing the already-configured
    /// record — the record reached the provider, unlike the S4 case above
    /// where `configure` itself fails before one exists.
    #[tokio::test]
    async fn permanent_dns_verification_failure_removes_dns_during_compensation() {
        let (env, event_store, dns) = test_environment(ScriptedDnsProvider::flaky_verify(1000));
        let request = sample_request(Some("acme-health"));
        let store = Store::new(
            BootstrapState::new(request, Uuid::new_v4()),
            BootstrapReducer,
            env,
        );

        let step = run_to_terminal_step(&store).await;
        assert_eq!(step, BootstrapStep::Failed);

        let organization_id = store.state(|s| s.organization_id).await.unwrap();
        let org_stream = event_store
            .load_stream(organization_id.to_string(), StreamType::Organization)
            .await
            .unwrap();
        let org_event_types: Vec<&str> =
            org_stream.iter().map(|e| e.event_type.as_str()).collect();
        assert!(org_event_types.contains(&catalog::organization::DNS_CONFIGURED));
        assert!(org_event_types.contains(&catalog::organization::DNS_REMOVED));
        assert!(org_event_types.contains(&catalog::organization::DEACTIVATED));
        assert_eq!(dns.removed.load(Ordering::SeqCst), 1);
    }
}
