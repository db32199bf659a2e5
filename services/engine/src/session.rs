//! services/engine/src/session.rs
//!
//! Wires one signed-in dashboard session together: the store registry, the
//! connection manager, the event synchronizer, and the refetch worker.
//! Construction starts the background tasks; `shutdown` tears them down on
//! sign-out. All state is owned here and injected into consumers, never
//! imported as ambient globals.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use praxis_core::availability;
use praxis_core::domain::{
    Appointment, AppointmentDraft, AppointmentPatch, BridgeStatus, BusinessSchedule,
    ConnectionState, Conversation, ConversationSummary, Message, MessageRole, MessageStatus,
};
use praxis_core::events::ClientIntent;
use praxis_core::ports::{BackendApi, EventChannel, PortError, PortResult};
use praxis_core::time::TimeRange;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::error::CommandError;
use crate::stores::appointments::MutationError;
use crate::stores::{AppointmentStore, CacheLookup, StoreRegistry};
use crate::sync::{
    ConnectionManager, EventSynchronizer, Notification, RefetchTarget, SendOutcome,
};

/// One signed-in session of the dashboard engine.
pub struct EngineSession {
    config: Arc<Config>,
    api: Arc<dyn BackendApi>,
    stores: Arc<StoreRegistry>,
    connection: Arc<ConnectionManager>,
    refetch_tx: mpsc::UnboundedSender<RefetchTarget>,
    shutdown: CancellationToken,
    sync_task: JoinHandle<()>,
    refetch_task: JoinHandle<()>,
}

impl EngineSession {
    /// Builds the session and starts the synchronizer and the refetch
    /// worker. Returns the receiver for side-channel notifications;
    /// dropping it only silences the alerts.
    pub fn start(
        config: Arc<Config>,
        api: Arc<dyn BackendApi>,
        channel: Arc<dyn EventChannel>,
    ) -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let stores = Arc::new(StoreRegistry::new());
        let connection = Arc::new(ConnectionManager::new(
            channel,
            config.reconnect_base_delay,
            config.reconnect_max_delay,
        ));
        let (notification_tx, notification_rx) = mpsc::unbounded_channel();
        let (refetch_tx, refetch_rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();

        let synchronizer = EventSynchronizer::new(
            config.business_id,
            stores.clone(),
            connection.clone(),
            notification_tx,
            refetch_tx.clone(),
        );
        let sync_task = tokio::spawn(synchronizer.run(shutdown.clone()));
        let refetch_task = tokio::spawn(refetch_worker(
            api.clone(),
            stores.clone(),
            config.clone(),
            refetch_rx,
            shutdown.clone(),
        ));

        let session = Self {
            config,
            api,
            stores,
            connection,
            refetch_tx,
            shutdown,
            sync_task,
            refetch_task,
        };
        (session, notification_rx)
    }

    /// Observable connection state, for connectivity banners.
    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.connection.watch_state()
    }

    /// Teardown on sign-out: stops the background tasks. Pending commands
    /// already sent to the server still take effect remotely.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        let _ = self.sync_task.await;
        let _ = self.refetch_task.await;
        info!("engine session shut down");
    }

    //=====================================================================================
    // Queries (stale-while-revalidate)
    //=====================================================================================

    /// The business schedule. A miss fetches synchronously; a stale hit is
    /// returned as-is while a background refetch runs.
    pub async fn schedule(&self) -> Result<BusinessSchedule, CommandError> {
        let cached = {
            let store = self.stores.schedule.lock().await;
            match store.get() {
                CacheLookup::Fresh(schedule) => Some((schedule.clone(), false)),
                CacheLookup::Stale(schedule) => Some((schedule.clone(), true)),
                CacheLookup::Miss => None,
            }
        };
        if let Some((schedule, stale)) = cached {
            if stale {
                self.request_refetch(RefetchTarget::Schedule);
            }
            return Ok(schedule);
        }

        let schedule = self
            .with_retry(|| self.api.fetch_schedule())
            .await?;
        self.stores.schedule.lock().await.reconcile(schedule.clone());
        Ok(schedule)
    }

    /// Appointments in `[start_date, end_date]`, fetched when any day in
    /// the window is missing or stale.
    pub async fn appointments(
        &self,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<Appointment>, CommandError> {
        {
            let store = self.stores.appointments.lock().await;
            if let Some(appointments) = collect_window(&store, start_date, end_date) {
                return Ok(appointments);
            }
        }

        let fetched = self
            .with_retry(|| self.api.fetch_appointments(start_date, end_date))
            .await?;
        let mut store = self.stores.appointments.lock().await;
        store.reconcile_window(start_date, end_date, fetched);
        Ok(collect_window(&store, start_date, end_date).unwrap_or_default())
    }

    /// The bookable gaps on a date, per the availability engine.
    pub async fn open_slots(&self, date: NaiveDate) -> Result<Vec<TimeRange>, CommandError> {
        let schedule = self.schedule().await?;
        let appointments = self.appointments(date, date).await?;
        let booked: Vec<TimeRange> = appointments
            .iter()
            .map(|appointment| appointment.time_range)
            .collect();
        Ok(availability::open_windows(
            &schedule.weekly,
            &schedule.non_work_dates,
            &booked,
            date,
        ))
    }

    /// Whether a candidate slot would be accepted, without writing
    /// anything. The same check gates `create_appointment`.
    pub async fn check_slot(
        &self,
        date: NaiveDate,
        time_range: TimeRange,
    ) -> Result<(), CommandError> {
        let schedule = self.schedule().await?;
        let appointments = self.appointments(date, date).await?;
        let booked: Vec<TimeRange> = appointments
            .iter()
            .map(|appointment| appointment.time_range)
            .collect();
        availability::is_bookable(
            &schedule.weekly,
            &schedule.non_work_dates,
            &booked,
            time_range,
            date,
        )
        .map_err(CommandError::Validation)
    }

    /// The conversation list.
    pub async fn conversations(&self) -> Result<Vec<ConversationSummary>, CommandError> {
        let cached = {
            let store = self.stores.conversations.lock().await;
            match store.summaries() {
                CacheLookup::Fresh(summaries) => Some((summaries.to_vec(), false)),
                CacheLookup::Stale(summaries) => Some((summaries.to_vec(), true)),
                CacheLookup::Miss => None,
            }
        };
        if let Some((summaries, stale)) = cached {
            if stale {
                self.request_refetch(RefetchTarget::ConversationList);
            }
            return Ok(summaries);
        }

        let summaries = self
            .with_retry(|| self.api.fetch_conversations())
            .await?;
        self.stores
            .conversations
            .lock()
            .await
            .reconcile_summaries(summaries.clone());
        Ok(summaries)
    }

    /// One conversation with its full message history.
    pub async fn conversation(&self, conversation_id: &str) -> Result<Conversation, CommandError> {
        let cached = {
            let store = self.stores.conversations.lock().await;
            match store.get(conversation_id) {
                CacheLookup::Fresh(conversation) => Some((conversation.clone(), false)),
                CacheLookup::Stale(conversation) => Some((conversation.clone(), true)),
                CacheLookup::Miss => None,
            }
        };
        if let Some((conversation, stale)) = cached {
            if stale {
                self.request_refetch(RefetchTarget::Conversation(conversation_id.to_string()));
            }
            return Ok(conversation);
        }

        let fetched = self
            .with_retry(|| self.api.fetch_conversation(conversation_id))
            .await?;
        let mut store = self.stores.conversations.lock().await;
        store.reconcile(fetched);
        store
            .get(conversation_id)
            .cached()
            .cloned()
            .ok_or_else(|| {
                CommandError::Port(PortError::Unexpected(
                    "conversation missing after reconcile".to_string(),
                ))
            })
    }

    //=====================================================================================
    // Appointment Commands (optimistic apply -> round trip -> reconcile)
    //=====================================================================================

    /// Creates an appointment. The optimistic insert happens only after a
    /// synchronous availability check, so invalid requests fail without a
    /// round trip; the server can still reject on reconcile, which rolls
    /// the entry back. The `view` token cancels the reconcile when the
    /// owning view is torn down; the request itself is never aborted.
    pub async fn create_appointment(
        &self,
        draft: AppointmentDraft,
        view: CancellationToken,
    ) -> Result<Appointment, CommandError> {
        let schedule = self.schedule().await?;
        // Make sure the day is cached so validation sees its bookings.
        self.appointments(draft.date, draft.date).await?;

        let local_id = self
            .stores
            .appointments
            .lock()
            .await
            .apply_optimistic_create(&schedule, self.config.business_id, &draft)
            .map_err(CommandError::Validation)?;

        let request = self.api.create_appointment(&draft);
        let outcome = tokio::select! {
            _ = view.cancelled() => {
                self.cancel_appointment_command(local_id, Some(draft.date)).await;
                return Err(CommandError::Canceled);
            }
            outcome = tokio::time::timeout(self.config.command_timeout, request) => outcome,
        };

        match flatten_timeout(outcome) {
            Ok(confirmed) => {
                self.stores
                    .appointments
                    .lock()
                    .await
                    .reconcile_create(local_id, confirmed.clone());
                info!(appointment = %confirmed.id, date = %confirmed.date, "appointment created");
                Ok(confirmed)
            }
            Err(err) => {
                self.reject_appointment_command(local_id, &err).await;
                Err(CommandError::Port(err))
            }
        }
    }

    /// Patches an appointment, re-validated locally with the appointment
    /// itself excluded from the conflict scan.
    pub async fn update_appointment(
        &self,
        appointment_id: Uuid,
        patch: AppointmentPatch,
        view: CancellationToken,
    ) -> Result<Appointment, CommandError> {
        let schedule = self.schedule().await?;
        let previous_date = {
            let mut store = self.stores.appointments.lock().await;
            let date = store
                .find(appointment_id)
                .map(|appointment| appointment.date);
            store
                .apply_optimistic_update(&schedule, appointment_id, &patch)
                .map_err(map_mutation_error)?;
            date
        };

        let request = self.api.update_appointment(appointment_id, &patch);
        let outcome = tokio::select! {
            _ = view.cancelled() => {
                let date = patch.date.or(previous_date);
                self.cancel_appointment_command(appointment_id, date).await;
                return Err(CommandError::Canceled);
            }
            outcome = tokio::time::timeout(self.config.command_timeout, request) => outcome,
        };

        match flatten_timeout(outcome) {
            Ok(confirmed) => {
                self.stores
                    .appointments
                    .lock()
                    .await
                    .reconcile_update(appointment_id, confirmed.clone());
                Ok(confirmed)
            }
            Err(err) => {
                self.reject_appointment_command(appointment_id, &err).await;
                Err(CommandError::Port(err))
            }
        }
    }

    /// Deletes an appointment, removed locally first and restored if the
    /// server disagrees.
    pub async fn delete_appointment(
        &self,
        appointment_id: Uuid,
        view: CancellationToken,
    ) -> Result<(), CommandError> {
        let date = {
            let mut store = self.stores.appointments.lock().await;
            let date = store
                .find(appointment_id)
                .map(|appointment| appointment.date);
            store
                .apply_optimistic_delete(appointment_id)
                .map_err(map_mutation_error)?;
            date
        };

        let request = self.api.delete_appointment(appointment_id);
        let outcome = tokio::select! {
            _ = view.cancelled() => {
                self.cancel_appointment_command(appointment_id, date).await;
                return Err(CommandError::Canceled);
            }
            outcome = tokio::time::timeout(self.config.command_timeout, request) => outcome,
        };

        match flatten_timeout(outcome) {
            Ok(()) => {
                self.stores
                    .appointments
                    .lock()
                    .await
                    .reconcile_delete(appointment_id);
                Ok(())
            }
            Err(err) => {
                self.reject_appointment_command(appointment_id, &err).await;
                Err(CommandError::Port(err))
            }
        }
    }

    /// Local-only cancellation: the request already went out and may still
    /// apply remotely, so the optimistic entry is undone and the affected
    /// day marked for refetch instead of reconciling.
    async fn cancel_appointment_command(&self, id: Uuid, date: Option<NaiveDate>) {
        let mut store = self.stores.appointments.lock().await;
        store.rollback(id);
        match date {
            Some(date) => store.invalidate(date),
            None => store.invalidate_all(),
        }
        drop(store);
        self.request_refetch(RefetchTarget::Appointments);
        warn!(appointment = %id, "command canceled by view teardown; day marked for refetch");
    }

    /// Rollback after a server rejection. A `Conflict` means local
    /// validation raced a concurrent booking, so the window is refetched.
    async fn reject_appointment_command(&self, id: Uuid, err: &PortError) {
        let mut store = self.stores.appointments.lock().await;
        store.rollback(id);
        if matches!(err, PortError::Conflict(_)) {
            store.invalidate_all();
            drop(store);
            self.request_refetch(RefetchTarget::Appointments);
        }
        warn!(appointment = %id, error = %err, "optimistic appointment write rolled back");
    }

    //=====================================================================================
    // Schedule, Conversation, and Bridge Commands
    //=====================================================================================

    /// Replaces the weekly schedule and the calendar exceptions,
    /// optimistically.
    pub async fn update_schedule(
        &self,
        schedule: BusinessSchedule,
        view: CancellationToken,
    ) -> Result<(), CommandError> {
        let previous = self
            .stores
            .schedule
            .lock()
            .await
            .apply_optimistic(schedule.clone());

        let request = self.api.replace_schedule(&schedule);
        let outcome = tokio::select! {
            _ = view.cancelled() => {
                self.stores.schedule.lock().await.invalidate();
                self.request_refetch(RefetchTarget::Schedule);
                return Err(CommandError::Canceled);
            }
            outcome = tokio::time::timeout(self.config.command_timeout, request) => outcome,
        };

        match flatten_timeout(outcome) {
            Ok(()) => Ok(()),
            Err(err) => {
                self.stores.schedule.lock().await.rollback(previous);
                self.request_refetch(RefetchTarget::Schedule);
                warn!(error = %err, "schedule update rolled back");
                Err(CommandError::Port(err))
            }
        }
    }

    /// Sends a business message: appended locally first, then handed to
    /// the channel. While the channel is not open the intent is queued and
    /// the message stays `Pending`.
    pub async fn send_message(
        &self,
        conversation_id: &str,
        content: String,
    ) -> Result<Message, CommandError> {
        // The conversation must be held locally before appending to it.
        self.conversation(conversation_id).await?;

        let mut message = Message {
            id: format!("local-{}", Uuid::new_v4()),
            content,
            role: MessageRole::Business,
            timestamp: chrono::Utc::now(),
            media: None,
            status: Some(MessageStatus::Pending),
            reactions: Vec::new(),
        };
        self.stores
            .conversations
            .lock()
            .await
            .apply_local_message(conversation_id, message.clone());

        let outcome = self
            .connection
            .send_or_queue(ClientIntent::NewBusinessMessage {
                conversation_id: conversation_id.to_string(),
                message: message.clone(),
            })
            .await;
        if outcome == SendOutcome::Sent {
            message.status = Some(MessageStatus::Sent);
            self.stores
                .conversations
                .lock()
                .await
                .set_message_status(conversation_id, &message.id, MessageStatus::Sent);
        }
        Ok(message)
    }

    /// Resets the unread counter after the business user opened the chat.
    pub async fn mark_conversation_read(&self, conversation_id: &str) {
        self.stores
            .conversations
            .lock()
            .await
            .mark_read(conversation_id);
    }

    /// Asks the server to enable every conversation's assistant. The
    /// matching confirmation event refreshes the conversation list.
    pub async fn enable_all_assistants(&self, user_id: Uuid) -> SendOutcome {
        self.connection
            .send_or_queue(ClientIntent::EnableAllAssistants { user_id })
            .await
    }

    /// Asks the server to disable every conversation's assistant.
    pub async fn disable_all_assistants(&self, user_id: Uuid) -> SendOutcome {
        self.connection
            .send_or_queue(ClientIntent::DisableAllAssistants { user_id })
            .await
    }

    pub async fn bridge_status(&self) -> Result<BridgeStatus, CommandError> {
        Ok(self.with_retry(|| self.api.bridge_status()).await?)
    }

    pub async fn bridge_qr_code(&self) -> Result<String, CommandError> {
        Ok(self.with_retry(|| self.api.bridge_qr_code()).await?)
    }

    /// Logs the WhatsApp bridge out. A command, so it is not retried.
    pub async fn bridge_logout(&self) -> Result<(), CommandError> {
        Ok(self.api.bridge_logout().await?)
    }

    //=====================================================================================
    // Helpers
    //=====================================================================================

    fn request_refetch(&self, target: RefetchTarget) {
        let _ = self.refetch_tx.send(target);
    }

    async fn with_retry<T, F, Fut>(&self, operation: F) -> PortResult<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = PortResult<T>>,
    {
        fetch_with_retry(self.config.fetch_retry_limit, operation).await
    }
}

/// Bounded retry with exponential backoff for the fetch behind a cache
/// miss. User-initiated commands never go through here.
async fn fetch_with_retry<T, F, Fut>(retry_limit: u32, mut operation: F) -> PortResult<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = PortResult<T>>,
{
    let mut attempt: u32 = 0;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt < retry_limit => {
                let delay = Duration::from_millis(100 * 2u64.pow(attempt));
                warn!(error = %err, attempt, "fetch failed; retrying after backoff");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

fn flatten_timeout<T>(
    outcome: Result<PortResult<T>, tokio::time::error::Elapsed>,
) -> PortResult<T> {
    match outcome {
        Ok(result) => result,
        Err(_) => Err(PortError::Timeout),
    }
}

fn map_mutation_error(err: MutationError) -> CommandError {
    match err {
        MutationError::Rejected(rejection) => CommandError::Validation(rejection),
        MutationError::UnknownAppointment(id) => {
            CommandError::Port(PortError::NotFound(format!("appointment {id}")))
        }
    }
}

/// Flattens the window when every day in it is fresh; `None` forces a
/// fetch.
fn collect_window(
    store: &AppointmentStore,
    start_date: NaiveDate,
    end_date: NaiveDate,
) -> Option<Vec<Appointment>> {
    let mut appointments = Vec::new();
    let mut date = start_date;
    while date <= end_date {
        match store.day(date) {
            CacheLookup::Fresh(day) => appointments.extend(day.iter().cloned()),
            _ => return None,
        }
        date = date.succ_opt()?;
    }
    Some(appointments)
}

/// Background worker draining the refetch queue: performs the fetches the
/// synchronizer must never block on, then reconciles the results.
async fn refetch_worker(
    api: Arc<dyn BackendApi>,
    stores: Arc<StoreRegistry>,
    config: Arc<Config>,
    mut requests: mpsc::UnboundedReceiver<RefetchTarget>,
    shutdown: CancellationToken,
) {
    loop {
        let target = tokio::select! {
            _ = shutdown.cancelled() => return,
            target = requests.recv() => match target {
                Some(target) => target,
                None => return,
            },
        };
        if let Err(err) = refetch(api.as_ref(), &stores, &config, &target).await {
            warn!(error = %err, ?target, "background refetch failed; entry stays stale");
        }
    }
}

async fn refetch(
    api: &dyn BackendApi,
    stores: &StoreRegistry,
    config: &Config,
    target: &RefetchTarget,
) -> PortResult<()> {
    match target {
        RefetchTarget::Schedule => {
            let schedule = fetch_with_retry(config.fetch_retry_limit, || api.fetch_schedule()).await?;
            stores.schedule.lock().await.reconcile(schedule);
        }
        RefetchTarget::Appointments => {
            let span = stores.appointments.lock().await.cached_span();
            if let Some((start_date, end_date)) = span {
                let fetched = fetch_with_retry(config.fetch_retry_limit, || {
                    api.fetch_appointments(start_date, end_date)
                })
                .await?;
                stores
                    .appointments
                    .lock()
                    .await
                    .reconcile_window(start_date, end_date, fetched);
            }
        }
        RefetchTarget::ConversationList => {
            let summaries =
                fetch_with_retry(config.fetch_retry_limit, || api.fetch_conversations()).await?;
            stores
                .conversations
                .lock()
                .await
                .reconcile_summaries(summaries);
        }
        RefetchTarget::Conversation(conversation_id) => {
            let conversation = fetch_with_retry(config.fetch_retry_limit, || {
                api.fetch_conversation(conversation_id)
            })
            .await?;
            stores.conversations.lock().await.reconcile(conversation);
        }
    }
    Ok(())
}
