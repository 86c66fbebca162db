//! Reconciliation console: a read-through / write-through cache of the
//! admin backend.
//!
//! The console never owns authoritative state. Reads replace the cache
//! wholesale; every successful mutation is followed by a re-fetch of what it
//! touched. A failed call leaves the cache exactly as it was.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::actions::{self, ActionKind, InFlight};
use crate::client::AdminApi;
use crate::errors::{ConsoleError, Result};
use crate::models::{
    ActionOutcome, AssignUserRequest, Capabilities, IgnoreRequest, LogQuery, Page, Pagination,
    ParsedData, TopupRequest, Transaction, TransactionQuery, User, UserDetail, UserQuery,
    WebhookLog, WebhookStatus,
};
use crate::search::SearchState;

/// List filter the operator picked; remembered across refreshes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogFilter {
    pub status: Option<WebhookStatus>,
    pub source: Option<String>,
    pub page: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignForm {
    pub selected_user_id: Option<String>,
    pub note: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct TopupForm {
    pub credits: String,
    pub note: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPanel {
    pub detail: UserDetail,
    pub transactions: Vec<Transaction>,
    pub pagination: Option<Pagination>,
    pub query: TransactionQuery,
    pub topup: TopupForm,
}

#[derive(Debug, Default)]
struct ConsoleState {
    logs: Vec<WebhookLog>,
    log_pagination: Option<Pagination>,
    filter: LogFilter,
    selected: Option<WebhookLog>,
    selection_seq: u64,
    assign: AssignForm,
    search: SearchState,
    roster: Vec<User>,
    roster_pagination: Option<Pagination>,
    roster_query: UserQuery,
    user_panel: Option<UserPanel>,
    transactions: Vec<Transaction>,
    transactions_pagination: Option<Pagination>,
    last_message: Option<String>,
}

impl ConsoleState {
    /// Drop everything an operator typed for the previously selected log.
    fn reset_log_forms(&mut self) {
        self.assign = AssignForm::default();
        self.search.reset();
    }

    fn clear_selection(&mut self) {
        self.selection_seq += 1;
        self.selected = None;
        self.reset_log_forms();
    }
}

// ─────────────────────────────────────────────────────────
// View model
// ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogRow {
    pub id: String,
    pub source: String,
    pub status: WebhookStatus,
    pub transaction_code: Option<String>,
    pub amount: f64,
    pub description: String,
    pub created_at: Option<DateTime<Utc>>,
    pub needs_operator: bool,
}

impl From<&WebhookLog> for LogRow {
    fn from(log: &WebhookLog) -> Self {
        Self {
            id: log.id.clone(),
            source: log.source.clone(),
            status: log.status,
            transaction_code: log.parsed_data.transaction_code.clone(),
            amount: log.parsed_data.amount,
            description: log.parsed_data.description.clone(),
            created_at: log.created_at,
            needs_operator: log.status.capabilities().any(),
        }
    }
}

/// Read-only detail of the selected log plus what may be done with it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogDetailView {
    pub id: String,
    pub source: String,
    pub status: WebhookStatus,
    pub payload: Value,
    pub parsed_data: ParsedData,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_transaction_id: Option<String>,
    /// Informational once the log has left `error`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub processing_notes: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub terminal: bool,
    pub capabilities: Capabilities,
}

impl From<&WebhookLog> for LogDetailView {
    fn from(log: &WebhookLog) -> Self {
        Self {
            id: log.id.clone(),
            source: log.source.clone(),
            status: log.status,
            payload: log.payload.clone(),
            parsed_data: log.parsed_data.clone(),
            matched_user_id: log.matched_user_id.clone(),
            matched_transaction_id: log.matched_transaction_id.clone(),
            error_message: log.error_message.clone(),
            processing_notes: log.processing_notes.clone(),
            created_at: log.created_at,
            terminal: log.status.is_terminal(),
            capabilities: log.status.capabilities(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsoleView {
    pub logs: Vec<LogRow>,
    pub filter: LogFilter,
    pub pagination: Option<Pagination>,
    pub selected: Option<LogDetailView>,
    pub assign_form: AssignForm,
    pub search: SearchState,
    pub roster: Vec<User>,
    pub roster_pagination: Option<Pagination>,
    pub user_panel: Option<UserPanel>,
    pub transactions: Vec<Transaction>,
    pub transactions_pagination: Option<Pagination>,
    /// Actions whose request is on the wire; their controls are disabled.
    pub busy: Vec<ActionKind>,
    pub last_message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome", content = "count")]
pub enum SearchOutcome {
    /// Results were applied to the type-ahead list.
    Applied(usize),
    /// Newer input arrived; this search was dropped.
    Superseded,
    /// Blank input: results cleared without a request.
    Cleared,
}

// ─────────────────────────────────────────────────────────
// Console
// ─────────────────────────────────────────────────────────

pub struct ReconciliationConsole<C> {
    client: C,
    state: Mutex<ConsoleState>,
    inflight: InFlight,
    page_size: u32,
    debounce: Duration,
}

impl<C: AdminApi> ReconciliationConsole<C> {
    pub fn new(client: C, page_size: u32, debounce: Duration) -> Self {
        Self {
            client,
            state: Mutex::new(ConsoleState::default()),
            inflight: InFlight::default(),
            page_size,
            debounce,
        }
    }

    fn state(&self) -> MutexGuard<'_, ConsoleState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn view(&self) -> ConsoleView {
        let st = self.state();
        ConsoleView {
            logs: st.logs.iter().map(LogRow::from).collect(),
            filter: st.filter.clone(),
            pagination: st.log_pagination.clone(),
            selected: st.selected.as_ref().map(LogDetailView::from),
            assign_form: st.assign.clone(),
            search: st.search.clone(),
            roster: st.roster.clone(),
            roster_pagination: st.roster_pagination.clone(),
            user_panel: st.user_panel.clone(),
            transactions: st.transactions.clone(),
            transactions_pagination: st.transactions_pagination.clone(),
            busy: self.inflight.snapshot(),
            last_message: st.last_message.clone(),
        }
    }

    // ─── Webhook log list and selection ──────────────────

    /// Fetch the log list. `None` reuses the last filter.
    pub async fn refresh_logs(&self, filter: Option<LogFilter>) -> Result<usize> {
        let filter = match filter {
            Some(f) => {
                self.state().filter = f.clone();
                f
            }
            None => self.state().filter.clone(),
        };
        let query = LogQuery {
            page: Some(filter.page.unwrap_or(1)),
            limit: Some(self.page_size),
            source: filter.source.clone(),
            status: filter.status,
        };

        let page = self.client.list_webhook_logs(&query).await?;
        let count = page.items.len();
        debug!("Loaded {count} webhook logs");

        let mut st = self.state();
        st.logs = page.items;
        st.log_pagination = page.pagination;
        Ok(count)
    }

    /// Select a log. Per-log form state is cleared before the new detail is
    /// fetched, so nothing typed for the old log survives. A failed fetch
    /// puts the previous selection back.
    ///
    /// Returns `None` when a newer selection overtook this one.
    pub async fn select_log(&self, id: &str) -> Result<Option<LogDetailView>> {
        let (seq, previous) = {
            let mut st = self.state();
            let previous = st.selected.take();
            st.clear_selection();
            (st.selection_seq, previous)
        };

        let fetched = self.client.get_webhook_log(id).await;

        let mut st = self.state();
        if st.selection_seq != seq {
            debug!("Discarding detail for {id}: selection changed");
            return fetched.map(|_| None);
        }
        match fetched {
            Ok(log) => {
                let view = LogDetailView::from(&log);
                st.selected = Some(log);
                Ok(Some(view))
            }
            Err(e) => {
                st.selected = previous;
                Err(e)
            }
        }
    }

    fn selected_log_for(&self, kind: ActionKind) -> Result<WebhookLog> {
        let st = self.state();
        let log = st
            .selected
            .clone()
            .ok_or_else(|| ConsoleError::validation("Select a webhook log first"))?;

        let caps = log.status.capabilities();
        let allowed = match kind {
            ActionKind::Reprocess => caps.can_reprocess,
            ActionKind::Assign => caps.can_assign,
            ActionKind::Ignore => caps.can_ignore,
            ActionKind::Topup => true,
        };
        if !allowed {
            return Err(ConsoleError::validation(format!(
                "{kind} is not available for a {} log",
                log.status
            )));
        }
        Ok(log)
    }

    /// Bookkeeping after a log action succeeded: close the detail pane if it
    /// still shows `log_id` and re-read the list from the server.
    async fn finish_log_action(&self, log_id: &str, outcome: &ActionOutcome) {
        {
            let mut st = self.state();
            if st.selected.as_ref().is_some_and(|l| l.id == log_id) {
                st.clear_selection();
            }
            st.last_message = Some(outcome.message.clone());
        }
        if let Err(e) = self.refresh_logs(None).await {
            warn!("Log list refresh after action failed: {e}");
        }
    }

    // ─── Type-ahead user search ──────────────────────────

    pub async fn search_users(&self, text: &str) -> Result<SearchOutcome> {
        let seq = self.state().search.begin(text);
        let text = text.trim();
        if text.is_empty() {
            return Ok(SearchOutcome::Cleared);
        }

        tokio::time::sleep(self.debounce).await;
        if !self.state().search.is_current(seq) {
            return Ok(SearchOutcome::Superseded);
        }

        let query = UserQuery {
            page: Some(1),
            limit: Some(self.page_size),
            search: Some(text.to_string()),
            role: None,
        };
        match self.client.list_users(&query).await {
            Ok(page) => {
                let count = page.items.len();
                if self.state().search.accept(seq, page.items) {
                    Ok(SearchOutcome::Applied(count))
                } else {
                    debug!("Dropped stale search results for {text:?}");
                    Ok(SearchOutcome::Superseded)
                }
            }
            Err(e) => {
                self.state().search.fail(seq);
                Err(e)
            }
        }
    }

    /// Pick the assign target from the current search results.
    pub fn choose_user(&self, user_id: &str) -> Result<()> {
        let mut st = self.state();
        if !st.search.contains(user_id) {
            return Err(ConsoleError::NotFound(format!(
                "user {user_id} is not in the search results"
            )));
        }
        st.assign.selected_user_id = Some(user_id.to_string());
        Ok(())
    }

    pub fn set_assign_note(&self, note: &str) {
        self.state().assign.note = note.to_string();
    }

    // ─── Log actions ─────────────────────────────────────

    pub async fn reprocess(&self, confirmed: bool) -> Result<ActionOutcome> {
        actions::require_confirmation(confirmed)?;
        let log = self.selected_log_for(ActionKind::Reprocess)?;

        let guard = self.inflight.try_begin(ActionKind::Reprocess)?;
        let result = self.client.reprocess_webhook_log(&log.id).await;
        drop(guard);

        match result {
            Ok(outcome) => {
                info!("Reprocessed webhook log {}: {}", log.id, outcome.message);
                self.finish_log_action(&log.id, &outcome).await;
                Ok(outcome)
            }
            Err(e) => {
                warn!("Reprocess of webhook log {} failed: {e}", log.id);
                Err(e)
            }
        }
    }

    pub async fn assign(&self) -> Result<ActionOutcome> {
        let log = self.selected_log_for(ActionKind::Assign)?;
        let (user_id, note) = {
            let st = self.state();
            (
                st.assign.selected_user_id.clone(),
                actions::optional_note(Some(st.assign.note.as_str())),
            )
        };
        let user_id = actions::require_selected_user(user_id.as_deref())?;

        let body = AssignUserRequest {
            user_id: user_id.clone(),
            note,
        };
        let guard = self.inflight.try_begin(ActionKind::Assign)?;
        let result = self.client.assign_webhook_log(&log.id, &body).await;
        drop(guard);

        match result {
            Ok(outcome) => {
                info!(
                    "Assigned webhook log {} to user {user_id} (new balance {:?})",
                    log.id, outcome.new_balance
                );
                self.finish_log_action(&log.id, &outcome).await;
                Ok(outcome)
            }
            Err(e) => {
                warn!("Assign of webhook log {} to {user_id} failed: {e}", log.id);
                Err(e)
            }
        }
    }

    /// `prompt` is the operator's answer to the reason prompt; `None` means
    /// the prompt was cancelled.
    pub async fn ignore(&self, prompt: Option<&str>) -> Result<ActionOutcome> {
        let log = self.selected_log_for(ActionKind::Ignore)?;
        let note = actions::ignore_note(prompt)?;

        let guard = self.inflight.try_begin(ActionKind::Ignore)?;
        let result = self
            .client
            .ignore_webhook_log(&log.id, &IgnoreRequest { note: Some(note) })
            .await;
        drop(guard);

        match result {
            Ok(outcome) => {
                info!("Ignored webhook log {}", log.id);
                self.finish_log_action(&log.id, &outcome).await;
                Ok(outcome)
            }
            Err(e) => {
                warn!("Ignore of webhook log {} failed: {e}", log.id);
                Err(e)
            }
        }
    }

    // ─── Users, roster and manual top-up ─────────────────

    pub async fn load_roster(&self, query: Option<UserQuery>) -> Result<usize> {
        let mut query = match query {
            Some(q) => q,
            None => self.state().roster_query.clone(),
        };
        query.limit = query.limit.or(Some(self.page_size));

        let page = self.client.list_users(&query).await?;
        let count = page.items.len();

        let mut st = self.state();
        st.roster = page.items;
        st.roster_pagination = page.pagination;
        st.roster_query = query;
        Ok(count)
    }

    /// Open a user's detail panel with their transaction history.
    pub async fn open_user(&self, user_id: &str) -> Result<UserPanel> {
        let detail = self.client.get_user(user_id).await?;
        let query = TransactionQuery {
            page: Some(1),
            limit: Some(self.page_size),
            ..Default::default()
        };
        let history = self.client.list_user_transactions(user_id, &query).await?;

        let panel = UserPanel {
            detail,
            transactions: history.items,
            pagination: history.pagination,
            query,
            topup: TopupForm::default(),
        };
        self.state().user_panel = Some(panel.clone());
        Ok(panel)
    }

    fn open_user_id(&self) -> Result<String> {
        self.state()
            .user_panel
            .as_ref()
            .map(|p| p.detail.user.id.clone())
            .ok_or_else(|| ConsoleError::validation("Open a user first"))
    }

    /// Re-read the open user's history. `None` keeps the current filters.
    pub async fn load_user_transactions(&self, query: Option<TransactionQuery>) -> Result<usize> {
        let user_id = self.open_user_id()?;
        let mut query = match query {
            Some(q) => q,
            None => self
                .state()
                .user_panel
                .as_ref()
                .map(|p| p.query.clone())
                .unwrap_or_default(),
        };
        query.limit = query.limit.or(Some(self.page_size));

        let page = self.client.list_user_transactions(&user_id, &query).await?;
        let count = page.items.len();

        let mut st = self.state();
        if let Some(panel) = st.user_panel.as_mut().filter(|p| p.detail.user.id == user_id) {
            panel.transactions = page.items;
            panel.pagination = page.pagination;
            panel.query = query;
        }
        Ok(count)
    }

    pub fn set_topup_form(&self, credits: &str, note: &str) -> Result<()> {
        let mut st = self.state();
        let panel = st
            .user_panel
            .as_mut()
            .ok_or_else(|| ConsoleError::validation("Open a user first"))?;
        panel.topup = TopupForm {
            credits: credits.to_string(),
            note: note.to_string(),
        };
        Ok(())
    }

    /// Credit the open user directly, outside any webhook.
    pub async fn topup(&self) -> Result<ActionOutcome> {
        let (user_id, form) = {
            let st = self.state();
            let panel = st
                .user_panel
                .as_ref()
                .ok_or_else(|| ConsoleError::validation("Open a user first"))?;
            (panel.detail.user.id.clone(), panel.topup.clone())
        };
        let credits = actions::parse_topup_credits(&form.credits)?;
        let body = TopupRequest {
            credits,
            note: form.note.trim().to_string(),
        };

        let guard = self.inflight.try_begin(ActionKind::Topup)?;
        let result = self.client.topup_user(&user_id, &body).await;
        drop(guard);

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("Top-up of {credits} credits for user {user_id} failed: {e}");
                return Err(e);
            }
        };
        info!("Topped up {credits} credits for user {user_id}");

        {
            let mut st = self.state();
            st.last_message = Some(outcome.message.clone());
            if let Some(panel) = st.user_panel.as_mut().filter(|p| p.detail.user.id == user_id) {
                panel.topup = TopupForm::default();
                if let Some(balance) = outcome.new_balance {
                    panel.detail.user.balance = balance;
                }
            }
        }
        if let Err(e) = self.load_user_transactions(None).await {
            warn!("Transaction reload after top-up failed: {e}");
        }
        if let Err(e) = self.load_roster(None).await {
            warn!("Roster reload after top-up failed: {e}");
        }
        Ok(outcome)
    }

    // ─── Global transaction browser ──────────────────────

    pub async fn browse_transactions(&self, mut query: TransactionQuery) -> Result<Page<Transaction>> {
        query.limit = query.limit.or(Some(self.page_size));
        let page = self.client.list_transactions(&query).await?;

        let mut st = self.state();
        st.transactions = page.items.clone();
        st.transactions_pagination = page.pagination.clone();
        Ok(page)
    }
}
