//! In-memory admin backend for console and API tests.
//!
//! Records every call as `"METHOD /path"` plus the JSON body (or the query
//! string for reads) and behaves like the real backend closely enough for
//! the refresh-after-action flow to be observable.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::Notify;

use crate::client::AdminApi;
use crate::errors::{ConsoleError, Result};
use crate::models::{
    ActionOutcome, AssignUserRequest, IgnoreRequest, LogQuery, Page, ParsedData, TopupRequest,
    Transaction, TransactionQuery, TransactionStatus, TransactionType, User, UserDetail,
    UserQuery, UserRole, WebhookLog, WebhookStatus,
};

/// Credits granted by a successful manual assignment.
pub const ASSIGN_CREDITS: u64 = 500;

pub fn log(id: &str, status: WebhookStatus) -> WebhookLog {
    WebhookLog {
        id: id.to_string(),
        source: "sepay".to_string(),
        payload: json!({ "id": id }),
        parsed_data: ParsedData::default(),
        status,
        matched_transaction_id: None,
        matched_user_id: None,
        error_message: (status == WebhookStatus::Error).then(|| "parse failure".to_string()),
        processing_notes: None,
        created_at: None,
    }
}

pub fn user(id: &str, name: &str) -> User {
    User {
        id: id.to_string(),
        email: format!("{}@example.com", id.to_lowercase()),
        name: name.to_string(),
        role: UserRole::Student,
        balance: 0,
        is_active: true,
    }
}

fn transaction(id: &str, user_id: &str, kind: TransactionType, credits: i64) -> Transaction {
    Transaction {
        id: id.to_string(),
        transaction_code: format!("CODE-{id}"),
        user_id: Some(user_id.to_string()),
        kind,
        amount: 0.0,
        credits,
        status: TransactionStatus::Completed,
        processed_by: None,
        admin_note: None,
        created_at: None,
    }
}

#[derive(Default)]
struct Backend {
    logs: Vec<WebhookLog>,
    users: Vec<User>,
    ledger: Vec<Transaction>,
    calls: Vec<(String, Value)>,
    searches: Vec<String>,
    search_delays: HashMap<String, Duration>,
    detail_delays: HashMap<String, Duration>,
    fail_next: Option<(u16, String)>,
}

#[derive(Clone, Default)]
pub struct FakeAdminApi {
    backend: Arc<Mutex<Backend>>,
    hold: Arc<AtomicBool>,
    entered: Arc<Notify>,
    release: Arc<Notify>,
}

impl FakeAdminApi {
    pub fn with_logs(logs: Vec<WebhookLog>) -> Self {
        let api = Self::default();
        {
            let mut b = api.backend.lock().unwrap();
            b.logs = logs;
            b.users = vec![user("U1", "Nguyen Van A"), user("U2", "Tran Thi B")];
            b.ledger = vec![transaction("T0", "U2", TransactionType::Topup, 200)];
        }
        api
    }

    pub fn calls(&self) -> Vec<(String, Value)> {
        self.backend.lock().unwrap().calls.clone()
    }

    /// Bodies sent to one endpoint, e.g. `"POST /admin/users/U1/topup"`.
    pub fn calls_to(&self, key: &str) -> Vec<Value> {
        self.calls()
            .into_iter()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v)
            .collect()
    }

    pub fn action_calls(&self) -> usize {
        self.calls().iter().filter(|(k, _)| k.starts_with("POST ")).count()
    }

    pub fn list_calls(&self) -> usize {
        self.calls_to("GET /admin/webhook-logs").len()
    }

    pub fn searches(&self) -> Vec<String> {
        self.backend.lock().unwrap().searches.clone()
    }

    pub fn delay_search(&self, text: &str, delay: Duration) {
        self.backend
            .lock()
            .unwrap()
            .search_delays
            .insert(text.to_string(), delay);
    }

    pub fn delay_detail(&self, id: &str, delay: Duration) {
        self.backend
            .lock()
            .unwrap()
            .detail_delays
            .insert(id.to_string(), delay);
    }

    pub fn fail_next(&self, status: u16, message: &str) {
        self.backend.lock().unwrap().fail_next = Some((status, message.to_string()));
    }

    /// Park every mutating call until [`release_actions`](Self::release_actions).
    pub fn hold_actions(&self) {
        self.hold.store(true, Ordering::SeqCst);
    }

    pub fn release_actions(&self) {
        self.hold.store(false, Ordering::SeqCst);
        self.release.notify_one();
    }

    pub async fn wait_for_action(&self) {
        self.entered.notified().await;
    }

    fn record(&self, key: String, body: Value) {
        self.backend.lock().unwrap().calls.push((key, body));
    }

    /// Shared prologue of every mutating call.
    async fn action(&self, key: String, body: Value) -> Result<()> {
        self.record(key, body);
        self.entered.notify_one();
        if self.hold.load(Ordering::SeqCst) {
            self.release.notified().await;
        }
        match self.backend.lock().unwrap().fail_next.take() {
            Some((status, message)) => Err(ConsoleError::api(status, Some(message))),
            None => Ok(()),
        }
    }

    fn not_found(what: &str) -> ConsoleError {
        ConsoleError::api(404, Some(format!("{what} not found")))
    }
}

fn outcome(message: &str, new_balance: Option<u64>) -> ActionOutcome {
    ActionOutcome {
        message: message.to_string(),
        new_balance,
    }
}

fn query_json(q: &[(&'static str, String)]) -> Value {
    Value::Object(
        q.iter()
            .map(|(k, v)| (k.to_string(), Value::String(v.clone())))
            .collect(),
    )
}

#[async_trait]
impl AdminApi for FakeAdminApi {
    async fn list_webhook_logs(&self, query: &LogQuery) -> Result<Page<WebhookLog>> {
        self.record("GET /admin/webhook-logs".into(), query_json(&query.to_query()));
        let b = self.backend.lock().unwrap();
        let items = b
            .logs
            .iter()
            .filter(|l| query.status.map_or(true, |s| l.status == s))
            .filter(|l| query.source.as_deref().map_or(true, |s| l.source == s))
            .cloned()
            .collect();
        Ok(Page {
            items,
            pagination: None,
        })
    }

    async fn get_webhook_log(&self, id: &str) -> Result<WebhookLog> {
        self.record(format!("GET /admin/webhook-logs/{id}"), Value::Null);
        let delay = self.backend.lock().unwrap().detail_delays.get(id).copied();
        if let Some(d) = delay {
            tokio::time::sleep(d).await;
        }
        let b = self.backend.lock().unwrap();
        b.logs
            .iter()
            .find(|l| l.id == id)
            .cloned()
            .ok_or_else(|| Self::not_found("Webhook log"))
    }

    async fn reprocess_webhook_log(&self, id: &str) -> Result<ActionOutcome> {
        self.action(format!("POST /admin/webhook-logs/{id}/reprocess"), json!({}))
            .await?;
        let mut b = self.backend.lock().unwrap();
        let log = b
            .logs
            .iter_mut()
            .find(|l| l.id == id)
            .ok_or_else(|| Self::not_found("Webhook log"))?;
        log.status = WebhookStatus::Unmatched;
        Ok(outcome("reprocessed", None))
    }

    async fn assign_webhook_log(&self, id: &str, body: &AssignUserRequest) -> Result<ActionOutcome> {
        self.action(
            format!("POST /admin/webhook-logs/{id}/assign-user"),
            serde_json::to_value(body)?,
        )
        .await?;
        let mut b = self.backend.lock().unwrap();
        let tx_id = format!("T{}", b.ledger.len() + 1);
        b.ledger.push(transaction(
            &tx_id,
            &body.user_id,
            TransactionType::Topup,
            ASSIGN_CREDITS as i64,
        ));

        let user = b
            .users
            .iter_mut()
            .find(|u| u.id == body.user_id)
            .ok_or_else(|| Self::not_found("User"))?;
        user.balance += ASSIGN_CREDITS;
        let balance = user.balance;

        let log = b
            .logs
            .iter_mut()
            .find(|l| l.id == id)
            .ok_or_else(|| Self::not_found("Webhook log"))?;
        log.status = WebhookStatus::Matched;
        log.matched_user_id = Some(body.user_id.clone());
        log.matched_transaction_id = Some(tx_id);
        Ok(outcome("assigned", Some(balance)))
    }

    async fn ignore_webhook_log(&self, id: &str, body: &IgnoreRequest) -> Result<ActionOutcome> {
        self.action(
            format!("POST /admin/webhook-logs/{id}/ignore"),
            serde_json::to_value(body)?,
        )
        .await?;
        let mut b = self.backend.lock().unwrap();
        let log = b
            .logs
            .iter_mut()
            .find(|l| l.id == id)
            .ok_or_else(|| Self::not_found("Webhook log"))?;
        log.status = WebhookStatus::Ignored;
        log.processing_notes = body.note.as_ref().map(|n| format!("ignored: {n}"));
        Ok(outcome("ignored", None))
    }

    async fn list_users(&self, query: &UserQuery) -> Result<Page<User>> {
        self.record("GET /admin/users".into(), query_json(&query.to_query()));
        let delay = query.search.as_ref().and_then(|s| {
            let mut b = self.backend.lock().unwrap();
            b.searches.push(s.clone());
            b.search_delays.get(s).copied()
        });
        if let Some(d) = delay {
            tokio::time::sleep(d).await;
        }

        let needle = query.search.as_deref().unwrap_or("").to_lowercase();
        let b = self.backend.lock().unwrap();
        let items = b
            .users
            .iter()
            .filter(|u| u.name.to_lowercase().contains(&needle) || u.email.contains(&needle))
            .cloned()
            .collect();
        Ok(Page {
            items,
            pagination: None,
        })
    }

    async fn get_user(&self, id: &str) -> Result<UserDetail> {
        self.record(format!("GET /admin/users/{id}"), Value::Null);
        let b = self.backend.lock().unwrap();
        let user = b
            .users
            .iter()
            .find(|u| u.id == id)
            .cloned()
            .ok_or_else(|| Self::not_found("User"))?;
        let count = b.ledger.iter().filter(|t| t.user_id.as_deref() == Some(id)).count();
        Ok(UserDetail {
            user,
            stats: json!({ "transactionCount": count }),
        })
    }

    async fn list_user_transactions(
        &self,
        id: &str,
        query: &TransactionQuery,
    ) -> Result<Page<Transaction>> {
        self.record(
            format!("GET /admin/users/{id}/transactions"),
            query_json(&query.to_query()),
        );
        let b = self.backend.lock().unwrap();
        let items = b
            .ledger
            .iter()
            .filter(|t| t.user_id.as_deref() == Some(id))
            .cloned()
            .collect();
        Ok(Page {
            items,
            pagination: None,
        })
    }

    async fn topup_user(&self, id: &str, body: &TopupRequest) -> Result<ActionOutcome> {
        self.action(
            format!("POST /admin/users/{id}/topup"),
            serde_json::to_value(body)?,
        )
        .await?;
        let mut b = self.backend.lock().unwrap();
        let tx_id = format!("T{}", b.ledger.len() + 1);
        let mut tx = transaction(&tx_id, id, TransactionType::ManualTopup, body.credits as i64);
        tx.admin_note = Some(body.note.clone());
        b.ledger.push(tx);

        let user = b
            .users
            .iter_mut()
            .find(|u| u.id == id)
            .ok_or_else(|| Self::not_found("User"))?;
        user.balance += body.credits;
        Ok(outcome("topped up", Some(user.balance)))
    }

    async fn list_transactions(&self, query: &TransactionQuery) -> Result<Page<Transaction>> {
        self.record("GET /admin/transactions".into(), query_json(&query.to_query()));
        let b = self.backend.lock().unwrap();
        let items = b
            .ledger
            .iter()
            .filter(|t| query.kind.map_or(true, |k| t.kind == k))
            .filter(|t| query.user_id.is_none() || t.user_id == query.user_id)
            .cloned()
            .collect();
        Ok(Page {
            items,
            pagination: None,
        })
    }
}
