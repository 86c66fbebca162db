//! Wire types for the admin backend and the reconciliation state machine.
//!
//! Field names follow the backend's camelCase JSON. Identifiers are opaque
//! strings; the backend may send them as `_id`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

// ─────────────────────────────────────────────────────────
// Webhook log lifecycle
// ─────────────────────────────────────────────────────────

/// Status of an inbound payment webhook.
///
/// ```text
/// received → processing → matched | unmatched | error
/// unmatched | error → matched | ignored   (operator action)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WebhookStatus {
    Received,
    Processing,
    Matched,
    Unmatched,
    Error,
    Ignored,
}

/// What an operator may do with a log in a given status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Capabilities {
    pub can_reprocess: bool,
    pub can_assign: bool,
    pub can_ignore: bool,
}

impl Capabilities {
    pub fn any(&self) -> bool {
        self.can_reprocess || self.can_assign || self.can_ignore
    }
}

impl WebhookStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Processing => "processing",
            Self::Matched => "matched",
            Self::Unmatched => "unmatched",
            Self::Error => "error",
            Self::Ignored => "ignored",
        }
    }

    /// Automatic matching gave up; a human has to decide.
    pub fn needs_operator(&self) -> bool {
        matches!(self, Self::Unmatched | Self::Error)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Ignored)
    }

    pub fn capabilities(&self) -> Capabilities {
        let open = self.needs_operator();
        Capabilities {
            can_reprocess: open,
            can_assign: open,
            can_ignore: open,
        }
    }
}

impl std::fmt::Display for WebhookStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Best-effort extraction from the gateway payload. The backend sends
/// `null` for anything it could not extract.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ParsedData {
    pub transaction_code: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub amount: f64,
    #[serde(deserialize_with = "null_as_default")]
    pub description: String,
    #[serde(deserialize_with = "null_as_default")]
    pub bank_transaction_id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub when: String,
}

fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookLog {
    #[serde(alias = "_id")]
    pub id: String,
    pub source: String,
    /// Raw gateway payload, kept verbatim.
    #[serde(default)]
    pub payload: Value,
    #[serde(default, deserialize_with = "null_as_default")]
    pub parsed_data: ParsedData,
    pub status: WebhookStatus,
    #[serde(default)]
    pub matched_transaction_id: Option<String>,
    #[serde(default)]
    pub matched_user_id: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub processing_notes: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

// ─────────────────────────────────────────────────────────
// Ledger and users
// ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Topup,
    Spend,
    Refund,
    ManualTopup,
    Bonus,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Topup => "topup",
            Self::Spend => "spend",
            Self::Refund => "refund",
            Self::ManualTopup => "manual_topup",
            Self::Bonus => "bonus",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
    Cancelled,
    Timeout,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Timeout => "timeout",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    #[serde(alias = "_id")]
    pub id: String,
    pub transaction_code: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    #[serde(default)]
    pub amount: f64,
    /// Positive credits the user, negative debits.
    pub credits: i64,
    pub status: TransactionStatus,
    #[serde(default)]
    pub processed_by: Option<String>,
    #[serde(default)]
    pub admin_note: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Student,
    Partner,
    Mod,
    Admin,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Student => "student",
            Self::Partner => "partner",
            Self::Mod => "mod",
            Self::Admin => "admin",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(alias = "_id")]
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub name: String,
    pub role: UserRole,
    #[serde(default)]
    pub balance: u64,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

/// `GET /admin/users/{id}` payload: the user plus backend-computed aggregates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserDetail {
    pub user: User,
    #[serde(default)]
    pub stats: Value,
}

// ─────────────────────────────────────────────────────────
// Envelope and pagination
// ─────────────────────────────────────────────────────────

/// Every backend response: `{ success, data, message?, pagination? }`.
#[derive(Debug, Deserialize)]
pub struct ApiEnvelope<T> {
    #[serde(default)]
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
    pub pagination: Option<Pagination>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub pages: u32,
}

/// One page of a list endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub pagination: Option<Pagination>,
}

// ─────────────────────────────────────────────────────────
// Query strings
// ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub source: Option<String>,
    pub status: Option<WebhookStatus>,
}

impl LogQuery {
    pub fn to_query(&self) -> Vec<(&'static str, String)> {
        let mut q = paging(self.page, self.limit);
        push_opt(&mut q, "source", self.source.clone());
        push_opt(&mut q, "status", self.status.map(|s| s.as_str().to_string()));
        q
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub search: Option<String>,
    pub role: Option<UserRole>,
}

impl UserQuery {
    pub fn to_query(&self) -> Vec<(&'static str, String)> {
        let mut q = paging(self.page, self.limit);
        push_opt(&mut q, "search", self.search.clone());
        push_opt(&mut q, "role", self.role.map(|r| r.as_str().to_string()));
        q
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TransactionQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    #[serde(rename = "type")]
    pub kind: Option<TransactionType>,
    pub status: Option<TransactionStatus>,
    pub user_id: Option<String>,
    pub search: Option<String>,
}

impl TransactionQuery {
    pub fn to_query(&self) -> Vec<(&'static str, String)> {
        let mut q = paging(self.page, self.limit);
        push_opt(&mut q, "type", self.kind.map(|k| k.as_str().to_string()));
        push_opt(&mut q, "status", self.status.map(|s| s.as_str().to_string()));
        push_opt(&mut q, "userId", self.user_id.clone());
        push_opt(&mut q, "search", self.search.clone());
        q
    }
}

fn paging(page: Option<u32>, limit: Option<u32>) -> Vec<(&'static str, String)> {
    let mut q = Vec::new();
    push_opt(&mut q, "page", page.map(|p| p.to_string()));
    push_opt(&mut q, "limit", limit.map(|l| l.to_string()));
    q
}

fn push_opt(q: &mut Vec<(&'static str, String)>, key: &'static str, value: Option<String>) {
    if let Some(v) = value.filter(|v| !v.is_empty()) {
        q.push((key, v));
    }
}

// ─────────────────────────────────────────────────────────
// Action bodies and outcomes
// ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignUserRequest {
    pub user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IgnoreRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopupRequest {
    pub credits: u64,
    pub note: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionOutcome {
    pub message: String,
    /// Balance reported back by credit-affecting calls.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_balance: Option<u64>,
}

impl ActionOutcome {
    /// Read the outcome from a successful envelope's `message` and `data`.
    pub fn from_response(message: Option<String>, data: Option<&Value>) -> Self {
        let new_balance = data.and_then(|d| {
            d.get("newBalance")
                .and_then(Value::as_u64)
                .or_else(|| d.pointer("/user/balance").and_then(Value::as_u64))
        });
        Self {
            message: message.unwrap_or_else(|| "Done".to_string()),
            new_balance,
        }
    }
}
