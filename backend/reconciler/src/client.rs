//! Admin backend client.
//!
//! Every call is a single request/response: no retries, no back-off. A
//! non-2xx status or a `success: false` body is a failure carrying the
//! server's message verbatim.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::{ConsoleError, Result};
use crate::models::{
    ActionOutcome, ApiEnvelope, AssignUserRequest, IgnoreRequest, LogQuery, Page, TopupRequest,
    Transaction, TransactionQuery, User, UserDetail, UserQuery, WebhookLog,
};
use crate::token::TokenStore;

/// Endpoints of the admin backend used by the console.
#[async_trait]
pub trait AdminApi: Send + Sync {
    async fn list_webhook_logs(&self, query: &LogQuery) -> Result<Page<WebhookLog>>;
    async fn get_webhook_log(&self, id: &str) -> Result<WebhookLog>;
    async fn reprocess_webhook_log(&self, id: &str) -> Result<ActionOutcome>;
    async fn assign_webhook_log(&self, id: &str, body: &AssignUserRequest) -> Result<ActionOutcome>;
    async fn ignore_webhook_log(&self, id: &str, body: &IgnoreRequest) -> Result<ActionOutcome>;

    async fn list_users(&self, query: &UserQuery) -> Result<Page<User>>;
    async fn get_user(&self, id: &str) -> Result<UserDetail>;
    async fn list_user_transactions(
        &self,
        id: &str,
        query: &TransactionQuery,
    ) -> Result<Page<Transaction>>;
    async fn topup_user(&self, id: &str, body: &TopupRequest) -> Result<ActionOutcome>;

    async fn list_transactions(&self, query: &TransactionQuery) -> Result<Page<Transaction>>;
}

pub struct HttpAdminClient {
    client: Client,
    base_url: String,
    tokens: TokenStore,
}

impl HttpAdminClient {
    pub fn new(base_url: &str, tokens: TokenStore, timeout: Option<Duration>) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(t) = timeout {
            builder = builder.timeout(t);
        }
        Ok(Self {
            client: builder.build()?,
            base_url: base_url.trim_end_matches('/').to_string(),
            tokens,
        })
    }

    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder> {
        let url = format!("{}{}", self.base_url, path);
        debug!("{method} {url}");
        let mut req = self.client.request(method, url);
        // Read on every call so a token swapped on disk takes effect immediately.
        if let Some(token) = self.tokens.load()? {
            req = req.bearer_auth(token);
        }
        Ok(req)
    }

    async fn get(&self, path: &str, query: &[(&'static str, String)]) -> Result<ApiEnvelope<Value>> {
        let req = self.request(Method::GET, path)?.query(query);
        send(req).await
    }

    async fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<ApiEnvelope<Value>> {
        let req = self.request(Method::POST, path)?.json(body);
        send(req).await
    }
}

async fn send(req: RequestBuilder) -> Result<ApiEnvelope<Value>> {
    let resp = req.send().await?;
    let status = resp.status();
    let raw = resp.text().await?;

    let envelope = serde_json::from_str::<ApiEnvelope<Value>>(&raw);
    match envelope {
        Ok(env) if status.is_success() && env.success => Ok(env),
        Ok(env) => {
            warn!("Admin API rejected request ({status}): {:?}", env.message);
            Err(ConsoleError::api(status.as_u16(), env.message))
        }
        Err(e) if status.is_success() => Err(e.into()),
        Err(_) => {
            warn!("Admin API returned {status} with a non-JSON body");
            Err(ConsoleError::api(status.as_u16(), None))
        }
    }
}

fn into_data<T: DeserializeOwned>(env: ApiEnvelope<Value>) -> Result<T> {
    let data = env
        .data
        .ok_or_else(|| ConsoleError::api(200, Some("Response carried no data".to_string())))?;
    Ok(serde_json::from_value(data)?)
}

fn into_page<T: DeserializeOwned>(env: ApiEnvelope<Value>) -> Result<Page<T>> {
    let pagination = env.pagination.clone();
    let items = match env.data {
        Some(Value::Null) | None => Vec::new(),
        Some(data) => serde_json::from_value(data)?,
    };
    Ok(Page { items, pagination })
}

fn into_outcome(env: ApiEnvelope<Value>) -> ActionOutcome {
    ActionOutcome::from_response(env.message, env.data.as_ref())
}

#[async_trait]
impl AdminApi for HttpAdminClient {
    async fn list_webhook_logs(&self, query: &LogQuery) -> Result<Page<WebhookLog>> {
        into_page(self.get("/admin/webhook-logs", &query.to_query()).await?)
    }

    async fn get_webhook_log(&self, id: &str) -> Result<WebhookLog> {
        into_data(self.get(&format!("/admin/webhook-logs/{id}"), &[]).await?)
    }

    async fn reprocess_webhook_log(&self, id: &str) -> Result<ActionOutcome> {
        let path = format!("/admin/webhook-logs/{id}/reprocess");
        Ok(into_outcome(self.post(&path, &serde_json::json!({})).await?))
    }

    async fn assign_webhook_log(&self, id: &str, body: &AssignUserRequest) -> Result<ActionOutcome> {
        let path = format!("/admin/webhook-logs/{id}/assign-user");
        Ok(into_outcome(self.post(&path, body).await?))
    }

    async fn ignore_webhook_log(&self, id: &str, body: &IgnoreRequest) -> Result<ActionOutcome> {
        let path = format!("/admin/webhook-logs/{id}/ignore");
        Ok(into_outcome(self.post(&path, body).await?))
    }

    async fn list_users(&self, query: &UserQuery) -> Result<Page<User>> {
        into_page(self.get("/admin/users", &query.to_query()).await?)
    }

    async fn get_user(&self, id: &str) -> Result<UserDetail> {
        into_data(self.get(&format!("/admin/users/{id}"), &[]).await?)
    }

    async fn list_user_transactions(
        &self,
        id: &str,
        query: &TransactionQuery,
    ) -> Result<Page<Transaction>> {
        let path = format!("/admin/users/{id}/transactions");
        into_page(self.get(&path, &query.to_query()).await?)
    }

    async fn topup_user(&self, id: &str, body: &TopupRequest) -> Result<ActionOutcome> {
        let path = format!("/admin/users/{id}/topup");
        Ok(into_outcome(self.post(&path, body).await?))
    }

    async fn list_transactions(&self, query: &TransactionQuery) -> Result<Page<Transaction>> {
        into_page(self.get("/admin/transactions", &query.to_query()).await?)
    }
}
