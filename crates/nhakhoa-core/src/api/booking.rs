use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::BookingApi;
use crate::config::Config;
use crate::error::{BookingError, Result};
use crate::state::HistoryEntry;

/// Who the appointment is for. Only self-booking is offered from chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BookingFor {
    #[serde(rename = "self")]
    Myself,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingRequest {
    pub text: String,
    pub booking_for: BookingFor,
    pub conversation_history: Vec<HistoryEntry>,
    pub booking_context: Option<Value>,
    pub is_new_conversation: bool,
}

/// Raw reply from the booking endpoint. Every field may be missing or null;
/// see [`crate::reply::decode`] for how it is interpreted.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingReply {
    pub success: Option<bool>,
    pub message: Option<String>,
    pub data: Option<BookingReplyData>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingReplyData {
    pub follow_up_question: Option<String>,
    pub needs_more_info: Option<bool>,
    pub conversation_history: Option<Vec<HistoryEntry>>,
    pub parsed_data: Option<ParsedData>,
    pub appointment: Option<Value>,
    pub require_payment: Option<bool>,
    pub payment: Option<PaymentInfo>,
    pub reservation_expires_at: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedData {
    pub booking_context: Option<Value>,
    pub conversation_history: Option<Vec<HistoryEntry>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PaymentInfo {
    #[serde(rename = "paymentId")]
    pub payment_id: Option<String>,
    #[serde(rename = "_id")]
    pub id: Option<String>,
}

impl PaymentInfo {
    /// `paymentId` when present, else the document `_id`
    pub fn reference(&self) -> Option<&str> {
        [self.payment_id.as_deref(), self.id.as_deref()]
            .into_iter()
            .flatten()
            .find(|id| !id.trim().is_empty())
    }
}

#[derive(Clone)]
pub struct BookingClient {
    client: Client,
    base_url: String,
    access_token: Option<String>,
}

impl BookingClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            access_token: None,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            access_token: config.access_token.clone(),
        })
    }

    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    pub fn endpoint(&self) -> String {
        format!("{}/api/ai/booking", self.base_url)
    }

    pub async fn send(&self, request: &BookingRequest) -> Result<BookingReply> {
        let mut builder = self.client.post(self.endpoint()).json(request);
        if let Some(token) = &self.access_token {
            builder = builder.bearer_auth(token);
        }

        let response = builder.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            // Validation failures come back as 4xx with a readable message
            // for the patient; anything else is a plain HTTP error.
            if let Ok(reply) = serde_json::from_str::<BookingReply>(&body) {
                if reply.message.as_deref().is_some_and(|m| !m.trim().is_empty()) {
                    tracing::debug!(status = status.as_u16(), "booking endpoint rejected turn with message");
                    return Ok(reply);
                }
            }
            return Err(BookingError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let reply: BookingReply = serde_json::from_str(&body)?;
        Ok(reply)
    }
}

#[async_trait]
impl BookingApi for BookingClient {
    async fn send(&self, request: &BookingRequest) -> Result<BookingReply> {
        BookingClient::send(self, request).await
    }
}
