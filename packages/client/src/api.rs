//! Thin REST client for the marketplace backend.
//!
//! The real-time layer treats these endpoints as black boxes: they persist
//! and return entities, and the server echoes relevant mutations over the
//! broadcast channel.

use agora_shared::model::{
    MarkReadBody, Message, OrderUpdate, PostMessageBody, ThreadSummary, UpdateOrderStatusBody,
};

use crate::error::ClientError;

/// REST client bound to one backend base URL.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    bearer: Option<String>,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            http: reqwest::Client::new(),
            base_url,
            bearer: None,
        }
    }

    /// Attach the bearer token required by the threads endpoint.
    pub fn with_bearer(mut self, token: impl Into<String>) -> Self {
        self.bearer = Some(token.into());
        self
    }

    /// `GET /api/messages`: ordered history for one conversation.
    pub async fn fetch_messages(
        &self,
        customer_id: &str,
        shop_id: &str,
        product_id: Option<&str>,
    ) -> Result<Vec<Message>, ClientError> {
        let mut query = vec![("customer_id", customer_id), ("shop_id", shop_id)];
        if let Some(product_id) = product_id {
            query.push(("product_id", product_id));
        }
        let response = self
            .http
            .get(format!("{}/api/messages", self.base_url))
            .query(&query)
            .send()
            .await?;
        Ok(check(response).await?.json().await?)
    }

    /// `POST /api/messages`: persist a message; the created entity comes
    /// back with its server id and timestamp.
    pub async fn post_message(&self, body: &PostMessageBody) -> Result<Message, ClientError> {
        let response = self
            .http
            .post(format!("{}/api/messages", self.base_url))
            .json(body)
            .send()
            .await?;
        Ok(check(response).await?.json().await?)
    }

    /// `PATCH /api/messages/mark-read`: mark a whole thread read.
    pub async fn mark_read(&self, body: &MarkReadBody) -> Result<(), ClientError> {
        let response = self
            .http
            .patch(format!("{}/api/messages/mark-read", self.base_url))
            .json(body)
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }

    /// `GET /api/chat/threads`: conversation summaries for a user.
    /// Merchants pass their shop id to get the per-customer view.
    pub async fn fetch_threads(
        &self,
        user_id: &str,
        shop_id: Option<&str>,
    ) -> Result<Vec<ThreadSummary>, ClientError> {
        let mut query = vec![("user_id", user_id)];
        if let Some(shop_id) = shop_id {
            query.push(("shop_id", shop_id));
        }
        let mut request = self
            .http
            .get(format!("{}/api/chat/threads", self.base_url))
            .query(&query);
        if let Some(token) = &self.bearer {
            request = request.bearer_auth(token);
        }
        let response = request.send().await?;
        Ok(check(response).await?.json().await?)
    }

    /// `PATCH /api/orders/{order_id}/status`: advance an order; the
    /// resulting update is also broadcast to every connected client.
    pub async fn update_order_status(
        &self,
        order_id: &str,
        body: &UpdateOrderStatusBody,
    ) -> Result<OrderUpdate, ClientError> {
        let response = self
            .http
            .patch(format!("{}/api/orders/{}/status", self.base_url, order_id))
            .json(body)
            .send()
            .await?;
        Ok(check(response).await?.json().await?)
    }
}

/// Map non-success statuses to typed API errors.
async fn check(response: reqwest::Response) -> Result<reqwest::Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = match response.text().await {
        Ok(body) if !body.is_empty() => body,
        _ => status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string(),
    };
    Err(ClientError::Api {
        status: status.as_u16(),
        message,
    })
}

/// Map an HTTP base URL to the real-time endpoint on the same host,
/// mirroring the scheme: `http` becomes `ws`, `https` becomes `wss`.
pub fn ws_endpoint(base_url: &str) -> String {
    let base = base_url.trim_end_matches('/');
    let swapped = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else {
        base.to_string()
    };
    format!("{}/ws", swapped)
}
