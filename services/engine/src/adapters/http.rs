//! services/engine/src/adapters/http.rs
//!
//! This module contains the backend adapter, which is the concrete implementation
//! of the `BackendApi` port from the `core` crate. It speaks the dashboard
//! backend's JSON REST surface using `reqwest`, carrying the session's
//! bearer credential on every call.

use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use praxis_core::domain::{
    Appointment, AppointmentDraft, AppointmentPatch, BridgeStatus, BusinessSchedule,
    Conversation, ConversationSummary,
};
use praxis_core::ports::{BackendApi, PortError, PortResult};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use uuid::Uuid;

use crate::config::Config;
use crate::error::EngineError;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A backend adapter that implements the `BackendApi` port.
#[derive(Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: String,
    token: String,
}

impl HttpBackend {
    /// Creates a new `HttpBackend` from the session configuration.
    pub fn new(config: &Config) -> Result<Self, EngineError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| EngineError::Internal(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: config.backend_base_url.trim_end_matches('/').to_string(),
            token: config.backend_token.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Attaches the credential, sends, and maps the HTTP status onto the
    /// port error taxonomy.
    async fn execute(&self, request: RequestBuilder) -> PortResult<Response> {
        let response = request
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(map_transport)?;
        match response.status() {
            status if status.is_success() => Ok(response),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(PortError::Unauthorized),
            StatusCode::NOT_FOUND => Err(PortError::NotFound(response.url().path().to_string())),
            StatusCode::CONFLICT => {
                let detail = response.text().await.unwrap_or_default();
                Err(PortError::Conflict(detail))
            }
            status => Err(PortError::Unexpected(format!("backend returned {status}"))),
        }
    }
}

fn map_transport(err: reqwest::Error) -> PortError {
    if err.is_timeout() {
        PortError::Timeout
    } else {
        PortError::Transport(err.to_string())
    }
}

async fn decode<T: serde::de::DeserializeOwned>(response: Response) -> PortResult<T> {
    response
        .json::<T>()
        .await
        .map_err(|e| PortError::Unexpected(format!("malformed backend payload: {e}")))
}

//=========================================================================================
// "Impure" Wire Record Structs
//=========================================================================================
// Only where the wire shape differs from the domain type; everything else
// deserializes straight into the domain.

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct InstanceStatusRecord {
    instance_status: BridgeStatus,
}

#[derive(Deserialize)]
struct QrCodeRecord {
    qr: String,
}

#[async_trait]
impl BackendApi for HttpBackend {
    // --- Schedule ---
    async fn fetch_schedule(&self) -> PortResult<BusinessSchedule> {
        let response = self.execute(self.client.get(self.url("/schedule"))).await?;
        decode(response).await
    }

    async fn replace_schedule(&self, schedule: &BusinessSchedule) -> PortResult<()> {
        self.execute(self.client.put(self.url("/schedule")).json(schedule))
            .await?;
        Ok(())
    }

    // --- Appointments ---
    async fn fetch_appointments(
        &self,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> PortResult<Vec<Appointment>> {
        let request = self.client.get(self.url("/appointments")).query(&[
            ("startDate", start_date.to_string()),
            ("endDate", end_date.to_string()),
        ]);
        decode(self.execute(request).await?).await
    }

    async fn create_appointment(&self, draft: &AppointmentDraft) -> PortResult<Appointment> {
        let request = self.client.post(self.url("/appointments")).json(draft);
        decode(self.execute(request).await?).await
    }

    async fn update_appointment(
        &self,
        appointment_id: Uuid,
        patch: &AppointmentPatch,
    ) -> PortResult<Appointment> {
        let request = self
            .client
            .patch(self.url(&format!("/appointments/{appointment_id}")))
            .json(patch);
        decode(self.execute(request).await?).await
    }

    async fn delete_appointment(&self, appointment_id: Uuid) -> PortResult<()> {
        self.execute(
            self.client
                .delete(self.url(&format!("/appointments/{appointment_id}"))),
        )
        .await?;
        Ok(())
    }

    // --- Conversations ---
    async fn fetch_conversations(&self) -> PortResult<Vec<ConversationSummary>> {
        decode(self.execute(self.client.get(self.url("/chats"))).await?).await
    }

    async fn fetch_conversation(&self, conversation_id: &str) -> PortResult<Conversation> {
        let request = self.client.get(self.url(&format!("/chats/{conversation_id}")));
        decode(self.execute(request).await?).await
    }

    // --- WhatsApp bridge ---
    async fn bridge_status(&self) -> PortResult<BridgeStatus> {
        let record: InstanceStatusRecord =
            decode(self.execute(self.client.get(self.url("/whatsapp/status"))).await?).await?;
        Ok(record.instance_status)
    }

    async fn bridge_qr_code(&self) -> PortResult<String> {
        let record: QrCodeRecord =
            decode(self.execute(self.client.get(self.url("/whatsapp/qr"))).await?).await?;
        Ok(record.qr)
    }

    async fn bridge_logout(&self) -> PortResult<()> {
        self.execute(self.client.post(self.url("/whatsapp/logout")))
            .await?;
        Ok(())
    }
}
