//! The send-message boundary.

use std::sync::Arc;

use {
    axum::{
        extract::{State, rejection::JsonRejection},
        http::StatusCode,
        response::{IntoResponse, Json},
    },
    courier_channels::{DeliveryDriver, DispatchOutcome},
    serde::{Deserialize, Serialize},
    tracing::{debug, warn},
};

#[cfg(feature = "metrics")]
use courier_metrics::{counter, http as http_metrics};

use crate::server::AppState;

const MISSING_FIELDS: &str = "number and message are required";

/// Body of `POST /send-message`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SendMessageRequest {
    #[serde(default, alias = "recipient")]
    pub number: Option<String>,
    #[serde(default, alias = "payload")]
    pub message: Option<String>,
}

/// Response of `POST /send-message`.
///
/// `accepted` only means the message was handed to the delivery driver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub accepted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SubmitResponse {
    fn accepted() -> Self {
        Self {
            accepted: true,
            error: None,
        }
    }

    fn rejected(error: impl Into<String>) -> Self {
        Self {
            accepted: false,
            error: Some(error.into()),
        }
    }
}

/// Validate `request` and hand it to the driver without waiting for delivery.
///
/// Must be called from within a tokio runtime.
pub fn submit_message(
    driver: &Arc<DeliveryDriver>,
    request: SendMessageRequest,
) -> (StatusCode, SubmitResponse) {
    let present = |field: Option<String>| field.filter(|value| !value.trim().is_empty());
    let (Some(number), Some(message)) = (present(request.number), present(request.message)) else {
        #[cfg(feature = "metrics")]
        counter!(http_metrics::SUBMIT_REJECTED_TOTAL).increment(1);
        return (
            StatusCode::BAD_REQUEST,
            SubmitResponse::rejected(MISSING_FIELDS),
        );
    };

    let driver = Arc::clone(driver);
    tokio::spawn(async move {
        match driver.dispatch(number, message).await {
            DispatchOutcome::GaveUp { attempts } => {
                warn!(attempts, "submitted message dropped after its first attempt");
            },
            outcome => debug!(?outcome, "submitted message dispatched"),
        }
    });

    (StatusCode::ACCEPTED, SubmitResponse::accepted())
}

pub async fn send_message_handler(
    State(state): State<AppState>,
    body: Result<Json<SendMessageRequest>, JsonRejection>,
) -> impl IntoResponse {
    let (status, response) = match body {
        Ok(Json(request)) => submit_message(&state.gateway.driver, request),
        Err(rejection) => {
            debug!(error = %rejection, "unreadable send-message body");
            (
                StatusCode::BAD_REQUEST,
                SubmitResponse::rejected(MISSING_FIELDS),
            )
        },
    };
    (status, Json(response))
}
