use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::bail_gateway;
use crate::error::{GatewayResult, HttpErrorResponse};
use crate::state::AppState;

pub const MISSING_URL_ERROR: &str = "No URL provided";

#[derive(Deserialize, Debug, Default)]
pub struct ScanRequest {
    #[serde(default)]
    pub image_url: Option<String>,
}

impl ScanRequest {
    /// The image URL, treating a blank value like a missing one.
    pub fn image_url(&self) -> Option<&str> {
        self.image_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }
}

/// Body of every `/scan` answer: either the markdown or the reason there is none.
#[derive(Serialize, Debug, PartialEq)]
#[serde(untagged)]
pub enum ScanResponse {
    Markdown { markdown: String },
    Error(HttpErrorResponse),
}

/// Handler for `POST /scan`.
///
/// A missing URL is answered with an error body under a success status and
/// never touches the model. Load and generation failures become error bodies
/// with the status of their [`crate::error::ScanError`].
#[axum_macros::debug_handler]
pub async fn handle_scan(
    State(state): State<AppState>,
    payload: Result<Json<ScanRequest>, JsonRejection>,
) -> GatewayResult<Json<ScanResponse>> {
    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(rejection) => {
            debug!(error = %rejection.body_text(), "Rejected scan payload");
            bail_gateway!(rejection.status(), rejection.body_text())
        }
    };

    let Some(image_url) = request.image_url() else {
        debug!("Scan request without image URL");
        return Ok(Json(ScanResponse::Error(HttpErrorResponse::from(
            MISSING_URL_ERROR,
        ))));
    };

    match state.scan(image_url).await {
        Ok(markdown) => Ok(Json(ScanResponse::Markdown { markdown })),
        Err(err) => {
            warn!(image_url, error = %err, "Scan failed");
            Err(err.into_gateway_error())
        }
    }
}
