//! Batch payload decoding shared by the HTTP handler and the `run` command.
//!
//! ```json
//! { "data": [ { "DOI": "...", "Publication Title": "...", ... } ], "headers": { } }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, instrument};

use super::error::ApiError;
use crate::pipeline::{BatchScheduler, DownloadResult, ProgressCallback};
use crate::record::BibliographicRecord;

const INVALID_PAYLOAD: &str = "Invalid or missing JSON payload";
const NO_DATA: &str = "No data provided";

/// Successful batch response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchResponse {
    pub results: Vec<DownloadResult>,
}

/// Decodes the records of a batch payload.
///
/// # Errors
///
/// Returns [`ApiError::BadRequest`] when the body is not a non-empty JSON
/// object, when `data` is missing or empty, or when a record is malformed.
pub fn parse_payload(body: &[u8]) -> Result<Vec<BibliographicRecord>, ApiError> {
    let payload: Value =
        serde_json::from_slice(body).map_err(|_| ApiError::bad_request(INVALID_PAYLOAD))?;
    let Value::Object(mut payload) = payload else {
        return Err(ApiError::bad_request(INVALID_PAYLOAD));
    };
    if payload.is_empty() {
        return Err(ApiError::bad_request(INVALID_PAYLOAD));
    }

    if let Some(headers) = payload.get("headers").filter(|h| !h.is_null()) {
        // Accepted for compatibility; fetches always use the crate's own headers.
        debug!(headers = %headers, "caller headers received");
    }

    let data = match payload.remove("data") {
        None | Some(Value::Null) => return Err(ApiError::bad_request(NO_DATA)),
        Some(Value::Array(items)) if items.is_empty() => {
            return Err(ApiError::bad_request(NO_DATA));
        }
        Some(data @ Value::Array(_)) => data,
        Some(_) => return Err(ApiError::bad_request("`data` must be an array of records")),
    };

    serde_json::from_value(data)
        .map_err(|error| ApiError::bad_request(format!("invalid record: {error}")))
}

/// Decodes `body` and runs the batch.
///
/// # Errors
///
/// Returns [`ApiError::BadRequest`] for payload problems and
/// [`ApiError::Internal`] when the batch cannot run.
#[instrument(skip_all, fields(bytes = body.len()))]
pub async fn process_payload(
    scheduler: &BatchScheduler,
    body: &[u8],
    progress: Option<ProgressCallback>,
) -> Result<BatchResponse, ApiError> {
    let records = parse_payload(body)?;
    info!(records = records.len(), "batch accepted");
    let results = scheduler
        .run_with_progress(records, progress)
        .await
        .map_err(|error| ApiError::internal(error.to_string()))?;
    Ok(BatchResponse { results })
}
