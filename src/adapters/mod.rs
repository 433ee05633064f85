//! Source adapters: one per upstream marketplace API.
//!
//! Both adapters follow the same shape: resolve the resumption checkpoint
//! from the store, fetch a page, normalize every event into a canonical
//! operation, upsert the batch, then decide whether to continue. A page is
//! only committed as a whole; a failed upsert aborts the run and the next
//! invocation resumes from the last committed checkpoint.

pub mod opensea;
pub mod rarible;

use reqwest::Response;
use sea_orm::{ActiveValue, IntoActiveModel};
use serde::de::DeserializeOwned;

use crate::entities::market_operations;

/// Decode a JSON response, surfacing upstream errors either as the
/// server's `errors` list joined with '|' or as a generic status-code
/// message.
pub(crate) async fn read_json_response<T: DeserializeOwned>(
    response: Response,
) -> Result<T, Box<dyn std::error::Error + Send + Sync>> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(&body) {
            if let Some(errors) = value.get("errors").and_then(|e| e.as_array()) {
                let message = errors
                    .iter()
                    .filter_map(|e| e.as_str())
                    .collect::<Vec<_>>()
                    .join("|");
                if !message.is_empty() {
                    return Err(message.into());
                }
            }
        }
        return Err(format!("request failed - status code {}", status.as_u16()).into());
    }
    Ok(response.json().await?)
}

/// Prepare a parsed operation for insertion (the store assigns the row id).
pub(crate) fn into_insertable(
    model: market_operations::Model,
) -> market_operations::ActiveModel {
    let mut active = model.into_active_model();
    active.id = ActiveValue::NotSet;
    active
}
