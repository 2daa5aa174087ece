//! Meow lookup endpoints.
//!
//! Thin read-only wrappers around the meows table. Every external input is
//! syntax-validated before it is used as a store predicate, and every
//! predicate value is bound — user input never lands in a query string.
//! Reads use `FINAL` so rows replaced by a newer upsert never appear twice.

use axum::Json;
use axum::extract::{Path, Query, State};
use clickhouse::Row;
use serde::{Deserialize, Serialize};

use meowstream_core::{is_valid_did, is_valid_rkey};

use crate::error::ApiError;
use crate::state::AppState;

/// Default number of rows for unfiltered listings.
const DEFAULT_LIMIT: u32 = 25;

/// Hard ceiling on any listing.
const MAX_LIMIT: u32 = 100;

/// One stored meow, as returned by the API.
#[derive(Debug, Clone, Serialize, Deserialize, Row)]
pub struct MeowResponse {
    pub rkey: String,
    pub time_us: i64,
    pub cid: String,
    pub did: String,
    pub emotion: Option<String>,
    pub subject: Option<String>,
}

/// Query parameters for the meows listing.
#[derive(Debug, Clone, Deserialize)]
pub struct MeowsQuery {
    /// Limit number of results (default: 25, max: 100).
    pub limit: Option<u32>,
    /// Filter by publishing actor DID.
    pub did: Option<String>,
    /// Filter by resolved subject DID.
    pub subject: Option<String>,
}

/// Clamp a requested limit into the allowed range.
fn effective_limit(requested: Option<u32>) -> u32 {
    requested.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
}

/// `GET /api/v1/meows`
///
/// Returns recent meows, newest first. At most one of `did` / `subject`
/// may be supplied.
pub async fn list_meows(
    State(state): State<AppState>,
    Query(params): Query<MeowsQuery>,
) -> Result<Json<Vec<MeowResponse>>, ApiError> {
    let limit = effective_limit(params.limit);

    if params.did.is_some() && params.subject.is_some() {
        return Err(ApiError::BadRequest(
            "use either 'did' or 'subject', not both".to_string(),
        ));
    }

    let rows: Vec<MeowResponse> = if let Some(did) = &params.did {
        if !is_valid_did(did) {
            return Err(ApiError::BadRequest("invalid did".to_string()));
        }
        state
            .clickhouse
            .query(&format!(
                "SELECT rkey, time_us, cid, did, emotion, subject
                 FROM meows FINAL
                 WHERE did = ?
                 ORDER BY time_us DESC
                 LIMIT {limit}"
            ))
            .bind(did)
            .fetch_all()
            .await?
    } else if let Some(subject) = &params.subject {
        if !is_valid_did(subject) {
            return Err(ApiError::BadRequest("invalid subject".to_string()));
        }
        state
            .clickhouse
            .query(&format!(
                "SELECT rkey, time_us, cid, did, emotion, subject
                 FROM meows FINAL
                 WHERE subject = ?
                 ORDER BY time_us DESC
                 LIMIT {limit}"
            ))
            .bind(subject)
            .fetch_all()
            .await?
    } else {
        state
            .clickhouse
            .query(&format!(
                "SELECT rkey, time_us, cid, did, emotion, subject
                 FROM meows FINAL
                 ORDER BY time_us DESC
                 LIMIT {limit}"
            ))
            .fetch_all()
            .await?
    };

    Ok(Json(rows))
}

/// Query parameters for a single meow lookup.
#[derive(Debug, Clone, Deserialize)]
pub struct GetMeowQuery {
    /// Optionally require the row to belong to this actor.
    pub did: Option<String>,
}

/// `GET /api/v1/meows/{rkey}`
///
/// Returns a single meow by record key, or 404.
pub async fn get_meow(
    State(state): State<AppState>,
    Path(rkey): Path<String>,
    Query(params): Query<GetMeowQuery>,
) -> Result<Json<MeowResponse>, ApiError> {
    if !is_valid_rkey(&rkey) {
        return Err(ApiError::BadRequest("invalid rkey".to_string()));
    }

    let row: Option<MeowResponse> = if let Some(did) = &params.did {
        if !is_valid_did(did) {
            return Err(ApiError::BadRequest("invalid did".to_string()));
        }
        state
            .clickhouse
            .query(
                "SELECT rkey, time_us, cid, did, emotion, subject
                 FROM meows FINAL
                 WHERE rkey = ? AND did = ?
                 LIMIT 1",
            )
            .bind(&rkey)
            .bind(did)
            .fetch_optional()
            .await?
    } else {
        state
            .clickhouse
            .query(
                "SELECT rkey, time_us, cid, did, emotion, subject
                 FROM meows FINAL
                 WHERE rkey = ?
                 LIMIT 1",
            )
            .bind(&rkey)
            .fetch_optional()
            .await?
    };

    row.map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("meow {rkey}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_limit_default() {
        assert_eq!(effective_limit(None), DEFAULT_LIMIT);
    }

    #[test]
    fn test_effective_limit_clamps_high() {
        assert_eq!(effective_limit(Some(10_000)), MAX_LIMIT);
    }

    #[test]
    fn test_effective_limit_clamps_zero() {
        assert_eq!(effective_limit(Some(0)), 1);
    }

    #[test]
    fn test_effective_limit_passes_through() {
        assert_eq!(effective_limit(Some(42)), 42);
    }
}
