//! Member API endpoints.

use axum::{extract::State, Json};

use super::ApiResult;
use crate::models::MembersResponse;
use crate::AppState;

/// GET /api/members - List all members, newest first.
pub async fn list_members(State(state): State<AppState>) -> ApiResult<MembersResponse> {
    let members = state.repo.list_members().await?;
    tracing::debug!(count = members.len(), "Listed members");
    Ok(Json(MembersResponse { members }))
}
