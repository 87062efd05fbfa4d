/**
 * Upload Routes
 * Signed credentials for direct uploads to the image host
 */
use axum::{
    extract::{rejection::QueryRejection, Query, State},
    http::HeaderMap,
};

use crate::action::Input;
use crate::response::ActionResponse;
use crate::state::AppState;
use crate::upload::UploadCredentials;
use crate::validation::UploadRequest;

/// GET /api/upload-auth?fileType=&fileSize=
/// A query that cannot be read is reported only once the caller is authorized.
pub async fn upload_auth(
    State(state): State<AppState>,
    headers: HeaderMap,
    query: Result<Query<UploadRequest>, QueryRejection>,
) -> ActionResponse<UploadCredentials> {
    let params = match query {
        Ok(Query(request)) => match serde_json::to_value(&request) {
            Ok(value) => Input::Json(value),
            Err(e) => Input::Malformed(e.to_string()),
        },
        Err(rejection) => Input::Malformed(rejection.body_text()),
    };

    let caller = state.caller(&headers);
    state.upload.credentials(caller.as_ref(), params).await
}
