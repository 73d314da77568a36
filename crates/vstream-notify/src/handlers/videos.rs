//! Video update handlers.

use axum::extract::{Path, State};
use axum::Json;
use axum_extra::headers::authorization::Bearer;
use axum_extra::headers::Authorization;
use axum_extra::TypedHeader;
use tracing::{info, warn};

use vstream_models::{EncoderUpdate, Video, VideoId, VideoStatus};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// `POST /videos/:video_id/encoded`
///
/// Called by the encoder once a job finishes, with an upload token scoped to
/// this video. Only `duration`, `status` and `posted_at` are taken from the
/// body; the merged record is stored, and an `ACTIVE` record is published to
/// everyone waiting on the encode topic.
pub async fn publish_encoded(
    State(state): State<AppState>,
    Path(video_id): Path<String>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    Json(update): Json<EncoderUpdate>,
) -> ApiResult<Json<Video>> {
    let video_id = VideoId::from(video_id);
    let token = bearer.as_ref().map(|TypedHeader(auth)| auth.token());

    let claims = state.verifier.verify_upload(token, &video_id)?;

    if let Some(body_id) = update.id.as_ref().filter(|id| **id != video_id) {
        return Err(ApiError::bad_request(format!(
            "Body id {} does not match path id {}",
            body_id, video_id
        )));
    }
    if update.is_empty() {
        return Err(ApiError::bad_request("No editable property in body"));
    }

    let video = state
        .catalog
        .update_video(&video_id, |video| update.apply(video))
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Video {} not found", video_id)))?;
    info!(
        video_id = %video_id,
        status = video.status.as_str(),
        issuer = %claims.iss,
        "Video updated by encoder"
    );

    if video.status == VideoStatus::Active {
        match state.notifier.publish_completion(&video_id, &video).await {
            Ok(true) => {}
            Ok(false) => info!(video_id = %video_id, "No subscribers waiting"),
            Err(e) => {
                // The record is already stored; later joins take the fast path.
                warn!(video_id = %video_id, "Failed to publish completion: {}", e);
            }
        }
    }

    Ok(Json(video))
}
