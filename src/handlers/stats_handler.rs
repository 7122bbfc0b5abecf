use actix_web::{web, HttpResponse};
use log::error;

use super::{from_stored_json, to_pretty_json};
use crate::{
    error::ApiError,
    models::{SnippetId, Stats, StatsEvent},
    storage::{Collection, StoreError},
    AppState,
};

fn stats_failure(path: &str, err: StoreError) -> ApiError {
    error!("writing {path} failed: {err}");
    ApiError::storage("Failed to update stats")
}

/// Counts a view or copy. Concurrent events on one snippet race on the stats
/// file's version; the loser gets an error and the event is dropped.
pub async fn record_event(
    app_data: web::Data<AppState>,
    path: web::Path<(String, String)>,
) -> Result<HttpResponse, ApiError> {
    let (action, raw_id) = path.into_inner();
    let event: StatsEvent = action.parse()?;
    let id = SnippetId::parse(&raw_id)?;
    let store = app_data.store.as_ref();
    let stats_path = Collection::Stats.path(&id);

    let stats = match store.read(&stats_path).await {
        Ok(current) => {
            let mut stats: Stats = from_stored_json(&current.content, &stats_path)?;
            stats.record(event);
            store
                .update(
                    &stats_path,
                    &to_pretty_json(&stats)?,
                    &format!("Update {} count: {id}", event.as_str()),
                    &current.version,
                )
                .await
                .map_err(|err| stats_failure(&stats_path, err))?;
            stats
        }
        Err(StoreError::NotFound) => {
            let stats = Stats::first(id.clone(), event);
            store
                .create(
                    &stats_path,
                    &to_pretty_json(&stats)?,
                    &format!("Initialize stats for: {id}"),
                )
                .await
                .map_err(|err| stats_failure(&stats_path, err))?;
            stats
        }
        Err(err) => return Err(stats_failure(&stats_path, err)),
    };

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "stats": stats,
    })))
}
