use actix_web::{web, HttpResponse};
use futures_util::future::join_all;
use log::{debug, error, info, warn};
use serde::Deserialize;

use super::{from_stored_json, to_pretty_json};
use crate::{
    error::ApiError,
    models::{CreateSnippetRequest, Snippet, SnippetId, Stats, UpdateSnippetRequest},
    storage::{Collection, FileStore, StoreError, Transaction, VersionedObject},
    AppState,
};

#[derive(Debug, Deserialize)]
pub struct IdQuery {
    pub id: Option<String>,
}

impl IdQuery {
    fn snippet_id(&self) -> Result<SnippetId, ApiError> {
        SnippetId::parse(self.id.as_deref().unwrap_or_default())
    }
}

async fn read_required(
    store: &dyn FileStore,
    path: &str,
    missing: &str,
) -> Result<VersionedObject, ApiError> {
    store.read(path).await.map_err(|err| match err {
        StoreError::NotFound => ApiError::not_found(missing),
        err => {
            error!("reading {path} failed: {err}");
            ApiError::storage("Failed to load snippet")
        }
    })
}

// _______________________________________ Admin routes _______________________________________

pub async fn create_snippet(
    app_data: web::Data<AppState>,
    data_json: web::Json<CreateSnippetRequest>,
) -> Result<HttpResponse, ApiError> {
    let new = data_json.into_inner().validate()?;
    let store = app_data.store.as_ref();

    let id = SnippetId::generate();
    let snippet = Snippet::new(id.clone(), new.title, new.language, new.description);

    Transaction::new(store)
        .create(
            Collection::Snippets.path(&id),
            to_pretty_json(&snippet)?,
            format!("Create snippet: {}", snippet.title),
        )
        .create(
            Collection::Codes.path(&id),
            new.code,
            format!("Create code for: {}", snippet.title),
        )
        .commit()
        .await
        .map_err(|err| {
            error!("creating snippet {id} failed: {err}");
            match err.step {
                0 => ApiError::storage("Failed to save snippet data"),
                _ => ApiError::storage("Failed to save code"),
            }
        })?;

    // Stats are recreated on the first view, so a failure here is not fatal.
    let stats = to_pretty_json(&Stats::zeroed(id.clone()))?;
    if let Err(err) = store
        .create(
            &Collection::Stats.path(&id),
            &stats,
            &format!("Initialize stats for: {}", snippet.title),
        )
        .await
    {
        warn!("stats for snippet {id} not initialized: {err}");
    }

    info!("created snippet {id}");
    let url = format!("{}/code.html?id={}", app_data.public_base_url, id);

    Ok(HttpResponse::Created().json(serde_json::json!({
        "success": true,
        "id": id,
        "url": url,
        "snippet": snippet,
    })))
}

pub async fn update_snippet(
    app_data: web::Data<AppState>,
    query: web::Query<IdQuery>,
    data_json: web::Json<UpdateSnippetRequest>,
) -> Result<HttpResponse, ApiError> {
    let id = query.snippet_id()?;
    let changes = data_json.into_inner();
    let store = app_data.store.as_ref();

    let meta_path = Collection::Snippets.path(&id);
    let current = read_required(store, &meta_path, "Snippet not found").await?;
    let mut snippet: Snippet = from_stored_json(&current.content, &meta_path)?;
    snippet.apply(&changes);

    let mut txn = Transaction::new(store).update(
        &meta_path,
        to_pretty_json(&snippet)?,
        format!("Update snippet: {}", snippet.title),
        current.version,
        current.content,
    );

    if let Some(code) = changes.code() {
        let code_path = Collection::Codes.path(&id);
        let message = format!("Update code for: {}", snippet.title);
        txn = match store.read(&code_path).await {
            Ok(existing) => txn.update(code_path, code, message, existing.version, existing.content),
            Err(StoreError::NotFound) => txn.create(code_path, code, message),
            Err(err) => {
                error!("reading {code_path} failed: {err}");
                return Err(ApiError::storage("Failed to update code"));
            }
        };
    }

    txn.commit().await.map_err(|err| {
        error!("updating snippet {id} failed: {err}");
        match err.step {
            0 => ApiError::storage("Failed to update snippet"),
            _ => ApiError::storage("Failed to update code"),
        }
    })?;

    info!("updated snippet {id}");
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "snippet": snippet,
    })))
}

pub async fn delete_snippet(
    app_data: web::Data<AppState>,
    query: web::Query<IdQuery>,
) -> Result<HttpResponse, ApiError> {
    let id = query.snippet_id()?;
    let store = app_data.store.as_ref();

    let targets: Vec<(Collection, String)> = Collection::ALL
        .into_iter()
        .map(|collection| (collection, collection.path(&id)))
        .collect();

    let probes = join_all(targets.iter().map(|(_, path)| store.read_version(path))).await;

    // A failed probe counts against the result but does not hold back the
    // paths whose probes succeeded.
    let mut failed = 0;
    let mut present = Vec::with_capacity(targets.len());
    for ((collection, path), probe) in targets.iter().zip(probes) {
        match probe {
            Ok(Some(version)) => present.push((*collection, path.as_str(), version)),
            Ok(None) => debug!("{path} does not exist, skipping"),
            Err(err) => {
                error!("probing {path} failed: {err}");
                failed += 1;
            }
        }
    }

    let id_ref = &id;
    let results = join_all(present.iter().map(|(collection, path, version)| async move {
        let message = format!("Delete {}: {}", collection.label(), id_ref);
        store.delete(path, &message, version).await
    }))
    .await;

    for ((_, path, _), result) in present.iter().zip(results) {
        if let Err(err) = result {
            error!("deleting {path} failed: {err}");
            failed += 1;
        }
    }
    if failed > 0 {
        return Err(ApiError::storage("Failed to delete snippet"));
    }

    info!("deleted snippet {id} ({} objects)", present.len());
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "message": format!("Snippet {id} deleted successfully"),
    })))
}

// _______________________________________ Public routes _______________________________________

pub async fn get_snippet(
    app_data: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    // No stored snippet can have an id outside the generator's alphabet.
    let id = SnippetId::parse(&path.into_inner())
        .map_err(|_| ApiError::not_found("Snippet not found"))?;
    let store = app_data.store.as_ref();

    let meta_path = Collection::Snippets.path(&id);
    let meta = read_required(store, &meta_path, "Snippet not found").await?;
    let snippet: Snippet = from_stored_json(&meta.content, &meta_path)?;

    let code = read_required(store, &Collection::Codes.path(&id), "Code content not found").await?;

    let stats_path = Collection::Stats.path(&id);
    let stats = match store.read(&stats_path).await {
        Ok(obj) => from_stored_json(&obj.content, &stats_path)?,
        Err(StoreError::NotFound) => Stats::zeroed(id.clone()),
        Err(err) => {
            warn!("reading {stats_path} failed, serving empty stats: {err}");
            Stats::zeroed(id.clone())
        }
    };

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "id": id,
        "snippet": snippet,
        "code": code.content,
        "stats": stats,
    })))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use actix_web::{http::StatusCode, test};
    use chrono::{DateTime, Utc};
    use serde_json::{json, Value};

    use crate::{
        storage::{
            testing::{FaultyStore, Op},
            FileStore, MemoryStore,
        },
        test_support::{admin, state, ADMIN_KEY},
    };

    async fn create(store: Arc<dyn FileStore>, body: Value) -> (StatusCode, Value) {
        let app = test::init_service(crate::app(state(store))).await;
        let req = admin(test::TestRequest::post().uri("/api/admin/create"))
            .set_json(body)
            .to_request();
        let resp = test::call_service(&app, req).await;
        let status = resp.status();
        (status, test::read_body_json(resp).await)
    }

    fn sample() -> Value {
        json!({
            "title": "Hello",
            "language": "rust",
            "code": "fn main() {}",
        })
    }

    #[actix_web::test]
    async fn create_then_read_round_trips() {
        let store = Arc::new(MemoryStore::new());
        let (status, created) = create(store.clone(), sample()).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["success"], true);

        let id = created["id"].as_str().unwrap().to_string();
        assert_eq!(
            created["url"],
            format!("http://localhost:8080/code.html?id={id}")
        );
        assert_eq!(created["snippet"]["description"], "");
        assert_eq!(created["snippet"]["createdAt"], created["snippet"]["updatedAt"]);
        assert!(store.contains(&format!("snippets/{id}.json")));
        assert!(store.contains(&format!("codes/{id}.txt")));

        let app = test::init_service(crate::app(state(store.clone()))).await;
        let req = test::TestRequest::get()
            .uri(&format!("/api/code/{id}"))
            .to_request();
        let read: Value = test::call_and_read_body_json(&app, req).await;

        assert_eq!(read["id"], id);
        assert_eq!(read["code"], "fn main() {}");
        assert_eq!(read["snippet"]["title"], "Hello");
        assert_eq!(read["stats"]["views"], 0);
        assert_eq!(read["stats"]["copies"], 0);
        assert_eq!(read["stats"]["lastViewed"], Value::Null);
    }

    #[actix_web::test]
    async fn create_generates_distinct_ids() {
        let store = Arc::new(MemoryStore::new());
        let (_, a) = create(store.clone(), sample()).await;
        let (_, b) = create(store.clone(), sample()).await;
        assert_ne!(a["id"], b["id"]);
        assert_eq!(store.len(), 6);
    }

    #[actix_web::test]
    async fn create_with_missing_fields_writes_nothing() {
        let store = Arc::new(MemoryStore::new());
        let (status, body) = create(
            store.clone(),
            json!({ "title": "Hello", "language": "", "description": "d" }),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Missing required fields: language, code");
        assert!(store.is_empty());
    }

    #[actix_web::test]
    async fn failed_code_write_rolls_back_metadata() {
        let store = Arc::new(FaultyStore::new().failing(Op::Create, "codes/"));
        let (status, body) = create(store.clone(), sample()).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Failed to save code");
        assert!(store.inner().is_empty());
        assert_eq!(store.deleted().len(), 1);
        assert!(store.deleted()[0].starts_with("snippets/"));
    }

    #[actix_web::test]
    async fn failed_metadata_write_stops_early() {
        let store = Arc::new(FaultyStore::new().failing(Op::Create, "snippets/"));
        let (status, body) = create(store.clone(), sample()).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Failed to save snippet data");
        assert!(store.inner().is_empty());
    }

    #[actix_web::test]
    async fn stats_failure_does_not_fail_creation() {
        let store = Arc::new(FaultyStore::new().failing(Op::Create, "stats/"));
        let (status, body) = create(store.clone(), sample()).await;

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(store.inner().len(), 2);

        let app = test::init_service(crate::app(state(store.clone()))).await;
        let req = test::TestRequest::get()
            .uri(&format!("/api/code/{}", body["id"].as_str().unwrap()))
            .to_request();
        let read: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(read["stats"]["views"], 0);
    }

    #[actix_web::test]
    async fn read_missing_snippet_is_not_found() {
        let app = test::init_service(crate::app(state(Arc::new(MemoryStore::new())))).await;
        let req = test::TestRequest::get().uri("/api/code/nope").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "Snippet not found");
    }

    #[actix_web::test]
    async fn read_surfaces_missing_code() {
        let store = Arc::new(MemoryStore::new());
        let (_, created) = create(store.clone(), sample()).await;
        let id = created["id"].as_str().unwrap();

        let code_path = format!("codes/{id}.txt");
        let version = store.read_version(&code_path).await.unwrap().unwrap();
        store.delete(&code_path, "test", &version).await.unwrap();

        let app = test::init_service(crate::app(state(store.clone()))).await;
        let req = test::TestRequest::get()
            .uri(&format!("/api/code/{id}"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "Code content not found");
    }

    #[actix_web::test]
    async fn update_description_only() {
        let store = Arc::new(MemoryStore::new());
        let (_, created) = create(store.clone(), sample()).await;
        let id = created["id"].as_str().unwrap();

        let app = test::init_service(crate::app(state(store.clone()))).await;
        let req = admin(test::TestRequest::put().uri(&format!("/api/admin/update?id={id}")))
            .set_json(json!({ "description": "x" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let updated: Value = test::read_body_json(resp).await;

        assert_eq!(updated["snippet"]["description"], "x");
        assert_eq!(updated["snippet"]["title"], "Hello");
        assert_eq!(updated["snippet"]["language"], "rust");
        assert_eq!(updated["snippet"]["createdAt"], created["snippet"]["createdAt"]);
        let timestamp = |v: &Value| v.as_str().unwrap().parse::<DateTime<Utc>>().unwrap();
        assert!(
            timestamp(&updated["snippet"]["updatedAt"])
                >= timestamp(&created["snippet"]["updatedAt"])
        );

        let code = store.read(&format!("codes/{id}.txt")).await.unwrap();
        assert_eq!(code.content, "fn main() {}");
    }

    #[actix_web::test]
    async fn update_replaces_code() {
        let store = Arc::new(MemoryStore::new());
        let (_, created) = create(store.clone(), sample()).await;
        let id = created["id"].as_str().unwrap();

        let app = test::init_service(crate::app(state(store.clone()))).await;
        let req = admin(test::TestRequest::put().uri(&format!("/api/admin/update?id={id}")))
            .set_json(json!({ "title": "Renamed", "code": "fn main() { loop {} }" }))
            .to_request();
        let updated: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(updated["snippet"]["title"], "Renamed");

        let code = store.read(&format!("codes/{id}.txt")).await.unwrap();
        assert_eq!(code.content, "fn main() { loop {} }");
    }

    #[actix_web::test]
    async fn failed_code_update_restores_metadata() {
        let store = Arc::new(FaultyStore::new().failing(Op::Update, "codes/"));
        let (_, created) = create(store.clone(), sample()).await;
        let id = created["id"].as_str().unwrap();
        let meta_path = format!("snippets/{id}.json");
        let before = store.read(&meta_path).await.unwrap().content;

        let app = test::init_service(crate::app(state(store.clone()))).await;
        let req = admin(test::TestRequest::put().uri(&format!("/api/admin/update?id={id}")))
            .set_json(json!({ "title": "Renamed", "code": "new code" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

        assert_eq!(store.read(&meta_path).await.unwrap().content, before);
        let code = store.read(&format!("codes/{id}.txt")).await.unwrap();
        assert_eq!(code.content, "fn main() {}");
    }

    #[actix_web::test]
    async fn concurrent_update_with_stale_version_loses() {
        let store = Arc::new(MemoryStore::new());
        let (_, created) = create(store.clone(), sample()).await;
        let id = created["id"].as_str().unwrap();
        let meta_path = format!("snippets/{id}.json");

        // Both writers read the same version; the handler wins the race.
        let seen = store.read(&meta_path).await.unwrap();

        let app = test::init_service(crate::app(state(store.clone()))).await;
        let req = admin(test::TestRequest::put().uri(&format!("/api/admin/update?id={id}")))
            .set_json(json!({ "title": "First" }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);

        let loser = store
            .update(&meta_path, &seen.content, "Update snippet: Second", &seen.version)
            .await;
        assert!(matches!(loser, Err(crate::storage::StoreError::Conflict(_))));
    }

    #[actix_web::test]
    async fn update_unknown_snippet_is_not_found() {
        let app = test::init_service(crate::app(state(Arc::new(MemoryStore::new())))).await;
        let req = admin(test::TestRequest::put().uri("/api/admin/update?id=missing"))
            .set_json(json!({ "title": "x" }))
            .to_request();
        assert_eq!(
            test::call_service(&app, req).await.status(),
            StatusCode::NOT_FOUND
        );
    }

    #[actix_web::test]
    async fn update_and_delete_require_an_id() {
        let app = test::init_service(crate::app(state(Arc::new(MemoryStore::new())))).await;

        let req = admin(test::TestRequest::put().uri("/api/admin/update"))
            .set_json(json!({ "title": "x" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "Missing snippet ID");

        let req = admin(test::TestRequest::delete().uri("/api/admin/delete")).to_request();
        assert_eq!(
            test::call_service(&app, req).await.status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[actix_web::test]
    async fn delete_skips_missing_objects() {
        let store = Arc::new(FaultyStore::new());
        let (_, created) = create(store.clone(), sample()).await;
        let id = created["id"].as_str().unwrap();

        let code_path = format!("codes/{id}.txt");
        let version = store.read_version(&code_path).await.unwrap().unwrap();
        store.inner().delete(&code_path, "test", &version).await.unwrap();

        let app = test::init_service(crate::app(state(store.clone()))).await;
        let req = test::TestRequest::delete()
            .uri(&format!("/api/admin/delete?id={id}&adminKey={ADMIN_KEY}"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["message"], format!("Snippet {id} deleted successfully"));

        let mut deleted = store.deleted();
        deleted.sort();
        assert_eq!(
            deleted,
            vec![format!("snippets/{id}.json"), format!("stats/{id}.json")]
        );
        assert!(store.inner().is_empty());
    }

    #[actix_web::test]
    async fn failed_probe_does_not_block_other_deletes() {
        let store = Arc::new(FaultyStore::new().failing(Op::Probe, "stats/"));
        let (_, created) = create(store.clone(), sample()).await;
        let id = created["id"].as_str().unwrap();

        let app = test::init_service(crate::app(state(store.clone()))).await;
        let req = admin(test::TestRequest::delete().uri(&format!("/api/admin/delete?id={id}")))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "Failed to delete snippet");

        let mut deleted = store.deleted();
        deleted.sort();
        assert_eq!(
            deleted,
            vec![format!("codes/{id}.txt"), format!("snippets/{id}.json")]
        );
        assert_eq!(store.inner().len(), 1);
        assert!(store.inner().contains(&format!("stats/{id}.json")));
    }

    #[actix_web::test]
    async fn read_with_malformed_id_is_not_found() {
        let app = test::init_service(crate::app(state(Arc::new(MemoryStore::new())))).await;
        let req = test::TestRequest::get().uri("/api/code/my.snippet").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "Snippet not found");
    }

    #[actix_web::test]
    async fn update_keeps_unknown_record_fields() {
        let store = Arc::new(MemoryStore::new());
        let (_, created) = create(store.clone(), sample()).await;
        let id = created["id"].as_str().unwrap();
        let meta_path = format!("snippets/{id}.json");

        let current = store.read(&meta_path).await.unwrap();
        let mut record: Value = serde_json::from_str(&current.content).unwrap();
        record["author"] = json!("ada");
        store
            .update(&meta_path, &record.to_string(), "seed", &current.version)
            .await
            .unwrap();

        let app = test::init_service(crate::app(state(store.clone()))).await;
        let req = admin(test::TestRequest::put().uri(&format!("/api/admin/update?id={id}")))
            .set_json(json!({ "title": "Renamed" }))
            .to_request();
        let updated: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(updated["snippet"]["author"], "ada");

        let stored: Value =
            serde_json::from_str(&store.read(&meta_path).await.unwrap().content).unwrap();
        assert_eq!(stored["title"], "Renamed");
        assert_eq!(stored["author"], "ada");
    }

    #[actix_web::test]
    async fn delete_reports_partial_failure_without_blocking_others() {
        let store = Arc::new(FaultyStore::new().failing(Op::Delete, "codes/"));
        let (_, created) = create(store.clone(), sample()).await;
        let id = created["id"].as_str().unwrap();

        let app = test::init_service(crate::app(state(store.clone()))).await;
        let req = admin(test::TestRequest::delete().uri(&format!("/api/admin/delete?id={id}")))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

        assert_eq!(store.inner().len(), 1);
        assert!(store.inner().contains(&format!("codes/{id}.txt")));
    }
}
