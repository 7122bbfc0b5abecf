use std::{io, sync::Arc};

use actix_cors::Cors;
use actix_web::{
    body::MessageBody,
    dev::{ServiceFactory, ServiceRequest, ServiceResponse},
    http::header::{HeaderName, CONTENT_TYPE},
    middleware::Logger,
    web::Data,
    App, HttpServer,
};
use log::info;

use crate::{
    config::{Config, StorageConfig},
    middleware::admin_guard::{RequireAdmin, ADMIN_KEY_HEADER},
    storage::{FileStore, GitHubStore, MemoryStore},
    utils::{Authenticator, SharedSecretAuthenticator},
};

mod config;
mod error;
mod handlers;
mod models;
mod storage;
mod utils;

mod middleware;
mod routes;

#[cfg(test)]
mod test_support;

pub struct AppState {
    store: Arc<dyn FileStore>,
    authenticator: Arc<dyn Authenticator>,
    public_base_url: String,
}

/// Preflight handling is off: `handlers::preflight` answers every `OPTIONS`.
fn cors() -> Cors {
    Cors::default()
        .disable_preflight()
        .allow_any_origin()
        .send_wildcard()
        .allowed_methods(vec!["GET", "POST", "PUT", "DELETE", "OPTIONS"])
        .allowed_headers(vec![CONTENT_TYPE, HeaderName::from_static(ADMIN_KEY_HEADER)])
        .max_age(3600)
}

pub fn app(
    app_data: Data<AppState>,
) -> App<
    impl ServiceFactory<
        ServiceRequest,
        Response = ServiceResponse<impl MessageBody>,
        Config = (),
        InitError = (),
        Error = actix_web::Error,
    >,
> {
    let admin_guard = RequireAdmin::new(app_data.clone());

    App::new()
        .app_data(app_data)
        .app_data(handlers::json_config())
        .wrap(Logger::default())
        .wrap(cors())
        .configure(|cfg| routes::config(cfg, admin_guard))
}

#[actix_web::main]
async fn main() -> io::Result<()> {
    dotenv::from_filename(".env")
        .or_else(|_| dotenv::dotenv())
        .ok();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config =
        Config::from_env().map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

    let store: Arc<dyn FileStore> = match &config.storage {
        StorageConfig::GitHub(gh) => {
            info!(
                "storing snippets in {}/{} via {}",
                gh.owner, gh.repo, gh.api_url
            );
            Arc::new(GitHubStore::new(gh).map_err(io::Error::other)?)
        }
        StorageConfig::Memory => {
            info!("storing snippets in memory; nothing survives a restart");
            Arc::new(MemoryStore::new())
        }
    };

    let app_data = Data::new(AppState {
        store,
        authenticator: Arc::new(SharedSecretAuthenticator::new(config.admin_key.clone())),
        public_base_url: config.public_base_url.clone(),
    });

    info!("listening on {}:{}", config.host, config.port);

    HttpServer::new(move || app(app_data.clone()))
        .bind((config.host.as_str(), config.port))?
        .run()
        .await
}
