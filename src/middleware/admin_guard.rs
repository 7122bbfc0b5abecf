use std::future::{ready, Ready};

use actix_web::{
    body::EitherBody,
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    web, Error, HttpRequest, ResponseError,
};
use futures_util::future::LocalBoxFuture;
use log::warn;
use serde::Deserialize;

use crate::AppState;

pub const ADMIN_KEY_HEADER: &str = "x-admin-key";

#[derive(Deserialize)]
struct AdminKeyQuery {
    #[serde(rename = "adminKey")]
    admin_key: Option<String>,
}

/// Header first, then the `adminKey` query parameter.
fn admin_credential(req: &HttpRequest) -> Option<String> {
    req.headers()
        .get(ADMIN_KEY_HEADER)
        .and_then(|h| h.to_str().ok())
        .map(str::to_owned)
        .or_else(|| {
            web::Query::<AdminKeyQuery>::from_query(req.query_string())
                .ok()
                .and_then(|q| q.into_inner().admin_key)
        })
}

/// Rejects requests that do not carry the admin credential, before any
/// extractor or handler behind it runs.
#[derive(Clone)]
pub struct RequireAdmin {
    app_data: web::Data<AppState>,
}

impl RequireAdmin {
    pub fn new(app_data: web::Data<AppState>) -> Self {
        Self { app_data }
    }
}

impl<S, B> Transform<S, ServiceRequest> for RequireAdmin
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type InitError = ();
    type Transform = RequireAdminMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RequireAdminMiddleware {
            service,
            app_data: self.app_data.clone(),
        }))
    }
}

pub struct RequireAdminMiddleware<S> {
    service: S,
    app_data: web::Data<AppState>,
}

impl<S, B> Service<ServiceRequest> for RequireAdminMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let credential = admin_credential(req.request());

        match self.app_data.authenticator.authenticate(credential.as_deref()) {
            Ok(()) => {
                let fut = self.service.call(req);
                Box::pin(async move { fut.await.map(ServiceResponse::map_into_left_body) })
            }
            Err(err) => {
                warn!(
                    "rejected admin request {} {}",
                    req.method(),
                    req.path()
                );
                let res = req.into_response(err.error_response()).map_into_right_body();
                Box::pin(async move { Ok(res) })
            }
        }
    }
}
