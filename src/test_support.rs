use std::sync::Arc;

use actix_web::{test::TestRequest, web::Data};

use crate::{
    middleware::admin_guard::ADMIN_KEY_HEADER, storage::FileStore,
    utils::SharedSecretAuthenticator, AppState,
};

pub const ADMIN_KEY: &str = "test-admin-key";

pub fn state(store: Arc<dyn FileStore>) -> Data<AppState> {
    Data::new(AppState {
        store,
        authenticator: Arc::new(SharedSecretAuthenticator::new(ADMIN_KEY)),
        public_base_url: "http://localhost:8080".to_string(),
    })
}

pub fn admin(req: TestRequest) -> TestRequest {
    req.insert_header((ADMIN_KEY_HEADER, ADMIN_KEY))
}
