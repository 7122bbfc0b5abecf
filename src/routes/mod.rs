use actix_web::{guard, web};

use crate::{handlers, middleware::admin_guard::RequireAdmin};

pub mod snippet_routes;

pub fn config(config: &mut web::ServiceConfig, admin_guard: RequireAdmin) {
    config
        .service(
            web::resource("/{tail:.*}")
                .guard(guard::Options())
                .to(handlers::preflight),
        )
        .service(
            web::scope("/api")
                .configure(|cfg| snippet_routes::config(cfg, admin_guard)),
        );
}
