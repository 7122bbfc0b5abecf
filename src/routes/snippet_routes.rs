use actix_web::web;

use crate::{
    handlers::{method_not_allowed, snippet_handler, stats_handler},
    middleware::admin_guard::RequireAdmin,
};

pub fn config(config: &mut web::ServiceConfig, admin_guard: RequireAdmin) {
    config.service(
        web::scope("/admin")
        .service(
            web::resource("/create")
                .route(web::post().to(snippet_handler::create_snippet))
                .default_service(web::to(method_not_allowed)),
        )
        .service(
            web::resource("/update")
                .route(web::put().to(snippet_handler::update_snippet))
                .default_service(web::to(method_not_allowed)),
        )
        .service(
            web::resource("/delete")
                .route(web::delete().to(snippet_handler::delete_snippet))
                .default_service(web::to(method_not_allowed)),
        )
        .wrap(admin_guard)
    ).service(
        web::resource("/code/{id}")
            .route(web::get().to(snippet_handler::get_snippet))
            .default_service(web::to(method_not_allowed)),
    ).service(
        web::resource("/stats/{action}/{id}")
            .route(web::post().to(stats_handler::record_event))
            .default_service(web::to(method_not_allowed)),
    );
}
