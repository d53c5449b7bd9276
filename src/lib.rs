use actix_web::web;

pub mod auth;
pub mod config;
pub mod crypto;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod schema;
pub mod serializers;
pub mod store;

/// Mounts every route plus the extractor configs that give malformed
/// bodies and ids the shared error shape.
///
/// Expects `web::Data<dyn Store>` and `web::Data<JwtConfig>` to be
/// registered on the `App`.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(errors::json_error_handler))
        .app_data(web::PathConfig::default().error_handler(errors::path_error_handler))
        .route("/health", web::get().to(handlers::health_check))
        .configure(handlers::auth::auth_routes)
        .configure(handlers::patients::patient_routes)
        .configure(handlers::doctors::doctor_routes)
        .configure(handlers::appointments::appointment_routes);
}
