use actix_web::{HttpResponse, web};
use serde_json::Value;
use tracing::info;

use crate::auth::AuthContext;
use crate::errors::ApiError;
use crate::handlers::not_found;
use crate::serializers;
use crate::store::Store;

// GET /doctors/
pub async fn list_doctors(
    store: web::Data<dyn Store>,
    _auth: AuthContext,
) -> Result<HttpResponse, ApiError> {
    let doctors = web::block(move || store.list_doctors()).await??;
    Ok(HttpResponse::Ok().json(doctors))
}

// POST /doctors/
pub async fn create_doctor(
    store: web::Data<dyn Store>,
    auth: AuthContext,
    body: web::Json<Value>,
) -> Result<HttpResponse, ApiError> {
    let new_doctor = serializers::new_doctor(&body)?;
    let doctor = web::block(move || store.create_doctor(new_doctor)).await??;
    info!(doctor_id = doctor.id, by = %auth.username, "Created doctor {}", doctor);
    Ok(HttpResponse::Created().json(doctor))
}

// GET /doctors/{id}/
pub async fn get_doctor(
    store: web::Data<dyn Store>,
    _auth: AuthContext,
    path: web::Path<i32>,
) -> Result<HttpResponse, ApiError> {
    let id = path.into_inner();
    match web::block(move || store.find_doctor(id)).await?? {
        Some(doctor) => Ok(HttpResponse::Ok().json(doctor)),
        None => Err(not_found("Doctor")),
    }
}

async fn update_doctor(
    store: web::Data<dyn Store>,
    id: i32,
    body: &Value,
    partial: bool,
) -> Result<HttpResponse, ApiError> {
    let lookup = store.clone();
    if web::block(move || lookup.find_doctor(id)).await??.is_none() {
        return Err(not_found("Doctor"));
    }
    let changes = serializers::doctor_changes(body, partial)?;
    match web::block(move || store.update_doctor(id, changes)).await?? {
        Some(doctor) => {
            info!(doctor_id = doctor.id, partial, "Updated doctor {}", doctor);
            Ok(HttpResponse::Ok().json(doctor))
        }
        None => Err(not_found("Doctor")),
    }
}

// PUT /doctors/{id}/
pub async fn replace_doctor(
    store: web::Data<dyn Store>,
    _auth: AuthContext,
    path: web::Path<i32>,
    body: web::Json<Value>,
) -> Result<HttpResponse, ApiError> {
    update_doctor(store, path.into_inner(), &body, false).await
}

// PATCH /doctors/{id}/
pub async fn patch_doctor(
    store: web::Data<dyn Store>,
    _auth: AuthContext,
    path: web::Path<i32>,
    body: web::Json<Value>,
) -> Result<HttpResponse, ApiError> {
    update_doctor(store, path.into_inner(), &body, true).await
}

// DELETE /doctors/{id}/
pub async fn delete_doctor(
    store: web::Data<dyn Store>,
    auth: AuthContext,
    path: web::Path<i32>,
) -> Result<HttpResponse, ApiError> {
    let id = path.into_inner();
    if web::block(move || store.delete_doctor(id)).await?? {
        info!(doctor_id = id, by = %auth.username, "Deleted doctor");
        Ok(HttpResponse::NoContent().finish())
    } else {
        Err(not_found("Doctor"))
    }
}

pub fn doctor_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/doctors/")
            .route(web::get().to(list_doctors))
            .route(web::post().to(create_doctor)),
    )
    .service(
        web::resource("/doctors/{id}/")
            .route(web::get().to(get_doctor))
            .route(web::put().to(replace_doctor))
            .route(web::patch().to(patch_doctor))
            .route(web::delete().to(delete_doctor)),
    );
}
