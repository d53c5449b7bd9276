// Appointments are not owner-scoped, unlike patients.

use actix_web::{HttpResponse, web};
use serde_json::Value;
use tracing::info;

use crate::auth::AuthContext;
use crate::errors::ApiError;
use crate::handlers::not_found;
use crate::serializers;
use crate::store::Store;

// GET /appointments/
pub async fn list_appointments(
    store: web::Data<dyn Store>,
    _auth: AuthContext,
) -> Result<HttpResponse, ApiError> {
    let appointments = web::block(move || store.list_appointments()).await??;
    Ok(HttpResponse::Ok().json(appointments))
}

// POST /appointments/
pub async fn create_appointment(
    store: web::Data<dyn Store>,
    auth: AuthContext,
    body: web::Json<Value>,
) -> Result<HttpResponse, ApiError> {
    let new_appointment = serializers::new_appointment(&body)?;
    let appointment = web::block(move || store.create_appointment(new_appointment)).await??;
    info!(
        appointment_id = appointment.id,
        patient_id = appointment.patient_id,
        doctor_id = appointment.doctor_id,
        by = %auth.username,
        "Created appointment"
    );
    Ok(HttpResponse::Created().json(appointment))
}

// GET /appointments/{id}/
pub async fn get_appointment(
    store: web::Data<dyn Store>,
    _auth: AuthContext,
    path: web::Path<i32>,
) -> Result<HttpResponse, ApiError> {
    let id = path.into_inner();
    match web::block(move || store.find_appointment(id)).await?? {
        Some(appointment) => Ok(HttpResponse::Ok().json(appointment)),
        None => Err(not_found("Appointment")),
    }
}

async fn update_appointment(
    store: web::Data<dyn Store>,
    id: i32,
    body: &Value,
    partial: bool,
) -> Result<HttpResponse, ApiError> {
    let lookup = store.clone();
    if web::block(move || lookup.find_appointment(id)).await??.is_none() {
        return Err(not_found("Appointment"));
    }
    let changes = serializers::appointment_changes(body, partial)?;
    match web::block(move || store.update_appointment(id, changes)).await?? {
        Some(appointment) => {
            info!(appointment_id = appointment.id, partial, "Updated appointment");
            Ok(HttpResponse::Ok().json(appointment))
        }
        None => Err(not_found("Appointment")),
    }
}

// PUT /appointments/{id}/
pub async fn replace_appointment(
    store: web::Data<dyn Store>,
    _auth: AuthContext,
    path: web::Path<i32>,
    body: web::Json<Value>,
) -> Result<HttpResponse, ApiError> {
    update_appointment(store, path.into_inner(), &body, false).await
}

// PATCH /appointments/{id}/
pub async fn patch_appointment(
    store: web::Data<dyn Store>,
    _auth: AuthContext,
    path: web::Path<i32>,
    body: web::Json<Value>,
) -> Result<HttpResponse, ApiError> {
    update_appointment(store, path.into_inner(), &body, true).await
}

// DELETE /appointments/{id}/
pub async fn delete_appointment(
    store: web::Data<dyn Store>,
    _auth: AuthContext,
    path: web::Path<i32>,
) -> Result<HttpResponse, ApiError> {
    let id = path.into_inner();
    if web::block(move || store.delete_appointment(id)).await?? {
        info!(appointment_id = id, "Deleted appointment");
        Ok(HttpResponse::NoContent().finish())
    } else {
        Err(not_found("Appointment"))
    }
}

pub fn appointment_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/appointments/")
            .route(web::get().to(list_appointments))
            .route(web::post().to(create_appointment)),
    )
    .service(
        web::resource("/appointments/{id}/")
            .route(web::get().to(get_appointment))
            .route(web::put().to(replace_appointment))
            .route(web::patch().to(patch_appointment))
            .route(web::delete().to(delete_appointment)),
    );
}
