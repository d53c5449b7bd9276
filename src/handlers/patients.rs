// Every query here is scoped to the caller's own patients.

use actix_web::{HttpResponse, web};
use serde_json::Value;
use tracing::{debug, info};

use crate::auth::AuthContext;
use crate::errors::ApiError;
use crate::handlers::not_found;
use crate::serializers;
use crate::store::Store;

// GET /patients/
pub async fn list_patients(
    store: web::Data<dyn Store>,
    auth: AuthContext,
) -> Result<HttpResponse, ApiError> {
    let owner_id = auth.user_id;
    let patients = web::block(move || store.list_patients(owner_id)).await??;
    debug!(owner_id, count = patients.len(), "Listed patients");
    Ok(HttpResponse::Ok().json(patients))
}

// POST /patients/
pub async fn create_patient(
    store: web::Data<dyn Store>,
    auth: AuthContext,
    body: web::Json<Value>,
) -> Result<HttpResponse, ApiError> {
    let new_patient = serializers::new_patient(&body, auth.user_id)?;
    let patient = web::block(move || store.create_patient(new_patient)).await??;
    info!(
        patient_id = patient.id,
        owner = %auth.username,
        "Created patient {}", patient
    );
    Ok(HttpResponse::Created().json(patient))
}

// GET /patients/{id}/
pub async fn get_patient(
    store: web::Data<dyn Store>,
    auth: AuthContext,
    path: web::Path<i32>,
) -> Result<HttpResponse, ApiError> {
    let (owner_id, id) = (auth.user_id, path.into_inner());
    match web::block(move || store.find_patient(owner_id, id)).await?? {
        Some(patient) => Ok(HttpResponse::Ok().json(patient)),
        None => Err(not_found("Patient")),
    }
}

async fn update_patient(
    store: web::Data<dyn Store>,
    owner_id: i32,
    id: i32,
    body: &Value,
    partial: bool,
) -> Result<HttpResponse, ApiError> {
    // The scoped lookup comes first: someone else's patient is a 404 whatever the body.
    let lookup = store.clone();
    if web::block(move || lookup.find_patient(owner_id, id)).await??.is_none() {
        return Err(not_found("Patient"));
    }
    let changes = serializers::patient_changes(body, partial)?;
    match web::block(move || store.update_patient(owner_id, id, changes)).await?? {
        Some(patient) => {
            info!(patient_id = patient.id, partial, "Updated patient {}", patient);
            Ok(HttpResponse::Ok().json(patient))
        }
        None => Err(not_found("Patient")),
    }
}

// PUT /patients/{id}/
pub async fn replace_patient(
    store: web::Data<dyn Store>,
    auth: AuthContext,
    path: web::Path<i32>,
    body: web::Json<Value>,
) -> Result<HttpResponse, ApiError> {
    update_patient(store, auth.user_id, path.into_inner(), &body, false).await
}

// PATCH /patients/{id}/
pub async fn patch_patient(
    store: web::Data<dyn Store>,
    auth: AuthContext,
    path: web::Path<i32>,
    body: web::Json<Value>,
) -> Result<HttpResponse, ApiError> {
    update_patient(store, auth.user_id, path.into_inner(), &body, true).await
}

// DELETE /patients/{id}/ - the patient's appointments go with it
pub async fn delete_patient(
    store: web::Data<dyn Store>,
    auth: AuthContext,
    path: web::Path<i32>,
) -> Result<HttpResponse, ApiError> {
    let (owner_id, id) = (auth.user_id, path.into_inner());
    if web::block(move || store.delete_patient(owner_id, id)).await?? {
        info!(patient_id = id, owner_id, "Deleted patient");
        Ok(HttpResponse::NoContent().finish())
    } else {
        Err(not_found("Patient"))
    }
}

pub fn patient_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/patients/")
            .route(web::get().to(list_patients))
            .route(web::post().to(create_patient)),
    )
    .service(
        web::resource("/patients/{id}/")
            .route(web::get().to(get_patient))
            .route(web::put().to(replace_patient))
            .route(web::patch().to(patch_patient))
            .route(web::delete().to(delete_patient)),
    );
}
