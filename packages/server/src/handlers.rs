//! HTTP handler functions for the geotrack API.

use actix_web::{HttpResponse, web};
use geotrack_server_models::{ApiHealth, ApiMessage, ApiSubmitResponse, ListQueryParams};
use geotrack_store::StoreError;
use geotrack_track_models::{LocationReport, ReportError};

use crate::AppState;

/// Maps a store failure to the status code and body the API promises.
fn error_response(err: &StoreError, action: &str) -> HttpResponse {
    match err {
        StoreError::Report(ReportError::InvalidTimestamp { value }) => {
            log::warn!("Rejected report with invalid timestamp {value:?}");
            HttpResponse::BadRequest().json(ApiMessage::error("Invalid timestamp format"))
        }
        StoreError::Report(report_err) => {
            log::warn!("Rejected report: {report_err}");
            HttpResponse::BadRequest().json(ApiMessage::error(report_err.to_string()))
        }
        StoreError::NotFound { id } => {
            let message = format!("Data with ID {id} not found.");
            HttpResponse::NotFound().json(ApiMessage::error(message))
        }
        StoreError::StorageUnavailable { .. } | StoreError::Corrupt { .. } => {
            log::error!("Failed to {action}: {err}");
            let message = format!("Failed to {action}");
            HttpResponse::InternalServerError().json(ApiMessage::error(message))
        }
    }
}

/// `GET /health`
pub async fn health(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(ApiHealth {
        healthy: true,
        version: env!("CARGO_PKG_VERSION").to_string(),
        backend: state.store.backend().to_string(),
    })
}

/// `POST /submit`
///
/// Stores a location report and returns its anomaly verdict.
pub async fn submit(state: web::Data<AppState>, report: web::Json<LocationReport>) -> HttpResponse {
    match state.store.append(&report).await {
        Ok(record) => {
            log::info!(
                "Saved report {} from {} (anomaly: {})",
                record.id,
                record.source_ip,
                record.anomaly
            );
            HttpResponse::Ok().json(ApiSubmitResponse::from(&record))
        }
        Err(e) => error_response(&e, "save data"),
    }
}

/// `GET /data?order=asc|desc`
///
/// Lists every stored record by timestamp, newest first unless `order=asc`.
pub async fn list(state: web::Data<AppState>, params: web::Query<ListQueryParams>) -> HttpResponse {
    match state.store.list(params.order.unwrap_or_default()).await {
        Ok(records) => HttpResponse::Ok().json(records),
        Err(e) => error_response(&e, "query data"),
    }
}

/// `GET /data/{id}`
pub async fn get(state: web::Data<AppState>, path: web::Path<u64>) -> HttpResponse {
    match state.store.get(path.into_inner()).await {
        Ok(record) => HttpResponse::Ok().json(record),
        Err(e) => error_response(&e, "query data"),
    }
}

/// `DELETE /delete/{id}`
///
/// Succeeds whether or not the record existed.
pub async fn delete_one(state: web::Data<AppState>, path: web::Path<u64>) -> HttpResponse {
    let id = path.into_inner();
    match state.store.delete_one(id).await {
        Ok(_) => {
            let message = format!("Data with ID {id} has been deleted.");
            HttpResponse::Ok().json(ApiMessage::success(message))
        }
        Err(e) => error_response(&e, "delete data"),
    }
}

/// `DELETE /delete_all`
pub async fn delete_all(state: web::Data<AppState>) -> HttpResponse {
    match state.store.delete_all().await {
        Ok(()) => HttpResponse::Ok().json(ApiMessage::success("All data has been deleted.")),
        Err(e) => error_response(&e, "delete data"),
    }
}
