// src/handlers/index.rs
use actix_web::{web, HttpResponse};
use serde_json::json;

use crate::service::QueryService;

pub async fn index(service: web::Data<QueryService>) -> HttpResponse {
    let topology = service.topology();
    HttpResponse::Ok().json(json!({
        "status": "ok",
        "groups": topology.group_count(),
        "servers": topology.server_count(),
    }))
}
