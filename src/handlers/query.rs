// src/handlers/query.rs
use actix_web::{web, HttpRequest, HttpResponse};
use log::{debug, error};
use serde::Deserialize;

use crate::format::Formatter;
use crate::models::query::QueryResult;
use crate::service::QueryService;
use crate::utils::{check_rate, peer_ip, IpRateLimiter, RequestError};

#[derive(Debug, Default, Deserialize)]
pub struct QueryParams {
    pub group: Option<String>,
    /// Chat session identifier, used to pick the group when `group` is absent.
    pub session: Option<String>,
    #[serde(default)]
    pub q: String,
    pub format: Option<String>,
}

fn respond(
    service: &QueryService,
    result: &QueryResult,
    text: &str,
    format: Option<&str>,
) -> HttpResponse {
    match format {
        Some("text") => {
            let maps = service.maps();
            let settings = service.settings();
            let body = Formatter::new(&maps, &settings.fmt.time).result(result, text);
            HttpResponse::Ok().content_type("text/plain; charset=utf-8").body(body)
        }
        _ => HttpResponse::Ok().json(result),
    }
}

pub async fn query(
    req: HttpRequest,
    service: web::Data<QueryService>,
    params: web::Query<QueryParams>,
    rate_limiter: web::Data<IpRateLimiter>,
) -> Result<HttpResponse, RequestError> {
    check_rate(&rate_limiter, peer_ip(&req)?)?;

    let group = params
        .group
        .clone()
        .or_else(|| params.session.as_deref().and_then(|s| service.group_for_session(s)));
    debug!("Query {:?} for group {:?}", params.q, group);

    let result = service.query(group.as_deref(), &params.q).await.map_err(|e| {
        error!("Query failed: {}", e);
        RequestError::from(e)
    })?;
    Ok(respond(&service, &result, &params.q, params.format.as_deref()))
}

#[derive(Debug, Default, Deserialize)]
pub struct FormatParams {
    pub format: Option<String>,
}

pub async fn server(
    req: HttpRequest,
    service: web::Data<QueryService>,
    path: web::Path<(String, String)>,
    params: web::Query<FormatParams>,
    rate_limiter: web::Data<IpRateLimiter>,
) -> Result<HttpResponse, RequestError> {
    check_rate(&rate_limiter, peer_ip(&req)?)?;

    let (group, name) = path.into_inner();
    let result = service.query_server(&name, &group).await.map_err(|e| {
        error!("Server lookup failed: {}", e);
        RequestError::from(e)
    })?;
    Ok(respond(&service, &result, &name, params.format.as_deref()))
}
