// src/handlers/refresh.rs
use actix_web::{web, HttpRequest, HttpResponse};
use log::{info, warn};
use serde::Deserialize;

use crate::config::Config;
use crate::service::QueryService;
use crate::utils::RequestError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefreshItem {
    Config,
    Maps,
    All,
}

#[derive(Debug, Deserialize)]
pub struct RefreshParams {
    pub item: Option<RefreshItem>,
}

pub async fn refresh(
    req: HttpRequest,
    service: web::Data<QueryService>,
    config: web::Data<Config>,
    params: web::Query<RefreshParams>,
) -> Result<HttpResponse, RequestError> {
    if let Some(expected) = &config.refresh_token {
        let given = req
            .headers()
            .get("X-Refresh-Token")
            .and_then(|v| v.to_str().ok());
        if given != Some(expected.as_str()) {
            warn!("Refresh rejected: bad token");
            return Err(RequestError::RefreshDenied);
        }
    }

    let item = params.into_inner().item.unwrap_or(RefreshItem::All);
    let reload_config = matches!(item, RefreshItem::Config | RefreshItem::All);
    let reload_maps = matches!(item, RefreshItem::Maps | RefreshItem::All);

    if reload_config {
        service.reload_config(&config.config_path)?;
    }
    if reload_maps {
        let path = service.settings().mapnames_db.clone();
        service.reload_mapnames(&path)?;
    }
    info!("Refreshed {:?}", item);
    Ok(HttpResponse::Ok().body(format!("Refreshed {:?}", item).to_lowercase()))
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::Arc;

    use actix_web::{test, App};

    use super::*;
    use crate::config::QueryConfig;
    use crate::storage::cache::testing::{FakeClient, ManualClock};
    use crate::storage::cache::Clock;

    fn write_files(tag: &str) -> (PathBuf, PathBuf) {
        let dir = std::env::temp_dir();
        let maps = dir.join(format!("srcquery-refresh-{}-{}-maps.toml", tag, std::process::id()));
        let conf = dir.join(format!("srcquery-refresh-{}-{}.toml", tag, std::process::id()));
        std::fs::write(
            &maps,
            "[[mapnames]]\nname = \"Dead Center\"\nmaps = [\"c1m1_hotel\"]\n",
        )
        .unwrap();
        std::fs::write(
            &conf,
            format!(
                "[srcquery]\ncache_delay = 45\nmapnames_db = {:?}\n\n\
                 [[srcquery.server_groups]]\nname = \"fresh\"\n",
                maps.display().to_string()
            ),
        )
        .unwrap();
        (conf, maps)
    }

    fn service() -> QueryService {
        let config = QueryConfig::parse("[srcquery]\n", std::path::Path::new("x.toml")).unwrap();
        let clock: Arc<dyn Clock> = ManualClock::at(0);
        QueryService::with_client(&config, Arc::new(FakeClient::default()), Some(clock))
    }

    #[actix_web::test]
    async fn reloads_config_and_maps_with_token() {
        let (conf, maps) = write_files("ok");
        let config = Config {
            config_path: conf.clone(),
            refresh_token: Some("secret".into()),
            ..Config::default()
        };
        let service = web::Data::new(service());
        let app = test::init_service(
            App::new()
                .app_data(service.clone())
                .app_data(web::Data::new(config))
                .route("/refresh", web::post().to(refresh)),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/refresh")
            .insert_header(("X-Refresh-Token", "secret"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        std::fs::remove_file(conf).ok();
        std::fs::remove_file(maps).ok();

        assert!(resp.status().is_success());
        assert!(service.topology().group("fresh").is_some());
        assert!(service.maps().lookup("c1m1_hotel").is_some());
        assert_eq!(service.cache().ttl().as_secs(), 45);
    }

    #[actix_web::test]
    async fn rejects_missing_token() {
        let config = Config {
            refresh_token: Some("secret".into()),
            ..Config::default()
        };
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(service()))
                .app_data(web::Data::new(config))
                .route("/refresh", web::post().to(refresh)),
        )
        .await;

        let req = test::TestRequest::post().uri("/refresh?item=maps").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 403);
    }
}
