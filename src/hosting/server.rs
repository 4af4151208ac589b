use super::session;
use crate::gameroom::RoomManager;
use crate::settings::Settings;
use crate::storage::CacheStore;
use crate::storage::DurableStore;
use actix_cors::Cors;
use actix_web::App;
use actix_web::HttpRequest;
use actix_web::HttpResponse;
use actix_web::HttpServer;
use actix_web::Responder;
use actix_web::middleware::Logger;
use actix_web::web;
use std::sync::Arc;

pub struct Server;

impl Server {
    /// Wires the stores and the room registry, spawns the idle-room
    /// sweeper, and serves the health endpoint plus the websocket route.
    pub async fn run(settings: Settings) -> anyhow::Result<()> {
        let settings = Arc::new(settings);
        let cache = CacheStore::connect(settings.redis_url.as_deref()).await;
        let durable = DurableStore::connect(settings.db_url.as_deref()).await?;
        let rooms = web::Data::new(RoomManager::new(cache, durable, settings.clone()));
        tokio::spawn(rooms.clone().into_inner().sweep_idle());
        log::info!("starting {} on {}", settings.app_name, settings.bind_addr);
        let bind = settings.bind_addr.clone();
        let state = settings.clone();
        HttpServer::new(move || {
            App::new()
                .wrap(Logger::new("%r %s %Ts"))
                .wrap(cors(&state.cors_allow_origins))
                .app_data(rooms.clone())
                .app_data(web::Data::from(state.clone()))
                .route("/health", web::get().to(health))
                .route(&state.ws_path, web::get().to(connect))
        })
        .bind(bind.as_str())?
        .run()
        .await?;
        Ok(())
    }
}

fn cors(origins: &[String]) -> Cors {
    if origins.iter().any(|origin| origin == "*") {
        Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
    } else {
        origins
            .iter()
            .fold(Cors::default(), |cors, origin| cors.allowed_origin(origin))
            .allow_any_method()
            .allow_any_header()
    }
}

async fn health() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({ "status": "ok" }))
}

/// Accepts the websocket handshake and hands the session to its own task;
/// everything after the upgrade lives in `session::run`.
async fn connect(
    req: HttpRequest,
    body: web::Payload,
    rooms: web::Data<RoomManager>,
    settings: web::Data<Settings>,
) -> actix_web::Result<HttpResponse> {
    let (response, session, stream) = actix_ws::handle(&req, body)?;
    let ip = req
        .peer_addr()
        .map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| String::from("unknown"));
    actix_web::rt::spawn(session::run(
        session,
        stream,
        rooms.into_inner(),
        settings.into_inner(),
        ip,
    ));
    Ok(response)
}
