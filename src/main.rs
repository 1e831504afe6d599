mod engine;
mod feed;
mod midwares;
mod route_handlers;
mod store;

use std::{net::SocketAddr, sync::Arc};

use axum::{
  http::HeaderValue,
  middleware,
  routing::{any, get, post},
  Extension, Router,
};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tracing_subscriber::EnvFilter;

use midwares::app_state::{ip_tracker, AppState};
use store::{pg::PgStore, FundPriceStore};

const DEFAULT_IMAGE_BASE: &str = "https://zobdcchizknpihqxfodv.supabase.co/storage/v1/object/public";

#[tokio::main]
async fn main() {
  dotenvy::dotenv().ok();
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .init();

  let db_url = std::env::var("DATABASE_URL").expect("DATABASE_URL should be available!");
  let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:7575".to_string());
  let image_base =
    std::env::var("IMAGE_BASE_URL").unwrap_or_else(|_| DEFAULT_IMAGE_BASE.to_string());

  let store = PgStore::new(&db_url).await.expect("postgres store init failed");
  let store: Arc<dyn FundPriceStore> = Arc::new(store);
  let state = AppState::new(store, image_base);

  let cors = match std::env::var("ALLOWED_ORIGIN") {
    Ok(origin) => CorsLayer::new()
      .allow_origin(origin.parse::<HeaderValue>().expect("ALLOWED_ORIGIN should be a valid origin"))
      .allow_methods(Any)
      .allow_headers(Any),
    Err(_) => CorsLayer::permissive(),
  };

  let app = Router::new()
    .route("/players", get(route_handlers::rest::list_players))
    .route("/players/{id}", get(route_handlers::rest::get_player))
    .route("/owners", get(route_handlers::rest::list_owners))
    .route("/bids", post(route_handlers::rest::place_bid))
    .route("/bids/increase", post(route_handlers::rest::increase_bid))
    .route("/wsfeed", any(route_handlers::sockets::ws_handler))
    .layer(middleware::from_fn(ip_tracker))
    .layer(Extension(state))
    .layer(cors);

  let listener = TcpListener::bind(&bind_addr).await.expect("failed to start tcp listener");
  tracing::info!(%bind_addr, "auction backend listening");

  axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
    .await
    .expect("failed to start server");
}
