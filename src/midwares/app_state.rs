use std::{net::SocketAddr, sync::Arc};

use axum::{
  extract::{ConnectInfo, Request},
  http::StatusCode,
  middleware::Next,
  response::{IntoResponse, Response},
  Json,
};
use serde::Serialize;
use serde_json::json;

use crate::engine::ledger::{BidError, BidLedger};
use crate::store::{FundPriceStore, StoreError};

/// Request context captured by the tracking middleware.
#[derive(Clone)]
pub struct RequestContext {
  pub remote_ip: String,
}

#[derive(Clone)]
pub struct AppState {
  pub store: Arc<dyn FundPriceStore>,
  pub ledger: BidLedger,
  pub image_base: String,
}

impl AppState {
  pub fn new(store: Arc<dyn FundPriceStore>, image_base: String) -> Self {
    let ledger = BidLedger::new(store.clone());
    Self { store, ledger, image_base }
  }
}

#[derive(Debug, Serialize, Clone)]
pub enum AppError {
  NotFound(String),
  AlreadySold(String),
  InsufficientFunds(String),
  BadRequest(String),
  InternalError(String),
}

impl IntoResponse for AppError {
  fn into_response(self) -> Response {
    let (status, message) = match self {
      Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
      Self::AlreadySold(msg) => (StatusCode::CONFLICT, msg),
      Self::InsufficientFunds(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg),
      Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
      Self::InternalError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
    };

    let body = Json(json!({"error": message, "code": status.as_u16()}));

    (status, body).into_response()
  }
}

impl From<BidError> for AppError {
  fn from(e: BidError) -> Self {
    let msg = e.to_string();
    match e {
      BidError::PlayerNotFound(_) | BidError::OwnerNotFound(_) => Self::NotFound(msg),
      BidError::AlreadySold { .. } => Self::AlreadySold(msg),
      BidError::InsufficientFunds { .. } => Self::InsufficientFunds(msg),
      BidError::InvalidInput(_) => Self::BadRequest(msg),
      BidError::Store(_) => Self::InternalError(msg),
    }
  }
}

impl From<StoreError> for AppError {
  fn from(e: StoreError) -> Self {
    Self::InternalError(e.to_string())
  }
}

/// Records the remote IP (proxy header first, socket address as fallback)
/// on the request extensions for handlers and log lines.
pub async fn ip_tracker(
  ConnectInfo(addr): ConnectInfo<SocketAddr>,
  mut req: Request,
  next: Next,
) -> Response {
  let remote_ip = req
    .headers()
    .get("X-Forwarded-For")
    .and_then(|h| h.to_str().ok())
    .map(|s| s.to_string())
    .unwrap_or_else(|| addr.ip().to_string());

  tracing::debug!(%remote_ip, path = %req.uri().path(), "request");

  req.extensions_mut().insert(RequestContext { remote_ip });

  next.run(req).await
}
