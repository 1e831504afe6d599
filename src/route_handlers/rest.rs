use axum::{
  extract::{Path, Query},
  Extension, Json,
};
use serde::Deserialize;

use crate::engine::ledger::BidReceipt;
use crate::engine::projections::{filter_players, OwnerRow, PlayerRow};
use crate::midwares::app_state::{AppError, AppState};

#[derive(Debug, Deserialize)]
pub struct PlayerListParams {
  /// Case-insensitive substring match on player name.
  pub search: Option<String>,
}

pub async fn list_players(
  Query(params): Query<PlayerListParams>,
  Extension(state): Extension<AppState>,
) -> Result<Json<Vec<PlayerRow>>, AppError> {
  let players = state.store.list_players().await?;
  let owners = state.store.list_owners().await?;

  let selected = match params.search.as_deref() {
    Some(query) => filter_players(&players, query),
    None => players.iter().collect(),
  };

  let rows = selected
    .into_iter()
    .map(|p| PlayerRow::project(p, &owners, &state.image_base))
    .collect();

  Ok(Json(rows))
}

pub async fn get_player(
  Path(id): Path<i64>,
  Extension(state): Extension<AppState>,
) -> Result<Json<PlayerRow>, AppError> {
  let player = state
    .store
    .get_player(id)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("player {} not found", id)))?;
  let owners = state.store.list_owners().await?;

  Ok(Json(PlayerRow::project(&player, &owners, &state.image_base)))
}

pub async fn list_owners(
  Extension(state): Extension<AppState>,
) -> Result<Json<Vec<OwnerRow>>, AppError> {
  let owners = state.store.list_owners().await?;

  Ok(Json(owners.iter().map(OwnerRow::project).collect()))
}

#[derive(Debug, Deserialize)]
pub struct BidRequest {
  pub player_id: i64,
  pub owner_id: i64,
  pub amount: i64,
}

pub async fn place_bid(
  Extension(state): Extension<AppState>,
  Json(req): Json<BidRequest>,
) -> Result<Json<BidReceipt>, AppError> {
  let receipt = state.ledger.place_bid(req.player_id, req.owner_id, req.amount).await?;

  Ok(Json(receipt))
}

#[derive(Debug, Deserialize)]
pub struct IncreaseBidRequest {
  pub player_id: i64,
  pub owner_id: i64,
  pub step: i64,
}

pub async fn increase_bid(
  Extension(state): Extension<AppState>,
  Json(req): Json<IncreaseBidRequest>,
) -> Result<Json<BidReceipt>, AppError> {
  let receipt = state.ledger.increase_bid(req.player_id, req.owner_id, req.step).await?;

  Ok(Json(receipt))
}
