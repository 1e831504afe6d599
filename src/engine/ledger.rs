use std::sync::Arc;

use serde::Serialize;

use crate::store::{BidCommit, FundPriceStore, Owner, Player, StoreError};

/// Post-commit snapshots of the two rows a bid touched.
#[derive(Debug, Clone, Serialize)]
pub struct BidReceipt {
  pub player: Player,
  pub owner: Owner,
}

#[derive(Debug, Clone)]
pub enum BidError {
  PlayerNotFound(i64),
  OwnerNotFound(i64),
  InsufficientFunds { owner_name: String, fund: i64, amount: i64 },
  AlreadySold { player_id: i64, owner_id: Option<i64> },
  InvalidInput(String),
  Store(StoreError),
}

impl std::fmt::Display for BidError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Self::PlayerNotFound(id) => write!(f, "player {} not found", id),
      Self::OwnerNotFound(id) => write!(f, "owner {} not found", id),
      Self::InsufficientFunds { owner_name, fund, amount } => write!(
        f,
        "insufficient funds: {} has only ₹{} of the ₹{} bid (short by ₹{})",
        owner_name,
        fund,
        amount,
        amount - fund
      ),
      Self::AlreadySold { player_id, owner_id } => match owner_id {
        Some(owner_id) => write!(f, "player {} already sold to owner {}", player_id, owner_id),
        None => write!(f, "player {} already sold", player_id),
      },
      Self::InvalidInput(msg) => write!(f, "invalid bid: {}", msg),
      Self::Store(e) => write!(f, "{}", e),
    }
  }
}

impl From<StoreError> for BidError {
  fn from(e: StoreError) -> Self {
    Self::Store(e)
  }
}

/// The bid placement protocol. Stateless over the store: every call
/// re-reads, every mutation goes through the store's single conditional
/// commit, and no failure leaves a partial write behind.
#[derive(Clone)]
pub struct BidLedger {
  store: Arc<dyn FundPriceStore>,
}

impl BidLedger {
  pub fn new(store: Arc<dyn FundPriceStore>) -> Self {
    Self { store }
  }

  /// Sell `player_id` to `owner_id` at `amount`, debiting the owner's fund.
  /// Fails with a typed reason and no side effect otherwise; a player that
  /// is already sold is rejected regardless of which flow bids on it.
  pub async fn place_bid(
    &self,
    player_id: i64,
    owner_id: i64,
    amount: i64,
  ) -> Result<BidReceipt, BidError> {
    if amount <= 0 {
      return Err(BidError::InvalidInput(format!(
        "bid amount must be positive, got {}",
        amount
      )));
    }

    match self.store.commit_bid(player_id, owner_id, amount).await? {
      BidCommit::Committed { player, owner } => {
        tracing::info!(player_id, owner_id, amount, fund_left = owner.fund, "bid accepted");
        Ok(BidReceipt { player, owner })
      }
      BidCommit::PlayerMissing => Err(BidError::PlayerNotFound(player_id)),
      BidCommit::OwnerMissing => Err(BidError::OwnerNotFound(owner_id)),
      BidCommit::AlreadySold { player } => {
        Err(BidError::AlreadySold { player_id, owner_id: player.owner_id })
      }
      BidCommit::BelowStartPrice { player } => Err(BidError::InvalidInput(format!(
        "bid of ₹{} is below the start price of ₹{}",
        amount, player.start_price
      ))),
      BidCommit::InsufficientFunds { owner } => Err(BidError::InsufficientFunds {
        owner_name: owner.name,
        fund: owner.fund,
        amount,
      }),
    }
  }

  /// Quick-bid flow: current bid price plus a fixed step. A composition
  /// over `place_bid`, with no validation of its own beyond the step sign.
  pub async fn increase_bid(
    &self,
    player_id: i64,
    owner_id: i64,
    step: i64,
  ) -> Result<BidReceipt, BidError> {
    if step <= 0 {
      return Err(BidError::InvalidInput(format!(
        "bid increment must be positive, got {}",
        step
      )));
    }

    let player = self
      .store
      .get_player(player_id)
      .await?
      .ok_or(BidError::PlayerNotFound(player_id))?;

    self.place_bid(player_id, owner_id, player.bid_price + step).await
  }
}
