pub mod mem;
pub mod pg;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

// Capacity of the row-change broadcast channel. A receiver that falls more
// than this far behind gets a Lagged error and must resync from a snapshot.
pub const FEED_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Player {
  pub id: i64,
  pub name: String,
  pub category: String,
  pub start_price: i64,
  pub bid_price: i64,
  pub sold: bool,
  pub owner_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Owner {
  pub owner_id: i64,
  pub name: String,
  pub team_name: String,
  pub fund: i64,
  pub image_url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
  Insert,
  Update,
  Delete,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowChange<T> {
  pub event: EventKind,
  pub old_row: Option<T>,
  pub new_row: Option<T>,
}

/// One row-level mutation observed at the store, tagged by table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "table", rename_all = "snake_case")]
pub enum ChangeEvent {
  Players(RowChange<Player>),
  Owners(RowChange<Owner>),
}

impl ChangeEvent {
  pub fn player_update(old_row: Player, new_row: Player) -> Self {
    Self::Players(RowChange {
      event: EventKind::Update,
      old_row: Some(old_row),
      new_row: Some(new_row),
    })
  }

  pub fn player_insert(new_row: Player) -> Self {
    Self::Players(RowChange { event: EventKind::Insert, old_row: None, new_row: Some(new_row) })
  }

  pub fn owner_update(old_row: Owner, new_row: Owner) -> Self {
    Self::Owners(RowChange {
      event: EventKind::Update,
      old_row: Some(old_row),
      new_row: Some(new_row),
    })
  }

  pub fn owner_insert(new_row: Owner) -> Self {
    Self::Owners(RowChange { event: EventKind::Insert, old_row: None, new_row: Some(new_row) })
  }
}

#[derive(Debug, Clone, Serialize)]
pub enum StoreError {
  Database(String),
}

impl std::fmt::Display for StoreError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Self::Database(msg) => write!(f, "store error: {}", msg),
    }
  }
}

impl From<sqlx::Error> for StoreError {
  fn from(e: sqlx::Error) -> Self {
    Self::Database(e.to_string())
  }
}

/// Outcome of the conditional bid commit. Anything but `Committed` means the
/// store rolled back and neither row changed; the rejected-state rows are
/// returned so callers can build a useful message without a second read.
#[derive(Debug, Clone)]
pub enum BidCommit {
  Committed { player: Player, owner: Owner },
  PlayerMissing,
  OwnerMissing,
  AlreadySold { player: Player },
  BelowStartPrice { player: Player },
  InsufficientFunds { owner: Owner },
}

/// The fund/price store: durable player and owner rows, point and list
/// reads, one conditional multi-row write, and a row-change subscription.
#[async_trait]
pub trait FundPriceStore: Send + Sync {
  async fn get_player(&self, id: i64) -> Result<Option<Player>, StoreError>;

  async fn list_players(&self) -> Result<Vec<Player>, StoreError>;

  async fn get_owner(&self, owner_id: i64) -> Result<Option<Owner>, StoreError>;

  async fn list_owners(&self) -> Result<Vec<Owner>, StoreError>;

  /// Atomically sell `player_id` to `owner_id` at `amount` and debit the
  /// owner's fund by the same amount. Succeeds only if the player exists and
  /// is unsold, `amount` is at or above the player's start price, and the
  /// owner exists with `fund >= amount`. Both writes land or neither does,
  /// so two racing bids on one player can never both commit.
  async fn commit_bid(
    &self,
    player_id: i64,
    owner_id: i64,
    amount: i64,
  ) -> Result<BidCommit, StoreError>;

  /// Register for row-change events. Dropping the receiver unsubscribes.
  fn subscribe(&self) -> broadcast::Receiver<ChangeEvent>;
}
