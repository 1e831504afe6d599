use sqlx::{postgres::PgPoolOptions, PgPool};
use tokio::sync::broadcast;

use super::{BidCommit, ChangeEvent, FundPriceStore, Owner, Player, StoreError, FEED_CAPACITY};

const PLAYER_COLS: &str = "id, name, category, start_price, bid_price, sold, owner_id";
const OWNER_COLS: &str = "owner_id, name, team_name, fund, image_url";

/// Postgres-backed store. Row-change events are published on an in-process
/// broadcast channel after each commit, standing in for the managed
/// platform's postgres_changes push.
#[derive(Clone)]
pub struct PgStore {
  pool: PgPool,
  feed: broadcast::Sender<ChangeEvent>,
}

impl PgStore {
  pub async fn new(db_url: &str) -> Result<Self, StoreError> {
    tracing::info!("postgres db pool initializing..");

    let pool = PgPoolOptions::new()
      .max_connections(8)
      .connect(db_url)
      .await
      .map_err(|e| StoreError::Database(format!("postgres connection error: {}", e)))?;

    Self::init_tables(&pool).await?;
    let (feed, _) = broadcast::channel(FEED_CAPACITY);

    Ok(Self { pool, feed })
  }

  async fn init_tables(pool: &PgPool) -> Result<(), StoreError> {
    sqlx::raw_sql(
      "
      CREATE TABLE IF NOT EXISTS owners (
        owner_id BIGINT PRIMARY KEY,
        name TEXT NOT NULL,
        team_name TEXT NOT NULL,
        fund BIGINT NOT NULL CHECK (fund >= 0),
        image_url TEXT NOT NULL DEFAULT ''
      );
      CREATE TABLE IF NOT EXISTS players (
        id BIGINT PRIMARY KEY,
        name TEXT NOT NULL,
        category TEXT NOT NULL,
        start_price BIGINT NOT NULL CHECK (start_price >= 0),
        bid_price BIGINT NOT NULL CHECK (bid_price >= 0),
        sold BOOLEAN NOT NULL DEFAULT FALSE,
        owner_id BIGINT REFERENCES owners (owner_id),
        CHECK (sold = (owner_id IS NOT NULL))
      );
      ",
    )
    .execute(pool)
    .await
    .map_err(|e| StoreError::Database(format!("failed to create tables: {}", e)))?;

    Ok(())
  }

  fn publish(&self, event: ChangeEvent) {
    // send only fails when no subscriber is connected
    let _ = self.feed.send(event);
  }
}

#[async_trait::async_trait]
impl FundPriceStore for PgStore {
  async fn get_player(&self, id: i64) -> Result<Option<Player>, StoreError> {
    let player = sqlx::query_as::<_, Player>(&format!(
      "SELECT {} FROM players WHERE id = $1",
      PLAYER_COLS
    ))
    .bind(id)
    .fetch_optional(&self.pool)
    .await?;

    Ok(player)
  }

  async fn list_players(&self) -> Result<Vec<Player>, StoreError> {
    let players = sqlx::query_as::<_, Player>(&format!(
      "SELECT {} FROM players ORDER BY id",
      PLAYER_COLS
    ))
    .fetch_all(&self.pool)
    .await?;

    Ok(players)
  }

  async fn get_owner(&self, owner_id: i64) -> Result<Option<Owner>, StoreError> {
    let owner = sqlx::query_as::<_, Owner>(&format!(
      "SELECT {} FROM owners WHERE owner_id = $1",
      OWNER_COLS
    ))
    .bind(owner_id)
    .fetch_optional(&self.pool)
    .await?;

    Ok(owner)
  }

  async fn list_owners(&self) -> Result<Vec<Owner>, StoreError> {
    let owners = sqlx::query_as::<_, Owner>(&format!(
      "SELECT {} FROM owners ORDER BY owner_id",
      OWNER_COLS
    ))
    .fetch_all(&self.pool)
    .await?;

    Ok(owners)
  }

  async fn commit_bid(
    &self,
    player_id: i64,
    owner_id: i64,
    amount: i64,
  ) -> Result<BidCommit, StoreError> {
    let mut tx = self.pool.begin().await?;

    // Lock both rows up front; an early return drops the tx and rolls back.
    let old_player = sqlx::query_as::<_, Player>(&format!(
      "SELECT {} FROM players WHERE id = $1 FOR UPDATE",
      PLAYER_COLS
    ))
    .bind(player_id)
    .fetch_optional(&mut *tx)
    .await?;

    let Some(old_player) = old_player else {
      return Ok(BidCommit::PlayerMissing);
    };
    if old_player.sold {
      return Ok(BidCommit::AlreadySold { player: old_player });
    }
    if amount < old_player.start_price {
      return Ok(BidCommit::BelowStartPrice { player: old_player });
    }

    let old_owner = sqlx::query_as::<_, Owner>(&format!(
      "SELECT {} FROM owners WHERE owner_id = $1 FOR UPDATE",
      OWNER_COLS
    ))
    .bind(owner_id)
    .fetch_optional(&mut *tx)
    .await?;

    let Some(old_owner) = old_owner else {
      return Ok(BidCommit::OwnerMissing);
    };
    if old_owner.fund < amount {
      return Ok(BidCommit::InsufficientFunds { owner: old_owner });
    }

    // The WHERE clauses repeat the checks so the writes stay conditional
    // even without the row locks above.
    let player = sqlx::query_as::<_, Player>(&format!(
      "UPDATE players SET bid_price = $2, sold = TRUE, owner_id = $3
       WHERE id = $1 AND sold = FALSE RETURNING {}",
      PLAYER_COLS
    ))
    .bind(player_id)
    .bind(amount)
    .bind(owner_id)
    .fetch_optional(&mut *tx)
    .await?;

    let Some(player) = player else {
      return Ok(BidCommit::AlreadySold { player: old_player });
    };

    let owner = sqlx::query_as::<_, Owner>(&format!(
      "UPDATE owners SET fund = fund - $2
       WHERE owner_id = $1 AND fund >= $2 RETURNING {}",
      OWNER_COLS
    ))
    .bind(owner_id)
    .bind(amount)
    .fetch_optional(&mut *tx)
    .await?;

    let Some(owner) = owner else {
      return Ok(BidCommit::InsufficientFunds { owner: old_owner });
    };

    tx.commit().await?;

    self.publish(ChangeEvent::player_update(old_player, player.clone()));
    self.publish(ChangeEvent::owner_update(old_owner, owner.clone()));

    Ok(BidCommit::Committed { player, owner })
  }

  fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
    self.feed.subscribe()
  }
}
