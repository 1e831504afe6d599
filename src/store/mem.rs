use std::collections::BTreeMap;

use tokio::sync::{broadcast, Mutex};

use super::{BidCommit, ChangeEvent, FundPriceStore, Owner, Player, StoreError, FEED_CAPACITY};

#[derive(Default)]
struct Inner {
  players: BTreeMap<i64, Player>,
  owners: BTreeMap<i64, Owner>,
}

/// In-memory store with the same commit contract as `PgStore`. The whole
/// commit runs under one mutex guard, so it is linearizable and two racing
/// bids on the same player resolve to exactly one winner.
pub struct MemStore {
  inner: Mutex<Inner>,
  feed: broadcast::Sender<ChangeEvent>,
}

impl MemStore {
  pub fn new() -> Self {
    let (feed, _) = broadcast::channel(FEED_CAPACITY);
    Self { inner: Mutex::new(Inner::default()), feed }
  }

  pub async fn insert_player(&self, player: Player) {
    let mut inner = self.inner.lock().await;
    inner.players.insert(player.id, player.clone());
    let _ = self.feed.send(ChangeEvent::player_insert(player));
  }

  pub async fn insert_owner(&self, owner: Owner) {
    let mut inner = self.inner.lock().await;
    inner.owners.insert(owner.owner_id, owner.clone());
    let _ = self.feed.send(ChangeEvent::owner_insert(owner));
  }

  pub fn feed_receiver_count(&self) -> usize {
    self.feed.receiver_count()
  }
}

impl Default for MemStore {
  fn default() -> Self {
    Self::new()
  }
}

#[async_trait::async_trait]
impl FundPriceStore for MemStore {
  async fn get_player(&self, id: i64) -> Result<Option<Player>, StoreError> {
    Ok(self.inner.lock().await.players.get(&id).cloned())
  }

  async fn list_players(&self) -> Result<Vec<Player>, StoreError> {
    Ok(self.inner.lock().await.players.values().cloned().collect())
  }

  async fn get_owner(&self, owner_id: i64) -> Result<Option<Owner>, StoreError> {
    Ok(self.inner.lock().await.owners.get(&owner_id).cloned())
  }

  async fn list_owners(&self) -> Result<Vec<Owner>, StoreError> {
    Ok(self.inner.lock().await.owners.values().cloned().collect())
  }

  async fn commit_bid(
    &self,
    player_id: i64,
    owner_id: i64,
    amount: i64,
  ) -> Result<BidCommit, StoreError> {
    let mut inner = self.inner.lock().await;

    let Some(old_player) = inner.players.get(&player_id).cloned() else {
      return Ok(BidCommit::PlayerMissing);
    };
    if old_player.sold {
      return Ok(BidCommit::AlreadySold { player: old_player });
    }
    if amount < old_player.start_price {
      return Ok(BidCommit::BelowStartPrice { player: old_player });
    }

    let Some(old_owner) = inner.owners.get(&owner_id).cloned() else {
      return Ok(BidCommit::OwnerMissing);
    };
    if old_owner.fund < amount {
      return Ok(BidCommit::InsufficientFunds { owner: old_owner });
    }

    let player = Player {
      bid_price: amount,
      sold: true,
      owner_id: Some(owner_id),
      ..old_player.clone()
    };
    let owner = Owner { fund: old_owner.fund - amount, ..old_owner.clone() };
    inner.players.insert(player_id, player.clone());
    inner.owners.insert(owner_id, owner.clone());

    let _ = self.feed.send(ChangeEvent::player_update(old_player, player.clone()));
    let _ = self.feed.send(ChangeEvent::owner_update(old_owner, owner.clone()));

    Ok(BidCommit::Committed { player, owner })
  }

  fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
    self.feed.subscribe()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn player(id: i64, start_price: i64) -> Player {
    Player {
      id,
      name: format!("Player {}", id),
      category: "Batsman".to_string(),
      start_price,
      bid_price: start_price,
      sold: false,
      owner_id: None,
    }
  }

  fn owner(owner_id: i64, fund: i64) -> Owner {
    Owner {
      owner_id,
      name: format!("Owner {}", owner_id),
      team_name: format!("Team {}", owner_id),
      fund,
      image_url: String::new(),
    }
  }

  #[tokio::test]
  async fn commit_updates_both_rows() {
    let store = MemStore::new();
    store.insert_player(player(1, 500)).await;
    store.insert_owner(owner(10, 10_000)).await;

    let commit = store.commit_bid(1, 10, 600).await.unwrap();
    let BidCommit::Committed { player, owner } = commit else {
      panic!("expected committed, got {:?}", commit);
    };
    assert_eq!(player.bid_price, 600);
    assert!(player.sold);
    assert_eq!(player.owner_id, Some(10));
    assert_eq!(owner.fund, 9_400);
  }

  #[tokio::test]
  async fn rejected_commit_mutates_nothing() {
    let store = MemStore::new();
    store.insert_player(player(1, 500)).await;
    store.insert_owner(owner(10, 100)).await;

    let commit = store.commit_bid(1, 10, 500).await.unwrap();
    assert!(matches!(commit, BidCommit::InsufficientFunds { .. }));

    let p = store.get_player(1).await.unwrap().unwrap();
    let o = store.get_owner(10).await.unwrap().unwrap();
    assert!(!p.sold);
    assert_eq!(p.bid_price, 500);
    assert_eq!(o.fund, 100);
  }

  #[tokio::test]
  async fn sold_gate_applies_at_commit_time() {
    let store = MemStore::new();
    store.insert_player(player(1, 500)).await;
    store.insert_owner(owner(10, 10_000)).await;
    store.insert_owner(owner(11, 10_000)).await;

    assert!(matches!(
      store.commit_bid(1, 10, 600).await.unwrap(),
      BidCommit::Committed { .. }
    ));
    assert!(matches!(
      store.commit_bid(1, 11, 700).await.unwrap(),
      BidCommit::AlreadySold { .. }
    ));
    // the losing owner keeps their full fund
    assert_eq!(store.get_owner(11).await.unwrap().unwrap().fund, 10_000);
  }

  #[tokio::test]
  async fn below_start_price_is_rejected() {
    let store = MemStore::new();
    store.insert_player(player(1, 500)).await;
    store.insert_owner(owner(10, 10_000)).await;

    let commit = store.commit_bid(1, 10, 400).await.unwrap();
    assert!(matches!(commit, BidCommit::BelowStartPrice { .. }));
    assert!(!store.get_player(1).await.unwrap().unwrap().sold);
  }

  #[tokio::test]
  async fn missing_rows_classify() {
    let store = MemStore::new();
    store.insert_owner(owner(10, 1_000)).await;

    assert!(matches!(store.commit_bid(99, 10, 100).await.unwrap(), BidCommit::PlayerMissing));

    store.insert_player(player(1, 100)).await;
    assert!(matches!(store.commit_bid(1, 99, 100).await.unwrap(), BidCommit::OwnerMissing));
  }

  #[tokio::test]
  async fn dropping_receiver_unsubscribes() {
    let store = MemStore::new();
    let rx = store.subscribe();
    assert_eq!(store.feed_receiver_count(), 1);
    drop(rx);
    assert_eq!(store.feed_receiver_count(), 0);
  }
}
