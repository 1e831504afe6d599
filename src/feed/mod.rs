use tokio::sync::broadcast::{self, error::RecvError};

use crate::store::{ChangeEvent, RowChange};

/// Which rows a feed consumer wants. Owner changes always pass (the owners
/// panel shows every fund); player changes can be narrowed to the one row a
/// player page is watching.
#[derive(Debug, Clone, Copy, Default)]
pub struct FeedFilter {
  pub player_id: Option<i64>,
}

impl FeedFilter {
  fn admits(&self, event: &ChangeEvent) -> bool {
    match event {
      ChangeEvent::Owners(_) => true,
      ChangeEvent::Players(change) => match self.player_id {
        None => true,
        Some(id) => row_id(change) == Some(id),
      },
    }
  }
}

fn row_id(change: &RowChange<crate::store::Player>) -> Option<i64> {
  change
    .new_row
    .as_ref()
    .or(change.old_row.as_ref())
    .map(|p| p.id)
}

#[derive(Debug, Clone, PartialEq)]
pub enum FeedItem {
  Event(ChangeEvent),
  /// The subscription missed events; the consumer must re-fetch the full
  /// collections instead of patching incrementally.
  Resync,
}

/// Typed pass-through from the store's row-change subscription to one
/// consumer. Holds the subscription slot for exactly its own lifetime;
/// dropping the adapter unsubscribes.
pub struct ChangeFeedAdapter {
  rx: broadcast::Receiver<ChangeEvent>,
  filter: FeedFilter,
}

impl ChangeFeedAdapter {
  pub fn new(rx: broadcast::Receiver<ChangeEvent>, filter: FeedFilter) -> Self {
    Self { rx, filter }
  }

  /// Next event passing the filter, `Resync` after a lag, or `None` once
  /// the store side has shut down.
  pub async fn next(&mut self) -> Option<FeedItem> {
    loop {
      match self.rx.recv().await {
        Ok(event) => {
          if self.filter.admits(&event) {
            return Some(FeedItem::Event(event));
          }
        }
        Err(RecvError::Lagged(skipped)) => {
          tracing::warn!(skipped, "change feed lagged, forcing resync");
          return Some(FeedItem::Resync);
        }
        Err(RecvError::Closed) => return None,
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::store::mem::MemStore;
  use crate::store::{BidCommit, EventKind, FundPriceStore, Owner, Player};

  fn player(id: i64, start_price: i64) -> Player {
    Player {
      id,
      name: format!("Player {}", id),
      category: "Keeper".to_string(),
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
  async fn subscriber_sees_bid_mutations_without_refetch() {
    let store = MemStore::new();
    store.insert_player(player(1, 500)).await;
    store.insert_owner(owner(10, 10_000)).await;

    let mut feed = ChangeFeedAdapter::new(store.subscribe(), FeedFilter::default());
    let commit = store.commit_bid(1, 10, 600).await.unwrap();
    assert!(matches!(commit, BidCommit::Committed { .. }));

    let Some(FeedItem::Event(ChangeEvent::Players(change))) = feed.next().await else {
      panic!("expected a player change first");
    };
    assert_eq!(change.event, EventKind::Update);
    assert_eq!(change.new_row.as_ref().unwrap().bid_price, 600);
    assert!(change.new_row.as_ref().unwrap().sold);
    assert!(!change.old_row.as_ref().unwrap().sold);

    let Some(FeedItem::Event(ChangeEvent::Owners(change))) = feed.next().await else {
      panic!("expected an owner change second");
    };
    assert_eq!(change.event, EventKind::Update);
    assert_eq!(change.new_row.as_ref().unwrap().fund, 9_400);
    assert_eq!(change.old_row.as_ref().unwrap().fund, 10_000);
  }

  #[tokio::test]
  async fn player_filter_drops_other_rows_but_not_owners() {
    let store = MemStore::new();
    store.insert_player(player(1, 500)).await;
    store.insert_player(player(2, 500)).await;
    store.insert_owner(owner(10, 10_000)).await;

    let mut feed =
      ChangeFeedAdapter::new(store.subscribe(), FeedFilter { player_id: Some(2) });

    // player 1 sells; its player event is filtered, the owner event is not
    store.commit_bid(1, 10, 600).await.unwrap();
    let Some(FeedItem::Event(ChangeEvent::Owners(_))) = feed.next().await else {
      panic!("expected only the owner change to pass the filter");
    };

    // the watched player sells; its own event comes through
    store.commit_bid(2, 10, 700).await.unwrap();
    let Some(FeedItem::Event(ChangeEvent::Players(change))) = feed.next().await else {
      panic!("expected the watched player change");
    };
    assert_eq!(change.new_row.unwrap().id, 2);
  }

  #[tokio::test]
  async fn lagged_subscription_yields_resync() {
    let store = MemStore::new();
    store.insert_owner(owner(10, i64::MAX / 2)).await;
    for id in 1..=600 {
      store.insert_player(player(id, 100)).await;
    }

    // subscribe, then overflow the channel before reading anything
    let mut feed = ChangeFeedAdapter::new(store.subscribe(), FeedFilter::default());
    for id in 1..=600 {
      store.commit_bid(id, 10, 100).await.unwrap();
    }

    assert_eq!(feed.next().await, Some(FeedItem::Resync));
  }

  #[tokio::test]
  async fn closed_feed_ends_the_stream() {
    let store = MemStore::new();
    let mut feed = ChangeFeedAdapter::new(store.subscribe(), FeedFilter::default());
    drop(store);
    assert_eq!(feed.next().await, None);
  }
}
