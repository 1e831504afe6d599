use serde::Serialize;

use crate::store::{Owner, Player};

/// Display row for a player: resolved owner name, formatted prices, badge
/// text, and the public image URL. Pure over its inputs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlayerRow {
  pub id: i64,
  pub name: String,
  pub category: String,
  pub start_price: String,
  pub bid_price: String,
  pub delta: i64,
  pub sold: bool,
  pub owner_name: Option<String>,
  pub status: String,
  pub image_url: String,
}

impl PlayerRow {
  pub fn project(player: &Player, owners: &[Owner], image_base: &str) -> Self {
    let owner_name = player
      .owner_id
      .and_then(|id| owners.iter().find(|o| o.owner_id == id))
      .map(|o| o.name.clone());

    let status = if player.sold {
      format!("Sold to {}", owner_name.as_deref().unwrap_or("Unknown Owner"))
    } else {
      "Not Sold".to_string()
    };

    Self {
      id: player.id,
      name: player.name.clone(),
      category: player.category.clone(),
      start_price: format_currency(player.start_price),
      bid_price: format_currency(player.bid_price),
      delta: price_delta(player),
      sold: player.sold,
      owner_name,
      status,
      image_url: player_image_url(image_base, player.id),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OwnerRow {
  pub owner_id: i64,
  pub name: String,
  pub team_name: String,
  pub fund: String,
  pub image_url: String,
}

impl OwnerRow {
  pub fn project(owner: &Owner) -> Self {
    Self {
      owner_id: owner.owner_id,
      name: owner.name.clone(),
      team_name: owner.team_name.clone(),
      fund: format_currency(owner.fund),
      image_url: owner.image_url.clone(),
    }
  }
}

/// Rupee display with Indian-system grouping: last three digits, then pairs.
pub fn format_currency(amount: i64) -> String {
  let sign = if amount < 0 { "-" } else { "" };
  let digits = amount.unsigned_abs().to_string();

  if digits.len() <= 3 {
    return format!("{}₹{}", sign, digits);
  }

  let (head, tail) = digits.split_at(digits.len() - 3);
  let mut pairs: Vec<&str> = Vec::new();
  let mut end = head.len();
  while end > 0 {
    let start = end.saturating_sub(2);
    pairs.push(&head[start..end]);
    end = start;
  }
  pairs.reverse();

  format!("{}₹{},{}", sign, pairs.join(","), tail)
}

/// Price movement since auction start; the winning owner's overpay.
pub fn price_delta(player: &Player) -> i64 {
  player.bid_price - player.start_price
}

/// Case-insensitive substring match on player name. Empty query passes all.
pub fn filter_players<'a>(players: &'a [Player], query: &str) -> Vec<&'a Player> {
  let needle = query.to_lowercase();
  players
    .iter()
    .filter(|p| p.name.to_lowercase().contains(&needle))
    .collect()
}

/// Player images live in a public bucket keyed by player id.
pub fn player_image_url(base: &str, id: i64) -> String {
  format!("{}/users_images/{}.jpg", base.trim_end_matches('/'), id)
}

#[cfg(test)]
mod tests {
  use super::*;

  fn player(id: i64, name: &str, start: i64, bid: i64, owner_id: Option<i64>) -> Player {
    Player {
      id,
      name: name.to_string(),
      category: "Bowler".to_string(),
      start_price: start,
      bid_price: bid,
      sold: owner_id.is_some(),
      owner_id,
    }
  }

  fn owner(owner_id: i64, name: &str) -> Owner {
    Owner {
      owner_id,
      name: name.to_string(),
      team_name: "Strikers".to_string(),
      fund: 5_000,
      image_url: String::new(),
    }
  }

  #[test]
  fn currency_uses_indian_grouping() {
    assert_eq!(format_currency(0), "₹0");
    assert_eq!(format_currency(500), "₹500");
    assert_eq!(format_currency(9_400), "₹9,400");
    assert_eq!(format_currency(120_000), "₹1,20,000");
    assert_eq!(format_currency(10_000_000), "₹1,00,00,000");
    assert_eq!(format_currency(-1_200), "-₹1,200");
  }

  #[test]
  fn sold_player_projects_owner_and_badge() {
    let owners = vec![owner(10, "Ravi")];
    let row = PlayerRow::project(&player(1, "Arjun", 500, 600, Some(10)), &owners, "https://cdn.example");

    assert_eq!(row.owner_name.as_deref(), Some("Ravi"));
    assert_eq!(row.status, "Sold to Ravi");
    assert_eq!(row.bid_price, "₹600");
    assert_eq!(row.delta, 100);
    assert_eq!(row.image_url, "https://cdn.example/users_images/1.jpg");
  }

  #[test]
  fn unsold_player_projects_not_sold() {
    let row = PlayerRow::project(&player(2, "Dev", 500, 500, None), &[], "https://cdn.example/");

    assert_eq!(row.owner_name, None);
    assert_eq!(row.status, "Not Sold");
    assert_eq!(row.delta, 0);
    // trailing slash on the base does not double up
    assert_eq!(row.image_url, "https://cdn.example/users_images/2.jpg");
  }

  #[test]
  fn sold_player_with_unknown_owner_keeps_badge_text() {
    let row = PlayerRow::project(&player(3, "Kiran", 100, 200, Some(42)), &[], "b");
    assert_eq!(row.status, "Sold to Unknown Owner");
    assert_eq!(row.owner_name, None);
  }

  #[test]
  fn projection_is_stable_for_identical_input() {
    let owners = vec![owner(10, "Ravi")];
    let p = player(1, "Arjun", 500, 600, Some(10));
    assert_eq!(
      PlayerRow::project(&p, &owners, "base"),
      PlayerRow::project(&p, &owners, "base")
    );
  }

  #[test]
  fn filter_matches_case_insensitive_substring() {
    let players = vec![
      player(1, "Arjun Patel", 100, 100, None),
      player(2, "Dev Sharma", 100, 100, None),
      player(3, "ARJUN Kumar", 100, 100, None),
    ];

    let hits = filter_players(&players, "arjun");
    assert_eq!(hits.iter().map(|p| p.id).collect::<Vec<_>>(), vec![1, 3]);

    assert_eq!(filter_players(&players, "").len(), 3);
    assert!(filter_players(&players, "zzz").is_empty());
  }

  #[test]
  fn owner_row_formats_fund() {
    let row = OwnerRow::project(&Owner {
      owner_id: 10,
      name: "Ravi".to_string(),
      team_name: "Strikers".to_string(),
      fund: 9_400,
      image_url: "https://cdn.example/o/10.png".to_string(),
    });
    assert_eq!(row.fund, "₹9,400");
    assert_eq!(row.team_name, "Strikers");
  }
}
