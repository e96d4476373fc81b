//! Special order board refill and untimed quest rules

use std::collections::{BTreeMap, BTreeSet};

use rand::{rngs::StdRng, seq::SliceRandom, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

pub const VOIDSENT_BOARD: &str = "Aviroen.VoidsentCP";
pub const UNTIMED_PREFIX: &str = "Aviroen.VoidsentCP_Untimed";
pub const UNTIMED_DAYS_LEFT: u32 = 100;

/// Orders offered per refill.
const BOARD_SLOTS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuestDuration {
    Day,
    TwoDays,
    ThreeDays,
    Week,
    TwoWeeks,
    Month,
}

impl QuestDuration {
    pub fn days(self) -> u32 {
        match self {
            QuestDuration::Day => 1,
            QuestDuration::TwoDays => 2,
            QuestDuration::ThreeDays => 3,
            QuestDuration::Week => 7,
            QuestDuration::TwoWeeks => 14,
            QuestDuration::Month => 28,
        }
    }
}

/// Catalog entry, keyed by order key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderData {
    pub order_type: String,
    pub duration: QuestDuration,
    /// Whether the order's start conditions currently hold.
    #[serde(default = "default_can_start")]
    pub can_start: bool,
}

fn default_can_start() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecialOrder {
    pub key: String,
    pub order_type: String,
    pub duration: QuestDuration,
    pub days_left: u32,
    pub generation_seed: u32,
}

impl SpecialOrder {
    pub fn new(key: &str, data: &OrderData, generation_seed: u32) -> Self {
        Self {
            key: key.to_string(),
            order_type: data.order_type.clone(),
            duration: data.duration,
            days_left: data.duration.days(),
            generation_seed,
        }
    }

    pub fn is_untimed(&self) -> bool {
        self.key.starts_with(UNTIMED_PREFIX)
    }

    /// `base` is what the game would say; untimed orders never expire.
    pub fn is_timed(&self, base: bool) -> bool {
        base && !self.is_untimed()
    }

    pub fn days_left(&self) -> u32 {
        if self.is_untimed() {
            UNTIMED_DAYS_LEFT
        } else {
            self.days_left
        }
    }

    pub fn set_duration(&mut self, duration: QuestDuration) {
        self.duration = duration;
        self.days_left = duration.days();
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamOrders {
    pub available: Vec<SpecialOrder>,
    pub completed: BTreeSet<String>,
    pub accepted_types: BTreeSet<String>,
}

/// Seed for a refill, stable for one save and one day.
pub fn board_rng(unique_id: u64, days_played: u32) -> StdRng {
    StdRng::seed_from_u64(unique_id ^ (u64::from(days_played) * 13 / 10) ^ 0x5EC1_A10D_u64)
}

/// Restock `board_type` with up to two orders from `catalog`.
///
/// Unless `force_refresh` is set, a board that still has an order up is
/// left alone. Completed orders are only offered again once every other
/// startable order has been picked. Returns the keys added.
pub fn refill_board(
    team: &mut TeamOrders,
    catalog: &BTreeMap<String, OrderData>,
    board_type: &str,
    force_refresh: bool,
    rng: &mut impl Rng,
) -> Vec<String> {
    for order in team.available.iter_mut() {
        let short = matches!(order.duration, QuestDuration::TwoDays | QuestDuration::ThreeDays);
        if short && !team.accepted_types.contains(&order.order_type) {
            let duration = order.duration;
            order.set_duration(duration);
        }
    }

    if !force_refresh && team.available.iter().any(|order| order.order_type == board_type) {
        debug!(board_type, "board still has orders up");
        return Vec::new();
    }
    team.available.retain(|order| order.order_type != board_type);

    let mut with_completed: Vec<&String> = catalog
        .iter()
        .filter(|(_, data)| data.order_type == board_type && data.can_start)
        .map(|(key, _)| key)
        .collect();
    let mut queue: Vec<&String> = with_completed
        .iter()
        .copied()
        .filter(|key| !team.completed.contains(*key))
        .collect();

    let mut added = Vec::new();
    for _ in 0..BOARD_SLOTS {
        if queue.is_empty() {
            if with_completed.is_empty() {
                break;
            }
            queue = with_completed.clone();
        }
        let Some(&key) = queue.choose(rng) else {
            break;
        };
        let seed: u32 = rng.gen();
        if let Some(data) = catalog.get(key) {
            team.available.push(SpecialOrder::new(key, data, seed));
        }
        queue.retain(|candidate| *candidate != key);
        with_completed.retain(|candidate| *candidate != key);
        added.push(key.clone());
    }

    info!(board_type, ?added, "special order board refilled");
    added
}
