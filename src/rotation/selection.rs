//! Selection engine
//!
//! Chooses which drafts become active. The weighted mode splits the target
//! 50/30/20 across the `new`, `slightly-used` and `used` groups, samples
//! each group uniformly without replacement, then backfills any shortfall
//! from the tagged products left over. Untagged drafts are never chosen.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use crate::models::{CategoryTag, Product};

/// How activation candidates are picked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectionMode {
    /// Tag-weighted random sample
    #[default]
    Weighted,
    /// First drafts in catalog order
    Fifo,
}

impl fmt::Display for SelectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Weighted => f.write_str("weighted"),
            Self::Fifo => f.write_str("fifo"),
        }
    }
}

impl FromStr for SelectionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "weighted" => Ok(Self::Weighted),
            "fifo" => Ok(Self::Fifo),
            other => Err(format!("unknown selection mode '{other}'")),
        }
    }
}

/// Per-category share of an activation target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quotas {
    pub new: usize,
    pub slightly_used: usize,
    pub used: usize,
}

impl Quotas {
    /// Split `target` as floor(50%), floor(30%) and the remainder
    pub fn for_target(target: usize) -> Self {
        let new = target / 2;
        let slightly_used = target * 3 / 10;
        Self {
            new,
            slightly_used,
            used: target - new - slightly_used,
        }
    }

    pub fn get(&self, category: CategoryTag) -> usize {
        match category {
            CategoryTag::New => self.new,
            CategoryTag::SlightlyUsed => self.slightly_used,
            CategoryTag::Used => self.used,
        }
    }

    pub fn total(&self) -> usize {
        self.new + self.slightly_used + self.used
    }
}

/// Number of products to activate this run
pub fn target_count(active_limit: usize, draft_pool: usize) -> usize {
    active_limit.min(draft_pool)
}

/// Every current active product is deactivated
pub fn select_deactivation(active_pool: &[Product]) -> Vec<Product> {
    active_pool.to_vec()
}

/// Weighted random selection over the draft pool
pub fn select_weighted<R: Rng + ?Sized>(
    draft_pool: &[Product],
    target: usize,
    rng: &mut R,
) -> Vec<Product> {
    let quotas = Quotas::for_target(target);
    let mut chosen: Vec<usize> = Vec::with_capacity(target);

    for category in CategoryTag::all() {
        let group: Vec<usize> = draft_pool
            .iter()
            .enumerate()
            .filter(|(_, p)| p.category() == Some(category))
            .map(|(i, _)| i)
            .collect();
        chosen.extend(group.choose_multiple(rng, quotas.get(category)).copied());
    }

    if chosen.len() < target {
        let taken: HashSet<usize> = chosen.iter().copied().collect();
        let leftover: Vec<usize> = draft_pool
            .iter()
            .enumerate()
            .filter(|(i, p)| p.category().is_some() && !taken.contains(i))
            .map(|(i, _)| i)
            .collect();
        let shortfall = target - chosen.len();
        chosen.extend(leftover.choose_multiple(rng, shortfall).copied());
    }

    chosen.into_iter().map(|i| draft_pool[i].clone()).collect()
}

/// First `target` drafts in catalog order
pub fn select_fifo(draft_pool: &[Product], target: usize) -> Vec<Product> {
    draft_pool.iter().take(target).cloned().collect()
}

/// Activation selection for the configured mode
pub fn select_activation<R: Rng + ?Sized>(
    mode: SelectionMode,
    draft_pool: &[Product],
    target: usize,
    rng: &mut R,
) -> Vec<Product> {
    match mode {
        SelectionMode::Weighted => select_weighted(draft_pool, target, rng),
        SelectionMode::Fifo => select_fifo(draft_pool, target),
    }
}
