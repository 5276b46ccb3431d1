//! # First Solution Eligibility
//!
//! Decides whether an accepted reply counts as its author's qualifying first
//! solution. The checks run in a fixed order and stop at the first decision.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::{AppError, Result};
use crate::models::{ActionType, Archetype, Post, TrustLevel, User};
use crate::traits::{ActionLog, RankComparison, TrustComparator};

/// Minimum trust rank required, or `Any` to disable trust gating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrustThreshold {
    #[default]
    Any,
    Level(TrustLevel),
}

impl fmt::Display for TrustThreshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrustThreshold::Any => f.write_str("any"),
            TrustThreshold::Level(level) => write!(f, "{}", u8::from(*level)),
        }
    }
}

impl FromStr for TrustThreshold {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("any") {
            return Ok(TrustThreshold::Any);
        }
        let rank: u8 = s.parse().map_err(|_| {
            AppError::ValidationError(format!("trust threshold must be 'any' or 0-4, got '{s}'"))
        })?;
        Ok(TrustThreshold::Level(TrustLevel::try_from(rank)?))
    }
}

impl Serialize for TrustThreshold {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            TrustThreshold::Any => serializer.serialize_str("any"),
            TrustThreshold::Level(level) => serializer.serialize_u8(u8::from(*level)),
        }
    }
}

impl<'de> Deserialize<'de> for TrustThreshold {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        // Settings arrive as integers from files and as strings from the environment.
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Rank(u8),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Rank(rank) => TrustLevel::try_from(rank)
                .map(TrustThreshold::Level)
                .map_err(serde::de::Error::custom),
            Raw::Text(text) => text.parse().map_err(serde::de::Error::custom),
        }
    }
}

/// A reply under consideration, with its topic's archetype and resolved author.
#[derive(Debug, Clone, Copy)]
pub struct Candidate<'a> {
    pub post: &'a Post,
    pub archetype: Archetype,
    /// `None` when the author no longer exists
    pub author: Option<&'a User>,
}

/// Side-effect-free eligibility check. The only I/O is one existence query
/// against the action log.
#[derive(Clone)]
pub struct SolutionEligibilityPolicy {
    comparator: Arc<dyn TrustComparator>,
    actions: Arc<dyn ActionLog>,
}

impl SolutionEligibilityPolicy {
    pub fn new(comparator: Arc<dyn TrustComparator>, actions: Arc<dyn ActionLog>) -> Self {
        Self { comparator, actions }
    }

    /// Returns `Ok(false)` for any absent reference. Errors only when the
    /// action log lookup itself fails.
    pub async fn check(
        &self,
        candidate: Option<&Candidate<'_>>,
        threshold: TrustThreshold,
    ) -> Result<bool> {
        let Some(candidate) = candidate else {
            log::debug!("first solution check: no post");
            return Ok(false);
        };
        if candidate.archetype != Archetype::Regular {
            log::debug!(
                "first solution check: post {} is in a {} topic",
                candidate.post.id,
                candidate.archetype
            );
            return Ok(false);
        }

        let author = match candidate.author {
            Some(user) if user.is_human => user,
            _ => {
                log::debug!("first solution check: post {} has no human author", candidate.post.id);
                return Ok(false);
            }
        };

        let required = match threshold {
            TrustThreshold::Any => return Ok(true),
            TrustThreshold::Level(level) => level,
        };

        let rank = self.comparator.compare_rank(author.trust_level, required);
        if rank == RankComparison::Insufficient {
            log::debug!(
                "first solution check: user {} below trust level {}",
                author.id,
                u8::from(required)
            );
            return Ok(false);
        }

        let solved_before = self.actions.has_action(author.id, ActionType::Solved).await?;
        if solved_before {
            log::debug!("first solution check: user {} already has a solution", author.id);
        }
        Ok(!solved_before)
    }
}
