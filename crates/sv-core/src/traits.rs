//! # Core Traits (Ports)
//!
//! Any storage plugin must implement these traits to be used by the binary.

use async_trait::async_trait;
use uuid::Uuid;

use crate::models::{ActionType, Post, Topic, TrustLevel, User, UserAction};

/// Data persistence contract for users, topics, and posts.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait ForumRepo: Send + Sync {
    // User Operations
    async fn create_user(&self, user: User) -> anyhow::Result<()>;
    async fn get_user(&self, id: Uuid) -> anyhow::Result<Option<User>>;

    // Topic Operations
    async fn create_topic(&self, topic: Topic, first_post: Post) -> anyhow::Result<()>;
    async fn get_topic(&self, id: Uuid) -> anyhow::Result<Option<Topic>>;
    /// Moves the topic's accepted answer from `expected` to `new` in one
    /// transaction: the topic row is updated, `solved` actions targeting
    /// `expected` are removed and `action` (if any) is logged.
    ///
    /// Returns `Ok(false)` without writing anything when the topic no longer
    /// points at `expected`.
    async fn swap_accepted_answer(
        &self,
        topic_id: Uuid,
        expected: Option<Uuid>,
        new: Option<Uuid>,
        action: Option<UserAction>,
    ) -> anyhow::Result<bool>;

    // Post Operations
    async fn create_post(&self, post: Post) -> anyhow::Result<()>;
    async fn get_post(&self, id: Uuid) -> anyhow::Result<Option<Post>>;
    async fn list_posts(&self, topic_id: Uuid) -> anyhow::Result<Vec<Post>>;
}

/// Read side of the action log. Entries are written through
/// [`ForumRepo::swap_accepted_answer`].
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait ActionLog: Send + Sync {
    /// True when at least one action of this type is recorded against the user.
    async fn has_action(&self, user_id: Uuid, action_type: ActionType) -> anyhow::Result<bool>;
}

/// Outcome of comparing a user's rank against a required rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RankComparison {
    Sufficient,
    Insufficient,
}

/// Trust ordering strategy, injected so installations can supply their own ranking.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
pub trait TrustComparator: Send + Sync {
    fn compare_rank(&self, actual: TrustLevel, threshold: TrustLevel) -> RankComparison;
}

/// Plain ordinal ordering: a rank below the threshold is insufficient.
#[derive(Debug, Default, Clone, Copy)]
pub struct OrdinalTrustComparator;

impl TrustComparator for OrdinalTrustComparator {
    fn compare_rank(&self, actual: TrustLevel, threshold: TrustLevel) -> RankComparison {
        if actual < threshold {
            RankComparison::Insufficient
        } else {
            RankComparison::Sufficient
        }
    }
}
