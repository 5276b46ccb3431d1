//! # Solution Service
//!
//! Accepting and unaccepting answers, the permission flags clients use to
//! draw accept controls, and the accepted-answer summary shown on a topic.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::eligibility::{Candidate, SolutionEligibilityPolicy, TrustThreshold};
use crate::error::{AppError, Result};
use crate::models::{ActionType, Archetype, Post, Topic, TrustLevel, User, UserAction};
use crate::traits::{ActionLog, ForumRepo, TrustComparator};

/// Per-installation settings of the solved feature.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SolvedSettings {
    pub enabled: bool,
    /// When false, only topics in `enabled_category_ids` accept answers
    pub allow_solved_on_all_topics: bool,
    pub enabled_category_ids: Vec<Uuid>,
    /// Users at or above this rank may accept answers on any topic
    pub accept_all_solutions_trust_level: TrustLevel,
    /// Threshold handed to the first solution check
    pub first_solution_trust_level: TrustThreshold,
    /// Excerpt length of the accepted answer summary; 0 disables excerpts
    pub quote_length: usize,
}

impl Default for SolvedSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            allow_solved_on_all_topics: true,
            enabled_category_ids: Vec::new(),
            accept_all_solutions_trust_level: TrustLevel::Leader,
            first_solution_trust_level: TrustThreshold::Any,
            quote_length: 300,
        }
    }
}

/// Post attributes a client needs to render accept/unaccept controls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SolutionFlags {
    pub can_accept_answer: bool,
    pub can_unaccept_answer: bool,
    pub accepted_answer: bool,
    pub topic_accepted_answer: bool,
}

/// Summary of a topic's accepted answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcceptedAnswer {
    pub post_id: Uuid,
    pub post_number: i32,
    pub username: Option<String>,
    pub name: Option<String>,
    pub excerpt: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcceptOutcome {
    pub accepted_answer: AcceptedAnswer,
    /// The reply qualified as its author's first solution
    pub first_solution: bool,
    /// Previously accepted reply that this one replaced
    pub replaced_post_id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostView {
    pub id: Uuid,
    pub post_number: i32,
    pub username: Option<String>,
    pub raw: String,
    #[serde(flatten)]
    pub flags: SolutionFlags,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicView {
    pub id: Uuid,
    pub title: String,
    pub archetype: Archetype,
    pub closed: bool,
    /// Accepted answers are allowed on this topic
    pub can_have_answer: bool,
    pub has_accepted_answer: bool,
    pub accepted_answer: Option<AcceptedAnswer>,
    pub posts: Vec<PostView>,
}

/// Orchestrates solved state on top of the storage ports.
#[derive(Clone)]
pub struct SolutionService {
    repo: Arc<dyn ForumRepo>,
    policy: SolutionEligibilityPolicy,
    settings: SolvedSettings,
}

impl SolutionService {
    pub fn new(
        repo: Arc<dyn ForumRepo>,
        actions: Arc<dyn ActionLog>,
        comparator: Arc<dyn TrustComparator>,
        settings: SolvedSettings,
    ) -> Self {
        let policy = SolutionEligibilityPolicy::new(comparator, actions);
        Self { repo, policy, settings }
    }

    pub fn settings(&self) -> &SolvedSettings {
        &self.settings
    }

    /// Whether the topic can carry an accepted answer at all.
    pub fn accepted_answers_allowed(&self, topic: &Topic) -> bool {
        if !self.settings.enabled || topic.archetype != Archetype::Regular {
            return false;
        }
        self.settings.allow_solved_on_all_topics
            || topic
                .category_id
                .is_some_and(|id| self.settings.enabled_category_ids.contains(&id))
    }

    /// Guardian rule shared by accept and unaccept.
    pub fn can_accept_answer(&self, user: Option<&User>, topic: &Topic) -> bool {
        let Some(user) = user else {
            return false;
        };
        if !self.accepted_answers_allowed(topic) {
            return false;
        }
        if user.is_staff || user.trust_level >= self.settings.accept_all_solutions_trust_level {
            return true;
        }
        topic.user_id == user.id && !topic.closed
    }

    pub fn post_flags(&self, viewer: Option<&User>, topic: &Topic, post: &Post) -> SolutionFlags {
        let accepted_answer = topic.accepted_answer_post_id == Some(post.id);
        let allowed = self.can_accept_answer(viewer, topic);
        SolutionFlags {
            can_accept_answer: !post.is_first_post() && !accepted_answer && allowed,
            can_unaccept_answer: accepted_answer && allowed,
            accepted_answer,
            topic_accepted_answer: topic.has_accepted_answer(),
        }
    }

    /// Accepts `post_id` as its topic's answer, replacing any previous one.
    ///
    /// Nothing is written until every check (including the first solution
    /// check) has passed; the write itself is a single swap that fails with
    /// [`AppError::Conflict`] when the topic changed in the meantime.
    pub async fn accept_answer(
        &self,
        acting_user_id: Uuid,
        post_id: Uuid,
    ) -> Result<AcceptOutcome> {
        let (acting_user, post, topic) = self.load_for_action(acting_user_id, post_id).await?;

        if !self.can_accept_answer(Some(&acting_user), &topic) {
            return Err(AppError::Unauthorized(format!(
                "user {} cannot accept answers on topic {}",
                acting_user.id, topic.id
            )));
        }
        if post.is_first_post() {
            return Err(AppError::ValidationError(
                "the opening post cannot be an accepted answer".into(),
            ));
        }
        if topic.accepted_answer_post_id == Some(post.id) {
            return Err(AppError::Conflict(format!(
                "post {} is already the accepted answer",
                post.id
            )));
        }

        let author = self.load_author(&post).await?;

        // Evaluated before the swap, otherwise the new action would count as history.
        let candidate = Candidate {
            post: &post,
            archetype: topic.archetype,
            author: author.as_ref(),
        };
        let first_solution = self
            .policy
            .check(Some(&candidate), self.settings.first_solution_trust_level)
            .await?;

        let action = author.as_ref().map(|author| UserAction {
            id: Uuid::now_v7(),
            action_type: ActionType::Solved,
            user_id: author.id,
            acting_user_id: acting_user.id,
            target_topic_id: topic.id,
            target_post_id: post.id,
            created_at: Utc::now(),
        });
        let replaced_post_id = topic.accepted_answer_post_id;
        let swapped = self
            .repo
            .swap_accepted_answer(topic.id, replaced_post_id, Some(post.id), action)
            .await?;
        if !swapped {
            return Err(AppError::Conflict(format!(
                "topic {} changed while accepting post {}",
                topic.id, post.id
            )));
        }

        if let Some(previous) = replaced_post_id {
            log::info!("topic {}: accepted answer {} replaced", topic.id, previous);
        }
        log::info!(
            "topic {}: post #{} accepted by {} (first solution: {})",
            topic.id,
            post.post_number,
            acting_user.username,
            first_solution
        );

        Ok(AcceptOutcome {
            accepted_answer: self.summarize(&post, author.as_ref()),
            first_solution,
            replaced_post_id,
        })
    }

    pub async fn unaccept_answer(&self, acting_user_id: Uuid, post_id: Uuid) -> Result<()> {
        let (acting_user, post, topic) = self.load_for_action(acting_user_id, post_id).await?;

        if !self.can_accept_answer(Some(&acting_user), &topic) {
            return Err(AppError::Unauthorized(format!(
                "user {} cannot unaccept answers on topic {}",
                acting_user.id, topic.id
            )));
        }
        if topic.accepted_answer_post_id != Some(post.id) {
            return Err(AppError::ValidationError(format!(
                "post {} is not the accepted answer",
                post.id
            )));
        }

        let swapped = self
            .repo
            .swap_accepted_answer(topic.id, Some(post.id), None, None)
            .await?;
        if !swapped {
            return Err(AppError::Conflict(format!(
                "topic {} changed while unaccepting post {}",
                topic.id, post.id
            )));
        }

        log::info!(
            "topic {}: post #{} unaccepted by {}",
            topic.id,
            post.post_number,
            acting_user.username
        );
        Ok(())
    }

    /// Summary of the topic's accepted answer, if any.
    /// A dangling reference reads as none.
    pub async fn accepted_answer(&self, topic: &Topic) -> Result<Option<AcceptedAnswer>> {
        let Some(post_id) = topic.accepted_answer_post_id else {
            return Ok(None);
        };
        let Some(post) = self.repo.get_post(post_id).await? else {
            log::warn!("topic {}: accepted answer {} no longer exists", topic.id, post_id);
            return Ok(None);
        };
        let author = self.load_author(&post).await?;
        Ok(Some(self.summarize(&post, author.as_ref())))
    }

    pub async fn topic_view(
        &self,
        viewer_id: Option<Uuid>,
        topic_id: Uuid,
    ) -> Result<TopicView> {
        let topic = self
            .repo
            .get_topic(topic_id)
            .await?
            .ok_or_else(|| AppError::not_found("Topic", topic_id))?;
        let viewer = match viewer_id {
            Some(id) => self.repo.get_user(id).await?,
            None => None,
        };

        let mut posts = Vec::new();
        for post in self.repo.list_posts(topic.id).await? {
            let username = self.load_author(&post).await?.map(|u| u.username);
            posts.push(PostView {
                id: post.id,
                post_number: post.post_number,
                username,
                raw: post.raw.clone(),
                flags: self.post_flags(viewer.as_ref(), &topic, &post),
            });
        }

        Ok(TopicView {
            id: topic.id,
            title: topic.title.clone(),
            archetype: topic.archetype,
            closed: topic.closed,
            can_have_answer: self.accepted_answers_allowed(&topic),
            has_accepted_answer: topic.has_accepted_answer(),
            accepted_answer: self.accepted_answer(&topic).await?,
            posts,
        })
    }

    /// Runs the first solution check for a stored post. Missing data reads as ineligible.
    pub async fn first_solution_eligibility(&self, post_id: Uuid) -> Result<bool> {
        let threshold = self.settings.first_solution_trust_level;
        let Some(post) = self.repo.get_post(post_id).await? else {
            return self.policy.check(None, threshold).await;
        };
        let Some(topic) = self.repo.get_topic(post.topic_id).await? else {
            return self.policy.check(None, threshold).await;
        };
        let author = self.load_author(&post).await?;
        let candidate = Candidate {
            post: &post,
            archetype: topic.archetype,
            author: author.as_ref(),
        };
        self.policy.check(Some(&candidate), threshold).await
    }

    async fn load_for_action(
        &self,
        acting_user_id: Uuid,
        post_id: Uuid,
    ) -> Result<(User, Post, Topic)> {
        let user = self
            .repo
            .get_user(acting_user_id)
            .await?
            .ok_or_else(|| AppError::not_found("User", acting_user_id))?;
        let post = self
            .repo
            .get_post(post_id)
            .await?
            .ok_or_else(|| AppError::not_found("Post", post_id))?;
        let topic = self
            .repo
            .get_topic(post.topic_id)
            .await?
            .ok_or_else(|| AppError::not_found("Topic", post.topic_id))?;
        Ok((user, post, topic))
    }

    async fn load_author(&self, post: &Post) -> Result<Option<User>> {
        match post.user_id {
            Some(id) => Ok(self.repo.get_user(id).await?),
            None => Ok(None),
        }
    }

    fn summarize(&self, post: &Post, author: Option<&User>) -> AcceptedAnswer {
        AcceptedAnswer {
            post_id: post.id,
            post_number: post.post_number,
            username: author.map(|u| u.username.clone()),
            name: author.and_then(|u| u.name.clone()),
            excerpt: excerpt(&post.raw, self.settings.quote_length),
        }
    }
}

/// Collapses whitespace, cuts to `max_chars` characters and escapes HTML.
fn excerpt(raw: &str, max_chars: usize) -> Option<String> {
    if max_chars == 0 {
        return None;
    }
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        return None;
    }
    let text = if collapsed.chars().count() > max_chars {
        let cut: String = collapsed.chars().take(max_chars).collect();
        format!("{}…", cut.trim_end())
    } else {
        collapsed
    };
    Some(html_escape::encode_text(&text).into_owned())
}
