//! # sv-db-sqlite Implementation
//!
//! This module implements the data mapping between the SQLite relational model
//! and the `sv-core` domain models, for both the forum tables and the action log.

use anyhow::Context;
use async_trait::async_trait;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteConnection, SqlitePool, SqlitePoolOptions, SqliteRow,
};
use sqlx::Row;
use std::str::FromStr;
use sv_core::models::{ActionType, Archetype, Post, Topic, TrustLevel, User, UserAction};
use sv_core::traits::{ActionLog, ForumRepo};
use uuid::Uuid;

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS users (
        id          BLOB PRIMARY KEY,
        username    TEXT NOT NULL UNIQUE,
        name        TEXT,
        trust_level INTEGER NOT NULL DEFAULT 0,
        is_human    BOOLEAN NOT NULL DEFAULT 1,
        is_staff    BOOLEAN NOT NULL DEFAULT 0,
        created_at  TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS topics (
        id                      BLOB PRIMARY KEY,
        title                   TEXT NOT NULL,
        archetype               TEXT NOT NULL DEFAULT 'regular',
        user_id                 BLOB NOT NULL,
        category_id             BLOB,
        closed                  BOOLEAN NOT NULL DEFAULT 0,
        accepted_answer_post_id BLOB,
        created_at              TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS posts (
        id          BLOB PRIMARY KEY,
        topic_id    BLOB NOT NULL REFERENCES topics(id) ON DELETE CASCADE,
        user_id     BLOB,
        post_number INTEGER NOT NULL,
        raw         TEXT NOT NULL,
        created_at  TEXT NOT NULL,
        UNIQUE (topic_id, post_number)
    )",
    "CREATE TABLE IF NOT EXISTS user_actions (
        id              BLOB PRIMARY KEY,
        action_type     INTEGER NOT NULL,
        user_id         BLOB NOT NULL,
        acting_user_id  BLOB NOT NULL,
        target_topic_id BLOB NOT NULL,
        target_post_id  BLOB NOT NULL,
        created_at      TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_user_actions_user_type
        ON user_actions (user_id, action_type)",
    "CREATE INDEX IF NOT EXISTS idx_user_actions_post_type
        ON user_actions (target_post_id, action_type)",
];

pub struct SqliteForumRepo {
    pool: SqlitePool,
}

impl SqliteForumRepo {
    /// Connects and creates the schema if needed.
    ///
    /// `sqlite::memory:` databases live inside a single connection, so the pool
    /// is pinned to one connection that never expires.
    pub async fn new(url: &str) -> anyhow::Result<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .with_context(|| format!("invalid database url '{url}'"))?
            .create_if_missing(true);

        let mut pool_options = SqlitePoolOptions::new();
        if url.contains(":memory:") {
            pool_options = pool_options
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        }
        let pool = pool_options.connect_with(options).await?;

        for statement in SCHEMA {
            sqlx::query(statement).execute(&pool).await?;
        }
        log::debug!("sqlite schema ready at {url}");

        Ok(Self { pool })
    }
}

// Helper for UUID conversion
fn uuid_to_blob(id: Uuid) -> Vec<u8> {
    id.as_bytes().to_vec()
}

fn blob_to_uuid(blob: &[u8]) -> anyhow::Result<Uuid> {
    Uuid::from_slice(blob).context("malformed uuid column")
}

fn opt_blob_to_uuid(blob: Option<Vec<u8>>) -> anyhow::Result<Option<Uuid>> {
    blob.as_deref().map(blob_to_uuid).transpose()
}

fn row_to_user(row: &SqliteRow) -> anyhow::Result<User> {
    let trust_level: i64 = row.try_get("trust_level")?;
    Ok(User {
        id: blob_to_uuid(&row.try_get::<Vec<u8>, _>("id")?)?,
        username: row.try_get("username")?,
        name: row.try_get("name")?,
        trust_level: TrustLevel::try_from(u8::try_from(trust_level)?)?,
        is_human: row.try_get("is_human")?,
        is_staff: row.try_get("is_staff")?,
        created_at: row.try_get("created_at")?,
    })
}

fn row_to_topic(row: &SqliteRow) -> anyhow::Result<Topic> {
    Ok(Topic {
        id: blob_to_uuid(&row.try_get::<Vec<u8>, _>("id")?)?,
        title: row.try_get("title")?,
        archetype: Archetype::from_str(&row.try_get::<String, _>("archetype")?)?,
        user_id: blob_to_uuid(&row.try_get::<Vec<u8>, _>("user_id")?)?,
        category_id: opt_blob_to_uuid(row.try_get("category_id")?)?,
        closed: row.try_get("closed")?,
        accepted_answer_post_id: opt_blob_to_uuid(row.try_get("accepted_answer_post_id")?)?,
        created_at: row.try_get("created_at")?,
    })
}

fn row_to_post(row: &SqliteRow) -> anyhow::Result<Post> {
    Ok(Post {
        id: blob_to_uuid(&row.try_get::<Vec<u8>, _>("id")?)?,
        topic_id: blob_to_uuid(&row.try_get::<Vec<u8>, _>("topic_id")?)?,
        user_id: opt_blob_to_uuid(row.try_get("user_id")?)?,
        post_number: row.try_get("post_number")?,
        raw: row.try_get("raw")?,
        created_at: row.try_get("created_at")?,
    })
}

const INSERT_POST: &str = "INSERT INTO posts (id, topic_id, user_id, post_number, raw, created_at)
    VALUES (?, ?, ?, ?, ?, ?)";

async fn insert_action(conn: &mut SqliteConnection, action: UserAction) -> anyhow::Result<()> {
    sqlx::query(
        "INSERT INTO user_actions
            (id, action_type, user_id, acting_user_id, target_topic_id, target_post_id, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(uuid_to_blob(action.id))
    .bind(action.action_type.code())
    .bind(uuid_to_blob(action.user_id))
    .bind(uuid_to_blob(action.acting_user_id))
    .bind(uuid_to_blob(action.target_topic_id))
    .bind(uuid_to_blob(action.target_post_id))
    .bind(action.created_at)
    .execute(conn)
    .await?;
    Ok(())
}

#[async_trait]
impl ForumRepo for SqliteForumRepo {
    async fn create_user(&self, user: User) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO users (id, username, name, trust_level, is_human, is_staff, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
            .bind(uuid_to_blob(user.id))
            .bind(user.username)
            .bind(user.name)
            .bind(i64::from(u8::from(user.trust_level)))
            .bind(user.is_human)
            .bind(user.is_staff)
            .bind(user.created_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_user(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        let row = sqlx::query("SELECT * FROM users WHERE id = ?")
            .bind(uuid_to_blob(id))
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_user).transpose()
    }

    /// Atomic operation to create a topic and its opening post.
    ///
    /// # Developer Note
    /// Using a Transaction (tx) ensures we don't end up with "ghost topics"
    /// that have no opening post if the second insert fails.
    async fn create_topic(&self, topic: Topic, first_post: Post) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO topics
                (id, title, archetype, user_id, category_id, closed,
                 accepted_answer_post_id, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
            .bind(uuid_to_blob(topic.id))
            .bind(topic.title)
            .bind(topic.archetype.as_str())
            .bind(uuid_to_blob(topic.user_id))
            .bind(topic.category_id.map(uuid_to_blob))
            .bind(topic.closed)
            .bind(topic.accepted_answer_post_id.map(uuid_to_blob))
            .bind(topic.created_at)
            .execute(&mut *tx)
            .await?;

        sqlx::query(INSERT_POST)
            .bind(uuid_to_blob(first_post.id))
            .bind(uuid_to_blob(first_post.topic_id))
            .bind(first_post.user_id.map(uuid_to_blob))
            .bind(first_post.post_number)
            .bind(first_post.raw)
            .bind(first_post.created_at)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn get_topic(&self, id: Uuid) -> anyhow::Result<Option<Topic>> {
        let row = sqlx::query("SELECT * FROM topics WHERE id = ?")
            .bind(uuid_to_blob(id))
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_topic).transpose()
    }

    /// Compare-and-swap on `topics.accepted_answer_post_id`.
    ///
    /// The `UPDATE` must stay the transaction's first statement so the write
    /// lock is taken before anything else is read. A concurrent swap that
    /// already moved the answer leaves zero matching rows.
    async fn swap_accepted_answer(
        &self,
        topic_id: Uuid,
        expected: Option<Uuid>,
        new: Option<Uuid>,
        action: Option<UserAction>,
    ) -> anyhow::Result<bool> {
        if let Some(post_id) = new {
            let belongs = sqlx::query("SELECT 1 FROM posts WHERE id = ? AND topic_id = ?")
                .bind(uuid_to_blob(post_id))
                .bind(uuid_to_blob(topic_id))
                .fetch_optional(&self.pool)
                .await?;
            if belongs.is_none() {
                anyhow::bail!("post {post_id} does not belong to topic {topic_id}");
            }
        }

        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE topics SET accepted_answer_post_id = ?
            WHERE id = ? AND accepted_answer_post_id IS ?",
        )
        .bind(new.map(uuid_to_blob))
        .bind(uuid_to_blob(topic_id))
        .bind(expected.map(uuid_to_blob))
        .execute(&mut *tx)
        .await?
        .rows_affected();
        if updated == 0 {
            log::debug!("topic {topic_id}: accepted answer is no longer {expected:?}");
            return Ok(false);
        }

        if let Some(previous) = expected {
            let removed = sqlx::query(
                "DELETE FROM user_actions WHERE target_post_id = ? AND action_type = ?",
            )
            .bind(uuid_to_blob(previous))
            .bind(ActionType::Solved.code())
            .execute(&mut *tx)
            .await?
            .rows_affected();
            log::debug!("topic {topic_id}: removed {removed} solved actions of post {previous}");
        }

        if let Some(action) = action {
            insert_action(&mut *tx, action).await?;
        }

        tx.commit().await?;
        Ok(true)
    }

    async fn create_post(&self, post: Post) -> anyhow::Result<()> {
        sqlx::query(INSERT_POST)
            .bind(uuid_to_blob(post.id))
            .bind(uuid_to_blob(post.topic_id))
            .bind(post.user_id.map(uuid_to_blob))
            .bind(post.post_number)
            .bind(post.raw)
            .bind(post.created_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_post(&self, id: Uuid) -> anyhow::Result<Option<Post>> {
        let row = sqlx::query("SELECT * FROM posts WHERE id = ?")
            .bind(uuid_to_blob(id))
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_post).transpose()
    }

    async fn list_posts(&self, topic_id: Uuid) -> anyhow::Result<Vec<Post>> {
        sqlx::query("SELECT * FROM posts WHERE topic_id = ? ORDER BY post_number ASC")
            .bind(uuid_to_blob(topic_id))
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(row_to_post)
            .collect()
    }
}

#[async_trait]
impl ActionLog for SqliteForumRepo {
    async fn has_action(&self, user_id: Uuid, action_type: ActionType) -> anyhow::Result<bool> {
        let row =
            sqlx::query("SELECT 1 FROM user_actions WHERE user_id = ? AND action_type = ? LIMIT 1")
                .bind(uuid_to_blob(user_id))
                .bind(action_type.code())
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn user(name: &str) -> User {
        User {
            id: Uuid::now_v7(),
            username: name.into(),
            name: Some(name.to_uppercase()),
            trust_level: TrustLevel::Member,
            is_human: true,
            is_staff: false,
            created_at: Utc::now(),
        }
    }

    fn topic_with_op(author: &User) -> (Topic, Post) {
        let topic = Topic {
            id: Uuid::now_v7(),
            title: "Lifetimes in async traits".into(),
            archetype: Archetype::Regular,
            user_id: author.id,
            category_id: None,
            closed: false,
            accepted_answer_post_id: None,
            created_at: Utc::now(),
        };
        let op = Post {
            id: Uuid::now_v7(),
            topic_id: topic.id,
            user_id: Some(author.id),
            post_number: 1,
            raw: "Why does this not compile?".into(),
            created_at: Utc::now(),
        };
        (topic, op)
    }

    fn solved(user_id: Uuid, topic_id: Uuid, post_id: Uuid) -> UserAction {
        UserAction {
            id: Uuid::now_v7(),
            action_type: ActionType::Solved,
            user_id,
            acting_user_id: user_id,
            target_topic_id: topic_id,
            target_post_id: post_id,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_create_and_get_topic() {
        let repo = SqliteForumRepo::new("sqlite::memory:").await.unwrap();
        let author = user("ferris");
        repo.create_user(author.clone()).await.unwrap();

        let (topic, op) = topic_with_op(&author);
        repo.create_topic(topic.clone(), op.clone()).await.expect("Failed to create topic");

        let stored = repo.get_topic(topic.id).await.unwrap().expect("topic missing");
        assert_eq!(stored.title, topic.title);
        assert_eq!(stored.archetype, Archetype::Regular);
        assert_eq!(stored.accepted_answer_post_id, None);

        let posts = repo.list_posts(topic.id).await.unwrap();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].id, op.id);

        let stored_user = repo.get_user(author.id).await.unwrap().unwrap();
        assert_eq!(stored_user.trust_level, TrustLevel::Member);
        assert_eq!(stored_user.name.as_deref(), Some("FERRIS"));
        assert!(repo.get_user(Uuid::now_v7()).await.unwrap().is_none());
    }

    fn reply(topic: &Topic, author: Option<&User>, post_number: i32) -> Post {
        Post {
            id: Uuid::now_v7(),
            topic_id: topic.id,
            user_id: author.map(|u| u.id),
            post_number,
            raw: "Box the future.".into(),
            created_at: Utc::now(),
        }
    }

    async fn record(repo: &SqliteForumRepo, action: UserAction) {
        let mut conn = repo.pool.acquire().await.unwrap();
        insert_action(&mut *conn, action).await.unwrap();
    }

    #[tokio::test]
    async fn test_swap_and_clear_accepted_answer() {
        let repo = SqliteForumRepo::new("sqlite::memory:").await.unwrap();
        let author = user("ferris");
        let (topic, op) = topic_with_op(&author);
        repo.create_topic(topic.clone(), op).await.unwrap();
        let answer = reply(&topic, None, 2);
        repo.create_post(answer.clone()).await.unwrap();

        assert!(repo.swap_accepted_answer(topic.id, None, Some(answer.id), None).await.unwrap());
        let stored = repo.get_topic(topic.id).await.unwrap().unwrap();
        assert_eq!(stored.accepted_answer_post_id, Some(answer.id));
        assert_eq!(repo.get_post(answer.id).await.unwrap().unwrap().user_id, None);

        assert!(repo.swap_accepted_answer(topic.id, Some(answer.id), None, None).await.unwrap());
        let stored = repo.get_topic(topic.id).await.unwrap().unwrap();
        assert_eq!(stored.accepted_answer_post_id, None);
    }

    #[tokio::test]
    async fn test_swap_moves_solved_action_to_new_answer() {
        let repo = SqliteForumRepo::new("sqlite::memory:").await.unwrap();
        let (owner, first, second) = (user("ferris"), user("corro"), user("clippy"));
        let (topic, op) = topic_with_op(&owner);
        repo.create_topic(topic.clone(), op).await.unwrap();
        let (a, b) = (reply(&topic, Some(&first), 2), reply(&topic, Some(&second), 3));
        repo.create_post(a.clone()).await.unwrap();
        repo.create_post(b.clone()).await.unwrap();

        let action = solved(first.id, topic.id, a.id);
        assert!(repo.swap_accepted_answer(topic.id, None, Some(a.id), Some(action)).await.unwrap());
        assert!(repo.has_action(first.id, ActionType::Solved).await.unwrap());

        let action = solved(second.id, topic.id, b.id);
        let swapped = repo
            .swap_accepted_answer(topic.id, Some(a.id), Some(b.id), Some(action))
            .await
            .unwrap();
        assert!(swapped);
        assert!(!repo.has_action(first.id, ActionType::Solved).await.unwrap());
        assert!(repo.has_action(second.id, ActionType::Solved).await.unwrap());
    }

    #[tokio::test]
    async fn test_stale_swap_writes_nothing() {
        let repo = SqliteForumRepo::new("sqlite::memory:").await.unwrap();
        let (owner, helper) = (user("ferris"), user("corro"));
        let (topic, op) = topic_with_op(&owner);
        repo.create_topic(topic.clone(), op).await.unwrap();
        let answer = reply(&topic, Some(&helper), 2);
        repo.create_post(answer.clone()).await.unwrap();

        let action = solved(helper.id, topic.id, answer.id);
        let swapped = repo
            .swap_accepted_answer(topic.id, Some(Uuid::now_v7()), Some(answer.id), Some(action))
            .await
            .unwrap();
        assert!(!swapped);
        let stored = repo.get_topic(topic.id).await.unwrap().unwrap();
        assert_eq!(stored.accepted_answer_post_id, None);
        assert!(!repo.has_action(helper.id, ActionType::Solved).await.unwrap());

        // Unknown topics never match either.
        assert!(!repo.swap_accepted_answer(Uuid::now_v7(), None, None, None).await.unwrap());
    }

    #[tokio::test]
    async fn test_concurrent_swaps_from_same_state_have_one_winner() {
        let repo = SqliteForumRepo::new("sqlite::memory:").await.unwrap();
        let (owner, first, second) = (user("ferris"), user("corro"), user("clippy"));
        let (topic, op) = topic_with_op(&owner);
        repo.create_topic(topic.clone(), op).await.unwrap();
        let (a, b) = (reply(&topic, Some(&first), 2), reply(&topic, Some(&second), 3));
        repo.create_post(a.clone()).await.unwrap();
        repo.create_post(b.clone()).await.unwrap();

        let (won_a, won_b) = tokio::join!(
            repo.swap_accepted_answer(
                topic.id,
                None,
                Some(a.id),
                Some(solved(first.id, topic.id, a.id))
            ),
            repo.swap_accepted_answer(
                topic.id,
                None,
                Some(b.id),
                Some(solved(second.id, topic.id, b.id))
            ),
        );
        let (won_a, won_b) = (won_a.unwrap(), won_b.unwrap());
        assert!(won_a ^ won_b);

        let stored = repo.get_topic(topic.id).await.unwrap().unwrap();
        let winner = if won_a { a.id } else { b.id };
        assert_eq!(stored.accepted_answer_post_id, Some(winner));
        assert_eq!(repo.has_action(first.id, ActionType::Solved).await.unwrap(), won_a);
        assert_eq!(repo.has_action(second.id, ActionType::Solved).await.unwrap(), won_b);
    }

    #[tokio::test]
    async fn test_failed_swap_rolls_back() {
        let repo = SqliteForumRepo::new("sqlite::memory:").await.unwrap();
        let (owner, first, second) = (user("ferris"), user("corro"), user("clippy"));
        let (topic, op) = topic_with_op(&owner);
        repo.create_topic(topic.clone(), op).await.unwrap();
        let (a, b) = (reply(&topic, Some(&first), 2), reply(&topic, Some(&second), 3));
        repo.create_post(a.clone()).await.unwrap();
        repo.create_post(b.clone()).await.unwrap();

        let action = solved(first.id, topic.id, a.id);
        assert!(repo.swap_accepted_answer(topic.id, None, Some(a.id), Some(action)).await.unwrap());

        let mut like = solved(second.id, topic.id, b.id);
        like.action_type = ActionType::Like;
        record(&repo, like.clone()).await;

        // Reusing the like's id makes the final insert fail after the update and delete ran.
        let mut clashing = solved(second.id, topic.id, b.id);
        clashing.id = like.id;
        let result = repo
            .swap_accepted_answer(topic.id, Some(a.id), Some(b.id), Some(clashing))
            .await;
        assert!(result.is_err());

        let stored = repo.get_topic(topic.id).await.unwrap().unwrap();
        assert_eq!(stored.accepted_answer_post_id, Some(a.id));
        assert!(repo.has_action(first.id, ActionType::Solved).await.unwrap());
        assert!(!repo.has_action(second.id, ActionType::Solved).await.unwrap());
    }

    #[tokio::test]
    async fn test_accepted_answer_must_belong_to_topic() {
        let repo = SqliteForumRepo::new("sqlite::memory:").await.unwrap();
        let author = user("ferris");
        let (topic, op) = topic_with_op(&author);
        repo.create_topic(topic.clone(), op).await.unwrap();

        let stranger = Some(Uuid::now_v7());
        assert!(repo.swap_accepted_answer(topic.id, None, stranger, None).await.is_err());
        let stored = repo.get_topic(topic.id).await.unwrap().unwrap();
        assert_eq!(stored.accepted_answer_post_id, None);
    }

    #[tokio::test]
    async fn test_has_action_filters_by_type() {
        let repo = SqliteForumRepo::new("sqlite::memory:").await.unwrap();
        let helper = Uuid::now_v7();
        let (topic_id, post_id) = (Uuid::now_v7(), Uuid::now_v7());

        assert!(!repo.has_action(helper, ActionType::Solved).await.unwrap());

        let mut like = solved(helper, topic_id, post_id);
        like.action_type = ActionType::Like;
        record(&repo, like).await;
        assert!(!repo.has_action(helper, ActionType::Solved).await.unwrap());
        assert!(repo.has_action(helper, ActionType::Like).await.unwrap());

        record(&repo, solved(helper, topic_id, post_id)).await;
        assert!(repo.has_action(helper, ActionType::Solved).await.unwrap());
        assert!(!repo.has_action(Uuid::now_v7(), ActionType::Solved).await.unwrap());
    }
}
