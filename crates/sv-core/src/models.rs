//! # Domain Models
//!
//! These structs represent the forum entities the solved feature works on.
//! We use UUID v7 for time-ordered, globally unique identification.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::AppError;

/// The kind of a topic. Only `Regular` topics can carry an accepted answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Archetype {
    #[default]
    Regular,
    PrivateMessage,
    Banner,
}

impl Archetype {
    pub fn as_str(&self) -> &'static str {
        match self {
            Archetype::Regular => "regular",
            Archetype::PrivateMessage => "private_message",
            Archetype::Banner => "banner",
        }
    }
}

impl fmt::Display for Archetype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Archetype {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "regular" => Ok(Archetype::Regular),
            "private_message" => Ok(Archetype::PrivateMessage),
            "banner" => Ok(Archetype::Banner),
            other => Err(AppError::ValidationError(format!("unknown archetype '{other}'"))),
        }
    }
}

/// Ordinal reputation rank of a user account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(into = "u8", try_from = "u8")]
pub enum TrustLevel {
    #[default]
    NewUser = 0,
    Basic = 1,
    Member = 2,
    Regular = 3,
    Leader = 4,
}

impl From<TrustLevel> for u8 {
    fn from(level: TrustLevel) -> u8 {
        level as u8
    }
}

impl TryFrom<u8> for TrustLevel {
    type Error = AppError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(TrustLevel::NewUser),
            1 => Ok(TrustLevel::Basic),
            2 => Ok(TrustLevel::Member),
            3 => Ok(TrustLevel::Regular),
            4 => Ok(TrustLevel::Leader),
            other => Err(AppError::ValidationError(format!(
                "trust level must be between 0 and 4, got {other}"
            ))),
        }
    }
}

/// A forum account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    /// Display name, if the user set one
    pub name: Option<String>,
    pub trust_level: TrustLevel,
    /// False for system and bot accounts
    pub is_human: bool,
    /// Moderators and admins
    pub is_staff: bool,
    pub created_at: DateTime<Utc>,
}

/// A Topic contains a sequence of Posts, the first being the question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Topic {
    pub id: Uuid,
    pub title: String,
    pub archetype: Archetype,
    /// Author of the opening post
    pub user_id: Uuid,
    pub category_id: Option<Uuid>,
    pub closed: bool,
    pub accepted_answer_post_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl Topic {
    pub fn has_accepted_answer(&self) -> bool {
        self.accepted_answer_post_id.is_some()
    }
}

/// The fundamental unit of conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: Uuid,
    pub topic_id: Uuid,
    /// `None` once the author account has been deleted
    pub user_id: Option<Uuid>,
    /// 1-based position within the topic; 1 is the opening post
    pub post_number: i32,
    pub raw: String,
    pub created_at: DateTime<Utc>,
}

impl Post {
    pub fn is_first_post(&self) -> bool {
        self.post_number == 1
    }
}

/// Kinds of entries in the action log. Values match the stored integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Like = 1,
    Reply = 5,
    Solved = 15,
}

impl ActionType {
    pub fn code(&self) -> i32 {
        *self as i32
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            1 => Some(ActionType::Like),
            5 => Some(ActionType::Reply),
            15 => Some(ActionType::Solved),
            _ => None,
        }
    }
}

/// One entry of the append-only action log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserAction {
    pub id: Uuid,
    pub action_type: ActionType,
    /// The user the action is recorded against
    pub user_id: Uuid,
    pub acting_user_id: Uuid,
    pub target_topic_id: Uuid,
    pub target_post_id: Uuid,
    pub created_at: DateTime<Utc>,
}
