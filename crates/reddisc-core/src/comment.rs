//! Comment events and the context they are quoted with

use serde::{Deserialize, Serialize};

/// What a comment replies to.
///
/// Reddit encodes this as a "fullname": `t1_<id>` for comments and
/// `t3_<id>` for submissions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum ParentRef {
    /// Reply to another comment
    Comment(String),
    /// Top-level reply to the submission itself
    Submission(String),
}

impl ParentRef {
    /// Parse a Reddit fullname (`t1_abc`, `t3_xyz`)
    pub fn from_fullname(fullname: &str) -> Option<Self> {
        let (kind, id) = fullname.split_once('_')?;
        if id.is_empty() {
            return None;
        }
        match kind {
            "t1" => Some(Self::Comment(id.to_string())),
            "t3" => Some(Self::Submission(id.to_string())),
            _ => None,
        }
    }

    /// Render back to a Reddit fullname
    pub fn fullname(&self) -> String {
        match self {
            Self::Comment(id) => format!("t1_{}", id),
            Self::Submission(id) => format!("t3_{}", id),
        }
    }
}

/// A comment yielded by the comment source. Read-only, consumed once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentEvent {
    pub id: String,
    pub permalink_url: String,
    pub body: String,
    pub author_name: String,
    pub source_channel_name: String,
    pub submission_id: String,
    #[serde(default)]
    pub parent_id: Option<ParentRef>,
}

/// Submission a comment belongs to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub flair: Option<String>,
}

/// Comment another comment replies to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParentComment {
    pub id: String,
    pub author_name: String,
    pub body: String,
}

/// Resolved parent entity
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParentContext {
    Comment(ParentComment),
    Submission(Submission),
}
