use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::Timestamp;
use crate::engine::Engine;
use crate::error::EngineError;
use crate::objects::EntityKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommentKind {
    User,
    Flapping,
    Downtime,
    Acknowledgement,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: u64,
    pub target: EntityKey,
    pub kind: CommentKind,
    pub author: String,
    pub text: String,
    /// Kept across restarts
    pub persistent: bool,
    pub entry_time: Timestamp,
}

/// Comments attached to entities, keyed by id
#[derive(Debug, Default)]
pub struct CommentStore {
    comments: BTreeMap<u64, Comment>,
}

impl CommentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, comment: Comment) -> u64 {
        let id = comment.id;
        self.comments.insert(id, comment);
        id
    }

    pub fn remove(&mut self, id: u64) -> Option<Comment> {
        self.comments.remove(&id)
    }

    /// Drops every comment of `kind` on `target`; returns how many went away
    pub fn remove_kind(&mut self, target: EntityKey, kind: CommentKind) -> usize {
        let before = self.comments.len();
        self.comments.retain(|_, comment| !(comment.target == target && comment.kind == kind));
        before - self.comments.len()
    }

    pub fn get(&self, id: u64) -> Option<&Comment> {
        self.comments.get(&id)
    }

    pub fn for_target(&self, target: EntityKey) -> impl Iterator<Item = &Comment> {
        self.comments.values().filter(move |comment| comment.target == target)
    }

    /// Comments that survive a restart
    pub fn persistent(&self) -> impl Iterator<Item = &Comment> {
        self.comments.values().filter(|comment| comment.persistent)
    }

    pub fn len(&self) -> usize {
        self.comments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.comments.is_empty()
    }
}

impl Engine {
    /// Attaches a comment to an entity and returns its id
    pub fn add_comment(
        &mut self,
        target: EntityKey,
        kind: CommentKind,
        author: &str,
        text: &str,
        persistent: bool,
        now: Timestamp,
    ) -> Result<u64, EngineError> {
        if !self.registry.contains(target) {
            return Err(EngineError::UnknownEntity(target));
        }
        let comment = Comment {
            id: self.counters.next_comment_id(),
            target,
            kind,
            author: author.to_string(),
            text: text.to_string(),
            persistent,
            entry_time: now,
        };
        Ok(self.comments.add(comment))
    }

    pub fn delete_comment(&mut self, id: u64) -> Option<Comment> {
        self.comments.remove(id)
    }
}
