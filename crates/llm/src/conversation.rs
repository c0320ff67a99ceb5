use serde::{Deserialize, Serialize};

use crate::messages::{Message, Role};

/// An ordered chat history, most recent message last.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct Conversation(Vec<Message>);

impl Conversation {
    pub fn new(messages: Vec<Message>) -> Self {
        Self(messages)
    }

    pub fn messages(&self) -> &[Message] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Drops messages without usable content: blank after trimming, or the literal
    /// `undefined` some front-ends send for unset fields.
    pub fn filtered(self) -> Self {
        Self(self.0.into_iter().filter(has_content).collect())
    }

    /// The active turn, i.e. the last message.
    pub fn active_turn(&self) -> Option<&Message> {
        self.0.last()
    }

    /// Everything before the active turn.
    pub fn history(&self) -> &[Message] {
        match self.0.split_last() {
            Some((_, history)) => history,
            None => &[],
        }
    }

    /// Replaces the active turn with `message`. Does nothing on an empty conversation.
    pub fn replace_active_turn(&mut self, message: Message) {
        if let Some(last) = self.0.last_mut() {
            *last = message;
        }
    }

    /// Whether the active turn was written by the user.
    pub fn ends_with_user(&self) -> bool {
        self.active_turn().is_some_and(|message| message.role == Role::User)
    }
}

impl FromIterator<Message> for Conversation {
    fn from_iter<T: IntoIterator<Item = Message>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

fn has_content(message: &Message) -> bool {
    let content = message.content.trim();
    !content.is_empty() && !content.eq_ignore_ascii_case("undefined")
}
