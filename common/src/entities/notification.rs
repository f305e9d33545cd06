use std::collections::HashMap;

use anyhow::anyhow;
use mongodb::bson::{doc, oid::ObjectId, Document};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::Auth;
use crate::default_timestamp;
use crate::error::{self, AddCode};
use crate::repository::Entity;

/// Localizable message part. A template keeps its substitutions alongside it
/// and is resolved at read time, so the stored record stays language-neutral.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Message {
    Literal(String),
    Template(String, HashMap<String, String>),
}

impl Message {
    pub fn template(text: &str, substitutions: &[(&str, &str)]) -> Self {
        Message::Template(
            text.to_string(),
            substitutions
                .iter()
                .map(|(key, value)| (key.to_string(), value.to_string()))
                .collect(),
        )
    }

    pub fn render(&self) -> String {
        match self {
            Message::Literal(text) => text.clone(),
            Message::Template(template, substitutions) => {
                let mut text = template.clone();
                for (key, value) in substitutions {
                    text = text.replace(&format!("{{{{{}}}}}", key), value);
                }
                text
            }
        }
    }
}

impl From<&str> for Message {
    fn from(text: &str) -> Self {
        Message::Literal(text.to_string())
    }
}

impl From<String> for Message {
    fn from(text: String) -> Self {
        Message::Literal(text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum NotificationState {
    Unread,
    Read,
    Starred,
    Cancelled,
}

impl NotificationState {
    /// Transition table: `unread→read`, `unread→starred`, any live state
    /// `→cancelled`; repeating the current state is allowed (idempotent
    /// retries); `cancelled` has no outgoing transitions at all.
    pub fn can_become(self, next: NotificationState) -> bool {
        use NotificationState::*;
        match (self, next) {
            (Cancelled, _) => false,
            (current, next) if current == next => true,
            (Unread, Read | Starred | Cancelled) => true,
            (Read | Starred, Cancelled) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Low
    }
}

/// One record per (recipient, organisation, objectType, objectId, action);
/// re-triggering the same event updates the record in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: ObjectId,
    pub recipient: String,
    pub organisation: String,
    pub object_type: String,
    pub object_id: ObjectId,
    pub action: String,
    pub title: Message,
    pub description: Message,
    pub state: NotificationState,
    pub priority: Priority,
    #[serde(default)]
    pub content: Document,
    pub is_active: bool,
    pub created_by: String,
    pub created_on: i64,
    pub updated_by: String,
    pub updated_on: i64,
}

impl Notification {
    /// The compound key this record is upserted by.
    pub fn identity_filter(&self) -> Document {
        doc! {
            "recipient": &self.recipient,
            "organisation": &self.organisation,
            "objectType": &self.object_type,
            "objectId": self.object_id,
            "action": &self.action,
        }
    }

    /// Applies a state transition, stamping updatedBy/updatedOn. An illegal
    /// transition is a caller error (409) and leaves the record untouched;
    /// repeating the current live state is a no-op success.
    pub fn set_state(&mut self, next: NotificationState, by: &Auth) -> error::Result<&mut Self> {
        if !self.state.can_become(next) {
            return Err(anyhow!(
                "Illegal notification state transition: {:?} -> {:?}",
                self.state,
                next
            )
            .code(409));
        }
        if self.state != next {
            self.state = next;
            self.touch(by);
        }
        Ok(self)
    }

    pub fn touch(&mut self, by: &Auth) {
        self.updated_by = by.actor();
        self.updated_on = default_timestamp();
    }
}

impl Entity for Notification {
    fn id(&self) -> ObjectId {
        self.id
    }
}

/// Read model with the message parts rendered for display.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PublicNotification {
    pub id: String,
    pub recipient: String,
    pub organisation: String,
    pub object_type: String,
    pub object_id: String,
    pub action: String,
    pub title: String,
    pub description: String,
    pub state: NotificationState,
    pub priority: Priority,
    pub is_active: bool,
    pub created_on: i64,
    pub updated_on: i64,
}

impl From<Notification> for PublicNotification {
    fn from(notification: Notification) -> Self {
        Self {
            id: notification.id.to_hex(),
            recipient: notification.recipient,
            organisation: notification.organisation,
            object_type: notification.object_type,
            object_id: notification.object_id.to_hex(),
            action: notification.action,
            title: notification.title.render(),
            description: notification.description.render(),
            state: notification.state,
            priority: notification.priority,
            is_active: notification.is_active,
            created_on: notification.created_on,
            updated_on: notification.updated_on,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use mongodb::bson::{doc, oid::ObjectId};

    use crate::auth::Auth;
    use crate::default_timestamp;

    use super::{Message, Notification, NotificationState, Priority};

    fn notification(state: NotificationState) -> Notification {
        let now = default_timestamp();
        Notification {
            id: ObjectId::new(),
            recipient: "reader@example.com".to_string(),
            organisation: "acme".to_string(),
            object_type: "posts".to_string(),
            object_id: ObjectId::new(),
            action: "review".to_string(),
            title: "A post awaits review".into(),
            description: "Please review".into(),
            state,
            priority: Priority::Medium,
            content: doc! {},
            is_active: true,
            created_by: "author@example.com".to_string(),
            created_on: now,
            updated_by: "author@example.com".to_string(),
            updated_on: now,
        }
    }

    fn actor() -> Auth {
        Auth::User {
            email: "reader@example.com".to_string(),
            organisation: "acme".to_string(),
        }
    }

    #[test]
    fn unread_moves_to_read_starred_or_cancelled() {
        use NotificationState::*;
        for next in [Read, Starred, Cancelled] {
            let mut n = notification(Unread);
            n.set_state(next, &actor()).unwrap();
            assert_eq!(n.state, next);
            assert_eq!(n.updated_by, "reader@example.com");
        }
    }

    #[test]
    fn read_and_starred_only_cancel() {
        use NotificationState::*;
        for state in [Read, Starred] {
            let mut n = notification(state);
            assert_eq!(n.set_state(Unread, &actor()).unwrap_err().code, 409);
            n.set_state(Cancelled, &actor()).unwrap();
            assert_eq!(n.state, Cancelled);
        }
        let mut n = notification(Read);
        assert_eq!(n.set_state(Starred, &actor()).unwrap_err().code, 409);
    }

    #[test]
    fn cancelled_is_terminal() {
        use NotificationState::*;
        for next in [Unread, Read, Starred, Cancelled] {
            let mut n = notification(Cancelled);
            let before = n.clone();
            assert_eq!(n.set_state(next, &actor()).unwrap_err().code, 409);
            assert_eq!(n.state, before.state);
            assert_eq!(n.updated_on, before.updated_on);
        }
    }

    #[test]
    fn repeating_a_live_state_is_a_no_op() {
        use NotificationState::*;
        let mut n = notification(Read);
        let updated_on = n.updated_on;
        n.set_state(Read, &actor()).unwrap();
        assert_eq!(n.state, Read);
        assert_eq!(n.updated_on, updated_on);
    }

    #[test]
    fn template_renders_at_read_time() {
        let message = Message::Template(
            "{{user}} wants to join {{blog}}".to_string(),
            HashMap::from([
                ("user".to_string(), "joiner@example.com".to_string()),
                ("blog".to_string(), "Engineering".to_string()),
            ]),
        );
        assert_eq!(message.render(), "joiner@example.com wants to join Engineering");
    }

    #[test]
    fn message_wire_shape_is_literal_or_pair() {
        let literal: Message = "plain".into();
        assert_eq!(serde_json::to_value(&literal).unwrap(), serde_json::json!("plain"));

        let template = Message::Template(
            "hi {{name}}".to_string(),
            HashMap::from([("name".to_string(), "Ada".to_string())]),
        );
        assert_eq!(
            serde_json::to_value(&template).unwrap(),
            serde_json::json!(["hi {{name}}", {"name": "Ada"}])
        );

        let back: Message = serde_json::from_value(serde_json::json!("plain")).unwrap();
        assert_eq!(back, literal);
    }

    #[test]
    fn identity_filter_carries_the_compound_key() {
        let n = notification(NotificationState::Unread);
        let filter = n.identity_filter();
        assert_eq!(filter.get_str("recipient").unwrap(), "reader@example.com");
        assert_eq!(filter.get_str("objectType").unwrap(), "posts");
        assert_eq!(filter.get_object_id("objectId").unwrap(), n.object_id);
        assert_eq!(filter.get_str("action").unwrap(), "review");
        assert!(filter.get("state").is_none());
    }
}
