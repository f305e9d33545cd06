use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::repository::Entity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    None,
    Immediate,
    Daily,
    Weekly,
}

impl Default for Frequency {
    fn default() -> Self {
        Frequency::Immediate
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChannelPreferences {
    pub frequency: Frequency,
    pub last_sent: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CategoryPreferences {
    pub inapp: ChannelPreferences,
    pub email: ChannelPreferences,
    pub blocked: Vec<ObjectId>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NotificationPreferences {
    pub blogs: CategoryPreferences,
    pub posts: CategoryPreferences,
    pub user_groups: CategoryPreferences,
}

impl NotificationPreferences {
    pub fn category(&self, object_type: &str) -> Option<&CategoryPreferences> {
        match object_type {
            "blogs" => Some(&self.blogs),
            "posts" => Some(&self.posts),
            "userGroups" => Some(&self.user_groups),
            _ => None,
        }
    }

    pub fn category_mut(&mut self, object_type: &str) -> Option<&mut CategoryPreferences> {
        match object_type {
            "blogs" => Some(&mut self.blogs),
            "posts" => Some(&mut self.posts),
            "userGroups" => Some(&mut self.user_groups),
            _ => None,
        }
    }

    /// Union of blocked object ids across all categories; pushed into the
    /// store query as an `$nin` clause.
    pub fn blocked_ids(&self) -> Vec<ObjectId> {
        let mut blocked = Vec::new();
        for category in [&self.blogs, &self.posts, &self.user_groups] {
            for id in &category.blocked {
                if !blocked.contains(id) {
                    blocked.push(*id);
                }
            }
        }
        blocked
    }
}

fn default_locale() -> String {
    "en".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Preferences {
    #[serde(default = "default_locale")]
    pub locale: String,
    #[serde(default)]
    pub notifications: NotificationPreferences,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            locale: default_locale(),
            notifications: NotificationPreferences::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: ObjectId,
    pub email: String,
    pub organisation: String,
    pub name: String,
    #[serde(default)]
    pub preferences: Preferences,
    pub is_active: bool,
    pub created_on: i64,
    pub updated_on: i64,
}

impl Entity for User {
    fn id(&self) -> ObjectId {
        self.id
    }
}

#[cfg(test)]
mod tests {
    use mongodb::bson::oid::ObjectId;

    use super::NotificationPreferences;

    #[test]
    fn blocked_ids_union_skips_duplicates() {
        let shared = ObjectId::new();
        let posts_only = ObjectId::new();

        let mut preferences = NotificationPreferences::default();
        preferences.blogs.blocked.push(shared);
        preferences.posts.blocked.push(shared);
        preferences.posts.blocked.push(posts_only);

        let blocked = preferences.blocked_ids();
        assert_eq!(blocked.len(), 2);
        assert!(blocked.contains(&shared));
        assert!(blocked.contains(&posts_only));
    }
}
