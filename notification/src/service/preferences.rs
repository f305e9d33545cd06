use anyhow::anyhow;
use mongodb::bson::{doc, oid::ObjectId};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use common::{
    context::GeneralContext,
    default_timestamp,
    entities::{
        add_unique, remove_existing,
        user::{Frequency, Preferences, User},
    },
    error::{self, AddCode},
};

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct UpdateChannel {
    pub frequency: Option<Frequency>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct UpdateCategory {
    pub inapp: UpdateChannel,
    pub email: UpdateChannel,
    pub added_blocked: Vec<String>,
    pub removed_blocked: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct UpdatePreferences {
    pub locale: Option<String>,
    pub blogs: Option<UpdateCategory>,
    pub posts: Option<UpdateCategory>,
    pub user_groups: Option<UpdateCategory>,
}

pub struct PreferencesService {
    context: GeneralContext,
}

fn parse_ids(ids: &[String]) -> error::Result<Vec<ObjectId>> {
    ids.iter()
        .map(|id| {
            ObjectId::parse_str(id).map_err(|_| anyhow!("Invalid object id: {}", id).code(400))
        })
        .collect()
}

impl PreferencesService {
    pub fn new(context: GeneralContext) -> Self {
        Self { context }
    }

    async fn my_profile(&self) -> error::Result<User> {
        let auth = self.context.auth();
        let email = auth
            .email()
            .ok_or_else(|| anyhow!("Authentication required").code(401))?;
        let organisation = auth
            .organisation()
            .ok_or_else(|| anyhow!("Authentication required").code(401))?;

        let users = self.context.try_get_repository::<User>()?;
        users
            .find_one_by(doc! {"email": email, "organisation": organisation})
            .await?
            .ok_or_else(|| anyhow!("No user profile found").code(404))
    }

    pub async fn get(&self) -> error::Result<Preferences> {
        Ok(self.my_profile().await?.preferences)
    }

    pub async fn update(&self, update: UpdatePreferences) -> error::Result<Preferences> {
        let mut user = self.my_profile().await?;

        if let Some(locale) = update.locale {
            user.preferences.locale = locale;
        }

        let updates = [
            ("blogs", update.blogs),
            ("posts", update.posts),
            ("userGroups", update.user_groups),
        ];
        for (object_type, category_update) in updates {
            let Some(category_update) = category_update else {
                continue;
            };
            let added = parse_ids(&category_update.added_blocked)?;
            let removed = parse_ids(&category_update.removed_blocked)?;

            let Some(category) = user.preferences.notifications.category_mut(object_type) else {
                continue;
            };
            if let Some(frequency) = category_update.inapp.frequency {
                category.inapp.frequency = frequency;
            }
            if let Some(frequency) = category_update.email.frequency {
                category.email.frequency = frequency;
            }
            add_unique(&mut category.blocked, added);
            remove_existing(&mut category.blocked, &removed);
        }

        user.updated_on = default_timestamp();
        let users = self.context.try_get_repository::<User>()?;
        users.replace_upsert(doc! {"id": user.id}, &user).await?;
        Ok(user.preferences)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use mongodb::bson::oid::ObjectId;
    use type_map::concurrent::TypeMap;

    use common::auth::{Auth, Service};
    use common::context::{GeneralContext, TestContext};
    use common::default_timestamp;
    use common::entities::user::{Frequency, Preferences, User};
    use common::repository::test_repository::TestRepository;
    use common::repository::RepositoryObject;

    use super::{PreferencesService, UpdateCategory, UpdateChannel, UpdatePreferences};

    async fn service() -> PreferencesService {
        let users: RepositoryObject<User> = Arc::new(TestRepository::new());
        let now = default_timestamp();
        users
            .insert(&User {
                id: ObjectId::new(),
                email: "reader@example.com".to_string(),
                organisation: "acme".to_string(),
                name: "Reader".to_string(),
                preferences: Preferences::default(),
                is_active: true,
                created_on: now,
                updated_on: now,
            })
            .await
            .unwrap();

        let mut repositories = TypeMap::new();
        repositories.insert::<RepositoryObject<User>>(users);
        PreferencesService::new(GeneralContext::Test(TestContext::new(
            Auth::Service(Service::Notification),
            Auth::User {
                email: "reader@example.com".to_string(),
                organisation: "acme".to_string(),
            },
            repositories,
        )))
    }

    #[tokio::test]
    async fn blocked_lists_grow_and_shrink() {
        let service = service().await;
        let first = ObjectId::new();
        let second = ObjectId::new();

        let preferences = service
            .update(UpdatePreferences {
                posts: Some(UpdateCategory {
                    added_blocked: vec![first.to_hex(), second.to_hex(), first.to_hex()],
                    ..Default::default()
                }),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(preferences.notifications.posts.blocked, vec![first, second]);

        let preferences = service
            .update(UpdatePreferences {
                posts: Some(UpdateCategory {
                    removed_blocked: vec![first.to_hex()],
                    ..Default::default()
                }),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(preferences.notifications.posts.blocked, vec![second]);

        // The change persisted.
        assert_eq!(service.get().await.unwrap().notifications.posts.blocked, vec![second]);
    }

    #[tokio::test]
    async fn frequencies_update_per_channel() {
        let service = service().await;

        let preferences = service
            .update(UpdatePreferences {
                blogs: Some(UpdateCategory {
                    email: UpdateChannel {
                        frequency: Some(Frequency::Weekly),
                    },
                    ..Default::default()
                }),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(preferences.notifications.blogs.email.frequency, Frequency::Weekly);
        assert_eq!(
            preferences.notifications.blogs.inapp.frequency,
            Frequency::Immediate
        );
    }

    #[tokio::test]
    async fn malformed_object_ids_are_client_errors() {
        let service = service().await;
        let err = service
            .update(UpdatePreferences {
                posts: Some(UpdateCategory {
                    added_blocked: vec!["not-an-id".to_string()],
                    ..Default::default()
                }),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert_eq!(err.code, 400);
    }
}
