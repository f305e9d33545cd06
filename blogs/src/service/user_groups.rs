use anyhow::anyhow;
use mongodb::bson::{doc, oid::ObjectId, Bson};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use common::{
    api::audit::{track_changes, ChangeRecord},
    api::notifications::NotificationPayload,
    auth::Auth,
    context::GeneralContext,
    default_timestamp,
    entities::blog::Access,
    entities::notification::{Message, Notification, Priority},
    entities::user_group::UserGroup,
    entities::{add_unique, remove_existing},
    error::{self, AddCode},
};

use super::{cancel, notify};

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateGroup {
    pub name: String,
    pub description: String,
    pub access: Access,
    #[serde(default)]
    pub owners: Vec<String>,
    #[serde(default)]
    pub members: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct UpdateGroup {
    pub description: Option<String>,
    pub added_owners: Vec<String>,
    pub removed_owners: Vec<String>,
    pub added_members: Vec<String>,
    pub removed_members: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MemberList {
    pub members: Vec<String>,
}

pub struct UserGroupService {
    context: GeneralContext,
}

impl UserGroupService {
    pub fn new(context: GeneralContext) -> Self {
        Self { context }
    }

    fn identity(&self) -> error::Result<(String, String)> {
        let auth = self.context.auth();
        let email = auth
            .email()
            .ok_or_else(|| anyhow!("Authentication required").code(401))?;
        let organisation = auth
            .organisation()
            .ok_or_else(|| anyhow!("Authentication required").code(401))?;
        Ok((email.to_string(), organisation.to_string()))
    }

    fn require_owner(auth: &Auth, group: &UserGroup) -> error::Result<()> {
        if let Some(organisation) = auth.organisation() {
            if organisation != group.organisation {
                return Err(anyhow!("Access denied for this user").code(403));
            }
        }
        let owner = auth
            .email()
            .map_or(false, |email| group.owners.iter().any(|o| o == email));
        if owner || auth.full_access() {
            Ok(())
        } else {
            Err(anyhow!("Access denied for this user").code(403))
        }
    }

    async fn fetch(&self, id: ObjectId) -> error::Result<UserGroup> {
        let groups = self.context.try_get_repository::<UserGroup>()?;
        let group = groups.find("id", &Bson::ObjectId(id)).await?;
        match group {
            Some(group) if group.is_active => Ok(group),
            _ => Err(anyhow!("No user group found").code(404)),
        }
    }

    async fn persist(&self, action: &str, before: &UserGroup, group: &UserGroup) -> error::Result<()> {
        let groups = self.context.try_get_repository::<UserGroup>()?;
        groups.replace_upsert(doc! {"id": group.id}, group).await?;
        track_changes(
            &self.context,
            ChangeRecord::diff(
                "userGroups",
                group.id,
                action,
                &group.updated_by,
                Some(before),
                group,
            ),
        )
        .await;
        Ok(())
    }

    pub async fn create(&self, create: CreateGroup) -> error::Result<UserGroup> {
        let (email, organisation) = self.identity()?;
        let groups = self.context.try_get_repository::<UserGroup>()?;

        if groups
            .find_one_by(doc! {
                "organisation": &organisation,
                "name": &create.name,
                "isActive": true,
            })
            .await?
            .is_some()
        {
            return Err(anyhow!("A group with this name already exists").code(409));
        }

        let now = default_timestamp();
        let mut owners = vec![email.clone()];
        add_unique(&mut owners, create.owners);
        // Owners are members of their own group.
        let mut members = owners.clone();
        add_unique(&mut members, create.members);
        let group = UserGroup {
            id: ObjectId::new(),
            organisation,
            name: create.name,
            description: create.description,
            access: create.access,
            owners,
            members,
            needs_approval: Vec::new(),
            is_active: true,
            created_by: email.clone(),
            created_on: now,
            updated_by: email,
            updated_on: now,
        };
        groups.insert(&group).await?;
        track_changes(
            &self.context,
            ChangeRecord::diff(
                "userGroups",
                group.id,
                "create",
                &group.created_by,
                None,
                &group,
            ),
        )
        .await;

        notify(
            &self.context,
            &group,
            NotificationPayload::new(
                group.owners.clone(),
                Message::template("Group {{name}} was created", &[("name", &group.name)]),
                Message::template(
                    "You are an owner of the new group {{name}}",
                    &[("name", &group.name)],
                ),
            ),
        )
        .await;

        Ok(group)
    }

    pub async fn update(&self, id: ObjectId, update: UpdateGroup) -> error::Result<UserGroup> {
        let auth = self.context.auth();
        let mut group = self.fetch(id).await?;
        Self::require_owner(&auth, &group)?;
        let before = group.clone();

        let mut modified = false;
        if let Some(description) = update.description {
            if description != group.description {
                group.description = description;
                modified = true;
            }
        }
        modified |= add_unique(&mut group.owners, update.added_owners);
        modified |= remove_existing(&mut group.owners, &update.removed_owners);
        modified |= add_unique(&mut group.members, update.added_members);
        modified |= remove_existing(&mut group.members, &update.removed_members);

        // Owners only hear about updates that actually changed something.
        if !modified {
            return Ok(group);
        }

        group.updated_by = auth.actor();
        group.updated_on = default_timestamp();
        self.persist("update", &before, &group).await?;

        notify(
            &self.context,
            &group,
            NotificationPayload::new(
                group.owners.clone(),
                Message::template("Group {{name}} was updated", &[("name", &group.name)]),
                Message::template(
                    "{{user}} changed group {{name}}",
                    &[("user", &group.updated_by), ("name", &group.name)],
                ),
            ),
        )
        .await;

        Ok(group)
    }

    pub async fn delete(&self, id: ObjectId) -> error::Result<UserGroup> {
        let auth = self.context.auth();
        let mut group = self.fetch(id).await?;
        Self::require_owner(&auth, &group)?;
        let before = group.clone();

        group.is_active = false;
        group.updated_by = auth.actor();
        group.updated_on = default_timestamp();
        self.persist("delete", &before, &group).await?;

        // A deleted group has no owners left to decide on pending requests.
        cancel(&self.context, &group, "approve", None).await;
        notify(
            &self.context,
            &group,
            NotificationPayload::new(
                group.owners.clone(),
                Message::template("Group {{name}} was deleted", &[("name", &group.name)]),
                Message::template(
                    "{{user}} deleted group {{name}}",
                    &[("user", &group.updated_by), ("name", &group.name)],
                ),
            ),
        )
        .await;

        Ok(group)
    }

    pub async fn join(&self, id: ObjectId) -> error::Result<UserGroup> {
        let (email, _) = self.identity()?;
        let mut group = self.fetch(id).await?;
        if group.members.iter().any(|m| m == &email) {
            return Ok(group);
        }
        let before = group.clone();

        match group.access {
            Access::Public => {
                add_unique(&mut group.members, vec![email.clone()]);
                group.updated_by = email.clone();
                group.updated_on = default_timestamp();
                self.persist("join", &before, &group).await?;

                notify(
                    &self.context,
                    &group,
                    NotificationPayload::new(
                        group.owners.clone(),
                        Message::template(
                            "{{user}} joined {{name}}",
                            &[("user", &email), ("name", &group.name)],
                        ),
                        Message::template(
                            "{{user}} is now a member of group {{name}}",
                            &[("user", &email), ("name", &group.name)],
                        ),
                    ),
                )
                .await;
            }
            Access::Restricted => {
                if !add_unique(&mut group.needs_approval, vec![email.clone()]) {
                    return Ok(group);
                }
                group.updated_by = email.clone();
                group.updated_on = default_timestamp();
                self.persist("join", &before, &group).await?;

                notify(
                    &self.context,
                    &group,
                    NotificationPayload::new(
                        group.owners.clone(),
                        Message::template(
                            "{{user}} wants to join {{name}}",
                            &[("user", &email), ("name", &group.name)],
                        ),
                        Message::template(
                            "Approve or decline the request of {{user}} to join {{name}}",
                            &[("user", &email), ("name", &group.name)],
                        ),
                    )
                    .action("approve")
                    .priority(Priority::Medium)
                    .content(doc! {"join": &email}),
                )
                .await;
            }
        }

        Ok(group)
    }

    pub async fn approve(&self, id: ObjectId, list: MemberList) -> error::Result<UserGroup> {
        let auth = self.context.auth();
        let mut group = self.fetch(id).await?;
        Self::require_owner(&auth, &group)?;
        let before = group.clone();

        let approved: Vec<String> = list
            .members
            .into_iter()
            .filter(|email| group.needs_approval.iter().any(|p| p == email))
            .collect();
        // Nothing pending for these identities is a valid no-op.
        if approved.is_empty() {
            return Ok(group);
        }

        remove_existing(&mut group.needs_approval, &approved);
        add_unique(&mut group.members, approved.clone());
        group.updated_by = auth.actor();
        group.updated_on = default_timestamp();
        self.persist("approve", &before, &group).await?;

        notify(
            &self.context,
            &group,
            NotificationPayload::new(
                approved.clone(),
                Message::template(
                    "Your request to join {{name}} was approved",
                    &[("name", &group.name)],
                ),
                Message::template(
                    "You are now a member of {{name}}",
                    &[("name", &group.name)],
                ),
            ),
        )
        .await;

        cancel(
            &self.context,
            &group,
            "approve",
            Some(&move |n: &Notification| {
                approved
                    .iter()
                    .any(|email| n.content.get_str("join") == Ok(email.as_str()))
            }),
        )
        .await;

        Ok(group)
    }

    pub async fn reject(&self, id: ObjectId, list: MemberList) -> error::Result<UserGroup> {
        let auth = self.context.auth();
        let mut group = self.fetch(id).await?;
        Self::require_owner(&auth, &group)?;
        let before = group.clone();

        let rejected: Vec<String> = list
            .members
            .into_iter()
            .filter(|email| group.needs_approval.iter().any(|p| p == email))
            .collect();
        if rejected.is_empty() {
            return Ok(group);
        }

        remove_existing(&mut group.needs_approval, &rejected);
        group.updated_by = auth.actor();
        group.updated_on = default_timestamp();
        self.persist("reject", &before, &group).await?;

        notify(
            &self.context,
            &group,
            NotificationPayload::new(
                rejected,
                Message::template(
                    "Your request to join {{name}} was declined",
                    &[("name", &group.name)],
                ),
                Message::template(
                    "An owner declined your request to join {{name}}",
                    &[("name", &group.name)],
                ),
            ),
        )
        .await;

        // Same clearing rule as blog rejects: every outstanding request goes.
        cancel(&self.context, &group, "approve", None).await;

        Ok(group)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use mongodb::bson::doc;
    use type_map::concurrent::TypeMap;

    use common::auth::{Auth, Service};
    use common::context::{GeneralContext, TestContext};
    use common::entities::blog::Access;
    use common::entities::notification::{Notification, NotificationState};
    use common::entities::user_group::UserGroup;
    use common::repository::test_repository::TestRepository;
    use common::repository::RepositoryObject;

    use super::{CreateGroup, MemberList, UpdateGroup, UserGroupService};

    fn user(email: &str) -> Auth {
        Auth::User {
            email: email.to_string(),
            organisation: "acme".to_string(),
        }
    }

    struct Fixture {
        groups: RepositoryObject<UserGroup>,
        notifications: RepositoryObject<Notification>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                groups: Arc::new(TestRepository::new()),
                notifications: Arc::new(TestRepository::new()),
            }
        }

        fn service_as(&self, auth: Auth) -> UserGroupService {
            let mut repositories = TypeMap::new();
            repositories.insert::<RepositoryObject<UserGroup>>(Arc::clone(&self.groups));
            repositories.insert::<RepositoryObject<Notification>>(Arc::clone(&self.notifications));
            UserGroupService::new(GeneralContext::Test(TestContext::new(
                Auth::Service(Service::Blogs),
                auth,
                repositories,
            )))
        }

        async fn approve_requests(&self) -> Vec<Notification> {
            self.notifications
                .find_many_by(doc! {"action": "approve"})
                .await
                .unwrap()
        }
    }

    fn create_payload(name: &str, access: Access) -> CreateGroup {
        CreateGroup {
            name: name.to_string(),
            description: "a group".to_string(),
            access,
            owners: Vec::new(),
            members: Vec::new(),
        }
    }

    #[tokio::test]
    async fn creation_seeds_owners_as_members_and_tells_them() {
        let fixture = Fixture::new();
        let service = fixture.service_as(user("owner@example.com"));

        let group = service
            .create(create_payload("editors", Access::Restricted))
            .await
            .unwrap();
        assert_eq!(group.members, vec!["owner@example.com"]);

        let records = fixture
            .notifications
            .find_many_by(doc! {"recipient": "owner@example.com"})
            .await
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].object_type, "userGroups");
        assert_eq!(records[0].object_id, group.id);

        let err = service
            .create(create_payload("editors", Access::Restricted))
            .await
            .unwrap_err();
        assert_eq!(err.code, 409);
    }

    #[tokio::test]
    async fn restricted_join_asks_owners_for_approval() {
        let fixture = Fixture::new();
        let owner = fixture.service_as(user("owner@example.com"));
        let group = owner
            .create(create_payload("editors", Access::Restricted))
            .await
            .unwrap();

        let joiner = fixture.service_as(user("joiner@example.com"));
        let group = joiner.join(group.id).await.unwrap();
        assert_eq!(group.needs_approval, vec!["joiner@example.com"]);
        assert!(!group.members.iter().any(|m| m == "joiner@example.com"));

        let requests = fixture.approve_requests().await;
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].recipient, "owner@example.com");
        assert_eq!(requests[0].object_type, "userGroups");
        assert_eq!(
            requests[0].content.get_str("join").unwrap(),
            "joiner@example.com"
        );
    }

    #[tokio::test]
    async fn approving_members_cancels_the_request() {
        let fixture = Fixture::new();
        let owner = fixture.service_as(user("owner@example.com"));
        let group = owner
            .create(create_payload("editors", Access::Restricted))
            .await
            .unwrap();

        fixture
            .service_as(user("joiner@example.com"))
            .join(group.id)
            .await
            .unwrap();

        let group = owner
            .approve(
                group.id,
                MemberList {
                    members: vec!["joiner@example.com".to_string()],
                },
            )
            .await
            .unwrap();
        assert!(group.members.iter().any(|m| m == "joiner@example.com"));
        assert!(group.needs_approval.is_empty());

        let requests = fixture.approve_requests().await;
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].state, NotificationState::Cancelled);

        let verdicts = fixture
            .notifications
            .find_many_by(doc! {"recipient": "joiner@example.com"})
            .await
            .unwrap();
        assert_eq!(verdicts.len(), 1);
        assert_eq!(verdicts[0].state, NotificationState::Unread);
    }

    #[tokio::test]
    async fn membership_updates_notify_owners_once_something_changes() {
        let fixture = Fixture::new();
        let owner = fixture.service_as(user("owner@example.com"));
        let group = owner
            .create(create_payload("editors", Access::Public))
            .await
            .unwrap();
        let after_create = fixture
            .notifications
            .find_many_by(doc! {})
            .await
            .unwrap()
            .len();

        owner.update(group.id, Default::default()).await.unwrap();
        let untouched = fixture.notifications.find_many_by(doc! {}).await.unwrap();
        assert_eq!(untouched.len(), after_create);

        let group = owner
            .update(
                group.id,
                UpdateGroup {
                    added_members: vec!["new-member@example.com".to_string()],
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(group.members.iter().any(|m| m == "new-member@example.com"));

        // Same identity as the creation notice, so the record is retriggered
        // in place rather than duplicated.
        let after_update = fixture
            .notifications
            .find_many_by(doc! {"recipient": "owner@example.com"})
            .await
            .unwrap();
        assert_eq!(after_update.len(), 1);
        assert_eq!(after_update[0].title.render(), "Group editors was updated");
    }

    #[tokio::test]
    async fn deleting_a_group_cancels_outstanding_requests() {
        let fixture = Fixture::new();
        let owner = fixture.service_as(user("owner@example.com"));
        let group = owner
            .create(create_payload("editors", Access::Restricted))
            .await
            .unwrap();

        fixture
            .service_as(user("joiner@example.com"))
            .join(group.id)
            .await
            .unwrap();

        let stranger = fixture.service_as(user("stranger@example.com"));
        let err = stranger.delete(group.id).await.unwrap_err();
        assert_eq!(err.code, 403);

        let group = owner.delete(group.id).await.unwrap();
        assert!(!group.is_active);

        let requests = fixture.approve_requests().await;
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].state, NotificationState::Cancelled);

        // A deleted group is gone for joiners too.
        let err = fixture
            .service_as(user("late@example.com"))
            .join(group.id)
            .await
            .unwrap_err();
        assert_eq!(err.code, 404);
    }
}
