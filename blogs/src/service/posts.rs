use anyhow::anyhow;
use mongodb::bson::{doc, oid::ObjectId, Bson};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use common::{
    api::audit::{track_changes, ChangeRecord},
    api::notifications::NotificationPayload,
    context::GeneralContext,
    default_timestamp,
    entities::blog::Blog,
    entities::notification::{Message, Priority},
    entities::post::{Post, PostState},
    entities::user_group::UserGroup,
    error::{self, AddCode},
};

use super::{cancel, notify};

/// Retried submissions inside this window count as duplicates, not new posts.
const DUPLICATE_WINDOW_MICROS: i64 = 300 * 1_000_000;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreatePost {
    pub blog_id: String,
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub subscribers: Vec<String>,
    #[serde(default)]
    pub subscriber_groups: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChangePostState {
    pub state: PostState,
}

fn can_transition(from: PostState, to: PostState) -> bool {
    use PostState::*;
    matches!(
        (from, to),
        (Draft, PendingReview)
            | (PendingReview, Published)
            | (PendingReview, DoNotPublish)
            | (DoNotPublish, PendingReview)
            | (Published, Archived)
            | (DoNotPublish, Archived)
    )
}

pub struct PostService {
    context: GeneralContext,
}

impl PostService {
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

    pub async fn create(&self, create: CreatePost) -> error::Result<Post> {
        let (email, organisation) = self.identity()?;
        let blog_id = ObjectId::parse_str(&create.blog_id)
            .map_err(|_| anyhow!("Invalid blog id").code(400))?;

        let blogs = self.context.try_get_repository::<Blog>()?;
        match blogs.find("id", &Bson::ObjectId(blog_id)).await? {
            Some(blog) if blog.is_active => {}
            _ => return Err(anyhow!("No blog found").code(404)),
        }

        let posts = self.context.try_get_repository::<Post>()?;
        let window_start = default_timestamp() - DUPLICATE_WINDOW_MICROS;
        if posts
            .find_one_by(doc! {
                "organisation": &organisation,
                "blogId": blog_id,
                "title": &create.title,
                "createdOn": {"$gte": window_start},
            })
            .await?
            .is_some()
        {
            return Err(anyhow!("An identical post was just created").code(409));
        }

        let now = default_timestamp();
        let post = Post {
            id: ObjectId::new(),
            organisation,
            blog_id,
            title: create.title,
            body: create.body,
            state: PostState::Draft,
            owners: vec![email.clone()],
            subscribers: create.subscribers,
            subscriber_groups: create.subscriber_groups,
            published_by: None,
            is_active: true,
            created_by: email.clone(),
            created_on: now,
            updated_by: email,
            updated_on: now,
        };
        posts.insert(&post).await?;
        track_changes(
            &self.context,
            ChangeRecord::diff("posts", post.id, "create", &post.created_by, None, &post),
        )
        .await;

        // A draft resolves to an empty recipient set, which the dispatcher
        // treats as a no-op.
        self.notify_for_state(&post).await;

        Ok(post)
    }

    pub async fn transition(&self, id: ObjectId, next: PostState) -> error::Result<Post> {
        let auth = self.context.auth();
        let posts = self.context.try_get_repository::<Post>()?;
        let mut post = match posts.find("id", &Bson::ObjectId(id)).await? {
            Some(post) if post.is_active => post,
            _ => return Err(anyhow!("No post found").code(404)),
        };

        let owner = auth
            .email()
            .map_or(false, |email| post.owners.iter().any(|o| o == email));
        if !owner && !auth.full_access() {
            return Err(anyhow!("Access denied for this user").code(403));
        }
        if !can_transition(post.state, next) {
            return Err(
                anyhow!("Cannot move post from {:?} to {:?}", post.state, next).code(400),
            );
        }

        let before = post.clone();
        post.state = next;
        if next == PostState::Published {
            post.published_by = Some(auth.actor());
        }
        post.updated_by = auth.actor();
        post.updated_on = default_timestamp();
        posts.replace_upsert(doc! {"id": post.id}, &post).await?;
        track_changes(
            &self.context,
            ChangeRecord::diff("posts", post.id, "transition", &post.updated_by, Some(&before), &post),
        )
        .await;

        // Hooks run after the mutation committed. A decided review no longer
        // needs the reviewers' attention.
        if matches!(next, PostState::Published | PostState::DoNotPublish) {
            cancel(&self.context, &post, "review", None).await;
        }
        self.notify_for_state(&post).await;

        Ok(post)
    }

    async fn notify_for_state(&self, post: &Post) {
        match self.notification_for(post).await {
            Ok(payload) => notify(&self.context, post, payload).await,
            Err(err) => log::error!("recipient resolution failed for post {}: {}", post.id, err),
        }
    }

    /// Recipient resolver for the post state machine. The match is exhaustive
    /// on purpose: a new state must pick its audience here before it compiles.
    async fn notification_for(&self, post: &Post) -> error::Result<NotificationPayload> {
        let payload = match post.state {
            PostState::Draft | PostState::Archived => NotificationPayload::nobody(),
            PostState::PendingReview => NotificationPayload::new(
                self.reviewers(post).await?,
                Message::template("Post {{title}} awaits review", &[("title", &post.title)]),
                Message::template(
                    "Review {{title}} and publish or decline it",
                    &[("title", &post.title)],
                ),
            )
            .action("review")
            .priority(Priority::Medium),
            PostState::Published => {
                let mut to = post.owners.clone();
                to.extend(post.subscribers.iter().cloned());
                to.extend(self.group_members(post).await?);
                NotificationPayload::new(
                    to,
                    Message::template("Post {{title}} was published", &[("title", &post.title)]),
                    Message::template(
                        "{{title}} is now live on the blog",
                        &[("title", &post.title)],
                    ),
                )
                .content(doc! {"post": post.id})
            }
            PostState::DoNotPublish => NotificationPayload::new(
                post.owners.clone(),
                Message::template("Post {{title}} was declined", &[("title", &post.title)]),
                Message::template(
                    "A reviewer declined to publish {{title}}",
                    &[("title", &post.title)],
                ),
            )
            .priority(Priority::Medium),
        };
        Ok(payload)
    }

    /// Review requests go to the owners of the parent blog.
    async fn reviewers(&self, post: &Post) -> error::Result<Vec<String>> {
        let blogs = self.context.try_get_repository::<Blog>()?;
        let Some(blog) = blogs.find("id", &Bson::ObjectId(post.blog_id)).await? else {
            return Err(anyhow!("No blog found for post").code(404));
        };
        Ok(blog.owners)
    }

    /// Expands subscriber group names into member emails. Awaited before any
    /// dispatch happens; a failed lookup fails the resolution.
    async fn group_members(&self, post: &Post) -> error::Result<Vec<String>> {
        if post.subscriber_groups.is_empty() {
            return Ok(Vec::new());
        }
        let groups = self.context.try_get_repository::<UserGroup>()?;
        let matching = groups
            .find_many_by(doc! {
                "organisation": &post.organisation,
                "name": {"$in": post.subscriber_groups.clone()},
                "isActive": true,
            })
            .await?;
        Ok(matching.into_iter().flat_map(|group| group.members).collect())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use mongodb::bson::{doc, oid::ObjectId};
    use type_map::concurrent::TypeMap;

    use common::auth::{Auth, Service};
    use common::context::{GeneralContext, TestContext};
    use common::default_timestamp;
    use common::entities::blog::{Access, Blog};
    use common::entities::notification::{Notification, NotificationState};
    use common::entities::post::{Post, PostState};
    use common::entities::user_group::UserGroup;
    use common::repository::test_repository::TestRepository;
    use common::repository::RepositoryObject;

    use super::{CreatePost, PostService};

    fn author() -> Auth {
        Auth::User {
            email: "author@example.com".to_string(),
            organisation: "acme".to_string(),
        }
    }

    struct Fixture {
        blogs: RepositoryObject<Blog>,
        posts: RepositoryObject<Post>,
        groups: RepositoryObject<UserGroup>,
        notifications: RepositoryObject<Notification>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                blogs: Arc::new(TestRepository::new()),
                posts: Arc::new(TestRepository::new()),
                groups: Arc::new(TestRepository::new()),
                notifications: Arc::new(TestRepository::new()),
            }
        }

        async fn with_blog(self) -> (Self, Blog) {
            let now = default_timestamp();
            let blog = Blog {
                id: ObjectId::new(),
                organisation: "acme".to_string(),
                title: "Engineering".to_string(),
                description: "team blog".to_string(),
                access: Access::Public,
                owners: vec!["reviewer@example.com".to_string()],
                subscribers: Vec::new(),
                needs_approval: Vec::new(),
                is_active: true,
                created_by: "reviewer@example.com".to_string(),
                created_on: now,
                updated_by: "reviewer@example.com".to_string(),
                updated_on: now,
            };
            self.blogs.insert(&blog).await.unwrap();
            (self, blog)
        }

        async fn with_group(self, name: &str, members: &[&str]) -> Self {
            let now = default_timestamp();
            let group = UserGroup {
                id: ObjectId::new(),
                organisation: "acme".to_string(),
                name: name.to_string(),
                description: "a group".to_string(),
                access: Access::Restricted,
                owners: vec!["admin@example.com".to_string()],
                members: members.iter().map(|m| m.to_string()).collect(),
                needs_approval: Vec::new(),
                is_active: true,
                created_by: "admin@example.com".to_string(),
                created_on: now,
                updated_by: "admin@example.com".to_string(),
                updated_on: now,
            };
            self.groups.insert(&group).await.unwrap();
            self
        }

        fn service(&self) -> PostService {
            let mut repositories = TypeMap::new();
            repositories.insert::<RepositoryObject<Blog>>(Arc::clone(&self.blogs));
            repositories.insert::<RepositoryObject<Post>>(Arc::clone(&self.posts));
            repositories.insert::<RepositoryObject<UserGroup>>(Arc::clone(&self.groups));
            repositories.insert::<RepositoryObject<Notification>>(Arc::clone(&self.notifications));
            PostService::new(GeneralContext::Test(TestContext::new(
                Auth::Service(Service::Blogs),
                author(),
                repositories,
            )))
        }
    }

    fn create_payload(blog: &Blog, groups: &[&str]) -> CreatePost {
        CreatePost {
            blog_id: blog.id.to_hex(),
            title: "Quarterly update".to_string(),
            body: "Numbers are up".to_string(),
            subscribers: vec!["fan@example.com".to_string()],
            subscriber_groups: groups.iter().map(|g| g.to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn drafts_notify_nobody() {
        let (fixture, blog) = Fixture::new().with_blog().await;
        let service = fixture.service();

        service.create(create_payload(&blog, &[])).await.unwrap();
        assert!(fixture
            .notifications
            .find_many_by(doc! {})
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn duplicate_submissions_inside_the_window_are_rejected() {
        let (fixture, blog) = Fixture::new().with_blog().await;
        let service = fixture.service();

        service.create(create_payload(&blog, &[])).await.unwrap();
        let err = service.create(create_payload(&blog, &[])).await.unwrap_err();
        assert_eq!(err.code, 409);
    }

    #[tokio::test]
    async fn submitting_for_review_notifies_blog_owners() {
        let (fixture, blog) = Fixture::new().with_blog().await;
        let service = fixture.service();

        let post = service.create(create_payload(&blog, &[])).await.unwrap();
        service
            .transition(post.id, PostState::PendingReview)
            .await
            .unwrap();

        let reviews = fixture
            .notifications
            .find_many_by(doc! {"action": "review"})
            .await
            .unwrap();
        assert_eq!(reviews.len(), 1);
        assert_eq!(reviews[0].recipient, "reviewer@example.com");
        assert_eq!(reviews[0].object_type, "posts");
        assert_eq!(reviews[0].object_id, post.id);
    }

    #[tokio::test]
    async fn publishing_cancels_review_and_fans_out_with_group_expansion() {
        let (fixture, blog) = Fixture::new().with_blog().await;
        let fixture = fixture
            .with_group("editors", &["ed1@example.com", "ed2@example.com"])
            .await
            .with_group("unrelated", &["nobody@example.com"])
            .await;
        let service = fixture.service();

        let post = service
            .create(create_payload(&blog, &["editors"]))
            .await
            .unwrap();
        service
            .transition(post.id, PostState::PendingReview)
            .await
            .unwrap();
        let post = service
            .transition(post.id, PostState::Published)
            .await
            .unwrap();
        assert_eq!(post.published_by.as_deref(), Some("author@example.com"));

        let reviews = fixture
            .notifications
            .find_many_by(doc! {"action": "review"})
            .await
            .unwrap();
        assert_eq!(reviews.len(), 1);
        assert_eq!(reviews[0].state, NotificationState::Cancelled);

        let published: Vec<String> = fixture
            .notifications
            .find_many_by(doc! {"action": "fyi"})
            .await
            .unwrap()
            .into_iter()
            .map(|n| n.recipient)
            .collect();
        assert_eq!(
            published,
            vec![
                "author@example.com",
                "fan@example.com",
                "ed1@example.com",
                "ed2@example.com",
            ]
        );
    }

    #[tokio::test]
    async fn declining_notifies_the_author_and_cancels_review() {
        let (fixture, blog) = Fixture::new().with_blog().await;
        let service = fixture.service();

        let post = service.create(create_payload(&blog, &[])).await.unwrap();
        service
            .transition(post.id, PostState::PendingReview)
            .await
            .unwrap();
        service
            .transition(post.id, PostState::DoNotPublish)
            .await
            .unwrap();

        let reviews = fixture
            .notifications
            .find_many_by(doc! {"action": "review"})
            .await
            .unwrap();
        assert_eq!(reviews[0].state, NotificationState::Cancelled);

        let declined = fixture
            .notifications
            .find_many_by(doc! {"recipient": "author@example.com", "action": "fyi"})
            .await
            .unwrap();
        assert_eq!(declined.len(), 1);
        assert_eq!(declined[0].state, NotificationState::Unread);
    }

    #[tokio::test]
    async fn illegal_transitions_fail_loudly() {
        let (fixture, blog) = Fixture::new().with_blog().await;
        let service = fixture.service();

        let post = service.create(create_payload(&blog, &[])).await.unwrap();
        let err = service
            .transition(post.id, PostState::Published)
            .await
            .unwrap_err();
        assert_eq!(err.code, 400);

        let err = service
            .transition(post.id, PostState::Archived)
            .await
            .unwrap_err();
        assert_eq!(err.code, 400);

        // The post is untouched.
        let stored = fixture
            .posts
            .find("id", &post.id.into())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.state, PostState::Draft);
    }

    #[tokio::test]
    async fn strangers_cannot_move_posts() {
        let (fixture, blog) = Fixture::new().with_blog().await;
        let service = fixture.service();
        let post = service.create(create_payload(&blog, &[])).await.unwrap();

        let mut repositories = TypeMap::new();
        repositories.insert::<RepositoryObject<Blog>>(Arc::clone(&fixture.blogs));
        repositories.insert::<RepositoryObject<Post>>(Arc::clone(&fixture.posts));
        repositories.insert::<RepositoryObject<UserGroup>>(Arc::clone(&fixture.groups));
        repositories
            .insert::<RepositoryObject<Notification>>(Arc::clone(&fixture.notifications));
        let stranger = PostService::new(GeneralContext::Test(TestContext::new(
            Auth::Service(Service::Blogs),
            Auth::User {
                email: "stranger@example.com".to_string(),
                organisation: "acme".to_string(),
            },
            repositories,
        )));

        let err = stranger
            .transition(post.id, PostState::PendingReview)
            .await
            .unwrap_err();
        assert_eq!(err.code, 403);
    }
}
