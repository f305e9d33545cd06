use anyhow::anyhow;
use chrono::NaiveDate;
use mongodb::bson::{doc, oid::ObjectId, to_bson, Bson, Document, Regex};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use common::{
    access_rules::{AccessRules, Edit},
    api::audit::{track_changes, ChangeRecord},
    auth::Auth,
    context::GeneralContext,
    entities::notification::{Notification, NotificationState, PublicNotification},
    entities::user::User,
    error::{self, AddCode},
};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationQuery {
    pub title: Option<String>,
    pub state: Option<NotificationState>,
    pub object_type: Option<String>,
    pub created_on_before: Option<NaiveDate>,
    pub created_on_after: Option<NaiveDate>,
    pub is_active: Option<bool>,
}

/// The only states reachable from outside; `unread` and `cancelled` belong to
/// the engine.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum RequestedState {
    Read,
    Starred,
}

impl From<RequestedState> for NotificationState {
    fn from(state: RequestedState) -> Self {
        match state {
            RequestedState::Read => NotificationState::Read,
            RequestedState::Starred => NotificationState::Starred,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct ChangeNotification {
    pub state: Option<RequestedState>,
    pub is_active: Option<bool>,
}

pub struct NotificationService {
    context: GeneralContext,
}

fn day_start_micros(date: NaiveDate) -> i64 {
    date.and_hms_opt(0, 0, 0)
        .map(|dt| dt.timestamp_micros())
        .unwrap_or(0)
}

/// Exclusive upper bound: the first microsecond of the following day, so the
/// whole final second of `date` still matches.
fn day_after_micros(date: NaiveDate) -> i64 {
    date.succ_opt()
        .and_then(|next| next.and_hms_opt(0, 0, 0))
        .map(|dt| dt.timestamp_micros())
        .unwrap_or(i64::MAX)
}

impl NotificationService {
    pub fn new(context: GeneralContext) -> Self {
        Self { context }
    }

    fn build_query(auth: &Auth, query: &NotificationQuery) -> error::Result<Document> {
        let email = auth
            .email()
            .ok_or_else(|| anyhow!("Authentication required").code(401))?;
        let organisation = auth
            .organisation()
            .ok_or_else(|| anyhow!("Authentication required").code(401))?;

        let mut filter = doc! {
            "recipient": email,
            "organisation": organisation,
        };

        if let Some(title) = &query.title {
            filter.insert(
                "title",
                Bson::RegularExpression(Regex {
                    pattern: format!("^.*?{}.*$", title),
                    options: "i".to_string(),
                }),
            );
        }
        if let Some(state) = query.state {
            filter.insert("state", to_bson(&state)?);
        }
        if let Some(object_type) = &query.object_type {
            filter.insert("objectType", object_type);
        }

        let mut created_on = Document::new();
        if let Some(after) = query.created_on_after {
            created_on.insert("$gte", day_start_micros(after));
        }
        if let Some(before) = query.created_on_before {
            created_on.insert("$lt", day_after_micros(before));
        }
        if !created_on.is_empty() {
            filter.insert("createdOn", created_on);
        }

        if let Some(is_active) = query.is_active {
            filter.insert("isActive", is_active);
        }

        Ok(filter)
    }

    /// Query-transformation step of the read path: the recipient's blocked
    /// object ids are pushed into the store query as `$nin`, never applied as
    /// a post-filter.
    async fn apply_preference_filter(&self, filter: &mut Document, auth: &Auth) -> error::Result<()> {
        let users = self.context.try_get_repository::<User>()?;
        let Some(user) = users
            .find_one_by(doc! {
                "email": auth.email().unwrap_or_default(),
                "organisation": auth.organisation().unwrap_or_default(),
            })
            .await?
        else {
            return Ok(());
        };

        let blocked = user.preferences.notifications.blocked_ids();
        if !blocked.is_empty() {
            filter.insert("objectId", doc! {"$nin": blocked});
        }
        Ok(())
    }

    pub async fn my_notifications(
        &self,
        query: NotificationQuery,
    ) -> error::Result<Vec<PublicNotification>> {
        let auth = self.context.auth();
        let mut filter = Self::build_query(&auth, &query)?;
        self.apply_preference_filter(&mut filter, &auth).await?;

        let repository = self.context.try_get_repository::<Notification>()?;
        let notifications = repository.find_many_by(filter).await?;
        Ok(notifications
            .into_iter()
            .map(PublicNotification::from)
            .collect())
    }

    pub async fn change(
        &self,
        id: ObjectId,
        change: ChangeNotification,
    ) -> error::Result<PublicNotification> {
        let auth = self.context.auth();
        let repository = self.context.try_get_repository::<Notification>()?;

        let Some(mut notification) = repository.find("id", &Bson::ObjectId(id)).await? else {
            return Err(anyhow!("No notification found").code(404));
        };
        if !Edit::get_access(&auth, &notification) {
            return Err(anyhow!("Access denied for this user").code(403));
        }
        let before = notification.clone();

        if let Some(state) = change.state {
            notification.set_state(state.into(), &auth)?;
        }
        if let Some(is_active) = change.is_active {
            if notification.is_active != is_active {
                notification.is_active = is_active;
                notification.touch(&auth);
            }
        }

        repository
            .replace_upsert(doc! {"id": notification.id}, &notification)
            .await?;
        track_changes(
            &self.context,
            ChangeRecord::diff(
                "notification",
                notification.id,
                "change",
                &auth.actor(),
                Some(&before),
                &notification,
            ),
        )
        .await;

        Ok(notification.into())
    }
}
