use futures::future::join_all;
use mongodb::bson::{doc, oid::ObjectId, Document};

use crate::api::audit::{track_changes, ChangeRecord};
use crate::api::mail::{send_letter, CreateLetter};
use crate::auth::Auth;
use crate::context::GeneralContext;
use crate::default_timestamp;
use crate::entities::notification::{Message, Notification, NotificationState, Priority};
use crate::entities::user::{Frequency, User};
use crate::error::{self, ServiceError};
use crate::repository::RepositoryObject;

/// A domain object that can trigger notifications about itself.
pub trait Notifiable {
    const OBJECT_TYPE: &'static str;

    fn object_id(&self) -> ObjectId;
    fn organisation(&self) -> &str;
}

/// Marks a [`Notifiable`] whose notifications can later be revoked when the
/// triggering condition is reversed.
pub trait Cancellable: Notifiable {}

/// What a resolver produces for one event: who to tell and what to say.
#[derive(Debug, Clone)]
pub struct NotificationPayload {
    pub to: Vec<String>,
    pub title: Message,
    pub description: Message,
    pub action: Option<String>,
    pub priority: Option<Priority>,
    pub content: Document,
}

impl NotificationPayload {
    pub fn new(to: Vec<String>, title: impl Into<Message>, description: impl Into<Message>) -> Self {
        Self {
            to,
            title: title.into(),
            description: description.into(),
            action: None,
            priority: None,
            content: Document::new(),
        }
    }

    /// A resolver that decided nobody needs to hear about the event.
    pub fn nobody() -> Self {
        Self::new(Vec::new(), "", "")
    }

    pub fn action(mut self, action: &str) -> Self {
        self.action = Some(action.to_string());
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn content(mut self, content: Document) -> Self {
        self.content = content;
        self
    }
}

#[derive(Debug, Default)]
pub struct DispatchReport {
    pub delivered: Vec<String>,
    pub failed: Vec<(String, ServiceError)>,
}

#[derive(Debug, Default)]
pub struct CancelReport {
    pub cancelled: Vec<ObjectId>,
    pub failed: Vec<(ObjectId, ServiceError)>,
}

/// Fans the payload out to every recipient: one upsert-by-identity write per
/// recipient, settled concurrently. A failed write for one recipient never
/// blocks the others; failures land in the report and the log.
pub async fn send_notifications<T: Notifiable>(
    context: &GeneralContext,
    target: &T,
    payload: NotificationPayload,
) -> error::Result<DispatchReport> {
    let mut recipients: Vec<String> = Vec::new();
    for recipient in &payload.to {
        if !recipients.contains(recipient) {
            recipients.push(recipient.clone());
        }
    }
    // An empty recipient set is a valid resolution outcome, not an error.
    if recipients.is_empty() {
        return Ok(DispatchReport::default());
    }

    let repository = context.try_get_repository::<Notification>()?;
    let action = payload.action.clone().unwrap_or_else(|| "fyi".to_string());
    let priority = payload.priority.unwrap_or_default();
    let by = match context.auth() {
        Auth::None => context.server_auth(),
        auth => auth,
    };
    let actor = by.actor();

    let writes = recipients.iter().map(|recipient| {
        let now = default_timestamp();
        let fresh = Notification {
            id: ObjectId::new(),
            recipient: recipient.clone(),
            organisation: target.organisation().to_string(),
            object_type: T::OBJECT_TYPE.to_string(),
            object_id: target.object_id(),
            action: action.clone(),
            title: payload.title.clone(),
            description: payload.description.clone(),
            state: NotificationState::Unread,
            priority,
            content: payload.content.clone(),
            is_active: true,
            created_by: actor.clone(),
            created_on: now,
            updated_by: actor.clone(),
            updated_on: now,
        };
        upsert_for_recipient(context, &repository, fresh)
    });

    let results = join_all(writes).await;

    let mut report = DispatchReport::default();
    for (recipient, result) in recipients.iter().zip(results) {
        match result {
            Ok(notification) => {
                if let Err(err) = email_if_immediate(context, &notification).await {
                    log::error!("failed to email notification to {}: {}", recipient, err);
                }
                report.delivered.push(recipient.clone());
            }
            Err(err) => {
                log::error!("failed to deliver notification to {}: {}", recipient, err);
                report.failed.push((recipient.clone(), err));
            }
        }
    }
    Ok(report)
}

/// Insert-or-update keyed by (recipient, organisation, objectType, objectId,
/// action). A re-trigger overwrites the mutable fields and resets the state
/// to unread, keeping createdBy/createdOn.
async fn upsert_for_recipient(
    context: &GeneralContext,
    repository: &RepositoryObject<Notification>,
    fresh: Notification,
) -> error::Result<Notification> {
    let filter = fresh.identity_filter();
    let existing = repository.find_one_by(filter.clone()).await?;

    let notification = match existing.clone() {
        Some(mut current) => {
            current.title = fresh.title;
            current.description = fresh.description;
            current.content = fresh.content;
            current.priority = fresh.priority;
            current.state = NotificationState::Unread;
            current.is_active = true;
            current.updated_by = fresh.updated_by;
            current.updated_on = fresh.updated_on;
            current
        }
        None => fresh,
    };

    repository.replace_upsert(filter, &notification).await?;

    track_changes(
        context,
        ChangeRecord::diff(
            "notification",
            notification.id,
            "send",
            &notification.updated_by,
            existing.as_ref(),
            &notification,
        ),
    )
    .await;

    Ok(notification)
}

/// Copies the notification to the email channel when the recipient asked for
/// immediate delivery in that category. Services that do not register a user
/// repository skip the channel entirely.
async fn email_if_immediate(
    context: &GeneralContext,
    notification: &Notification,
) -> error::Result<()> {
    let GeneralContext::Effectfull(_) = context else {
        return Ok(());
    };
    let Ok(users) = context.try_get_repository::<User>() else {
        return Ok(());
    };
    let Some(user) = users
        .find_one_by(doc! {
            "email": &notification.recipient,
            "organisation": &notification.organisation,
        })
        .await?
    else {
        return Ok(());
    };

    let immediate = user
        .preferences
        .notifications
        .category(&notification.object_type)
        .map(|category| category.email.frequency == Frequency::Immediate)
        .unwrap_or(false);
    if immediate {
        send_letter(
            context,
            CreateLetter {
                email: user.email,
                subject: notification.title.render(),
                message: notification.description.render(),
            },
        )
        .await?;
    }
    Ok(())
}

/// Revokes the still-unread notifications matching (objectType, objectId,
/// action). Read and starred records are left alone: the recipient already
/// acted on them. The optional predicate narrows the matches further by
/// inspecting each record's content; no qualifying match is a no-op success.
pub async fn cancel_notifications<T: Cancellable>(
    context: &GeneralContext,
    target: &T,
    action: &str,
    predicate: Option<&(dyn Fn(&Notification) -> bool + Sync)>,
) -> error::Result<CancelReport> {
    let repository = context.try_get_repository::<Notification>()?;
    let matches = repository
        .find_many_by(doc! {
            "objectType": T::OBJECT_TYPE,
            "objectId": target.object_id(),
            "state": "unread",
            "action": action,
        })
        .await?;

    let by = match context.auth() {
        Auth::None => context.server_auth(),
        auth => auth,
    };

    let qualifying: Vec<Notification> = matches
        .into_iter()
        .filter(|notification| predicate.map_or(true, |check| check(notification)))
        .collect();

    let writes = qualifying.into_iter().map(|notification| {
        let id = notification.id;
        let result = cancel_one(context, &repository, notification, &by);
        async move { (id, result.await) }
    });
    let results = join_all(writes).await;

    let mut report = CancelReport::default();
    for (id, result) in results {
        match result {
            Ok(()) => report.cancelled.push(id),
            Err(err) => {
                log::error!("failed to cancel notification {}: {}", id, err);
                report.failed.push((id, err));
            }
        }
    }
    Ok(report)
}

async fn cancel_one(
    context: &GeneralContext,
    repository: &RepositoryObject<Notification>,
    mut notification: Notification,
    by: &Auth,
) -> error::Result<()> {
    let before = notification.clone();
    notification.set_state(NotificationState::Cancelled, by)?;
    repository
        .replace_upsert(doc! {"id": notification.id}, &notification)
        .await?;

    track_changes(
        context,
        ChangeRecord::diff(
            "notification",
            notification.id,
            "cancel",
            &notification.updated_by,
            Some(&before),
            &notification,
        ),
    )
    .await;

    Ok(())
}
