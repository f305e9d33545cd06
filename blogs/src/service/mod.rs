use common::{
    api::notifications::{
        cancel_notifications, send_notifications, Cancellable, Notifiable, NotificationPayload,
    },
    context::GeneralContext,
    entities::notification::Notification,
};

pub mod blogs;
pub mod posts;
pub mod user_groups;

/// Post-mutation hook: runs after the primary write committed, so failures
/// are logged and never bubble back into the HTTP operation.
pub(crate) async fn notify<T: Notifiable>(
    context: &GeneralContext,
    target: &T,
    payload: NotificationPayload,
) {
    match send_notifications(context, target, payload).await {
        Ok(report) if !report.failed.is_empty() => log::error!(
            "partial notification delivery for {} {}: {} recipient(s) failed",
            T::OBJECT_TYPE,
            target.object_id(),
            report.failed.len()
        ),
        Ok(_) => {}
        Err(err) => log::error!(
            "notification dispatch failed for {} {}: {}",
            T::OBJECT_TYPE,
            target.object_id(),
            err
        ),
    }
}

pub(crate) async fn cancel<T: Cancellable>(
    context: &GeneralContext,
    target: &T,
    action: &str,
    predicate: Option<&(dyn Fn(&Notification) -> bool + Sync)>,
) {
    match cancel_notifications(context, target, action, predicate).await {
        Ok(report) if !report.failed.is_empty() => log::error!(
            "partial cancellation for {} {}: {} record(s) failed",
            T::OBJECT_TYPE,
            target.object_id(),
            report.failed.len()
        ),
        Ok(_) => {}
        Err(err) => log::error!(
            "cancellation failed for {} {}: {}",
            T::OBJECT_TYPE,
            target.object_id(),
            err
        ),
    }
}
