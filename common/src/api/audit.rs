use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context::GeneralContext;
use crate::default_timestamp;
use crate::services::{API_PREFIX, AUDIT_SERVICE, PROTOCOL};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Change {
    pub field: String,
    pub before: Option<Value>,
    pub after: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeRecord {
    pub object_type: String,
    pub object_id: ObjectId,
    pub action: String,
    pub changes: Vec<Change>,
    pub by: String,
    pub timestamp: i64,
}

fn fields<T: Serialize>(value: &T) -> serde_json::Map<String, Value> {
    match serde_json::to_value(value) {
        Ok(Value::Object(map)) => map,
        _ => serde_json::Map::new(),
    }
}

impl ChangeRecord {
    /// Field-level diff of two versions of a document; `before: None` marks a
    /// freshly created one.
    pub fn diff<T: Serialize>(
        object_type: &str,
        object_id: ObjectId,
        action: &str,
        by: &str,
        before: Option<&T>,
        after: &T,
    ) -> Self {
        let before = before.map(fields).unwrap_or_default();
        let after = fields(after);

        let mut changes = Vec::new();
        for (field, new_value) in &after {
            let old_value = before.get(field);
            if old_value != Some(new_value) {
                changes.push(Change {
                    field: field.clone(),
                    before: old_value.cloned(),
                    after: Some(new_value.clone()),
                });
            }
        }

        Self {
            object_type: object_type.to_string(),
            object_id,
            action: action.to_string(),
            changes,
            by: by.to_string(),
            timestamp: default_timestamp(),
        }
    }
}

/// Best-effort hand-off to the audit collaborator; failures are logged and
/// never bubble into the mutation that produced the record.
pub async fn track_changes(context: &GeneralContext, record: ChangeRecord) {
    let GeneralContext::Effectfull(_) = context else {
        log::debug!("change tracking skipped outside the service context");
        return;
    };

    let result = context
        .make_request::<ChangeRecord>()
        .auth(context.server_auth())
        .post(format!(
            "{}://{}/{}/changes",
            PROTOCOL.as_str(),
            AUDIT_SERVICE.as_str(),
            API_PREFIX.as_str(),
        ))
        .json(&record)
        .send()
        .await;

    if let Err(err) = result {
        log::error!(
            "failed to record changes for {} {}: {}",
            record.object_type,
            record.object_id,
            err
        );
    }
}

#[cfg(test)]
mod tests {
    use mongodb::bson::oid::ObjectId;
    use serde::Serialize;

    use super::ChangeRecord;

    #[derive(Serialize)]
    struct Doc {
        state: &'static str,
        title: &'static str,
    }

    #[test]
    fn diff_lists_changed_fields_only() {
        let before = Doc { state: "unread", title: "hello" };
        let after = Doc { state: "cancelled", title: "hello" };

        let record = ChangeRecord::diff(
            "notification",
            ObjectId::new(),
            "cancel",
            "blogs",
            Some(&before),
            &after,
        );
        assert_eq!(record.changes.len(), 1);
        assert_eq!(record.changes[0].field, "state");
        assert_eq!(record.changes[0].before, Some(serde_json::json!("unread")));
        assert_eq!(record.changes[0].after, Some(serde_json::json!("cancelled")));
    }

    #[test]
    fn diff_of_a_fresh_document_lists_every_field() {
        let after = Doc { state: "unread", title: "hello" };
        let record =
            ChangeRecord::diff("notification", ObjectId::new(), "create", "blogs", None, &after);
        assert_eq!(record.changes.len(), 2);
        assert!(record.changes.iter().all(|c| c.before.is_none()));
    }
}
