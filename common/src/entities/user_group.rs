use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

use crate::api::notifications::{Cancellable, Notifiable};
use crate::entities::blog::Access;
use crate::repository::Entity;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserGroup {
    pub id: ObjectId,
    pub organisation: String,
    pub name: String,
    pub description: String,
    pub access: Access,
    pub owners: Vec<String>,
    #[serde(default)]
    pub members: Vec<String>,
    /// Join requests on a restricted group wait here until an owner approves.
    #[serde(default)]
    pub needs_approval: Vec<String>,
    pub is_active: bool,
    pub created_by: String,
    pub created_on: i64,
    pub updated_by: String,
    pub updated_on: i64,
}

impl Entity for UserGroup {
    fn id(&self) -> ObjectId {
        self.id
    }
}

impl Notifiable for UserGroup {
    const OBJECT_TYPE: &'static str = "userGroups";

    fn object_id(&self) -> ObjectId {
        self.id
    }

    fn organisation(&self) -> &str {
        &self.organisation
    }
}

impl Cancellable for UserGroup {}
