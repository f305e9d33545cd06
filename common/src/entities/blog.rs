use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::api::notifications::{Cancellable, Notifiable};
use crate::repository::Entity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Access {
    Public,
    Restricted,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Blog {
    pub id: ObjectId,
    pub organisation: String,
    pub title: String,
    pub description: String,
    pub access: Access,
    pub owners: Vec<String>,
    #[serde(default)]
    pub subscribers: Vec<String>,
    /// Join requests on a restricted blog wait here until an owner approves.
    #[serde(default)]
    pub needs_approval: Vec<String>,
    pub is_active: bool,
    pub created_by: String,
    pub created_on: i64,
    pub updated_by: String,
    pub updated_on: i64,
}

impl Entity for Blog {
    fn id(&self) -> ObjectId {
        self.id
    }
}

impl Notifiable for Blog {
    const OBJECT_TYPE: &'static str = "blogs";

    fn object_id(&self) -> ObjectId {
        self.id
    }

    fn organisation(&self) -> &str {
        &self.organisation
    }
}

impl Cancellable for Blog {}
