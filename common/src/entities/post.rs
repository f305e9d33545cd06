use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::api::notifications::{Cancellable, Notifiable};
use crate::repository::Entity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum PostState {
    #[serde(rename = "draft")]
    Draft,
    #[serde(rename = "pending review")]
    PendingReview,
    #[serde(rename = "published")]
    Published,
    #[serde(rename = "do not publish")]
    DoNotPublish,
    #[serde(rename = "archived")]
    Archived,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: ObjectId,
    pub organisation: String,
    pub blog_id: ObjectId,
    pub title: String,
    pub body: String,
    pub state: PostState,
    pub owners: Vec<String>,
    #[serde(default)]
    pub subscribers: Vec<String>,
    /// Group names; expanded to member emails when notifications fan out.
    #[serde(default)]
    pub subscriber_groups: Vec<String>,
    pub published_by: Option<String>,
    pub is_active: bool,
    pub created_by: String,
    pub created_on: i64,
    pub updated_by: String,
    pub updated_on: i64,
}

impl Entity for Post {
    fn id(&self) -> ObjectId {
        self.id
    }
}

impl Notifiable for Post {
    const OBJECT_TYPE: &'static str = "posts";

    fn object_id(&self) -> ObjectId {
        self.id
    }

    fn organisation(&self) -> &str {
        &self.organisation
    }
}

impl Cancellable for Post {}
