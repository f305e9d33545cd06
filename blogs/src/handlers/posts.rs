use actix_web::{
    patch, post,
    web::{Json, Path},
};
use anyhow::anyhow;
use mongodb::bson::oid::ObjectId;

use common::{
    context::GeneralContext,
    entities::post::Post,
    error::{self, AddCode},
};

use crate::service::posts::{ChangePostState, CreatePost, PostService};

#[post("/api/posts")]
pub async fn create_post(
    context: GeneralContext,
    Json(create): Json<CreatePost>,
) -> error::Result<Json<Post>> {
    Ok(Json(PostService::new(context).create(create).await?))
}

#[patch("/api/posts/{id}/state")]
pub async fn change_post_state(
    context: GeneralContext,
    id: Path<String>,
    Json(change): Json<ChangePostState>,
) -> error::Result<Json<Post>> {
    let id = ObjectId::parse_str(id.as_str()).map_err(|_| anyhow!("Invalid post id").code(400))?;
    Ok(Json(
        PostService::new(context).transition(id, change.state).await?,
    ))
}
