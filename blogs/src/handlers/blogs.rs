use actix_web::{
    delete, patch, post,
    web::{Json, Path},
};
use anyhow::anyhow;
use mongodb::bson::oid::ObjectId;

use common::{
    context::GeneralContext,
    entities::blog::Blog,
    error::{self, AddCode},
};

use crate::service::blogs::{BlogService, CreateBlog, SubscriberList, UpdateBlog};

fn parse_id(id: &str) -> error::Result<ObjectId> {
    ObjectId::parse_str(id).map_err(|_| anyhow!("Invalid blog id").code(400))
}

#[post("/api/blogs")]
pub async fn create_blog(
    context: GeneralContext,
    Json(create): Json<CreateBlog>,
) -> error::Result<Json<Blog>> {
    Ok(Json(BlogService::new(context).create(create).await?))
}

#[patch("/api/blogs/{id}")]
pub async fn update_blog(
    context: GeneralContext,
    id: Path<String>,
    Json(update): Json<UpdateBlog>,
) -> error::Result<Json<Blog>> {
    Ok(Json(
        BlogService::new(context)
            .update(parse_id(&id)?, update)
            .await?,
    ))
}

#[delete("/api/blogs/{id}")]
pub async fn delete_blog(context: GeneralContext, id: Path<String>) -> error::Result<Json<Blog>> {
    Ok(Json(BlogService::new(context).delete(parse_id(&id)?).await?))
}

#[post("/api/blogs/{id}/join")]
pub async fn join_blog(context: GeneralContext, id: Path<String>) -> error::Result<Json<Blog>> {
    Ok(Json(BlogService::new(context).join(parse_id(&id)?).await?))
}

#[post("/api/blogs/{id}/leave")]
pub async fn leave_blog(context: GeneralContext, id: Path<String>) -> error::Result<Json<Blog>> {
    Ok(Json(BlogService::new(context).leave(parse_id(&id)?).await?))
}

#[post("/api/blogs/{id}/approve")]
pub async fn approve_subscribers(
    context: GeneralContext,
    id: Path<String>,
    Json(list): Json<SubscriberList>,
) -> error::Result<Json<Blog>> {
    Ok(Json(
        BlogService::new(context)
            .approve(parse_id(&id)?, list)
            .await?,
    ))
}

#[post("/api/blogs/{id}/reject")]
pub async fn reject_subscribers(
    context: GeneralContext,
    id: Path<String>,
    Json(list): Json<SubscriberList>,
) -> error::Result<Json<Blog>> {
    Ok(Json(
        BlogService::new(context)
            .reject(parse_id(&id)?, list)
            .await?,
    ))
}
