use actix_web::{
    delete, patch, post,
    web::{Json, Path},
};
use anyhow::anyhow;
use mongodb::bson::oid::ObjectId;

use common::{
    context::GeneralContext,
    entities::user_group::UserGroup,
    error::{self, AddCode},
};

use crate::service::user_groups::{CreateGroup, MemberList, UpdateGroup, UserGroupService};

fn parse_id(id: &str) -> error::Result<ObjectId> {
    ObjectId::parse_str(id).map_err(|_| anyhow!("Invalid user group id").code(400))
}

#[post("/api/user_groups")]
pub async fn create_user_group(
    context: GeneralContext,
    Json(create): Json<CreateGroup>,
) -> error::Result<Json<UserGroup>> {
    Ok(Json(UserGroupService::new(context).create(create).await?))
}

#[patch("/api/user_groups/{id}")]
pub async fn update_user_group(
    context: GeneralContext,
    id: Path<String>,
    Json(update): Json<UpdateGroup>,
) -> error::Result<Json<UserGroup>> {
    Ok(Json(
        UserGroupService::new(context)
            .update(parse_id(&id)?, update)
            .await?,
    ))
}

#[delete("/api/user_groups/{id}")]
pub async fn delete_user_group(
    context: GeneralContext,
    id: Path<String>,
) -> error::Result<Json<UserGroup>> {
    Ok(Json(
        UserGroupService::new(context).delete(parse_id(&id)?).await?,
    ))
}

#[post("/api/user_groups/{id}/join")]
pub async fn join_user_group(
    context: GeneralContext,
    id: Path<String>,
) -> error::Result<Json<UserGroup>> {
    Ok(Json(
        UserGroupService::new(context).join(parse_id(&id)?).await?,
    ))
}

#[post("/api/user_groups/{id}/approve")]
pub async fn approve_members(
    context: GeneralContext,
    id: Path<String>,
    Json(list): Json<MemberList>,
) -> error::Result<Json<UserGroup>> {
    Ok(Json(
        UserGroupService::new(context)
            .approve(parse_id(&id)?, list)
            .await?,
    ))
}

#[post("/api/user_groups/{id}/reject")]
pub async fn reject_members(
    context: GeneralContext,
    id: Path<String>,
    Json(list): Json<MemberList>,
) -> error::Result<Json<UserGroup>> {
    Ok(Json(
        UserGroupService::new(context)
            .reject(parse_id(&id)?, list)
            .await?,
    ))
}
