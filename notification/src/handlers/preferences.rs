use actix_web::{get, patch, web::Json};

use common::{context::GeneralContext, entities::user::Preferences, error};

use crate::service::preferences::{PreferencesService, UpdatePreferences};

#[get("/api/my_preferences")]
pub async fn get_my_preferences(context: GeneralContext) -> error::Result<Json<Preferences>> {
    Ok(Json(PreferencesService::new(context).get().await?))
}

#[patch("/api/my_preferences")]
pub async fn patch_my_preferences(
    context: GeneralContext,
    Json(update): Json<UpdatePreferences>,
) -> error::Result<Json<Preferences>> {
    Ok(Json(PreferencesService::new(context).update(update).await?))
}
