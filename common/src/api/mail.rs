use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::context::GeneralContext;
use crate::error;
use crate::services::{API_PREFIX, MAIL_SERVICE, PROTOCOL};

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateLetter {
    pub email: String,
    pub subject: String,
    pub message: String,
}

/// Hands the letter to the mail service. Body templating and delivery are the
/// collaborator's concern.
pub async fn send_letter(context: &GeneralContext, letter: CreateLetter) -> error::Result<()> {
    let GeneralContext::Effectfull(_) = context else {
        log::debug!("mail delivery skipped outside the service context");
        return Ok(());
    };

    context
        .make_request::<CreateLetter>()
        .auth(context.server_auth())
        .post(format!(
            "{}://{}/{}/mail",
            PROTOCOL.as_str(),
            MAIL_SERVICE.as_str(),
            API_PREFIX.as_str(),
        ))
        .json(&letter)
        .send()
        .await?;
    Ok(())
}
