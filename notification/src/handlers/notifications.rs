use actix_web::{
    get, put,
    web::{Json, Path, Query},
};
use anyhow::anyhow;
use mongodb::bson::oid::ObjectId;

use common::{
    context::GeneralContext,
    entities::notification::PublicNotification,
    error::{self, AddCode},
};

use crate::service::notifications::{ChangeNotification, NotificationQuery, NotificationService};

#[get("/api/my_notifications")]
pub async fn get_my_notifications(
    context: GeneralContext,
    query: Query<NotificationQuery>,
) -> error::Result<Json<Vec<PublicNotification>>> {
    Ok(Json(
        NotificationService::new(context)
            .my_notifications(query.into_inner())
            .await?,
    ))
}

#[put("/api/my_notifications/{id}")]
pub async fn change_my_notification(
    context: GeneralContext,
    id: Path<String>,
    Json(change): Json<ChangeNotification>,
) -> error::Result<Json<PublicNotification>> {
    let id = ObjectId::parse_str(id.as_str())
        .map_err(|_| anyhow!("Invalid notification id").code(400))?;
    Ok(Json(
        NotificationService::new(context).change(id, change).await?,
    ))
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::sync::Arc;

    use actix_web::test::{call_service, init_service, TestRequest};
    use mongodb::bson::oid::ObjectId;

    use common::auth::{Auth, Service};
    use common::context::effectfull_context::ServiceState;
    use common::default_timestamp;
    use common::entities::notification::{
        Notification, NotificationState, Priority, PublicNotification,
    };
    use common::entities::user::User;
    use common::repository::test_repository::TestRepository;
    use common::repository::Repository;

    use crate::create_app;

    fn notification(recipient: &str, organisation: &str) -> Notification {
        let now = default_timestamp();
        Notification {
            id: ObjectId::new(),
            recipient: recipient.to_string(),
            organisation: organisation.to_string(),
            object_type: "blogs".to_string(),
            object_id: ObjectId::new(),
            action: "fyi".to_string(),
            title: "hello".into(),
            description: "world".into(),
            state: NotificationState::Unread,
            priority: Priority::Low,
            content: mongodb::bson::doc! {},
            is_active: true,
            created_by: "blogs".to_string(),
            created_on: now,
            updated_by: "blogs".to_string(),
            updated_on: now,
        }
    }

    #[actix_web::test]
    async fn listing_is_scoped_to_the_caller() {
        env::set_var("JWT_SECRET", "test-secret");

        let notifications = Arc::new(TestRepository::<Notification>::new());
        notifications
            .insert(&notification("reader@example.com", "acme"))
            .await
            .unwrap();
        notifications
            .insert(&notification("other@example.com", "acme"))
            .await
            .unwrap();
        notifications
            .insert(&notification("reader@example.com", "globex"))
            .await
            .unwrap();

        let mut state = ServiceState::new(Service::Notification);
        state.insert::<Notification>(notifications);
        state.insert::<User>(Arc::new(TestRepository::<User>::new()));

        let app = init_service(create_app(Arc::new(state))).await;

        let token = Auth::User {
            email: "reader@example.com".to_string(),
            organisation: "acme".to_string(),
        }
        .to_token()
        .unwrap();
        let request = TestRequest::get()
            .uri("/api/my_notifications")
            .insert_header(("Authorization", format!("Bearer {}", token)))
            .to_request();
        let response = call_service(&app, request).await;
        assert!(response.status().is_success());

        let body: Vec<PublicNotification> = actix_web::test::read_body_json(response).await;
        assert_eq!(body.len(), 1);
        assert_eq!(body[0].recipient, "reader@example.com");
        assert_eq!(body[0].organisation, "acme");
    }

    #[actix_web::test]
    async fn anonymous_callers_are_rejected() {
        env::set_var("JWT_SECRET", "test-secret");

        let mut state = ServiceState::new(Service::Notification);
        state.insert::<Notification>(Arc::new(TestRepository::<Notification>::new()));
        state.insert::<User>(Arc::new(TestRepository::<User>::new()));

        let app = init_service(create_app(Arc::new(state))).await;

        let request = TestRequest::get().uri("/api/my_notifications").to_request();
        let response = call_service(&app, request).await;
        assert_eq!(response.status().as_u16(), 401);
    }

    #[actix_web::test]
    async fn ping_answers() {
        env::set_var("JWT_SECRET", "test-secret");

        let state = ServiceState::new(Service::Notification);
        let app = init_service(create_app(Arc::new(state))).await;

        let request = TestRequest::get().uri("/api/ping").to_request();
        let response = call_service(&app, request).await;
        assert!(response.status().is_success());
    }
}
