use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{
    body::MessageBody,
    dev::{ServiceFactory, ServiceRequest, ServiceResponse},
    middleware,
    web::Data,
    App,
};
use common::context::effectfull_context::ServiceState;

pub mod handlers;
pub mod service;

pub fn create_app(
    state: Arc<ServiceState>,
) -> App<
    impl ServiceFactory<
        ServiceRequest,
        Response = ServiceResponse<impl MessageBody>,
        Config = (),
        InitError = (),
        Error = actix_web::Error,
    >,
> {
    App::new()
        .wrap(middleware::Logger::default())
        .wrap(Cors::permissive())
        .app_data(Data::new(state))
        .service(handlers::blogs::create_blog)
        .service(handlers::blogs::update_blog)
        .service(handlers::blogs::delete_blog)
        .service(handlers::blogs::join_blog)
        .service(handlers::blogs::leave_blog)
        .service(handlers::blogs::approve_subscribers)
        .service(handlers::blogs::reject_subscribers)
        .service(handlers::posts::create_post)
        .service(handlers::posts::change_post_state)
        .service(handlers::user_groups::create_user_group)
        .service(handlers::user_groups::update_user_group)
        .service(handlers::user_groups::delete_user_group)
        .service(handlers::user_groups::join_user_group)
        .service(handlers::user_groups::approve_members)
        .service(handlers::user_groups::reject_members)
}
