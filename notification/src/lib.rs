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
        .service(handlers::indexer::ping)
        .service(handlers::notifications::get_my_notifications)
        .service(handlers::notifications::change_my_notification)
        .service(handlers::preferences::get_my_preferences)
        .service(handlers::preferences::patch_my_preferences)
}
