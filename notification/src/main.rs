use std::env;
use std::sync::Arc;

use actix_web::HttpServer;
use common::auth::Service;
use common::context::effectfull_context::ServiceState;
use common::entities::{notification::Notification, user::User};
use common::repository::mongo_repository::MongoRepository;

use notification::create_app;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init();

    let mongo_uri = env::var("MONGOURI").expect("MONGOURI must be set");

    let mut state = ServiceState::new(Service::Notification);
    state.insert::<Notification>(Arc::new(
        MongoRepository::new(&mongo_uri, "notifications", "notifications").await,
    ));
    state.insert::<User>(Arc::new(MongoRepository::new(&mongo_uri, "users", "users").await));

    let state = Arc::new(state);
    HttpServer::new(move || create_app(state.clone()))
        .bind(("0.0.0.0", 3008))?
        .run()
        .await
}
