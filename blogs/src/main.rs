use std::env;
use std::sync::Arc;

use actix_web::HttpServer;
use common::auth::Service;
use common::context::effectfull_context::ServiceState;
use common::entities::{
    blog::Blog, notification::Notification, post::Post, user::User, user_group::UserGroup,
};
use common::repository::mongo_repository::MongoRepository;

use blogs::create_app;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init();

    let mongo_uri = env::var("MONGOURI").expect("MONGOURI must be set");

    let mut state = ServiceState::new(Service::Blogs);
    state.insert::<Blog>(Arc::new(MongoRepository::new(&mongo_uri, "blogs", "blogs").await));
    state.insert::<Post>(Arc::new(MongoRepository::new(&mongo_uri, "blogs", "posts").await));
    state.insert::<UserGroup>(Arc::new(
        MongoRepository::new(&mongo_uri, "blogs", "user_groups").await,
    ));
    state.insert::<Notification>(Arc::new(
        MongoRepository::new(&mongo_uri, "notifications", "notifications").await,
    ));
    state.insert::<User>(Arc::new(MongoRepository::new(&mongo_uri, "users", "users").await));

    let state = Arc::new(state);
    HttpServer::new(move || create_app(state.clone()))
        .bind(("0.0.0.0", 3001))?
        .run()
        .await
}
