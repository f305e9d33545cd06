use std::sync::Arc;

use type_map::concurrent::TypeMap;

use crate::auth::Auth;

/// In-memory stand-in for [`ServiceState`](super::effectfull_context::ServiceState):
/// carries its own repository map so services and the notification engine can
/// be exercised without HTTP or Mongo.
#[derive(Clone)]
pub struct TestContext {
    pub service_auth: Auth,
    pub user_auth: Auth,
    pub repositories: Arc<TypeMap>,
}

impl TestContext {
    pub fn new(service_auth: Auth, user_auth: Auth, repositories: TypeMap) -> Self {
        Self {
            service_auth,
            user_auth,
            repositories: Arc::new(repositories),
        }
    }
}
