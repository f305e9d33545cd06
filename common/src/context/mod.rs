use std::sync::Arc;

use actix_web::{dev::Payload, web::Data, FromRequest, HttpRequest};
use anyhow::anyhow;
use serde::Serialize;

use crate::{
    auth::Auth,
    error::{self, AddCode, ServiceError},
    repository::RepositoryObject,
};

use self::effectfull_context::{EffectfullContext, HandlerContext, ServiceRequest, ServiceState};
pub use self::test_context::TestContext;

pub mod effectfull_context;
pub mod test_context;

#[derive(Clone)]
pub enum GeneralContext {
    Effectfull(EffectfullContext),
    Test(TestContext),
}

impl FromRequest for GeneralContext {
    type Error = ServiceError;

    type Future = futures_util::future::LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, payload: &mut Payload) -> Self::Future {
        fn from_request_inner(
            req: &HttpRequest,
            _payload: &mut Payload,
        ) -> error::Result<GeneralContext> {
            let auth = req
                .headers()
                .get("Authorization")
                .and_then(|x| x.to_str().ok())
                .and_then(|x| x.strip_prefix("Bearer "))
                .map(Auth::from_token);

            let user_auth = match auth {
                Some(Ok(Some(auth))) => auth,
                Some(Ok(None)) => {
                    log::warn!("Token expired");
                    Auth::None
                }
                Some(Err(err)) => {
                    log::warn!("Error parsing token: {}", err);
                    Auth::None
                }
                None => Auth::None,
            };

            let Some(state) = req.app_data::<Data<Arc<ServiceState>>>() else {
                return Err(anyhow!("No state provided").code(500));
            };

            Ok(GeneralContext::Effectfull(EffectfullContext(
                Arc::clone(state),
                HandlerContext { user_auth },
            )))
        }
        let result = from_request_inner(req, payload);

        Box::pin(async move { result })
    }
}

impl GeneralContext {
    pub fn server_auth(&self) -> Auth {
        match self {
            GeneralContext::Effectfull(context) => context.0.service_auth.clone(),
            GeneralContext::Test(context) => context.service_auth.clone(),
        }
    }

    pub fn auth(&self) -> Auth {
        match self {
            GeneralContext::Effectfull(context) => context.1.user_auth.clone(),
            GeneralContext::Test(context) => context.user_auth.clone(),
        }
    }

    pub fn try_get_repository<T: 'static>(&self) -> error::Result<RepositoryObject<T>> {
        let repository = match self {
            GeneralContext::Effectfull(context) => {
                context.0.repositories.get::<RepositoryObject<T>>().cloned()
            }
            GeneralContext::Test(context) => {
                context.repositories.get::<RepositoryObject<T>>().cloned()
            }
        };
        repository.ok_or(
            anyhow!(
                "Repository for type {} not found",
                std::any::type_name::<T>()
            )
            .code(500),
        )
    }

    pub fn make_request<T: Serialize>(&self) -> ServiceRequest<T> {
        match self {
            GeneralContext::Effectfull(context) => {
                ServiceRequest::<T>::new(&context.0.client, context.0.service_auth.clone())
            }
            GeneralContext::Test(_context) => {
                panic!("Cross-service requests are not available in the test context")
            }
        }
    }
}
