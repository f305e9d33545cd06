use chrono::Utc;
use jsonwebtoken::{decode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::error::{self, AddCode};

const TOKEN_TTL_SECONDS: i64 = 60 * 60 * 24;

pub static ENCODING_KEY: Lazy<EncodingKey> = Lazy::new(|| {
    let secret = std::env::var("JWT_SECRET").expect("JWT_SECRET must be set");
    EncodingKey::from_secret(secret.as_bytes())
});

pub static DECODING_KEY: Lazy<DecodingKey> = Lazy::new(|| {
    let secret = std::env::var("JWT_SECRET").expect("JWT_SECRET must be set");
    DecodingKey::from_secret(secret.as_bytes())
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Service {
    Notification,
    Blogs,
    Mail,
    Audit,
}

impl Service {
    pub fn name(&self) -> &'static str {
        match self {
            Service::Notification => "notification",
            Service::Blogs => "blogs",
            Service::Mail => "mail",
            Service::Audit => "audit",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Auth {
    Service(Service),
    Admin { email: String, organisation: String },
    User { email: String, organisation: String },
    None,
}

impl Auth {
    pub fn email(&self) -> Option<&str> {
        match self {
            Auth::Admin { email, .. } => Some(email),
            Auth::User { email, .. } => Some(email),
            _ => None,
        }
    }

    pub fn organisation(&self) -> Option<&str> {
        match self {
            Auth::Admin { organisation, .. } => Some(organisation),
            Auth::User { organisation, .. } => Some(organisation),
            _ => None,
        }
    }

    pub fn full_access(&self) -> bool {
        matches!(self, Auth::Admin { .. } | Auth::Service(_))
    }

    /// Identity string recorded in createdBy/updatedBy audit fields.
    pub fn actor(&self) -> String {
        match self {
            Auth::Service(service) => service.name().to_string(),
            Auth::Admin { email, .. } | Auth::User { email, .. } => email.clone(),
            Auth::None => "anonymous".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
enum Role {
    Admin,
    User,
    Service,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Claims {
    role: Role,
    email: Option<String>,
    organisation: Option<String>,
    service: Option<Service>,
    exp: i64,
}

impl Auth {
    /// `Ok(None)` means the token was well-formed but expired.
    pub fn from_token(token: &str) -> error::Result<Option<Self>> {
        let claims = match decode::<Claims>(token, &DECODING_KEY, &Validation::new(Algorithm::HS512))
        {
            Ok(data) => data.claims,
            Err(err) if matches!(err.kind(), ErrorKind::ExpiredSignature) => return Ok(None),
            Err(err) => return Err(anyhow::anyhow!("Invalid token: {}", err).code(401)),
        };

        let auth = match claims.role {
            Role::Admin => Auth::Admin {
                email: claims
                    .email
                    .ok_or_else(|| anyhow::anyhow!("Token missing email").code(401))?,
                organisation: claims
                    .organisation
                    .ok_or_else(|| anyhow::anyhow!("Token missing organisation").code(401))?,
            },
            Role::User => Auth::User {
                email: claims
                    .email
                    .ok_or_else(|| anyhow::anyhow!("Token missing email").code(401))?,
                organisation: claims
                    .organisation
                    .ok_or_else(|| anyhow::anyhow!("Token missing organisation").code(401))?,
            },
            Role::Service => Auth::Service(
                claims
                    .service
                    .ok_or_else(|| anyhow::anyhow!("Token missing service name").code(401))?,
            ),
        };
        Ok(Some(auth))
    }

    pub fn to_token(&self) -> error::Result<String> {
        let header = Header {
            alg: Algorithm::HS512,
            ..Default::default()
        };
        let exp = Utc::now().timestamp() + TOKEN_TTL_SECONDS;
        let claims = match self {
            Auth::Service(service) => Claims {
                role: Role::Service,
                email: None,
                organisation: None,
                service: Some(*service),
                exp,
            },
            Auth::Admin {
                email,
                organisation,
            } => Claims {
                role: Role::Admin,
                email: Some(email.clone()),
                organisation: Some(organisation.clone()),
                service: None,
                exp,
            },
            Auth::User {
                email,
                organisation,
            } => Claims {
                role: Role::User,
                email: Some(email.clone()),
                organisation: Some(organisation.clone()),
                service: None,
                exp,
            },
            Auth::None => {
                return Err(anyhow::anyhow!("Cannot create token for Auth::None").code(500))
            }
        };

        match jsonwebtoken::encode(&header, &claims, &ENCODING_KEY) {
            Ok(token) => Ok(token),
            Err(_) => Err(anyhow::anyhow!("Failed to encode token").code(500)),
        }
    }
}
