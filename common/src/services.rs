use std::env::var;

use lazy_static::lazy_static;

lazy_static! {
    pub static ref PROTOCOL: String = var("PROTOCOL").unwrap_or_else(|_| "http".to_string());
    pub static ref API_PREFIX: String = var("API_PREFIX").unwrap_or_else(|_| "api".to_string());
    pub static ref MAIL_SERVICE: String =
        var("MAIL_SERVICE_URL").unwrap_or_else(|_| "localhost:3002".to_string());
    pub static ref AUDIT_SERVICE: String =
        var("AUDIT_SERVICE_URL").unwrap_or_else(|_| "localhost:3009".to_string());
}
