pub mod audit;
pub mod mail;
pub mod notifications;
