pub mod indexer;
pub mod notifications;
pub mod preferences;
