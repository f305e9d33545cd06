pub mod mongo_repository;
pub mod test_repository;

use std::sync::Arc;

use async_trait::async_trait;
use mongodb::bson::{oid::ObjectId, Bson, Document};

use crate::error;

pub trait Entity {
    fn id(&self) -> ObjectId;
}

#[async_trait]
pub trait Repository<T> {
    async fn insert(&self, item: &T) -> error::Result<bool>;
    async fn find(&self, field: &str, value: &Bson) -> error::Result<Option<T>>;
    async fn find_one_by(&self, filter: Document) -> error::Result<Option<T>>;
    async fn find_many(&self, field: &str, value: &Bson) -> error::Result<Vec<T>>;
    async fn find_many_by(&self, filter: Document) -> error::Result<Vec<T>>;
    /// Insert-or-replace keyed by `filter`; atomic last-write-wins at the
    /// storage layer. Returns true when a new document was inserted.
    async fn replace_upsert(&self, filter: Document, item: &T) -> error::Result<bool>;
    async fn delete(&self, field: &str, id: &ObjectId) -> error::Result<Option<T>>;
    async fn find_all(&self, skip: u32, limit: u32) -> error::Result<Vec<T>>;
}

pub type RepositoryObject<T> = Arc<dyn Repository<T> + Send + Sync>;
