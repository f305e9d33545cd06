use std::cmp::Ordering;
use std::sync::Mutex;

use async_trait::async_trait;
use mongodb::bson::{self, oid::ObjectId, Bson, Document};
use serde::{de::DeserializeOwned, Serialize};

use crate::error;

use super::{Entity, Repository};

/// In-memory repository for tests: documents live in a `Mutex<Vec<Bson>>` and
/// filters are evaluated by a small matcher covering the operators the
/// services actually issue (equality, `$in`, `$nin`, `$gte`, `$lte`, `$lt`,
/// regex).
pub struct TestRepository<T> {
    _t: std::marker::PhantomData<T>,
    pub db: Mutex<Vec<Bson>>,
}

impl<T> TestRepository<T> {
    pub fn new() -> Self {
        Self {
            _t: std::marker::PhantomData,
            db: Mutex::new(Vec::new()),
        }
    }
}

impl<T> Default for TestRepository<T> {
    fn default() -> Self {
        Self::new()
    }
}

fn compare(a: &Bson, b: &Bson) -> Option<Ordering> {
    match (a, b) {
        (Bson::Int32(x), Bson::Int32(y)) => Some(x.cmp(y)),
        (Bson::Int64(x), Bson::Int64(y)) => Some(x.cmp(y)),
        (Bson::Int32(x), Bson::Int64(y)) => Some((*x as i64).cmp(y)),
        (Bson::Int64(x), Bson::Int32(y)) => Some(x.cmp(&(*y as i64))),
        (Bson::Double(x), Bson::Double(y)) => x.partial_cmp(y),
        (Bson::String(x), Bson::String(y)) => Some(x.cmp(y)),
        (Bson::DateTime(x), Bson::DateTime(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn matches_operators(value: Option<&Bson>, operators: &Document) -> bool {
    operators.iter().all(|(op, operand)| match op.as_str() {
        "$in" => match (operand.as_array(), value) {
            (Some(candidates), Some(value)) => candidates.contains(value),
            _ => false,
        },
        "$nin" => match (operand.as_array(), value) {
            (Some(candidates), Some(value)) => !candidates.contains(value),
            // A missing field is not in any exclusion list.
            (Some(_), None) => true,
            _ => false,
        },
        "$gte" => match value {
            Some(value) => compare(value, operand) != Some(Ordering::Less) && compare(value, operand).is_some(),
            None => false,
        },
        "$lte" => match value {
            Some(value) => compare(value, operand) != Some(Ordering::Greater) && compare(value, operand).is_some(),
            None => false,
        },
        "$lt" => match value {
            Some(value) => compare(value, operand) == Some(Ordering::Less),
            None => false,
        },
        _ => false,
    })
}

fn matches_regex(value: Option<&Bson>, pattern: &str, options: &str) -> bool {
    // Queries only ever issue `^.*?term.*$` partial matches; approximate with
    // a substring check rather than pulling in a regex engine.
    let term = pattern
        .trim_start_matches("^.*?")
        .trim_end_matches(".*$");
    match value {
        Some(Bson::String(s)) if options.contains('i') => {
            s.to_lowercase().contains(&term.to_lowercase())
        }
        Some(Bson::String(s)) => s.contains(term),
        _ => false,
    }
}

pub fn matches_filter(doc: &Document, filter: &Document) -> bool {
    filter.iter().all(|(key, condition)| {
        let value = doc.get(key);
        match condition {
            Bson::Document(ops) if ops.keys().any(|k| k.starts_with('$')) => {
                matches_operators(value, ops)
            }
            Bson::RegularExpression(regex) => {
                matches_regex(value, &regex.pattern, &regex.options)
            }
            condition => value == Some(condition),
        }
    })
}

#[async_trait]
impl<T> Repository<T> for TestRepository<T>
where
    T: Entity + Clone + Send + Sync + Serialize + DeserializeOwned,
{
    async fn insert(&self, item: &T) -> error::Result<bool> {
        let mut db = self.db.lock().unwrap();

        let contains = db
            .iter()
            .any(|x| x.as_document().unwrap().get_object_id("id").unwrap() == item.id());
        if !contains {
            db.push(bson::to_bson(&item).unwrap());
        }
        Ok(!contains)
    }

    async fn find(&self, field: &str, value: &Bson) -> error::Result<Option<T>> {
        let db = self.db.lock().unwrap();
        Ok(db
            .iter()
            .find(|x| x.as_document().unwrap().get(field) == Some(value))
            .cloned()
            .map(|x| bson::from_bson(x).unwrap()))
    }

    async fn find_one_by(&self, filter: Document) -> error::Result<Option<T>> {
        let db = self.db.lock().unwrap();
        Ok(db
            .iter()
            .find(|x| matches_filter(x.as_document().unwrap(), &filter))
            .cloned()
            .map(|x| bson::from_bson(x).unwrap()))
    }

    async fn find_many(&self, field: &str, value: &Bson) -> error::Result<Vec<T>> {
        let db = self.db.lock().unwrap();
        Ok(db
            .iter()
            .filter(|x| x.as_document().unwrap().get(field) == Some(value))
            .map(|x| bson::from_bson(x.clone()).unwrap())
            .collect())
    }

    async fn find_many_by(&self, filter: Document) -> error::Result<Vec<T>> {
        let db = self.db.lock().unwrap();
        Ok(db
            .iter()
            .filter(|x| matches_filter(x.as_document().unwrap(), &filter))
            .map(|x| bson::from_bson(x.clone()).unwrap())
            .collect())
    }

    async fn replace_upsert(&self, filter: Document, item: &T) -> error::Result<bool> {
        let mut db = self.db.lock().unwrap();
        let pos = db
            .iter()
            .position(|x| matches_filter(x.as_document().unwrap(), &filter));
        let replacement = bson::to_bson(&item).unwrap();
        match pos {
            Some(pos) => {
                db[pos] = replacement;
                Ok(false)
            }
            None => {
                db.push(replacement);
                Ok(true)
            }
        }
    }

    async fn delete(&self, field: &str, id: &ObjectId) -> error::Result<Option<T>> {
        let mut db = self.db.lock().unwrap();
        let pos = db
            .iter()
            .position(|x| &x.as_document().unwrap().get_object_id(field).unwrap() == id);

        Ok(pos.map(|pos| bson::from_bson(db.remove(pos)).unwrap()))
    }

    async fn find_all(&self, skip: u32, limit: u32) -> error::Result<Vec<T>> {
        let db = self.db.lock().unwrap();
        Ok(db
            .iter()
            .skip(skip as usize)
            .take(limit as usize)
            .map(|x| bson::from_bson(x.clone()).unwrap())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use mongodb::bson::doc;

    use super::matches_filter;

    #[test]
    fn equality_and_operators() {
        let doc = doc! {"state": "unread", "createdOn": 100i64, "objectId": 7};

        assert!(matches_filter(&doc, &doc! {"state": "unread"}));
        assert!(!matches_filter(&doc, &doc! {"state": "read"}));
        assert!(matches_filter(&doc, &doc! {"createdOn": {"$gte": 100i64}}));
        assert!(matches_filter(&doc, &doc! {"createdOn": {"$lte": 100i64}}));
        assert!(!matches_filter(&doc, &doc! {"createdOn": {"$lte": 99i64}}));
        assert!(matches_filter(&doc, &doc! {"createdOn": {"$lt": 101i64}}));
        assert!(!matches_filter(&doc, &doc! {"createdOn": {"$lt": 100i64}}));
        assert!(matches_filter(&doc, &doc! {"state": {"$in": ["unread", "read"]}}));
    }

    #[test]
    fn nin_excludes_and_tolerates_missing_fields() {
        let doc = doc! {"objectId": 7};

        assert!(!matches_filter(&doc, &doc! {"objectId": {"$nin": [7]}}));
        assert!(matches_filter(&doc, &doc! {"objectId": {"$nin": [8, 9]}}));
        assert!(matches_filter(&doc, &doc! {"other": {"$nin": [1]}}));
    }

    #[test]
    fn regex_is_a_partial_case_insensitive_match() {
        use mongodb::bson::{Bson, Regex};

        let doc = doc! {"title": "Weekly Digest"};
        let filter = doc! {"title": Bson::RegularExpression(Regex {
            pattern: "^.*?digest.*$".to_string(),
            options: "i".to_string(),
        })};
        assert!(matches_filter(&doc, &filter));
    }
}
