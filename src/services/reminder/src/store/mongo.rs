//! MongoDB document store backend

use std::time::Duration;

use async_trait::async_trait;
use mongodb::bson::{self, doc, Bson};
use mongodb::options::{ClientOptions, FindOptions};
use mongodb::{Client, Database};
use tracing::info;

use crate::config::StoreConfig;
use crate::error::{ReminderError, Result};
use crate::store::document::{Document, DocumentStore, Filter, Query};

/// Document store backed by a MongoDB database
pub struct MongoStore {
    database: Database,
}

impl MongoStore {
    /// Connect to MongoDB and verify the connection with a ping
    pub async fn connect(config: &StoreConfig) -> Result<Self> {
        info!("Connecting to MongoDB at {}", config.mongo_url);

        let mut options = ClientOptions::parse(&config.mongo_url).await?;
        options.connect_timeout = Some(Duration::from_secs(config.connection_timeout_seconds));
        options.server_selection_timeout =
            Some(Duration::from_secs(config.connection_timeout_seconds));

        let client = Client::with_options(options)?;
        let database = client.database(&config.database);

        database.run_command(doc! { "ping": 1 }, None).await?;
        info!("MongoDB connection established");

        Ok(Self { database })
    }

    fn collection(&self, name: &str) -> mongodb::Collection<bson::Document> {
        self.database.collection::<bson::Document>(name)
    }
}

#[async_trait]
impl DocumentStore for MongoStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        let found = self
            .collection(collection)
            .find_one(doc! { "id": id }, None)
            .await?;
        found.map(from_bson_document).transpose()
    }

    async fn query(&self, collection: &str, query: Query) -> Result<Vec<Document>> {
        let filter = build_filter(&query.filters)?;

        let mut find_options = FindOptions::default();
        if let Some(limit) = query.limit {
            find_options.limit = Some(limit as i64);
        }
        if let Some(field) = &query.order_by_desc {
            let mut sort = bson::Document::new();
            sort.insert(field.clone(), -1);
            find_options.sort = Some(sort);
        }

        let mut cursor = self.collection(collection).find(filter, find_options).await?;
        let mut results = Vec::new();
        while cursor.advance().await? {
            let document = cursor.deserialize_current()?;
            results.push(from_bson_document(document)?);
        }
        Ok(results)
    }

    async fn insert(&self, collection: &str, document: Document) -> Result<()> {
        if document.get("id").and_then(|v| v.as_str()).is_none() {
            return Err(ReminderError::store("document is missing an id field"));
        }
        self.collection(collection)
            .insert_one(to_bson_document(&document)?, None)
            .await?;
        Ok(())
    }

    async fn update(&self, collection: &str, id: &str, changes: Document) -> Result<bool> {
        let mut set = bson::Document::new();
        let mut unset = bson::Document::new();
        for (key, value) in changes {
            if value.is_null() {
                unset.insert(key, Bson::Int32(1));
            } else {
                set.insert(key, bson::to_bson(&value)?);
            }
        }

        let mut update = bson::Document::new();
        if !set.is_empty() {
            update.insert("$set", set);
        }
        if !unset.is_empty() {
            update.insert("$unset", unset);
        }
        if update.is_empty() {
            return Ok(self.get(collection, id).await?.is_some());
        }

        let result = self
            .collection(collection)
            .update_one(doc! { "id": id }, update, None)
            .await?;
        Ok(result.matched_count > 0)
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<bool> {
        let result = self
            .collection(collection)
            .delete_one(doc! { "id": id }, None)
            .await?;
        Ok(result.deleted_count > 0)
    }

    async fn ping(&self) -> Result<()> {
        self.database.run_command(doc! { "ping": 1 }, None).await?;
        Ok(())
    }
}

fn to_bson_document(document: &Document) -> Result<bson::Document> {
    Ok(bson::to_document(document)?)
}

fn from_bson_document(mut document: bson::Document) -> Result<Document> {
    // Mongo injects its own _id; our documents are keyed by the id field.
    document.remove("_id");
    Ok(bson::from_document(document)?)
}

fn build_filter(filters: &[Filter]) -> Result<bson::Document> {
    let mut filter = bson::Document::new();
    for predicate in filters {
        match predicate {
            Filter::Eq { field, value } => {
                filter.insert(field.clone(), bson::to_bson(value)?);
            }
            Filter::Gte { field, value } => {
                merge_range(&mut filter, field, "$gte", bson::to_bson(value)?);
            }
            Filter::Lte { field, value } => {
                merge_range(&mut filter, field, "$lte", bson::to_bson(value)?);
            }
        }
    }
    Ok(filter)
}

fn merge_range(filter: &mut bson::Document, field: &str, operator: &str, value: Bson) {
    match filter.get_document_mut(field) {
        Ok(range) => {
            range.insert(operator, value);
        }
        Err(_) => {
            let mut range = bson::Document::new();
            range.insert(operator, value);
            filter.insert(field, range);
        }
    }
}
