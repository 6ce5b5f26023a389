//! MongoDB-backed authoritative store.

use async_trait::async_trait;
use bson::Document;
use futures::stream::TryStreamExt;
use mongodb::options::{ClientOptions, FindOneOptions, FindOptions};
use mongodb::{Client, Database};

use super::{AuthoritativeStore, FindSpec, UpdateSpec};
use crate::error::{EngineError, EngineResult};
use crate::identity::Identity;

/// Authoritative store backed by a MongoDB database
pub struct MongoStore {
    client: Client,
    db: Database,
}

impl MongoStore {
    /// Connect to the store at the given URL and select a database
    pub async fn connect(address: &str, database: &str) -> EngineResult<Self> {
        let mut options = ClientOptions::parse(address)
            .await
            .map_err(|e| EngineError::Config(format!("invalid store URL: {}", e)))?;
        options.app_name = Some(env!("CARGO_PKG_NAME").to_string());

        let client = Client::with_options(options)?;
        let db = client.database(database);

        log::info!("Connected to authoritative store, database `{}`", database);
        Ok(Self { client, db })
    }

    fn collection(&self, name: &str) -> mongodb::Collection<Document> {
        self.db.collection::<Document>(name)
    }

    fn sort_document(spec: &FindSpec) -> Option<Document> {
        spec.sort_field.as_ref().map(|field| {
            let direction: i32 = if spec.sort_ascending { 1 } else { -1 };
            let mut sort = Document::new();
            sort.insert(field.to_string(), direction);
            sort
        })
    }
}

#[async_trait]
impl AuthoritativeStore for MongoStore {
    async fn find_one(
        &self,
        collection: &str,
        filter: Document,
        projection: Document,
    ) -> EngineResult<Option<Document>> {
        let options = FindOneOptions::builder().projection(projection).build();
        let document = self
            .collection(collection)
            .find_one(filter, options)
            .await?;
        Ok(document)
    }

    async fn find_many(
        &self,
        collection: &str,
        filter: Document,
        projection: Document,
        spec: FindSpec,
    ) -> EngineResult<Vec<Document>> {
        let options = FindOptions::builder()
            .projection(projection)
            .limit(spec.limit)
            .sort(Self::sort_document(&spec))
            .build();

        let cursor = self.collection(collection).find(filter, options).await?;
        let documents = cursor.try_collect().await?;
        Ok(documents)
    }

    async fn insert_one(&self, collection: &str, document: Document) -> EngineResult<Identity> {
        let result = self.collection(collection).insert_one(document, None).await?;
        result
            .inserted_id
            .as_object_id()
            .map(Identity::from)
            .ok_or_else(|| {
                EngineError::Store(format!(
                    "insert into `{}` returned a non-ObjectId identity",
                    collection
                ))
            })
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: Document,
        update: UpdateSpec,
    ) -> EngineResult<()> {
        if update.is_empty() {
            return Ok(());
        }
        self.collection(collection)
            .update_one(filter, update.into_document(), None)
            .await?;
        Ok(())
    }

    async fn delete_one(&self, collection: &str, filter: Document) -> EngineResult<()> {
        self.collection(collection).delete_one(filter, None).await?;
        Ok(())
    }

    async fn close(&self) {
        self.client.clone().shutdown().await;
        log::info!("Authoritative store connection closed");
    }
}
