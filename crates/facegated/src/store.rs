//! Face vector storage backed by Qdrant.
//!
//! Handlers depend on the [`FaceStore`] trait rather than the concrete
//! client so the router can be exercised without a running Qdrant.

use std::collections::HashMap;

use async_trait::async_trait;
use qdrant_client::qdrant::point_id::PointIdOptions;
use qdrant_client::qdrant::value::Kind;
use qdrant_client::qdrant::{
    Condition, CountPointsBuilder, CreateCollectionBuilder, DeletePointsBuilder, Distance, Filter,
    PointId, PointStruct, SearchPointsBuilder, UpsertPointsBuilder, Value as QdrantValue,
    VectorParams,
};
use qdrant_client::{Payload, Qdrant};
use thiserror::Error;
use tokio::sync::OnceCell;
use uuid::Uuid;

use facegate_core::Embedding;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("qdrant: {0}")]
    Qdrant(#[from] qdrant_client::QdrantError),

    #[error("collection info missing from response")]
    MissingInfo,
}

/// Identity payload stored alongside each face vector.
#[derive(Debug, Clone)]
pub struct FacePayload {
    pub name: String,
    pub age: i64,
    pub phone_number: String,
    pub filename: Option<String>,
    /// Base64-encoded JPEG crop of the registered face.
    pub face_image: String,
    /// RFC 3339 timestamp of registration.
    pub registered_at: String,
}

/// One hit from a similarity search.
#[derive(Debug, Clone)]
pub struct FaceMatch {
    pub id: String,
    pub score: f32,
    /// Full stored payload of the matched point.
    pub metadata: serde_json::Value,
    /// Thumbnail stored at registration time, if any.
    pub face_image: Option<String>,
}

/// Collection counters reported by the stats endpoint.
#[derive(Debug, Clone, Copy)]
pub struct CollectionStats {
    pub vectors: u64,
    pub segments: u64,
}

#[async_trait]
pub trait FaceStore: Send + Sync {
    /// Store one embedding with its payload. Returns the new point id.
    async fn insert(&self, embedding: &Embedding, payload: FacePayload)
        -> Result<String, StoreError>;

    /// Nearest neighbours of `embedding`, best first.
    async fn search(&self, embedding: &Embedding, limit: u64)
        -> Result<Vec<FaceMatch>, StoreError>;

    /// Whether any face is stored under this exact name and phone number.
    async fn is_registered(&self, name: &str, phone_number: &str) -> Result<bool, StoreError>;

    /// Remove every face stored under this exact name and phone number.
    async fn delete_by_identity(&self, name: &str, phone_number: &str) -> Result<(), StoreError>;

    /// Point and segment counts of the collection.
    async fn collection_info(&self) -> Result<CollectionStats, StoreError>;
}

pub struct QdrantFaceStore {
    client: Qdrant,
    collection: String,
    vector_size: u64,
    ready: OnceCell<()>,
}

impl QdrantFaceStore {
    /// Build a client for `url`. The connection itself is lazy; this only
    /// fails on a malformed URL.
    pub fn connect(url: &str, collection: &str, vector_size: u64) -> Result<Self, StoreError> {
        let client = Qdrant::from_url(url).build()?;
        Ok(Self {
            client,
            collection: collection.to_string(),
            vector_size,
            ready: OnceCell::new(),
        })
    }

    /// Create the collection on first use if it does not already exist.
    async fn ensure_collection(&self) -> Result<(), StoreError> {
        self.ready
            .get_or_try_init(|| async {
                let collections = self.client.list_collections().await?;
                let exists = collections
                    .collections
                    .iter()
                    .any(|c| c.name == self.collection);

                if !exists {
                    tracing::info!(
                        collection = %self.collection,
                        size = self.vector_size,
                        "creating face collection"
                    );
                    self.client
                        .create_collection(
                            CreateCollectionBuilder::new(&self.collection).vectors_config(
                                VectorParams {
                                    size: self.vector_size,
                                    distance: Distance::Cosine.into(),
                                    ..Default::default()
                                },
                            ),
                        )
                        .await?;
                }

                Ok::<(), StoreError>(())
            })
            .await?;
        Ok(())
    }
}

#[async_trait]
impl FaceStore for QdrantFaceStore {
    async fn insert(
        &self,
        embedding: &Embedding,
        payload: FacePayload,
    ) -> Result<String, StoreError> {
        self.ensure_collection().await?;

        let id = Uuid::new_v4().to_string();
        let qdrant_payload: Payload = payload_map(&id, &payload).into();
        let point = PointStruct::new(id.clone(), embedding.values.clone(), qdrant_payload);

        self.client
            .upsert_points(UpsertPointsBuilder::new(&self.collection, vec![point]).wait(true))
            .await?;

        tracing::debug!(%id, name = %payload.name, "face stored");
        Ok(id)
    }

    async fn search(
        &self,
        embedding: &Embedding,
        limit: u64,
    ) -> Result<Vec<FaceMatch>, StoreError> {
        self.ensure_collection().await?;

        let response = self
            .client
            .search_points(
                SearchPointsBuilder::new(&self.collection, embedding.values.clone(), limit)
                    .with_payload(true),
            )
            .await?;

        let matches = response
            .result
            .into_iter()
            .map(|hit| {
                let id = hit.id.and_then(point_id_string).unwrap_or_default();
                let metadata = payload_to_json(&hit.payload);
                let face_image = metadata
                    .get("face_image")
                    .and_then(|v| v.as_str())
                    .map(|s| s.to_string());
                FaceMatch {
                    id,
                    score: hit.score,
                    metadata,
                    face_image,
                }
            })
            .collect();

        Ok(matches)
    }

    async fn is_registered(&self, name: &str, phone_number: &str) -> Result<bool, StoreError> {
        self.ensure_collection().await?;

        let response = self
            .client
            .count(
                CountPointsBuilder::new(&self.collection)
                    .filter(identity_filter(name, phone_number))
                    .exact(true),
            )
            .await?;

        let count = response.result.map(|r| r.count).unwrap_or(0);
        Ok(count > 0)
    }

    async fn delete_by_identity(&self, name: &str, phone_number: &str) -> Result<(), StoreError> {
        self.ensure_collection().await?;

        self.client
            .delete_points(
                DeletePointsBuilder::new(&self.collection)
                    .points(identity_filter(name, phone_number))
                    .wait(true),
            )
            .await?;

        tracing::debug!(name = %name, "faces deleted");
        Ok(())
    }

    async fn collection_info(&self) -> Result<CollectionStats, StoreError> {
        self.ensure_collection().await?;

        let info = self.client.collection_info(self.collection.clone()).await?;
        let result = info.result.ok_or(StoreError::MissingInfo)?;

        Ok(CollectionStats {
            vectors: result.points_count.unwrap_or(0),
            segments: result.segments_count,
        })
    }
}

/// Filter matching both identity fields exactly.
fn identity_filter(name: &str, phone_number: &str) -> Filter {
    Filter::must([
        Condition::matches("name", name.to_string()),
        Condition::matches("phone_number", phone_number.to_string()),
    ])
}

/// Payload fields for one point. The generated point id is mirrored into
/// the payload as `face_id` so matches carry it even without the point id.
fn payload_map(id: &str, payload: &FacePayload) -> HashMap<String, QdrantValue> {
    let mut map = HashMap::new();
    map.insert("name".to_string(), QdrantValue::from(payload.name.clone()));
    map.insert("age".to_string(), QdrantValue::from(payload.age));
    map.insert(
        "phone_number".to_string(),
        QdrantValue::from(payload.phone_number.clone()),
    );
    // The key is always present; uploads without a filename store null.
    let filename = match &payload.filename {
        Some(filename) => QdrantValue::from(filename.clone()),
        None => QdrantValue {
            kind: Some(Kind::NullValue(0)),
        },
    };
    map.insert("filename".to_string(), filename);
    map.insert("face_id".to_string(), QdrantValue::from(id.to_string()));
    map.insert(
        "face_image".to_string(),
        QdrantValue::from(payload.face_image.clone()),
    );
    map.insert(
        "registered_at".to_string(),
        QdrantValue::from(payload.registered_at.clone()),
    );
    map
}

fn payload_to_json(payload: &HashMap<String, QdrantValue>) -> serde_json::Value {
    let mut map = serde_json::Map::new();
    for (key, value) in payload {
        map.insert(key.clone(), value_to_json(value));
    }
    serde_json::Value::Object(map)
}

/// Scalar payload values only; faces never store lists or nested structs.
fn value_to_json(value: &QdrantValue) -> serde_json::Value {
    match &value.kind {
        Some(Kind::StringValue(s)) => serde_json::Value::String(s.clone()),
        Some(Kind::IntegerValue(i)) => serde_json::json!(i),
        Some(Kind::DoubleValue(d)) => serde_json::json!(d),
        Some(Kind::BoolValue(b)) => serde_json::Value::Bool(*b),
        Some(Kind::NullValue(_)) => serde_json::Value::Null,
        _ => serde_json::Value::Null,
    }
}

fn point_id_string(id: PointId) -> Option<String> {
    match id.point_id_options {
        Some(PointIdOptions::Uuid(value)) => Some(value),
        Some(PointIdOptions::Num(value)) => Some(value.to_string()),
        None => None,
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::MemoryStore;
    use super::*;

    fn sample_payload(name: &str, phone: &str) -> FacePayload {
        FacePayload {
            name: name.to_string(),
            age: 30,
            phone_number: phone.to_string(),
            filename: Some("face.jpg".to_string()),
            face_image: "dGh1bWI=".to_string(),
            registered_at: "2026-08-25T12:00:00+00:00".to_string(),
        }
    }

    #[test]
    fn test_payload_map_injects_face_id() {
        let map = payload_map("abc-123", &sample_payload("Alice", "0123456789"));
        assert_eq!(
            value_to_json(&map["face_id"]),
            serde_json::Value::String("abc-123".to_string())
        );
    }

    #[test]
    fn test_payload_map_keeps_age_as_integer() {
        let map = payload_map("id", &sample_payload("Alice", "0123456789"));
        assert_eq!(value_to_json(&map["age"]), serde_json::json!(30));
    }

    #[test]
    fn test_payload_map_writes_null_filename() {
        let mut payload = sample_payload("Alice", "0123456789");
        payload.filename = None;
        let map = payload_map("id", &payload);
        // The key survives without a filename and reads back as null.
        assert!(matches!(map["filename"].kind, Some(Kind::NullValue(_))));
        assert_eq!(value_to_json(&map["filename"]), serde_json::Value::Null);
        assert!(map.contains_key("registered_at"));
    }

    #[test]
    fn test_identity_filter_matches_both_fields() {
        let filter = identity_filter("Alice", "0123456789");
        assert_eq!(filter.must.len(), 2);
    }

    #[test]
    fn test_value_to_json_scalars() {
        assert_eq!(
            value_to_json(&QdrantValue::from("hi".to_string())),
            serde_json::Value::String("hi".to_string())
        );
        assert_eq!(value_to_json(&QdrantValue::from(7i64)), serde_json::json!(7));
        assert_eq!(value_to_json(&QdrantValue { kind: None }), serde_json::Value::Null);
    }

    #[test]
    fn test_point_id_string_variants() {
        let uuid = PointId {
            point_id_options: Some(PointIdOptions::Uuid("u-1".to_string())),
        };
        let num = PointId {
            point_id_options: Some(PointIdOptions::Num(9)),
        };
        assert_eq!(point_id_string(uuid), Some("u-1".to_string()));
        assert_eq!(point_id_string(num), Some("9".to_string()));
    }

    #[tokio::test]
    async fn test_memory_store_orders_by_similarity() {
        let store = MemoryStore::default();
        let close = Embedding {
            values: vec![1.0, 0.0, 0.0],
            model_version: None,
        };
        let far = Embedding {
            values: vec![0.0, 1.0, 0.0],
            model_version: None,
        };
        store.preload(&far, sample_payload("Far", "1111111111"));
        let close_id = store.preload(&close, sample_payload("Close", "2222222222"));

        let query = Embedding {
            values: vec![0.9, 0.1, 0.0],
            model_version: None,
        };
        let matches = store.search(&query, 1).await.unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].id, close_id);
        assert_eq!(matches[0].metadata["name"], "Close");
    }

    #[tokio::test]
    async fn test_memory_store_delete_by_identity() {
        let store = MemoryStore::default();
        let emb = Embedding {
            values: vec![1.0, 0.0],
            model_version: None,
        };
        store.preload(&emb, sample_payload("Alice", "0123456789"));
        store.preload(&emb, sample_payload("Alice", "0123456789"));
        store.preload(&emb, sample_payload("Bob", "9876543210"));

        store.delete_by_identity("Alice", "0123456789").await.unwrap();

        assert!(!store.is_registered("Alice", "0123456789").await.unwrap());
        assert!(store.is_registered("Bob", "9876543210").await.unwrap());
    }
}
