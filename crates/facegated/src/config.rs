use std::path::PathBuf;

/// Runtime configuration for the facegate daemon.
#[derive(Debug, Clone)]
pub struct Config {
    /// Address the HTTP listener binds to.
    pub bind_addr: String,
    /// Directory containing the ONNX model files.
    pub model_dir: PathBuf,
    /// Qdrant gRPC endpoint.
    pub qdrant_url: String,
    /// Name of the face collection.
    pub collection: String,
    /// Embedding dimensionality used when creating the collection.
    pub vector_size: u64,
    /// Number of hits returned by a recognition search.
    pub search_limit: u64,
    /// Maximum accepted upload size in bytes.
    pub max_upload_bytes: usize,
    /// Minimum detector confidence for a face to count.
    pub detection_threshold: f32,
}

impl Config {
    /// Load configuration from environment variables, with defaults
    /// suitable for a local deployment.
    pub fn from_env() -> Self {
        let model_dir = std::env::var("FACEGATE_MODEL_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_model_dir());

        Self {
            bind_addr: std::env::var("FACEGATE_BIND_ADDR")
                .unwrap_or_else(|_| "127.0.0.1:8000".to_string()),
            model_dir,
            qdrant_url: std::env::var("FACEGATE_QDRANT_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:6334".to_string()),
            collection: std::env::var("FACEGATE_COLLECTION")
                .unwrap_or_else(|_| "faces".to_string()),
            vector_size: env_u64("FACEGATE_VECTOR_SIZE", facegate_core::embedder::EMBEDDING_DIM as u64),
            search_limit: env_u64("FACEGATE_SEARCH_LIMIT", 1),
            max_upload_bytes: env_usize("FACEGATE_MAX_UPLOAD_BYTES", 20 * 1024 * 1024),
            detection_threshold: env_f32(
                "FACEGATE_DETECTION_THRESHOLD",
                facegate_core::detector::DEFAULT_CONFIDENCE_THRESHOLD,
            ),
        }
    }

    /// Path to the SCRFD face detection model.
    pub fn scrfd_model_path(&self) -> PathBuf {
        self.model_dir.join("det_10g.onnx")
    }

    /// Path to the ArcFace embedding model.
    pub fn arcface_model_path(&self) -> PathBuf {
        self.model_dir.join("w600k_r50.onnx")
    }
}

/// Default model directory under the XDG data home.
fn default_model_dir() -> PathBuf {
    let data_home = std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        });
    data_home.join("facegate/models")
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
