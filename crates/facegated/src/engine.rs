//! Inference engine running on a dedicated thread.
//!
//! ONNX sessions are not cheap to clone and `run` takes `&mut self`, so all
//! inference is serialized through one request channel owned by a single
//! OS thread. Handlers talk to it through a cloneable [`EngineHandle`].

use std::path::Path;

use image::RgbImage;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

use facegate_core::detector::{DetectorError, FaceDetector};
use facegate_core::embedder::{EmbedderError, FaceEmbedder};
use facegate_core::thumbnail::{encode_face_thumbnail, ThumbnailError};
use facegate_core::{select_principal_face, Embedding};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("detector: {0}")]
    Detector(#[from] DetectorError),

    #[error("embedder: {0}")]
    Embedder(#[from] EmbedderError),

    #[error("thumbnail: {0}")]
    Thumbnail(#[from] ThumbnailError),

    #[error("no face detected in the image")]
    NoFace,

    #[error("failed to spawn engine thread: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("engine thread exited")]
    ChannelClosed,
}

/// Result of analyzing one image: the embedding of the principal face and
/// a base64-encoded JPEG crop of it.
#[derive(Debug)]
pub struct FaceAnalysis {
    pub embedding: Embedding,
    pub thumbnail_b64: String,
}

enum EngineRequest {
    Analyze {
        image: RgbImage,
        reply: oneshot::Sender<Result<FaceAnalysis, EngineError>>,
    },
}

/// Cloneable handle for submitting work to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    /// Detect the principal face in `image` and produce its embedding
    /// and thumbnail.
    pub async fn analyze(&self, image: RgbImage) -> Result<FaceAnalysis, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Analyze {
                image,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }
}

/// Load both models and spawn the engine thread.
///
/// Model loading happens before the thread starts so a missing or corrupt
/// model file fails startup instead of the first request.
pub fn spawn_engine(
    scrfd_path: &Path,
    arcface_path: &Path,
    detection_threshold: f32,
) -> Result<EngineHandle, EngineError> {
    let mut detector = FaceDetector::load(scrfd_path, detection_threshold)?;
    tracing::info!(path = %scrfd_path.display(), "face detector loaded");

    let mut embedder = FaceEmbedder::load(arcface_path)?;
    tracing::info!(path = %arcface_path.display(), "face embedder loaded");

    let (tx, mut rx) = mpsc::channel::<EngineRequest>(4);

    std::thread::Builder::new()
        .name("facegate-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Analyze { image, reply } => {
                        let result = run_analyze(&mut detector, &mut embedder, &image);
                        let _ = reply.send(result);
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })?;

    Ok(EngineHandle { tx })
}

fn run_analyze(
    detector: &mut FaceDetector,
    embedder: &mut FaceEmbedder,
    image: &RgbImage,
) -> Result<FaceAnalysis, EngineError> {
    let faces = detector.detect(image)?;
    tracing::debug!(count = faces.len(), "detection finished");

    let face = select_principal_face(&faces, image.width(), image.height())
        .ok_or(EngineError::NoFace)?
        .clone();

    let thumbnail_b64 = encode_face_thumbnail(image, &face)?;
    let embedding = embedder.extract(image, &face)?;
    tracing::debug!(confidence = face.confidence, "principal face analyzed");

    Ok(FaceAnalysis {
        embedding,
        thumbnail_b64,
    })
}

/// Engine double for router tests: answers every request with whatever
/// `handler` returns, no models involved.
#[cfg(test)]
pub(crate) fn stub_engine<F>(handler: F) -> EngineHandle
where
    F: Fn(&RgbImage) -> Result<FaceAnalysis, EngineError> + Send + 'static,
{
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(4);
    tokio::spawn(async move {
        while let Some(EngineRequest::Analyze { image, reply }) = rx.recv().await {
            let _ = reply.send(handler(&image));
        }
    });
    EngineHandle { tx }
}
