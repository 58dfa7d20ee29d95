//! facegate-core: image decoding and face analysis primitives.
//!
//! Uses SCRFD for face detection and ArcFace for embedding extraction, both
//! running via ONNX Runtime for CPU inference. Uploads are normalized to an
//! 8-bit RGB image by the decode module before any model sees them.

pub mod alignment;
pub mod decode;
pub mod detector;
pub mod embedder;
pub mod thumbnail;
pub mod types;

pub use decode::{decode_image, DecodeError};
pub use types::{select_principal_face, Embedding, FaceBox};
