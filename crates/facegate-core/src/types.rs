use serde::{Deserialize, Serialize};

/// Bounding box for a detected face, with optional facial landmarks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaceBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    /// Five-point facial landmarks: [left_eye, right_eye, nose, left_mouth, right_mouth].
    pub landmarks: Option<[(f32, f32); 5]>,
}

impl FaceBox {
    /// Box area after clamping to the image bounds.
    ///
    /// Coordinates are clamped with `max(0, ·)` / `min(bound, ·)` before
    /// measuring, so a box hanging past an edge only counts its visible part.
    pub fn clamped_area(&self, img_width: u32, img_height: u32) -> f32 {
        let x1 = self.x.max(0.0);
        let y1 = self.y.max(0.0);
        let x2 = (self.x + self.width).min(img_width as f32);
        let y2 = (self.y + self.height).min(img_height as f32);
        (x2 - x1).max(0.0) * (y2 - y1).max(0.0)
    }

    /// Integer pixel rectangle `(x, y, width, height)` clamped to the image,
    /// or `None` if the clamped box is empty.
    pub fn clamped_rect(&self, img_width: u32, img_height: u32) -> Option<(u32, u32, u32, u32)> {
        let x1 = self.x.max(0.0);
        let y1 = self.y.max(0.0);
        let x2 = (self.x + self.width).min(img_width as f32);
        let y2 = (self.y + self.height).min(img_height as f32);
        if x2 <= x1 || y2 <= y1 {
            return None;
        }
        let px = x1 as u32;
        let py = y1 as u32;
        let pw = (x2.ceil() as u32).saturating_sub(px).clamp(1, img_width - px);
        let ph = (y2.ceil() as u32).saturating_sub(py).clamp(1, img_height - py);
        Some((px, py, pw, ph))
    }
}

/// Face embedding vector (512-dimensional for ArcFace).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
    /// Model version that produced this embedding (e.g., "w600k_r50").
    pub model_version: Option<String>,
}

impl Embedding {
    /// Compute cosine similarity between two embeddings.
    ///
    /// Returns a value in [-1, 1]. Higher = more similar. A zero vector on
    /// either side yields 0.0.
    pub fn similarity(&self, other: &Embedding) -> f32 {
        let mut dot = 0.0f32;
        let mut norm_a = 0.0f32;
        let mut norm_b = 0.0f32;

        for (a, b) in self.values.iter().zip(other.values.iter()) {
            dot += a * b;
            norm_a += a * a;
            norm_b += b * b;
        }

        let denom = norm_a.sqrt() * norm_b.sqrt();
        if denom > 0.0 {
            dot / denom
        } else {
            0.0
        }
    }
}

/// Pick the most prominent face: largest clamped box area, first wins ties.
///
/// Faces whose clamped area is zero (entirely outside the image) are never
/// selected; an upload whose only detection lies out of bounds reads as "no
/// usable face" rather than producing an empty crop downstream.
pub fn select_principal_face(
    faces: &[FaceBox],
    img_width: u32,
    img_height: u32,
) -> Option<&FaceBox> {
    let mut best: Option<(&FaceBox, f32)> = None;
    for face in faces {
        let area = face.clamped_area(img_width, img_height);
        if area <= 0.0 {
            continue;
        }
        match best {
            Some((_, best_area)) if area <= best_area => {}
            _ => best = Some((face, area)),
        }
    }
    best.map(|(face, _)| face)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn face(x: f32, y: f32, w: f32, h: f32) -> FaceBox {
        FaceBox { x, y, width: w, height: h, confidence: 0.9, landmarks: None }
    }

    #[test]
    fn test_cosine_similarity_identical() {
        let a = Embedding { values: vec![1.0, 0.0, 0.0], model_version: None };
        let b = Embedding { values: vec![1.0, 0.0, 0.0], model_version: None };
        assert!((a.similarity(&b) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_orthogonal() {
        let a = Embedding { values: vec![1.0, 0.0], model_version: None };
        let b = Embedding { values: vec![0.0, 1.0], model_version: None };
        assert!(a.similarity(&b).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_opposite() {
        let a = Embedding { values: vec![1.0, 0.0], model_version: None };
        let b = Embedding { values: vec![-1.0, 0.0], model_version: None };
        assert!((a.similarity(&b) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_zero_vector() {
        let a = Embedding { values: vec![0.0, 0.0], model_version: None };
        let b = Embedding { values: vec![1.0, 0.0], model_version: None };
        assert_eq!(a.similarity(&b), 0.0);
    }

    #[test]
    fn test_clamped_area_inside_bounds() {
        let f = face(10.0, 10.0, 20.0, 30.0);
        assert!((f.clamped_area(100, 100) - 600.0).abs() < 1e-3);
    }

    #[test]
    fn test_clamped_area_overhanging_edges() {
        // Box starts before the origin and runs past the right edge.
        let f = face(-10.0, 5.0, 30.0, 10.0);
        // Visible part is x in [0, 20), y in [5, 15).
        assert!((f.clamped_area(20, 100) - 200.0).abs() < 1e-3);
    }

    #[test]
    fn test_clamped_area_fully_outside() {
        let f = face(200.0, 200.0, 50.0, 50.0);
        assert_eq!(f.clamped_area(100, 100), 0.0);
    }

    #[test]
    fn test_clamped_rect_clips_to_image() {
        let f = face(-5.0, -5.0, 50.0, 50.0);
        let (x, y, w, h) = f.clamped_rect(40, 40).unwrap();
        assert_eq!((x, y), (0, 0));
        assert_eq!((w, h), (40, 40));
    }

    #[test]
    fn test_clamped_rect_empty_is_none() {
        let f = face(100.0, 100.0, 10.0, 10.0);
        assert!(f.clamped_rect(50, 50).is_none());
    }

    #[test]
    fn test_select_largest_face() {
        let faces = vec![
            face(0.0, 0.0, 10.0, 10.0),
            face(20.0, 20.0, 40.0, 40.0),
            face(70.0, 70.0, 5.0, 5.0),
        ];
        let best = select_principal_face(&faces, 100, 100).unwrap();
        assert_eq!(best.x, 20.0);
    }

    #[test]
    fn test_select_tie_keeps_first() {
        let faces = vec![face(0.0, 0.0, 10.0, 10.0), face(50.0, 50.0, 10.0, 10.0)];
        let best = select_principal_face(&faces, 100, 100).unwrap();
        assert_eq!(best.x, 0.0);
    }

    #[test]
    fn test_select_clamping_changes_winner() {
        // The nominally larger box is mostly off-frame; the smaller fully
        // visible box should win once areas are clamped.
        let faces = vec![face(90.0, 90.0, 100.0, 100.0), face(10.0, 10.0, 30.0, 30.0)];
        let best = select_principal_face(&faces, 100, 100).unwrap();
        assert_eq!(best.x, 10.0);
    }

    #[test]
    fn test_select_ignores_out_of_bounds_faces() {
        let faces = vec![face(200.0, 200.0, 50.0, 50.0)];
        assert!(select_principal_face(&faces, 100, 100).is_none());
    }

    #[test]
    fn test_select_empty_slice() {
        assert!(select_principal_face(&[], 100, 100).is_none());
    }
}
