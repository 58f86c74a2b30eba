use serde::{Deserialize, Serialize};

/// Landmark indices drawn on the overlay: eye contours, nose tip, mouth corners,
/// forehead and chin
pub const KEY_LANDMARK_INDICES: [usize; 28] = [
    33, 34, 35, 36, 37, 38, 39, 40, 41, // right eye
    362, 363, 364, 365, 366, 367, 368, 369, 370, 371, 372, 373, // left eye
    1, 2, // nose
    61, 291, // mouth corners
    10, 152, 175, // forehead, chin
];

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Keypoint {
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub z: f64,
}

impl Keypoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y, z: 0.0 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x_min: f64,
    pub y_min: f64,
    pub x_max: f64,
    pub y_max: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    pub fn from_corners(x_min: f64, y_min: f64, x_max: f64, y_max: f64) -> Self {
        Self {
            x_min,
            y_min,
            x_max,
            y_max,
            width: x_max - x_min,
            height: y_max - y_min,
        }
    }
}

/// A face as reported by the detection pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedFace {
    pub bounding_box: BoundingBox,
    pub keypoints: Vec<Keypoint>,
}

/// What the overlay draws for one face
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceOverlay {
    pub bounding_box: BoundingBox,
    pub landmarks: Vec<Keypoint>,
}

/// Everything the overlay renderer needs for one frame. An empty payload clears it.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DrawingPayload {
    pub faces: Vec<FaceOverlay>,
}

impl DrawingPayload {
    /// Reduce detected faces to their box and key landmarks.
    /// Indices beyond a face's keypoint list are skipped.
    pub fn from_faces(faces: &[DetectedFace]) -> Self {
        let faces = faces
            .iter()
            .map(|face| FaceOverlay {
                bounding_box: face.bounding_box,
                landmarks: KEY_LANDMARK_INDICES
                    .iter()
                    .filter_map(|&i| face.keypoints.get(i).copied())
                    .collect(),
            })
            .collect();

        Self { faces }
    }

    pub fn face_present(&self) -> bool {
        !self.faces.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mesh_face(points: usize) -> DetectedFace {
        DetectedFace {
            bounding_box: BoundingBox::from_corners(10.0, 20.0, 110.0, 170.0),
            keypoints: (0..points).map(|i| Keypoint::new(i as f64, 0.0)).collect(),
        }
    }

    #[test]
    fn test_full_mesh_keeps_key_landmarks_only() {
        let payload = DrawingPayload::from_faces(&[mesh_face(468)]);

        assert!(payload.face_present());
        let face = &payload.faces[0];
        assert_eq!(face.landmarks.len(), KEY_LANDMARK_INDICES.len());
        assert_eq!(face.landmarks[0].x, 33.0);
        assert_eq!(face.landmarks.last().unwrap().x, 175.0);
        assert_eq!(face.bounding_box.width, 100.0);
        assert_eq!(face.bounding_box.height, 150.0);
    }

    #[test]
    fn test_short_keypoint_list_skips_missing_indices() {
        let payload = DrawingPayload::from_faces(&[mesh_face(40)]);
        // 1, 2, 10 and 33..=39
        assert_eq!(payload.faces[0].landmarks.len(), 10);
    }

    #[test]
    fn test_no_faces_is_empty_payload() {
        let payload = DrawingPayload::from_faces(&[]);
        assert!(!payload.face_present());
        assert_eq!(payload, DrawingPayload::default());
    }
}
