//! Canonical bounding box with conversions between Pascal VOC, YOLO, and the
//! Kvasir-Capsule four-corner manifest format.

use crate::types::{CapsuleError, DatasetResult};

/// Kvasir-Capsule frames are a fixed 336x336 pixels.
pub const KVASIR_FRAME_EXTENT: u32 = 336;

/// Axis-aligned box in pixel space, carrying the image extent it was
/// measured against so normalized formats can be derived.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub x: i64,
    pub y: i64,
    pub width: i64,
    pub height: i64,
    pub norm_x: u32,
    pub norm_y: u32,
}

impl BoundingBox {
    /// Build from Pascal VOC corners (x_min, y_min, x_max, y_max).
    pub fn from_pascal_voc(
        x_min: i64,
        y_min: i64,
        x_max: i64,
        y_max: i64,
        image_width: u32,
        image_height: u32,
    ) -> DatasetResult<Self> {
        if x_min > x_max || y_min > y_max {
            return Err(CapsuleError::InvalidBox {
                msg: format!("inverted corners ({x_min},{y_min})..({x_max},{y_max})"),
            });
        }
        Ok(BoundingBox {
            x: x_min,
            y: y_min,
            width: x_max - x_min,
            height: y_max - y_min,
            norm_x: image_width,
            norm_y: image_height,
        })
    }

    /// Build from normalized YOLO coordinates (x_center, y_center, width,
    /// height in 0..1).
    pub fn from_yolo(
        x_center_n: f32,
        y_center_n: f32,
        width_n: f32,
        height_n: f32,
        image_width: u32,
        image_height: u32,
    ) -> Self {
        let width = (width_n * image_width as f32).round() as i64;
        let height = (height_n * image_height as f32).round() as i64;
        BoundingBox {
            x: ((x_center_n - width_n / 2.0) * image_width as f32).round() as i64,
            y: ((y_center_n - height_n / 2.0) * image_height as f32).round() as i64,
            width,
            height,
            norm_x: image_width,
            norm_y: image_height,
        }
    }

    /// Build from the four corner points recorded in metadata.csv. The
    /// corners carry no guaranteed ordering, so the box is the min/max hull.
    pub fn from_kvasir_capsule(
        x1: i64,
        y1: i64,
        x2: i64,
        y2: i64,
        x3: i64,
        y3: i64,
        x4: i64,
        y4: i64,
    ) -> Self {
        let x = x1.min(x2).min(x3).min(x4);
        let y = y1.min(y2).min(y3).min(y4);
        BoundingBox {
            x,
            y,
            width: x1.max(x2).max(x3).max(x4) - x,
            height: y1.max(y2).max(y3).max(y4) - y,
            norm_x: KVASIR_FRAME_EXTENT,
            norm_y: KVASIR_FRAME_EXTENT,
        }
    }

    /// Normalized YOLO representation (x_center, y_center, width, height).
    pub fn to_yolo(&self) -> [f32; 4] {
        [
            (self.x as f32 + self.width as f32 / 2.0) / self.norm_x as f32,
            (self.y as f32 + self.height as f32 / 2.0) / self.norm_y as f32,
            self.width as f32 / self.norm_x as f32,
            self.height as f32 / self.norm_y as f32,
        ]
    }

    /// Pascal VOC representation (x_min, y_min, x_max, y_max) in pixels.
    pub fn to_pascal_voc(&self) -> [i64; 4] {
        [self.x, self.y, self.x + self.width, self.y + self.height]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kvasir_corners_form_hull() {
        let bbox = BoundingBox::from_kvasir_capsule(100, 50, 200, 50, 200, 150, 100, 150);
        assert_eq!(bbox.x, 100);
        assert_eq!(bbox.y, 50);
        assert_eq!(bbox.width, 100);
        assert_eq!(bbox.height, 100);
        assert_eq!(bbox.norm_x, KVASIR_FRAME_EXTENT);
    }

    #[test]
    fn kvasir_corners_unordered() {
        // Same hull regardless of corner order.
        let a = BoundingBox::from_kvasir_capsule(10, 20, 30, 20, 30, 40, 10, 40);
        let b = BoundingBox::from_kvasir_capsule(30, 40, 10, 20, 10, 40, 30, 20);
        assert_eq!(a, b);
    }

    #[test]
    fn pascal_voc_round_trip() {
        let bbox = BoundingBox::from_pascal_voc(10, 20, 110, 220, 336, 336).unwrap();
        assert_eq!(bbox.to_pascal_voc(), [10, 20, 110, 220]);
    }

    #[test]
    fn pascal_voc_rejects_inverted_corners() {
        assert!(BoundingBox::from_pascal_voc(110, 20, 10, 220, 336, 336).is_err());
    }

    #[test]
    fn yolo_round_trip_through_pixels() {
        let bbox = BoundingBox::from_pascal_voc(84, 84, 252, 252, 336, 336).unwrap();
        let yolo = bbox.to_yolo();
        assert!((yolo[0] - 0.5).abs() < 1e-6);
        assert!((yolo[1] - 0.5).abs() < 1e-6);
        assert!((yolo[2] - 0.5).abs() < 1e-6);
        assert!((yolo[3] - 0.5).abs() < 1e-6);
        let back = BoundingBox::from_yolo(yolo[0], yolo[1], yolo[2], yolo[3], 336, 336);
        assert_eq!(back, bbox);
    }
}
