//! Phase-keyed image transform pipelines.
//!
//! Train gets randomized augmentation (flip, rotate90, color jitter); val
//! and test get a deterministic resize + normalize. Geometry augmentations
//! keep YOLO boxes consistent with the pixels.

use image::imageops::{self, FilterType};
use image::RgbImage;
use rand::{Rng, SeedableRng};

/// Output of a pipeline application: CHW float image plus the (possibly
/// transformed) YOLO box.
#[derive(Debug, Clone)]
pub struct Transformed {
    /// CHW layout, normalized.
    pub image_chw: Vec<f32>,
    pub width: u32,
    pub height: u32,
    pub bbox: Option<[f32; 4]>,
}

#[derive(Debug, Clone)]
pub struct TransformPipeline {
    /// Resize target (width, height). If None, images pass through at their
    /// native size.
    pub target_size: Option<(u32, u32)>,
    pub flip_horizontal_prob: f32,
    pub rotate90_prob: f32,
    pub color_jitter_prob: f32,
    pub color_jitter_strength: f32,
    pub normalize_mean: f32,
    pub normalize_std: f32,
    /// Seed for per-frame deterministic augmentation. None uses the
    /// thread-local RNG.
    pub seed: Option<u64>,
}

impl TransformPipeline {
    /// Randomized training pipeline: 224x224, rotate90/flip/jitter.
    pub fn train_default() -> Self {
        Self {
            target_size: Some((224, 224)),
            flip_horizontal_prob: 0.5,
            rotate90_prob: 0.5,
            color_jitter_prob: 0.5,
            color_jitter_strength: 0.1,
            normalize_mean: 0.5,
            normalize_std: 0.225,
            seed: None,
        }
    }

    /// Deterministic eval pipeline: resize + normalize only.
    pub fn eval_default() -> Self {
        Self {
            flip_horizontal_prob: 0.0,
            rotate90_prob: 0.0,
            color_jitter_prob: 0.0,
            ..Self::train_default()
        }
    }

    /// Pipeline for a split phase: "train" is augmented, everything else is
    /// identity geometry.
    pub fn for_phase(phase: &str) -> Self {
        if phase == "train" {
            Self::train_default()
        } else {
            Self::eval_default()
        }
    }

    /// Apply the pipeline to one frame. `frame_number` is mixed into the
    /// seed so seeded pipelines are deterministic per frame.
    pub fn apply(&self, img: RgbImage, bbox: Option<[f32; 4]>, frame_number: u64) -> Transformed {
        match self.seed {
            Some(seed) => self.apply_with_rng(
                img,
                bbox,
                &mut rand::rngs::StdRng::seed_from_u64(seed ^ frame_number),
            ),
            None => self.apply_with_rng(img, bbox, &mut rand::rng()),
        }
    }

    fn apply_with_rng<R: Rng>(
        &self,
        img: RgbImage,
        bbox: Option<[f32; 4]>,
        rng: &mut R,
    ) -> Transformed {
        let mut img = match self.target_size {
            Some((w, h)) => imageops::resize(&img, w, h, FilterType::Triangle),
            None => img,
        };
        let mut bbox = bbox;

        maybe_hflip(&mut img, &mut bbox, self.flip_horizontal_prob, rng);
        maybe_rotate90(&mut img, &mut bbox, self.rotate90_prob, rng);
        maybe_jitter(
            &mut img,
            self.color_jitter_prob,
            self.color_jitter_strength,
            rng,
        );

        let (width, height) = img.dimensions();
        let mut image_chw = Vec::with_capacity(3 * (width * height) as usize);
        for c in 0..3 {
            for y in 0..height {
                for x in 0..width {
                    let v = img.get_pixel(x, y)[c] as f32 / 255.0;
                    image_chw.push((v - self.normalize_mean) / self.normalize_std);
                }
            }
        }

        Transformed {
            image_chw,
            width,
            height,
            bbox,
        }
    }
}

fn maybe_hflip<R: Rng>(
    img: &mut RgbImage,
    bbox: &mut Option<[f32; 4]>,
    prob: f32,
    rng: &mut R,
) {
    if prob <= 0.0 || rng.random_range(0.0..1.0) >= prob {
        return;
    }
    *img = imageops::flip_horizontal(img);
    if let Some(b) = bbox.as_mut() {
        b[0] = 1.0 - b[0];
    }
}

fn maybe_rotate90<R: Rng>(
    img: &mut RgbImage,
    bbox: &mut Option<[f32; 4]>,
    prob: f32,
    rng: &mut R,
) {
    if prob <= 0.0 || rng.random_range(0.0..1.0) >= prob {
        return;
    }
    *img = imageops::rotate90(img);
    if let Some(b) = bbox.as_mut() {
        // Clockwise quarter turn: (x, y) -> (1 - y, x), extents swap.
        *b = [1.0 - b[1], b[0], b[3], b[2]];
    }
}

fn maybe_jitter<R: Rng>(img: &mut RgbImage, prob: f32, strength: f32, rng: &mut R) {
    if prob <= 0.0 || strength <= 0.0 || rng.random_range(0.0..1.0) >= prob {
        return;
    }
    let brightness = 1.0 + rng.random_range(-strength..strength);
    let contrast = 1.0 + rng.random_range(-strength..strength);
    for pixel in img.pixels_mut() {
        for channel in pixel.0.iter_mut() {
            let v = *channel as f32 / 255.0;
            let v = ((v - 0.5) * contrast + 0.5) * brightness;
            *channel = (v.clamp(0.0, 1.0) * 255.0) as u8;
        }
    }
}
