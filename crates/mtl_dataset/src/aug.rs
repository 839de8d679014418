//! Joint augmentation applied to aligned image/mask/bbox triples.
//!
//! Every transform draws its random parameters once per sample and applies
//! them to all affected modalities, so spatial correspondence survives the
//! augmentation. The scalar presence label is geometry-invariant and is never
//! touched.

use rand::Rng;

#[derive(Debug, Clone)]
pub struct AugmentConfig {
    /// Probability of applying a horizontal flip (image + mask + bbox).
    pub flip_horizontal_prob: f32,
    /// Probability of applying a light color jitter (image only).
    pub color_jitter_prob: f32,
    /// Max jitter scale for brightness/contrast.
    pub color_jitter_strength: f32,
    /// Probability of adding uniform noise per channel (image only).
    pub noise_prob: f32,
    /// Max absolute noise added (0-1 range).
    pub noise_strength: f32,
}

impl Default for AugmentConfig {
    fn default() -> Self {
        Self {
            flip_horizontal_prob: 0.5,
            color_jitter_prob: 0.2,
            color_jitter_strength: 0.1,
            noise_prob: 0.0,
            noise_strength: 0.02,
        }
    }
}

/// Augment one sample in place. `image` is CHW, `mask` is HW.
pub(crate) fn augment_sample(
    image: &mut [f32],
    mask: &mut [f32],
    bbox: &mut [f32; 4],
    width: usize,
    height: usize,
    channels: usize,
    cfg: &AugmentConfig,
    rng: &mut dyn rand::RngCore,
) {
    if cfg.flip_horizontal_prob > 0.0 && rng.random_range(0.0..1.0) < cfg.flip_horizontal_prob {
        hflip_chw(image, width, height, channels);
        hflip_chw(mask, width, height, 1);
        *bbox = hflip_box(*bbox);
    }
    maybe_jitter(image, cfg.color_jitter_prob, cfg.color_jitter_strength, rng);
    maybe_noise(image, cfg.noise_prob, cfg.noise_strength, rng);
}

/// Mirror a CHW buffer around the vertical axis.
pub fn hflip_chw(data: &mut [f32], width: usize, height: usize, channels: usize) {
    for c in 0..channels {
        for y in 0..height {
            let row = &mut data[(c * height + y) * width..(c * height + y + 1) * width];
            row.reverse();
        }
    }
}

/// Mirror normalized xyxy box coordinates around the vertical axis.
pub fn hflip_box(b: [f32; 4]) -> [f32; 4] {
    [
        (1.0 - b[2]).clamp(0.0, 1.0),
        b[1],
        (1.0 - b[0]).clamp(0.0, 1.0),
        b[3],
    ]
}

fn maybe_jitter(image: &mut [f32], prob: f32, strength: f32, rng: &mut dyn rand::RngCore) {
    if prob <= 0.0 || strength <= 0.0 {
        return;
    }
    if rng.random_range(0.0..1.0) >= prob {
        return;
    }
    let bright = 1.0 + rng.random_range(-strength..strength);
    let contrast = 1.0 + rng.random_range(-strength..strength);
    for v in image.iter_mut() {
        let mut x = (*v - 0.5) * contrast + 0.5;
        x *= bright;
        *v = x.clamp(0.0, 1.0);
    }
}

fn maybe_noise(image: &mut [f32], prob: f32, strength: f32, rng: &mut dyn rand::RngCore) {
    if prob <= 0.0 || strength <= 0.0 {
        return;
    }
    if rng.random_range(0.0..1.0) >= prob {
        return;
    }
    for v in image.iter_mut() {
        let noise = rng.random_range(-strength..strength);
        *v = (*v + noise).clamp(0.0, 1.0);
    }
}

#[cfg(test)]
mod aug_tests {
    use super::{hflip_box, hflip_chw};

    #[test]
    fn hflip_box_round_trips() {
        let b = [0.1, 0.2, 0.6, 0.9];
        let twice = hflip_box(hflip_box(b));
        for (a, e) in twice.iter().zip(b.iter()) {
            assert!((a - e).abs() < 1e-6);
        }
    }

    #[test]
    fn hflip_box_mirrors_x_extent() {
        let flipped = hflip_box([0.25, 0.0, 0.75, 1.0]);
        assert!((flipped[0] - 0.25).abs() < 1e-6);
        assert!((flipped[2] - 0.75).abs() < 1e-6);
        assert!(flipped[0] < flipped[2]);
    }

    #[test]
    fn hflip_chw_reverses_rows_per_channel() {
        // 2 channels, 1x4 rows.
        let mut data = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0];
        hflip_chw(&mut data, 4, 1, 2);
        assert_eq!(data, vec![4.0, 3.0, 2.0, 1.0, 8.0, 7.0, 6.0, 5.0]);
    }

    #[test]
    fn mask_flip_matches_image_flip() {
        let mut image = vec![0.0, 0.1, 0.2, 0.3];
        let mut mask = vec![0.0, 0.0, 1.0, 1.0];
        hflip_chw(&mut image, 4, 1, 1);
        hflip_chw(&mut mask, 4, 1, 1);
        assert_eq!(image, vec![0.3, 0.2, 0.1, 0.0]);
        assert_eq!(mask, vec![1.0, 1.0, 0.0, 0.0]);
    }
}
