//! Loading and indexing capture dataset files.

use crate::types::{DatasetResult, LabelEntry, MtlDatasetError, SampleRecord};
use image::imageops::FilterType;
use std::fs;
use std::path::{Path, PathBuf};

fn validate_label_entry(meta: &LabelEntry, path: &Path) -> DatasetResult<()> {
    if meta.image.trim().is_empty() {
        return Err(MtlDatasetError::Validation {
            path: path.to_path_buf(),
            msg: "missing image filename".to_string(),
        });
    }
    if meta.mask.trim().is_empty() {
        return Err(MtlDatasetError::Validation {
            path: path.to_path_buf(),
            msg: "missing mask filename".to_string(),
        });
    }
    if meta.lesion_present && meta.bbox_norm.is_none() && meta.bbox_px.is_none() {
        return Err(MtlDatasetError::Validation {
            path: path.to_path_buf(),
            msg: "lesion_present but no bbox_norm or bbox_px".to_string(),
        });
    }
    if let Some(b) = meta.bbox_norm {
        if b.iter().any(|v| !v.is_finite() || *v < 0.0 || *v > 1.0) {
            return Err(MtlDatasetError::Validation {
                path: path.to_path_buf(),
                msg: format!("bbox_norm out of [0,1] ({b:?})"),
            });
        }
        if b[0] >= b[2] || b[1] >= b[3] {
            return Err(MtlDatasetError::Validation {
                path: path.to_path_buf(),
                msg: format!("bbox_norm min>=max ({b:?})"),
            });
        }
    }
    if let Some(b) = meta.bbox_px {
        if b.iter().any(|v| !v.is_finite()) {
            return Err(MtlDatasetError::Validation {
                path: path.to_path_buf(),
                msg: format!("bbox_px contains non-finite values ({b:?})"),
            });
        }
        if b[0] >= b[2] || b[1] >= b[3] {
            return Err(MtlDatasetError::Validation {
                path: path.to_path_buf(),
                msg: format!("bbox_px min>=max ({b:?})"),
            });
        }
    }
    Ok(())
}

/// Index all label files under `<root>/labels`, sorted by path. The sorted
/// order is the logical sample ordering every modality stream shares.
pub fn index_labels(root: &Path) -> DatasetResult<Vec<PathBuf>> {
    let labels_dir = root.join("labels");
    let entries = fs::read_dir(&labels_dir).map_err(|e| MtlDatasetError::Io {
        path: labels_dir.clone(),
        source: e,
    })?;
    let mut label_paths: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|p| p.extension().and_then(|s| s.to_str()) == Some("json"))
        .collect();
    label_paths.sort();
    Ok(label_paths)
}

/// Load a capture directory into aligned in-memory records, force-resizing
/// every image and mask to `geometry` (width, height).
pub fn load_capture_dir(root: &Path, geometry: (u32, u32)) -> DatasetResult<Vec<SampleRecord>> {
    let label_paths = index_labels(root)?;
    let mut records = Vec::with_capacity(label_paths.len());
    for label_path in label_paths {
        records.push(load_record(root, &label_path, geometry)?);
    }
    Ok(records)
}

fn load_record(root: &Path, label_path: &Path, geometry: (u32, u32)) -> DatasetResult<SampleRecord> {
    let raw = fs::read(label_path).map_err(|e| MtlDatasetError::Io {
        path: label_path.to_path_buf(),
        source: e,
    })?;
    let meta: LabelEntry = serde_json::from_slice(&raw).map_err(|e| MtlDatasetError::Json {
        path: label_path.to_path_buf(),
        source: e,
    })?;
    validate_label_entry(&meta, label_path)?;
    if !meta.image_present {
        return Err(MtlDatasetError::MissingImage {
            path: label_path.to_path_buf(),
        });
    }

    let img_path = root.join(&meta.image);
    if !img_path.exists() {
        return Err(MtlDatasetError::MissingImageFile {
            path: label_path.to_path_buf(),
            image: img_path,
        });
    }
    let mask_path = root.join(&meta.mask);
    if !mask_path.exists() {
        return Err(MtlDatasetError::MissingMaskFile {
            path: label_path.to_path_buf(),
            mask: mask_path,
        });
    }

    let (width, height) = geometry;
    let img = image::open(&img_path)
        .map_err(|e| MtlDatasetError::Image {
            path: img_path.clone(),
            source: e,
        })?
        .to_rgb8();
    let (src_w, src_h) = img.dimensions();
    let img = if (src_w, src_h) == (width, height) {
        img
    } else {
        image::imageops::resize(&img, width, height, FilterType::Triangle)
    };

    let mask_img = image::open(&mask_path)
        .map_err(|e| MtlDatasetError::Image {
            path: mask_path.clone(),
            source: e,
        })?
        .to_luma8();
    // Nearest keeps the mask binary through the resize.
    let mask_img = if mask_img.dimensions() == (width, height) {
        mask_img
    } else {
        image::imageops::resize(&mask_img, width, height, FilterType::Nearest)
    };

    let mut image_chw = vec![0.0f32; (width * height * 3) as usize];
    for (y, x, pixel) in img.enumerate_pixels() {
        let base = (y * width + x) as usize;
        image_chw[base] = pixel[0] as f32 / 255.0;
        image_chw[(width * height) as usize + base] = pixel[1] as f32 / 255.0;
        image_chw[2 * (width * height) as usize + base] = pixel[2] as f32 / 255.0;
    }

    let mut mask = vec![0.0f32; (width * height) as usize];
    for (y, x, pixel) in mask_img.enumerate_pixels() {
        if pixel[0] >= 128 {
            mask[(y * width + x) as usize] = 1.0;
        }
    }

    let bbox = normalize_bbox(&meta, src_w, src_h);

    Ok(SampleRecord {
        frame_id: meta.frame_id,
        image_chw,
        mask,
        label: if meta.lesion_present { 1.0 } else { 0.0 },
        bbox,
        width,
        height,
    })
}

fn normalize_bbox(meta: &LabelEntry, src_w: u32, src_h: u32) -> [f32; 4] {
    let mut bbox = if let Some(norm) = meta.bbox_norm {
        norm
    } else if let Some(px) = meta.bbox_px {
        [
            px[0] / src_w as f32,
            px[1] / src_h as f32,
            px[2] / src_w as f32,
            px[3] / src_h as f32,
        ]
    } else {
        [0.0; 4]
    };
    for v in bbox.iter_mut() {
        *v = v.clamp(0.0, 1.0);
    }
    bbox
}
