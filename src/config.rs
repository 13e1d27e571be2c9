use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::api::{DEFAULT_API_ADDR, DEFAULT_MAX_BODY_BYTES};
use crate::distance::DEFAULT_FOCAL_LENGTH_PX;
use crate::pipeline::DEFAULT_INFERENCE_SIZE;
use crate::reference::{is_toml, ReferenceWidthTable};

const DEFAULT_DETECTOR_CONFIDENCE: f32 = 0.25;
const DEFAULT_FACE_CONFIDENCE: f32 = 0.7;

#[derive(Debug, Deserialize, Default)]
struct SceneConfigFile {
    api: Option<ApiConfigFile>,
    camera: Option<CameraConfigFile>,
    detector: Option<DetectorConfigFile>,
    faces: Option<FacesConfigFile>,
    reference_widths: Option<ReferenceConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct ApiConfigFile {
    addr: Option<String>,
    max_body_bytes: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraConfigFile {
    focal_length_px: Option<f64>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectorConfigFile {
    model_path: Option<PathBuf>,
    inference_size: Option<u32>,
    confidence_threshold: Option<f32>,
    class_names_path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
struct FacesConfigFile {
    model_path: Option<PathBuf>,
    confidence_threshold: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
struct ReferenceConfigFile {
    path: Option<PathBuf>,
    aliases: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Clone)]
pub struct SceneConfig {
    pub api_addr: String,
    pub max_body_bytes: usize,
    pub focal_length_px: f64,
    pub detector: DetectorSettings,
    pub faces: FaceSettings,
    pub reference_widths: ReferenceSettings,
}

#[derive(Debug, Clone)]
pub struct DetectorSettings {
    /// ONNX model; `None` runs an empty stub detector.
    pub model_path: Option<PathBuf>,
    /// Long-edge resolution fed to the model.
    pub inference_size: u32,
    pub confidence_threshold: f32,
    /// One class name per line; COCO names when unset.
    pub class_names_path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct FaceSettings {
    pub model_path: Option<PathBuf>,
    pub confidence_threshold: f32,
}

#[derive(Debug, Clone, Default)]
pub struct ReferenceSettings {
    /// JSON or TOML `label -> width_cm` map merged over the built-in table.
    pub path: Option<PathBuf>,
    /// Detector label -> table key, used for width lookup only.
    pub aliases: BTreeMap<String, String>,
}

impl SceneConfig {
    /// Load from `SCENE_CONFIG` (if set), apply env overrides, validate.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("SCENE_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: SceneConfigFile) -> Self {
        let api = file.api.unwrap_or_default();
        let detector = file.detector.unwrap_or_default();
        let faces = file.faces.unwrap_or_default();
        let reference = file.reference_widths.unwrap_or_default();
        Self {
            api_addr: api.addr.unwrap_or_else(|| DEFAULT_API_ADDR.to_string()),
            max_body_bytes: api.max_body_bytes.unwrap_or(DEFAULT_MAX_BODY_BYTES),
            focal_length_px: file
                .camera
                .and_then(|camera| camera.focal_length_px)
                .unwrap_or(DEFAULT_FOCAL_LENGTH_PX),
            detector: DetectorSettings {
                model_path: detector.model_path,
                inference_size: detector.inference_size.unwrap_or(DEFAULT_INFERENCE_SIZE),
                confidence_threshold: detector
                    .confidence_threshold
                    .unwrap_or(DEFAULT_DETECTOR_CONFIDENCE),
                class_names_path: detector.class_names_path,
            },
            faces: FaceSettings {
                model_path: faces.model_path,
                confidence_threshold: faces
                    .confidence_threshold
                    .unwrap_or(DEFAULT_FACE_CONFIDENCE),
            },
            reference_widths: ReferenceSettings {
                path: reference.path,
                aliases: reference.aliases.unwrap_or_default(),
            },
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(addr) = std::env::var("SCENE_API_ADDR") {
            if !addr.trim().is_empty() {
                self.api_addr = addr;
            }
        }
        if let Ok(focal) = std::env::var("SCENE_FOCAL_LENGTH_PX") {
            self.focal_length_px = focal
                .trim()
                .parse()
                .map_err(|_| anyhow!("SCENE_FOCAL_LENGTH_PX must be a number of pixels"))?;
        }
        if let Ok(size) = std::env::var("SCENE_INFERENCE_SIZE") {
            self.detector.inference_size = size
                .trim()
                .parse()
                .map_err(|_| anyhow!("SCENE_INFERENCE_SIZE must be an integer pixel size"))?;
        }
        if let Ok(path) = std::env::var("SCENE_DETECTOR_MODEL") {
            if !path.trim().is_empty() {
                self.detector.model_path = Some(PathBuf::from(path));
            }
        }
        if let Ok(path) = std::env::var("SCENE_FACE_MODEL") {
            if !path.trim().is_empty() {
                self.faces.model_path = Some(PathBuf::from(path));
            }
        }
        if let Ok(path) = std::env::var("SCENE_REFERENCE_WIDTHS") {
            if !path.trim().is_empty() {
                self.reference_widths.path = Some(PathBuf::from(path));
            }
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if !self.focal_length_px.is_finite() || self.focal_length_px <= 0.0 {
            return Err(anyhow!(
                "focal_length_px must be a positive number, got {}",
                self.focal_length_px
            ));
        }
        if self.detector.inference_size == 0 {
            return Err(anyhow!("inference_size must be greater than zero"));
        }
        for (name, threshold) in [
            ("detector", self.detector.confidence_threshold),
            ("faces", self.faces.confidence_threshold),
        ] {
            if !(0.0..=1.0).contains(&threshold) {
                return Err(anyhow!(
                    "{} confidence_threshold must be within [0, 1], got {}",
                    name,
                    threshold
                ));
            }
        }
        if self.max_body_bytes == 0 {
            return Err(anyhow!("max_body_bytes must be greater than zero"));
        }
        Ok(())
    }

    /// Built-in reference widths, merged with the configured file and aliases.
    pub fn reference_table(&self) -> Result<ReferenceWidthTable> {
        let mut table = ReferenceWidthTable::builtin();
        if let Some(path) = &self.reference_widths.path {
            table = table.merge_file(path)?;
        }
        for (label, key) in &self.reference_widths.aliases {
            if !table.contains(key) {
                log::warn!("alias '{}' points at unknown reference key '{}'", label, key);
            }
            table = table.with_alias(label.clone(), key.clone());
        }
        Ok(table)
    }
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self::from_file(SceneConfigFile::default())
    }
}

fn read_config_file(path: &Path) -> Result<SceneConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = if is_toml(path) {
        toml::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}
