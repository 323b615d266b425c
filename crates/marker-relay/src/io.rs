//! Session configuration resolution.
//!
//! Builds one [`SessionConfig`] from an optional JSON session file and a set
//! of discrete overrides (usually command-line flags). Values present in the
//! session file win, overrides fill the fields the file leaves out, built-in
//! defaults fill the rest. The dictionary has no default.

use std::fs;
use std::path::{Path, PathBuf};

use marker_relay_core::{
    CameraIntrinsics, CameraModel, ConfigValidationError, DetectorParams, DictionaryId,
    OutputConfig, RadialTangentialDistortion, SessionConfig, DEFAULT_BIND_ADDR,
    DEFAULT_GROUND_MARKER_ID, DEFAULT_MARKER_LENGTH_M, DEFAULT_OBJECT_MARKER_ID,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("cannot read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid camera calibration {}: {reason}", path.display())]
    Calibration { path: PathBuf, reason: String },
    #[error("no marker dictionary given (use the session file or --dictionary)")]
    MissingDictionary,
    #[error(transparent)]
    Invalid(#[from] ConfigValidationError),
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Structured session file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionFile {
    /// Informational only.
    #[serde(default)]
    pub camera_name: Option<String>,
    /// Calibration file, relative to the session file's directory.
    #[serde(default)]
    pub camera_calib: Option<PathBuf>,
    #[serde(default)]
    pub marker_dictionary: Option<u32>,
    /// Id of the tracked object marker.
    #[serde(default)]
    pub marker_id: Option<u32>,
    #[serde(default)]
    pub ground_marker_id: Option<u32>,
    #[serde(default)]
    pub marker_length: Option<f64>,
    #[serde(default)]
    pub camera_top: Option<bool>,
    #[serde(default)]
    pub bind: Option<String>,
    #[serde(default)]
    pub log_path: Option<PathBuf>,
    #[serde(default)]
    pub detector: Option<DetectorParams>,
}

impl SessionFile {
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        read_json(path.as_ref())
    }

    /// `camera_calib` resolved against `base`, the session file's directory.
    pub fn calibration_path(&self, base: &Path) -> Option<PathBuf> {
        self.camera_calib.as_ref().map(|p| {
            if p.is_absolute() {
                p.clone()
            } else {
                base.join(p)
            }
        })
    }
}

/// Camera calibration file: `K` as three rows plus OpenCV-ordered distortion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationFile {
    pub camera_matrix: [[f64; 3]; 3],
    #[serde(default)]
    pub distortion_coefficients: Vec<f64>,
}

impl CalibrationFile {
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        read_json(path.as_ref())
    }

    pub fn camera_model(&self) -> Option<CameraModel> {
        let intrinsics = CameraIntrinsics::from_matrix(self.camera_matrix)?;
        let distortion = if self.distortion_coefficients.is_empty() {
            RadialTangentialDistortion::default()
        } else {
            RadialTangentialDistortion::from_coefficients(&self.distortion_coefficients)?
        };
        Some(CameraModel::new(intrinsics, distortion))
    }
}

/// Load a calibration file into a camera model.
pub fn load_camera(path: &Path) -> Result<CameraModel, ConfigError> {
    CalibrationFile::load_json(path)?
        .camera_model()
        .ok_or_else(|| ConfigError::Calibration {
            path: path.to_path_buf(),
            reason: "expected a pinhole camera matrix and k1, k2, p1, p2[, k3] distortion".into(),
        })
}

pub fn load_detector_params(path: &Path) -> Result<DetectorParams, ConfigError> {
    read_json(path)
}

/// Discrete settings, typically from the command line.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Overrides {
    pub dictionary: Option<u32>,
    pub camera_params: Option<PathBuf>,
    pub marker_length: Option<f64>,
    pub detector_params: Option<PathBuf>,
    pub camera_top: bool,
    pub object_marker_id: Option<u32>,
    pub ground_marker_id: Option<u32>,
    pub bind: Option<String>,
    pub log_path: Option<PathBuf>,
}

/// Merge a parsed session file (with its directory) and overrides.
pub fn resolve(
    file: Option<(&SessionFile, &Path)>,
    overrides: &Overrides,
) -> Result<SessionConfig, ConfigError> {
    let (file, base) = match file {
        Some((f, base)) => (Some(f), base),
        None => (None, Path::new(".")),
    };
    let pick = |from_file: Option<u32>, over: Option<u32>| from_file.or(over);

    let dictionary_index = pick(file.and_then(|f| f.marker_dictionary), overrides.dictionary)
        .ok_or(ConfigError::MissingDictionary)?;
    let dictionary = DictionaryId::try_from(dictionary_index)?;

    let camera = match file.and_then(|f| f.calibration_path(base)) {
        Some(path) => Some(load_camera(&path)?),
        None => match overrides.camera_params.as_deref() {
            Some(path) => Some(load_camera(path)?),
            None => None,
        },
    };

    let mut detector = match file.and_then(|f| f.detector.clone()) {
        Some(params) => params,
        None => match overrides.detector_params.as_deref() {
            Some(path) => load_detector_params(path)?,
            None => DetectorParams::default(),
        },
    };
    detector.do_corner_refinement = true;

    let outputs = OutputConfig {
        bind_addr: file
            .and_then(|f| f.bind.clone())
            .or_else(|| overrides.bind.clone())
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
        log_path: file
            .and_then(|f| f.log_path.clone())
            .or_else(|| overrides.log_path.clone()),
    };

    let config = SessionConfig {
        dictionary,
        marker_length_m: file
            .and_then(|f| f.marker_length)
            .or(overrides.marker_length)
            .unwrap_or(DEFAULT_MARKER_LENGTH_M),
        camera,
        ground_marker_id: pick(
            file.and_then(|f| f.ground_marker_id),
            overrides.ground_marker_id,
        )
        .unwrap_or(DEFAULT_GROUND_MARKER_ID),
        object_marker_id: pick(file.and_then(|f| f.marker_id), overrides.object_marker_id)
            .unwrap_or(DEFAULT_OBJECT_MARKER_ID),
        camera_mounted_on_top: file
            .and_then(|f| f.camera_top)
            .unwrap_or(overrides.camera_top),
        detector,
        outputs,
    };
    config.validate()?;

    if let Some(name) = file.and_then(|f| f.camera_name.as_deref()) {
        log::info!("camera: {name}");
    }
    log::info!(
        "dictionary {} ({} markers), marker length {} m, object id {}, ground id {}, pose {}",
        config.dictionary,
        config.dictionary.marker_count(),
        config.marker_length_m,
        config.object_marker_id,
        config.ground_marker_id,
        if config.pose_enabled() { "on" } else { "off" }
    );
    Ok(config)
}

/// Load the session file at `path` (if any) and resolve it with `overrides`.
pub fn resolve_session(
    path: Option<&Path>,
    overrides: &Overrides,
) -> Result<SessionConfig, ConfigError> {
    match path {
        Some(path) => {
            let file = SessionFile::load_json(path)?;
            let base = path.parent().unwrap_or_else(|| Path::new("."));
            resolve(Some((&file, base)), overrides)
        }
        None => resolve(None, overrides),
    }
}
