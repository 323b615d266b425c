//! Resolved session configuration.
//!
//! A `SessionConfig` is built once at startup (see the resolver in
//! `marker-relay`) and read-only afterwards.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::camera::CameraModel;

/// Default marker side length when none is configured.
pub const DEFAULT_MARKER_LENGTH_M: f64 = 0.1;
/// Default id of the fixed reference marker.
pub const DEFAULT_GROUND_MARKER_ID: u32 = 1;
/// Default id of the tracked marker.
pub const DEFAULT_OBJECT_MARKER_ID: u32 = 0;
/// Push socket endpoint: all interfaces, port 7777.
pub const DEFAULT_BIND_ADDR: &str = "tcp://*:7777";

/// Predefined ArUco marker dictionaries, by their conventional index.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum DictionaryId {
    Dict4x4_50,
    Dict4x4_100,
    Dict4x4_250,
    Dict4x4_1000,
    Dict5x5_50,
    Dict5x5_100,
    Dict5x5_250,
    Dict5x5_1000,
    Dict6x6_50,
    Dict6x6_100,
    Dict6x6_250,
    Dict6x6_1000,
    Dict7x7_50,
    Dict7x7_100,
    Dict7x7_250,
    Dict7x7_1000,
    ArucoOriginal,
}

impl DictionaryId {
    pub const ALL: [DictionaryId; 17] = [
        Self::Dict4x4_50,
        Self::Dict4x4_100,
        Self::Dict4x4_250,
        Self::Dict4x4_1000,
        Self::Dict5x5_50,
        Self::Dict5x5_100,
        Self::Dict5x5_250,
        Self::Dict5x5_1000,
        Self::Dict6x6_50,
        Self::Dict6x6_100,
        Self::Dict6x6_250,
        Self::Dict6x6_1000,
        Self::Dict7x7_50,
        Self::Dict7x7_100,
        Self::Dict7x7_250,
        Self::Dict7x7_1000,
        Self::ArucoOriginal,
    ];

    /// Look up a dictionary by its conventional index (`DICT_4X4_50 = 0` ...).
    pub fn from_index(index: u32) -> Option<Self> {
        Self::ALL.get(index as usize).copied()
    }

    #[inline]
    pub fn index(self) -> u32 {
        self as u32
    }

    /// Inner bits per marker side.
    pub fn marker_size(self) -> usize {
        match self.index() {
            0..=3 => 4,
            4..=7 | 16 => 5,
            8..=11 => 6,
            _ => 7,
        }
    }

    /// Number of markers in the dictionary; valid ids are `0..len`.
    pub fn marker_count(self) -> u32 {
        match self {
            Self::ArucoOriginal => 1024,
            other => [50, 100, 250, 1000][other.index() as usize % 4],
        }
    }

    pub fn name(self) -> &'static str {
        const NAMES: [&str; 17] = [
            "DICT_4X4_50",
            "DICT_4X4_100",
            "DICT_4X4_250",
            "DICT_4X4_1000",
            "DICT_5X5_50",
            "DICT_5X5_100",
            "DICT_5X5_250",
            "DICT_5X5_1000",
            "DICT_6X6_50",
            "DICT_6X6_100",
            "DICT_6X6_250",
            "DICT_6X6_1000",
            "DICT_7X7_50",
            "DICT_7X7_100",
            "DICT_7X7_250",
            "DICT_7X7_1000",
            "DICT_ARUCO_ORIGINAL",
        ];
        NAMES[self.index() as usize]
    }
}

impl fmt::Display for DictionaryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl TryFrom<u32> for DictionaryId {
    type Error = ConfigValidationError;

    fn try_from(index: u32) -> Result<Self, Self::Error> {
        Self::from_index(index).ok_or(ConfigValidationError::UnknownDictionary(index))
    }
}

impl From<DictionaryId> for u32 {
    fn from(d: DictionaryId) -> Self {
        d.index()
    }
}

/// Marker detector tuning, handed to the vision backend untouched.
///
/// Field meanings and defaults follow the ArUco detector parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorParams {
    pub adaptive_thresh_win_size_min: u32,
    pub adaptive_thresh_win_size_max: u32,
    pub adaptive_thresh_win_size_step: u32,
    pub adaptive_thresh_constant: f64,
    pub min_marker_perimeter_rate: f64,
    pub max_marker_perimeter_rate: f64,
    pub polygonal_approx_accuracy_rate: f64,
    pub min_corner_distance_rate: f64,
    pub min_distance_to_border: u32,
    pub min_marker_distance_rate: f64,
    pub do_corner_refinement: bool,
    pub corner_refinement_win_size: u32,
    pub corner_refinement_max_iterations: u32,
    pub corner_refinement_min_accuracy: f64,
    pub marker_border_bits: u32,
    pub perspective_remove_pixel_per_cell: u32,
    pub perspective_remove_ignored_margin_per_cell: f64,
    pub max_erroneous_bits_in_border_rate: f64,
    pub min_otsu_std_dev: f64,
    pub error_correction_rate: f64,
}

impl Default for DetectorParams {
    fn default() -> Self {
        Self {
            adaptive_thresh_win_size_min: 3,
            adaptive_thresh_win_size_max: 23,
            adaptive_thresh_win_size_step: 10,
            adaptive_thresh_constant: 7.0,
            min_marker_perimeter_rate: 0.03,
            max_marker_perimeter_rate: 4.0,
            polygonal_approx_accuracy_rate: 0.03,
            min_corner_distance_rate: 0.05,
            min_distance_to_border: 3,
            min_marker_distance_rate: 0.05,
            do_corner_refinement: false,
            corner_refinement_win_size: 5,
            corner_refinement_max_iterations: 30,
            corner_refinement_min_accuracy: 0.1,
            marker_border_bits: 1,
            perspective_remove_pixel_per_cell: 4,
            perspective_remove_ignored_margin_per_cell: 0.13,
            max_erroneous_bits_in_border_rate: 0.35,
            min_otsu_std_dev: 5.0,
            error_correction_rate: 0.6,
        }
    }
}

/// Where telemetry goes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Push socket endpoint (`tcp://host:port`; a bare `host:port` means TCP).
    pub bind_addr: String,
    /// Optional per-frame CSV log.
    pub log_path: Option<PathBuf>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            log_path: None,
        }
    }
}

/// Invalid resolved configuration.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ConfigValidationError {
    #[error("unknown marker dictionary index {0} (expected 0..=16)")]
    UnknownDictionary(u32),
    #[error("marker length must be a positive finite number of metres (got {0})")]
    InvalidMarkerLength(f64),
    #[error("ground and object marker must differ (both are {0})")]
    SameMarkerIds(u32),
    #[error("marker id {id} is outside {dictionary} (valid ids are 0..{len})")]
    MarkerIdOutOfRange {
        id: u32,
        dictionary: DictionaryId,
        len: u32,
    },
}

/// Immutable per-session settings consumed by the pipeline.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    pub dictionary: DictionaryId,
    pub marker_length_m: f64,
    /// Calibrated camera; `None` disables pose estimation.
    pub camera: Option<CameraModel>,
    pub ground_marker_id: u32,
    pub object_marker_id: u32,
    /// Camera looks down on the markers; flips y, z and heading.
    pub camera_mounted_on_top: bool,
    pub detector: DetectorParams,
    pub outputs: OutputConfig,
}

impl SessionConfig {
    /// Defaults for everything except the dictionary, which has none.
    pub fn new(dictionary: DictionaryId) -> Self {
        Self {
            dictionary,
            marker_length_m: DEFAULT_MARKER_LENGTH_M,
            camera: None,
            ground_marker_id: DEFAULT_GROUND_MARKER_ID,
            object_marker_id: DEFAULT_OBJECT_MARKER_ID,
            camera_mounted_on_top: false,
            detector: DetectorParams::default(),
            outputs: OutputConfig::default(),
        }
    }

    #[inline]
    pub fn pose_enabled(&self) -> bool {
        self.camera.is_some()
    }

    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if !(self.marker_length_m.is_finite() && self.marker_length_m > 0.0) {
            return Err(ConfigValidationError::InvalidMarkerLength(
                self.marker_length_m,
            ));
        }
        if self.ground_marker_id == self.object_marker_id {
            return Err(ConfigValidationError::SameMarkerIds(self.object_marker_id));
        }
        let len = self.dictionary.marker_count();
        for id in [self.object_marker_id, self.ground_marker_id] {
            if id >= len {
                return Err(ConfigValidationError::MarkerIdOutOfRange {
                    id,
                    dictionary: self.dictionary,
                    len,
                });
            }
        }
        Ok(())
    }
}
