use marker_relay_core::RelationResult;
use serde::{Deserialize, Serialize};

/// Per-frame telemetry record, built from a [`RelationResult`] and sent once.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TelemetryMessage {
    pub pos: [f64; 3],
    pub angle: f64,
    pub detect: bool,
}

impl TelemetryMessage {
    pub fn not_detected() -> Self {
        Self {
            pos: [0.0; 3],
            angle: 0.0,
            detect: false,
        }
    }

    /// Wire text. Every float uses the same six-decimal fixed-point format.
    pub fn to_wire(&self) -> String {
        let [x, y, z] = self.pos;
        format!(
            "{{\"pos\": [{x:.6}, {y:.6}, {z:.6}], \"angle\": {:.6}, \"detect\": {}}}",
            self.angle, self.detect
        )
    }

    /// One CSV log row (no line terminator).
    pub fn log_row(&self) -> String {
        if !self.detect {
            return "0, 0, 0, 0".to_string();
        }
        let [x, y, z] = self.pos;
        format!("{x}, {y}, {z}, {}", self.angle)
    }
}

impl From<&RelationResult> for TelemetryMessage {
    fn from(result: &RelationResult) -> Self {
        if !result.detected {
            return Self::not_detected();
        }
        Self {
            pos: [result.position.x, result.position.y, result.position.z],
            angle: result.heading_degrees,
            detect: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Vector3;

    #[test]
    fn wire_format_is_fixed_point() {
        let msg = TelemetryMessage {
            pos: [0.1, -2.0, 1.5],
            angle: 45.0,
            detect: true,
        };
        assert_eq!(
            msg.to_wire(),
            r#"{"pos": [0.100000, -2.000000, 1.500000], "angle": 45.000000, "detect": true}"#
        );
        let back: TelemetryMessage = serde_json::from_str(&msg.to_wire()).expect("valid json");
        assert_eq!(back, msg);
    }

    #[test]
    fn undetected_result_is_all_zero() {
        let mut result = RelationResult::not_detected();
        // a stale position must never leak into a non-detection
        result.position = Vector3::new(1.0, 2.0, 3.0);
        result.heading_degrees = 12.0;
        let msg = TelemetryMessage::from(&result);
        assert_eq!(msg, TelemetryMessage::not_detected());
        assert_eq!(
            msg.to_wire(),
            r#"{"pos": [0.000000, 0.000000, 0.000000], "angle": 0.000000, "detect": false}"#
        );
        assert_eq!(msg.log_row(), "0, 0, 0, 0");
    }

    #[test]
    fn detected_log_row_uses_plain_numbers() {
        let msg = TelemetryMessage {
            pos: [0.25, -0.5, 2.0],
            angle: -30.5,
            detect: true,
        };
        assert_eq!(msg.log_row(), "0.25, -0.5, 2, -30.5");
    }
}
