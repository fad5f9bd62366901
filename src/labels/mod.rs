//! Gesture identifiers and the classifier label list.

mod set;

pub use set::LabelSet;

use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Closed set of actions the classifier can name.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GestureId {
    Play,
    Pause,
    VolumeUp,
    VolumeDown,
    SkipLeft,
    SkipRight,
    Next,
    Previous,
    Stop,
}

impl GestureId {
    pub const ALL: [GestureId; 9] = [
        GestureId::Play,
        GestureId::Pause,
        GestureId::VolumeUp,
        GestureId::VolumeDown,
        GestureId::SkipLeft,
        GestureId::SkipRight,
        GestureId::Next,
        GestureId::Previous,
        GestureId::Stop,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            GestureId::Play => "PLAY",
            GestureId::Pause => "PAUSE",
            GestureId::VolumeUp => "VOLUME_UP",
            GestureId::VolumeDown => "VOLUME_DOWN",
            GestureId::SkipLeft => "SKIP_LEFT",
            GestureId::SkipRight => "SKIP_RIGHT",
            GestureId::Next => "NEXT",
            GestureId::Previous => "PREVIOUS",
            GestureId::Stop => "STOP",
        }
    }
}

impl fmt::Display for GestureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown gesture label {0:?}")]
pub struct UnknownLabel(pub String);

impl FromStr for GestureId {
    type Err = UnknownLabel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase();
        GestureId::ALL
            .into_iter()
            .find(|gesture| gesture.as_str() == normalized)
            .ok_or_else(|| UnknownLabel(s.trim().to_string()))
    }
}

/// One row of the guidance table shown while a help episode is active.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct GestureGuide {
    pub gesture: GestureId,
    pub hand_position: &'static str,
    pub hand_required: &'static str,
}

pub const GESTURE_GUIDE: [GestureGuide; 8] = [
    GestureGuide { gesture: GestureId::Play, hand_position: "Index & middle fingers up", hand_required: "Either" },
    GestureGuide { gesture: GestureId::Pause, hand_position: "Open palm", hand_required: "Either" },
    GestureGuide { gesture: GestureId::VolumeUp, hand_position: "Index finger up", hand_required: "Either" },
    GestureGuide { gesture: GestureId::VolumeDown, hand_position: "Index finger down", hand_required: "Either" },
    GestureGuide { gesture: GestureId::SkipRight, hand_position: "Thumb up + index,middle -->", hand_required: "LEFT hand" },
    GestureGuide { gesture: GestureId::SkipLeft, hand_position: "Thumb up + index,middle <--", hand_required: "RIGHT hand" },
    GestureGuide { gesture: GestureId::Next, hand_position: "Thumb up + index -->", hand_required: "LEFT hand" },
    GestureGuide { gesture: GestureId::Previous, hand_position: "Thumb up + index <--", hand_required: "RIGHT hand" },
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_labels_case_insensitively() {
        assert_eq!("volume_up".parse::<GestureId>(), Ok(GestureId::VolumeUp));
        assert_eq!(" STOP \n".parse::<GestureId>(), Ok(GestureId::Stop));
        assert_eq!(
            "THUMBS_UP".parse::<GestureId>(),
            Err(UnknownLabel("THUMBS_UP".into()))
        );
    }

    #[test]
    fn serializes_as_screaming_snake_case() {
        let json = serde_json::to_string(&GestureId::SkipRight).unwrap();
        assert_eq!(json, "\"SKIP_RIGHT\"");
        for gesture in GestureId::ALL {
            assert_eq!(gesture.to_string().parse::<GestureId>(), Ok(gesture));
        }
    }
}
