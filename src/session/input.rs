use serde::Deserialize;
use std::time::{Duration, Instant};

use crate::labels::{GestureId, LabelSet, UnknownLabel};
use crate::models::{Frame, FrameTiming, Sample};

/// Why one input line could not become a frame.
#[derive(Debug, thiserror::Error)]
pub enum InputError {
    #[error("malformed frame record: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    UnknownLabel(#[from] UnknownLabel),
    /// The classifier produced a gesture the loaded label list does not know.
    #[error("gesture {0} is not in the loaded label set")]
    LabelOutsideSet(GestureId),
    #[error("pose frame needs either label+confidence or probabilities")]
    MissingPrediction,
    #[error("probability vector has {got} entries, label set has {expected}")]
    ProbabilityShape { got: usize, expected: usize },
    #[error("confidence {0} is outside [0, 1]")]
    InvalidConfidence(f32),
}

impl InputError {
    /// Contract violations between the classifier and the label set, as
    /// opposed to a garbled line.
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            InputError::LabelOutsideSet(_) | InputError::ProbabilityShape { .. }
        )
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
struct TimingRecord {
    hand_ms: Option<f64>,
    inference_ms: Option<f64>,
    frame_ms: Option<f64>,
}

impl TimingRecord {
    fn to_timing(self) -> FrameTiming {
        FrameTiming {
            hand_detection: self.hand_ms.and_then(millis),
            inference: self.inference_ms.and_then(millis),
            frame_total: self.frame_ms.and_then(millis),
        }
    }
}

fn millis(ms: f64) -> Option<Duration> {
    if ms < 0.0 {
        return None;
    }
    Duration::try_from_secs_f64(ms / 1000.0).ok()
}

/// One line of the capture side's output.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum FrameRecord {
    Pose {
        label: Option<String>,
        confidence: Option<f32>,
        probabilities: Option<Vec<f32>>,
        #[serde(flatten)]
        timing: TimingRecord,
    },
    NoHand {
        #[serde(flatten)]
        timing: TimingRecord,
    },
    MultipleHands {
        #[serde(flatten)]
        timing: TimingRecord,
    },
}

/// Decode one JSON line into a frame stamped at `now`. Blank lines yield
/// `Ok(None)`.
pub fn decode_line(line: &str, labels: &LabelSet, now: Instant) -> Result<Option<Frame>, InputError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let frame = match serde_json::from_str::<FrameRecord>(line)? {
        FrameRecord::NoHand { timing } => Frame::NoHand {
            timing: timing.to_timing(),
        },
        FrameRecord::MultipleHands { timing } => Frame::MultipleHands {
            timing: timing.to_timing(),
        },
        FrameRecord::Pose {
            label,
            confidence,
            probabilities,
            timing,
        } => {
            let (gesture, confidence) = match (label, confidence, probabilities) {
                (Some(label), Some(confidence), _) => {
                    let gesture: GestureId = label.parse()?;
                    if !labels.contains(gesture) {
                        return Err(InputError::LabelOutsideSet(gesture));
                    }
                    (gesture, confidence)
                }
                (None, _, Some(probabilities)) => {
                    if probabilities.len() != labels.len() {
                        return Err(InputError::ProbabilityShape {
                            got: probabilities.len(),
                            expected: labels.len(),
                        });
                    }
                    labels
                        .arg_max(&probabilities)
                        .ok_or(InputError::MissingPrediction)?
                }
                _ => return Err(InputError::MissingPrediction),
            };

            if !(0.0..=1.0).contains(&confidence) {
                return Err(InputError::InvalidConfidence(confidence));
            }

            Frame::Pose {
                sample: Sample::new(gesture, confidence, now),
                timing: timing.to_timing(),
            }
        }
    };
    Ok(Some(frame))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(line: &str) -> Result<Option<Frame>, InputError> {
        decode_line(line, &LabelSet::default(), Instant::now())
    }

    #[test]
    fn decodes_labelled_pose_with_timings() {
        let frame = decode(
            r#"{"kind":"pose","label":"play","confidence":0.91,"hand_ms":4.0,"inference_ms":0.5,"frame_ms":250.0}"#,
        )
        .unwrap()
        .unwrap();

        let Frame::Pose { sample, timing } = frame else {
            panic!("expected a pose frame, got {frame:?}");
        };
        assert_eq!(sample.label, GestureId::Play);
        assert_eq!(sample.confidence, 0.91);
        assert_eq!(timing.hand_detection, Some(Duration::from_millis(4)));
        assert_eq!(timing.inference, Some(Duration::from_micros(500)));
        assert_eq!(timing.frame_total, Some(Duration::from_millis(250)));
    }

    #[test]
    fn probabilities_pick_the_arg_max_label() {
        let labels = LabelSet::new(vec![GestureId::Play, GestureId::Pause, GestureId::Stop]).unwrap();
        let frame = decode_line(
            r#"{"kind":"pose","probabilities":[0.1,0.2,0.7]}"#,
            &labels,
            Instant::now(),
        )
        .unwrap()
        .unwrap();
        let Frame::Pose { sample, .. } = frame else {
            panic!("expected a pose frame");
        };
        assert_eq!(sample.label, GestureId::Stop);
        assert_eq!(sample.confidence, 0.7);

        let err = decode_line(r#"{"kind":"pose","probabilities":[0.5,0.5]}"#, &labels, Instant::now())
            .unwrap_err();
        assert!(err.is_contract_violation());
    }

    #[test]
    fn hand_absence_frames_carry_no_sample() {
        assert!(matches!(decode(r#"{"kind":"no_hand"}"#), Ok(Some(Frame::NoHand { .. }))));
        assert!(matches!(
            decode(r#"{"kind":"multiple_hands","frame_ms":31.0}"#),
            Ok(Some(Frame::MultipleHands { .. }))
        ));
        assert!(matches!(decode("   "), Ok(None)));
    }

    #[test]
    fn label_outside_the_set_is_a_contract_violation() {
        let labels = LabelSet::new(vec![GestureId::Play]).unwrap();
        let err = decode_line(
            r#"{"kind":"pose","label":"STOP","confidence":0.9}"#,
            &labels,
            Instant::now(),
        )
        .unwrap_err();
        assert!(matches!(err, InputError::LabelOutsideSet(GestureId::Stop)));
        assert!(err.is_contract_violation());
    }

    #[test]
    fn garbled_lines_are_rejected() {
        assert!(matches!(decode("{not json"), Err(InputError::Json(_))));
        assert!(matches!(decode(r#"{"kind":"wave"}"#), Err(InputError::Json(_))));
        assert!(matches!(
            decode(r#"{"kind":"pose","label":"WAVE","confidence":0.9}"#),
            Err(InputError::UnknownLabel(_))
        ));
        assert!(matches!(
            decode(r#"{"kind":"pose","label":"PLAY"}"#),
            Err(InputError::MissingPrediction)
        ));
        assert!(matches!(
            decode(r#"{"kind":"pose","label":"PLAY","confidence":1.4}"#),
            Err(InputError::InvalidConfidence(_))
        ));
    }
}
