//! Per-frame robot entity assembled from car and armor detections.

use std::fmt;

use nalgebra::{DVector, Point3};

use crate::rect::Rect;
use crate::tracker::{Track, TrackState};

/// A single detector output box.
///
/// `(x, y)` is the top-left corner in pixels. For armor detections the
/// coordinates are local to the car crop they were detected in.
#[derive(Debug, Clone, Copy)]
pub struct Detection {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    /// Class id assigned by the detector
    pub label: i32,
    /// Detection confidence in [0, 1]
    pub confidence: f32,
}

impl Detection {
    pub fn new(x: f32, y: f32, width: f32, height: f32, label: i32, confidence: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
            label,
            confidence,
        }
    }

    #[inline]
    pub fn rect(&self) -> Rect {
        Rect::new(self.x, self.y, self.width, self.height)
    }
}

/// Team color of a robot class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Color {
    Blue,
    Red,
}

/// The twelve competition classes the armor detector reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Label {
    BlueHero = 0,
    BlueEngineer = 1,
    BlueInfantryThree = 2,
    BlueInfantryFour = 3,
    BlueInfantryFive = 4,
    BlueSentry = 5,
    RedHero = 6,
    RedEngineer = 7,
    RedInfantryThree = 8,
    RedInfantryFour = 9,
    RedInfantryFive = 10,
    RedSentry = 11,
}

impl Label {
    pub fn from_index(index: i32) -> Option<Label> {
        use Label::*;
        match index {
            0 => Some(BlueHero),
            1 => Some(BlueEngineer),
            2 => Some(BlueInfantryThree),
            3 => Some(BlueInfantryFour),
            4 => Some(BlueInfantryFive),
            5 => Some(BlueSentry),
            6 => Some(RedHero),
            7 => Some(RedEngineer),
            8 => Some(RedInfantryThree),
            9 => Some(RedInfantryFour),
            10 => Some(RedInfantryFive),
            11 => Some(RedSentry),
            _ => None,
        }
    }

    pub fn color(&self) -> Color {
        if (*self as i32) < 6 {
            Color::Blue
        } else {
            Color::Red
        }
    }

    /// Referee-system robot id for this class (blue ids are offset by 100).
    pub fn referee_id(&self) -> u16 {
        use Label::*;
        let base = match self {
            BlueHero | RedHero => 1,
            BlueEngineer | RedEngineer => 2,
            BlueInfantryThree | RedInfantryThree => 3,
            BlueInfantryFour | RedInfantryFour => 4,
            BlueInfantryFive | RedInfantryFive => 5,
            BlueSentry | RedSentry => 7,
        };
        match self.color() {
            Color::Blue => base + 100,
            Color::Red => base,
        }
    }
}

/// One robot observation for the current frame.
///
/// Every field is independently optional: a robot can carry a car box with
/// no recognized armors (not detected), or a box that the locator failed to
/// place in 3-D (not located). The tracker writes identity back through
/// [`Robot::set_track`].
#[derive(Debug, Clone, Default)]
pub struct Robot {
    rect: Option<Rect>,
    label: Option<i32>,
    confidence: Option<f32>,
    armors: Option<Vec<Detection>>,
    location: Option<Point3<f32>>,
    track_state: Option<TrackState>,
}

impl Robot {
    /// Assemble a robot from a car detection and the armor detections found
    /// inside its crop (armor coordinates local to the crop).
    ///
    /// Armors whose boxes do not fit inside the car rectangle are discarded;
    /// a box touching the edge still counts as inside. With no surviving
    /// armors the robot keeps its rect but stays undetected.
    pub fn new(car: &Detection, armors: &[Detection]) -> Self {
        let car_rect = car.rect();
        let local_bounds = Rect::new(0.0, 0.0, car_rect.width, car_rect.height);

        let armors: Vec<Detection> = armors
            .iter()
            .filter(|armor| local_bounds.contains_rect(&armor.rect()))
            .copied()
            .collect();

        let mut robot = Robot {
            rect: Some(car_rect),
            ..Default::default()
        };

        if armors.is_empty() {
            return robot;
        }

        // Vote: the label with the largest summed confidence wins, and the
        // robot confidence is the mean over the winning-label armors.
        let mut score_map = std::collections::BTreeMap::<i32, f32>::new();
        for armor in &armors {
            *score_map.entry(armor.label).or_insert(0.0) += armor.confidence;
        }
        let Some((&label, &score)) = score_map.iter().max_by(|a, b| a.1.total_cmp(b.1)) else {
            return robot;
        };
        let count = armors.iter().filter(|a| a.label == label).count();

        robot.label = Some(label);
        robot.confidence = Some(score / count as f32);
        robot.armors = Some(
            armors
                .into_iter()
                .map(|mut armor| {
                    armor.x += car.x;
                    armor.y += car.y;
                    armor
                })
                .collect(),
        );
        robot
    }

    #[inline]
    pub fn is_detected(&self) -> bool {
        self.label.is_some()
    }

    #[inline]
    pub fn is_located(&self) -> bool {
        self.location.is_some()
    }

    pub fn rect(&self) -> Option<Rect> {
        self.rect
    }

    pub fn label(&self) -> Option<i32> {
        self.label
    }

    pub fn confidence(&self) -> Option<f32> {
        self.confidence
    }

    pub fn armors(&self) -> Option<&[Detection]> {
        self.armors.as_deref()
    }

    pub fn location(&self) -> Option<Point3<f32>> {
        self.location
    }

    pub fn track_state(&self) -> Option<TrackState> {
        self.track_state
    }

    pub fn set_location(&mut self, location: Point3<f32>) {
        self.location = Some(location);
    }

    /// Copy identity from an associated track.
    ///
    /// A confirmed track is trusted over the per-frame observation and
    /// overwrites label and location; a tentative one only fills gaps.
    pub fn set_track(&mut self, track: &Track) {
        self.track_state = Some(track.state());
        if track.state() == TrackState::Confirmed {
            self.label = Some(track.label());
            self.location = Some(track.location());
        } else {
            if self.label.is_none() {
                self.label = Some(track.label());
            }
            if self.location.is_none() {
                self.location = Some(track.location());
            }
        }
    }

    /// Class-confidence distribution over `class_num` labels, L1-normalized.
    ///
    /// Returns the zero vector when the robot carries no armors or every
    /// armor confidence is zero.
    pub fn feature(&self, class_num: usize) -> DVector<f32> {
        let mut feature = DVector::zeros(class_num);
        let Some(armors) = &self.armors else {
            return feature;
        };

        for armor in armors {
            let label = armor.label as usize;
            if label < class_num {
                feature[label] += armor.confidence;
            }
        }

        let sum = feature.sum();
        if sum == 0.0 {
            return feature;
        }
        feature / sum
    }
}

impl fmt::Display for Robot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn opt<T: fmt::Debug>(value: &Option<T>) -> String {
            value
                .as_ref()
                .map_or_else(|| "None".to_string(), |v| format!("{v:?}"))
        }

        write!(
            f,
            "Robot {{ label: {}, rect: {}, confidence: {}, state: {}, location: {} }}",
            opt(&self.label),
            opt(&self.rect),
            opt(&self.confidence),
            opt(&self.track_state),
            opt(&self.location),
        )
    }
}
