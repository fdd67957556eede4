use std::fmt;
use std::str::FromStr;

pub const COCO_CLASSES: [&str; 80] = [
    "person", "bicycle", "car", "motorcycle", "airplane", "bus", "train", "truck", "boat",
    "traffic light", "fire hydrant", "stop sign", "parking meter", "bench", "bird", "cat", "dog",
    "horse", "sheep", "cow", "elephant", "bear", "zebra", "giraffe", "backpack", "umbrella",
    "handbag", "tie", "suitcase", "frisbee", "skis", "snowboard", "sports ball", "kite",
    "baseball bat", "baseball glove", "skateboard", "surfboard", "tennis racket", "bottle",
    "wine glass", "cup", "fork", "knife", "spoon", "bowl", "banana", "apple", "sandwich", "orange",
    "broccoli", "carrot", "hot dog", "pizza", "donut", "cake", "chair", "couch", "potted plant",
    "bed", "dining table", "toilet", "tv", "laptop", "mouse", "remote", "keyboard", "cell phone",
    "microwave", "oven", "toaster", "sink", "refrigerator", "book", "clock", "vase", "scissors",
    "teddy bear", "hair drier", "toothbrush",
];

/// car, motorcycle, bus, truck
pub const VEHICLE_CLASSES: [u16; 4] = [2, 3, 5, 7];
pub const PERSON_CLASSES: [u16; 1] = [0];

pub fn class_name(class_id: u16) -> &'static str {
    COCO_CLASSES
        .get(class_id as usize)
        .copied()
        .unwrap_or("object")
}

/// What the preview feed looks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DetectionTarget {
    #[default]
    Vehicles,
    People,
    /// Inference disabled.
    None,
}

impl DetectionTarget {
    pub fn classes(&self) -> &'static [u16] {
        match self {
            DetectionTarget::Vehicles => &VEHICLE_CLASSES,
            DetectionTarget::People => &PERSON_CLASSES,
            DetectionTarget::None => &[],
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DetectionTarget::Vehicles => "vehicles",
            DetectionTarget::People => "people",
            DetectionTarget::None => "none",
        }
    }
}

impl FromStr for DetectionTarget {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "vehicles" | "vehicle" | "cars" => Ok(DetectionTarget::Vehicles),
            "people" | "person" | "persons" => Ok(DetectionTarget::People),
            "none" | "off" | "" => Ok(DetectionTarget::None),
            other => Err(format!("unknown detection target {other:?}")),
        }
    }
}

impl fmt::Display for DetectionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
