use crate::{error::Result, video::Frame};

/// Detector output boxes are in pixels of the frame they were found in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundingBox {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl BoundingBox {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn area(&self) -> i64 {
        self.width as i64 * self.height as i64
    }
}

/// Screen point to steer towards plus a size metric used to hold distance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TargetPoint {
    pub x: f32,
    pub y: f32,
    pub size: f32,
}

/// How a box is turned into a distance signal. Both variants land in a
/// comparable numeric range so one setpoint works for either detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DistanceMetric {
    /// Faces: aim at the box centre, size is the box height.
    #[default]
    BoxHeight,
    /// People: aim at the upper third, size is box area per mille of the frame.
    AreaRatio,
}

const AREA_RATIO_SCALE: f32 = 1000.0;

impl DistanceMetric {
    pub fn target(&self, b: &BoundingBox, frame_size: (u32, u32)) -> TargetPoint {
        let x = b.x as f32 + b.width as f32 / 2.0;
        match self {
            DistanceMetric::BoxHeight => TargetPoint {
                x,
                y: b.y as f32 + b.height as f32 / 2.0,
                size: b.height as f32,
            },
            DistanceMetric::AreaRatio => {
                let frame_area = (frame_size.0 as f32 * frame_size.1 as f32).max(1.0);
                TargetPoint {
                    x,
                    y: b.y as f32 + b.height as f32 / 3.0,
                    size: (b.area() as f32 / frame_area * AREA_RATIO_SCALE).trunc(),
                }
            }
        }
    }
}

/// Zero or more boxes. Multi-class detectors may pick the target themselves.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Detections {
    pub boxes: Vec<BoundingBox>,
    pub target: Option<TargetPoint>,
}

impl Detections {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn from_boxes(boxes: Vec<BoundingBox>) -> Self {
        Self {
            boxes,
            target: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty() && self.target.is_none()
    }

    /// Target chosen by the detector, else derived from the first box.
    pub fn target_point(&self, metric: DistanceMetric, frame_size: (u32, u32)) -> Option<TargetPoint> {
        self.target
            .or_else(|| self.boxes.first().map(|b| metric.target(b, frame_size)))
    }
}

/// Object detector run by the follow controller. Inference itself lives
/// outside this crate; implementors only adapt their output.
pub trait Detector: Send {
    fn detect(&mut self, frame: &Frame) -> Result<Detections>;
}

impl<F> Detector for F
where
    F: FnMut(&Frame) -> Result<Detections> + Send,
{
    fn detect(&mut self, frame: &Frame) -> Result<Detections> {
        self(frame)
    }
}
