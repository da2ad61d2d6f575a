pub mod face;
pub mod geometry;
pub mod model;
pub mod overlay;
pub mod pipeline;
pub mod tensor;
pub mod video;
pub mod yolo;
pub mod yunet;

// Re-export commonly used types
pub use face::{Detection, Embedding};
pub use pipeline::FacePipeline;
pub use video::Camera;
pub use yolo::{ObjectDetection, ObjectDetector};
