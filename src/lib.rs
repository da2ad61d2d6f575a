pub mod aggregator;
pub mod backend;
pub mod capability;
pub mod config;
pub mod dispatch;
pub mod display;
pub mod error;
pub mod gallery;
pub mod matcher;
pub mod monitor;
pub mod reporter;
pub mod session;

pub use aggregator::{ComplianceState, ComplianceStatus, CompliancePolicy, DetectionEvent};
pub use capability::{DetectionResult, EmbeddingResult, FaceAnalyzer, FaceBox, ObjectDetector};
pub use error::SessionError;
pub use gallery::{Gallery, ReferenceIdentity};
pub use matcher::{FaceMatch, FaceName, IdentityMatcher};
pub use monitor::{Monitor, MonitorSettings};
pub use session::Session;
