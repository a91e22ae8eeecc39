pub mod compose;
pub mod geometry;
pub mod learning;
pub mod media;
pub mod render;
pub mod script;

pub use compose::{Composer, CompositionError, CompositionOutput, CompositionRequest, Transition};
pub use geometry::{Resolution, ResolutionPreset, VideoFormat};
pub use learning::{LearningEngine, LearningStore, Preference, PromptType};
pub use media::{MediaBackend, MediaError};
