// Audio module - in-memory PCM sources and the lock-free render path shared
// by every engine backend

pub mod clock;
pub mod renderer;
pub mod session;
pub mod source;

// Re-export commonly used types for convenience
pub use renderer::{RenderCommand, RenderStats, Renderer};
pub use session::{PlaybackSession, ResumePoint};
pub use source::PcmSource;
