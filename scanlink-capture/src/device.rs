//! The capture device seam.
//!
//! Real deployments wrap a camera here; tests inject a fake. The
//! scheduler only ever sees this trait, which is what makes the loop
//! testable without hardware.

use async_trait::async_trait;
use scanlink_core::ScanlinkError;

/// One captured, already-encoded image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Encoded image bytes (whatever the decode capability accepts).
    pub data: Vec<u8>,
}

impl Frame {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }
}

/// A source of frames backed by an acquirable device.
#[async_trait]
pub trait FrameSource: Send {
    /// Take exclusive hold of the device. Fails with
    /// [`ScanlinkError::Device`] when the hardware is unavailable.
    async fn acquire(&mut self) -> Result<(), ScanlinkError>;

    /// Grab and encode the current frame.
    async fn snapshot(&mut self) -> Result<Frame, ScanlinkError>;

    /// Release the device. Must be safe to call after a failed
    /// `acquire`.
    async fn release(&mut self);
}
