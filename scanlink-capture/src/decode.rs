//! The external decode capability seam.
//!
//! The real implementation posts the frame to an image-scan service
//! and maps its `{ upc, extension }` response into a [`ScannedItem`];
//! accuracy and latency are its problem. The scheduler only depends on
//! this contract: success, failure, or never answering (which the
//! scheduler bounds with its own timeout).

use async_trait::async_trait;
use scanlink_core::{ScanlinkError, ScannedItem};

use crate::device::Frame;

/// Decode a frame into an item, or fail with
/// [`ScanlinkError::Decode`].
#[async_trait]
pub trait BarcodeDecoder: Send + Sync {
    async fn decode(&self, frame: Frame) -> Result<ScannedItem, ScanlinkError>;
}
