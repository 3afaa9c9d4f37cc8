//! Export Stream - incremental access to a partially parsed export
//!
//! An [`ExportSource`] exposes the export structure parsed so far and grows
//! it on demand:
//! - `pull(budget)` reads up to `budget` more bytes and parses them
//! - `done()` the top-level document has been fully parsed
//! - `eof()` the byte source is exhausted

pub mod json;
pub mod scanner;

pub use json::JsonExportStream;

use async_trait::async_trait;
use crate::Result;
use crate::export::ExportEnvelope;

/// Lazily parsed export, grown one chunk at a time
#[async_trait]
pub trait ExportSource: Send {
    /// Read up to `byte_budget` more bytes and append newly parsed structure
    async fn pull(&mut self, byte_budget: usize) -> Result<()>;

    /// No more pulls will ever be needed
    fn done(&self) -> bool;

    /// The byte source is exhausted, whether or not parsing finished
    fn eof(&self) -> bool;

    /// Structure parsed so far
    fn result(&self) -> &ExportEnvelope;

    /// Mutable view, used by the importer to drain row buffers in place
    fn result_mut(&mut self) -> &mut ExportEnvelope;
}
