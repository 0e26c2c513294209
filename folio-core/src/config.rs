//! Codec configuration and the collaborators codecs call out to

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Tunables shared by every codec
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CodecOptions {
    /// Archives larger than this (in bytes) only eagerly load the entries
    /// needed for metadata; everything else is read on demand
    pub lazy_entry_threshold: u64,

    /// Number of leading bytes scanned for an HTML `<head>`
    pub html_head_window: usize,

    /// JPEG quality used when transcoding covers into PDF thumbnails
    pub thumbnail_jpeg_quality: u8,

    /// File stem for newly attached cover images
    pub cover_file_stem: String,
}

impl Default for CodecOptions {
    fn default() -> Self {
        Self {
            lazy_entry_threshold: 10 * 1024 * 1024,
            html_head_window: 16 * 1024,
            thumbnail_jpeg_quality: 85,
            cover_file_stem: "cover".to_string(),
        }
    }
}

impl CodecOptions {
    /// Load options from a JSON document; missing keys keep their defaults
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

/// Hook into an external file-watch service
///
/// Writers suspend refresh notifications while a temporary file exists
/// next to the resource being rewritten.
pub trait RefreshControl: Send + Sync {
    fn suspend(&self);
    fn resume(&self);
}

/// Answer to an EPUB cover conflict
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoverDecision {
    /// Replace the bytes of the existing cover image
    Overwrite,
    /// Keep the old image and attach the new one as a second image
    AddNew,
    /// Leave the cover as it is; the rest of the write proceeds
    Cancel,
}

/// Decides what to do when a new cover differs from the existing one
pub trait CoverConflictResolver: Send + Sync {
    fn resolve(&self, resource_name: &str, existing_href: &str) -> CoverDecision;
}

/// Resolver that always answers with the same decision
#[derive(Debug, Clone, Copy)]
pub struct FixedCoverDecision(pub CoverDecision);

impl CoverConflictResolver for FixedCoverDecision {
    fn resolve(&self, _resource_name: &str, _existing_href: &str) -> CoverDecision {
        self.0
    }
}

/// Options plus the external collaborators, handed to every codec
#[derive(Clone)]
pub struct CodecContext {
    pub options: CodecOptions,
    pub refresh: Option<Arc<dyn RefreshControl>>,
    pub cover_conflicts: Arc<dyn CoverConflictResolver>,
}

impl CodecContext {
    pub fn new(options: CodecOptions) -> Self {
        Self {
            options,
            refresh: None,
            cover_conflicts: Arc::new(FixedCoverDecision(CoverDecision::Overwrite)),
        }
    }

    pub fn with_refresh_control(mut self, refresh: Arc<dyn RefreshControl>) -> Self {
        self.refresh = Some(refresh);
        self
    }

    pub fn with_cover_resolver(mut self, resolver: Arc<dyn CoverConflictResolver>) -> Self {
        self.cover_conflicts = resolver;
        self
    }
}

impl Default for CodecContext {
    fn default() -> Self {
        Self::new(CodecOptions::default())
    }
}

impl fmt::Debug for CodecContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodecContext")
            .field("options", &self.options)
            .field("refresh", &self.refresh.is_some())
            .finish_non_exhaustive()
    }
}

/// Suspends refresh notifications until dropped
pub(crate) struct RefreshPause {
    control: Option<Arc<dyn RefreshControl>>,
}

impl RefreshPause {
    pub(crate) fn new(control: Option<Arc<dyn RefreshControl>>) -> Self {
        if let Some(control) = &control {
            control.suspend();
        }
        Self { control }
    }
}

impl Drop for RefreshPause {
    fn drop(&mut self) {
        if let Some(control) = &self.control {
            control.resume();
        }
    }
}
