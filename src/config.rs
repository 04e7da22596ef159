//! Conversion settings.

use crate::image::ImageSettings;

/// Attribution page text used when none is configured.
pub const DEFAULT_ATTRIBUTION: &str = "This book made available by the Internet Archive.";

/// Configuration for one conversion run.
#[derive(Debug, Clone)]
pub struct ConvertConfig {
    /// Size, quality, and format of rendered pages.
    pub images: ImageSettings,
    /// For books whose scan data has no Title page: render every Normal page
    /// as an image instead of extracting its text.
    pub untitled_pages_as_images: bool,
    /// Text of the attribution page placed before the book text.
    pub attribution: String,
}

impl Default for ConvertConfig {
    fn default() -> Self {
        Self {
            images: ImageSettings::default(),
            untitled_pages_as_images: false,
            attribution: DEFAULT_ATTRIBUTION.to_string(),
        }
    }
}
