//! Utility functions shared across the engine.
//!
//! - **Image URL validation**: decides which byte-feed articles can be shown
//!
//! # Examples
//!
//! ```
//! use newsbyte::util::is_absolute_image_url;
//!
//! assert!(is_absolute_image_url("https://cdn.example.com/a.jpg"));
//! assert!(!is_absolute_image_url("/static/a.jpg"));
//! ```

mod image_url;

pub use image_url::{is_absolute_image_url, validate_image_url, ImageUrlError};

/// Maximum allowed search query length, in characters
pub const MAX_SEARCH_QUERY_LENGTH: usize = 256;
