//! Feed composition and engagement state for the NewsByte reader.
//!
//! The crate is split the way the reader uses it:
//!
//! - [`feed`] decides which articles to request and loads them
//! - [`engagement`] owns liked/saved state with optimistic updates
//! - [`viewport`] picks the current byte in the vertical feed
//! - [`api`] talks to the content API
//! - [`storage`] keeps guest preferences and anonymous engagement on disk

pub mod api;
pub mod config;
pub mod engagement;
pub mod feed;
pub mod storage;
pub mod util;
pub mod viewport;
