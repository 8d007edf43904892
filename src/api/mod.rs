//! Client side of the remote content API.
//!
//! - [`ContentApi`] - feed, search and single-article reads
//! - [`RemoteEngagementGateway`] - like, bookmark and view-tracking mutations
//! - [`ContentClient`] - `reqwest` implementation of both traits
//!
//! The engine only depends on the traits, so tests substitute in-process
//! fakes for the HTTP client.

mod client;
mod gateway;
mod types;

pub use client::ContentClient;
pub use gateway::{
    ApiError, ContentApi, FeedParams, PersonalizedParams, RemoteEngagementGateway, SearchParams,
};
pub use types::{Article, ArticleId, ArticleRef};
