pub mod client;
pub mod response;

pub use client::{PlaylistFilter, SearchKind, YouTubeClient};
