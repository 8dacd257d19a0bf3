//! YouTube Data API v3 client.
//!
//! Wraps the five read endpoints (plus search) behind an ordered credential
//! pool: every call walks the pool from the start and returns the first
//! successful response, so a quota-exhausted key degrades to the next one.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::de::DeserializeOwned;
use tracing::warn;

use crate::models::{ChannelRow, CommentRow, PlaylistRow, VideoRow};
use crate::normalize::{normalize_timestamp, parse_duration};
use crate::youtube::response::{
    ChannelItem, ChannelListResponse, CommentThreadItem, CommentThreadListResponse,
    PlaylistItem, PlaylistItemListResponse, PlaylistListResponse, SearchListResponse,
    VideoItem, VideoListResponse,
};

const YOUTUBE_API_BASE: &str = "https://www.googleapis.com/youtube/v3";

// Listing endpoints cap pages at 50 items; comment threads allow 100.
const PAGE_SIZE: &str = "50";
const COMMENT_PAGE_SIZE: &str = "100";

/// How a playlist listing is scoped.
#[derive(Debug, Clone)]
pub enum PlaylistFilter {
    /// Every playlist owned by a channel.
    ForChannel(String),
    /// Specific playlists by comma-joined id list.
    ById(String),
}

/// Resource kind for `/search`.
#[derive(Debug, Clone, Copy)]
pub enum SearchKind {
    Channel,
    Playlist,
    Video,
}

impl SearchKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SearchKind::Channel => "channel",
            SearchKind::Playlist => "playlist",
            SearchKind::Video => "video",
        }
    }
}

struct ApiHandle {
    http: reqwest::blocking::Client,
    key: String,
}

impl ApiHandle {
    fn get<T: DeserializeOwned>(&self, endpoint: &str, params: &[(&str, &str)]) -> Result<T> {
        let url = format!("{YOUTUBE_API_BASE}/{endpoint}");
        let response = self
            .http
            .get(&url)
            .query(params)
            .query(&[("key", self.key.as_str())])
            .send()
            .with_context(|| format!("GET /{endpoint} failed"))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().unwrap_or_default();
            bail!("GET /{endpoint} {status}: {text}");
        }

        response
            .json::<T>()
            .with_context(|| format!("failed to parse /{endpoint} response"))
    }
}

pub struct YouTubeClient {
    handles: Vec<ApiHandle>,
}

impl YouTubeClient {
    /// One underlying handle per credential, in pool order.
    pub fn new(api_keys: Vec<String>) -> Self {
        let handles = api_keys
            .into_iter()
            .map(|key| ApiHandle {
                http: reqwest::blocking::Client::builder()
                    .timeout(Duration::from_secs(30))
                    .user_agent("tubescope/0.1")
                    .build()
                    .unwrap_or_else(|_| reqwest::blocking::Client::new()),
                key,
            })
            .collect();
        Self { handles }
    }

    // Walks the credential pool in order; the first success wins. When the
    // whole pool fails the call yields nothing, and callers must treat an
    // empty result as a possible outcome rather than proof of emptiness.
    fn request<T: DeserializeOwned>(&self, endpoint: &str, params: &[(&str, &str)]) -> Option<T> {
        for (idx, handle) in self.handles.iter().enumerate() {
            match handle.get(endpoint, params) {
                Ok(parsed) => return Some(parsed),
                Err(e) => warn!("GET /{endpoint} failed on credential {idx}: {e:#}"),
            }
        }
        warn!("GET /{endpoint}: every credential in the pool failed");
        None
    }

    pub fn channel_list(&self, channel_id: &str) -> Option<ChannelListResponse> {
        self.request(
            "channels",
            &[
                ("part", "snippet,contentDetails,statistics"),
                ("id", channel_id),
            ],
        )
    }

    pub fn playlists_list(
        &self,
        filter: &PlaylistFilter,
        page_token: Option<&str>,
    ) -> Option<PlaylistListResponse> {
        let mut params = vec![
            ("part", "snippet,contentDetails"),
            ("maxResults", PAGE_SIZE),
        ];
        match filter {
            PlaylistFilter::ForChannel(channel_id) => params.push(("channelId", channel_id)),
            PlaylistFilter::ById(ids) => params.push(("id", ids)),
        }
        if let Some(token) = page_token {
            params.push(("pageToken", token));
        }
        self.request("playlists", &params)
    }

    pub fn playlist_items_list(
        &self,
        playlist_id: &str,
        page_token: Option<&str>,
    ) -> Option<PlaylistItemListResponse> {
        let mut params = vec![
            ("part", "snippet,status"),
            ("maxResults", PAGE_SIZE),
            ("playlistId", playlist_id),
        ];
        if let Some(token) = page_token {
            params.push(("pageToken", token));
        }
        self.request("playlistItems", &params)
    }

    pub fn videos_list(&self, video_ids: &str) -> Option<VideoListResponse> {
        self.request(
            "videos",
            &[
                ("part", "snippet,contentDetails,statistics"),
                ("id", video_ids),
            ],
        )
    }

    pub fn comment_threads_list(&self, channel_id: &str) -> Option<CommentThreadListResponse> {
        self.request(
            "commentThreads",
            &[
                ("part", "id,replies,snippet"),
                ("maxResults", COMMENT_PAGE_SIZE),
                ("allThreadsRelatedToChannelId", channel_id),
            ],
        )
    }

    pub fn search_list(&self, query: &str, kind: SearchKind) -> Option<SearchListResponse> {
        self.request(
            "search",
            &[
                ("part", "snippet"),
                ("type", kind.as_str()),
                ("maxResults", PAGE_SIZE),
                ("q", query),
            ],
        )
    }

    /// One flat row per channel in the lookup response.
    pub fn get_channels_table(&self, channel_id: &str) -> Vec<ChannelRow> {
        let Some(response) = self.channel_list(channel_id) else {
            return Vec::new();
        };
        response.items.iter().map(flatten_channel).collect()
    }

    /// Playlist rows concatenated across every page of the listing.
    pub fn get_playlists_table(&self, filter: &PlaylistFilter) -> Vec<PlaylistRow> {
        let Some(mut response) = self.playlists_list(filter, None) else {
            return Vec::new();
        };
        let mut rows: Vec<PlaylistRow> = response.items.iter().map(flatten_playlist).collect();

        while let Some(token) = response.next_page_token.take() {
            match self.playlists_list(filter, Some(&token)) {
                Some(next) => {
                    response = next;
                    rows.extend(response.items.iter().map(flatten_playlist));
                }
                None => break,
            }
        }
        rows
    }

    /// Two-stage fetch: page through the playlist's items collecting video
    /// ids, batch-fetch full metadata per page, then stamp the playlist id
    /// onto the flattened rows. An empty playlist yields an empty vector
    /// with no post-processing.
    pub fn get_videos_table(&self, playlist_id: &str) -> Vec<VideoRow> {
        let Some(mut page) = self.playlist_items_list(playlist_id, None) else {
            return Vec::new();
        };

        let mut items: Vec<VideoItem> = Vec::new();
        loop {
            let ids: Vec<&str> = page
                .items
                .iter()
                .map(|entry| entry.snippet.resource_id.video_id.as_str())
                .filter(|id| !id.is_empty())
                .collect();
            if !ids.is_empty() {
                if let Some(videos) = self.videos_list(&ids.join(",")) {
                    items.extend(videos.items);
                }
            }

            match page.next_page_token.take() {
                Some(token) => match self.playlist_items_list(playlist_id, Some(&token)) {
                    Some(next) => page = next,
                    None => break,
                },
                None => break,
            }
        }

        if items.is_empty() {
            return Vec::new();
        }
        items
            .iter()
            .map(|item| {
                let mut row = flatten_video(item);
                row.playlist_id = playlist_id.to_string();
                row
            })
            .collect()
    }

    /// One row per thread's top-level comment. Single page only; the
    /// endpoint's continuation token is not followed.
    pub fn get_comments_table(&self, channel_id: &str) -> Vec<CommentRow> {
        let Some(response) = self.comment_threads_list(channel_id) else {
            return Vec::new();
        };
        response.items.iter().map(flatten_comment).collect()
    }
}

// Explicit per-entity projections from the nested response shapes into the
// flat row schema. Absent counters default to zero.

fn parse_count(raw: &Option<String>) -> i64 {
    raw.as_deref().and_then(|s| s.parse().ok()).unwrap_or(0)
}

fn flatten_channel(item: &ChannelItem) -> ChannelRow {
    ChannelRow {
        id: item.id.clone(),
        thumbnails: item.snippet.thumbnails.default.url.clone(),
        title: item.snippet.title.clone(),
        description: item.snippet.description.clone(),
        view_count: parse_count(&item.statistics.view_count),
        subscriber_count: parse_count(&item.statistics.subscriber_count),
        video_count: parse_count(&item.statistics.video_count),
        uploads: item.content_details.related_playlists.uploads.clone(),
    }
}

fn flatten_playlist(item: &PlaylistItem) -> PlaylistRow {
    PlaylistRow {
        id: item.id.clone(),
        channel_id: item.snippet.channel_id.clone(),
        thumbnails: item.snippet.thumbnails.default.url.clone(),
        title: item.snippet.title.clone(),
        description: item.snippet.description.clone(),
        published_at: item.snippet.published_at.clone(),
        item_count: item.content_details.item_count.unwrap_or(0),
    }
}

fn flatten_video(item: &VideoItem) -> VideoRow {
    VideoRow {
        id: item.id.clone(),
        channel_id: item.snippet.channel_id.clone(),
        playlist_id: String::new(),
        thumbnails: item.snippet.thumbnails.default.url.clone(),
        title: item.snippet.title.clone(),
        description: item.snippet.description.clone(),
        published_at: normalize_timestamp(&item.snippet.published_at),
        duration: parse_duration(&item.content_details.duration),
        view_count: parse_count(&item.statistics.view_count),
        like_count: parse_count(&item.statistics.like_count),
        dislike_count: parse_count(&item.statistics.dislike_count),
        comment_count: parse_count(&item.statistics.comment_count),
    }
}

fn flatten_comment(item: &CommentThreadItem) -> CommentRow {
    let top = &item.snippet.top_level_comment.snippet;
    CommentRow {
        id: item.id.clone(),
        channel_id: item.snippet.channel_id.clone(),
        video_id: item.snippet.video_id.clone(),
        author_profile_image: top.author_profile_image_url.clone(),
        text_display: top.text_display.clone(),
        text_original: top.text_original.clone(),
        like_count: top.like_count,
        published_at: top.published_at.clone(),
        updated_at: top.updated_at.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn one_handle_per_credential() {
        let client = YouTubeClient::new(vec!["key-a".to_string(), "key-b".to_string()]);
        assert_eq!(client.handles.len(), 2);
    }

    #[test]
    fn exhausted_pool_yields_empty_tables() {
        // With no credentials every primitive fails over to nothing, and
        // the table getters must hand back empty vectors, not errors.
        let client = YouTubeClient::new(Vec::new());
        assert!(client.get_channels_table("UCabc").is_empty());
        assert!(client.get_videos_table("PLabc").is_empty());
        assert!(client.get_comments_table("UCabc").is_empty());
        assert!(client
            .get_playlists_table(&PlaylistFilter::ForChannel("UCabc".into()))
            .is_empty());
    }

    #[test]
    fn flattens_channel_response() {
        let raw = r#"{
            "kind": "youtube#channelListResponse",
            "items": [{
                "id": "UCabc",
                "snippet": {
                    "title": "A Channel",
                    "description": "About things",
                    "thumbnails": {"default": {"url": "https://yt3.ggpht.com/x"}}
                },
                "contentDetails": {"relatedPlaylists": {"uploads": "UUabc"}},
                "statistics": {
                    "viewCount": "12345",
                    "subscriberCount": "678",
                    "videoCount": "90"
                }
            }]
        }"#;
        let response: ChannelListResponse = serde_json::from_str(raw).unwrap();
        let rows: Vec<ChannelRow> = response.items.iter().map(flatten_channel).collect();

        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.id, "UCabc");
        assert_eq!(row.thumbnails, "https://yt3.ggpht.com/x");
        assert_eq!(row.view_count, 12_345);
        assert_eq!(row.subscriber_count, 678);
        assert_eq!(row.video_count, 90);
        assert_eq!(row.uploads, "UUabc");
    }

    #[test]
    fn missing_statistics_default_to_zero() {
        let raw = r#"{
            "items": [{
                "id": "UCabc",
                "snippet": {"title": "No Stats"}
            }]
        }"#;
        let response: ChannelListResponse = serde_json::from_str(raw).unwrap();
        let row = flatten_channel(&response.items[0]);

        assert_eq!(row.view_count, 0);
        assert_eq!(row.subscriber_count, 0);
        assert_eq!(row.video_count, 0);
        assert_eq!(row.thumbnails, "");
    }

    #[test]
    fn flattens_video_with_normalized_fields() {
        let raw = r#"{
            "items": [{
                "id": "vid1",
                "snippet": {
                    "channelId": "UCabc",
                    "title": "A Video",
                    "description": "",
                    "publishedAt": "2023-01-01T00:00:00Z",
                    "thumbnails": {"default": {"url": "https://i.ytimg.com/vi/vid1"}}
                },
                "contentDetails": {"duration": "PT1H2M3S"},
                "statistics": {"viewCount": "42", "likeCount": "7"}
            }]
        }"#;
        let response: VideoListResponse = serde_json::from_str(raw).unwrap();
        let row = flatten_video(&response.items[0]);

        assert_eq!(row.published_at, "2023-01-01 00:00:00");
        assert_eq!(
            row.duration,
            Duration::hours(1) + Duration::minutes(2) + Duration::seconds(3)
        );
        assert_eq!(row.view_count, 42);
        assert_eq!(row.like_count, 7);
        // dislikeCount is no longer served by the API
        assert_eq!(row.dislike_count, 0);
        assert_eq!(row.playlist_id, "");
    }

    #[test]
    fn flattens_comment_thread_top_level_comment() {
        let raw = r#"{
            "items": [{
                "id": "thread1",
                "snippet": {
                    "channelId": "UCabc",
                    "videoId": "vid1",
                    "topLevelComment": {
                        "snippet": {
                            "authorProfileImageUrl": "https://yt3.ggpht.com/a",
                            "textDisplay": "hello",
                            "textOriginal": "hello",
                            "likeCount": 5,
                            "publishedAt": "2023-03-04T05:06:07Z",
                            "updatedAt": "2023-03-04T05:06:07Z"
                        }
                    }
                }
            }],
            "nextPageToken": "XYZ"
        }"#;
        let response: CommentThreadListResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(response.next_page_token.as_deref(), Some("XYZ"));

        let row = flatten_comment(&response.items[0]);
        assert_eq!(row.id, "thread1");
        assert_eq!(row.channel_id, "UCabc");
        assert_eq!(row.video_id, "vid1");
        assert_eq!(row.like_count, 5);
        assert_eq!(row.text_display, "hello");
    }

    #[test]
    fn playlist_page_rows_concatenate() {
        let page = |ids: &[&str], token: Option<&str>| -> PlaylistListResponse {
            serde_json::from_str(&format!(
                r#"{{"items": [{}]{}}}"#,
                ids.iter()
                    .map(|id| format!(
                        r#"{{"id": "{id}", "snippet": {{"channelId": "UCabc"}}, "contentDetails": {{"itemCount": 1}}}}"#
                    ))
                    .collect::<Vec<_>>()
                    .join(","),
                token
                    .map(|t| format!(r#", "nextPageToken": "{t}""#))
                    .unwrap_or_default()
            ))
            .unwrap()
        };

        let pages = [page(&["PL1", "PL2"], Some("t1")), page(&["PL3"], None)];
        let rows: Vec<PlaylistRow> = pages
            .iter()
            .flat_map(|p| p.items.iter().map(flatten_playlist))
            .collect();

        assert_eq!(rows.len(), 3);
        assert_eq!(
            rows.iter().map(|r| r.id.as_str()).collect::<Vec<_>>(),
            vec!["PL1", "PL2", "PL3"]
        );
    }
}
