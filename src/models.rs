use chrono::Duration;

/// One row of the `channels` table, plus the channel's uploads-playlist
/// reference (used to walk into its videos, never persisted).
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelRow {
    pub id: String,
    pub thumbnails: String,
    pub title: String,
    pub description: String,
    pub view_count: i64,
    pub subscriber_count: i64,
    pub video_count: i64,
    pub uploads: String,
}

/// One row of the `playlists` table.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaylistRow {
    pub id: String,
    pub channel_id: String,
    pub thumbnails: String,
    pub title: String,
    pub description: String,
    pub published_at: String,
    pub item_count: i64,
}

/// One row of the `videos` table.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoRow {
    pub id: String,
    pub channel_id: String,
    pub playlist_id: String,
    pub thumbnails: String,
    pub title: String,
    pub description: String,
    pub published_at: String,
    pub duration: Duration,
    pub view_count: i64,
    pub like_count: i64,
    pub dislike_count: i64,
    pub comment_count: i64,
}

/// One row of the `comments` table (a thread's top-level comment).
#[derive(Debug, Clone, PartialEq)]
pub struct CommentRow {
    pub id: String,
    pub channel_id: String,
    pub video_id: String,
    pub author_profile_image: String,
    pub text_display: String,
    pub text_original: String,
    pub like_count: i64,
    pub published_at: String,
    pub updated_at: String,
}
