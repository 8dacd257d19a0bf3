//! Persistence layer for the four-table channel analytics schema.
//!
//! Two interchangeable backends (embedded SQLite, networked MySQL) sit
//! behind one trait; constraint failures surface as typed errors so the
//! batch upsert can fall back to update on a duplicate key and skip rows
//! whose parent is missing.

pub mod mysql;
pub mod sqlite;

use thiserror::Error;
use tracing::{info, warn};

use crate::config::StorageConfig;
use crate::models::{ChannelRow, CommentRow, PlaylistRow, VideoRow};
use crate::normalize::{format_duration, normalize_timestamp};

pub use self::mysql::MySqlBackend;
pub use self::sqlite::SqliteBackend;

/// Idempotent DDL shared by both backends. Foreign keys cascade deletes
/// downward and restrict id updates upward.
const SCHEMA_TABLES: [&str; 4] = [
    "CREATE TABLE IF NOT EXISTS channels (
        id VARCHAR(255) NOT NULL,
        thumbnails VARCHAR(255),
        title VARCHAR(255),
        description TEXT,
        viewCount BIGINT,
        subscriberCount BIGINT,
        videoCount INT,
        PRIMARY KEY (id))",
    "CREATE TABLE IF NOT EXISTS playlists (
        id VARCHAR(255) NOT NULL,
        channelId VARCHAR(255),
        thumbnails VARCHAR(255),
        title VARCHAR(255),
        description TEXT,
        publishedAt DATETIME,
        itemCount INT,
        CONSTRAINT playlists_channelId_fk FOREIGN KEY (channelId)
        REFERENCES channels (id) ON UPDATE RESTRICT ON DELETE CASCADE,
        PRIMARY KEY (id))",
    "CREATE TABLE IF NOT EXISTS videos (
        id VARCHAR(255) NOT NULL,
        channelId VARCHAR(255),
        playlistId VARCHAR(255),
        thumbnails VARCHAR(255),
        title VARCHAR(255),
        description TEXT,
        publishedAt DATETIME,
        duration TIME,
        viewCount BIGINT,
        likeCount BIGINT,
        dislikeCount BIGINT,
        commentCount BIGINT,
        CONSTRAINT videos_channelId_fk FOREIGN KEY (channelId)
        REFERENCES channels (id) ON UPDATE RESTRICT ON DELETE CASCADE,
        CONSTRAINT videos_playlistId_fk FOREIGN KEY (playlistId)
        REFERENCES playlists (id) ON UPDATE RESTRICT ON DELETE CASCADE,
        PRIMARY KEY (id))",
    "CREATE TABLE IF NOT EXISTS comments (
        id VARCHAR(255) NOT NULL,
        channelId VARCHAR(255),
        videoId VARCHAR(255),
        authorProfileImage VARCHAR(255),
        textDisplay TEXT,
        textOriginal TEXT,
        likeCount INT,
        publishedAt DATETIME,
        updatedAt DATETIME,
        CONSTRAINT comments_channelId_fk FOREIGN KEY (channelId)
        REFERENCES channels (id) ON UPDATE RESTRICT ON DELETE CASCADE,
        CONSTRAINT comments_videoId_fk FOREIGN KEY (videoId)
        REFERENCES videos (id) ON UPDATE RESTRICT ON DELETE CASCADE,
        PRIMARY KEY (id))",
];

/// Storage errors, discriminated from driver error codes rather than
/// message text so the upsert fallback logic stays backend-agnostic.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Primary-key collision on insert.
    #[error("duplicate key: {0}")]
    DuplicateKey(String),
    /// A referenced parent row does not exist (or is still referenced).
    #[error("foreign key violation: {0}")]
    ForeignKeyViolation(String),
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("mysql error: {0}")]
    MySql(#[from] ::mysql::Error),
}

/// A typed SQL cell value.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl std::fmt::Display for SqlValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SqlValue::Null => f.write_str("NULL"),
            SqlValue::Integer(v) => write!(f, "{v}"),
            SqlValue::Real(v) => write!(f, "{v}"),
            SqlValue::Text(v) => f.write_str(v),
        }
    }
}

/// Column-ordered field values for one row; the identifier comes first.
pub type RowFields = Vec<(&'static str, SqlValue)>;

/// Result rows with their column names attached.
#[derive(Debug, Clone, Default)]
pub struct QueryOutput {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<SqlValue>>,
}

/// Outcome of a batch upsert; `skipped` carries the user-visible warnings
/// for rows dropped on a foreign-key violation.
#[derive(Debug, Clone, Default)]
pub struct UpsertReport {
    pub inserted: usize,
    pub updated: usize,
    pub skipped: Vec<String>,
}

/// The backend seam. Placeholder syntax, connection discipline and error
/// classification stay inside each implementation.
pub trait SqlBackend {
    fn ensure_schema(&self) -> Result<(), StorageError>;
    fn insert(&self, table: &str, fields: &[(&str, SqlValue)]) -> Result<(), StorageError>;
    fn update(&self, table: &str, fields: &[(&str, SqlValue)]) -> Result<(), StorageError>;
    fn query(&self, sql: &str) -> Result<QueryOutput, StorageError>;
    fn execute(&self, sql: &str) -> Result<(), StorageError>;
}

/// Handle to the channel analytics store.
pub struct Store {
    backend: Box<dyn SqlBackend>,
}

impl Store {
    /// Open the configured backend and make sure the schema exists.
    /// Unreachable servers and unusable paths fail here, not later.
    pub fn open(config: &StorageConfig) -> Result<Self, StorageError> {
        let backend: Box<dyn SqlBackend> = match config {
            StorageConfig::Sqlite { path } => {
                info!("opening sqlite store at {path}");
                Box::new(SqliteBackend::open(path.as_str())?)
            }
            StorageConfig::MySql(params) => {
                info!("connecting to mysql at {}:{}", params.host, params.port);
                Box::new(MySqlBackend::connect(params)?)
            }
        };
        backend.ensure_schema()?;
        Ok(Self { backend })
    }

    /// Single-row parameterized insert, committed immediately.
    pub fn insert(&self, table: &str, fields: &[(&str, SqlValue)]) -> Result<(), StorageError> {
        self.backend.insert(table, fields)
    }

    /// Update every supplied column except the identifier, keyed by the
    /// identifier. The caller supplies the identifier as the first field.
    pub fn update(&self, table: &str, fields: &[(&str, SqlValue)]) -> Result<(), StorageError> {
        self.backend.update(table, fields)
    }

    /// Arbitrary read query; rows come back with column names attached.
    pub fn query(&self, sql: &str) -> Result<QueryOutput, StorageError> {
        self.backend.query(sql)
    }

    /// Arbitrary statement, committed immediately.
    pub fn execute(&self, sql: &str) -> Result<(), StorageError> {
        self.backend.execute(sql)
    }

    /// Per row: try insert; on a duplicate key fall back to update with the
    /// same fields; on a foreign-key violation skip the row with a warning.
    /// Any other failure aborts the remainder of the batch. No transaction
    /// wraps the batch, so earlier rows stay applied on abort.
    pub fn upsert_rows(
        &self,
        table: &str,
        rows: &[RowFields],
    ) -> Result<UpsertReport, StorageError> {
        let mut report = UpsertReport::default();
        for fields in rows {
            match self.backend.insert(table, fields) {
                Ok(()) => report.inserted += 1,
                Err(StorageError::DuplicateKey(_)) => {
                    self.backend.update(table, fields)?;
                    report.updated += 1;
                }
                Err(StorageError::ForeignKeyViolation(detail)) => {
                    let key = fields
                        .first()
                        .map(|(_, v)| v.to_string())
                        .unwrap_or_default();
                    warn!("skipped {table} row {key}: {detail}");
                    report.skipped.push(format!("{table} row {key}: {detail}"));
                }
                Err(other) => return Err(other),
            }
        }
        Ok(report)
    }

    pub fn add_channels(&self, rows: &[ChannelRow]) -> Result<UpsertReport, StorageError> {
        let projected: Vec<RowFields> = rows.iter().map(channel_fields).collect();
        self.upsert_rows("channels", &projected)
    }

    pub fn add_playlists(&self, rows: &[PlaylistRow]) -> Result<UpsertReport, StorageError> {
        let projected: Vec<RowFields> = rows.iter().map(playlist_fields).collect();
        self.upsert_rows("playlists", &projected)
    }

    pub fn add_videos(&self, rows: &[VideoRow]) -> Result<UpsertReport, StorageError> {
        let projected: Vec<RowFields> = rows.iter().map(video_fields).collect();
        self.upsert_rows("videos", &projected)
    }

    pub fn add_comments(&self, rows: &[CommentRow]) -> Result<UpsertReport, StorageError> {
        let projected: Vec<RowFields> = rows.iter().map(comment_fields).collect();
        self.upsert_rows("comments", &projected)
    }
}

// Fixed-order projections to the persisted column sets. The channel row's
// uploads reference is dropped here; timestamps are normalized on the way
// in and the video duration is rendered as HH:MM:SS.

fn channel_fields(row: &ChannelRow) -> RowFields {
    vec![
        ("id", SqlValue::Text(row.id.clone())),
        ("thumbnails", SqlValue::Text(row.thumbnails.clone())),
        ("title", SqlValue::Text(row.title.clone())),
        ("description", SqlValue::Text(row.description.clone())),
        ("viewCount", SqlValue::Integer(row.view_count)),
        ("subscriberCount", SqlValue::Integer(row.subscriber_count)),
        ("videoCount", SqlValue::Integer(row.video_count)),
    ]
}

fn playlist_fields(row: &PlaylistRow) -> RowFields {
    vec![
        ("id", SqlValue::Text(row.id.clone())),
        ("channelId", SqlValue::Text(row.channel_id.clone())),
        ("thumbnails", SqlValue::Text(row.thumbnails.clone())),
        ("title", SqlValue::Text(row.title.clone())),
        ("description", SqlValue::Text(row.description.clone())),
        (
            "publishedAt",
            SqlValue::Text(normalize_timestamp(&row.published_at)),
        ),
        ("itemCount", SqlValue::Integer(row.item_count)),
    ]
}

fn video_fields(row: &VideoRow) -> RowFields {
    vec![
        ("id", SqlValue::Text(row.id.clone())),
        ("channelId", SqlValue::Text(row.channel_id.clone())),
        ("playlistId", SqlValue::Text(row.playlist_id.clone())),
        ("thumbnails", SqlValue::Text(row.thumbnails.clone())),
        ("title", SqlValue::Text(row.title.clone())),
        ("description", SqlValue::Text(row.description.clone())),
        (
            "publishedAt",
            SqlValue::Text(normalize_timestamp(&row.published_at)),
        ),
        ("duration", SqlValue::Text(format_duration(row.duration))),
        ("viewCount", SqlValue::Integer(row.view_count)),
        ("likeCount", SqlValue::Integer(row.like_count)),
        ("dislikeCount", SqlValue::Integer(row.dislike_count)),
        ("commentCount", SqlValue::Integer(row.comment_count)),
    ]
}

fn comment_fields(row: &CommentRow) -> RowFields {
    vec![
        ("id", SqlValue::Text(row.id.clone())),
        ("channelId", SqlValue::Text(row.channel_id.clone())),
        ("videoId", SqlValue::Text(row.video_id.clone())),
        (
            "authorProfileImage",
            SqlValue::Text(row.author_profile_image.clone()),
        ),
        ("textDisplay", SqlValue::Text(row.text_display.clone())),
        ("textOriginal", SqlValue::Text(row.text_original.clone())),
        ("likeCount", SqlValue::Integer(row.like_count)),
        (
            "publishedAt",
            SqlValue::Text(normalize_timestamp(&row.published_at)),
        ),
        (
            "updatedAt",
            SqlValue::Text(normalize_timestamp(&row.updated_at)),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::TempDir;

    fn open_store() -> (Store, TempDir) {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let path = dir.path().join("store.db");
        let store = Store::open(&StorageConfig::Sqlite {
            path: path.to_string_lossy().into_owned(),
        })
        .expect("failed to open store");
        (store, dir)
    }

    fn channel(id: &str, title: &str) -> ChannelRow {
        ChannelRow {
            id: id.to_string(),
            thumbnails: "https://yt3.ggpht.com/thumb".to_string(),
            title: title.to_string(),
            description: "a channel".to_string(),
            view_count: 1_000,
            subscriber_count: 50,
            video_count: 10,
            uploads: format!("UU{}", &id[2..]),
        }
    }

    fn playlist(id: &str, channel_id: &str) -> PlaylistRow {
        PlaylistRow {
            id: id.to_string(),
            channel_id: channel_id.to_string(),
            thumbnails: "https://i.ytimg.com/pl".to_string(),
            title: "a playlist".to_string(),
            description: String::new(),
            published_at: "2023-01-01T00:00:00Z".to_string(),
            item_count: 2,
        }
    }

    fn video(id: &str, channel_id: &str, playlist_id: &str) -> VideoRow {
        VideoRow {
            id: id.to_string(),
            channel_id: channel_id.to_string(),
            playlist_id: playlist_id.to_string(),
            thumbnails: "https://i.ytimg.com/vi".to_string(),
            title: "a video".to_string(),
            description: String::new(),
            published_at: "2023-02-03T10:20:30Z".to_string(),
            duration: Duration::hours(1) + Duration::minutes(2) + Duration::seconds(3),
            view_count: 100,
            like_count: 10,
            dislike_count: 1,
            comment_count: 4,
        }
    }

    fn comment(id: &str, channel_id: &str, video_id: &str) -> CommentRow {
        CommentRow {
            id: id.to_string(),
            channel_id: channel_id.to_string(),
            video_id: video_id.to_string(),
            author_profile_image: "https://yt3.ggpht.com/a".to_string(),
            text_display: "nice".to_string(),
            text_original: "nice".to_string(),
            like_count: 3,
            published_at: "2023-02-04T11:00:00Z".to_string(),
            updated_at: "2023-02-04T11:00:00Z".to_string(),
        }
    }

    fn count(store: &Store, table: &str) -> i64 {
        let out = store
            .query(&format!("SELECT COUNT(*) FROM {table}"))
            .expect("count query failed");
        match out.rows[0][0] {
            SqlValue::Integer(n) => n,
            ref other => panic!("unexpected count value {other:?}"),
        }
    }

    fn text_cell<'a>(out: &'a QueryOutput, row: usize, col: &str) -> &'a str {
        let idx = out
            .columns
            .iter()
            .position(|c| c == col)
            .unwrap_or_else(|| panic!("missing column {col}"));
        match &out.rows[row][idx] {
            SqlValue::Text(s) => s,
            other => panic!("expected text in {col}, got {other:?}"),
        }
    }

    #[test]
    fn upserting_same_id_twice_updates_in_place() {
        let (store, _dir) = open_store();

        let report = store.add_channels(&[channel("UC1", "before")]).unwrap();
        assert_eq!(report.inserted, 1);

        let mut refreshed = channel("UC1", "after");
        refreshed.view_count = 2_000;
        let report = store.add_channels(&[refreshed]).unwrap();
        assert_eq!(report.updated, 1);
        assert_eq!(report.inserted, 0);

        assert_eq!(count(&store, "channels"), 1);
        let out = store
            .query("SELECT title, viewCount FROM channels WHERE id = 'UC1'")
            .unwrap();
        assert_eq!(text_cell(&out, 0, "title"), "after");
        assert_eq!(out.rows[0][1], SqlValue::Integer(2_000));
    }

    #[test]
    fn child_without_parent_is_skipped_not_fatal() {
        let (store, _dir) = open_store();
        store.add_channels(&[channel("UC1", "parent")]).unwrap();

        let report = store
            .add_playlists(&[playlist("PL1", "UC1"), playlist("PL2", "UC-missing")])
            .unwrap();
        assert_eq!(report.inserted, 1);
        assert_eq!(report.skipped.len(), 1);
        assert!(report.skipped[0].contains("PL2"));
        assert_eq!(count(&store, "playlists"), 1);
    }

    #[test]
    fn orphan_video_scenario_leaves_channel_intact() {
        // Channel C1 exists, video references playlist P1 which does not.
        let (store, _dir) = open_store();
        store.add_channels(&[channel("UC1", "parent")]).unwrap();

        let report = store.add_videos(&[video("V1", "UC1", "P1")]).unwrap();
        assert_eq!(report.inserted, 0);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(count(&store, "videos"), 0);
        assert_eq!(count(&store, "channels"), 1);
    }

    #[test]
    fn cascade_delete_removes_descendants() {
        let (store, _dir) = open_store();
        store.add_channels(&[channel("UC1", "parent")]).unwrap();
        store.add_playlists(&[playlist("PL1", "UC1")]).unwrap();
        store.add_videos(&[video("V1", "UC1", "PL1")]).unwrap();
        store.add_comments(&[comment("CM1", "UC1", "V1")]).unwrap();

        store
            .execute("DELETE FROM channels WHERE id = 'UC1'")
            .unwrap();

        assert_eq!(count(&store, "channels"), 0);
        assert_eq!(count(&store, "playlists"), 0);
        assert_eq!(count(&store, "videos"), 0);
        assert_eq!(count(&store, "comments"), 0);
    }

    #[test]
    fn referenced_channel_id_update_is_restricted() {
        let (store, _dir) = open_store();
        store.add_channels(&[channel("UC1", "parent")]).unwrap();
        store.add_playlists(&[playlist("PL1", "UC1")]).unwrap();

        let err = store
            .execute("UPDATE channels SET id = 'UC2' WHERE id = 'UC1'")
            .unwrap_err();
        assert!(matches!(err, StorageError::ForeignKeyViolation(_)));
    }

    #[test]
    fn insert_classifies_duplicate_key() {
        let (store, _dir) = open_store();
        let fields = channel_fields(&channel("UC1", "first"));
        store.insert("channels", &fields).unwrap();
        let err = store.insert("channels", &fields).unwrap_err();
        assert!(matches!(err, StorageError::DuplicateKey(_)));
    }

    #[test]
    fn timestamps_and_duration_are_normalized_on_add() {
        let (store, _dir) = open_store();
        store.add_channels(&[channel("UC1", "parent")]).unwrap();
        store.add_playlists(&[playlist("PL1", "UC1")]).unwrap();
        store.add_videos(&[video("V1", "UC1", "PL1")]).unwrap();

        let out = store
            .query("SELECT publishedAt, duration FROM videos WHERE id = 'V1'")
            .unwrap();
        assert_eq!(text_cell(&out, 0, "publishedAt"), "2023-02-03 10:20:30");
        assert_eq!(text_cell(&out, 0, "duration"), "01:02:03");

        let out = store
            .query("SELECT publishedAt FROM playlists WHERE id = 'PL1'")
            .unwrap();
        assert_eq!(text_cell(&out, 0, "publishedAt"), "2023-01-01 00:00:00");
    }

    #[test]
    fn query_attaches_column_names() {
        let (store, _dir) = open_store();
        store.add_channels(&[channel("UC1", "parent")]).unwrap();

        let out = store
            .query("SELECT id, title, viewCount FROM channels")
            .unwrap();
        assert_eq!(out.columns, vec!["id", "title", "viewCount"]);
        assert_eq!(out.rows.len(), 1);
    }

    #[test]
    fn update_keys_on_first_field() {
        let (store, _dir) = open_store();
        store.add_channels(&[channel("UC1", "before")]).unwrap();

        store
            .update(
                "channels",
                &[
                    ("id", SqlValue::Text("UC1".to_string())),
                    ("title", SqlValue::Text("renamed".to_string())),
                ],
            )
            .unwrap();

        let out = store.query("SELECT title FROM channels").unwrap();
        assert_eq!(text_cell(&out, 0, "title"), "renamed");
    }
}
