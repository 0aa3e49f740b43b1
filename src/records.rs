use chrono::{Local, TimeZone};

/// A flat, fixed-order row. `FIELDS` and `values()` stay in lockstep so
/// every row of one content type writes under the same CSV header.
pub trait TableRecord {
    const FIELDS: &'static [&'static str];
    fn values(&self) -> Vec<String>;
}

pub fn now_stamp() -> String {
    Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

pub fn stamp_from_secs(secs: i64) -> String {
    Local
        .timestamp_opt(secs, 0)
        .single()
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_default()
}

pub fn stamp_from_millis(millis: i64) -> String {
    Local
        .timestamp_millis_opt(millis)
        .single()
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_default()
}

fn opt<T: ToString>(value: &Option<T>) -> String {
    value.as_ref().map(T::to_string).unwrap_or_default()
}

// ── News search ──

#[derive(Debug, Clone)]
pub struct NewsRow {
    pub title: String,
    pub summary: String,
    pub url: String,
    pub source: String,
    pub date: Option<String>,
    pub search_word: String,
    pub crawl_time: String,
}

impl TableRecord for NewsRow {
    const FIELDS: &'static [&'static str] = &[
        "title",
        "abstract",
        "url",
        "source",
        "date",
        "search_word",
        "crawl_time",
    ];

    fn values(&self) -> Vec<String> {
        vec![
            self.title.clone(),
            self.summary.clone(),
            self.url.clone(),
            self.source.clone(),
            opt(&self.date),
            self.search_word.clone(),
            self.crawl_time.clone(),
        ]
    }
}

// ── Channel listing ──

#[derive(Debug, Clone)]
pub struct ChannelVideoRow {
    pub bvid: String,
    pub url: String,
    pub tags: String,
    pub crawl_time: String,
}

impl TableRecord for ChannelVideoRow {
    const FIELDS: &'static [&'static str] = &["bvid", "url", "tags", "channel_crawl_time"];

    fn values(&self) -> Vec<String> {
        vec![
            self.bvid.clone(),
            self.url.clone(),
            self.tags.clone(),
            self.crawl_time.clone(),
        ]
    }
}

// ── Video detail ──

#[derive(Debug, Clone)]
pub struct VideoRow {
    pub avid: i64,
    pub bvid: String,
    pub cid: i64,
    pub title: String,
    pub pubdate: String,
    pub duration: i64,
    pub views: i64,
    pub likes: i64,
    pub coins: i64,
    pub shares: i64,
    pub favorites: i64,
    pub bullets: i64,
    pub comments: i64,
    pub up_id: i64,
    pub up_name: String,
    pub up_gender: String,
    pub up_fans: i64,
    pub up_following: i64,
    pub up_level: i64,
    pub up_vip: String,
    pub up_official: String,
    pub up_archives: i64,
    pub crawl_time: String,
}

impl TableRecord for VideoRow {
    const FIELDS: &'static [&'static str] = &[
        "avid",
        "bvid",
        "cid",
        "title",
        "pubdate",
        "duration",
        "views",
        "likes",
        "coins",
        "shares",
        "favorites",
        "bullets",
        "comments",
        "up_id",
        "up_name",
        "up_gender",
        "up_fans",
        "up_following",
        "up_level",
        "up_vip",
        "up_official",
        "up_archives",
        "video_crawl_time",
    ];

    fn values(&self) -> Vec<String> {
        vec![
            self.avid.to_string(),
            self.bvid.clone(),
            self.cid.to_string(),
            self.title.clone(),
            self.pubdate.clone(),
            self.duration.to_string(),
            self.views.to_string(),
            self.likes.to_string(),
            self.coins.to_string(),
            self.shares.to_string(),
            self.favorites.to_string(),
            self.bullets.to_string(),
            self.comments.to_string(),
            self.up_id.to_string(),
            self.up_name.clone(),
            self.up_gender.clone(),
            self.up_fans.to_string(),
            self.up_following.to_string(),
            self.up_level.to_string(),
            self.up_vip.clone(),
            self.up_official.clone(),
            self.up_archives.to_string(),
            self.crawl_time.clone(),
        ]
    }
}

// ── Comments ──

#[derive(Debug, Clone)]
pub struct CommentRow {
    pub bvid: String,
    pub comment_id: i64,
    pub comment_time: String,
    pub user_id: i64,
    pub user_name: String,
    pub content: String,
    pub likes: i64,
    pub crawl_time: String,
}

impl TableRecord for CommentRow {
    const FIELDS: &'static [&'static str] = &[
        "bvid",
        "comment_id",
        "comment_time",
        "comment_user_id",
        "comment_user_name",
        "comment_content",
        "comment_likes",
        "comment_crawl_time",
    ];

    fn values(&self) -> Vec<String> {
        vec![
            self.bvid.clone(),
            self.comment_id.to_string(),
            self.comment_time.clone(),
            self.user_id.to_string(),
            self.user_name.clone(),
            self.content.clone(),
            self.likes.to_string(),
            self.crawl_time.clone(),
        ]
    }
}

// ── Bullet comments ──

#[derive(Debug, Clone)]
pub struct BulletRow {
    pub bvid: String,
    pub content: String,
    /// Playback offset in seconds, kept verbatim from the feed.
    pub entry: String,
    pub posted: String,
    pub crawl_time: String,
}

impl TableRecord for BulletRow {
    const FIELDS: &'static [&'static str] = &[
        "bvid",
        "bullet_content",
        "bullet_entry",
        "bullet_time",
        "bullet_crawl_time",
    ];

    fn values(&self) -> Vec<String> {
        vec![
            self.bvid.clone(),
            self.content.clone(),
            self.entry.clone(),
            self.posted.clone(),
            self.crawl_time.clone(),
        ]
    }
}

// ── Album listing (JSON API) ──

#[derive(Debug, Clone)]
pub struct AlbumBasicRow {
    pub album_id: i64,
    pub paid: bool,
    /// 0 = not available, 1 = serialized, 2 = finished.
    pub finished: i64,
    /// 0 = only paid, 1 = only VIP, 2 = VIP or paid.
    pub vip_type: i64,
    pub category: String,
    pub subcategory: String,
}

impl TableRecord for AlbumBasicRow {
    const FIELDS: &'static [&'static str] = &[
        "album_id",
        "album_paid",
        "album_finished",
        "album_vip_type",
        "category",
        "subcategory",
    ];

    fn values(&self) -> Vec<String> {
        vec![
            self.album_id.to_string(),
            self.paid.to_string(),
            self.finished.to_string(),
            self.vip_type.to_string(),
            self.category.clone(),
            self.subcategory.clone(),
        ]
    }
}

// ── Album listing (browse-page HTML) ──

#[derive(Debug, Clone)]
pub struct ListingRow {
    pub title: String,
    pub author: String,
    pub url: String,
    pub paid_type: String,
    pub listens: i64,
    pub category: String,
    pub crawl_time: String,
}

impl TableRecord for ListingRow {
    const FIELDS: &'static [&'static str] = &[
        "title",
        "author",
        "url",
        "paid_type",
        "listens",
        "category",
        "cate_crawl_time",
    ];

    fn values(&self) -> Vec<String> {
        vec![
            self.title.clone(),
            self.author.clone(),
            self.url.clone(),
            self.paid_type.clone(),
            self.listens.to_string(),
            self.category.clone(),
            self.crawl_time.clone(),
        ]
    }
}

// ── Album detail ──

#[derive(Debug, Clone)]
pub struct AlbumDetailRow {
    pub album_id: i64,
    pub title: String,
    pub subtitle: Option<String>,
    pub info: Option<String>,
    pub tags: Option<String>,
    pub cover: Option<String>,
    /// User evaluation 0-5; absent for free albums.
    pub score: Option<f64>,
    /// Popularity score 0-10 shown on the page.
    pub score_10: Option<f64>,
    pub created: String,
    pub tracks: i64,
    pub plays: i64,
    pub comments: Option<i64>,
    pub subscribes: i64,
    /// 0 = VIP or free (no price), 1 = by album, 2 = by track.
    pub paid_type: i64,
    pub price: Option<f64>,
    pub price_single: Option<f64>,
    pub author_id: i64,
    pub author_name: String,
    pub author_gender: i64,
    pub author_level: i64,
    pub author_vip: bool,
    pub author_signature: Option<String>,
    pub author_desc: Option<String>,
    pub author_headimg: String,
    pub author_following: i64,
    pub author_followers: i64,
    pub author_albums: i64,
    pub author_tracks: i64,
    /// 1 = not verified, 3 = verified.
    pub author_verified: i64,
    /// 1 = person, 2 = company.
    pub author_verified_type: i64,
    pub author_verified_desc: Option<String>,
}

impl TableRecord for AlbumDetailRow {
    const FIELDS: &'static [&'static str] = &[
        "album_id",
        "album_title",
        "album_subtitle",
        "album_info",
        "album_tags",
        "album_cover",
        "album_score",
        "album_score_10",
        "album_create",
        "album_tracks",
        "album_plays",
        "album_comments",
        "album_subscribes",
        "album_paid_type",
        "album_price",
        "album_price_single",
        "author_id",
        "author_name",
        "author_gender",
        "author_level",
        "author_vip",
        "author_signature",
        "author_desc",
        "author_headimg",
        "author_following",
        "author_followers",
        "author_albums",
        "author_tracks",
        "author_verified",
        "author_verified_type",
        "author_verified_desc",
    ];

    fn values(&self) -> Vec<String> {
        vec![
            self.album_id.to_string(),
            self.title.clone(),
            opt(&self.subtitle),
            opt(&self.info),
            opt(&self.tags),
            opt(&self.cover),
            opt(&self.score),
            opt(&self.score_10),
            self.created.clone(),
            self.tracks.to_string(),
            self.plays.to_string(),
            opt(&self.comments),
            self.subscribes.to_string(),
            self.paid_type.to_string(),
            opt(&self.price),
            opt(&self.price_single),
            self.author_id.to_string(),
            self.author_name.clone(),
            self.author_gender.to_string(),
            self.author_level.to_string(),
            self.author_vip.to_string(),
            opt(&self.author_signature),
            opt(&self.author_desc),
            self.author_headimg.clone(),
            self.author_following.to_string(),
            self.author_followers.to_string(),
            self.author_albums.to_string(),
            self.author_tracks.to_string(),
            self.author_verified.to_string(),
            self.author_verified_type.to_string(),
            opt(&self.author_verified_desc),
        ]
    }
}

// ── Tracks ──

#[derive(Debug, Clone)]
pub struct TrackRow {
    pub album_id: i64,
    pub track_id: i64,
    pub name: String,
    pub duration: i64,
    pub plays: i64,
    pub likes: i64,
    pub comments: i64,
    pub created: String,
    /// Trial-download URL; empty for paid-only tracks, valid for hours.
    pub audio: String,
}

impl TableRecord for TrackRow {
    const FIELDS: &'static [&'static str] = &[
        "album_id",
        "track_id",
        "track_name",
        "track_duration",
        "track_plays",
        "track_likes",
        "track_comments",
        "track_create",
        "track_audio",
    ];

    fn values(&self) -> Vec<String> {
        vec![
            self.album_id.to_string(),
            self.track_id.to_string(),
            self.name.clone(),
            self.duration.to_string(),
            self.plays.to_string(),
            self.likes.to_string(),
            self.comments.to_string(),
            self.created.clone(),
            self.audio.clone(),
        ]
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_count_matches_values() {
        let row = NewsRow {
            title: "t".into(),
            summary: "a".into(),
            url: "u".into(),
            source: "s".into(),
            date: None,
            search_word: "w".into(),
            crawl_time: "now".into(),
        };
        assert_eq!(NewsRow::FIELDS.len(), row.values().len());

        let row = TrackRow {
            album_id: 1,
            track_id: 2,
            name: "n".into(),
            duration: 3,
            plays: 4,
            likes: 5,
            comments: 6,
            created: "c".into(),
            audio: String::new(),
        };
        assert_eq!(TrackRow::FIELDS.len(), row.values().len());
    }

    #[test]
    fn missing_optional_fields_become_empty() {
        let row = NewsRow {
            title: "t".into(),
            summary: "a".into(),
            url: "u".into(),
            source: "s".into(),
            date: None,
            search_word: "w".into(),
            crawl_time: "now".into(),
        };
        assert_eq!(row.values()[4], "");
    }

    #[test]
    fn epoch_stamps_are_stable() {
        assert_eq!(stamp_from_secs(0), stamp_from_secs(0));
        assert_eq!(stamp_from_millis(1_500), stamp_from_secs(1));
    }
}
