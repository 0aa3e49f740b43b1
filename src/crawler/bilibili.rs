use std::time::Duration;

use chrono::Local;
use reqwest::header::{HeaderMap, HeaderValue, REFERER, USER_AGENT};
use scraper::{Html, Selector};
use serde_json::Value;
use tracing::info;

use crate::client::{Http, BROWSER_UA};
use crate::error::{Error, Result};
use crate::paginate;
use crate::parser::bilibili as parse;
use crate::records::{BulletRow, ChannelVideoRow, CommentRow, VideoRow};
use crate::sink::CsvSink;

const CHANNEL_SEARCH_URL: &str = "https://s.search.bilibili.com/cate/search";
const REPLY_URL: &str = "https://api.bilibili.com/x/v2/reply/main";
const CHANNEL_PAGE_SIZE: u64 = 30;
const COMMENT_PAGE_SIZE: u64 = 20;

/// The watch-page endpoints tolerate two requests a second; listings
/// and the bullet feed take one.
pub const CHANNEL_DELAY: Duration = Duration::from_secs(1);
pub const VIDEO_DELAY: Duration = Duration::from_millis(500);
pub const BULLET_DELAY: Duration = Duration::from_secs(1);

fn base_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert("accept", HeaderValue::from_static("*/*"));
    headers.insert(
        "accept-language",
        HeaderValue::from_static("zh-CN,zh;q=0.9,en;q=0.8"),
    );
    headers.insert(
        "sec-ch-ua",
        HeaderValue::from_static(
            "\" Not A;Brand\";v=\"99\", \"Chromium\";v=\"100\", \"Google Chrome\";v=\"100\"",
        ),
    );
    headers.insert("sec-ch-ua-mobile", HeaderValue::from_static("?0"));
    headers.insert("sec-ch-ua-platform", HeaderValue::from_static("Windows"));
    headers.insert("sec-fetch-dest", HeaderValue::from_static("script"));
    headers.insert("sec-fetch-mode", HeaderValue::from_static("no-cors"));
    headers.insert("sec-fetch-site", HeaderValue::from_static("same-site"));
    headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_UA));
    headers
}

pub struct Bilibili {
    http: Http,
}

impl Bilibili {
    pub fn new(delay: Duration) -> Result<Self> {
        Ok(Self {
            http: Http::new(base_headers(), delay)?,
        })
    }

    /// Videos uploaded to a channel in the last seven days, ranked by
    /// clicks, paged through the category search endpoint.
    pub async fn crawl_channel(
        &self,
        channel_url: &str,
        requested_pages: Option<u64>,
        sink: &CsvSink,
    ) -> Result<Vec<ChannelVideoRow>> {
        let channel_id = self.channel_id(channel_url).await?;
        info!(channel_url, channel_id, "resolved channel");

        let first = self.channel_page(channel_url, channel_id, 1).await?;
        let total = parse::channel_total(&first)?;

        let mut all = Vec::new();
        for page in paginate::plan(total, CHANNEL_PAGE_SIZE, requested_pages, u64::MAX) {
            let page_json = if page == 1 {
                first.clone()
            } else {
                self.channel_page(channel_url, channel_id, page).await?
            };
            let rows = parse::parse_channel(&page_json)?;
            sink.append(&rows)?;
            info!(channel_url, page, count = rows.len(), "saved channel page");
            all.extend(rows);
        }
        Ok(all)
    }

    /// Video + uploader detail rows for each bvid.
    pub async fn crawl_videos(&self, bvids: &[String], sink: &CsvSink) -> Result<Vec<VideoRow>> {
        let mut all = Vec::new();
        for bvid in bvids {
            let (video, uploader) = self.video_page(bvid).await?;
            let row = parse::parse_video(&video, &uploader)?;
            sink.append(std::slice::from_ref(&row))?;
            info!(bvid = %bvid, "saved video details");
            all.push(row);
        }
        Ok(all)
    }

    /// Every comment page of each video. The reported total over-counts
    /// the pages actually served, so the loop stops at the first empty
    /// page instead of trusting it.
    pub async fn crawl_comments(
        &self,
        bvids: &[String],
        sink: &CsvSink,
    ) -> Result<Vec<CommentRow>> {
        let mut all = Vec::new();
        for bvid in bvids {
            let (video, _) = self.video_page(bvid).await?;
            let avid = crate::parser::i64_at(&video, &["aid"])?;

            let first = self.comment_page(bvid, avid, 0).await?;
            let Some(total) = parse::comment_total(&first) else {
                info!(bvid = %bvid, "video has no comments");
                continue;
            };
            let pages = paginate::plan(total, COMMENT_PAGE_SIZE, None, u64::MAX);
            info!(bvid = %bvid, total, pages = pages.clone().count(), "reported comment pages");

            for page in pages {
                let page_json = if page == 1 {
                    first.clone()
                } else {
                    // Cursor pages are zero-based.
                    self.comment_page(bvid, avid, page - 1).await?
                };
                let rows = parse::parse_comments(bvid, &page_json)?;
                if rows.is_empty() {
                    info!(bvid = %bvid, page, "empty reply page, all comments crawled");
                    break;
                }
                sink.append(&rows)?;
                info!(bvid = %bvid, page, count = rows.len(), "saved comment page");
                all.extend(rows);
            }
        }
        Ok(all)
    }

    /// The full bullet-comment feed of each video.
    pub async fn crawl_bullets(&self, bvids: &[String], sink: &CsvSink) -> Result<Vec<BulletRow>> {
        let mut all = Vec::new();
        for bvid in bvids {
            let (video, _) = self.video_page(bvid).await?;
            let cid = crate::parser::i64_at(&video, &["cid"])?;

            let url = format!("https://comment.bilibili.com/{cid}.xml");
            let referer = video_referer(bvid);
            let xml = self
                .http
                .get_text(&url, &[], &[(REFERER, referer)])
                .await?;
            let rows = parse::parse_bullets(bvid, &xml)?;
            if rows.is_empty() {
                info!(bvid = %bvid, "video has no bullet comments");
                continue;
            }
            sink.append(&rows)?;
            info!(bvid = %bvid, count = rows.len(), "saved bullet comments");
            all.extend(rows);
        }
        Ok(all)
    }

    /// The channel id hides in the page's alternate-app link.
    async fn channel_id(&self, channel_url: &str) -> Result<i64> {
        let html = self
            .http
            .get_text(channel_url, &[], &[(REFERER, channel_url.to_string())])
            .await?;
        let document = Html::parse_document(&html);
        let link_sel = Selector::parse("link[rel=alternate]").unwrap();
        let href = document
            .select(&link_sel)
            .next()
            .and_then(|link| link.value().attr("href"))
            .ok_or_else(|| Error::parse("channel page: no alternate link"))?;
        href.rsplit('/')
            .find(|segment| !segment.is_empty())
            .and_then(|segment| segment.parse().ok())
            .ok_or_else(|| Error::parse(format!("channel id not in '{href}'")))
    }

    async fn channel_page(&self, channel_url: &str, channel_id: i64, page: u64) -> Result<Value> {
        let today = Local::now().date_naive();
        let week_ago = today - chrono::Duration::days(7);
        let params = [
            ("main_ver", "v3".to_string()),
            ("search_type", "video".to_string()),
            ("view_type", "hot_rank".to_string()),
            ("copy_right", "-1".to_string()),
            ("new_web_tag", "1".to_string()),
            ("order", "click".to_string()),
            ("cate_id", channel_id.to_string()),
            ("page", page.to_string()),
            ("pagesize", CHANNEL_PAGE_SIZE.to_string()),
            ("time_from", week_ago.format("%Y%m%d").to_string()),
            ("time_to", today.format("%Y%m%d").to_string()),
        ];
        self.http
            .get_json(
                CHANNEL_SEARCH_URL,
                &params,
                &[(REFERER, channel_url.to_string())],
            )
            .await
    }

    async fn video_page(&self, bvid: &str) -> Result<(Value, Value)> {
        let url = format!("https://www.bilibili.com/video/{bvid}");
        let html = self.http.get_text(&url, &[], &[]).await?;
        parse::parse_video_page(&html)
    }

    async fn comment_page(&self, bvid: &str, avid: i64, cursor: u64) -> Result<Value> {
        let params = [
            ("next", cursor.to_string()),
            ("type", "1".to_string()),
            ("oid", avid.to_string()),
        ];
        self.http
            .get_json(REPLY_URL, &params, &[(REFERER, video_referer(bvid))])
            .await
    }
}

fn video_referer(bvid: &str) -> String {
    format!("https://www.bilibili.com/video/{bvid}")
}
