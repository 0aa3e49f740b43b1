use quick_xml::events::Event;
use serde_json::Value;

use super::{i64_at, str_at, walk};
use crate::error::{Error, Result};
use crate::records::{now_stamp, stamp_from_secs, BulletRow, ChannelVideoRow, CommentRow, VideoRow};

/// Videos from one channel listing page.
pub fn parse_channel(page: &Value) -> Result<Vec<ChannelVideoRow>> {
    let results = walk(page, &["result"])?
        .as_array()
        .ok_or_else(|| Error::parse("channel page: result is not an array"))?;

    let crawl_time = now_stamp();
    let mut rows = Vec::new();
    for video in results {
        rows.push(ChannelVideoRow {
            bvid: str_at(video, &["bvid"])?,
            url: str_at(video, &["arcurl"])?,
            tags: str_at(video, &["tag"])?,
            crawl_time: crawl_time.clone(),
        });
    }
    Ok(rows)
}

/// Total result count reported by the first channel page.
pub fn channel_total(page: &Value) -> Result<u64> {
    i64_at(page, &["numResults"]).map(|n| n.max(0) as u64)
}

/// The watch page embeds its data as JSON objects inside the HTML; slice
/// them out by marker and parse. Missing markers mean the page layout
/// changed and the whole record is unusable.
pub fn parse_video_page(html: &str) -> Result<(Value, Value)> {
    let video_raw = slice_between(html, "\"videoData\":", ",\"upData\"")?;
    let uploader_raw = slice_between(html, ",\"upData\":", ",\"isCollection\"")?;

    let video = serde_json::from_str(video_raw)
        .map_err(|e| Error::parse(format!("embedded video data: {e}")))?;
    let uploader = serde_json::from_str(uploader_raw)
        .map_err(|e| Error::parse(format!("embedded uploader data: {e}")))?;
    Ok((video, uploader))
}

fn slice_between<'a>(html: &'a str, start: &str, end: &str) -> Result<&'a str> {
    let from = html
        .find(start)
        .ok_or_else(|| Error::parse(format!("marker {start:?} not found")))?
        + start.len();
    let to = html[from..]
        .find(end)
        .ok_or_else(|| Error::parse(format!("marker {end:?} not found")))?
        + from;
    Ok(&html[from..to])
}

/// Merge the embedded video and uploader objects into one flat row.
pub fn parse_video(video: &Value, uploader: &Value) -> Result<VideoRow> {
    Ok(VideoRow {
        avid: i64_at(video, &["aid"])?,
        bvid: str_at(video, &["bvid"])?,
        cid: i64_at(video, &["cid"])?,
        title: str_at(video, &["title"])?,
        pubdate: stamp_from_secs(i64_at(video, &["pubdate"])?),
        duration: i64_at(video, &["duration"])?,
        views: i64_at(video, &["stat", "view"])?,
        likes: i64_at(video, &["stat", "like"])?,
        coins: i64_at(video, &["stat", "coin"])?,
        shares: i64_at(video, &["stat", "share"])?,
        favorites: i64_at(video, &["stat", "favorite"])?,
        bullets: i64_at(video, &["stat", "danmaku"])?,
        comments: i64_at(video, &["stat", "reply"])?,
        up_id: i64_at(uploader, &["mid"])?,
        up_name: str_at(uploader, &["name"])?,
        up_gender: str_at(uploader, &["sex"])?,
        up_fans: i64_at(uploader, &["fans"])?,
        up_following: i64_at(uploader, &["attention"])?,
        up_level: i64_at(uploader, &["level_info", "current_level"])?,
        up_vip: str_at(uploader, &["vip", "label", "text"])?,
        up_official: str_at(uploader, &["Official", "title"])?,
        up_archives: i64_at(uploader, &["archiveCount"])?,
        crawl_time: now_stamp(),
    })
}

/// Comments from one reply page. A null or absent `replies` array is the
/// platform's end-of-comments signal and parses to an empty page.
pub fn parse_comments(bvid: &str, page: &Value) -> Result<Vec<CommentRow>> {
    let replies = match walk(page, &["data", "replies"]) {
        Ok(Value::Array(items)) => items.as_slice(),
        Ok(Value::Null) | Err(_) => &[],
        Ok(_) => return Err(Error::parse("reply page: replies is not an array")),
    };

    let crawl_time = now_stamp();
    let mut rows = Vec::new();
    for reply in replies {
        rows.push(CommentRow {
            bvid: bvid.to_string(),
            comment_id: i64_at(reply, &["rpid"])?,
            comment_time: stamp_from_secs(i64_at(reply, &["ctime"])?),
            user_id: i64_at(reply, &["member", "mid"])?,
            user_name: str_at(reply, &["member", "uname"])?,
            content: str_at(reply, &["content", "message"])?,
            likes: i64_at(reply, &["like"])?,
            crawl_time: crawl_time.clone(),
        });
    }
    Ok(rows)
}

/// Reported comment count, when the video has comments at all. The value
/// regularly exceeds the pages actually served, so callers treat it as an
/// upper bound and stop on the first empty page.
pub fn comment_total(page: &Value) -> Option<u64> {
    super::i64_opt(page, &["data", "cursor", "all_count"]).map(|n| n.max(0) as u64)
}

/// Bullet comments from the XML feed: `<d p="offset,...,epoch,...">text</d>`.
pub fn parse_bullets(bvid: &str, xml: &str) -> Result<Vec<BulletRow>> {
    let mut reader = quick_xml::Reader::from_str(xml);
    let mut rows = Vec::new();
    let mut buf = Vec::new();
    let mut pending: Option<(String, String)> = None; // (entry, posted)
    let mut content = String::new();
    let crawl_time = now_stamp();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.name().as_ref() == b"d" => {
                let attr = e
                    .try_get_attribute("p")
                    .map_err(|e| Error::parse(format!("bullet attributes: {e}")))?
                    .ok_or_else(|| Error::parse("bullet element without p attribute"))?;
                let p = attr
                    .unescape_value()
                    .map_err(|e| Error::parse(format!("bullet p attribute: {e}")))?;
                pending = Some(split_p(&p)?);
                content.clear();
            }
            Ok(Event::Text(t)) if pending.is_some() => {
                content.push_str(
                    &t.unescape()
                        .map_err(|e| Error::parse(format!("bullet text: {e}")))?,
                );
            }
            Ok(Event::End(e)) if e.name().as_ref() == b"d" => {
                if let Some((entry, posted)) = pending.take() {
                    rows.push(BulletRow {
                        bvid: bvid.to_string(),
                        content: std::mem::take(&mut content),
                        entry,
                        posted,
                        crawl_time: crawl_time.clone(),
                    });
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(Error::parse(format!("bullet xml: {e}"))),
            _ => {}
        }
        buf.clear();
    }
    Ok(rows)
}

/// The p attribute packs the playback offset at field 0 and the post
/// epoch at field 4.
fn split_p(p: &str) -> Result<(String, String)> {
    let fields: Vec<&str> = p.split(',').collect();
    if fields.len() < 5 {
        return Err(Error::parse(format!("bullet p attribute too short: '{p}'")));
    }
    let epoch: i64 = fields[4]
        .parse()
        .map_err(|_| Error::parse(format!("bullet post time: '{}'", fields[4])))?;
    Ok((fields[0].to_string(), stamp_from_secs(epoch)))
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn channel_rows_and_total() {
        let page = json!({
            "numResults": 63,
            "numPages": 3,
            "result": [
                {"bvid": "BV1xx", "arcurl": "https://example.com/v/BV1xx", "tag": "science,space"},
                {"bvid": "BV1yy", "arcurl": "https://example.com/v/BV1yy", "tag": ""},
            ]
        });
        let rows = parse_channel(&page).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].bvid, "BV1xx");
        assert_eq!(rows[0].tags, "science,space");
        assert_eq!(channel_total(&page).unwrap(), 63);
    }

    #[test]
    fn video_page_markers_slice_embedded_json() {
        let html = concat!(
            "<html><script>window.__INITIAL_STATE__={\"videoData\":",
            "{\"aid\":715024588,\"bvid\":\"BV16X4y1g7wT\",\"cid\":903,\"title\":\"t\",",
            "\"pubdate\":1662300000,\"duration\":213,\"stat\":{\"view\":100,\"like\":20,",
            "\"coin\":5,\"share\":3,\"favorite\":8,\"danmaku\":40,\"reply\":12}}",
            ",\"upData\":{\"mid\":42,\"name\":\"up\",\"sex\":\"保密\",\"fans\":999,",
            "\"attention\":10,\"level_info\":{\"current_level\":6},",
            "\"vip\":{\"label\":{\"text\":\"年度大会员\"}},\"Official\":{\"title\":\"\"},",
            "\"archiveCount\":77}",
            ",\"isCollection\":0};</script></html>",
        );
        let (video, uploader) = parse_video_page(html).unwrap();
        let row = parse_video(&video, &uploader).unwrap();
        assert_eq!(row.avid, 715024588);
        assert_eq!(row.bvid, "BV16X4y1g7wT");
        assert_eq!(row.cid, 903);
        assert_eq!(row.views, 100);
        assert_eq!(row.bullets, 40);
        assert_eq!(row.up_id, 42);
        assert_eq!(row.up_level, 6);
    }

    #[test]
    fn video_page_without_markers_is_an_error() {
        assert!(parse_video_page("<html>nothing embedded</html>").is_err());
    }

    #[test]
    fn comment_page_parses_and_null_replies_is_empty() {
        let page = json!({
            "data": {
                "cursor": {"all_count": 84},
                "replies": [{
                    "rpid": 1, "ctime": 1662300000, "like": 3,
                    "member": {"mid": 9, "uname": "u"},
                    "content": {"message": "nice"}
                }]
            }
        });
        let rows = parse_comments("BV1", &page).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].comment_id, 1);
        assert_eq!(comment_total(&page), Some(84));

        let done = json!({"data": {"cursor": {"all_count": 84}, "replies": null}});
        assert!(parse_comments("BV1", &done).unwrap().is_empty());

        let no_comments = json!({"data": {"cursor": {}}});
        assert_eq!(comment_total(&no_comments), None);
    }

    #[test]
    fn bullets_parse_offset_and_post_time() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?><i>
            <d p="12.345,1,25,16777215,1662300000,0,abc,123">front row</d>
            <d p="99.000,1,25,16777215,1662300001,0,def,456">second</d>
        </i>"#;
        let rows = parse_bullets("BV1", xml).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].entry, "12.345");
        assert_eq!(rows[0].content, "front row");
        assert_eq!(rows[0].posted, stamp_from_secs(1662300000));
    }

    #[test]
    fn malformed_bullet_attribute_is_an_error() {
        let xml = r#"<i><d p="only,three,fields">x</d></i>"#;
        assert!(parse_bullets("BV1", xml).is_err());
    }
}
