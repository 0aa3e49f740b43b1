use scraper::{Html, Selector};
use serde_json::Value;

use super::{bool_at, count, f64_opt, i64_at, i64_opt, str_at, str_opt, walk};
use crate::error::{Error, Result};
use crate::records::{
    now_stamp, stamp_from_millis, AlbumBasicRow, AlbumDetailRow, ListingRow, TrackRow,
};

/// Paid tracks point at a CDN host that refuses plain downloads; the
/// trial endpoint serves the same path.
const AUDIO_HOST: &str = "http://aod.cos.tx.xmcdn.com/";
const TRIAL_AUDIO_HOST: &str = "https://audiopay.cos.tx.xmcdn.com/download/1.0.0/";

/// Total album count reported by a listing response.
pub fn album_total(page: &Value) -> Result<u64> {
    i64_at(page, &["data", "total"]).map(|n| n.max(0) as u64)
}

/// Albums from one listing page of the category API.
pub fn parse_album_page(
    page: &Value,
    category: &str,
    subcategory: &str,
) -> Result<Vec<AlbumBasicRow>> {
    let albums = walk(page, &["data", "albums"])?
        .as_array()
        .ok_or_else(|| Error::parse("album listing: albums is not an array"))?;

    let mut rows = Vec::new();
    for album in albums {
        rows.push(AlbumBasicRow {
            album_id: i64_at(album, &["albumId"])?,
            paid: bool_at(album, &["isPaid"])?,
            finished: i64_at(album, &["isFinished"])?,
            vip_type: i64_at(album, &["vipType"])?,
            category: category.to_string(),
            subcategory: subcategory.to_string(),
        });
    }
    Ok(rows)
}

/// Merge the album, price, author and verification documents into one
/// detail row. Ids, titles and counters are structural; scores, tags and
/// signatures degrade to None when the platform omits them.
pub fn parse_album_detail(
    album_id: i64,
    album_doc: &Value,
    score_10: Option<f64>,
    price_doc: &Value,
    author_doc: &Value,
    verify_doc: &Value,
) -> Result<AlbumDetailRow> {
    let album = walk(album_doc, &["data", "album"])?;
    let price = walk(price_doc, &["data", "albumPrice"])?;
    let author = walk(author_doc, &["data"])?;
    let verify = walk(verify_doc, &["data", "anchorInfo", "userInfo"])?;

    // Retail albums price per track, whole albums in one sum.
    let retail = price.get("retailAlbum").filter(|v| !v.is_null());
    let whole = price.get("wholeAlbum").filter(|v| !v.is_null());
    let (album_price, price_single) = match (retail, whole) {
        (Some(retail), _) => (
            f64_opt(retail, &["unBroughtTotalAmount"]),
            f64_opt(retail, &["singlePrice"]),
        ),
        (None, Some(whole)) => (f64_opt(whole, &["price"]), None),
        (None, None) => (None, None),
    };

    Ok(AlbumDetailRow {
        album_id,
        title: str_at(album, &["title"])?,
        subtitle: str_opt(album, &["customSubTitle"]),
        info: str_opt(album, &["intro"]),
        tags: str_opt(album, &["tags"]),
        cover: str_opt(album, &["coverSmall"])
            .map(|c| c.split('!').next().unwrap_or_default().to_string()),
        score: f64_opt(album, &["score"]),
        score_10,
        created: stamp_from_millis(i64_at(album, &["createdAt"])?),
        tracks: i64_at(album, &["tracks"])?,
        plays: i64_at(album, &["playTimes"])?,
        comments: i64_opt(album, &["commentsCount"]),
        subscribes: i64_at(album, &["subscribeCount"])?,
        paid_type: i64_at(price, &["paidType"])?,
        price: album_price,
        price_single,
        author_id: i64_at(author, &["uid"])?,
        author_name: str_at(author, &["nickName"])?,
        author_gender: i64_at(author, &["gender"])?,
        author_level: i64_at(author, &["anchorGrade"])?,
        author_vip: bool_at(author, &["isVip"])?,
        author_signature: str_opt(author, &["personalSignature"]),
        author_desc: str_opt(author, &["personalDescription"]),
        author_headimg: format!("https{}", str_at(author, &["cover"])?),
        author_following: i64_at(author, &["followingCount"])?,
        author_followers: i64_at(author, &["fansCount"])?,
        author_albums: i64_at(author, &["albumsCount"])?,
        author_tracks: i64_at(author, &["tracksCount"])?,
        author_verified: i64_at(verify, &["verifyStatus"])?,
        author_verified_type: i64_at(verify, &["verifyType"])?,
        author_verified_desc: str_opt(verify, &["ptitle"]),
    })
}

/// Popularity score from the statistics endpoint; cosmetic, so a missing
/// field is simply None.
pub fn parse_album_score(stats_doc: &Value) -> Option<f64> {
    f64_opt(stats_doc, &["data", "albumScore"])
}

/// Deepest page of a track listing.
pub fn track_max_page(page: &Value) -> Result<u64> {
    i64_at(page, &["data", "maxPageId"]).map(|n| n.max(0) as u64)
}

/// Tracks from one page of an album's track API.
pub fn parse_track_page(album_id: i64, page: &Value) -> Result<Vec<TrackRow>> {
    let tracks = walk(page, &["data", "list"])?
        .as_array()
        .ok_or_else(|| Error::parse("track page: list is not an array"))?;

    let mut rows = Vec::new();
    for track in tracks {
        let audio = str_opt(track, &["playUrl32"])
            .map(|url| url.replace(AUDIO_HOST, TRIAL_AUDIO_HOST))
            .unwrap_or_default();
        rows.push(TrackRow {
            album_id,
            track_id: i64_at(track, &["trackId"])?,
            name: str_at(track, &["title"])?,
            duration: i64_at(track, &["duration"])?,
            plays: i64_at(track, &["playtimes"])?,
            likes: i64_at(track, &["likes"])?,
            comments: i64_at(track, &["comments"])?,
            created: stamp_from_millis(i64_at(track, &["createdAt"])?),
            audio,
        });
    }
    Ok(rows)
}

/// Album cards from a category browse page (the HTML variant of the
/// listing). Listen counters come abbreviated and are normalized here.
pub fn parse_listing_html(html: &str, category: &str) -> Result<Vec<ListingRow>> {
    let document = Html::parse_document(html);
    let item_sel = Selector::parse("div.content li").unwrap();
    let title_sel = Selector::parse("a.album-title").unwrap();
    let author_sel = Selector::parse("a.album-author").unwrap();
    let listens_sel = Selector::parse("p.listen-count").unwrap();
    let corner_sel = Selector::parse("div a").unwrap();

    let crawl_time = now_stamp();
    let mut rows = Vec::new();
    for item in document.select(&item_sel) {
        let title_el = item
            .select(&title_sel)
            .next()
            .ok_or_else(|| Error::parse("album card: missing title"))?;
        let title = title_el
            .value()
            .attr("title")
            .ok_or_else(|| Error::parse("album card: title attr absent"))?
            .to_string();
        let url = title_el
            .value()
            .attr("href")
            .ok_or_else(|| Error::parse("album card: href absent"))?
            .to_string();

        let listens_raw = item
            .select(&listens_sel)
            .next()
            .map(|e| e.text().collect::<String>())
            .ok_or_else(|| Error::parse("album card: missing listen count"))?;

        rows.push(ListingRow {
            title,
            author: item
                .select(&author_sel)
                .next()
                .map(|e| e.text().collect::<String>().trim().to_string())
                .unwrap_or_default(),
            url,
            paid_type: paid_type_of(&item, &corner_sel),
            listens: count::parse_count(listens_raw.trim())?,
            category: category.to_string(),
            crawl_time: crawl_time.clone(),
        });
    }
    Ok(rows)
}

/// Paid type from the card's corner-mark class: corner-lg-mark is the
/// free tier, the rest keep their own name.
fn paid_type_of(item: &scraper::ElementRef, corner_sel: &Selector) -> String {
    let class = item
        .select(corner_sel)
        .filter_map(|a| a.value().attr("class"))
        .flat_map(|c| c.split_whitespace())
        .find(|c| c.starts_with("corner-"));
    match class {
        Some(mark) => {
            let name = mark
                .trim_start_matches("corner-")
                .trim_end_matches("-mark")
                .replace('-', " ");
            if name == "lg" {
                "free".to_string()
            } else {
                name
            }
        }
        None => "free".to_string(),
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn album_page_rows_carry_category_names() {
        let page = json!({
            "data": {
                "total": 120,
                "albums": [
                    {"albumId": 101, "isPaid": true, "isFinished": 2, "vipType": 1},
                    {"albumId": 102, "isPaid": false, "isFinished": 1, "vipType": 0},
                ]
            }
        });
        let rows = parse_album_page(&page, "有声书", "文学").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].album_id, 101);
        assert!(rows[0].paid);
        assert_eq!(rows[1].vip_type, 0);
        assert!(rows.iter().all(|r| r.category == "有声书"));
        assert_eq!(album_total(&page).unwrap(), 120);
    }

    #[test]
    fn album_without_id_fails_the_record() {
        let page = json!({"data": {"albums": [{"isPaid": true, "isFinished": 0, "vipType": 0}]}});
        assert!(parse_album_page(&page, "c", "").is_err());
    }

    fn detail_docs() -> (Value, Value, Value, Value) {
        let album = json!({"data": {"album": {
            "albumId": 101, "title": "晚安故事", "customSubTitle": "",
            "intro": "intro text", "tags": "故事,睡前",
            "coverSmall": "//img.example.com/c.jpg!op_type=5",
            "score": 4.5, "createdAt": 1_600_000_000_000i64,
            "tracks": 120, "playTimes": 9000, "commentsCount": 55,
            "subscribeCount": 800, "uid": 7
        }}});
        let price = json!({"data": {"albumPrice": {
            "paidType": 2,
            "retailAlbum": {"unBroughtTotalAmount": 99.0, "singlePrice": 0.5}
        }}});
        let author = json!({"data": {
            "uid": 7, "nickName": "主播甲", "gender": 1, "anchorGrade": 10,
            "isVip": true, "personalSignature": "sig", "personalDescription": null,
            "cover": "://img.example.com/a.png", "followingCount": 5,
            "fansCount": 1000, "albumsCount": 3, "tracksCount": 300
        }});
        let verify = json!({"data": {"anchorInfo": {"userInfo": {
            "verifyStatus": 3, "verifyType": 2, "ptitle": "官方认证"
        }}}});
        (album, price, author, verify)
    }

    #[test]
    fn detail_row_merges_all_documents() {
        let (album, price, author, verify) = detail_docs();
        let row = parse_album_detail(101, &album, Some(8.6), &price, &author, &verify).unwrap();
        assert_eq!(row.title, "晚安故事");
        assert_eq!(row.cover.as_deref(), Some("//img.example.com/c.jpg"));
        assert_eq!(row.score_10, Some(8.6));
        assert_eq!(row.paid_type, 2);
        assert_eq!(row.price, Some(99.0));
        assert_eq!(row.price_single, Some(0.5));
        assert_eq!(row.author_name, "主播甲");
        assert_eq!(row.author_headimg, "https://img.example.com/a.png");
        assert_eq!(row.author_verified, 3);
        // Empty subtitle and null description are sentinels, not errors.
        assert!(row.subtitle.is_none());
        assert!(row.author_desc.is_none());
    }

    #[test]
    fn whole_album_pricing_has_no_single_price() {
        let (album, _, author, verify) = detail_docs();
        let price = json!({"data": {"albumPrice": {
            "paidType": 1, "wholeAlbum": {"price": 30.0}
        }}});
        let row = parse_album_detail(101, &album, None, &price, &author, &verify).unwrap();
        assert_eq!(row.price, Some(30.0));
        assert!(row.price_single.is_none());
        assert!(row.score_10.is_none());
    }

    #[test]
    fn track_page_rewrites_trial_audio_host() {
        let page = json!({"data": {
            "maxPageId": 3,
            "list": [{
                "trackId": 9001, "title": "第1集", "duration": 1800,
                "playtimes": 100, "likes": 5, "comments": 2,
                "createdAt": 1_600_000_000_000i64,
                "playUrl32": "http://aod.cos.tx.xmcdn.com/group1/a.m4a"
            }, {
                "trackId": 9002, "title": "第2集", "duration": 1700,
                "playtimes": 90, "likes": 4, "comments": 1,
                "createdAt": 1_600_000_100_000i64,
                "playUrl32": ""
            }]
        }});
        let rows = parse_track_page(101, &page).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(
            rows[0].audio,
            "https://audiopay.cos.tx.xmcdn.com/download/1.0.0/group1/a.m4a"
        );
        // Paid-only tracks keep an empty audio URL.
        assert_eq!(rows[1].audio, "");
        assert_eq!(track_max_page(&page).unwrap(), 3);
    }

    #[test]
    fn listing_html_normalizes_counts_and_paid_marks() {
        let html = std::fs::read_to_string("tests/fixtures/category_listing.html").unwrap();
        let rows = parse_listing_html(&html, "shangye").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].title, "商业风云录");
        assert_eq!(rows[0].listens, 1200);
        assert_eq!(rows[0].paid_type, "free");
        assert_eq!(rows[1].paid_type, "vip");
        assert_eq!(rows[1].listens, 30_000_000);
    }
}
