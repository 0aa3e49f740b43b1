use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use serde_json::Value;
use tracing::info;

use super::run_all;
use crate::categories::{FilterSpec, Resolver};
use crate::client::Http;
use crate::error::{Error, Result};
use crate::paginate;
use crate::parser::ximalaya as parse;
use crate::records::{AlbumBasicRow, AlbumDetailRow, ListingRow, TrackRow};
use crate::sink::{CsvSink, Store};

const LISTING_URL: &str = "https://www.ximalaya.com/revision/category/queryCategoryPageAlbums";
const SCORE_URL: &str = "https://www.ximalaya.com/revision/comment/albumStatistics";
const PRICE_URL: &str = "https://www.ximalaya.com/revision/bdsp/album/pay/schema";
const AUTHOR_URL: &str = "https://www.ximalaya.com/revision/user/basic";
const VERIFY_URL: &str = "https://m.ximalaya.com/m-revision/page/anchor/queryAnchorPage";
const BROWSE_URL: &str = "https://www.ximalaya.com";

const LISTING_PAGE_SIZE: u64 = 50;
const TRACK_PAGE_SIZE: u64 = 50;
const FETCH_DELAY: Duration = Duration::from_secs(1);

/// Categories without filter metadata answer the meta parameter with
/// this marker instead of albums.
const NO_FILTER_MARKER: &str = "metadataValues not find";

/// One listing page to fetch. Immutable once dispatched to the pool.
#[derive(Clone)]
pub struct PageRequest {
    pub category: String,
    pub subcategory: String,
    pub category_code: String,
    pub subcategory_code: String,
    pub page: u64,
    pub meta: Option<String>,
}

pub struct Ximalaya {
    http: Arc<Http>,
    resolver: Resolver,
}

impl Ximalaya {
    pub fn new() -> Result<Self> {
        Ok(Self {
            http: Arc::new(Http::plain(FETCH_DELAY)?),
            resolver: Resolver::new(),
        })
    }

    pub async fn print_categories(&self) -> Result<()> {
        let map = self.resolver.map(&self.http).await?;
        println!(
            "{:>4} | {:<12} | {:<14} | {:>4} | {:<12} | {:<14}",
            "#", "Category", "Code", "#", "Subcategory", "Code"
        );
        println!("{}", "-".repeat(76));
        for entry in map.entries() {
            println!(
                "{:>4} | {:<12} | {:<14} | {:>4} | {:<12} | {:<14}",
                entry.category_id,
                entry.category_name,
                entry.category_code,
                entry.subcategory_id,
                entry.subcategory_name,
                entry.subcategory_code
            );
        }
        Ok(())
    }

    /// Paginated album listing for one category, fanned out over
    /// (subcategory × page). Category resolution failures abort before
    /// anything is dispatched.
    pub async fn crawl_albums(
        &self,
        category: &str,
        subcategories: &[String],
        filters: &FilterSpec,
        pages: Option<u64>,
        workers: usize,
        csv: Option<&CsvSink>,
        store: Option<&Store>,
    ) -> Result<Vec<AlbumBasicRow>> {
        let subs: Vec<Option<&str>> = if subcategories.is_empty() {
            vec![None]
        } else {
            subcategories.iter().map(|s| Some(s.as_str())).collect()
        };

        let mut requests = Vec::new();
        for sub in subs {
            let (category_code, subcategory_code) =
                self.resolver.resolve(&self.http, category, sub).await?;
            let probe = PageRequest {
                category: category.to_string(),
                subcategory: sub.unwrap_or("").to_string(),
                meta: filters.meta(&category_code),
                category_code,
                subcategory_code,
                page: 1,
            };
            let first = fetch_listing(&self.http, &probe).await?;
            let total = parse::album_total(&first)?;
            info!(
                category,
                subcategory = %probe.subcategory,
                total,
                "planned listing pages"
            );
            for page in paginate::plan(
                total,
                LISTING_PAGE_SIZE,
                pages,
                paginate::PLATFORM_PAGE_CAP,
            ) {
                requests.push(PageRequest {
                    page,
                    ..probe.clone()
                });
            }
        }

        let http = Arc::clone(&self.http);
        let (results, stats) = run_all(
            requests,
            workers,
            |r| format!("listing {}/{} page {}", r.category, r.subcategory, r.page),
            move |request| {
                let http = Arc::clone(&http);
                async move {
                    let page_json = fetch_listing(&http, &request).await?;
                    parse::parse_album_page(&page_json, &request.category, &request.subcategory)
                }
            },
            |rows| persist_basic(rows, csv, store),
        )
        .await?;

        info!(ok = stats.ok, errors = stats.errors, "album listing crawl finished");
        Ok(results.into_iter().flatten().collect())
    }

    /// Merged detail rows, one fan-out task per album id.
    pub async fn crawl_details(
        &self,
        album_ids: Vec<i64>,
        workers: usize,
        csv: Option<&CsvSink>,
        store: Option<&Store>,
    ) -> Result<Vec<AlbumDetailRow>> {
        let http = Arc::clone(&self.http);
        let (results, stats) = run_all(
            album_ids,
            workers,
            |id| format!("album {id}"),
            move |album_id| {
                let http = Arc::clone(&http);
                async move { fetch_album_detail(&http, album_id).await }
            },
            |row| {
                if let Some(csv) = csv {
                    csv.append(std::slice::from_ref(row))?;
                }
                if let Some(store) = store {
                    store.insert_album_details(std::slice::from_ref(row))?;
                }
                Ok(())
            },
        )
        .await?;

        info!(ok = stats.ok, errors = stats.errors, "album detail crawl finished");
        Ok(results)
    }

    /// Track rows, one fan-out task per album; each task pages through
    /// the album's own track listing.
    pub async fn crawl_tracks(
        &self,
        album_ids: Vec<i64>,
        workers: usize,
        csv: Option<&CsvSink>,
        store: Option<&Store>,
    ) -> Result<Vec<TrackRow>> {
        let http = Arc::clone(&self.http);
        let (results, stats) = run_all(
            album_ids,
            workers,
            |id| format!("tracks of album {id}"),
            move |album_id| {
                let http = Arc::clone(&http);
                async move { fetch_album_tracks(&http, album_id).await }
            },
            |rows| {
                if let Some(csv) = csv {
                    csv.append(rows)?;
                }
                if let Some(store) = store {
                    store.insert_tracks(rows)?;
                }
                Ok(())
            },
        )
        .await?;

        info!(ok = stats.ok, errors = stats.errors, "track crawl finished");
        Ok(results.into_iter().flatten().collect())
    }

    /// Album cards from the category browse pages (the HTML listing).
    /// Sequential: the browse site throttles aggressively.
    pub async fn crawl_listing(
        &self,
        category_slug: &str,
        pages: Option<u64>,
        sink: &CsvSink,
    ) -> Result<Vec<ListingRow>> {
        let mut all = Vec::new();
        for page in 1..=pages
            .unwrap_or(paginate::PLATFORM_PAGE_CAP)
            .min(paginate::PLATFORM_PAGE_CAP)
        {
            let url = if page == 1 {
                format!("{BROWSE_URL}/{category_slug}/")
            } else {
                format!("{BROWSE_URL}/{category_slug}/p{page}/")
            };
            let html = self.http.get_text(&url, &[], &[]).await?;
            let rows = parse::parse_listing_html(&html, category_slug)?;
            if rows.is_empty() {
                info!(category_slug, page, "empty browse page, stopping");
                break;
            }
            sink.append(&rows)?;
            info!(category_slug, page, count = rows.len(), "saved browse page");
            all.extend(rows);
        }
        Ok(all)
    }

    pub fn http(&self) -> Arc<Http> {
        Arc::clone(&self.http)
    }
}

fn persist_basic(
    rows: &[AlbumBasicRow],
    csv: Option<&CsvSink>,
    store: Option<&Store>,
) -> Result<()> {
    if let Some(csv) = csv {
        csv.append(rows)?;
    }
    if let Some(store) = store {
        let outcome = store.insert_album_basic(rows)?;
        if outcome.skipped > 0 {
            info!(
                inserted = outcome.inserted,
                skipped = outcome.skipped,
                "duplicate albums skipped"
            );
        }
    }
    Ok(())
}

fn listing_params(request: &PageRequest, with_meta: bool) -> Vec<(&'static str, String)> {
    let mut params = vec![
        ("category", request.category_code.clone()),
        ("subcategory", request.subcategory_code.clone()),
        ("sort", "0".to_string()),
        ("page", request.page.to_string()),
        ("perPage", LISTING_PAGE_SIZE.to_string()),
        ("useCache", "false".to_string()),
    ];
    if with_meta {
        if let Some(meta) = &request.meta {
            params.push(("meta", meta.clone()));
        }
    }
    params
}

async fn fetch_listing(http: &Http, request: &PageRequest) -> Result<Value> {
    let body = http
        .get_text(LISTING_URL, &listing_params(request, true), &[])
        .await?;
    // Some categories have no filter metadata at all; retry bare.
    let body = if request.meta.is_some() && body.contains(NO_FILTER_MARKER) {
        http.get_text(LISTING_URL, &listing_params(request, false), &[])
            .await?
    } else {
        body
    };
    serde_json::from_str(&body).map_err(|e| Error::parse(format!("album listing: {e}")))
}

async fn fetch_album_detail(http: &Http, album_id: i64) -> Result<AlbumDetailRow> {
    let ms = Local::now().timestamp_millis();
    let album_url = format!("https://mobile.ximalaya.com/mobile/v1/album/ts-{ms}");
    let album_doc = http
        .get_json(&album_url, &[("albumId", album_id.to_string())], &[])
        .await?;
    let uid = crate::parser::i64_at(&album_doc, &["data", "album", "uid"])?;

    // Popularity score is cosmetic; a failed statistics fetch degrades
    // to an empty column instead of losing the album.
    let score_10 = match http
        .get_json(&format!("{SCORE_URL}/{album_id}"), &[], &[])
        .await
    {
        Ok(doc) => parse::parse_album_score(&doc),
        Err(_) => None,
    };

    let price_doc = http
        .get_json(
            PRICE_URL,
            &[
                ("id", album_id.to_string()),
                ("productType", "1".to_string()),
            ],
            &[],
        )
        .await?;
    let author_doc = http
        .get_json(AUTHOR_URL, &[("uid", uid.to_string())], &[])
        .await?;
    let verify_doc = http
        .get_json(&format!("{VERIFY_URL}/{uid}"), &[], &[])
        .await?;

    parse::parse_album_detail(album_id, &album_doc, score_10, &price_doc, &author_doc, &verify_doc)
}

async fn fetch_album_tracks(http: &Http, album_id: i64) -> Result<Vec<TrackRow>> {
    let first = fetch_track_page(http, album_id, 1).await?;
    let max_page = parse::track_max_page(&first)?;
    let mut rows = parse::parse_track_page(album_id, &first)?;
    for page in 2..=max_page {
        let doc = fetch_track_page(http, album_id, page).await?;
        rows.extend(parse::parse_track_page(album_id, &doc)?);
    }
    Ok(rows)
}

async fn fetch_track_page(http: &Http, album_id: i64, page: u64) -> Result<Value> {
    let ms = Local::now().timestamp_millis();
    let url = format!("https://mobile.ximalaya.com/mobile/v1/album/track/ts-{ms}");
    http.get_json(
        &url,
        &[
            ("albumId", album_id.to_string()),
            ("pageSize", TRACK_PAGE_SIZE.to_string()),
            ("pageId", page.to_string()),
        ],
        &[],
    )
    .await
}
