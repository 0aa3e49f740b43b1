use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, COOKIE, USER_AGENT};
use tracing::info;

use crate::client::{Http, BROWSER_UA};
use crate::error::{Error, Result};
use crate::parser::baidu::parse_news;
use crate::records::NewsRow;
use crate::sink::CsvSink;

const SEARCH_URL: &str = "https://www.baidu.com/s";
const PAGE_DELAY: Duration = Duration::from_secs(2);

/// News search over the word × page product. The search endpoint rejects
/// anonymous sessions quickly, so a logged-in cookie is passed with every
/// request. Pages are fetched sequentially behind the rate gate; a failed
/// page aborts the crawl (nothing downstream can be trusted once the
/// platform starts serving captchas).
pub async fn crawl_news(
    words: &[String],
    pages: u64,
    cookie: Option<&str>,
    sink: &CsvSink,
) -> Result<Vec<NewsRow>> {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_UA));
    if let Some(cookie) = cookie {
        let value = HeaderValue::from_str(cookie)
            .map_err(|_| Error::Config("cookie contains invalid header characters".into()))?;
        headers.insert(COOKIE, value);
    }
    let http = Http::new(headers, PAGE_DELAY)?;

    let mut all = Vec::new();
    for word in words {
        for page in 0..pages {
            let params = [
                ("rtt", "1".to_string()),
                ("bsst", "1".to_string()),
                ("cl", "2".to_string()),
                ("tn", "news".to_string()),
                ("rsv_dl", "ns_pc".to_string()),
                ("word", word.clone()),
                ("pn", page.to_string()),
            ];
            let html = http.get_text(SEARCH_URL, &params, &[]).await?;
            let rows = parse_news(&html, word)?;
            sink.append(&rows)?;
            info!(
                word = %word,
                page = page + 1,
                count = rows.len(),
                "saved news results"
            );
            all.extend(rows);
        }
    }
    Ok(all)
}
