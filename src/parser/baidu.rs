use scraper::{ElementRef, Html, Selector};

use crate::error::{Error, Result};
use crate::records::{now_stamp, NewsRow};

/// Extract news results from a search results page. Title, link, source
/// and abstract are structural; the publication date is cosmetic and
/// degrades to empty when the platform omits it.
pub fn parse_news(html: &str, search_word: &str) -> Result<Vec<NewsRow>> {
    let document = Html::parse_document(html);
    let content_sel = Selector::parse("#content_left").unwrap();
    let result_sel = Selector::parse("div.result-op.c-container.xpath-log.new-pmd").unwrap();
    let title_sel = Selector::parse("h3 a").unwrap();
    let summary_sel = Selector::parse("div.c-span-last span.c-color-text").unwrap();
    let source_sel = Selector::parse("div.c-span-last span.c-color-gray").unwrap();
    let date_sel = Selector::parse("div.c-span-last span.c-color-gray2").unwrap();

    let content = document
        .select(&content_sel)
        .next()
        .ok_or_else(|| Error::parse("news page: no result container"))?;

    let crawl_time = now_stamp();
    let mut rows = Vec::new();
    for item in content.select(&result_sel) {
        let anchor = item
            .select(&title_sel)
            .next()
            .ok_or_else(|| Error::parse("news result: missing title link"))?;
        let url = anchor
            .value()
            .attr("href")
            .ok_or_else(|| Error::parse("news result: title link has no href"))?
            .to_string();

        rows.push(NewsRow {
            title: text_of(anchor),
            summary: item
                .select(&summary_sel)
                .next()
                .map(text_of)
                .ok_or_else(|| Error::parse("news result: missing abstract"))?,
            url,
            source: item
                .select(&source_sel)
                .next()
                .map(text_of)
                .ok_or_else(|| Error::parse("news result: missing source"))?,
            date: item.select(&date_sel).next().map(text_of),
            search_word: search_word.to_string(),
            crawl_time: crawl_time.clone(),
        });
    }
    Ok(rows)
}

fn text_of(element: ElementRef) -> String {
    element.text().collect::<Vec<_>>().join("").trim().to_string()
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> String {
        std::fs::read_to_string("tests/fixtures/news_results.html").unwrap()
    }

    #[test]
    fn extracts_all_result_cards() {
        let rows = parse_news(&fixture(), "健康").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].title, "健康饮食新指南发布");
        assert_eq!(rows[0].url, "https://news.example.com/a1");
        assert_eq!(rows[0].source, "新华网");
        assert_eq!(rows[0].date.as_deref(), Some("2小时前"));
        assert!(rows.iter().all(|r| r.search_word == "健康"));
    }

    #[test]
    fn missing_date_is_empty_not_fatal() {
        let rows = parse_news(&fixture(), "健康").unwrap();
        assert!(rows[1].date.is_none());
    }

    #[test]
    fn parse_is_deterministic() {
        let html = fixture();
        let a: Vec<_> = parse_news(&html, "w")
            .unwrap()
            .iter()
            .map(|r| (r.title.clone(), r.url.clone()))
            .collect();
        let b: Vec<_> = parse_news(&html, "w")
            .unwrap()
            .iter()
            .map(|r| (r.title.clone(), r.url.clone()))
            .collect();
        assert_eq!(a, b);
    }

    #[test]
    fn page_without_container_is_an_error() {
        assert!(parse_news("<html><body>verify</body></html>", "w").is_err());
    }
}
