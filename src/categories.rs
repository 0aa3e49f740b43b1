use serde_json::Value;
use tokio::sync::OnceCell;

use crate::client::Http;
use crate::error::{Error, Result};
use crate::parser::{i64_at, str_at};

const CATEGORY_TREE_URL: &str =
    "https://m.ximalaya.com/m-revision/page/category/queryCategories";

/// Only the audiobook category accepts announcer/serialization filters.
const AUDIOBOOK_CODE: &str = "youshengshu";

#[derive(Debug, Clone)]
pub struct CategoryEntry {
    pub category_id: i64,
    pub category_name: String,
    pub category_code: String,
    pub subcategory_id: i64,
    pub subcategory_name: String,
    pub subcategory_code: String,
}

/// Flattened (category, subcategory) rows from the platform's category
/// tree. Fetched once per process and reused by every resolve call.
pub struct CategoryMap {
    entries: Vec<CategoryEntry>,
}

impl CategoryMap {
    pub fn from_json(tree: &Value) -> Result<Self> {
        let items = tree
            .get("data")
            .and_then(Value::as_array)
            .ok_or_else(|| Error::parse("category tree: missing data array"))?;

        let mut entries = Vec::new();
        for item in items {
            let category = item
                .get("category")
                .ok_or_else(|| Error::parse("category tree: missing category"))?;
            let category_id = i64_at(category, &["categoryId"])?;
            let category_name = str_at(category, &["displayName"])?;
            let category_code = str_at(category, &["code"])?;

            let subcategories = category
                .get("subCategories")
                .and_then(Value::as_array)
                .ok_or_else(|| Error::parse("category tree: missing subCategories"))?;
            for sub in subcategories {
                entries.push(CategoryEntry {
                    category_id,
                    category_name: category_name.clone(),
                    category_code: category_code.clone(),
                    subcategory_id: i64_at(sub, &["subCategoryId"])?,
                    subcategory_name: str_at(sub, &["displayValue"])?,
                    subcategory_code: str_at(sub, &["code"])?,
                });
            }
        }
        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[CategoryEntry] {
        &self.entries
    }

    /// Resolve display names (or codes, passed through unchanged) to the
    /// platform's (category_code, subcategory_code) pair. Matching is
    /// case-insensitive and exact; unknown names fail loudly.
    pub fn resolve(&self, category: &str, subcategory: Option<&str>) -> Result<(String, String)> {
        let wanted = category.trim().to_lowercase();
        let entry = self
            .entries
            .iter()
            .find(|e| e.category_code == wanted || e.category_name.to_lowercase() == wanted)
            .ok_or_else(|| Error::NotFound {
                what: "category",
                name: category.to_string(),
            })?;
        let category_code = entry.category_code.clone();

        let Some(subcategory) = subcategory else {
            return Ok((category_code, String::new()));
        };
        let wanted_sub = subcategory.trim().to_lowercase();
        let sub = self
            .entries
            .iter()
            .filter(|e| e.category_code == category_code)
            .find(|e| {
                e.subcategory_code == wanted_sub || e.subcategory_name.to_lowercase() == wanted_sub
            })
            .ok_or_else(|| Error::NotFound {
                what: "subcategory",
                name: format!("{subcategory} (in {category})"),
            })?;
        Ok((category_code, sub.subcategory_code.clone()))
    }
}

/// Process-lifetime cache around the category tree fetch.
pub struct Resolver {
    cell: OnceCell<CategoryMap>,
}

impl Resolver {
    pub fn new() -> Self {
        Self {
            cell: OnceCell::new(),
        }
    }

    pub async fn map(&self, http: &Http) -> Result<&CategoryMap> {
        self.cell
            .get_or_try_init(|| async {
                let tree = http.get_json(CATEGORY_TREE_URL, &[], &[]).await?;
                CategoryMap::from_json(&tree)
            })
            .await
    }

    pub async fn resolve(
        &self,
        http: &Http,
        category: &str,
        subcategory: Option<&str>,
    ) -> Result<(String, String)> {
        self.map(http).await?.resolve(category, subcategory)
    }
}

// ── Filters ──

/// Listing filters, resolved to platform codes before any request goes
/// out. Announcer/finished only apply to the audiobook category; paid
/// applies everywhere.
#[derive(Debug, Clone, Default)]
pub struct FilterSpec {
    announcer: Option<&'static str>,
    finished: Option<&'static str>,
    paid: Option<&'static str>,
}

impl FilterSpec {
    /// Parse `key=value` pairs. Invalid keys or values abort the
    /// invocation before any network call.
    pub fn parse(pairs: &[String]) -> Result<Self> {
        let mut spec = FilterSpec::default();
        for pair in pairs {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| Error::Config(format!("filter '{pair}', expected key=value")))?;
            match key.to_lowercase().as_str() {
                "announcer" => spec.announcer = Some(filter_code(key, value)?),
                "finished" => spec.finished = Some(filter_code(key, value)?),
                "paid" => spec.paid = Some(filter_code(key, value)?),
                other => {
                    return Err(Error::Config(format!(
                        "unknown filter '{other}'; expected announcer, finished, or paid"
                    )))
                }
            }
        }
        Ok(spec)
    }

    /// The `meta` query value for a listing request, or None when nothing
    /// applies to this category.
    pub fn meta(&self, category_code: &str) -> Option<String> {
        let codes: Vec<&str> = if category_code == AUDIOBOOK_CODE {
            [self.announcer, self.finished, self.paid]
                .into_iter()
                .flatten()
                .collect()
        } else {
            self.paid.into_iter().collect()
        };
        if codes.is_empty() {
            None
        } else {
            Some(codes.join("-"))
        }
    }
}

fn filter_code(key: &str, value: &str) -> Result<&'static str> {
    let code = match (key.to_lowercase().as_str(), value.to_lowercase().as_str()) {
        ("announcer", "single") => "272_4361",
        ("announcer", "double") => "272_4362",
        ("announcer", "multiple") => "272_4363",
        ("finished", "no") => "131_2559",
        ("finished", "yes") => "131_2560",
        ("paid", "no") => "132_2722",
        ("paid", "yes") => "132_2721",
        _ => {
            return Err(Error::Config(format!(
                "filter {key}={value}; 'announcer' takes single/double/multiple, \
                 'finished' and 'paid' take yes/no"
            )))
        }
    };
    Ok(code)
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture_map() -> CategoryMap {
        let tree: Value = serde_json::from_str(
            &std::fs::read_to_string("tests/fixtures/categories.json").unwrap(),
        )
        .unwrap();
        CategoryMap::from_json(&tree).unwrap()
    }

    #[test]
    fn resolves_display_names_case_insensitively() {
        let map = fixture_map();
        let (cat, sub) = map.resolve("有声书", Some("文学")).unwrap();
        assert_eq!(cat, "youshengshu");
        assert_eq!(sub, "wenxue");
        let (cat, _) = map.resolve("商业财经", None).unwrap();
        assert_eq!(cat, "shangye");
    }

    #[test]
    fn codes_pass_through_unchanged() {
        let map = fixture_map();
        // Same pair whether the caller supplies names or codes.
        let by_name = map.resolve("有声书", Some("文学")).unwrap();
        let by_code = map.resolve("youshengshu", Some("wenxue")).unwrap();
        let mixed = map.resolve("YOUSHENGSHU", Some("文学")).unwrap();
        assert_eq!(by_name, by_code);
        assert_eq!(by_name, mixed);
    }

    #[test]
    fn unknown_names_fail_loudly() {
        let map = fixture_map();
        assert!(matches!(
            map.resolve("不存在", None),
            Err(Error::NotFound { what: "category", .. })
        ));
        assert!(matches!(
            map.resolve("有声书", Some("不存在")),
            Err(Error::NotFound { what: "subcategory", .. })
        ));
        // Subcategory must live under the given category.
        assert!(map.resolve("商业财经", Some("文学")).is_err());
    }

    #[test]
    fn filters_resolve_to_platform_codes() {
        let spec =
            FilterSpec::parse(&["announcer=single".into(), "paid=yes".into()]).unwrap();
        assert_eq!(
            spec.meta("youshengshu").as_deref(),
            Some("272_4361-132_2721")
        );
        // Non-audiobook categories only honor the paid filter.
        assert_eq!(spec.meta("shangye").as_deref(), Some("132_2721"));
    }

    #[test]
    fn invalid_filters_fail_fast() {
        assert!(matches!(
            FilterSpec::parse(&["announcer=triple".into()]),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            FilterSpec::parse(&["colour=red".into()]),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            FilterSpec::parse(&["paid".into()]),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn empty_spec_yields_no_meta() {
        let spec = FilterSpec::default();
        assert!(spec.meta("youshengshu").is_none());
        assert!(spec.meta("shangye").is_none());
    }
}
