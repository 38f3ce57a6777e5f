use crate::fetch::{Fetcher, Transport};
use crate::model::ArticleEntry;
use crate::parser::element_text;
use chrono::NaiveDate;
use scraper::{Html, Selector};
use std::sync::LazyLock;
use tracing::{error, info, warn};
use url::Url;

static ARTICLE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("article").expect("article selector must parse"));
static LINK: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").expect("link selector must parse"));

/// `https://origin/YYYY/MM/DD/`
pub fn index_url(base_url: &str, date: NaiveDate) -> String {
    format!(
        "{}/{}/",
        base_url.trim_end_matches('/'),
        date.format("%Y/%m/%d")
    )
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexListing {
    pub entries: Vec<ArticleEntry>,
    pub skipped: usize,
}

/// Fetches the index page for `date` and enumerates its articles. A failed
/// fetch is logged and reported as an empty listing.
pub fn list_articles<T: Transport>(
    fetcher: &mut Fetcher<T>,
    base_url: &str,
    date: NaiveDate,
) -> IndexListing {
    let url = index_url(base_url, date);
    info!(%url, "fetching index page");

    let page = match fetcher.fetch(&url) {
        Ok(page) => page,
        Err(err) => {
            error!(%url, error = %err, "index fetch failed");
            return IndexListing::default();
        }
    };

    let listing = parse_index(&page.body, &url);
    info!(
        %url,
        %date,
        articles = listing.entries.len(),
        skipped = listing.skipped,
        "index parsed"
    );
    listing
}

/// Each `article` contributes its first anchor that has both an href and
/// visible text.
pub fn parse_index(html: &str, page_url: &str) -> IndexListing {
    let document = Html::parse_document(html);
    let base = Url::parse(page_url).ok();
    let mut listing = IndexListing::default();

    for (idx, article) in document.select(&ARTICLE).enumerate() {
        let anchor = article.select(&LINK).find_map(|a| {
            let title = element_text(a);
            let href = a.value().attr("href")?.trim();
            (!title.is_empty() && !href.is_empty()).then(|| (title, href.to_string()))
        });

        let Some((title, href)) = anchor else {
            warn!(article = idx + 1, "no title link found in article; skipping");
            listing.skipped += 1;
            continue;
        };

        let detail_url = match &base {
            Some(base) => match base.join(&href) {
                Ok(joined) => joined.to_string(),
                Err(err) => {
                    warn!(article = idx + 1, %href, error = %err, "unusable article link; skipping");
                    listing.skipped += 1;
                    continue;
                }
            },
            None => match Url::parse(&href) {
                Ok(parsed) => parsed.to_string(),
                Err(err) => {
                    warn!(article = idx + 1, %href, error = %err, "unusable article link; skipping");
                    listing.skipped += 1;
                    continue;
                }
            },
        };

        listing.entries.push(ArticleEntry { title, detail_url });
    }

    listing
}
