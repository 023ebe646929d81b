//! Naver News section scraper.
//!
//! Each section listing (`main.naver?mode=LSD&mid=shm&sid1=<code>`) groups
//! headlines into clusters and reports how many related articles each cluster
//! holds. The cluster with the largest count is taken as the section's top
//! story and its article page is scraped for the body text.

use once_cell::sync::Lazy;
use reqwest::Client;
use scraper::{ElementRef, Html, Node, Selector};
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::error::{NewsError, Result};
use crate::models::{Category, ListingItem, NewsArticle};
use crate::utils::{normalize_text, truncate_for_log};

/// Body returned when an article page has no content container.
pub const NOT_FOUND_BODY: &str = "News content not found.";

/// Inline decoration whose text is dropped from the body.
const STRIPPED_TAGS: [&str; 4] = ["strong", "em", "b", "td"];

static ITEM: Lazy<Selector> =
    Lazy::new(|| Selector::parse("li.sh_item._cluster_content").unwrap());
static ITEM_LINK: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").unwrap());
static ITEM_HEADLINE: Lazy<Selector> = Lazy::new(|| Selector::parse("a.sh_text_headline").unwrap());
static ITEM_COUNT: Lazy<Selector> =
    Lazy::new(|| Selector::parse("span.sh_head_more_icon_num").unwrap());
static ARTICLE_BODY: Lazy<Selector> =
    Lazy::new(|| Selector::parse("article.go_trans._article_content").unwrap());

/// Listing URL of a section.
pub fn listing_url(base: &str, category: Category) -> String {
    format!("{}{}", base, category.code())
}

/// Pick the listing item with the highest engagement count.
///
/// The scan starts from [`ListingItem::placeholder`] and only replaces the
/// current pick on a strictly greater count, so the first of several equal
/// maxima wins and a listing without any positive count yields the
/// placeholder.
///
/// # Arguments
///
/// * `items` - Listing items in page order
///
/// # Returns
///
/// The winning item, or the placeholder (empty url and title, count 0).
///
/// # Examples
///
/// ```ignore
/// let top = select_top_item(vec![item("a", 3), item("b", 7), item("c", 7)]);
/// assert_eq!(top.title, "b");
/// assert!(select_top_item(Vec::new()).is_placeholder());
/// ```
pub fn select_top_item<I>(items: I) -> ListingItem
where
    I: IntoIterator<Item = ListingItem>,
{
    items
        .into_iter()
        .fold(ListingItem::placeholder(), |best, item| {
            if item.count > best.count { item } else { best }
        })
}

/// Parse the items of a section listing page.
///
/// Items missing a link, a headline or a numeric count are skipped.
pub fn parse_listing(html: &str, page_url: &Url) -> Vec<ListingItem> {
    let document = Html::parse_document(html);
    let mut items = Vec::new();

    for (position, li) in document.select(&ITEM).enumerate() {
        let href = li
            .select(&ITEM_LINK)
            .next()
            .and_then(|a| a.value().attr("href"));
        let title = li
            .select(&ITEM_HEADLINE)
            .next()
            .map(|a| a.text().collect::<String>());
        let count = li
            .select(&ITEM_COUNT)
            .next()
            .map(|span| span.text().collect::<String>());

        let (Some(href), Some(title), Some(count)) = (href, title, count) else {
            warn!(position, "Listing item is missing a field; skipping");
            continue;
        };
        let Ok(count) = count.trim().parse::<u32>() else {
            warn!(position, raw = %count.trim(), "Unparsable engagement count; skipping");
            continue;
        };
        let url = match page_url.join(href) {
            Ok(url) => url.to_string(),
            Err(e) => {
                warn!(position, %href, error = %e, "Unresolvable article link; skipping");
                continue;
            }
        };

        items.push(ListingItem {
            url,
            title: title.trim().to_string(),
            count,
        });
    }
    items
}

/// Fetch a section listing and select its top item.
///
/// # Arguments
///
/// * `client` - Shared HTTP client
/// * `base_url` - Listing endpoint ending in `sid1=`; the section code is appended
/// * `category` - Section to fetch
///
/// # Returns
///
/// The item with the highest engagement count, or the placeholder when the
/// listing has no usable item. Transport failures and non-success statuses
/// are errors.
///
/// # Examples
///
/// ```ignore
/// let top = fetch_top_item(&client, &settings.ingest.listing_base_url, Category::World).await?;
/// if !top.is_placeholder() {
///     println!("{} ({} related)", top.title, top.count);
/// }
/// ```
#[instrument(level = "info", skip(client, base_url), fields(category = %category))]
pub async fn fetch_top_item(
    client: &Client,
    base_url: &str,
    category: Category,
) -> Result<ListingItem> {
    let url = listing_url(base_url, category);
    let page_url = Url::parse(&url)
        .map_err(|e| NewsError::Config(format!("invalid listing url {url}: {e}")))?;

    let html = client
        .get(url.as_str())
        .send()
        .await?
        .error_for_status()?
        .text()
        .await?;
    let items = parse_listing(&html, &page_url);
    let top = select_top_item(items.iter().cloned());

    if top.is_placeholder() {
        warn!(listed = items.len(), "No article selected; using placeholder entry");
    } else {
        info!(
            listed = items.len(),
            count = top.count,
            title = %truncate_for_log(&top.title, 80),
            "Selected top article"
        );
    }
    Ok(top)
}

/// Extract and normalize the body text of an article page.
///
/// Text under `strong`, `em`, `b` and `td` is skipped; the rest is joined
/// with newlines and passed through [`normalize_text`].
///
/// # Returns
///
/// The normalized body, or [`NOT_FOUND_BODY`] when the page has no content
/// container.
pub fn extract_body(html: &str) -> String {
    let document = Html::parse_document(html);
    let Some(container) = document.select(&ARTICLE_BODY).next() else {
        return NOT_FOUND_BODY.to_string();
    };
    normalize_text(&flatten_text(container).join("\n"))
}

/// Text nodes of `root` in document order, minus those inside a stripped tag.
fn flatten_text(root: ElementRef<'_>) -> Vec<&str> {
    let mut parts = Vec::new();
    for node in root.descendants() {
        let Node::Text(text) = node.value() else {
            continue;
        };
        let stripped = node
            .ancestors()
            .take_while(|a| a.id() != root.id())
            .filter_map(|a| a.value().as_element())
            .any(|el| STRIPPED_TAGS.contains(&el.name()));
        if !stripped {
            parts.push(&**text);
        }
    }
    parts
}

/// Fetch an article page and extract its body.
///
/// Placeholder entries (empty URL) are not fetched and get [`NOT_FOUND_BODY`].
#[instrument(level = "info", skip(client))]
pub async fn fetch_body(client: &Client, url: &str) -> Result<String> {
    if url.is_empty() {
        debug!("Placeholder entry; skipping body fetch");
        return Ok(NOT_FOUND_BODY.to_string());
    }
    let html = client
        .get(url)
        .send()
        .await?
        .error_for_status()?
        .text()
        .await?;
    let body = extract_body(&html);
    info!(chars = body.chars().count(), "Parsed article body");
    Ok(body)
}

/// Fetch the top article of a section with its body.
#[instrument(level = "info", skip(client, base_url), fields(category = %category))]
pub async fn fetch_article(
    client: &Client,
    base_url: &str,
    category: Category,
) -> Result<NewsArticle> {
    let top = fetch_top_item(client, base_url, category).await?;
    let body = fetch_body(client, &top.url).await?;
    Ok(NewsArticle {
        category,
        url: top.url,
        title: top.title,
        body,
    })
}
