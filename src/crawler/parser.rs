//! HTML extraction for fetched pages
//!
//! Pulls the structural metadata a page record keeps:
//! - Titles (`<title>` and `<h1>`..`<h6>`, in document order)
//! - Emphasized text (`<b>`, `<strong>`, `<em>`, in document order)
//! - Raw `href` values of every anchor, resolved later by the link normalizer

use scraper::{ElementRef, Html, Selector};

const TITLE_SELECTOR: &str = "title, h1, h2, h3, h4, h5, h6";
const EMPHASIS_SELECTOR: &str = "b, strong, em";
const ANCHOR_SELECTOR: &str = "a[href]";

/// Metadata extracted from one HTML document
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extraction {
    /// Text of title and heading elements, trimmed, empty ones dropped
    pub titles: Vec<String>,

    /// Text of emphasis elements, trimmed, empty ones dropped
    pub emphasis: Vec<String>,

    /// Unresolved `href` attribute values, in document order
    pub anchor_hrefs: Vec<String>,
}

/// Extracts titles, emphasized text and anchor targets from a page body
///
/// Bodies that are not valid UTF-8 are decoded lossily; malformed markup is
/// handled by the HTML5 parser, so extraction never fails.
///
/// # Example
///
/// ```
/// use metacrawl::crawler::extract;
///
/// let body = br#"<html><head><title>Home</title></head>
///     <body><h1>Welcome</h1><p><b>bold</b> text</p><a href="/next">next</a></body></html>"#;
/// let extraction = extract(body);
/// assert_eq!(extraction.titles, vec!["Home", "Welcome"]);
/// assert_eq!(extraction.emphasis, vec!["bold"]);
/// assert_eq!(extraction.anchor_hrefs, vec!["/next"]);
/// ```
pub fn extract(body: &[u8]) -> Extraction {
    let html = String::from_utf8_lossy(body);
    let document = Html::parse_document(&html);

    Extraction {
        titles: collect_text(&document, TITLE_SELECTOR),
        emphasis: collect_text(&document, EMPHASIS_SELECTOR),
        anchor_hrefs: collect_hrefs(&document),
    }
}

/// Collects the trimmed text of every element matching `selector`
fn collect_text(document: &Html, selector: &str) -> Vec<String> {
    let Ok(selector) = Selector::parse(selector) else {
        return Vec::new();
    };

    document
        .select(&selector)
        .map(element_text)
        .filter(|text| !text.is_empty())
        .collect()
}

/// Joins the text nodes below an element and collapses surrounding whitespace
fn element_text(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

fn collect_hrefs(document: &Html) -> Vec<String> {
    let Ok(selector) = Selector::parse(ANCHOR_SELECTOR) else {
        return Vec::new();
    };

    document
        .select(&selector)
        .filter_map(|element| element.value().attr("href"))
        .map(str::to_string)
        .collect()
}
