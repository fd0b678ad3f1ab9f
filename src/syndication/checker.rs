use async_trait::async_trait;
use scraper::{Html, Selector};
use thiserror::Error;
use tracing::debug;

use crate::error::Result;
use crate::syndication::catalog::CatalogEntry;
use crate::types::{CheckStrategy, ProbeOutcome, SyndicationListing};

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Why a single platform check could not produce a conclusive answer.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("platform answered HTTP {0}")]
    Status(u16),

    #[error("no automated check for this platform")]
    NoStrategy,
}

/// One presence check against one platform. Implementations must not share
/// mutable state between concurrent calls.
#[async_trait]
pub trait PresenceCheck: Send + Sync + 'static {
    async fn check(
        &self,
        entry: &CatalogEntry,
        listing: &SyndicationListing,
    ) -> std::result::Result<ProbeOutcome, ProbeError>;
}

/// Fetches the platform's city search page and looks for the street address.
pub struct HttpPresenceChecker {
    client: reqwest::Client,
}

impl HttpPresenceChecker {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PresenceCheck for HttpPresenceChecker {
    async fn check(
        &self,
        entry: &CatalogEntry,
        listing: &SyndicationListing,
    ) -> std::result::Result<ProbeOutcome, ProbeError> {
        if entry.strategy == CheckStrategy::Manual {
            return Err(ProbeError::NoStrategy);
        }

        let url = entry.url_for(listing);
        let resp = self.client.get(&url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            // Anti-bot walls (403/429) and outages say nothing about the listing.
            return Err(ProbeError::Status(status.as_u16()));
        }

        let body = resp.text().await?;
        let found = page_mentions_address(&body, &listing.address);
        debug!("[PROBE] {} fetched {} bytes from {url}, found={found}", entry.name, body.len());
        Ok(if found { ProbeOutcome::Found } else { ProbeOutcome::NotFound })
    }
}

/// Case-insensitive match on the street address in the page's visible text
/// ("5500 grand lake dr") or in a link target as a slug ("5500-grand-lake-dr").
/// Text split across tags, `&nbsp;` and line wrapping all count as one space.
pub fn page_mentions_address(body: &str, address: &str) -> bool {
    let words: Vec<String> = address
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| c == ',' || c == '.').to_lowercase())
        .filter(|w| !w.is_empty())
        .collect();
    if words.is_empty() {
        return false;
    }

    let document = Html::parse_document(body);
    let text = collapse_whitespace(&document.root_element().text().collect::<Vec<_>>().join(" "));
    if text.contains(&words.join(" ")) {
        return true;
    }

    let slug = words.join("-");
    let Ok(links) = Selector::parse("a[href]") else {
        return false;
    };
    document
        .select(&links)
        .filter_map(|a| a.value().attr("href"))
        .any(|href| href.to_lowercase().contains(&slug))
}

/// Lower-case and reduce every whitespace run (NBSP included) to a single space.
fn collapse_whitespace(s: &str) -> String {
    s.split(|c: char| c.is_whitespace())
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::syndication::catalog::tests::listing;
    use crate::types::Tier;
    use axum::{http::StatusCode, routing::get, Router};

    /// Serve `app` on an ephemeral local port and return its base URL.
    pub(crate) async fn spawn_server(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn entry(base: &str, path: &str) -> CatalogEntry {
        CatalogEntry {
            name: "TestSite".to_string(),
            tier: Tier::Primary,
            strategy: CheckStrategy::SearchPage,
            search_url: Some(format!("{base}{path}")),
        }
    }

    #[test]
    fn address_matching_accepts_text_and_slug_forms() {
        assert!(page_mentions_address("<li>5500 GRAND LAKE DR, San Antonio</li>", "5500 Grand Lake Dr"));
        assert!(page_mentions_address("<a href=\"/5500-grand-lake-dr-tx\">", "5500 Grand Lake Dr."));
        assert!(!page_mentions_address("<li>5502 Grand Lake Dr</li>", "5500 Grand Lake Dr"));
        assert!(!page_mentions_address("anything", "  "));
    }

    #[test]
    fn address_matching_sees_through_markup() {
        let address = "5500 Grand Lake Dr";
        assert!(page_mentions_address("<li>5500&nbsp;Grand Lake Dr</li>", address));
        assert!(page_mentions_address("<span>5500</span> <span>Grand Lake Dr</span>", address));
        assert!(page_mentions_address("<span>5500</span><span>Grand Lake Dr</span>", address));
        assert!(page_mentions_address("<li>5500 Grand\n   Lake Dr</li>", address));
        assert!(!page_mentions_address("<a href=\"/5500-grand-lake-dr\">", "5500 Grand Lake Ct"));
    }

    #[tokio::test]
    async fn search_page_with_address_is_found() {
        let app = Router::new()
            .route("/listed", get(|| async { "<div>5500 Grand Lake Dr</div>" }))
            .route("/other", get(|| async { "<div>1 Other St</div>" }))
            .route("/blocked", get(|| async { (StatusCode::FORBIDDEN, "captcha") }));
        let base = spawn_server(app).await;
        let checker = HttpPresenceChecker::new().unwrap();

        let found = checker.check(&entry(&base, "/listed"), &listing()).await.unwrap();
        assert_eq!(found, ProbeOutcome::Found);

        let missing = checker.check(&entry(&base, "/other"), &listing()).await.unwrap();
        assert_eq!(missing, ProbeOutcome::NotFound);

        let blocked = checker.check(&entry(&base, "/blocked"), &listing()).await.unwrap_err();
        assert!(matches!(blocked, ProbeError::Status(403)));
    }

    #[tokio::test]
    async fn manual_strategy_is_never_checked() {
        let checker = HttpPresenceChecker::new().unwrap();
        let manual = CatalogEntry {
            name: "Domu".to_string(),
            tier: Tier::Secondary,
            strategy: CheckStrategy::Manual,
            search_url: None,
        };
        let err = checker.check(&manual, &listing()).await.unwrap_err();
        assert!(matches!(err, ProbeError::NoStrategy));
    }
}
