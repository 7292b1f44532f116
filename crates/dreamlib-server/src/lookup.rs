//! Book metadata lookup against the Naver Book Search API.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use dreamlib_core::config::LookupConfig;

use crate::encoding::encode_uri_component;

const RESULT_COUNT: u32 = 10;

static TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]*>").expect("static regex is valid"));
static BLANK_LINES_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").expect("static regex is valid"));

#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    #[error(
        "Naver API credentials are not configured. Set NAVER_CLIENT_ID and NAVER_CLIENT_SECRET."
    )]
    NotConfigured,

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Naver API error ({status})")]
    Api { status: u16 },
}

/// One raw search hit.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct NaverItem {
    title: String,
    author: String,
    publisher: String,
    pubdate: String,
    description: String,
    image: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct NaverResponse {
    items: Vec<NaverItem>,
}

/// A cleaned-up search hit for the metadata editor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookCandidate {
    pub title: String,
    pub author: String,
    pub publisher: String,
    /// Publication year only.
    pub pubdate: String,
    pub description: String,
    pub image_url: String,
}

fn strip_markup(raw: &str) -> String {
    TAG_RE
        .replace_all(raw, "")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

impl From<NaverItem> for BookCandidate {
    fn from(item: NaverItem) -> Self {
        let description = strip_markup(&item.description);
        Self {
            title: strip_markup(&item.title),
            author: item.author.replace('^', ", "),
            publisher: item.publisher,
            pubdate: item.pubdate.chars().take(4).collect(),
            description: BLANK_LINES_RE.replace_all(&description, "\n\n").into_owned(),
            image_url: item.image,
        }
    }
}

#[derive(Debug)]
pub struct BookLookup {
    http: reqwest::Client,
    api_url: String,
    credentials: Option<(String, String)>,
}

impl BookLookup {
    pub fn from_config(config: &LookupConfig) -> Result<Self, reqwest::Error> {
        let credentials = match (&config.client_id, &config.client_secret) {
            (Some(id), Some(secret)) if !id.trim().is_empty() && !secret.trim().is_empty() => {
                Some((id.trim().to_string(), secret.trim().to_string()))
            }
            _ => None,
        };

        // reqwest is built with rustls-no-provider; an Err here only means a
        // provider is already installed.
        let _ = rustls::crypto::ring::default_provider().install_default();
        let http = reqwest::Client::builder().build()?;

        Ok(Self {
            http,
            api_url: config.api_url.clone(),
            credentials,
        })
    }

    pub const fn is_configured(&self) -> bool {
        self.credentials.is_some()
    }

    /// Search for `query`, returning up to ten cleaned results.
    pub async fn search(&self, query: &str) -> Result<Vec<BookCandidate>, LookupError> {
        let Some((client_id, client_secret)) = &self.credentials else {
            return Err(LookupError::NotConfigured);
        };

        let url = format!(
            "{}?query={}&display={RESULT_COUNT}",
            self.api_url,
            encode_uri_component(query)
        );
        let resp = self
            .http
            .get(&url)
            .header("X-Naver-Client-Id", client_id)
            .header("X-Naver-Client-Secret", client_secret)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(LookupError::Api {
                status: status.as_u16(),
            });
        }

        let body: NaverResponse = resp.json().await?;
        debug!(query, hits = body.items.len(), "Book lookup finished");
        Ok(body.items.into_iter().map(BookCandidate::from).collect())
    }
}
