//! URL classification into resource classes
//!
//! Classification is a pure function of the URL: no cache or network access.
//! The checks run in dispatch precedence order, so a font file served from an
//! external host is still a static asset.

use serde::Serialize;
use std::fmt;
use std::sync::LazyLock;
use url::Url;

use crate::config::OfflineCacheConfig;

const STATIC_EXTENSIONS: &[&str] = &[
    "css", "js", "png", "webp", "jpg", "jpeg", "svg", "ico", "woff", "woff2", "ttf",
];

const IMAGE_EXTENSIONS: &[&str] = &["png", "webp", "jpg", "jpeg", "svg"];

const ASSETS_SEGMENT: &str = "assets";
const API_SEGMENT: &str = "api";

/// Base for resolving relative request strings
static RELATIVE_BASE: LazyLock<Url> =
    LazyLock::new(|| Url::parse("http://localhost/").unwrap());

/// Category of a requested resource, selecting both TTL and strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceClass {
    StaticAsset,
    Image,
    ExternalResource,
    HtmlPage,
    Other,
}

impl ResourceClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceClass::StaticAsset => "static-asset",
            ResourceClass::Image => "image",
            ResourceClass::ExternalResource => "external-resource",
            ResourceClass::HtmlPage => "html-page",
            ResourceClass::Other => "other",
        }
    }
}

impl fmt::Display for ResourceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Maps request URLs to resource classes
#[derive(Debug, Clone)]
pub struct Classifier {
    external_hosts: Vec<String>,
}

impl Classifier {
    pub fn new<I, S>(external_hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            external_hosts: external_hosts
                .into_iter()
                .map(|h| h.into().to_ascii_lowercase())
                .collect(),
        }
    }

    pub fn from_config(config: &OfflineCacheConfig) -> Self {
        Self::new(config.external_hosts.iter().cloned())
    }

    /// Classify a parsed URL
    pub fn classify(&self, url: &Url) -> ResourceClass {
        if is_static_asset(url) {
            if extension(url).is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str())) {
                ResourceClass::Image
            } else {
                ResourceClass::StaticAsset
            }
        } else if self.is_external(url) {
            ResourceClass::ExternalResource
        } else if is_html_page(url) {
            ResourceClass::HtmlPage
        } else {
            ResourceClass::Other
        }
    }

    /// Classify a raw request string; relative paths are resolved against a
    /// placeholder origin and anything unparsable is [`ResourceClass::Other`]
    pub fn classify_str(&self, raw: &str) -> ResourceClass {
        match Url::parse(raw).or_else(|_| RELATIVE_BASE.join(raw)) {
            Ok(url) => self.classify(&url),
            Err(_) => ResourceClass::Other,
        }
    }

    fn is_external(&self, url: &Url) -> bool {
        url.host_str().is_some_and(|host| {
            let host = host.to_ascii_lowercase();
            self.external_hosts.iter().any(|h| *h == host)
        })
    }
}

fn is_static_asset(url: &Url) -> bool {
    has_segment(url, ASSETS_SEGMENT)
        || extension(url).is_some_and(|ext| STATIC_EXTENSIONS.contains(&ext.as_str()))
}

fn is_html_page(url: &Url) -> bool {
    url.path().contains(".html")
        || (extension(url).is_none()
            && !has_segment(url, ASSETS_SEGMENT)
            && !has_segment(url, API_SEGMENT))
}

fn has_segment(url: &Url, name: &str) -> bool {
    url.path_segments()
        .is_some_and(|mut segments| segments.any(|s| s == name))
}

/// Lower-cased extension of the last path segment
fn extension(url: &Url) -> Option<String> {
    let last = url.path_segments()?.next_back()?;
    let (stem, ext) = last.rsplit_once('.')?;
    if stem.is_empty() && ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> Classifier {
        Classifier::new([
            "fonts.googleapis.com",
            "fonts.gstatic.com",
            "cdn.tailwindcss.com",
            "cdnjs.cloudflare.com",
        ])
    }

    fn class_of(url: &str) -> ResourceClass {
        classifier().classify_str(url)
    }

    #[test]
    fn test_static_assets_by_extension() {
        assert_eq!(class_of("https://site.example/app.js"), ResourceClass::StaticAsset);
        assert_eq!(class_of("https://site.example/style.CSS"), ResourceClass::StaticAsset);
        assert_eq!(class_of("https://site.example/favicon.ico"), ResourceClass::StaticAsset);
        assert_eq!(class_of("https://site.example/f/a.woff2"), ResourceClass::StaticAsset);
    }

    #[test]
    fn test_anything_under_assets_is_static() {
        assert_eq!(
            class_of("https://site.example/assets/data/strings.json"),
            ResourceClass::StaticAsset
        );
        assert_eq!(class_of("https://site.example/assets/"), ResourceClass::StaticAsset);
    }

    #[test]
    fn test_images() {
        assert_eq!(
            class_of("https://site.example/assets/img/Characters2.webp"),
            ResourceClass::Image
        );
        assert_eq!(class_of("https://site.example/logo.SVG"), ResourceClass::Image);
        assert_eq!(class_of("https://site.example/a/b.jpeg"), ResourceClass::Image);
    }

    #[test]
    fn test_query_string_does_not_affect_extension() {
        assert_eq!(
            class_of("https://site.example/assets/css/style.css?v=3"),
            ResourceClass::StaticAsset
        );
        assert_eq!(
            class_of("https://site.example/page?file=a.css"),
            ResourceClass::HtmlPage
        );
    }

    #[test]
    fn test_external_hosts() {
        assert_eq!(
            class_of("https://fonts.googleapis.com/css2?family=Noto+Kufi+Arabic&display=swap"),
            ResourceClass::ExternalResource
        );
        assert_eq!(
            class_of("https://cdn.tailwindcss.com/"),
            ResourceClass::ExternalResource
        );
    }

    #[test]
    fn test_static_check_precedes_external() {
        assert_eq!(
            class_of("https://fonts.gstatic.com/s/notokufiarabic/v1/font.woff2"),
            ResourceClass::StaticAsset
        );
        assert_eq!(
            class_of("https://cdnjs.cloudflare.com/ajax/libs/x/1.0/x.min.js"),
            ResourceClass::StaticAsset
        );
    }

    #[test]
    fn test_html_pages() {
        assert_eq!(class_of("https://site.example/"), ResourceClass::HtmlPage);
        assert_eq!(class_of("https://site.example/index-en.html"), ResourceClass::HtmlPage);
        assert_eq!(class_of("https://site.example/faq"), ResourceClass::HtmlPage);
        assert_eq!(class_of("/index-es.html"), ResourceClass::HtmlPage);
    }

    #[test]
    fn test_other() {
        assert_eq!(class_of("https://site.example/api/chat"), ResourceClass::Other);
        assert_eq!(class_of("https://site.example/manifest.json"), ResourceClass::Other);
        assert_eq!(class_of("https://unknown-cdn.example/lib.wasm"), ResourceClass::Other);
    }

    #[test]
    fn test_unparsable_is_other() {
        assert_eq!(class_of("http://[::1"), ResourceClass::Other);
    }

    #[test]
    fn test_classification_is_stable() {
        let c = classifier();
        let urls = [
            "https://site.example/assets/css/style.css",
            "https://site.example/assets/js/main.js",
            "https://site.example/favicon.ico",
        ];
        let first: Vec<_> = urls.iter().map(|u| c.classify_str(u)).collect();
        let reversed: Vec<_> = urls.iter().rev().map(|u| c.classify_str(u)).collect();
        assert!(first.iter().all(|class| *class == ResourceClass::StaticAsset));
        assert_eq!(first, reversed.into_iter().rev().collect::<Vec<_>>());
    }

    #[test]
    fn test_display() {
        assert_eq!(ResourceClass::ExternalResource.to_string(), "external-resource");
    }
}
