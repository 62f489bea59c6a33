use std::sync::Arc;

use anyhow::{anyhow, Result};
use url::Url;

use crate::domain::Domain;

/// What the blocked page needs to render itself and to offer (or refuse) a skip. Travels as the
/// query string of the redirect target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockedPageParams {
    pub domain: Domain,
    pub category: Arc<str>,
    pub strict: bool,
}

impl BlockedPageParams {
    pub fn to_url(&self, blocked_page: &Url) -> Url {
        let mut url = blocked_page.clone();
        url.query_pairs_mut()
            .clear()
            .append_pair("domain", &self.domain)
            .append_pair("category", &self.category)
            .append_pair("strict", if self.strict { "true" } else { "false" });
        url
    }

    pub fn from_url(url: &str) -> Result<Self> {
        let url = Url::parse(url)?;
        let mut domain = None;
        let mut category = None;
        let mut strict = false;
        for (key, value) in url.query_pairs() {
            match &*key {
                "domain" => domain = Some(Domain::from_host(&value)),
                "category" => category = Some(Arc::<str>::from(&*value)),
                "strict" => strict = value == "true",
                _ => {}
            }
        }
        Ok(Self {
            domain: domain
                .filter(|d| !d.is_empty())
                .ok_or_else(|| anyhow!("blocked page url has no domain"))?,
            category: category.unwrap_or_else(|| Arc::from("")),
            strict,
        })
    }

    /// Where the tab goes after a successful skip.
    pub fn original_url(&self) -> String {
        format!("https://{}", self.domain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_is_percent_encoded_and_parsed_back() {
        let page = Url::parse("chrome-extension://abcdef/blocked.html").unwrap();
        let params = BlockedPageParams {
            domain: Domain::from_host("facebook.com"),
            category: "Redes & Social".into(),
            strict: true,
        };

        let url = params.to_url(&page);
        assert_eq!(
            url.as_str(),
            "chrome-extension://abcdef/blocked.html?domain=facebook.com&category=Redes+%26+Social&strict=true"
        );
        assert_eq!(BlockedPageParams::from_url(url.as_str()).unwrap(), params);
    }

    #[test]
    fn missing_domain_is_an_error() {
        assert!(BlockedPageParams::from_url("chrome-extension://abcdef/blocked.html?category=x")
            .is_err());
    }

    #[test]
    fn anything_but_true_is_not_strict() {
        let params = BlockedPageParams::from_url(
            "chrome-extension://abcdef/blocked.html?domain=x.com&strict=1",
        )
        .unwrap();
        assert!(!params.strict);
        assert_eq!(params.original_url(), "https://x.com");
    }
}
