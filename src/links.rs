use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::debug;
use url::Url;

use crate::config::LinkCheckSettings;
use crate::driver::PageLink;
use crate::probe::ProbeTransport;

const LINK_TEXT_LIMIT: usize = 50;

/// Status recorded for a broken link: the HTTP code, or `"timeout/error"`
/// when no response arrived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStatus {
    Code(u16),
    TimeoutOrError,
}

const TIMEOUT_OR_ERROR: &str = "timeout/error";

impl Serialize for LinkStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            LinkStatus::Code(code) => serializer.serialize_u16(*code),
            LinkStatus::TimeoutOrError => serializer.serialize_str(TIMEOUT_OR_ERROR),
        }
    }
}

impl<'de> Deserialize<'de> for LinkStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Code(u16),
            Label(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Code(code) => Ok(LinkStatus::Code(code)),
            Raw::Label(label) if label == TIMEOUT_OR_ERROR => Ok(LinkStatus::TimeoutOrError),
            Raw::Label(label) => Err(serde::de::Error::custom(format!(
                "unexpected link status '{label}'"
            ))),
        }
    }
}

/// Anchor whose target answered with an error status or not at all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokenLink {
    pub url: String,
    #[serde(rename = "status_code")]
    pub status: LinkStatus,
    pub text: String,
}

/// HEAD-checks page anchors through the probe transport.
pub struct LinkChecker<'a> {
    transport: &'a dyn ProbeTransport,
    max_links: usize,
    timeout: Duration,
}

impl<'a> LinkChecker<'a> {
    pub fn new(transport: &'a dyn ProbeTransport, settings: &LinkCheckSettings) -> Self {
        Self {
            transport,
            max_links: settings.max_links,
            timeout: settings.timeout(),
        }
    }

    /// Only the first `max_links` anchors are considered; non-http(s) targets
    /// among them are skipped.
    pub fn check(&self, links: &[PageLink]) -> Vec<BrokenLink> {
        let mut broken = Vec::new();
        for link in links.iter().take(self.max_links) {
            let Some(href) = link.href.as_deref() else {
                continue;
            };
            if !(href.starts_with("http://") || href.starts_with("https://")) {
                continue;
            }
            let text: String = link.text.chars().take(LINK_TEXT_LIMIT).collect();
            let status = match Url::parse(href) {
                Ok(url) => match self.transport.head(&url, self.timeout) {
                    Ok(code) if code < 400 => continue,
                    Ok(code) => LinkStatus::Code(code),
                    Err(err) => {
                        debug!(href, error = %err, "link check failed");
                        LinkStatus::TimeoutOrError
                    }
                },
                Err(err) => {
                    debug!(href, error = %err, "unparseable link");
                    LinkStatus::TimeoutOrError
                }
            };
            broken.push(BrokenLink {
                url: href.to_string(),
                status,
                text,
            });
        }
        broken
    }
}
