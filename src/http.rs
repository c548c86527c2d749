//! Blocking HTTP capability used by every upstream call.
//!
//! The pipeline only ever needs two shapes of request: fetch a web document
//! (redirects followed) and post a JSON body to an innertube endpoint. Keeping
//! them behind [`HttpFetch`] lets tests serve canned documents.

use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde_json::Value;
use tracing::debug;

use crate::config::Settings;

const MAX_REDIRECTS: u32 = 8;
const ACCEPT_LANGUAGE: &str = "en-US,en;q=0.9";
// Skips the EU consent interstitial so channel and watch pages carry data.
const CONSENT_COOKIE: &str = "SOCS=CAI; CONSENT=YES+1";

pub trait HttpFetch: Send + Sync {
    /// GETs `url` and returns the body as text.
    fn get_text(&self, url: &str) -> Result<String>;

    /// POSTs `body` as JSON to `url` and decodes the JSON response.
    fn post_json(&self, url: &str, body: &Value) -> Result<Value>;
}

pub struct UreqFetcher {
    agent: ureq::Agent,
}

impl UreqFetcher {
    pub fn new(timeout: Duration, user_agent: &str) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(timeout)
            .redirects(MAX_REDIRECTS)
            .user_agent(user_agent)
            .build();
        Self { agent }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.http_timeout, &settings.user_agent)
    }
}

impl HttpFetch for UreqFetcher {
    fn get_text(&self, url: &str) -> Result<String> {
        debug!(url, "GET");
        let response = self
            .agent
            .get(url)
            .set("Accept-Language", ACCEPT_LANGUAGE)
            .set("Cookie", CONSENT_COOKIE)
            .call()
            .map_err(|err| describe_ureq_error(url, err))?;
        response
            .into_string()
            .with_context(|| format!("reading body of {url}"))
    }

    fn post_json(&self, url: &str, body: &Value) -> Result<Value> {
        debug!(url, "POST");
        let response = self
            .agent
            .post(url)
            .set("Accept-Language", ACCEPT_LANGUAGE)
            .send_json(body)
            .map_err(|err| describe_ureq_error(url, err))?;
        response
            .into_json::<Value>()
            .with_context(|| format!("decoding JSON from {url}"))
    }
}

fn describe_ureq_error(url: &str, err: ureq::Error) -> anyhow::Error {
    match err {
        ureq::Error::Status(code, _) => anyhow!("{url} returned HTTP {code}"),
        ureq::Error::Transport(transport) => anyhow!("requesting {url}: {transport}"),
    }
}
