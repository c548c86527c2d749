//! Request bodies for the platform's internal JSON API.
//!
//! Only the request side is typed. Responses are walked as untyped trees by
//! [`crate::search`] because their schema is undocumented and shifts often.

use serde::Serialize;
use serde_json::Value;

pub const BROWSE_URL: &str = "https://www.youtube.com/youtubei/v1/browse?prettyPrint=false";
pub const PLAYER_URL: &str = "https://www.youtube.com/youtubei/v1/player?prettyPrint=false";

/// Protobuf-encoded selector for a channel's "Videos" tab.
pub const VIDEOS_TAB_PARAMS: &str = "EgZ2aWRlb3PyBgQKAjoA";

#[derive(Debug, Clone, Serialize)]
pub struct Context<'a> {
    pub client: Client<'a>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Client<'a> {
    pub client_name: &'static str,
    pub client_version: &'a str,
    pub hl: &'static str,
    pub gl: &'static str,
}

impl<'a> Context<'a> {
    pub fn web(client_version: &'a str) -> Self {
        Self {
            client: Client {
                client_name: "WEB",
                client_version,
                hl: "en",
                gl: "US",
            },
        }
    }
}

/// Builds request bodies with a fixed client context.
#[derive(Debug, Clone)]
pub struct Innertube {
    client_version: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BrowseChannel<'a> {
    context: Context<'a>,
    browse_id: &'a str,
    params: &'static str,
}

#[derive(Serialize)]
struct BrowseContinuation<'a> {
    context: Context<'a>,
    continuation: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Player<'a> {
    context: Context<'a>,
    video_id: &'a str,
}

impl Innertube {
    pub fn new(client_version: impl Into<String>) -> Self {
        Self {
            client_version: client_version.into(),
        }
    }

    fn context(&self) -> Context<'_> {
        Context::web(&self.client_version)
    }

    /// First page of the channel's video listing.
    pub fn browse_videos(&self, channel_id: &str) -> Value {
        to_value(&BrowseChannel {
            context: self.context(),
            browse_id: channel_id,
            params: VIDEOS_TAB_PARAMS,
        })
    }

    /// Follow-up page. The token alone identifies the listing.
    pub fn browse_continuation(&self, token: &str) -> Value {
        to_value(&BrowseContinuation {
            context: self.context(),
            continuation: token,
        })
    }

    pub fn player(&self, video_id: &str) -> Value {
        to_value(&Player {
            context: self.context(),
            video_id,
        })
    }
}

// These structs only hold strings, so serialization cannot fail.
fn to_value<T: Serialize>(body: &T) -> Value {
    serde_json::to_value(body).unwrap_or(Value::Null)
}
