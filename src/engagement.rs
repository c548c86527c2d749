//! Best-effort like and comment counts scraped from the watch page.

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::http::HttpFetch;
use crate::metadata::VideoRecord;

const COUNT: &str = r"(\d[\d,.]*\s?[KkMmBb]?)";

/// Each marker pairs with the number of likes it leaves out of its count.
/// "you along with N other people" excludes the viewer's own like.
static LIKE_MARKERS: LazyLock<Vec<(Regex, u64)>> = LazyLock::new(|| {
    [
        (format!(r"along with {COUNT} other (?:people|person)"), 1),
        (format!(r#""label":"{COUNT} likes?""#), 0),
        (format!(r#""accessibilityText":"{COUNT} likes?""#), 0),
    ]
    .into_iter()
    .map(|(pattern, excluded)| (Regex::new(&pattern).expect("valid like marker regex"), excluded))
    .collect()
});

static COMMENT_MARKERS: LazyLock<Vec<(Regex, u64)>> = LazyLock::new(|| {
    [
        format!(r#""commentCount":\{{"simpleText":"{COUNT}"\}}"#),
        format!(r#""contextualInfo":\{{"runs":\[\{{"text":"{COUNT}"\}}\]"#),
        format!(r#""{COUNT} [Cc]omments?""#),
    ]
    .into_iter()
    .map(|pattern| (Regex::new(&pattern).expect("valid comment marker regex"), 0))
    .collect()
});

pub struct EngagementEnricher<'a> {
    fetcher: &'a dyn HttpFetch,
}

impl<'a> EngagementEnricher<'a> {
    pub fn new(fetcher: &'a dyn HttpFetch) -> Self {
        Self { fetcher }
    }

    /// Fills `like_count` and `comment_count` from the watch page where a
    /// marker is found. Never fails; counts without a marker keep their value.
    pub fn enrich(&self, mut record: VideoRecord) -> VideoRecord {
        let page = match self.fetcher.get_text(&record.video_url) {
            Ok(page) => page,
            Err(err) => {
                debug!(video_id = %record.video_id, "watch page unavailable: {err:#}");
                return record;
            }
        };
        if let Some(likes) = find_count(&LIKE_MARKERS, &page) {
            record.like_count = Some(likes);
        }
        if let Some(comments) = find_count(&COMMENT_MARKERS, &page) {
            record.comment_count = Some(comments);
        }
        record
    }
}

fn find_count(markers: &[(Regex, u64)], page: &str) -> Option<u64> {
    markers.iter().find_map(|(marker, excluded)| {
        let captures = marker.captures(page)?;
        parse_count(&captures[1]).map(|count| count.saturating_add(*excluded))
    })
}

/// Parses display counts like `1,234`, `1.2K` or `3 M`.
pub fn parse_count(text: &str) -> Option<u64> {
    let compact: String = text.chars().filter(|c| !c.is_whitespace() && *c != ',').collect();
    let (digits, multiplier) = match compact.chars().last()?.to_ascii_uppercase() {
        'K' => (&compact[..compact.len() - 1], 1_000_f64),
        'M' => (&compact[..compact.len() - 1], 1_000_000_f64),
        'B' => (&compact[..compact.len() - 1], 1_000_000_000_f64),
        _ => return compact.parse().ok(),
    };
    let mantissa: f64 = digits.parse().ok()?;
    (mantissa.is_finite() && mantissa >= 0.0).then(|| (mantissa * multiplier).round() as u64)
}
