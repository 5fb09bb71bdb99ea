use std::sync::LazyLock;

use chrono::{DateTime, FixedOffset, NaiveDate, TimeZone, Utc};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use pressroom_common::config::SelectorConfig;
use pressroom_common::{DiscoveredRelease, FetchedContent, PressroomError};

/// Turns portal HTML into listing entries and release content.
pub trait PageParser: Send + Sync {
    fn parse_listing(&self, html: &str) -> Vec<DiscoveredRelease>;

    /// `None` when the page has no content element or it is empty.
    fn parse_release(&self, html: &str) -> Option<FetchedContent>;
}

static DATELINE_TIME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{1,2})\s+([A-Za-z]+)\s+(\d{4})\s+(\d{1,2}):(\d{2})\s*([AaPp][Mm])").unwrap()
});
static DATELINE_OFFICE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"by PIB\s+(\w+)").unwrap());

/// Datelines are printed in Indian Standard Time.
const IST_OFFSET_SECS: i32 = 5 * 3600 + 30 * 60;

/// Parse a line like `Posted On: 24 MAY 2025 5:03PM by PIB Delhi` into the
/// publication instant and the issuing office.
pub fn parse_dateline(text: &str) -> (Option<DateTime<Utc>>, Option<String>) {
    let office = DATELINE_OFFICE
        .captures(text)
        .map(|c| c[1].to_string());

    let published = DATELINE_TIME.captures(text).and_then(|c| {
        let day: u32 = c[1].parse().ok()?;
        let month = month_number(&c[2])?;
        let year: i32 = c[3].parse().ok()?;
        let hour12: u32 = c[4].parse().ok()?;
        let minute: u32 = c[5].parse().ok()?;
        let pm = c[6].eq_ignore_ascii_case("pm");
        let hour = match (hour12 % 12, pm) {
            (h, true) => h + 12,
            (h, false) => h,
        };

        let local = NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(hour, minute, 0)?;
        let ist = FixedOffset::east_opt(IST_OFFSET_SECS)?;
        let instant = ist.from_local_datetime(&local).single()?;
        Some(instant.with_timezone(&Utc))
    });

    (published, office)
}

fn month_number(name: &str) -> Option<u32> {
    const MONTHS: [&str; 12] = [
        "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
    ];
    let lower = name.to_ascii_lowercase();
    let prefix = lower.get(..3)?;
    MONTHS.iter().position(|m| *m == prefix).map(|i| i as u32 + 1)
}

/// Parser driven entirely by CSS selectors from configuration.
pub struct SelectorParser {
    ministry_group: Selector,
    ministry_name: Selector,
    release_link: Selector,
    title_attr: String,
    content: Selector,
    dateline: Selector,
    base_url: Option<Url>,
}

impl SelectorParser {
    pub fn new(selectors: &SelectorConfig, base_url: &str) -> Result<Self, PressroomError> {
        Ok(Self {
            ministry_group: selector(&selectors.ministry_group)?,
            ministry_name: selector(&selectors.ministry_name)?,
            release_link: selector(&selectors.release_link)?,
            title_attr: selectors.title_attr.clone(),
            content: selector(&selectors.content)?,
            dateline: selector(&selectors.dateline)?,
            base_url: Url::parse(base_url).ok(),
        })
    }

    fn absolute_url(&self, href: &str) -> Option<String> {
        match Url::parse(href) {
            Ok(url) => Some(url.to_string()),
            Err(_) => self.base_url.as_ref()?.join(href).ok().map(|u| u.to_string()),
        }
    }
}

fn selector(css: &str) -> Result<Selector, PressroomError> {
    Selector::parse(css).map_err(|e| PressroomError::Config(format!("invalid selector {css:?}: {e}")))
}

fn element_text(el: ElementRef<'_>) -> String {
    el.text().collect::<Vec<_>>().join(" ").split_whitespace().collect::<Vec<_>>().join(" ")
}

impl PageParser for SelectorParser {
    fn parse_listing(&self, html: &str) -> Vec<DiscoveredRelease> {
        let document = Html::parse_document(html);
        let mut releases = Vec::new();

        for group in document.select(&self.ministry_group) {
            let Some(ministry) = group
                .select(&self.ministry_name)
                .next()
                .map(element_text)
                .filter(|m| !m.is_empty())
            else {
                continue;
            };

            for link in group.select(&self.release_link) {
                let Some(url) = link.value().attr("href").and_then(|h| self.absolute_url(h)) else {
                    continue;
                };
                let title = link
                    .value()
                    .attr(&self.title_attr)
                    .map(|t| t.trim().to_string())
                    .filter(|t| !t.is_empty())
                    .unwrap_or_else(|| element_text(link));

                releases.push(DiscoveredRelease {
                    ministry: ministry.clone(),
                    title,
                    url,
                });
            }
        }

        releases
    }

    fn parse_release(&self, html: &str) -> Option<FetchedContent> {
        let document = Html::parse_document(html);
        let body = document.select(&self.content).next()?.inner_html();
        if body.trim().is_empty() {
            return None;
        }

        let (published_at, origin_office) = document
            .select(&self.dateline)
            .next()
            .map(|el| parse_dateline(&element_text(el)))
            .unwrap_or((None, None));

        Some(FetchedContent {
            text: body.trim().to_string(),
            published_at,
            origin_office,
        })
    }
}
