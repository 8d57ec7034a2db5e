//! GitHub activity sources.
//!
//! [`GhCli`] shells out to the `gh` CLI, so authentication and host
//! configuration are whatever `gh auth status` says. [`ProfileScraper`]
//! reads the public contribution calendar page, which also counts private
//! contributions when the profile shows them.

use std::io::Read as _;
use std::process::{Command, Stdio};

use chrono::{DateTime, Datelike, NaiveDate, SecondsFormat, TimeZone, Utc};
use serde::Deserialize;
use tracing::{debug, info};
use vanity_core::collab::{ActivitySource, CollabError, filter_days};
use vanity_core::model::DayCount;

const CALENDAR_FIELDS: &str = "contributionCalendar { weeks { contributionDays { date contributionCount } } }";

/// Largest scraped page accepted, in bytes.
const MAX_PAGE_BYTES: u64 = 8 * 1024 * 1024;

// ─── gh CLI ─────────────────────────────────────────────────────────────────

/// Activity source backed by the GitHub GraphQL API through `gh`.
#[derive(Debug, Clone)]
pub struct GhCli {
    program: String,
}

impl Default for GhCli {
    fn default() -> Self {
        Self {
            program: "gh".to_string(),
        }
    }
}

impl GhCli {
    pub fn new() -> Self {
        Self::default()
    }

    /// Login of the account `gh` is authenticated as.
    pub fn current_user(&self) -> Result<String, CollabError> {
        let out = self.run(&["api", "user", "--jq", ".login"])?;
        Ok(String::from_utf8_lossy(&out).trim().to_string())
    }

    /// When `user`'s account was created.
    pub fn created_at(&self, user: &str) -> Result<DateTime<Utc>, CollabError> {
        let endpoint = format!("users/{user}");
        let out = self.run(&["api", &endpoint, "--jq", ".created_at"])?;
        let raw = String::from_utf8_lossy(&out);
        DateTime::parse_from_rfc3339(raw.trim())
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|err| CollabError::Fetch(format!("bad created_at {:?}: {err}", raw.trim())))
    }

    /// Calendar days for `user`, over `window` or the last year.
    pub fn calendar(
        &self,
        user: &str,
        window: Option<(DateTime<Utc>, DateTime<Utc>)>,
    ) -> Result<Vec<DayCount>, CollabError> {
        let user_arg = format!("user={user}");
        let out = match window {
            None => {
                let query = format!(
                    "query($user: String!) {{ user(login: $user) {{ contributionsCollection {{ {CALENDAR_FIELDS} }} }} }}"
                );
                let query_arg = format!("query={query}");
                self.run(&["api", "graphql", "-f", &query_arg, "-f", &user_arg])?
            }
            Some((from, to)) => {
                let query = format!(
                    "query($user: String!, $from: DateTime!, $to: DateTime!) {{ user(login: $user) {{ contributionsCollection(from: $from, to: $to) {{ {CALENDAR_FIELDS} }} }} }}"
                );
                let query_arg = format!("query={query}");
                let from_arg = format!("from={}", from.to_rfc3339_opts(SecondsFormat::Secs, true));
                let to_arg = format!("to={}", to.to_rfc3339_opts(SecondsFormat::Secs, true));
                self.run(&[
                    "api", "graphql", "-f", &query_arg, "-f", &user_arg, "-f", &from_arg, "-f",
                    &to_arg,
                ])?
            }
        };
        parse_calendar(&out)
    }

    fn run(&self, args: &[&str]) -> Result<Vec<u8>, CollabError> {
        debug!(program = %self.program, ?args, "running");
        let output = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .map_err(|err| {
                if err.kind() == std::io::ErrorKind::NotFound {
                    CollabError::NotFound {
                        program: self.program.clone(),
                    }
                } else {
                    CollabError::Io(err)
                }
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            if stderr.contains("auth login") || stderr.contains("not logged") {
                return Err(CollabError::Fetch(
                    "not authenticated with the GitHub CLI; run `gh auth login`".to_string(),
                ));
            }
            return Err(CollabError::Command {
                program: self.program.clone(),
                args: args.first().copied().unwrap_or_default().to_string(),
                stderr,
            });
        }
        Ok(output.stdout)
    }
}

impl ActivitySource for GhCli {
    fn fetch_all(&self, user: &str) -> Result<Vec<DayCount>, CollabError> {
        let created = self.created_at(user)?;
        let now = Utc::now();
        let mut days = Vec::new();
        for (from, to) in year_windows(created.year(), now) {
            let year_days = self.calendar(user, Some((from, to))).map_err(|err| {
                CollabError::Fetch(format!("contributions for {}: {err}", from.year()))
            })?;
            debug!(user, year = from.year(), days = year_days.len(), "fetched year");
            days.extend(year_days);
        }
        Ok(filter_days(days, None))
    }

    fn fetch(&self, user: &str, since: Option<NaiveDate>) -> Result<Vec<DayCount>, CollabError> {
        let days = self.calendar(user, None)?;
        Ok(filter_days(days, since))
    }
}

/// `[Jan 1, Dec 31 23:59:59]` for each year from `first_year` through `now`'s
/// year, the last window ending at `now`.
fn year_windows(first_year: i32, now: DateTime<Utc>) -> Vec<(DateTime<Utc>, DateTime<Utc>)> {
    (first_year..=now.year())
        .filter_map(|year| {
            let from = Utc.with_ymd_and_hms(year, 1, 1, 0, 0, 0).single()?;
            let end = Utc.with_ymd_and_hms(year, 12, 31, 23, 59, 59).single()?;
            Some((from, end.min(now)))
        })
        .collect()
}

#[derive(Debug, Deserialize)]
struct GraphqlResponse {
    data: Option<GraphqlData>,
    #[serde(default)]
    errors: Vec<GraphqlError>,
}

#[derive(Debug, Deserialize)]
struct GraphqlError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct GraphqlData {
    user: Option<GraphqlUser>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphqlUser {
    contributions_collection: ContributionsCollection,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ContributionsCollection {
    contribution_calendar: Calendar,
}

#[derive(Debug, Deserialize)]
struct Calendar {
    weeks: Vec<Week>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Week {
    contribution_days: Vec<CalendarDay>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CalendarDay {
    date: NaiveDate,
    contribution_count: u32,
}

fn parse_calendar(raw: &[u8]) -> Result<Vec<DayCount>, CollabError> {
    let response: GraphqlResponse = serde_json::from_slice(raw)
        .map_err(|err| CollabError::Fetch(format!("unreadable GraphQL response: {err}")))?;

    if let Some(first) = response.errors.first() {
        return Err(CollabError::Fetch(first.message.clone()));
    }
    let user = response
        .data
        .and_then(|d| d.user)
        .ok_or_else(|| CollabError::Fetch("user not found".to_string()))?;

    Ok(user
        .contributions_collection
        .contribution_calendar
        .weeks
        .into_iter()
        .flat_map(|w| w.contribution_days)
        .map(|d| DayCount::new(d.date, d.contribution_count))
        .collect())
}

// ─── profile scraping ───────────────────────────────────────────────────────

/// Activity source reading `github.com/users/<u>/contributions` pages.
///
/// The account creation date still comes from `gh`.
#[derive(Debug)]
pub struct ProfileScraper {
    agent: ureq::Agent,
    base_url: String,
    gh: GhCli,
}

impl ProfileScraper {
    pub fn new(gh: GhCli) -> Self {
        Self {
            agent: ureq::AgentBuilder::new()
                .timeout(std::time::Duration::from_secs(30))
                .build(),
            base_url: "https://github.com".to_string(),
            gh,
        }
    }

    fn scrape_year(&self, user: &str, year: i32) -> Result<Vec<DayCount>, CollabError> {
        let url = format!(
            "{}/users/{user}/contributions?from={year}-01-01&to={year}-12-31",
            self.base_url
        );
        debug!(%url, "scraping contribution calendar");
        let response = self.agent.get(&url).call().map_err(|err| match err {
            ureq::Error::Status(code, _) => {
                CollabError::Fetch(format!("unexpected status {code} from {url}"))
            }
            ureq::Error::Transport(t) => CollabError::Fetch(format!("{url}: {t}")),
        })?;

        let mut html = String::new();
        response
            .into_reader()
            .take(MAX_PAGE_BYTES)
            .read_to_string(&mut html)?;
        Ok(parse_tooltips(&html, year))
    }

    fn scrape_years(
        &self,
        user: &str,
        years: impl Iterator<Item = i32>,
    ) -> Result<Vec<DayCount>, CollabError> {
        let mut days = Vec::new();
        for year in years {
            let found = self.scrape_year(user, year)?;
            info!(user, year, days = found.len(), "scraped year");
            days.extend(found);
        }
        Ok(days)
    }
}

impl ActivitySource for ProfileScraper {
    fn fetch_all(&self, user: &str) -> Result<Vec<DayCount>, CollabError> {
        let created = self.gh.created_at(user)?;
        let days = self.scrape_years(user, created.year()..=Utc::now().year())?;
        Ok(filter_days(days, None))
    }

    fn fetch(&self, user: &str, since: Option<NaiveDate>) -> Result<Vec<DayCount>, CollabError> {
        let this_year = Utc::now().year();
        let first = since.map_or(this_year - 1, |d| d.year().min(this_year));
        let days = self.scrape_years(user, first..=this_year)?;
        Ok(filter_days(days, since))
    }
}

/// Extract day counts from calendar tooltips such as
/// `>5 contributions on April 8th.</tool-tip>`.
fn parse_tooltips(html: &str, year: i32) -> Vec<DayCount> {
    const CLOSE: &str = "</tool-tip>";

    let mut days = Vec::new();
    let mut rest = html;
    while let Some(end) = rest.find(CLOSE) {
        let before = &rest[..end];
        let text = before.rfind('>').map_or(before, |gt| &before[gt + 1..]);
        if let Some(day) = parse_tooltip_text(text, year) {
            days.push(day);
        }
        rest = &rest[end + CLOSE.len()..];
    }
    days
}

fn parse_tooltip_text(text: &str, year: i32) -> Option<DayCount> {
    let mut words = text.split_whitespace();
    let count: u32 = words.next()?.parse().ok()?;
    if !matches!(words.next()?, "contribution" | "contributions") || words.next()? != "on" {
        return None;
    }
    let month = month_number(words.next()?)?;
    let day_word = words.next()?.strip_suffix('.')?;
    let day: u32 = ["st", "nd", "rd", "th"]
        .iter()
        .find_map(|suffix| day_word.strip_suffix(suffix))?
        .parse()
        .ok()?;
    let date = NaiveDate::from_ymd_opt(year, month, day)?;
    Some(DayCount::new(date, count))
}

fn month_number(name: &str) -> Option<u32> {
    const MONTHS: [&str; 12] = [
        "January",
        "February",
        "March",
        "April",
        "May",
        "June",
        "July",
        "August",
        "September",
        "October",
        "November",
        "December",
    ];
    MONTHS
        .iter()
        .position(|m| *m == name)
        .and_then(|i| u32::try_from(i + 1).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(s: &str) -> NaiveDate {
        s.parse().expect("valid date")
    }

    #[test]
    fn parses_graphql_calendar() {
        let raw = br#"{"data":{"user":{"contributionsCollection":{"contributionCalendar":{"weeks":[
            {"contributionDays":[{"date":"2024-01-01","contributionCount":3},{"date":"2024-01-02","contributionCount":0}]},
            {"contributionDays":[{"date":"2024-01-08","contributionCount":1}]}
        ]}}}}}"#;
        let days = parse_calendar(raw).expect("parse");
        assert_eq!(days.len(), 3);
        assert_eq!(days[0], DayCount::new(day("2024-01-01"), 3));
        assert_eq!(filter_days(days, None).len(), 2);
    }

    #[test]
    fn graphql_errors_surface_as_fetch_failures() {
        let raw = br#"{"data":{"user":null},"errors":[{"message":"Could not resolve to a User"}]}"#;
        let err = parse_calendar(raw).expect_err("must fail");
        assert!(err.to_string().contains("Could not resolve"));

        let missing = parse_calendar(br#"{"data":{"user":null}}"#).expect_err("must fail");
        assert!(missing.to_string().contains("user not found"));
    }

    #[test]
    fn parses_tooltips_from_calendar_html() {
        let html = r#"
            <td data-date="2023-04-08"></td>
            <tool-tip for="c1" class="sr-only">5 contributions on April 8th.</tool-tip>
            <tool-tip for="c2" class="sr-only">1 contribution on May 1st.</tool-tip>
            <tool-tip for="c3" class="sr-only">No contributions on May 2nd.</tool-tip>
            <tool-tip for="c4" class="sr-only">2 contributions on Smarch 3rd.</tool-tip>
            <tool-tip for="c5" class="sr-only">12 contributions on December 22nd.</tool-tip>
        "#;
        let days = parse_tooltips(html, 2023);
        assert_eq!(
            days,
            vec![
                DayCount::new(day("2023-04-08"), 5),
                DayCount::new(day("2023-05-01"), 1),
                DayCount::new(day("2023-12-22"), 12),
            ]
        );
    }

    #[test]
    fn tooltip_with_impossible_date_is_skipped() {
        assert!(parse_tooltip_text("3 contributions on February 30th.", 2023).is_none());
        assert!(parse_tooltip_text("3 contributions on February 29th.", 2024).is_some());
    }

    #[test]
    fn year_windows_stop_at_now() {
        let now = Utc.with_ymd_and_hms(2024, 3, 15, 10, 0, 0).unwrap();
        let windows = year_windows(2022, now);
        assert_eq!(windows.len(), 3);
        assert_eq!(windows[0].0, Utc.with_ymd_and_hms(2022, 1, 1, 0, 0, 0).unwrap());
        assert_eq!(
            windows[1].1,
            Utc.with_ymd_and_hms(2023, 12, 31, 23, 59, 59).unwrap()
        );
        assert_eq!(windows[2].1, now);
    }
}
