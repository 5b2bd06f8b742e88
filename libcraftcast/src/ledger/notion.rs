//! Notion-backed ledger implementation
//!
//! Talks to the Notion database API directly over HTTPS. Property names
//! are configurable through [`LedgerSchema`] so the database layout is
//! not hard-coded into the engine.

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime, Utc};
use serde_json::{json, Value};

use crate::error::{LedgerError, Result};
use crate::ledger::{WorkRepository, WorkUpdate};
use crate::types::{ErrorEntry, PlatformId, PlatformState, Work};

const API_BASE: &str = "https://api.notion.com/v1";
const NOTION_VERSION: &str = "2022-06-28";

/// Notion keeps rich text properties under 2000 characters.
const ERROR_LOG_MAX_CHARS: usize = 2000;

const ERROR_LOG_TIME_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Database property names.
#[derive(Debug, Clone)]
pub struct LedgerSchema {
    pub title: String,
    pub student: String,
    pub images: String,
    pub completion_date: String,
    pub scheduled_date: String,
    pub posted_date: String,
    pub skip: String,
    pub caption: String,
    pub tags: String,
    pub error_log: String,
}

impl Default for LedgerSchema {
    fn default() -> Self {
        Self {
            title: "Title".to_string(),
            student: "Student".to_string(),
            images: "Images".to_string(),
            completion_date: "Completed".to_string(),
            scheduled_date: "Scheduled".to_string(),
            posted_date: "Posted on".to_string(),
            skip: "Skip".to_string(),
            caption: "Caption".to_string(),
            tags: "Tags".to_string(),
            error_log: "Error log".to_string(),
        }
    }
}

impl LedgerSchema {
    fn posted_prop(&self, platform: PlatformId) -> String {
        match platform {
            PlatformId::Instagram => "Instagram posted".to_string(),
            PlatformId::Threads => "Threads posted".to_string(),
            PlatformId::X => "X posted".to_string(),
        }
    }

    fn post_id_prop(&self, platform: PlatformId) -> String {
        match platform {
            PlatformId::Instagram => "Instagram post ID".to_string(),
            PlatformId::Threads => "Threads post ID".to_string(),
            PlatformId::X => "X post ID".to_string(),
        }
    }
}

pub struct NotionLedger {
    http: reqwest::Client,
    token: String,
    database_id: String,
    schema: LedgerSchema,
}

impl NotionLedger {
    pub fn new(token: String, database_id: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            token,
            database_id,
            schema: LedgerSchema::default(),
        }
    }

    pub fn with_schema(mut self, schema: LedgerSchema) -> Self {
        self.schema = schema;
        self
    }

    async fn query(&self, body: Value) -> Result<Vec<Value>> {
        let url = format!("{}/databases/{}/query", API_BASE, self.database_id);
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.token)
            .header("Notion-Version", NOTION_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(LedgerError::Http)?;

        let payload: Value = Self::check(response).await?;
        let results = payload["results"]
            .as_array()
            .ok_or_else(|| LedgerError::Parse("query response missing results".to_string()))?;
        Ok(results.clone())
    }

    async fn retrieve_page(&self, page_id: &str) -> Result<Value> {
        let url = format!("{}/pages/{}", API_BASE, page_id);
        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.token)
            .header("Notion-Version", NOTION_VERSION)
            .send()
            .await
            .map_err(LedgerError::Http)?;
        Self::check(response).await
    }

    async fn update_page(&self, page_id: &str, properties: Value) -> Result<()> {
        let url = format!("{}/pages/{}", API_BASE, page_id);
        let response = self
            .http
            .patch(&url)
            .bearer_auth(&self.token)
            .header("Notion-Version", NOTION_VERSION)
            .json(&json!({ "properties": properties }))
            .send()
            .await
            .map_err(LedgerError::Http)?;
        Self::check(response).await?;
        tracing::info!("Updated ledger page: {}", page_id);
        Ok(())
    }

    async fn check(response: reqwest::Response) -> Result<Value> {
        let status = response.status();
        let payload: Value = response.json().await.map_err(LedgerError::Http)?;
        if !status.is_success() || payload["object"] == "error" {
            let message = payload["message"]
                .as_str()
                .unwrap_or("unknown ledger error")
                .to_string();
            return Err(LedgerError::Api(format!("{} ({})", message, status)).into());
        }
        Ok(payload)
    }

    fn skip_filter(&self) -> Value {
        json!({ "property": self.schema.skip, "checkbox": { "equals": false } })
    }

    fn completion_sorts(&self) -> Value {
        // Oldest first; created time breaks same-day ties in input order.
        json!([
            { "property": self.schema.completion_date, "direction": "ascending" },
            { "timestamp": "created_time", "direction": "ascending" }
        ])
    }

    fn rich_text(props: &Value, key: &str) -> Option<String> {
        let texts = props.get(key)?.get("rich_text")?.as_array()?;
        if texts.is_empty() {
            return None;
        }
        let joined: String = texts
            .iter()
            .filter_map(|t| t["plain_text"].as_str())
            .collect();
        Some(joined)
    }

    fn date(props: &Value, key: &str) -> Option<NaiveDate> {
        let start = props.get(key)?.get("date")?.get("start")?.as_str()?;
        // Date properties may carry a time component; the date part leads.
        start.get(..10)?.parse().ok()
    }

    fn checkbox(props: &Value, key: &str) -> bool {
        props
            .get(key)
            .and_then(|p| p.get("checkbox"))
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    fn parse_error_log(text: &str) -> Vec<ErrorEntry> {
        let mut entries = Vec::new();
        for line in text.lines() {
            let Some((ts, rest)) = line.split_once(" | ") else {
                continue;
            };
            let Some((platform, message)) = rest.split_once(": ") else {
                continue;
            };
            let Ok(platform) = platform.parse::<PlatformId>() else {
                continue;
            };
            let Ok(timestamp) = NaiveDateTime::parse_from_str(ts.trim(), ERROR_LOG_TIME_FORMAT)
            else {
                continue;
            };
            entries.push(ErrorEntry {
                timestamp: timestamp.and_utc(),
                platform,
                message: message.to_string(),
            });
        }
        entries
    }

    fn format_error_line(platform: PlatformId, message: &str) -> String {
        format!(
            "{} | {}: {}",
            Utc::now().format(ERROR_LOG_TIME_FORMAT),
            platform,
            message
        )
    }

    fn parse_page(&self, page: &Value) -> Result<Work> {
        let props = &page["properties"];
        let id = page["id"]
            .as_str()
            .ok_or_else(|| LedgerError::Parse("page missing id".to_string()))?
            .to_string();

        let title = props
            .get(&self.schema.title)
            .and_then(|p| p.get("title"))
            .and_then(Value::as_array)
            .map(|texts| {
                texts
                    .iter()
                    .filter_map(|t| t["plain_text"].as_str())
                    .collect::<String>()
            })
            .unwrap_or_default();

        let student = props
            .get(&self.schema.student)
            .and_then(|p| p.get("select"))
            .and_then(|s| s.get("name"))
            .and_then(Value::as_str)
            .map(str::to_string);

        let mut image_urls = Vec::new();
        if let Some(files) = props
            .get(&self.schema.images)
            .and_then(|p| p.get("files"))
            .and_then(Value::as_array)
        {
            for file in files {
                let url = match file["type"].as_str() {
                    Some("external") => file["external"]["url"].as_str(),
                    Some("file") => file["file"]["url"].as_str(),
                    _ => None,
                };
                if let Some(url) = url {
                    image_urls.push(url.to_string());
                }
            }
        }

        let mut platforms = std::collections::BTreeMap::new();
        for platform in PlatformId::all() {
            let posted = Self::checkbox(props, &self.schema.posted_prop(platform));
            let post_id = Self::rich_text(props, &self.schema.post_id_prop(platform));
            if posted || post_id.is_some() {
                platforms.insert(platform, PlatformState { posted, post_id });
            }
        }

        let error_log = Self::rich_text(props, &self.schema.error_log)
            .map(|text| Self::parse_error_log(&text))
            .unwrap_or_default();

        Ok(Work {
            id,
            title,
            student,
            image_urls,
            completion_date: Self::date(props, &self.schema.completion_date),
            scheduled_date: Self::date(props, &self.schema.scheduled_date),
            skip: Self::checkbox(props, &self.schema.skip),
            caption: Self::rich_text(props, &self.schema.caption),
            tags: Self::rich_text(props, &self.schema.tags),
            platforms,
            error_log,
        })
    }
}

#[async_trait]
impl WorkRepository for NotionLedger {
    async fn scheduled_for(&self, date: NaiveDate) -> Result<Vec<Work>> {
        let pages = self
            .query(json!({
                "filter": {
                    "and": [
                        {
                            "property": self.schema.scheduled_date,
                            "date": { "equals": date.format("%Y-%m-%d").to_string() }
                        },
                        self.skip_filter()
                    ]
                }
            }))
            .await?;

        pages.iter().map(|p| self.parse_page(p)).collect()
    }

    async fn catchup_candidates(&self, platform: PlatformId, limit: usize) -> Result<Vec<Work>> {
        let others: Vec<Value> = PlatformId::all()
            .iter()
            .filter(|p| **p != platform)
            .map(|p| {
                json!({
                    "property": self.schema.posted_prop(*p),
                    "checkbox": { "equals": true }
                })
            })
            .collect();

        let pages = self
            .query(json!({
                "filter": {
                    "and": [
                        self.skip_filter(),
                        {
                            "property": self.schema.posted_prop(platform),
                            "checkbox": { "equals": false }
                        },
                        { "or": others }
                    ]
                },
                "sorts": self.completion_sorts(),
                "page_size": limit
            }))
            .await?;

        pages.iter().map(|p| self.parse_page(p)).collect()
    }

    async fn basic_candidates(&self, limit: usize) -> Result<Vec<Work>> {
        let unposted: Vec<Value> = PlatformId::all()
            .iter()
            .map(|p| {
                json!({
                    "property": self.schema.posted_prop(*p),
                    "checkbox": { "equals": false }
                })
            })
            .collect();

        let mut filters = vec![self.skip_filter()];
        filters.extend(unposted);

        let pages = self
            .query(json!({
                "filter": { "and": filters },
                "sorts": self.completion_sorts(),
                "page_size": limit
            }))
            .await?;

        pages.iter().map(|p| self.parse_page(p)).collect()
    }

    async fn update(&self, work_id: &str, platform: PlatformId, update: WorkUpdate) -> Result<()> {
        let mut properties = serde_json::Map::new();

        if let Some(post_id) = &update.posted {
            properties.insert(
                self.schema.posted_prop(platform),
                json!({ "checkbox": true }),
            );
            properties.insert(
                self.schema.post_id_prop(platform),
                json!({ "rich_text": [{ "text": { "content": post_id } }] }),
            );
        }

        if let Some(date) = update.posted_date {
            properties.insert(
                self.schema.posted_date.clone(),
                json!({ "date": { "start": date.format("%Y-%m-%d").to_string() } }),
            );
        }

        if update.error_append.is_some() || update.clear_errors {
            // Rebuild the log text: the log is append-only for failures,
            // but a success drops this platform's stale entries.
            let page = self.retrieve_page(work_id).await?;
            let current = Self::rich_text(&page["properties"], &self.schema.error_log)
                .unwrap_or_default();

            let platform_marker = format!(" | {}: ", platform);
            let mut lines: Vec<String> = current
                .lines()
                .filter(|l| !l.trim().is_empty())
                .filter(|l| !(update.clear_errors && l.contains(&platform_marker)))
                .map(str::to_string)
                .collect();

            if let Some(message) = &update.error_append {
                lines.push(Self::format_error_line(platform, message));
            }

            let mut log = lines.join("\n");
            if log.chars().count() > ERROR_LOG_MAX_CHARS {
                log = log.chars().take(ERROR_LOG_MAX_CHARS).collect();
            }

            properties.insert(
                self.schema.error_log.clone(),
                json!({ "rich_text": [{ "text": { "content": log } }] }),
            );
        }

        if properties.is_empty() {
            return Ok(());
        }

        self.update_page(work_id, Value::Object(properties)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_log_lines() {
        let text = "2026-03-01 09:30 | instagram: Media processing error\n\
                    2026-03-02 10:00 | x: Failed to upload media";
        let entries = NotionLedger::parse_error_log(text);

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].platform, PlatformId::Instagram);
        assert_eq!(entries[0].message, "Media processing error");
        assert_eq!(entries[1].platform, PlatformId::X);
    }

    #[test]
    fn test_parse_error_log_skips_malformed_lines() {
        let text = "not a log line\n2026-03-01 09:30 | threads: container expired";
        let entries = NotionLedger::parse_error_log(text);

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].platform, PlatformId::Threads);
    }

    #[test]
    fn test_format_error_line_round_trips() {
        let line = NotionLedger::format_error_line(PlatformId::X, "upload failed");
        let entries = NotionLedger::parse_error_log(&line);

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].platform, PlatformId::X);
        assert_eq!(entries[0].message, "upload failed");
    }

    #[test]
    fn test_parse_page_minimal() {
        let ledger = NotionLedger::new("token".to_string(), "db".to_string());
        let page = json!({
            "id": "page-1",
            "properties": {
                "Title": { "title": [{ "plain_text": "Owl carving" }] },
                "Images": { "files": [
                    { "type": "external", "external": { "url": "https://example.com/a.jpg" } },
                    { "type": "file", "file": { "url": "https://files.notion.so/b.jpg" } }
                ]},
                "Completed": { "date": { "start": "2026-01-15" } },
                "Skip": { "checkbox": false },
                "Instagram posted": { "checkbox": true },
                "Instagram post ID": { "rich_text": [{ "plain_text": "1789" }] }
            }
        });

        let work = ledger.parse_page(&page).unwrap();
        assert_eq!(work.id, "page-1");
        assert_eq!(work.title, "Owl carving");
        assert_eq!(work.image_urls.len(), 2);
        assert_eq!(work.completion_date, Some("2026-01-15".parse().unwrap()));
        assert!(!work.skip);
        assert!(work.is_posted(PlatformId::Instagram));
        assert_eq!(
            work.state(PlatformId::Instagram).post_id,
            Some("1789".to_string())
        );
        assert!(!work.is_posted(PlatformId::X));
    }

    #[test]
    fn test_parse_page_date_with_time_component() {
        let ledger = NotionLedger::new("token".to_string(), "db".to_string());
        let page = json!({
            "id": "page-2",
            "properties": {
                "Title": { "title": [] },
                "Scheduled": { "date": { "start": "2026-03-01T09:00:00.000+09:00" } }
            }
        });

        let work = ledger.parse_page(&page).unwrap();
        assert_eq!(work.scheduled_date, Some("2026-03-01".parse().unwrap()));
    }
}
