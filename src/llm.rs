use std::sync::LazyLock;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::parser::Section;
use crate::schema::Executive;

const DEFAULT_BASE_URL: &str = "https://api.deepseek.com";
const MODEL: &str = "deepseek-chat";
const TEMPERATURE: f64 = 0.1;
const MAX_RETRIES: u32 = 2;
const BASE_BACKOFF_MS: u64 = 2000;

/// How much of a section body goes into the filter preview.
const PREVIEW_CHARS: usize = 200;
const MAX_FILTERED_SECTIONS: usize = 3;

static QUOTED_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#""([^"]+)""#).unwrap());

const FILTER_PROMPT: &str = "Review these section titles and previews from an SEC DEF 14A filing.
Identify sections likely to contain:
1. Executive compensation information
2. Executive biographical information
3. Management structure information

Return a JSON array of section titles that are most relevant. Return at most 3 sections.
Example: [\"EXECUTIVE COMPENSATION\", \"BIOGRAPHICAL INFORMATION\"]

Here are the sections to review:";

const EXTRACT_PROMPT: &str = "Extract detailed executive information from these proxy statement sections.

For each Named Executive Officer (NEO), extract:

1. Name and current position
2. Age (if mentioned)
3. Compensation for most recent fiscal year:
   - Base salary
   - Stock awards
   - Non-equity incentive plan / bonus
   - All other compensation
   - Total compensation
4. Educational background (all degrees, universities, and fields)
5. When they joined the company (if mentioned)
6. Previous roles at the company
7. Board and committee memberships

Return as JSON array, with NO other details. Example:
[
    {
        \"name\": \"John Smith\",
        \"current_role\": \"Chief Executive Officer\",
        \"age\": 55,
        \"compensation_salary\": 1000000,
        \"compensation_stock\": 5000000,
        \"compensation_bonus\": 2000000,
        \"compensation_other\": 500000,
        \"compensation_total\": 8500000,
        \"compensation_year\": 2023,
        \"education\": [
            {
                \"degree\": \"MBA\",
                \"field\": \"Business Administration\",
                \"university\": \"Harvard Business School\",
                \"year\": 1990
            }
        ],
        \"start_date\": \"2015\",
        \"past_roles\": [\"COO\", \"SVP Operations\"],
        \"board_member\": true,
        \"committee_memberships\": [\"Executive Committee\"]
    }
]";

#[derive(Clone)]
pub struct DeepSeekClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

#[derive(Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Serialize)]
struct ChatRequest {
    model: &'static str,
    messages: Vec<ChatMessage>,
    temperature: f64,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: String,
}

impl DeepSeekClient {
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("DEEPSEEK_API_KEY")
            .map_err(|_| anyhow!("DEEPSEEK_API_KEY environment variable must be set"))?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()?;
        Ok(Self {
            http,
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
        })
    }

    async fn chat(&self, messages: Vec<ChatMessage>) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);
        let request = ChatRequest {
            model: MODEL,
            messages,
            temperature: TEMPERATURE,
        };

        for attempt in 0..=MAX_RETRIES {
            let response = self
                .http
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(&request)
                .send()
                .await;

            match response {
                Ok(resp) if resp.status().is_success() => {
                    let parsed: ChatResponse =
                        resp.json().await.context("chat response did not parse")?;
                    let content = parsed
                        .choices
                        .into_iter()
                        .next()
                        .map(|c| c.message.content)
                        .ok_or_else(|| anyhow!("chat response had no choices"))?;
                    return Ok(content.trim().to_string());
                }
                Ok(resp) => {
                    let status = resp.status();
                    if !(status.as_u16() == 429 || status.is_server_error())
                        || attempt == MAX_RETRIES
                    {
                        return Err(anyhow!("chat request failed: {}", status));
                    }
                }
                Err(e) => {
                    if attempt == MAX_RETRIES {
                        return Err(e.into());
                    }
                }
            }

            let backoff = Duration::from_millis(BASE_BACKOFF_MS * 2u64.pow(attempt));
            warn!(
                "Chat request retry {}/{}, backing off {:.1}s",
                attempt + 1,
                MAX_RETRIES,
                backoff.as_secs_f64()
            );
            tokio::time::sleep(backoff).await;
        }
        Err(anyhow!("chat retries exhausted"))
    }

    /// Ask the model which section titles matter. On any failure the caller
    /// should fall back to the keyword classifier rather than drop the filing.
    pub async fn filter_sections(&self, sections: &[Section]) -> Result<Vec<String>> {
        let previews = section_previews(sections);
        let content = self
            .chat(vec![
                ChatMessage {
                    role: "system",
                    content: "You are an expert at identifying relevant sections in SEC filings."
                        .to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: FILTER_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "assistant",
                    content: "I will identify the most relevant sections and return them as a JSON array."
                        .to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: serde_json::to_string_pretty(&previews)?,
                },
            ])
            .await?;

        let mut titles = parse_title_array(&content);
        titles.truncate(MAX_FILTERED_SECTIONS);
        Ok(titles)
    }

    /// Extract structured executive records from the relevant sections.
    pub async fn extract_executives(&self, sections: &[Section]) -> Result<Vec<Executive>> {
        let combined = sections
            .iter()
            .map(|s| format!("{}:\n{}", s.title, s.body))
            .collect::<Vec<_>>()
            .join("\n\n");

        let content = self
            .chat(vec![
                ChatMessage {
                    role: "system",
                    content: "You are an expert at extracting executive compensation and biographical information from SEC filings."
                        .to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: EXTRACT_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "assistant",
                    content: "I will extract the executive information and return it in the requested JSON format."
                        .to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: format!("Here's the content:\n\n{}", combined),
                },
            ])
            .await?;

        let json = strip_code_fences(&content);
        serde_json::from_str(json).context("executive JSON did not parse")
    }
}

fn section_previews(sections: &[Section]) -> Vec<serde_json::Value> {
    sections
        .iter()
        .map(|s| {
            let preview: String = s.body.chars().take(PREVIEW_CHARS).collect();
            serde_json::json!({ "title": s.title, "preview": format!("{}…", preview) })
        })
        .collect()
}

/// Parse a JSON array of titles; when the model wraps or mangles the array,
/// salvage every quoted string instead.
fn parse_title_array(content: &str) -> Vec<String> {
    if let Ok(titles) = serde_json::from_str::<Vec<String>>(strip_code_fences(content)) {
        return titles;
    }
    QUOTED_RE
        .captures_iter(content)
        .map(|c| c[1].to_string())
        .collect()
}

fn strip_code_fences(content: &str) -> &str {
    let content = content.trim();
    let content = content
        .strip_prefix("```json")
        .or_else(|| content.strip_prefix("```"))
        .unwrap_or(content);
    content.strip_suffix("```").unwrap_or(content).trim()
}

/// Keep the sections whose titles the model picked, case-insensitive
/// substring match like the keyword classifier uses.
pub fn apply_title_filter(sections: &[Section], titles: &[String]) -> Vec<Section> {
    sections
        .iter()
        .filter(|s| {
            let title = s.title.to_lowercase();
            titles.iter().any(|t| title.contains(&t.to_lowercase()))
        })
        .cloned()
        .collect()
}
