use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use rusqlite::Connection;
use scraper::{Html, Selector};
use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::db;
use crate::parser::{self, Document};

const BASE: &str = "https://www.sec.gov";
const TICKERS_URL: &str = "https://www.sec.gov/files/company_tickers.json";

/// SEC fair-access guidance: stay under 10 requests per second.
const CONCURRENCY: usize = 4;
const REQUEST_DELAY_MS: u64 = 100;
const MAX_RETRIES: u32 = 3;
const BASE_BACKOFF_MS: u64 = 2000;

/// How many recent DEF 14A filings to fetch per company.
const FILINGS_PER_COMPANY: usize = 5;

const FILINGS_DIR: &str = "data/filings";

#[derive(Clone)]
pub struct EdgarClient {
    http: reqwest::Client,
}

impl EdgarClient {
    /// EDGAR rejects requests without a contact in the User-Agent.
    pub fn from_env() -> Result<Self> {
        let email = std::env::var("SEC_EMAIL")
            .map_err(|_| anyhow!("SEC_EMAIL environment variable must be set"))?;
        let http = reqwest::Client::builder()
            .user_agent(format!("def14a-scraper/0.1 ({})", email))
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self { http })
    }

    async fn get_with_retry(&self, url: &str) -> Result<String> {
        for attempt in 0..=MAX_RETRIES {
            // Courtesy delay before every request, per SEC fair-access guidance
            tokio::time::sleep(Duration::from_millis(REQUEST_DELAY_MS)).await;
            let response = self.http.get(url).send().await;
            match response {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        return Ok(resp.text().await?);
                    }
                    if !(status.as_u16() == 429 || status.is_server_error())
                        || attempt == MAX_RETRIES
                    {
                        return Err(anyhow!("GET {} returned {}", url, status));
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
                "Retrying {} (attempt {}/{}), backing off {:.1}s",
                url,
                attempt + 1,
                MAX_RETRIES,
                backoff.as_secs_f64()
            );
            tokio::time::sleep(backoff).await;
        }
        Err(anyhow!("retries exhausted for {}", url))
    }

    /// Company list from the SEC ticker file, CIKs zero-padded to 10 digits.
    pub async fn company_ciks(&self, limit: Option<usize>) -> Result<Vec<(String, String)>> {
        let body = self.get_with_retry(TICKERS_URL).await?;
        let mut companies = parse_company_tickers(&body)?;
        if let Some(n) = limit {
            companies.truncate(n);
        }
        Ok(companies)
    }

    /// Recent DEF 14A filings for one company, newest first.
    pub async fn filing_refs(&self, cik: &str) -> Result<Vec<FilingRef>> {
        let url = format!(
            "{}/cgi-bin/browse-edgar?action=getcompany&CIK={}&type=DEF+14A&dateb=&owner=include&count=40",
            BASE, cik
        );
        let html = self.get_with_retry(&url).await?;
        Ok(parse_filing_table(&html))
    }

    /// Resolve a filing index page to its primary document and download it.
    pub async fn filing_content(&self, filing: &FilingRef) -> Result<String> {
        let index_html = self.get_with_retry(&filing.index_url).await?;
        let doc_url = find_filing_link(&index_html)
            .ok_or_else(|| anyhow!("no DEF 14A document on {}", filing.index_url))?;
        self.get_with_retry(&doc_url).await
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilingRef {
    pub filing_date: String,
    pub index_url: String,
}

fn parse_company_tickers(body: &str) -> Result<Vec<(String, String)>> {
    let parsed: serde_json::Value =
        serde_json::from_str(body).context("company_tickers.json did not parse")?;
    let map = parsed
        .as_object()
        .ok_or_else(|| anyhow!("company_tickers.json is not an object"))?;

    let mut companies = Vec::with_capacity(map.len());
    for entry in map.values() {
        let Some(cik) = entry.get("cik_str").and_then(|v| v.as_u64()) else {
            continue;
        };
        let Some(title) = entry.get("title").and_then(|v| v.as_str()) else {
            continue;
        };
        companies.push((format!("{:010}", cik), title.to_string()));
    }
    Ok(companies)
}

/// Parse the browse-edgar results table. Rows whose type column is exactly
/// "DEF 14A" yield a documents-page link and a filing date.
fn parse_filing_table(html: &str) -> Vec<FilingRef> {
    let doc = Html::parse_document(html);
    let row_sel = Selector::parse("table.tableFile2 tr").unwrap();
    let td_sel = Selector::parse("td").unwrap();
    let a_sel = Selector::parse("a").unwrap();

    let mut refs = Vec::new();
    for row in doc.select(&row_sel) {
        let tds: Vec<_> = row.select(&td_sel).collect();
        if tds.len() < 4 {
            continue;
        }
        let filing_type = tds[0].text().collect::<String>();
        if filing_type.trim() != "DEF 14A" {
            continue;
        }
        let Some(href) = tds[1].select(&a_sel).next().and_then(|a| a.value().attr("href")) else {
            continue;
        };
        let filing_date = tds[3].text().collect::<String>().trim().to_string();
        if filing_date.is_empty() {
            continue;
        }
        refs.push(FilingRef {
            filing_date,
            index_url: format!("{}{}", BASE, href),
        });
        if refs.len() >= FILINGS_PER_COMPANY {
            break;
        }
    }
    refs
}

/// Pick the proxy document out of a filing's documents page. Prefer a link
/// whose name says def14a outright; fall back to any .htm document in a row
/// labelled DEF 14A.
fn find_filing_link(html: &str) -> Option<String> {
    let doc = Html::parse_document(html);
    let row_sel = Selector::parse("table tr").unwrap();
    let a_sel = Selector::parse("a").unwrap();

    let mut fallback = None;
    for row in doc.select(&row_sel) {
        let Some(a) = row.select(&a_sel).next() else {
            continue;
        };
        let Some(href) = a.value().attr("href") else {
            continue;
        };
        let href_lower = href.to_lowercase();
        if !href_lower.ends_with(".htm") && !href_lower.ends_with(".html") {
            continue;
        }
        // iXBRL viewer links wrap the real document path
        let href = href.strip_prefix("/ix?doc=").unwrap_or(href);
        if href_lower.contains("def14a") {
            return Some(format!("{}{}", BASE, href));
        }
        let row_text = row.text().collect::<String>().to_lowercase();
        if fallback.is_none() && row_text.contains("def 14a") {
            fallback = Some(format!("{}{}", BASE, href));
        }
    }
    fallback
}

/// Scrape stats returned after completion.
pub struct ScrapeStats {
    pub companies: usize,
    pub saved: usize,
    pub invalid: usize,
    pub errors: usize,
    pub skipped: usize,
}

struct FilingOutcome {
    filing_date: String,
    url: String,
    content: Option<String>,
    error: Option<String>,
}

struct CompanyOutcome {
    cik: String,
    filings: Vec<FilingOutcome>,
    skipped: usize,
}

/// Scrape companies concurrently, validating and saving each filing to disk
/// and the ledger as it arrives. Filings already completed in the ledger are
/// skipped without a network request.
pub async fn scrape_companies_streaming(
    conn: &Connection,
    companies: Vec<(String, String)>,
) -> Result<ScrapeStats> {
    let client = Arc::new(EdgarClient::from_env()?);
    let done = Arc::new(db::fetch_completed_filings(conn)?);
    let semaphore = Arc::new(Semaphore::new(CONCURRENCY));
    let total = companies.len();

    std::fs::create_dir_all(FILINGS_DIR)?;

    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")?
            .progress_chars("=> "),
    );

    // Channel: workers send per-company results, main loop validates and saves
    let (tx, mut rx) = tokio::sync::mpsc::channel::<CompanyOutcome>(CONCURRENCY * 2);

    for (cik, name) in companies {
        let client = Arc::clone(&client);
        let done = Arc::clone(&done);
        let sem = Arc::clone(&semaphore);
        let tx = tx.clone();

        tokio::spawn(async move {
            let _permit = sem.acquire().await.unwrap();
            let outcome = fetch_company(&client, &done, &cik, &name).await;
            let _ = tx.send(outcome).await;
        });
    }

    // Drop our copy of tx so rx closes when all spawned tasks finish
    drop(tx);

    let mut saved = 0usize;
    let mut invalid = 0usize;
    let mut errors = 0usize;
    let mut skipped = 0usize;

    while let Some(outcome) = rx.recv().await {
        skipped += outcome.skipped;
        for filing in outcome.filings {
            match save_filing(conn, &outcome.cik, &filing) {
                Ok(FilingDisposition::Saved) => saved += 1,
                Ok(FilingDisposition::Invalid) => invalid += 1,
                Ok(FilingDisposition::Errored) => errors += 1,
                Err(e) => {
                    warn!("Ledger write failed for {}: {}", outcome.cik, e);
                    errors += 1;
                }
            }
        }
        db::mark_company_scraped(conn, &outcome.cik)?;
        pb.inc(1);
    }

    pb.finish_and_clear();
    info!(
        "Scraped {} companies ({} filings saved, {} invalid, {} errors, {} skipped)",
        total, saved, invalid, errors, skipped
    );

    Ok(ScrapeStats {
        companies: total,
        saved,
        invalid,
        errors,
        skipped,
    })
}

async fn fetch_company(
    client: &EdgarClient,
    done: &HashSet<(String, String)>,
    cik: &str,
    name: &str,
) -> CompanyOutcome {
    let mut outcome = CompanyOutcome {
        cik: cik.to_string(),
        filings: Vec::new(),
        skipped: 0,
    };

    let refs = match client.filing_refs(cik).await {
        Ok(refs) => refs,
        Err(e) => {
            warn!("Filing list failed for {} ({}): {}", name, cik, e);
            return outcome;
        }
    };

    for filing in refs {
        if done.contains(&(cik.to_string(), filing.filing_date.clone())) {
            outcome.skipped += 1;
            continue;
        }
        match client.filing_content(&filing).await {
            Ok(content) => outcome.filings.push(FilingOutcome {
                filing_date: filing.filing_date,
                url: filing.index_url,
                content: Some(content),
                error: None,
            }),
            Err(e) => {
                warn!("Filing fetch failed for {} {}: {}", cik, filing.filing_date, e);
                outcome.filings.push(FilingOutcome {
                    filing_date: filing.filing_date,
                    url: filing.index_url,
                    content: None,
                    error: Some(e.to_string()),
                });
            }
        }
    }

    outcome
}

enum FilingDisposition {
    Saved,
    Invalid,
    Errored,
}

/// Gate a downloaded filing on the validity check, then persist it. Invalid
/// and errored filings are recorded in the ledger but never written to disk.
fn save_filing(conn: &Connection, cik: &str, filing: &FilingOutcome) -> Result<FilingDisposition> {
    let Some(content) = &filing.content else {
        db::record_filing(
            conn,
            cik,
            &filing.filing_date,
            &filing.url,
            None,
            "error",
            filing.error.as_deref(),
        )?;
        return Ok(FilingDisposition::Errored);
    };

    let verdict = parser::validity::check_validity(&Document::parse(content).full_text());
    if !verdict.valid {
        db::record_filing(
            conn,
            cik,
            &filing.filing_date,
            &filing.url,
            None,
            "invalid",
            Some(&format!("{} of 4 required terms", verdict.matched_terms)),
        )?;
        return Ok(FilingDisposition::Invalid);
    }

    let path = format!("{}/{}_{}_def14a.htm", FILINGS_DIR, cik, filing.filing_date);
    std::fs::write(&path, content)?;
    db::record_filing(
        conn,
        cik,
        &filing.filing_date,
        &filing.url,
        Some(&path),
        "completed",
        None,
    )?;
    Ok(FilingDisposition::Saved)
}
