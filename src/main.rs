mod db;
mod edgar;
mod export;
mod llm;
mod parser;
mod schema;

use std::time::Instant;

use clap::{Parser, Subcommand};
use tracing::{debug, warn};

#[derive(Parser)]
#[command(name = "def14a_scraper", about = "SEC DEF 14A proxy statement scraper")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch the SEC company list and populate the ledger
    Init {
        /// Max companies to register (default: all)
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Download and validate DEF 14A filings for registered companies
    Scrape {
        /// Max companies to scrape (default: all registered)
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Segment stored filings and extract executive data
    Process {
        /// Max filings to process (default: all unprocessed)
        #[arg(short = 'n', long)]
        limit: Option<usize>,
        /// Let the model pick relevant sections instead of the keyword classifier
        #[arg(long)]
        llm_filter: bool,
    },
    /// Scrape + process in one pipeline
    Run {
        /// Max companies to scrape+process
        #[arg(short = 'n', long)]
        limit: Option<usize>,
        /// Let the model pick relevant sections instead of the keyword classifier
        #[arg(long)]
        llm_filter: bool,
    },
    /// Dump extracted executives to CSV
    Export {
        /// Output file
        #[arg(short, long, default_value = "executives.csv")]
        output: String,
    },
    /// Show ledger statistics
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Init { limit } => {
            let conn = db::connect()?;
            db::init_schema(&conn)?;
            let client = edgar::EdgarClient::from_env()?;
            let companies = client.company_ciks(limit).await?;
            let inserted = db::upsert_companies(&conn, &companies)?;
            println!("Registered {} companies ({} fetched)", inserted, companies.len());
            Ok(())
        }
        Commands::Scrape { limit } => {
            let conn = db::connect()?;
            db::init_schema(&conn)?;
            let companies = db::fetch_companies(&conn, limit)?;
            if companies.is_empty() {
                println!("No companies registered. Run 'init' first.");
                return Ok(());
            }
            println!("Scraping {} companies (streaming to DB)...", companies.len());
            let stats = edgar::scrape_companies_streaming(&conn, companies).await?;
            print_scrape_stats(&stats);
            Ok(())
        }
        Commands::Process { limit, llm_filter } => {
            let conn = db::connect()?;
            db::init_schema(&conn)?;
            let filings = db::fetch_unprocessed(&conn, limit)?;
            if filings.is_empty() {
                println!("No unprocessed filings. Run 'scrape' first.");
                return Ok(());
            }
            println!("Processing {} filings...", filings.len());
            let counts = process_filings(&conn, &filings, llm_filter).await?;
            counts.print();
            Ok(())
        }
        Commands::Run { limit, llm_filter } => {
            let conn = db::connect()?;
            db::init_schema(&conn)?;
            let companies = db::fetch_companies(&conn, limit)?;
            if companies.is_empty() {
                println!("No companies registered. Run 'init' first.");
                return Ok(());
            }

            // Phase 1: scrape (streaming to DB)
            let t_scrape = Instant::now();
            println!("Pipeline: scraping {} companies...", companies.len());
            let stats = edgar::scrape_companies_streaming(&conn, companies).await?;
            print_scrape_stats(&stats);
            println!("Scrape phase took {:.1}s", t_scrape.elapsed().as_secs_f64());

            // Phase 2: process
            let t_process = Instant::now();
            let filings = db::fetch_unprocessed(&conn, None)?;
            if filings.is_empty() {
                println!("Nothing to process (no valid filings stored).");
                return Ok(());
            }
            println!("Processing {} filings...", filings.len());
            let counts = process_filings(&conn, &filings, llm_filter).await?;
            println!("Process phase took {:.1}s", t_process.elapsed().as_secs_f64());
            counts.print();
            Ok(())
        }
        Commands::Export { output } => {
            let conn = db::connect()?;
            db::init_schema(&conn)?;
            let count = export::export_csv(&conn, &output)?;
            if count == 0 {
                println!("No executive data found. Run 'process' first.");
            } else {
                println!("Wrote {} executives to {}", count, output);
            }
            Ok(())
        }
        Commands::Stats => {
            let conn = db::connect()?;
            db::init_schema(&conn)?;
            let s = db::get_stats(&conn)?;
            println!("Companies:  {}", s.companies);
            println!("Filings:    {}", s.filings);
            println!("Completed:  {}", s.completed);
            println!("Invalid:    {}", s.invalid);
            println!("Processed:  {}", s.processed);
            println!("Executives: {}", s.executives);
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn print_scrape_stats(stats: &edgar::ScrapeStats) {
    println!(
        "Done: {} companies ({} filings saved, {} invalid, {} errors, {} skipped).",
        stats.companies, stats.saved, stats.invalid, stats.errors, stats.skipped
    );
}

struct ProcessCounts {
    completed: usize,
    executives: usize,
    failed: usize,
}

impl ProcessCounts {
    fn print(&self) {
        println!(
            "Processed {} filings ({} executives extracted, {} failed).",
            self.completed, self.executives, self.failed,
        );
    }
}

struct ParsedFiling<'a> {
    filing: &'a db::PendingFiling,
    sections: Vec<parser::Section>,
    error: Option<String>,
}

/// Segment filings in parallel, then run the extraction model sequentially.
/// Every failure is recorded per filing; one bad document never aborts a run.
async fn process_filings(
    conn: &rusqlite::Connection,
    filings: &[db::PendingFiling],
    llm_filter: bool,
) -> anyhow::Result<ProcessCounts> {
    use indicatif::{ProgressBar, ProgressStyle};
    use rayon::prelude::*;

    let client = llm::DeepSeekClient::from_env()?;

    let mut counts = ProcessCounts {
        completed: 0,
        executives: 0,
        failed: 0,
    };

    let pb = ProgressBar::new(filings.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec})")
            .unwrap()
            .progress_chars("#>-"),
    );

    for chunk in filings.chunks(500) {
        let parsed: Vec<ParsedFiling> = chunk.par_iter().map(segment_filing).collect();

        for item in parsed {
            let outcome = handle_filing(conn, &client, &item, llm_filter).await;
            match outcome {
                Ok(n) => {
                    counts.completed += 1;
                    counts.executives += n;
                }
                Err(e) => {
                    counts.failed += 1;
                    db::set_processing_status(
                        conn,
                        &item.filing.cik,
                        &item.filing.filing_date,
                        "failed",
                        Some(&e.to_string()),
                    )?;
                }
            }
            pb.inc(1);
        }
    }

    pb.finish_and_clear();
    Ok(counts)
}

fn segment_filing(filing: &db::PendingFiling) -> ParsedFiling<'_> {
    let html = match std::fs::read_to_string(&filing.file_path) {
        Ok(html) => html,
        Err(e) => {
            return ParsedFiling {
                filing,
                sections: Vec::new(),
                error: Some(format!("read {}: {}", filing.file_path, e)),
            }
        }
    };

    let doc = parser::Document::parse(&html);
    let seg = parser::segment(&doc);
    if seg.unmatched_headings > 0 {
        debug!(
            "{} {}: {} headings not found in text stream",
            filing.cik, filing.filing_date, seg.unmatched_headings
        );
    }
    let error = seg.sections.is_empty().then(|| "no sections extracted".to_string());

    ParsedFiling {
        filing,
        sections: seg.sections,
        error,
    }
}

/// Returns the number of executives saved, or an error describing why this
/// filing failed.
async fn handle_filing(
    conn: &rusqlite::Connection,
    client: &llm::DeepSeekClient,
    item: &ParsedFiling<'_>,
    llm_filter: bool,
) -> anyhow::Result<usize> {
    if let Some(e) = &item.error {
        anyhow::bail!("{}", e);
    }

    let relevant = if llm_filter {
        match client.filter_sections(&item.sections).await {
            Ok(titles) if !titles.is_empty() => llm::apply_title_filter(&item.sections, &titles),
            Ok(_) => parser::relevance::classify_relevance(&item.sections),
            Err(e) => {
                warn!(
                    "Section filter failed for {} {}, using keyword classifier: {}",
                    item.filing.cik, item.filing.filing_date, e
                );
                parser::relevance::classify_relevance(&item.sections)
            }
        }
    } else {
        parser::relevance::classify_relevance(&item.sections)
    };

    if relevant.is_empty() {
        anyhow::bail!("no relevant sections");
    }

    let executives = client.extract_executives(&relevant).await?;
    if executives.is_empty() {
        anyhow::bail!("no executive information extracted");
    }

    db::save_executives(conn, &item.filing.cik, &item.filing.filing_date, &executives)?;
    db::set_processing_status(conn, &item.filing.cik, &item.filing.filing_date, "completed", None)?;
    Ok(executives.len())
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
