use std::collections::HashSet;

use anyhow::Result;
use rusqlite::Connection;

use crate::schema::Executive;

const DB_PATH: &str = "data/filings.db";

pub fn connect() -> Result<Connection> {
    std::fs::create_dir_all("data")?;
    let conn = Connection::open(DB_PATH)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS companies (
            cik          TEXT PRIMARY KEY,
            name         TEXT NOT NULL,
            last_scraped TEXT
        );

        CREATE TABLE IF NOT EXISTS filings (
            cik          TEXT NOT NULL REFERENCES companies(cik),
            filing_date  TEXT NOT NULL,
            url          TEXT,
            file_path    TEXT,
            status       TEXT NOT NULL CHECK(status IN ('completed','invalid','error')),
            error        TEXT,
            last_updated TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (cik, filing_date)
        );
        CREATE INDEX IF NOT EXISTS idx_filings_status ON filings(status);

        CREATE TABLE IF NOT EXISTS processing_status (
            cik          TEXT NOT NULL REFERENCES companies(cik),
            filing_date  TEXT NOT NULL,
            status       TEXT NOT NULL CHECK(status IN ('completed','failed')),
            error        TEXT,
            last_updated TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (cik, filing_date)
        );

        CREATE TABLE IF NOT EXISTS executive_data (
            cik          TEXT NOT NULL REFERENCES companies(cik),
            filing_date  TEXT NOT NULL,
            exec_name    TEXT NOT NULL,
            data         TEXT NOT NULL,
            last_updated TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (cik, filing_date, exec_name)
        );
        CREATE INDEX IF NOT EXISTS idx_exec_cik ON executive_data(cik);
        ",
    )?;
    Ok(())
}

// ── Companies ──

pub fn upsert_companies(conn: &Connection, companies: &[(String, String)]) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;
    let mut count = 0;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO companies (cik, name) VALUES (?1, ?2)
             ON CONFLICT(cik) DO UPDATE SET name = excluded.name",
        )?;
        for (cik, name) in companies {
            count += stmt.execute(rusqlite::params![cik, name])?;
        }
    }
    tx.commit()?;
    Ok(count)
}

pub fn fetch_companies(conn: &Connection, limit: Option<usize>) -> Result<Vec<(String, String)>> {
    let sql = format!(
        "SELECT cik, name FROM companies ORDER BY cik{}",
        match limit {
            Some(n) => format!(" LIMIT {}", n),
            None => String::new(),
        }
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn mark_company_scraped(conn: &Connection, cik: &str) -> Result<()> {
    conn.execute(
        "UPDATE companies SET last_scraped = datetime('now') WHERE cik = ?1",
        [cik],
    )?;
    Ok(())
}

// ── Filings ──

/// (cik, filing_date) pairs already stored successfully, for skip-on-rerun.
pub fn fetch_completed_filings(conn: &Connection) -> Result<HashSet<(String, String)>> {
    let mut stmt =
        conn.prepare("SELECT cik, filing_date FROM filings WHERE status = 'completed'")?;
    let rows = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<Result<HashSet<_>, _>>()?;
    Ok(rows)
}

pub fn record_filing(
    conn: &Connection,
    cik: &str,
    filing_date: &str,
    url: &str,
    file_path: Option<&str>,
    status: &str,
    error: Option<&str>,
) -> Result<()> {
    conn.execute(
        "INSERT INTO filings (cik, filing_date, url, file_path, status, error, last_updated)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, datetime('now'))
         ON CONFLICT(cik, filing_date) DO UPDATE SET
             url = excluded.url,
             file_path = excluded.file_path,
             status = excluded.status,
             error = excluded.error,
             last_updated = excluded.last_updated",
        rusqlite::params![cik, filing_date, url, file_path, status, error],
    )?;
    Ok(())
}

// ── Processing ──

pub struct PendingFiling {
    pub cik: String,
    pub company_name: String,
    pub filing_date: String,
    pub file_path: String,
}

/// Latest completed filing per company that has not been processed yet.
/// A failed processing attempt stays eligible for retry.
pub fn fetch_unprocessed(conn: &Connection, limit: Option<usize>) -> Result<Vec<PendingFiling>> {
    let sql = format!(
        "WITH latest AS (
             SELECT f.cik, f.filing_date, f.file_path,
                    ROW_NUMBER() OVER (PARTITION BY f.cik ORDER BY f.filing_date DESC) AS rn
             FROM filings f
             WHERE f.status = 'completed' AND f.file_path IS NOT NULL
         )
         SELECT l.cik, c.name, l.filing_date, l.file_path
         FROM latest l
         JOIN companies c ON c.cik = l.cik
         LEFT JOIN processing_status p
             ON p.cik = l.cik AND p.filing_date = l.filing_date AND p.status = 'completed'
         WHERE l.rn = 1 AND p.cik IS NULL
         ORDER BY l.cik{}",
        match limit {
            Some(n) => format!(" LIMIT {}", n),
            None => String::new(),
        }
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], |row| {
            Ok(PendingFiling {
                cik: row.get(0)?,
                company_name: row.get(1)?,
                filing_date: row.get(2)?,
                file_path: row.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn set_processing_status(
    conn: &Connection,
    cik: &str,
    filing_date: &str,
    status: &str,
    error: Option<&str>,
) -> Result<()> {
    conn.execute(
        "INSERT INTO processing_status (cik, filing_date, status, error, last_updated)
         VALUES (?1, ?2, ?3, ?4, datetime('now'))
         ON CONFLICT(cik, filing_date) DO UPDATE SET
             status = excluded.status,
             error = excluded.error,
             last_updated = excluded.last_updated",
        rusqlite::params![cik, filing_date, status, error],
    )?;
    Ok(())
}

// ── Extracted data ──

pub fn save_executives(
    conn: &Connection,
    cik: &str,
    filing_date: &str,
    executives: &[Executive],
) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    {
        let mut stmt = tx.prepare(
            "INSERT OR REPLACE INTO executive_data
             (cik, filing_date, exec_name, data, last_updated)
             VALUES (?1, ?2, ?3, ?4, datetime('now'))",
        )?;
        for exec in executives {
            let data = serde_json::to_string(exec)?;
            stmt.execute(rusqlite::params![cik, filing_date, exec.name, data])?;
        }
    }
    tx.commit()?;
    Ok(())
}

pub struct ExecutiveRow {
    pub cik: String,
    pub company_name: String,
    pub filing_date: String,
    pub data: String,
}

pub fn fetch_executive_rows(conn: &Connection) -> Result<Vec<ExecutiveRow>> {
    let mut stmt = conn.prepare(
        "SELECT e.cik, c.name, e.filing_date, e.data
         FROM executive_data e
         JOIN companies c ON c.cik = e.cik
         ORDER BY c.name, e.filing_date DESC, e.exec_name",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok(ExecutiveRow {
                cik: row.get(0)?,
                company_name: row.get(1)?,
                filing_date: row.get(2)?,
                data: row.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ── Stats ──

pub struct Stats {
    pub companies: usize,
    pub filings: usize,
    pub completed: usize,
    pub invalid: usize,
    pub processed: usize,
    pub executives: usize,
}

pub fn get_stats(conn: &Connection) -> Result<Stats> {
    let companies: usize = conn.query_row("SELECT COUNT(*) FROM companies", [], |r| r.get(0))?;
    let filings: usize = conn.query_row("SELECT COUNT(*) FROM filings", [], |r| r.get(0))?;
    let completed: usize = conn.query_row(
        "SELECT COUNT(*) FROM filings WHERE status = 'completed'",
        [],
        |r| r.get(0),
    )?;
    let invalid: usize = conn.query_row(
        "SELECT COUNT(*) FROM filings WHERE status = 'invalid'",
        [],
        |r| r.get(0),
    )?;
    let processed: usize = conn.query_row(
        "SELECT COUNT(*) FROM processing_status WHERE status = 'completed'",
        [],
        |r| r.get(0),
    )?;
    let executives: usize =
        conn.query_row("SELECT COUNT(*) FROM executive_data", [], |r| r.get(0))?;
    Ok(Stats {
        companies,
        filings,
        completed,
        invalid,
        processed,
        executives,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        conn
    }

    fn seed_company(conn: &Connection, cik: &str, name: &str) {
        upsert_companies(conn, &[(cik.to_string(), name.to_string())]).unwrap();
    }

    #[test]
    fn upsert_companies_is_idempotent() {
        let conn = test_conn();
        seed_company(&conn, "0000320193", "Apple Inc.");
        seed_company(&conn, "0000320193", "Apple Inc.");
        let companies = fetch_companies(&conn, None).unwrap();
        assert_eq!(companies.len(), 1);
        assert_eq!(companies[0].1, "Apple Inc.");
    }

    #[test]
    fn completed_filings_feed_skip_set() {
        let conn = test_conn();
        seed_company(&conn, "0000320193", "Apple Inc.");
        record_filing(
            &conn,
            "0000320193",
            "2024-01-10",
            "https://example.test/def14a.htm",
            Some("data/filings/0000320193_2024-01-10_def14a.htm"),
            "completed",
            None,
        )
        .unwrap();
        record_filing(
            &conn,
            "0000320193",
            "2023-01-12",
            "https://example.test/old.htm",
            None,
            "invalid",
            None,
        )
        .unwrap();

        let done = fetch_completed_filings(&conn).unwrap();
        assert!(done.contains(&("0000320193".to_string(), "2024-01-10".to_string())));
        assert!(!done.contains(&("0000320193".to_string(), "2023-01-12".to_string())));
    }

    #[test]
    fn unprocessed_selects_latest_completed_filing() {
        let conn = test_conn();
        seed_company(&conn, "0000320193", "Apple Inc.");
        for date in ["2022-01-07", "2023-01-12", "2024-01-10"] {
            record_filing(
                &conn,
                "0000320193",
                date,
                "https://example.test/def14a.htm",
                Some("data/filings/f.htm"),
                "completed",
                None,
            )
            .unwrap();
        }

        let pending = fetch_unprocessed(&conn, None).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].filing_date, "2024-01-10");
        assert_eq!(pending[0].company_name, "Apple Inc.");
    }

    #[test]
    fn processed_filings_drop_out_but_failed_retry() {
        let conn = test_conn();
        seed_company(&conn, "0000320193", "Apple Inc.");
        record_filing(
            &conn,
            "0000320193",
            "2024-01-10",
            "https://example.test/def14a.htm",
            Some("data/filings/f.htm"),
            "completed",
            None,
        )
        .unwrap();

        set_processing_status(&conn, "0000320193", "2024-01-10", "failed", Some("no sections"))
            .unwrap();
        assert_eq!(fetch_unprocessed(&conn, None).unwrap().len(), 1);

        set_processing_status(&conn, "0000320193", "2024-01-10", "completed", None).unwrap();
        assert!(fetch_unprocessed(&conn, None).unwrap().is_empty());
    }

    #[test]
    fn executives_roundtrip_as_json() {
        let conn = test_conn();
        seed_company(&conn, "0000320193", "Apple Inc.");
        let execs = vec![
            Executive {
                name: "Jane Roe".to_string(),
                current_role: Some("CEO".to_string()),
                compensation_total: Some(3_450_000.0),
                ..Default::default()
            },
            Executive {
                name: "John Poe".to_string(),
                ..Default::default()
            },
        ];
        save_executives(&conn, "0000320193", "2024-01-10", &execs).unwrap();

        let rows = fetch_executive_rows(&conn).unwrap();
        assert_eq!(rows.len(), 2);
        let first: Executive = serde_json::from_str(&rows[0].data).unwrap();
        assert_eq!(first.name, "Jane Roe");
        assert_eq!(first.compensation_total, Some(3_450_000.0));
    }

    #[test]
    fn stats_count_per_table() {
        let conn = test_conn();
        seed_company(&conn, "0000320193", "Apple Inc.");
        record_filing(
            &conn,
            "0000320193",
            "2024-01-10",
            "https://example.test/def14a.htm",
            None,
            "invalid",
            None,
        )
        .unwrap();

        let stats = get_stats(&conn).unwrap();
        assert_eq!(stats.companies, 1);
        assert_eq!(stats.filings, 1);
        assert_eq!(stats.completed, 0);
        assert_eq!(stats.invalid, 1);
        assert_eq!(stats.processed, 0);
        assert_eq!(stats.executives, 0);
    }
}
