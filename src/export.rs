use std::io::Write;

use anyhow::Result;
use rusqlite::Connection;
use serde::Serialize;
use tracing::{info, warn};

use crate::db;
use crate::schema::{Education, Executive};

/// One CSV line per executive, lists joined with "; " and up to three
/// degrees spread over fixed column groups.
#[derive(Debug, Default, Serialize)]
struct CsvRow {
    company_name: String,
    cik: String,
    filing_date: String,
    name: String,
    age: Option<u32>,
    current_role: Option<String>,
    past_roles: String,
    compensation_salary: Option<f64>,
    compensation_stock: Option<f64>,
    compensation_bonus: Option<f64>,
    compensation_other: Option<f64>,
    compensation_total: Option<f64>,
    compensation_year: Option<i32>,
    start_date: Option<String>,
    board_member: bool,
    committee_memberships: String,
    other_board_memberships: String,
    notable_achievements: Option<String>,
    education1_degree: Option<String>,
    education1_field: Option<String>,
    education1_university: Option<String>,
    education1_year: Option<i32>,
    education2_degree: Option<String>,
    education2_field: Option<String>,
    education2_university: Option<String>,
    education2_year: Option<i32>,
    education3_degree: Option<String>,
    education3_field: Option<String>,
    education3_university: Option<String>,
    education3_year: Option<i32>,
}

pub fn export_csv(conn: &Connection, output: &str) -> Result<usize> {
    let rows = db::fetch_executive_rows(conn)?;
    if rows.is_empty() {
        warn!("No executive data to export");
        return Ok(0);
    }

    let file = std::fs::File::create(output)?;
    let count = write_rows(file, &rows)?;
    info!("Wrote {} executives to {}", count, output);
    Ok(count)
}

fn write_rows<W: Write>(writer: W, rows: &[db::ExecutiveRow]) -> Result<usize> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    let mut count = 0;
    for row in rows {
        let exec: Executive = match serde_json::from_str(&row.data) {
            Ok(exec) => exec,
            Err(e) => {
                warn!("Skipping malformed record for {}: {}", row.cik, e);
                continue;
            }
        };
        csv_writer.serialize(flatten(row, &exec))?;
        count += 1;
    }
    csv_writer.flush()?;
    Ok(count)
}

fn flatten(row: &db::ExecutiveRow, exec: &Executive) -> CsvRow {
    let mut out = CsvRow {
        company_name: row.company_name.clone(),
        cik: row.cik.clone(),
        filing_date: row.filing_date.clone(),
        name: exec.name.clone(),
        age: exec.age,
        current_role: exec.current_role.clone(),
        past_roles: exec.past_roles.join("; "),
        compensation_salary: exec.compensation_salary,
        compensation_stock: exec.compensation_stock,
        compensation_bonus: exec.compensation_bonus,
        compensation_other: exec.compensation_other,
        compensation_total: exec.compensation_total,
        compensation_year: exec.compensation_year,
        start_date: exec.start_date.clone(),
        board_member: exec.board_member,
        committee_memberships: exec.committee_memberships.join("; "),
        other_board_memberships: exec.other_board_memberships.join("; "),
        notable_achievements: exec.notable_achievements.clone(),
        ..Default::default()
    };

    let mut degrees = exec.education.iter();
    if let Some(edu) = degrees.next() {
        (out.education1_degree, out.education1_field, out.education1_university, out.education1_year) = degree_columns(edu);
    }
    if let Some(edu) = degrees.next() {
        (out.education2_degree, out.education2_field, out.education2_university, out.education2_year) = degree_columns(edu);
    }
    if let Some(edu) = degrees.next() {
        (out.education3_degree, out.education3_field, out.education3_university, out.education3_year) = degree_columns(edu);
    }
    out
}

fn degree_columns(edu: &Education) -> (Option<String>, Option<String>, Option<String>, Option<i32>) {
    (
        Some(edu.degree.clone()),
        edu.field.clone(),
        edu.university.clone(),
        edu.year,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(data: &str) -> db::ExecutiveRow {
        db::ExecutiveRow {
            cik: "0000320193".to_string(),
            company_name: "Apple Inc.".to_string(),
            filing_date: "2024-01-10".to_string(),
            data: data.to_string(),
        }
    }

    fn render(rows: &[db::ExecutiveRow]) -> String {
        let mut buf = Vec::new();
        write_rows(&mut buf, rows).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn header_and_joined_lists() {
        let data = r#"{
            "name": "Jane Roe",
            "current_role": "CEO",
            "past_roles": ["COO", "SVP Operations"],
            "committee_memberships": ["Audit", "Compensation"]
        }"#;
        let out = render(&[row(data)]);
        let mut lines = out.lines();
        let header = lines.next().unwrap();
        assert!(header.starts_with("company_name,cik,filing_date,name"));
        assert!(header.contains("education3_year"));
        let record = lines.next().unwrap();
        assert!(record.contains("COO; SVP Operations"));
        assert!(record.contains("Audit; Compensation"));
    }

    #[test]
    fn education_fills_column_groups_in_order() {
        let data = r#"{
            "name": "Jane Roe",
            "education": [
                {"degree": "MBA", "university": "Stanford University", "year": 1998},
                {"degree": "BS", "field": "Physics"}
            ]
        }"#;
        let out = render(&[row(data)]);
        let record = out.lines().nth(1).unwrap();
        assert!(record.contains("MBA"));
        assert!(record.contains("Stanford University"));
        assert!(record.contains("1998"));
        assert!(record.contains("Physics"));
    }

    #[test]
    fn fourth_degree_is_dropped() {
        let data = r#"{
            "name": "Jane Roe",
            "education": [
                {"degree": "PhD"}, {"degree": "MS"}, {"degree": "BS"}, {"degree": "BA"}
            ]
        }"#;
        let out = render(&[row(data)]);
        let record = out.lines().nth(1).unwrap();
        assert!(record.contains("PhD"));
        assert!(!record.contains("BA"));
    }

    #[test]
    fn malformed_record_is_skipped() {
        let rows = vec![row("not json"), row(r#"{"name": "John Poe"}"#)];
        let mut buf = Vec::new();
        let count = write_rows(&mut buf, &rows).unwrap();
        assert_eq!(count, 1);
        assert!(String::from_utf8(buf).unwrap().contains("John Poe"));
    }
}
