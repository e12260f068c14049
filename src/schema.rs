use serde::{Deserialize, Serialize};

/// One degree held by an executive. Every field tolerates being absent;
/// the extraction model omits what the filing does not state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Education {
    #[serde(default)]
    pub degree: String,
    #[serde(default)]
    pub field: Option<String>,
    #[serde(default)]
    pub university: Option<String>,
    #[serde(default)]
    pub year: Option<i32>,
}

/// Structured record for a single executive or director as extracted from a
/// proxy statement. Stored as one JSON blob per person in the ledger.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Executive {
    pub name: String,
    #[serde(default)]
    pub current_role: Option<String>,
    #[serde(default)]
    pub age: Option<u32>,
    #[serde(default)]
    pub compensation_salary: Option<f64>,
    #[serde(default)]
    pub compensation_stock: Option<f64>,
    #[serde(default)]
    pub compensation_bonus: Option<f64>,
    #[serde(default)]
    pub compensation_other: Option<f64>,
    #[serde(default)]
    pub compensation_total: Option<f64>,
    #[serde(default)]
    pub compensation_year: Option<i32>,
    #[serde(default)]
    pub education: Vec<Education>,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub past_roles: Vec<String>,
    #[serde(default)]
    pub board_member: bool,
    #[serde(default)]
    pub committee_memberships: Vec<String>,
    #[serde(default)]
    pub other_board_memberships: Vec<String>,
    #[serde(default)]
    pub notable_achievements: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_sparse_record() {
        let json = r#"{"name": "Jane Roe"}"#;
        let exec: Executive = serde_json::from_str(json).unwrap();
        assert_eq!(exec.name, "Jane Roe");
        assert!(exec.current_role.is_none());
        assert!(exec.education.is_empty());
        assert!(!exec.board_member);
    }

    #[test]
    fn deserializes_full_record() {
        let json = r#"{
            "name": "Jane Roe",
            "current_role": "Chief Executive Officer",
            "age": 54,
            "compensation_salary": 950000.0,
            "compensation_total": 3450000.0,
            "compensation_year": 2023,
            "education": [
                {"degree": "MBA", "university": "Stanford University", "year": 1998},
                {"degree": "BS", "field": "Electrical Engineering"}
            ],
            "board_member": true,
            "committee_memberships": ["Audit"]
        }"#;
        let exec: Executive = serde_json::from_str(json).unwrap();
        assert_eq!(exec.age, Some(54));
        assert_eq!(exec.education.len(), 2);
        assert_eq!(exec.education[0].year, Some(1998));
        assert_eq!(exec.education[1].field.as_deref(), Some("Electrical Engineering"));
        assert!(exec.board_member);
    }

    #[test]
    fn education_without_degree_still_deserializes() {
        let json = r#"{
            "name": "Jane Roe",
            "education": [{"university": "Stanford University", "year": 1998}]
        }"#;
        let exec: Executive = serde_json::from_str(json).unwrap();
        assert_eq!(exec.education.len(), 1);
        assert!(exec.education[0].degree.is_empty());
        assert_eq!(exec.education[0].year, Some(1998));
    }

    #[test]
    fn roundtrips_through_json() {
        let exec = Executive {
            name: "John Poe".to_string(),
            current_role: Some("CFO".to_string()),
            compensation_total: Some(1_900_000.0),
            past_roles: vec!["VP Finance".to_string()],
            ..Default::default()
        };
        let json = serde_json::to_string(&exec).unwrap();
        let back: Executive = serde_json::from_str(&json).unwrap();
        assert_eq!(back, exec);
    }
}
