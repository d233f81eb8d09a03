//! Column layout of the grievance tab and conversion between rows and records.

use chrono::{DateTime, Utc};
use grievance_common::{Grievance, Location, Submitter};

use crate::sheet::Row;

pub const HEADER: [&str; 15] = [
    "Ticket ID",
    "Source",
    "Source Ref",
    "Title",
    "Description",
    "Category",
    "Location",
    "Submitter Name",
    "Submitter Email",
    "Submitter Phone",
    "Status",
    "Fingerprint",
    "Created At",
    "Updated At",
    "Version",
];

/// Column letter of the last column, for A1 ranges.
pub const LAST_COLUMN: &str = "O";

pub const COL_TICKET: usize = 0;
pub const COL_DESCRIPTION: usize = 4;
pub const COL_STATUS: usize = 10;
pub const COL_VERSION: usize = 14;

pub fn to_row(g: &Grievance) -> Row {
    let submitter = g.submitter.clone().unwrap_or_default();
    vec![
        g.ticket_id.clone(),
        g.source.to_string(),
        g.source_ref.clone(),
        g.title.clone(),
        g.description.clone(),
        g.category.clone(),
        g.location.as_ref().map(|l| l.to_string()).unwrap_or_default(),
        submitter.name.unwrap_or_default(),
        submitter.email.unwrap_or_default(),
        submitter.phone.unwrap_or_default(),
        g.status.to_string(),
        g.fingerprint.clone(),
        g.created_at.to_rfc3339(),
        g.updated_at.to_rfc3339(),
        g.version.to_string(),
    ]
}

fn cell(row: &[String], idx: usize) -> &str {
    row.get(idx).map(|c| c.trim()).unwrap_or("")
}

fn optional(row: &[String], idx: usize) -> Option<String> {
    Some(cell(row, idx)).filter(|c| !c.is_empty()).map(str::to_string)
}

fn timestamp(row: &[String], idx: usize, column: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(cell(row, idx))
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| format!("{column}: {e}"))
}

/// Decode a row. Rows edited by hand may lack trailing cells; a missing
/// version reads as 1.
pub fn from_row(row: &[String]) -> Result<Grievance, String> {
    let ticket_id = cell(row, COL_TICKET);
    if ticket_id.is_empty() {
        return Err("missing ticket id".to_string());
    }

    let submitter = Submitter {
        name: optional(row, 7),
        email: optional(row, 8),
        phone: optional(row, 9),
    };
    let version = match cell(row, COL_VERSION) {
        "" => 1,
        v => v.parse().map_err(|e| format!("Version {v:?}: {e}"))?,
    };

    Ok(Grievance {
        ticket_id: ticket_id.to_string(),
        source: cell(row, 1).parse().map_err(|e| format!("Source: {e}"))?,
        source_ref: cell(row, 2).to_string(),
        title: cell(row, 3).to_string(),
        description: cell(row, COL_DESCRIPTION).to_string(),
        category: cell(row, 5).to_string(),
        location: Location::parse(cell(row, 6)),
        submitter: (!submitter.is_empty()).then_some(submitter),
        status: cell(row, COL_STATUS)
            .parse()
            .map_err(|e| format!("Status: {e}"))?,
        fingerprint: cell(row, 11).to_string(),
        created_at: timestamp(row, 12, "Created At")?,
        updated_at: timestamp(row, 13, "Updated At")?,
        version,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use grievance_common::{GrievanceStatus, SourceKind};

    fn sample() -> Grievance {
        let at = DateTime::parse_from_rfc3339("2024-03-01T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        Grievance {
            ticket_id: "CS1A2B3C4D".into(),
            source: SourceKind::UserSubmission,
            source_ref: String::new(),
            title: "Pothole on Main St".into(),
            description: "Deep pothole outside the bakery".into(),
            category: "roads".into(),
            location: Some(Location::place("Main St, Delhi")),
            submitter: Some(Submitter {
                name: Some("Asha".into()),
                email: Some("asha@example.org".into()),
                phone: None,
            }),
            status: GrievanceStatus::Acknowledged,
            fingerprint: "abc123".into(),
            created_at: at,
            updated_at: at,
            version: 3,
        }
    }

    #[test]
    fn row_has_one_cell_per_column() {
        assert_eq!(to_row(&sample()).len(), HEADER.len());
    }

    #[test]
    fn decoding_preserves_every_field() {
        let g = sample();
        assert_eq!(from_row(&to_row(&g)).unwrap(), g);
    }

    #[test]
    fn truncated_rows_default_missing_cells() {
        let mut row = to_row(&sample());
        row.truncate(14);
        let g = from_row(&row).unwrap();
        assert_eq!(g.version, 1);
    }

    #[test]
    fn unknown_status_is_reported() {
        let mut row = to_row(&sample());
        row[COL_STATUS] = "pending".into();
        let err = from_row(&row).unwrap_err();
        assert!(err.starts_with("Status"), "{err}");
    }

    #[test]
    fn blank_ticket_is_rejected() {
        assert!(from_row(&[String::new()]).is_err());
    }
}
