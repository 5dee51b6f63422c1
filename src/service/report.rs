//! "Membership Type Summary": fees of paid-up clients grouped by membership type.

use crate::core::RecordId;
use crate::domain::{Client, MembershipType};
use crate::spreadsheet::{Cell, NumberFormat, Worksheet};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

pub const REPORT_TITLE: &str = "Membership Type Summary";
/// Download name without extension; `.xlsx` or `.csv` is appended.
pub const REPORT_FILE_STEM: &str = "MembershipTypeReport";

const HEADINGS: [&str; 6] = [
    "Membership Type",
    "Number Of Clients",
    "Average Fee",
    "Highest Fee",
    "Lowest Fee",
    "Total Fees",
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MembershipTypeSummary {
    pub membership_type: String,
    pub number_of_clients: usize,
    pub average_fee: f64,
    pub highest_fee: f64,
    pub lowest_fee: f64,
    pub total_fees: f64,
}

/// Groups clients with `fee_paid` by the name of their membership type,
/// ordered by that name.
pub fn summarize(clients: &[Client], types: &[MembershipType]) -> Vec<MembershipTypeSummary> {
    let names: HashMap<RecordId, &str> = types
        .iter()
        .map(|t| (t.id, t.type_name.as_str()))
        .collect();

    let mut groups: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
    for client in clients.iter().filter(|c| c.fee_paid) {
        let name = names.get(&client.membership_type_id).copied().unwrap_or("");
        groups.entry(name).or_default().push(client.membership_fee);
    }

    groups
        .into_iter()
        .map(|(name, fees)| {
            let total: f64 = fees.iter().sum();
            MembershipTypeSummary {
                membership_type: name.to_string(),
                number_of_clients: fees.len(),
                average_fee: total / fees.len() as f64,
                highest_fee: fees.iter().copied().fold(f64::MIN, f64::max),
                lowest_fee: fees.iter().copied().fold(f64::MAX, f64::min),
                total_fees: total,
            }
        })
        .collect()
}

/// Title in A1, creation stamp in F2, headings on row 3, one row per type,
/// then a totals row.
pub fn build_worksheet(rows: &[MembershipTypeSummary], created: DateTime<Utc>) -> Worksheet {
    let mut sheet = Worksheet::new("MembershipTypes");
    sheet.set(1, 1, Cell::text(REPORT_TITLE));
    sheet.set_bold_row(1);
    sheet.set(
        2,
        6,
        Cell::text(format!(
            "Created: {} on {} UTC",
            created.format("%-I:%M %p"),
            created.format("%Y-%m-%d")
        )),
    );

    for (index, heading) in HEADINGS.iter().enumerate() {
        sheet.set(3, index + 1, Cell::text(*heading));
    }
    sheet.set_bold_row(3);

    let mut row = 4;
    for summary in rows {
        sheet.set(row, 1, Cell::text(summary.membership_type.as_str()));
        sheet.set(row, 2, Cell::number(summary.number_of_clients as f64, NumberFormat::Grouped));
        sheet.set(row, 3, Cell::number(summary.average_fee, NumberFormat::Decimal));
        sheet.set(row, 4, Cell::number(summary.highest_fee, NumberFormat::Decimal));
        sheet.set(row, 5, Cell::number(summary.lowest_fee, NumberFormat::Decimal));
        sheet.set(row, 6, Cell::number(summary.total_fees, NumberFormat::Decimal));
        row += 1;
    }

    let clients: usize = rows.iter().map(|r| r.number_of_clients).sum();
    let fees: f64 = rows.iter().map(|r| r.total_fees).sum();
    sheet.set(row, 1, Cell::text("Totals:"));
    sheet.set(row, 2, Cell::number(clients as f64, NumberFormat::Grouped));
    sheet.set(row, 6, Cell::number(fees, NumberFormat::Currency));
    sheet.set_bold_row(row);
    sheet
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::VersionToken;
    use chrono::{NaiveDate, TimeZone};

    fn membership(id: RecordId, name: &str) -> MembershipType {
        MembershipType {
            id,
            row_version: VersionToken::from_raw(id as u64),
            type_name: name.to_string(),
            standard_fee: 0.0,
            audit: None,
        }
    }

    fn client(id: RecordId, type_id: RecordId, fee: f64, paid: bool) -> Client {
        let date = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        Client {
            id,
            row_version: VersionToken::from_raw(100 + id as u64),
            membership_number: 10000 + id,
            first_name: "A".to_string(),
            middle_name: None,
            last_name: "B".to_string(),
            phone: "9055550100".to_string(),
            email: format!("c{id}@gym.com"),
            dob: date,
            postal_code: "L2S 3A1".to_string(),
            health_condition: "None".to_string(),
            notes: None,
            membership_start_date: date,
            membership_end_date: date,
            membership_fee: fee,
            fee_paid: paid,
            membership_type_id: type_id,
            audit: None,
        }
    }

    #[test]
    fn only_paid_clients_are_grouped() {
        let types = vec![membership(1, "Basic"), membership(2, "Premium")];
        let clients = vec![
            client(1, 1, 100.0, true),
            client(2, 1, 300.0, true),
            client(3, 2, 900.0, false),
            client(4, 2, 1200.0, true),
        ];
        let rows = summarize(&clients, &types);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].membership_type, "Basic");
        assert_eq!(rows[0].number_of_clients, 2);
        assert_eq!(rows[0].average_fee, 200.0);
        assert_eq!(rows[0].highest_fee, 300.0);
        assert_eq!(rows[0].lowest_fee, 100.0);
        assert_eq!(rows[1].total_fees, 1200.0);
    }

    #[test]
    fn worksheet_layout() {
        let rows = vec![MembershipTypeSummary {
            membership_type: "Premium".to_string(),
            number_of_clients: 2,
            average_fee: 1250.0,
            highest_fee: 1500.0,
            lowest_fee: 1000.0,
            total_fees: 2500.0,
        }];
        let created = Utc.with_ymd_and_hms(2025, 1, 6, 17, 5, 0).unwrap();
        let sheet = build_worksheet(&rows, created);

        assert_eq!(sheet.text(1, 1), REPORT_TITLE);
        assert_eq!(sheet.text(2, 6), "Created: 5:05 PM on 2025-01-06 UTC");
        assert_eq!(sheet.text(3, 2), "Number Of Clients");
        assert_eq!(sheet.text(4, 3), "1,250.00");
        assert_eq!(sheet.text(5, 1), "Totals:");
        assert_eq!(sheet.text(5, 2), "2");
        assert_eq!(sheet.text(5, 6), "$2,500.00");
        assert_eq!(sheet.row_count(), 5);
        assert!(sheet.is_bold_row(3) && sheet.is_bold_row(5));
        assert!(!sheet.is_bold_row(4));
    }
}
