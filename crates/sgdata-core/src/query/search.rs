use crate::domain::{require_field, FieldKind, Record};
use crate::SourceError;

pub const DEFAULT_MAX_RESULTS: usize = 10;

/// Case-insensitive substring match of `keyword` against any of `fields`,
/// in source order, capped at `max_results`.
pub fn search<'a, R: Record>(
    records: &'a [R],
    fields: &[&str],
    keyword: &str,
    max_results: usize,
) -> Result<Vec<&'a R>, SourceError> {
    let needle = keyword.trim().to_lowercase();
    if needle.is_empty() {
        return Err(SourceError::invalid_argument("search keyword cannot be empty"));
    }
    if fields.is_empty() {
        return Err(SourceError::invalid_argument("at least one search field is required"));
    }
    let max_results = super::require_limit("max_results", max_results)?;
    for field in fields {
        require_field::<R>(field, FieldKind::Text)?;
    }

    Ok(records
        .iter()
        .filter(|record| {
            fields.iter().any(|field| {
                record
                    .field(field)
                    .as_text()
                    .is_some_and(|text| text.to_lowercase().contains(&needle))
            })
        })
        .take(max_results)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CarparkInfo, RecordKey};
    use crate::SourceErrorKind;

    fn carpark(number: &str, address: &str) -> CarparkInfo {
        CarparkInfo {
            car_park_no: RecordKey::new(number).expect("valid key"),
            address: Some(address.to_owned()),
            x_coord: None,
            y_coord: None,
            car_park_type: None,
            type_of_parking_system: None,
            short_term_parking: None,
            free_parking: None,
            night_parking: None,
            car_park_decks: None,
            gantry_height: None,
            car_park_basement: None,
        }
    }

    #[test]
    fn matches_are_case_insensitive_and_ordered() {
        let records = vec![
            carpark("ACB", "BLK 270/271 ALBERT CENTRE"),
            carpark("BM29", "BLK 97A UPPER BOON KENG ROAD"),
            carpark("BE3", "BLK 100 BEDOK NORTH ALBERT"),
        ];

        let found = search(&records, &["address"], "albert", 10).expect("valid query");
        let numbers: Vec<&str> = found.iter().map(|record| record.car_park_no.as_str()).collect();
        assert_eq!(numbers, vec!["ACB", "BE3"]);

        let capped = search(&records, &["address"], "blk", 2).expect("valid query");
        assert_eq!(capped.len(), 2);
    }

    #[test]
    fn empty_keyword_and_numeric_fields_are_rejected() {
        let records = vec![carpark("ACB", "BLK 270")];

        let empty = search(&records, &["address"], "  ", 10).expect_err("empty keyword");
        assert_eq!(empty.kind(), SourceErrorKind::InvalidArgument);

        let numeric = search(&records, &["gantry_height"], "2", 10).expect_err("numeric field");
        assert_eq!(numeric.kind(), SourceErrorKind::InvalidArgument);

        let unknown = search(&records, &["colour"], "red", 10).expect_err("unknown field");
        assert!(unknown.message().contains("unknown field"));
    }
}
