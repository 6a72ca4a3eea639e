use chrono::NaiveDate;

/// Date formats accepted for query parameters, tried in order.
const FORMATS: &[&str] = &["%Y-%m-%d", "%Y%m%d", "%Y/%m/%d", "%d.%m.%Y"];

/// Parses a calendar date from any of the accepted query parameter formats.
pub fn parse_date(input: &str) -> Option<NaiveDate> {
    let input = input.trim();
    FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(input, format).ok())
}
