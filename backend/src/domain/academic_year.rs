/// Normalises an academic-year label. Accepts a four-digit year (`2024`) or
/// a span of consecutive years (`2024-2025`).
pub fn normalize_year_label(raw: &str) -> Result<String, String> {
    let label = raw.trim();
    let valid = match label.split_once('-') {
        None => parse_year(label).is_some(),
        Some((first, second)) => match (parse_year(first), parse_year(second)) {
            (Some(first), Some(second)) => second == first + 1,
            _ => false,
        },
    };

    if valid {
        Ok(label.to_string())
    } else {
        Err(format!(
            "invalid academic year '{label}': expected YYYY or YYYY-YYYY with consecutive years"
        ))
    }
}

fn parse_year(value: &str) -> Option<u32> {
    if value.len() == 4 && value.bytes().all(|b| b.is_ascii_digit()) {
        value.parse().ok()
    } else {
        None
    }
}
