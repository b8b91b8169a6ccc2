//! Phone number normalization
//!
//! Numbers reach the pipeline in many shapes (`+39 051 234-5678`,
//! `0039051...`, `(051) 2345678`). Both the dial command and the directory
//! match on the national digit string.

/// Remove spaces and punctuation, keeping digits and a leading `+`
pub fn strip_punctuation(raw: &str) -> String {
    let trimmed = raw.trim();
    let mut out = String::with_capacity(trimmed.len());

    for (i, c) in trimmed.chars().enumerate() {
        if c.is_ascii_digit() || (c == '+' && i == 0) {
            out.push(c);
        }
    }

    out
}

/// Normalize to the national form: punctuation removed and the `+CC` or
/// `00CC` prefix stripped when it matches `country_code`. Other international
/// numbers keep their prefix, written as `00`.
pub fn to_national(raw: &str, country_code: &str) -> String {
    let digits = strip_punctuation(raw);

    if !country_code.is_empty() {
        let plus = format!("+{}", country_code);
        let zeros = format!("00{}", country_code);

        if let Some(rest) = digits.strip_prefix(&plus) {
            return rest.to_string();
        }
        if let Some(rest) = digits.strip_prefix(&zeros) {
            return rest.to_string();
        }
    }

    match digits.strip_prefix('+') {
        Some(rest) => format!("00{}", rest),
        None => digits,
    }
}
