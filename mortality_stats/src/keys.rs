//! Canonical forms for the join keys.
//!
//! The mortality table, the DIVIPOLA table and the boundary features do not agree on how
//! codes are written: the same department may come as the number `5`, the float `5.0`
//! or the text `"05"`. Everything that is compared across tables goes through here first.

use crate::config::*;

/// Width of a department code.
pub const DEPARTMENT_CODE_WIDTH: usize = 2;

/// Renders a raw cell as plain text, without a fractional part for integral numbers.
///
/// Returns None for missing or blank cells.
pub fn raw_to_text(raw: &RawValue) -> Option<String> {
    match raw {
        RawValue::Missing => None,
        RawValue::Int(i) => Some(i.to_string()),
        RawValue::Float(f) if !f.is_finite() => None,
        RawValue::Float(f) if f.fract() == 0.0 => Some(format!("{}", *f as i64)),
        RawValue::Float(f) => Some(f.to_string()),
        RawValue::Text(s) => {
            let t = s.trim();
            if t.is_empty() {
                None
            } else {
                Some(t.to_string())
            }
        }
    }
}

/// Pads `s` on the left with zeros up to `width` characters. A leading sign stays in front.
pub fn zfill(s: &str, width: usize) -> String {
    let len = s.chars().count();
    if len >= width {
        return s.to_string();
    }
    let padding = "0".repeat(width - len);
    match s.chars().next() {
        Some(c) if c == '+' || c == '-' => format!("{}{}{}", c, padding, &s[c.len_utf8()..]),
        _ => format!("{}{}", padding, s),
    }
}

/// Like `raw_to_text`, but integral numeric text is rendered as the integer: `"5.0"` and
/// `"05"` both become `"5"`. Other text is only trimmed.
fn integral_text(raw: &RawValue) -> Option<String> {
    let text = raw_to_text(raw)?;
    let canonical = match text.parse::<i64>() {
        Ok(i) => i.to_string(),
        Err(_) => match text.parse::<f64>() {
            Ok(f) if f.is_finite() && f.fract() == 0.0 => (f as i64).to_string(),
            _ => text,
        },
    };
    Some(canonical)
}

pub fn normalize_department_code(raw: &RawValue) -> Option<DepartmentCode> {
    integral_text(raw).map(|s| DepartmentCode(zfill(&s, DEPARTMENT_CODE_WIDTH)))
}

/// Numbers and numeric text both become the base 10 integer; other text is only trimmed.
pub fn normalize_link_code(raw: &RawValue) -> Option<LinkCode> {
    integral_text(raw).map(LinkCode)
}

/// Month of the year. Anything outside 1..=12 is treated as missing.
pub fn normalize_month(raw: &RawValue) -> Option<u8> {
    let text = raw_to_text(raw)?;
    let m = text.parse::<f64>().ok()?;
    if m.fract() == 0.0 && (1.0..=12.0).contains(&m) {
        Some(m as u8)
    } else {
        None
    }
}

pub fn normalize_age_group(raw: &RawValue) -> Option<AgeGroup> {
    integral_text(raw).map(AgeGroup)
}

/// Maps the coded `SEXO` column: 1 is male, 2 is female, anything else unspecified.
pub fn normalize_sex(raw: &RawValue) -> Sex {
    match integral_text(raw).as_deref() {
        Some("1") => Sex::Male,
        Some("2") => Sex::Female,
        _ => Sex::Unspecified,
    }
}

/// Free text fields (names, cause codes).
pub fn normalize_text(raw: &RawValue) -> Option<String> {
    raw_to_text(raw)
}
