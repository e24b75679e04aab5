//! Attribute normalization for site descriptions.
//!
//! Site descriptions embed an HTML-like table of label/value pairs with a
//! variable schema. This module turns one [`SiteRecord`] into a flat
//! [`NormalizedSite`]: labels run through a deterministic key cleaner, and
//! values are either kept as trimmed text (descriptive mode) or classified
//! into a tagged [`AttrValue`] (complete mode).

use quick_xml::events::Event;
use quick_xml::Reader;
use tracing::debug;

use crate::model::{AttrValue, NormalizedSite, SiteRecord};

/// Output shape selector for [`normalize`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NormalizeMode {
    /// Every value stays text, including the `latitude`/`longitude` fields
    /// appended from the geometry.
    Descriptive,
    /// Values are classified into text/number/boolean; the geometry stays a
    /// single point on the record.
    Complete,
}

/// Derives a clean attribute key from a raw table label.
///
/// Lowercase, `%` becomes `pct`, parentheses are stripped, `-` and `/`
/// become underscores, whitespace runs become a single underscore. The
/// transform is pure and idempotent: cleaning an already-clean key is a
/// no-op.
///
/// `"% Female (HH)"` becomes `"pct_female_hh"`.
pub fn clean_key(raw: &str) -> String {
    let lowered = raw
        .trim()
        .to_lowercase()
        .replace('%', "pct")
        .replace(['(', ')'], "")
        .replace(['-', '/'], "_");
    lowered.split_whitespace().collect::<Vec<_>>().join("_")
}

/// Classifies a raw table value into a tagged [`AttrValue`].
///
/// Exact case-insensitive `yes`/`no` become booleans. A value is numeric
/// only when stripping every `.` leaves pure ASCII digits, which admits
/// non-negative decimals and plain integers but rejects signs, exponents
/// and thousands separators (`"1,234"` stays text). Anything that fails to
/// parse falls back to text; classification never errors.
pub fn classify_value(raw: &str) -> AttrValue {
    let trimmed = raw.trim();
    if trimmed.eq_ignore_ascii_case("yes") {
        return AttrValue::Bool(true);
    }
    if trimmed.eq_ignore_ascii_case("no") {
        return AttrValue::Bool(false);
    }

    let digits_only = trimmed
        .chars()
        .filter(|c| *c != '.')
        .collect::<String>();
    if !digits_only.is_empty() && digits_only.chars().all(|c| c.is_ascii_digit()) {
        if let Ok(n) = trimmed.parse::<f64>() {
            return AttrValue::Number(n);
        }
        // e.g. "1.2.3": digit test passed but the parse did not. Keep text.
    }
    AttrValue::Text(trimmed.to_string())
}

/// Extracts (label, value) rows from an embedded HTML-like table.
///
/// Scans the markup leniently (descriptions are rarely well-formed XML) and
/// collects the text content of each `<td>` cell per `<tr>` row. Only rows
/// with exactly two cells become pairs; every other cell count is skipped
/// without error.
pub fn parse_description_rows(markup: &str) -> Vec<(String, String)> {
    let mut reader = Reader::from_str(markup);
    let config = reader.config_mut();
    config.check_end_names = false;
    config.trim_text(true);

    let mut rows = Vec::new();
    let mut cells: Vec<String> = Vec::new();
    let mut in_row = false;
    let mut in_cell = false;
    let mut cell_text = String::new();

    let mut push_row = |cells: &mut Vec<String>| {
        if cells.len() == 2 {
            rows.push((cells[0].clone(), cells[1].clone()));
        } else if !cells.is_empty() {
            debug!("skipping table row with {} cells", cells.len());
        }
        cells.clear();
    };

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"tr" => {
                    push_row(&mut cells);
                    in_row = true;
                }
                b"td" if in_row => {
                    in_cell = true;
                    cell_text.clear();
                }
                _ => {}
            },
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"tr" => {
                    push_row(&mut cells);
                    in_row = false;
                }
                b"td" if in_cell => {
                    in_cell = false;
                    cells.push(cell_text.trim().to_string());
                }
                _ => {}
            },
            Ok(Event::Text(t)) if in_cell => {
                if let Ok(text) = t.unescape() {
                    if !cell_text.is_empty() && !text.trim().is_empty() {
                        cell_text.push(' ');
                    }
                    cell_text.push_str(text.trim());
                }
            }
            Ok(Event::CData(c)) if in_cell => {
                let text = String::from_utf8_lossy(&c.into_inner()).into_owned();
                if !cell_text.is_empty() && !text.trim().is_empty() {
                    cell_text.push(' ');
                }
                cell_text.push_str(text.trim());
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            // Descriptions are free-text markup; a malformed tail just ends
            // the scan with whatever rows were complete.
            Err(e) => {
                debug!("stopping description scan on markup error: {e}");
                break;
            }
        }
    }
    push_row(&mut cells);
    rows
}

/// Normalizes one parsed site into a flat attribute record.
///
/// Deterministic: field order follows the table's row order, and the same
/// input always yields the same output. Per-row problems (wrong cell count,
/// unparseable values) are resolved locally and never abort normalization.
pub fn normalize(site: &SiteRecord, mode: NormalizeMode) -> NormalizedSite {
    let mut fields: Vec<(String, AttrValue)> = parse_description_rows(&site.description)
        .into_iter()
        .map(|(label, value)| {
            let key = clean_key(&label);
            let value = match mode {
                NormalizeMode::Descriptive => AttrValue::Text(value.trim().to_string()),
                NormalizeMode::Complete => classify_value(&value),
            };
            (key, value)
        })
        .collect();

    if mode == NormalizeMode::Descriptive {
        fields.push((
            "latitude".to_string(),
            AttrValue::Text(site.point.y().to_string()),
        ));
        fields.push((
            "longitude".to_string(),
            AttrValue::Text(site.point.x().to_string()),
        ));
    }

    NormalizedSite {
        name: site.name.clone(),
        point: site.point,
        fields,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_types::Point;

    #[test]
    fn clean_key_examples() {
        assert_eq!(clean_key("% Female (HH)"), "pct_female_hh");
        assert_eq!(clean_key("Total Individuals"), "total_individuals");
        assert_eq!(clean_key("Water Source - Borehole"), "water_source___borehole");
        assert_eq!(clean_key("Male/Female"), "male_female");
        assert_eq!(clean_key("  Shelter   Type "), "shelter_type");
    }

    #[test]
    fn clean_key_is_idempotent() {
        for label in [
            "% Female (HH)",
            "Total Individuals",
            "Water/Sanitation - Score (2020)",
            "already_clean_key",
        ] {
            let once = clean_key(label);
            assert_eq!(clean_key(&once), once, "not idempotent for {label:?}");
        }
    }

    #[test]
    fn classify_numbers_and_booleans() {
        assert_eq!(classify_value("87.5"), AttrValue::Number(87.5));
        assert_eq!(classify_value("1234"), AttrValue::Number(1234.0));
        assert_eq!(classify_value("Yes"), AttrValue::Bool(true));
        assert_eq!(classify_value("no"), AttrValue::Bool(false));
        assert_eq!(
            classify_value("Displacement Camp"),
            AttrValue::Text("Displacement Camp".to_string())
        );
    }

    #[test]
    fn comma_separated_number_stays_text() {
        // The coercion boundary: a comma is not `.`-strippable to digits.
        assert_eq!(
            classify_value("1,234"),
            AttrValue::Text("1,234".to_string())
        );
    }

    #[test]
    fn malformed_decimals_fall_back_to_text() {
        assert_eq!(classify_value("1.2.3"), AttrValue::Text("1.2.3".to_string()));
        assert_eq!(classify_value("-5"), AttrValue::Text("-5".to_string()));
        assert_eq!(classify_value(""), AttrValue::Text(String::new()));
    }

    #[test]
    fn parses_two_cell_rows_and_skips_others() {
        let markup = "<table>\
            <tr><td>Site Type</td><td>Displacement Camp</td></tr>\
            <tr><td>only one cell</td></tr>\
            <tr><td>a</td><td>b</td><td>c</td></tr>\
            <tr><td>Total Individuals</td><td>1,234</td></tr>\
            </table>";
        let rows = parse_description_rows(markup);
        assert_eq!(
            rows,
            vec![
                ("Site Type".to_string(), "Displacement Camp".to_string()),
                ("Total Individuals".to_string(), "1,234".to_string()),
            ]
        );
    }

    #[test]
    fn cell_text_survives_nested_markup() {
        let markup = "<table><tr><td><b>% Female</b> (HH)</td><td><i>87.5</i></td></tr></table>";
        let rows = parse_description_rows(markup);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].0, "% Female (HH)");
        assert_eq!(rows[0].1, "87.5");
    }

    fn site(description: &str) -> SiteRecord {
        SiteRecord {
            name: "Camp A".to_string(),
            description: description.to_string(),
            point: Point::new(13.15, 11.74),
        }
    }

    #[test]
    fn descriptive_mode_keeps_text_and_splits_coordinates() {
        let s = site("<table><tr><td>Total Individuals</td><td>1234</td></tr></table>");
        let n = normalize(&s, NormalizeMode::Descriptive);
        assert_eq!(n.name, "Camp A");
        assert_eq!(
            n.fields,
            vec![
                (
                    "total_individuals".to_string(),
                    AttrValue::Text("1234".to_string())
                ),
                // Everything in descriptive output is a string, the
                // coordinate fields included.
                ("latitude".to_string(), AttrValue::Text("11.74".to_string())),
                ("longitude".to_string(), AttrValue::Text("13.15".to_string())),
            ]
        );
    }

    #[test]
    fn complete_mode_classifies_values() {
        let s = site(
            "<table>\
             <tr><td>% Female (HH)</td><td>87.5</td></tr>\
             <tr><td>Open</td><td>Yes</td></tr>\
             <tr><td>Site Type</td><td>Displacement Camp</td></tr>\
             </table>",
        );
        let n = normalize(&s, NormalizeMode::Complete);
        assert_eq!(
            n.fields,
            vec![
                ("pct_female_hh".to_string(), AttrValue::Number(87.5)),
                ("open".to_string(), AttrValue::Bool(true)),
                (
                    "site_type".to_string(),
                    AttrValue::Text("Displacement Camp".to_string())
                ),
            ]
        );
        assert_eq!(n.point, Point::new(13.15, 11.74));
    }

    #[test]
    fn normalize_is_deterministic() {
        let s = site(
            "<table><tr><td>A</td><td>1</td></tr><tr><td>B</td><td>2</td></tr></table>",
        );
        let a = normalize(&s, NormalizeMode::Complete);
        let b = normalize(&s, NormalizeMode::Complete);
        assert_eq!(a, b);
    }
}
