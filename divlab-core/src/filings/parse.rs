//! Filing body parsing.
//!
//! Dividend decision filings carry a numbered form table (`XFormD*` in the
//! viewer HTML; `<TE>`/`<TU>` cells in the `document.xml` payload):
//!
//! ```text
//! 1. 배당구분            | 결산배당
//! 2. 배당종류            | 현금배당
//! 3. 1주당 배당금(원)    | 보통주식 | 361
//!                        | 종류주식 | 361
//! 4. 시가배당율(%)       | 보통주식 | 1.9
//! 5. 배당금총액(원)      | 2,452,976,642,500
//! 6. 배당기준일          | 2023-12-31
//! 7. 배당금지급 예정일자 | -
//! ...
//! ```
//!
//! When no such table exists the tag-stripped text is scanned instead.
//! Fields hold raw cell text; `-` and empty cells become `None`.

use chrono::NaiveDate;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use thiserror::Error;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedBody {
    pub dividend_class: Option<String>,
    pub dividend_kind: Option<String>,
    pub per_share_common: Option<String>,
    pub per_share_preferred: Option<String>,
    pub yield_common: Option<String>,
    pub yield_preferred: Option<String>,
    pub total_amount: Option<String>,
    pub record_date: Option<String>,
    pub payment_date: Option<String>,
    pub meeting_held: Option<String>,
    pub meeting_date: Option<String>,
    pub board_decision_date: Option<String>,
    /// True when fields came from the form table rather than free text.
    pub from_table: bool,
}

#[derive(Debug, Clone, Error, PartialEq)]
#[error("not a number: {0:?}")]
pub struct NotNumeric(pub String);

/// Parse a body into raw dividend fields. Never fails; absent fields are `None`.
pub fn parse_body(body: &str) -> ParsedBody {
    let html = rewrite_xml_cells(body);
    let doc = Html::parse_document(&html);
    if let Some(parsed) = parse_form_table(&doc) {
        return parsed;
    }
    parse_free_text(&document_text(&doc))
}

/// Parse a numeric cell. Thousands separators, units and whitespace are
/// ignored; `-` or an empty cell is `Ok(None)`.
pub fn parse_number(raw: &str) -> Result<Option<f64>, NotNumeric> {
    let cleaned: String = raw
        .trim()
        .trim_end_matches(['원', '%', '주'])
        .chars()
        .filter(|c| *c != ',' && !c.is_whitespace())
        .collect();
    if cleaned.is_empty() || cleaned.chars().all(|c| c == '-') {
        return Ok(None);
    }
    cleaned
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .map(Some)
        .ok_or_else(|| NotNumeric(raw.trim().to_string()))
}

/// Parse a date in any of the layouts filings use.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let compact: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    let compact = compact.trim_end_matches('.');
    ["%Y-%m-%d", "%Y%m%d", "%Y.%m.%d", "%Y/%m/%d", "%Y년%m월%d일"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(compact, fmt).ok())
}

fn non_empty(text: &str) -> Option<String> {
    let t = text.trim();
    (!t.is_empty() && t != "-").then(|| t.to_string())
}

/// `document.xml` uses `<TE>`/`<TU>` for table cells; make them `<td>` so the
/// HTML parser keeps them inside their rows.
fn rewrite_xml_cells(body: &str) -> String {
    match Regex::new(r"(?i)<(/?)(?:te|tu)\b") {
        Ok(re) => re.replace_all(body, "<${1}td").into_owned(),
        Err(_) => body.to_string(),
    }
}

fn cell_text(cell: ElementRef<'_>) -> String {
    cell.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

fn document_text(doc: &Html) -> String {
    doc.root_element()
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Row number of a `N.` label cell.
fn row_number(label: &str) -> Option<u32> {
    let (num, _) = label.trim().split_once('.')?;
    num.trim().parse().ok()
}

fn is_preferred_label(label: &str) -> bool {
    label.contains("종류") || label.contains("우선")
}

fn is_common_label(label: &str) -> bool {
    label.contains("보통")
}

fn parse_form_table(doc: &Html) -> Option<ParsedBody> {
    let sel_table = Selector::parse("table").ok()?;
    let sel_tr = Selector::parse("tr").ok()?;
    let sel_td = Selector::parse("td, th").ok()?;

    let rows_of = |table: ElementRef<'_>| -> Vec<Vec<String>> {
        table
            .select(&sel_tr)
            .map(|tr| tr.select(&sel_td).map(cell_text).collect::<Vec<_>>())
            .filter(|cells| !cells.is_empty())
            .collect()
    };

    let tables: Vec<ElementRef<'_>> = doc.select(&sel_table).collect();
    let form = tables
        .iter()
        .find(|t| t.value().attr("id").is_some_and(|id| id.starts_with("XFormD")))
        .or_else(|| {
            tables.iter().find(|t| {
                rows_of(**t).iter().any(|cells| {
                    row_number(&cells[0]) == Some(1) && cells.iter().any(|c| c.contains("배당"))
                })
            })
        })?;

    let mut parsed = ParsedBody {
        from_table: true,
        ..ParsedBody::default()
    };
    let mut section: Option<u32> = None;

    for cells in rows_of(*form) {
        let (values, numbered) = match row_number(&cells[0]) {
            Some(n) => {
                section = Some(n);
                (&cells[1..], true)
            }
            None => (&cells[..], false),
        };
        let Some(n) = section else { continue };
        let last = values.last().and_then(|v| non_empty(v));

        match n {
            1 if numbered => parsed.dividend_class = last,
            2 if numbered => parsed.dividend_kind = last,
            3 | 4 => {
                let (common, preferred) = labeled_values(values);
                let (common_slot, preferred_slot) = if n == 3 {
                    (&mut parsed.per_share_common, &mut parsed.per_share_preferred)
                } else {
                    (&mut parsed.yield_common, &mut parsed.yield_preferred)
                };
                if common_slot.is_none() {
                    *common_slot = common;
                }
                if preferred_slot.is_none() {
                    *preferred_slot = preferred;
                }
            }
            5 if numbered => parsed.total_amount = last,
            6 if numbered => parsed.record_date = last,
            7 if numbered => parsed.payment_date = last,
            8 if numbered => parsed.meeting_held = last,
            9 if numbered => parsed.meeting_date = last,
            10 if numbered => parsed.board_decision_date = last,
            _ => {}
        }
    }

    Some(parsed)
}

/// Split `보통주식 | 361 | 종류주식 | 120` style cells into (common, preferred).
///
/// A single unlabeled value counts as common.
fn labeled_values(values: &[String]) -> (Option<String>, Option<String>) {
    let mut common = None;
    let mut preferred = None;
    let mut saw_label = false;
    for pair in values.windows(2) {
        if is_common_label(&pair[0]) {
            saw_label = true;
            common = common.or_else(|| non_empty(&pair[1]));
        } else if is_preferred_label(&pair[0]) {
            saw_label = true;
            preferred = preferred.or_else(|| non_empty(&pair[1]));
        }
    }
    if !saw_label && values.len() == 1 {
        common = non_empty(&values[0]);
    }
    (common, preferred)
}

fn capture(re: &str, text: &str) -> Option<String> {
    let re = Regex::new(re).ok()?;
    re.captures(text)
        .and_then(|c| c.get(1))
        .and_then(|m| non_empty(m.as_str()))
}

fn parse_free_text(text: &str) -> ParsedBody {
    ParsedBody {
        dividend_class: capture(r"(결산배당|중간배당|분기배당)", text)
            .or_else(|| capture(r"(?i)\b(year-end|interim|quarterly) dividend", text)),
        dividend_kind: capture(r"배당\s*종류\s*[:：]?\s*([^\s]+)", text)
            .or_else(|| capture(r"(?i)dividend type\s*[:：]?\s*([A-Za-z-]+)", text)),
        per_share_common: capture(
            r"주당\s*배당금\s*(?:\(원\))?\s*(?:보통주식?)?\s*[:：]?\s*([^\s]+)",
            text,
        )
        .or_else(|| capture(r"(?i)dividend per share\s*(?:\(krw\))?\s*[:：]?\s*([^\s]+)", text)),
        per_share_preferred: None,
        yield_common: capture(
            r"시가\s*배당[율률]\s*(?:\(%\))?\s*(?:보통주식?)?\s*[:：]?\s*([^\s]+)",
            text,
        )
        .or_else(|| capture(r"(?i)dividend yield\s*(?:\(%\))?\s*[:：]?\s*([^\s]+)", text)),
        yield_preferred: None,
        total_amount: capture(r"배당금\s*총액\s*(?:\(원\))?\s*[:：]?\s*([^\s]+)", text),
        record_date: capture(r"배당\s*기준일\s*[:：]?\s*([0-9][0-9.\-/]+)", text),
        payment_date: None,
        meeting_held: None,
        meeting_date: None,
        board_decision_date: None,
        from_table: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VIEWER_HTML: &str = r#"
<html><body>
<table id="XFormD1_Form0_Table0">
<tr><td>1. 배당구분</td><td colspan="2">결산배당</td></tr>
<tr><td>2. 배당종류</td><td colspan="2">현금배당</td></tr>
<tr><td rowspan="2">3. 1주당 배당금(원)</td><td>보통주식</td><td>1,444</td></tr>
<tr><td>종류주식</td><td>1,445</td></tr>
<tr><td rowspan="2">4. 시가배당율(%)</td><td>보통주식</td><td>1.9</td></tr>
<tr><td>종류주식</td><td>2.4</td></tr>
<tr><td>5. 배당금총액(원)</td><td colspan="2">9,809,438,634,500</td></tr>
<tr><td>6. 배당기준일</td><td colspan="2">2023-12-31</td></tr>
<tr><td>7. 배당금지급 예정일자</td><td colspan="2">-</td></tr>
<tr><td>8. 주주총회 개최여부</td><td colspan="2">개최</td></tr>
<tr><td>9. 주주총회 예정일자</td><td colspan="2">2024-03-20</td></tr>
<tr><td>10. 이사회결의일(결정일)</td><td colspan="2">2024-01-31</td></tr>
</table>
</body></html>"#;

    #[test]
    fn parses_viewer_form_table() {
        let p = parse_body(VIEWER_HTML);
        assert!(p.from_table);
        assert_eq!(p.dividend_class.as_deref(), Some("결산배당"));
        assert_eq!(p.dividend_kind.as_deref(), Some("현금배당"));
        assert_eq!(p.per_share_common.as_deref(), Some("1,444"));
        assert_eq!(p.per_share_preferred.as_deref(), Some("1,445"));
        assert_eq!(p.yield_common.as_deref(), Some("1.9"));
        assert_eq!(p.yield_preferred.as_deref(), Some("2.4"));
        assert_eq!(p.total_amount.as_deref(), Some("9,809,438,634,500"));
        assert_eq!(p.record_date.as_deref(), Some("2023-12-31"));
        assert_eq!(p.payment_date, None);
        assert_eq!(p.board_decision_date.as_deref(), Some("2024-01-31"));
    }

    #[test]
    fn parses_document_xml_cells() {
        let xml = r#"<?xml version="1.0" encoding="utf-8"?>
<DOCUMENT><BODY><TABLE ACLASS="EXTRACTION">
<TR><TD>1. 배당구분</TD><TE>분기배당</TE></TR>
<TR><TD>2. 배당종류</TD><TE>현금배당</TE></TR>
<TR><TD>3. 1주당 배당금(원)</TD><TD>보통주식</TD><TE>361</TE></TR>
<TR><TD>4. 시가배당율(%)</TD><TD>보통주식</TD><TE>0.5</TE></TR>
</TABLE></BODY></DOCUMENT>"#;
        let p = parse_body(xml);
        assert!(p.from_table);
        assert_eq!(p.dividend_class.as_deref(), Some("분기배당"));
        assert_eq!(p.per_share_common.as_deref(), Some("361"));
        assert_eq!(p.yield_common.as_deref(), Some("0.5"));
    }

    #[test]
    fn free_text_fallback() {
        let body = "<p>결산배당 결정</p><p>배당종류: 현금배당</p>\
                    <p>1주당 배당금(원) 보통주식 500</p><p>시가배당율(%) 2.1</p>";
        let p = parse_body(body);
        assert!(!p.from_table);
        assert_eq!(p.dividend_class.as_deref(), Some("결산배당"));
        assert_eq!(p.dividend_kind.as_deref(), Some("현금배당"));
        assert_eq!(p.per_share_common.as_deref(), Some("500"));
        assert_eq!(p.yield_common.as_deref(), Some("2.1"));
    }

    #[test]
    fn missing_amount_row_is_none() {
        let html = r#"<table id="XFormD9"><tr><td>1. 배당구분</td><td>결산배당</td></tr>
            <tr><td>2. 배당종류</td><td>현금배당</td></tr>
            <tr><td>3. 1주당 배당금(원)</td><td>보통주식</td><td>-</td></tr></table>"#;
        let p = parse_body(html);
        assert_eq!(p.per_share_common, None);
    }

    #[test]
    fn number_parsing() {
        assert_eq!(parse_number("1,444"), Ok(Some(1444.0)));
        assert_eq!(parse_number(" 2.5 % "), Ok(Some(2.5)));
        assert_eq!(parse_number("-"), Ok(None));
        assert_eq!(parse_number(""), Ok(None));
        assert!(parse_number("미정").is_err());
    }

    #[test]
    fn date_layouts() {
        let want = NaiveDate::from_ymd_opt(2024, 12, 31);
        assert_eq!(parse_date("2024-12-31"), want);
        assert_eq!(parse_date("20241231"), want);
        assert_eq!(parse_date("2024.12.31."), want);
        assert_eq!(parse_date("2024년 12월 31일"), want);
        assert_eq!(parse_date("-"), None);
    }
}
