//! Listing, body fetch and normalization over the in-memory source, using
//! fixture bodies in both viewer HTML and `document.xml` layouts.

use std::path::PathBuf;

use chrono::NaiveDate;
use divlab_core::domain::{
    DateRange, DividendClass, DividendType, FilingId, FilingType, Market, ParseStatus,
    RejectReason,
};
use divlab_core::filings::{
    parse_body, DisclosureSource, FilingListing, InMemorySource, ListingPages, Normalizer,
    RawFiling,
};

fn fixture(name: &str) -> String {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name);
    std::fs::read_to_string(path).unwrap()
}

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

fn listing(id: &str, stock: &str, cls: &str, report: &str, date: &str) -> FilingListing {
    FilingListing {
        filing_id: FilingId::new(id),
        corp_code: format!("corp-{id}"),
        corp_name: format!("Issuer {id}"),
        corp_cls: cls.into(),
        stock_code: stock.into(),
        report_name: report.into(),
        filing_date: date.into(),
    }
}

const MISSING_AMOUNT: &str = r#"<table id="XFormD1"><tr><td>1. 배당구분</td><td>결산배당</td></tr>
<tr><td>2. 배당종류</td><td>현금배당</td></tr>
<tr><td>3. 1주당 배당금(원)</td><td>보통주식</td><td>-</td></tr>
<tr><td>4. 시가배당율(%)</td><td>보통주식</td><td>-</td></tr></table>"#;

#[test]
fn viewer_fixture_parses_every_numbered_row() {
    let parsed = parse_body(&fixture("dividend_viewer.html"));
    assert!(parsed.from_table);
    assert_eq!(parsed.dividend_class.as_deref(), Some("결산배당"));
    assert_eq!(parsed.per_share_common.as_deref(), Some("361"));
    assert_eq!(parsed.per_share_preferred.as_deref(), Some("361"));
    assert_eq!(parsed.yield_preferred.as_deref(), Some("0.7"));
    assert_eq!(parsed.payment_date.as_deref(), Some("2024-04-19"));
    assert_eq!(parsed.meeting_held.as_deref(), Some("개최"));
    assert_eq!(parsed.meeting_date.as_deref(), Some("2024-03-20"));
}

#[test]
fn document_xml_fixture_parses_nested_units() {
    let parsed = parse_body(&fixture("dividend_document.xml"));
    assert!(parsed.from_table);
    assert_eq!(parsed.dividend_class.as_deref(), Some("분기배당"));
    assert_eq!(parsed.per_share_common.as_deref(), Some("300"));
    assert_eq!(parsed.per_share_preferred, None);
    assert_eq!(parsed.record_date.as_deref(), Some("2024-03-31"));
    assert_eq!(parsed.payment_date.as_deref(), Some("2024-05-20"));
}

#[test]
fn listing_pages_feed_the_normalizer() {
    let ty = FilingType::new("I002");
    let mut source = InMemorySource::new().with_page_size(2);
    source.add(
        ty.clone(),
        RawFiling {
            listing: listing("100", "005930", "Y", "현금ㆍ현물배당결정", "20240131"),
            body: fixture("dividend_viewer.html"),
        },
    );
    source.add(
        ty.clone(),
        RawFiling {
            listing: listing("101", "000660", "Y", "현금ㆍ현물배당결정", "20240425"),
            body: fixture("dividend_document.xml"),
        },
    );
    // Amount cell is "-": parse failure, kept with its status.
    source.add(
        ty.clone(),
        RawFiling {
            listing: listing("102", "035720", "K", "현금ㆍ현물배당결정", "20240212"),
            body: MISSING_AMOUNT.into(),
        },
    );
    // Not a dividend filing at all.
    source.add(
        ty.clone(),
        RawFiling {
            listing: listing("103", "005380", "Y", "유상증자결정", "20240213"),
            body: String::new(),
        },
    );

    let range = DateRange::new(d(2024, 1, 1), d(2024, 6, 30)).unwrap();
    let mut raws = Vec::new();
    for page in ListingPages::new(&source, ty, range) {
        for item in page.unwrap().items {
            let body = source.fetch_body(&item.filing_id).unwrap();
            raws.push(RawFiling {
                listing: item,
                body,
            });
        }
    }
    assert_eq!(raws.len(), 4);

    let batch = Normalizer::new(d(2024, 6, 30)).normalize_batch(&raws);
    assert_eq!(batch.accepted.len(), 2);

    let samsung = &batch.accepted[0];
    assert_eq!(samsung.listing.market, Market::Kospi);
    assert_eq!(samsung.dividend_type, DividendType::Cash);
    assert_eq!(samsung.dividend_class, DividendClass::YearEnd);
    assert_eq!(samsung.amount_per_share, Some(361.0));
    assert_eq!(samsung.dividend_yield, Some(0.5));
    assert_eq!(samsung.total_amount, Some(2_452_976_642_500.0));
    assert_eq!(samsung.payment_date, Some(d(2024, 4, 19)));

    let hynix = &batch.accepted[1];
    assert_eq!(hynix.dividend_class, DividendClass::Quarterly);
    assert_eq!(hynix.record_date, Some(d(2024, 3, 31)));

    let reasons: Vec<_> = batch.rejections.iter().map(|r| r.reason).collect();
    assert_eq!(reasons, vec![RejectReason::MissingAmount, RejectReason::NotDividend]);

    // The parse failure is recorded but never becomes a price event.
    let records = batch.records();
    let failed = records
        .iter()
        .find(|r| r.filing_id == FilingId::new("102"))
        .unwrap();
    assert_eq!(failed.parse_status, ParseStatus::Failed(RejectReason::MissingAmount));
    assert_eq!(failed.listing.market, Market::Kosdaq);
    assert!(failed.event().is_none());
    let events: Vec<_> = records.iter().filter_map(|r| r.event()).collect();
    assert_eq!(events.len(), 2);
}
