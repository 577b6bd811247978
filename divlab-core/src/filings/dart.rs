//! OpenDART disclosure client.
//!
//! Listing queries go to `list.json` filtered by detailed filing type and
//! receipt date. Bodies come from `document.xml` (a ZIP archive holding the
//! original XML); the static viewer page is the fallback when the archive is
//! unavailable.
//!
//! OpenDART reports most failures inside a 200 response through its `status`
//! field, so both the HTTP status and the body status are mapped to
//! [`FetchError`].

use std::io::{Cursor, Read};
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use super::source::{DisclosureSource, FilingListing, ListingPage};
use crate::domain::{DateRange, FilingId, FilingType};
use crate::net::{http, CircuitBreaker, ErrorClass, FetchError};

const DEFAULT_API_BASE: &str = "https://opendart.fss.or.kr/api";
const DEFAULT_VIEWER_BASE: &str = "https://dart.fss.or.kr";
/// OpenDART caps `page_count` at 100.
const MAX_PAGE_SIZE: u32 = 100;

#[derive(Debug, Deserialize)]
struct ListResponse {
    status: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    page_no: Option<u32>,
    #[serde(default)]
    total_page: Option<u32>,
    #[serde(default)]
    list: Vec<ListItem>,
}

#[derive(Debug, Deserialize)]
struct ListItem {
    corp_code: String,
    corp_name: String,
    #[serde(default)]
    stock_code: String,
    #[serde(default)]
    corp_cls: String,
    report_nm: String,
    rcept_no: String,
    rcept_dt: String,
}

#[derive(Debug, Deserialize)]
struct StatusOnly {
    status: String,
    #[serde(default)]
    message: String,
}

/// Map an OpenDART body status to a result.
///
/// `013` (no data) is not an error: it is an empty page.
fn check_status(status: &str, message: &str) -> Result<bool, FetchError> {
    match status {
        "000" => Ok(true),
        "013" => Ok(false),
        "020" => Err(FetchError::RateLimited {
            retry_after_secs: 0,
        }),
        "010" | "011" | "012" | "901" => {
            Err(FetchError::InvalidCredential(format!("{status}: {message}")))
        }
        "800" | "900" => Err(FetchError::Server(format!("{status}: {message}"))),
        other => Err(FetchError::ResponseFormat(format!("{other}: {message}"))),
    }
}

pub struct DartClient {
    client: reqwest::blocking::Client,
    api_key: String,
    api_base: String,
    viewer_base: String,
    page_size: u32,
    circuit_breaker: Arc<CircuitBreaker>,
}

impl DartClient {
    pub fn new(api_key: impl Into<String>, circuit_breaker: Arc<CircuitBreaker>) -> Result<Self, FetchError> {
        Ok(Self {
            client: http::build_client(Duration::from_secs(20))?,
            api_key: api_key.into(),
            api_base: DEFAULT_API_BASE.to_string(),
            viewer_base: DEFAULT_VIEWER_BASE.to_string(),
            page_size: MAX_PAGE_SIZE,
            circuit_breaker,
        })
    }

    /// Point the client at another host (mirrors, local fakes).
    pub fn with_base_urls(mut self, api_base: impl Into<String>, viewer_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self.viewer_base = viewer_base.into();
        self
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.clamp(1, MAX_PAGE_SIZE);
        self
    }

    fn list_url(&self, filing_type: &FilingType, range: DateRange, page_no: u32) -> String {
        format!(
            "{}/list.json?crtfc_key={}&bgn_de={}&end_de={}&pblntf_detail_ty={}\
             &page_no={page_no}&page_count={}",
            self.api_base,
            self.api_key,
            range.start.format("%Y%m%d"),
            range.end.format("%Y%m%d"),
            filing_type.as_str(),
            self.page_size,
        )
    }

    fn document_url(&self, filing_id: &FilingId) -> String {
        format!(
            "{}/document.xml?crtfc_key={}&rcept_no={}",
            self.api_base, self.api_key, filing_id
        )
    }

    fn viewer_url(&self, filing_id: &FilingId) -> String {
        format!(
            "{}/report/viewer.do?rcpNo={}&dcmNo=0&eleId=0",
            self.viewer_base, filing_id
        )
    }

    fn get(&self, url: &str) -> Result<reqwest::blocking::Response, FetchError> {
        http::get(&self.client, &self.circuit_breaker, url)
    }

    fn parse_list(body: &[u8], page_no: u32) -> Result<ListingPage, FetchError> {
        let resp: ListResponse = serde_json::from_slice(body)
            .map_err(|e| FetchError::ResponseFormat(format!("list.json: {e}")))?;

        if !check_status(&resp.status, &resp.message)? {
            return Ok(ListingPage {
                page_no,
                total_pages: 0,
                items: Vec::new(),
            });
        }

        let items = resp
            .list
            .into_iter()
            .map(|item| FilingListing {
                filing_id: FilingId::new(item.rcept_no),
                corp_code: item.corp_code,
                corp_name: item.corp_name,
                corp_cls: item.corp_cls,
                stock_code: item.stock_code.trim().to_string(),
                report_name: item.report_nm.trim().to_string(),
                filing_date: item.rcept_dt,
            })
            .collect();

        Ok(ListingPage {
            page_no: resp.page_no.unwrap_or(page_no),
            total_pages: resp.total_page.unwrap_or(1),
            items,
        })
    }

    /// Decode a `document.xml` payload: a ZIP archive, raw XML, or a JSON status.
    fn decode_document(filing_id: &FilingId, bytes: &[u8]) -> Result<Option<String>, FetchError> {
        if bytes.starts_with(b"PK") {
            let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
                .map_err(|e| FetchError::ResponseFormat(format!("document archive: {e}")))?;
            let main_entry = archive
                .file_names()
                .find(|name| name.starts_with(filing_id.as_str()))
                .map(str::to_owned);
            let mut entry = match main_entry {
                Some(name) => archive.by_name(&name),
                None => archive.by_index(0),
            }
            .map_err(|e| FetchError::ResponseFormat(format!("document entry: {e}")))?;
            let mut buf = Vec::new();
            entry
                .read_to_end(&mut buf)
                .map_err(|e| FetchError::ResponseFormat(format!("document read: {e}")))?;
            return Ok(Some(String::from_utf8_lossy(&buf).into_owned()));
        }

        let lead = bytes
            .iter()
            .position(|b| !b.is_ascii_whitespace())
            .unwrap_or(bytes.len());
        let trimmed = &bytes[lead..];
        if trimmed.starts_with(b"<") {
            return Ok(Some(String::from_utf8_lossy(bytes).into_owned()));
        }
        if trimmed.starts_with(b"{") {
            if let Ok(status) = serde_json::from_slice::<StatusOnly>(bytes) {
                check_status(&status.status, &status.message)?;
            }
        }
        Ok(None)
    }
}

impl DisclosureSource for DartClient {
    fn name(&self) -> &str {
        "opendart"
    }

    fn list_page(
        &self,
        filing_type: &FilingType,
        range: DateRange,
        page_no: u32,
    ) -> Result<ListingPage, FetchError> {
        let url = self.list_url(filing_type, range, page_no);
        let body = self.get(&url)?.bytes()?;
        Self::parse_list(&body, page_no)
    }

    fn fetch_body(&self, filing_id: &FilingId) -> Result<String, FetchError> {
        match self
            .get(&self.document_url(filing_id))
            .and_then(|resp| Ok(resp.bytes()?))
            .and_then(|bytes| Self::decode_document(filing_id, &bytes))
        {
            Ok(Some(doc)) => return Ok(doc),
            Ok(None) => {}
            Err(e) if e.class() == ErrorClass::Fatal => return Err(e),
            Err(FetchError::RateLimited { retry_after_secs }) => {
                return Err(FetchError::RateLimited { retry_after_secs })
            }
            Err(e) => {
                tracing::debug!(filing = %filing_id, error = %e, "document.xml unavailable, using viewer");
            }
        }

        let html = self.get(&self.viewer_url(filing_id))?.text()?;
        if html.to_ascii_lowercase().contains("<html") {
            Ok(html)
        } else {
            Err(FetchError::NotFound(format!("no body for filing {filing_id}")))
        }
    }
}
