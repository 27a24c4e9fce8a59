//! Per-site extraction strategies turning parsed portal pages into opportunity records.

use std::collections::HashSet;

use govopp_core::{normalize, OpportunityKind, OpportunityRecord, DEFAULT_AMOUNT, DEFAULT_DEADLINE};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use url::Url;

pub const CRATE_NAME: &str = "govopp-adapters";

/// Closed set of page layouts the pipeline knows how to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractorKind {
    /// Ministry accordions wrapping one row per scheme.
    Accordion,
    /// Scheme table, name in the second cell and details in the third.
    Tabular,
    /// `h3`/`h4` headings mentioning scholarships, described by the following paragraph.
    HeadingScan,
    /// Any link whose text mentions scholarships.
    LinkScan,
    /// Job cards with a link-scan fallback.
    JobBoard,
}

impl ExtractorKind {
    pub const ALL: [ExtractorKind; 5] = [
        ExtractorKind::Accordion,
        ExtractorKind::Tabular,
        ExtractorKind::HeadingScan,
        ExtractorKind::LinkScan,
        ExtractorKind::JobBoard,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ExtractorKind::Accordion => "accordion",
            ExtractorKind::Tabular => "tabular",
            ExtractorKind::HeadingScan => "heading_scan",
            ExtractorKind::LinkScan => "link_scan",
            ExtractorKind::JobBoard => "job_board",
        }
    }

    pub fn opportunity_kind(self) -> OpportunityKind {
        match self {
            ExtractorKind::JobBoard => OpportunityKind::Job,
            _ => OpportunityKind::Scholarship,
        }
    }

    pub fn extract(
        self,
        document: &Html,
        source_url: &Url,
        defaults: &SiteDefaults,
    ) -> Result<Vec<OpportunityRecord>, ExtractError> {
        match self {
            ExtractorKind::Accordion => extract_accordion(document, source_url, defaults),
            ExtractorKind::Tabular => extract_tabular(document, source_url, defaults),
            ExtractorKind::HeadingScan => extract_heading_scan(document, source_url, defaults),
            ExtractorKind::LinkScan => extract_link_scan(document, source_url, defaults),
            ExtractorKind::JobBoard => {
                extract_job_board(document, source_url, defaults).map(|(records, _)| records)
            }
        }
    }

    /// Parse `html` and extract in one step. The parsed tree never outlives this call.
    pub fn extract_html(
        self,
        html: &str,
        source_url: &Url,
        defaults: &SiteDefaults,
    ) -> Result<Vec<OpportunityRecord>, ExtractError> {
        let document = Html::parse_document(html);
        self.extract(&document, source_url, defaults)
    }
}

/// Source-specific values used when a page leaves a field blank.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteDefaults {
    pub category: String,
    pub amount: String,
    pub deadline: String,
    pub description: String,
}

impl Default for SiteDefaults {
    fn default() -> Self {
        Self {
            category: String::new(),
            amount: DEFAULT_AMOUNT.to_string(),
            deadline: DEFAULT_DEADLINE.to_string(),
            description: String::new(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("invalid selector {selector:?}: {message}")]
    InvalidSelector { selector: String, message: String },
    #[error("invalid pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

fn selector(css: &str) -> Result<Selector, ExtractError> {
    Selector::parse(css).map_err(|e| ExtractError::InvalidSelector {
        selector: css.to_string(),
        message: e.to_string(),
    })
}

fn element_text(element: ElementRef<'_>) -> String {
    normalize(&element.text().collect::<String>())
}

/// Text of every descendant matching `sel`, concatenated, then normalized.
fn joined_text(element: ElementRef<'_>, sel: &Selector) -> String {
    let raw = element
        .select(sel)
        .flat_map(|n| n.text())
        .collect::<String>();
    normalize(&raw)
}

fn first_text(element: ElementRef<'_>, sel: &Selector) -> Option<String> {
    element
        .select(sel)
        .map(element_text)
        .find(|text| !text.is_empty())
}

fn or_default(value: String, default: &str) -> String {
    if value.is_empty() {
        default.to_string()
    } else {
        value
    }
}

/// Absolute form of `href`. Falls back to the page URL when the href cannot be
/// joined or points at a non-web scheme such as `javascript:` or `mailto:`.
pub fn resolve_link(source_url: &Url, href: &str) -> String {
    source_url
        .join(href.trim())
        .ok()
        .filter(|url| matches!(url.scheme(), "http" | "https"))
        .map(String::from)
        .unwrap_or_else(|| source_url.to_string())
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(needle)
}

fn scholarship_record(
    name: String,
    source_url: &Url,
    defaults: &SiteDefaults,
) -> OpportunityRecord {
    OpportunityRecord::new(
        OpportunityKind::Scholarship,
        name,
        defaults.category.clone(),
        source_url.as_str(),
    )
    .with_amount(defaults.amount.clone())
    .with_deadline(defaults.deadline.clone())
    .with_description(defaults.description.clone())
}

pub fn extract_accordion(
    document: &Html,
    source_url: &Url,
    defaults: &SiteDefaults,
) -> Result<Vec<OpportunityRecord>, ExtractError> {
    let item_sel = selector(".accordion-item")?;
    let label_sel = selector(".accordion-button")?;
    let row_sel = selector(".accordion-body .row.mb-4.border-1.border-bottom")?;
    let title_sel = selector("h6")?;
    let span_sel = selector("span")?;

    let mut seen = HashSet::new();
    let mut out = Vec::new();

    for item in document.select(&item_sel) {
        let category = or_default(joined_text(item, &label_sel), &defaults.category);

        for row in item.select(&row_sel) {
            let title = joined_text(row, &title_sel);
            if title.is_empty() {
                continue;
            }

            let mut deadline = defaults.deadline.clone();
            let mut open_date = None;
            for span in row.select(&span_sel) {
                let text = element_text(span);
                let lower = text.to_lowercase();
                if lower.contains("closed on") || lower.contains("open till") {
                    deadline = text.clone();
                }
                if lower.contains("open from") {
                    open_date = Some(text);
                }
            }

            if !seen.insert(title.clone()) {
                continue;
            }

            out.push(
                OpportunityRecord::new(
                    OpportunityKind::Scholarship,
                    title,
                    category.clone(),
                    source_url.as_str(),
                )
                .with_amount(defaults.amount.clone())
                .with_deadline(deadline)
                .with_open_date(open_date)
                .with_description(defaults.description.clone()),
            );
        }
    }

    Ok(out)
}

const HEADER_SENTINEL: &str = "name of scheme";

pub fn extract_tabular(
    document: &Html,
    source_url: &Url,
    defaults: &SiteDefaults,
) -> Result<Vec<OpportunityRecord>, ExtractError> {
    let row_sel = selector("table tr")?;
    let cell_sel = selector("td")?;

    let mut out = Vec::new();
    for row in document.select(&row_sel) {
        let cells = row.select(&cell_sel).collect::<Vec<_>>();
        if cells.len() < 2 {
            continue;
        }
        let name = element_text(cells[1]);
        if name.is_empty() || contains_ignore_case(&name, HEADER_SENTINEL) {
            continue;
        }
        let description = cells.get(2).map(|c| element_text(*c)).unwrap_or_default();

        out.push(
            scholarship_record(name, source_url, defaults)
                .with_description(or_default(description, &defaults.description)),
        );
    }
    Ok(out)
}

pub fn extract_heading_scan(
    document: &Html,
    source_url: &Url,
    defaults: &SiteDefaults,
) -> Result<Vec<OpportunityRecord>, ExtractError> {
    let heading_sel = selector("h3, h4")?;

    let mut out = Vec::new();
    for heading in document.select(&heading_sel) {
        let title = element_text(heading);
        if !contains_ignore_case(&title, "scholarship") {
            continue;
        }
        let description = heading
            .next_siblings()
            .find_map(ElementRef::wrap)
            .filter(|next| next.value().name() == "p")
            .map(element_text)
            .unwrap_or_default();

        out.push(
            scholarship_record(title, source_url, defaults)
                .with_description(or_default(description, &defaults.description)),
        );
    }
    Ok(out)
}

pub fn extract_link_scan(
    document: &Html,
    source_url: &Url,
    defaults: &SiteDefaults,
) -> Result<Vec<OpportunityRecord>, ExtractError> {
    let link_sel = selector("a")?;
    Ok(document
        .select(&link_sel)
        .map(element_text)
        .filter(|text| contains_ignore_case(text, "scholarship"))
        .map(|text| scholarship_record(text, source_url, defaults))
        .collect())
}

/// Card containers tried in order; only the first one present on the page is used.
pub const JOB_CARD_SELECTORS: &[&str] = &[
    ".job-card",
    ".job-listing",
    ".job-item",
    ".vacancy-item",
    ".career-item",
    "li.job",
    ".jobs-list li",
];

const JOB_TITLE_SELECTOR: &str = ".job-title, .title, h2, h3, h4, a";
const JOB_COMPANY_SELECTOR: &str = ".company, .company-name, .employer";
const JOB_LOCATION_SELECTOR: &str = ".location, .job-location";
const JOB_LINK_PATTERN: &str = r"(?i)job|opening|vacanc";
const MIN_JOB_LINK_TEXT_CHARS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobBoardTier {
    /// Records came from the named card selector.
    Cards(&'static str),
    /// No card selector produced a record; keyword links were scanned instead.
    LinkFallback,
}

/// Card extraction first, keyword link scan only when the cards produced nothing.
pub fn extract_job_board(
    document: &Html,
    source_url: &Url,
    defaults: &SiteDefaults,
) -> Result<(Vec<OpportunityRecord>, JobBoardTier), ExtractError> {
    for &pattern in JOB_CARD_SELECTORS {
        let card_sel = selector(pattern)?;
        let cards = document.select(&card_sel).collect::<Vec<_>>();
        if cards.is_empty() {
            continue;
        }
        let records = extract_job_cards(&cards, source_url, defaults)?;
        if records.is_empty() {
            break;
        }
        debug!(pattern, count = records.len(), "job cards matched");
        return Ok((records, JobBoardTier::Cards(pattern)));
    }

    let records = extract_job_links(document, source_url, defaults)?;
    debug!(count = records.len(), "job link fallback used");
    Ok((records, JobBoardTier::LinkFallback))
}

fn job_record(
    name: String,
    link: String,
    description: String,
    defaults: &SiteDefaults,
) -> OpportunityRecord {
    OpportunityRecord::new(OpportunityKind::Job, name, defaults.category.clone(), link)
        .with_amount(defaults.amount.clone())
        .with_deadline(defaults.deadline.clone())
        .with_description(or_default(description, &defaults.description))
}

fn extract_job_cards(
    cards: &[ElementRef<'_>],
    source_url: &Url,
    defaults: &SiteDefaults,
) -> Result<Vec<OpportunityRecord>, ExtractError> {
    let title_sel = selector(JOB_TITLE_SELECTOR)?;
    let company_sel = selector(JOB_COMPANY_SELECTOR)?;
    let location_sel = selector(JOB_LOCATION_SELECTOR)?;
    let link_sel = selector("a[href]")?;

    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for card in cards {
        let title = first_text(*card, &title_sel).unwrap_or_else(|| element_text(*card));
        let name = match first_text(*card, &company_sel) {
            Some(company) => format!("{title} at {company}"),
            None => title,
        };
        if name.is_empty() || !seen.insert(name.clone()) {
            continue;
        }

        let link = card
            .select(&link_sel)
            .next()
            .and_then(|a| a.value().attr("href"))
            .map(|href| resolve_link(source_url, href))
            .unwrap_or_else(|| source_url.to_string());
        let location = first_text(*card, &location_sel).unwrap_or_default();

        out.push(job_record(name, link, location, defaults));
    }
    Ok(out)
}

fn extract_job_links(
    document: &Html,
    source_url: &Url,
    defaults: &SiteDefaults,
) -> Result<Vec<OpportunityRecord>, ExtractError> {
    let link_sel = selector("a")?;
    let keyword = Regex::new(JOB_LINK_PATTERN).map_err(|source| ExtractError::InvalidPattern {
        pattern: JOB_LINK_PATTERN.to_string(),
        source,
    })?;

    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for anchor in document.select(&link_sel) {
        let text = element_text(anchor);
        let href = anchor.value().attr("href");
        let matches = keyword.is_match(&text) || href.is_some_and(|h| keyword.is_match(h));
        if !matches || text.chars().count() <= MIN_JOB_LINK_TEXT_CHARS {
            continue;
        }
        if !seen.insert(text.clone()) {
            continue;
        }
        let link = href
            .map(|h| resolve_link(source_url, h))
            .unwrap_or_else(|| source_url.to_string());
        out.push(job_record(text, link, String::new(), defaults));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page_url() -> Url {
        Url::parse("https://portal.example.gov.in/schemes/list.html").unwrap()
    }

    fn defaults(category: &str, description: &str) -> SiteDefaults {
        SiteDefaults {
            category: category.to_string(),
            description: description.to_string(),
            ..SiteDefaults::default()
        }
    }

    fn accordion_row(title: &str, spans: &[&str]) -> String {
        let spans = spans
            .iter()
            .map(|s| format!("<span>{s}</span>"))
            .collect::<String>();
        format!(r#"<div class="row mb-4 border-1 border-bottom"><h6>{title}</h6>{spans}</div>"#)
    }

    fn accordion_section(label: &str, rows: &[String]) -> String {
        format!(
            r#"<div class="accordion-item">
                 <h2><button class="accordion-button">{label}</button></h2>
                 <div class="accordion-collapse"><div class="accordion-body">{}</div></div>
               </div>"#,
            rows.concat()
        )
    }

    #[test]
    fn accordion_dedupes_identical_titles_within_page() {
        let html = format!(
            "<html><body><div class=\"accordion\">{}</div></body></html>",
            accordion_section(
                "Ministry A",
                &[
                    accordion_row("Grant X", &[]),
                    accordion_row("Grant X", &[]),
                    accordion_row("Grant Y", &[]),
                ],
            )
        );
        let records = ExtractorKind::Accordion
            .extract_html(&html, &page_url(), &defaults("Central/State Scheme (NSP)", "Visit portal"))
            .unwrap();

        let names = records.iter().map(|r| r.name.as_str()).collect::<Vec<_>>();
        assert_eq!(names, vec!["Grant X", "Grant Y"]);
        assert!(records.iter().all(|r| r.category == "Ministry A"));
        assert!(records.iter().all(|r| r.kind == OpportunityKind::Scholarship));
        assert_eq!(records[0].id, "grant-x");
        assert_eq!(records[0].source_url, page_url().as_str());
    }

    #[test]
    fn accordion_reads_deadline_and_open_date_spans() {
        let html = accordion_section(
            "Ministry of Minority Affairs",
            &[
                accordion_row(
                    "Merit cum Means",
                    &["Open from  01-07-2024", "Closed on 31-10-2024"],
                ),
                accordion_row("Top Class", &["Open till 15-11-2024"]),
                accordion_row("No Dates", &["Guidelines"]),
                accordion_row("   ", &["Closed on 01-01-2024"]),
            ],
        );
        let records = ExtractorKind::Accordion
            .extract_html(&html, &page_url(), &SiteDefaults::default())
            .unwrap();

        assert_eq!(records.len(), 3, "blank titles are skipped");
        assert_eq!(records[0].deadline, "Closed on 31-10-2024");
        assert_eq!(records[0].open_date.as_deref(), Some("Open from 01-07-2024"));
        assert_eq!(records[1].deadline, "Open till 15-11-2024");
        assert_eq!(records[1].open_date, None);
        assert_eq!(records[2].deadline, DEFAULT_DEADLINE);
    }

    #[test]
    fn accordion_without_label_uses_site_category() {
        let html = r#"<div class="accordion-item"><div class="accordion-body">
            <div class="row mb-4 border-1 border-bottom"><h6>Scheme Z</h6></div>
        </div></div>"#;
        let records = ExtractorKind::Accordion
            .extract_html(html, &page_url(), &defaults("Central/State Scheme (NSP)", ""))
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].category, "Central/State Scheme (NSP)");
    }

    #[test]
    fn tabular_skips_header_row_and_maps_columns() {
        let html = r#"<table>
            <tr><td>#</td><td>Name of Scheme</td><td>Details</td></tr>
            <tr><td>1</td><td>Widow Pension</td><td>Monthly support</td></tr>
        </table>"#;
        let records = ExtractorKind::Tabular
            .extract_html(html, &page_url(), &defaults("J&K Social Welfare Department", "Social Welfare Scheme"))
            .unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "Widow Pension");
        assert_eq!(records[0].description, "Monthly support");
        assert_eq!(records[0].category, "J&K Social Welfare Department");
    }

    #[test]
    fn tabular_header_sentinel_is_case_insensitive_and_th_rows_are_ignored() {
        let html = r#"<table>
            <tr><th>S.No</th><th>Scheme</th><th>Details</th></tr>
            <tr><td>-</td><td>NAME OF SCHEME</td><td>x</td></tr>
            <tr><td>2</td><td>Ladli Beti</td></tr>
            <tr><td>only one cell</td></tr>
        </table>"#;
        let records = ExtractorKind::Tabular
            .extract_html(html, &page_url(), &defaults("", "Social Welfare Scheme"))
            .unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "Ladli Beti");
        assert_eq!(records[0].description, "Social Welfare Scheme");
    }

    #[test]
    fn heading_scan_takes_description_from_immediate_paragraph_only() {
        let html = r#"<div>
            <h3>Post Matric Scholarship</h3>
            <p>For ST students in classes XI and above.</p>
            <h4>Pre-Matric SCHOLARSHIP</h4>
            <div>not a paragraph</div>
            <p>too far away</p>
            <h3>Hostel Facilities</h3>
            <p>ignored</p>
        </div>"#;
        let records = ExtractorKind::HeadingScan
            .extract_html(html, &page_url(), &defaults("J&K Tribal Affairs", "Tribal Scholarship Scheme"))
            .unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].description, "For ST students in classes XI and above.");
        assert_eq!(records[1].name, "Pre-Matric SCHOLARSHIP");
        assert_eq!(records[1].description, "Tribal Scholarship Scheme");
    }

    #[test]
    fn link_scan_keeps_repeated_links() {
        let html = r#"<ul>
            <li><a href="/a.pdf">Merit Scholarship 2024</a></li>
            <li><a href="/b.pdf">Merit   Scholarship 2024</a></li>
            <li><a href="/c.pdf">Admission Notice</a></li>
        </ul>"#;
        let records = ExtractorKind::LinkScan
            .extract_html(html, &page_url(), &defaults("J&K Higher Education", "Higher Education Scholarship"))
            .unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, records[1].id);
        assert_eq!(records[0].source_url, page_url().as_str());
        assert_eq!(records[0].description, "Higher Education Scholarship");
    }

    #[test]
    fn job_cards_win_and_link_fallback_does_not_run() {
        let html = r#"<body>
            <div class="job-card">
                <h3 class="job-title">Junior Assistant</h3>
                <span class="company">Services Selection Board</span>
                <span class="location">Srinagar</span>
                <a href="/notices/ja.pdf">Details</a>
            </div>
            <div class="job-card">
                <h3 class="job-title">Junior Assistant</h3>
                <span class="company">Services Selection Board</span>
            </div>
            <div class="job-card"><h3>Forester</h3></div>
            <a href="/vacancies">All vacancies listed here</a>
        </body>"#;
        let doc = Html::parse_document(html);
        let (records, tier) =
            extract_job_board(&doc, &page_url(), &defaults("JKSSB", "See notification")).unwrap();

        assert_eq!(tier, JobBoardTier::Cards(".job-card"));
        let names = records.iter().map(|r| r.name.as_str()).collect::<Vec<_>>();
        assert_eq!(names, vec!["Junior Assistant at Services Selection Board", "Forester"]);
        assert_eq!(records[0].source_url, "https://portal.example.gov.in/notices/ja.pdf");
        assert_eq!(records[0].description, "Srinagar");
        assert_eq!(records[1].source_url, page_url().as_str());
        assert_eq!(records[1].description, "See notification");
        assert!(records.iter().all(|r| r.kind == OpportunityKind::Job));
    }

    #[test]
    fn first_matching_card_pattern_is_used_exclusively() {
        let html = r#"<body>
            <div class="job-listing"><span class="title">Lecturer</span></div>
            <li class="job"><a href="x">Driver</a></li>
        </body>"#;
        let doc = Html::parse_document(html);
        let (records, tier) = extract_job_board(&doc, &page_url(), &SiteDefaults::default()).unwrap();
        assert_eq!(tier, JobBoardTier::Cards(".job-listing"));
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "Lecturer");
    }

    #[test]
    fn card_without_title_field_falls_back_to_full_text() {
        let html = r#"<ul class="jobs-list"><li>  Staff   Nurse (Contract) </li></ul>"#;
        let doc = Html::parse_document(html);
        let (records, _) = extract_job_board(&doc, &page_url(), &SiteDefaults::default()).unwrap();
        assert_eq!(records[0].name, "Staff Nurse (Contract)");
    }

    #[test]
    fn link_fallback_runs_when_no_cards_match() {
        let html = r#"<body>
            <a href="/careers/openings.html">Current Openings</a>
            <a href="/jobs/123">Apply</a>
            <a href="/notice">Vacancy Notification 2024</a>
            <a href="/notice2">Vacancy Notification 2024</a>
            <a href="/jobs/9">Job</a>
            <a href="/about">About Us</a>
        </body>"#;
        let doc = Html::parse_document(html);
        let (records, tier) = extract_job_board(&doc, &page_url(), &SiteDefaults::default()).unwrap();

        assert_eq!(tier, JobBoardTier::LinkFallback);
        let names = records.iter().map(|r| r.name.as_str()).collect::<Vec<_>>();
        assert_eq!(names, vec!["Current Openings", "Apply", "Vacancy Notification 2024"]);
        assert_eq!(records[0].source_url, "https://portal.example.gov.in/careers/openings.html");
    }

    #[test]
    fn empty_card_matches_fall_through_to_links() {
        let html = r#"<body><div class="job-card">   </div><a href="/jobs">Recruitment jobs</a></body>"#;
        let doc = Html::parse_document(html);
        let (records, tier) = extract_job_board(&doc, &page_url(), &SiteDefaults::default()).unwrap();
        assert_eq!(tier, JobBoardTier::LinkFallback);
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn resolve_link_handles_relative_and_absolute() {
        let base = page_url();
        assert_eq!(resolve_link(&base, "b.html"), "https://portal.example.gov.in/schemes/b.html");
        assert_eq!(resolve_link(&base, "https://other.in/x"), "https://other.in/x");
    }

    #[test]
    fn resolve_link_ignores_non_web_schemes() {
        let base = page_url();
        for href in ["javascript:void(0)", "mailto:jobs@jk.gov.in", "tel:0194-2000000"] {
            assert_eq!(resolve_link(&base, href), base.as_str(), "{href}");
        }
    }

    #[test]
    fn javascript_card_link_keeps_page_url() {
        let html = r#"<div class="job-card"><a href="javascript:void(0)">Clerk</a></div>"#;
        let doc = Html::parse_document(html);
        let (records, tier) = extract_job_board(&doc, &page_url(), &SiteDefaults::default()).unwrap();
        assert_eq!(tier, JobBoardTier::Cards(".job-card"));
        assert_eq!(records[0].name, "Clerk");
        assert_eq!(records[0].source_url, page_url().as_str());
    }

    #[test]
    fn javascript_keyword_link_keeps_page_url() {
        let html = r#"<body><a href="javascript:showVacancies()">Current Vacancies</a></body>"#;
        let doc = Html::parse_document(html);
        let (records, tier) = extract_job_board(&doc, &page_url(), &SiteDefaults::default()).unwrap();
        assert_eq!(tier, JobBoardTier::LinkFallback);
        assert_eq!(records[0].name, "Current Vacancies");
        assert_eq!(records[0].source_url, page_url().as_str());
    }

    #[test]
    fn extractor_kind_round_trips_through_config_names() {
        for kind in ExtractorKind::ALL {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.as_str()));
        }
        assert_eq!(ExtractorKind::JobBoard.opportunity_kind(), OpportunityKind::Job);
    }
}
