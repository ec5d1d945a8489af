//! Heuristic extraction from meta tags, the title, and visible contact text
//!
//! The weakest strategy: it reads what almost every page has, so its values
//! only win where nothing structured was published.

use crate::extract::{fields, ExtractedRecord, ExtractionStrategy, PageDocument, StrategyId};
use crate::ExtractionError;
use regex::Regex;
use scraper::{Html, Selector};
use std::sync::OnceLock;

const CONFIDENCE: f64 = 0.5;

/// Title separators, e.g. "About us | Acme Corp"
const TITLE_SEPARATORS: &[&str] = &[" | ", " - ", " – ", " — ", " · "];

#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicStrategy;

impl ExtractionStrategy for HeuristicStrategy {
    fn id(&self) -> StrategyId {
        StrategyId::HEURISTIC
    }

    fn extract(
        &self,
        page: &PageDocument<'_>,
    ) -> Result<Option<ExtractedRecord>, ExtractionError> {
        let html = page.html;
        let mut record = ExtractedRecord::new(self.id(), CONFIDENCE, page.url);

        let name = meta_content(html, r#"meta[property="og:site_name"]"#)?
            .or(meta_content(html, r#"meta[name="application-name"]"#)?)
            .or(title(html)?.map(|t| name_from_title(&t)));
        if let Some(name) = name {
            record.insert(fields::NAME, &name);
        }

        if let Some(description) = meta_content(html, r#"meta[name="description"]"#)?
            .or(meta_content(html, r#"meta[property="og:description"]"#)?)
        {
            record.insert(fields::DESCRIPTION, &description);
        }

        if let Some(url) = first_attr(html, r#"link[rel="canonical"][href]"#, "href")?
            .or(meta_content(html, r#"meta[property="og:url"]"#)?)
        {
            record.insert(fields::URL, &url);
        }

        if let Some(logo) = meta_content(html, r#"meta[property="og:image"]"#)? {
            record.insert(fields::LOGO, &logo);
        }

        let body = body_text(html)?;

        let email = first_attr(html, r#"a[href^="mailto:"]"#, "href")?
            .map(|href| strip_scheme(&href, "mailto:"))
            .filter(|e| !e.is_empty())
            .or_else(|| find_in(email_regex(), &body));
        if let Some(email) = email {
            record.insert(fields::EMAIL, &email);
        }

        let phone = first_attr(html, r#"a[href^="tel:"]"#, "href")?
            .map(|href| strip_scheme(&href, "tel:"))
            .filter(|p| !p.is_empty())
            .or_else(|| find_in(phone_regex(), &body));
        if let Some(phone) = phone {
            record.insert(fields::TELEPHONE, &phone);
        }

        Ok(record.non_empty())
    }
}

fn select(selector: &str) -> Result<Selector, ExtractionError> {
    Selector::parse(selector).map_err(|e| ExtractionError::Selector(format!("{:?}", e)))
}

fn first_attr(html: &Html, selector: &str, attr: &str) -> Result<Option<String>, ExtractionError> {
    let selector = select(selector)?;
    Ok(html
        .select(&selector)
        .filter_map(|el| el.value().attr(attr))
        .map(str::trim)
        .find(|v| !v.is_empty())
        .map(str::to_string))
}

fn meta_content(html: &Html, selector: &str) -> Result<Option<String>, ExtractionError> {
    first_attr(html, selector, "content")
}

fn title(html: &Html) -> Result<Option<String>, ExtractionError> {
    let selector = select("title")?;
    Ok(html
        .select(&selector)
        .map(|el| el.text().collect::<String>())
        .map(|t| t.trim().to_string())
        .find(|t| !t.is_empty()))
}

/// The site name is usually the last segment of a separated title
fn name_from_title(title: &str) -> String {
    for separator in TITLE_SEPARATORS {
        if let Some((_, last)) = title.rsplit_once(separator) {
            if !last.trim().is_empty() {
                return last.trim().to_string();
            }
        }
    }
    title.trim().to_string()
}

fn body_text(html: &Html) -> Result<String, ExtractionError> {
    let selector = select("body")?;
    Ok(html
        .select(&selector)
        .flat_map(|body| body.text())
        .collect::<Vec<_>>()
        .join(" "))
}

fn strip_scheme(href: &str, scheme: &str) -> String {
    let value = &href[scheme.len().min(href.len())..];
    value.split('?').next().unwrap_or("").trim().to_string()
}

fn find_in(regex: Option<&Regex>, text: &str) -> Option<String> {
    regex?.find(text).map(|m| m.as_str().trim().to_string())
}

fn email_regex() -> Option<&'static Regex> {
    static EMAIL: OnceLock<Option<Regex>> = OnceLock::new();
    EMAIL
        .get_or_init(|| Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").ok())
        .as_ref()
}

fn phone_regex() -> Option<&'static Regex> {
    static PHONE: OnceLock<Option<Regex>> = OnceLock::new();
    PHONE
        .get_or_init(|| Regex::new(r"\+?\(?\d{1,4}\)?(?:[ .-]?\(?\d{2,4}\)?){2,4}").ok())
        .as_ref()
}
