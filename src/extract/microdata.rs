//! schema.org microdata extraction
//!
//! Finds the first `itemscope` whose `itemtype` is an organization type and
//! reads its own `itemprop`s. A nested `address` item is flattened into the
//! address fields; props of any other nested item are ignored.

use crate::extract::{fields, ExtractedRecord, ExtractionStrategy, PageDocument, StrategyId};
use crate::ExtractionError;
use scraper::{ElementRef, Selector};

const CONFIDENCE: f64 = 0.8;

const ORGANIZATION_TYPES: &[&str] = &[
    "Organization",
    "Corporation",
    "LocalBusiness",
    "NGO",
    "Store",
    "Restaurant",
    "ProfessionalService",
];

#[derive(Debug, Clone, Copy, Default)]
pub struct MicrodataStrategy;

impl ExtractionStrategy for MicrodataStrategy {
    fn id(&self) -> StrategyId {
        StrategyId::MICRODATA
    }

    fn extract(
        &self,
        page: &PageDocument<'_>,
    ) -> Result<Option<ExtractedRecord>, ExtractionError> {
        let scopes = Selector::parse("[itemscope][itemtype]")
            .map_err(|e| ExtractionError::Selector(format!("{:?}", e)))?;
        let props = Selector::parse("[itemprop]")
            .map_err(|e| ExtractionError::Selector(format!("{:?}", e)))?;

        let Some(root) = page.html.select(&scopes).find(|el| {
            el.value()
                .attr("itemtype")
                .is_some_and(is_organization_type)
        }) else {
            return Ok(None);
        };

        let mut record = ExtractedRecord::new(self.id(), CONFIDENCE, page.url);
        let mut address_parts: Vec<(&'static str, String)> = Vec::new();

        for prop in root.select(&props) {
            let Some(name) = prop.value().attr("itemprop") else {
                continue;
            };
            let Some(owner) = owning_scope(prop) else {
                continue;
            };

            if owner.id() == root.id() {
                if prop.value().attr("itemscope").is_some() {
                    // Nested item: its own props are handled below
                    continue;
                }
                if let Some(field) = top_level_field(name) {
                    record.insert_if_absent(field, &prop_value(prop));
                }
            } else if owner.value().attr("itemprop") == Some("address")
                && owning_scope(owner).is_some_and(|o| o.id() == root.id())
            {
                if let Some(field) = address_field(name) {
                    address_parts.push((field, prop_value(prop)));
                }
            }
        }

        let mut joined = Vec::new();
        for (field, value) in address_parts {
            record.insert_if_absent(field, &value);
            let value = value.trim().to_string();
            if !value.is_empty() {
                joined.push(value);
            }
        }
        if !joined.is_empty() {
            record.insert(fields::ADDRESS, &joined.join(", "));
        }

        Ok(record.non_empty())
    }
}

fn is_organization_type(itemtype: &str) -> bool {
    itemtype.split_whitespace().any(|t| {
        let t = t.trim_end_matches('/');
        let t = t.rsplit('/').next().unwrap_or(t);
        ORGANIZATION_TYPES.contains(&t)
    })
}

/// Nearest ancestor carrying `itemscope`
fn owning_scope(element: ElementRef<'_>) -> Option<ElementRef<'_>> {
    element
        .ancestors()
        .filter_map(ElementRef::wrap)
        .find(|a| a.value().attr("itemscope").is_some())
}

fn top_level_field(itemprop: &str) -> Option<&'static str> {
    Some(match itemprop {
        "name" | "legalName" => fields::NAME,
        "description" => fields::DESCRIPTION,
        "telephone" => fields::TELEPHONE,
        "email" => fields::EMAIL,
        "url" => fields::URL,
        "logo" => fields::LOGO,
        "sameAs" => fields::SAME_AS,
        "foundingDate" => fields::FOUNDING_DATE,
        "address" => fields::ADDRESS,
        _ => return None,
    })
}

fn address_field(itemprop: &str) -> Option<&'static str> {
    Some(match itemprop {
        "streetAddress" => fields::STREET_ADDRESS,
        "addressLocality" => fields::LOCALITY,
        "addressRegion" => fields::REGION,
        "postalCode" => fields::POSTAL_CODE,
        "addressCountry" => fields::COUNTRY,
        _ => return None,
    })
}

/// Value of an itemprop element per the microdata rules
fn prop_value(element: ElementRef<'_>) -> String {
    let el = element.value();
    let attr = match el.name() {
        "meta" => el.attr("content"),
        "a" | "link" | "area" => el.attr("href"),
        "img" | "audio" | "video" | "source" | "iframe" | "embed" => el.attr("src"),
        "time" => el.attr("datetime"),
        "data" | "meter" => el.attr("value"),
        _ => None,
    };

    let value = match attr {
        Some(value) => value.to_string(),
        None => element.text().collect::<String>(),
    };
    value.trim().trim_start_matches("mailto:").trim_start_matches("tel:").to_string()
}
