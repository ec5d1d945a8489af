//! Structured-data (JSON-LD) extraction
//!
//! Reads every `<script type="application/ld+json">` block, flattens arrays
//! and `@graph` containers, and maps the first organization-like node onto
//! the canonical field names.

use crate::extract::{fields, ExtractedRecord, ExtractionStrategy, PageDocument, StrategyId};
use crate::ExtractionError;
use scraper::Selector;
use serde_json::Value;

const CONFIDENCE: f64 = 0.9;

/// schema.org types treated as describing the entity
const ORGANIZATION_TYPES: &[&str] = &[
    "Organization",
    "Corporation",
    "LocalBusiness",
    "NGO",
    "EducationalOrganization",
    "GovernmentOrganization",
    "MedicalOrganization",
    "NewsMediaOrganization",
    "SportsOrganization",
    "Store",
    "Restaurant",
    "ProfessionalService",
    "FoodEstablishment",
];

#[derive(Debug, Clone, Copy, Default)]
pub struct StructuredDataStrategy;

impl ExtractionStrategy for StructuredDataStrategy {
    fn id(&self) -> StrategyId {
        StrategyId::STRUCTURED_DATA
    }

    fn extract(
        &self,
        page: &PageDocument<'_>,
    ) -> Result<Option<ExtractedRecord>, ExtractionError> {
        let selector = Selector::parse(r#"script[type="application/ld+json"]"#)
            .map_err(|e| ExtractionError::Selector(format!("{:?}", e)))?;

        let mut nodes = Vec::new();
        let mut blocks = 0usize;
        let mut last_error = None;

        for script in page.html.select(&selector) {
            let text: String = script.text().collect();
            if text.trim().is_empty() {
                continue;
            }
            blocks += 1;

            match serde_json::from_str::<Value>(text.trim()) {
                Ok(value) => flatten_nodes(value, &mut nodes),
                Err(e) => last_error = Some(e.to_string()),
            }
        }

        if nodes.is_empty() {
            // Every block was unparseable: report it rather than "nothing found"
            return match last_error {
                Some(message) if blocks > 0 => Err(ExtractionError::MalformedJson(message)),
                _ => Ok(None),
            };
        }

        let Some(node) = nodes
            .iter()
            .find(|n| is_organization(n))
            .or_else(|| nodes.iter().find(|n| n.get("name").is_some()))
        else {
            return Ok(None);
        };

        let mut record = ExtractedRecord::new(self.id(), CONFIDENCE, page.url);
        map_organization(node, &mut record);
        Ok(record.non_empty())
    }
}

/// Pushes every object node, unwrapping arrays and `@graph`
fn flatten_nodes(value: Value, out: &mut Vec<Value>) {
    match value {
        Value::Array(items) => {
            for item in items {
                flatten_nodes(item, out);
            }
        }
        Value::Object(mut map) => {
            if let Some(graph) = map.remove("@graph") {
                flatten_nodes(graph, out);
            }
            if !map.is_empty() {
                out.push(Value::Object(map));
            }
        }
        _ => {}
    }
}

fn is_organization(node: &Value) -> bool {
    let is_org_type = |t: &str| {
        let t = t.rsplit('/').next().unwrap_or(t);
        ORGANIZATION_TYPES.contains(&t)
    };

    match node.get("@type") {
        Some(Value::String(t)) => is_org_type(t.as_str()),
        Some(Value::Array(types)) => types.iter().filter_map(Value::as_str).any(is_org_type),
        _ => false,
    }
}

fn map_organization(node: &Value, record: &mut ExtractedRecord) {
    for (key, field) in [
        ("name", fields::NAME),
        ("legalName", fields::NAME),
        ("description", fields::DESCRIPTION),
        ("telephone", fields::TELEPHONE),
        ("email", fields::EMAIL),
        ("url", fields::URL),
        ("foundingDate", fields::FOUNDING_DATE),
    ] {
        if let Some(value) = node.get(key).and_then(text_value) {
            record.insert_if_absent(field, value.trim_start_matches("mailto:"));
        }
    }

    let logo = node
        .get("logo")
        .and_then(|l| text_value(l).or_else(|| l.get("url").and_then(text_value)));
    if let Some(logo) = logo {
        record.insert(fields::LOGO, &logo);
    }

    if let Some(same_as) = node.get("sameAs") {
        let links: Vec<String> = match same_as {
            Value::Array(items) => items.iter().filter_map(text_value).collect(),
            other => text_value(other).into_iter().collect(),
        };
        record.insert(fields::SAME_AS, &links.join(" "));
    }

    if let Some(address) = node.get("address") {
        map_address(address, record);
    }

    // Contact points fill in what the top level left out
    let contact_points = match node.get("contactPoint") {
        Some(Value::Array(points)) => points.iter().collect(),
        Some(point @ Value::Object(_)) => vec![point],
        _ => Vec::new(),
    };
    for point in contact_points {
        if let Some(phone) = point.get("telephone").and_then(text_value) {
            record.insert_if_absent(fields::TELEPHONE, &phone);
        }
        if let Some(email) = point.get("email").and_then(text_value) {
            record.insert_if_absent(fields::EMAIL, email.trim_start_matches("mailto:"));
        }
    }
}

fn map_address(address: &Value, record: &mut ExtractedRecord) {
    let address = match address {
        Value::Array(items) => match items.first() {
            Some(first) => first,
            None => return,
        },
        other => other,
    };

    if let Some(text) = address.as_str() {
        record.insert(fields::ADDRESS, text);
        return;
    }

    let country = address
        .get("addressCountry")
        .and_then(|c| text_value(c).or_else(|| c.get("name").and_then(text_value)));

    let prop = |key: &str| address.get(key).and_then(text_value);
    let parts = [
        (fields::STREET_ADDRESS, prop("streetAddress")),
        (fields::LOCALITY, prop("addressLocality")),
        (fields::REGION, prop("addressRegion")),
        (fields::POSTAL_CODE, prop("postalCode")),
        (fields::COUNTRY, country),
    ];

    let mut joined = Vec::new();
    for (field, value) in parts {
        if let Some(value) = value {
            record.insert(field, &value);
            joined.push(value);
        }
    }
    record.insert(fields::ADDRESS, &joined.join(", "));
}

/// Strings and numbers as text; anything else is not a scalar value
fn text_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
