//! Request builders for each generation use case.
//!
//! Builders are pure: they never touch the network and always produce the
//! same [`GenerateRequest`] for the same inputs.

use std::fmt::Write as _;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use dealdesk_core::{ComparableSale, Coordinates};
use serde_json::{json, Value};

use crate::error::AiError;
use crate::types::{GenerateRequest, InlineData, Part};

/// Number of synthetic leads requested by a batch generation.
pub const BATCH_LEAD_COUNT: usize = 5;

/// An image sent inline alongside the prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageAttachment {
    pub mime_type: String,
    /// Base64 (standard alphabet, padded).
    pub data: String,
}

impl ImageAttachment {
    #[must_use]
    pub fn from_bytes(mime_type: &str, bytes: &[u8]) -> Self {
        Self {
            mime_type: mime_type.to_owned(),
            data: STANDARD.encode(bytes),
        }
    }

    /// Accepts already-encoded data, with or without a `data:<mime>;base64,`
    /// prefix.
    ///
    /// # Errors
    ///
    /// Returns [`AiError::Config`] when the payload is not valid base64.
    pub fn from_base64(mime_type: &str, data: &str) -> Result<Self, AiError> {
        let payload = data
            .split_once(";base64,")
            .map_or(data, |(_, encoded)| encoded)
            .trim();
        STANDARD
            .decode(payload)
            .map_err(|e| AiError::Config(format!("image is not valid base64: {e}")))?;
        Ok(Self {
            mime_type: mime_type.to_owned(),
            data: payload.to_owned(),
        })
    }

    /// Guesses the MIME type from a file extension.
    #[must_use]
    pub fn mime_for_extension(ext: &str) -> &'static str {
        match ext.to_ascii_lowercase().as_str() {
            "png" => "image/png",
            "gif" => "image/gif",
            "webp" => "image/webp",
            _ => "image/jpeg",
        }
    }
}

fn string_array() -> Value {
    json!({ "type": "ARRAY", "items": { "type": "STRING" } })
}

fn analysis_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "summary": { "type": "STRING" },
            "offerRange": { "type": "STRING" },
            "buyerProfiles": string_array(),
            "sellerOutreachAngles": string_array(),
            "dueDiligenceChecklist": string_array(),
        },
        "required": [
            "summary",
            "offerRange",
            "buyerProfiles",
            "sellerOutreachAngles",
            "dueDiligenceChecklist"
        ]
    })
}

fn batch_schema() -> Value {
    json!({
        "type": "ARRAY",
        "items": {
            "type": "OBJECT",
            "properties": {
                "propertyDetails": { "type": "STRING" },
                "latitude": { "type": "NUMBER" },
                "longitude": { "type": "NUMBER" },
                "generatedResults": analysis_schema(),
            },
            "required": ["propertyDetails", "latitude", "longitude", "generatedResults"]
        }
    })
}

fn text(body: String) -> Part {
    Part::Text { text: body }
}

/// Structured investment analysis of one property.
#[must_use]
pub fn lead_analysis(
    details: &str,
    coordinates: Option<Coordinates>,
    image: Option<&ImageAttachment>,
) -> GenerateRequest {
    let mut prompt = String::from(
        "You are an expert real-estate investment analyst. Analyze the property below \
         for a wholesaler or fix-and-flip investor.\n\n",
    );
    let _ = writeln!(prompt, "Property details:\n{}", details.trim());
    if let Some(c) = coordinates {
        let _ = writeln!(
            prompt,
            "Location: latitude {}, longitude {}",
            c.latitude, c.longitude
        );
    }
    if image.is_some() {
        prompt.push_str("A photo of the property is attached; factor its visible condition into the analysis.\n");
    }
    prompt.push_str(
        "\nRespond with a JSON object containing: summary (a short investment summary), \
         offerRange (a suggested offer range as text), buyerProfiles (likely end buyers), \
         sellerOutreachAngles (ways to open a conversation with the seller) and \
         dueDiligenceChecklist (items to verify before making an offer).",
    );

    let mut parts = vec![text(prompt)];
    if let Some(img) = image {
        parts.push(Part::InlineData {
            inline_data: InlineData {
                mime_type: img.mime_type.clone(),
                data: img.data.clone(),
            },
        });
    }
    GenerateRequest::user(parts).expecting_json(analysis_schema())
}

/// Persuasive letter to a seller; free text with placeholders, no dollar figure.
#[must_use]
pub fn offer_letter(details: &str, offer_range: &str) -> GenerateRequest {
    let prompt = format!(
        "Write a warm, persuasive letter to a property owner expressing interest in \
         buying their property.\n\n\
         Property details:\n{details}\n\n\
         Our internal offer range is {offer_range}. Use it only to set the tone; do NOT \
         state any dollar amount in the letter.\n\n\
         Address the owner as [Seller Name] and sign off with [Your Name], [Your Phone] \
         and [Your Email] exactly as written so they can be filled in later. \
         Return only the letter text.",
        details = details.trim(),
        offer_range = offer_range.trim(),
    );
    GenerateRequest::user(vec![text(prompt)])
}

/// `count` synthetic leads, each with coordinates and a full analysis.
#[must_use]
pub fn batch_leads(count: usize) -> GenerateRequest {
    let prompt = format!(
        "Generate {count} realistic but fictional distressed-property leads in different \
         United States cities. For each lead give propertyDetails (address, beds, baths, \
         square footage and condition), latitude, longitude and generatedResults, an \
         analysis object with summary, offerRange, buyerProfiles, sellerOutreachAngles \
         and dueDiligenceChecklist. Respond with a JSON array of exactly {count} items."
    );
    GenerateRequest::user(vec![text(prompt)]).expecting_json(batch_schema())
}

/// Trend commentary over comparable sales, ending with a recommendation.
#[must_use]
pub fn market_trends(sales: &[ComparableSale]) -> GenerateRequest {
    let mut prompt = String::from(
        "You are a real-estate market analyst. Here are recent comparable sales \
         (price, sale date):\n",
    );
    for sale in sales {
        let _ = writeln!(prompt, "- ${} on {}", sale.price, sale.date);
    }
    prompt.push_str(
        "\nDescribe the price trend across these sales, note any outliers, and finish \
         with a final line that reads `Recommendation: up`, `Recommendation: down` or \
         `Recommendation: stable`.",
    );
    GenerateRequest::user(vec![text(prompt)])
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    use super::*;

    #[test]
    fn lead_analysis_embeds_inputs_and_requests_json() {
        let img = ImageAttachment::from_bytes("image/png", &[0x89, 0x50, 0x4e, 0x47]);
        let req = lead_analysis(
            "3 bed ranch, needs roof",
            Some(Coordinates {
                latitude: 39.5,
                longitude: -104.9,
            }),
            Some(&img),
        );
        let prompt = req.prompt_text();
        assert!(prompt.contains("3 bed ranch, needs roof"));
        assert!(prompt.contains("latitude 39.5"));

        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(
            value["contents"][0]["parts"][1]["inlineData"]["data"],
            "iVBORw=="
        );
        assert_eq!(
            value["generationConfig"]["responseMimeType"],
            "application/json"
        );
        let required = value["generationConfig"]["responseSchema"]["required"]
            .as_array()
            .unwrap();
        assert_eq!(required.len(), 5);
    }

    #[test]
    fn lead_analysis_without_extras_is_text_only() {
        let req = lead_analysis("duplex", None, None);
        assert_eq!(req.contents[0].parts.len(), 1);
        assert!(!req.prompt_text().contains("latitude"));
    }

    #[test]
    fn builders_are_deterministic() {
        assert_eq!(
            offer_letter("duplex", "$100k-$120k"),
            offer_letter("duplex", "$100k-$120k")
        );
        assert_eq!(batch_leads(BATCH_LEAD_COUNT), batch_leads(BATCH_LEAD_COUNT));
    }

    #[test]
    fn offer_letter_uses_placeholders_and_plain_text() {
        let req = offer_letter("duplex", "$100k-$120k");
        let prompt = req.prompt_text();
        for token in ["[Seller Name]", "[Your Name]", "[Your Phone]", "[Your Email]"] {
            assert!(prompt.contains(token), "missing {token}");
        }
        assert!(req.generation_config.is_none());
    }

    #[test]
    fn batch_requests_exact_count_as_array() {
        let req = batch_leads(BATCH_LEAD_COUNT);
        assert!(req.prompt_text().contains("exactly 5 items"));
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(value["generationConfig"]["responseSchema"]["type"], "ARRAY");
    }

    #[test]
    fn market_trends_lists_every_sale() {
        let sales = vec![
            ComparableSale {
                price: Decimal::from(250_000),
                date: NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
            },
            ComparableSale {
                price: Decimal::from(262_500),
                date: NaiveDate::from_ymd_opt(2024, 3, 2).unwrap(),
            },
        ];
        let prompt = market_trends(&sales).prompt_text();
        assert!(prompt.contains("$250000 on 2024-01-15"));
        assert!(prompt.contains("$262500 on 2024-03-02"));
        assert!(prompt.contains("Recommendation: stable"));
    }

    #[test]
    fn base64_image_accepts_data_url_prefix() {
        let img = ImageAttachment::from_base64("image/png", "data:image/png;base64,iVBORw==")
            .unwrap();
        assert_eq!(img.data, "iVBORw==");
        assert!(ImageAttachment::from_base64("image/png", "***").is_err());
        assert_eq!(ImageAttachment::mime_for_extension("PNG"), "image/png");
    }
}
