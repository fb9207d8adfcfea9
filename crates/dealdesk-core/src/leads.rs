//! Lead ("idea") domain types.
//!
//! Field names follow the document-store wire format (camelCase), so the same
//! types serialize into stored documents and deserialize out of snapshots.

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::CoreError;

/// Workflow status of a lead, in pipeline order.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum LeadStatus {
    #[default]
    New,
    Contacted,
    #[serde(rename = "Offer Made")]
    OfferMade,
    #[serde(rename = "Under Contract")]
    UnderContract,
    Sold,
}

impl LeadStatus {
    pub const ALL: [LeadStatus; 5] = [
        LeadStatus::New,
        LeadStatus::Contacted,
        LeadStatus::OfferMade,
        LeadStatus::UnderContract,
        LeadStatus::Sold,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            LeadStatus::New => "New",
            LeadStatus::Contacted => "Contacted",
            LeadStatus::OfferMade => "Offer Made",
            LeadStatus::UnderContract => "Under Contract",
            LeadStatus::Sold => "Sold",
        }
    }
}

impl std::fmt::Display for LeadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LeadStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LeadStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| CoreError::InvalidStatus(s.to_string()))
    }
}

/// Where a lead came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LeadSource {
    Ai,
    County,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

/// Structured investment analysis returned by the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Analysis {
    pub summary: String,
    pub offer_range: String,
    pub buyer_profiles: Vec<String>,
    pub seller_outreach_angles: Vec<String>,
    pub due_diligence_checklist: Vec<String>,
}

/// One synthetic lead from a batch-generation response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedLead {
    pub property_details: String,
    pub latitude: f64,
    pub longitude: f64,
    pub generated_results: Analysis,
}

/// A public-record row for bulk county import.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CountyRecord {
    pub address: String,
    pub tax_amount: Decimal,
    pub property_type: String,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
}

/// A single comparable sale used for market-trend commentary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComparableSale {
    pub price: Decimal,
    pub date: NaiveDate,
}

/// A persisted lead as read back from a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lead {
    pub id: String,
    pub owner_id: String,
    pub property_details: String,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    /// JSON-serialized [`Analysis`]; absent for imported leads.
    #[serde(default)]
    pub generated_results: Option<String>,
    #[serde(default)]
    pub status: Option<LeadStatus>,
    #[serde(default)]
    pub source: Option<LeadSource>,
    #[serde(default)]
    pub tax_amount: Option<Decimal>,
    #[serde(default)]
    pub property_type: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl Lead {
    /// Status with documents that predate the field counted as `New`.
    #[must_use]
    pub fn effective_status(&self) -> LeadStatus {
        self.status.unwrap_or_default()
    }

    #[must_use]
    pub fn coordinates(&self) -> Option<Coordinates> {
        match (self.latitude, self.longitude) {
            (Some(latitude), Some(longitude)) => Some(Coordinates {
                latitude,
                longitude,
            }),
            _ => None,
        }
    }

    /// Decodes `generated_results`, if present.
    ///
    /// # Errors
    ///
    /// Returns the `serde_json` error when the stored text is not a valid analysis.
    pub fn analysis(&self) -> Result<Option<Analysis>, serde_json::Error> {
        self.generated_results
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
    }
}

/// Fields supplied by the caller when creating a lead. The store assigns
/// `id`, `ownerId` and `timestamp`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewLead {
    pub property_details: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generated_results: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<LeadStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<LeadSource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tax_amount: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub property_type: Option<String>,
}

impl NewLead {
    /// Builds a lead from user input plus the model's analysis.
    ///
    /// # Errors
    ///
    /// Returns the `serde_json` error if the analysis cannot be serialized.
    pub fn from_analysis(
        property_details: impl Into<String>,
        coordinates: Option<Coordinates>,
        analysis: &Analysis,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            property_details: property_details.into(),
            latitude: coordinates.map(|c| c.latitude),
            longitude: coordinates.map(|c| c.longitude),
            generated_results: Some(serde_json::to_string(analysis)?),
            source: Some(LeadSource::Ai),
            ..Self::default()
        })
    }

    /// # Errors
    ///
    /// Returns the `serde_json` error if the analysis cannot be serialized.
    pub fn from_generated(lead: &GeneratedLead) -> Result<Self, serde_json::Error> {
        Self::from_analysis(
            lead.property_details.clone(),
            Some(Coordinates {
                latitude: lead.latitude,
                longitude: lead.longitude,
            }),
            &lead.generated_results,
        )
    }

    #[must_use]
    pub fn from_county(record: CountyRecord) -> Self {
        Self {
            property_details: record.address,
            latitude: record.latitude,
            longitude: record.longitude,
            source: Some(LeadSource::County),
            tax_amount: Some(record.tax_amount),
            property_type: Some(record.property_type),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_analysis() -> Analysis {
        Analysis {
            summary: "Solid flip candidate".to_string(),
            offer_range: "$180k-$200k".to_string(),
            buyer_profiles: vec!["Flipper".to_string(), "Landlord".to_string()],
            seller_outreach_angles: vec!["Quick close".to_string()],
            due_diligence_checklist: vec!["Roof".to_string(), "Title".to_string()],
        }
    }

    #[test]
    fn status_uses_display_spelling_on_the_wire() {
        let json = serde_json::to_string(&LeadStatus::UnderContract).unwrap();
        assert_eq!(json, "\"Under Contract\"");
        let parsed: LeadStatus = serde_json::from_str("\"Offer Made\"").unwrap();
        assert_eq!(parsed, LeadStatus::OfferMade);
    }

    #[test]
    fn status_from_str_is_case_insensitive() {
        assert_eq!("sold".parse::<LeadStatus>().unwrap(), LeadStatus::Sold);
        assert_eq!(
            " under contract ".parse::<LeadStatus>().unwrap(),
            LeadStatus::UnderContract
        );
        assert!("Closed".parse::<LeadStatus>().is_err());
    }

    #[test]
    fn analysis_uses_camel_case_keys() {
        let value = serde_json::to_value(sample_analysis()).unwrap();
        assert!(value.get("offerRange").is_some());
        assert!(value.get("sellerOutreachAngles").is_some());
        assert!(value.get("dueDiligenceChecklist").is_some());
    }

    #[test]
    fn new_lead_from_analysis_embeds_serialized_results() {
        let analysis = sample_analysis();
        let lead = NewLead::from_analysis(
            "3 bed ranch",
            Some(Coordinates {
                latitude: 40.0,
                longitude: -75.0,
            }),
            &analysis,
        )
        .unwrap();
        assert_eq!(lead.source, Some(LeadSource::Ai));
        assert_eq!(lead.latitude, Some(40.0));
        let decoded: Analysis =
            serde_json::from_str(lead.generated_results.as_deref().unwrap()).unwrap();
        assert_eq!(decoded, analysis);
    }

    #[test]
    fn new_lead_from_county_has_no_analysis() {
        let lead = NewLead::from_county(CountyRecord {
            address: "12 Elm St".to_string(),
            tax_amount: Decimal::new(245_000, 2),
            property_type: "Single Family".to_string(),
            latitude: None,
            longitude: None,
        });
        assert_eq!(lead.source, Some(LeadSource::County));
        assert!(lead.generated_results.is_none());
        assert_eq!(lead.property_type.as_deref(), Some("Single Family"));
    }

    #[test]
    fn new_lead_omits_absent_optionals() {
        let value = serde_json::to_value(NewLead {
            property_details: "duplex".to_string(),
            ..NewLead::default()
        })
        .unwrap();
        let obj = value.as_object().unwrap();
        assert_eq!(obj.len(), 1);
        assert!(obj.contains_key("propertyDetails"));
    }

    #[test]
    fn lead_without_status_defaults_to_new() {
        let lead: Lead = serde_json::from_value(serde_json::json!({
            "id": "abc",
            "ownerId": "u1",
            "propertyDetails": "lot",
            "timestamp": "2025-01-01T00:00:00Z"
        }))
        .unwrap();
        assert_eq!(lead.status, None);
        assert_eq!(lead.effective_status(), LeadStatus::New);
        assert!(lead.analysis().unwrap().is_none());
        assert!(lead.coordinates().is_none());
    }
}
