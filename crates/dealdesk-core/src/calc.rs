//! Derived-state calculators: deal profit/ROI and dashboard aggregates.
//!
//! Everything here is pure; callers feed in snapshots and render the output.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::Serialize;

use crate::contacts::Contact;
use crate::leads::{Lead, LeadSource, LeadStatus};
use crate::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProfitAndRoi {
    pub total_costs: Decimal,
    pub profit: Decimal,
    /// `profit / total_costs * 100`, or zero when there are no costs.
    pub roi_percent: Decimal,
}

/// Computes deal profit and return on investment.
///
/// `total_costs = purchase + closing + rehab + holding` and
/// `profit = sale - total_costs`, both exact in decimal arithmetic. When the
/// total cost is not positive the ROI is reported as zero.
///
/// # Errors
///
/// Returns [`CoreError::Overflow`] when a figure falls outside the range
/// `Decimal` can represent.
pub fn compute_profit_and_roi(
    purchase: Decimal,
    sale: Decimal,
    closing: Decimal,
    rehab: Decimal,
    holding: Decimal,
) -> Result<ProfitAndRoi, CoreError> {
    let total_costs = [closing, rehab, holding]
        .into_iter()
        .try_fold(purchase, Decimal::checked_add)
        .ok_or(CoreError::Overflow("total costs"))?;
    let profit = sale
        .checked_sub(total_costs)
        .ok_or(CoreError::Overflow("profit"))?;
    let roi_percent = if total_costs > Decimal::ZERO {
        profit
            .checked_div(total_costs)
            .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED))
            .ok_or(CoreError::Overflow("roi"))?
    } else {
        Decimal::ZERO
    };

    Ok(ProfitAndRoi {
        total_costs,
        profit,
        roi_percent,
    })
}

/// Counts leads per status; a lead without a status counts as `New`.
///
/// Statuses with no leads are absent from the map.
#[must_use]
pub fn aggregate_status_counts<'a, I>(leads: I) -> BTreeMap<LeadStatus, usize>
where
    I: IntoIterator<Item = &'a Lead>,
{
    let mut counts = BTreeMap::new();
    for lead in leads {
        *counts.entry(lead.effective_status()).or_insert(0) += 1;
    }
    counts
}

/// A map marker for a lead with known coordinates.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapPin {
    pub lead_id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub label: String,
    pub status: LeadStatus,
}

const PIN_LABEL_MAX_CHARS: usize = 60;

/// Leads with both coordinates, in snapshot order.
#[must_use]
pub fn map_pins(leads: &[Lead]) -> Vec<MapPin> {
    leads
        .iter()
        .filter_map(|lead| {
            let coords = lead.coordinates()?;
            Some(MapPin {
                lead_id: lead.id.clone(),
                latitude: coords.latitude,
                longitude: coords.longitude,
                label: truncate_label(&lead.property_details),
                status: lead.effective_status(),
            })
        })
        .collect()
}

fn truncate_label(text: &str) -> String {
    let first_line = text.lines().next().unwrap_or_default().trim();
    if first_line.chars().count() <= PIN_LABEL_MAX_CHARS {
        return first_line.to_string();
    }
    let mut label: String = first_line.chars().take(PIN_LABEL_MAX_CHARS).collect();
    label.push('…');
    label
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardSummary {
    pub total_leads: usize,
    pub analyzed_leads: usize,
    pub county_leads: usize,
    pub total_contacts: usize,
    pub status_counts: BTreeMap<LeadStatus, usize>,
    pub pins: Vec<MapPin>,
}

#[must_use]
pub fn summarize_dashboard(leads: &[Lead], contacts: &[Contact]) -> DashboardSummary {
    DashboardSummary {
        total_leads: leads.len(),
        analyzed_leads: leads
            .iter()
            .filter(|l| l.generated_results.is_some())
            .count(),
        county_leads: leads
            .iter()
            .filter(|l| l.source == Some(LeadSource::County))
            .count(),
        total_contacts: contacts.len(),
        status_counts: aggregate_status_counts(leads),
        pins: map_pins(leads),
    }
}
