//! Lead storage command handlers: county import, listing, live watch and the
//! offline ROI calculator.

use std::path::Path;

use anyhow::Context;
use dealdesk_core::{
    aggregate_status_counts, compute_profit_and_roi, CountyRecord, Lead, NewLead,
};
use dealdesk_store::Gateway;
use rust_decimal::Decimal;

const DETAILS_DISPLAY_CHARS: usize = 50;

pub(crate) fn read_county_records(path: &Path) -> anyhow::Result<Vec<CountyRecord>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let records: Vec<CountyRecord> = serde_json::from_str(&raw)
        .with_context(|| format!("{} is not a JSON array of county records", path.display()))?;
    if let Some(index) = records.iter().position(|r| r.address.trim().is_empty()) {
        anyhow::bail!("record {index} in {} has no address", path.display());
    }
    Ok(records)
}

pub(crate) async fn run_import_county(gateway: &Gateway, file: &Path) -> anyhow::Result<()> {
    let records = read_county_records(file)?;
    if records.is_empty() {
        println!("no records in {}; nothing imported", file.display());
        return Ok(());
    }

    let total = records.len();
    for record in records {
        gateway.create_lead(NewLead::from_county(record)).await?;
    }
    println!("imported {total} county leads");
    Ok(())
}

fn format_lead_row(lead: &Lead) -> String {
    let details = lead.property_details.lines().next().unwrap_or_default();
    let details = if details.chars().count() > DETAILS_DISPLAY_CHARS {
        format!(
            "{}...",
            details.chars().take(DETAILS_DISPLAY_CHARS).collect::<String>()
        )
    } else {
        details.to_string()
    };
    let source = match lead.source {
        Some(dealdesk_core::LeadSource::County) => "county",
        Some(dealdesk_core::LeadSource::Ai) => "ai",
        None => "-",
    };
    format!(
        "{:<38}{:<16}{:<8}{}",
        lead.id,
        lead.effective_status().as_str(),
        source,
        details
    )
}

fn print_leads(leads: &[Lead]) {
    if leads.is_empty() {
        println!("no leads yet");
        return;
    }
    println!("{:<38}{:<16}{:<8}DETAILS", "ID", "STATUS", "SOURCE");
    for lead in leads {
        println!("{}", format_lead_row(lead));
    }
    let counts = aggregate_status_counts(leads)
        .into_iter()
        .map(|(status, n)| format!("{status}: {n}"))
        .collect::<Vec<_>>()
        .join(", ");
    println!("{} leads ({counts})", leads.len());
}

pub(crate) async fn run_list(gateway: &Gateway) -> anyhow::Result<()> {
    let leads = gateway.list_leads().await?;
    print_leads(&leads);
    Ok(())
}

/// Prints every snapshot until ctrl-c or until the subscription ends.
pub(crate) async fn run_watch(gateway: &Gateway) -> anyhow::Result<()> {
    let mut subscription = gateway.subscribe_leads().await?;
    loop {
        tokio::select! {
            snapshot = subscription.next_snapshot() => {
                let Some(leads) = snapshot else {
                    println!("subscription ended");
                    break;
                };
                println!("--- {} ---", chrono::Utc::now().format("%Y-%m-%d %H:%M:%S"));
                print_leads(&leads);
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }
    subscription.unsubscribe();
    Ok(())
}

pub(crate) fn run_roi(
    purchase: Decimal,
    sale: Decimal,
    closing: Decimal,
    rehab: Decimal,
    holding: Decimal,
) -> anyhow::Result<()> {
    let result = compute_profit_and_roi(purchase, sale, closing, rehab, holding)?;
    println!("Total costs: ${}", result.total_costs);
    println!("Profit:      ${}", result.profit);
    println!("ROI:         {}%", result.roi_percent.round_dp(2));
    Ok(())
}
