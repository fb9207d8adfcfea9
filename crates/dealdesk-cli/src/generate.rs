//! AI-backed command handlers: analysis, offer letters, batch generation and
//! market commentary.

use std::path::Path;

use anyhow::Context;
use dealdesk_ai::{GenerativeClient, ImageAttachment};
use dealdesk_core::{Analysis, AppConfig, ComparableSale, Coordinates, NewLead};
use dealdesk_store::Gateway;

pub(crate) struct AnalyzeArgs<'a> {
    pub details: &'a str,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub image: Option<&'a Path>,
    pub save: bool,
}

fn client(config: &AppConfig) -> anyhow::Result<GenerativeClient> {
    GenerativeClient::from_settings(&config.ai)
        .map_err(|e| anyhow::anyhow!("failed to build generative client: {e}"))
}

fn require_text(field: &str, value: &str) -> anyhow::Result<()> {
    if value.trim().is_empty() {
        anyhow::bail!("{field} must not be empty");
    }
    Ok(())
}

/// Reads an image file and guesses its MIME type from the extension.
pub(crate) fn load_image(path: &Path) -> anyhow::Result<ImageAttachment> {
    let bytes =
        std::fs::read(path).with_context(|| format!("failed to read image {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default();
    Ok(ImageAttachment::from_bytes(
        ImageAttachment::mime_for_extension(ext),
        &bytes,
    ))
}

pub(crate) fn read_sales(path: &Path) -> anyhow::Result<Vec<ComparableSale>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let sales: Vec<ComparableSale> = serde_json::from_str(&raw)
        .with_context(|| format!("{} is not a JSON array of sales", path.display()))?;
    if sales.is_empty() {
        anyhow::bail!("{} contains no sales", path.display());
    }
    Ok(sales)
}

fn print_list(title: &str, items: &[String]) {
    println!("{title}:");
    for item in items {
        println!("  - {item}");
    }
}

fn print_analysis(analysis: &Analysis) {
    println!("Summary: {}", analysis.summary);
    println!("Offer range: {}", analysis.offer_range);
    print_list("Buyer profiles", &analysis.buyer_profiles);
    print_list("Seller outreach", &analysis.seller_outreach_angles);
    print_list("Due diligence", &analysis.due_diligence_checklist);
}

pub(crate) async fn run_analyze(
    config: &AppConfig,
    gateway: &Gateway,
    args: AnalyzeArgs<'_>,
) -> anyhow::Result<()> {
    require_text("property details", args.details)?;
    let coordinates = match (args.lat, args.lng) {
        (Some(latitude), Some(longitude)) => Some(Coordinates {
            latitude,
            longitude,
        }),
        _ => None,
    };
    let image = args.image.map(load_image).transpose()?;

    let analysis = client(config)?
        .analyze_lead(args.details, coordinates, image.as_ref())
        .await?;
    print_analysis(&analysis);

    if args.save {
        let id = gateway
            .create_lead(NewLead::from_analysis(args.details, coordinates, &analysis)?)
            .await?;
        println!("saved lead {id}");
    }
    Ok(())
}

pub(crate) async fn run_offer_letter(
    config: &AppConfig,
    details: &str,
    offer_range: &str,
) -> anyhow::Result<()> {
    require_text("property details", details)?;
    require_text("offer range", offer_range)?;
    let letter = client(config)?
        .draft_offer_letter(details, offer_range)
        .await?;
    println!("{letter}");
    Ok(())
}

/// Generates `count` leads and saves each one. With `dry_run`, prints them
/// instead.
pub(crate) async fn run_generate(
    config: &AppConfig,
    gateway: &Gateway,
    count: usize,
    dry_run: bool,
) -> anyhow::Result<()> {
    if count == 0 {
        anyhow::bail!("count must be at least 1");
    }
    let leads = client(config)?.generate_leads(count).await?;

    if dry_run {
        println!("dry-run: generated {} leads (not saved)", leads.len());
        for lead in &leads {
            println!(
                "  {:>9.4} {:>10.4}  {}",
                lead.latitude, lead.longitude, lead.property_details
            );
        }
        return Ok(());
    }

    let new_leads = leads
        .iter()
        .map(NewLead::from_generated)
        .collect::<Result<Vec<_>, _>>()?;
    let mut saved = 0usize;
    for new_lead in new_leads {
        let id = gateway.create_lead(new_lead).await?;
        tracing::debug!(id = %id, "generated lead saved");
        saved += 1;
    }
    println!("saved {saved} of {count} requested leads");
    Ok(())
}

pub(crate) async fn run_market(config: &AppConfig, file: &Path) -> anyhow::Result<()> {
    let sales = read_sales(file)?;
    let commentary = client(config)?.analyze_market(&sales).await?;
    println!("{commentary}");
    Ok(())
}
