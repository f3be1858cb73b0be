//! The scripted purchase scenario.

use std::io::Write;

use checkout::{Checkout, Purchase, PurchaseOutcome, StateReport};
use document_store::DocumentStore;
use domain::{Money, Product};

use crate::error::Result;

pub const PRODUCT_ID: &str = "chocolate";
pub const INITIAL_STOCK: i64 = 3;

const RULE: &str = "---------------------------------------------------------------------------";

/// What the scenario produced.
#[derive(Debug, Clone)]
pub struct DemoSummary {
    /// Nofar buys 2 units without coordination.
    pub uncoordinated: PurchaseOutcome,
    /// Alex then tries to buy 3 units inside a transaction.
    pub coordinated: PurchaseOutcome,
    /// Committed state after both purchases.
    pub final_state: StateReport,
}

fn describe(outcome: &PurchaseOutcome) -> String {
    match outcome {
        PurchaseOutcome::Completed(receipt) => format!(
            "completed: {} x {} for {} ({} attempt(s))",
            receipt.quantity,
            receipt.product_id,
            receipt.total(),
            receipt.attempts
        ),
        PurchaseOutcome::Rejected(rejection) => format!("rejected: {rejection}"),
    }
}

async fn print_state<S: DocumentStore, W: Write>(
    checkout: &Checkout<S>,
    out: &mut W,
) -> Result<StateReport> {
    let report = checkout.report_state().await?;
    writeln!(out, "{report}")?;
    Ok(report)
}

/// Runs the scenario, writing the narration to `out`.
///
/// Starts from an empty store holding a single product with stock 3.
#[tracing::instrument(skip_all)]
pub async fn run_demo<S: DocumentStore, W: Write>(
    checkout: &Checkout<S>,
    out: &mut W,
) -> Result<DemoSummary> {
    checkout.ensure_schema().await?;
    checkout.reset_state().await?;
    checkout
        .stock_product(Product::new(
            PRODUCT_ID,
            INITIAL_STOCK,
            Money::from_dollars(3),
        ))
        .await?;
    print_state(checkout, out).await?;

    writeln!(out, "######### WITHOUT A TRANSACTION #########")?;
    writeln!(out, "Nofar puts 2 {PRODUCT_ID}s in their cart.")?;
    writeln!(
        out,
        "The cart write and the stock decrement are two separate writes; readers in between see a cart the stock does not account for."
    )?;
    writeln!(out, "{RULE}")?;
    let uncoordinated = checkout
        .purchase_without_coordination(Purchase::new("Nofar", PRODUCT_ID, 2))
        .await?;
    writeln!(out, "Nofar: {}", describe(&uncoordinated))?;
    writeln!(out)?;
    print_state(checkout, out).await?;

    writeln!(out, "######### WITH A TRANSACTION #########")?;
    writeln!(out, "Alex wants 3 {PRODUCT_ID}s.")?;
    writeln!(
        out,
        "Both writes run in one transaction; the stock cannot cover it, so neither write may survive."
    )?;
    writeln!(out, "{RULE}")?;
    let coordinated = checkout
        .purchase_with_transaction(Purchase::new("Alex", PRODUCT_ID, 3))
        .await?;
    writeln!(out, "Alex: {}", describe(&coordinated))?;
    if !coordinated.is_completed() {
        writeln!(out, "####### TRANSACTION ROLLED BACK #######")?;
    }
    writeln!(out)?;
    let final_state = print_state(checkout, out).await?;

    tracing::info!(
        uncoordinated = uncoordinated.is_completed(),
        coordinated = coordinated.is_completed(),
        "demo finished"
    );
    Ok(DemoSummary {
        uncoordinated,
        coordinated,
        final_state,
    })
}
