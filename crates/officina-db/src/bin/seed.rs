//! # Demo Ledger Generator
//!
//! Populates a database with a small workshop ledger for development.
//!
//! ## Usage
//! ```bash
//! # Seed ./officina_dev.db
//! cargo run -p officina-db --bin seed
//!
//! # Specify database path
//! cargo run -p officina-db --bin seed -- --db ./data/ledger.db
//!
//! # More logging
//! RUST_LOG=debug cargo run -p officina-db --bin seed
//! ```
//!
//! ## Generated Ledger
//! - Three clients: a private customer, an insurer paying by bank transfer
//!   with a credit limit, and an exporter with a declaration of intent
//! - One completed work order per scenario, each invoiced
//! - A deposit applied, a FIFO payment, a partial credit note
//! - A revenue report for the month, printed as JSON

use chrono::{Duration, Utc};
use officina_core::allocation::AllocationStrategy;
use officina_core::invoice::InvoiceRequest;
use officina_core::{
    BillingProfile, CreditLimitPolicy, FiscalConfig, LineType, Money, PartUsage, PaymentMethod, VatRegime,
    WorkOrderItem, WorkOrderSnapshot, WorkOrderStatus,
};
use officina_core::credit_note::CreditLineRequest;
use officina_db::repository::work_order::labor_item;
use officina_db::{Database, DbConfig, DepositRequest, NewDeclaration, PaymentRequest};
use std::env;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn client(id: &str, name: &str) -> BillingProfile {
    BillingProfile {
        id: id.to_string(),
        display_name: name.to_string(),
        tax_id: None,
        address: Some("Via Po 12, Torino".to_string()),
        billing_address: None,
        default_vat_rate_bps: None,
        default_discount_bps: 0,
        payment_terms_days: None,
        vat_regime: VatRegime::Ordinary,
        vat_exempt: false,
        vat_exemption_code: None,
        split_payment: false,
        credit_limit_cents: None,
        credit_limit_policy: CreditLimitPolicy::Warn,
        preferred_payment_method: None,
    }
}

fn work_order(id: &str, client_id: &str, items: Vec<WorkOrderItem>, parts: Vec<PartUsage>) -> WorkOrderSnapshot {
    WorkOrderSnapshot {
        id: id.to_string(),
        client_id: client_id.to_string(),
        status: WorkOrderStatus::Completed,
        claim_number: None,
        items,
        parts,
    }
}

fn part(code: &str, description: &str, quantity_hundredths: i64, unit_price_cents: i64) -> PartUsage {
    PartUsage {
        part_code: code.to_string(),
        description: description.to_string(),
        quantity_hundredths,
        unit_price_cents,
        vat_rate_bps: None,
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn"));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();
    let mut db_path = String::from("./officina_dev.db");

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Officina Demo Ledger Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -d, --db <PATH>    Database file path (default: ./officina_dev.db)");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    init_tracing();

    let config = FiscalConfig::from_env()?;
    let db = Database::new(DbConfig::new(&db_path)).await?;
    info!(path = %db_path, "Seeding demo ledger");

    if db.clients().get_by_id("rossi").await?.is_some() {
        println!("⚠ Database already holds the demo ledger.");
        println!("  Delete the database file to regenerate.");
        return Ok(());
    }

    let today = Utc::now().date_naive();

    // -------------------------------------------------------------------------
    // Clients
    // -------------------------------------------------------------------------
    db.clients().insert(&client("rossi", "Mario Rossi")).await?;

    let mut insurer = client("assicura", "Assicura Spa");
    insurer.tax_id = Some("IT09876543210".to_string());
    insurer.payment_terms_days = Some(60);
    insurer.preferred_payment_method = Some(PaymentMethod::BankTransfer);
    insurer.credit_limit_cents = Some(50_000);
    db.clients().insert(&insurer).await?;

    let mut exporter = client("export", "Export Meccanica Srl");
    exporter.tax_id = Some("IT01122334455".to_string());
    db.clients().insert(&exporter).await?;
    db.declarations()
        .register(NewDeclaration {
            client_id: "export".to_string(),
            protocol_number: "24010100001-000001".to_string(),
            declaration_date: today - Duration::days(30),
            amount_limit: Money::from_cents(1_000_000),
            expiry_date: today + Duration::days(300),
        })
        .await?;

    // -------------------------------------------------------------------------
    // Work orders
    // -------------------------------------------------------------------------
    db.work_orders()
        .insert(&work_order(
            "wo-service",
            "rossi",
            vec![labor_item("Tagliando 30.000 km", 150, 4_500)],
            vec![part("FO-118", "Filtro olio", 100, 1_250), part("OL-5W30", "Olio 5W30", 450, 1_100)],
        ))
        .await?;

    let mut claim = work_order(
        "wo-claim",
        "rossi",
        vec![
            labor_item("Sostituzione paraurti", 300, 4_500),
            WorkOrderItem {
                item_type: LineType::Service,
                description: "Verniciatura".to_string(),
                quantity_hundredths: 100,
                unit_price_cents: 28_000,
            },
        ],
        vec![part("PA-220", "Paraurti anteriore", 100, 21_000)],
    );
    claim.claim_number = Some("SIN-2026-0042".to_string());
    db.work_orders().insert(&claim).await?;

    db.work_orders()
        .insert(&work_order(
            "wo-fleet",
            "export",
            vec![labor_item("Revisione flotta", 800, 4_000)],
            Vec::new(),
        ))
        .await?;

    println!("✓ Clients, declaration and work orders created");

    // -------------------------------------------------------------------------
    // Ledger
    // -------------------------------------------------------------------------
    let deposit = db
        .deposits()
        .create_deposit(DepositRequest {
            client_id: "rossi".to_string(),
            work_order_id: Some("wo-service".to_string()),
            amount: Money::from_cents(5_000),
            method: PaymentMethod::Cash,
            deposit_date: today,
            reference: None,
            notes: Some("Acconto alla consegna".to_string()),
        })
        .await?;

    let invoicing = db.invoicing(&config);

    let service = invoicing
        .build_from_work_order("wo-service", InvoiceRequest::on(today))
        .await?;
    for pending in &service.pending_deposits {
        db.deposits()
            .apply_deposit(&pending.id, &service.invoice.id, today)
            .await?;
    }
    println!("✓ {} {} (deposit {} applied)", service.invoice.invoice_number, service.invoice.total(), deposit.amount());

    let mut claim_request = InvoiceRequest::on(today);
    claim_request.bill_to_client_id = Some("assicura".to_string());
    let claim = invoicing.build_from_work_order("wo-claim", claim_request).await?;
    println!(
        "✓ {} {} billed to {}{}",
        claim.invoice.invoice_number,
        claim.invoice.total(),
        claim.invoice.bill_to_name,
        if claim.credit_warning.is_some() { " (over credit limit)" } else { "" }
    );

    let fleet = invoicing.build_from_work_order("wo-fleet", InvoiceRequest::on(today)).await?;
    println!("✓ {} {} under declaration of intent", fleet.invoice.invoice_number, fleet.invoice.total());

    let payment = db
        .payments()
        .record_payment(PaymentRequest {
            client_id: "assicura".to_string(),
            amount: Money::from_cents(40_000),
            payment_date: today,
            method: PaymentMethod::BankTransfer,
            reference: Some(claim.invoice.payment_reference.clone()),
            notes: None,
            strategy: AllocationStrategy::Fifo,
        })
        .await?;
    println!(
        "✓ Payment {} allocated, {} unallocated",
        Money::from_cents(payment.allocated_cents),
        Money::from_cents(payment.unallocated_cents)
    );

    if let Some(line) = fleet.invoice.lines.first() {
        let note = db
            .credit_notes()
            .reverse_partial(
                &fleet.invoice.id,
                &[CreditLineRequest {
                    source_line_id: line.id.clone(),
                    quantity_hundredths: 100,
                }],
                "Ora non eseguita",
                today,
            )
            .await?;
        println!("✓ {} {}", note.credit_note_number, note.total());
    }

    // -------------------------------------------------------------------------
    // Report
    // -------------------------------------------------------------------------
    let report = db
        .reports()
        .revenue_report(today - Duration::days(31), today)
        .await?;
    println!();
    println!("{}", serde_json::to_string_pretty(&report)?);

    db.close().await;
    Ok(())
}
