//! # Seed Data Generator
//!
//! Populates a database with a demo pharmacy for development.
//!
//! ## Usage
//! ```bash
//! # One pharmacy, 200 products (default)
//! cargo run -p rxstock-db --bin seed
//!
//! # Custom amount and path
//! cargo run -p rxstock-db --bin seed -- --count 1000 --db ./data/rxstock.db
//! ```
//!
//! ## Generated Data
//! - A pharmacy with alert settings and a verified owner
//! - Products across a few therapeutic groups, barcodes `890{index}`
//! - One to three batches per product, some near expiry, some already past
//! - A handful of confirmed sales so the usage ledger is not empty

use chrono::{Duration, Utc};
use rxstock_core::{NewSale, PharmacyContext, PharmacySettings, SaleLine, StockIntake};
use rxstock_db::{Database, DbConfig, NewPharmacyProduct, NewUser};
use std::env;

/// Product groups for realistic test data
const GROUPS: &[(&str, &[&str])] = &[
    (
        "ANL",
        &["Paracetamol 500mg", "Ibuprofen 400mg", "Aspirin 100mg", "Naproxen 250mg", "Diclofenac Gel"],
    ),
    (
        "ABX",
        &["Amoxicillin 500mg", "Azithromycin 250mg", "Ciprofloxacin 500mg", "Doxycycline 100mg"],
    ),
    (
        "GIT",
        &["Omeprazole 20mg", "Loperamide 2mg", "Oral Rehydration Salts", "Ranitidine 150mg"],
    ),
    (
        "RSP",
        &["Cetirizine 10mg", "Loratadine 10mg", "Salbutamol Inhaler", "Cough Syrup 100ml"],
    ),
    (
        "VIT",
        &["Vitamin C 1000mg", "Vitamin D3 1000IU", "Multivitamin", "Iron + Folic Acid", "Zinc 20mg"],
    ),
];

/// Pack sizes and the price added for each.
const PACKS: &[(&str, i64)] = &[("x10", 0), ("x20", 150), ("x30", 300)];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    let mut count: usize = 200;
    let mut db_path = String::from("./rxstock_dev.db");

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--count" | "-c" => {
                if i + 1 < args.len() {
                    count = args[i + 1].parse().unwrap_or(200);
                    i += 1;
                }
            }
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("RxStock Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -c, --count <N>    Number of products to generate (default: 200)");
                println!("  -d, --db <PATH>    Database file path (default: ./rxstock_dev.db)");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    println!("RxStock Seed Data Generator");
    println!("===========================");
    println!("Database: {}", db_path);
    println!("Products: {}", count);
    println!();

    let db = Database::new(DbConfig::new(&db_path)).await?;
    println!("✓ Connected to database, migrations applied");

    let existing = db.pharmacies().ids().await?;
    if !existing.is_empty() {
        println!("⚠ Database already has {} pharmacies", existing.len());
        println!("  Skipping seed to avoid duplicates.");
        println!("  Delete the database file to regenerate.");
        return Ok(());
    }

    let pharmacy_id = db.pharmacies().create("Demo Pharmacy").await?;
    db.pharmacies()
        .save_settings(&PharmacySettings {
            low_stock_threshold: 15,
            expiry_alert_days: 45,
            notify_by_email: true,
            ..PharmacySettings::defaults_for(pharmacy_id)
        })
        .await?;
    let user_id = db
        .pharmacies()
        .add_user(
            pharmacy_id,
            NewUser {
                username: "owner".to_string(),
                email: Some("owner@demo-pharmacy.test".to_string()),
                email_verified: true,
            },
        )
        .await?;
    let ctx = PharmacyContext::new(pharmacy_id, user_id);
    println!("✓ Pharmacy {} created", pharmacy_id);

    println!();
    println!("Generating products and batches...");

    let today = Utc::now().date_naive();
    let start = std::time::Instant::now();
    let mut generated = 0;
    let mut batches = 0;
    let mut barcodes = Vec::new();

    'outer: for (group_idx, (group, names)) in GROUPS.iter().enumerate() {
        for (name_idx, name) in names.iter().enumerate() {
            for (pack_idx, (pack, price_addon)) in PACKS.iter().enumerate() {
                if generated >= count {
                    break 'outer;
                }

                let seed = group_idx * 1000 + name_idx * 20 + pack_idx;
                let barcode = format!("890{:010}", seed);
                let product = NewPharmacyProduct {
                    barcode: barcode.clone(),
                    name: format!("{} {} ({})", name, pack, group),
                    price_cents: 99 + ((seed * 37) % 1500) as i64 + price_addon,
                };

                if let Err(e) = db.products().link(pharmacy_id, product).await {
                    eprintln!("Failed to link {}: {}", barcode, e);
                    continue;
                }

                // Expiries spread from 10 days ago to two years out
                for lot in 0..(1 + seed % 3) {
                    let offset = ((seed * 53 + lot * 211) % 740) as i64 - 10;
                    let intake = StockIntake {
                        barcode: barcode.clone(),
                        quantity: 5 + ((seed + lot * 7) % 60) as i64,
                        expiry_date: Some(today + Duration::days(offset)),
                    };
                    db.stock().add_stock_by_barcode(&ctx, intake).await?;
                    batches += 1;
                }

                barcodes.push(barcode);
                generated += 1;

                if generated % 50 == 0 {
                    println!("  Generated {} products...", generated);
                }
            }
        }
    }

    let elapsed = start.elapsed();
    println!();
    println!("✓ Generated {} products, {} batches in {:?}", generated, batches, elapsed);

    println!();
    println!("Confirming sample sales...");
    let mut sold = 0;
    for chunk in barcodes.chunks(3).take(10) {
        let sale = NewSale {
            items: chunk.iter().map(|b| SaleLine::new(b.clone(), 2)).collect(),
            amount_given_cents: 100_000,
            description: Some("Seed sale".to_string()),
        };
        match db.sale_service().confirm_sale(&ctx, sale).await {
            Ok(_) => sold += 1,
            Err(e) => eprintln!("  Sale skipped: {}", e),
        }
    }
    println!("  {} sales confirmed", sold);

    let expired = db.sweeps().sweep_expired().await?;
    let low = db.sweeps().evaluate_low_stock(pharmacy_id).await?;
    println!(
        "  Sweeps: {} batches expired, {} low-stock alerts opened",
        expired.batches_expired, low.alerts_opened
    );

    println!();
    println!("✓ Seed complete!");

    Ok(())
}
