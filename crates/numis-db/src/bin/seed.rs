//! # Demo Collection Generator
//!
//! Creates a collection file filled with generated coins, for development.
//!
//! ## Usage
//! ```bash
//! # Generate 1,000 coins (default)
//! cargo run -p numis-db --bin seed
//!
//! # Generate custom amount
//! cargo run -p numis-db --bin seed -- --count 5000
//!
//! # Specify collection path
//! cargo run -p numis-db --bin seed -- --db ./data/demo.db
//! ```
//!
//! Each coin gets a country, denomination, year, metal and grade drawn from
//! the tables below, and a status spread over the whole status set. Bought
//! coins carry a pay price, sold ones a sale price.

use std::env;

use chrono::NaiveDate;
use numis_core::{FieldValue, ItemStatus, Money, NewItem};
use numis_db::{DbError, Store};
use tracing_subscriber::EnvFilter;

/// Countries with their usual denominations.
const COUNTRIES: &[(&str, &[(i64, &str)])] = &[
    ("Austria", &[(1, "Schilling"), (10, "Groschen"), (1, "Euro")]),
    ("Belgium", &[(1, "Franc"), (50, "Centimes"), (2, "Euro")]),
    ("Canada", &[(1, "Dollar"), (25, "Cents"), (5, "Cents")]),
    ("France", &[(1, "Franc"), (10, "Francs"), (20, "Centimes")]),
    ("Germany", &[(1, "Mark"), (5, "Mark"), (10, "Pfennig")]),
    ("Italy", &[(100, "Lire"), (500, "Lire"), (50, "Lire")]),
    ("Japan", &[(100, "Yen"), (10, "Yen"), (1, "Yen")]),
    ("Poland", &[(1, "Zloty"), (2, "Zlote"), (10, "Groszy")]),
    ("Ukraine", &[(1, "Hryvnia"), (25, "Kopiyok"), (10, "Kopiyok")]),
    ("United States", &[(1, "Dollar"), (25, "Cents"), (10, "Cents")]),
];

const METALS: &[&str] = &["Copper", "Nickel", "Brass", "Silver", "Gold", "Aluminium", "Bimetal"];

const GRADES: &[&str] = &["F", "VF", "XF", "AU", "UNC", "BU", "Proof"];

const MINTS: &[&str] = &["Vienna", "Brussels", "Ottawa", "Paris", "Berlin", "Rome", "Osaka", "Warsaw", "Kyiv", "Philadelphia"];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,numis=debug,sqlx=warn")),
        )
        .init();

    let args: Vec<String> = env::args().collect();

    let mut count: usize = 1000;
    let mut db_path = String::from("./numis_demo.db");

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--count" | "-c" => {
                if i + 1 < args.len() {
                    count = args[i + 1].parse().unwrap_or(1000);
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
                println!("Numis Demo Collection Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -c, --count <N>    Number of coins to generate (default: 1000)");
                println!("  -d, --db <PATH>    Collection file path (default: ./numis_demo.db)");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    println!("Numis Demo Collection Generator");
    println!("===============================");
    println!("Collection: {}", db_path);
    println!("Coins:      {}", count);
    println!();

    let mut store = match Store::create(&db_path).await {
        Ok(store) => store,
        Err(DbError::AlreadyExists(_)) => {
            let mut store = Store::open(&db_path, None).await?;
            let existing = store.count().await?;
            if existing > 0 {
                println!("Collection already has {} coins", existing);
                println!("  Skipping seed to avoid duplicates.");
                println!("  Delete the collection file to regenerate.");
                store.close().await?;
                return Ok(());
            }
            store
        }
        Err(e) => return Err(e.into()),
    };

    println!("Generating coins...");
    let start = std::time::Instant::now();
    let mut generated = 0;

    for seed in 0..count {
        let coin = generate_coin(seed);
        if let Err(e) = store.insert(coin).await {
            eprintln!("Failed to insert coin #{}: {}", seed, e);
            continue;
        }
        generated += 1;

        if generated % 500 == 0 {
            println!("  Generated {} coins...", generated);
        }
    }

    store.reference().create().await?;
    store.save().await?;

    let elapsed = start.elapsed();
    println!();
    println!("Generated {} coins in {:?}", generated, elapsed);
    println!(
        "  Rate: {:.0} coins/second",
        generated as f64 / elapsed.as_secs_f64()
    );

    println!();
    let summary = store.summary().await?;
    for status in ItemStatus::ALL {
        println!("  {:<8} {}", status.as_str(), summary.count(status));
    }
    println!("  Paid:  {}", summary.total_paid);
    println!("  Sold:  {}", summary.total_sold);
    let balance = summary.balance();
    if balance.is_negative() {
        println!("  Net spent: {}", Money::zero() - balance);
    } else {
        println!("  Net gain:  {}", balance);
    }

    let countries = store.distinct_values("country").await?;
    println!("  Countries: {}", countries.values.len());

    store.close().await?;
    println!();
    println!("Seed complete!");

    Ok(())
}

/// Generates one coin from a seed number.
fn generate_coin(seed: usize) -> NewItem {
    let (country, denominations) = COUNTRIES[seed % COUNTRIES.len()];
    let (value, unit) = denominations[(seed / COUNTRIES.len()) % denominations.len()];
    let year = 1900 + (seed * 7 % 124) as i64;
    let status = ItemStatus::ALL[seed % ItemStatus::ALL.len()];

    let mut coin = NewItem::new(status)
        .with("title", FieldValue::text(format!("{} {} {}", value, unit, year)))
        .with("country", FieldValue::text(country))
        .with("unit", FieldValue::text(unit))
        .with("year", FieldValue::Integer(year))
        .with("mint", FieldValue::text(MINTS[seed % MINTS.len()]))
        .with("metal", FieldValue::text(METALS[seed % METALS.len()]))
        .with("grade", FieldValue::text(GRADES[(seed / 3) % GRADES.len()]))
        .with("value", FieldValue::Money(Money::from_cents(value * 100)))
        .with("mass", FieldValue::Real(2.0 + (seed % 30) as f64 * 0.5));

    if seed % 4 == 0 {
        coin = coin.with("mintage", FieldValue::Integer(10_000 * (1 + seed as i64 % 500)));
    }

    let price = Money::from_cents(100 + ((seed * 37) % 5000) as i64);
    let day = NaiveDate::from_ymd_opt(2000 + (seed % 24) as i32, 1 + (seed % 12) as u32, 1 + (seed % 28) as u32);

    if matches!(status, ItemStatus::Owned | ItemStatus::Sold | ItemStatus::Sale) {
        coin = coin
            .with("payprice", FieldValue::Money(price))
            .with("totalpayprice", FieldValue::Money(price));
        if let Some(day) = day {
            coin = coin.with("paydate", FieldValue::Date(day));
        }
    }
    if status == ItemStatus::Sold {
        let sale = price + Money::from_cents(250);
        coin = coin
            .with("saleprice", FieldValue::Money(sale))
            .with("totalsaleprice", FieldValue::Money(sale));
    }

    coin
}
