//! Example building a leakage-free training set.
//!
//! This example shows how to:
//! - Push a labelled transaction history
//! - Compute each row's features as of just before its transaction
//! - See what goes wrong when features are computed as of "now"

use std::time::Duration;

use chrono::{TimeZone, Utc};
use featstore::{Context, Event, Feature, Sliding, Store, StoreConfig, aggregate};

fn main() -> featstore::Result<()> {
    println!("featstore point-in-time example");

    let hour = Duration::from_secs(3600);
    let store = Store::new(StoreConfig {
        ttl: Duration::from_secs(7 * 24 * 3600),
        features: vec![
            Feature::new("tx_count_1h", aggregate::count()).with_window(Sliding::new(hour)),
            Feature::new("tx_sum_1h", aggregate::sum("amount")).with_window(Sliding::new(hour)),
        ],
        storage: None,
    })?;
    let ctx = Context::background();
    let user = "user_789";

    // (hour, minute, amount, is_fraud)
    let history = [
        (10, 0, 50.0, false),
        (10, 30, 75.0, false),
        (11, 0, 100.0, false),
        (11, 15, 500.0, true),
        (11, 20, 600.0, true),
    ];
    let transactions: Vec<(Event, f64, bool)> = history
        .iter()
        .filter_map(|&(h, m, amount, fraud)| {
            let ts = Utc.with_ymd_and_hms(2024, 1, 1, h, m, 0).single()?;
            Some((Event::new(ts).with("amount", amount), amount, fraud))
        })
        .collect();

    store.push(&ctx, user, transactions.iter().map(|(e, _, _)| e.clone()))?;

    println!("\nTraining rows (features as of 1 ms before each transaction):\n");
    println!("{:<20} | {:>7} | {:>8} | {:>7} | label", "timestamp", "amount", "tx_count", "tx_sum");
    println!("{}", "-".repeat(60));

    for (event, amount, fraud) in &transactions {
        let at = event.instant() - chrono::Duration::milliseconds(1);
        let features = store.get_at(&ctx, user, at)?;
        println!(
            "{:<20} | {:>7.0} | {:>8} | {:>7.0} | {}",
            event.instant().format("%Y-%m-%d %H:%M:%S"),
            amount,
            features.int_or("tx_count_1h", -1),
            features.float_or("tx_sum_1h", -1.0),
            if *fraud { "FRAUD" } else { "legit" },
        );
    }

    // Evaluating every row at the end of the history leaks the future:
    // every row would carry the same totals, including the fraud itself.
    let end = Utc.with_ymd_and_hms(2024, 1, 1, 11, 30, 0).single();
    if let Some(end) = end {
        let leaked = store.get_at(&ctx, user, end)?;
        println!(
            "\nWithout point-in-time queries every row would show tx_count={}, tx_sum={:.0}",
            leaked.int_or("tx_count_1h", -1),
            leaked.float_or("tx_sum_1h", -1.0),
        );
    }

    store.close()
}
