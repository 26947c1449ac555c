//! Example detecting card testing.
//!
//! Fraudsters validate stolen cards with bursts of small purchases, each on
//! a different card. This example shows how to:
//! - Combine velocity, diversity and amount features over a short window
//! - Score a normal user and an attacker with the same feature set

use std::time::Duration;

use chrono::{DateTime, Utc};
use featstore::{Context, Event, FeatureVector, Feature, Sliding, Store, StoreConfig, aggregate};

fn main() -> featstore::Result<()> {
    println!("featstore card testing example");

    let five_minutes = Sliding::new(Duration::from_secs(300));
    let store = Store::new(StoreConfig {
        ttl: Duration::from_secs(24 * 3600),
        features: vec![
            Feature::new("tx_velocity", aggregate::velocity(Duration::from_secs(3600)))
                .with_window(five_minutes),
            Feature::new("tx_count_5min", aggregate::count()).with_window(five_minutes),
            Feature::new("unique_cards_ratio", aggregate::unique_ratio("card_last4"))
                .with_window(five_minutes),
            Feature::new("distinct_cards", aggregate::count_distinct("card_last4"))
                .with_window(five_minutes),
            Feature::new("avg_amount_5min", aggregate::mean("amount")).with_window(five_minutes),
            Feature::new("max_amount_5min", aggregate::max("amount")).with_window(five_minutes),
            Feature::new("card_entropy", aggregate::entropy("card_last4")).with_window(five_minutes),
        ],
        storage: None,
    })?;
    let ctx = Context::background();
    let now = Utc::now();

    // Normal user: three purchases on one card
    let normal = [(4, 45.99), (2, 12.50), (0, 89.00)]
        .map(|(minutes_ago, amount)| purchase(now, minutes_ago * 60, amount, "1234"));
    store.push(&ctx, "user_normal", normal)?;

    // Attacker: fifteen $1-5 purchases, twenty seconds apart, fifteen cards
    let attack = (0..15i64).map(|i| {
        let card = format!("{:04}", 1000 + i);
        purchase(now, 300 - i * 20, 1.0 + (i % 4) as f64, &card)
    });
    store.push(&ctx, "user_fraudster", attack)?;

    for user in ["user_normal", "user_fraudster"] {
        let features = store.get_at(&ctx, user, now)?;
        println!("\n{user}");
        print_features(&features);
        println!("  verdict: {}", verdict(&features));
    }

    store.close()
}

fn purchase(now: DateTime<Utc>, seconds_ago: i64, amount: f64, card: &str) -> Event {
    Event::new(now - chrono::Duration::seconds(seconds_ago))
        .with("amount", amount)
        .with("card_last4", card)
}

fn print_features(features: &FeatureVector) {
    let mut names: Vec<_> = features.iter().collect();
    names.sort_by(|a, b| a.0.cmp(b.0));
    for (name, value) in names {
        println!("  {name:<20} {:?}", value);
    }
}

fn verdict(features: &FeatureVector) -> &'static str {
    let count = features.int_or("tx_count_5min", 0);
    let ratio = features.float_or("unique_cards_ratio", 0.0);
    let max_amount = features.float_or("max_amount_5min", 0.0);

    if count >= 10 && ratio > 0.8 && max_amount < 10.0 {
        "BLOCK: card testing pattern"
    } else if count >= 5 && ratio > 0.5 {
        "REVIEW: unusual card diversity"
    } else {
        "ALLOW"
    }
}
