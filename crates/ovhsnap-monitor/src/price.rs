// SPDX-FileCopyrightText: 2026 Ovhsnap Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Long-lived price cache for availability notifications.
//!
//! Prices move rarely, so quotes are cached for days keyed by the plan and
//! its sorted option set. Pricing is strictly best-effort: a missing or slow
//! quote never blocks an alert.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use ovhsnap_core::Price;

/// Cached quote lifetime.
pub const PRICE_CACHE_TTL: Duration = Duration::from_secs(3 * 24 * 3600);

/// Budget for one live quote before the alert goes out without a price.
pub const PRICE_QUOTE_TIMEOUT: Duration = Duration::from_secs(30);

/// Cache key: plan code plus the sorted option set.
pub fn price_key(plan_code: &str, options: &[String]) -> String {
    let mut sorted: Vec<&str> = options.iter().map(String::as_str).collect();
    sorted.sort_unstable();
    format!("{plan_code}|{}", sorted.join(","))
}

pub struct PriceCache {
    ttl: Duration,
    inner: Mutex<HashMap<String, (Price, Instant)>>,
}

impl Default for PriceCache {
    fn default() -> Self {
        Self::new()
    }
}

impl PriceCache {
    pub fn new() -> Self {
        Self::with_ttl(PRICE_CACHE_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl,
            inner: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, key: &str) -> Option<Price> {
        let mut inner = self.inner.lock().expect("price cache poisoned");
        match inner.get(key) {
            Some((price, at)) if at.elapsed() < self.ttl => Some(price.clone()),
            Some(_) => {
                inner.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn insert(&self, key: String, price: Price) {
        self.inner
            .lock()
            .expect("price cache poisoned")
            .insert(key, (price, Instant::now()));
    }
}

/// Human-readable monthly price line.
pub fn format_price(price: &Price) -> String {
    let symbol = match price.currency_code.as_str() {
        "EUR" => "€".to_string(),
        "USD" => "$".to_string(),
        other => format!("{other} "),
    };
    format!("{symbol}{:.2}/month", price.with_tax)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn price(with_tax: f64, currency: &str) -> Price {
        Price {
            with_tax,
            without_tax: with_tax,
            tax: 0.0,
            currency_code: currency.into(),
        }
    }

    #[test]
    fn key_is_order_insensitive() {
        let a = price_key("p", &["x".into(), "y".into()]);
        let b = price_key("p", &["y".into(), "x".into()]);
        assert_eq!(a, b);
        assert_eq!(price_key("p", &[]), "p|");
    }

    #[test]
    fn cache_hits_within_ttl() {
        let cache = PriceCache::new();
        cache.insert("p|".into(), price(50.0, "EUR"));
        assert_eq!(cache.get("p|").unwrap().with_tax, 50.0);
        assert!(cache.get("q|").is_none());
    }

    #[test]
    fn cache_expires() {
        let cache = PriceCache::with_ttl(Duration::from_millis(0));
        cache.insert("p|".into(), price(50.0, "EUR"));
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get("p|").is_none());
    }

    #[test]
    fn price_formatting_by_currency() {
        assert_eq!(format_price(&price(50.0, "EUR")), "€50.00/month");
        assert_eq!(format_price(&price(64.5, "USD")), "$64.50/month");
        assert_eq!(format_price(&price(70.0, "CAD")), "CAD 70.00/month");
    }
}
