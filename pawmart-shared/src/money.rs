//! Minor-unit money arithmetic.
//!
//! All monetary amounts in the engine are `i64` cents of the canonical
//! currency. Percentage rates are `f64` fractions (0.10 == 10%) and every
//! rate application rounds half-up to the nearest cent before the next step,
//! so a reconstructed breakdown always matches the original charge.

/// Extended price of a single cart line.
pub fn line_total(unit_price_cents: i64, quantity: u32) -> i64 {
    unit_price_cents * quantity as i64
}

/// Apply a fractional rate to an amount, rounded to the nearest cent.
pub fn apply_rate(amount_cents: i64, rate: f64) -> i64 {
    (amount_cents as f64 * rate).round() as i64
}

/// Render cents as a decimal string for messages and logs.
pub fn format_cents(amount_cents: i64) -> String {
    format!("{}.{:02}", amount_cents / 100, (amount_cents % 100).abs())
}
