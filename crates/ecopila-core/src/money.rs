//! # Money Module
//!
//! Provides the `Money` type and the `ExchangeRate` used to move amounts
//! between dollars and pesos.
//!
//! ## Why Integer Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │    0.1 + 0.2 = 0.30000000000000004  ❌ WRONG!                           │
//! │                                                                         │
//! │  A price list goes through IVA, margin, the dollar rate and then a     │
//! │  "resto" rounding step. Each float step drifts a little; by the end    │
//! │  two machines can disagree on the public price.                        │
//! │                                                                         │
//! │  OUR SOLUTION: Integer Cents + i128 intermediate math                  │
//! │    12.50 USD × 1.21 × 1.30 × 1050.00 ARS/USD                           │
//! │    = 1250 × 12100/10000 × 13000/10000 × 105000/100  (all integers)     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! `Money` carries no currency tag. Field names say which currency applies
//! (`precio_publico_us_cents` vs `precio_publico_cents`).
//!
//! ## Usage
//! ```rust
//! use ecopila_core::money::{ExchangeRate, Money};
//!
//! let costo_usd = Money::from_cents(1250);           // US$ 12.50
//! let dolar = ExchangeRate::from_centavos(105_000);  // $1050,00 por dólar
//! let costo_ars = dolar.to_pesos(costo_usd);
//! assert_eq!(costo_ars.cents(), 1_312_500);          // $13.125,00
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Mul, Sub, SubAssign};
use ts_rs::TS;

use crate::types::{Percent, TaxRate};

/// Divides rounding half away from zero.
///
/// Every scaled multiplication in this crate goes through here so that all
/// call sites round the same way.
#[inline]
pub(crate) fn div_round(numerator: i128, denominator: i128) -> i128 {
    let half = denominator.abs() / 2;
    let magnitude = (numerator.abs() + half) / denominator.abs();
    if (numerator < 0) ^ (denominator < 0) {
        -magnitude
    } else {
        magnitude
    }
}

/// Parses a decimal string into an integer scaled by `10^decimals`.
///
/// Accepts either `.` or `,` as the decimal separator (the last one found
/// wins) and ignores `$` and whitespace. Digits beyond `decimals` are
/// rounded half-up on the first dropped digit.
pub(crate) fn parse_fixed(input: &str, decimals: u32) -> Option<i64> {
    let cleaned: String = input
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '$')
        .collect();
    if cleaned.is_empty() {
        return None;
    }

    let (negative, body) = match cleaned.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, cleaned.as_str()),
    };

    let (int_part, frac_part) = match body.rfind(['.', ',']) {
        Some(pos) => (&body[..pos], &body[pos + 1..]),
        None => (body, ""),
    };

    if int_part.is_empty() && frac_part.is_empty() {
        return None;
    }
    if !int_part.chars().all(|c| c.is_ascii_digit())
        || !frac_part.chars().all(|c| c.is_ascii_digit())
    {
        return None;
    }

    let whole: i64 = if int_part.is_empty() {
        0
    } else {
        int_part.parse().ok()?
    };

    let mut digits = frac_part.chars().map(|c| c as i64 - '0' as i64);
    let mut scaled = whole.checked_mul(10_i64.checked_pow(decimals)?)?;
    for place in (0..decimals).rev() {
        scaled += digits.next().unwrap_or(0) * 10_i64.pow(place);
    }
    if digits.next().map(|d| d >= 5).unwrap_or(false) {
        scaled += 1;
    }

    Some(if negative { -scaled } else { scaled })
}

// =============================================================================
// Money Type
// =============================================================================

/// A monetary value in the smallest currency unit (cents / centavos).
///
/// ## Where Money is Used
/// ```text
/// ┌─────────────────────────────────────────────────────────────────────────┐
/// │  precio_sin_iva (USD) ──► + IVA ──► costo_dolares ──► + margen         │
/// │                                                           │             │
/// │                                           precio_publico_us (USD)      │
/// │                                                           │ × dólar     │
/// │                                                           ▼             │
/// │                                   precio_sin_redondear (ARS)           │
/// │                                                           │ resto       │
/// │                                                           ▼             │
/// │                                   precio_publico (ARS) ──► Cart, PDF   │
/// └─────────────────────────────────────────────────────────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from cents.
    ///
    /// ## Example
    /// ```rust
    /// use ecopila_core::money::Money;
    ///
    /// let price = Money::from_cents(1099);
    /// assert_eq!(price.cents(), 1099);
    /// ```
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Creates a Money value from whole units (pesos or dollars).
    #[inline]
    pub const fn from_units(units: i64) -> Self {
        Money(units * 100)
    }

    /// Converts a decimal amount coming from the REST API.
    ///
    /// The server speaks JSON numbers; this is the only place a float is
    /// turned into Money. Never use it for arithmetic.
    pub fn from_decimal(value: f64) -> Self {
        if !value.is_finite() {
            return Money::zero();
        }
        Money((value * 100.0).round() as i64)
    }

    /// Returns the amount as a decimal for the REST API.
    #[inline]
    pub fn to_decimal(&self) -> f64 {
        self.0 as f64 / 100.0
    }

    /// Parses a decimal string such as `"12.5"`, `"$ 1234,50"` or `"-3"`.
    ///
    /// Digits beyond the second decimal are rounded half-up.
    ///
    /// ## Example
    /// ```rust
    /// use ecopila_core::money::Money;
    ///
    /// assert_eq!(Money::parse_decimal("$12.50"), Some(Money::from_cents(1250)));
    /// assert_eq!(Money::parse_decimal("7,125"), Some(Money::from_cents(713)));
    /// assert_eq!(Money::parse_decimal("abc"), None);
    /// ```
    pub fn parse_decimal(input: &str) -> Option<Money> {
        parse_fixed(input, 2).map(Money)
    }

    /// Returns the value in cents.
    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Returns the whole-unit portion.
    #[inline]
    pub const fn units(&self) -> i64 {
        self.0 / 100
    }

    /// Returns the cents portion (always 0-99).
    #[inline]
    pub const fn cents_part(&self) -> i64 {
        (self.0 % 100).abs()
    }

    /// Returns zero money value.
    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Adds IVA to a net amount: `amount × (1 + iva)`.
    ///
    /// ## Example
    /// ```rust
    /// use ecopila_core::money::Money;
    /// use ecopila_core::types::TaxRate;
    ///
    /// let neto = Money::from_cents(1000);
    /// assert_eq!(neto.with_tax(TaxRate::from_bps(2100)).cents(), 1210);
    /// ```
    pub fn with_tax(&self, rate: TaxRate) -> Money {
        let scaled = div_round(self.0 as i128 * (10_000 + rate.bps() as i128), 10_000);
        Money(scaled as i64)
    }

    /// Removes IVA from a gross amount: `amount ÷ (1 + iva)`.
    pub fn without_tax(&self, rate: TaxRate) -> Money {
        let scaled = div_round(self.0 as i128 * 10_000, 10_000 + rate.bps() as i128);
        Money(scaled as i64)
    }

    /// Applies a margin on top of a cost: `amount × (1 + margin)`.
    pub fn with_margin(&self, margin: Percent) -> Money {
        let scaled = div_round(self.0 as i128 * (10_000 + margin.bps() as i128), 10_000);
        Money(scaled as i64)
    }

    /// Multiplies money by a quantity.
    #[inline]
    pub const fn multiply_quantity(&self, qty: i64) -> Self {
        Money(self.0 * qty)
    }

    /// Rounds up to the next multiple of `increment` whole units.
    ///
    /// This is the "resto" step of the price list: with a resto of 50,
    /// $1.012,30 becomes $1.050,00. An increment of zero or less rounds up
    /// to the next whole unit. Values already on a multiple are unchanged.
    ///
    /// ## Example
    /// ```rust
    /// use ecopila_core::money::Money;
    ///
    /// let p = Money::from_cents(101_230);
    /// assert_eq!(p.round_up_to(50).cents(), 105_000);
    /// assert_eq!(p.round_up_to(0).cents(), 101_300);
    /// assert_eq!(Money::from_cents(100_000).round_up_to(50).cents(), 100_000);
    /// ```
    pub fn round_up_to(&self, increment: i64) -> Money {
        let step = if increment > 0 { increment.saturating_mul(100) } else { 100 };
        if self.0 <= 0 {
            return *self;
        }
        let remainder = self.0 % step;
        if remainder == 0 {
            *self
        } else {
            Money((self.0 - remainder).saturating_add(step))
        }
    }

    /// Formats with Argentine conventions: `$1.234,50`.
    ///
    /// ## Example
    /// ```rust
    /// use ecopila_core::money::Money;
    ///
    /// assert_eq!(Money::from_cents(123_450).format_ars(), "$1.234,50");
    /// assert_eq!(Money::from_cents(-500).format_ars(), "-$5,00");
    /// ```
    pub fn format_ars(&self) -> String {
        let sign = if self.0 < 0 { "-" } else { "" };
        let units = self.units().unsigned_abs().to_string();

        let mut grouped = String::with_capacity(units.len() + units.len() / 3);
        for (i, ch) in units.chars().enumerate() {
            if i > 0 && (units.len() - i) % 3 == 0 {
                grouped.push('.');
            }
            grouped.push(ch);
        }

        format!("{}${},{:02}", sign, grouped, self.cents_part())
    }
}

// =============================================================================
// Exchange Rate
// =============================================================================

/// Pesos per dollar, in centavos (105_000 = $1050,00 per US$ 1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ExchangeRate(i64);

impl ExchangeRate {
    #[inline]
    pub const fn from_centavos(centavos: i64) -> Self {
        ExchangeRate(centavos)
    }

    /// Converts the decimal rate returned by `/dolar/dolar`.
    pub fn from_decimal(value: f64) -> Self {
        ExchangeRate(Money::from_decimal(value).cents())
    }

    #[inline]
    pub const fn centavos(&self) -> i64 {
        self.0
    }

    /// The rate as Money (the price of one dollar in pesos).
    #[inline]
    pub const fn as_money(&self) -> Money {
        Money(self.0)
    }

    /// A rate of zero or less cannot price anything.
    #[inline]
    pub const fn is_valid(&self) -> bool {
        self.0 > 0
    }

    /// Converts a dollar amount into pesos.
    pub fn to_pesos(&self, usd: Money) -> Money {
        Money(div_round(usd.0 as i128 * self.0 as i128, 100) as i64)
    }

    /// Converts a peso amount into dollars.
    ///
    /// Returns zero for an invalid rate instead of dividing by zero;
    /// callers that care check [`ExchangeRate::is_valid`] first.
    pub fn to_dollars(&self, ars: Money) -> Money {
        if !self.is_valid() {
            return Money::zero();
        }
        Money(div_round(ars.0 as i128 * 100, self.0 as i128) as i64)
    }
}

impl fmt::Display for ExchangeRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_money().format_ars())
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Debug-friendly display (`$1234.50`). UI text goes through
/// [`Money::format_ars`].
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(f, "{}${}.{:02}", sign, self.units().abs(), self.cents_part())
    }
}

impl Default for Money {
    fn default() -> Self {
        Money::zero()
    }
}

impl Add for Money {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Money(self.0 + other.0)
    }
}

impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0 - other.0)
    }
}

impl SubAssign for Money {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        self.0 -= other.0;
    }
}

impl Mul<i64> for Money {
    type Output = Self;

    #[inline]
    fn mul(self, qty: i64) -> Self {
        Money(self.0 * qty)
    }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), Add::add)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_div_round_half_away_from_zero() {
        assert_eq!(div_round(5, 10), 1);
        assert_eq!(div_round(4, 10), 0);
        assert_eq!(div_round(-5, 10), -1);
        assert_eq!(div_round(-4, 10), 0);
        assert_eq!(div_round(15, 10), 2);
        assert_eq!(div_round(-6, 10), -1);
        assert_eq!(div_round(-15, 10), -2);
        assert_eq!(div_round(5, -10), -1);
        assert_eq!(div_round(-5, -10), 1);
    }

    #[test]
    fn test_round_up_to_huge_increment_does_not_overflow() {
        let p = Money::from_cents(101_230);
        assert_eq!(p.round_up_to(i64::MAX).cents(), i64::MAX);
    }

    #[test]
    fn test_parse_decimal_variants() {
        assert_eq!(Money::parse_decimal("12.5"), Some(Money::from_cents(1250)));
        assert_eq!(Money::parse_decimal(" $ 3,99 "), Some(Money::from_cents(399)));
        assert_eq!(Money::parse_decimal("10"), Some(Money::from_cents(1000)));
        assert_eq!(Money::parse_decimal(".5"), Some(Money::from_cents(50)));
        assert_eq!(Money::parse_decimal("-2.25"), Some(Money::from_cents(-225)));
        assert_eq!(Money::parse_decimal("1.005"), Some(Money::from_cents(101)));
        assert_eq!(Money::parse_decimal("1.004"), Some(Money::from_cents(100)));
    }

    #[test]
    fn test_parse_fixed_scales() {
        assert_eq!(parse_fixed("1.21", 4), Some(12_100));
        assert_eq!(parse_fixed("1.105", 4), Some(11_050));
        assert_eq!(parse_fixed("35.5", 2), Some(3_550));
        assert_eq!(parse_fixed("7", 0), Some(7));
        assert_eq!(parse_fixed("7.6", 0), Some(8));
    }

    #[test]
    fn test_parse_decimal_rejects_garbage() {
        assert_eq!(Money::parse_decimal(""), None);
        assert_eq!(Money::parse_decimal("$"), None);
        assert_eq!(Money::parse_decimal("1.2.3x"), None);
        assert_eq!(Money::parse_decimal("N/A"), None);
    }

    #[test]
    fn test_from_decimal_rounds_to_cents() {
        assert_eq!(Money::from_decimal(10.994).cents(), 1099);
        assert_eq!(Money::from_decimal(10.996).cents(), 1100);
        assert_eq!(Money::from_decimal(0.1 + 0.2).cents(), 30);
        assert_eq!(Money::from_decimal(f64::NAN).cents(), 0);
    }

    #[test]
    fn test_with_and_without_tax() {
        let neto = Money::from_cents(1000);
        let iva = TaxRate::from_bps(2100);
        let bruto = neto.with_tax(iva);
        assert_eq!(bruto.cents(), 1210);
        assert_eq!(bruto.without_tax(iva).cents(), 1000);

        let reducido = TaxRate::from_bps(1050);
        assert_eq!(neto.with_tax(reducido).cents(), 1105);
    }

    #[test]
    fn test_with_margin() {
        let costo = Money::from_cents(1210);
        assert_eq!(costo.with_margin(Percent::from_bps(3000)).cents(), 1573);
        assert_eq!(costo.with_margin(Percent::zero()).cents(), 1210);
    }

    #[test]
    fn test_round_up_to_resto() {
        let p = Money::from_cents(101_230);
        assert_eq!(p.round_up_to(10).cents(), 102_000);
        assert_eq!(p.round_up_to(100).cents(), 110_000);
        assert_eq!(p.round_up_to(-3).cents(), 101_300);
        assert_eq!(Money::from_cents(101_200).round_up_to(0).cents(), 101_200);
        assert_eq!(Money::zero().round_up_to(50).cents(), 0);
    }

    #[test]
    fn test_exchange_rate_conversions() {
        let dolar = ExchangeRate::from_centavos(105_000);
        assert_eq!(dolar.to_pesos(Money::from_cents(100)).cents(), 105_000);
        assert_eq!(dolar.to_pesos(Money::from_cents(1573)).cents(), 1_651_650);
        assert_eq!(dolar.to_dollars(Money::from_cents(210_000)).cents(), 200);
    }

    #[test]
    fn test_invalid_rate_never_divides() {
        let zero = ExchangeRate::from_centavos(0);
        assert!(!zero.is_valid());
        assert_eq!(zero.to_dollars(Money::from_cents(5000)), Money::zero());
        assert!(!ExchangeRate::from_decimal(-1.0).is_valid());
    }

    #[test]
    fn test_format_ars() {
        assert_eq!(Money::from_cents(0).format_ars(), "$0,00");
        assert_eq!(Money::from_cents(99_999).format_ars(), "$999,99");
        assert_eq!(Money::from_cents(100_000).format_ars(), "$1.000,00");
        assert_eq!(Money::from_cents(123_456_789).format_ars(), "$1.234.567,89");
    }

    #[test]
    fn test_display_and_sum() {
        assert_eq!(format!("{}", Money::from_cents(1099)), "$10.99");
        assert_eq!(format!("{}", Money::from_cents(-550)), "-$5.50");
        let total: Money = [100, 250, 5].into_iter().map(Money::from_cents).sum();
        assert_eq!(total.cents(), 355);
    }
}
