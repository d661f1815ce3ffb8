//! Pro-rata billing maths.
//!
//! Recurring charges run on fixed cycle days (1st, 5th, 15th, 25th). An
//! activation mid-cycle is charged pro-rata up to the next cycle day in the
//! following month. All arithmetic is integer cents.

use chrono::{Datelike, NaiveDate};

/// The recurring-charge days of month, in order.
pub const BILLING_CYCLE_DAYS: [u32; 4] = [1, 5, 15, 25];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProRata {
    pub amount_cents: i64,
    pub days: i64,
    pub next_billing_date: NaiveDate,
    pub billing_cycle_day: u32,
}

/// Compute the pro-rata charge for a service activating on `activation_date`
/// with the given monthly amount.
pub fn prorata_for_activation(monthly_amount_cents: i64, activation_date: NaiveDate) -> ProRata {
    let day = activation_date.day();

    let billing_cycle_day = if day <= 1 {
        1
    } else if day <= 5 {
        5
    } else if day <= 15 {
        15
    } else if day <= 25 {
        25
    } else {
        1
    };

    let (next_year, next_month) = if activation_date.month() == 12 {
        (activation_date.year() + 1, 1)
    } else {
        (activation_date.year(), activation_date.month() + 1)
    };
    // Cycle days all exist in every month, so this cannot fail.
    let next_billing_date =
        NaiveDate::from_ymd_opt(next_year, next_month, billing_cycle_day).expect("valid cycle day");

    let days = (next_billing_date - activation_date).num_days();
    let days_in_month = days_in_month(activation_date.year(), activation_date.month());

    // Round to the nearest cent: amount = monthly * days / days_in_month.
    let amount_cents = (monthly_amount_cents * days + days_in_month / 2) / days_in_month;

    ProRata {
        amount_cents,
        days,
        next_billing_date,
        billing_cycle_day,
    }
}

fn days_in_month(year: i32, month: u32) -> i64 {
    let (ny, nm) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    let first_next = NaiveDate::from_ymd_opt(ny, nm, 1).expect("valid first of month");
    let first = NaiveDate::from_ymd_opt(year, month, 1).expect("valid first of month");
    (first_next - first).num_days()
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn activation_on_the_first_charges_a_full_month() {
        let p = prorata_for_activation(69_900, date(2025, 11, 1));
        assert_eq!(p.billing_cycle_day, 1);
        assert_eq!(p.next_billing_date, date(2025, 12, 1));
        assert_eq!(p.days, 30);
        assert_eq!(p.amount_cents, 69_900, "30/30 days is the full month");
    }

    #[test]
    fn mid_month_activation_lands_on_the_15th_cycle() {
        let p = prorata_for_activation(69_900, date(2025, 11, 10));
        assert_eq!(p.billing_cycle_day, 15);
        assert_eq!(p.next_billing_date, date(2025, 12, 15));
        assert_eq!(p.days, 35);
    }

    #[test]
    fn late_month_activation_rolls_to_the_first() {
        let p = prorata_for_activation(69_900, date(2025, 11, 26));
        assert_eq!(p.billing_cycle_day, 1);
        assert_eq!(p.next_billing_date, date(2025, 12, 1));
        assert_eq!(p.days, 5);
        // 69900 * 5 / 30 = 11650
        assert_eq!(p.amount_cents, 11_650);
    }

    #[test]
    fn december_activation_crosses_the_year_boundary() {
        let p = prorata_for_activation(49_900, date(2025, 12, 20));
        assert_eq!(p.billing_cycle_day, 25);
        assert_eq!(p.next_billing_date, date(2026, 1, 25));
    }

    #[test]
    fn amounts_round_to_the_nearest_cent() {
        // Oct 22 → Nov 25 is 34 days over a 31-day month:
        // 99900 * 34 / 31 = 109567.74…, rounds to 109568.
        let p = prorata_for_activation(99_900, date(2025, 10, 22));
        assert_eq!(p.billing_cycle_day, 25);
        assert_eq!(p.days, 34);
        assert_eq!(p.amount_cents, 109_568);
    }
}
