//! Statutory deduction schedule applied to a monthly gross pay.
//!
//! Every component is rounded to centavos before it takes part in any sum.
//! The provident fund is carved out of the SSS share and reported on its own;
//! it is not part of `total`.

use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::Serialize;
use std::str::FromStr;
use utoipa::ToSchema;

const SSS_RATE: Decimal = dec!(0.05);
const PROVIDENT_FUND_SHARE: Decimal = dec!(0.10);
const PHILHEALTH_RATE: Decimal = dec!(0.05);
const PHILHEALTH_FLOOR: Decimal = dec!(10000);
const PHILHEALTH_CEILING: Decimal = dec!(100000);
const PAGIBIG_RATE: Decimal = dec!(0.02);

/// Monthly withholding brackets: (upper bound, base tax, excess over, rate).
/// The last bracket has no upper bound.
const TAX_BRACKETS: [(Option<Decimal>, Decimal, Decimal, Decimal); 6] = [
    (Some(dec!(20833)), dec!(0), dec!(0), dec!(0)),
    (Some(dec!(33333)), dec!(0), dec!(20833), dec!(0.20)),
    (Some(dec!(66667)), dec!(2500), dec!(33333), dec!(0.25)),
    (Some(dec!(166667)), dec!(10833.33), dec!(66667), dec!(0.30)),
    (Some(dec!(666667)), dec!(40833.33), dec!(166667), dec!(0.32)),
    (None, dec!(200833.33), dec!(666667), dec!(0.35)),
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct DeductionBreakdown {
    #[schema(value_type = String, example = "2250.00")]
    pub sss: Decimal,
    #[schema(value_type = String, example = "1250.00")]
    pub philhealth: Decimal,
    #[schema(value_type = String, example = "1000.00")]
    pub pagibig: Decimal,
    #[schema(value_type = String, example = "250.00")]
    pub provident_fund: Decimal,
    #[schema(value_type = String, example = "6666.75")]
    pub tax: Decimal,
    #[schema(value_type = String, example = "11166.75")]
    pub total: Decimal,
}

impl DeductionBreakdown {
    /// Sum of every displayed statutory line, provident fund included.
    pub fn statutory_lines_total(&self) -> Decimal {
        self.sss + self.philhealth + self.pagibig + self.provident_fund + self.tax
    }
}

pub fn round2(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Lenient gross parsing: anything that is not a number counts as zero.
pub fn parse_gross(raw: &str) -> Decimal {
    Decimal::from_str(raw.trim()).unwrap_or(Decimal::ZERO)
}

pub fn compute_deductions(gross: Decimal) -> DeductionBreakdown {
    if gross <= Decimal::ZERO {
        return DeductionBreakdown::default();
    }

    let sss_initial = round2(gross * SSS_RATE);
    let provident_fund = round2(sss_initial * PROVIDENT_FUND_SHARE);
    let sss = round2(sss_initial - provident_fund);

    let philhealth_base = gross.clamp(PHILHEALTH_FLOOR, PHILHEALTH_CEILING);
    let philhealth = round2(philhealth_base * PHILHEALTH_RATE / dec!(2));

    let pagibig = round2(gross * PAGIBIG_RATE);
    let tax = withholding_tax(gross);
    let total = round2(sss + philhealth + pagibig + tax);

    DeductionBreakdown {
        sss,
        philhealth,
        pagibig,
        provident_fund,
        tax,
        total,
    }
}

/// Progressive tax on the monthly gross (not on gross net of contributions).
pub fn withholding_tax(gross: Decimal) -> Decimal {
    let gross = gross.max(Decimal::ZERO);

    for (upper, base, excess_over, rate) in TAX_BRACKETS {
        if upper.is_none_or(|limit| gross <= limit) {
            if rate.is_zero() {
                return Decimal::ZERO;
            }
            return round2(base + (gross - excess_over) * rate);
        }
    }

    Decimal::ZERO
}
