use super::error::EngineError;
use super::types::{FilingStatus, round_cents};

/// Reference tables are stated in base-year dollars and compounded forward by
/// the configured inflation rate.
pub const BASE_TAX_YEAR: u32 = 2018;

const SINGLE_STANDARD_DEDUCTION: f64 = 12_000.0;
const MARRIED_STANDARD_DEDUCTION: f64 = 24_000.0;

/// (bracket ceiling, marginal rate), ascending; the last ceiling is open.
const SINGLE_BRACKETS: [(f64, f64); 7] = [
    (9_525.0, 0.10),
    (38_700.0, 0.12),
    (82_500.0, 0.22),
    (157_500.0, 0.24),
    (200_000.0, 0.32),
    (500_000.0, 0.35),
    (f64::INFINITY, 0.37),
];

const MARRIED_BRACKETS: [(f64, f64); 7] = [
    (19_050.0, 0.10),
    (77_400.0, 0.12),
    (165_000.0, 0.22),
    (315_000.0, 0.24),
    (400_000.0, 0.32),
    (600_000.0, 0.35),
    (f64::INFINITY, 0.37),
];

// Provisional-income thresholds for Social Security benefit taxation.
// These are fixed in statute and not inflation-indexed.
const SINGLE_SS_TIERS: (f64, f64) = (25_000.0, 34_000.0);
const MARRIED_SS_TIERS: (f64, f64) = (32_000.0, 44_000.0);

fn inflation_factor(tax_year: u32, inflation_rate: f64) -> f64 {
    let years = tax_year as i32 - BASE_TAX_YEAR as i32;
    (1.0 + inflation_rate).powi(years)
}

pub fn standard_deduction(
    filing_status: FilingStatus,
    tax_year: u32,
    inflation_rate: f64,
) -> Result<f64, EngineError> {
    if !inflation_rate.is_finite() {
        return Err(EngineError::NonFinite {
            context: "standard deduction inflation rate",
        });
    }
    let base = match filing_status {
        FilingStatus::Single => SINGLE_STANDARD_DEDUCTION,
        FilingStatus::MarriedJoint => MARRIED_STANDARD_DEDUCTION,
    };
    Ok(base * inflation_factor(tax_year, inflation_rate))
}

/// Progressive federal tax on taxable income: each inflation-adjusted bracket
/// slice is taxed at its marginal rate. Rounded to cents once at the end.
pub fn federal_income_tax(
    taxable_income: f64,
    filing_status: FilingStatus,
    tax_year: u32,
    inflation_rate: f64,
) -> Result<f64, EngineError> {
    if !taxable_income.is_finite() {
        return Err(EngineError::NonFinite {
            context: "federal tax taxable income",
        });
    }
    if !inflation_rate.is_finite() {
        return Err(EngineError::NonFinite {
            context: "federal tax inflation rate",
        });
    }

    let taxable = taxable_income.max(0.0);
    let factor = inflation_factor(tax_year, inflation_rate);
    let brackets = match filing_status {
        FilingStatus::Single => &SINGLE_BRACKETS,
        FilingStatus::MarriedJoint => &MARRIED_BRACKETS,
    };

    let mut tax = 0.0;
    let mut previous_ceiling = 0.0;
    for (ceiling, rate) in brackets {
        let ceiling = ceiling * factor;
        let slice = (taxable.min(ceiling) - previous_ceiling).max(0.0);
        tax += slice * rate;
        if taxable <= ceiling {
            break;
        }
        previous_ceiling = ceiling;
    }
    Ok(round_cents(tax))
}

/// Taxable share of combined Social Security benefits under the tiered
/// provisional-income rules. Never exceeds 85% of total benefits.
pub fn social_security_taxable_amount(
    total_benefits: f64,
    other_taxable_income: f64,
    filing_status: FilingStatus,
) -> Result<f64, EngineError> {
    if !total_benefits.is_finite() {
        return Err(EngineError::NonFinite {
            context: "social security total benefits",
        });
    }
    if !other_taxable_income.is_finite() {
        return Err(EngineError::NonFinite {
            context: "social security other taxable income",
        });
    }

    let benefits = total_benefits.max(0.0);
    if benefits == 0.0 {
        return Ok(0.0);
    }

    let (tier1, tier2) = match filing_status {
        FilingStatus::Single => SINGLE_SS_TIERS,
        FilingStatus::MarriedJoint => MARRIED_SS_TIERS,
    };
    let provisional = other_taxable_income.max(0.0) + 0.5 * benefits;

    let taxable = if provisional <= tier1 {
        0.0
    } else if provisional <= tier2 {
        (0.5 * benefits).min(0.5 * (provisional - tier1))
    } else {
        (0.85 * benefits).min(0.5 * (tier2 - tier1) + 0.85 * (provisional - tier2))
    };

    Ok(taxable.min(0.85 * benefits).max(0.0))
}

/// Splits a combined taxable amount between the two beneficiaries in
/// proportion to each party's share of gross benefits.
pub fn apportion_ss_taxable(
    taxable_total: f64,
    subject_gross: f64,
    partner_gross: f64,
) -> (f64, f64) {
    let combined = subject_gross + partner_gross;
    if combined <= 0.0 {
        return (0.0, 0.0);
    }
    let subject_share = taxable_total * (subject_gross / combined);
    (subject_share, taxable_total - subject_share)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::{prop_assert, proptest};

    const EPS: f64 = 1e-6;

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= EPS,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn standard_deduction_compounds_from_base_year() {
        let d = standard_deduction(FilingStatus::MarriedJoint, BASE_TAX_YEAR + 2, 0.03).unwrap();
        assert_approx(d, 24_000.0 * 1.03 * 1.03);
        let single = standard_deduction(FilingStatus::Single, BASE_TAX_YEAR, 0.0).unwrap();
        assert_approx(single, 12_000.0);
    }

    #[test]
    fn standard_deduction_rejects_non_finite_inflation() {
        let err = standard_deduction(FilingStatus::Single, 2025, f64::NAN).expect_err("must fail");
        assert!(matches!(err, EngineError::NonFinite { .. }));
    }

    #[test]
    fn federal_tax_first_bracket_only() {
        let tax = federal_income_tax(10_000.0, FilingStatus::MarriedJoint, BASE_TAX_YEAR, 0.0)
            .unwrap();
        assert_approx(tax, 1_000.0);
    }

    #[test]
    fn federal_tax_walks_brackets_in_base_year() {
        // MFJ 100,000: 19,050 @ 10% + 58,350 @ 12% + 22,600 @ 22%.
        let tax = federal_income_tax(100_000.0, FilingStatus::MarriedJoint, BASE_TAX_YEAR, 0.0)
            .unwrap();
        assert_approx(tax, 1_905.0 + 7_002.0 + 4_972.0);
    }

    #[test]
    fn federal_tax_rounds_to_cents_at_the_end() {
        let tax =
            federal_income_tax(1_234.567, FilingStatus::Single, BASE_TAX_YEAR, 0.0).unwrap();
        assert_eq!(tax, round_cents(1_234.567 * 0.10));
    }

    #[test]
    fn federal_tax_zero_for_zero_or_negative_income() {
        for income in [0.0, -5_000.0] {
            let tax =
                federal_income_tax(income, FilingStatus::Single, BASE_TAX_YEAR, 0.02).unwrap();
            assert_eq!(tax, 0.0);
        }
    }

    #[test]
    fn federal_tax_rejects_nan_income() {
        let err = federal_income_tax(f64::NAN, FilingStatus::Single, 2025, 0.02)
            .expect_err("must fail");
        assert!(matches!(err, EngineError::NonFinite { .. }));
    }

    #[test]
    fn ss_below_tier_one_is_untaxed() {
        // Provisional 10,000 + 20,000 = 30,000 <= 32,000.
        let taxable =
            social_security_taxable_amount(40_000.0, 10_000.0, FilingStatus::MarriedJoint)
                .unwrap();
        assert_eq!(taxable, 0.0);
    }

    #[test]
    fn ss_between_tiers_uses_half_formula() {
        // Provisional 20,000 + 20,000 = 40,000; taxable = min(20,000, 4,000).
        let taxable =
            social_security_taxable_amount(40_000.0, 20_000.0, FilingStatus::MarriedJoint)
                .unwrap();
        assert_approx(taxable, 4_000.0);
    }

    #[test]
    fn ss_above_tier_two_caps_at_formula_minimum() {
        // Provisional 30,000 + 20,000 = 50,000; taxable = min(34,000, 6,000 + 5,100).
        let taxable =
            social_security_taxable_amount(40_000.0, 30_000.0, FilingStatus::MarriedJoint)
                .unwrap();
        assert_approx(taxable, 11_100.0);
    }

    #[test]
    fn ss_single_filer_uses_lower_tiers() {
        // Provisional 10,000 + 10,000 = 20,000 <= 25,000 for single.
        let taxable =
            social_security_taxable_amount(20_000.0, 10_000.0, FilingStatus::Single).unwrap();
        assert_eq!(taxable, 0.0);
        // Provisional 30,000 > 25,000, between tiers: min(10,000, 2,500).
        let taxable =
            social_security_taxable_amount(20_000.0, 20_000.0, FilingStatus::Single).unwrap();
        assert_approx(taxable, 2_500.0);
    }

    #[test]
    fn ss_rejects_nan_benefits() {
        let err = social_security_taxable_amount(f64::NAN, 10_000.0, FilingStatus::Single)
            .expect_err("must fail");
        assert!(matches!(err, EngineError::NonFinite { .. }));
    }

    #[test]
    fn apportionment_follows_gross_benefit_shares() {
        let (subject, partner) = apportion_ss_taxable(11_100.0, 30_000.0, 10_000.0);
        assert_approx(subject, 11_100.0 * 0.75);
        assert_approx(partner, 11_100.0 * 0.25);
        assert_eq!(apportion_ss_taxable(5_000.0, 0.0, 0.0), (0.0, 0.0));
    }

    proptest! {
        #[test]
        fn prop_ss_taxable_bounded_by_85_percent(
            benefits in 0u32..250_000,
            other in 0u32..500_000
        ) {
            for filing in [FilingStatus::Single, FilingStatus::MarriedJoint] {
                let taxable = social_security_taxable_amount(
                    benefits as f64,
                    other as f64,
                    filing,
                ).unwrap();
                prop_assert!(taxable >= 0.0);
                prop_assert!(taxable <= 0.85 * benefits as f64 + 1e-9);
            }
        }

        #[test]
        fn prop_federal_tax_monotone_in_income(
            lower in 0u32..1_000_000,
            bump in 0u32..200_000,
            inflation_bp in 0u32..600,
            year_offset in 0u32..40
        ) {
            let inflation = inflation_bp as f64 / 10_000.0;
            let year = BASE_TAX_YEAR + year_offset;
            for filing in [FilingStatus::Single, FilingStatus::MarriedJoint] {
                let low = federal_income_tax(lower as f64, filing, year, inflation).unwrap();
                let high = federal_income_tax((lower + bump) as f64, filing, year, inflation).unwrap();
                prop_assert!(high + 1e-9 >= low);
            }
        }

        #[test]
        fn prop_ss_taxable_monotone_in_other_income(
            benefits in 1u32..100_000,
            other in 0u32..300_000,
            bump in 0u32..100_000
        ) {
            let low = social_security_taxable_amount(
                benefits as f64, other as f64, FilingStatus::MarriedJoint).unwrap();
            let high = social_security_taxable_amount(
                benefits as f64, (other + bump) as f64, FilingStatus::MarriedJoint).unwrap();
            prop_assert!(high + 1e-9 >= low);
        }
    }
}
