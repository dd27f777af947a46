//! Pure personal income-tax calculation engine.
//!
//! Everything here is deterministic arithmetic over validated reference
//! tables: progressive bracket walks, deduction math (standard, itemized
//! with SALT caps, QBI), payroll taxes (FICA and self-employment), stacked
//! long-term capital gains, and the federal/state orchestrators that route
//! by income source. No I/O; reference data is passed in by the caller.

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum TaxError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("coordination error: {0}")]
    Coordination(String),
    #[error("configuration error: {0}")]
    Configuration(String),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FilingStatus {
    Single,
    MarriedJoint,
    MarriedSeparate,
    HeadOfHousehold,
    QualifyingSurvivingSpouse,
}

impl FilingStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Single => "single",
            Self::MarriedJoint => "married_joint",
            Self::MarriedSeparate => "married_separate",
            Self::HeadOfHousehold => "head_of_household",
            Self::QualifyingSurvivingSpouse => "qualifying_surviving_spouse",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "single" => Some(Self::Single),
            "married_joint" => Some(Self::MarriedJoint),
            "married_separate" => Some(Self::MarriedSeparate),
            "head_of_household" => Some(Self::HeadOfHousehold),
            "qualifying_surviving_spouse" => Some(Self::QualifyingSurvivingSpouse),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_married(self) -> bool {
        matches!(self, Self::MarriedJoint | Self::MarriedSeparate)
    }
}

impl Display for FilingStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "snake_case")]
pub enum JurisdictionKind {
    Federal,
    State,
}

impl JurisdictionKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Federal => "federal",
            Self::State => "state",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "federal" => Some(Self::Federal),
            "state" => Some(Self::State),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "snake_case")]
pub enum IncomeSource {
    W2,
    Llc,
    SCorp,
}

impl IncomeSource {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::W2 => "w2",
            Self::Llc => "llc",
            Self::SCorp => "s_corp",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "w2" => Some(Self::W2),
            "llc" => Some(Self::Llc),
            "s_corp" | "llc_s_corp" => Some(Self::SCorp),
            _ => None,
        }
    }

    /// Unrecognized source strings resolve to W-2, the documented default.
    #[must_use]
    pub fn parse_or_default(value: &str) -> Self {
        Self::parse(value).unwrap_or(Self::W2)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DeductionMethod {
    Standard,
    Itemized,
}

impl DeductionMethod {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Itemized => "itemized",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "standard" => Some(Self::Standard),
            "itemized" => Some(Self::Itemized),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PayFrequency {
    Annual,
    Monthly,
    BiMonthly,
    BiWeekly,
    Weekly,
}

impl PayFrequency {
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "annual" => Some(Self::Annual),
            "monthly" => Some(Self::Monthly),
            "bi_monthly" => Some(Self::BiMonthly),
            "bi_weekly" => Some(Self::BiWeekly),
            "weekly" => Some(Self::Weekly),
            _ => None,
        }
    }

    /// Pay periods per year for this frequency.
    #[must_use]
    pub fn periods_per_year(self) -> f64 {
        match self {
            Self::Annual => 1.0,
            Self::Monthly => 12.0,
            Self::BiMonthly => 24.0,
            Self::BiWeekly => 26.0,
            Self::Weekly => 52.0,
        }
    }

    #[must_use]
    pub fn annualize(self, per_period_amount: f64) -> f64 {
        per_period_amount * self.periods_per_year()
    }
}

/// States with no individual income tax.
pub const NO_INCOME_TAX_STATES: [&str; 9] =
    ["AK", "FL", "NV", "NH", "SD", "TN", "TX", "WA", "WY"];

#[must_use]
pub fn state_has_income_tax(state_code: &str) -> bool {
    let upper = state_code.to_ascii_uppercase();
    !NO_INCOME_TAX_STATES.contains(&upper.as_str())
}

/// Rounds a dollar amount to cents.
#[must_use]
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BracketRow {
    pub jurisdiction: JurisdictionKind,
    pub state_code: Option<String>,
    pub filing_status: FilingStatus,
    pub tax_year: u16,
    pub bracket_min: f64,
    pub bracket_max: Option<f64>,
    pub rate: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StandardDeductionRow {
    pub jurisdiction: JurisdictionKind,
    pub state_code: Option<String>,
    pub filing_status: FilingStatus,
    pub tax_year: u16,
    pub amount: f64,
}

/// One taxed span of a progressive bracket walk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BracketSlice {
    pub bracket_min: f64,
    pub bracket_max: Option<f64>,
    pub rate: f64,
    pub taxed_amount: f64,
    pub tax: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BracketTaxOutcome {
    pub total_tax: f64,
    pub marginal_rate: f64,
    pub bracket_breakdown: Vec<BracketSlice>,
}

impl BracketTaxOutcome {
    #[must_use]
    pub fn zero() -> Self {
        Self {
            total_tax: 0.0,
            marginal_rate: 0.0,
            bracket_breakdown: Vec::new(),
        }
    }
}

/// A validated, ordered progressive bracket schedule.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BracketTable {
    rows: Vec<BracketRow>,
}

impl BracketTable {
    /// Builds a table, sorting rows by `bracket_min` and validating the
    /// partition invariant.
    ///
    /// # Errors
    /// Returns [`TaxError::Configuration`] when rows overlap, leave gaps,
    /// carry rates outside `[0, 1]`, or place an open-ended row anywhere
    /// but last.
    pub fn new(mut rows: Vec<BracketRow>) -> Result<Self, TaxError> {
        rows.sort_by(|a, b| a.bracket_min.total_cmp(&b.bracket_min));
        let table = Self { rows };
        table.validate()?;
        Ok(table)
    }

    #[must_use]
    pub fn empty() -> Self {
        Self { rows: Vec::new() }
    }

    #[must_use]
    pub fn rows(&self) -> &[BracketRow] {
        &self.rows
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn validate(&self) -> Result<(), TaxError> {
        if self.rows.is_empty() {
            return Ok(());
        }

        if self.rows[0].bracket_min != 0.0 {
            return Err(TaxError::Configuration(
                "first bracket MUST start at 0".to_string(),
            ));
        }

        for (index, row) in self.rows.iter().enumerate() {
            if !(0.0..=1.0).contains(&row.rate) {
                return Err(TaxError::Configuration(format!(
                    "bracket rate {} MUST be in [0.0, 1.0]",
                    row.rate
                )));
            }

            match row.bracket_max {
                Some(max) => {
                    if max <= row.bracket_min {
                        return Err(TaxError::Configuration(format!(
                            "bracket [{}, {max}) is empty or inverted",
                            row.bracket_min
                        )));
                    }
                    if let Some(next) = self.rows.get(index + 1) {
                        if next.bracket_min != max {
                            return Err(TaxError::Configuration(format!(
                                "brackets MUST partition income: {max} is followed by {}",
                                next.bracket_min
                            )));
                        }
                    }
                }
                None => {
                    if index + 1 != self.rows.len() {
                        return Err(TaxError::Configuration(
                            "only the last bracket may be open-ended".to_string(),
                        ));
                    }
                }
            }
        }

        Ok(())
    }

    /// Walks the schedule over `taxable_income`, accumulating tax per
    /// bracket. Non-positive income or an empty table yields a zero
    /// outcome. The marginal rate is the rate of the last bracket the
    /// income reached.
    #[must_use]
    pub fn compute(&self, taxable_income: f64) -> BracketTaxOutcome {
        if taxable_income <= 0.0 || self.rows.is_empty() {
            return BracketTaxOutcome::zero();
        }

        let mut total_tax = 0.0;
        let mut marginal_rate = 0.0;
        let mut breakdown = Vec::new();

        for row in &self.rows {
            if taxable_income <= row.bracket_min {
                break;
            }

            let span = row
                .bracket_max
                .map_or(f64::INFINITY, |max| max - row.bracket_min);
            let taxed_amount = (taxable_income - row.bracket_min).min(span);
            if taxed_amount <= 0.0 {
                continue;
            }

            let tax = taxed_amount * row.rate;
            total_tax += tax;
            marginal_rate = row.rate;
            breakdown.push(BracketSlice {
                bracket_min: row.bracket_min,
                bracket_max: row.bracket_max,
                rate: row.rate,
                taxed_amount: round2(taxed_amount),
                tax: round2(tax),
            });
        }

        BracketTaxOutcome {
            total_tax: round2(total_tax),
            marginal_rate,
            bracket_breakdown: breakdown,
        }
    }
}

/// SALT deduction cap for one filing-status group: the nominal cap, the
/// floor it phases down to, and the MAGI where the phase-out begins
/// (`None` for flat-cap regimes).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct SaltCapRule {
    pub cap: f64,
    pub floor: f64,
    pub phaseout_start: Option<f64>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct CapitalGainsTier {
    pub threshold: f64,
    pub rate: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StateSurtax {
    pub state_code: String,
    pub threshold: f64,
    pub rate: f64,
}

/// The versioned numeric rule table for one tax year. Every constant the
/// calculators consume lives here so regime differences (flat TCJA SALT
/// caps vs phased caps, presence of the QBI minimum) are data, not code
/// branches.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct YearParameters {
    pub tax_year: u16,
    pub ss_wage_base: f64,
    pub ss_rate: f64,
    pub medicare_rate: f64,
    pub additional_medicare_rate: f64,
    pub additional_medicare_threshold_joint: f64,
    pub additional_medicare_threshold_other: f64,
    pub se_income_factor: f64,
    pub se_ss_rate: f64,
    pub se_medicare_rate: f64,
    pub se_employer_factor: f64,
    pub qbi_rate: f64,
    pub qbi_threshold_single: f64,
    pub qbi_threshold_joint: f64,
    pub qbi_minimum_deduction: f64,
    pub qbi_minimum_income: f64,
    pub salt_cap_separate: SaltCapRule,
    pub salt_cap_default: SaltCapRule,
    pub salt_phaseout_rate: f64,
    pub medical_agi_threshold: f64,
    pub child_tax_credit_per_child: f64,
    pub capital_gains_tiers: BTreeMap<FilingStatus, Vec<CapitalGainsTier>>,
    pub state_surtaxes: Vec<StateSurtax>,
}

impl YearParameters {
    /// 2026 rules: phased SALT caps, the QBI minimum deduction, and the
    /// inflation-adjusted capital-gains tiers.
    #[must_use]
    pub fn v2026() -> Self {
        let mut capital_gains_tiers = BTreeMap::new();
        capital_gains_tiers.insert(
            FilingStatus::Single,
            tiers(&[(0.0, 0.0), (48_350.0, 0.15), (533_400.0, 0.20)]),
        );
        capital_gains_tiers.insert(
            FilingStatus::MarriedJoint,
            tiers(&[(0.0, 0.0), (96_700.0, 0.15), (600_050.0, 0.20)]),
        );
        capital_gains_tiers.insert(
            FilingStatus::MarriedSeparate,
            tiers(&[(0.0, 0.0), (48_350.0, 0.15), (300_025.0, 0.20)]),
        );
        capital_gains_tiers.insert(
            FilingStatus::HeadOfHousehold,
            tiers(&[(0.0, 0.0), (51_600.0, 0.15), (533_400.0, 0.20)]),
        );
        capital_gains_tiers.insert(
            FilingStatus::QualifyingSurvivingSpouse,
            tiers(&[(0.0, 0.0), (96_700.0, 0.15), (600_050.0, 0.20)]),
        );

        Self {
            tax_year: 2026,
            ss_wage_base: 175_000.0,
            ss_rate: 0.062,
            medicare_rate: 0.0145,
            additional_medicare_rate: 0.009,
            additional_medicare_threshold_joint: 250_000.0,
            additional_medicare_threshold_other: 200_000.0,
            se_income_factor: 0.9235,
            se_ss_rate: 0.124,
            se_medicare_rate: 0.029,
            se_employer_factor: 0.0765,
            qbi_rate: 0.20,
            qbi_threshold_single: 197_300.0,
            qbi_threshold_joint: 394_600.0,
            qbi_minimum_deduction: 400.0,
            qbi_minimum_income: 1_000.0,
            salt_cap_separate: SaltCapRule {
                cap: 20_000.0,
                floor: 5_000.0,
                phaseout_start: Some(250_000.0),
            },
            salt_cap_default: SaltCapRule {
                cap: 40_400.0,
                floor: 10_000.0,
                phaseout_start: Some(505_000.0),
            },
            salt_phaseout_rate: 0.30,
            medical_agi_threshold: 0.075,
            child_tax_credit_per_child: 2_200.0,
            capital_gains_tiers,
            state_surtaxes: vec![StateSurtax {
                state_code: "CA".to_string(),
                threshold: 1_000_000.0,
                rate: 0.01,
            }],
        }
    }

    /// 2024 rules: flat SALT caps with no phase-out and no QBI minimum.
    #[must_use]
    pub fn v2024() -> Self {
        let mut parameters = Self::v2026();
        parameters.tax_year = 2024;
        parameters.qbi_minimum_deduction = 0.0;
        parameters.qbi_minimum_income = 0.0;
        parameters.salt_cap_separate = SaltCapRule {
            cap: 5_000.0,
            floor: 5_000.0,
            phaseout_start: None,
        };
        parameters.salt_cap_default = SaltCapRule {
            cap: 10_000.0,
            floor: 10_000.0,
            phaseout_start: None,
        };
        parameters.state_surtaxes = Vec::new();
        parameters
    }

    /// Validates rate bounds and threshold ordering.
    ///
    /// # Errors
    /// Returns [`TaxError::Configuration`] when a rate falls outside
    /// `[0, 1]`, an amount is negative, or a SALT floor exceeds its cap.
    pub fn validate(&self) -> Result<(), TaxError> {
        if self.tax_year == 0 {
            return Err(TaxError::Configuration(
                "tax_year MUST be provided".to_string(),
            ));
        }

        for (name, value) in [
            ("ss_rate", self.ss_rate),
            ("medicare_rate", self.medicare_rate),
            ("additional_medicare_rate", self.additional_medicare_rate),
            ("se_income_factor", self.se_income_factor),
            ("se_ss_rate", self.se_ss_rate),
            ("se_medicare_rate", self.se_medicare_rate),
            ("se_employer_factor", self.se_employer_factor),
            ("qbi_rate", self.qbi_rate),
            ("salt_phaseout_rate", self.salt_phaseout_rate),
            ("medical_agi_threshold", self.medical_agi_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(TaxError::Configuration(format!(
                    "{name} MUST be in [0.0, 1.0]"
                )));
            }
        }

        for (name, value) in [
            ("ss_wage_base", self.ss_wage_base),
            ("qbi_threshold_single", self.qbi_threshold_single),
            ("qbi_threshold_joint", self.qbi_threshold_joint),
            ("qbi_minimum_deduction", self.qbi_minimum_deduction),
            ("qbi_minimum_income", self.qbi_minimum_income),
            (
                "child_tax_credit_per_child",
                self.child_tax_credit_per_child,
            ),
        ] {
            if value < 0.0 {
                return Err(TaxError::Configuration(format!("{name} MUST be >= 0")));
            }
        }

        for rule in [&self.salt_cap_separate, &self.salt_cap_default] {
            if rule.floor > rule.cap {
                return Err(TaxError::Configuration(
                    "SALT floor MUST NOT exceed its cap".to_string(),
                ));
            }
        }

        for tiers in self.capital_gains_tiers.values() {
            for pair in tiers.windows(2) {
                if pair[1].threshold <= pair[0].threshold {
                    return Err(TaxError::Configuration(
                        "capital-gains tiers MUST ascend by threshold".to_string(),
                    ));
                }
            }
        }

        Ok(())
    }

    /// Decodes and validates a parameter set from JSON.
    ///
    /// # Errors
    /// Returns [`TaxError::Configuration`] when JSON decoding fails or
    /// decoded values violate parameter constraints.
    pub fn from_json(value: &Value) -> Result<Self, TaxError> {
        let parameters: Self = serde_json::from_value(value.clone()).map_err(|err| {
            TaxError::Configuration(format!("invalid year-parameter JSON payload: {err}"))
        })?;
        parameters.validate()?;
        Ok(parameters)
    }

    #[must_use]
    pub fn salt_cap(&self, filing_status: FilingStatus) -> SaltCapRule {
        match filing_status {
            FilingStatus::MarriedSeparate => self.salt_cap_separate,
            _ => self.salt_cap_default,
        }
    }

    #[must_use]
    pub fn qbi_threshold(&self, filing_status: FilingStatus) -> f64 {
        match filing_status {
            FilingStatus::MarriedJoint | FilingStatus::QualifyingSurvivingSpouse => {
                self.qbi_threshold_joint
            }
            _ => self.qbi_threshold_single,
        }
    }

    #[must_use]
    pub fn additional_medicare_threshold(&self, filing_status: FilingStatus) -> f64 {
        if filing_status == FilingStatus::MarriedJoint {
            self.additional_medicare_threshold_joint
        } else {
            self.additional_medicare_threshold_other
        }
    }

    #[must_use]
    pub fn capital_gains_tiers(&self, filing_status: FilingStatus) -> &[CapitalGainsTier] {
        self.capital_gains_tiers
            .get(&filing_status)
            .or_else(|| self.capital_gains_tiers.get(&FilingStatus::Single))
            .map_or(&[], Vec::as_slice)
    }

    #[must_use]
    pub fn state_surtax(&self, state_code: &str) -> Option<&StateSurtax> {
        let upper = state_code.to_ascii_uppercase();
        self.state_surtaxes
            .iter()
            .find(|surtax| surtax.state_code == upper)
    }
}

fn tiers(pairs: &[(f64, f64)]) -> Vec<CapitalGainsTier> {
    pairs
        .iter()
        .map(|&(threshold, rate)| CapitalGainsTier { threshold, rate })
        .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SaltDeduction {
    pub raw: f64,
    pub effective_cap: f64,
    pub allowed: f64,
    pub disallowed: f64,
    pub phaseout_applied: bool,
}

/// Applies the filing-status SALT cap, phasing the cap down toward its
/// floor by `salt_phaseout_rate` per dollar of MAGI over the phase-out
/// start. Flat-cap regimes never phase out.
#[must_use]
pub fn salt_deduction(
    raw: f64,
    filing_status: FilingStatus,
    magi: f64,
    parameters: &YearParameters,
) -> SaltDeduction {
    let rule = parameters.salt_cap(filing_status);
    let raw = raw.max(0.0);

    let mut effective_cap = rule.cap;
    let mut phaseout_applied = false;
    if let Some(start) = rule.phaseout_start {
        if magi > start {
            effective_cap = (rule.cap - parameters.salt_phaseout_rate * (magi - start))
                .max(rule.floor);
            phaseout_applied = true;
        }
    }

    let allowed = raw.min(effective_cap);
    SaltDeduction {
        raw: round2(raw),
        effective_cap: round2(effective_cap),
        allowed: round2(allowed),
        disallowed: round2(raw - allowed),
        phaseout_applied,
    }
}

/// Medical expenses deduct only above the AGI threshold (7.5%).
#[must_use]
pub fn medical_deduction(raw: f64, agi: f64, parameters: &YearParameters) -> f64 {
    let threshold = agi.max(0.0) * parameters.medical_agi_threshold;
    round2((raw.max(0.0) - threshold).max(0.0))
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QbiDeduction {
    pub qbi_amount: f64,
    pub base_deduction: f64,
    pub income_limit: f64,
    pub deduction: f64,
    pub floor_applied: bool,
}

impl QbiDeduction {
    #[must_use]
    pub fn zero() -> Self {
        Self {
            qbi_amount: 0.0,
            base_deduction: 0.0,
            income_limit: 0.0,
            deduction: 0.0,
            floor_applied: false,
        }
    }
}

/// Section 199A deduction: 20% of QBI, limited to 20% of taxable income
/// before the deduction. Under the 2026 rules a minimum of $400 applies
/// once QBI reaches $1,000; earlier regimes zero those constants out.
#[must_use]
pub fn qbi_deduction(
    qbi_amount: f64,
    taxable_income_before_qbi: f64,
    parameters: &YearParameters,
) -> QbiDeduction {
    if qbi_amount <= 0.0 {
        return QbiDeduction::zero();
    }

    let base_deduction = qbi_amount * parameters.qbi_rate;
    let income_limit = taxable_income_before_qbi.max(0.0) * parameters.qbi_rate;
    let mut deduction = base_deduction.min(income_limit);
    let mut floor_applied = false;

    if parameters.qbi_minimum_deduction > 0.0
        && qbi_amount >= parameters.qbi_minimum_income
        && deduction < parameters.qbi_minimum_deduction
    {
        deduction = parameters.qbi_minimum_deduction;
        floor_applied = true;
    }

    QbiDeduction {
        qbi_amount: round2(qbi_amount),
        base_deduction: round2(base_deduction),
        income_limit: round2(income_limit),
        deduction: round2(deduction),
        floor_applied,
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AllocationMethod {
    Taxpayer,
    Spouse,
    Both,
    Joint,
}

impl AllocationMethod {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Taxpayer => "taxpayer",
            Self::Spouse => "spouse",
            Self::Both => "both",
            Self::Joint => "joint",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "taxpayer" => Some(Self::Taxpayer),
            "spouse" => Some(Self::Spouse),
            "both" => Some(Self::Both),
            "joint" => Some(Self::Joint),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AllocationSplit {
    pub taxpayer_amount: f64,
    pub spouse_amount: f64,
    pub taxpayer_pct: f64,
    pub spouse_pct: f64,
}

/// Splits a shared expense between spouses. `Both` requires an explicit
/// taxpayer percentage in `[0, 100]`; `Joint` splits evenly.
///
/// # Errors
/// Returns [`TaxError::Validation`] when `Both` is used without a valid
/// percentage.
pub fn allocate_shared_expense(
    total: f64,
    method: AllocationMethod,
    taxpayer_pct: Option<f64>,
) -> Result<AllocationSplit, TaxError> {
    let total = total.max(0.0);
    let pct = match method {
        AllocationMethod::Taxpayer => 100.0,
        AllocationMethod::Spouse => 0.0,
        AllocationMethod::Joint => 50.0,
        AllocationMethod::Both => {
            let pct = taxpayer_pct.ok_or_else(|| {
                TaxError::Validation(
                    "allocation method 'both' requires a taxpayer percentage".to_string(),
                )
            })?;
            if !(0.0..=100.0).contains(&pct) {
                return Err(TaxError::Validation(
                    "taxpayer percentage MUST be in [0, 100]".to_string(),
                ));
            }
            pct
        }
    };

    let taxpayer_amount = round2(total * pct / 100.0);
    Ok(AllocationSplit {
        taxpayer_amount,
        spouse_amount: round2(total - taxpayer_amount),
        taxpayer_pct: pct,
        spouse_pct: 100.0 - pct,
    })
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ItemizedInputs {
    pub medical_expenses: f64,
    pub state_local_taxes: f64,
    pub mortgage_interest: f64,
    pub charitable_contributions: f64,
}

impl ItemizedInputs {
    #[must_use]
    pub fn zero() -> Self {
        Self {
            medical_expenses: 0.0,
            state_local_taxes: 0.0,
            mortgage_interest: 0.0,
            charitable_contributions: 0.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ItemizedComputation {
    pub medical_raw: f64,
    pub medical_threshold: f64,
    pub medical_deductible: f64,
    pub salt: SaltDeduction,
    pub mortgage_interest: f64,
    pub charitable_contributions: f64,
    pub total: f64,
}

/// Totals the itemized categories after the medical AGI threshold and the
/// SALT cap. The caller compares the total against the standard deduction;
/// a confirmed election is never switched here.
#[must_use]
pub fn itemized_total(
    inputs: &ItemizedInputs,
    filing_status: FilingStatus,
    agi: f64,
    parameters: &YearParameters,
) -> ItemizedComputation {
    let medical_raw = inputs.medical_expenses.max(0.0);
    let medical_threshold = round2(agi.max(0.0) * parameters.medical_agi_threshold);
    let medical_deductible = medical_deduction(medical_raw, agi, parameters);
    let salt = salt_deduction(inputs.state_local_taxes, filing_status, agi, parameters);
    let mortgage_interest = inputs.mortgage_interest.max(0.0);
    let charitable_contributions = inputs.charitable_contributions.max(0.0);
    let total = round2(
        medical_deductible + salt.allowed + mortgage_interest + charitable_contributions,
    );

    ItemizedComputation {
        medical_raw: round2(medical_raw),
        medical_threshold,
        medical_deductible,
        salt,
        mortgage_interest: round2(mortgage_interest),
        charitable_contributions: round2(charitable_contributions),
        total,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FicaTax {
    pub social_security: f64,
    pub medicare: f64,
    pub additional_medicare: f64,
    pub total: f64,
}

/// Employee-side FICA on wage income: Social Security up to the wage base,
/// Medicare on everything, plus the additional Medicare rate over the
/// filing-status threshold.
#[must_use]
pub fn fica_tax(salary: f64, filing_status: FilingStatus, parameters: &YearParameters) -> FicaTax {
    let salary = salary.max(0.0);
    let social_security = salary.min(parameters.ss_wage_base) * parameters.ss_rate;
    let medicare = salary * parameters.medicare_rate;
    let threshold = parameters.additional_medicare_threshold(filing_status);
    let additional_medicare = (salary - threshold).max(0.0) * parameters.additional_medicare_rate;

    FicaTax {
        social_security: round2(social_security),
        medicare: round2(medicare),
        additional_medicare: round2(additional_medicare),
        total: round2(social_security + medicare + additional_medicare),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SelfEmploymentTax {
    pub taxable_base: f64,
    pub social_security: f64,
    pub medicare: f64,
    pub gross: f64,
    pub employer_half_deduction: f64,
    pub net: f64,
}

impl SelfEmploymentTax {
    #[must_use]
    pub fn zero() -> Self {
        Self {
            taxable_base: 0.0,
            social_security: 0.0,
            medicare: 0.0,
            gross: 0.0,
            employer_half_deduction: 0.0,
            net: 0.0,
        }
    }
}

/// Self-employment tax on net pass-through income: 92.35% of the income is
/// the SE base; Social Security applies up to the wage base, Medicare is
/// uncapped, and half the combined rate comes back as a deduction. Always
/// computed on gross income, independent of the QBI deduction.
#[must_use]
pub fn self_employment_tax(net_income: f64, parameters: &YearParameters) -> SelfEmploymentTax {
    if net_income <= 0.0 {
        return SelfEmploymentTax::zero();
    }

    let taxable_base = net_income * parameters.se_income_factor;
    let capped_base = taxable_base.min(parameters.ss_wage_base);
    let social_security = capped_base * parameters.se_ss_rate;
    let medicare = taxable_base * parameters.se_medicare_rate;
    let gross = social_security + medicare;
    let employer_half_deduction = capped_base * parameters.se_employer_factor;
    let net = gross - employer_half_deduction;

    SelfEmploymentTax {
        taxable_base: round2(taxable_base),
        social_security: round2(social_security),
        medicare: round2(medicare),
        gross: round2(gross),
        employer_half_deduction: round2(employer_half_deduction),
        net: round2(net),
    }
}

#[must_use]
pub fn child_tax_credit(dependents: u32, parameters: &YearParameters) -> f64 {
    round2(f64::from(dependents) * parameters.child_tax_credit_per_child)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CapitalGainsSlice {
    pub threshold_min: f64,
    pub threshold_max: Option<f64>,
    pub rate: f64,
    pub taxed_amount: f64,
    pub tax: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CapitalGainsTax {
    pub total_tax: f64,
    pub rate_applied: f64,
    pub breakdown: Vec<CapitalGainsSlice>,
}

impl CapitalGainsTax {
    #[must_use]
    pub fn zero() -> Self {
        Self {
            total_tax: 0.0,
            rate_applied: 0.0,
            breakdown: Vec::new(),
        }
    }
}

/// Long-term capital gains stacked on top of ordinary taxable income: each
/// tier taxes the portion of `[ordinary, ordinary + gains]` that falls in
/// its absolute-threshold window, and gains above the last threshold take
/// the top rate.
#[must_use]
pub fn long_term_capital_gains_tax(
    capital_gains: f64,
    ordinary_taxable: f64,
    filing_status: FilingStatus,
    parameters: &YearParameters,
) -> CapitalGainsTax {
    if capital_gains <= 0.0 {
        return CapitalGainsTax::zero();
    }

    let tiers = parameters.capital_gains_tiers(filing_status);
    if tiers.is_empty() {
        return CapitalGainsTax::zero();
    }

    let ordinary_taxable = ordinary_taxable.max(0.0);
    let total_income = ordinary_taxable + capital_gains;
    let mut total_tax = 0.0;
    let mut rate_applied: f64 = 0.0;
    let mut breakdown = Vec::new();

    for (index, tier) in tiers.iter().enumerate() {
        let window_start = tier.threshold.max(ordinary_taxable);
        let window_end = tiers
            .get(index + 1)
            .map_or(total_income, |next| next.threshold.min(total_income));
        if window_end <= window_start {
            continue;
        }

        let taxed_amount = window_end - window_start;
        let tax = taxed_amount * tier.rate;
        total_tax += tax;
        rate_applied = rate_applied.max(tier.rate);
        breakdown.push(CapitalGainsSlice {
            threshold_min: round2(window_start),
            threshold_max: if index + 1 == tiers.len() {
                None
            } else {
                Some(round2(window_end))
            },
            rate: tier.rate,
            taxed_amount: round2(taxed_amount),
            tax: round2(tax),
        });
    }

    CapitalGainsTax {
        total_tax: round2(total_tax),
        rate_applied,
        breakdown,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FederalTaxRequest {
    pub income: f64,
    pub filing_status: FilingStatus,
    pub dependents: u32,
    pub tax_year: u16,
    pub source: IncomeSource,
    pub salary: f64,
    pub distributions: f64,
}

impl FederalTaxRequest {
    /// Validates the request before any computation.
    ///
    /// # Errors
    /// Returns [`TaxError::Validation`] for S-corp requests with a
    /// non-positive salary or negative distributions.
    pub fn validate(&self) -> Result<(), TaxError> {
        if self.source == IncomeSource::SCorp {
            if self.salary <= 0.0 {
                return Err(TaxError::Validation(
                    "S-corp salary MUST be greater than zero".to_string(),
                ));
            }
            if self.distributions < 0.0 {
                return Err(TaxError::Validation(
                    "S-corp distributions MUST NOT be negative".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// Reference data resolved for one federal calculation. A missing
/// standard-deduction row stays observable as `None`; the orchestrator
/// computes with zero in that case.
#[derive(Debug, Clone)]
pub struct FederalReference {
    pub brackets: BracketTable,
    pub standard_deduction: Option<f64>,
    pub parameters: YearParameters,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FederalTaxResult {
    pub income_source: IncomeSource,
    pub filing_status: FilingStatus,
    pub tax_year: u16,
    pub gross_income: f64,
    pub standard_deduction: f64,
    pub taxable_income: f64,
    pub income_tax_before_credit: f64,
    pub income_tax_after_credit: f64,
    pub child_tax_credit: f64,
    pub child_tax_credit_applied: f64,
    pub fica_tax: f64,
    pub se_tax: f64,
    pub total_tax: f64,
    pub effective_tax_rate: f64,
    pub marginal_tax_rate: f64,
    pub bracket_breakdown: Vec<BracketSlice>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qbi: Option<QbiDeduction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub taxable_income_before_qbi: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub se_tax_breakdown: Option<SelfEmploymentTax>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fica_tax_breakdown: Option<FicaTax>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub salary: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distributions: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub salary_taxable: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distributions_taxable: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capital_gains: Option<CapitalGainsTax>,
}

/// Federal orchestrator. Routes by income source:
///
/// - W-2: standard deduction, bracket tax, child tax credit. Employer
///   withholding covers payroll tax, so no FICA is added to the liability.
/// - LLC: all income is QBI-eligible; bracket tax on post-QBI income plus
///   net self-employment tax.
/// - S-corp: the standard deduction applies to salary first and any
///   remainder rolls to distributions; QBI is computed on distributions;
///   salary bears ordinary tax, the child tax credit, and FICA; taxable
///   distributions stack as long-term capital gains on top of salary.
///
/// # Errors
/// Returns [`TaxError::Validation`] when the request is malformed.
#[allow(clippy::too_many_lines)]
pub fn compute_federal_tax(
    request: &FederalTaxRequest,
    reference: &FederalReference,
) -> Result<FederalTaxResult, TaxError> {
    request.validate()?;

    let parameters = &reference.parameters;
    let standard_deduction = reference.standard_deduction.unwrap_or(0.0);
    let credit = child_tax_credit(request.dependents, parameters);

    match request.source {
        IncomeSource::W2 => {
            let taxable_income = (request.income - standard_deduction).max(0.0);
            let outcome = reference.brackets.compute(taxable_income);
            let after_credit = (outcome.total_tax - credit).max(0.0);
            let credit_applied = credit.min(outcome.total_tax);
            let total_tax = after_credit;

            Ok(FederalTaxResult {
                income_source: request.source,
                filing_status: request.filing_status,
                tax_year: request.tax_year,
                gross_income: request.income,
                standard_deduction,
                taxable_income,
                income_tax_before_credit: outcome.total_tax,
                income_tax_after_credit: round2(after_credit),
                child_tax_credit: credit,
                child_tax_credit_applied: round2(credit_applied),
                fica_tax: 0.0,
                se_tax: 0.0,
                total_tax: round2(total_tax),
                effective_tax_rate: effective_rate(total_tax, request.income),
                marginal_tax_rate: round2(outcome.marginal_rate * 100.0),
                bracket_breakdown: outcome.bracket_breakdown,
                qbi: None,
                taxable_income_before_qbi: None,
                se_tax_breakdown: None,
                fica_tax_breakdown: None,
                salary: None,
                distributions: None,
                salary_taxable: None,
                distributions_taxable: None,
                capital_gains: None,
            })
        }
        IncomeSource::Llc => {
            let taxable_before_qbi = (request.income - standard_deduction).max(0.0);
            let qbi = qbi_deduction(request.income, taxable_before_qbi, parameters);
            let taxable_income = (taxable_before_qbi - qbi.deduction).max(0.0);
            let outcome = reference.brackets.compute(taxable_income);
            let after_credit = (outcome.total_tax - credit).max(0.0);
            let credit_applied = credit.min(outcome.total_tax);
            let se = self_employment_tax(request.income, parameters);
            let total_tax = after_credit + se.net;

            Ok(FederalTaxResult {
                income_source: request.source,
                filing_status: request.filing_status,
                tax_year: request.tax_year,
                gross_income: request.income,
                standard_deduction,
                taxable_income,
                income_tax_before_credit: outcome.total_tax,
                income_tax_after_credit: round2(after_credit),
                child_tax_credit: credit,
                child_tax_credit_applied: round2(credit_applied),
                fica_tax: 0.0,
                se_tax: se.net,
                total_tax: round2(total_tax),
                effective_tax_rate: effective_rate(total_tax, request.income),
                marginal_tax_rate: round2(outcome.marginal_rate * 100.0),
                bracket_breakdown: outcome.bracket_breakdown,
                qbi: Some(qbi),
                taxable_income_before_qbi: Some(taxable_before_qbi),
                se_tax_breakdown: Some(se),
                fica_tax_breakdown: None,
                salary: None,
                distributions: None,
                salary_taxable: None,
                distributions_taxable: None,
                capital_gains: None,
            })
        }
        IncomeSource::SCorp => {
            let total_income = request.salary + request.distributions;
            let salary_taxable_before_qbi = (request.salary - standard_deduction).max(0.0);
            let taxable_before_qbi = salary_taxable_before_qbi + request.distributions;
            let qbi = qbi_deduction(request.distributions, taxable_before_qbi, parameters);
            let salary_taxable = (salary_taxable_before_qbi - qbi.deduction).max(0.0);

            let remaining_deduction = (standard_deduction - request.salary).max(0.0);
            let distributions_taxable = (request.distributions - remaining_deduction).max(0.0);
            let taxable_income = salary_taxable + distributions_taxable;

            let ordinary_outcome = reference.brackets.compute(salary_taxable);
            let after_credit = (ordinary_outcome.total_tax - credit).max(0.0);
            let credit_applied = credit.min(ordinary_outcome.total_tax);

            let capital_gains = long_term_capital_gains_tax(
                distributions_taxable,
                salary_taxable,
                request.filing_status,
                parameters,
            );
            let fica = fica_tax(request.salary, request.filing_status, parameters);
            let total_tax = after_credit + capital_gains.total_tax + fica.total;

            Ok(FederalTaxResult {
                income_source: request.source,
                filing_status: request.filing_status,
                tax_year: request.tax_year,
                gross_income: total_income,
                standard_deduction,
                taxable_income: round2(taxable_income),
                income_tax_before_credit: ordinary_outcome.total_tax,
                income_tax_after_credit: round2(after_credit),
                child_tax_credit: credit,
                child_tax_credit_applied: round2(credit_applied),
                fica_tax: fica.total,
                se_tax: 0.0,
                total_tax: round2(total_tax),
                effective_tax_rate: effective_rate(total_tax, total_income),
                marginal_tax_rate: round2(ordinary_outcome.marginal_rate * 100.0),
                bracket_breakdown: ordinary_outcome.bracket_breakdown,
                qbi: Some(qbi),
                taxable_income_before_qbi: Some(round2(taxable_before_qbi)),
                se_tax_breakdown: None,
                fica_tax_breakdown: Some(fica),
                salary: Some(request.salary),
                distributions: Some(request.distributions),
                salary_taxable: Some(round2(salary_taxable)),
                distributions_taxable: Some(round2(distributions_taxable)),
                capital_gains: Some(capital_gains),
            })
        }
    }
}

fn effective_rate(total_tax: f64, income: f64) -> f64 {
    if income > 0.0 {
        round2(total_tax / income * 100.0)
    } else {
        0.0
    }
}

/// Reference data resolved for one state calculation.
#[derive(Debug, Clone)]
pub struct StateReference {
    pub brackets: Option<BracketTable>,
    pub standard_deduction: Option<f64>,
    pub parameters: YearParameters,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StateTaxResult {
    pub state_code: String,
    pub gross_income: f64,
    pub standard_deduction: f64,
    pub taxable_income: f64,
    pub base_tax: f64,
    pub surtax: f64,
    pub total_tax: f64,
    pub effective_tax_rate: f64,
    pub marginal_tax_rate: f64,
    pub bracket_breakdown: Vec<BracketSlice>,
    pub no_income_tax: bool,
}

/// State orchestrator. States without an individual income tax
/// short-circuit to a zero result; missing bracket tables also yield zero
/// tax rather than an error. The child tax credit is federal-only and
/// never applied here.
#[must_use]
pub fn compute_state_tax(
    income: f64,
    filing_status: FilingStatus,
    state_code: &str,
    reference: &StateReference,
) -> StateTaxResult {
    let state_code = state_code.to_ascii_uppercase();
    if !state_has_income_tax(&state_code) {
        return StateTaxResult {
            state_code,
            gross_income: income,
            standard_deduction: 0.0,
            taxable_income: 0.0,
            base_tax: 0.0,
            surtax: 0.0,
            total_tax: 0.0,
            effective_tax_rate: 0.0,
            marginal_tax_rate: 0.0,
            bracket_breakdown: Vec::new(),
            no_income_tax: true,
        };
    }

    let standard_deduction = reference.standard_deduction.unwrap_or(0.0);
    let taxable_income = (income - standard_deduction).max(0.0);

    let outcome = match &reference.brackets {
        Some(table) if !table.is_empty() => table.compute(taxable_income),
        _ => BracketTaxOutcome::zero(),
    };

    let surtax = reference
        .parameters
        .state_surtax(&state_code)
        .map_or(0.0, |rule| {
            round2((taxable_income - rule.threshold).max(0.0) * rule.rate)
        });
    let total_tax = outcome.total_tax + surtax;

    StateTaxResult {
        state_code,
        gross_income: income,
        standard_deduction,
        taxable_income,
        base_tax: outcome.total_tax,
        surtax,
        total_tax: round2(total_tax),
        effective_tax_rate: effective_rate(total_tax, income),
        marginal_tax_rate: round2(outcome.marginal_rate * 100.0),
        bracket_breakdown: outcome.bracket_breakdown,
        no_income_tax: false,
    }
}

/// Bundled 2026 federal bracket schedule.
#[must_use]
#[allow(clippy::too_many_lines)]
pub fn federal_bracket_rows_2026() -> Vec<BracketRow> {
    let mut rows = Vec::new();
    let schedules: [(FilingStatus, &[(f64, Option<f64>, f64)]); 5] = [
        (
            FilingStatus::Single,
            &[
                (0.0, Some(12_200.0), 0.10),
                (12_200.0, Some(49_500.0), 0.12),
                (49_500.0, Some(105_550.0), 0.22),
                (105_550.0, Some(201_550.0), 0.24),
                (201_550.0, Some(255_900.0), 0.32),
                (255_900.0, Some(639_800.0), 0.35),
                (639_800.0, None, 0.37),
            ],
        ),
        (
            FilingStatus::MarriedJoint,
            &[
                (0.0, Some(24_400.0), 0.10),
                (24_400.0, Some(99_000.0), 0.12),
                (99_000.0, Some(211_100.0), 0.22),
                (211_100.0, Some(403_100.0), 0.24),
                (403_100.0, Some(511_800.0), 0.32),
                (511_800.0, Some(767_800.0), 0.35),
                (767_800.0, None, 0.37),
            ],
        ),
        (
            FilingStatus::MarriedSeparate,
            &[
                (0.0, Some(12_200.0), 0.10),
                (12_200.0, Some(49_500.0), 0.12),
                (49_500.0, Some(105_550.0), 0.22),
                (105_550.0, Some(201_550.0), 0.24),
                (201_550.0, Some(255_900.0), 0.32),
                (255_900.0, Some(383_900.0), 0.35),
                (383_900.0, None, 0.37),
            ],
        ),
        (
            FilingStatus::HeadOfHousehold,
            &[
                (0.0, Some(17_350.0), 0.10),
                (17_350.0, Some(66_200.0), 0.12),
                (66_200.0, Some(105_550.0), 0.22),
                (105_550.0, Some(201_550.0), 0.24),
                (201_550.0, Some(255_900.0), 0.32),
                (255_900.0, Some(639_800.0), 0.35),
                (639_800.0, None, 0.37),
            ],
        ),
        (
            FilingStatus::QualifyingSurvivingSpouse,
            &[
                (0.0, Some(24_400.0), 0.10),
                (24_400.0, Some(99_000.0), 0.12),
                (99_000.0, Some(211_100.0), 0.22),
                (211_100.0, Some(403_100.0), 0.24),
                (403_100.0, Some(511_800.0), 0.32),
                (511_800.0, Some(767_800.0), 0.35),
                (767_800.0, None, 0.37),
            ],
        ),
    ];

    for (filing_status, schedule) in schedules {
        for &(bracket_min, bracket_max, rate) in schedule {
            rows.push(BracketRow {
                jurisdiction: JurisdictionKind::Federal,
                state_code: None,
                filing_status,
                tax_year: 2026,
                bracket_min,
                bracket_max,
                rate,
            });
        }
    }

    rows
}

/// Bundled 2024 federal bracket schedule.
#[must_use]
#[allow(clippy::too_many_lines)]
pub fn federal_bracket_rows_2024() -> Vec<BracketRow> {
    let mut rows = Vec::new();
    let schedules: [(FilingStatus, &[(f64, Option<f64>, f64)]); 5] = [
        (
            FilingStatus::Single,
            &[
                (0.0, Some(11_600.0), 0.10),
                (11_600.0, Some(47_150.0), 0.12),
                (47_150.0, Some(100_525.0), 0.22),
                (100_525.0, Some(191_950.0), 0.24),
                (191_950.0, Some(243_725.0), 0.32),
                (243_725.0, Some(609_350.0), 0.35),
                (609_350.0, None, 0.37),
            ],
        ),
        (
            FilingStatus::MarriedJoint,
            &[
                (0.0, Some(23_200.0), 0.10),
                (23_200.0, Some(94_300.0), 0.12),
                (94_300.0, Some(201_050.0), 0.22),
                (201_050.0, Some(383_900.0), 0.24),
                (383_900.0, Some(487_450.0), 0.32),
                (487_450.0, Some(731_200.0), 0.35),
                (731_200.0, None, 0.37),
            ],
        ),
        (
            FilingStatus::MarriedSeparate,
            &[
                (0.0, Some(11_600.0), 0.10),
                (11_600.0, Some(47_150.0), 0.12),
                (47_150.0, Some(100_525.0), 0.22),
                (100_525.0, Some(191_950.0), 0.24),
                (191_950.0, Some(243_725.0), 0.32),
                (243_725.0, Some(365_600.0), 0.35),
                (365_600.0, None, 0.37),
            ],
        ),
        (
            FilingStatus::HeadOfHousehold,
            &[
                (0.0, Some(16_550.0), 0.10),
                (16_550.0, Some(63_100.0), 0.12),
                (63_100.0, Some(100_500.0), 0.22),
                (100_500.0, Some(191_950.0), 0.24),
                (191_950.0, Some(243_700.0), 0.32),
                (243_700.0, Some(609_350.0), 0.35),
                (609_350.0, None, 0.37),
            ],
        ),
        (
            FilingStatus::QualifyingSurvivingSpouse,
            &[
                (0.0, Some(23_200.0), 0.10),
                (23_200.0, Some(94_300.0), 0.12),
                (94_300.0, Some(201_050.0), 0.22),
                (201_050.0, Some(383_900.0), 0.24),
                (383_900.0, Some(487_450.0), 0.32),
                (487_450.0, Some(731_200.0), 0.35),
                (731_200.0, None, 0.37),
            ],
        ),
    ];

    for (filing_status, schedule) in schedules {
        for &(bracket_min, bracket_max, rate) in schedule {
            rows.push(BracketRow {
                jurisdiction: JurisdictionKind::Federal,
                state_code: None,
                filing_status,
                tax_year: 2024,
                bracket_min,
                bracket_max,
                rate,
            });
        }
    }

    rows
}

/// Bundled federal standard deductions.
#[must_use]
pub fn federal_standard_deductions() -> Vec<StandardDeductionRow> {
    let amounts: [(u16, FilingStatus, f64); 10] = [
        (2026, FilingStatus::Single, 15_300.0),
        (2026, FilingStatus::MarriedJoint, 30_600.0),
        (2026, FilingStatus::MarriedSeparate, 15_300.0),
        (2026, FilingStatus::HeadOfHousehold, 23_000.0),
        (2026, FilingStatus::QualifyingSurvivingSpouse, 30_600.0),
        (2024, FilingStatus::Single, 14_600.0),
        (2024, FilingStatus::MarriedJoint, 29_200.0),
        (2024, FilingStatus::MarriedSeparate, 14_600.0),
        (2024, FilingStatus::HeadOfHousehold, 21_900.0),
        (2024, FilingStatus::QualifyingSurvivingSpouse, 29_200.0),
    ];

    amounts
        .into_iter()
        .map(|(tax_year, filing_status, amount)| StandardDeductionRow {
            jurisdiction: JurisdictionKind::Federal,
            state_code: None,
            filing_status,
            tax_year,
            amount,
        })
        .collect()
}
