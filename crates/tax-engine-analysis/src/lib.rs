//! Client-facing analysis on top of the calculation engine: extracted-form
//! summaries, the strategy catalog, joint-versus-separate comparison, and
//! the fingerprints that drive cache invalidation.
//!
//! Everything in this crate is pure with respect to storage. Callers load
//! clients, extracted fields, and reference tables, and get back values the
//! persistence layer can cache.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use ulid::Ulid;

use tax_engine_core::{
    itemized_total, round2, BracketTable, DeductionMethod, FilingStatus, ItemizedInputs,
    TaxError, YearParameters,
};

/// Section 179 expensing limit after the 2025 act.
pub const SECTION_179_MAX: f64 = 2_500_000.0;
/// Annual SEP-IRA contribution limit.
pub const SEP_MAX: f64 = 69_000.0;

// ---------------------------------------------------------------------------
// Clients
// ---------------------------------------------------------------------------

/// Identifier for a client, lexicographically sortable by creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(Ulid);

impl ClientId {
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    /// # Errors
    /// Returns [`TaxError::Validation`] when the string is not a ULID.
    pub fn parse(value: &str) -> Result<Self, TaxError> {
        Ulid::from_string(value)
            .map(Self)
            .map_err(|_| TaxError::Validation(format!("invalid client id: {value}")))
    }
}

impl Default for ClientId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for ClientId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClientRecord {
    pub id: ClientId,
    pub display_name: String,
    pub filing_status: FilingStatus,
    pub state_code: Option<String>,
    pub deduction_method: DeductionMethod,
    pub spouse_id: Option<ClientId>,
    pub dependents: u32,
}

/// Checks that two clients are mutually linked and both carry a married
/// filing status.
///
/// # Errors
/// Returns [`TaxError::Validation`] on a broken link or a non-married
/// status.
pub fn validate_joint_pair(
    spouse1: &ClientRecord,
    spouse2: &ClientRecord,
) -> Result<(), TaxError> {
    if spouse1.spouse_id != Some(spouse2.id) || spouse2.spouse_id != Some(spouse1.id) {
        return Err(TaxError::Validation(
            "clients MUST be linked as spouses".to_string(),
        ));
    }
    for (client, label) in [(spouse1, "spouse 1"), (spouse2, "spouse 2")] {
        if !client.filing_status.is_married() {
            return Err(TaxError::Validation(format!(
                "{label} filing status must be married_joint or married_separate, got: {}",
                client.filing_status
            )));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Extracted form data
// ---------------------------------------------------------------------------

/// Extracted values keyed by form type, then by field name. Values stay as
/// captured strings; numeric interpretation happens at read time.
pub type FormData = BTreeMap<String, BTreeMap<String, String>>;

/// One extracted field as logged against a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedField {
    pub client_id: ClientId,
    pub form_type: String,
    pub field_name: String,
    pub field_value: String,
    pub extracted_at: OffsetDateTime,
}

/// Groups extraction rows into [`FormData`]. Later rows win on a repeated
/// form/field pair.
#[must_use]
pub fn form_data(fields: &[ExtractedField]) -> FormData {
    let mut grouped: FormData = BTreeMap::new();
    for field in fields {
        grouped
            .entry(field.form_type.clone())
            .or_default()
            .insert(field.field_name.clone(), field.field_value.clone());
    }
    grouped
}

/// Reads a numeric field, falling back to `default` when the form or field
/// is absent, empty, or not parseable.
#[must_use]
pub fn numeric_field(data: &FormData, form_type: &str, field_name: &str, default: f64) -> f64 {
    data.get(form_type)
        .and_then(|fields| fields.get(field_name))
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
        .and_then(|value| value.parse::<f64>().ok())
        .unwrap_or(default)
}

/// # Errors
/// Returns [`TaxError::Validation`] when the timestamp cannot be formatted.
pub fn rfc3339(value: OffsetDateTime) -> Result<String, TaxError> {
    value
        .format(&Rfc3339)
        .map_err(|err| TaxError::Validation(format!("invalid timestamp: {err}")))
}

/// # Errors
/// Returns [`TaxError::Validation`] when the string is not RFC 3339.
pub fn parse_rfc3339(value: &str) -> Result<OffsetDateTime, TaxError> {
    OffsetDateTime::parse(value, &Rfc3339)
        .map_err(|err| TaxError::Validation(format!("invalid timestamp {value:?}: {err}")))
}

/// Formats a dollar amount with thousands separators, e.g. `1,234.50`.
#[must_use]
pub fn fmt_money(value: f64, decimals: usize) -> String {
    let rendered = format!("{value:.decimals$}");
    let negative = rendered.starts_with('-');
    let digits = rendered.trim_start_matches('-');
    let (whole, fraction) = match digits.split_once('.') {
        Some((whole, fraction)) => (whole, Some(fraction)),
        None => (digits, None),
    };

    let mut out = String::with_capacity(rendered.len() + whole.len() / 3 + 1);
    if negative {
        out.push('-');
    }
    for (index, ch) in whole.chars().enumerate() {
        if index > 0 && (whole.len() - index) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    if let Some(fraction) = fraction {
        out.push('.');
        out.push_str(fraction);
    }
    out
}

// ---------------------------------------------------------------------------
// Summaries
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IncomeSourceLine {
    pub source: String,
    pub amount: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalysisSummary {
    pub total_income: f64,
    pub adjusted_gross_income: f64,
    pub taxable_income: f64,
    pub total_tax: f64,
    pub tax_withheld: f64,
    pub tax_owed: f64,
    pub tax_refund: f64,
    pub effective_tax_rate: f64,
    pub marginal_tax_rate: f64,
    pub income_sources: Vec<IncomeSourceLine>,
}

impl AnalysisSummary {
    #[must_use]
    pub fn empty() -> Self {
        Self {
            total_income: 0.0,
            adjusted_gross_income: 0.0,
            taxable_income: 0.0,
            total_tax: 0.0,
            tax_withheld: 0.0,
            tax_owed: 0.0,
            tax_refund: 0.0,
            effective_tax_rate: 0.0,
            marginal_tax_rate: 0.0,
            income_sources: Vec::new(),
        }
    }
}

fn push_source(lines: &mut Vec<IncomeSourceLine>, source: &str, amount: f64) {
    if amount > 0.0 {
        lines.push(IncomeSourceLine {
            source: source.to_string(),
            amount: round2(amount),
        });
    }
}

/// Builds a filing summary from extracted form data. Form 1040 values win
/// where present; otherwise totals are reconstructed from the per-source
/// forms. AGI above the itemized sources surfaces as an "Other Income"
/// line so the breakdown always reconciles.
#[must_use]
pub fn summarize(data: &FormData) -> AnalysisSummary {
    let wages =
        numeric_field(data, "1040", "wages", 0.0) + numeric_field(data, "W-2", "wages", 0.0);
    let interest = numeric_field(data, "1099-INT", "income", 0.0);
    let dividends = numeric_field(data, "1099-DIV", "income", 0.0);
    let business = numeric_field(data, "Schedule C", "net_profit", 0.0);
    let misc = numeric_field(data, "1099-MISC", "income", 0.0);
    let nonemployee = numeric_field(data, "1099-NEC", "income", 0.0);

    let mut income_sources = Vec::new();
    push_source(&mut income_sources, "Wages, Salaries, Tips", wages);
    push_source(&mut income_sources, "Interest Income", interest);
    push_source(&mut income_sources, "Dividend Income", dividends);
    push_source(&mut income_sources, "Business Income (Schedule C)", business);
    push_source(&mut income_sources, "Miscellaneous Income", misc);
    push_source(&mut income_sources, "Nonemployee Compensation", nonemployee);

    let total_from_sources: f64 = income_sources.iter().map(|line| line.amount).sum();
    let agi = numeric_field(data, "1040", "agi", total_from_sources);

    if agi > total_from_sources && total_from_sources > 0.0 {
        push_source(&mut income_sources, "Other Income", agi - total_from_sources);
    } else if agi > 0.0 && total_from_sources <= 0.0 {
        push_source(&mut income_sources, "Total Income (from AGI)", agi);
    }

    let taxable_income = numeric_field(data, "1040", "taxable_income", agi);
    let total_tax = numeric_field(data, "1040", "total_tax", 0.0);
    let tax_withheld = numeric_field(data, "W-2", "federal_tax_withheld", 0.0);

    let effective_tax_rate = if agi > 0.0 { total_tax / agi * 100.0 } else { 0.0 };

    AnalysisSummary {
        total_income: round2(if agi > 0.0 { agi } else { total_from_sources }),
        adjusted_gross_income: round2(agi),
        taxable_income: round2(taxable_income),
        total_tax: round2(total_tax),
        tax_withheld: round2(tax_withheld),
        tax_owed: round2((total_tax - tax_withheld).max(0.0)),
        tax_refund: round2((tax_withheld - total_tax).max(0.0)),
        effective_tax_rate: round2(effective_tax_rate),
        marginal_tax_rate: estimated_marginal_rate(taxable_income),
        income_sources,
    }
}

/// Rough marginal rate from the 2024 single schedule, used only to price
/// strategy benefits. The real marginal rate comes out of the bracket walk.
#[must_use]
pub fn estimated_marginal_rate(taxable_income: f64) -> f64 {
    if taxable_income <= 0.0 {
        0.0
    } else if taxable_income <= 11_600.0 {
        10.0
    } else if taxable_income <= 47_150.0 {
        12.0
    } else if taxable_income <= 100_525.0 {
        22.0
    } else if taxable_income <= 191_950.0 {
        24.0
    } else if taxable_income <= 243_725.0 {
        32.0
    } else if taxable_income <= 609_350.0 {
        35.0
    } else {
        37.0
    }
}

// ---------------------------------------------------------------------------
// Strategy catalog
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StrategyStatus {
    FullyUtilized,
    PartiallyUtilized,
    NotUtilized,
    NotApplicable,
    ErrorDetected,
    PotentiallyMissed,
    Suboptimal,
    CompliantPreObbba,
}

impl StrategyStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FullyUtilized => "FULLY_UTILIZED",
            Self::PartiallyUtilized => "PARTIALLY_UTILIZED",
            Self::NotUtilized => "NOT_UTILIZED",
            Self::NotApplicable => "NOT_APPLICABLE",
            Self::ErrorDetected => "ERROR_DETECTED",
            Self::PotentiallyMissed => "POTENTIALLY_MISSED",
            Self::Suboptimal => "SUBOPTIMAL",
            Self::CompliantPreObbba => "COMPLIANT_PRE_OBBBA",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "FULLY_UTILIZED" => Some(Self::FullyUtilized),
            "PARTIALLY_UTILIZED" => Some(Self::PartiallyUtilized),
            "NOT_UTILIZED" => Some(Self::NotUtilized),
            "NOT_APPLICABLE" => Some(Self::NotApplicable),
            "ERROR_DETECTED" => Some(Self::ErrorDetected),
            "POTENTIALLY_MISSED" => Some(Self::PotentiallyMissed),
            "SUBOPTIMAL" => Some(Self::Suboptimal),
            "COMPLIANT_PRE_OBBBA" => Some(Self::CompliantPreObbba),
            _ => None,
        }
    }
}

/// Credits the tax code withholds from separate filers. Recommendations
/// carrying one of these tags are dropped from the separate-filing scenario
/// instead of being matched by name.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RestrictedCredit {
    EarnedIncomeCredit,
    StudentLoanInterest,
    EducationCredits,
    AdoptionCredit,
}

impl RestrictedCredit {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::EarnedIncomeCredit => "earned_income_credit",
            Self::StudentLoanInterest => "student_loan_interest",
            Self::EducationCredits => "education_credits",
            Self::AdoptionCredit => "adoption_credit",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "earned_income_credit" => Some(Self::EarnedIncomeCredit),
            "student_loan_interest" => Some(Self::StudentLoanInterest),
            "education_credits" => Some(Self::EducationCredits),
            "adoption_credit" => Some(Self::AdoptionCredit),
            _ => None,
        }
    }

    /// All four restricted credits are unavailable to separate filers.
    #[must_use]
    pub fn eligible_for(self, filing_status: FilingStatus) -> bool {
        filing_status != FilingStatus::MarriedSeparate
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StrategyRecommendation {
    pub strategy_id: String,
    pub name: String,
    pub status: StrategyStatus,
    pub current_benefit: f64,
    pub potential_benefit: f64,
    pub unused_capacity: f64,
    pub flags: Vec<String>,
    pub recommendations: Vec<String>,
    pub forms_analyzed: Vec<String>,
    pub irs_section: String,
    pub priority: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restricted_credit: Option<RestrictedCredit>,
}

impl StrategyRecommendation {
    #[must_use]
    pub fn new(strategy_id: &str, name: &str, irs_section: &str, priority: u8) -> Self {
        Self {
            strategy_id: strategy_id.to_string(),
            name: name.to_string(),
            status: StrategyStatus::NotApplicable,
            current_benefit: 0.0,
            potential_benefit: 0.0,
            unused_capacity: 0.0,
            flags: Vec::new(),
            recommendations: Vec::new(),
            forms_analyzed: Vec::new(),
            irs_section: irs_section.to_string(),
            priority,
            restricted_credit: None,
        }
    }

    #[must_use]
    pub fn potential_savings(&self) -> f64 {
        round2(self.potential_benefit - self.current_benefit)
    }
}

fn has_form(data: &FormData, form_type: &str) -> bool {
    data.contains_key(form_type)
}

fn forms(names: &[&str]) -> Vec<String> {
    names.iter().map(ToString::to_string).collect()
}

fn benefit(deduction: f64, marginal_rate: f64) -> f64 {
    round2(deduction * marginal_rate / 100.0)
}

fn marginal_rate_for(data: &FormData) -> f64 {
    estimated_marginal_rate(numeric_field(data, "1040", "taxable_income", 0.0))
}

fn analyze_qbi_strategy(data: &FormData) -> StrategyRecommendation {
    let mut result = StrategyRecommendation::new(
        "qbi_deduction",
        "Qualified Business Income (QBI) Deduction",
        "IRC Section 199A",
        1,
    );
    result.forms_analyzed = forms(&["Schedule C", "Schedule E", "K-1"]);

    let schedule_c_profit = numeric_field(data, "Schedule C", "net_profit", 0.0);
    let schedule_e_income = numeric_field(data, "Schedule E", "net_income", 0.0);
    let k1_qbi = numeric_field(data, "K-1", "qbi_amount", 0.0);

    if schedule_c_profit <= 0.0 && schedule_e_income <= 0.0 && k1_qbi <= 0.0 {
        return result;
    }

    let form_8995_filed = has_form(data, "Form 8995") || has_form(data, "Form 8995-A");
    let mut claimed = numeric_field(data, "Form 8995", "qbi_deduction", 0.0);
    if claimed == 0.0 {
        claimed = numeric_field(data, "Form 8995-A", "qbi_deduction", 0.0);
    }

    let qbi = schedule_c_profit + schedule_e_income + k1_qbi;
    let expected = qbi * 0.20;
    let taxable_income = numeric_field(data, "1040", "taxable_income", 0.0);
    let limit_by_taxable = if taxable_income > 0.0 { taxable_income * 0.20 } else { 0.0 };

    if form_8995_filed {
        if claimed > 0.0 {
            if claimed < expected * 0.95 {
                result.status = StrategyStatus::PartiallyUtilized;
                result
                    .flags
                    .push("Deduction limited by W-2 wages, UBIA, or taxable income".to_string());
                result
                    .recommendations
                    .push("Review W-2 wages and UBIA to maximize deduction".to_string());
            } else {
                result.status = StrategyStatus::FullyUtilized;
            }
        } else {
            result.status = StrategyStatus::NotUtilized;
            result
                .flags
                .push("QBI deduction is zero - check for SSTB limitations or loss".to_string());
            result
                .recommendations
                .push("Review if business qualifies as SSTB or if loss occurred".to_string());
        }
    } else {
        result.status = StrategyStatus::NotUtilized;
        result
            .flags
            .push("Form 8995/8995-A not filed despite pass-through income".to_string());
        result
            .recommendations
            .push("File Form 8995 or 8995-A to claim QBI deduction".to_string());
        claimed = 0.0;
    }

    let marginal = estimated_marginal_rate(taxable_income);
    result.current_benefit = benefit(claimed, marginal);
    result.potential_benefit = benefit(expected.min(limit_by_taxable), marginal);
    result.unused_capacity = round2((result.potential_benefit - result.current_benefit).max(0.0));
    result
}

fn analyze_section_179_strategy(data: &FormData) -> StrategyRecommendation {
    let mut result =
        StrategyRecommendation::new("section_179", "Section 179 Expensing", "IRC Section 179", 1);
    result.forms_analyzed = forms(&["Form 4562", "Schedule C"]);

    let form_4562_filed = has_form(data, "Form 4562");
    let deduction = numeric_field(data, "Form 4562", "section_179_deduction", 0.0);
    let property_cost = numeric_field(data, "Form 4562", "total_cost_179_property", 0.0);
    let income_limitation = numeric_field(data, "Form 4562", "business_income_limitation", 0.0);
    let schedule_c_profit = numeric_field(data, "Schedule C", "net_profit", 0.0);

    if property_cost <= 0.0 && schedule_c_profit <= 0.0 {
        return result;
    }

    if form_4562_filed {
        if deduction > 0.0 {
            result.status = StrategyStatus::FullyUtilized;
            if deduction < property_cost
                && deduction < SECTION_179_MAX
                && income_limitation > 0.0
                && deduction < income_limitation
            {
                result.status = StrategyStatus::PartiallyUtilized;
                result.flags.push("Limited by business income".to_string());
                result.recommendations.push(format!(
                    "Carryforward available: ${}",
                    fmt_money(property_cost - deduction, 2)
                ));
            }
        } else {
            result.status = StrategyStatus::NotUtilized;
            result
                .flags
                .push("Section 179 election not made for qualifying property".to_string());
            result
                .recommendations
                .push("Consider electing Section 179 for qualifying business property".to_string());
        }
    } else {
        result.status = StrategyStatus::PotentiallyMissed;
        result
            .flags
            .push("Review asset purchases for 179 eligibility".to_string());
        result
            .recommendations
            .push("File Form 4562 Part I if qualifying property was acquired".to_string());
    }

    let marginal = marginal_rate_for(data);
    result.current_benefit = benefit(deduction, marginal);
    result.potential_benefit = benefit(property_cost.min(SECTION_179_MAX), marginal);
    result.unused_capacity = round2((result.potential_benefit - result.current_benefit).max(0.0));
    result
}

fn analyze_bonus_depreciation_strategy(data: &FormData) -> StrategyRecommendation {
    let mut result = StrategyRecommendation::new(
        "bonus_depreciation",
        "Bonus Depreciation (Full Expensing)",
        "IRC Section 168(k)",
        1,
    );
    result.forms_analyzed = forms(&["Form 4562"]);

    let bonus = numeric_field(data, "Form 4562", "bonus_depreciation", 0.0);
    let macrs = numeric_field(data, "Form 4562", "macrs_depreciation", 0.0);

    if bonus <= 0.0 && macrs <= 0.0 {
        return result;
    }

    if bonus > 0.0 {
        result.status = StrategyStatus::FullyUtilized;
        if macrs > 0.0 {
            result.flags.push(
                "Some property depreciated under MACRS - verify if election out was intentional"
                    .to_string(),
            );
        }
    } else {
        result.status = StrategyStatus::PotentiallyMissed;
        result
            .flags
            .push("Property depreciated under MACRS may qualify for bonus".to_string());
        result
            .recommendations
            .push("Review for election out under Section 168(k)(7)".to_string());
    }

    let marginal = marginal_rate_for(data);
    result.current_benefit = benefit(bonus, marginal);
    result.potential_benefit = benefit(bonus + macrs, marginal);
    result.unused_capacity = round2((result.potential_benefit - result.current_benefit).max(0.0));
    result
}

fn analyze_rd_strategy(data: &FormData, tax_year: u16) -> StrategyRecommendation {
    let mut result = StrategyRecommendation::new(
        "rd_deduction",
        "Domestic R&D Expense Deduction",
        "IRC Section 174A",
        2,
    );
    result.forms_analyzed = forms(&["Form 6765", "Schedule C", "Form 4562"]);

    let form_6765_filed = has_form(data, "Form 6765");
    let rd_expenses = numeric_field(data, "Schedule C", "rd_expenses", 0.0);
    let rd_amortization = numeric_field(data, "Form 4562", "rd_amortization", 0.0);
    let schedule_c_profit = numeric_field(data, "Schedule C", "net_profit", 0.0);

    if rd_expenses == 0.0 && !form_6765_filed && schedule_c_profit == 0.0 {
        return result;
    }

    // Immediate expensing applies from 2025 on; earlier years amortized.
    if tax_year >= 2025 {
        if rd_expenses > 0.0 && rd_amortization == 0.0 {
            result.status = StrategyStatus::FullyUtilized;
        } else if rd_amortization > 0.0 {
            result.status = StrategyStatus::Suboptimal;
            result
                .flags
                .push("Elective amortization chosen over immediate deduction".to_string());
            result.recommendations.push(
                "Consider immediate deduction under Section 174A (may be strategic for NOL management)"
                    .to_string(),
            );
        } else {
            result.status = StrategyStatus::NotUtilized;
        }
    } else if rd_amortization > 0.0 {
        result.status = StrategyStatus::CompliantPreObbba;
        result
            .flags
            .push("Check for OBBBA retroactive election if applicable".to_string());
    } else {
        result.status = StrategyStatus::NotUtilized;
    }

    if form_6765_filed && rd_expenses == 0.0 {
        result
            .flags
            .push("R&D credit claimed but no 174A deduction identified".to_string());
        result
            .recommendations
            .push("Review R&D expenses for Section 174A deduction eligibility".to_string());
    }

    let marginal = marginal_rate_for(data);
    result.current_benefit = 0.0;
    result.potential_benefit = if rd_expenses > 0.0 { benefit(rd_expenses, marginal) } else { 0.0 };
    result.unused_capacity = round2(result.potential_benefit - result.current_benefit);
    result
}

fn analyze_retirement_strategy(data: &FormData) -> StrategyRecommendation {
    let mut result = StrategyRecommendation::new(
        "retirement_contributions",
        "Retirement Plan Contributions",
        "IRC Section 219, 401(k), 408, 404",
        2,
    );
    result.forms_analyzed = forms(&["Schedule C", "Schedule SE", "Schedule 1", "Form 5498"]);

    let schedule_c_profit = numeric_field(data, "Schedule C", "net_profit", 0.0);
    let schedule_se_income = numeric_field(data, "Schedule SE", "net_earnings", 0.0);
    let self_employment_income = schedule_c_profit.max(schedule_se_income);

    if self_employment_income <= 0.0 {
        return result;
    }

    let deducted = numeric_field(data, "Schedule 1", "retirement_contributions", 0.0);
    let sep = numeric_field(data, "Form 5498", "sep_contributions", 0.0);
    let simple = numeric_field(data, "Form 5498", "simple_contributions", 0.0);
    let total_contributions = deducted + sep + simple;

    let max_sep_contribution = (self_employment_income * 0.25).min(SEP_MAX);

    if total_contributions > 0.0 {
        if total_contributions >= max_sep_contribution * 0.90 {
            result.status = StrategyStatus::FullyUtilized;
        } else {
            result.status = StrategyStatus::PartiallyUtilized;
            result.recommendations.push(format!(
                "Additional contribution capacity: ${}",
                fmt_money(max_sep_contribution - total_contributions, 2)
            ));
        }
    } else {
        result.status = StrategyStatus::NotUtilized;
        result
            .recommendations
            .push("Consider SEP-IRA, SIMPLE, or Solo 401(k)".to_string());
    }

    if self_employment_income > 200_000.0 && total_contributions < 50_000.0 {
        result.flags.push("SIGNIFICANT_OPTIMIZATION_OPPORTUNITY".to_string());
        result
            .recommendations
            .push("Consider defined benefit plan for maximum deduction".to_string());
    }
    if schedule_c_profit > 50_000.0 && sep > 0.0 {
        result.flags.push("SOLO_401K_MAY_BE_BETTER".to_string());
        result
            .recommendations
            .push("Solo 401(k) allows employee + employer contributions".to_string());
    }

    let marginal = marginal_rate_for(data);
    result.current_benefit = benefit(total_contributions, marginal);
    result.potential_benefit = benefit(max_sep_contribution, marginal);
    result.unused_capacity = round2((result.potential_benefit - result.current_benefit).max(0.0));
    result
}

fn analyze_se_tax_strategy(data: &FormData) -> StrategyRecommendation {
    let mut result = StrategyRecommendation::new(
        "se_tax_deduction",
        "Self-Employment Tax Deduction",
        "IRC Section 164(f)",
        1,
    );

    let schedule_se_filed = has_form(data, "Schedule SE");
    let total_se_tax = numeric_field(data, "Schedule SE", "total_se_tax", 0.0);
    let claimed = numeric_field(data, "Schedule 1", "se_tax_deduction", 0.0);
    let schedule_c_profit = numeric_field(data, "Schedule C", "net_profit", 0.0);
    let schedule_f_profit = numeric_field(data, "Schedule F", "net_profit", 0.0);

    if !schedule_se_filed {
        result.forms_analyzed = forms(&["Schedule C", "Schedule F"]);
        if schedule_c_profit > 400.0 || schedule_f_profit > 400.0 {
            result.status = StrategyStatus::ErrorDetected;
            result.flags.push("Schedule SE required but not filed".to_string());
            result
                .recommendations
                .push("File Schedule SE for self-employment income".to_string());
        }
        return result;
    }

    result.forms_analyzed = forms(&["Schedule SE", "Schedule 1"]);
    let expected = total_se_tax * 0.50;

    if (claimed - expected).abs() < 0.01 {
        result.status = StrategyStatus::FullyUtilized;
    } else if claimed < expected {
        result.status = StrategyStatus::ErrorDetected;
        result.flags.push("Deduction appears understated".to_string());
        result
            .recommendations
            .push("Verify Schedule 1 Line 15 equals Schedule SE Line 13".to_string());
    } else {
        result.status = StrategyStatus::FullyUtilized;
    }

    let marginal = marginal_rate_for(data);
    result.current_benefit = benefit(claimed, marginal);
    result.potential_benefit = benefit(expected, marginal);
    result.unused_capacity = round2((result.potential_benefit - result.current_benefit).max(0.0));
    result
}

fn analyze_se_health_strategy(data: &FormData) -> StrategyRecommendation {
    let mut result = StrategyRecommendation::new(
        "se_health_insurance",
        "Self-Employed Health Insurance Deduction",
        "IRC Section 162(l)",
        2,
    );
    result.forms_analyzed = forms(&["Schedule C", "Schedule SE", "Schedule 1", "Form 1095-A"]);

    let schedule_c_profit = numeric_field(data, "Schedule C", "net_profit", 0.0);
    if schedule_c_profit == 0.0 {
        return result;
    }

    let total_se_tax = numeric_field(data, "Schedule SE", "total_se_tax", 0.0);
    let claimed = numeric_field(data, "Schedule 1", "se_health_insurance", 0.0);
    let premiums = numeric_field(data, "1095-A", "premiums", 0.0);

    // Premiums default to an estimate when no 1095-A was captured.
    let net_se_income = schedule_c_profit - total_se_tax * 0.5;
    let deduction_limit = if premiums > 0.0 { premiums } else { 10_000.0 }.min(net_se_income);

    if claimed >= deduction_limit * 0.95 {
        result.status = StrategyStatus::FullyUtilized;
    } else if claimed > 0.0 {
        result.status = StrategyStatus::PartiallyUtilized;
        result.recommendations.push(format!(
            "Additional deduction available: ${}",
            fmt_money(deduction_limit - claimed, 2)
        ));
    } else {
        result.status = StrategyStatus::NotUtilized;
        result
            .flags
            .push("CRITICAL: Missing deduction for health insurance".to_string());
        result.recommendations.push(
            "Claim self-employed health insurance deduction on Schedule 1 Line 17".to_string(),
        );
    }

    if has_form(data, "Form 8962") {
        result.flags.push("Verify PTC coordination is correct".to_string());
    }

    let marginal = marginal_rate_for(data);
    result.current_benefit = benefit(claimed, marginal);
    result.potential_benefit = benefit(deduction_limit, marginal);
    result.unused_capacity = round2((result.potential_benefit - result.current_benefit).max(0.0));
    result
}

fn analyze_home_office_strategy(data: &FormData) -> StrategyRecommendation {
    let mut result = StrategyRecommendation::new(
        "home_office",
        "Home Office Deduction",
        "IRC Section 280A(c)",
        3,
    );
    result.forms_analyzed = forms(&["Form 8829", "Schedule C"]);

    let schedule_c_profit = numeric_field(data, "Schedule C", "net_profit", 0.0);
    if schedule_c_profit == 0.0 {
        return result;
    }

    let form_8829_filed = has_form(data, "Form 8829");
    let allowed = numeric_field(data, "Form 8829", "home_office_deduction", 0.0);
    let tentative = numeric_field(data, "Form 8829", "tentative_deduction", 0.0);
    let simplified = numeric_field(data, "Schedule C", "simplified_home_office", 0.0);
    let schedule_c_claimed = numeric_field(data, "Schedule C", "home_office_deduction", 0.0);

    if form_8829_filed {
        result.status = StrategyStatus::FullyUtilized;
        if tentative > allowed {
            result.status = StrategyStatus::PartiallyUtilized;
            result.flags.push("Limited by gross income".to_string());
            result.recommendations.push(format!(
                "Carryforward available: ${}",
                fmt_money(tentative - allowed, 2)
            ));
        }
    } else if simplified > 0.0 || schedule_c_claimed > 0.0 {
        result.status = StrategyStatus::FullyUtilized;
        if simplified + schedule_c_claimed <= 1_500.0 {
            result.flags.push("Simplified method used".to_string());
            result
                .recommendations
                .push("Consider regular method if actual expenses higher".to_string());
        }
    } else {
        result.status = StrategyStatus::NotUtilized;
        result.flags.push("Potential deduction missed".to_string());
        result
            .recommendations
            .push("Review home office eligibility and expenses".to_string());
    }

    let deduction_amount = if allowed > 0.0 { allowed } else { simplified + schedule_c_claimed };
    let marginal = marginal_rate_for(data);
    result.current_benefit = benefit(deduction_amount, marginal);
    result.potential_benefit = round2(result.current_benefit * 1.2);
    result.unused_capacity = round2((result.potential_benefit - result.current_benefit).max(0.0));
    result
}

fn analyze_qsbs_strategy(data: &FormData) -> StrategyRecommendation {
    let mut result = StrategyRecommendation::new(
        "qsbs_exclusion",
        "Qualified Small Business Stock (QSBS) Exclusion",
        "IRC Section 1202",
        4,
    );
    result.forms_analyzed = forms(&["Schedule D", "Form 8949"]);

    let schedule_d_filed = has_form(data, "Schedule D");
    let exclusion = numeric_field(data, "Form 8949", "qsbs_exclusion", 0.0);
    let capital_gains = numeric_field(data, "Schedule D", "capital_gains", 0.0);

    if !schedule_d_filed && capital_gains == 0.0 {
        return result;
    }

    if exclusion > 0.0 {
        result.status = StrategyStatus::FullyUtilized;
        result.flags.push("QSBS exclusion claimed".to_string());
    } else if capital_gains > 0.0 {
        result.status = StrategyStatus::PotentiallyMissed;
        result.flags.push("INVESTIGATE_QSBS_ELIGIBILITY".to_string());
        result.recommendations.extend([
            "Was stock acquired at original issuance?".to_string(),
            "Was corporation a C-corp with <$50M gross assets?".to_string(),
            "Is corporation in qualified trade or business?".to_string(),
            "Was stock held for required period (3-5 years)?".to_string(),
        ]);
    }

    let marginal = marginal_rate_for(data);
    result.current_benefit = benefit(exclusion, marginal);
    result.potential_benefit =
        if capital_gains > 0.0 { benefit(capital_gains * 0.5, marginal) } else { 0.0 };
    result.unused_capacity = round2((result.potential_benefit - result.current_benefit).max(0.0));
    result
}

fn analyze_fmla_strategy(data: &FormData) -> StrategyRecommendation {
    let mut result = StrategyRecommendation::new(
        "fmla_credit",
        "Paid Family and Medical Leave Credit",
        "IRC Section 45S",
        4,
    );
    result.forms_analyzed = forms(&["Form 8994", "W-2", "Schedule C"]);

    let form_8994_filed = has_form(data, "Form 8994");
    let credit = numeric_field(data, "Form 8994", "credit_amount", 0.0);
    let employee_count = numeric_field(data, "W-2", "employee_count", 0.0);
    let schedule_c_profit = numeric_field(data, "Schedule C", "net_profit", 0.0);

    if schedule_c_profit <= 0.0 && employee_count <= 0.0 {
        return result;
    }

    if form_8994_filed {
        if credit > 0.0 {
            result.status = StrategyStatus::FullyUtilized;
        } else {
            result.status = StrategyStatus::NotUtilized;
            result
                .flags
                .push("Form filed but no credit - check qualifying employee criteria".to_string());
        }
    } else if employee_count > 0.0 {
        result.status = StrategyStatus::PotentiallyMissed;
        result.flags.push("INVESTIGATE_FMLA_CREDIT_ELIGIBILITY".to_string());
        result.recommendations.extend([
            "Does employer have written FMLA policy?".to_string(),
            "Were employees paid during FMLA leave?".to_string(),
            "Did employees earn <$78,000 (2024)?".to_string(),
            "Were employees employed 1+ year?".to_string(),
            "Do employees work 20+ hours/week?".to_string(),
        ]);
    }

    // Credits offset tax directly, so no marginal-rate conversion.
    result.current_benefit = round2(credit);
    result.potential_benefit = if credit > 0.0 { round2(credit * 1.5) } else { 0.0 };
    result.unused_capacity = round2((result.potential_benefit - result.current_benefit).max(0.0));
    result
}

/// Runs the full ten-strategy catalog over one client's extracted data,
/// ordered so strategies relevant to the detected income types come first.
#[must_use]
pub fn analyze_strategies(data: &FormData, tax_year: u16) -> Vec<StrategyRecommendation> {
    let mut strategies = vec![
        analyze_qbi_strategy(data),
        analyze_section_179_strategy(data),
        analyze_bonus_depreciation_strategy(data),
        analyze_rd_strategy(data, tax_year),
        analyze_retirement_strategy(data),
        analyze_se_tax_strategy(data),
        analyze_se_health_strategy(data),
        analyze_home_office_strategy(data),
        analyze_qsbs_strategy(data),
        analyze_fmla_strategy(data),
    ];
    prioritize_strategies(&mut strategies, &detect_income_types(data));
    strategies
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "snake_case")]
pub enum IncomeType {
    W2Employee,
    SelfEmployed,
    RentalIncome,
    BusinessOwner,
    CapitalGains,
    InvestmentIncome,
    Unknown,
}

impl IncomeType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::W2Employee => "w2_employee",
            Self::SelfEmployed => "self_employed",
            Self::RentalIncome => "rental_income",
            Self::BusinessOwner => "business_owner",
            Self::CapitalGains => "capital_gains",
            Self::InvestmentIncome => "investment_income",
            Self::Unknown => "unknown",
        }
    }

    /// Strategy ids worth surfacing first for this income type.
    #[must_use]
    pub fn relevant_strategies(self) -> &'static [&'static str] {
        match self {
            Self::W2Employee => &["retirement_contributions"],
            Self::SelfEmployed => &[
                "retirement_contributions",
                "qbi_deduction",
                "se_tax_deduction",
                "se_health_insurance",
                "home_office",
            ],
            Self::BusinessOwner => &[
                "qbi_deduction",
                "section_179",
                "bonus_depreciation",
                "rd_deduction",
                "fmla_credit",
            ],
            Self::RentalIncome => &["section_179", "bonus_depreciation"],
            Self::CapitalGains => &["qsbs_exclusion"],
            Self::InvestmentIncome | Self::Unknown => &[],
        }
    }
}

/// Infers income types from which form types were extracted.
#[must_use]
pub fn detect_income_types(data: &FormData) -> Vec<IncomeType> {
    let mut types = Vec::new();
    if has_form(data, "W-2") {
        types.push(IncomeType::W2Employee);
    }
    if has_form(data, "Schedule C") {
        types.push(IncomeType::SelfEmployed);
    }
    if has_form(data, "Schedule E") {
        types.push(IncomeType::RentalIncome);
    }
    if has_form(data, "K-1") {
        types.push(IncomeType::BusinessOwner);
    }
    if has_form(data, "Schedule D") || has_form(data, "Form 8949") {
        types.push(IncomeType::CapitalGains);
    }
    if has_form(data, "1099-INT") || has_form(data, "1099-DIV") {
        types.push(IncomeType::InvestmentIncome);
    }
    if types.is_empty() {
        types.push(IncomeType::Unknown);
    }
    types
}

/// Stable sort: strategies relevant to the income types first, then by
/// catalog priority.
pub fn prioritize_strategies(
    strategies: &mut [StrategyRecommendation],
    income_types: &[IncomeType],
) {
    let relevant: BTreeSet<&'static str> = income_types
        .iter()
        .flat_map(|income_type| income_type.relevant_strategies().iter().copied())
        .collect();
    strategies.sort_by_key(|strategy| {
        (
            u8::from(!relevant.contains(strategy.strategy_id.as_str())),
            strategy.priority,
        )
    });
}

/// Drops recommendations whose restricted-credit tag is ineligible for the
/// filing status. Returns the survivors and the names of what was removed.
#[must_use]
pub fn filter_strategies_for_status(
    strategies: Vec<StrategyRecommendation>,
    filing_status: FilingStatus,
) -> (Vec<StrategyRecommendation>, Vec<String>) {
    let mut kept = Vec::new();
    let mut removed = Vec::new();
    for strategy in strategies {
        match strategy.restricted_credit {
            Some(credit) if !credit.eligible_for(filing_status) => removed.push(strategy.name),
            _ => kept.push(strategy),
        }
    }
    (kept, removed)
}

// ---------------------------------------------------------------------------
// Deduction coordination
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum CoordinationAction {
    Allow,
    Block,
    ConfirmCascade,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MethodChangeDecision {
    pub allowed: bool,
    pub action: CoordinationAction,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required_method: Option<DeductionMethod>,
    pub cascade_to_spouse: bool,
}

impl MethodChangeDecision {
    fn allow(message: &str) -> Self {
        Self {
            allowed: true,
            action: CoordinationAction::Allow,
            message: message.to_string(),
            required_method: None,
            cascade_to_spouse: false,
        }
    }
}

/// Decides whether a client may switch deduction method. Separate filers
/// must match their spouse: switching to standard while the spouse itemizes
/// is blocked, and switching to itemized while the spouse is on standard
/// cascades the change to the spouse.
#[must_use]
pub fn validate_deduction_method_change(
    client: &ClientRecord,
    spouse: Option<&ClientRecord>,
    new_method: DeductionMethod,
) -> MethodChangeDecision {
    if client.filing_status != FilingStatus::MarriedSeparate {
        return MethodChangeDecision::allow("No coordination required");
    }
    let Some(spouse) = spouse else {
        return MethodChangeDecision::allow("No spouse linked");
    };

    if spouse.deduction_method == DeductionMethod::Itemized
        && new_method == DeductionMethod::Standard
    {
        return MethodChangeDecision {
            allowed: false,
            action: CoordinationAction::Block,
            message: "Cannot use standard deduction - spouse is itemizing. Both spouses must \
                      use the same deduction method when filing separately."
                .to_string(),
            required_method: Some(DeductionMethod::Itemized),
            cascade_to_spouse: false,
        };
    }

    if new_method == DeductionMethod::Itemized
        && spouse.deduction_method == DeductionMethod::Standard
    {
        return MethodChangeDecision {
            allowed: true,
            action: CoordinationAction::ConfirmCascade,
            message: "Changing to itemized deductions will require spouse to also itemize."
                .to_string(),
            required_method: None,
            cascade_to_spouse: true,
        };
    }

    MethodChangeDecision::allow("Coordination satisfied")
}

/// Verifies both separate-filing spouses use the same deduction method and
/// returns the shared method. Joint filers share a return, so any method
/// passes and spouse 1's election is reported.
///
/// # Errors
/// Returns [`TaxError::Coordination`] when separate filers disagree.
pub fn check_separate_deduction_coordination(
    spouse1: &ClientRecord,
    spouse2: &ClientRecord,
) -> Result<DeductionMethod, TaxError> {
    if spouse1.filing_status != FilingStatus::MarriedSeparate
        || spouse2.filing_status != FilingStatus::MarriedSeparate
    {
        return Ok(spouse1.deduction_method);
    }
    if spouse1.deduction_method != spouse2.deduction_method {
        return Err(TaxError::Coordination(
            "IRS requires both spouses to use the same deduction method (standard or itemized) \
             when filing separately"
                .to_string(),
        ));
    }
    Ok(spouse1.deduction_method)
}

// ---------------------------------------------------------------------------
// Joint-versus-separate comparison
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QbiThresholdCheck {
    pub exceeds_threshold: bool,
    pub threshold: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Flags income over the QBI phase-out threshold for a filing status.
#[must_use]
pub fn qbi_impact(
    income: f64,
    filing_status: FilingStatus,
    parameters: &YearParameters,
) -> QbiThresholdCheck {
    let threshold = parameters.qbi_threshold(filing_status);
    let exceeds_threshold = income > threshold;
    let note = exceeds_threshold.then(|| {
        format!(
            "Income ${} exceeds QBI threshold (${}) - QBI deduction may be limited",
            fmt_money(income, 0),
            fmt_money(threshold, 0)
        )
    });
    QbiThresholdCheck { exceeds_threshold, threshold, note }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonNoteKind {
    CreditRestriction,
    QbiThreshold,
    DeductionCoordination,
    SaltCapDifference,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ComparisonNote {
    pub kind: ComparisonNoteKind,
    pub message: String,
    pub impact: String,
}

/// One filing scenario priced out: joint, or a single spouse separately.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FilingScenario {
    pub income: f64,
    pub agi: f64,
    pub deduction: f64,
    pub taxable_income: f64,
    pub total_tax: f64,
    pub marginal_rate: f64,
    pub effective_rate: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq)]
pub enum RecommendedFiling {
    Mfj,
    Mfs,
}

impl RecommendedFiling {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Mfj => "MFJ",
            Self::Mfs => "MFS",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "MFJ" => Some(Self::Mfj),
            "MFS" => Some(Self::Mfs),
            _ => None,
        }
    }
}

impl Display for RecommendedFiling {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpouseScenarioInput {
    pub income: f64,
    /// Raw itemized categories; `None` when the spouse has none on file.
    pub itemized: Option<ItemizedInputs>,
}

#[derive(Debug, Clone)]
pub struct JointComparisonInput<'a> {
    pub deduction_method: DeductionMethod,
    pub spouse1: SpouseScenarioInput,
    pub spouse2: SpouseScenarioInput,
    pub joint_brackets: &'a BracketTable,
    pub separate_brackets: &'a BracketTable,
    pub joint_standard_deduction: f64,
    pub separate_standard_deduction: f64,
    /// Names of restricted credits filtered out of the separate scenario.
    pub removed_credits: &'a [String],
    pub parameters: &'a YearParameters,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JointComparison {
    pub joint: FilingScenario,
    pub separate_spouse1: FilingScenario,
    pub separate_spouse2: FilingScenario,
    pub separate_combined_tax: f64,
    pub recommended: RecommendedFiling,
    pub savings: f64,
    pub reason: String,
    pub notes: Vec<ComparisonNote>,
}

fn scenario(
    income: f64,
    deduction: f64,
    brackets: &BracketTable,
) -> FilingScenario {
    let taxable_income = round2((income - deduction).max(0.0));
    let outcome = brackets.compute(taxable_income);
    let effective_rate = if income > 0.0 { outcome.total_tax / income * 100.0 } else { 0.0 };
    FilingScenario {
        income: round2(income),
        agi: round2(income),
        deduction: round2(deduction),
        taxable_income,
        total_tax: outcome.total_tax,
        marginal_rate: round2(outcome.marginal_rate * 100.0),
        effective_rate: round2(effective_rate),
    }
}

/// Prices the joint scenario against both spouses filing separately.
///
/// When itemizing, the joint scenario recombines the raw categories from
/// both spouses and reapplies the medical threshold and SALT cap at the
/// joint level, then takes whichever of that total and the joint standard
/// deduction is larger. Each separate scenario itemizes alone under the
/// separate-filer SALT cap. A tax tie recommends filing jointly.
#[must_use]
pub fn compare_joint_filing(input: &JointComparisonInput<'_>) -> JointComparison {
    let combined_income = input.spouse1.income + input.spouse2.income;
    let itemizing = input.deduction_method == DeductionMethod::Itemized;

    let spouse1_items = input.spouse1.itemized.clone().unwrap_or_else(ItemizedInputs::zero);
    let spouse2_items = input.spouse2.itemized.clone().unwrap_or_else(ItemizedInputs::zero);

    let joint_deduction = if itemizing {
        let combined = ItemizedInputs {
            medical_expenses: spouse1_items.medical_expenses + spouse2_items.medical_expenses,
            state_local_taxes: spouse1_items.state_local_taxes + spouse2_items.state_local_taxes,
            mortgage_interest: spouse1_items.mortgage_interest + spouse2_items.mortgage_interest,
            charitable_contributions: spouse1_items.charitable_contributions
                + spouse2_items.charitable_contributions,
        };
        let recombined = itemized_total(
            &combined,
            FilingStatus::MarriedJoint,
            combined_income,
            input.parameters,
        );
        recombined.total.max(input.joint_standard_deduction)
    } else {
        input.joint_standard_deduction
    };

    let separate_deduction = |items: &ItemizedInputs, income: f64| {
        if itemizing {
            itemized_total(items, FilingStatus::MarriedSeparate, income, input.parameters).total
        } else {
            input.separate_standard_deduction
        }
    };

    let joint = scenario(combined_income, joint_deduction, input.joint_brackets);
    let separate_spouse1 = scenario(
        input.spouse1.income,
        separate_deduction(&spouse1_items, input.spouse1.income),
        input.separate_brackets,
    );
    let separate_spouse2 = scenario(
        input.spouse2.income,
        separate_deduction(&spouse2_items, input.spouse2.income),
        input.separate_brackets,
    );
    let separate_combined_tax = round2(separate_spouse1.total_tax + separate_spouse2.total_tax);

    // Ties go to the joint return: identical tax with one return to file.
    let recommended = if joint.total_tax <= separate_combined_tax {
        RecommendedFiling::Mfj
    } else {
        RecommendedFiling::Mfs
    };
    let savings = round2((separate_combined_tax - joint.total_tax).abs());
    let reason = format!("{} saves ${}", recommended.as_str(), fmt_money(savings, 2));

    let mut notes = Vec::new();
    if !input.removed_credits.is_empty() {
        notes.push(ComparisonNote {
            kind: ComparisonNoteKind::CreditRestriction,
            message: format!("MFS ineligible for: {}", input.removed_credits.join(", ")),
            impact: "MFS tax may be higher due to unavailable credits".to_string(),
        });
    }

    let joint_check = qbi_impact(combined_income, FilingStatus::MarriedJoint, input.parameters);
    for (label, income) in [("Spouse 1", input.spouse1.income), ("Spouse 2", input.spouse2.income)]
    {
        let check = qbi_impact(income, FilingStatus::MarriedSeparate, input.parameters);
        if check.exceeds_threshold && !joint_check.exceeds_threshold {
            notes.push(ComparisonNote {
                kind: ComparisonNoteKind::QbiThreshold,
                message: format!(
                    "{label} exceeds MFS QBI threshold (${}), but combined income under MFJ \
                     threshold (${})",
                    fmt_money(check.threshold, 0),
                    fmt_money(joint_check.threshold, 0)
                ),
                impact: "MFJ may preserve full QBI deduction".to_string(),
            });
        }
    }

    if itemizing {
        notes.push(ComparisonNote {
            kind: ComparisonNoteKind::DeductionCoordination,
            message: "Both spouses itemizing (IRS requirement for MFS)".to_string(),
            impact: format!(
                "MFJ deduction: ${} | MFS: ${} + ${}",
                fmt_money(joint.deduction, 2),
                fmt_money(separate_spouse1.deduction, 2),
                fmt_money(separate_spouse2.deduction, 2)
            ),
        });
        let joint_cap = input.parameters.salt_cap(FilingStatus::MarriedJoint).cap;
        let separate_cap = input.parameters.salt_cap(FilingStatus::MarriedSeparate).cap;
        notes.push(ComparisonNote {
            kind: ComparisonNoteKind::SaltCapDifference,
            message: "SALT cap differs by filing status".to_string(),
            impact: format!(
                "MFJ cap: ${} | MFS cap: ${} per spouse",
                fmt_money(joint_cap, 0),
                fmt_money(separate_cap, 0)
            ),
        });
    }

    JointComparison {
        joint,
        separate_spouse1,
        separate_spouse2,
        separate_combined_tax,
        recommended,
        savings,
        reason,
        notes,
    }
}

// ---------------------------------------------------------------------------
// Fingerprints
// ---------------------------------------------------------------------------

fn hex_digest(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        let _ = write!(out, "{byte:02x}");
    }
    out
}

/// Fingerprint over a client's extraction timeline. The timestamps are
/// sorted before hashing, so insertion order never matters; any new or
/// changed extraction row changes the hash.
#[must_use]
pub fn data_version_hash<S: AsRef<str>>(extraction_timestamps: &[S]) -> String {
    let mut stamps: Vec<&str> = extraction_timestamps.iter().map(AsRef::as_ref).collect();
    stamps.sort_unstable();
    hex_digest(stamps.join("|").as_bytes())
}

/// Combined fingerprint for a spouse pair. Built over both individual
/// hashes plus the pair identity (lower id first), so either spouse's data
/// changing invalidates the joint cache.
#[must_use]
pub fn joint_fingerprint(
    spouse1_hash: &str,
    spouse2_hash: &str,
    spouse1_id: ClientId,
    spouse2_id: ClientId,
) -> String {
    let (low, high) = if spouse1_id <= spouse2_id {
        (spouse1_id, spouse2_id)
    } else {
        (spouse2_id, spouse1_id)
    };
    hex_digest(format!("{spouse1_hash}|{spouse2_hash}|{low}|{high}").as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tax_engine_core::{federal_bracket_rows_2026, JurisdictionKind};

    fn must_ok<T, E: std::fmt::Debug>(result: Result<T, E>) -> T {
        match result {
            Ok(value) => value,
            Err(err) => panic!("expected Ok, got Err: {err:?}"),
        }
    }

    fn must_err<T: std::fmt::Debug, E>(result: Result<T, E>) -> E {
        match result {
            Ok(value) => panic!("expected Err, got Ok: {value:?}"),
            Err(err) => err,
        }
    }

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-6,
            "expected {expected}, got {actual}"
        );
    }

    fn form(entries: &[(&str, &[(&str, &str)])]) -> FormData {
        let mut data = FormData::new();
        for (form_type, fields) in entries {
            let map = data.entry((*form_type).to_string()).or_default();
            for (name, value) in *fields {
                map.insert((*name).to_string(), (*value).to_string());
            }
        }
        data
    }

    fn table_for(filing_status: FilingStatus) -> BracketTable {
        let rows = federal_bracket_rows_2026()
            .into_iter()
            .filter(|row| {
                row.filing_status == filing_status && row.jurisdiction == JurisdictionKind::Federal
            })
            .collect();
        must_ok(BracketTable::new(rows))
    }

    fn client(
        filing_status: FilingStatus,
        deduction_method: DeductionMethod,
        spouse_id: Option<ClientId>,
    ) -> ClientRecord {
        ClientRecord {
            id: ClientId::new(),
            display_name: "test".to_string(),
            filing_status,
            state_code: None,
            deduction_method,
            spouse_id,
            dependents: 0,
        }
    }

    fn find<'a>(
        strategies: &'a [StrategyRecommendation],
        strategy_id: &str,
    ) -> &'a StrategyRecommendation {
        match strategies.iter().find(|s| s.strategy_id == strategy_id) {
            Some(strategy) => strategy,
            None => panic!("strategy {strategy_id} missing"),
        }
    }

    #[test]
    fn numeric_field_parses_and_defaults() {
        let data = form(&[("W-2", &[("wages", "80000"), ("bonus", ""), ("junk", "n/a")])]);
        assert_close(numeric_field(&data, "W-2", "wages", 0.0), 80_000.0);
        assert_close(numeric_field(&data, "W-2", "bonus", 5.0), 5.0);
        assert_close(numeric_field(&data, "W-2", "junk", 7.0), 7.0);
        assert_close(numeric_field(&data, "1040", "wages", 3.0), 3.0);
    }

    #[test]
    fn fmt_money_groups_thousands() {
        assert_eq!(fmt_money(1_234_567.5, 2), "1,234,567.50");
        assert_eq!(fmt_money(40_400.0, 0), "40,400");
        assert_eq!(fmt_money(999.0, 2), "999.00");
        assert_eq!(fmt_money(0.0, 2), "0.00");
    }

    #[test]
    fn summary_from_w2_and_1040() {
        let data = form(&[
            ("W-2", &[("wages", "80000"), ("federal_tax_withheld", "9000")]),
            (
                "1040",
                &[
                    ("agi", "80000"),
                    ("taxable_income", "64700"),
                    ("total_tax", "9040"),
                ],
            ),
        ]);
        let summary = summarize(&data);
        assert_close(summary.total_income, 80_000.0);
        assert_close(summary.adjusted_gross_income, 80_000.0);
        assert_close(summary.taxable_income, 64_700.0);
        assert_close(summary.total_tax, 9_040.0);
        assert_close(summary.tax_withheld, 9_000.0);
        assert_close(summary.tax_owed, 40.0);
        assert_close(summary.tax_refund, 0.0);
        assert_close(summary.effective_tax_rate, 11.3);
        assert_close(summary.marginal_tax_rate, 22.0);
        assert_eq!(summary.income_sources.len(), 1);
        assert_eq!(summary.income_sources[0].source, "Wages, Salaries, Tips");
    }

    #[test]
    fn summary_tops_up_other_income() {
        let data = form(&[
            ("W-2", &[("wages", "50000")]),
            ("1040", &[("agi", "60000")]),
        ]);
        let summary = summarize(&data);
        assert_close(summary.adjusted_gross_income, 60_000.0);
        let other = summary
            .income_sources
            .iter()
            .find(|line| line.source == "Other Income");
        match other {
            Some(line) => assert_close(line.amount, 10_000.0),
            None => panic!("missing Other Income line"),
        }
    }

    #[test]
    fn summary_agi_only_reported_as_total() {
        let data = form(&[("1040", &[("agi", "45000")])]);
        let summary = summarize(&data);
        assert_eq!(summary.income_sources.len(), 1);
        assert_eq!(summary.income_sources[0].source, "Total Income (from AGI)");
        assert_close(summary.income_sources[0].amount, 45_000.0);
        assert_close(summary.taxable_income, 45_000.0);
    }

    #[test]
    fn summary_refund_when_overwithheld() {
        let data = form(&[
            ("W-2", &[("wages", "40000"), ("federal_tax_withheld", "6000")]),
            ("1040", &[("agi", "40000"), ("total_tax", "4500")]),
        ]);
        let summary = summarize(&data);
        assert_close(summary.tax_refund, 1_500.0);
        assert_close(summary.tax_owed, 0.0);
    }

    #[test]
    fn estimated_marginal_rate_edges() {
        assert_close(estimated_marginal_rate(-1.0), 0.0);
        assert_close(estimated_marginal_rate(11_600.0), 10.0);
        assert_close(estimated_marginal_rate(11_601.0), 12.0);
        assert_close(estimated_marginal_rate(100_525.0), 22.0);
        assert_close(estimated_marginal_rate(700_000.0), 37.0);
    }

    #[test]
    fn qbi_strategy_not_applicable_without_pass_through() {
        let data = form(&[("W-2", &[("wages", "90000")])]);
        let strategies = analyze_strategies(&data, 2026);
        assert_eq!(strategies.len(), 10);
        let qbi = find(&strategies, "qbi_deduction");
        assert_eq!(qbi.status, StrategyStatus::NotApplicable);
    }

    #[test]
    fn qbi_strategy_flags_missing_form() {
        let data = form(&[
            ("Schedule C", &[("net_profit", "120000")]),
            ("1040", &[("taxable_income", "100000")]),
        ]);
        let strategies = analyze_strategies(&data, 2026);
        let qbi = find(&strategies, "qbi_deduction");
        assert_eq!(qbi.status, StrategyStatus::NotUtilized);
        assert!(qbi
            .flags
            .iter()
            .any(|flag| flag.contains("Form 8995/8995-A not filed")));
        // 20% of 120k capped by 20% of 100k taxable, at the 22% bracket.
        assert_close(qbi.potential_benefit, 4_400.0);
        assert_close(qbi.current_benefit, 0.0);
    }

    #[test]
    fn qbi_strategy_fully_utilized_near_expected() {
        let data = form(&[
            ("Schedule C", &[("net_profit", "100000")]),
            ("Form 8995", &[("qbi_deduction", "19500")]),
            ("1040", &[("taxable_income", "150000")]),
        ]);
        let strategies = analyze_strategies(&data, 2026);
        let qbi = find(&strategies, "qbi_deduction");
        assert_eq!(qbi.status, StrategyStatus::FullyUtilized);
    }

    #[test]
    fn qbi_strategy_partial_when_limited() {
        let data = form(&[
            ("Schedule C", &[("net_profit", "100000")]),
            ("Form 8995", &[("qbi_deduction", "12000")]),
            ("1040", &[("taxable_income", "150000")]),
        ]);
        let strategies = analyze_strategies(&data, 2026);
        let qbi = find(&strategies, "qbi_deduction");
        assert_eq!(qbi.status, StrategyStatus::PartiallyUtilized);
        assert!(qbi.flags.iter().any(|flag| flag.contains("limited")));
    }

    #[test]
    fn section_179_potentially_missed_without_form() {
        let data = form(&[
            ("Schedule C", &[("net_profit", "80000")]),
            ("1040", &[("taxable_income", "70000")]),
        ]);
        let strategies = analyze_strategies(&data, 2026);
        let section = find(&strategies, "section_179");
        assert_eq!(section.status, StrategyStatus::PotentiallyMissed);
    }

    #[test]
    fn section_179_partial_when_income_limited() {
        let data = form(&[
            (
                "Form 4562",
                &[
                    ("section_179_deduction", "30000"),
                    ("total_cost_179_property", "50000"),
                    ("business_income_limitation", "40000"),
                ],
            ),
            ("Schedule C", &[("net_profit", "40000")]),
            ("1040", &[("taxable_income", "40000")]),
        ]);
        let strategies = analyze_strategies(&data, 2026);
        let section = find(&strategies, "section_179");
        assert_eq!(section.status, StrategyStatus::PartiallyUtilized);
        assert!(section
            .recommendations
            .iter()
            .any(|rec| rec.contains("Carryforward available: $20,000.00")));
    }

    #[test]
    fn bonus_depreciation_missed_when_macrs_only() {
        let data = form(&[
            ("Form 4562", &[("macrs_depreciation", "15000")]),
            ("1040", &[("taxable_income", "90000")]),
        ]);
        let strategies = analyze_strategies(&data, 2026);
        let bonus = find(&strategies, "bonus_depreciation");
        assert_eq!(bonus.status, StrategyStatus::PotentiallyMissed);
        assert_close(bonus.potential_benefit, 3_300.0);
    }

    #[test]
    fn rd_suboptimal_when_amortizing_post_2025() {
        let data = form(&[
            (
                "Schedule C",
                &[("net_profit", "100000"), ("rd_expenses", "20000")],
            ),
            ("Form 4562", &[("rd_amortization", "4000")]),
            ("1040", &[("taxable_income", "90000")]),
        ]);
        let strategies = analyze_strategies(&data, 2026);
        let rd = find(&strategies, "rd_deduction");
        assert_eq!(rd.status, StrategyStatus::Suboptimal);
    }

    #[test]
    fn rd_compliant_before_2025() {
        let data = form(&[
            (
                "Schedule C",
                &[("net_profit", "100000"), ("rd_expenses", "20000")],
            ),
            ("Form 4562", &[("rd_amortization", "4000")]),
        ]);
        let strategies = analyze_strategies(&data, 2024);
        let rd = find(&strategies, "rd_deduction");
        assert_eq!(rd.status, StrategyStatus::CompliantPreObbba);
    }

    #[test]
    fn retirement_partial_reports_capacity() {
        let data = form(&[
            ("Schedule C", &[("net_profit", "100000")]),
            ("Form 5498", &[("sep_contributions", "10000")]),
            ("1040", &[("taxable_income", "90000")]),
        ]);
        let strategies = analyze_strategies(&data, 2026);
        let retirement = find(&strategies, "retirement_contributions");
        assert_eq!(retirement.status, StrategyStatus::PartiallyUtilized);
        assert!(retirement
            .recommendations
            .iter()
            .any(|rec| rec.contains("Additional contribution capacity: $15,000.00")));
    }

    #[test]
    fn retirement_flags_high_income_underuse() {
        let data = form(&[
            ("Schedule C", &[("net_profit", "300000")]),
            ("1040", &[("taxable_income", "250000")]),
        ]);
        let strategies = analyze_strategies(&data, 2026);
        let retirement = find(&strategies, "retirement_contributions");
        assert_eq!(retirement.status, StrategyStatus::NotUtilized);
        assert!(retirement
            .flags
            .iter()
            .any(|flag| flag == "SIGNIFICANT_OPTIMIZATION_OPPORTUNITY"));
    }

    #[test]
    fn se_tax_error_when_schedule_se_missing() {
        let data = form(&[("Schedule C", &[("net_profit", "25000")])]);
        let strategies = analyze_strategies(&data, 2026);
        let se = find(&strategies, "se_tax_deduction");
        assert_eq!(se.status, StrategyStatus::ErrorDetected);
        assert!(se.flags.iter().any(|flag| flag.contains("not filed")));
    }

    #[test]
    fn se_tax_fully_utilized_at_half() {
        let data = form(&[
            ("Schedule SE", &[("total_se_tax", "14000")]),
            ("Schedule 1", &[("se_tax_deduction", "7000")]),
            ("1040", &[("taxable_income", "80000")]),
        ]);
        let strategies = analyze_strategies(&data, 2026);
        let se = find(&strategies, "se_tax_deduction");
        assert_eq!(se.status, StrategyStatus::FullyUtilized);
        assert_close(se.unused_capacity, 0.0);
    }

    #[test]
    fn se_tax_understated_deduction_detected() {
        let data = form(&[
            ("Schedule SE", &[("total_se_tax", "14000")]),
            ("Schedule 1", &[("se_tax_deduction", "5000")]),
            ("1040", &[("taxable_income", "80000")]),
        ]);
        let strategies = analyze_strategies(&data, 2026);
        let se = find(&strategies, "se_tax_deduction");
        assert_eq!(se.status, StrategyStatus::ErrorDetected);
    }

    #[test]
    fn home_office_simplified_method_flagged() {
        let data = form(&[(
            "Schedule C",
            &[("net_profit", "60000"), ("simplified_home_office", "1500")],
        ), ("1040", &[("taxable_income", "50000")])]);
        let strategies = analyze_strategies(&data, 2026);
        let home = find(&strategies, "home_office");
        assert_eq!(home.status, StrategyStatus::FullyUtilized);
        assert!(home.flags.iter().any(|flag| flag == "Simplified method used"));
    }

    #[test]
    fn qsbs_missed_on_unexcluded_gains() {
        let data = form(&[
            ("Schedule D", &[("capital_gains", "200000")]),
            ("1040", &[("taxable_income", "250000")]),
        ]);
        let strategies = analyze_strategies(&data, 2026);
        let qsbs = find(&strategies, "qsbs_exclusion");
        assert_eq!(qsbs.status, StrategyStatus::PotentiallyMissed);
        assert!(qsbs.flags.iter().any(|flag| flag == "INVESTIGATE_QSBS_ELIGIBILITY"));
        // Half the gain at the 32% estimate.
        assert_close(qsbs.potential_benefit, 32_000.0);
    }

    #[test]
    fn fmla_credit_counted_without_rate_conversion() {
        let data = form(&[
            ("Schedule C", &[("net_profit", "90000")]),
            ("Form 8994", &[("credit_amount", "4000")]),
        ]);
        let strategies = analyze_strategies(&data, 2026);
        let fmla = find(&strategies, "fmla_credit");
        assert_eq!(fmla.status, StrategyStatus::FullyUtilized);
        assert_close(fmla.current_benefit, 4_000.0);
        assert_close(fmla.potential_benefit, 6_000.0);
    }

    #[test]
    fn detect_income_types_from_forms() {
        let data = form(&[
            ("W-2", &[("wages", "50000")]),
            ("Schedule C", &[("net_profit", "20000")]),
            ("1099-INT", &[("income", "300")]),
        ]);
        let types = detect_income_types(&data);
        assert_eq!(
            types,
            vec![
                IncomeType::W2Employee,
                IncomeType::SelfEmployed,
                IncomeType::InvestmentIncome,
            ]
        );
    }

    #[test]
    fn detect_income_types_unknown_when_empty() {
        assert_eq!(detect_income_types(&FormData::new()), vec![IncomeType::Unknown]);
    }

    #[test]
    fn w2_only_client_sees_retirement_first() {
        let data = form(&[("W-2", &[("wages", "90000")])]);
        let strategies = analyze_strategies(&data, 2026);
        assert_eq!(strategies[0].strategy_id, "retirement_contributions");
    }

    #[test]
    fn self_employed_relevant_strategies_lead() {
        let data = form(&[
            ("Schedule C", &[("net_profit", "120000")]),
            ("1040", &[("taxable_income", "100000")]),
        ]);
        let strategies = analyze_strategies(&data, 2026);
        let leading: Vec<&str> = strategies[..5]
            .iter()
            .map(|s| s.strategy_id.as_str())
            .collect();
        for id in ["qbi_deduction", "se_tax_deduction", "se_health_insurance", "home_office"] {
            assert!(leading.contains(&id), "{id} not prioritized: {leading:?}");
        }
    }

    #[test]
    fn restricted_credits_filtered_for_separate_filers() {
        let mut eitc = StrategyRecommendation::new(
            "earned_income_credit",
            "Earned Income Tax Credit",
            "IRC Section 32",
            1,
        );
        eitc.restricted_credit = Some(RestrictedCredit::EarnedIncomeCredit);
        let plain = StrategyRecommendation::new(
            "home_office",
            "Home Office Deduction",
            "IRC Section 280A(c)",
            3,
        );

        let (kept, removed) = filter_strategies_for_status(
            vec![eitc.clone(), plain.clone()],
            FilingStatus::MarriedSeparate,
        );
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].strategy_id, "home_office");
        assert_eq!(removed, vec!["Earned Income Tax Credit".to_string()]);

        let (kept, removed) =
            filter_strategies_for_status(vec![eitc, plain], FilingStatus::MarriedJoint);
        assert_eq!(kept.len(), 2);
        assert!(removed.is_empty());
    }

    #[test]
    fn method_change_blocked_when_spouse_itemizes() {
        let spouse = client(FilingStatus::MarriedSeparate, DeductionMethod::Itemized, None);
        let me = client(
            FilingStatus::MarriedSeparate,
            DeductionMethod::Itemized,
            Some(spouse.id),
        );
        let decision =
            validate_deduction_method_change(&me, Some(&spouse), DeductionMethod::Standard);
        assert!(!decision.allowed);
        assert_eq!(decision.action, CoordinationAction::Block);
        assert_eq!(decision.required_method, Some(DeductionMethod::Itemized));
    }

    #[test]
    fn method_change_cascades_to_standard_spouse() {
        let spouse = client(FilingStatus::MarriedSeparate, DeductionMethod::Standard, None);
        let me = client(
            FilingStatus::MarriedSeparate,
            DeductionMethod::Standard,
            Some(spouse.id),
        );
        let decision =
            validate_deduction_method_change(&me, Some(&spouse), DeductionMethod::Itemized);
        assert!(decision.allowed);
        assert_eq!(decision.action, CoordinationAction::ConfirmCascade);
        assert!(decision.cascade_to_spouse);
    }

    #[test]
    fn method_change_free_for_joint_filers() {
        let me = client(FilingStatus::MarriedJoint, DeductionMethod::Standard, None);
        let decision = validate_deduction_method_change(&me, None, DeductionMethod::Itemized);
        assert!(decision.allowed);
        assert_eq!(decision.action, CoordinationAction::Allow);
    }

    #[test]
    fn coordination_rejects_mixed_separate_methods() {
        let mut spouse1 =
            client(FilingStatus::MarriedSeparate, DeductionMethod::Itemized, None);
        let mut spouse2 =
            client(FilingStatus::MarriedSeparate, DeductionMethod::Standard, None);
        spouse1.spouse_id = Some(spouse2.id);
        spouse2.spouse_id = Some(spouse1.id);

        let err = must_err(check_separate_deduction_coordination(&spouse1, &spouse2));
        assert!(matches!(err, TaxError::Coordination(_)));

        spouse2.deduction_method = DeductionMethod::Itemized;
        let method = must_ok(check_separate_deduction_coordination(&spouse1, &spouse2));
        assert_eq!(method, DeductionMethod::Itemized);
    }

    #[test]
    fn joint_pair_validation() {
        let mut spouse1 = client(FilingStatus::MarriedJoint, DeductionMethod::Standard, None);
        let mut spouse2 = client(FilingStatus::MarriedJoint, DeductionMethod::Standard, None);
        let err = must_err(validate_joint_pair(&spouse1, &spouse2));
        assert!(matches!(err, TaxError::Validation(_)));

        spouse1.spouse_id = Some(spouse2.id);
        spouse2.spouse_id = Some(spouse1.id);
        must_ok(validate_joint_pair(&spouse1, &spouse2));

        spouse2.filing_status = FilingStatus::Single;
        let err = must_err(validate_joint_pair(&spouse1, &spouse2));
        assert!(matches!(err, TaxError::Validation(_)));
    }

    #[test]
    fn comparison_standard_deduction_hand_check() {
        let params = YearParameters::v2026();
        let joint_table = table_for(FilingStatus::MarriedJoint);
        let separate_table = table_for(FilingStatus::MarriedSeparate);
        let input = JointComparisonInput {
            deduction_method: DeductionMethod::Standard,
            spouse1: SpouseScenarioInput { income: 200_000.0, itemized: None },
            spouse2: SpouseScenarioInput { income: 30_000.0, itemized: None },
            joint_brackets: &joint_table,
            separate_brackets: &separate_table,
            joint_standard_deduction: 30_600.0,
            separate_standard_deduction: 15_300.0,
            removed_credits: &[],
            parameters: &params,
        };
        let comparison = compare_joint_filing(&input);

        assert_close(comparison.joint.taxable_income, 199_400.0);
        assert_close(comparison.joint.total_tax, 33_480.0);
        assert_close(comparison.joint.marginal_rate, 22.0);

        assert_close(comparison.separate_spouse1.taxable_income, 184_700.0);
        assert_close(comparison.separate_spouse1.total_tax, 37_023.0);
        assert_close(comparison.separate_spouse2.taxable_income, 14_700.0);
        assert_close(comparison.separate_spouse2.total_tax, 1_520.0);
        assert_close(comparison.separate_combined_tax, 38_543.0);

        assert_eq!(comparison.recommended, RecommendedFiling::Mfj);
        assert_close(comparison.savings, 5_063.0);
        assert_eq!(comparison.reason, "MFJ saves $5,063.00");

        // Spouse 1 is over the separate-filer QBI threshold while the
        // combined income stays under the joint one.
        let qbi_notes: Vec<&ComparisonNote> = comparison
            .notes
            .iter()
            .filter(|note| note.kind == ComparisonNoteKind::QbiThreshold)
            .collect();
        assert_eq!(qbi_notes.len(), 1);
        assert!(qbi_notes[0].message.starts_with("Spouse 1"));
        assert!(qbi_notes[0].message.contains("$197,300"));
        assert!(qbi_notes[0].message.contains("$394,600"));
    }

    #[test]
    fn comparison_tie_recommends_joint() {
        let params = YearParameters::v2026();
        let joint_table = table_for(FilingStatus::MarriedJoint);
        let separate_table = table_for(FilingStatus::MarriedSeparate);
        let input = JointComparisonInput {
            deduction_method: DeductionMethod::Standard,
            spouse1: SpouseScenarioInput { income: 50_000.0, itemized: None },
            spouse2: SpouseScenarioInput { income: 50_000.0, itemized: None },
            joint_brackets: &joint_table,
            separate_brackets: &separate_table,
            joint_standard_deduction: 30_600.0,
            separate_standard_deduction: 15_300.0,
            removed_credits: &[],
            parameters: &params,
        };
        let comparison = compare_joint_filing(&input);
        assert_close(comparison.joint.total_tax, comparison.separate_combined_tax);
        assert_eq!(comparison.recommended, RecommendedFiling::Mfj);
        assert_close(comparison.savings, 0.0);
        assert_eq!(comparison.reason, "MFJ saves $0.00");
    }

    #[test]
    fn comparison_itemized_recombines_salt_at_joint_cap() {
        let params = YearParameters::v2026();
        let joint_table = table_for(FilingStatus::MarriedJoint);
        let separate_table = table_for(FilingStatus::MarriedSeparate);
        let items = ItemizedInputs {
            medical_expenses: 0.0,
            state_local_taxes: 25_000.0,
            mortgage_interest: 5_000.0,
            charitable_contributions: 0.0,
        };
        let input = JointComparisonInput {
            deduction_method: DeductionMethod::Itemized,
            spouse1: SpouseScenarioInput { income: 150_000.0, itemized: Some(items.clone()) },
            spouse2: SpouseScenarioInput { income: 120_000.0, itemized: Some(items) },
            joint_brackets: &joint_table,
            separate_brackets: &separate_table,
            joint_standard_deduction: 30_600.0,
            separate_standard_deduction: 15_300.0,
            removed_credits: &[],
            parameters: &params,
        };
        let comparison = compare_joint_filing(&input);

        // Joint: 50,000 SALT capped at 40,400 plus 10,000 mortgage.
        assert_close(comparison.joint.deduction, 50_400.0);
        // Each separate filer: 25,000 SALT capped at 20,000 plus 5,000.
        assert_close(comparison.separate_spouse1.deduction, 25_000.0);
        assert_close(comparison.separate_spouse2.deduction, 25_000.0);

        let kinds: Vec<ComparisonNoteKind> =
            comparison.notes.iter().map(|note| note.kind).collect();
        assert!(kinds.contains(&ComparisonNoteKind::DeductionCoordination));
        assert!(kinds.contains(&ComparisonNoteKind::SaltCapDifference));
        let salt_note = comparison
            .notes
            .iter()
            .find(|note| note.kind == ComparisonNoteKind::SaltCapDifference);
        match salt_note {
            Some(note) => {
                assert!(note.impact.contains("$40,400"));
                assert!(note.impact.contains("$20,000"));
            }
            None => panic!("missing SALT note"),
        }
    }

    #[test]
    fn comparison_itemized_falls_back_to_joint_standard() {
        let params = YearParameters::v2026();
        let joint_table = table_for(FilingStatus::MarriedJoint);
        let separate_table = table_for(FilingStatus::MarriedSeparate);
        let items = ItemizedInputs {
            medical_expenses: 0.0,
            state_local_taxes: 4_000.0,
            mortgage_interest: 2_000.0,
            charitable_contributions: 1_000.0,
        };
        let input = JointComparisonInput {
            deduction_method: DeductionMethod::Itemized,
            spouse1: SpouseScenarioInput { income: 90_000.0, itemized: Some(items) },
            spouse2: SpouseScenarioInput { income: 60_000.0, itemized: None },
            joint_brackets: &joint_table,
            separate_brackets: &separate_table,
            joint_standard_deduction: 30_600.0,
            separate_standard_deduction: 15_300.0,
            removed_credits: &[],
            parameters: &params,
        };
        let comparison = compare_joint_filing(&input);
        // Combined itemized total of 7,000 loses to the joint standard
        // deduction; the separate scenarios keep their confirmed election.
        assert_close(comparison.joint.deduction, 30_600.0);
        assert_close(comparison.separate_spouse1.deduction, 7_000.0);
        assert_close(comparison.separate_spouse2.deduction, 0.0);
    }

    #[test]
    fn comparison_reports_removed_credits() {
        let params = YearParameters::v2026();
        let joint_table = table_for(FilingStatus::MarriedJoint);
        let separate_table = table_for(FilingStatus::MarriedSeparate);
        let removed = vec!["Earned Income Tax Credit".to_string()];
        let input = JointComparisonInput {
            deduction_method: DeductionMethod::Standard,
            spouse1: SpouseScenarioInput { income: 40_000.0, itemized: None },
            spouse2: SpouseScenarioInput { income: 20_000.0, itemized: None },
            joint_brackets: &joint_table,
            separate_brackets: &separate_table,
            joint_standard_deduction: 30_600.0,
            separate_standard_deduction: 15_300.0,
            removed_credits: &removed,
            parameters: &params,
        };
        let comparison = compare_joint_filing(&input);
        let credit_note = comparison
            .notes
            .iter()
            .find(|note| note.kind == ComparisonNoteKind::CreditRestriction);
        match credit_note {
            Some(note) => {
                assert_eq!(note.message, "MFS ineligible for: Earned Income Tax Credit");
            }
            None => panic!("missing credit restriction note"),
        }
    }

    #[test]
    fn qbi_impact_threshold_by_status() {
        let params = YearParameters::v2026();
        let separate = qbi_impact(250_000.0, FilingStatus::MarriedSeparate, &params);
        assert!(separate.exceeds_threshold);
        assert_close(separate.threshold, 197_300.0);
        match &separate.note {
            Some(note) => assert!(note.contains("$250,000")),
            None => panic!("expected a note"),
        }

        let joint = qbi_impact(250_000.0, FilingStatus::MarriedJoint, &params);
        assert!(!joint.exceeds_threshold);
        assert!(joint.note.is_none());
    }

    #[test]
    fn data_version_hash_is_order_independent() {
        let forward = data_version_hash(&["2026-01-01T00:00:00Z", "2026-02-01T00:00:00Z"]);
        let reversed = data_version_hash(&["2026-02-01T00:00:00Z", "2026-01-01T00:00:00Z"]);
        assert_eq!(forward, reversed);
        assert_eq!(forward.len(), 64);
    }

    #[test]
    fn data_version_hash_empty_is_stable() {
        let empty: [&str; 0] = [];
        assert_eq!(
            data_version_hash(&empty),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn data_version_hash_changes_on_new_extraction() {
        let before = data_version_hash(&["2026-01-01T00:00:00Z"]);
        let after = data_version_hash(&["2026-01-01T00:00:00Z", "2026-03-01T00:00:00Z"]);
        assert_ne!(before, after);
    }

    #[test]
    fn joint_fingerprint_tracks_both_spouses() {
        let id1 = ClientId::new();
        let id2 = ClientId::new();
        let h1 = data_version_hash(&["2026-01-01T00:00:00Z"]);
        let h2 = data_version_hash(&["2026-01-02T00:00:00Z"]);

        let baseline = joint_fingerprint(&h1, &h2, id1, id2);
        assert_eq!(baseline, joint_fingerprint(&h1, &h2, id1, id2));

        let h2_changed = data_version_hash(&["2026-01-02T00:00:00Z", "2026-01-03T00:00:00Z"]);
        assert_ne!(baseline, joint_fingerprint(&h1, &h2_changed, id1, id2));
        assert_ne!(baseline, joint_fingerprint(&h2, &h1, id1, id2));
    }

    #[test]
    fn form_data_groups_and_overwrites() {
        let id = ClientId::new();
        let now = OffsetDateTime::UNIX_EPOCH;
        let fields = vec![
            ExtractedField {
                client_id: id,
                form_type: "W-2".to_string(),
                field_name: "wages".to_string(),
                field_value: "70000".to_string(),
                extracted_at: now,
            },
            ExtractedField {
                client_id: id,
                form_type: "W-2".to_string(),
                field_name: "wages".to_string(),
                field_value: "72000".to_string(),
                extracted_at: now,
            },
        ];
        let data = form_data(&fields);
        assert_close(numeric_field(&data, "W-2", "wages", 0.0), 72_000.0);
    }

    #[test]
    fn rfc3339_round_trip() {
        let stamp = must_ok(parse_rfc3339("2026-04-15T12:00:00Z"));
        assert_eq!(must_ok(rfc3339(stamp)), "2026-04-15T12:00:00Z");
        must_err(parse_rfc3339("not a timestamp"));
    }

    #[test]
    fn client_id_parses_own_display() {
        let id = ClientId::new();
        let parsed = must_ok(ClientId::parse(&id.to_string()));
        assert_eq!(id, parsed);
        must_err(ClientId::parse("not-a-ulid"));
    }

    #[test]
    fn status_strings_round_trip() {
        for status in [
            StrategyStatus::FullyUtilized,
            StrategyStatus::PartiallyUtilized,
            StrategyStatus::NotUtilized,
            StrategyStatus::NotApplicable,
            StrategyStatus::ErrorDetected,
            StrategyStatus::PotentiallyMissed,
            StrategyStatus::Suboptimal,
            StrategyStatus::CompliantPreObbba,
        ] {
            assert_eq!(StrategyStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(StrategyStatus::parse("bogus"), None);
    }
}
