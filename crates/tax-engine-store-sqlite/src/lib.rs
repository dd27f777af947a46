#![allow(clippy::missing_errors_doc)]

//! SQLite persistence: reference tables, clients, extracted form data, and
//! the analysis caches keyed by data-version fingerprints.

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use time::OffsetDateTime;
use ulid::Ulid;

use tax_engine_analysis::{
    analyze_strategies, check_separate_deduction_coordination, compare_joint_filing,
    data_version_hash, detect_income_types, filter_strategies_for_status, joint_fingerprint,
    rfc3339, summarize, validate_deduction_method_change, validate_joint_pair, AnalysisSummary,
    ClientId, ClientRecord, ExtractedField, FormData, IncomeType, JointComparison,
    JointComparisonInput, MethodChangeDecision, SpouseScenarioInput, StrategyRecommendation,
};
use tax_engine_core::{
    state_has_income_tax, BracketRow, BracketTable, DeductionMethod, FederalReference,
    FilingStatus, ItemizedInputs, JurisdictionKind, StandardDeductionRow, StateReference,
    YearParameters,
};

const MIGRATION_VERSION: i64 = 1;

const ALL_FILING_STATUSES: [FilingStatus; 5] = [
    FilingStatus::Single,
    FilingStatus::MarriedJoint,
    FilingStatus::MarriedSeparate,
    FilingStatus::HeadOfHousehold,
    FilingStatus::QualifyingSurvivingSpouse,
];

/// Every seeded jurisdiction, DC included.
const STATE_CODES: [&str; 51] = [
    "AL", "AK", "AZ", "AR", "CA", "CO", "CT", "DE", "FL", "GA", "HI", "ID", "IL", "IN", "IA",
    "KS", "KY", "LA", "ME", "MD", "MA", "MI", "MN", "MS", "MO", "MT", "NE", "NV", "NH", "NJ",
    "NM", "NY", "NC", "ND", "OH", "OK", "OR", "PA", "RI", "SC", "SD", "TN", "TX", "UT", "VT",
    "VA", "WA", "WV", "WI", "WY", "DC",
];

/// Flat placeholder rate for seeded state schedules.
const PLACEHOLDER_STATE_RATE: f64 = 0.05;
const PLACEHOLDER_STATE_DEDUCTION: f64 = 2_000.0;

const SCHEMA_V1: &str = r"
CREATE TABLE IF NOT EXISTS tax_brackets (
  bracket_id INTEGER PRIMARY KEY AUTOINCREMENT,
  jurisdiction TEXT NOT NULL CHECK (jurisdiction IN ('federal', 'state')),
  state_code TEXT NOT NULL DEFAULT '',
  filing_status TEXT NOT NULL CHECK (
    filing_status IN (
      'single',
      'married_joint',
      'married_separate',
      'head_of_household',
      'qualifying_surviving_spouse'
    )
  ),
  tax_year INTEGER NOT NULL,
  bracket_min REAL NOT NULL CHECK (bracket_min >= 0.0),
  bracket_max REAL,
  rate REAL NOT NULL CHECK (rate BETWEEN 0.0 AND 1.0),
  UNIQUE (jurisdiction, state_code, filing_status, tax_year, bracket_min)
);

CREATE INDEX IF NOT EXISTS idx_tax_brackets_lookup
  ON tax_brackets(jurisdiction, state_code, filing_status, tax_year, bracket_min);

CREATE TABLE IF NOT EXISTS standard_deductions (
  deduction_id INTEGER PRIMARY KEY AUTOINCREMENT,
  jurisdiction TEXT NOT NULL CHECK (jurisdiction IN ('federal', 'state')),
  state_code TEXT NOT NULL DEFAULT '',
  filing_status TEXT NOT NULL CHECK (
    filing_status IN (
      'single',
      'married_joint',
      'married_separate',
      'head_of_household',
      'qualifying_surviving_spouse'
    )
  ),
  tax_year INTEGER NOT NULL,
  amount REAL NOT NULL CHECK (amount >= 0.0),
  UNIQUE (jurisdiction, state_code, filing_status, tax_year)
);

CREATE TABLE IF NOT EXISTS year_parameters (
  tax_year INTEGER PRIMARY KEY,
  parameters_json TEXT NOT NULL,
  created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS clients (
  client_id TEXT PRIMARY KEY,
  display_name TEXT NOT NULL,
  filing_status TEXT NOT NULL CHECK (
    filing_status IN (
      'single',
      'married_joint',
      'married_separate',
      'head_of_household',
      'qualifying_surviving_spouse'
    )
  ),
  state_code TEXT,
  deduction_method TEXT NOT NULL DEFAULT 'standard'
    CHECK (deduction_method IN ('standard', 'itemized')),
  spouse_id TEXT REFERENCES clients(client_id),
  dependents INTEGER NOT NULL DEFAULT 0 CHECK (dependents >= 0),
  created_at TEXT NOT NULL,
  updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS extracted_data (
  entry_id TEXT PRIMARY KEY,
  client_id TEXT NOT NULL REFERENCES clients(client_id),
  form_type TEXT NOT NULL,
  field_name TEXT NOT NULL,
  field_value TEXT NOT NULL,
  extracted_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_extracted_data_client
  ON extracted_data(client_id, form_type);

CREATE TABLE IF NOT EXISTS itemized_deductions (
  client_id TEXT PRIMARY KEY REFERENCES clients(client_id),
  medical_expenses REAL NOT NULL DEFAULT 0.0 CHECK (medical_expenses >= 0.0),
  state_local_taxes REAL NOT NULL DEFAULT 0.0 CHECK (state_local_taxes >= 0.0),
  mortgage_interest REAL NOT NULL DEFAULT 0.0 CHECK (mortgage_interest >= 0.0),
  charitable_contributions REAL NOT NULL DEFAULT 0.0 CHECK (charitable_contributions >= 0.0),
  updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS analysis_summaries (
  client_id TEXT PRIMARY KEY REFERENCES clients(client_id),
  tax_year INTEGER NOT NULL,
  summary_json TEXT NOT NULL,
  income_types_json TEXT NOT NULL,
  data_version_hash TEXT NOT NULL,
  last_analyzed_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS analysis_strategies (
  client_id TEXT NOT NULL REFERENCES clients(client_id),
  position INTEGER NOT NULL CHECK (position >= 0),
  strategy_json TEXT NOT NULL,
  PRIMARY KEY (client_id, position)
);

CREATE TABLE IF NOT EXISTS joint_analysis_summaries (
  spouse1_id TEXT NOT NULL REFERENCES clients(client_id),
  spouse2_id TEXT NOT NULL REFERENCES clients(client_id),
  tax_year INTEGER NOT NULL,
  comparison_json TEXT NOT NULL,
  removed_credits_json TEXT NOT NULL,
  data_version_hash TEXT NOT NULL,
  last_analyzed_at TEXT NOT NULL,
  PRIMARY KEY (spouse1_id, spouse2_id)
);
";

/// One client's analysis output, cached or freshly computed.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq)]
pub struct ClientAnalysis {
    pub client_id: ClientId,
    pub tax_year: u16,
    pub summary: AnalysisSummary,
    pub strategies: Vec<StrategyRecommendation>,
    pub income_types: Vec<IncomeType>,
    pub data_version_hash: String,
    pub last_analyzed_at: String,
    pub from_cache: bool,
}

/// Joint-versus-separate analysis for a linked couple.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq)]
pub struct JointAnalysis {
    pub spouse1: ClientAnalysis,
    pub spouse2: ClientAnalysis,
    pub tax_year: u16,
    pub comparison: JointComparison,
    pub removed_credits: Vec<String>,
    pub data_version_hash: String,
    pub from_cache: bool,
}

pub struct SqliteTaxStore {
    conn: Connection,
}

impl SqliteTaxStore {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open sqlite database at {}", path.display()))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )
        .context("failed to configure sqlite pragmas")?;

        Ok(Self { conn })
    }

    pub fn migrate(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "CREATE TABLE IF NOT EXISTS schema_migrations (
                    version INTEGER PRIMARY KEY,
                    applied_at TEXT NOT NULL
                );",
            )
            .context("failed to ensure schema_migrations exists")?;

        self.conn
            .execute_batch(SCHEMA_V1)
            .context("failed to apply tax schema")?;

        let now = now_rfc3339()?;
        self.conn
            .execute(
                "INSERT OR IGNORE INTO schema_migrations(version, applied_at) VALUES (?1, ?2)",
                params![MIGRATION_VERSION, now],
            )
            .context("failed to register tax schema migration")?;

        Ok(())
    }

    /// Replaces the reference tables for both bundled regimes: the federal
    /// schedules, year parameters, and flat placeholder state schedules for
    /// every jurisdiction with an income tax.
    pub fn seed_reference_tables(&mut self) -> Result<()> {
        let now = now_rfc3339()?;
        let tx = self
            .conn
            .transaction()
            .context("failed to start seed transaction")?;

        for tax_year in [2026_i64, 2024_i64] {
            tx.execute("DELETE FROM tax_brackets WHERE tax_year = ?1", params![tax_year])
                .context("failed to clear tax_brackets")?;
            tx.execute(
                "DELETE FROM standard_deductions WHERE tax_year = ?1",
                params![tax_year],
            )
            .context("failed to clear standard_deductions")?;
        }

        for row in tax_engine_core::federal_bracket_rows_2026()
            .iter()
            .chain(tax_engine_core::federal_bracket_rows_2024().iter())
        {
            insert_bracket_row(&tx, row)?;
        }
        for row in &tax_engine_core::federal_standard_deductions() {
            insert_standard_deduction(&tx, row)?;
        }

        for tax_year in [2026_u16, 2024_u16] {
            for state_code in STATE_CODES {
                if !state_has_income_tax(state_code) {
                    continue;
                }
                for filing_status in ALL_FILING_STATUSES {
                    insert_bracket_row(
                        &tx,
                        &BracketRow {
                            jurisdiction: JurisdictionKind::State,
                            state_code: Some(state_code.to_string()),
                            filing_status,
                            tax_year,
                            bracket_min: 0.0,
                            bracket_max: None,
                            rate: PLACEHOLDER_STATE_RATE,
                        },
                    )?;
                    insert_standard_deduction(
                        &tx,
                        &StandardDeductionRow {
                            jurisdiction: JurisdictionKind::State,
                            state_code: Some(state_code.to_string()),
                            filing_status,
                            tax_year,
                            amount: PLACEHOLDER_STATE_DEDUCTION,
                        },
                    )?;
                }
            }
        }

        for parameters in [YearParameters::v2026(), YearParameters::v2024()] {
            parameters
                .validate()
                .map_err(|err| anyhow!("invalid year parameters: {err}"))?;
            let payload = serde_json::to_string(&parameters)
                .context("failed to serialize year parameters")?;
            tx.execute(
                "INSERT INTO year_parameters(tax_year, parameters_json, created_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(tax_year) DO UPDATE SET
                   parameters_json = excluded.parameters_json,
                   created_at = excluded.created_at",
                params![i64::from(parameters.tax_year), payload, now],
            )
            .context("failed to upsert year parameters")?;
        }

        tx.commit().context("failed to commit seed transaction")
    }

    // ------------------------------------------------------------------
    // Reference lookups
    // ------------------------------------------------------------------

    /// Loads a bracket schedule. `Ok(None)` means no rows exist for the
    /// key, which callers treat as "jurisdiction levies nothing here".
    pub fn bracket_table(
        &self,
        jurisdiction: JurisdictionKind,
        state_code: Option<&str>,
        filing_status: FilingStatus,
        tax_year: u16,
    ) -> Result<Option<BracketTable>> {
        let mut stmt = self.conn.prepare(
            "SELECT state_code, bracket_min, bracket_max, rate
             FROM tax_brackets
             WHERE jurisdiction = ?1 AND state_code = ?2 AND filing_status = ?3 AND tax_year = ?4
             ORDER BY bracket_min ASC",
        )?;
        let rows = stmt.query_map(
            params![
                jurisdiction.as_str(),
                state_code.unwrap_or_default(),
                filing_status.as_str(),
                i64::from(tax_year)
            ],
            |row| {
                let code: String = row.get(0)?;
                let bracket_min: f64 = row.get(1)?;
                let bracket_max: Option<f64> = row.get(2)?;
                let rate: f64 = row.get(3)?;
                Ok(BracketRow {
                    jurisdiction,
                    state_code: if code.is_empty() { None } else { Some(code) },
                    filing_status,
                    tax_year,
                    bracket_min,
                    bracket_max,
                    rate,
                })
            },
        )?;

        let rows = collect_rows(rows)?;
        if rows.is_empty() {
            return Ok(None);
        }
        let table = BracketTable::new(rows)
            .map_err(|err| anyhow!("stored bracket table is invalid: {err}"))?;
        Ok(Some(table))
    }

    /// `Ok(None)` when no row exists; a seeded zero is `Ok(Some(0.0))`.
    pub fn standard_deduction(
        &self,
        jurisdiction: JurisdictionKind,
        state_code: Option<&str>,
        filing_status: FilingStatus,
        tax_year: u16,
    ) -> Result<Option<f64>> {
        let amount = self
            .conn
            .query_row(
                "SELECT amount
                 FROM standard_deductions
                 WHERE jurisdiction = ?1 AND state_code = ?2
                   AND filing_status = ?3 AND tax_year = ?4",
                params![
                    jurisdiction.as_str(),
                    state_code.unwrap_or_default(),
                    filing_status.as_str(),
                    i64::from(tax_year)
                ],
                |row| row.get::<_, f64>(0),
            )
            .optional()
            .context("failed to query standard deduction")?;
        Ok(amount)
    }

    pub fn year_parameters(&self, tax_year: u16) -> Result<Option<YearParameters>> {
        let json = self
            .conn
            .query_row(
                "SELECT parameters_json FROM year_parameters WHERE tax_year = ?1",
                params![i64::from(tax_year)],
                |row| row.get::<_, String>(0),
            )
            .optional()
            .context("failed to query year parameters")?;

        let Some(json) = json else {
            return Ok(None);
        };
        let value: Value =
            serde_json::from_str(&json).context("invalid stored year parameters JSON")?;
        let parameters = YearParameters::from_json(&value)
            .map_err(|err| anyhow!("failed to parse year parameters for {tax_year}: {err}"))?;
        Ok(Some(parameters))
    }

    pub fn federal_reference(
        &self,
        filing_status: FilingStatus,
        tax_year: u16,
    ) -> Result<FederalReference> {
        let brackets = self
            .bracket_table(JurisdictionKind::Federal, None, filing_status, tax_year)?
            .ok_or_else(|| {
                anyhow!("no federal brackets seeded for {filing_status} in {tax_year}")
            })?;
        let standard_deduction =
            self.standard_deduction(JurisdictionKind::Federal, None, filing_status, tax_year)?;
        let parameters = self
            .year_parameters(tax_year)?
            .ok_or_else(|| anyhow!("no year parameters seeded for {tax_year}"))?;
        Ok(FederalReference { brackets, standard_deduction, parameters })
    }

    pub fn state_reference(
        &self,
        state_code: &str,
        filing_status: FilingStatus,
        tax_year: u16,
    ) -> Result<StateReference> {
        let code = state_code.to_uppercase();
        let brackets =
            self.bracket_table(JurisdictionKind::State, Some(&code), filing_status, tax_year)?;
        let standard_deduction =
            self.standard_deduction(JurisdictionKind::State, Some(&code), filing_status, tax_year)?;
        let parameters = self
            .year_parameters(tax_year)?
            .ok_or_else(|| anyhow!("no year parameters seeded for {tax_year}"))?;
        Ok(StateReference { brackets, standard_deduction, parameters })
    }

    // ------------------------------------------------------------------
    // Clients
    // ------------------------------------------------------------------

    pub fn upsert_client(&self, client: &ClientRecord) -> Result<()> {
        let now = now_rfc3339()?;
        self.conn
            .execute(
                "INSERT INTO clients(
                    client_id, display_name, filing_status, state_code,
                    deduction_method, spouse_id, dependents, created_at, updated_at
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)
                 ON CONFLICT(client_id) DO UPDATE SET
                   display_name = excluded.display_name,
                   filing_status = excluded.filing_status,
                   state_code = excluded.state_code,
                   deduction_method = excluded.deduction_method,
                   spouse_id = excluded.spouse_id,
                   dependents = excluded.dependents,
                   updated_at = excluded.updated_at",
                params![
                    client.id.to_string(),
                    client.display_name,
                    client.filing_status.as_str(),
                    client.state_code,
                    client.deduction_method.as_str(),
                    client.spouse_id.map(|id| id.to_string()),
                    i64::from(client.dependents),
                    now,
                ],
            )
            .context("failed to upsert client")?;
        Ok(())
    }

    pub fn get_client(&self, client_id: ClientId) -> Result<Option<ClientRecord>> {
        let row = self
            .conn
            .query_row(
                "SELECT client_id, display_name, filing_status, state_code,
                        deduction_method, spouse_id, dependents
                 FROM clients WHERE client_id = ?1",
                params![client_id.to_string()],
                parse_client_row,
            )
            .optional()
            .context("failed to query client")?;
        Ok(row)
    }

    fn require_client(&self, client_id: ClientId) -> Result<ClientRecord> {
        self.get_client(client_id)?
            .ok_or_else(|| anyhow!("client {client_id} not found"))
    }

    /// Links two clients as spouses, both directions in one transaction.
    pub fn link_spouses(&mut self, spouse1_id: ClientId, spouse2_id: ClientId) -> Result<()> {
        if spouse1_id == spouse2_id {
            return Err(anyhow!("a client cannot be linked to itself"));
        }
        self.require_client(spouse1_id)?;
        self.require_client(spouse2_id)?;

        let now = now_rfc3339()?;
        let tx = self
            .conn
            .transaction()
            .context("failed to start link transaction")?;
        for (id, other) in [(spouse1_id, spouse2_id), (spouse2_id, spouse1_id)] {
            tx.execute(
                "UPDATE clients SET spouse_id = ?1, updated_at = ?2 WHERE client_id = ?3",
                params![other.to_string(), now, id.to_string()],
            )
            .context("failed to link spouse")?;
        }
        tx.commit().context("failed to commit link transaction")
    }

    /// Applies a deduction-method change under the separate-filing
    /// coordination rules. A blocked change, or a cascade that was not
    /// confirmed, is returned without touching the database.
    pub fn set_deduction_method(
        &mut self,
        client_id: ClientId,
        new_method: DeductionMethod,
        confirm_cascade: bool,
    ) -> Result<MethodChangeDecision> {
        let client = self.require_client(client_id)?;
        let spouse = match client.spouse_id {
            Some(spouse_id) => self.get_client(spouse_id)?,
            None => None,
        };

        let decision = validate_deduction_method_change(&client, spouse.as_ref(), new_method);
        if !decision.allowed || (decision.cascade_to_spouse && !confirm_cascade) {
            return Ok(decision);
        }

        let now = now_rfc3339()?;
        let tx = self
            .conn
            .transaction()
            .context("failed to start deduction-method transaction")?;
        tx.execute(
            "UPDATE clients SET deduction_method = ?1, updated_at = ?2 WHERE client_id = ?3",
            params![new_method.as_str(), now, client_id.to_string()],
        )
        .context("failed to update deduction method")?;
        if decision.cascade_to_spouse {
            if let Some(spouse) = &spouse {
                tx.execute(
                    "UPDATE clients SET deduction_method = ?1, updated_at = ?2 WHERE client_id = ?3",
                    params![new_method.as_str(), now, spouse.id.to_string()],
                )
                .context("failed to cascade deduction method to spouse")?;
            }
        }
        tx.commit()
            .context("failed to commit deduction-method transaction")?;
        Ok(decision)
    }

    pub fn set_itemized_inputs(
        &self,
        client_id: ClientId,
        inputs: &ItemizedInputs,
    ) -> Result<()> {
        self.require_client(client_id)?;
        let now = now_rfc3339()?;
        self.conn
            .execute(
                "INSERT INTO itemized_deductions(
                    client_id, medical_expenses, state_local_taxes,
                    mortgage_interest, charitable_contributions, updated_at
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(client_id) DO UPDATE SET
                   medical_expenses = excluded.medical_expenses,
                   state_local_taxes = excluded.state_local_taxes,
                   mortgage_interest = excluded.mortgage_interest,
                   charitable_contributions = excluded.charitable_contributions,
                   updated_at = excluded.updated_at",
                params![
                    client_id.to_string(),
                    inputs.medical_expenses,
                    inputs.state_local_taxes,
                    inputs.mortgage_interest,
                    inputs.charitable_contributions,
                    now,
                ],
            )
            .context("failed to upsert itemized deductions")?;
        Ok(())
    }

    pub fn itemized_inputs(&self, client_id: ClientId) -> Result<Option<ItemizedInputs>> {
        let row = self
            .conn
            .query_row(
                "SELECT medical_expenses, state_local_taxes,
                        mortgage_interest, charitable_contributions
                 FROM itemized_deductions WHERE client_id = ?1",
                params![client_id.to_string()],
                |row| {
                    Ok(ItemizedInputs {
                        medical_expenses: row.get(0)?,
                        state_local_taxes: row.get(1)?,
                        mortgage_interest: row.get(2)?,
                        charitable_contributions: row.get(3)?,
                    })
                },
            )
            .optional()
            .context("failed to query itemized deductions")?;
        Ok(row)
    }

    // ------------------------------------------------------------------
    // Extracted data
    // ------------------------------------------------------------------

    /// Logs one form's extracted fields, all stamped with the same
    /// extraction time, in one transaction.
    pub fn log_extraction(
        &mut self,
        client_id: ClientId,
        form_type: &str,
        fields: &[(String, String)],
    ) -> Result<usize> {
        self.require_client(client_id)?;
        let now = now_rfc3339()?;
        let tx = self
            .conn
            .transaction()
            .context("failed to start extraction transaction")?;
        for (field_name, field_value) in fields {
            tx.execute(
                "INSERT INTO extracted_data(
                    entry_id, client_id, form_type, field_name, field_value, extracted_at
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    Ulid::new().to_string(),
                    client_id.to_string(),
                    form_type,
                    field_name,
                    field_value,
                    now,
                ],
            )
            .context("failed to insert extracted field")?;
        }
        tx.commit()
            .context("failed to commit extraction transaction")?;
        Ok(fields.len())
    }

    /// All extracted fields for one client, oldest first.
    pub fn extracted_fields(&self, client_id: ClientId) -> Result<Vec<ExtractedField>> {
        let mut stmt = self.conn.prepare(
            "SELECT form_type, field_name, field_value, extracted_at
             FROM extracted_data
             WHERE client_id = ?1
             ORDER BY extracted_at ASC, entry_id ASC",
        )?;
        let rows = stmt.query_map(params![client_id.to_string()], |row| {
            let form_type: String = row.get(0)?;
            let field_name: String = row.get(1)?;
            let field_value: String = row.get(2)?;
            let extracted_at_raw: String = row.get(3)?;
            let extracted_at = tax_engine_analysis::parse_rfc3339(&extracted_at_raw)
                .map_err(|err| column_error(err.to_string()))?;
            Ok(ExtractedField { client_id, form_type, field_name, field_value, extracted_at })
        })?;
        collect_rows(rows)
    }

    pub fn form_data(&self, client_id: ClientId) -> Result<FormData> {
        Ok(tax_engine_analysis::form_data(&self.extracted_fields(client_id)?))
    }

    fn extraction_timestamps(&self, client_ids: &[ClientId]) -> Result<Vec<String>> {
        let mut stamps = Vec::new();
        let mut stmt = self
            .conn
            .prepare("SELECT extracted_at FROM extracted_data WHERE client_id = ?1")?;
        for client_id in client_ids {
            let rows =
                stmt.query_map(params![client_id.to_string()], |row| row.get::<_, String>(0))?;
            stamps.extend(collect_rows(rows)?);
        }
        Ok(stamps)
    }

    /// Fingerprint over a client's extraction history. A linked spouse's
    /// rows are included, since joint scenarios depend on both.
    pub fn data_version_hash_for(&self, client_id: ClientId) -> Result<String> {
        let client = self.require_client(client_id)?;
        let mut ids = vec![client_id];
        if let Some(spouse_id) = client.spouse_id {
            ids.push(spouse_id);
        }
        Ok(data_version_hash(&self.extraction_timestamps(&ids)?))
    }

    // ------------------------------------------------------------------
    // Analysis
    // ------------------------------------------------------------------

    /// Analyzes one client, serving the cached result while the data
    /// fingerprint still matches. A recompute replaces the summary and the
    /// strategy rows in one transaction. A client with no extracted data
    /// gets a zero summary, computed and cached like any other result;
    /// the first logged field changes the fingerprint and invalidates it.
    pub fn analyze_client(
        &mut self,
        client_id: ClientId,
        tax_year: u16,
        force_refresh: bool,
    ) -> Result<ClientAnalysis> {
        self.require_client(client_id)?;
        let current_hash = self.data_version_hash_for(client_id)?;

        if !force_refresh {
            if let Some(cached) = self.cached_client_analysis(client_id)? {
                if cached.data_version_hash == current_hash && cached.tax_year == tax_year {
                    return Ok(cached);
                }
            }
        }

        let data = self.form_data(client_id)?;
        let summary = summarize(&data);
        let strategies = analyze_strategies(&data, tax_year);
        let income_types = detect_income_types(&data);
        let now = now_rfc3339()?;

        let summary_json =
            serde_json::to_string(&summary).context("failed to serialize summary")?;
        let income_types_json =
            serde_json::to_string(&income_types).context("failed to serialize income types")?;

        let tx = self
            .conn
            .transaction()
            .context("failed to start analysis transaction")?;
        tx.execute(
            "INSERT INTO analysis_summaries(
                client_id, tax_year, summary_json, income_types_json,
                data_version_hash, last_analyzed_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(client_id) DO UPDATE SET
               tax_year = excluded.tax_year,
               summary_json = excluded.summary_json,
               income_types_json = excluded.income_types_json,
               data_version_hash = excluded.data_version_hash,
               last_analyzed_at = excluded.last_analyzed_at",
            params![
                client_id.to_string(),
                i64::from(tax_year),
                summary_json,
                income_types_json,
                current_hash,
                now,
            ],
        )
        .context("failed to upsert analysis summary")?;

        tx.execute(
            "DELETE FROM analysis_strategies WHERE client_id = ?1",
            params![client_id.to_string()],
        )
        .context("failed to clear analysis strategies")?;
        for (position, strategy) in strategies.iter().enumerate() {
            let strategy_json =
                serde_json::to_string(strategy).context("failed to serialize strategy")?;
            tx.execute(
                "INSERT INTO analysis_strategies(client_id, position, strategy_json)
                 VALUES (?1, ?2, ?3)",
                params![
                    client_id.to_string(),
                    i64::try_from(position).unwrap_or(i64::MAX),
                    strategy_json
                ],
            )
            .context("failed to insert analysis strategy")?;
        }
        tx.commit()
            .context("failed to commit analysis transaction")?;

        Ok(ClientAnalysis {
            client_id,
            tax_year,
            summary,
            strategies,
            income_types,
            data_version_hash: current_hash,
            last_analyzed_at: now,
            from_cache: false,
        })
    }

    fn cached_client_analysis(&self, client_id: ClientId) -> Result<Option<ClientAnalysis>> {
        let row = self
            .conn
            .query_row(
                "SELECT tax_year, summary_json, income_types_json,
                        data_version_hash, last_analyzed_at
                 FROM analysis_summaries WHERE client_id = ?1",
                params![client_id.to_string()],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                },
            )
            .optional()
            .context("failed to query cached analysis")?;

        let Some((tax_year_i64, summary_json, income_types_json, hash, last_analyzed_at)) = row
        else {
            return Ok(None);
        };

        let tax_year = u16::try_from(tax_year_i64)
            .with_context(|| format!("invalid cached tax_year: {tax_year_i64}"))?;
        let summary: AnalysisSummary =
            serde_json::from_str(&summary_json).context("invalid cached summary JSON")?;
        let income_types: Vec<IncomeType> = serde_json::from_str(&income_types_json)
            .context("invalid cached income types JSON")?;

        let mut stmt = self.conn.prepare(
            "SELECT strategy_json FROM analysis_strategies
             WHERE client_id = ?1 ORDER BY position ASC",
        )?;
        let rows = stmt.query_map(params![client_id.to_string()], |row| {
            row.get::<_, String>(0)
        })?;
        let mut strategies = Vec::new();
        for json in collect_rows(rows)? {
            strategies.push(
                serde_json::from_str::<StrategyRecommendation>(&json)
                    .context("invalid cached strategy JSON")?,
            );
        }

        Ok(Some(ClientAnalysis {
            client_id,
            tax_year,
            summary,
            strategies,
            income_types,
            data_version_hash: hash,
            last_analyzed_at,
            from_cache: true,
        }))
    }

    /// Joint analysis for a linked couple: coordination is checked before
    /// any math, the cache is keyed by the combined fingerprint, and a
    /// recompute replaces the cached row in one transaction.
    pub fn analyze_joint(
        &mut self,
        spouse1_id: ClientId,
        spouse2_id: ClientId,
        tax_year: u16,
        force_refresh: bool,
    ) -> Result<JointAnalysis> {
        let spouse1 = self.require_client(spouse1_id)?;
        let spouse2 = self.require_client(spouse2_id)?;
        validate_joint_pair(&spouse1, &spouse2).map_err(|err| anyhow!(err.to_string()))?;
        let deduction_method = check_separate_deduction_coordination(&spouse1, &spouse2)
            .map_err(|err| anyhow!("deduction coordination error: {err}"))?;

        let hash1 = self.data_version_hash_for(spouse1_id)?;
        let hash2 = self.data_version_hash_for(spouse2_id)?;
        let joint_hash = joint_fingerprint(&hash1, &hash2, spouse1_id, spouse2_id);

        if !force_refresh {
            if let Some(cached) =
                self.cached_joint_analysis(spouse1_id, spouse2_id, tax_year, &joint_hash)?
            {
                return Ok(cached);
            }
        }

        let spouse1_analysis = self.analyze_client(spouse1_id, tax_year, force_refresh)?;
        let spouse2_analysis = self.analyze_client(spouse2_id, tax_year, force_refresh)?;

        let (_, removed1) = filter_strategies_for_status(
            spouse1_analysis.strategies.clone(),
            FilingStatus::MarriedSeparate,
        );
        let (_, removed2) = filter_strategies_for_status(
            spouse2_analysis.strategies.clone(),
            FilingStatus::MarriedSeparate,
        );
        let mut removed_credits: Vec<String> = removed1;
        for name in removed2 {
            if !removed_credits.contains(&name) {
                removed_credits.push(name);
            }
        }

        let joint_brackets = self
            .bracket_table(JurisdictionKind::Federal, None, FilingStatus::MarriedJoint, tax_year)?
            .ok_or_else(|| anyhow!("no federal brackets seeded for married_joint in {tax_year}"))?;
        let separate_brackets = self
            .bracket_table(
                JurisdictionKind::Federal,
                None,
                FilingStatus::MarriedSeparate,
                tax_year,
            )?
            .ok_or_else(|| {
                anyhow!("no federal brackets seeded for married_separate in {tax_year}")
            })?;
        let joint_standard_deduction = self
            .standard_deduction(
                JurisdictionKind::Federal,
                None,
                FilingStatus::MarriedJoint,
                tax_year,
            )?
            .ok_or_else(|| anyhow!("no standard deduction for married_joint in {tax_year}"))?;
        let separate_standard_deduction = self
            .standard_deduction(
                JurisdictionKind::Federal,
                None,
                FilingStatus::MarriedSeparate,
                tax_year,
            )?
            .ok_or_else(|| anyhow!("no standard deduction for married_separate in {tax_year}"))?;
        let parameters = self
            .year_parameters(tax_year)?
            .ok_or_else(|| anyhow!("no year parameters seeded for {tax_year}"))?;

        let spouse1_items = self.itemized_inputs(spouse1_id)?;
        let spouse2_items = self.itemized_inputs(spouse2_id)?;

        let comparison = compare_joint_filing(&JointComparisonInput {
            deduction_method,
            spouse1: SpouseScenarioInput {
                income: spouse1_analysis.summary.total_income,
                itemized: spouse1_items,
            },
            spouse2: SpouseScenarioInput {
                income: spouse2_analysis.summary.total_income,
                itemized: spouse2_items,
            },
            joint_brackets: &joint_brackets,
            separate_brackets: &separate_brackets,
            joint_standard_deduction,
            separate_standard_deduction,
            removed_credits: &removed_credits,
            parameters: &parameters,
        });

        let now = now_rfc3339()?;
        let comparison_json =
            serde_json::to_string(&comparison).context("failed to serialize comparison")?;
        let removed_json = serde_json::to_string(&removed_credits)
            .context("failed to serialize removed credits")?;

        let tx = self
            .conn
            .transaction()
            .context("failed to start joint analysis transaction")?;
        tx.execute(
            "INSERT INTO joint_analysis_summaries(
                spouse1_id, spouse2_id, tax_year, comparison_json,
                removed_credits_json, data_version_hash, last_analyzed_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(spouse1_id, spouse2_id) DO UPDATE SET
               tax_year = excluded.tax_year,
               comparison_json = excluded.comparison_json,
               removed_credits_json = excluded.removed_credits_json,
               data_version_hash = excluded.data_version_hash,
               last_analyzed_at = excluded.last_analyzed_at",
            params![
                spouse1_id.to_string(),
                spouse2_id.to_string(),
                i64::from(tax_year),
                comparison_json,
                removed_json,
                joint_hash,
                now,
            ],
        )
        .context("failed to upsert joint analysis")?;
        tx.commit()
            .context("failed to commit joint analysis transaction")?;

        Ok(JointAnalysis {
            spouse1: spouse1_analysis,
            spouse2: spouse2_analysis,
            tax_year,
            comparison,
            removed_credits,
            data_version_hash: joint_hash,
            from_cache: false,
        })
    }

    fn cached_joint_analysis(
        &mut self,
        spouse1_id: ClientId,
        spouse2_id: ClientId,
        tax_year: u16,
        joint_hash: &str,
    ) -> Result<Option<JointAnalysis>> {
        let row = self
            .conn
            .query_row(
                "SELECT tax_year, comparison_json, removed_credits_json, data_version_hash
                 FROM joint_analysis_summaries
                 WHERE spouse1_id = ?1 AND spouse2_id = ?2",
                params![spouse1_id.to_string(), spouse2_id.to_string()],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()
            .context("failed to query cached joint analysis")?;

        let Some((cached_year, comparison_json, removed_json, cached_hash)) = row else {
            return Ok(None);
        };
        if cached_hash != joint_hash || i64::from(tax_year) != cached_year {
            return Ok(None);
        }

        let comparison: JointComparison =
            serde_json::from_str(&comparison_json).context("invalid cached comparison JSON")?;
        let removed_credits: Vec<String> =
            serde_json::from_str(&removed_json).context("invalid cached removed credits")?;

        let spouse1 = self.analyze_client(spouse1_id, tax_year, false)?;
        let spouse2 = self.analyze_client(spouse2_id, tax_year, false)?;

        Ok(Some(JointAnalysis {
            spouse1,
            spouse2,
            tax_year,
            comparison,
            removed_credits,
            data_version_hash: cached_hash,
            from_cache: true,
        }))
    }

    #[cfg(test)]
    fn connection(&self) -> &Connection {
        &self.conn
    }
}

fn insert_bracket_row(tx: &rusqlite::Transaction<'_>, row: &BracketRow) -> Result<()> {
    tx.execute(
        "INSERT INTO tax_brackets(
            jurisdiction, state_code, filing_status, tax_year,
            bracket_min, bracket_max, rate
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            row.jurisdiction.as_str(),
            row.state_code.clone().unwrap_or_default(),
            row.filing_status.as_str(),
            i64::from(row.tax_year),
            row.bracket_min,
            row.bracket_max,
            row.rate,
        ],
    )
    .context("failed to insert bracket row")?;
    Ok(())
}

fn insert_standard_deduction(
    tx: &rusqlite::Transaction<'_>,
    row: &StandardDeductionRow,
) -> Result<()> {
    tx.execute(
        "INSERT INTO standard_deductions(
            jurisdiction, state_code, filing_status, tax_year, amount
         ) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            row.jurisdiction.as_str(),
            row.state_code.clone().unwrap_or_default(),
            row.filing_status.as_str(),
            i64::from(row.tax_year),
            row.amount,
        ],
    )
    .context("failed to insert standard deduction")?;
    Ok(())
}

fn parse_client_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ClientRecord> {
    let id_raw: String = row.get(0)?;
    let display_name: String = row.get(1)?;
    let filing_raw: String = row.get(2)?;
    let state_code: Option<String> = row.get(3)?;
    let method_raw: String = row.get(4)?;
    let spouse_raw: Option<String> = row.get(5)?;
    let dependents_i64: i64 = row.get(6)?;

    let id = ClientId::parse(&id_raw).map_err(|err| column_error(err.to_string()))?;
    let filing_status = FilingStatus::parse(&filing_raw)
        .ok_or_else(|| column_error(format!("invalid filing status: {filing_raw}")))?;
    let deduction_method = DeductionMethod::parse(&method_raw)
        .ok_or_else(|| column_error(format!("invalid deduction method: {method_raw}")))?;
    let spouse_id = match spouse_raw {
        Some(raw) => Some(ClientId::parse(&raw).map_err(|err| column_error(err.to_string()))?),
        None => None,
    };
    let dependents = u32::try_from(dependents_i64)
        .map_err(|_| column_error(format!("invalid dependents count: {dependents_i64}")))?;

    Ok(ClientRecord {
        id,
        display_name,
        filing_status,
        state_code,
        deduction_method,
        spouse_id,
        dependents,
    })
}

fn column_error(message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        0,
        rusqlite::types::Type::Text,
        Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, message)),
    )
}

fn collect_rows<T>(
    rows: rusqlite::MappedRows<'_, impl FnMut(&rusqlite::Row<'_>) -> rusqlite::Result<T>>,
) -> Result<Vec<T>> {
    let mut values = Vec::new();
    for row in rows {
        values.push(row?);
    }
    Ok(values)
}

fn now_rfc3339() -> Result<String> {
    rfc3339(OffsetDateTime::now_utc()).map_err(|err| anyhow!(err.to_string()))
}
