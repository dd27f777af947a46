//! `taxctl` command surface.
//!
//! Embedding hosts should go through [`run_cli`] for full parsed execution
//! or [`run_command`] to execute a parsed command against an existing
//! [`SqliteTaxStore`].

use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tax_engine_analysis::{ClientId, ClientRecord, MethodChangeDecision};
use tax_engine_core::{
    compute_federal_tax, compute_state_tax, DeductionMethod, FederalTaxRequest, FilingStatus,
    IncomeSource, ItemizedInputs,
};
use tax_engine_store_sqlite::SqliteTaxStore;

#[derive(Debug, Parser)]
#[command(name = "taxctl")]
#[command(about = "Income tax calculation and analysis CLI")]
pub struct Cli {
    #[arg(long, default_value = "./tax_engine.sqlite3")]
    db: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    Tables {
        #[command(subcommand)]
        command: TablesCommand,
    },
    Client {
        #[command(subcommand)]
        command: Box<ClientCommand>,
    },
    Data {
        #[command(subcommand)]
        command: DataCommand,
    },
    Calc {
        #[command(subcommand)]
        command: Box<CalcCommand>,
    },
    Analyze {
        #[command(subcommand)]
        command: AnalyzeCommand,
    },
}

#[derive(Debug, Subcommand)]
pub enum TablesCommand {
    /// Seeds bracket schedules, standard deductions, and year parameters.
    Seed,
}

#[derive(Debug, Subcommand)]
pub enum ClientCommand {
    Add(ClientAddArgs),
    Show(ClientShowArgs),
    Link(ClientLinkArgs),
    SetDeductionMethod(SetDeductionMethodArgs),
    SetItemized(SetItemizedArgs),
}

#[derive(Debug, Args)]
pub struct ClientAddArgs {
    #[arg(long)]
    display_name: String,
    #[arg(long)]
    filing_status: FilingStatusArg,
    #[arg(long)]
    state: Option<String>,
    #[arg(long, default_value = "standard")]
    deduction_method: DeductionMethodArg,
    #[arg(long, default_value_t = 0)]
    dependents: u32,
}

#[derive(Debug, Args)]
pub struct ClientShowArgs {
    #[arg(long)]
    client_id: String,
}

#[derive(Debug, Args)]
pub struct ClientLinkArgs {
    #[arg(long)]
    spouse1: String,
    #[arg(long)]
    spouse2: String,
}

#[derive(Debug, Args)]
pub struct SetDeductionMethodArgs {
    #[arg(long)]
    client_id: String,
    #[arg(long)]
    method: DeductionMethodArg,
    /// Apply the change to the linked spouse as well when the separate
    /// filing rules require both to switch.
    #[arg(long)]
    confirm_cascade: bool,
}

#[derive(Debug, Args)]
pub struct SetItemizedArgs {
    #[arg(long)]
    client_id: String,
    #[arg(long, default_value_t = 0.0)]
    medical: f64,
    #[arg(long, default_value_t = 0.0)]
    state_local_taxes: f64,
    #[arg(long, default_value_t = 0.0)]
    mortgage_interest: f64,
    #[arg(long, default_value_t = 0.0)]
    charitable: f64,
}

#[derive(Debug, Subcommand)]
pub enum DataCommand {
    Log(DataLogArgs),
}

#[derive(Debug, Args)]
pub struct DataLogArgs {
    #[arg(long)]
    client_id: String,
    #[arg(long)]
    form: String,
    /// Repeated `name=value` pairs.
    #[arg(long = "field")]
    fields: Vec<String>,
}

#[derive(Debug, Subcommand)]
pub enum CalcCommand {
    Federal(CalcFederalArgs),
    State(CalcStateArgs),
}

#[derive(Debug, Args)]
pub struct CalcFederalArgs {
    #[arg(long)]
    filing_status: FilingStatusArg,
    #[arg(long, default_value_t = 2026)]
    tax_year: u16,
    #[arg(long, default_value = "w2")]
    source: IncomeSourceArg,
    #[arg(long, default_value_t = 0.0)]
    income: f64,
    #[arg(long, default_value_t = 0.0)]
    salary: f64,
    #[arg(long, default_value_t = 0.0)]
    distributions: f64,
    #[arg(long, default_value_t = 0)]
    dependents: u32,
}

#[derive(Debug, Args)]
pub struct CalcStateArgs {
    #[arg(long)]
    state: String,
    #[arg(long)]
    filing_status: FilingStatusArg,
    #[arg(long, default_value_t = 2026)]
    tax_year: u16,
    #[arg(long)]
    income: f64,
}

#[derive(Debug, Subcommand)]
pub enum AnalyzeCommand {
    Client(AnalyzeClientArgs),
    Joint(AnalyzeJointArgs),
}

#[derive(Debug, Args)]
pub struct AnalyzeClientArgs {
    #[arg(long)]
    client_id: String,
    #[arg(long, default_value_t = 2026)]
    tax_year: u16,
    #[arg(long)]
    force_refresh: bool,
}

#[derive(Debug, Args)]
pub struct AnalyzeJointArgs {
    #[arg(long)]
    spouse1: String,
    #[arg(long)]
    spouse2: String,
    #[arg(long, default_value_t = 2026)]
    tax_year: u16,
    #[arg(long)]
    force_refresh: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum FilingStatusArg {
    Single,
    MarriedJoint,
    MarriedSeparate,
    HeadOfHousehold,
    QualifyingSurvivingSpouse,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum IncomeSourceArg {
    W2,
    Llc,
    SCorp,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum DeductionMethodArg {
    Standard,
    Itemized,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, PartialEq)]
struct SeedOutput {
    seeded: bool,
    tax_years: Vec<u16>,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, PartialEq)]
struct DataLogOutput {
    client_id: ClientId,
    form_type: String,
    fields_logged: usize,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, PartialEq)]
struct MethodChangeOutput {
    applied: bool,
    decision: MethodChangeDecision,
}

/// Executes the parsed top-level CLI command graph.
///
/// # Errors
/// Returns an error when store open/migrate or command execution fails.
pub fn run_cli(cli: Cli) -> Result<()> {
    let mut store = SqliteTaxStore::open(&cli.db)?;
    store.migrate()?;
    run_command(cli.command, &mut store)
}

/// Executes a parsed command against an existing store handle.
///
/// # Errors
/// Returns an error when validation, persistence, or computation fails.
pub fn run_command(command: Command, store: &mut SqliteTaxStore) -> Result<()> {
    match command {
        Command::Tables { command } => run_tables(command, store),
        Command::Client { command } => run_client(*command, store),
        Command::Data { command } => run_data(command, store),
        Command::Calc { command } => run_calc(*command, store),
        Command::Analyze { command } => run_analyze(command, store),
    }
}

fn run_tables(command: TablesCommand, store: &mut SqliteTaxStore) -> Result<()> {
    match command {
        TablesCommand::Seed => {
            store.seed_reference_tables()?;
            let output = SeedOutput { seeded: true, tax_years: vec![2026, 2024] };
            println!("{}", serde_json::to_string_pretty(&output)?);
            Ok(())
        }
    }
}

fn run_client(command: ClientCommand, store: &mut SqliteTaxStore) -> Result<()> {
    match command {
        ClientCommand::Add(args) => {
            let record = ClientRecord {
                id: ClientId::new(),
                display_name: args.display_name,
                filing_status: map_filing_status(args.filing_status),
                state_code: args.state.map(|code| code.to_uppercase()),
                deduction_method: map_deduction_method(args.deduction_method),
                spouse_id: None,
                dependents: args.dependents,
            };
            store.upsert_client(&record)?;
            println!("{}", serde_json::to_string_pretty(&record)?);
            Ok(())
        }
        ClientCommand::Show(args) => {
            let client_id = parse_client_id(&args.client_id)?;
            let record = store
                .get_client(client_id)?
                .ok_or_else(|| anyhow!("client {client_id} not found"))?;
            println!("{}", serde_json::to_string_pretty(&record)?);
            Ok(())
        }
        ClientCommand::Link(args) => {
            let spouse1 = parse_client_id(&args.spouse1)?;
            let spouse2 = parse_client_id(&args.spouse2)?;
            store.link_spouses(spouse1, spouse2)?;
            let record = store
                .get_client(spouse1)?
                .ok_or_else(|| anyhow!("client {spouse1} not found"))?;
            println!("{}", serde_json::to_string_pretty(&record)?);
            Ok(())
        }
        ClientCommand::SetDeductionMethod(args) => {
            let client_id = parse_client_id(&args.client_id)?;
            let method = map_deduction_method(args.method);
            let decision = store.set_deduction_method(client_id, method, args.confirm_cascade)?;
            let applied =
                decision.allowed && (!decision.cascade_to_spouse || args.confirm_cascade);
            let blocked = !decision.allowed;
            let message = decision.message.clone();
            let output = MethodChangeOutput { applied, decision };
            println!("{}", serde_json::to_string_pretty(&output)?);
            if blocked {
                return Err(anyhow!("deduction method change blocked: {message}"));
            }
            Ok(())
        }
        ClientCommand::SetItemized(args) => {
            let client_id = parse_client_id(&args.client_id)?;
            let inputs = ItemizedInputs {
                medical_expenses: args.medical,
                state_local_taxes: args.state_local_taxes,
                mortgage_interest: args.mortgage_interest,
                charitable_contributions: args.charitable,
            };
            store.set_itemized_inputs(client_id, &inputs)?;
            println!("{}", serde_json::to_string_pretty(&inputs)?);
            Ok(())
        }
    }
}

fn run_data(command: DataCommand, store: &mut SqliteTaxStore) -> Result<()> {
    match command {
        DataCommand::Log(args) => {
            if args.fields.is_empty() {
                return Err(anyhow!("at least one --field name=value is required"));
            }
            let client_id = parse_client_id(&args.client_id)?;
            let fields = args
                .fields
                .iter()
                .map(|raw| parse_field(raw))
                .collect::<Result<Vec<_>>>()?;
            let fields_logged = store.log_extraction(client_id, &args.form, &fields)?;
            let output = DataLogOutput { client_id, form_type: args.form, fields_logged };
            println!("{}", serde_json::to_string_pretty(&output)?);
            Ok(())
        }
    }
}

fn run_calc(command: CalcCommand, store: &SqliteTaxStore) -> Result<()> {
    match command {
        CalcCommand::Federal(args) => {
            let filing_status = map_filing_status(args.filing_status);
            let reference = store.federal_reference(filing_status, args.tax_year)?;
            let request = FederalTaxRequest {
                income: args.income,
                filing_status,
                dependents: args.dependents,
                tax_year: args.tax_year,
                source: map_income_source(args.source),
                salary: args.salary,
                distributions: args.distributions,
            };
            let result = compute_federal_tax(&request, &reference)
                .map_err(|err| anyhow!(err.to_string()))?;
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }
        CalcCommand::State(args) => {
            let filing_status = map_filing_status(args.filing_status);
            let reference = store.state_reference(&args.state, filing_status, args.tax_year)?;
            let result = compute_state_tax(args.income, filing_status, &args.state, &reference);
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }
    }
}

fn run_analyze(command: AnalyzeCommand, store: &mut SqliteTaxStore) -> Result<()> {
    match command {
        AnalyzeCommand::Client(args) => {
            let client_id = parse_client_id(&args.client_id)?;
            let analysis = store.analyze_client(client_id, args.tax_year, args.force_refresh)?;
            println!("{}", serde_json::to_string_pretty(&analysis)?);
            Ok(())
        }
        AnalyzeCommand::Joint(args) => {
            let spouse1 = parse_client_id(&args.spouse1)?;
            let spouse2 = parse_client_id(&args.spouse2)?;
            let analysis =
                store.analyze_joint(spouse1, spouse2, args.tax_year, args.force_refresh)?;
            println!("{}", serde_json::to_string_pretty(&analysis)?);
            Ok(())
        }
    }
}

fn parse_client_id(raw: &str) -> Result<ClientId> {
    ClientId::parse(raw).with_context(|| format!("invalid client id: {raw}"))
}

fn parse_field(raw: &str) -> Result<(String, String)> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| anyhow!("field must be name=value, got: {raw}"))?;
    if name.is_empty() {
        return Err(anyhow!("field name must not be empty: {raw}"));
    }
    Ok((name.to_string(), value.to_string()))
}

fn map_filing_status(value: FilingStatusArg) -> FilingStatus {
    match value {
        FilingStatusArg::Single => FilingStatus::Single,
        FilingStatusArg::MarriedJoint => FilingStatus::MarriedJoint,
        FilingStatusArg::MarriedSeparate => FilingStatus::MarriedSeparate,
        FilingStatusArg::HeadOfHousehold => FilingStatus::HeadOfHousehold,
        FilingStatusArg::QualifyingSurvivingSpouse => FilingStatus::QualifyingSurvivingSpouse,
    }
}

fn map_income_source(value: IncomeSourceArg) -> IncomeSource {
    match value {
        IncomeSourceArg::W2 => IncomeSource::W2,
        IncomeSourceArg::Llc => IncomeSource::Llc,
        IncomeSourceArg::SCorp => IncomeSource::SCorp,
    }
}

fn map_deduction_method(value: DeductionMethodArg) -> DeductionMethod {
    match value {
        DeductionMethodArg::Standard => DeductionMethod::Standard,
        DeductionMethodArg::Itemized => DeductionMethod::Itemized,
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::too_many_lines)]

    use super::*;
    use std::fs;
    use std::path::Path;
    use ulid::Ulid;

    fn must<T>(result: Result<T>) -> T {
        match result {
            Ok(value) => value,
            Err(err) => panic!("test failure: {err}"),
        }
    }

    fn execute_cli(args: Vec<String>) -> Result<()> {
        let cli = Cli::try_parse_from(args)?;
        run_cli(cli)
    }

    #[test]
    fn parse_field_splits_on_first_equals() {
        let (name, value) = must(parse_field("wages=80000"));
        assert_eq!(name, "wages");
        assert_eq!(value, "80000");

        let (name, value) = must(parse_field("note=a=b"));
        assert_eq!(name, "note");
        assert_eq!(value, "a=b");
    }

    #[test]
    fn parse_field_rejects_malformed_input() {
        assert!(parse_field("wages").is_err());
        assert!(parse_field("=80000").is_err());
    }

    #[test]
    fn parse_client_id_rejects_non_ulid() {
        assert!(parse_client_id("not-a-ulid").is_err());
    }

    #[test]
    fn seed_and_calc_federal_end_to_end() {
        let db_path = std::env::temp_dir().join(format!("taxctl-calc-{}.sqlite3", Ulid::new()));
        let db = match db_path.to_str() {
            Some(value) => value.to_string(),
            None => panic!("temp db path must be valid UTF-8"),
        };

        must(execute_cli(vec![
            "taxctl".to_string(),
            "--db".to_string(),
            db.clone(),
            "tables".to_string(),
            "seed".to_string(),
        ]));
        must(execute_cli(vec![
            "taxctl".to_string(),
            "--db".to_string(),
            db.clone(),
            "calc".to_string(),
            "federal".to_string(),
            "--filing-status".to_string(),
            "single".to_string(),
            "--income".to_string(),
            "80000".to_string(),
        ]));
        must(execute_cli(vec![
            "taxctl".to_string(),
            "--db".to_string(),
            db,
            "calc".to_string(),
            "state".to_string(),
            "--state".to_string(),
            "TX".to_string(),
            "--filing-status".to_string(),
            "single".to_string(),
            "--income".to_string(),
            "80000".to_string(),
        ]));

        let _ = fs::remove_file(&db_path);
    }

    #[test]
    fn analysis_flow_with_store_handle() {
        let db_path = std::env::temp_dir().join(format!("taxctl-flow-{}.sqlite3", Ulid::new()));
        let mut store = must(SqliteTaxStore::open(&db_path));
        must(store.migrate());
        must(store.seed_reference_tables());

        let record = ClientRecord {
            id: ClientId::new(),
            display_name: "CLI Fixture".to_string(),
            filing_status: FilingStatus::Single,
            state_code: None,
            deduction_method: DeductionMethod::Standard,
            spouse_id: None,
            dependents: 0,
        };
        must(store.upsert_client(&record));

        must(run_command(
            Command::Data {
                command: DataCommand::Log(DataLogArgs {
                    client_id: record.id.to_string(),
                    form: "W-2".to_string(),
                    fields: vec!["wages=80000".to_string()],
                }),
            },
            &mut store,
        ));
        must(run_command(
            Command::Analyze {
                command: AnalyzeCommand::Client(AnalyzeClientArgs {
                    client_id: record.id.to_string(),
                    tax_year: 2026,
                    force_refresh: false,
                }),
            },
            &mut store,
        ));

        let analysis = must(store.analyze_client(record.id, 2026, false));
        assert!(analysis.from_cache);
        assert!((analysis.summary.total_income - 80_000.0).abs() < f64::EPSILON);

        drop(store);
        let _ = fs::remove_file(Path::new(&db_path));
    }

    #[test]
    fn calc_federal_surfaces_validation_errors() {
        let db_path = std::env::temp_dir().join(format!("taxctl-invalid-{}.sqlite3", Ulid::new()));
        let mut store = must(SqliteTaxStore::open(&db_path));
        must(store.migrate());
        must(store.seed_reference_tables());

        let result = run_command(
            Command::Calc {
                command: Box::new(CalcCommand::Federal(CalcFederalArgs {
                    filing_status: FilingStatusArg::Single,
                    tax_year: 2026,
                    source: IncomeSourceArg::SCorp,
                    income: 100_000.0,
                    salary: 0.0,
                    distributions: 100_000.0,
                    dependents: 0,
                })),
            },
            &mut store,
        );
        assert!(result.is_err());

        drop(store);
        let _ = fs::remove_file(&db_path);
    }
}
