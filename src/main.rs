use clap::Parser;
use sacco_ledger::args::{
    Args, BankSubcommand, Command, DividendSubcommand, ExpenseSubcommand, GuarantorSubcommand,
    IncomeSubcommand, LoanSubcommand, MemberSubcommand, ReportSubcommand, ShareSubcommand,
};
use sacco_ledger::{commands, error_type, Config, ErrorType, IntoResult, Result};
use std::path::Path;
use std::process::ExitCode;
use tracing::{debug, error, trace};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let log_level = args.common().log_level();
    init_logger(log_level);
    debug!("Log level set to {}", log_level.to_string().to_lowercase());

    match main_inner(args).await {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Exiting with error: {e:#}");
            ExitCode::from(error_type(&e).map(|t| t.exit_code()).unwrap_or(1))
        }
    }
}

pub async fn main_inner(args: Args) -> Result<()> {
    trace!("{args:?}");
    let home = args.common().sacco_home().path();

    // Route to appropriate command handler
    let _: () = match args.command() {
        Command::Init(init_args) => commands::init(home, &init_args.name).await?.print()?,

        Command::Backup => commands::backup(load(home).await?).await?.print()?,

        Command::Member(member_args) => {
            let config = load(home).await?;
            match &member_args.command {
                MemberSubcommand::Add(args) => {
                    commands::member_add(config, args.clone()).await?.print()?
                }
                MemberSubcommand::List => commands::member_list(config).await?.print()?,
                MemberSubcommand::Show(args) => {
                    commands::member_show(config, args.clone()).await?.print()?
                }
                MemberSubcommand::Hold(args) => {
                    commands::member_hold(config, args.clone()).await?.print()?
                }
                MemberSubcommand::Release(args) => {
                    commands::member_release(config, args.clone())
                        .await?
                        .print()?
                }
            }
        }

        Command::Share(share_args) => {
            let config = load(home).await?;
            match &share_args.command {
                ShareSubcommand::Add(args) => {
                    commands::share_add(config, args.clone()).await?.print()?
                }
            }
        }

        Command::Contribute(args) => {
            commands::contribute(load(home).await?, args.clone())
                .await?
                .print()?
        }

        Command::Loan(loan_args) => {
            let config = load(home).await?;
            match &loan_args.command {
                LoanSubcommand::Apply(args) => {
                    commands::loan_apply(config, args.clone()).await?.print()?
                }
                LoanSubcommand::Eligibility(args) => {
                    commands::loan_eligibility(config, args.clone())
                        .await?
                        .print()?
                }
                LoanSubcommand::List(args) => {
                    commands::loan_list(config, args.clone()).await?.print()?
                }
                LoanSubcommand::Guarantor(guarantor_args) => match &guarantor_args.command {
                    GuarantorSubcommand::Add(args) => {
                        commands::loan_guarantor_add(config, args.clone())
                            .await?
                            .print()?
                    }
                    GuarantorSubcommand::List(args) => {
                        commands::loan_guarantor_list(config, args.clone())
                            .await?
                            .print()?
                    }
                },
                LoanSubcommand::Approve(args) => {
                    commands::loan_approve(config, args.clone()).await?.print()?
                }
                LoanSubcommand::Reject(args) => {
                    commands::loan_reject(config, args.clone()).await?.print()?
                }
                LoanSubcommand::Disburse(args) => {
                    commands::loan_disburse(config, args.clone())
                        .await?
                        .print()?
                }
                LoanSubcommand::Repay(args) => {
                    commands::loan_repay(config, args.clone()).await?.print()?
                }
                LoanSubcommand::Settle(args) => {
                    commands::loan_settle(config, args.clone()).await?.print()?
                }
                LoanSubcommand::Default(args) => {
                    commands::loan_default(config, args.clone()).await?.print()?
                }
                LoanSubcommand::Schedule(args) => {
                    commands::loan_schedule(config, args.clone())
                        .await?
                        .print()?
                }
                LoanSubcommand::Statement(args) => {
                    commands::loan_statement(config, args.clone())
                        .await?
                        .print()?
                }
            }
        }

        Command::Dividend(dividend_args) => {
            let config = load(home).await?;
            match &dividend_args.command {
                DividendSubcommand::Distribute(args) => {
                    commands::dividend_distribute(config, args.clone())
                        .await?
                        .print()?
                }
                DividendSubcommand::Show(args) => {
                    commands::dividend_show(config, args.clone())
                        .await?
                        .print()?
                }
            }
        }

        Command::Bank(bank_args) => {
            let config = load(home).await?;
            match &bank_args.command {
                BankSubcommand::AddAccount(args) => {
                    commands::bank_add_account(config, args.clone())
                        .await?
                        .print()?
                }
                BankSubcommand::Record(args) => {
                    commands::bank_record(config, args.clone()).await?.print()?
                }
                BankSubcommand::Reconcile(args) => {
                    commands::bank_reconcile(config, args.clone())
                        .await?
                        .print()?
                }
            }
        }

        Command::Expense(expense_args) => {
            let config = load(home).await?;
            match &expense_args.command {
                ExpenseSubcommand::Record(args) => {
                    commands::expense_record(config, args.clone())
                        .await?
                        .print()?
                }
                ExpenseSubcommand::List => commands::expense_list(config).await?.print()?,
            }
        }

        Command::Income(income_args) => {
            let config = load(home).await?;
            match &income_args.command {
                IncomeSubcommand::Record(args) => {
                    commands::income_record(config, args.clone())
                        .await?
                        .print()?
                }
                IncomeSubcommand::List => commands::income_list(config).await?.print()?,
            }
        }

        Command::Report(report_args) => {
            let config = load(home).await?;
            match &report_args.command {
                ReportSubcommand::Summary(args) => {
                    commands::report_summary(config, args.clone())
                        .await?
                        .print()?
                }
                ReportSubcommand::Contributions(args) => {
                    commands::report_contributions(config, args.clone())
                        .await?
                        .print()?
                }
            }
        }
    };
    Ok(())
}

async fn load(home: &Path) -> Result<Config> {
    Config::load(home).await.pub_result(ErrorType::Config)
}

/// Initializes the tracing subscriber. Logs go to stderr, command output goes to stdout.
pub fn init_logger(level: LevelFilter) {
    let filter = match std::env::var("RUST_LOG").ok() {
        Some(_) => {
            // RUST_LOG exists; use it.
            EnvFilter::from_default_env()
        }
        None => {
            // RUST_LOG does not exist; use the given level for this crate only.
            EnvFilter::new(format!(
                "{}={},{}={}",
                env!("CARGO_CRATE_NAME"),
                level,
                "sacco_ledger",
                level
            ))
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
