use brs_marks::brs::models::DisciplineQuery;
use brs_marks::brs::{BrsApi, CachedDirectory, Session};
use brs_marks::cli::{Args, Command};
use brs_marks::config::Config;
use brs_marks::fmt::{render_report, render_summary};
use brs_marks::logging::setup_logging;
use brs_marks::marks::portal::DisciplineDirectory;
use brs_marks::marks::{MarksRunner, RunOutcome, RunRequest, UpdateMode};
use brs_marks::sheets::SheetsClient;
use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Logging depends on the config, so config errors can only go to stderr.
    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e:#}");
            return ExitCode::FAILURE;
        }
    };
    setup_logging(&config, args.tracing);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        portal = config.portal_url,
        "starting brs-marks"
    );

    let result = match args.command {
        Command::Run {
            spreadsheet,
            range,
            save,
            json,
        } => {
            let mode = if save {
                UpdateMode::Save
            } else {
                UpdateMode::DryRun
            };
            run_sync(&config, spreadsheet, range, mode, json).await
        }
        Command::Disciplines {
            year,
            term,
            course,
            module,
            refresh,
        } => {
            let query = DisciplineQuery {
                year,
                term,
                course,
                is_module: module,
            };
            list_disciplines(&config, &query, refresh).await
        }
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            error!(error = format!("{e:#}"), "brs-marks failed");
            ExitCode::FAILURE
        }
    }
}

fn brs_client(config: &Config) -> anyhow::Result<Arc<BrsApi>> {
    let session = Session::new(&config.login, config.require_session_id()?);
    let api = BrsApi::new(&config.portal_url, session, config.request_timeout)?;
    Ok(Arc::new(api))
}

async fn run_sync(
    config: &Config,
    spreadsheet_id: String,
    range: String,
    mode: UpdateMode,
    json: bool,
) -> anyhow::Result<ExitCode> {
    let api = brs_client(config)?;
    let directory = CachedDirectory::new(api.clone(), &config.login);
    let sheets = SheetsClient::new(
        &config.sheets_url,
        config.sheets_auth()?,
        config.request_timeout,
    )?;
    let runner =
        MarksRunner::new(directory, api, sheets).with_slow_threshold(config.slow_threshold);

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, stopping after the current group");
                cancel.cancel();
            }
        }
    });

    if mode == UpdateMode::DryRun {
        info!("Dry run: no changes will be written, pass --save to apply them");
    }

    let request = RunRequest {
        spreadsheet_id,
        range,
        mode,
    };
    let summary = runner
        .run(
            &request,
            move |report| {
                if json {
                    match serde_json::to_string(&report) {
                        Ok(line) => println!("{line}"),
                        Err(e) => error!(error = %e, "Failed to serialize report"),
                    }
                } else {
                    println!("{}", render_report(&report));
                }
            },
            cancel,
        )
        .await;

    if json {
        println!("{}", serde_json::to_string(&summary)?);
    } else {
        println!("{}", render_summary(&summary));
    }

    Ok(match summary.outcome {
        RunOutcome::Completed if summary.has_problems() => ExitCode::from(2),
        RunOutcome::Completed => ExitCode::SUCCESS,
        RunOutcome::Cancelled => ExitCode::from(130),
        RunOutcome::Errored(e) => {
            if e.is_session_expired() {
                error!("The BRS session has expired, update BRS_SESSION_ID and retry");
            }
            ExitCode::FAILURE
        }
    })
}

async fn list_disciplines(
    config: &Config,
    query: &DisciplineQuery,
    refresh: bool,
) -> anyhow::Result<ExitCode> {
    let directory = CachedDirectory::new(brs_client(config)?, &config.login);
    let disciplines = if refresh {
        directory.refetch(query).await?.as_ref().clone()
    } else {
        directory.fetch_disciplines(query).await?
    };

    for discipline in &disciplines {
        println!(
            "{}\t{}\t{}",
            discipline.name, discipline.group, discipline.discipline_load_id
        );
    }
    info!(count = disciplines.len(), "Disciplines listed");
    Ok(ExitCode::SUCCESS)
}

