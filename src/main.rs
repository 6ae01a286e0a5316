use anyhow::Result;
use clap::Parser;
use eoapi_loadtester::chaos::ChaosOptions;
use eoapi_loadtester::cli::{ChaosArgs, Cli, Command, CommonArgs, NormalArgs, StressArgs};
use eoapi_loadtester::config::{
    default_base_url, non_negative_secs, positive, ConfigError, TesterConfig, CHAOS_PASS_RATE,
    DEFAULT_MAX_WORKERS, DEFAULT_SUCCESS_THRESHOLD,
};
use eoapi_loadtester::load_test::{LoadTester, StressOptions};
use eoapi_loadtester::prometheus::metrics_source;
use eoapi_loadtester::report::{export_json, print_chaos_summary, print_summary};
use log::{error, info};
use serde::Serialize;
use std::process::ExitCode;
use std::time::Duration;

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();
    let cli = Cli::parse();
    init_logging(cli.common.verbose);

    let command = cli.resolved_command();
    let title = command.title();
    info!("🚀 eoAPI load tester starting {} test", title.to_lowercase());

    tokio::select! {
        code = run(&cli.common, command) => code,
        Ok(()) = tokio::signal::ctrl_c() => {
            info!("{} test interrupted by user", title);
            ExitCode::from(2)
        }
    }
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_millis()
        .init();
}

async fn run(common: &CommonArgs, command: Command) -> ExitCode {
    let title = command.title();
    let outcome = match command {
        Command::Stress(args) => run_stress(common, args).await,
        Command::Normal(args) => run_normal(common, args).await,
        Command::Chaos(args) => run_chaos(common, args).await,
    };

    match outcome {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) if e.downcast_ref::<ConfigError>().is_some() => {
            error!("❌ Invalid configuration: {:#}", e);
            ExitCode::FAILURE
        }
        Err(e) => {
            error!("❌ {} test failed: {:#}", title, e);
            ExitCode::FAILURE
        }
    }
}

/// Validate the shared flags and build a tester; no network traffic happens
/// before this succeeds.
async fn build_tester(common: &CommonArgs, max_workers: i64) -> Result<LoadTester> {
    let timeout = positive("timeout", common.timeout)?;
    let max_workers = positive("max_workers", max_workers)?;
    let base_url = common.base_url.clone().unwrap_or_else(default_base_url);

    let config = TesterConfig::new(base_url)
        .with_max_workers(max_workers)
        .with_timeout(Duration::from_secs(timeout as u64))
        .with_namespace(common.namespace.clone());
    let tester = LoadTester::new(config)?;

    let metrics = metrics_source(common.prometheus_url.as_deref()).await;
    Ok(tester.with_metrics_source(metrics))
}

fn export<T: Serialize>(common: &CommonArgs, report: &T) {
    if let Some(path) = &common.report_json {
        if let Err(e) = export_json(report, path) {
            error!("Failed to export metrics: {:#}", e);
        }
    }
}

/// Passes when the search reached `max_workers`. A run whose last level is
/// `max_workers` and breaches the threshold there reports `max_workers` too,
/// so it also passes.
async fn run_stress(common: &CommonArgs, args: StressArgs) -> Result<bool> {
    let options = StressOptions {
        endpoint: args.endpoint,
        success_threshold: args.success_threshold,
        step_size: positive("step_size", args.step_size)?,
        test_duration: Duration::from_secs(positive("test_duration", args.test_duration)? as u64),
        cooldown: non_negative_secs("cooldown", args.cooldown)?,
        collect_infra_metrics: common.collect_infra_metrics,
    };
    let tester = build_tester(common, args.max_workers).await?;

    let result = tester.find_breaking_point(&options).await?;
    if let Some(trial) = result.breaking_trial() {
        print_summary(
            &format!("Stress Test - Breaking Point at {} workers", result.breaking_point),
            trial,
        );
    }
    export(common, &result);

    info!(
        "Stress test completed. Breaking point: {} workers",
        result.breaking_point
    );
    Ok(result.breaking_point >= tester.max_workers())
}

async fn run_normal(common: &CommonArgs, args: NormalArgs) -> Result<bool> {
    let duration = Duration::from_secs(positive("duration", args.duration)? as u64);
    let users = positive("users", args.users)?;
    let tester = build_tester(common, DEFAULT_MAX_WORKERS as i64).await?;

    let results = tester
        .run_normal_load(&[], duration, users, common.collect_infra_metrics)
        .await?;
    for (endpoint, metrics) in &results {
        print_summary(&format!("Normal Load Test - {}", endpoint), metrics);
    }
    export(common, &results);

    let avg_success = if results.is_empty() {
        0.0
    } else {
        results.values().map(|m| m.success_rate).sum::<f64>() / results.len() as f64
    };
    info!(
        "Normal load test completed. Average success rate: {:.1}%",
        avg_success
    );
    Ok(avg_success >= DEFAULT_SUCCESS_THRESHOLD)
}

async fn run_chaos(common: &CommonArgs, args: ChaosArgs) -> Result<bool> {
    let options = ChaosOptions {
        namespace: common.namespace.clone(),
        duration: Duration::from_secs(positive("duration", args.duration)? as u64),
        kill_interval: Duration::from_secs(positive("kill_interval", args.kill_interval)? as u64),
        endpoint: args.endpoint,
        ..ChaosOptions::default()
    };
    let tester = build_tester(common, DEFAULT_MAX_WORKERS as i64).await?;

    let result = tester.run_chaos_test(&options).await;
    print_chaos_summary(&result);
    export(common, &result);

    info!(
        "Chaos test completed. Success rate: {:.1}%",
        result.success_rate
    );
    Ok(result.success_rate >= CHAOS_PASS_RATE)
}
