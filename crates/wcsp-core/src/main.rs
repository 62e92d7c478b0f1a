use anyhow::{Context as _, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use wcsp_core::report::TracingReporter;
use wcsp_core::simulator::SimulatedHost;
use wcsp_core::{
    run_content_security_policy_tests, HarnessConfig, LoaderKind, MatrixBuilder, SuiteReport,
};

fn loader_arg() -> Arg {
    Arg::new("loader")
        .long("loader")
        .default_value("paint")
        .value_parser(|s: &str| s.parse::<LoaderKind>())
        .help("Loader kind: paint, audio, animation or layout")
}

fn config_arg() -> Arg {
    Arg::new("config")
        .long("config")
        .value_parser(value_parser!(PathBuf))
        .help("TOML harness configuration")
}

fn json_arg() -> Arg {
    Arg::new("json")
        .long("json")
        .action(ArgAction::SetTrue)
        .help("Output as JSON")
}

fn cli() -> Command {
    Command::new("wcsp")
        .version(wcsp_core::VERSION)
        .about("Worklet content security policy conformance orchestrator")
        .arg(
            Arg::new("log-json")
                .long("log-json")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON lines"),
        )
        .subcommand(
            Command::new("list")
                .about("Print the generated case matrix")
                .arg(loader_arg())
                .arg(config_arg())
                .arg(json_arg()),
        )
        .subcommand(
            Command::new("simulate")
                .about("Run the suite against the simulated context host")
                .arg(loader_arg())
                .arg(
                    Arg::new("all-loaders")
                        .long("all-loaders")
                        .action(ArgAction::SetTrue)
                        .conflicts_with("loader")
                        .help("Run every loader kind side by side"),
                )
                .arg(
                    Arg::new("max-contexts")
                        .long("max-contexts")
                        .value_parser(value_parser!(usize))
                        .help("Contexts allowed open at once (overrides config)"),
                )
                .arg(config_arg())
                .arg(json_arg()),
        )
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn load_config(args: &ArgMatches) -> Result<HarnessConfig> {
    match args.get_one::<PathBuf>("config") {
        Some(path) => HarnessConfig::load(path)
            .with_context(|| format!("loading config from {}", path.display())),
        None => Ok(HarnessConfig::new()),
    }
}

fn selected_loader(args: &ArgMatches) -> LoaderKind {
    args.get_one::<LoaderKind>("loader")
        .copied()
        .unwrap_or(LoaderKind::Paint)
}

fn list(args: &ArgMatches) -> Result<()> {
    let config = load_config(args)?;
    let cases = MatrixBuilder::new(config.host_info).build(selected_loader(args));

    if args.get_flag("json") {
        println!("{}", serde_json::to_string_pretty(&cases)?);
        return Ok(());
    }
    for case in &cases {
        println!("{} [{}] {}", case.id(), case.expected_outcome(), case.label());
        println!("         window: {}", case.window_url());
        println!("         script: {}", case.script_url());
    }
    println!();
    println!("{} cases", cases.len());
    Ok(())
}

async fn simulate(args: &ArgMatches) -> Result<bool> {
    let mut config = load_config(args)?;
    if let Some(max) = args.get_one::<usize>("max-contexts") {
        config = config.with_max_contexts(*max);
    }
    config.validate().context("invalid harness configuration")?;

    let loaders: Vec<LoaderKind> = if args.get_flag("all-loaders") {
        LoaderKind::ALL.to_vec()
    } else {
        vec![selected_loader(args)]
    };

    let host = Arc::new(SimulatedHost::new(&config).context("building simulated host")?);
    let handles = loaders.into_iter().map(|loader| {
        run_content_security_policy_tests(loader, host.clone(), Arc::new(TracingReporter), &config)
            .wait()
    });
    let reports = futures::future::join_all(handles)
        .await
        .into_iter()
        .collect::<Result<Vec<SuiteReport>, _>>()
        .context("suite task failed")?;

    if args.get_flag("json") {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    } else {
        for report in &reports {
            println!("{}", report.generate_text());
        }
    }

    let stats = host.stats();
    tracing::info!(
        "Simulated host opened {} contexts, peak {} at once",
        stats.opened,
        stats.peak_open
    );
    Ok(reports.iter().all(SuiteReport::all_passed))
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = cli().get_matches();
    init_tracing(matches.get_flag("log-json"));

    match matches.subcommand() {
        Some(("list", args)) => list(args),
        Some(("simulate", args)) => {
            let passed = simulate(args).await?;
            std::process::exit(if passed { 0 } else { 1 });
        }
        _ => {
            cli().print_help()?;
            Ok(())
        }
    }
}
