use clap::{Arg, ArgAction, ArgMatches, Command};
use log::{error, info};

use traffic_sentry::{Analyzer, Config, Result, SentryError};

fn cli() -> Command {
    Command::new("traffic-sentry")
        .version("0.1.0")
        .about("Classifies captured ports and packets into security findings")
        .arg(
            Arg::new("ports")
                .value_name("PORTS_JSON")
                .help("JSON array of open ports, e.g. '[{\"port\":80}]'")
                .required(true)
        )
        .arg(
            Arg::new("packets")
                .value_name("PACKETS_JSON")
                .help("JSON array of captured packets")
                .required(true)
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
        )
        .arg(
            Arg::new("timeout-ms")
                .long("timeout-ms")
                .value_name("MILLIS")
                .help("Per-lookup geolocation timeout")
        )
        .arg(
            Arg::new("offline")
                .long("offline")
                .action(ArgAction::SetTrue)
                .help("Skip geolocation lookups; public addresses resolve to ??")
        )
        .arg(
            Arg::new("pretty")
                .long("pretty")
                .action(ArgAction::SetTrue)
                .help("Pretty-print the JSON report")
        )
}

fn load_config(matches: &ArgMatches) -> Result<Config> {
    let mut config = match matches.get_one::<String>("config") {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };

    if let Some(timeout) = matches.get_one::<String>("timeout-ms") {
        config.geo.timeout_ms = timeout
            .parse()
            .map_err(|_| SentryError::Config(format!("Invalid timeout: {}", timeout)))?;
    }
    if matches.get_flag("offline") {
        config.geo.enabled = false;
    }

    Ok(config)
}

async fn run(matches: &ArgMatches, config: &Config) -> Result<()> {
    let ports = matches.get_one::<String>("ports").map(String::as_str).unwrap_or("[]");
    let packets = matches.get_one::<String>("packets").map(String::as_str).unwrap_or("[]");

    let analyzer = Analyzer::from_config(config)?;
    let report = analyzer.analyze_json(ports, packets).await?;

    info!("Findings by risk: {:?}", report.count_by_risk());

    let output = if matches.get_flag("pretty") {
        serde_json::to_string_pretty(&report)?
    } else {
        serde_json::to_string(&report)?
    };
    println!("{}", output);

    Ok(())
}

#[tokio::main]
async fn main() {
    let matches = cli().get_matches();

    let config = match load_config(&matches) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("traffic-sentry: {}", e);
            std::process::exit(2);
        }
    };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(config.logging.level.as_str()))
        .init();

    if let Err(e) = run(&matches, &config).await {
        error!("Analysis failed: {}", e);
        eprintln!("traffic-sentry: {}", e);
        std::process::exit(1);
    }
}
