use anyhow::Result;
use clap::Parser;
use colored::*;

use testing_tools::api_client::ApiClient;
use testing_tools::output::print_test_summary;
use testing_tools::scenarios;
use testing_tools::ws_client::Connection;

#[derive(Parser)]
#[command(name = "ws-test-client")]
#[command(about = "WebSocket Hub Integration Testing Tool")]
struct Cli {
    /// Base URL of the backend (e.g., http://localhost:4000)
    #[arg(long)]
    base_url: String,

    /// Number of WebSocket clients to open
    #[arg(long, default_value_t = 2, value_parser = clap::value_parser!(u16).range(1..))]
    clients: u16,

    /// Test scenario to run
    #[arg(long, value_enum)]
    scenario: ScenarioChoice,

    /// Enable verbose output
    #[arg(long, short)]
    verbose: bool,
}

#[derive(clap::ValueEnum, Clone)]
enum ScenarioChoice {
    /// Test basic WebSocket connections without sending anything
    ConnectionTest,
    /// One client sends a store update, every client must receive it
    FanOut,
    /// One client announces a user joining, another must observe it
    UserPresence,
    /// Run all tests
    All,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.verbose {
        env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Debug)
            .init();
    }

    println!("{}", "=== SETUP PHASE ===".bright_white().bold());

    println!("{} Checking server health...", "→".blue());
    let api_client = ApiClient::new(reqwest::Client::new(), cli.base_url.clone());
    let health = api_client.health().await?;
    println!("{} Server is {}", "✓".green(), health);

    println!("\n{} Establishing WebSocket connections...", "→".blue());
    let mut connections = Vec::with_capacity(cli.clients as usize);
    for n in 1..=cli.clients {
        let connection = Connection::establish(&cli.base_url, format!("Client {n}")).await?;
        println!("{} {} connection established", "✓".green(), connection.label);
        connections.push(connection);
    }

    println!("\n{}", "=== TEST PHASE ===".bright_white().bold());

    let mut results = Vec::new();

    match cli.scenario {
        ScenarioChoice::ConnectionTest => {
            results.push(scenarios::test_connection(&api_client, &connections).await?);
        }
        ScenarioChoice::FanOut => {
            results.push(scenarios::test_fan_out(&mut connections).await?);
        }
        ScenarioChoice::UserPresence => {
            results.push(scenarios::test_user_presence(&mut connections).await?);
        }
        ScenarioChoice::All => {
            results.push(scenarios::test_connection(&api_client, &connections).await?);
            results.push(scenarios::test_fan_out(&mut connections).await?);
            results.push(scenarios::test_user_presence(&mut connections).await?);
        }
    }

    for connection in connections {
        if let Err(e) = connection.close().await {
            log::debug!("{e}");
        }
    }

    // Print summary
    println!("\n{}", "=== RESULTS ===".bright_white().bold());
    print_test_summary(&results);

    let all_passed = results.iter().all(|r| r.passed);

    if all_passed {
        println!("\n{}", "All tests passed! ✓".bright_green().bold());
    } else {
        println!("\n{}", "Some tests failed! ✗".bright_red().bold());
    }

    std::process::exit(if all_passed { 0 } else { 1 });
}
