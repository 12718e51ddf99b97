use anyhow::Result;
use colored::*;
use serde_json::json;
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::api_client::ApiClient;
use crate::output::{print_event, TestResult};
use crate::ws_client::Connection;

const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

pub async fn test_connection(
    api_client: &ApiClient,
    connections: &[Connection],
) -> Result<TestResult> {
    let start = Instant::now();

    println!("\n{}", "=== TEST: Connection Test ===".bright_cyan().bold());
    println!(
        "{}",
        "Testing basic WebSocket connectivity without sending any envelopes".bright_white()
    );

    for connection in connections {
        println!(
            "{} {} WebSocket connection: established",
            "✓".green(),
            connection.label
        );
    }

    // Wait a bit to ensure connections are stable
    println!(
        "{} Waiting 2 seconds to verify connections stay alive...",
        "→".blue()
    );
    tokio::time::sleep(Duration::from_secs(2)).await;

    let stats = api_client.stats().await?;
    println!(
        "{} Hub reports {} connected clients",
        "→".blue(),
        stats.connected_clients
    );

    // Other browsers may be attached to the same hub.
    if stats.connected_clients >= connections.len() {
        println!("{} Connections remain registered", "✓".green());
        Ok(TestResult::pass(
            "connection_test",
            Some("WebSocket connections established and maintained successfully".to_string()),
            start.elapsed(),
        ))
    } else {
        println!("{} Hub lost track of connections!", "✗".red());
        Ok(TestResult::fail(
            "connection_test",
            format!(
                "Expected at least {} connected clients, hub reports {}",
                connections.len(),
                stats.connected_clients
            ),
            start.elapsed(),
        ))
    }
}

pub async fn test_fan_out(connections: &mut [Connection]) -> Result<TestResult> {
    let start = Instant::now();

    println!("\n{}", "=== TEST: Fan Out ===".bright_cyan().bold());

    let Some(sender) = connections.first_mut() else {
        return Ok(TestResult::fail(
            "fan_out",
            "No connections to test with".to_string(),
            start.elapsed(),
        ));
    };

    let marker = Uuid::new_v4().to_string();
    let envelope = json!({
        "type": "store:update",
        "user_id": Uuid::new_v4(),
        "payload": {"cart": [{"product_id": marker, "quantity": 1}]}
    });

    println!("{} {} sending store:update...", "→".blue(), sender.label);
    sender.send_envelope(&envelope).await?;

    let mut failures = Vec::new();
    for connection in connections.iter_mut() {
        println!(
            "{} Waiting for {} to receive store:update...",
            "→".blue(),
            connection.label
        );

        match connection.wait_for_event("store:update", EVENT_TIMEOUT).await {
            Ok(event) => {
                print_event(&connection.label, &event);
                if event.data == envelope {
                    println!("{} Envelope relayed unchanged", "✓".green());
                } else {
                    println!("{} Envelope mismatch!", "✗".red());
                    failures.push(format!("{} received {}", connection.label, event.data));
                }
            }
            Err(e) => {
                println!("{} {}", "✗".red(), e);
                failures.push(format!("{}: {}", connection.label, e));
            }
        }
    }

    if failures.is_empty() {
        Ok(TestResult::pass(
            "fan_out",
            Some(format!("{} clients received the envelope", connections.len())),
            start.elapsed(),
        ))
    } else {
        Ok(TestResult::fail(
            "fan_out",
            failures.join("; "),
            start.elapsed(),
        ))
    }
}

pub async fn test_user_presence(connections: &mut [Connection]) -> Result<TestResult> {
    let start = Instant::now();

    println!("\n{}", "=== TEST: User Presence ===".bright_cyan().bold());

    if connections.len() < 2 {
        return Ok(TestResult::fail(
            "user_presence",
            "Requires at least 2 clients".to_string(),
            start.elapsed(),
        ));
    }

    let user_id = Uuid::new_v4();
    let joined = json!({
        "type": "user:join",
        "user_id": user_id,
        "payload": {"user_id": user_id}
    });

    println!("{} {} announcing user:join...", "→".blue(), connections[0].label);
    connections[0].send_envelope(&joined).await?;

    let observer = &mut connections[1];
    match observer.wait_for_event("user:join", EVENT_TIMEOUT).await {
        Ok(event) => {
            print_event(&observer.label, &event);
            let received = event.data["user_id"].as_str().unwrap_or_default();

            if received == user_id.to_string() {
                println!("{} Presence data verified correctly", "✓".green());
                Ok(TestResult::pass("user_presence", None, start.elapsed()))
            } else {
                println!("{} Presence data mismatch!", "✗".red());
                Ok(TestResult::fail(
                    "user_presence",
                    format!("Expected user_id={}, got user_id={}", user_id, received),
                    start.elapsed(),
                ))
            }
        }
        Err(e) => {
            println!("{} Timeout waiting for event: {}", "✗".red(), e);
            Ok(TestResult::fail(
                "user_presence",
                format!("Timeout: {}", e),
                start.elapsed(),
            ))
        }
    }
}
