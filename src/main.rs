//! Attestation Monitor console
//!
//! Interactive front end over the monitor: browse and filter elements,
//! inspect results, submit attestations and switch engines.

use anyhow::{anyhow, Result};
use std::io::{self, Write};
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

use attestation_monitor::config::{AppConfig, PreferencesStore};
use attestation_monitor::data::{Dashboard, FilterBuilder, OverviewTile};
use attestation_monitor::model::{Claim, Element};
use attestation_monitor::utils::init_tracing;
use attestation_monitor::{AttestationMonitor, AttestationState, Response};

const HELP: &str = "\
Commands: refresh | more | list | search <words> | only <ids> | show <id> | result <id>
          overview | policies | rules | attest <element> <policy> [rule] | retry | reset
          claim [id] | engine <host:port> | engines [add|rm <host:port>] | poll on|off | quit";

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenv::dotenv().ok();

    let log_dir = std::env::var("ATTESTER_LOG_DIR").ok().map(PathBuf::from);
    let _telemetry = init_tracing(log_dir.as_deref())
        .map_err(|e| anyhow!("failed to initialise logging: {}", e))?;

    let config = AppConfig::from_env()?;
    let preferences = PreferencesStore::new(&config.preferences_path, config.engine.clone());
    let address = preferences.current_engine().await?;

    println!("\n{}", "═".repeat(60));
    println!("Attestation Monitor v{}", env!("CARGO_PKG_VERSION"));
    println!("{}", "═".repeat(60));
    println!("Engine: {}", address);

    let monitor = AttestationMonitor::from_config(&config, address)?;
    match monitor.refresh_elements().await {
        Ok(()) => print_elements(&monitor.coordinator().current_elements()),
        Err(e) => println!("Engine unreachable: {}", e),
    }
    monitor.start_element_fetch_loop();
    info!("Polling every {:?}", config.poll_interval);

    println!("\n{}\n", HELP);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("attester> ");
        io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let mut words = line.split_whitespace();
        let Some(command) = words.next() else {
            continue;
        };
        let args: Vec<&str> = words.collect();

        match command.to_lowercase().as_str() {
            "quit" | "exit" | "q" => break,
            "help" => println!("{}", HELP),
            "refresh" => match monitor.refresh_elements().await {
                Ok(()) => print_elements(&monitor.coordinator().current_elements()),
                Err(e) => println!("Refresh failed: {}", e),
            },
            "more" => {
                if !monitor.coordinator().has_more() {
                    println!("All elements loaded.");
                    continue;
                }
                match monitor.get_more_elements().await {
                    Ok(()) => print_elements(&monitor.coordinator().current_elements()),
                    Err(e) => println!("Loading more failed: {}", e),
                }
            }
            "list" => print_elements(&monitor.coordinator().current_elements()),
            "search" => {
                monitor.apply_filters(FilterBuilder::build_with_base_filter(None, &args.join(" ")));
                print_elements(&monitor.coordinator().current_elements());
            }
            "only" => {
                let ids = args.join(" ");
                monitor.apply_filters(FilterBuilder::build_with_base_filter(Some(&ids), ""));
                print_elements(&monitor.coordinator().current_elements());
            }
            "show" => {
                let Some(id) = args.first() else {
                    println!("Usage: show <element id>");
                    continue;
                };
                let element = match monitor.refresh_element(id).await {
                    Ok(element) => Some(element),
                    Err(e) => {
                        println!("Refresh failed ({}), showing cached copy", e);
                        monitor.element_from_cache(id)
                    }
                };
                match element {
                    Some(element) => print_element(&element),
                    None => println!("Element '{}' is not loaded.", id),
                }
            }
            "result" => match args.first().and_then(|id| monitor.find_element_result(id)) {
                Some(result) => println!(
                    "{} on {}: code {} at {} (claim {})",
                    result.itemid,
                    result.element_id,
                    result.result,
                    result.timestamp,
                    result.claim_id.as_deref().unwrap_or("-")
                ),
                None => println!("No such result in the cache."),
            },
            "overview" => print_dashboard(&monitor.dashboard()),
            "policies" => match monitor.session().policies().await {
                Ok(policies) => {
                    for p in policies {
                        println!("  {:<38} {}", p.itemid, p.name);
                    }
                }
                Err(e) => println!("Fetching policies failed: {}", e),
            },
            "rules" => match monitor.session().rules().await {
                Ok(rules) => {
                    for r in rules {
                        println!("  {:<40} {}", r.name, r.description.unwrap_or_default());
                    }
                }
                Err(e) => println!("Fetching rules failed: {}", e),
            },
            "attest" => {
                let [element, policy, rest @ ..] = args.as_slice() else {
                    println!("Usage: attest <element> <policy id or name> [rule]");
                    continue;
                };
                if let Err(e) = monitor.session().policies().await {
                    println!("Fetching policies failed: {}", e);
                    continue;
                }
                let policy_id = monitor
                    .policy_from_cache(policy)
                    .or_else(|| monitor.session().policy_by_name(policy))
                    .map(|p| p.itemid)
                    .unwrap_or_else(|| policy.to_string());
                let rule = rest.first().copied();
                let outcome = monitor.session().attest(element, &policy_id, rule).await;
                report_attestation(outcome.map(|_| monitor.session().state()));
            }
            "retry" => {
                let outcome = monitor.session().retry().await;
                report_attestation(outcome.map(|_| monitor.session().state()));
            }
            "reset" => {
                monitor.session().reset(false);
                println!("Attestation state cleared.");
            }
            "claim" => {
                let claim_id = match (args.first(), monitor.session().state()) {
                    (Some(id), _) => id.to_string(),
                    (None, AttestationState::Success(receipt)) => receipt.claim_id,
                    (None, _) => {
                        println!("Usage: claim <claim id> (defaults to the last attestation)");
                        continue;
                    }
                };
                match monitor.claim(&claim_id).await {
                    Ok(claim) => print_claim(&claim),
                    Err(e) => println!("Fetching claim failed: {}", e),
                }
            }
            "engine" => {
                let Some(raw) = args.first() else {
                    println!("Current engine: {}", monitor.current_engine());
                    continue;
                };
                match monitor.switch_base_url(raw).await {
                    Ok(()) => {
                        preferences.save_engine(&monitor.current_engine()).await?;
                        println!("Switched to {}", monitor.current_engine());
                        print_elements(&monitor.coordinator().current_elements());
                    }
                    Err(e) => println!("Engine switch failed: {}", e),
                }
            }
            "engines" => match args.as_slice() {
                ["add", raw] => match preferences.add_engine(raw).await {
                    Ok(address) => println!("Saved {}", address),
                    Err(e) => println!("{}", e),
                },
                ["rm", raw] => match preferences.remove_engine(raw).await? {
                    true => println!("Removed {}", raw),
                    false => println!("{} was not saved", raw),
                },
                _ => {
                    let current = monitor.current_engine().to_string();
                    for engine in preferences.engines().await? {
                        let marker = if engine == current { "*" } else { " " };
                        println!(" {} {}", marker, engine);
                    }
                }
            },
            "poll" => match args.first().copied() {
                Some("on") => monitor.start_element_fetch_loop(),
                Some("off") => monitor.stop_element_fetch_loop(),
                _ => println!(
                    "Polling is {}",
                    if monitor.coordinator().is_polling() { "on" } else { "off" }
                ),
            },
            other => println!("Unknown command '{}'. Type 'help'.", other),
        }
    }

    monitor.stop_element_fetch_loop();
    println!("\nGoodbye!\n");
    Ok(())
}

fn print_elements(view: &Response<Vec<Element>>) {
    if let Some(message) = view.message() {
        println!("⚠️  {}", message);
    }
    match view.data() {
        Some(elements) if elements.is_empty() => println!("No elements."),
        Some(elements) => {
            for e in elements {
                let status = match e.latest_result() {
                    Some(r) if r.is_ok() => "✓",
                    Some(_) => "✗",
                    None => "·",
                };
                println!("  {} {:<38} {:<24} {}", status, e.itemid, e.name, e.endpoint);
            }
        }
        None if view.is_loading() => println!("Loading..."),
        None => {}
    }
}

fn print_element(element: &Element) {
    println!("{}", "─".repeat(50));
    println!("{} ({})", element.name, element.itemid);
    println!("  endpoint: {}  protocol: {}", element.endpoint, element.protocol);
    if !element.types.is_empty() {
        println!("  types:    {}", element.types.join(", "));
    }
    if let Some(description) = &element.description {
        println!("  {}", description);
    }
    if let Some(location) = &element.location {
        println!("  location: {:.5}, {:.5}", location.latitude, location.longitude);
    }
    for r in element.results() {
        let status = if r.is_ok() { "✓" } else { "✗" };
        let rule = r.rule_name.as_deref().unwrap_or("-");
        println!("  {} {} {} {}", status, r.timestamp, rule, r.itemid);
    }
    println!("{}", "─".repeat(50));
}

fn print_claim(claim: &Claim) {
    println!("{}", "─".repeat(50));
    println!("Claim {}", claim.itemid);
    let (requested, received) = claim.timestamps();
    if let Some(at) = requested {
        println!("  requested: {}", at);
    }
    if let Some(at) = received {
        println!("  received:  {}", at);
    }
    if let Some(element) = claim.element_data() {
        println!("  element:   {} ({})", element.name, element.itemid);
    }
    if let Some(policy) = claim.policy_data() {
        println!("  policy:    {} ({})", policy.name, policy.itemid);
    }
    match claim.quote() {
        Some(quote) => {
            println!("  quote:     {} signed by {}", quote.kind, quote.signer);
            println!("  digest:    {}", quote.digest);
            println!(
                "  clock:     {} (resets {}, restarts {}, safe {})",
                quote.clock, quote.reset, quote.restart, quote.safe
            );
            println!("  firmware:  {}", quote.firmware_version);
        }
        None => println!("  no quote in this claim"),
    }
    for bank in claim.pcrs().unwrap_or_default() {
        println!("  pcrs {}:", bank.key);
        for (index, value) in &bank.values {
            println!("    {:>2} {}", index, value);
        }
    }
    println!("{}", "─".repeat(50));
}

fn print_dashboard(dashboard: &Dashboard) {
    print_tile("Active", &dashboard.active);
    print_tile("24H", &dashboard.last_24h);
}

fn print_tile(title: &str, tile: &OverviewTile) {
    println!(
        "{:<7} total {:>4}  passed {:>4}  failed {:>4}",
        title, tile.counts.total, tile.counts.passed, tile.counts.failed
    );
    if !tile.failing_elements.is_empty() {
        println!("        failing: {}", tile.failing_elements.join(" "));
    }
}

fn report_attestation(outcome: attestation_monitor::Result<AttestationState>) {
    match outcome {
        Ok(AttestationState::Success(receipt)) => {
            println!("✅ Attestation accepted, claim {}", receipt.claim_id);
            if let Some(result) = receipt.result_id {
                println!("   Verification result {}", result);
            }
        }
        Ok(state) => println!("Attestation state: {:?}", state),
        Err(e) => println!("❌ Attestation failed: {} (use 'retry' or 'reset')", e),
    }
}
