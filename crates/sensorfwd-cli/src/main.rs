//! # sensorfwd CLI
//!
//! Command-line utilities for checking topic rules offline.

use anyhow::{Context, Result};
use sensorfwd_adapter_influx::encode_record;
use sensorfwd_core::{BusEvent, Dispatcher, Forwarder, RuleTable};
use std::env;
use std::path::Path;
use std::sync::Arc;

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        print_help();
        return Ok(());
    }

    match args[1].as_str() {
        "check" => {
            if args.len() < 3 {
                eprintln!("Usage: sensorfwd check <rules.json>");
                std::process::exit(1);
            }
            let rules = load_rules(&args[2])?;
            for topic in rules.topics() {
                if let Some(rule) = rules.lookup(topic) {
                    let value_type = rule.value_type.map_or("raw", |t| t.as_str());
                    println!(
                        "{topic}\ttype={value_type}\tmeasurement={}\ttags={:?}",
                        rule.measurement_name(),
                        rule.tags
                    );
                }
            }
            println!("{} rule(s) loaded", rules.len());
        }
        "preview" => {
            if args.len() < 5 {
                eprintln!("Usage: sensorfwd preview <rules.json> <topic> <payload>");
                std::process::exit(1);
            }
            let rules = load_rules(&args[2])?;
            let forwarder = Forwarder::new(Arc::new(rules), Dispatcher::default());
            let event = BusEvent::new(args[3].as_str(), args[4].as_bytes());
            match forwarder.prepare(&event) {
                Some(record) => println!("{}", encode_record(&record)),
                None => println!("No rule for topic {}, message would be ignored", args[3]),
            }
        }
        "help" | "--help" | "-h" => {
            print_help();
        }
        cmd => {
            eprintln!("Unknown command: {cmd}");
            print_help();
            std::process::exit(1);
        }
    }

    Ok(())
}

fn load_rules(path: &str) -> Result<RuleTable> {
    RuleTable::from_path(Path::new(path))
        .and_then(RuleTable::require_non_empty)
        .with_context(|| format!("Failed to load rules from {path}"))
}

fn print_help() {
    println!(
        r#"sensorfwd CLI

USAGE:
    sensorfwd <COMMAND> [OPTIONS]

COMMANDS:
    check <rules.json>                      Load a rules file and list its rules
    preview <rules.json> <topic> <payload>  Show the InfluxDB point a message would produce
    help                                    Show this help message

EXAMPLES:
    sensorfwd check rules.json
    sensorfwd preview rules.json sensors/outside/humidity 54.3
"#
    );
}
