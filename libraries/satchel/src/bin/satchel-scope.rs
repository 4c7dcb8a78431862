use std::fs::File;
use std::io::Read;
use std::path::PathBuf;

use satchel::cache::{CachedSnapshot, decode_record, parse_header};

fn main() {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() != 2 {
        eprintln!("Usage: {} <path-to-snapshot-file>", args[0]);
        eprintln!("\nExample: {} ./cart_user_123.snapshot", args[0]);
        std::process::exit(1);
    }

    let file_path = PathBuf::from(&args[1]);

    if !file_path.exists() {
        eprintln!("Error: File '{}' does not exist", file_path.display());
        std::process::exit(1);
    }

    let mut file = match File::open(&file_path) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Error opening file '{}': {}", file_path.display(), e);
            std::process::exit(1);
        }
    };

    let mut bytes = Vec::new();
    if let Err(e) = file.read_to_end(&mut bytes) {
        eprintln!("Error reading file '{}': {}", file_path.display(), e);
        std::process::exit(1);
    }

    println!("SatchelScope - Snapshot Cache Inspector");
    println!("=======================================");
    println!("File: {}", file_path.display());
    println!(
        "Size: {} bytes ({:.2} KB)",
        bytes.len(),
        bytes.len() as f64 / 1024.0
    );
    println!();

    match parse_header(&bytes) {
        Ok(version) => println!("Record version: {version}"),
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }

    let record: CachedSnapshot<serde_json::Value> = match decode_record(&bytes) {
        Ok(record) => record,
        Err(e) => {
            eprintln!("Error decoding record: {e}");
            std::process::exit(1);
        }
    };

    println!("Key: {}", record.key);
    println!("Saved at: {}", record.saved_at);

    if let Some(items) = record.snapshot.get("items").and_then(|items| items.as_array()) {
        println!("Items: {}", items.len());
        for item in items {
            let id = item.get("id").and_then(|v| v.as_str()).unwrap_or("?");
            let title = item.get("title").and_then(|v| v.as_str()).unwrap_or("?");
            match item.get("quantity").and_then(|v| v.as_u64()) {
                Some(quantity) => println!("  {id}  x{quantity}  {title}"),
                None => println!("  {id}  {title}"),
            }
        }
    }
    if let Some(code) = record.snapshot.get("couponCode").and_then(|v| v.as_str()) {
        println!("Coupon: {code}");
    }

    println!();
    println!("Snapshot:");
    println!("---------");
    match serde_json::to_string_pretty(&record.snapshot) {
        Ok(pretty) => println!("{pretty}"),
        Err(e) => eprintln!("Error formatting snapshot: {e}"),
    }
}
