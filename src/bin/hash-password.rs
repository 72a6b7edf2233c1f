//! Prints the salted SHA-256 hash of a password, for seeding the
//! `passwordHash` field of accounts under the cp-admin-accounts key.

use std::env;

fn main() {
    let password = env::args().nth(1).unwrap_or_else(|| {
        eprintln!("Usage: cargo run --bin hash-password <PASSWORD>");
        std::process::exit(1);
    });

    let hashed = newsdesk_backend::auth::hash_password(&password);

    println!("\nPassword : {}", password);
    println!("Hash     : {}\n", hashed);
    println!("# Paste this into the account record:");
    println!("\"passwordHash\": \"{}\"", hashed);
}
