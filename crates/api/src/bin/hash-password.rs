//! Admin password hashing utility for TipJar
//!
//! Generates the Argon2id hash stored in `admin_settings` for the shared
//! admin password (`AUTH_STRATEGY=password`).
//!
//! Usage:
//!   cargo run --bin hash-password
//!   cargo run --bin hash-password "MySecurePassword123!"

use std::env;
use std::io::{self, Write};

use anyhow::{bail, Context};
use tipjar_api::auth::{hash_password, password::RECOMMENDED_MIN_LENGTH};

fn main() -> anyhow::Result<()> {
    let password = match env::args().nth(1) {
        Some(password) => password,
        None => {
            // Prompting keeps the password out of the process list
            print!("Enter admin password to hash: ");
            io::stdout().flush()?;

            let mut password = String::new();
            io::stdin()
                .read_line(&mut password)
                .context("Failed to read password")?;
            password.trim().to_string()
        }
    };

    if password.is_empty() {
        bail!("Password cannot be empty");
    }

    if password.chars().count() < RECOMMENDED_MIN_LENGTH {
        eprintln!(
            "Warning: password is shorter than {RECOMMENDED_MIN_LENGTH} characters. Consider a longer one."
        );
    }

    let password_hash = hash_password(&password).context("Password hashing failed")?;

    println!("\n===========================================");
    println!("Admin Password Hash (Argon2id):");
    println!("===========================================");
    println!("{password_hash}");
    println!("===========================================\n");

    println!("Store it with:");
    println!(
        "INSERT INTO admin_settings (id, password_hash) VALUES (1, '{password_hash}')\n  \
         ON CONFLICT (id) DO UPDATE SET password_hash = EXCLUDED.password_hash;"
    );

    Ok(())
}
