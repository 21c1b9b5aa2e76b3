//! `flydav hash-password`

use std::io::{self, BufRead};

use anyhow::{Context, Result, bail};
use clap::{Args as ClapArgs, ValueEnum};
use flydav_webdav::{PasswordHash, hash_password};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Method {
    Bcrypt,
    Sha256,
}

impl From<Method> for PasswordHash {
    fn from(method: Method) -> Self {
        match method {
            Method::Bcrypt => PasswordHash::Bcrypt,
            Method::Sha256 => PasswordHash::Sha256,
        }
    }
}

#[derive(ClapArgs)]
pub struct Args {
    /// Hash scheme
    #[arg(short, long, value_enum, default_value = "bcrypt")]
    pub method: Method,

    /// Read the password from stdin (single line) instead of prompting
    #[arg(long)]
    pub stdin: bool,
}

fn read_password(from_stdin: bool) -> Result<String> {
    if from_stdin {
        let mut line = String::new();
        io::stdin()
            .lock()
            .read_line(&mut line)
            .context("Failed to read password from stdin")?;
        return Ok(line.trim_end_matches(['\r', '\n']).to_string());
    }

    let password = rpassword::prompt_password("Password: ").context("Failed to read password")?;
    let confirm = rpassword::prompt_password("Confirm: ").context("Failed to read password")?;
    if password != confirm {
        bail!("Passwords do not match");
    }
    Ok(password)
}

pub fn run(args: &Args) -> Result<()> {
    let password = read_password(args.stdin)?;
    if password.is_empty() {
        bail!("Password must not be empty");
    }
    let method = PasswordHash::from(args.method);
    let hash = hash_password(&password, method).context("Failed to hash password")?;

    println!("{hash}");
    eprintln!(
        "Add to an [[auth.users]] entry:\n  password = \"{hash}\"\n  password_hash = \"{method}\""
    );
    Ok(())
}
