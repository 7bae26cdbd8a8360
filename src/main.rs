//! CLI entry point for sacristan.

mod cli;

use std::io::Write;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use sacristan::api::HttpParishApi;
use sacristan::config::load_config;
use sacristan::session::SessionManager;
use sacristan::store::{default_store_path, FileStore};
use sacristan::types::UserProfile;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = cli::Args::parse();

    let mut config = match load_config(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    };
    if let Some(url) = &args.base_url {
        config.base_url = url.trim_end_matches('/').to_string();
    }

    let api = match HttpParishApi::new(&config.base_url, config.http_timeout) {
        Ok(api) => Arc::new(api),
        Err(e) => {
            eprintln!("error: failed to build HTTP client: {e}");
            std::process::exit(1);
        }
    };
    let store = Arc::new(FileStore::new(default_store_path()));
    let session = SessionManager::new(api, store, &config);

    let result = match args.command {
        cli::Command::Login { email } => run_login(&session, email).await,
        cli::Command::Status => run_status(&session).await,
        cli::Command::Logout => run_logout(&session).await,
        cli::Command::Whoami => run_whoami(&session).await,
        cli::Command::Permissions => run_permissions(&session).await,
    };
    if let Err(message) = result {
        eprintln!("error: {message}");
        std::process::exit(1);
    }
}

async fn run_login(session: &SessionManager, email: Option<String>) -> Result<(), String> {
    let email = match email {
        Some(email) => email,
        None => prompt_line("Email: ").map_err(|e| e.to_string())?,
    };
    if email.is_empty() {
        return Err("email is required".to_string());
    }
    let password = rpassword::prompt_password("Password: ").map_err(|e| e.to_string())?;

    let user = session
        .login(&email, &password)
        .await
        .map_err(|e| e.to_string())?;
    println!("Signed in as {}", describe(&user));
    Ok(())
}

async fn run_status(session: &SessionManager) -> Result<(), String> {
    match session.resume().await {
        Ok(Some(user)) => {
            println!("Session valid for {}", describe(&user));
            Ok(())
        }
        Ok(None) => {
            println!("No stored session; run `sacristan login`.");
            Ok(())
        }
        Err(e) => Err(e.to_string()),
    }
}

async fn run_logout(session: &SessionManager) -> Result<(), String> {
    session.logout().await;
    println!("Logged out.");
    Ok(())
}

async fn run_whoami(session: &SessionManager) -> Result<(), String> {
    let user = resume_required(session).await?;
    println!("{}", describe(&user));
    if !user.permissions.is_empty() {
        println!("permissions: {}", user.permissions.join(", "));
    }
    if let Ok(theme) = session.theme() {
        println!("theme: {theme}");
    }
    Ok(())
}

async fn run_permissions(session: &SessionManager) -> Result<(), String> {
    let catalog = {
        let _user = resume_required(session).await?;
        session
            .permission_catalog()
            .await
            .map_err(|e| e.to_string())?
    };
    for permission in catalog {
        println!("{permission}");
    }
    Ok(())
}

async fn resume_required(session: &SessionManager) -> Result<UserProfile, String> {
    match session.resume().await {
        Ok(Some(user)) => Ok(user),
        Ok(None) => Err("no stored session; run `sacristan login`".to_string()),
        Err(e) => Err(e.to_string()),
    }
}

fn describe(user: &UserProfile) -> String {
    match &user.role {
        Some(role) => format!("{} <{}> ({role})", user.name, user.email),
        None => format!("{} <{}>", user.name, user.email),
    }
}

fn prompt_line(prompt: &str) -> std::io::Result<String> {
    print!("{prompt}");
    std::io::stdout().flush()?;
    let mut line = String::new();
    std::io::stdin().read_line(&mut line)?;
    Ok(line.trim().to_string())
}
