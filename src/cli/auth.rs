//! CLI command handlers for login, status, logout and token.

use std::process::Command;
use std::sync::Arc;

use crate::auth::backend::UserPrompt;
use crate::auth::controller::AuthController;
use crate::auth::error::AuthError;
use crate::auth::state::AuthState;
use crate::config::DeviceAuthConfig;
use crate::error::{Error, Result};

/// Prints the user code and verification page, optionally launching a browser.
pub struct TerminalPrompt {
    open_browser: bool,
}

impl TerminalPrompt {
    pub fn new(open_browser: bool) -> Self {
        Self { open_browser }
    }
}

impl UserPrompt for TerminalPrompt {
    fn copy_user_code(&self, user_code: &str) -> std::result::Result<(), AuthError> {
        println!("📋 Enter code: {user_code}");
        Ok(())
    }

    fn open_verification_uri(&self, uri: &str) -> std::result::Result<(), AuthError> {
        println!("🔗 Visit: {uri}");
        if !self.open_browser {
            return Ok(());
        }
        let mut command = if cfg!(target_os = "macos") {
            Command::new("open")
        } else if cfg!(target_os = "windows") {
            let mut cmd = Command::new("cmd");
            cmd.args(["/C", "start", ""]);
            cmd
        } else {
            Command::new("xdg-open")
        };
        command.arg(uri).spawn()?;
        Ok(())
    }
}

/// Handle `device-auth login`.
pub async fn handle_login(config: &DeviceAuthConfig, open_browser: bool) -> Result<()> {
    let controller = controller_for(config)
        .with_prompt(Arc::new(TerminalPrompt::new(open_browser)));

    if let AuthState::Failed(err) = controller.start_auth().await {
        return Err(err.into());
    }
    println!("⏳ Waiting for authorization...");

    let outcome = tokio::select! {
        outcome = controller.wait_for_outcome() => outcome,
        _ = tokio::signal::ctrl_c() => {
            controller.cancel_auth();
            println!("Login cancelled");
            return Ok(());
        }
    };
    controller.shutdown();

    match outcome {
        AuthState::Authenticated { principal } => {
            match principal {
                Some(login) => println!("✅ Logged in as {login}"),
                None => println!("✅ Login successful"),
            }
            Ok(())
        }
        AuthState::Failed(err) => Err(err.into()),
        other => Err(Error::Configuration(format!(
            "login ended in unexpected state: {}",
            other.phase()
        ))),
    }
}

/// Handle `device-auth status`.
pub async fn handle_status(config: &DeviceAuthConfig, json: bool) -> Result<()> {
    let controller = controller_for(config);
    let status = controller.auth_status().await;
    let error = controller.last_status_error();

    if json {
        let mut value = serde_json::to_value(&status)
            .map_err(|e| Error::Serialization(e.to_string()))?;
        if let Some(err) = &error {
            value["error"] = serde_json::Value::String(err.to_string());
        }
        println!("{value}");
        return Ok(());
    }

    println!("🔐 Authentication Status ({})\n", config.profile);
    if status.authenticated {
        let who = status.principal.as_deref().unwrap_or("unknown account");
        match status.expires_at {
            Some(expires) => println!(
                "  ✅ Logged in as {who} (Copilot token until {})",
                expires.format("%Y-%m-%d %H:%M")
            ),
            None => println!("  ✅ Logged in as {who}"),
        }
    } else {
        println!("  ❌ Not logged in");
    }
    if let Some(err) = error {
        println!("  ⚠️  Status check failed: {err}");
    }
    Ok(())
}

/// Handle `device-auth logout`.
pub async fn handle_logout(config: &DeviceAuthConfig) -> Result<()> {
    controller_for(config).logout().await?;
    println!("✅ Logged out ({})", config.profile);
    Ok(())
}

/// Handle `device-auth token`.
pub async fn handle_token(config: &DeviceAuthConfig) -> Result<()> {
    let token = config.build_backend().valid_copilot_token().await?;
    println!("{}", token.token);
    Ok(())
}

fn controller_for(config: &DeviceAuthConfig) -> AuthController {
    AuthController::for_backend_with_settings(config.build_backend(), config.controller_settings())
}
