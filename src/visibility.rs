//! Visibility collaborator: per-role viewing surfaces.
//!
//! Purely observational. The engine asks for one named surface per agent
//! role at run start and never reads anything back; failures are logged
//! and ignored.

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

#[async_trait]
pub trait ViewSurface: Send + Sync {
    /// Ensure a named viewing surface exists for every role.
    async fn ensure_surfaces(&self, roles: &[String]) -> anyhow::Result<()>;
}

/// No-op surface for headless runs and tests.
pub struct NullSurface;

#[async_trait]
impl ViewSurface for NullSurface {
    async fn ensure_surfaces(&self, _roles: &[String]) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Tmux-backed surface: one window per role inside a dedicated session.
pub struct TmuxSurface {
    session: String,
}

impl TmuxSurface {
    pub fn new(session: impl Into<String>) -> Self {
        Self {
            session: session.into(),
        }
    }

    async fn tmux(&self, args: &[&str]) -> anyhow::Result<String> {
        let output = Command::new("tmux").args(args).output().await?;
        if !output.status.success() {
            anyhow::bail!(
                "tmux {} failed: {}",
                args.join(" "),
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    async fn ensure_session(&self) -> anyhow::Result<()> {
        if self.tmux(&["has-session", "-t", &self.session]).await.is_ok() {
            debug!(session = %self.session, "tmux session exists");
            return Ok(());
        }
        self.tmux(&["new-session", "-d", "-s", &self.session]).await?;
        debug!(session = %self.session, "created tmux session");
        Ok(())
    }
}

#[async_trait]
impl ViewSurface for TmuxSurface {
    async fn ensure_surfaces(&self, roles: &[String]) -> anyhow::Result<()> {
        self.ensure_session().await?;

        let existing = self
            .tmux(&["list-windows", "-t", &self.session, "-F", "#{window_name}"])
            .await
            .unwrap_or_default();
        let existing: Vec<&str> = existing.lines().collect();

        for role in roles {
            if existing.contains(&role.as_str()) {
                continue;
            }
            if let Err(err) = self
                .tmux(&["new-window", "-d", "-t", &self.session, "-n", role])
                .await
            {
                warn!(role = %role, %err, "could not create tmux window");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn null_surface_accepts_any_roster() {
        let surface = NullSurface;
        surface
            .ensure_surfaces(&["product_owner".to_string(), "architect".to_string()])
            .await
            .unwrap();
    }
}
