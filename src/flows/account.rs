//! Sign-in, sign-out and password reset.

use tracing::{info, warn};

use crate::context::AppContext;
use crate::error::{AppError, AppResult};
use crate::identity::{resolve_role, Page, Principal, Role};
use crate::model::Credentials;
use crate::notify::{Notice, NoticeLevel};

/// Sign in and admit only staff roles. Anyone else is signed straight back out.
/// On success returns the principal, its role and the landing page.
pub async fn sign_in(ctx: &AppContext, email: &str, password: &str) -> AppResult<(Principal, Role, Page)> {
    let principal = match ctx.identity.sign_in(email, password).await {
        Ok(p) => p,
        Err(e) => {
            warn!(target: "ispdesk::account", "sign-in rejected: {}", e);
            ctx.notify(Notice::new(NoticeLevel::Error, "Invalid credentials", None));
            return Err(e);
        }
    };

    let role = match resolve_role(ctx.roles.as_ref(), &principal).await {
        Ok(role) => role,
        Err(e) => {
            warn!(target: "ispdesk::account", "role lookup failed uid={}: {}", principal.uid, e);
            sign_out_identity(ctx).await;
            ctx.notify(Notice::error("Authentication Error", e.message()));
            return Err(e);
        }
    };

    match role {
        Some(role) if role.is_staff() => {
            let creds = Credentials { username: email.to_string(), password: password.to_string() };
            match ctx.backend.login(&creds).await {
                Ok(resp) if resp.is_success() => {}
                Ok(resp) => warn!(target: "ispdesk::account", "backend login returned {}: {}", resp.status, resp.message),
                Err(e) => warn!(target: "ispdesk::account", "backend login failed: {}", e),
            }
            info!(target: "ispdesk::account", "signed in uid={} role={}", principal.uid, role);
            Ok((principal, role, Page::Customers))
        }
        other => {
            info!(target: "ispdesk::account", "no staff role uid={} role={:?}", principal.uid, other);
            sign_out_identity(ctx).await;
            ctx.notify(Notice::info("Unauthorised", "You are not authorised to login"));
            Err(AppError::forbidden("not_authorised", "You are not authorised to login"))
        }
    }
}

/// End the backend session, then the identity session. A backend failure does not keep the
/// operator signed in.
pub async fn sign_out(ctx: &AppContext) -> AppResult<()> {
    match ctx.backend.logout().await {
        Ok(resp) if resp.is_success() => {}
        Ok(resp) => warn!(target: "ispdesk::account", "backend logout returned {}: {}", resp.status, resp.message),
        Err(e) => warn!(target: "ispdesk::account", "backend logout failed: {}", e),
    }
    ctx.identity.sign_out().await?;
    info!(target: "ispdesk::account", "signed out");
    Ok(())
}

async fn sign_out_identity(ctx: &AppContext) {
    if let Err(e) = ctx.identity.sign_out().await {
        warn!(target: "ispdesk::account", "identity sign-out failed: {}", e);
    }
}

pub async fn request_password_reset(ctx: &AppContext, email: &str) -> AppResult<()> {
    let email = email.trim();
    if email.is_empty() {
        ctx.notify(Notice::warning("Missing Email", "Please enter your email to reset the password."));
        return Err(AppError::user("missing_email", "Please enter your email to reset the password."));
    }
    match ctx.identity.send_password_reset(email).await {
        Ok(()) => {
            ctx.notify(Notice::success("Email Sent").with_description("Password reset email sent. Please check your inbox."));
            Ok(())
        }
        Err(e) => {
            warn!(target: "ispdesk::account", "password reset failed: {}", e);
            ctx.notify(Notice::new(
                NoticeLevel::Error,
                "Password reset failed",
                Some("Failed to send password reset email. Please try again.".into()),
            ));
            Err(e)
        }
    }
}
