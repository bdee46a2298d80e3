//! Account email templates

/// A rendered email
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub subject: String,
    pub body: String,
}

fn greeting(display_name: Option<&str>) -> String {
    match display_name {
        Some(name) if !name.trim().is_empty() => format!("Hello {},", name.trim()),
        _ => "Hello,".to_string(),
    }
}

/// Email with the address verification link
pub fn verification_email(
    base_url: &str,
    display_name: Option<&str>,
    token: &str,
    ttl_hours: i64,
) -> EmailMessage {
    let link = format!("{}/verify-email?token={}", base_url.trim_end_matches('/'), token);
    EmailMessage {
        subject: "Verify your email address".to_string(),
        body: format!(
            "{}\n\nPlease confirm your email address by opening the link below:\n\n{}\n\n\
             The link expires in {} hours. If you did not create an account you can ignore this message.\n",
            greeting(display_name),
            link,
            ttl_hours
        ),
    }
}

/// Email with the password reset link
pub fn password_reset_email(
    base_url: &str,
    display_name: Option<&str>,
    token: &str,
    ttl_minutes: i64,
) -> EmailMessage {
    let link = format!(
        "{}/reset-password?token={}",
        base_url.trim_end_matches('/'),
        token
    );
    EmailMessage {
        subject: "Reset your password".to_string(),
        body: format!(
            "{}\n\nA password reset was requested for your account. Open the link below to choose a new password:\n\n{}\n\n\
             The link expires in {} minutes and can be used once. If you did not request a reset, no action is needed.\n",
            greeting(display_name),
            link,
            ttl_minutes
        ),
    }
}

/// Confirmation that the password was changed
pub fn password_changed_email(display_name: Option<&str>) -> EmailMessage {
    EmailMessage {
        subject: "Your password was changed".to_string(),
        body: format!(
            "{}\n\nThe password for your account was just changed and other sessions were signed out.\n\
             If this was not you, reset your password immediately.\n",
            greeting(display_name)
        ),
    }
}
