//! Login, signup and lock screen commands.

use kinfolk_shared::Remediation;

use crate::auth::ConnectionReport;
use crate::shell::Shell;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthCommand {
    Login { email: String, password: String },
    Signup { email: String, password: String, name: String },
    ToggleMode,
    ResetPassword { email: String },
    ResendConfirmation { email: String },
    TestConnection,
    Unlock(String),
}

pub(crate) const HELP: &[&str] = &[
    "/login <email> <password>",
    "/signup <email> <password> <name>   (stage a photo first with /attach)",
    "/mode                  switch between login and signup",
    "/forgot <email>        send a password reset email",
    "/resend <email>        resend the confirmation email",
    "/test                  test the backend connection",
];

pub(crate) fn parse(name: &str, args: &str) -> Result<AuthCommand, String> {
    let mut words = args.split_whitespace();
    match name {
        "login" => match (words.next(), words.next()) {
            (Some(email), Some(password)) => Ok(AuthCommand::Login {
                email: email.to_string(),
                password: password.to_string(),
            }),
            _ => Err("Usage: /login <email> <password>".to_string()),
        },
        "signup" => {
            let (email, password) = (words.next(), words.next());
            let name = words.collect::<Vec<_>>().join(" ");
            match (email, password) {
                (Some(email), Some(password)) => Ok(AuthCommand::Signup {
                    email: email.to_string(),
                    password: password.to_string(),
                    name,
                }),
                _ => Err("Usage: /signup <email> <password> <name>".to_string()),
            }
        }
        "mode" => Ok(AuthCommand::ToggleMode),
        "forgot" => Ok(AuthCommand::ResetPassword {
            email: args.to_string(),
        }),
        "resend" => Ok(AuthCommand::ResendConfirmation {
            email: args.to_string(),
        }),
        "test" => Ok(AuthCommand::TestConnection),
        "pin" => Ok(AuthCommand::Unlock(args.to_string())),
        _ => Err(super::unknown(name)),
    }
}

pub(crate) async fn execute(shell: &mut Shell, command: AuthCommand) {
    if let AuthCommand::Unlock(pin) = &command {
        shell.unlock_with_pin(pin).await;
        return;
    }
    let Some(mut flow) = shell.auth.take() else {
        return;
    };
    shell.clear_notice();

    match command {
        AuthCommand::Login { email, password } => {
            let outcome = flow.login(&email, &password).await;
            shell.observe(&outcome);
            if let Ok(identity) = outcome {
                shell.auth = Some(flow);
                shell.on_login(identity).await;
                return;
            }
        }
        AuthCommand::Signup {
            email,
            password,
            name,
        } => {
            shell.begin_signup();
            let photo = shell.pending.first().cloned();
            let outcome = flow.signup(&email, &password, &name, photo.as_ref()).await;
            shell.observe(&outcome);
            if outcome.is_ok() {
                shell.pending.clear();
            }
            shell.auth = Some(flow);
            shell.on_signup_complete(outcome.ok()).await;
            return;
        }
        AuthCommand::ToggleMode => flow.toggle_mode(),
        AuthCommand::ResetPassword { email } => {
            let outcome = flow.request_password_reset(&email).await;
            shell.observe(&outcome);
            if outcome.is_ok() {
                shell.set_notice("Password reset email sent. Check your inbox.");
            }
        }
        AuthCommand::ResendConfirmation { email } => {
            let outcome = flow.resend_confirmation(&email).await;
            shell.observe(&outcome);
            if outcome.is_ok() {
                shell.set_notice("Confirmation email sent. Check your inbox.");
            }
        }
        AuthCommand::TestConnection => {
            let report = flow.test_connection().await;
            shell.set_notice(describe(&report));
        }
        AuthCommand::Unlock(_) => {}
    }
    shell.auth = Some(flow);
}

fn describe(report: &ConnectionReport) -> String {
    match report {
        ConnectionReport::Reachable { elapsed } => {
            format!("Connected in {} ms.", elapsed.as_millis())
        }
        ConnectionReport::ReachableSchemaMissing { elapsed } => format!(
            "Connected in {} ms, but the tables are missing. Type /setup for the SQL.",
            elapsed.as_millis()
        ),
        ConnectionReport::Failed(e) => match e.remediation() {
            Remediation::Retry => format!("{} Check the backend URL and try again.", e.user_message()),
            _ => e.user_message(),
        },
    }
}
