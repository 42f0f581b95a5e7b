//! Sign-in command

use anyhow::Result;
use brokkr_secrets::SignInOutcome;

use super::{account_label, open_broker};
use crate::cli::{GlobalOpts, SigninArgs};
use crate::output;

pub async fn run(args: SigninArgs, global: &GlobalOpts) -> Result<()> {
    let broker = open_broker(global)?;
    let label = account_label(&broker);

    match broker.sign_in().await? {
        SignInOutcome::AlreadySignedIn => {
            output::info(&format!("Already signed in to {}", label));
        }
        SignInOutcome::SignedIn => {
            output::success(&format!("Signed in to {}", label));
            if let Some(path) = &broker.config().token_file {
                output::info(&format!("Session token saved to {}", path.display()));
            }
        }
    }

    if args.export {
        let var = broker.session("").session_var();
        match std::env::var(&var) {
            Ok(token) => println!("export {}=\"{}\"", var, token),
            Err(_) => output::warning(&format!(
                "{} is not set; this backend does not use a CLI session",
                var
            )),
        }
    }
    Ok(())
}
