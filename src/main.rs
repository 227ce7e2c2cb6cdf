use std::process::ExitCode;

use zendesk_extract::config::Config;
use zendesk_extract::error::error_chain;
use zendesk_extract::logging::{init_tracing, LogConfig};
use zendesk_extract::mailer::{MailError, Mailer};
use zendesk_extract::pipeline;

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            // The mail gateway address is itself configuration, so config
            // failures can only be reported on the console.
            init_tracing(&LogConfig::default());
            tracing::error!(error = %e, "Invalid configuration");
            return ExitCode::from(2);
        }
    };

    init_tracing(&LogConfig::from(&config));
    tracing::info!("Starting zendesk-extract");

    match pipeline::run_from_config(&config).await {
        Ok(report) => {
            tracing::info!(run_id = %report.run_id, "Extract finished");
            ExitCode::SUCCESS
        }
        Err(e) => {
            let trace = error_chain(&e);
            tracing::error!(error = %e, trace = %trace, "Extract run failed");

            let mailer = Mailer::new(&config.mail);
            let body = format!("{e}\n\n{trace}");
            match mailer.send("Zendesk Extract Error", &body).await {
                Ok(()) => tracing::info!("Failure notification sent"),
                Err(MailError::Disabled) => {
                    tracing::warn!("Mail notifications disabled, failure not emailed")
                }
                Err(mail_err) => {
                    tracing::warn!(error = %mail_err, "Failed to send failure notification")
                }
            }
            ExitCode::FAILURE
        }
    }
}
