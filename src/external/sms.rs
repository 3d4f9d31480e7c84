use crate::config::SmsConfig;
use reqwest::Client;

/// Outbound SMS capability. Delivery is best-effort: code issuance and
/// delivery are not transactional, so callers only get a bool back.
#[derive(Clone)]
pub struct SmsGateway {
    client: Client,
    config: SmsConfig,
}

impl SmsGateway {
    pub fn new(config: SmsConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    pub async fn send(&self, phone_number: &str, message: &str) -> bool {
        if self.config.development {
            log::info!("SMS to {phone_number}: {message}");
            return true;
        }

        let url = format!(
            "https://api.twilio.com/2010-04-01/Accounts/{}/Messages.json",
            self.config.account_sid
        );

        let params = [
            ("To", phone_number),
            ("From", &self.config.from_phone),
            ("Body", message),
        ];

        let response = self
            .client
            .post(&url)
            .basic_auth(&self.config.account_sid, Some(&self.config.auth_token))
            .form(&params)
            .send()
            .await;

        match response {
            Ok(response) if response.status().is_success() => {
                log::info!("SMS sent to {phone_number}");
                true
            }
            Ok(response) => {
                let status = response.status();
                let error_text = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "Unknown error".to_string());
                log::error!("SMS to {phone_number} failed: {status}, {error_text}");
                false
            }
            Err(e) => {
                log::error!("SMS to {phone_number} failed: {e}");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_development_mode_reports_success_without_sending() {
        let gateway = SmsGateway::new(SmsConfig {
            development: true,
            ..Default::default()
        });

        assert!(gateway.send("+15550001111", "Your verification code is: 1234").await);
    }
}
