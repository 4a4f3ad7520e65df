#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("{method} {path}: HTTP status {status}: {}", format_errors(.errors))]
    Response {
        method: String,
        path: String,
        status: u16,
        errors: Vec<String>,
    },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Error from reqwest: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

fn format_errors(errors: &[String]) -> String {
    if errors.is_empty() {
        "no error details returned".to_string()
    } else {
        errors.join("; ")
    }
}

impl VaultError {
    /// HTTP status of a failed response, if the error came from Vault itself.
    pub fn status(&self) -> Option<u16> {
        match self {
            VaultError::Response { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_status(&self, code: u16) -> bool {
        self.status() == Some(code)
    }

    /// True when Vault rejected a token accessor that has expired or been revoked.
    pub fn is_expired_token(&self) -> bool {
        match self {
            VaultError::Response { status, errors, .. } if *status == 400 || *status == 403 => {
                errors.iter().any(|e| {
                    e.contains("invalid accessor")
                        || e.contains("failed to find accessor entry")
                        || e.contains("token expired")
                })
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(status: u16, msg: &str) -> VaultError {
        VaultError::Response {
            method: "POST".into(),
            path: "auth/token/lookup-accessor".into(),
            status,
            errors: vec![msg.to_string()],
        }
    }

    #[test]
    fn test_expired_token_detection() {
        assert!(response(400, "invalid accessor").is_expired_token());
        assert!(response(403, "1 error occurred: failed to find accessor entry").is_expired_token());
        assert!(!response(500, "invalid accessor").is_expired_token());
        assert!(!response(400, "missing client token").is_expired_token());
        assert!(!VaultError::Network("boom".into()).is_expired_token());
    }

    #[test]
    fn test_response_display() {
        let err = response(400, "bad things");
        assert_eq!(
            err.to_string(),
            "POST auth/token/lookup-accessor: HTTP status 400: bad things"
        );
        assert!(err.is_status(400));
    }

    #[test]
    fn test_from_reqwest() {
        let err: VaultError = reqwest::Client::new()
            .get("not a url")
            .build()
            .unwrap_err()
            .into();
        assert!(matches!(err, VaultError::Reqwest(_)));
        assert_eq!(err.status(), None);
    }
}
