use thiserror::Error;

use crate::types::PublishKind;

/// Client-facing failures of the publish pipeline.
///
/// Every variant except `Silo` and `Internal` maps to a 4xx status. Silo
/// adapter errors keep the status code the silo reported; anything
/// unexpected becomes a 500 after the operator has been notified.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("Target must be {endpoint}/publish/{{{supported}}}")]
    UnsupportedTarget { endpoint: String, supported: String },

    #[error("Could not parse source URL {url}")]
    BadSourceUrl { url: String },

    #[error("Could not find {silo} account for {domain}. Check that your site is registered with your account.")]
    AccountNotFound { silo: String, domain: String },

    #[error("{0}")]
    FeatureDisabled(String),

    #[error("Please log into {silo} as {name} to publish that page.")]
    WrongAccount { silo: String, name: String },

    #[error("Sorry, you've already published that page. Try publishing one you haven't yet!")]
    AlreadyPublished,

    #[error("Looks like that's a {silo} URL. Try one from your web site instead!")]
    SourceIsOwnSilo { silo: String },

    #[error("Looks like that's your home page. Try one of your posts instead!")]
    SourceIsHomePage,

    #[error("Could not fetch source URL {url}")]
    SourceFetchFailed { url: String },

    #[error("{0}")]
    NoContent(String),

    #[error("Cannot publish {0}s")]
    UnimplementedKind(PublishKind),

    #[error("Couldn't find link to {url}")]
    MissingBacklink { url: String },

    #[error("Found no {domain} url to {verb}. Check that the original post has a syndication link to {domain}!")]
    NoMatchingTarget { domain: String, verb: &'static str },

    #[error("{message}")]
    Silo { status: u16, message: String },

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl PublishError {
    /// HTTP status to report this failure with
    pub fn http_status(&self) -> u16 {
        match self {
            PublishError::WrongAccount { .. } => 403,
            PublishError::SourceFetchFailed { .. } => 502,
            PublishError::Silo { status, .. } => *status,
            PublishError::Internal(_) => 500,
            _ => 400,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_by_variant() {
        assert_eq!(PublishError::AlreadyPublished.http_status(), 400);
        assert_eq!(
            PublishError::WrongAccount {
                silo: "FakeSilo".to_string(),
                name: "fake".to_string()
            }
            .http_status(),
            403
        );
        assert_eq!(
            PublishError::Silo {
                status: 402,
                message: "payment required".to_string()
            }
            .http_status(),
            402
        );
        assert_eq!(
            PublishError::Internal(anyhow::anyhow!("boom")).http_status(),
            500
        );
    }

    #[test]
    fn messages_name_the_problem() {
        let err = PublishError::SourceIsOwnSilo {
            silo: "FakeSilo".to_string(),
        };
        assert!(err.to_string().contains("that's a FakeSilo URL"));

        let err = PublishError::NoMatchingTarget {
            domain: "fa.ke".to_string(),
            verb: "reply to",
        };
        assert!(err.to_string().contains("no fa.ke url to reply to"));

        let err = PublishError::AlreadyPublished;
        assert!(err.to_string().contains("already published that page"));
    }
}
