use serde::{Deserialize, Serialize};

/// A link found on a sampled page that is considered broken.
///
/// `status` is the HTTP status (only 404 is ever recorded) or `0` when the
/// probe failed at the transport level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokenLinkRecord {
    #[serde(rename = "page")]
    pub origin_page: String,
    pub link: String,
    pub status: u16,
}

impl BrokenLinkRecord {
    pub fn not_found(origin_page: String, link: String) -> Self {
        Self {
            origin_page,
            link,
            status: 404,
        }
    }

    pub fn transport_failure(origin_page: String, link: String) -> Self {
        Self {
            origin_page,
            link,
            status: 0,
        }
    }

    pub fn is_transport_failure(&self) -> bool {
        self.status == 0
    }
}

impl std::fmt::Display for BrokenLinkRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_transport_failure() {
            write!(f, "{} (network error) on {}", self.link, self.origin_page)
        } else {
            write!(f, "{} ({}) on {}", self.link, self.status, self.origin_page)
        }
    }
}

/// Tri-state outcome of the lead form after a submission.
///
/// `message` carries the page's error text when one was shown. When neither
/// signal appeared the native validity is reported without a message, and an
/// indeterminate state is invalid with an explanatory message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormValidationOutcome {
    pub is_valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl FormValidationOutcome {
    pub fn valid() -> Self {
        Self {
            is_valid: true,
            message: None,
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            message: Some(message.into()),
        }
    }

    /// Native validity with no UI message attached.
    pub fn from_validity(is_valid: bool) -> Self {
        Self {
            is_valid,
            message: None,
        }
    }
}
