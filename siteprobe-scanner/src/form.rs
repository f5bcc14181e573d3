//! Page object for a newsletter lead-capture form.
//!
//! The form is found structurally (the first form holding an email input)
//! because the page under test is third-party markup. Submission outcome is
//! observed from the page: an error signal, a success signal, or failing
//! both, the email input's own constraint validity.

use crate::error::{Result, ScanError};
use crate::page::{Locator, Page, WaitUntil};
use crate::result::FormValidationOutcome;
use crate::wait::{DEFAULT_POLL_INTERVAL, await_first, wait_for_visible};
use futures::FutureExt;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const DEFAULT_ERROR_MESSAGE: &str = "Invalid email";
pub const INDETERMINATE_MESSAGE: &str = "Could not determine validation state";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormSelectors {
    pub form: Locator,
    pub email_input: Locator,
    pub submit: Locator,
    pub success: Locator,
    pub error: Locator,
}

impl Default for FormSelectors {
    fn default() -> Self {
        Self {
            form: Locator::containing("form", r#"input[type="email"]"#),
            email_input: Locator::css(r#"input[type="email"]"#),
            submit: Locator::css(r#"input[type="submit"], button[type="submit"]"#),
            success: Locator::text("thank|success|subscribed"),
            error: Locator::any_of([
                Locator::css(".error-message"),
                Locator::css(".form-error"),
                Locator::css("[data-error]"),
            ]),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormTimeouts {
    pub navigation: Duration,
    /// How long the email input may take to show up.
    pub ready: Duration,
    /// Budget for the submit click and for the success/error race.
    pub submit: Duration,
    /// Pause before reading the validation state.
    pub settle: Duration,
    pub poll_interval: Duration,
}

impl Default for FormTimeouts {
    fn default() -> Self {
        Self {
            navigation: Duration::from_secs(30),
            ready: Duration::from_secs(15),
            submit: Duration::from_secs(5),
            settle: Duration::from_secs(1),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// Where the form is in its lifecycle, as last observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FormPhase {
    #[default]
    Unknown,
    Ready,
    Submitted,
    Valid,
    Invalid,
    Indeterminate,
}

/// Which UI signal answered a submission first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitSignal {
    Success,
    Error,
}

pub struct LeadForm<'a, P: Page + ?Sized> {
    page: &'a P,
    url: String,
    selectors: FormSelectors,
    timeouts: FormTimeouts,
    phase: FormPhase,
}

impl<'a, P: Page + ?Sized> LeadForm<'a, P> {
    pub fn new(page: &'a P, url: impl Into<String>) -> Self {
        Self::with_options(page, url, FormSelectors::default(), FormTimeouts::default())
    }

    pub fn with_options(
        page: &'a P,
        url: impl Into<String>,
        selectors: FormSelectors,
        timeouts: FormTimeouts,
    ) -> Self {
        Self {
            page,
            url: url.into(),
            selectors,
            timeouts,
            phase: FormPhase::Unknown,
        }
    }

    pub fn phase(&self) -> FormPhase {
        self.phase
    }

    pub fn selectors(&self) -> &FormSelectors {
        &self.selectors
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// The email input inside the lead form, not elsewhere on the page.
    pub fn email_input(&self) -> Locator {
        Locator::within(self.selectors.form.clone(), self.selectors.email_input.clone())
    }

    pub fn submit_control(&self) -> Locator {
        Locator::within(self.selectors.form.clone(), self.selectors.submit.clone())
    }

    /// Load the form page and wait for the form. Navigation failures are
    /// errors; a form that never shows up is reported as `Ok(false)`.
    pub async fn goto(&mut self) -> Result<bool> {
        info!("Loading form page: {}", self.url);
        self.phase = FormPhase::Unknown;
        self.page
            .goto(&self.url, WaitUntil::DomContentLoaded, self.timeouts.navigation)
            .await
            .inspect_err(|e| warn!("Error loading page {}: {}", self.url, e))?;
        Ok(self.wait_for_form_ready().await)
    }

    /// Wait for the email input, then require both the input and the submit
    /// control to be visible. Never fails; problems read as `false`.
    pub async fn wait_for_form_ready(&mut self) -> bool {
        let appeared = wait_for_visible(
            self.page,
            &self.email_input(),
            self.timeouts.ready,
            self.timeouts.poll_interval,
        )
        .await;

        let ready = match appeared {
            Ok(true) => self.is_form_visible().await.unwrap_or(false),
            Ok(false) => {
                debug!("Email input not visible within {:?}", self.timeouts.ready);
                false
            }
            Err(e) => {
                debug!("Readiness check failed: {}", e);
                false
            }
        };

        if ready {
            self.phase = FormPhase::Ready;
        }
        ready
    }

    pub async fn is_form_visible(&self) -> Result<bool> {
        let email_visible = self.page.is_locator_visible(&self.email_input()).await?;
        let submit_visible = self.page.is_locator_visible(&self.submit_control()).await?;
        Ok(email_visible && submit_visible)
    }

    /// Type `email` (the empty string included) and submit.
    ///
    /// After the click, the first of the success and error signals is
    /// awaited for the submit budget. Neither appearing is not an error.
    pub async fn fill_form(&mut self, email: &str) -> Result<Option<SubmitSignal>> {
        if !self.wait_for_form_ready().await {
            return Err(ScanError::FormNotReady);
        }

        let input = self
            .page
            .query_first(&self.email_input())
            .await?
            .ok_or(ScanError::FormNotReady)?;
        self.page.fill(&input, email).await?;

        let submit = self
            .page
            .query_first(&self.submit_control())
            .await?
            .ok_or(ScanError::FormNotReady)?;
        debug!("Submitting {:?}", email);
        self.page.click(&submit, self.timeouts.submit).await?;
        self.phase = FormPhase::Submitted;

        let page = self.page;
        let timeouts = self.timeouts;
        let success = &self.selectors.success;
        let error = &self.selectors.error;
        let signals = vec![
            async move {
                matches!(
                    wait_for_visible(page, success, timeouts.submit, timeouts.poll_interval).await,
                    Ok(true)
                )
                .then_some(SubmitSignal::Success)
            }
            .boxed(),
            async move {
                matches!(
                    wait_for_visible(page, error, timeouts.submit, timeouts.poll_interval).await,
                    Ok(true)
                )
                .then_some(SubmitSignal::Error)
            }
            .boxed(),
        ];

        let signal = await_first(signals, timeouts.submit).await;
        debug!("Submission signal: {:?}", signal);
        Ok(signal)
    }

    /// Derive the tri-state outcome after a short settle delay. Never fails.
    pub async fn form_validation_state(&mut self) -> FormValidationOutcome {
        tokio::time::sleep(self.timeouts.settle).await;

        let outcome = match self.derive_validation().await {
            Ok(outcome) => outcome,
            Err(e) => {
                debug!("Validation state unavailable: {}", e);
                self.phase = FormPhase::Indeterminate;
                return FormValidationOutcome::invalid(INDETERMINATE_MESSAGE);
            }
        };

        self.phase = if outcome.is_valid {
            FormPhase::Valid
        } else {
            FormPhase::Invalid
        };
        outcome
    }

    async fn derive_validation(&self) -> Result<FormValidationOutcome> {
        let error_visible = self
            .page
            .is_locator_visible(&self.selectors.error)
            .await
            .unwrap_or(false);
        if error_visible {
            let message = match self.page.query_first(&self.selectors.error).await? {
                Some(element) => self.page.text_content(&element).await?,
                None => None,
            };
            let message = message
                .map(|m| m.trim().to_string())
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| DEFAULT_ERROR_MESSAGE.to_string());
            return Ok(FormValidationOutcome::invalid(message));
        }

        let success_visible = self
            .page
            .is_locator_visible(&self.selectors.success)
            .await
            .unwrap_or(false);
        if success_visible {
            return Ok(FormValidationOutcome::valid());
        }

        let input = self
            .page
            .query_first(&self.email_input())
            .await?
            .ok_or_else(|| ScanError::Other("email input is gone".to_string()))?;
        let valid = self.page.check_validity(&input).await?;
        Ok(FormValidationOutcome::from_validity(valid))
    }
}
