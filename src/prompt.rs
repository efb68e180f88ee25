// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! User confirmation policy.
//!
//! Some operations stop and ask before doing something the user may not
//! expect, e.g., creating a missing managed folder, or pulling into a dirty
//! working tree. Components never talk to the terminal directly. They take a
//! [`Prompt`] instead, so non-interactive callers can answer for the user.

use inquire::Confirm;
use tracing::{debug, warn};

/// Ask the user a yes or no question.
pub trait Prompt {
    /// Return true if the user agreed.
    fn confirm(&self, message: &str) -> bool;
}

impl<P> Prompt for &P
where
    P: Prompt + ?Sized,
{
    fn confirm(&self, message: &str) -> bool {
        (**self).confirm(message)
    }
}

/// Interactive prompt on the terminal.
///
/// Defaults to "no". Failure to read an answer, e.g., closed standard input
/// or an interrupt, also counts as "no".
#[derive(Debug, Default, Clone, Copy)]
pub struct InquirePrompt;

impl Prompt for InquirePrompt {
    fn confirm(&self, message: &str) -> bool {
        match Confirm::new(message).with_default(false).prompt() {
            Ok(answer) => answer,
            Err(error) => {
                warn!("cannot read answer, defaulting to no: {error}");
                false
            }
        }
    }
}

/// Non-interactive prompt that always gives the same answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedAnswer(pub bool);

impl Prompt for FixedAnswer {
    fn confirm(&self, message: &str) -> bool {
        debug!("answer {:?} to {message:?}", self.0);
        self.0
    }
}
