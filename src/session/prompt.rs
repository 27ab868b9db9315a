use crate::config::ConnectOptions;
use regex::Regex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PromptKind {
    Shell,
    Login,
    Password,
}

/// `Incomplete` is deliberately distinct from `NoMatch`: non-empty text that
/// matched nothing may still turn into a prompt once more bytes arrive, so
/// the caller must retain it and wait.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum MatchOutcome {
    Matched { kind: PromptKind, offset: usize },
    Incomplete,
    NoMatch,
}

#[derive(Debug)]
pub(crate) struct PromptMatcher {
    shell: Regex,
    login: Regex,
    password: Regex,
    detected_shell: Option<String>,
}

impl PromptMatcher {
    pub(crate) fn from_options(options: &ConnectOptions) -> Result<Self, regex::Error> {
        Ok(Self {
            shell: Regex::new(&options.shell_prompt)?,
            login: Regex::new(&options.login_prompt)?,
            password: Regex::new(&options.password_prompt)?,
            detected_shell: None,
        })
    }

    /// Shell is tested first: reaching an interactive prompt ends the
    /// boot/login phase even when the same text would also satisfy the login
    /// or password pattern.
    pub(crate) fn scan(&self, text: &str) -> MatchOutcome {
        if let Some(offset) = self.shell_offset(text) {
            return MatchOutcome::Matched {
                kind: PromptKind::Shell,
                offset,
            };
        }
        if let Some(found) = self.login.find(text) {
            return MatchOutcome::Matched {
                kind: PromptKind::Login,
                offset: found.start(),
            };
        }
        if let Some(found) = self.password.find(text) {
            return MatchOutcome::Matched {
                kind: PromptKind::Password,
                offset: found.start(),
            };
        }
        if text.is_empty() {
            MatchOutcome::NoMatch
        } else {
            MatchOutcome::Incomplete
        }
    }

    /// Echoed prompts can differ in spacing from what the configured pattern
    /// tolerates, so the captured literal is tried before the pattern.
    pub(crate) fn shell_offset(&self, text: &str) -> Option<usize> {
        if let Some(literal) = &self.detected_shell
            && let Some(offset) = text.find(literal.as_str())
        {
            return Some(offset);
        }
        self.shell.find(text).map(|found| found.start())
    }

    /// Records the literal prompt suffix discovered at `offset`. Set at most
    /// once per connection; later calls return the first capture.
    pub(crate) fn capture_shell(&mut self, text: &str, offset: usize) -> &str {
        self.detected_shell
            .get_or_insert_with(|| text[offset..].to_string())
    }

    pub(crate) fn detected_shell(&self) -> Option<&str> {
        self.detected_shell.as_deref()
    }
}
