//! Classifies the calling context to choose feedback verbosity. Git hooks,
//! capture events and CI runs get silence; a human at a terminal gets a
//! one-line confirmation. Pure classification, no side effects, and the
//! failure mode is always "automated/silent".

use std::io::IsTerminal;

/// Environment variables that mark an automated invocation: git sets the
/// first two inside hooks, the scrivener hook scripts export their own.
pub const AUTOMATION_MARKERS: &[&str] = &["GIT_DIR", "GIT_INDEX_FILE", "SCRIVENER_HOOK"];

/// Common CI environment markers.
pub const CI_MARKERS: &[&str] = &[
    "CI",
    "GITHUB_ACTIONS",
    "GITLAB_CI",
    "CIRCLECI",
    "BUILDKITE",
    "JENKINS_URL",
    "TEAMCITY_VERSION",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallContext {
    Automated,
    Interactive,
}

impl CallContext {
    pub fn is_interactive(self) -> bool {
        matches!(self, CallContext::Interactive)
    }
}

/// Inspect the process environment and stdin. Only ever toggles verbosity;
/// never blocks.
pub fn detect() -> CallContext {
    classify(
        any_marker_set(AUTOMATION_MARKERS),
        any_marker_set(CI_MARKERS),
        std::io::stdin().is_terminal(),
    )
}

/// Interactive only when no automation or CI marker is set and stdin is
/// connected to a terminal.
pub fn classify(automation_marker: bool, ci_marker: bool, stdin_is_tty: bool) -> CallContext {
    if automation_marker || ci_marker || !stdin_is_tty {
        CallContext::Automated
    } else {
        CallContext::Interactive
    }
}

fn any_marker_set(names: &[&str]) -> bool {
    names.iter().any(|name| marker_set(name))
}

fn marker_set(name: &str) -> bool {
    match std::env::var(name) {
        Ok(value) => !value.is_empty() && value != "0" && !value.eq_ignore_ascii_case("false"),
        // Set to something we cannot read still means set.
        Err(std::env::VarError::NotUnicode(_)) => true,
        Err(std::env::VarError::NotPresent) => false,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn interactive_requires_a_tty_and_no_markers() {
        assert_eq!(classify(false, false, true), CallContext::Interactive);
        assert_eq!(classify(true, false, true), CallContext::Automated);
        assert_eq!(classify(false, true, true), CallContext::Automated);
        assert_eq!(classify(false, false, false), CallContext::Automated);
        assert_eq!(classify(true, true, false), CallContext::Automated);
    }

    #[test]
    fn is_interactive() {
        assert!(CallContext::Interactive.is_interactive());
        assert!(!CallContext::Automated.is_interactive());
    }
}
