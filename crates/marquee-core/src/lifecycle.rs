use crate::session::SessionState;
use crate::CoreError;

pub fn validate_transition(from: SessionState, to: SessionState) -> Result<(), CoreError> {
    let valid = matches!(
        (from, to),
        (
            SessionState::Starting,
            SessionState::Running | SessionState::Failed
        ) | (
            SessionState::Running,
            SessionState::Exited | SessionState::Stopped | SessionState::Failed
        )
    );

    if valid {
        Ok(())
    } else {
        Err(CoreError::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_transitions() {
        assert!(validate_transition(SessionState::Starting, SessionState::Running).is_ok());
        assert!(validate_transition(SessionState::Starting, SessionState::Failed).is_ok());
        assert!(validate_transition(SessionState::Running, SessionState::Exited).is_ok());
        assert!(validate_transition(SessionState::Running, SessionState::Stopped).is_ok());
        assert!(validate_transition(SessionState::Running, SessionState::Failed).is_ok());
    }

    #[test]
    fn invalid_transitions() {
        assert!(validate_transition(SessionState::Starting, SessionState::Exited).is_err());
        assert!(validate_transition(SessionState::Running, SessionState::Running).is_err());
        assert!(validate_transition(SessionState::Exited, SessionState::Running).is_err());
        assert!(validate_transition(SessionState::Stopped, SessionState::Exited).is_err());
        assert!(validate_transition(SessionState::Failed, SessionState::Starting).is_err());
    }

    #[test]
    fn error_names_both_states() {
        let err = validate_transition(SessionState::Exited, SessionState::Running).unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid session state transition: exited -> running"
        );
    }
}
