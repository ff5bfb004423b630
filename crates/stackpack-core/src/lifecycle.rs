use crate::pipeline::PipelineState;
use crate::CoreError;

pub fn validate_transition(from: PipelineState, to: PipelineState) -> Result<(), CoreError> {
    use PipelineState::{
        Assembling, Bootstrapping, Completed, Failed, Idle, InitializingOs, InstallingDatabase,
        InstallingOption, Validating,
    };

    let valid = match (from, to) {
        (Idle, Validating)
        | (Validating, Bootstrapping)
        | (Bootstrapping, InitializingOs)
        | (InitializingOs, InstallingDatabase)
        | (InstallingDatabase | InstallingOption(_), Assembling)
        | (InstallingDatabase, InstallingOption(0))
        | (Assembling, Completed) => true,
        (InstallingOption(i), InstallingOption(j)) => j == i + 1,
        (from, Failed) => !from.is_terminal(),
        _ => false,
    };

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
    use PipelineState::{
        Assembling, Bootstrapping, Completed, Failed, Idle, InitializingOs, InstallingDatabase,
        InstallingOption, Validating,
    };

    #[test]
    fn forward_path_is_valid() {
        let path = [
            Idle,
            Validating,
            Bootstrapping,
            InitializingOs,
            InstallingDatabase,
            InstallingOption(0),
            InstallingOption(1),
            Assembling,
            Completed,
        ];
        for pair in path.windows(2) {
            assert!(validate_transition(pair[0], pair[1]).is_ok(), "{pair:?}");
        }
    }

    #[test]
    fn no_options_goes_straight_to_assembly() {
        assert!(validate_transition(InstallingDatabase, Assembling).is_ok());
    }

    #[test]
    fn every_non_terminal_state_can_fail() {
        for s in [
            Idle,
            Validating,
            Bootstrapping,
            InitializingOs,
            InstallingDatabase,
            InstallingOption(3),
            Assembling,
        ] {
            assert!(validate_transition(s, Failed).is_ok(), "{s}");
        }
    }

    #[test]
    fn invalid_transitions() {
        assert!(validate_transition(Idle, Bootstrapping).is_err());
        assert!(validate_transition(Validating, InstallingDatabase).is_err());
        assert!(validate_transition(InstallingDatabase, InstallingOption(1)).is_err());
        assert!(validate_transition(InstallingOption(0), InstallingOption(2)).is_err());
        assert!(validate_transition(InstallingOption(1), InstallingOption(0)).is_err());
        assert!(validate_transition(Completed, Failed).is_err());
        assert!(validate_transition(Failed, Failed).is_err());
        assert!(validate_transition(Failed, Validating).is_err());
        assert!(validate_transition(Assembling, Idle).is_err());
    }
}
