use thiserror::Error;

/// Top-level error type for the striders workspace.
#[derive(Debug, Error)]
pub enum StridersError {
    #[error("Horizon error: {0}")]
    Horizon(#[from] HorizonError),

    #[error("Settings error: {0}")]
    Settings(#[from] SettingsError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Horizon window and timing-table errors.
///
/// Detected synchronously; a failed check aborts only the call that
/// triggered it and leaves the window unmutated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HorizonError {
    #[error("Horizon needs at least {required} schedules, got {given}")]
    InvalidLength { given: usize, required: usize },

    #[error("Step {step} outside horizon [0, {horizon})")]
    IndexOutOfRange { step: usize, horizon: usize },

    #[error("Unknown end effector: {0}")]
    UnknownEndEffector(String),

    #[error("Recession requested before any horizon was generated")]
    HorizonExhausted,
}

/// Dimension or value inconsistencies detected at initialization.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Dimension mismatch for {what}: expected {expected}, got {got}")]
    SettingsMismatch {
        what: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("Invalid value for {field}: {message}")]
    InvalidValue {
        field: &'static str,
        message: String,
    },
}

/// Errors loading settings from TOML files.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Settings error: {0}")]
    Settings(#[from] SettingsError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn striders_error_from_horizon_error() {
        let err = HorizonError::HorizonExhausted;
        let top: StridersError = err.into();
        assert!(matches!(top, StridersError::Horizon(_)));
        assert!(top.to_string().contains("Recession"));
    }

    #[test]
    fn striders_error_from_settings_error() {
        let err = SettingsError::SettingsMismatch {
            what: "state dimension",
            expected: 19,
            got: 13,
        };
        let top: StridersError = err.into();
        assert!(matches!(top, StridersError::Settings(_)));
        assert!(top.to_string().contains("19"));
    }

    #[test]
    fn config_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: ConfigError = io_err.into();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn horizon_error_is_cheap_to_clone() {
        let err = HorizonError::IndexOutOfRange {
            step: 100,
            horizon: 100,
        };
        assert_eq!(err.clone(), err);
    }

    #[test]
    fn horizon_error_display_messages() {
        assert_eq!(
            HorizonError::InvalidLength {
                given: 40,
                required: 100
            }
            .to_string(),
            "Horizon needs at least 100 schedules, got 40"
        );
        assert_eq!(
            HorizonError::IndexOutOfRange {
                step: 100,
                horizon: 100
            }
            .to_string(),
            "Step 100 outside horizon [0, 100)"
        );
        assert_eq!(
            HorizonError::UnknownEndEffector("left_wheel".into()).to_string(),
            "Unknown end effector: left_wheel"
        );
    }

    #[test]
    fn settings_error_display_messages() {
        assert_eq!(
            SettingsError::SettingsMismatch {
                what: "effort limit",
                expected: 18,
                got: 12
            }
            .to_string(),
            "Dimension mismatch for effort limit: expected 18, got 12"
        );
        assert_eq!(
            SettingsError::InvalidValue {
                field: "mu",
                message: "must be positive".into()
            }
            .to_string(),
            "Invalid value for mu: must be positive"
        );
    }
}
