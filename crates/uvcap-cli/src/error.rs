// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

use std::fmt;
use std::process::ExitCode;

/// CLI-specific error type with exit code mapping
#[derive(Debug)]
pub enum CliError {
    /// Invalid command-line arguments
    InvalidArgs(String),
    /// Device node missing, busy or inaccessible
    DeviceUnavailable(String),
    /// The device rejected the requested format or frame rate
    Unsupported(String),
    /// No frame arrived in time
    Timeout(String),
    /// General error from the capture library
    General(String),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::InvalidArgs(msg) => write!(f, "Invalid arguments: {}", msg),
            CliError::DeviceUnavailable(msg) => write!(f, "Device unavailable: {}", msg),
            CliError::Unsupported(msg) => write!(f, "Unsupported configuration: {}", msg),
            CliError::Timeout(msg) => write!(f, "Timeout: {}", msg),
            CliError::General(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for CliError {}

impl CliError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> ExitCode {
        ExitCode::from(self.code())
    }

    fn code(&self) -> u8 {
        match self {
            CliError::InvalidArgs(_) => 2,
            CliError::DeviceUnavailable(_) => 3,
            CliError::Unsupported(_) => 4,
            CliError::Timeout(_) => 6,
            CliError::General(_) => 1,
        }
    }
}

/// Map uvcap::Error to CliError with appropriate exit codes
impl From<uvcap::Error> for CliError {
    fn from(err: uvcap::Error) -> Self {
        use uvcap::Error;

        if err.is_timeout() {
            return CliError::Timeout(err.to_string());
        }

        match err {
            Error::DeviceUnavailable(io_err) => CliError::DeviceUnavailable(io_err.to_string()),
            Error::UnsupportedFormat { .. } | Error::UnsupportedFramerate(_) => {
                CliError::Unsupported(err.to_string())
            }
            Error::InvalidArgument(msg) => CliError::InvalidArgs(msg),
            _ => CliError::General(err.to_string()),
        }
    }
}

/// Helper function to convert result to exit code
pub fn result_to_exit_code<T>(result: Result<T, CliError>) -> ExitCode {
    match result {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e);
            e.exit_code()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use uvcap::driver::Format;
    use uvcap::fourcc::FourCC;

    #[test]
    fn test_exit_codes() {
        assert_eq!(CliError::InvalidArgs("test".into()).code(), 2);
        assert_eq!(CliError::DeviceUnavailable("test".into()).code(), 3);
        assert_eq!(CliError::Unsupported("test".into()).code(), 4);
        assert_eq!(CliError::Timeout("test".into()).code(), 6);
        assert_eq!(CliError::General("test".into()).code(), 1);
    }

    #[test]
    fn test_library_error_mapping() {
        let err: CliError =
            uvcap::Error::DeviceUnavailable(io::Error::from(io::ErrorKind::NotFound)).into();
        assert!(matches!(err, CliError::DeviceUnavailable(_)));

        let err: CliError = uvcap::Error::UnsupportedFormat {
            requested: Format::new(640, 480, FourCC(*b"MJPG")),
            confirmed: None,
            source: None,
        }
        .into();
        assert!(matches!(err, CliError::Unsupported(_)));

        let err: CliError =
            uvcap::Error::DequeueFailed(io::Error::new(io::ErrorKind::TimedOut, "no frame"))
                .into();
        assert!(matches!(err, CliError::Timeout(_)));

        let err: CliError =
            uvcap::Error::DequeueFailed(io::Error::from_raw_os_error(5)).into();
        assert!(matches!(err, CliError::General(_)));
    }

    #[test]
    fn test_error_display() {
        let err = CliError::DeviceUnavailable("/dev/video0".to_string());
        assert_eq!(format!("{}", err), "Device unavailable: /dev/video0");
    }
}
