//! # Command Encoder
//!
//! Serializes operator commands into the outbound line format
//! `<sensor_type>,<interval_seconds>`.

use super::protocol::*;
use crate::error::Result;

/// Encode a command request into its outbound bytes
///
/// # Arguments
///
/// * `request` - Validated or unvalidated operator request
/// * `terminator` - Line terminator the transport expects (may be empty)
///
/// # Returns
///
/// * `Result<Vec<u8>>` - UTF-8 bytes ready for the serial link
///
/// # Errors
///
/// Returns `StationError::InvalidCommand` if the request fails validation.
///
/// # Examples
///
/// ```
/// use payload_station::frame::encoder::encode_command;
/// use payload_station::frame::protocol::CommandRequest;
///
/// let bytes = encode_command(&CommandRequest::new("GPS", Some(5.0)), "\n").unwrap();
/// assert_eq!(bytes, b"GPS,5\n");
/// ```
pub fn encode_command(request: &CommandRequest, terminator: &str) -> Result<Vec<u8>> {
    request.validate()?;

    let mut line = String::with_capacity(request.target_sensor.len() + 16);
    line.push_str(request.target_sensor.trim());
    line.push(FIELD_SEPARATOR);
    if let Some(interval) = request.interval_seconds {
        line.push_str(&interval.to_string());
    }
    line.push_str(terminator);

    Ok(line.into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StationError;

    #[test]
    fn test_encode_whole_interval() {
        let bytes = encode_command(&CommandRequest::new("Temperature", Some(10.0)), "").unwrap();
        assert_eq!(bytes, b"Temperature,10");
    }

    #[test]
    fn test_encode_fractional_interval() {
        let bytes = encode_command(&CommandRequest::new("Gyroscope", Some(0.5)), "\r\n").unwrap();
        assert_eq!(bytes, b"Gyroscope,0.5\r\n");
    }

    #[test]
    fn test_encode_empty_interval() {
        let bytes = encode_command(&CommandRequest::new("Battery", None), "\n").unwrap();
        assert_eq!(bytes, b"Battery,\n");
    }

    #[test]
    fn test_encode_trims_sensor_name() {
        let bytes = encode_command(&CommandRequest::new("  GPS ", Some(1.0)), "").unwrap();
        assert_eq!(bytes, b"GPS,1");
    }

    #[test]
    fn test_encode_rejects_invalid_request() {
        let result = encode_command(&CommandRequest::new("", Some(1.0)), "\n");
        assert!(matches!(result, Err(StationError::InvalidCommand(_))));
    }
}
