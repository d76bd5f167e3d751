//! Utility functions for APDU response handling

use tracing::debug;

use crate::response::error::ResponseError;
use crate::response::status::StatusWord;

/// Split raw APDU response data into its status word and payload
///
/// # Errors
/// Returns an error if the data is too short to contain a valid status word.
pub fn extract_status_and_payload(data: &[u8]) -> Result<(StatusWord, &[u8]), ResponseError> {
    let Some(split) = data.len().checked_sub(2) else {
        debug!("Response too short: {} bytes", data.len());
        return Err(ResponseError::Incomplete);
    };

    let (payload, sw) = data.split_at(split);
    Ok((StatusWord::new(sw[0], sw[1]), payload))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_status_and_payload() {
        let data = [0x01, 0x02, 0x03, 0x90, 0x00];
        let (status, payload) = extract_status_and_payload(&data).unwrap();
        assert_eq!(status, StatusWord::new(0x90, 0x00));
        assert_eq!(payload, &[0x01, 0x02, 0x03]);

        let data = [0x97, 0x89];
        let (status, payload) = extract_status_and_payload(&data).unwrap();
        assert_eq!(status.to_u16(), 0x9789);
        assert!(payload.is_empty());

        assert!(extract_status_and_payload(&[0x90]).is_err());
    }
}
