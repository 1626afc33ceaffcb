//! SETTINGS frame payload (RFC 7540 §6.5): a flat list of 16-bit identifier
//! / 32-bit value pairs.

pub mod id {
    pub const HEADER_TABLE_SIZE: u16 = 0x1;
    pub const ENABLE_PUSH: u16 = 0x2;
    pub const MAX_CONCURRENT_STREAMS: u16 = 0x3;
    pub const INITIAL_WINDOW_SIZE: u16 = 0x4;
    pub const MAX_FRAME_SIZE: u16 = 0x5;
    pub const MAX_HEADER_LIST_SIZE: u16 = 0x6;
}

pub fn decode_settings_payload(payload: &[u8]) -> Result<Vec<(u16, u32)>, &'static str> {
    if payload.len() % 6 != 0 {
        return Err("SETTINGS payload length must be a multiple of 6");
    }
    Ok(payload
        .chunks_exact(6)
        .map(|chunk| {
            let id = u16::from_be_bytes([chunk[0], chunk[1]]);
            let value = u32::from_be_bytes([chunk[2], chunk[3], chunk[4], chunk[5]]);
            (id, value)
        })
        .collect())
}

pub fn encode_settings_payload(settings: &[(u16, u32)], out: &mut Vec<u8>) {
    for (id, value) in settings {
        out.extend_from_slice(&id.to_be_bytes());
        out.extend_from_slice(&value.to_be_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_settings_payload() {
        let settings = vec![(id::MAX_CONCURRENT_STREAMS, 100), (id::INITIAL_WINDOW_SIZE, 65_535)];
        let mut payload = Vec::new();
        encode_settings_payload(&settings, &mut payload);
        assert_eq!(decode_settings_payload(&payload).unwrap(), settings);
    }

    #[test]
    fn rejects_a_misaligned_payload() {
        assert!(decode_settings_payload(&[0; 5]).is_err());
    }
}
