use rand::{rngs::OsRng, RngCore};
use crate::error::{AppErr, AppResult};

/// 6 bytes = 48 bits, rendered as 12 uppercase hex chars.
pub const KEY_BYTES: usize = 6;

pub fn room_key() -> AppResult<String> {
    let mut b = [0u8; KEY_BYTES];
    OsRng.try_fill_bytes(&mut b).map_err(|e| AppErr::KeyGen(e.to_string()))?;
    Ok(b.iter().map(|x| format!("{x:02X}")).collect())
}
