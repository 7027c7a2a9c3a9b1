use crate::error::Result;
use std::sync::OnceLock;

/// Rounds up to a 4-byte boundary (note names and contents are padded this way).
pub fn align_to_word(n: u64) -> u64 {
    (n + 3) & !3
}

/// Lower case hex without separators, e.g. for build ids and checksums.
pub fn to_hex_string(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Memoizes a fallible computation. Only successes are cached. If two threads race the
/// computation runs twice and the first result stored wins; both are identical because
/// the inputs are immutable.
pub(crate) fn get_or_try_init<T>(cell: &OnceLock<T>, init: impl FnOnce() -> Result<T>) -> Result<&T> {
    if let Some(value) = cell.get() {
        return Ok(value);
    }
    let value = init()?;
    Ok(cell.get_or_init(|| value))
}
