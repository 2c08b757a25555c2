//! Human-readable data formatting utilities.

use humansize::{BINARY, FormatSizeOptions, format_size as format_size_human};


/// Formats a byte size using binary units (KiB, MiB) with one decimal.
///
/// # Examples
///
/// ```
/// use libctr::format::format_size;
///
/// assert_eq!(format_size(1024 * 1024 * 5), "5.0 MiB");
/// assert_eq!(format_size(1536), "1.5 KiB");
/// ```
pub fn format_size(size_bytes: u64) -> String {
    let options = FormatSizeOptions::from(BINARY)
        .decimal_places(1)
        .decimal_zeroes(1);
    format_size_human(size_bytes, options)
}
