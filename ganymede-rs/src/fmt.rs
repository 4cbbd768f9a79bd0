//! Provides formatting helpers for byte sizes.
use anyhow::Context;

/// Represents a separator used when rendering statistics tables.
pub static SEPARATOR: &str = "---------------------------------------------------------------------------------------------------------\n";

/// Formats a given size in bytes.
///
/// This function determines the ideal unit (ranging from bytes to petabytes) to provide
/// a concise representation.
///
/// Note that a helper function [format_size](format_size) is also provided
/// which directly returns a String. This function also provides some examples.
pub fn format_bytes(size_in_bytes: usize, f: &mut dyn std::fmt::Write) -> std::fmt::Result {
    if size_in_bytes == 1 {
        return write!(f, "1 byte");
    } else if size_in_bytes < 1024 {
        return write!(f, "{} bytes", size_in_bytes);
    }

    let mut magnitude = 0;
    let mut size = size_in_bytes as f32;
    while size > 1024. && magnitude < 5 {
        size /= 1024.;
        magnitude += 1;
    }

    if size <= 10. {
        write!(f, "{:.2} ", size)?;
    } else if size <= 100. {
        write!(f, "{:.1} ", size)?;
    } else {
        write!(f, "{:.0} ", size)?;
    }

    match magnitude {
        1 => write!(f, "KiB"),
        2 => write!(f, "MiB"),
        3 => write!(f, "GiB"),
        4 => write!(f, "TiB"),
        _ => write!(f, "PiB"),
    }
}

/// Formats a given size in bytes.
///
/// Used to render cache budgets and the memory occupied by a group.
///
/// # Examples
///
/// ```
/// assert_eq!(ganymede::fmt::format_size(0), "0 bytes");
/// assert_eq!(ganymede::fmt::format_size(1), "1 byte");
/// assert_eq!(ganymede::fmt::format_size(2048), "2.00 KiB");
/// assert_eq!(ganymede::fmt::format_size(8_734), "8.53 KiB");
/// assert_eq!(ganymede::fmt::format_size(87_340), "85.3 KiB");
/// assert_eq!(ganymede::fmt::format_size(873_400), "853 KiB");
/// assert_eq!(ganymede::fmt::format_size(64 * 1024 * 1024), "64.0 MiB");
/// assert_eq!(ganymede::fmt::format_size(8_734_000_000), "8.13 GiB");
/// ```
pub fn format_size(size_in_bytes: usize) -> String {
    let mut result = String::new();
    let _ = format_bytes(size_in_bytes, &mut result);

    result
}

/// Parses a size (like a cache budget) from a given string.
///
/// This string can have the following suffixes:
/// * **b** or **B**: treats the value as bytes (which is also the default)
/// * **k** or **K**: multiplies the given value by 1024 thus treats the value as KiB
/// * **m** or **M**: multiplies the given value by 1.048.576 thus treats the value as MiB
/// * **g** or **G**: multiplies the given value by 1.073.741.824 thus treats the value as GiB
/// * **t** or **T**: multiplies the given value by 1.099.511.627.776 thus treats the value as TiB
///
/// Returns an **Err** if a non-integer value or an unknown suffix is given, or if the result
/// doesn't fit into a **usize**.
///
/// # Examples
///
/// ```
/// assert_eq!(ganymede::fmt::parse_size("100").unwrap(), 100);
/// assert_eq!(ganymede::fmt::parse_size("100b").unwrap(), 100);
/// assert_eq!(ganymede::fmt::parse_size("2k").unwrap(), 2048);
/// assert_eq!(ganymede::fmt::parse_size("64 M").unwrap(), 64 * 1024 * 1024);
/// assert_eq!(ganymede::fmt::parse_size("1g").unwrap(), 1024 * 1024 * 1024);
///
/// // An invalid suffix results in an error...
/// assert_eq!(ganymede::fmt::parse_size("3 Y").is_err(), true);
///
/// // Decimal numbers result in an error...
/// assert_eq!(ganymede::fmt::parse_size("1.2g").is_err(), true);
///
/// // Negative numbers result in an error...
/// assert_eq!(ganymede::fmt::parse_size("-1").is_err(), true);
/// ```
pub fn parse_size(str: impl AsRef<str>) -> anyhow::Result<usize> {
    lazy_static::lazy_static! {
        static ref NUMBER_AND_SUFFIX: regex::Regex =
            regex::Regex::new(r"^ *(\d+) *([bBkKmMgGtT]?) *$").unwrap();
    }

    let captures = NUMBER_AND_SUFFIX.captures(str.as_ref()).with_context(|| {
        format!(
            "Cannot parse '{}' into a size expression. \
             Expected a positive number and optionally 'b', 'k', 'm', 'g' or 't' as suffix.",
            str.as_ref()
        )
    })?;

    let number = captures[1]
        .parse::<usize>()
        .with_context(|| format!("'{}' is too large to be a size.", &captures[1]))?;
    let factor: usize = match &captures[2] {
        "k" | "K" => 1 << 10,
        "m" | "M" => 1 << 20,
        "g" | "G" => 1 << 30,
        "t" | "T" => 1 << 40,
        _ => 1,
    };

    number
        .checked_mul(factor)
        .with_context(|| format!("'{}' is too large to be a size.", str.as_ref()))
}
