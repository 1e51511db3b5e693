use time::OffsetDateTime;
use time::macros::format_description;

const BYTE_UNITS: [&str; 7] = ["Bytes", "KB", "MB", "GB", "TB", "PB", "EB"];

/// Human readable byte size in base 1024 with at most two decimals, e.g. `1.5 MB`.
pub fn format_bytes(bytes: u64) -> String {
    if bytes == 0 {
        return "0 Bytes".to_string();
    }

    let mut unit = 0;
    let mut scaled = bytes as f64;
    while scaled >= 1024.0 && unit < BYTE_UNITS.len() - 1 {
        scaled /= 1024.0;
        unit += 1;
    }

    let rounded = format!("{scaled:.2}");
    let trimmed = rounded.trim_end_matches('0').trim_end_matches('.');
    format!("{trimmed} {}", BYTE_UNITS[unit])
}

pub fn readable_date(date: OffsetDateTime) -> String {
    let description = format_description!("[day padding:none] [month repr:long] [year]");
    date.format(description)
        .unwrap_or_else(|_| date.date().to_string())
}
