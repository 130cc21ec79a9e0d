//! UTC session time zone for database connections.
//!
//! Date/time values must be interpreted identically by the test process and
//! the database regardless of the host locale. Instead of mutating any
//! process-wide default, the time zone travels explicitly with every
//! connection: as a startup `options` parameter in connection URLs, and as a
//! session option for connections built programmatically.

/// Session time zone applied to every database connection.
pub const SESSION_TIME_ZONE: &str = "UTC";

/// Connection URL query parameter that pins the session time zone to UTC.
///
/// Decodes to `options=-c TimeZone=UTC`, which PostgreSQL applies as a
/// startup parameter.
pub const UTC_QUALIFIER: &str = "options=-c%20TimeZone%3DUTC";

/// Session options to pass to a programmatic connection builder
/// (e.g. `PgConnectOptions::options`).
#[must_use]
pub fn session_options() -> [(&'static str, &'static str); 1] {
    [("TimeZone", SESSION_TIME_ZONE)]
}

/// Returns true if the URL's query already pins the session time zone to UTC.
///
/// Query values are percent-decoded first, so `options=-c TimeZone=UTC`,
/// `options=-c%20TimeZone=UTC` and [`UTC_QUALIFIER`] all count.
#[must_use]
pub fn has_utc_qualifier(url: &str) -> bool {
    url.split_once('?').is_some_and(|(_, query)| {
        query
            .split('&')
            .filter_map(|pair| pair.split_once('='))
            .any(|(key, value)| {
                key == "options" && percent_decode(value).is_some_and(|v| pins_utc(&v))
            })
    })
}

/// True if a startup `options` value sets `TimeZone=UTC`.
fn pins_utc(options: &str) -> bool {
    options
        .split_whitespace()
        .filter(|arg| *arg != "-c")
        .filter_map(|arg| arg.trim_start_matches('-').split_once('='))
        .any(|(name, value)| {
            name.eq_ignore_ascii_case("TimeZone") && value.eq_ignore_ascii_case(SESSION_TIME_ZONE)
        })
}

/// Decode `%XX` escapes and `+`. `None` on malformed input.
fn percent_decode(raw: &str) -> Option<String> {
    let bytes = raw.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while let Some(&b) = bytes.get(i) {
        match b {
            b'%' => {
                let hex = bytes.get(i + 1..i + 3)?;
                let hex = std::str::from_utf8(hex).ok()?;
                decoded.push(u8::from_str_radix(hex, 16).ok()?);
                i += 3;
            }
            b'+' => {
                decoded.push(b' ');
                i += 1;
            }
            _ => {
                decoded.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8(decoded).ok()
}

/// Append the UTC qualifier to a connection URL.
///
/// Idempotent: a URL that already carries the qualifier is returned unchanged,
/// so the qualifier appears exactly once however often this is applied.
#[must_use]
pub fn with_utc_time_zone(url: &str) -> String {
    if has_utc_qualifier(url) {
        return url.to_string();
    }

    let separator = match url.split_once('?') {
        None => '?',
        Some((_, "")) => return format!("{url}{UTC_QUALIFIER}"),
        Some((_, query)) if query.ends_with('&') => return format!("{url}{UTC_QUALIFIER}"),
        Some(_) => '&',
    };

    format!("{url}{separator}{UTC_QUALIFIER}")
}
