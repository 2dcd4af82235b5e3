//! Workpoint country → IANA timezone for provider event times.

/// Timezone for a two-letter country code. Unknown or missing countries fall
/// back to Europe/London.
pub fn timezone_for_country(country: Option<&str>) -> &'static str {
    let code = match country {
        Some(c) => c.trim().to_ascii_uppercase(),
        None => return DEFAULT_TIMEZONE,
    };
    match code.as_str() {
        "GB" | "UK" => "Europe/London",
        "IE" => "Europe/Dublin",
        "FR" => "Europe/Paris",
        "DE" => "Europe/Berlin",
        "IT" => "Europe/Rome",
        "ES" => "Europe/Madrid",
        "PT" => "Europe/Lisbon",
        "BE" => "Europe/Brussels",
        "NL" => "Europe/Amsterdam",
        "LU" => "Europe/Luxembourg",
        "CH" => "Europe/Zurich",
        "AT" => "Europe/Vienna",
        "SE" => "Europe/Stockholm",
        "NO" => "Europe/Oslo",
        "DK" => "Europe/Copenhagen",
        "FI" => "Europe/Helsinki",
        "IS" => "Atlantic/Reykjavik",
        "PL" => "Europe/Warsaw",
        "CZ" => "Europe/Prague",
        "SK" => "Europe/Bratislava",
        "HU" => "Europe/Budapest",
        "RO" => "Europe/Bucharest",
        "BG" => "Europe/Sofia",
        "HR" => "Europe/Zagreb",
        "SI" => "Europe/Ljubljana",
        "EE" => "Europe/Tallinn",
        "LV" => "Europe/Riga",
        "LT" => "Europe/Vilnius",
        "GR" => "Europe/Athens",
        "CY" => "Asia/Nicosia",
        "MT" => "Europe/Malta",
        "RS" => "Europe/Belgrade",
        "ME" => "Europe/Podgorica",
        "BA" => "Europe/Sarajevo",
        "MK" => "Europe/Skopje",
        "AL" => "Europe/Tirane",
        "UA" => "Europe/Kiev",
        "BY" => "Europe/Minsk",
        "MD" => "Europe/Chisinau",
        "TR" => "Europe/Istanbul",
        _ => DEFAULT_TIMEZONE,
    }
}

const DEFAULT_TIMEZONE: &str = "Europe/London";
