use chrono::Local;
use weatherdeck_core::LocationRecord;

/// Multi-line card for the selected location.
pub fn card(record: &LocationRecord) -> String {
    let snapshot = &record.weather_snapshot;
    let place = &snapshot.location;
    let now = &snapshot.current;
    let today = &snapshot.forecast_day;

    let mut out = String::new();
    out.push_str(&heading(record));
    out.push('\n');
    out.push_str(&format!(
        "  Now:    {:.1}°C (feels like {:.1}°C), {}\n",
        now.temp_c, now.feelslike_c, now.condition
    ));
    out.push_str(&format!(
        "  Today:  {:.1}°C / {:.1}°C, {}, {}% chance of rain\n",
        today.maxtemp_c, today.mintemp_c, today.condition, today.chance_of_rain
    ));
    out.push_str(&format!(
        "  Wind {:.0} km/h, humidity {}%, UV {:.0}\n",
        now.wind_kph, now.humidity, now.uv
    ));
    if !today.astro.sunrise.is_empty() || !today.astro.sunset.is_empty() {
        out.push_str(&format!(
            "  Sunrise {}, sunset {}\n",
            clock_time(&today.astro.sunrise),
            clock_time(&today.astro.sunset)
        ));
    }
    for tip in snapshot.recommendations() {
        out.push_str(&format!("  > {tip}\n"));
    }
    out.push_str(&format!(
        "  Local time {} ({}), updated {}",
        place.localtime,
        place.tz_id,
        record
            .last_updated
            .with_timezone(&Local)
            .format("%H:%M")
    ));
    if record.needs_refresh {
        out.push_str(" [stale]");
    }
    out
}

/// One sidebar line.
pub fn line(record: &LocationRecord) -> String {
    let snapshot = &record.weather_snapshot;
    let stale = if record.needs_refresh { " [stale]" } else { "" };
    format!(
        "{:<24} {:>6.1}°C  {}{}",
        label(record),
        snapshot.current.temp_c,
        snapshot.current.condition,
        stale
    )
}

fn heading(record: &LocationRecord) -> String {
    let place = &record.weather_snapshot.location;
    let region = [place.region.as_str(), place.country.as_str()]
        .into_iter()
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(", ");
    if region.is_empty() {
        label(record)
    } else {
        format!("{} ({region})", label(record))
    }
}

fn label(record: &LocationRecord) -> String {
    if record.is_current_location() {
        format!("{} [{}]", record.display_name(), record.city)
    } else {
        record.city.clone()
    }
}

/// `"07:12 AM"` reads as `"7:12 AM"`; blank reads as `"-"`.
fn clock_time(raw: &str) -> &str {
    let raw = raw.trim();
    if raw.is_empty() {
        return "-";
    }
    match raw.strip_prefix('0') {
        Some(rest) if !rest.starts_with(':') => rest,
        _ => raw,
    }
}
