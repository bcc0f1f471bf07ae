//! Popup markup for stops and vehicles.

use crate::{
    data::transit::{Stop, StopTime},
    layers::{marker::VehicleInfo, route_label::escape_html},
};
use chrono::{DateTime, Utc};

/// "3 min", "now" or "12:45" depending on how far off `at` is
fn relative_time(at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let minutes = (at - now).num_minutes();
    match minutes {
        m if m.abs() < 1 => "now".to_string(),
        m if (1..60).contains(&m) => format!("{m} min"),
        m if (-60..0).contains(&m) => format!("{} min ago", -m),
        _ => at.format("%H:%M").to_string(),
    }
}

fn age(at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let seconds = (now - at).num_seconds().max(0);
    if seconds < 60 {
        format!("{seconds}s ago")
    } else {
        format!("{} min ago", seconds / 60)
    }
}

pub fn stop_popup_html(stop: &Stop, next: Option<&StopTime>, now: DateTime<Utc>) -> String {
    let mut html = String::from(r#"<div class="transit-popup transit-popup--stop">"#);
    html.push_str(&format!(
        r#"<h3 class="transit-popup__title">{}</h3>"#,
        escape_html(&stop.name)
    ));

    let mut meta = Vec::new();
    if let Some(code) = &stop.code {
        meta.push(format!("Stop #{}", escape_html(code)));
    }
    if let Some(direction) = &stop.direction {
        meta.push(format!("{}-bound", escape_html(direction)));
    }
    if !meta.is_empty() {
        html.push_str(&format!(
            r#"<p class="transit-popup__meta">{}</p>"#,
            meta.join(" · ")
        ));
    }

    if !stop.route_short_names.is_empty() {
        html.push_str(r#"<ul class="transit-popup__routes">"#);
        for route in &stop.route_short_names {
            html.push_str(&format!("<li>{}</li>", escape_html(route)));
        }
        html.push_str("</ul>");
    }

    if let Some(stop_time) = next {
        let headsign = stop_time
            .headsign
            .as_deref()
            .map(|h| format!(" to {}", escape_html(h)))
            .unwrap_or_default();
        let kind = if stop_time.predicted_arrival.is_some() {
            "real-time"
        } else {
            "scheduled"
        };
        html.push_str(&format!(
            r#"<p class="transit-popup__arrival transit-popup__arrival--{kind}">{}{}: {}</p>"#,
            escape_html(&stop_time.route_short_name),
            headsign,
            relative_time(stop_time.best_arrival(), now)
        ));
    }

    html.push_str("</div>");
    html
}

pub fn vehicle_popup_html(info: &VehicleInfo, now: DateTime<Utc>) -> String {
    let mut html = String::from(r#"<div class="transit-popup transit-popup--vehicle">"#);
    let destination = info
        .destination
        .as_deref()
        .map(|d| format!(" to {}", escape_html(d)))
        .unwrap_or_default();
    html.push_str(&format!(
        r#"<h3 class="transit-popup__title">{}{}</h3>"#,
        escape_html(&info.route_short_name),
        destination
    ));

    if let Some(next_stop) = &info.next_stop_name {
        html.push_str(&format!(
            r#"<p class="transit-popup__next-stop">Next stop: {}</p>"#,
            escape_html(next_stop)
        ));
    }

    let status = if info.predicted {
        "Real-time position"
    } else {
        "Scheduled position"
    };
    html.push_str(&format!(
        r#"<p class="transit-popup__status">{status}, updated {}</p>"#,
        age(info.last_update_time, now)
    ));
    html.push_str(&format!(
        r#"<p class="transit-popup__meta">Vehicle {}</p>"#,
        escape_html(&info.vehicle_id)
    ));
    html.push_str("</div>");
    html
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::geo::LatLng;
    use chrono::{Duration, TimeZone};

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_stop_popup_lists_routes_and_arrival() {
        let stop = Stop::new("1_100", "Pine St & 3rd Ave", LatLng::new(47.61, -122.34))
            .with_code("100")
            .with_routes(["8", "43"]);
        let arrival = StopTime {
            trip_id: "T1".into(),
            route_short_name: "8".into(),
            headsign: Some("Seattle Center".into()),
            scheduled_arrival: noon() + Duration::minutes(6),
            predicted_arrival: Some(noon() + Duration::minutes(4)),
        };

        let html = stop_popup_html(&stop, Some(&arrival), noon());
        assert!(html.contains("Pine St &amp; 3rd Ave"));
        assert!(html.contains("Stop #100"));
        assert!(html.contains("<li>43</li>"));
        assert!(html.contains("8 to Seattle Center: 4 min"));
        assert!(html.contains("arrival--real-time"));
    }

    #[test]
    fn test_relative_time_buckets() {
        assert_eq!(relative_time(noon(), noon()), "now");
        assert_eq!(relative_time(noon() - Duration::minutes(5), noon()), "5 min ago");
        assert_eq!(relative_time(noon() + Duration::hours(2), noon()), "14:00");
    }

    #[test]
    fn test_vehicle_popup() {
        let info = VehicleInfo {
            vehicle_id: "V1".into(),
            trip_id: "T1".into(),
            route_short_name: "8".into(),
            destination: Some("Capitol Hill".into()),
            next_stop_name: Some("Pine St".into()),
            orientation: 90.0,
            predicted: false,
            last_update_time: noon() - Duration::seconds(30),
        };
        let html = vehicle_popup_html(&info, noon());
        assert!(html.contains("8 to Capitol Hill"));
        assert!(html.contains("Next stop: Pine St"));
        assert!(html.contains("Scheduled position, updated 30s ago"));
    }
}
