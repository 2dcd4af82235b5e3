//! Pure transformation from a booking snapshot to the provider's event
//! representation. No side effects and no network access, so the executor
//! stays testable without a live provider.

use serde::{Deserialize, Serialize};

use crate::model::BookingSnapshot;
use crate::timezone::timezone_for_country;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderEvent {
    pub summary: String,
    pub description: String,
    pub start: EventTime,
    pub end: EventTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventTime {
    pub date_time: String,
    pub time_zone: String,
}

pub fn build_event(snapshot: &BookingSnapshot) -> ProviderEvent {
    let timezone = timezone_for_country(snapshot.country.as_deref());
    let service = snapshot.service_name.as_deref().unwrap_or("Booking");

    let description = format!(
        "Booking ID: {}\nClient: {}\nPhone: {}\nService: {}\nBooked on: {}\nBooked via: {}",
        snapshot.booking_id,
        snapshot.client_name.as_deref().unwrap_or("N/A"),
        snapshot.client_phone.as_deref().unwrap_or("N/A"),
        snapshot.service_name.as_deref().unwrap_or("N/A"),
        snapshot.booked_on.as_deref().unwrap_or("N/A"),
        snapshot.booked_via.as_deref().unwrap_or("N/A"),
    );

    ProviderEvent {
        summary: service.to_string(),
        description,
        start: EventTime {
            date_time: snapshot.starts_at.format("%Y-%m-%dT%H:%M:%S").to_string(),
            time_zone: timezone.to_string(),
        },
        end: EventTime {
            date_time: snapshot.ends_at.format("%Y-%m-%dT%H:%M:%S").to_string(),
            time_zone: timezone.to_string(),
        },
    }
}
