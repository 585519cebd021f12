use crate::configuration::GeofenceSettings;

const EARTH_RADIUS_KM: f64 = 6371.0;

/// Haversine distance between two coordinates, in meters.
pub fn haversine_distance_meters(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let dlat = (lat2 - lat1).to_radians();
    let dlon = (lon2 - lon1).to_radians();

    let a = (dlat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_KM * c * 1000.0
}

/// Whether the reported position is close enough to the configured site
/// for an attendance event to be accepted.
pub fn is_within_geofence(settings: &GeofenceSettings, latitude: f64, longitude: f64) -> bool {
    haversine_distance_meters(
        latitude,
        longitude,
        settings.site_latitude,
        settings.site_longitude,
    ) <= settings.max_distance_meters
}
