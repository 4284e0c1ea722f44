// src/geo.rs
// Great-circle distance and the layered geographic filter/rank contract.

use std::cmp::Ordering;

use log::debug;

use crate::models::{GeoPoint, Provider, ServiceId};
use crate::normalize::normalize_key;
use crate::results::RankedProvider;

/// Mean Earth radius in kilometers.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Great-circle distance between two points in kilometers (haversine).
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (lat1, lon1, lat2, lon2) =
        (lat1.to_radians(), lon1.to_radians(), lat2.to_radians(), lon2.to_radians());
    let dlat = lat2 - lat1;
    let dlon = lon2 - lon1;
    let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * a.sqrt().asin() * EARTH_RADIUS_KM
}

/// Filter the directory down to the recommended services inside one
/// (department, municipality), then order the survivors.
///
/// Region names compare through the shared key normalizer, so case and
/// accents on either side never break the match. With a user location the
/// order is ascending distance (capped at `max_distance_km`) with
/// routing priority as tie-break; without one, routing priority alone and
/// no distance annotation. An empty result is a valid outcome.
pub fn filter_and_rank(
    providers: &[Provider],
    services: &[ServiceId],
    department: &str,
    municipality: &str,
    user_location: Option<GeoPoint>,
    max_distance_km: f64,
) -> Vec<RankedProvider> {
    let department_key = normalize_key(department);
    let municipality_key = normalize_key(municipality);

    let located: Vec<&Provider> = providers
        .iter()
        .filter(|p| services.contains(&p.service_id))
        .filter(|p| {
            normalize_key(&p.department) == department_key
                && normalize_key(&p.municipality) == municipality_key
        })
        .collect();

    let mut ranked: Vec<RankedProvider> = match user_location {
        Some(origin) => located
            .into_iter()
            .map(|p| RankedProvider {
                provider: p.clone(),
                distance_km: Some(haversine_km(origin.lat, origin.lng, p.latitude, p.longitude)),
            })
            .filter(|rp| rp.distance_km.unwrap_or(f64::INFINITY) <= max_distance_km)
            .collect(),
        None => located
            .into_iter()
            .map(|p| RankedProvider { provider: p.clone(), distance_km: None })
            .collect(),
    };

    ranked.sort_by(|a, b| match (a.distance_km, b.distance_km) {
        (Some(da), Some(db)) => da
            .partial_cmp(&db)
            .unwrap_or(Ordering::Equal)
            .then(a.provider.routing_priority.cmp(&b.provider.routing_priority)),
        _ => a.provider.routing_priority.cmp(&b.provider.routing_priority),
    });

    debug!(
        "geographic filter: {} candidates for {} services in {}/{}",
        ranked.len(),
        services.len(),
        department_key,
        municipality_key
    );
    ranked
}
