use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use derive_new::new;
use reqwest::Client;
use serde::Deserialize;
use snafu::{ensure, Location, OptionExt, ResultExt, Snafu};
use tracing::instrument;

use crate::config::{api_root, Config};

/// A point on the globe, in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, new)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

/// A located place: where it is, and what to call it when reporting.
#[derive(Debug, Clone, new)]
pub struct Place {
    pub coordinates: Coordinates,
    pub name: String,
}

/// Sunrise and sunset for one location on one date, in UTC.
#[derive(Debug, Clone, Copy, new)]
pub struct SunTimes {
    pub sunrise: DateTime<Utc>,
    pub sunset: DateTime<Utc>,
}

/// Resolves a place to coordinates.
#[async_trait]
pub trait Geocode: Send + Sync {
    /// Locates the machine from its public IP address.
    async fn locate_self(&self) -> Result<Place, GeoError>;

    /// Looks up a city by name.
    async fn locate_city(&self, city: &str) -> Result<Place, GeoError>;
}

/// Fetches sun times for a location on a date.
#[async_trait]
pub trait SunSchedule: Send + Sync {
    async fn sun_times(&self, at: Coordinates, date: NaiveDate) -> Result<SunTimes, SunError>;
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum GeoError {
    /// could not reach the IP geolocation service
    IpLookup {
        source: reqwest::Error,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("IP geolocation failed: {message}"))]
    IpLookupDenied { message: String },

    /// could not reach the geocoding service
    CityLookup {
        source: reqwest::Error,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("no coordinates found for city `{city}`"))]
    UnknownCity { city: String },

    #[snafu(display("geocoding service returned malformed coordinate `{value}`"))]
    MalformedCoordinate {
        value: String,
        source: std::num::ParseFloatError,
    },
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SunError {
    /// could not reach the sun times service
    FetchSunTimes {
        source: reqwest::Error,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("sun times service answered with status `{status}`"))]
    SunTimesDenied { status: String },

    #[snafu(display("sun times service returned malformed timestamp `{value}`"))]
    MalformedTimestamp {
        value: String,
        source: chrono::ParseError,
    },
}

/// Geocoder backed by ip-api.com for self-location and Nominatim for city
/// lookups.
///
/// Nominatim refuses anonymous requests, so the client passed in must carry
/// an identifying `User-Agent`.
#[derive(Debug, Clone)]
pub struct HttpGeocoder {
    client: Client,
    ip_locate_base: String,
    geocode_base: String,
}

impl HttpGeocoder {
    pub fn new(client: Client, config: &Config) -> Self {
        Self {
            client,
            ip_locate_base: api_root(&config.ip_locate_api_base),
            geocode_base: api_root(&config.geocode_api_base),
        }
    }
}

#[async_trait]
impl Geocode for HttpGeocoder {
    #[instrument(skip(self))]
    async fn locate_self(&self) -> Result<Place, GeoError> {
        let url = format!("{}/json/", self.ip_locate_base);
        let answer: IpLocation = self
            .client
            .get(&url)
            .send()
            .await
            .context(IpLookupSnafu)?
            .error_for_status()
            .context(IpLookupSnafu)?
            .json()
            .await
            .context(IpLookupSnafu)?;

        ensure!(
            answer.status == "success",
            IpLookupDeniedSnafu {
                message: answer.message.unwrap_or_else(|| "unknown reason".to_string()),
            }
        );

        tracing::debug!(lat = answer.lat, lon = answer.lon, city = %answer.city, "located via public IP");

        Ok(Place::new(
            Coordinates::new(answer.lat, answer.lon),
            format!("{}, {}", answer.city, answer.region),
        ))
    }

    #[instrument(skip(self))]
    async fn locate_city(&self, city: &str) -> Result<Place, GeoError> {
        let url = format!("{}/search", self.geocode_base);
        let places: Vec<GeocodedPlace> = self
            .client
            .get(&url)
            .query(&[("q", city), ("format", "json"), ("limit", "1")])
            .send()
            .await
            .context(CityLookupSnafu)?
            .error_for_status()
            .context(CityLookupSnafu)?
            .json()
            .await
            .context(CityLookupSnafu)?;

        let place = places.into_iter().next().context(UnknownCitySnafu { city })?;
        let latitude = place
            .lat
            .parse()
            .context(MalformedCoordinateSnafu { value: &place.lat })?;
        let longitude = place
            .lon
            .parse()
            .context(MalformedCoordinateSnafu { value: &place.lon })?;

        Ok(Place::new(Coordinates::new(latitude, longitude), city.to_string()))
    }
}

/// Sun times from the api.sunrise-sunset.org public API.
#[derive(Debug, Clone)]
pub struct SunriseSunsetOrg {
    client: Client,
    base: String,
}

impl SunriseSunsetOrg {
    pub fn new(client: Client, config: &Config) -> Self {
        Self {
            client,
            base: api_root(&config.sun_api_base),
        }
    }
}

#[async_trait]
impl SunSchedule for SunriseSunsetOrg {
    #[instrument(skip(self))]
    async fn sun_times(&self, at: Coordinates, date: NaiveDate) -> Result<SunTimes, SunError> {
        let url = format!("{}/json", self.base);
        let answer: SunAnswer = self
            .client
            .get(&url)
            .query(&[
                ("lat", at.latitude.to_string()),
                ("lng", at.longitude.to_string()),
                ("date", date.format("%Y-%m-%d").to_string()),
                // formatted=0 switches the API from human-readable strings
                // to ISO 8601 timestamps
                ("formatted", "0".to_string()),
            ])
            .send()
            .await
            .context(FetchSunTimesSnafu)?
            .error_for_status()
            .context(FetchSunTimesSnafu)?
            .json()
            .await
            .context(FetchSunTimesSnafu)?;

        ensure!(answer.status == "OK", SunTimesDeniedSnafu { status: answer.status });

        Ok(SunTimes::new(
            parse_utc(&answer.results.sunrise)?,
            parse_utc(&answer.results.sunset)?,
        ))
    }
}

fn parse_utc(value: &str) -> Result<DateTime<Utc>, SunError> {
    DateTime::parse_from_rfc3339(value)
        .map(|at| at.with_timezone(&Utc))
        .context(MalformedTimestampSnafu { value })
}

#[derive(Debug, Deserialize)]
struct IpLocation {
    status: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    lat: f64,
    #[serde(default)]
    lon: f64,
    #[serde(default)]
    city: String,
    #[serde(rename = "regionName", default)]
    region: String,
}

#[derive(Debug, Deserialize)]
struct GeocodedPlace {
    lat: String,
    lon: String,
}

#[derive(Debug, Deserialize)]
struct SunAnswer {
    status: String,
    results: SunResults,
}

#[derive(Debug, Deserialize)]
struct SunResults {
    sunrise: String,
    sunset: String,
}
