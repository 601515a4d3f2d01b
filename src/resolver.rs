use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use chrono::{DateTime, Duration, Local, NaiveDateTime, TimeZone};
use derive_new::new;
use snafu::{Location, OptionExt, ResultExt, Snafu};
use tracing::instrument;

use crate::sun::{GeoError, Geocode, Place, SunError, SunSchedule};

/// Format accepted for explicit anchors, e.g. `2026-03-07T06:30:00`.
pub const TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// When a broadcast should start or end: a fixed wall-clock time, or a sun
/// event looked up for the current date.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TimeSpec {
    Explicit(NaiveDateTime),
    Sunrise,
    Sunset,
}

impl FromStr for TimeSpec {
    type Err = ResolveError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.to_ascii_uppercase().as_str() {
            "SUNRISE" => Ok(Self::Sunrise),
            "SUNSET" => Ok(Self::Sunset),
            _ => NaiveDateTime::parse_from_str(input, TIME_FORMAT)
                .map(Self::Explicit)
                .context(InvalidTimeFormatSnafu { input }),
        }
    }
}

impl Display for TimeSpec {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Self::Explicit(at) => write!(f, "{}", at.format(TIME_FORMAT)),
            Self::Sunrise => f.write_str("SUNRISE"),
            Self::Sunset => f.write_str("SUNSET"),
        }
    }
}

/// A fully resolved broadcast anchor.
#[derive(Debug, Clone, new)]
pub struct ResolvedTime {
    /// The anchor with its offset applied, in local time.
    pub at: DateTime<Local>,
    /// Name of the place sun times were looked up for; `None` when the
    /// anchor was explicit.
    pub place: Option<String>,
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ResolveError {
    #[snafu(display(
        "invalid time `{input}`: expected SUNRISE, SUNSET, or a local timestamp like 2026-03-07T06:30:00"
    ))]
    InvalidTimeFormat {
        input: String,
        source: chrono::ParseError,
    },

    #[snafu(display("local time `{input}` does not exist (daylight saving gap)"))]
    NonexistentLocalTime { input: NaiveDateTime },

    /// could not resolve a location to look up sun times for
    LocationUnresolved {
        source: GeoError,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("could not fetch sun times for {place}"))]
    SunDataUnavailable {
        place: String,
        source: SunError,
        #[snafu(implicit)]
        location: Location,
    },
}

/// Turns a time spec into a concrete local timestamp.
#[derive(Debug, new)]
pub struct Resolver<G, S> {
    geocoder: G,
    sun: S,
}

impl<G: Geocode, S: SunSchedule> Resolver<G, S> {
    /// Resolves `spec` to local time and applies `offset_minutes`.
    ///
    /// Sun anchors geolocate first: by `city` when one is given, otherwise by
    /// the machine's public IP. Explicit anchors never touch the network.
    #[instrument(skip(self))]
    pub async fn resolve(
        &self,
        spec: TimeSpec,
        city: Option<&str>,
        offset_minutes: i64,
    ) -> Result<ResolvedTime, ResolveError> {
        let resolved = match spec {
            TimeSpec::Explicit(naive) => {
                let at = Local
                    .from_local_datetime(&naive)
                    // an ambiguous DST fold picks the first occurrence
                    .earliest()
                    .context(NonexistentLocalTimeSnafu { input: naive })?;

                ResolvedTime::new(at + Duration::minutes(offset_minutes), None)
            }
            TimeSpec::Sunrise | TimeSpec::Sunset => {
                let place = self.locate(city).await?;
                let times = self
                    .sun
                    .sun_times(place.coordinates, Local::now().date_naive())
                    .await
                    .context(SunDataUnavailableSnafu { place: place.name.clone() })?;

                let event = match spec {
                    TimeSpec::Sunrise => times.sunrise,
                    _ => times.sunset,
                };
                let at = event.with_timezone(&Local) + Duration::minutes(offset_minutes);

                tracing::debug!(%at, place = %place.name, "resolved sun anchor");

                ResolvedTime::new(at, Some(place.name))
            }
        };

        Ok(resolved)
    }

    async fn locate(&self, city: Option<&str>) -> Result<Place, ResolveError> {
        let place = match city {
            Some(city) => self.geocoder.locate_city(city).await,
            None => self.geocoder.locate_self().await,
        };

        place.context(LocationUnresolvedSnafu)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use chrono::{NaiveDate, Utc};

    use crate::sun::{Coordinates, SunTimes};

    use super::*;

    struct FixedLocator {
        name: String,
        city_queries: Arc<Mutex<Vec<String>>>,
        self_queries: Arc<Mutex<usize>>,
    }

    impl FixedLocator {
        fn new(name: &str) -> Self {
            Self {
                name: name.to_string(),
                city_queries: Arc::default(),
                self_queries: Arc::default(),
            }
        }
    }

    #[async_trait]
    impl Geocode for FixedLocator {
        async fn locate_self(&self) -> Result<Place, GeoError> {
            *self.self_queries.lock().unwrap() += 1;

            Ok(Place::new(Coordinates::new(45.68, -111.04), self.name.clone()))
        }

        async fn locate_city(&self, city: &str) -> Result<Place, GeoError> {
            self.city_queries.lock().unwrap().push(city.to_string());

            Ok(Place::new(Coordinates::new(45.68, -111.04), city.to_string()))
        }
    }

    struct FixedSun {
        times: SunTimes,
    }

    #[async_trait]
    impl SunSchedule for FixedSun {
        async fn sun_times(&self, _at: Coordinates, _date: NaiveDate) -> Result<SunTimes, SunError> {
            Ok(self.times)
        }
    }

    /// Stands in for both lookups in tests that must stay offline.
    struct NoNetwork;

    #[async_trait]
    impl Geocode for NoNetwork {
        async fn locate_self(&self) -> Result<Place, GeoError> {
            panic!("explicit anchors must not geolocate");
        }

        async fn locate_city(&self, _city: &str) -> Result<Place, GeoError> {
            panic!("explicit anchors must not geolocate");
        }
    }

    #[async_trait]
    impl SunSchedule for NoNetwork {
        async fn sun_times(&self, _at: Coordinates, _date: NaiveDate) -> Result<SunTimes, SunError> {
            panic!("explicit anchors must not fetch sun times");
        }
    }

    fn utc(h: u32, m: u32) -> DateTime<Utc> {
        NaiveDate::from_ymd_opt(2026, 3, 7)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
            .and_utc()
    }

    #[tokio::test]
    async fn explicit_anchors_resolve_without_any_lookup() {
        let resolver = Resolver::new(NoNetwork, NoNetwork);
        let spec: TimeSpec = "2026-03-07T06:30:00".parse().unwrap();

        let resolved = resolver.resolve(spec, None, 0).await.unwrap();

        assert_eq!(resolved.at.format(TIME_FORMAT).to_string(), "2026-03-07T06:30:00");
        assert_eq!(resolved.place, None);
    }

    #[tokio::test]
    async fn sunrise_locates_the_machine_when_no_city_is_given() {
        let locator = FixedLocator::new("Bozeman, Montana");
        let self_queries = Arc::clone(&locator.self_queries);
        let city_queries = Arc::clone(&locator.city_queries);
        let sun = FixedSun {
            times: SunTimes::new(utc(13, 43), utc(23, 12)),
        };
        let resolver = Resolver::new(locator, sun);

        let resolved = resolver.resolve(TimeSpec::Sunrise, None, 0).await.unwrap();

        assert_eq!(resolved.at, utc(13, 43).with_timezone(&Local));
        assert_eq!(resolved.place.as_deref(), Some("Bozeman, Montana"));
        assert_eq!(*self_queries.lock().unwrap(), 1);
        assert!(city_queries.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn city_hint_routes_to_the_city_lookup() {
        let locator = FixedLocator::new("unused");
        let self_queries = Arc::clone(&locator.self_queries);
        let city_queries = Arc::clone(&locator.city_queries);
        let sun = FixedSun {
            times: SunTimes::new(utc(13, 43), utc(23, 12)),
        };
        let resolver = Resolver::new(locator, sun);

        let resolved = resolver
            .resolve(TimeSpec::Sunset, Some("Bozeman"), 0)
            .await
            .unwrap();

        assert_eq!(resolved.at, utc(23, 12).with_timezone(&Local));
        assert_eq!(resolved.place.as_deref(), Some("Bozeman"));
        assert_eq!(*self_queries.lock().unwrap(), 0);
        assert_eq!(*city_queries.lock().unwrap(), vec!["Bozeman".to_string()]);
    }

    #[tokio::test]
    async fn offset_shifts_the_resolved_time_by_whole_minutes() {
        let sun = FixedSun {
            times: SunTimes::new(utc(13, 43), utc(23, 12)),
        };
        let resolver = Resolver::new(FixedLocator::new("Bozeman, Montana"), sun);

        let resolved = resolver.resolve(TimeSpec::Sunrise, None, -30).await.unwrap();

        assert_eq!(resolved.at, utc(13, 13).with_timezone(&Local));
    }

    #[test]
    fn specs_parse_case_insensitively() {
        assert_eq!("sunrise".parse::<TimeSpec>().unwrap(), TimeSpec::Sunrise);
        assert_eq!("SUNSET".parse::<TimeSpec>().unwrap(), TimeSpec::Sunset);
        assert_eq!("SunRise".parse::<TimeSpec>().unwrap(), TimeSpec::Sunrise);
    }

    #[test]
    fn garbage_time_strings_are_rejected() {
        for input in ["tomorrow", "2026-03-07 06:30:00", "06:30:00", ""] {
            let error = input.parse::<TimeSpec>().unwrap_err();

            assert!(
                matches!(error, ResolveError::InvalidTimeFormat { .. }),
                "`{input}` should be rejected"
            );
        }
    }

    #[test]
    fn display_round_trips_every_spec() {
        assert_eq!(TimeSpec::Sunrise.to_string(), "SUNRISE");
        assert_eq!(TimeSpec::Sunset.to_string(), "SUNSET");

        let spec: TimeSpec = "2026-03-07T06:30:00".parse().unwrap();
        assert_eq!(spec.to_string(), "2026-03-07T06:30:00");
    }
}
