/// (De)serializes a [`Duration`] as a humantime string (`"30s"`, `"1h 30m"`).
/// Plain integers are accepted on input and interpreted as milliseconds.
pub mod serde_duration {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawDuration {
        Millis(u64),
        Text(String),
    }

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&humantime::format_duration(*value).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        match RawDuration::deserialize(deserializer)? {
            RawDuration::Millis(ms) => Ok(Duration::from_millis(ms)),
            RawDuration::Text(text) => {
                humantime::parse_duration(&text).map_err(serde::de::Error::custom)
            }
        }
    }
}

#[cfg(not(test))]
pub fn now_monotonic() -> std::time::Instant {
    std::time::Instant::now()
}

#[cfg(test)]
pub use mock_time::now_monotonic;

/// Testing utilities for mocking (monotonic) timestamps.
/// Use the `now_monotonic` function if you want to be able to mock the time in tests.
#[cfg(test)]
pub mod mock_time {
    use std::cell::RefCell;
    use std::time::{Duration, Instant};

    thread_local! {
        static MOCK_TIME: RefCell<Option<Instant>> = const { RefCell::new(None) };
    }

    pub struct MockTime;

    impl MockTime {
        pub fn mock(time: Instant) -> Self {
            MOCK_TIME.with(|cell| {
                assert!(cell.borrow().is_none());
                *cell.borrow_mut() = Some(time);
            });
            MockTime
        }

        /// Moves the mocked clock forward.
        pub fn advance(&self, duration: Duration) {
            MOCK_TIME.with(|cell| {
                let mut time = cell.borrow_mut();
                let now = time.expect("time is not mocked");
                *time = Some(now + duration);
            });
        }
    }

    impl Drop for MockTime {
        fn drop(&mut self) {
            MOCK_TIME.with(|cell| *cell.borrow_mut() = None);
        }
    }

    pub fn now_monotonic() -> Instant {
        MOCK_TIME.with(|cell| cell.borrow().as_ref().cloned().unwrap_or_else(Instant::now))
    }
}

#[cfg(test)]
mod tests {
    use super::serde_duration;
    use serde::Deserialize;
    use std::time::Duration;

    #[derive(Deserialize)]
    struct Wrapper {
        #[serde(with = "serde_duration")]
        value: Duration,
    }

    #[test]
    fn parse_duration_humantime() {
        let parsed: Wrapper = toml::from_str(r#"value = "1h 30m""#).unwrap();
        assert_eq!(parsed.value, Duration::from_secs(90 * 60));
    }

    #[test]
    fn parse_duration_millis() {
        let parsed: Wrapper = toml::from_str("value = 1500").unwrap();
        assert_eq!(parsed.value, Duration::from_millis(1500));
    }

    #[test]
    fn parse_duration_invalid() {
        assert!(toml::from_str::<Wrapper>(r#"value = "soon""#).is_err());
    }
}
